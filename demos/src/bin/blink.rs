//! Illustrative LED blink, driven by a task delay loop.
//!
//! Not one of spec.md §8's scenarios — this exists only to exercise
//! `drivers::gpio` (SPEC_FULL.md's supplemented GPIO driver) from a task,
//! the way the teacher's `pets` examples drive its own simulated
//! peripherals from scheduled tasks.

// Copyright (c) 2025 Ferrous Systems
// SPDX-License-Identifier: GPL-3.0-or-later

#![no_std]
#![no_main]

use drivers::gpio::{Mode, Pin};
use kernel::{Stack, TaskConfig};

static mut HEAP: [u8; 8 * 1024] = [0; 8 * 1024];
static STACK_BLINK: Stack<1024> = Stack::new();

/// PA5, the user LED on a Nucleo-L476RG.
const LED: Pin = Pin::new(0, 5);

const HALF_PERIOD_TICKS: u32 = 500;

#[cortex_m_rt::entry]
fn main() -> ! {
    // SAFETY: this is the only place `HEAP` is referenced, and it runs
    // once, before the scheduler starts.
    let heap = unsafe { &mut *core::ptr::addr_of_mut!(HEAP) };
    let syst = demos::board_init(heap);

    kernel::task_create(
        blink,
        0,
        TaskConfig {
            // SAFETY: `STACK_BLINK` has `'static` storage duration and is
            // not handed to any other task.
            stack: Some(unsafe { STACK_BLINK.as_mut_slice() }),
            priority: 5,
            name: "blink",
            ..Default::default()
        },
    )
    .unwrap();

    defmt::info!("blink: starting LED demo");
    kernel::rtos_start(syst, drivers::clock::hclk_freq());
}

extern "C" fn blink(_arg: usize) -> ! {
    LED.set_mode(Mode::Output);
    LED.set_output_type(false);

    loop {
        LED.toggle();
        kernel::task_delay(HALF_PERIOD_TICKS);
    }
}

// End of File
