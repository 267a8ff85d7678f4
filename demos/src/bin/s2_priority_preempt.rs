//! S2 — priority preemption (spec.md §8).
//!
//! `t_low` (priority 3) spins in a tight loop without ever yielding.
//! `t_high` (priority 5) sleeps 50 ms, prints `H`, sleeps another 50 ms,
//! prints `H` again, then exits. With preemption enabled the tick handler
//! that wakes `t_high` must switch to it immediately rather than waiting
//! for `t_low` to give up the CPU voluntarily, so the first `H` appears
//! within one tick of the 50 ms delay elapsing.

// Copyright (c) 2025 Ferrous Systems
// SPDX-License-Identifier: GPL-3.0-or-later

#![no_std]
#![no_main]

use kernel::{Stack, TaskConfig};

static mut HEAP: [u8; 8 * 1024] = [0; 8 * 1024];
static STACK_LOW: Stack<1024> = Stack::new();
static STACK_HIGH: Stack<1024> = Stack::new();

/// Ticks per 50 ms, assuming the tick handler's documented 1 ms period.
const DELAY_TICKS: u32 = 50;

#[cortex_m_rt::entry]
fn main() -> ! {
    // SAFETY: this is the only place `HEAP` is referenced, and it runs
    // once, before the scheduler starts.
    let heap = unsafe { &mut *core::ptr::addr_of_mut!(HEAP) };
    let syst = demos::board_init(heap);

    kernel::task_create(
        t_low,
        0,
        TaskConfig {
            // SAFETY: `STACK_LOW` has `'static` storage duration and is
            // not handed to any other task.
            stack: Some(unsafe { STACK_LOW.as_mut_slice() }),
            priority: 3,
            name: "low",
            ..Default::default()
        },
    )
    .unwrap();
    kernel::task_create(
        t_high,
        0,
        TaskConfig {
            stack: Some(unsafe { STACK_HIGH.as_mut_slice() }),
            priority: 5,
            name: "high",
            ..Default::default()
        },
    )
    .unwrap();

    defmt::info!("S2: starting priority preemption demo");
    kernel::rtos_start(syst, drivers::clock::hclk_freq());
}

extern "C" fn t_low(_arg: usize) -> ! {
    loop {
        defmt::println!("L");
    }
}

extern "C" fn t_high(_arg: usize) -> ! {
    kernel::task_delay(DELAY_TICKS);
    defmt::println!("H");
    kernel::task_delay(DELAY_TICKS);
    defmt::println!("H");

    let me = kernel::get_active_task().expect("t_high is the active task");
    kernel::task_destroy(me);
    unreachable!("task_destroy on the active task never returns");
}

// End of File
