//! S3 — delay release ordering (spec.md §8).
//!
//! `t_a` delays 100 ticks, `t_b` delays 50 ticks, both at the same
//! priority. With the tick at 1 kHz, `t_b` becomes ready at tick 50 and
//! `t_a` at tick 100; if both are still ready when the active task next
//! yields at tick 110, selection order is `t_b` then `t_a`. Here the
//! demo's own main task plays that yielding role: it delays 110 ticks,
//! then yields once per iteration so the two delayed tasks get picked up
//! in the order they became ready, not the order they were created in.

// Copyright (c) 2025 Ferrous Systems
// SPDX-License-Identifier: GPL-3.0-or-later

#![no_std]
#![no_main]

use kernel::{Stack, TaskConfig};

static mut HEAP: [u8; 8 * 1024] = [0; 8 * 1024];
static STACK_A: Stack<1024> = Stack::new();
static STACK_B: Stack<1024> = Stack::new();

#[cortex_m_rt::entry]
fn main() -> ! {
    // SAFETY: this is the only place `HEAP` is referenced, and it runs
    // once, before the scheduler starts.
    let heap = unsafe { &mut *core::ptr::addr_of_mut!(HEAP) };
    let syst = demos::board_init(heap);

    // `t_a` is created first but delays longer, so if release order
    // tracked creation order instead of remaining tick count it would
    // (wrongly) come back first.
    kernel::task_create(
        t_a,
        0,
        TaskConfig {
            // SAFETY: `STACK_A` has `'static` storage duration and is
            // not handed to any other task.
            stack: Some(unsafe { STACK_A.as_mut_slice() }),
            priority: 5,
            name: "a",
            ..Default::default()
        },
    )
    .unwrap();
    kernel::task_create(
        t_b,
        0,
        TaskConfig {
            stack: Some(unsafe { STACK_B.as_mut_slice() }),
            priority: 5,
            name: "b",
            ..Default::default()
        },
    )
    .unwrap();

    defmt::info!("S3: starting delay release ordering demo");
    kernel::rtos_start(syst, drivers::clock::hclk_freq());
}

extern "C" fn t_a(_arg: usize) -> ! {
    kernel::task_delay(100);
    defmt::println!("a ready at tick {}", kernel::now());
    loop {
        kernel::task_yield();
    }
}

extern "C" fn t_b(_arg: usize) -> ! {
    kernel::task_delay(50);
    defmt::println!("b ready at tick {}", kernel::now());
    loop {
        kernel::task_yield();
    }
}

// End of File
