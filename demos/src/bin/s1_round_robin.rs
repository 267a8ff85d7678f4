//! S1 — cooperative two-task round-robin (spec.md §8).
//!
//! Two equal-priority tasks that only ever yield, never delay or block:
//! the scheduler's FIFO round-robin at a single priority level should
//! interleave their output as `ABAB...`.

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

    kernel::task_create(
        task_a,
        0,
        TaskConfig {
            // SAFETY: `STACK_A` has `'static` storage duration and is not
            // handed to any other task.
            stack: Some(unsafe { STACK_A.as_mut_slice() }),
            priority: 5,
            name: "a",
            ..Default::default()
        },
    )
    .unwrap();
    kernel::task_create(
        task_b,
        0,
        TaskConfig {
            stack: Some(unsafe { STACK_B.as_mut_slice() }),
            priority: 5,
            name: "b",
            ..Default::default()
        },
    )
    .unwrap();

    defmt::info!("S1: starting cooperative round-robin demo");
    kernel::rtos_start(syst, drivers::clock::hclk_freq());
}

extern "C" fn task_a(_arg: usize) -> ! {
    loop {
        defmt::println!("A");
        kernel::task_yield();
    }
}

extern "C" fn task_b(_arg: usize) -> ! {
    loop {
        defmt::println!("B");
        kernel::task_yield();
    }
}

// End of File
