//! S6 — pend timeout (spec.md §8).
//!
//! A binary semaphore starts at value 0 with no poster. `task_pend(sem,
//! 150)` returns after at least 150 ticks with a timeout, execution
//! resumes at the caller's next instruction, and the semaphore's value is
//! still 0.

// Copyright (c) 2025 Ferrous Systems
// SPDX-License-Identifier: GPL-3.0-or-later

#![no_std]
#![no_main]

use kernel::{PendOutcome, Stack, TaskConfig, Timeout};

static mut HEAP: [u8; 8 * 1024] = [0; 8 * 1024];
static STACK_WAITER: Stack<1024> = Stack::new();

const TIMEOUT_TICKS: u32 = 150;

#[cortex_m_rt::entry]
fn main() -> ! {
    // SAFETY: this is the only place `HEAP` is referenced, and it runs
    // once, before the scheduler starts.
    let heap = unsafe { &mut *core::ptr::addr_of_mut!(HEAP) };
    let syst = demos::board_init(heap);

    kernel::task_create(
        waiter,
        0,
        TaskConfig {
            // SAFETY: `STACK_WAITER` has `'static` storage duration and is
            // not handed to any other task.
            stack: Some(unsafe { STACK_WAITER.as_mut_slice() }),
            priority: 5,
            name: "waiter",
            ..Default::default()
        },
    )
    .unwrap();

    defmt::info!("S6: starting pend timeout demo");
    kernel::rtos_start(syst, drivers::clock::hclk_freq());
}

extern "C" fn waiter(_arg: usize) -> ! {
    let sem = kernel::semaphore_create_binary(false).expect("semaphore pool exhausted");
    let start = kernel::now();

    match kernel::semaphore_pend(sem, Timeout::Ticks(TIMEOUT_TICKS)) {
        PendOutcome::TimedOut => {
            let elapsed = kernel::now().wrapping_sub(start);
            defmt::println!("timed out after {} ticks", elapsed);
        }
        PendOutcome::Acquired => unreachable!("nothing ever posts to this semaphore"),
    }

    kernel::semaphore_destroy(sem).expect("no other task is waiting on this semaphore");
    loop {
        kernel::task_yield();
    }
}

// End of File
