//! S5 — counting semaphore saturation (spec.md §8).
//!
//! A counting semaphore starts at 2 units. Three tasks, `t_a`/`t_b`/`t_c`
//! in that priority order (5/4/3, so they're admitted to the scheduler
//! and reach their first pend in that order), each pend once with an
//! infinite timeout. `t_a` and `t_b` are satisfied immediately from the
//! initial value; `t_c` blocks. A single post from `t_a` afterwards wakes
//! `t_c`, leaving the semaphore's value at 0 and its waiting list empty.

// Copyright (c) 2025 Ferrous Systems
// SPDX-License-Identifier: GPL-3.0-or-later

#![no_std]
#![no_main]

use kernel::{PendOutcome, SemaphoreHandle, Stack, TaskConfig, Timeout};

static mut HEAP: [u8; 8 * 1024] = [0; 8 * 1024];
static STACK_A: Stack<1024> = Stack::new();
static STACK_B: Stack<1024> = Stack::new();
static STACK_C: Stack<1024> = Stack::new();

// Written once in `main`, before any task is created, and never again;
// every task only ever reads it.
static mut SEM: Option<SemaphoreHandle> = None;

#[cortex_m_rt::entry]
fn main() -> ! {
    // SAFETY: this is the only place `HEAP` is referenced, and it runs
    // once, before the scheduler starts.
    let heap = unsafe { &mut *core::ptr::addr_of_mut!(HEAP) };
    let syst = demos::board_init(heap);

    let sem = kernel::semaphore_create_counting(2).expect("semaphore pool exhausted");
    // SAFETY: no other task exists yet, so nothing else can race this write.
    unsafe { SEM = Some(sem) };

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
            priority: 4,
            name: "b",
            ..Default::default()
        },
    )
    .unwrap();
    kernel::task_create(
        t_c,
        0,
        TaskConfig {
            stack: Some(unsafe { STACK_C.as_mut_slice() }),
            priority: 3,
            name: "c",
            ..Default::default()
        },
    )
    .unwrap();

    defmt::info!("S5: starting counting semaphore saturation demo");
    kernel::rtos_start(syst, drivers::clock::hclk_freq());
}

fn sem_handle() -> SemaphoreHandle {
    // SAFETY: set once before `rtos_start`; read-only from here on.
    unsafe { SEM }.expect("semaphore created before any task runs")
}

fn pend_and_report(name: &str) {
    match kernel::semaphore_pend(sem_handle(), Timeout::Infinite) {
        PendOutcome::Acquired => defmt::println!("{} acquired", name),
        PendOutcome::TimedOut => unreachable!("an infinite pend never times out"),
    }
}

extern "C" fn t_a(_arg: usize) -> ! {
    pend_and_report("a");
    // `a` outranks `b` and `c`, so a bare yield would just reselect `a`
    // itself; a short delay is what actually lets the lower-priority tasks
    // run, pend in turn, and (for `c`) block on the now-exhausted
    // semaphore before `a` resumes and posts.
    kernel::task_delay(1);
    kernel::semaphore_post(sem_handle());
    defmt::println!("a posted");
    loop {
        kernel::task_yield();
    }
}

extern "C" fn t_b(_arg: usize) -> ! {
    pend_and_report("b");
    loop {
        kernel::task_yield();
    }
}

extern "C" fn t_c(_arg: usize) -> ! {
    pend_and_report("c");
    loop {
        kernel::task_yield();
    }
}

// End of File
