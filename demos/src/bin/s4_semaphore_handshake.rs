//! S4 — binary semaphore handshake (spec.md §8).
//!
//! `t_prod` (priority 4) posts to a binary semaphore every 100 ms.
//! `t_cons` (priority 5) pends on it with an infinite timeout and counts
//! each wakeup. After 5 posts the consumer has recorded 5 wakeups.

// Copyright (c) 2025 Ferrous Systems
// SPDX-License-Identifier: GPL-3.0-or-later

#![no_std]
#![no_main]

use core::sync::atomic::{AtomicU32, Ordering};

use kernel::{PendOutcome, SemaphoreHandle, Stack, TaskConfig, Timeout};

static mut HEAP: [u8; 8 * 1024] = [0; 8 * 1024];
static STACK_PROD: Stack<1024> = Stack::new();
static STACK_CONS: Stack<1024> = Stack::new();

// Written once in `main`, before either task is created, and never again;
// both tasks only ever read it.
static mut SEM: Option<SemaphoreHandle> = None;

static WAKEUPS: AtomicU32 = AtomicU32::new(0);

const POST_PERIOD_TICKS: u32 = 100;

#[cortex_m_rt::entry]
fn main() -> ! {
    // SAFETY: this is the only place `HEAP` is referenced, and it runs
    // once, before the scheduler starts.
    let heap = unsafe { &mut *core::ptr::addr_of_mut!(HEAP) };
    let syst = demos::board_init(heap);

    let sem = kernel::semaphore_create_binary(false).expect("semaphore pool exhausted");
    // SAFETY: no other task exists yet, so nothing else can race this write.
    unsafe { SEM = Some(sem) };

    kernel::task_create(
        t_prod,
        0,
        TaskConfig {
            // SAFETY: `STACK_PROD` has `'static` storage duration and is
            // not handed to any other task.
            stack: Some(unsafe { STACK_PROD.as_mut_slice() }),
            priority: 4,
            name: "prod",
            ..Default::default()
        },
    )
    .unwrap();
    kernel::task_create(
        t_cons,
        0,
        TaskConfig {
            stack: Some(unsafe { STACK_CONS.as_mut_slice() }),
            priority: 5,
            name: "cons",
            ..Default::default()
        },
    )
    .unwrap();

    defmt::info!("S4: starting semaphore handshake demo");
    kernel::rtos_start(syst, drivers::clock::hclk_freq());
}

fn sem_handle() -> SemaphoreHandle {
    // SAFETY: set once before `rtos_start`; read-only from here on.
    unsafe { SEM }.expect("semaphore created before either task runs")
}

extern "C" fn t_prod(_arg: usize) -> ! {
    loop {
        kernel::task_delay(POST_PERIOD_TICKS);
        kernel::semaphore_post(sem_handle());
        defmt::println!("post");
    }
}

extern "C" fn t_cons(_arg: usize) -> ! {
    loop {
        match kernel::semaphore_pend(sem_handle(), Timeout::Infinite) {
            PendOutcome::Acquired => {
                let count = WAKEUPS.fetch_add(1, Ordering::Relaxed) + 1;
                defmt::println!("wakeup {}", count);
            }
            PendOutcome::TimedOut => unreachable!("an infinite pend never times out"),
        }
    }
}

// End of File
