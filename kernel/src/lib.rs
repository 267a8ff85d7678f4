//! A small preemptive real-time kernel for a single-core Armv7-M part.
//!
//! Priority-based, intrusively-linked ready/blocked/delayed/exited lists
//! (see [`list`]), one [`scheduler::Scheduler`] value as the sole piece of
//! global mutable state, and a hardware-dependent [`arch`] layer isolating
//! the two things that cannot run on a host: painting a task's initial
//! stack frame, and the naked PendSV/SVCall handlers that swap it in.

// Copyright (c) 2025 Ferrous Systems
// SPDX-License-Identifier: GPL-3.0-or-later

#![cfg_attr(not(any(test, feature = "std")), no_std)]

extern crate alloc;

#[cfg(not(test))]
use linked_list_allocator::LockedHeap;

mod arch;
pub mod config;
mod error;
mod idle;
mod list;
mod log;
mod scheduler;
mod semaphore;
mod stack;
mod stack_pusher;
mod task;

pub(crate) use log::klog;

pub use error::{fatal, PendOutcome, SysError};
pub use scheduler::TaskHandle;
pub use semaphore::{
    semaphore_create_binary, semaphore_create_counting, semaphore_destroy, semaphore_pend, semaphore_post,
    SemaphoreHandle, Timeout,
};
pub use stack::Stack;
pub use task::TaskConfig;

use arch::{Arch, Current};
use scheduler::Scheduler;

#[cfg(not(test))]
#[global_allocator]
static ALLOCATOR: LockedHeap = LockedHeap::empty();

/// Give the kernel a region of memory to use for dynamic allocation
/// (task TCBs, stacks not supplied by the caller, semaphores and their
/// waiting-entry queue nodes).
///
/// # Safety
/// `start` must point to at least `size` bytes of memory that nothing
/// else uses, for the remainder of the program.
#[cfg(not(test))]
pub unsafe fn init_heap(start: *mut u8, size: usize) {
    unsafe { ALLOCATOR.lock().init(start, size) };
}

/// Create a new task and place it on its ready queue (spec.md §4.2).
///
/// `entry` runs with `arg` as its sole parameter, in Thread mode, with
/// interrupts enabled. If it returns, the task is destroyed as if
/// [`task_destroy`] had been called on it.
pub fn task_create(entry: extern "C" fn(usize) -> !, arg: usize, cfg: TaskConfig) -> Result<TaskHandle, SysError> {
    Scheduler::get().task_create(entry as usize, arg, task_exit_trampoline as usize, cfg)
}

/// Tear down a task, freeing its TCB and (if kernel-allocated) its stack.
pub fn task_destroy(handle: TaskHandle) {
    Scheduler::get().task_destroy(handle);
}

/// Give up the remainder of the active task's time slice.
pub fn task_yield() {
    Scheduler::get().task_yield();
}

/// Put the active task to sleep for `ticks` system ticks.
pub fn task_delay(ticks: u32) {
    Scheduler::get().task_delay(ticks);
}

/// The currently-active task, if the scheduler has started.
pub fn get_active_task() -> Option<TaskHandle> {
    Scheduler::get().active_task()
}

/// Number of system ticks elapsed since [`rtos_start`] was called.
pub fn now() -> u32 {
    Scheduler::get().now()
}

/// Where control returns to if a task's entry function ever returns
/// instead of looping forever. Mirrors the source's implicit "falling off
/// the end destroys the task" behaviour.
extern "C" fn task_exit_trampoline(_unused: usize) -> ! {
    if let Some(active) = get_active_task() {
        task_destroy(active);
    }
    task_yield();
    // The scheduler never resumes an exited task.
    unreachable!()
}

/// Start the scheduler. Never returns.
///
/// `syst` is the (already clocked) SysTick peripheral; `hclk_hz` is the
/// core clock frequency as reported by the clock driver. The reload value
/// is computed so the tick fires at [`config::SYSTICK_FREQ`] Hz, per
/// spec.md §6.
///
/// At least one task (besides the implicit idle task, which this function
/// creates itself) must already have been created with [`task_create`].
#[cfg(not(test))]
pub fn rtos_start(mut syst: cortex_m::peripheral::SYST, hclk_hz: u32) -> ! {
    let idle_stack = alloc::vec![0u8; config::IDLE_TASK_STACK_SIZE].leak();
    let idle_cfg = TaskConfig {
        stack: Some(idle_stack),
        stack_size: config::IDLE_TASK_STACK_SIZE,
        priority: config::IDLE_TASK_PRIORITY,
        name: "idle",
    };
    Scheduler::get()
        .task_create(
            idle::idle_task_entry as usize,
            0,
            task_exit_trampoline as usize,
            idle_cfg,
        )
        .unwrap_or_else(|e| fatal(e));

    let reload = hclk_hz / config::SYSTICK_FREQ - 1;
    syst.set_reload(reload);
    syst.clear_current();
    syst.enable_counter();
    syst.enable_interrupt();

    defmt::info!("starting scheduler, tick reload={=u32}", reload);
    Current::trigger_start();
    cortex_m::asm::isb();
    unreachable!("the scheduler start handler does not return here");
}

/// System tick handler (spec.md §4.6): advances the tick count, releases
/// any expired delays, and requests a context switch if preemption is
/// warranted.
#[cfg(not(test))]
#[cortex_m_rt::exception]
fn SysTick() {
    if Scheduler::get().on_tick() {
        Current::trigger_switch();
    }
}

#[cfg(not(test))]
#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    defmt::println!("PANIC: {}", defmt::Debug2Format(info));
    fatal(SysError::Scheduler)
}

#[cfg(not(test))]
#[cortex_m_rt::exception]
unsafe fn HardFault(info: &cortex_m_rt::ExceptionFrame) -> ! {
    defmt::println!("FAULT: {}", defmt::Debug2Format(info));
    fatal(SysError::Scheduler)
}

#[cfg(not(test))]
defmt::timestamp!("{=u32:010}", now());

// End of File
