//! Cortex-M implementation of [`Arch`]
//!
//! The initial synthetic stack frame (§4.3) and the two naked exception
//! handlers that actually swap live processor state - `SVCall` (one-time
//! scheduler start) and `PendSV` (steady-state context switch) - live here.
//! Both handlers are thin: they save/restore the callee-saved register
//! bank and the exception-return cookie, and call back into plain,
//! testable Rust (`Scheduler::select_active_task`) to decide which task
//! runs next.

// Copyright (c) 2025 Ferrous Systems
// SPDX-License-Identifier: GPL-3.0-or-later

use crate::arch::{Arch, SavedSp};
use crate::scheduler::Scheduler;
use crate::stack_pusher::StackPusher;

/// The value of the Processor Status Register a fresh task starts with.
///
/// The only bit we need to set is the T bit, to indicate that the task
/// should run in Thumb mode (the only supported mode on Armv7-M).
const DEFAULT_CPSR: u32 = 1 << 24;

/// EXC_RETURN cookie for "return to Thread mode, use PSP, no floating
/// point state". Popped as the last software-saved register and handed
/// straight back to hardware via `bx lr`.
const EXC_RETURN_THREAD_PSP: u32 = 0xFFFF_FFFD;

pub struct CortexM;

impl Arch for CortexM {
    fn init_task_frame(stack: &mut [u8], entry: usize, arg: usize, exit_trampoline: usize) -> SavedSp {
        let stack_top = stack.as_mut_ptr().wrapping_add(stack.len()).cast::<u32>();
        // SAFETY: `stack` is large enough for a full frame (the caller,
        // `Tcb::new`, enforces `MIN_FRAME_BYTES` headroom), and is properly
        // aligned because task stacks are allocated 8-byte aligned.
        let mut pusher = unsafe { StackPusher::new(stack_top) };

        // Hardware-stacked frame: xPSR, PC, LR, R12, R3, R2, R1, R0.
        pusher.push(DEFAULT_CPSR);
        pusher.push(entry as u32);
        pusher.push(exit_trampoline as u32);
        pusher.push(0); // R12
        pusher.push(0); // R3
        pusher.push(0); // R2
        pusher.push(0); // R1
        pusher.push(arg as u32); // R0: the task's argument

        // Software-saved frame: R11-R4, then the EXC_RETURN cookie.
        pusher.push(0); // R11
        pusher.push(0); // R10
        pusher.push(0); // R9
        pusher.push(0); // R8
        pusher.push(0); // R7
        pusher.push(0); // R6
        pusher.push(0); // R5
        pusher.push(0); // R4
        pusher.push(EXC_RETURN_THREAD_PSP);

        pusher.current() as usize
    }

    fn trigger_switch() {
        cortex_m::peripheral::SCB::set_pendsv();
    }

    fn trigger_start() {
        // SVC is synchronous (unlike PendSV, which is merely pended), so
        // this fires the `SVCall` handler immediately.
        unsafe { core::arch::asm!("svc 0", options(nomem, nostack, preserves_flags)) };
    }

    fn critical_section<R>(f: impl FnOnce() -> R) -> R {
        cortex_m::interrupt::free(|_cs| f())
    }

    fn halt() -> ! {
        cortex_m::asm::udf();
    }

    fn wait_for_interrupt() {
        cortex_m::asm::wfi();
    }
}

/// Runs in SVCall context, with no previous task to save. Picks the first
/// task to run and returns its saved stack pointer.
#[unsafe(no_mangle)]
extern "C" fn rtos_scheduler_start_trampoline() -> usize {
    Scheduler::get().select_active_task()
}

/// Runs in PendSV context with the outgoing task's stack pointer (after
/// the software frame has already been pushed) in `old_sp`. Records it,
/// picks the next task, and returns its saved stack pointer.
#[unsafe(no_mangle)]
extern "C" fn rtos_scheduler_switch_trampoline(old_sp: usize) -> usize {
    let scheduler = Scheduler::get();
    scheduler.save_active_sp(old_sp);
    scheduler.select_active_task()
}

/// One-time scheduler start. Triggered by [`CortexM::trigger_start`] via
/// `svc 0`; runs once, in Handler mode, on the main stack.
///
/// There is no previous task whose state needs saving, so this is a
/// separate, simpler handler from [`PendSV`] rather than the same handler
/// keyed on a sentinel "no current task" value.
#[unsafe(no_mangle)]
#[unsafe(naked)]
unsafe extern "C" fn SVCall() {
    core::arch::naked_asm!(
        "bl {trampoline}",
        "ldmia r0!, {{r4-r11, lr}}",
        "msr psp, r0",
        "bx lr",
        trampoline = sym rtos_scheduler_start_trampoline,
    );
}

/// Steady-state context switch. Pended by [`CortexM::trigger_switch`]; by
/// the time it runs, the hardware has already pushed {xPSR, PC, LR, R12,
/// R3-R0} onto the outgoing task's PSP.
///
/// Must not touch r4-r11 before they are stacked: only r0-r3 and r12 are
/// free to use until `stmdb` has saved the rest.
#[unsafe(no_mangle)]
#[unsafe(naked)]
unsafe extern "C" fn PendSV() {
    core::arch::naked_asm!(
        "mrs r0, psp",
        "stmdb r0!, {{r4-r11, lr}}",
        "bl {trampoline}",
        "ldmia r0!, {{r4-r11, lr}}",
        "msr psp, r0",
        "bx lr",
        trampoline = sym rtos_scheduler_switch_trampoline,
    );
}

// End of File
