//! The task control block ([`Tcb`]) and task configuration

// Copyright (c) 2025 Ferrous Systems
// SPDX-License-Identifier: GPL-3.0-or-later

use core::cell::Cell;

use alloc::boxed::Box;

use crate::arch::{Arch, Current, MIN_FRAME_BYTES};
use crate::config::{DEFAULT_PRIORITY, DEFAULT_STACKSIZE, RTOS_PRIORITY_COUNT, STACK_SENTINEL, SYS_STACK_PROTECTION_SIZE};
use crate::error::SysError;
use crate::list::{Link, Linked};

/// Lifecycle state of a task. Mirrors the source's `task_state_t`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub enum TaskState {
    /// The task has exited and is waiting to be reaped by the idle task.
    Exited,
    /// The task is sleeping a counted number of ticks.
    Delayed,
    /// The task is suspended pending an explicit unblock.
    Blocked,
    /// The task is runnable and sitting in a ready queue.
    Ready,
    /// The task is the one currently executing.
    Active,
}

/// Why a task is on the blocked list, or (while [`TaskState::Delayed`]) the
/// remaining tick countdown. Mirrors the source's `block_reason_t`, with
/// the "blockcause field reused to carry a delay count" trick made
/// explicit as an enum payload instead of a union pun.
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub enum BlockReason {
    /// Not blocked.
    None,
    /// Blocked pending a semaphore post.
    Semaphore,
    /// Sleeping; the payload is the remaining tick count.
    Delayed(u32),
}

/// Where a task's stack memory came from, and therefore who must free it.
pub(crate) enum StackStorage {
    /// Heap-allocated by the kernel; freed on reap.
    Owned(Box<[u8]>),
    /// Supplied by the caller in [`TaskConfig`]; the kernel never frees it.
    Borrowed(&'static mut [u8]),
}

impl StackStorage {
    fn as_mut_slice(&mut self) -> &mut [u8] {
        match self {
            StackStorage::Owned(b) => b,
            StackStorage::Borrowed(s) => s,
        }
    }

}

/// Optional configuration for [`crate::task_create`], mirroring the BMOS
/// `task_config_t` / `DEFAULT_TASK_CONFIG`.
pub struct TaskConfig {
    /// Statically allocated stack to use instead of a heap allocation.
    pub stack: Option<&'static mut [u8]>,
    /// Desired stack size, in bytes, when `stack` is `None`.
    pub stack_size: usize,
    /// Priority in `1..RTOS_PRIORITY_COUNT` (priority 0 is the idle task's).
    pub priority: u8,
    /// Optional human-readable task name, for logging.
    pub name: &'static str,
}

impl Default for TaskConfig {
    fn default() -> Self {
        TaskConfig {
            stack: None,
            stack_size: DEFAULT_STACKSIZE,
            priority: DEFAULT_PRIORITY,
            name: "",
        }
    }
}

/// Task control block.
///
/// The saved stack pointer is the first field so the naked PendSV/SVC
/// handlers can dereference a raw `Tcb` pointer and load or store it at
/// offset zero without knowing the rest of the layout; everything else is
/// reached only through [`Tcb`]'s own accessors, never directly from
/// assembly.
#[repr(C)]
pub struct Tcb {
    pub(crate) stack_pointer: Cell<usize>,
    stack: StackStorage,
    stack_softend: usize,
    pub(crate) state: Cell<TaskState>,
    pub(crate) block_reason: Cell<BlockReason>,
    pub(crate) priority: u8,
    pub(crate) name: &'static str,
    pub(crate) link: Link<Tcb>,
}

unsafe impl Linked for Tcb {
    fn link(&self) -> &Link<Self> {
        &self.link
    }
}

impl Tcb {
    /// Build a TCB and its stack, per spec.md §4.2 steps 1-5. `entry`/`arg`
    /// are passed straight through to [`Arch::init_task_frame`];
    /// `exit_trampoline` is the address the hardware returns to when the
    /// task's entry function returns.
    pub(crate) fn new(
        entry: usize,
        arg: usize,
        exit_trampoline: usize,
        cfg: TaskConfig,
    ) -> Result<Box<Tcb>, SysError> {
        if cfg.priority as usize >= RTOS_PRIORITY_COUNT {
            return Err(SysError::BadParam);
        }

        let mut storage = match cfg.stack {
            Some(buf) => {
                if buf.len() < MIN_FRAME_BYTES + SYS_STACK_PROTECTION_SIZE {
                    return Err(SysError::BadParam);
                }
                StackStorage::Borrowed(buf)
            }
            None => {
                let size = cfg.stack_size.max(MIN_FRAME_BYTES + SYS_STACK_PROTECTION_SIZE + 16);
                let buf = alloc::vec![0u8; size].into_boxed_slice();
                StackStorage::Owned(buf)
            }
        };

        let slice = storage.as_mut_slice();
        let stack_end = slice.as_mut_ptr() as usize;
        let protect = SYS_STACK_PROTECTION_SIZE.min(slice.len());
        for b in slice[..protect].iter_mut() {
            *b = STACK_SENTINEL;
        }
        let stack_softend = stack_end + protect;

        let sp = Current::init_task_frame(slice, entry, arg, exit_trampoline);

        Ok(Box::new(Tcb {
            stack_pointer: Cell::new(sp),
            stack: storage,
            stack_softend,
            state: Cell::new(TaskState::Ready),
            block_reason: Cell::new(BlockReason::None),
            priority: cfg.priority,
            name: cfg.name,
            link: Link::new(),
        }))
    }

    /// Lowest valid stack address (the soft end of the overflow-detection
    /// band). A saved stack pointer at or below this is an overflow.
    pub(crate) fn stack_softend(&self) -> usize {
        self.stack_softend
    }
}

// End of File
