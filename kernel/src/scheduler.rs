//! The [`Scheduler`]: ready queues, blocked/delayed lists, and the
//! exited-task reap list.

// Copyright (c) 2025 Ferrous Systems
// SPDX-License-Identifier: GPL-3.0-or-later

use core::cell::{Cell, UnsafeCell};
use core::ptr::NonNull;
use core::sync::atomic::{AtomicU32, Ordering};

use alloc::boxed::Box;

use crate::arch::{Arch, Current};
use crate::config::RTOS_PRIORITY_COUNT;
use crate::error::SysError;
use crate::list::List;
use crate::task::{BlockReason, TaskConfig, TaskState, Tcb};

/// An opaque handle to a created task. Cheap to copy, valid for as long as
/// the task has not been reaped.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct TaskHandle(pub(crate) NonNull<Tcb>);

// SAFETY: a TaskHandle is just an address; all access to the pointee goes
// through the scheduler's critical-section discipline.
unsafe impl Send for TaskHandle {}

impl TaskHandle {
    pub(crate) fn tcb(&self) -> &Tcb {
        // SAFETY: the pointee is only freed by the idle task's reap loop,
        // which happens after the TCB has been unlinked from every list a
        // handle could have been obtained through.
        unsafe { self.0.as_ref() }
    }
}

/// The one and only scheduler, as a plain value (not behind an `AtomicPtr`
/// indirection): every field is wrapped for interior mutability and every
/// mutating access happens inside [`Arch::critical_section`].
pub struct Scheduler {
    ready: [UnsafeCell<List<Tcb>>; RTOS_PRIORITY_COUNT],
    blocked: UnsafeCell<List<Tcb>>,
    delayed: UnsafeCell<List<Tcb>>,
    exited: UnsafeCell<List<Tcb>>,
    active: Cell<Option<NonNull<Tcb>>>,
    ticks: AtomicU32,
}

// SAFETY: every method that touches the `UnsafeCell`/`Cell` fields is only
// ever called from within `Arch::critical_section`, and this is a
// single-core kernel, so there is never genuine concurrent access.
unsafe impl Sync for Scheduler {}

/// The global scheduler instance.
pub(crate) static SCHEDULER: Scheduler = Scheduler::new();

impl Scheduler {
    const EMPTY_LIST: UnsafeCell<List<Tcb>> = UnsafeCell::new(List::new());

    const fn new() -> Scheduler {
        Scheduler {
            ready: [Self::EMPTY_LIST; RTOS_PRIORITY_COUNT],
            blocked: UnsafeCell::new(List::new()),
            delayed: UnsafeCell::new(List::new()),
            exited: UnsafeCell::new(List::new()),
            active: Cell::new(None),
            ticks: AtomicU32::new(0),
        }
    }

    pub(crate) fn get() -> &'static Scheduler {
        &SCHEDULER
    }

    fn ready(&self, priority: u8) -> &mut List<Tcb> {
        // SAFETY: called only from within a critical section.
        unsafe { &mut *self.ready[priority as usize].get() }
    }

    fn blocked(&self) -> &mut List<Tcb> {
        unsafe { &mut *self.blocked.get() }
    }

    fn delayed(&self) -> &mut List<Tcb> {
        unsafe { &mut *self.delayed.get() }
    }

    fn exited(&self) -> &mut List<Tcb> {
        unsafe { &mut *self.exited.get() }
    }

    /// Current tick count.
    pub fn now(&self) -> u32 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// The currently-active task, if the scheduler has started.
    pub fn active_task(&self) -> Option<TaskHandle> {
        self.active.get().map(TaskHandle)
    }

    /// Create a task and place it on its ready queue (spec.md §4.2).
    pub fn task_create(
        &self,
        entry: usize,
        arg: usize,
        exit_trampoline: usize,
        cfg: TaskConfig,
    ) -> Result<TaskHandle, SysError> {
        let priority = cfg.priority;
        let tcb = Tcb::new(entry, arg, exit_trampoline, cfg)?;
        let ptr = NonNull::from(Box::leak(tcb));
        Current::critical_section(|| unsafe {
            self.ready(priority).append(ptr);
        });
        Ok(TaskHandle(ptr))
    }

    /// Tear down a task (spec.md §4.2's full, non-stub behaviour - Open
    /// Question 3). The task is unlinked from whatever list it is on and
    /// moved to the exited-reap list; its memory is freed later by the idle
    /// task, since a task may be destroying itself and cannot free the
    /// stack it is still running on.
    pub fn task_destroy(&self, handle: TaskHandle) {
        Current::critical_section(|| {
            let tcb = handle.tcb();
            match tcb.state.get() {
                TaskState::Ready | TaskState::Active => unsafe {
                    self.ready(tcb.priority).remove(handle.0);
                },
                TaskState::Blocked => unsafe {
                    self.blocked().remove(handle.0);
                },
                TaskState::Delayed => unsafe {
                    self.delayed().remove(handle.0);
                },
                TaskState::Exited => return,
            }
            tcb.state.set(TaskState::Exited);
            tcb.block_reason.set(BlockReason::None);
            unsafe { self.exited().append(handle.0) };
            if self.active.get() == Some(handle.0) {
                self.active.set(None);
            }
        });
        Current::trigger_switch();
    }

    /// Reap every task on the exited list, freeing its TCB and (if owned)
    /// its stack. Called only from the idle task.
    pub(crate) fn reap_exited(&self) {
        loop {
            let next = Current::critical_section(|| self.exited().pop_front());
            let Some(ptr) = next else { break };
            crate::klog!(debug, "reaping task '{=str}'", unsafe { ptr.as_ref().name });
            // SAFETY: a task only reaches the exited list once every list
            // that could reference it has dropped the reference, and it is
            // only popped once.
            unsafe { drop(Box::from_raw(ptr.as_ptr())) };
        }
    }

    /// Give up the remainder of the current time slice (spec.md §4.4).
    pub fn task_yield(&self) {
        Current::critical_section(|| {
            if let Some(active) = self.active.get() {
                // SAFETY: active is always a live TCB pointer.
                let tcb = unsafe { active.as_ref() };
                tcb.state.set(TaskState::Ready);
                unsafe { self.ready(tcb.priority).append(active) };
            }
        });
        Current::trigger_switch();
    }

    /// Put the active task to sleep for `ticks` system ticks.
    pub fn task_delay(&self, ticks: u32) {
        if ticks == 0 {
            self.task_yield();
            return;
        }
        Current::critical_section(|| {
            if let Some(active) = self.active.get() {
                let tcb = unsafe { active.as_ref() };
                tcb.state.set(TaskState::Delayed);
                tcb.block_reason.set(BlockReason::Delayed(ticks));
                unsafe { self.delayed().append(active) };
            }
        });
        Current::trigger_switch();
    }

    /// Move the active task to the blocked list (used by the semaphore
    /// pend path).
    pub(crate) fn block_active_task(&self) -> Option<TaskHandle> {
        let handle = Current::critical_section(|| {
            let active = self.active.get()?;
            let tcb = unsafe { active.as_ref() };
            tcb.state.set(TaskState::Blocked);
            tcb.block_reason.set(BlockReason::Semaphore);
            unsafe { self.blocked().append(active) };
            Some(TaskHandle(active))
        });
        Current::trigger_switch();
        handle
    }

    /// Move a delayed-with-timeout task off the blocked list back onto its
    /// ready queue, because its pend timed out (§4.7).
    pub(crate) fn unblock_task(&self, handle: TaskHandle) {
        Current::critical_section(|| {
            let tcb = handle.tcb();
            if tcb.state.get() != TaskState::Blocked {
                return;
            }
            unsafe { self.blocked().remove(handle.0) };
            tcb.state.set(TaskState::Ready);
            tcb.block_reason.set(BlockReason::None);
            unsafe { self.ready(tcb.priority).append(handle.0) };
        });
    }

    /// Release a task that is sleeping on the delayed list early (used when
    /// a pend's timeout is implemented as a delay rather than a block).
    pub(crate) fn unblock_delayed_task(&self, handle: TaskHandle) {
        Current::critical_section(|| {
            let tcb = handle.tcb();
            if tcb.state.get() != TaskState::Delayed {
                return;
            }
            unsafe { self.delayed().remove(handle.0) };
            tcb.state.set(TaskState::Ready);
            tcb.block_reason.set(BlockReason::None);
            unsafe { self.ready(tcb.priority).append(handle.0) };
        });
    }

    /// Highest non-empty ready priority, if any.
    fn highest_ready_priority(&self) -> Option<u8> {
        (0..RTOS_PRIORITY_COUNT as u8)
            .rev()
            .find(|&p| !self.ready(p).is_empty())
    }

    /// Pop the next task to run. Does not touch the previously-active task;
    /// callers that are re-queuing it must have done so already.
    fn pop_next_ready(&self) -> Option<NonNull<Tcb>> {
        let priority = self.highest_ready_priority()?;
        self.ready(priority).pop_front()
    }

    /// Advance the periodic tick (spec.md §4.6): release expired delays,
    /// then decide whether a switch is warranted. Returns `true` if the
    /// caller should request a context switch.
    pub fn on_tick(&self) -> bool {
        self.ticks.fetch_add(1, Ordering::Relaxed);
        let active_priority = self.active.get().map(|a| unsafe { a.as_ref().priority });

        Current::critical_section(|| {
            let delayed = self.delayed();

            // The number of nodes to visit, fixed up front: if the walk
            // below used "stop when we loop back to the original head"
            // instead, expiring the head node itself would remove the
            // only marker we had for where the circle closes, running
            // forever. A node count survives removals just fine.
            let mut remaining = 0usize;
            if let Some(head) = delayed.head() {
                let mut p = head;
                loop {
                    remaining += 1;
                    p = unsafe { delayed.next(p) };
                    if p == head {
                        break;
                    }
                }
            }

            let mut current = delayed.head();
            for _ in 0..remaining {
                let Some(node) = current else { break };
                // Capture where to continue before `node` is possibly
                // spliced out below.
                let next = unsafe { delayed.next(node) };

                let tcb = unsafe { node.as_ref() };
                match tcb.block_reason.get() {
                    BlockReason::Delayed(n) if n <= 1 => {
                        unsafe { delayed.remove(node) };
                        tcb.state.set(TaskState::Ready);
                        tcb.block_reason.set(BlockReason::None);
                        unsafe { self.ready(tcb.priority).append(node) };
                    }
                    BlockReason::Delayed(n) => tcb.block_reason.set(BlockReason::Delayed(n - 1)),
                    _ => {}
                }

                current = Some(next);
            }
        });

        if !crate::config::ENABLE_PREEMPTION {
            return false;
        }

        match (active_priority, self.highest_ready_priority()) {
            (None, Some(_)) => true,
            (Some(ap), Some(rp)) => rp >= ap,
            _ => false,
        }
    }

    /// Compare the outgoing task's saved stack pointer against its overflow
    /// guard band (Open Question 4), and if it has overflowed, log and
    /// destroy it instead of letting it run again.
    fn check_stack_guard(&self, tcb: &Tcb) -> bool {
        let sp = tcb.stack_pointer.get();
        if sp <= tcb.stack_softend() {
            crate::klog!(error, "stack overflow in task '{=str}', sp=0x{=usize:08x}", tcb.name, sp);
            true
        } else {
            false
        }
    }

    /// Select and install the next active task, requeuing the outgoing one
    /// (round-robin within its own priority) if it is still runnable.
    /// Returns the new active task's saved stack pointer.
    ///
    /// Called from the architecture's context-switch trampoline with the
    /// outgoing task's just-saved stack pointer already written into its
    /// TCB.
    pub(crate) fn select_active_task(&self) -> usize {
        let overflowed = Current::critical_section(|| {
            let mut overflowed_handle = None;
            if let Some(prev) = self.active.get() {
                let tcb = unsafe { prev.as_ref() };
                if self.check_stack_guard(tcb) {
                    overflowed_handle = Some(TaskHandle(prev));
                } else if tcb.state.get() == TaskState::Active {
                    tcb.state.set(TaskState::Ready);
                    unsafe { self.ready(tcb.priority).append(prev) };
                }
            }
            overflowed_handle
        });

        if let Some(handle) = overflowed {
            self.task_destroy(handle);
        }

        let next = Current::critical_section(|| {
            let next = self.pop_next_ready();
            if let Some(ptr) = next {
                unsafe { ptr.as_ref().state.set(TaskState::Active) };
            }
            self.active.set(next);
            next
        });

        match next {
            Some(ptr) => unsafe { ptr.as_ref().stack_pointer.get() },
            None => crate::fatal(SysError::Scheduler),
        }
    }

    /// Record the outgoing task's saved stack pointer. Called by the
    /// architecture trampoline before [`Scheduler::select_active_task`].
    pub(crate) fn save_active_sp(&self, sp: usize) {
        if let Some(active) = self.active.get() {
            unsafe { active.as_ref().stack_pointer.set(sp) };
        }
    }

    /// Drop every task currently known to the scheduler and clear the
    /// active pointer. Only exists so `semaphore.rs`'s tests, which must
    /// go through the real global [`SCHEDULER`] singleton rather than a
    /// fresh local instance, can start from a clean slate.
    #[cfg(test)]
    pub(crate) fn reset_for_test(&self) {
        if let Some(ptr) = self.active.take() {
            // A task only sits outside every list while truly `Active`;
            // anything else (left stale by `task_yield`/`task_delay`/
            // `block_active_task`, which re-link before a real switch
            // ever clears `active`) is about to be freed by the drain
            // below, and freeing it here too would be a double free.
            if unsafe { ptr.as_ref() }.state.get() == TaskState::Active {
                unsafe { drop(Box::from_raw(ptr.as_ptr())) };
            }
        }
        let drain = |list: &mut List<Tcb>| {
            while let Some(ptr) = list.pop_front() {
                unsafe { drop(Box::from_raw(ptr.as_ptr())) };
            }
        };
        for p in 0..RTOS_PRIORITY_COUNT as u8 {
            drain(self.ready(p));
        }
        drain(self.blocked());
        drain(self.delayed());
        drain(self.exited());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::MIN_FRAME_BYTES;

    fn make_task(sched: &Scheduler, priority: u8) -> TaskHandle {
        let cfg = TaskConfig {
            stack_size: MIN_FRAME_BYTES + 64,
            priority,
            name: "t",
            ..Default::default()
        };
        sched.task_create(0, 0, 0, cfg).unwrap()
    }

    #[test]
    fn newly_created_task_is_ready_at_its_priority() {
        let sched = Scheduler::new();
        let handle = make_task(&sched, 2);
        assert_eq!(handle.tcb().state.get(), TaskState::Ready);
        assert!(!sched.ready(2).is_empty());
        assert_eq!(sched.highest_ready_priority(), Some(2));
    }

    #[test]
    fn select_prefers_highest_priority_regardless_of_creation_order() {
        let sched = Scheduler::new();
        let low = make_task(&sched, 1);
        let high = make_task(&sched, 5);
        let sp = sched.select_active_task();
        assert_eq!(sched.active.get(), Some(high.0));
        assert_eq!(sp, high.tcb().stack_pointer.get());
        assert_eq!(low.tcb().state.get(), TaskState::Ready);
    }

    #[test]
    fn same_priority_round_robins() {
        let sched = Scheduler::new();
        let a = make_task(&sched, 3);
        let b = make_task(&sched, 3);

        sched.select_active_task();
        assert_eq!(sched.active.get(), Some(a.0));

        sched.task_yield();
        sched.select_active_task();
        assert_eq!(sched.active.get(), Some(b.0));

        sched.task_yield();
        sched.select_active_task();
        assert_eq!(sched.active.get(), Some(a.0));
    }

    #[test]
    fn delay_moves_task_off_ready_and_tick_releases_it_after_countdown() {
        let sched = Scheduler::new();
        let a = make_task(&sched, 4);
        sched.select_active_task();
        assert_eq!(sched.active.get(), Some(a.0));

        sched.task_delay(2);
        assert_eq!(a.tcb().state.get(), TaskState::Delayed);
        assert!(sched.ready(4).is_empty());
        assert!(!sched.delayed().is_empty());

        sched.on_tick();
        assert_eq!(a.tcb().state.get(), TaskState::Delayed);
        assert!(!sched.delayed().is_empty());

        sched.on_tick();
        assert_eq!(a.tcb().state.get(), TaskState::Ready);
        assert!(sched.delayed().is_empty());
        assert!(!sched.ready(4).is_empty());
    }

    #[test]
    fn zero_tick_delay_behaves_like_yield() {
        let sched = Scheduler::new();
        let a = make_task(&sched, 2);
        let b = make_task(&sched, 2);
        sched.select_active_task();
        assert_eq!(sched.active.get(), Some(a.0));

        sched.task_delay(0);
        assert_eq!(a.tcb().state.get(), TaskState::Ready);
        assert!(sched.delayed().is_empty());

        sched.select_active_task();
        assert_eq!(sched.active.get(), Some(b.0));
    }

    #[test]
    fn block_and_unblock_round_trip() {
        let sched = Scheduler::new();
        let a = make_task(&sched, 3);
        sched.select_active_task();
        assert_eq!(sched.active.get(), Some(a.0));

        let handle = sched.block_active_task().expect("a task is active");
        assert_eq!(handle.0, a.0);
        assert_eq!(a.tcb().state.get(), TaskState::Blocked);
        assert!(!sched.blocked().is_empty());

        sched.unblock_task(handle);
        assert_eq!(a.tcb().state.get(), TaskState::Ready);
        assert!(sched.blocked().is_empty());
        assert!(!sched.ready(3).is_empty());
    }

    #[test]
    fn destroy_moves_to_exited_and_reap_frees_it() {
        let sched = Scheduler::new();
        let handle = make_task(&sched, 1);
        sched.task_destroy(handle);
        assert_eq!(handle.tcb().state.get(), TaskState::Exited);
        assert!(sched.ready(1).is_empty());
        assert!(!sched.exited().is_empty());

        sched.reap_exited();
        assert!(sched.exited().is_empty());
    }

    #[test]
    fn destroying_the_active_task_clears_active_and_picks_next() {
        let sched = Scheduler::new();
        let a = make_task(&sched, 2);
        let b = make_task(&sched, 2);
        sched.select_active_task();
        assert_eq!(sched.active.get(), Some(a.0));

        sched.task_destroy(a);
        assert!(sched.active.get().is_none());

        let sp = sched.select_active_task();
        assert_eq!(sched.active.get(), Some(b.0));
        assert_eq!(sp, b.tcb().stack_pointer.get());
    }

    #[test]
    fn select_with_nothing_ready_reports_fatal() {
        let sched = Scheduler::new();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| sched.select_active_task()));
        assert!(result.is_err(), "an empty ready set has nowhere to schedule");
    }
}

// End of File
