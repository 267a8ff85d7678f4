//! Binary and counting semaphores (spec.md §4.7)

// Copyright (c) 2025 Ferrous Systems
// SPDX-License-Identifier: GPL-3.0-or-later

use core::cell::{Cell, UnsafeCell};
use core::ptr::NonNull;
use core::sync::atomic::{AtomicU8, Ordering};

use alloc::boxed::Box;

use crate::arch::{Arch, Current};
use crate::error::{PendOutcome, SysError};
use crate::list::{is_linked, Link, Linked, List};
use crate::scheduler::{Scheduler, TaskHandle};

const UNLOCKED: u8 = 0x00;
const LOCKED: u8 = 0xFF;

/// How long [`semaphore_pend`] should wait for a unit to become available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub enum Timeout {
    /// Try once, return immediately if no unit is available.
    Immediate,
    /// Wait up to this many system ticks.
    Ticks(u32),
    /// Wait forever.
    Infinite,
}

/// Whether a semaphore saturates at one unit or counts arbitrarily high.
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
enum SemaphoreKind {
    Binary,
    Counting,
}

struct WaitingEntry {
    task: TaskHandle,
    /// `None` for an infinite wait; `Some(_)` for a finite one. Used by
    /// [`semaphore_post`] to decide whether the waiter is sleeping on the
    /// blocked list or the delayed list.
    finite_wait: Option<u32>,
    link: Link<WaitingEntry>,
}

unsafe impl Linked for WaitingEntry {
    fn link(&self) -> &Link<Self> {
        &self.link
    }
}

/// A counting or binary semaphore.
///
/// The value and waiting list are guarded by a hand-rolled exclusive lock
/// (`lock`, compare-and-swapped the way the source's LDREXB/STREXB pair
/// does) rather than [`Arch::critical_section`], since a semaphore may be
/// posted from a task while another task's pend is mid-flight; masking
/// every interrupt for the whole pend/post body would be needlessly
/// heavy-handed compared to a short spin over just this object's state.
pub struct Semaphore {
    lock: AtomicU8,
    value: Cell<u32>,
    kind: SemaphoreKind,
    waiting: UnsafeCell<List<WaitingEntry>>,
}

unsafe impl Sync for Semaphore {}

impl Semaphore {
    fn lock(&self) {
        while self
            .lock
            .compare_exchange_weak(UNLOCKED, LOCKED, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            core::hint::spin_loop();
        }
    }

    fn unlock(&self) {
        self.lock.store(UNLOCKED, Ordering::Release);
    }

    fn waiting(&self) -> &mut List<WaitingEntry> {
        // SAFETY: only accessed while `lock` is held.
        unsafe { &mut *self.waiting.get() }
    }
}

/// An opaque handle to a created semaphore.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct SemaphoreHandle(NonNull<Semaphore>);

unsafe impl Send for SemaphoreHandle {}

impl SemaphoreHandle {
    fn inner(&self) -> &Semaphore {
        // SAFETY: the pointee is only freed by `semaphore_destroy`, which
        // consumes the handle.
        unsafe { self.0.as_ref() }
    }
}

fn create(kind: SemaphoreKind, initial_value: u32) -> Result<SemaphoreHandle, SysError> {
    let sem = Box::new(Semaphore {
        lock: AtomicU8::new(UNLOCKED),
        value: Cell::new(initial_value),
        kind,
        waiting: UnsafeCell::new(List::new()),
    });
    Ok(SemaphoreHandle(NonNull::from(Box::leak(sem))))
}

/// Create a counting semaphore with the given initial value.
pub fn semaphore_create_counting(initial_value: u32) -> Result<SemaphoreHandle, SysError> {
    create(SemaphoreKind::Counting, initial_value)
}

/// Create a binary semaphore, initially available or not.
pub fn semaphore_create_binary(initially_available: bool) -> Result<SemaphoreHandle, SysError> {
    create(SemaphoreKind::Binary, initially_available as u32)
}

/// Acquire one unit of `sem`, waiting according to `timeout` if none is
/// immediately available.
pub fn semaphore_pend(sem: SemaphoreHandle, timeout: Timeout) -> PendOutcome {
    let sem = sem.inner();

    loop {
        sem.lock();
        if sem.value.get() > 0 {
            sem.value.set(sem.value.get() - 1);
            sem.unlock();
            return PendOutcome::Acquired;
        }

        match timeout {
            Timeout::Immediate => {
                sem.unlock();
                return PendOutcome::TimedOut;
            }
            Timeout::Infinite => {
                let Some(active) = Scheduler::get().active_task() else {
                    sem.unlock();
                    return PendOutcome::TimedOut;
                };
                let entry = NonNull::from(Box::leak(Box::new(WaitingEntry {
                    task: active,
                    finite_wait: None,
                    link: Link::new(),
                })));
                unsafe { sem.waiting().append(entry) };
                sem.unlock();

                // Woken only by `semaphore_post`, which has already
                // unlinked us from the waiting list.
                Scheduler::get().block_active_task();
                unsafe { drop(Box::from_raw(entry.as_ptr())) };
                // Retry: the unit we were signalled for may have been
                // stolen by a task that never waited at all.
                continue;
            }
            Timeout::Ticks(ticks) => {
                let Some(active) = Scheduler::get().active_task() else {
                    sem.unlock();
                    return PendOutcome::TimedOut;
                };
                let entry = NonNull::from(Box::leak(Box::new(WaitingEntry {
                    task: active,
                    finite_wait: Some(ticks),
                    link: Link::new(),
                })));
                unsafe { sem.waiting().append(entry) };
                sem.unlock();

                Scheduler::get().task_delay(ticks);

                // If we're still linked, nobody posted before our delay
                // expired: self-remove and report the timeout. If we're
                // no longer linked, `semaphore_post` already unlinked us
                // early and woke us - make exactly one further attempt to
                // acquire before giving up, per the single-decrement
                // design (no repeated, shrinking waits).
                let timed_out = Current::critical_section(|| {
                    if unsafe { is_linked(entry) } {
                        unsafe { sem.waiting().remove(entry) };
                        true
                    } else {
                        false
                    }
                });
                unsafe { drop(Box::from_raw(entry.as_ptr())) };

                if timed_out {
                    return PendOutcome::TimedOut;
                }

                sem.lock();
                if sem.value.get() > 0 {
                    sem.value.set(sem.value.get() - 1);
                    sem.unlock();
                    return PendOutcome::Acquired;
                }
                sem.unlock();
                return PendOutcome::TimedOut;
            }
        }
    }
}

/// Release one unit of `sem`, waking the oldest waiter (if any). A post to
/// an already-signalled binary semaphore is a no-op.
pub fn semaphore_post(sem: SemaphoreHandle) {
    let sem = sem.inner();
    sem.lock();
    if sem.kind == SemaphoreKind::Binary && sem.value.get() >= 1 {
        sem.unlock();
        return;
    }
    sem.value.set(sem.value.get() + 1);
    let woken = sem.waiting().pop_front();
    sem.unlock();

    if let Some(entry) = woken {
        let entry = unsafe { entry.as_ref() };
        match entry.finite_wait {
            None => Scheduler::get().unblock_task(entry.task),
            Some(_) => Scheduler::get().unblock_delayed_task(entry.task),
        }
    }
}

/// Destroy `sem`. Fails with [`SysError::BadParam`] if any task is still
/// waiting on it.
pub fn semaphore_destroy(sem: SemaphoreHandle) -> Result<(), SysError> {
    let inner = sem.inner();
    inner.lock();
    let empty = inner.waiting().is_empty();
    inner.unlock();
    if !empty {
        return Err(SysError::BadParam);
    }
    // SAFETY: no task holds a reference into the waiting list (it's
    // empty), and the caller is giving up its only handle.
    unsafe { drop(Box::from_raw(sem.0.as_ptr())) };
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskConfig;
    use std::sync::Mutex;

    // `semaphore_pend`/`semaphore_post` go through the real global
    // `SCHEDULER` singleton (they have no way to take a local instance),
    // so unlike `scheduler`'s own tests these cannot just build a fresh
    // `Scheduler`. Serialize them against each other and wipe the
    // singleton clean on the way in instead.
    static TEST_LOCK: Mutex<()> = Mutex::new(());

    fn reset() -> std::sync::MutexGuard<'static, ()> {
        let guard = TEST_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        Scheduler::get().reset_for_test();
        guard
    }

    fn spawn_active_task(priority: u8) -> TaskHandle {
        let sched = Scheduler::get();
        let handle = sched
            .task_create(0, 0, 0, TaskConfig { priority, name: "t", ..Default::default() })
            .unwrap();
        sched.select_active_task();
        handle
    }

    #[test]
    fn immediate_pend_without_a_unit_times_out() {
        let _g = reset();
        let sem = semaphore_create_counting(0).unwrap();
        assert_eq!(semaphore_pend(sem, Timeout::Immediate), PendOutcome::TimedOut);
        semaphore_destroy(sem).unwrap();
    }

    #[test]
    fn counting_semaphore_tracks_multiple_units() {
        let _g = reset();
        let sem = semaphore_create_counting(0).unwrap();
        semaphore_post(sem);
        semaphore_post(sem);
        assert_eq!(semaphore_pend(sem, Timeout::Immediate), PendOutcome::Acquired);
        assert_eq!(semaphore_pend(sem, Timeout::Immediate), PendOutcome::Acquired);
        assert_eq!(semaphore_pend(sem, Timeout::Immediate), PendOutcome::TimedOut);
        semaphore_destroy(sem).unwrap();
    }

    #[test]
    fn binary_semaphore_saturates_at_one_unit() {
        let _g = reset();
        let sem = semaphore_create_binary(false).unwrap();
        semaphore_post(sem);
        semaphore_post(sem); // already signalled: a no-op, not a second unit
        assert_eq!(semaphore_pend(sem, Timeout::Immediate), PendOutcome::Acquired);
        assert_eq!(semaphore_pend(sem, Timeout::Immediate), PendOutcome::TimedOut);
        semaphore_destroy(sem).unwrap();
    }

    #[test]
    fn binary_semaphore_created_available_can_be_pended_once() {
        let _g = reset();
        let sem = semaphore_create_binary(true).unwrap();
        assert_eq!(semaphore_pend(sem, Timeout::Immediate), PendOutcome::Acquired);
        assert_eq!(semaphore_pend(sem, Timeout::Immediate), PendOutcome::TimedOut);
        semaphore_destroy(sem).unwrap();
    }

    #[test]
    fn finite_pend_with_no_active_task_times_out_without_queueing() {
        let _g = reset();
        // Before the scheduler has started there is no active task to
        // block; a finite or infinite pend must degrade to an immediate
        // failure rather than queue a waiter nobody will ever wake.
        let sem = semaphore_create_counting(0).unwrap();
        assert_eq!(semaphore_pend(sem, Timeout::Ticks(10)), PendOutcome::TimedOut);
        assert_eq!(semaphore_pend(sem, Timeout::Infinite), PendOutcome::TimedOut);
        semaphore_destroy(sem).unwrap();
    }

    #[test]
    fn finite_pend_that_times_out_leaves_the_unit_alone() {
        let _g = reset();
        spawn_active_task(2);
        let sem = semaphore_create_counting(0).unwrap();
        // Nothing ever posts, so this waits out its timeout and reports
        // it; the value must be untouched for the next pender.
        assert_eq!(semaphore_pend(sem, Timeout::Ticks(3)), PendOutcome::TimedOut);
        assert_eq!(sem.inner().value.get(), 0);
        semaphore_destroy(sem).unwrap();
    }

    #[test]
    fn destroy_fails_while_a_waiter_is_queued() {
        let _g = reset();
        let waiter = spawn_active_task(1);
        let sem = semaphore_create_counting(0).unwrap();
        let entry = NonNull::from(Box::leak(Box::new(WaitingEntry {
            task: waiter,
            finite_wait: None,
            link: Link::new(),
        })));
        unsafe { sem.inner().waiting().append(entry) };

        assert_eq!(semaphore_destroy(sem), Err(SysError::BadParam));

        unsafe { sem.inner().waiting().remove(entry) };
        unsafe { drop(Box::from_raw(entry.as_ptr())) };
        assert!(semaphore_destroy(sem).is_ok());
    }
}

// End of File
