//! Shared boot plumbing for the demo firmware images: clock setup and a
//! helper that builds the peripherals the kernel needs to start.
//!
//! The panic handler, `HardFault` handler and `defmt::timestamp!` are
//! already provided by `kernel` itself (see `kernel/src/lib.rs`), so unlike
//! `pets`' `examples` crate this one doesn't need to define its own.

// Copyright (c) 2025 Ferrous Systems
// SPDX-License-Identifier: GPL-3.0-or-later

#![no_std]

use defmt_semihosting as _;

/// Take the core peripherals, start the kernel's heap, and hand back the
/// `SYST` peripheral ready for [`kernel::rtos_start`].
///
/// `heap: &'static mut [u8]` becomes the kernel's dynamic allocation arena
/// (task TCBs, stacks not supplied by the caller, semaphores).
pub fn board_init(heap: &'static mut [u8]) -> cortex_m::peripheral::SYST {
    let cp = cortex_m::Peripherals::take().expect("peripherals already taken");
    // SAFETY: `heap` is `'static` and handed to us exclusively by the
    // caller; nothing else uses this memory.
    unsafe { kernel::init_heap(heap.as_mut_ptr(), heap.len()) };
    cp.SYST
}

// End of File
