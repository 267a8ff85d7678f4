//! Peripheral collaborators the kernel's public interface assumes exist:
//! GPIO, UART (backed by a ring buffer), the clock tree, and vectored
//! peripheral interrupt dispatch. None of this is part of the scheduler's
//! contract (spec.md §1 Non-goal: "peripheral drivers beyond the minimum
//! needed to demo the scheduler"); it exists so `demos/` has something to
//! drive.

// Copyright (c) 2025 Ferrous Systems
// SPDX-License-Identifier: GPL-3.0-or-later

#![no_std]

pub mod clock;
pub mod gpio;
pub mod irq;
pub mod ringbuf;
pub mod uart;

// End of File
