//! Minimal clock-tree surface: the core clock frequency `kernel::rtos_start`
//! needs to compute its SysTick reload value (spec.md §6).
//!
//! `examples/original_source/rtos/drivers/clock/clock.c` drives the full
//! STM32L4 clock tree (MSI/HSI16/PLL selection, flash wait states, AHB/APB
//! prescalers) - out of scope here per `SPEC_FULL.md`: this crate only
//! tracks the number the kernel actually consumes, set once by whatever
//! firmware image configured the real clock tree.

// Copyright (c) 2025 Ferrous Systems
// SPDX-License-Identifier: GPL-3.0-or-later

use core::sync::atomic::{AtomicU32, Ordering};

/// STM32L4 reset-state HCLK: MSI at its default 4 MHz, no prescaling.
const RESET_HCLK_HZ: u32 = 4_000_000;

static HCLK_HZ: AtomicU32 = AtomicU32::new(RESET_HCLK_HZ);

/// Record the core clock frequency after configuring the clock tree.
///
/// Firmware that reconfigures MSI/PLL/prescalers must call this with the
/// resulting HCLK frequency before calling [`kernel::rtos_start`].
pub fn set_hclk_freq(hz: u32) {
    HCLK_HZ.store(hz, Ordering::Relaxed);
}

/// The core clock frequency, in Hz.
pub fn hclk_freq() -> u32 {
    HCLK_HZ.load(Ordering::Relaxed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_reset_state_msi_frequency() {
        assert_eq!(hclk_freq(), RESET_HCLK_HZ);
    }

    #[test]
    fn set_hclk_freq_round_trips() {
        set_hclk_freq(80_000_000);
        assert_eq!(hclk_freq(), 80_000_000);
        set_hclk_freq(RESET_HCLK_HZ);
    }
}

// End of File
