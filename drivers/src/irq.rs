//! Vectored peripheral interrupt dispatch.
//!
//! Grounded on `examples/original_source/rtos/sys/isr/isr.c`'s
//! `exception_handlers` table plus `enable_irq`/`disable_irq`: a fixed-size
//! table of optional handler functions, indexed by IRQ number, backing a
//! single default ISR that looks up and calls whichever handler is
//! installed. Unlike PendSV/SysTick (handled directly by `kernel`), these
//! are the ordinary peripheral interrupts spec.md §6 names as
//! `enable_irq(n, handler)`/`disable_irq(n)`.

// Copyright (c) 2025 Ferrous Systems
// SPDX-License-Identifier: GPL-3.0-or-later

use core::cell::Cell;

use cortex_m::peripheral::NVIC;

/// Number of external interrupt lines on the STM32L433's NVIC.
const NUM_IRQS: usize = 84;

/// A peripheral interrupt handler, called from interrupt context.
pub type IrqHandler = fn();

struct HandlerTable {
    handlers: [Cell<Option<IrqHandler>>; NUM_IRQS],
}

// SAFETY: every mutation goes through `cortex_m::interrupt::free`, and this
// is a single-core target.
unsafe impl Sync for HandlerTable {}

static TABLE: HandlerTable = HandlerTable {
    handlers: [const { Cell::new(None) }; NUM_IRQS],
};

/// Wraps a raw IRQ number so it can be passed to [`NVIC::mask`]/[`NVIC::unmask`].
#[derive(Clone, Copy)]
struct Irq(u8);

// SAFETY: `number()` returns exactly the raw IRQ number this type was built
// from, which the caller of `enable_irq`/`disable_irq` is responsible for
// keeping within range for the target part.
unsafe impl cortex_m::interrupt::InterruptNumber for Irq {
    fn number(self) -> u16 {
        self.0 as u16
    }
}

/// Install `handler` for IRQ `num` and unmask it in the NVIC.
///
/// # Panics
/// If `num` is out of range for [`NUM_IRQS`].
pub fn enable_irq(num: u8, handler: IrqHandler) {
    assert!((num as usize) < NUM_IRQS);
    cortex_m::interrupt::free(|_cs| {
        TABLE.handlers[num as usize].set(Some(handler));
        // SAFETY: unmasking an interrupt is safe as long as its handler
        // (installed just above) is ready to run, which it now is.
        unsafe { NVIC::unmask(Irq(num)) };
    });
}

/// Mask IRQ `num` in the NVIC and remove its handler.
pub fn disable_irq(num: u8) {
    assert!((num as usize) < NUM_IRQS);
    cortex_m::interrupt::free(|_cs| {
        NVIC::mask(Irq(num));
        TABLE.handlers[num as usize].set(None);
    });
}

/// Look up and call the handler installed for IRQ `num`, if any. Call this
/// from the vector table entry for every dynamically-dispatched IRQ.
pub fn dispatch(num: u8) {
    if let Some(handler) = TABLE.handlers.get(num as usize).and_then(Cell::get) {
        handler();
    }
}

// End of File
