// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The capability interface the driver needs from the host: a millisecond
//! clock, a PRNG, a full-duplex SPI byte transfer, chip-select control, a
//! latched interrupt flag, and a logging sink. Everything above this layer
//! (the chip driver, socket handles, protocol clients) is generic over `Bus`
//! and never touches hardware directly.

/// Capability set a caller must implement to drive a [`crate::W5500`].
///
/// `spi_xfer` is expected to complete in microseconds; it is the only
/// blocking point in the whole stack. Nothing here returns a `Result`: a
/// stuck or absent SPI peripheral is a platform-level failure the driver has
/// no way to recover from, and belongs to the bus implementation (which can
/// choose to panic, reset, or loop forever, as the platform demands).
pub trait Bus {
    /// Monotonic milliseconds since some fixed epoch.
    fn millis(&self) -> u64;

    /// Pseudo-random 64 bits. Used to seed and advance DHCP transaction IDs.
    /// Implementations needing real entropy should override this; the
    /// default provided by [`Lfsr64`] has no entropy at power-on beyond
    /// whatever `millis()` returns.
    fn random(&mut self) -> u64;

    /// Full-duplex single-byte transfer. Blocks until complete.
    fn spi_xfer(&mut self, tx: u8) -> u8;

    /// Bulk transfer built on `spi_xfer`. If `tx` is `None`, zeros are sent;
    /// if `rx` is `None`, received bytes are discarded. Provided so callers
    /// don't have to hand-roll the loop, but platforms with DMA or burst
    /// transfer support should override it.
    fn spi_xfer_bulk(&mut self, tx: Option<&[u8]>, mut rx: Option<&mut [u8]>) {
        let len = match (tx, rx.as_ref()) {
            (Some(t), Some(r)) => {
                debug_assert_eq!(t.len(), r.len());
                t.len()
            }
            (Some(t), None) => t.len(),
            (None, Some(r)) => r.len(),
            (None, None) => return,
        };
        for i in 0..len {
            let send = tx.map(|t| t[i]).unwrap_or(0);
            let recv = self.spi_xfer(send);
            if let Some(r) = rx.as_deref_mut() {
                r[i] = recv;
            }
        }
    }

    fn chip_select(&mut self);
    fn chip_deselect(&mut self);

    /// Called from an ISR to latch a pending-interrupt flag. Not used by the
    /// driver itself (which only reads/clears the flag); provided so a
    /// platform's interrupt handler has something to call through the same
    /// object it passed in to the driver.
    fn trigger_interrupt(&mut self);

    /// True if `trigger_interrupt` has been called since the last
    /// `clear_pending_interrupt`.
    fn has_pending_interrupt(&self) -> bool;

    /// Acknowledge the latched interrupt flag.
    fn clear_pending_interrupt(&mut self);

    /// Diagnostic sink. No-op by default.
    #[allow(unused_variables)]
    fn log(&mut self, args: core::fmt::Arguments<'_>) {}
}

/// Write a formatted message through a [`Bus`]'s logging sink, in the same
/// `sys_log!`-style call-site shape as other embedded Hubris drivers.
#[macro_export]
macro_rules! w5500_log {
    ($bus:expr, $($arg:tt)*) => {
        $bus.log(core::format_args!($($arg)*))
    };
}

/// 64-bit Galois LFSR, the fallback PRNG when a platform has no true entropy
/// source. Seed from `Bus::millis()` at construction; replace `Bus::random`
/// with a hardware RNG when one is available — this sequence is fully
/// determined by the millisecond clock at boot and gives essentially zero
/// entropy at power-on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Lfsr64 {
    state: u64,
}

impl Lfsr64 {
    const TAPS: u64 = 0xD800000000000000;

    /// `seed` of zero is remapped to a fixed nonzero value: an all-zero
    /// state is a fixed point of the shift register and would never advance.
    pub fn new(seed: u64) -> Self {
        Self {
            state: if seed == 0 { 0xACE1_ACE1_ACE1_ACE1 } else { seed },
        }
    }

    pub fn next(&mut self) -> u64 {
        let lsb = self.state & 1;
        self.state >>= 1;
        if lsb == 1 {
            self.state ^= Self::TAPS;
        }
        self.state
    }
}
