// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error taxonomy. Nothing in this crate panics on a malformed packet or a
//! busy socket; failures are recovered locally within one `tick()` and
//! surfaced through these types or through return values (`ready()`,
//! `tick() -> bool`, `query() -> bool`).

/// Errors from the chip driver and socket handles.
///
/// `write`/`read`/`send` never appear here: backpressure (TX full, nothing
/// to RX) is reported as a short byte count, not an error, per spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Soft reset did not complete, or the post-reset MR sanity check
    /// (write/read back a few bit patterns) failed. Usually means the SPI
    /// wiring or chip select is wrong, or the chip isn't powered.
    ResetFailed,
    /// `open()` left the socket in a status other than the one the mode
    /// implies (`INIT` for TCP, `UDP` for UDP). No free hardware slot, or
    /// the chip didn't respond.
    OpenFailed,
    /// Socket index passed by the caller is outside `0..8`, or the slot is
    /// already held by a live handle.
    BadSocketIndex,
    /// Requested a per-socket buffer configuration whose TX (or RX) sizes
    /// sum to more than the chip's 16 KiB of TX (or RX) RAM.
    BadBufferPlan,
    /// The socket status register holds a value this driver doesn't
    /// recognize (not in the W5500 status enum).
    UnknownSocketStatus(u8),
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::ResetFailed => write!(f, "chip reset failed"),
            Error::OpenFailed => write!(f, "socket open failed"),
            Error::BadSocketIndex => write!(f, "bad or busy socket index"),
            Error::BadBufferPlan => write!(f, "invalid socket buffer plan"),
            Error::UnknownSocketStatus(s) => {
                write!(f, "unknown socket status {:#04x}", s)
            }
        }
    }
}
