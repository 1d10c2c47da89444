use core::fmt::Debug;

use embedded_hal::can::ErrorKind;

pub type Result<T, SPIE, CSE> = core::result::Result<T, Error<SPIE, CSE>>;

/// Errors reported by the MCP2515 driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<SPIE, CSE> {
    /// SPI transfer failed.
    Spi(SPIE),
    /// Chip-select pin could not be driven.
    Hal(CSE),
    /// The monotonic clock could not be read or a deadline overflowed.
    Clock,
    /// The operation would block. Retry later or treat the result as deferred.
    TryAgain,
    /// Packet in the wrong state, or an unsupported configuration.
    InvalidArgument,
    /// The MCP2515 did not acknowledge a requested register state.
    BadState,
    /// The transmit buffer is occupied.
    Busy,
    /// The asynchronous transmit queue is full.
    Overflow,
    /// Operation not permitted in the current operating mode.
    WrongMode,
    /// The transmission was aborted.
    Interrupted,
    /// No received packet pending.
    NotFound,
}

impl<SPIE, CSE> From<embedded_time::clock::Error> for Error<SPIE, CSE> {
    fn from(_error: embedded_time::clock::Error) -> Self {
        Error::Clock
    }
}

impl<SPIE: Debug, CSE: Debug> embedded_hal::can::Error for Error<SPIE, CSE> {
    fn kind(&self) -> ErrorKind {
        match self {
            Error::Overflow => ErrorKind::Overrun,
            _ => ErrorKind::Other,
        }
    }
}
