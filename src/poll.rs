//! Blocking policy for operations that wait on the MCP2515.

use core::sync::atomic::{AtomicBool, Ordering};

use embedded_time::duration::Milliseconds;

/// Poll interval of blocking operations, in microseconds.
pub const POLL_INTERVAL_US: u16 = 10;

/// How long an operation may wait for the hardware.
///
/// ```
/// # use core::sync::atomic::AtomicBool;
/// # use mcp2515_nb::poll::Wait;
/// static CANCEL: AtomicBool = AtomicBool::new(false);
///
/// let wait = Wait::timeout_ms(50).cancelled_by(&CANCEL);
/// assert!(wait.is_blocking());
/// ```
#[derive(Debug, Clone, Copy)]
pub enum Wait<'c> {
    /// Check once and return [`Error::TryAgain`](crate::error::Error::TryAgain)
    /// if the outcome is not known yet.
    NoWait,
    /// Poll until the outcome is known.
    Block {
        /// Give up with `TryAgain` after this long. `None` waits forever.
        timeout: Option<Milliseconds<u32>>,
        /// Give up with `TryAgain` as soon as this flag is raised.
        cancel: Option<&'c AtomicBool>,
    },
}

impl<'c> Wait<'c> {
    /// Block until the outcome is known.
    pub const FOREVER: Wait<'static> = Wait::Block {
        timeout: None,
        cancel: None,
    };

    /// Block for at most `ms` milliseconds. `0` waits forever.
    pub const fn timeout_ms(ms: u32) -> Self {
        Wait::Block {
            timeout: if ms == 0 {
                None
            } else {
                Some(Milliseconds(ms))
            },
            cancel: None,
        }
    }

    /// Adds a cancellation flag. Has no effect on [`Wait::NoWait`].
    pub fn cancelled_by(self, flag: &'c AtomicBool) -> Self {
        match self {
            Wait::NoWait => Wait::NoWait,
            Wait::Block { timeout, .. } => Wait::Block {
                timeout,
                cancel: Some(flag),
            },
        }
    }

    pub const fn is_blocking(&self) -> bool {
        matches!(self, Wait::Block { .. })
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        match self {
            Wait::Block {
                cancel: Some(flag), ..
            } => flag.load(Ordering::Acquire),
            _ => false,
        }
    }

    pub(crate) fn timeout(&self) -> Option<Milliseconds<u32>> {
        match self {
            Wait::Block { timeout, .. } => *timeout,
            Wait::NoWait => None,
        }
    }
}

impl From<bool> for Wait<'static> {
    /// `true` means "do not wait", matching the `nowait` flag of the
    /// transmit calls.
    fn from(nowait: bool) -> Self {
        if nowait {
            Wait::NoWait
        } else {
            Wait::FOREVER
        }
    }
}
