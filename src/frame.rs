//! CAN packet and its status.

use core::cell::Cell;

use bitflags::bitflags;
use critical_section::Mutex;
use embedded_hal::can::{Frame, Id};

bitflags! {
    /// Where a [`CanPacket`] is in its build / transmit / receive lifecycle.
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct PacketStatus: u16 {
        /// Packet is complete and immutable, ready for I/O.
        const BUILT = 1 << 0;
        /// Handed to the driver for transmission, outcome not yet known.
        const TX_PENDING = 1 << 1;
        /// Loaded into the hardware Tx buffer.
        const TX_WRITTEN = 1 << 2;
        /// Transmitted successfully.
        const TX_SENT = 1 << 3;
        /// Transmission failed with a bus error.
        const TX_ERROR = 1 << 4;
        /// Abort was requested by the application.
        const TX_ABORT_REQUESTED = 1 << 5;
        /// Transmission was aborted.
        const TX_ABORTED = 1 << 6;
        /// Received without error.
        const RX_OK = 1 << 7;
        /// Received in listen mode while the receive error counter advanced.
        const RX_INVALID = 1 << 8;

        /// Terminal transmit states.
        const TX_DONE = Self::TX_SENT.bits | Self::TX_ERROR.bits | Self::TX_ABORTED.bits;
        /// Terminal receive states.
        const RX_DONE = Self::RX_OK.bits | Self::RX_INVALID.bits;
    }
}

/// CAN packet.
///
/// The identifier and payload are fixed once the packet is built. The status
/// may be updated by the driver from interrupt context while the application
/// holds a shared reference, and so lives behind a critical section.
pub struct CanPacket {
    /// ID of CAN packet.
    pub(crate) id: Id,
    /// Whether the packet is an RTR packet.
    pub(crate) rtr: bool,
    /// Length of data in CAN packet.
    pub(crate) dlc: u8,
    /// Data, maximum 8 bytes.
    pub(crate) data: [u8; 8],
    /// Bytes appended so far while building.
    len: u8,
    status: Mutex<Cell<PacketStatus>>,
}

impl CanPacket {
    /// Starts building a data packet. Append data with
    /// [`CanPacket::write_data`], then finish with [`CanPacket::end`].
    pub fn begin(id: impl Into<Id>) -> Self {
        CanPacket {
            id: id.into(),
            rtr: false,
            dlc: 0,
            data: [0; 8],
            len: 0,
            status: Mutex::new(Cell::new(PacketStatus::empty())),
        }
    }

    /// Starts building a remote frame requesting `dlc` bytes.
    pub fn begin_remote(id: impl Into<Id>, dlc: u8) -> Option<Self> {
        if dlc > 8 {
            return None;
        }
        let mut packet = Self::begin(id);
        packet.rtr = true;
        packet.dlc = dlc;
        Some(packet)
    }

    /// Appends one data byte. Returns `false` if the packet is already built,
    /// is a remote frame, or already holds 8 bytes.
    pub fn write_data(&mut self, byte: u8) -> bool {
        if self.is_built() || self.rtr || self.len >= 8 {
            return false;
        }
        self.data[self.len as usize] = byte;
        self.len += 1;
        self.dlc = self.len;
        true
    }

    /// Marks the packet as built. It can no longer be changed.
    pub fn end(&mut self) {
        let status = self.status.get_mut();
        status.set(status.get() | PacketStatus::BUILT);
    }

    /// Whether [`CanPacket::end`] has been called.
    pub fn is_built(&self) -> bool {
        self.status().contains(PacketStatus::BUILT)
    }

    /// Current status.
    pub fn status(&self) -> PacketStatus {
        critical_section::with(|cs| self.status.borrow(cs).get())
    }

    /// Replaces the status. Clearing the pending/sent/error bits before
    /// resending a packet is up to the caller.
    pub fn set_status(&self, status: PacketStatus) {
        critical_section::with(|cs| self.status.borrow(cs).set(status));
    }

    /// Applies `f` to the status atomically and returns the new status.
    pub(crate) fn update_status(&self, f: impl FnOnce(PacketStatus) -> PacketStatus) -> PacketStatus {
        critical_section::with(|cs| {
            let cell = self.status.borrow(cs);
            let status = f(cell.get());
            cell.set(status);
            status
        })
    }
}

impl core::fmt::Debug for CanPacket {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CanPacket")
            .field("id", &self.id)
            .field("rtr", &self.rtr)
            .field("dlc", &self.dlc)
            .field("data", &self.data())
            .field("status", &self.status())
            .finish()
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for CanPacket {
    fn format(&self, fmt: defmt::Formatter) {
        // [`Id`] does not implement `defmt::Format`
        #[derive(defmt::Format)]
        enum InnerId {
            Standard(u16),
            Extended(u32),
        }

        defmt::write!(
            fmt,
            "CanPacket {{ id: {:#X}, rtr: {}, dlc: {:#X}, data: {:#X}, status: {} }}",
            match self.id {
                Id::Standard(id) => InnerId::Standard(id.as_raw()),
                Id::Extended(id) => InnerId::Extended(id.as_raw()),
            },
            self.rtr,
            self.dlc,
            self.data(),
            self.status()
        );
    }
}

impl Frame for CanPacket {
    /// Creates a built data packet.
    fn new(id: impl Into<Id>, data: &[u8]) -> Option<Self> {
        if data.len() > 8 {
            return None;
        }
        let mut packet = Self::begin(id);
        for byte in data {
            packet.write_data(*byte);
        }
        packet.end();
        Some(packet)
    }

    /// Creates a built remote packet.
    fn new_remote(id: impl Into<Id>, dlc: usize) -> Option<Self> {
        if dlc > 8 {
            return None;
        }
        let mut packet = Self::begin_remote(id, dlc as u8)?;
        packet.end();
        Some(packet)
    }

    #[inline]
    fn is_extended(&self) -> bool {
        matches!(self.id, Id::Extended(_))
    }

    #[inline]
    fn is_remote_frame(&self) -> bool {
        self.rtr
    }

    #[inline]
    fn id(&self) -> Id {
        self.id
    }

    #[inline]
    fn dlc(&self) -> usize {
        self.dlc as usize
    }

    #[inline]
    fn data(&self) -> &[u8] {
        if self.rtr {
            &[]
        } else {
            &self.data[..self.dlc()]
        }
    }
}
