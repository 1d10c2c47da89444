//! CAN identifier codec.
//!
//! Every identifier the MCP2515 deals with (Tx buffers, Rx buffers, filters
//! and masks) occupies the same four registers, `SIDH`, `SIDL`, `EID8` and
//! `EID0`:
//!
//! ```text
//!  SIDH   SID10 SID9 SID8 SID7 SID6 SID5 SID4 SID3
//!  SIDL   SID2  SID1 SID0 SRR  EXIDE  -  EID17 EID16
//!  EID8   EID15 ..                              EID8
//!  EID0   EID7  ..                              EID0
//! ```
//!
//! Standard identifiers live entirely in `SID`. Extended identifiers put
//! their upper 11 bits into `SID` and their lower 18 bits into `EID`.

use embedded_hal::can::{ExtendedId, Id, StandardId};
use modular_bitfield::prelude::*;

/// Remote transmission request bit of the `DLC` register.
pub const DLC_RTR: u8 = 0b0100_0000;

/// Data length bits of the `DLC` register.
pub const DLC_MASK: u8 = 0b0000_1111;

/// The four identifier registers, concatenated `EID0` (LSB) to `SIDH` (MSB).
#[bitfield]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct IdRegs {
    /// Extended identifier, lower 18 bits of a 29 bit identifier.
    pub eid: B18,
    #[skip]
    __: B1,
    /// Extended identifier enable.
    pub exide: bool,
    /// Standard remote transmission request. Only meaningful for received
    /// standard frames.
    pub srr: bool,
    /// Standard identifier, or upper 11 bits of an extended identifier.
    pub sid: B11,
}

/// Identifier, format and RTR flag of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdHeader {
    pub id: Id,
    pub rtr: bool,
}

impl IdHeader {
    pub const fn new(id: Id, rtr: bool) -> Self {
        Self { id, rtr }
    }

    /// Header used to program filters and masks, which know nothing of RTR.
    pub const fn from_id(id: Id) -> Self {
        Self { id, rtr: false }
    }

    /// Returns `true` for 29 bit identifiers.
    pub fn is_extended(&self) -> bool {
        matches!(self.id, Id::Extended(_))
    }

    /// Encodes the identifier into `[SIDH, SIDL, EID8, EID0]`.
    ///
    /// For standard remote frames the `SRR` bit is set as well; it is
    /// unimplemented in the Tx buffers and is what the Rx buffers report.
    pub fn to_registers(&self) -> [u8; 4] {
        let regs = match self.id {
            Id::Standard(id) => IdRegs::new()
                .with_exide(false)
                .with_srr(self.rtr)
                .with_eid(0)
                .with_sid(id.as_raw()),
            Id::Extended(id) => IdRegs::new()
                .with_exide(true)
                .with_eid(id.as_raw() & 0x3FFFF) // Lower 18 bits go into EID
                .with_sid((id.as_raw() >> 18) as u16), // Upper 11 bits go into SID
        };
        let [eid0, eid8, sidl, sidh] = regs.into_bytes();
        [sidh, sidl, eid8, eid0]
    }

    /// Encodes the `DLC` register: data length plus the RTR bit.
    pub fn dlc_register(&self, dlc: u8) -> u8 {
        let dlc = dlc & DLC_MASK;
        if self.rtr {
            dlc | DLC_RTR
        } else {
            dlc
        }
    }

    /// Decodes `[SIDH, SIDL, EID8, EID0]` and the `DLC` register of a receive
    /// buffer.
    pub fn from_registers(regs: [u8; 4], dlc: u8) -> Self {
        let [sidh, sidl, eid8, eid0] = regs;
        let regs = IdRegs::from_bytes([eid0, eid8, sidl, sidh]);
        if regs.exide() {
            let raw = (u32::from(regs.sid()) << 18) | regs.eid();
            // 11 + 18 bits always fit
            let id = ExtendedId::new(raw).unwrap_or(ExtendedId::ZERO);
            Self::new(Id::Extended(id), dlc & DLC_RTR != 0)
        } else {
            let id = StandardId::new(regs.sid()).unwrap_or(StandardId::ZERO);
            Self::new(Id::Standard(id), regs.srr())
        }
    }
}
