//! Bit timing configuration.

use crate::{
    error::Error,
    regs::{Cnf1, Cnf2, Cnf3},
};

/// Speed the CAN bus is operating at.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "ufmt", derive(ufmt::derive::uDebug))]
pub enum CanSpeed {
    Kbps5,
    Kbps10,
    Kbps20,
    Kbps40,
    Kbps50,
    Kbps80,
    Kbps100,
    Kbps125,
    Kbps200,
    Kbps250,
    Kbps500,
    Kbps1000,
}

impl CanSpeed {
    pub const ALL: [Self; 12] = [
        Self::Kbps5,
        Self::Kbps10,
        Self::Kbps20,
        Self::Kbps40,
        Self::Kbps50,
        Self::Kbps80,
        Self::Kbps100,
        Self::Kbps125,
        Self::Kbps200,
        Self::Kbps250,
        Self::Kbps500,
        Self::Kbps1000,
    ];

    /// Bus speed in bit/s.
    pub const fn bps(self) -> u32 {
        match self {
            Self::Kbps5 => 5_000,
            Self::Kbps10 => 10_000,
            Self::Kbps20 => 20_000,
            Self::Kbps40 => 40_000,
            Self::Kbps50 => 50_000,
            Self::Kbps80 => 80_000,
            Self::Kbps100 => 100_000,
            Self::Kbps125 => 125_000,
            Self::Kbps200 => 200_000,
            Self::Kbps250 => 250_000,
            Self::Kbps500 => 500_000,
            Self::Kbps1000 => 1_000_000,
        }
    }

    /// Looks up a supported bus speed given in bit/s.
    pub fn from_bps(bps: u32) -> Option<Self> {
        Self::ALL.iter().copied().find(|speed| speed.bps() == bps)
    }
}

/// Speed the MCP2515 is operating at. Should match the crystal frequency
/// onboard.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "ufmt", derive(ufmt::derive::uDebug))]
pub enum McpSpeed {
    MHz8,
    MHz16,
}

impl McpSpeed {
    pub const ALL: [Self; 2] = [Self::MHz8, Self::MHz16];

    /// Oscillator frequency in Hz.
    pub const fn hz(self) -> u32 {
        match self {
            Self::MHz8 => 8_000_000,
            Self::MHz16 => 16_000_000,
        }
    }

    /// Looks up a supported oscillator frequency given in Hz.
    pub fn from_hz(hz: u32) -> Option<Self> {
        Self::ALL.iter().copied().find(|speed| speed.hz() == hz)
    }
}

// Rows follow `McpSpeed`, columns follow `CanSpeed`. Values are CNF1, CNF2, CNF3.
const TIMINGS: [[[u8; 3]; 12]; 2] = [
    // 8 MHz
    [
        [0x1F, 0xBF, 0x07], // 5 kbit/s
        [0x0F, 0xBF, 0x07], // 10 kbit/s
        [0x07, 0xBF, 0x07], // 20 kbit/s
        [0x03, 0xBF, 0x07], // 40 kbit/s
        [0x03, 0xB4, 0x06], // 50 kbit/s
        [0x01, 0xBF, 0x07], // 80 kbit/s
        [0x01, 0xB4, 0x06], // 100 kbit/s
        [0x01, 0xB1, 0x05], // 125 kbit/s
        [0x00, 0xB4, 0x06], // 200 kbit/s
        [0x00, 0xB1, 0x05], // 250 kbit/s
        [0x00, 0x90, 0x02], // 500 kbit/s
        [0x00, 0x80, 0x00], // 1000 kbit/s
    ],
    // 16 MHz
    [
        [0x3F, 0xFF, 0x87], // 5 kbit/s
        [0x1F, 0xFF, 0x87], // 10 kbit/s
        [0x0F, 0xFF, 0x87], // 20 kbit/s
        [0x07, 0xFF, 0x87], // 40 kbit/s
        [0x07, 0xFA, 0x87], // 50 kbit/s
        [0x03, 0xFF, 0x87], // 80 kbit/s
        [0x03, 0xFA, 0x87], // 100 kbit/s
        [0x03, 0xF0, 0x86], // 125 kbit/s
        [0x01, 0xFA, 0x87], // 200 kbit/s
        [0x41, 0xF1, 0x85], // 250 kbit/s
        [0x00, 0xF0, 0x86], // 500 kbit/s
        [0x00, 0xD0, 0x82], // 1000 kbit/s
    ],
];

/// An oscillator frequency / bus speed pair with no entry in the timing
/// table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct UnsupportedTiming {
    pub oscillator_hz: u32,
    pub bitrate: u32,
}

impl<SPIE, CSE> From<UnsupportedTiming> for Error<SPIE, CSE> {
    fn from(_: UnsupportedTiming) -> Self {
        Error::InvalidArgument
    }
}

/// Contents of the three bit timing registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BitTiming {
    pub cnf1: Cnf1,
    pub cnf2: Cnf2,
    pub cnf3: Cnf3,
}

impl BitTiming {
    /// Returns the register values for running the bus at `can_speed` from
    /// an oscillator of `mcp_speed`.
    pub const fn lookup(mcp_speed: McpSpeed, can_speed: CanSpeed) -> Self {
        let [cnf1, cnf2, cnf3] = TIMINGS[mcp_speed as usize][can_speed as usize];
        Self {
            cnf1: Cnf1::from_bytes([cnf1]),
            cnf2: Cnf2::from_bytes([cnf2]),
            cnf3: Cnf3::from_bytes([cnf3]),
        }
    }

    /// Like [`BitTiming::lookup`], for frequencies given in Hz and bit/s.
    pub fn for_frequencies(oscillator_hz: u32, bitrate: u32) -> Result<Self, UnsupportedTiming> {
        match (McpSpeed::from_hz(oscillator_hz), CanSpeed::from_bps(bitrate)) {
            (Some(mcp_speed), Some(can_speed)) => Ok(Self::lookup(mcp_speed, can_speed)),
            _ => Err(UnsupportedTiming {
                oscillator_hz,
                bitrate,
            }),
        }
    }

    /// Number of time quanta in one bit: sync segment, propagation segment
    /// and both phase segments.
    pub fn quanta_per_bit(&self) -> u32 {
        1 + u32::from(self.cnf2.prseg())
            + 1
            + u32::from(self.cnf2.phseg1())
            + 1
            + u32::from(self.cnf3.phseg2())
            + 1
    }

    /// Bus speed in bit/s these registers produce from an oscillator of
    /// `oscillator_hz`.
    pub fn bitrate(&self, oscillator_hz: u32) -> u32 {
        let tq_per_second = oscillator_hz / (2 * (u32::from(self.cnf1.brp()) + 1));
        tq_per_second / self.quanta_per_bit()
    }
}
