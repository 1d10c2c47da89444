use crate::regs::{CanIntf, Register};

crate::reg_block_def! {
    /// Transmit buffer.
    TxBuf(5) => {
        /// Tx buffer 0.
        B0 => [Register::TXB0SIDH, Register::TXB0SIDL, Register::TXB0EID8, Register::TXB0EID0, Register::TXB0DLC],
        /// Tx buffer 1.
        B1 => [Register::TXB1SIDH, Register::TXB1SIDL, Register::TXB1EID8, Register::TXB1EID0, Register::TXB1DLC],
        /// Tx buffer 2.
        B2 => [Register::TXB2SIDH, Register::TXB2SIDL, Register::TXB2EID8, Register::TXB2EID0, Register::TXB2DLC]
    }
}

impl TxBuf {
    /// Returns the `CTRL` register for the selected Tx buffer.
    pub const fn ctrl(self) -> Register {
        match self {
            TxBuf::B0 => Register::TXB0CTRL,
            TxBuf::B1 => Register::TXB1CTRL,
            TxBuf::B2 => Register::TXB2CTRL,
        }
    }

    /// `LOAD TX BUFFER` instruction starting at the first data byte.
    pub const fn load_data_instruction(self) -> u8 {
        0x41 | (self.index() << 1)
    }

    /// Mask of the `TXnIF` flag raised when this buffer completes.
    pub const fn interrupt_flag(self) -> CanIntf {
        match self {
            TxBuf::B0 => CanIntf::MASK_TX0IF,
            TxBuf::B1 => CanIntf::MASK_TX1IF,
            TxBuf::B2 => CanIntf::MASK_TX2IF,
        }
    }
}

crate::reg_block_def! {
    /// Receive buffer.
    RxBuf(5) => {
        /// Rx buffer 0.
        B0 => [Register::RXB0SIDH, Register::RXB0SIDL, Register::RXB0EID8, Register::RXB0EID0, Register::RXB0DLC],
        /// Rx buffer 1.
        B1 => [Register::RXB1SIDH, Register::RXB1SIDL, Register::RXB1EID8, Register::RXB1EID0, Register::RXB1DLC]
    }
}

impl RxBuf {
    /// Returns the `CTRL` register for the selected Rx buffer.
    pub const fn ctrl(self) -> Register {
        match self {
            RxBuf::B0 => Register::RXB0CTRL,
            RxBuf::B1 => Register::RXB1CTRL,
        }
    }

    /// `READ RX BUFFER` instruction starting at the first data byte. Raising
    /// chip select afterwards clears the buffer's `RXnIF` flag.
    pub const fn read_data_instruction(self) -> u8 {
        0x92 | (self.index() << 2)
    }

    /// Mask of the `RXnIF` flag raised when this buffer holds a message.
    pub const fn interrupt_flag(self) -> CanIntf {
        match self {
            RxBuf::B0 => CanIntf::MASK_RX0IF,
            RxBuf::B1 => CanIntf::MASK_RX1IF,
        }
    }
}
