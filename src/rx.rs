use core::fmt::Debug;

use embedded_hal::{blocking::delay::DelayUs, blocking::spi::Transfer, digital::v2::OutputPin};
use embedded_time::Clock;
use log::trace;

use crate::{
    buffer::RxBuf,
    error::{Error, Result},
    frame::{CanPacket, PacketStatus},
    ident::{IdHeader, DLC_MASK},
    regs::{CanIntf, Register},
    MCP2515,
};

impl<'a, SPI, CS, D, CLK, SPIE, CSE, const N: usize> MCP2515<'a, SPI, CS, D, CLK, N>
where
    SPI: Transfer<u8, Error = SPIE>,
    CS: OutputPin<Error = CSE>,
    D: DelayUs<u16>,
    CLK: Clock,
    SPIE: Debug,
    CSE: Debug,
{
    /// Reads a packet from the MCP2515, Rx buffer 0 first.
    ///
    /// Returns [`Error::NotFound`] if neither Rx buffer holds a packet. The
    /// Rx buffer is released once the packet is read.
    pub fn receive_packet(&mut self) -> Result<CanPacket, SPIE, CSE> {
        let intf: CanIntf = self.read_register()?;
        let buf = if intf.rx0if() {
            RxBuf::B0
        } else if intf.rx1if() {
            RxBuf::B1
        } else {
            return Err(Error::NotFound);
        };

        let mut regs = [0u8; 5];
        self.read_registers(buf.registers()[0], &mut regs)?;
        let [sidh, sidl, eid8, eid0, dlc] = regs;
        let header = IdHeader::from_registers([sidh, sidl, eid8, eid0], dlc);

        let mut packet = CanPacket::begin(header.id);
        packet.rtr = header.rtr;
        packet.dlc = (dlc & DLC_MASK).min(8);

        if header.rtr {
            // No payload to read, release the buffer directly.
            self.modify_register(CanIntf::new(), buf.interrupt_flag())?;
        } else {
            let len = packet.dlc as usize;
            self.read_instruction(buf.read_data_instruction(), &mut packet.data[..len])?;
        }
        packet.end();

        let status = if self.accept_invalid {
            let rec = self.read_register_raw(Register::REC)?;
            let status = if rec > self.rx_error_count {
                PacketStatus::RX_INVALID
            } else {
                PacketStatus::RX_OK
            };
            self.rx_error_count = rec;
            status
        } else {
            PacketStatus::RX_OK
        };
        packet.update_status(|s| s | status);

        trace!("MCP2515 received {:?} from {:?}", packet, buf);
        Ok(packet)
    }
}
