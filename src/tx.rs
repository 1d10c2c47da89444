//! Transmit path: synchronous writes, the asynchronous queue and aborts.

use core::{fmt::Debug, ptr};

use embedded_hal::{blocking::delay::DelayUs, blocking::spi::Transfer, digital::v2::OutputPin};
use embedded_time::Clock;
use log::{debug, trace};

use crate::{
    error::{Error, Result},
    frame::{CanPacket, PacketStatus},
    ident::IdHeader,
    poll::Wait,
    regs::{CanCtrl, CanIntf, TxbCtrl},
    MCP2515,
};

/// Maps a terminal transmit status to the result reported to the caller.
fn outcome<SPIE, CSE>(status: PacketStatus) -> Result<(), SPIE, CSE> {
    if status.contains(PacketStatus::TX_SENT) {
        Ok(())
    } else if status.contains(PacketStatus::TX_ABORTED) {
        Err(Error::Interrupted)
    } else {
        Err(Error::BadState)
    }
}

impl<'a, SPI, CS, D, CLK, SPIE, CSE, const N: usize> MCP2515<'a, SPI, CS, D, CLK, N>
where
    SPI: Transfer<u8, Error = SPIE>,
    CS: OutputPin<Error = CSE>,
    D: DelayUs<u16>,
    CLK: Clock,
    SPIE: Debug,
    CSE: Debug,
{
    /// Transmits a packet and blocks until the outcome is known.
    ///
    /// # Returns
    ///
    /// * [`Error::InvalidArgument`] if the packet was not built.
    /// * [`Error::BadState`] if the packet is still pending from an earlier
    ///   write.
    /// * [`Error::WrongMode`] outside normal and loopback mode.
    /// * [`Error::Busy`] if the Tx buffer is still occupied. The packet is
    ///   not left pending in that case, its status goes back to
    ///   [`PacketStatus::BUILT`].
    /// * [`Error::Interrupted`] if the transmission was aborted.
    /// * [`Error::BadState`] if the transmission failed.
    pub fn write_packet(&mut self, packet: &CanPacket) -> Result<(), SPIE, CSE> {
        self.check_writable(packet)?;
        mark_pending(packet);

        if self.tx_buffer_busy()? {
            debug!("MCP2515 Tx buffer busy");
            packet.update_status(|s| s - PacketStatus::TX_PENDING);
            return Err(Error::Busy);
        }
        self.load_tx_buffer(packet)?;

        let status = self.poll(Wait::FOREVER, |mcp| mcp.step_transmit(packet))?;
        outcome(status)
    }

    /// Queues a packet for transmission and returns immediately.
    ///
    /// The packet is loaded right away if the Tx buffer is free, otherwise it
    /// is loaded once the packets queued before it complete. Follow its
    /// progress with [`CanPacket::status`] or
    /// [`MCP2515::wait_for_packet_status`].
    ///
    /// Fails with [`Error::Overflow`] if the queue is full, leaving both the
    /// queue and the packet untouched. A packet that is still pending,
    /// including one with an abort requested, is refused with
    /// [`Error::BadState`].
    pub fn write_packet_async(&mut self, packet: &'a CanPacket) -> Result<(), SPIE, CSE> {
        self.check_writable(packet)?;

        self.tx_queue.push_back(packet).map_err(|_| {
            debug!("MCP2515 Tx queue full ({})", N);
            Error::Overflow
        })?;
        mark_pending(packet);

        self.process_tx_queue()
    }

    /// Checks once whether the transmission of `packet` has completed.
    ///
    /// Returns [`nb::Error::WouldBlock`] while the packet is still in the Tx
    /// buffer. Errors are the same as those of [`MCP2515::write_packet`].
    pub fn poll_transmit(&mut self, packet: &CanPacket) -> nb::Result<(), Error<SPIE, CSE>> {
        let status = self.step_transmit(packet)?;
        outcome(status).map_err(nb::Error::Other)
    }

    /// Aborts the transmission of `packet`.
    ///
    /// A packet that never reached the Tx buffer is marked aborted once it
    /// reaches the head of the queue, so packets still finish in queue order.
    /// A packet that is being transmitted is aborted in hardware. With a
    /// blocking `wait` the call returns once the abort took effect.
    ///
    /// Aborting a packet that is not pending does nothing. With a blocking
    /// `wait` that is [`Error::BadState`] unless the packet was aborted
    /// before.
    pub fn abort_packet(&mut self, packet: &CanPacket, wait: Wait<'_>) -> Result<(), SPIE, CSE> {
        let status = packet.status();
        if !status.contains(PacketStatus::TX_PENDING) {
            return if wait.is_blocking() && !status.contains(PacketStatus::TX_ABORTED) {
                Err(Error::BadState)
            } else {
                Ok(())
            };
        }

        packet.update_status(|s| s | PacketStatus::TX_ABORT_REQUESTED);
        if !status.contains(PacketStatus::TX_WRITTEN) {
            // Finalized by the queue service once it is the head.
            debug!("MCP2515 abort requested for queued packet {:?}", packet.id);
            if !wait.is_blocking() {
                return Ok(());
            }
            return self.poll(wait, |mcp| {
                mcp.process_tx_queue()?;
                let status = packet.status();
                if status.contains(PacketStatus::TX_ABORTED) {
                    Ok(())
                } else if !status.contains(PacketStatus::TX_PENDING) {
                    Err(nb::Error::Other(Error::BadState))
                } else {
                    Err(nb::Error::WouldBlock)
                }
            });
        }

        // Only one packet is in the Tx buffer at a time: the written one.
        self.modify_register(CanCtrl::new().with_abat(true), CanCtrl::MASK_ABAT)?;
        if !wait.is_blocking() {
            return Ok(());
        }

        let status = self.poll(wait, |mcp| mcp.step_transmit(packet))?;
        self.pop_if_head(packet);
        if status.contains(PacketStatus::TX_ABORTED) {
            Ok(())
        } else {
            Err(Error::BadState)
        }
    }

    /// Waits until the transmission of `packet` completed.
    ///
    /// Succeeds if the final status intersects `status`, fails with
    /// [`Error::BadState`] otherwise. Received packets have no transmission
    /// to wait for and yield [`Error::InvalidArgument`].
    pub fn wait_for_packet_status(
        &mut self,
        packet: &CanPacket,
        status: PacketStatus,
        wait: Wait<'_>,
    ) -> Result<(), SPIE, CSE> {
        if packet.status().intersects(PacketStatus::RX_DONE) {
            return Err(Error::InvalidArgument);
        }

        // Keep the queue moving, the packet may still be waiting for the buffer.
        let result = self.poll(wait, |mcp| {
            mcp.process_tx_queue()?;
            mcp.step_transmit(packet)
        })?;
        self.pop_if_head(packet);
        if result.intersects(status) {
            Ok(())
        } else {
            Err(Error::BadState)
        }
    }

    /// Services the transmit queue.
    ///
    /// Completed and aborted packets at the head of the queue are removed,
    /// then the next packet is loaded if the Tx buffer is free. Called from
    /// [`MCP2515::handle_interrupt`]; call it periodically when running
    /// without the interrupt line.
    pub fn process_tx_queue(&mut self) -> Result<(), SPIE, CSE> {
        while let Some(&head) = self.tx_queue.front() {
            let status = head.status();

            if status.contains(PacketStatus::TX_WRITTEN) {
                match self.step_transmit(head) {
                    Ok(status) => {
                        trace!("MCP2515 Tx queue head done: {:?}", status);
                        self.tx_queue.pop_front();
                    }
                    Err(nb::Error::WouldBlock) => return Ok(()),
                    Err(nb::Error::Other(e)) => return Err(e),
                }
            } else if !status.contains(PacketStatus::TX_PENDING)
                || status.contains(PacketStatus::TX_ABORT_REQUESTED)
            {
                head.update_status(|s| {
                    if s.contains(PacketStatus::TX_PENDING) {
                        (s - PacketStatus::TX_PENDING) | PacketStatus::TX_ABORTED
                    } else {
                        s
                    }
                });
                self.tx_queue.pop_front();
            } else {
                if !self.tx_buffer_busy()? {
                    self.load_tx_buffer(head)?;
                }
                return Ok(());
            }
        }
        Ok(())
    }

    /// Number of packets in the transmit queue, including the one in the Tx
    /// buffer.
    pub fn tx_queue_len(&self) -> usize {
        self.tx_queue.len()
    }

    fn check_writable(&mut self, packet: &CanPacket) -> Result<(), SPIE, CSE> {
        if !packet.is_built() {
            return Err(Error::InvalidArgument);
        }
        if packet.status().contains(PacketStatus::TX_PENDING) {
            debug!("MCP2515 packet {:?} already pending", packet.id);
            return Err(Error::BadState);
        }
        let mode = self.get_mode()?;
        if !mode.can_transmit() {
            debug!("MCP2515 cannot transmit in {:?} mode", mode);
            return Err(Error::WrongMode);
        }
        Ok(())
    }

    /// One step of the transmit state machine.
    ///
    /// Returns the terminal status of the packet, or `WouldBlock` while the
    /// hardware is still busy with it. A terminal outcome frees the Tx buffer.
    pub(crate) fn step_transmit(
        &mut self,
        packet: &CanPacket,
    ) -> nb::Result<PacketStatus, Error<SPIE, CSE>> {
        let status = packet.status();
        if !status.contains(PacketStatus::TX_PENDING) {
            return if status.intersects(PacketStatus::TX_DONE) {
                Ok(status)
            } else {
                Err(nb::Error::Other(Error::InvalidArgument))
            };
        }
        if !status.contains(PacketStatus::TX_WRITTEN) {
            return Err(nb::Error::WouldBlock);
        }

        let ctrl = self.read_txb_ctrl()?;
        let done = if ctrl.abtf() {
            self.modify_register(CanCtrl::new(), CanCtrl::MASK_ABAT)?;
            PacketStatus::TX_ABORTED
        } else if ctrl.txerr() {
            PacketStatus::TX_ERROR
        } else if !ctrl.txreq() {
            PacketStatus::TX_SENT
        } else {
            return Err(nb::Error::WouldBlock);
        };

        self.release_tx_buffer()?;
        let status = packet.update_status(|s| (s - PacketStatus::TX_PENDING) | done);
        debug!("MCP2515 Tx {:?}: {:?}", packet.id, done);
        Ok(status)
    }

    /// Loads `packet` into the Tx buffer and requests its transmission.
    pub(crate) fn load_tx_buffer(&mut self, packet: &CanPacket) -> Result<(), SPIE, CSE> {
        let header = IdHeader::new(packet.id, packet.rtr);
        let [sidh, sidl, eid8, eid0] = header.to_registers();
        let regs = [sidh, sidl, eid8, eid0, header.dlc_register(packet.dlc)];

        critical_section::with(|_| -> Result<(), SPIE, CSE> {
            let ctrl = self.tx_buf.ctrl();
            self.modify_register_raw(ctrl, TxbCtrl::MASK_STATE.into_bytes()[0], 0)?;
            self.modify_register(CanCtrl::new(), CanCtrl::MASK_ABAT)?;

            self.write_registers(self.tx_buf.registers()[0], &regs)?;
            if !packet.rtr {
                let data = &packet.data[..packet.dlc as usize];
                self.write_instruction(self.tx_buf.load_data_instruction(), data)?;
            }

            let txreq = TxbCtrl::MASK_TXREQ.into_bytes()[0];
            self.modify_register_raw(ctrl, txreq, txreq)?;
            packet.update_status(|s| s | PacketStatus::TX_WRITTEN);
            Ok(())
        })?;

        trace!("MCP2515 loaded {:?} into {:?}", packet, self.tx_buf);
        Ok(())
    }

    /// Clears the transmit request and the completion flag of the Tx buffer.
    pub(crate) fn release_tx_buffer(&mut self) -> Result<(), SPIE, CSE> {
        let txreq = TxbCtrl::MASK_TXREQ.into_bytes()[0];
        self.modify_register_raw(self.tx_buf.ctrl(), txreq, 0)?;
        self.modify_register(CanIntf::new(), self.tx_buf.interrupt_flag())
    }

    pub(crate) fn read_txb_ctrl(&mut self) -> Result<TxbCtrl, SPIE, CSE> {
        let ctrl = self.read_register_raw(self.tx_buf.ctrl())?;
        Ok(TxbCtrl::from_bytes([ctrl]))
    }

    fn tx_buffer_busy(&mut self) -> Result<bool, SPIE, CSE> {
        Ok(self.read_txb_ctrl()?.txreq())
    }

    fn pop_if_head(&mut self, packet: &CanPacket) {
        if let Some(&head) = self.tx_queue.front() {
            if ptr::eq(head, packet) {
                self.tx_queue.pop_front();
            }
        }
    }
}

/// Resets the transmit state of `packet` and marks it pending.
fn mark_pending(packet: &CanPacket) {
    packet.update_status(|s| {
        (s - PacketStatus::TX_DONE - PacketStatus::TX_WRITTEN - PacketStatus::TX_ABORT_REQUESTED)
            | PacketStatus::TX_PENDING
    });
}
