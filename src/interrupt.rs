//! Interrupt handling.
//!
//! The MCP2515 pulls its `INT` line low while any enabled interrupt flag is
//! raised. The application routes the MCU interrupt of that line to
//! [`InterruptRegistry::dispatch`], which runs [`MCP2515::handle_interrupt`]
//! of the driver registered for the line.

use core::{cell::RefCell, fmt::Debug};

use critical_section::Mutex;
use embedded_hal::{blocking::delay::DelayUs, blocking::spi::Transfer, digital::v2::OutputPin};
use embedded_time::Clock;
use heapless::Vec;
use log::{trace, warn};

use crate::{
    error::{Error, Result},
    frame::{CanPacket, PacketStatus},
    regs::{CanInte, CanIntf},
    MCP2515,
};

/// Identifies an MCU interrupt line, e.g. an EXTI line number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LineId(pub u8);

/// MCU input connected to the `INT` pin of the MCP2515.
pub trait InterruptPin {
    /// The interrupt line this pin triggers.
    fn line(&self) -> LineId;

    /// Enables the falling-edge interrupt of the pin.
    fn attach(&mut self);

    /// Disables the interrupt of the pin.
    fn detach(&mut self);
}

/// Something to run when an interrupt line fires.
pub trait InterruptHandler {
    fn on_interrupt(&self);
}

impl<'a, SPI, CS, D, CLK, SPIE, CSE, const N: usize> InterruptHandler
    for Mutex<RefCell<MCP2515<'a, SPI, CS, D, CLK, N>>>
where
    SPI: Transfer<u8, Error = SPIE>,
    CS: OutputPin<Error = CSE>,
    D: DelayUs<u16>,
    CLK: Clock,
    SPIE: Debug,
    CSE: Debug,
{
    fn on_interrupt(&self) {
        critical_section::with(|cs| {
            if let Ok(mut mcp) = self.borrow(cs).try_borrow_mut() {
                if let Err(e) = mcp.handle_interrupt() {
                    warn!("MCP2515 interrupt handling failed: {:?}", e);
                }
            }
        });
    }
}

impl<'a, SPI, CS, D, CLK, SPIE, CSE, const N: usize> InterruptHandler
    for Mutex<RefCell<Option<MCP2515<'a, SPI, CS, D, CLK, N>>>>
where
    SPI: Transfer<u8, Error = SPIE>,
    CS: OutputPin<Error = CSE>,
    D: DelayUs<u16>,
    CLK: Clock,
    SPIE: Debug,
    CSE: Debug,
{
    fn on_interrupt(&self) {
        critical_section::with(|cs| {
            if let Ok(mut mcp) = self.borrow(cs).try_borrow_mut() {
                if let Some(mcp) = mcp.as_mut() {
                    if let Err(e) = mcp.handle_interrupt() {
                        warn!("MCP2515 interrupt handling failed: {:?}", e);
                    }
                }
            }
        });
    }
}

/// The registry is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RegistryFull;

/// Maps interrupt lines to the drivers wired to them.
///
/// With `N = 1` this is a single global binding. Meant to live in a `static`
/// next to the drivers it refers to.
pub struct InterruptRegistry<'r, const N: usize> {
    handlers: Mutex<RefCell<Vec<(LineId, &'r (dyn InterruptHandler + Sync)), N>>>,
}

impl<'r, const N: usize> InterruptRegistry<'r, N> {
    pub const fn new() -> Self {
        Self {
            handlers: Mutex::new(RefCell::new(Vec::new())),
        }
    }

    /// Binds `handler` to `line`, replacing any handler bound before.
    pub fn register(
        &self,
        line: LineId,
        handler: &'r (dyn InterruptHandler + Sync),
    ) -> core::result::Result<(), RegistryFull> {
        critical_section::with(|cs| {
            let mut handlers = self.handlers.borrow_ref_mut(cs);
            if let Some(entry) = handlers.iter_mut().find(|(l, _)| *l == line) {
                entry.1 = handler;
                return Ok(());
            }
            handlers.push((line, handler)).map_err(|_| RegistryFull)
        })
    }

    /// Removes the binding of `line`. Returns whether there was one.
    pub fn unregister(&self, line: LineId) -> bool {
        critical_section::with(|cs| {
            let mut handlers = self.handlers.borrow_ref_mut(cs);
            match handlers.iter().position(|(l, _)| *l == line) {
                Some(index) => {
                    handlers.swap_remove(index);
                    true
                }
                None => false,
            }
        })
    }

    /// Runs the handler bound to `line`. Returns `false` if there is none.
    pub fn dispatch(&self, line: LineId) -> bool {
        let handler = critical_section::with(|cs| {
            self.handlers
                .borrow_ref(cs)
                .iter()
                .find(|(l, _)| *l == line)
                .map(|(_, handler)| *handler)
        });
        match handler {
            Some(handler) => {
                handler.on_interrupt();
                true
            }
            None => false,
        }
    }
}

impl<'r, const N: usize> Default for InterruptRegistry<'r, N> {
    fn default() -> Self {
        Self::new()
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
    /// Installs or removes the receive callback.
    ///
    /// With a callback, the interrupt of `pin` is attached and the MCP2515
    /// raises its `INT` line on receptions, transmissions, wake-up and
    /// errors. Route that interrupt to [`MCP2515::handle_interrupt`], for
    /// example through an [`InterruptRegistry`]. `None` disarms both again.
    pub fn on_receive_packet(
        &mut self,
        pin: &mut impl InterruptPin,
        callback: Option<fn(&CanPacket)>,
    ) -> Result<(), SPIE, CSE> {
        self.on_receive = callback;

        if callback.is_some() {
            self.irq_line = Some(pin.line());
            pin.attach();
            self.modify_register(CanInte::MASK_CALLBACK, CanInte::MASK_CALLBACK)
        } else {
            self.modify_register(CanInte::new(), CanInte::MASK_CALLBACK)?;
            pin.detach();
            self.irq_line = None;
            Ok(())
        }
    }

    /// The interrupt line bound by [`MCP2515::on_receive_packet`].
    pub fn irq_line(&self) -> Option<LineId> {
        self.irq_line
    }

    /// Services the MCP2515 interrupt.
    ///
    /// Completes the packet at the head of the transmit queue, acknowledges
    /// every non-receive flag, hands each received packet to the receive
    /// callback and finally loads the next queued packet.
    pub fn handle_interrupt(&mut self) -> Result<(), SPIE, CSE> {
        let intf: CanIntf = self.read_register()?;
        if intf.is_empty() {
            return Ok(());
        }
        trace!("MCP2515 interrupt: CANINTF={:#04x}", intf.into_bytes()[0]);

        let tx_flag = self.tx_buf.interrupt_flag().into_bytes()[0];
        let tx_done = if intf.into_bytes()[0] & tx_flag != 0 {
            Some(PacketStatus::TX_SENT)
        } else if intf.merrf() && self.read_txb_ctrl()?.txerr() {
            Some(PacketStatus::TX_ERROR)
        } else {
            None
        };

        if let Some(done) = tx_done {
            self.complete_tx_head(done)?;
        }

        // The line stays low while any enabled flag is raised.
        self.modify_register(CanIntf::new(), CanIntf::MASK_NON_RX)?;

        if intf.rx_pending() {
            if let Some(callback) = self.on_receive {
                loop {
                    match self.receive_packet() {
                        Ok(packet) => callback(&packet),
                        Err(Error::NotFound) => break,
                        Err(e) => return Err(e),
                    }
                }
            }
        } else if tx_done.is_none() {
            return Ok(());
        }

        self.process_tx_queue()
    }

    /// Finishes the written packet at the head of the transmit queue with
    /// `done`.
    fn complete_tx_head(&mut self, done: PacketStatus) -> Result<(), SPIE, CSE> {
        let head = match self.tx_queue.front() {
            Some(&head) if head.status().contains(PacketStatus::TX_WRITTEN) => head,
            _ => return Ok(()),
        };
        self.tx_queue.pop_front();

        if head.status().contains(PacketStatus::TX_PENDING) {
            head.update_status(|s| {
                (s - PacketStatus::TX_PENDING - PacketStatus::TX_ABORTED) | done
            });
            if done == PacketStatus::TX_ERROR {
                // Stop automatic retransmission of the failed packet.
                self.release_tx_buffer()?;
            }
        }
        Ok(())
    }
}
