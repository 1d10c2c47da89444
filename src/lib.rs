#![cfg_attr(not(test), no_std)]

//! Interrupt-driven driver for the MCP2515 SPI CAN controller.
//!
//! Packets are sent through a single hardware Tx buffer, either
//! synchronously ([`MCP2515::write_packet`]) or through a bounded queue
//! serviced from the interrupt handler ([`MCP2515::write_packet_async`]).
//! Received packets are handed to a callback installed with
//! [`MCP2515::on_receive_packet`], or can be polled with
//! [`MCP2515::receive_packet`].
//!
//! Sharing a driver with the interrupt handler:
//!
//! ```ignore
//! static CAN: Mutex<RefCell<Option<Can>>> = Mutex::new(RefCell::new(None));
//! static IRQS: InterruptRegistry<'static, 1> = InterruptRegistry::new();
//!
//! critical_section::with(|cs| {
//!     let mut can = MCP2515::new(spi, cs_pin, delay, clock);
//!     can.init(Settings::default()).unwrap();
//!     can.on_receive_packet(&mut int_pin, Some(on_packet)).unwrap();
//!     CAN.borrow(cs).replace(Some(can));
//! });
//! IRQS.register(int_pin.line(), &CAN).unwrap();
//!
//! #[interrupt]
//! fn EXTI0() {
//!     IRQS.dispatch(LineId(0));
//! }
//! ```

pub mod buffer;
pub mod error;
pub mod filter;
pub mod frame;
pub mod ident;
pub mod interrupt;
pub(crate) mod macros;
pub mod poll;
pub mod regs;
pub mod timing;
mod rx;
mod tx;

#[cfg(test)]
pub(crate) mod mocks;
#[cfg(test)]
mod tests;

use core::fmt::Debug;

use embedded_hal::{
    blocking::{can::Can, delay::DelayUs, spi::Transfer},
    can::Id,
    digital::v2::OutputPin,
};
use embedded_time::Clock;
use heapless::Deque;
use log::{debug, warn};

use crate::{
    buffer::TxBuf,
    error::{Error, Result},
    filter::{RxFilter, RxMask},
    frame::{CanPacket, PacketStatus},
    ident::IdHeader,
    interrupt::LineId,
    poll::{Wait, POLL_INTERVAL_US},
    regs::{
        CanCtrl, CanInte, CanIntf, CanStat, Cnf3, Eflg, OpMode, RecvBufOpMode, Register, Rxb0Ctrl,
        Rxb1Ctrl,
    },
};
pub use crate::timing::{BitTiming, CanSpeed, McpSpeed};

#[repr(u8)]
enum Instruction {
    Write = 0x2,
    Read = 0x3,
    Bitmod = 0x5,
    Reset = 0xC0,
}

/// Default capacity of the asynchronous transmit queue.
pub const DEFAULT_TX_QUEUE_SIZE: usize = 16;

/// Settings used to initialize the MCP2515.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "ufmt", derive(ufmt::derive::uDebug))]
pub struct Settings {
    /// Device operation mode after initialization.
    pub mode: OpMode,
    /// Device CAN speed.
    pub can_speed: CanSpeed,
    /// Device oscillator speed. Should match the clock speed of the oscillator
    /// attached to the MCP2515.
    pub mcp_speed: McpSpeed,
    /// Whether to enable the CLKOUT pin.
    pub clkout_en: bool,
    /// Disable automatic retransmission after a bus error.
    pub one_shot: bool,
    /// Whether to enable the low-pass filter on the wake-up input.
    pub wakeup_filter: bool,
    /// The Tx buffer all transmissions go through.
    pub tx_buffer: TxBuf,
    /// Receive mode of both Rx buffers.
    pub rx_mode: RecvBufOpMode,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            mode: OpMode::Normal,
            can_speed: CanSpeed::Kbps100,
            mcp_speed: McpSpeed::MHz16,
            clkout_en: false,
            one_shot: false,
            wakeup_filter: false,
            tx_buffer: TxBuf::B0,
            rx_mode: RecvBufOpMode::FilterOff,
        }
    }
}

/// MCP2515 driver.
///
/// `N` is the capacity of the asynchronous transmit queue. Packets handed to
/// [`MCP2515::write_packet_async`] are borrowed for `'a`, not copied.
pub struct MCP2515<'a, SPI, CS, D, CLK, const N: usize = DEFAULT_TX_QUEUE_SIZE> {
    /// SPI interface to interact with the MCP2515.
    spi: SPI,
    /// Chip select pin to select the MCP2515.
    cs: CS,
    /// Delay used for the reset settle time and between polls.
    delay: D,
    /// Monotonic clock for timeouts.
    clock: CLK,
    /// Oscillator attached to the MCP2515.
    mcp_speed: McpSpeed,
    /// The Tx buffer used for every transmission.
    tx_buf: TxBuf,
    /// Receive mode restored after leaving listen mode with invalid packets
    /// accepted.
    rx_mode: RecvBufOpMode,
    one_shot: bool,
    accept_invalid: bool,
    /// Receive error counter as last seen in listen mode.
    rx_error_count: u8,
    /// Set once sleep mode was entered, cleared on wake.
    asleep: bool,
    irq_line: Option<LineId>,
    on_receive: Option<fn(&CanPacket)>,
    tx_queue: Deque<&'a CanPacket, N>,
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
    /// Creates a new MCP2515 driver. The chip is not touched until
    /// [`MCP2515::init`].
    ///
    /// # Configuration
    ///
    /// As this driver only takes ownership of the SPI interface, it is up to
    /// the user to create and configure the SPI interface. Namely, the MCP2515
    /// requires the following options:
    ///
    /// * **Data Order**: MSB first.
    /// * **Clock**: At most 10 MHz.
    /// * **Mode**: Mode 0.
    ///
    /// # Parameters
    ///
    /// * `spi` - SPI interface.
    /// * `cs` - Chip-select pin for the MCP2515.
    /// * `delay` - Microsecond delay from the HAL.
    /// * `clock` - Monotonic clock used for timeouts.
    pub fn new(spi: SPI, cs: CS, delay: D, clock: CLK) -> Self {
        Self {
            spi,
            cs,
            delay,
            clock,
            mcp_speed: McpSpeed::MHz16,
            tx_buf: TxBuf::B0,
            rx_mode: RecvBufOpMode::FilterOff,
            one_shot: false,
            accept_invalid: false,
            rx_error_count: 0,
            asleep: false,
            irq_line: None,
            on_receive: None,
            tx_queue: Deque::new(),
        }
    }

    /// Initializes the MCP2515. This should be called once at the start of the
    /// program.
    ///
    /// # Parameters
    ///
    /// * `settings` - Settings for MCP2515. See [`Settings`].
    pub fn init(&mut self, settings: Settings) -> Result<(), SPIE, CSE> {
        self.cs.set_high().map_err(Error::Hal)?;
        self.reset()?;
        self.tx_buf = settings.tx_buffer;
        self.rx_mode = settings.rx_mode;

        // Set bitrate, enable clken if required, and change into configuration mode.
        self.set_mode(OpMode::Configuration)?;
        self.set_bitrate(settings.can_speed, settings.mcp_speed, settings.clkout_en)?;
        self.set_clken(settings.clkout_en)?;
        self.set_one_shot_mode(settings.one_shot)?;
        self.set_wakeup_filter(settings.wakeup_filter)?;

        // RXnBF and TXnRTS pins unused.
        self.write_register_raw(Register::BFPCTRL, 0)?;
        self.write_register_raw(Register::TXRTSCTRL, 0)?;

        // Clear the Tx buffer (CTRL up to the last data byte).
        self.write_registers(self.tx_buf.ctrl(), &[0u8; 14])?;

        self.write_register(CanInte::new().with_rx0ie(true).with_rx1ie(true))?;
        self.set_rx_buffers_mode(self.rx_mode)?;

        // Finally switch to requested mode.
        self.set_mode(settings.mode)?;

        Ok(())
    }

    /// Resets the MCP2515 and hands back the peripherals.
    pub fn release(mut self) -> (SPI, CS, D, CLK) {
        if let Err(e) = self.reset() {
            warn!("MCP2515 reset on release failed: {:?}", e);
        }
        (self.spi, self.cs, self.delay, self.clock)
    }

    /// Sets a receive filter.
    ///
    /// Passes through configuration mode and leaves the device in normal mode
    /// regardless of the mode it was in before.
    ///
    /// # Parameters
    ///
    /// * `filter` - The filter to action on.
    /// * `id` - The actual ID filter to apply to `filter`.
    pub fn set_filter(&mut self, filter: RxFilter, id: Id) -> Result<(), SPIE, CSE> {
        self.set_mode(OpMode::Configuration)?;
        self.write_registers(filter.registers()[0], &IdHeader::from_id(id).to_registers())?;
        self.set_mode(OpMode::Normal)
    }

    /// Sets a receive mask.
    ///
    /// Passes through configuration mode and leaves the device in normal mode
    /// regardless of the mode it was in before.
    ///
    /// # Parameters
    ///
    /// * `mask` - The mask to action on.
    /// * `id` - The actual ID mask to apply to `mask`.
    pub fn set_mask(&mut self, mask: RxMask, id: Id) -> Result<(), SPIE, CSE> {
        self.set_mode(OpMode::Configuration)?;
        self.write_registers(mask.registers()[0], &IdHeader::from_id(id).to_registers())?;
        self.set_mode(OpMode::Normal)
    }

    /// Chooses whether the Rx buffers apply masks and filters.
    pub fn set_receive_mode(&mut self, mode: RecvBufOpMode) -> Result<(), SPIE, CSE> {
        self.rx_mode = mode;
        if self.accept_invalid {
            // Applied when listen mode is left.
            return Ok(());
        }
        self.set_rx_buffers_mode(mode)
    }

    /// Configures the MCP2515 to operate at a certain CAN bitrate. The device
    /// must be in configuration mode.
    ///
    /// # Parameters
    ///
    /// * `can_speed` - CAN speed to operate at.
    /// * `mcp_speed` - Clock speed of the MCP2515.
    /// * `clkout_en` - Whether to enable the `CLKOUT` pin.
    pub fn set_bitrate(
        &mut self,
        can_speed: CanSpeed,
        mcp_speed: McpSpeed,
        clkout_en: bool,
    ) -> Result<(), SPIE, CSE> {
        let timing = BitTiming::lookup(mcp_speed, can_speed);
        let mut cnf3 = timing.cnf3;
        if clkout_en {
            cnf3 = cnf3.with_sof(false);
        }
        debug!(
            "MCP2515 bit timing for {} bit/s at {} Hz: {:?}",
            can_speed.bps(),
            mcp_speed.hz(),
            timing
        );
        self.write_register(timing.cnf1)?;
        self.write_register(timing.cnf2)?;
        self.write_register(cnf3)?;
        self.mcp_speed = mcp_speed;
        Ok(())
    }

    /// Oscillator speed the bit timing was configured for.
    pub fn mcp_speed(&self) -> McpSpeed {
        self.mcp_speed
    }

    /// Returns the mode last requested from the device.
    pub fn get_mode(&mut self) -> Result<OpMode, SPIE, CSE> {
        let ctrl: CanCtrl = self.read_register()?;
        ctrl.reqop_or_err().map_err(|_| Error::BadState)
    }

    /// Set the operation mode of the device.
    ///
    /// This will wake the device if necessary. [`OpMode::ListenOnly`] is
    /// entered without accepting invalid packets, see
    /// [`MCP2515::set_listen_mode`].
    ///
    /// Entering [`OpMode::Sleep`] blocks until the device reports it is
    /// asleep. There is no timeout: the device stays active for an
    /// unspecified time after the request.
    ///
    /// # Returns
    ///
    /// Nothing on success, [`Error::BadState`] if the device did not take the
    /// new mode.
    pub fn set_mode(&mut self, mode: OpMode) -> Result<(), SPIE, CSE> {
        if mode == OpMode::ListenOnly {
            return self.set_listen_mode(false);
        }

        self.request_mode(mode)?;
        if mode == OpMode::Sleep {
            self.wait_for_sleep()?;
        }
        self.leave_accept_invalid()
    }

    /// Enters listen-only mode.
    ///
    /// With `accept_invalid` both Rx buffers receive any packet, and packets
    /// received while the receive error counter advances are marked
    /// [`PacketStatus::RX_INVALID`](crate::frame::PacketStatus::RX_INVALID).
    pub fn set_listen_mode(&mut self, accept_invalid: bool) -> Result<(), SPIE, CSE> {
        self.request_mode(OpMode::ListenOnly)?;

        if accept_invalid {
            self.set_rx_buffers_mode(RecvBufOpMode::FilterOff)?;
            // In listen-only mode erroneous packets are received too, keep track of
            // the error counter to detect them.
            self.rx_error_count = self.read_register_raw(Register::REC)?;
        } else if self.accept_invalid {
            self.set_rx_buffers_mode(self.rx_mode)?;
        }

        self.accept_invalid = accept_invalid;
        Ok(())
    }

    /// Enables/disables one-shot mode, in which a packet is only attempted once.
    pub fn set_one_shot_mode(&mut self, enable: bool) -> Result<(), SPIE, CSE> {
        self.modify_register(CanCtrl::new().with_osm(enable), CanCtrl::MASK_OSM)?;
        let ctrl: CanCtrl = self.read_register()?;
        if ctrl.osm() != enable {
            warn!("MCP2515 did not take one-shot mode {}", enable);
            return Err(Error::BadState);
        }
        self.one_shot = enable;
        Ok(())
    }

    /// Whether one-shot mode is enabled.
    pub fn one_shot_mode(&self) -> bool {
        self.one_shot
    }

    /// Enables/disables the low-pass filter on the wake-up input.
    pub fn set_wakeup_filter(&mut self, enable: bool) -> Result<(), SPIE, CSE> {
        self.modify_register(Cnf3::new().with_wakfil(enable), Cnf3::MASK_WAKFIL)?;
        let cnf3: Cnf3 = self.read_register()?;
        if cnf3.wakfil() != enable {
            warn!("MCP2515 did not take wake-up filter {}", enable);
            return Err(Error::BadState);
        }
        Ok(())
    }

    /// Reads the `CANSTAT` register.
    pub fn read_status(&mut self) -> Result<CanStat, SPIE, CSE> {
        self.read_register()
    }

    /// Reads the error flag register.
    pub fn read_error_flags(&mut self) -> Result<Eflg, SPIE, CSE> {
        self.read_register()
    }

    /// Reads the receive error counter.
    pub fn rx_error_counter(&mut self) -> Result<u8, SPIE, CSE> {
        self.read_register_raw(Register::REC)
    }

    /// Reads the transmit error counter.
    pub fn tx_error_counter(&mut self) -> Result<u8, SPIE, CSE> {
        self.read_register_raw(Register::TEC)
    }

    /// Requests `mode` and checks the request was taken.
    fn request_mode(&mut self, mode: OpMode) -> Result<(), SPIE, CSE> {
        if self.asleep && mode != OpMode::Sleep {
            self.wake()?;
        }

        self.modify_register(CanCtrl::new().with_reqop(mode), CanCtrl::MASK_REQOP)?;

        let ctrl: CanCtrl = self.read_register()?;
        if ctrl.reqop_or_err() != Ok(mode) {
            warn!("MCP2515 did not take mode {:?}: CANCTRL={:#04x}", mode, ctrl.into_bytes()[0]);
            return Err(Error::BadState);
        }
        debug!("MCP2515 mode {:?}", mode);
        Ok(())
    }

    /// Polls `CANSTAT` until the device is asleep.
    fn wait_for_sleep(&mut self) -> Result<(), SPIE, CSE> {
        self.poll(Wait::FOREVER, |mcp| {
            let status: CanStat = mcp.read_register()?;
            if status.opmod_or_err() == Ok(OpMode::Sleep) {
                Ok(())
            } else {
                Err(nb::Error::WouldBlock)
            }
        })?;
        self.asleep = true;
        Ok(())
    }

    /// Wakes the device by raising the wake-up interrupt flag.
    fn wake(&mut self) -> Result<(), SPIE, CSE> {
        // Ensure wake interrupt is enabled
        let caninte: CanInte = self.read_register()?;
        let int_enabled = caninte.wakie();
        if !int_enabled {
            let data = CanInte::new().with_wakie(true);
            self.modify_register(data, CanInte::MASK_WAKIE)?;
        }

        self.modify_register(CanIntf::new().with_wakif(true), CanIntf::MASK_WAKIF)?;

        // Disable the interrupt if it was originally disabled
        if !int_enabled {
            self.modify_register(CanInte::new().with_wakie(false), CanInte::MASK_WAKIE)?;
        }
        self.modify_register(CanIntf::new().with_wakif(false), CanIntf::MASK_WAKIF)?;

        self.asleep = false;
        Ok(())
    }

    /// Restores the Rx buffer mode if invalid packets were accepted.
    fn leave_accept_invalid(&mut self) -> Result<(), SPIE, CSE> {
        if self.accept_invalid {
            self.accept_invalid = false;
            self.set_rx_buffers_mode(self.rx_mode)?;
        }
        Ok(())
    }

    fn set_rx_buffers_mode(&mut self, mode: RecvBufOpMode) -> Result<(), SPIE, CSE> {
        self.modify_register(Rxb0Ctrl::new().with_rxm(mode), Rxb0Ctrl::MASK_RXM)?;
        self.modify_register(Rxb1Ctrl::new().with_rxm(mode), Rxb1Ctrl::MASK_RXM)
    }

    /// Enables/disables the `CLKOUT` pin on the MCP2515.
    ///
    /// # Parameters
    ///
    /// * `clken` - Whether the `CLKOUT` pin should be enabled or disabled.
    fn set_clken(&mut self, clken: bool) -> Result<(), SPIE, CSE> {
        self.modify_register(CanCtrl::new().with_clken(clken), CanCtrl::MASK_CLKEN)
    }

    /// Runs `step` until it completes, as allowed by `wait`.
    ///
    /// Returns [`Error::TryAgain`] if `wait` does not block, its timeout
    /// elapses or it is cancelled before `step` completes.
    pub(crate) fn poll<T>(
        &mut self,
        wait: Wait<'_>,
        mut step: impl FnMut(&mut Self) -> nb::Result<T, Error<SPIE, CSE>>,
    ) -> Result<T, SPIE, CSE> {
        let deadline = match wait.timeout() {
            Some(timeout) => Some(
                self.clock
                    .try_now()?
                    .checked_add(timeout)
                    .ok_or(Error::Clock)?,
            ),
            None => None,
        };

        loop {
            match step(self) {
                Ok(value) => return Ok(value),
                Err(nb::Error::Other(e)) => return Err(e),
                Err(nb::Error::WouldBlock) => {}
            }

            if !wait.is_blocking() || wait.is_cancelled() {
                return Err(Error::TryAgain);
            }
            if let Some(deadline) = deadline {
                if self.clock.try_now()? >= deadline {
                    return Err(Error::TryAgain);
                }
            }
            self.delay.delay_us(POLL_INTERVAL_US);
        }
    }

    /// Resets the MCP2515.
    ///
    /// The reset discards the Tx buffer, so every packet still in the
    /// transmit queue is marked aborted and the queue is emptied.
    pub fn reset(&mut self) -> Result<(), SPIE, CSE> {
        self.transfer(&mut [Instruction::Reset as u8])?;
        // The oscillator restarts after reset, nothing may be accessed before it
        // settles.
        self.delay.delay_us(10);
        self.asleep = false;
        self.accept_invalid = false;

        while let Some(packet) = self.tx_queue.pop_front() {
            packet.update_status(|s| {
                if s.contains(PacketStatus::TX_PENDING) {
                    (s - PacketStatus::TX_PENDING) | PacketStatus::TX_ABORTED
                } else {
                    s
                }
            });
            debug!("MCP2515 reset dropped queued packet {:?}", packet.id);
        }
        Ok(())
    }

    /// Read a register via a register object.
    #[inline]
    pub fn read_register<const M: usize, R: regs::Reg<M>>(&mut self) -> Result<R, SPIE, CSE> {
        let mut ret = [0u8; M];
        for (reg, ret) in R::ADDRESSES.iter().zip(ret.iter_mut()) {
            *ret = self.read_register_raw(*reg)?;
        }
        Ok(R::read(ret))
    }

    /// Write to a register using a register object.
    #[inline]
    pub fn write_register<const M: usize, R: regs::Reg<M>>(
        &mut self,
        reg: R,
    ) -> Result<(), SPIE, CSE> {
        for (addr, data) in R::ADDRESSES.iter().zip(reg.write()) {
            self.write_register_raw(*addr, data)?;
        }
        Ok(())
    }

    /// Modifies a register.
    ///
    /// # Parameters
    ///
    /// * `reg` - New register content.
    /// * `mask` - Mask register. The bits must be 1 in the positions you want
    ///   to modify.
    #[inline]
    pub fn modify_register<const M: usize, R: regs::BitModifiable<M>>(
        &mut self,
        reg: R,
        mask: R,
    ) -> Result<(), SPIE, CSE> {
        for ((addr, data), mask) in R::ADDRESSES.iter().zip(reg.write()).zip(mask.write()) {
            self.modify_register_raw(*addr, mask, data)?;
        }
        Ok(())
    }

    /// Reads a single register.
    pub fn read_register_raw(&mut self, reg: Register) -> Result<u8, SPIE, CSE> {
        let mut data = [Instruction::Read as u8, reg as u8, 0];
        self.transfer(&mut data)
    }

    /// Writes a single register.
    pub fn write_register_raw(&mut self, reg: Register, value: u8) -> Result<(), SPIE, CSE> {
        let mut data = [Instruction::Write as u8, reg as u8, value];
        self.transfer(&mut data)?;
        Ok(())
    }

    /// Replaces the bits of `reg` set in `mask` with those of `value`.
    pub fn modify_register_raw(
        &mut self,
        reg: Register,
        mask: u8,
        value: u8,
    ) -> Result<(), SPIE, CSE> {
        let mut data = [
            Instruction::Bitmod as u8, // BIT MODIFY
            reg as u8,                 // Register address
            mask,                      // Modify mask byte
            value,                     // Data byte
        ];
        self.transfer(&mut data)?;
        Ok(())
    }

    /// Reads registers starting from `reg` sequentially, moving on to the next
    /// register until `ret` is full.
    fn read_registers(&mut self, reg: Register, ret: &mut [u8]) -> Result<(), SPIE, CSE> {
        let mut hdr = [Instruction::Read as u8, reg as u8];
        self.with_cs(|spi| -> Result<_, _, _> {
            spi.transfer(&mut hdr).map_err(Error::Spi)?;
            // As the MCP2515 doesn't care what we send it while reading, we can just
            // transfer `ret` as it is. The values will be overriden with received data as
            // we transfer the bytes.
            spi.transfer(ret).map_err(Error::Spi)?;
            Ok(())
        })?
    }

    /// Writes to sequential registers. Writing will start at `reg` and continue
    /// sequentially until `data` is empty.
    fn write_registers(&mut self, reg: Register, data: &[u8]) -> Result<(), SPIE, CSE> {
        let mut hdr = [Instruction::Write as u8, reg as u8];
        self.with_cs(|spi| -> Result<_, _, _> {
            spi.transfer(&mut hdr).map_err(Error::Spi)?;
            for d in data {
                let mut data = [*d];
                spi.transfer(&mut data).map_err(Error::Spi)?;
            }
            Ok(())
        })?
    }

    /// Sends `instruction` followed by `data` in one transaction.
    fn write_instruction(&mut self, instruction: u8, data: &[u8]) -> Result<(), SPIE, CSE> {
        self.with_cs(|spi| -> Result<_, _, _> {
            spi.transfer(&mut [instruction]).map_err(Error::Spi)?;
            for d in data {
                let mut data = [*d];
                spi.transfer(&mut data).map_err(Error::Spi)?;
            }
            Ok(())
        })?
    }

    /// Sends `instruction`, then reads until `ret` is full, in one
    /// transaction.
    fn read_instruction(&mut self, instruction: u8, ret: &mut [u8]) -> Result<(), SPIE, CSE> {
        self.with_cs(|spi| -> Result<_, _, _> {
            spi.transfer(&mut [instruction]).map_err(Error::Spi)?;
            spi.transfer(ret).map_err(Error::Spi)?;
            Ok(())
        })?
    }

    /// Transfers an array of bytes via SPI, returning the slave response inside
    /// the given mutable bytes array.
    ///
    /// # Returns
    ///
    /// Returns the last element received from the slave. If no bytes were sent,
    /// 0 is returned.
    fn transfer(&mut self, bytes: &mut [u8]) -> Result<u8, SPIE, CSE> {
        self.with_cs(|spi| spi.transfer(bytes).map(|_| ()))?
            .map_err(Error::Spi)?;
        if let [.., data] = bytes {
            Ok(*data)
        } else {
            Ok(0)
        }
    }

    /// Calls a function `f` after bringing the chip select pin low, restoring
    /// it to high after the function has finished.
    fn with_cs<T>(&mut self, f: impl FnOnce(&mut SPI) -> T) -> Result<T, SPIE, CSE> {
        self.cs.set_low().map_err(Error::Hal)?;
        let result = f(&mut self.spi);
        self.cs.set_high().map_err(Error::Hal)?;
        Ok(result)
    }
}

impl<'a, SPI, CS, D, CLK, SPIE, CSE, const N: usize> Can for MCP2515<'a, SPI, CS, D, CLK, N>
where
    SPI: Transfer<u8, Error = SPIE>,
    CS: OutputPin<Error = CSE>,
    D: DelayUs<u16>,
    CLK: Clock,
    SPIE: Debug,
    CSE: Debug,
{
    type Frame = CanPacket;
    type Error = Error<SPIE, CSE>;

    #[inline]
    fn transmit(&mut self, frame: &Self::Frame) -> Result<(), SPIE, CSE> {
        self.write_packet(frame)
    }

    #[inline]
    fn receive(&mut self) -> Result<Self::Frame, SPIE, CSE> {
        self.receive_packet()
    }
}
