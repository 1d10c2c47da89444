use std::cell::Cell;
use std::sync::{Arc, Mutex, MutexGuard};

use embedded_hal::blocking::delay::DelayUs;
use embedded_hal::blocking::spi::Transfer;
use embedded_hal::digital::v2::OutputPin;
use embedded_time::clock::Error;
use embedded_time::duration::Duration;
use embedded_time::fixed_point::FixedPoint;
use embedded_time::fraction::Fraction;
use embedded_time::timer::param::{Armed, OneShot};
use embedded_time::{Clock, Instant, Timer};
use mockall::mock;

use crate::interrupt::{InterruptPin, LineId};
use crate::MCP2515;

/// Millisecond clock advancing by `step` on every reading.
#[derive(Debug)]
pub struct TestClock {
    now: Cell<u64>,
    step: u64,
}

impl TestClock {
    pub fn new(step: u64) -> Self {
        Self {
            now: Cell::new(0),
            step,
        }
    }
}

impl Clock for TestClock {
    type T = u64;
    const SCALING_FACTOR: Fraction = Fraction::new(1, 1_000);

    fn try_now(&self) -> Result<Instant<Self>, Error> {
        let now = self.now.get();
        self.now.set(now + self.step);
        Ok(Instant::new(now))
    }

    fn new_timer<Dur>(&self, duration: Dur) -> Timer<OneShot, Armed, Self, Dur>
    where
        Dur: Duration + FixedPoint,
    {
        Timer::new(self, duration)
    }
}

mock! {
    pub SPIBus {}

    impl Transfer<u8> for SPIBus {
        type Error = u32;

        fn transfer<'w>(&mut self, words: &'w mut [u8]) -> Result<&'static [u8], u32>;
    }
}

mock! {
    pub Pin {}

    impl OutputPin for Pin {
        type Error = u32;

        fn set_low(&mut self) -> Result<(), u32>;
        fn set_high(&mut self) -> Result<(), u32>;
    }
}

mock! {
    pub Delay {}

    impl DelayUs<u16> for Delay {
        fn delay_us(&mut self, us: u16);
    }
}

mock! {
    pub IrqPin {}

    impl InterruptPin for IrqPin {
        fn line(&self) -> LineId;
        fn attach(&mut self);
        fn detach(&mut self);
    }
}

/// Error returned by [`FakeSpi`] while [`ChipState::spi_fault`] is set.
pub const SPI_FAULT: u32 = 0xDEAD;

pub const CANSTAT: usize = 0x0E;
pub const CANCTRL: usize = 0x0F;
pub const REC: usize = 0x1D;
pub const CNF3: usize = 0x28;
pub const CNF2: usize = 0x29;
pub const CNF1: usize = 0x2A;
pub const CANINTE: usize = 0x2B;
pub const CANINTF: usize = 0x2C;
pub const TXB0CTRL: usize = 0x30;
pub const RXB0CTRL: usize = 0x60;
pub const RXB1CTRL: usize = 0x70;

/// What the fake does with a transmission request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxOutcome {
    /// Sent right away: `TXREQ` clears and `TXnIF` is raised.
    Complete,
    /// Stays in the buffer until [`FakeChip::complete_tx`] or an abort.
    Hold,
    /// Bus error: `TXERR` and `MERRF` are raised, `TXREQ` stays set.
    Fail,
}

/// Register-level model of an MCP2515 behind SPI.
#[derive(Debug)]
pub struct ChipState {
    pub regs: [u8; 0x80],
    pub tx_outcome: TxOutcome,
    /// Ignore mode requests written to `CANCTRL`.
    pub ignore_reqop: bool,
    /// Number of `CANSTAT` reads before a sleep request shows.
    pub sleep_delay: usize,
    pub spi_fault: bool,
    /// Every command sent, one entry per chip select.
    pub transactions: Vec<Vec<u8>>,
    /// Tx buffer contents (SIDH to D7) at every transmission request.
    pub sent: Vec<[u8; 13]>,
    selected: bool,
    frame: Vec<u8>,
    pending_sleep: usize,
}

impl ChipState {
    fn new() -> Self {
        let mut chip = Self {
            regs: [0; 0x80],
            tx_outcome: TxOutcome::Complete,
            ignore_reqop: false,
            sleep_delay: 0,
            spi_fault: false,
            transactions: Vec::new(),
            sent: Vec::new(),
            selected: false,
            frame: Vec::new(),
            pending_sleep: 0,
        };
        chip.reset();
        chip
    }

    fn reset(&mut self) {
        self.regs = [0; 0x80];
        self.regs[CANCTRL] = 0x87;
        self.regs[CANSTAT] = 0x80;
        self.pending_sleep = 0;
    }

    fn select(&mut self) {
        self.selected = true;
        self.frame.clear();
    }

    fn deselect(&mut self) {
        self.selected = false;
        if let Some(&cmd) = self.frame.first() {
            if cmd & 0xF9 == 0x90 {
                // READ RX BUFFER releases the buffer
                let n = (cmd >> 2) & 1;
                self.regs[CANINTF] &= !(1 << n);
            }
            self.transactions.push(std::mem::take(&mut self.frame));
        }
    }

    fn clock_byte(&mut self, byte: u8) -> u8 {
        let idx = self.frame.len();
        self.frame.push(byte);
        let cmd = self.frame[0];
        match cmd {
            0xC0 if idx == 0 => {
                self.reset();
                0
            }
            0x03 if idx >= 2 => self.read(self.frame[1] as usize + idx - 2),
            0x02 if idx >= 2 => {
                self.write(self.frame[1] as usize + idx - 2, byte);
                0
            }
            0x05 if idx == 3 => {
                let addr = self.frame[1] as usize;
                let mask = self.frame[2];
                let value = (self.regs[addr & 0x7F] & !mask) | (byte & mask);
                self.write(addr, value);
                0
            }
            0x40..=0x45 if idx >= 1 => {
                let n = ((cmd >> 1) & 0x3) as usize;
                let start = 0x31 + 0x10 * n + if cmd & 1 != 0 { 5 } else { 0 };
                self.regs[(start + idx - 1) & 0x7F] = byte;
                0
            }
            0x90..=0x96 if idx >= 1 => {
                let n = ((cmd >> 2) & 1) as usize;
                let start = 0x61 + 0x10 * n + if cmd & 2 != 0 { 5 } else { 0 };
                self.regs[(start + idx - 1) & 0x7F]
            }
            _ => 0,
        }
    }

    fn read(&mut self, addr: usize) -> u8 {
        let addr = addr & 0x7F;
        if addr == CANSTAT && self.pending_sleep > 0 {
            self.pending_sleep -= 1;
            if self.pending_sleep == 0 {
                self.regs[CANSTAT] = (self.regs[CANSTAT] & 0x1F) | 0x20;
            }
        }
        self.regs[addr]
    }

    fn write(&mut self, addr: usize, value: u8) {
        let addr = addr & 0x7F;
        match addr {
            CANSTAT => {}
            CANCTRL => self.write_canctrl(value),
            0x30 | 0x40 | 0x50 => self.write_txb_ctrl(addr, value),
            _ => self.regs[addr] = value,
        }
    }

    fn write_canctrl(&mut self, value: u8) {
        let old = self.regs[CANCTRL];
        let value = if self.ignore_reqop {
            (value & 0x1F) | (old & 0xE0)
        } else {
            value
        };
        self.regs[CANCTRL] = value;

        if value & 0x10 != 0 {
            for ctrl in [0x30, 0x40, 0x50] {
                if self.regs[ctrl] & 0x08 != 0 {
                    self.regs[ctrl] = (self.regs[ctrl] & !0x08) | 0x40;
                }
            }
        }

        let reqop = value & 0xE0;
        if reqop == 0x20 && self.sleep_delay > 0 {
            if self.regs[CANSTAT] & 0xE0 != 0x20 && self.pending_sleep == 0 {
                self.pending_sleep = self.sleep_delay;
            }
        } else {
            self.pending_sleep = 0;
            self.regs[CANSTAT] = (self.regs[CANSTAT] & 0x1F) | reqop;
        }
    }

    fn write_txb_ctrl(&mut self, addr: usize, value: u8) {
        let old = self.regs[addr];
        self.regs[addr] = value;
        if value & 0x08 == 0 || old & 0x08 != 0 {
            return;
        }

        let mut contents = [0u8; 13];
        contents.copy_from_slice(&self.regs[addr + 1..addr + 14]);
        self.sent.push(contents);

        let n = (addr - TXB0CTRL) / 0x10;
        self.regs[addr] &= !0x70;
        match self.tx_outcome {
            TxOutcome::Complete => {
                self.regs[addr] &= !0x08;
                self.regs[CANINTF] |= 0x04 << n;
            }
            TxOutcome::Hold => {}
            TxOutcome::Fail => {
                self.regs[addr] |= 0x10;
                self.regs[CANINTF] |= 0x80;
            }
        }
    }
}

/// Handle on the state shared by [`FakeSpi`] and [`FakeCs`].
#[derive(Debug, Clone)]
pub struct FakeChip(Arc<Mutex<ChipState>>);

impl FakeChip {
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(ChipState::new())))
    }

    pub fn state(&self) -> MutexGuard<'_, ChipState> {
        self.0.lock().unwrap()
    }

    pub fn reg(&self, addr: usize) -> u8 {
        self.state().regs[addr]
    }

    pub fn set_reg(&self, addr: usize, value: u8) {
        self.state().regs[addr] = value;
    }

    pub fn set_tx_outcome(&self, outcome: TxOutcome) {
        self.state().tx_outcome = outcome;
    }

    /// Finishes the transmission held in Tx buffer `n`.
    pub fn complete_tx(&self, n: usize) {
        let mut chip = self.state();
        let ctrl = TXB0CTRL + 0x10 * n;
        assert!(chip.regs[ctrl] & 0x08 != 0, "no transmission pending");
        chip.regs[ctrl] &= !0x08;
        chip.regs[CANINTF] |= 0x04 << n;
    }

    /// Places a frame into Rx buffer `n`. `header` is SIDH, SIDL, EID8, EID0
    /// and DLC.
    pub fn inject_rx(&self, n: usize, header: [u8; 5], data: &[u8]) {
        let mut chip = self.state();
        let start = 0x61 + 0x10 * n;
        chip.regs[start..start + 5].copy_from_slice(&header);
        chip.regs[start + 5..start + 5 + data.len()].copy_from_slice(data);
        chip.regs[CANINTF] |= 1 << n;
    }

    pub fn transactions(&self) -> Vec<Vec<u8>> {
        self.state().transactions.clone()
    }

    pub fn clear_log(&self) {
        let mut chip = self.state();
        chip.transactions.clear();
        chip.sent.clear();
    }

    pub fn sent(&self) -> Vec<[u8; 13]> {
        self.state().sent.clone()
    }

    pub fn spi(&self) -> FakeSpi {
        FakeSpi(self.clone())
    }

    pub fn cs(&self) -> FakeCs {
        FakeCs(self.clone())
    }
}

pub struct FakeSpi(FakeChip);

impl Transfer<u8> for FakeSpi {
    type Error = u32;

    fn transfer<'w>(&mut self, words: &'w mut [u8]) -> Result<&'w [u8], u32> {
        let mut chip = self.0.state();
        if chip.spi_fault {
            return Err(SPI_FAULT);
        }
        assert!(chip.selected, "SPI transfer without chip select");
        for word in words.iter_mut() {
            *word = chip.clock_byte(*word);
        }
        drop(chip);
        Ok(words)
    }
}

pub struct FakeCs(FakeChip);

impl OutputPin for FakeCs {
    type Error = u32;

    fn set_low(&mut self) -> Result<(), u32> {
        self.0.state().select();
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), u32> {
        self.0.state().deselect();
        Ok(())
    }
}

pub type FakeMcp<'a, const N: usize> = MCP2515<'a, FakeSpi, FakeCs, MockDelay, TestClock, N>;

/// A driver wired to a fresh fake chip, not yet initialized. The clock
/// advances by one millisecond per reading.
pub fn fake_mcp<'a, const N: usize>() -> (FakeMcp<'a, N>, FakeChip) {
    let chip = FakeChip::new();
    let mut delay = MockDelay::new();
    delay.expect_delay_us().return_const(());
    let mcp = MCP2515::new(chip.spi(), chip.cs(), delay, TestClock::new(1));
    (mcp, chip)
}
