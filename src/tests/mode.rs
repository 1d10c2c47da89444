use crate::error::Error;
use crate::mocks::{
    fake_mcp, CANCTRL, CANINTE, CANSTAT, CNF1, CNF2, CNF3, REC, RXB0CTRL, RXB1CTRL,
};
use crate::regs::{OpMode, RecvBufOpMode};
use crate::timing::{BitTiming, CanSpeed, McpSpeed};
use crate::Settings;

#[test]
fn test_init_defaults() {
    let (mut mcp, chip) = fake_mcp::<4>();
    mcp.init(Settings::default()).unwrap();

    let timing = BitTiming::lookup(McpSpeed::MHz16, CanSpeed::Kbps100);
    assert_eq!(timing.cnf1.into_bytes()[0], chip.reg(CNF1));
    assert_eq!(timing.cnf2.into_bytes()[0], chip.reg(CNF2));
    assert_eq!(timing.cnf3.into_bytes()[0], chip.reg(CNF3));

    // Rx buffers raise interrupts, receive any packet
    assert_eq!(0b0000_0011, chip.reg(CANINTE));
    assert_eq!(0b0110_0000, chip.reg(RXB0CTRL) & 0b0110_0000);
    assert_eq!(0b0110_0000, chip.reg(RXB1CTRL) & 0b0110_0000);

    assert_eq!(0, chip.reg(CANCTRL) & 0b0000_1100);
    assert_eq!(Ok(OpMode::Normal), mcp.get_mode());
    assert_eq!(0, chip.reg(CANSTAT) & 0b1110_0000);
}

#[test]
fn test_init_with_options() {
    let (mut mcp, chip) = fake_mcp::<4>();
    mcp.init(Settings {
        mode: OpMode::Loopback,
        can_speed: CanSpeed::Kbps500,
        mcp_speed: McpSpeed::MHz8,
        clkout_en: true,
        one_shot: true,
        wakeup_filter: true,
        rx_mode: RecvBufOpMode::FilterOn,
        ..Settings::default()
    })
    .unwrap();

    assert_eq!(Ok(OpMode::Loopback), mcp.get_mode());
    assert!(mcp.one_shot_mode());
    assert_eq!(McpSpeed::MHz8, mcp.mcp_speed());
    // CLKEN and OSM
    assert_eq!(0b0000_1100, chip.reg(CANCTRL) & 0b0000_1100);
    // SOF off for CLKOUT, WAKFIL on
    assert_eq!(0b0100_0000, chip.reg(CNF3) & 0b1100_0000);
    assert_eq!(0, chip.reg(RXB0CTRL) & 0b0110_0000);
}

#[test]
fn test_set_mode_round_trip() {
    let (mut mcp, _chip) = fake_mcp::<4>();
    mcp.init(Settings::default()).unwrap();

    for mode in [
        OpMode::Loopback,
        OpMode::ListenOnly,
        OpMode::Configuration,
        OpMode::Normal,
    ] {
        mcp.set_mode(mode).unwrap();
        assert_eq!(Ok(mode), mcp.get_mode());
    }
}

#[test]
fn test_mode_not_taken() {
    let (mut mcp, chip) = fake_mcp::<4>();
    mcp.init(Settings::default()).unwrap();
    chip.state().ignore_reqop = true;

    assert_eq!(Err(Error::BadState), mcp.set_mode(OpMode::Loopback));
    assert_eq!(Err(Error::BadState), mcp.set_listen_mode(true));
    assert_eq!(Ok(OpMode::Normal), mcp.get_mode());
}

#[test]
fn test_sleep_waits_for_status() {
    let (mut mcp, chip) = fake_mcp::<4>();
    mcp.init(Settings::default()).unwrap();
    chip.state().sleep_delay = 3;
    chip.clear_log();

    mcp.set_mode(OpMode::Sleep).unwrap();

    assert_eq!(0b0010_0000, chip.reg(CANSTAT) & 0b1110_0000);
    let status_reads = chip
        .transactions()
        .iter()
        .filter(|t| t.starts_with(&[0x03, CANSTAT as u8]))
        .count();
    assert_eq!(3, status_reads);
}

#[test]
fn test_leaving_sleep_wakes_device() {
    let (mut mcp, chip) = fake_mcp::<4>();
    mcp.init(Settings::default()).unwrap();
    mcp.set_mode(OpMode::Sleep).unwrap();
    chip.clear_log();

    mcp.set_mode(OpMode::Normal).unwrap();

    let transactions = chip.transactions();
    // WAKIE enabled, WAKIF raised, WAKIE restored, WAKIF cleared
    let wake = [
        vec![0x05, 0x2B, 0x40, 0x40],
        vec![0x05, 0x2C, 0x40, 0x40],
        vec![0x05, 0x2B, 0x40, 0x00],
        vec![0x05, 0x2C, 0x40, 0x00],
    ];
    assert_eq!(&wake[..], &transactions[1..5]);
    assert_eq!(Ok(OpMode::Normal), mcp.get_mode());
    assert_eq!(0b0000_0011, chip.reg(CANINTE));
}

#[test]
fn test_listen_accepting_invalid_widens_rx_buffers() {
    let (mut mcp, chip) = fake_mcp::<4>();
    mcp.init(Settings {
        rx_mode: RecvBufOpMode::FilterOn,
        ..Settings::default()
    })
    .unwrap();
    chip.set_reg(REC, 17);

    mcp.set_listen_mode(true).unwrap();
    assert_eq!(Ok(OpMode::ListenOnly), mcp.get_mode());
    assert_eq!(0b0110_0000, chip.reg(RXB0CTRL) & 0b0110_0000);
    assert_eq!(0b0110_0000, chip.reg(RXB1CTRL) & 0b0110_0000);
    assert!(mcp.accept_invalid);
    assert_eq!(17, mcp.rx_error_count);

    // Any other mode restores the configured receive mode
    mcp.set_mode(OpMode::Loopback).unwrap();
    assert!(!mcp.accept_invalid);
    assert_eq!(0, chip.reg(RXB0CTRL) & 0b0110_0000);
    assert_eq!(0, chip.reg(RXB1CTRL) & 0b0110_0000);
}

#[test]
fn test_plain_listen_keeps_rx_buffers() {
    let (mut mcp, chip) = fake_mcp::<4>();
    mcp.init(Settings {
        rx_mode: RecvBufOpMode::FilterOn,
        ..Settings::default()
    })
    .unwrap();

    mcp.set_mode(OpMode::ListenOnly).unwrap();
    assert!(!mcp.accept_invalid);
    assert_eq!(0, chip.reg(RXB0CTRL) & 0b0110_0000);
}

#[test]
fn test_receive_mode_deferred_while_accepting_invalid() {
    let (mut mcp, chip) = fake_mcp::<4>();
    mcp.init(Settings::default()).unwrap();
    mcp.set_listen_mode(true).unwrap();

    mcp.set_receive_mode(RecvBufOpMode::FilterOn).unwrap();
    assert_eq!(0b0110_0000, chip.reg(RXB0CTRL) & 0b0110_0000);

    mcp.set_listen_mode(false).unwrap();
    assert_eq!(0, chip.reg(RXB0CTRL) & 0b0110_0000);
    assert_eq!(0, chip.reg(RXB1CTRL) & 0b0110_0000);
}

#[test]
fn test_one_shot_and_wakeup_filter() {
    let (mut mcp, chip) = fake_mcp::<4>();
    mcp.init(Settings::default()).unwrap();

    mcp.set_one_shot_mode(true).unwrap();
    assert!(mcp.one_shot_mode());
    assert_eq!(0b0000_1000, chip.reg(CANCTRL) & 0b0000_1000);
    mcp.set_one_shot_mode(false).unwrap();
    assert_eq!(0, chip.reg(CANCTRL) & 0b0000_1000);

    mcp.set_mode(OpMode::Configuration).unwrap();
    mcp.set_wakeup_filter(true).unwrap();
    assert_eq!(0b0100_0000, chip.reg(CNF3) & 0b0100_0000);
}

#[test]
fn test_status_and_counters() {
    let (mut mcp, chip) = fake_mcp::<4>();
    mcp.init(Settings::default()).unwrap();
    chip.set_reg(REC, 3);
    chip.set_reg(0x1C, 9);

    assert_eq!(Ok(3), mcp.rx_error_counter());
    assert_eq!(Ok(9), mcp.tx_error_counter());
    assert_eq!(OpMode::Normal, mcp.read_status().unwrap().opmod());
}

#[test]
fn test_release_resets_device() {
    let (mut mcp, chip) = fake_mcp::<4>();
    mcp.init(Settings::default()).unwrap();

    let (_spi, _cs, _delay, _clock) = mcp.release();

    assert_eq!(0x87, chip.reg(CANCTRL));
    assert_eq!(0x80, chip.reg(CANSTAT));
}
