use crate::error::Error;
use crate::filter::{RxFilter, RxMask};
use crate::mocks::fake_mcp;
use crate::regs::OpMode;
use crate::Settings;
use embedded_hal::can::{ExtendedId, Id, StandardId};

const EXTENDED_ID: u32 = 0x12345678;

#[test]
fn test_set_filter_standard_id() {
    let (mut mcp, chip) = fake_mcp::<4>();
    mcp.init(Settings::default()).unwrap();

    mcp.set_filter(RxFilter::F1, Id::Standard(StandardId::new(0x123).unwrap()))
        .unwrap();

    assert_eq!([0x24, 0x60, 0x00, 0x00], chip.state().regs[0x04..0x08]);
    assert_eq!(Ok(OpMode::Normal), mcp.get_mode());
}

#[test]
fn test_set_mask_extended_id() {
    let (mut mcp, chip) = fake_mcp::<4>();
    mcp.init(Settings::default()).unwrap();

    mcp.set_mask(RxMask::Mask1, Id::Extended(ExtendedId::new(EXTENDED_ID).unwrap()))
        .unwrap();

    assert_eq!([0x91, 0xA8, 0x56, 0x78], chip.state().regs[0x24..0x28]);
}

#[test]
fn test_filter_leaves_device_in_normal_mode() {
    let (mut mcp, _chip) = fake_mcp::<4>();
    mcp.init(Settings {
        mode: OpMode::Loopback,
        ..Settings::default()
    })
    .unwrap();

    mcp.set_filter(RxFilter::F5, Id::Standard(StandardId::MAX)).unwrap();

    assert_eq!(Ok(OpMode::Normal), mcp.get_mode());
}

#[test]
fn test_filter_requires_configuration_mode() {
    let (mut mcp, chip) = fake_mcp::<4>();
    mcp.init(Settings::default()).unwrap();
    chip.state().ignore_reqop = true;

    let result = mcp.set_filter(RxFilter::F0, Id::Standard(StandardId::new(0x7F).unwrap()));

    assert_eq!(Err(Error::BadState), result);
    assert_eq!([0x00; 4], chip.state().regs[0x00..0x04]);
}

#[test]
fn test_filter_indices() {
    assert_eq!(Some(RxFilter::F3), RxFilter::from_index(3));
    assert_eq!(None, RxFilter::from_index(6));
    assert_eq!(Some(RxMask::Mask1), RxMask::from_index(1));
    assert_eq!(None, RxMask::from_index(2));
    assert_eq!(4, RxFilter::F4.index());
}
