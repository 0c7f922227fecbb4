use mailslot::control::{CHANGE_MAX_DATA_UNIT_SIZE, GET_FREESPACE_SIZE};
use mailslot::{Error, Mailslot, MailslotConfig, Registry, RegistryConfig};

fn slot(max_storage: usize, unit: usize) -> Mailslot {
    Mailslot::new(0, MailslotConfig::with_capacity(max_storage, unit)).expect("slot")
}

#[test]
fn empty_write_is_rejected() {
    let slot = slot(64, 16);
    let err = slot.write(b"").expect_err("empty");
    assert!(matches!(err, Error::MessageTooLarge { len: 0, .. }));
    assert_eq!(slot.free_space(), 64);
}

#[test]
fn write_at_unit_size_succeeds_and_one_past_fails() {
    let slot = slot(64, 16);
    assert_eq!(slot.write(&[7u8; 16]).expect("exact"), 16);
    let err = slot.write(&[7u8; 17]).expect_err("one past");
    assert!(matches!(err, Error::MessageTooLarge { len: 17, max: 16 }));
    assert_eq!(slot.stats().pending_count, 1);
}

#[test]
fn capacity_twenty_unit_ten() {
    let slot = Mailslot::new(0, MailslotConfig::with_capacity(20, 10).non_blocking())
        .expect("slot");
    assert_eq!(slot.write(b"hello").expect("write"), 5);
    assert_eq!(slot.free_space(), 15);

    let err = slot.write(&[0u8; 16]).expect_err("above unit size");
    assert!(matches!(err, Error::MessageTooLarge { len: 16, max: 10 }));

    slot.set_max_data_unit_size(16).expect("raise unit size");
    let err = slot.write(&[0u8; 16]).expect_err("above free space");
    assert!(matches!(err, Error::WouldBlock));
    assert_eq!(slot.free_space(), 15);
}

#[test]
fn shrinking_unit_size_keeps_queued_lengths() {
    let slot = slot(64, 16);
    slot.write(b"early").expect("5-byte write");

    slot.set_max_data_unit_size(2).expect("shrink");
    assert_eq!(slot.write(b"x").expect("1-byte write"), 1);
    assert!(matches!(
        slot.write(b"xyz"),
        Err(Error::MessageTooLarge { len: 3, max: 2 })
    ));

    let mut buf = [0u8; 16];
    assert_eq!(slot.read(&mut buf).expect("read"), 5);
    assert_eq!(&buf[..5], b"early");
    assert_eq!(slot.read(&mut buf).expect("read"), 1);
}

#[test]
fn driver_message_length_sequence() {
    let registry = Registry::new(RegistryConfig {
        max_minor: 4,
        slot: MailslotConfig::default(),
    })
    .expect("registry");
    let session = registry.open(1).expect("open");
    let mut buf = [0u8; 8];

    assert!(session.write(b"").is_err());
    session.ioctl(CHANGE_MAX_DATA_UNIT_SIZE, 2).expect("unit 2");
    assert!(session.write(b"test\0").is_err());
    assert_eq!(session.write(b"t\0").expect("2 bytes"), 2);
    session.ioctl(CHANGE_MAX_DATA_UNIT_SIZE, 5).expect("unit 5");
    assert_eq!(session.write(b"test\0").expect("5 bytes"), 5);

    assert!(matches!(
        session.read(&mut buf[..1]),
        Err(Error::BufferTooSmall { required: 2, available: 1 })
    ));
    assert_eq!(session.read(&mut buf[..2]).expect("2-byte read"), 2);
    assert!(matches!(
        session.read(&mut buf[..2]),
        Err(Error::BufferTooSmall { required: 5, available: 2 })
    ));
    assert_eq!(session.read(&mut buf[..5]).expect("5-byte read"), 5);
    assert_eq!(&buf[..5], b"test\0");

    assert_eq!(
        session.ioctl(GET_FREESPACE_SIZE, 0).expect("free space"),
        mailslot::core::MAX_STORAGE as u64
    );
}
