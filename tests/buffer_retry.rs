use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use mailslot::{Error, Registry};

#[test]
fn short_buffer_retry_is_idempotent() {
    let registry = Registry::default();
    let session = registry.open(0).expect("open");
    session.write(b"first message").expect("write");
    session.write(b"second").expect("write");

    for _ in 0..3 {
        let err = session.recv(4).expect_err("too short");
        assert!(matches!(err, Error::BufferTooSmall { required: 13, available: 4 }));
        assert_eq!(err.errno(), libc::ENOBUFS);
        assert!(!err.is_retryable());
    }

    let stats = session.stats();
    assert_eq!(stats.pending_count, 2);
    assert_eq!(stats.storage_size, 19);

    assert_eq!(session.recv(13).expect("read"), b"first message");
    assert_eq!(session.recv(13).expect("read"), b"second");
}

#[test]
fn short_buffer_passes_message_to_next_waiting_reader() {
    let registry = Registry::default();
    let small = registry.open(1).expect("open");
    let large = registry.open(1).expect("open");
    let writer = registry.open(1).expect("open");

    let (small_tx, small_rx) = mpsc::channel();
    let (large_tx, large_rx) = mpsc::channel();
    thread::scope(|s| {
        s.spawn(|| {
            let _ = small_tx.send(small.recv(4));
        });
        s.spawn(|| {
            let _ = large_tx.send(large.recv(64).map_err(|err| err.to_string()));
        });
        thread::sleep(Duration::from_millis(100));

        writer.write(&[3u8; 32]).expect("write");
        let payload = large_rx
            .recv_timeout(Duration::from_secs(2))
            .expect("large reader woke")
            .expect("large read");
        assert_eq!(payload, vec![3u8; 32]);

        // The short reader either bounced off the message or is still waiting.
        match small_rx.recv_timeout(Duration::from_millis(100)) {
            Ok(res) => assert!(matches!(
                res,
                Err(Error::BufferTooSmall { required: 32, available: 4 })
            )),
            Err(_) => {
                writer.write(b"ok").expect("write");
                let res = small_rx
                    .recv_timeout(Duration::from_secs(2))
                    .expect("small reader woke");
                assert_eq!(res.expect("small read"), b"ok");
            }
        }
    });
}
