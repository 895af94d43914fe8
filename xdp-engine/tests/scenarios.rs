//! The three reference scenarios of the ring protocol.

use xdp_engine::{
    Direction, RxFrame, Violation, XdpConfig, loopback,
    ring::local_pair,
};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn scenario_a_receive_recycles_every_frame() {
    init_logger();
    let config = XdpConfig {
        frame_count: 4,
        batch_size: 4,
        direction: Direction::Rx,
        huge_page: Some(false),
        ..XdpConfig::default().with_ring_size(4)
    };
    let (mut socket, mut sim) = loopback(&config).unwrap();
    assert_eq!(socket.rx_frames(), 4);
    assert_eq!(sim.fill_pending(), 4);

    for _ in 0..4 {
        assert!(sim.deliver_len(60).unwrap());
    }
    assert_eq!(sim.fill_pending(), 0);
    assert_eq!(sim.rx_pending(), 4);

    let mut seen = Vec::new();
    let n = socket
        .receive_batch(&mut |frame: RxFrame<'_>| seen.push((frame.addr, frame.len)))
        .unwrap();
    assert_eq!(n, 4);
    assert_eq!(seen.len(), 4);
    assert!(seen.iter().all(|&(_, len)| len == 60));
    let mut addrs: Vec<u64> = seen.iter().map(|&(addr, _)| addr).collect();
    addrs.sort_unstable();
    assert_eq!(addrs, vec![0, 2048, 4096, 6144]);

    assert_eq!(sim.fill_pending(), 4);
    assert_eq!(sim.rx_pending(), 0);
}

#[test]
fn scenario_b_tx_backpressure_until_completion() {
    init_logger();
    let config = XdpConfig {
        frame_count: 4,
        batch_size: 1,
        direction: Direction::Tx,
        retry_budget: 4,
        huge_page: Some(false),
        ..XdpConfig::default().with_ring_size(1)
    };
    let (mut socket, mut sim) = loopback(&config).unwrap();
    let mut source = |frame: &mut [u8]| {
        frame[..4].copy_from_slice(b"ping");
        Some(60)
    };

    let first = socket.send_batch(1, &mut source).unwrap();
    assert_eq!(first.queued, 1);
    assert_eq!(socket.tx_in_flight(), 1);

    // the only tx slot still holds the unacknowledged send
    let blocked = socket.send_batch(1, &mut source).unwrap();
    assert_eq!(blocked.queued, 0);
    assert!(!blocked.drained);
    assert_eq!(socket.stats().snapshot().tx_ring_full, 1);

    let packets = sim.transmit(1).unwrap();
    assert_eq!(packets.len(), 1);
    assert_eq!(&packets[0][..4], b"ping");
    assert_eq!(sim.complete(1).unwrap(), 1);

    let second = socket.send_batch(1, &mut source).unwrap();
    assert_eq!(second.queued, 1);
    assert_eq!(socket.stats().snapshot().tx_completions, 1);
}

#[test]
fn scenario_b_raw_ring() {
    let (mut tx, mut kernel) = local_pair::<u64>(1).unwrap();
    assert_eq!(tx.reserve(1).0, 1);
    tx.submit(1).unwrap();
    assert_eq!(tx.reserve(1).0, 0);
    assert_eq!(tx.reserve(1).0, 0);

    let (n, _) = kernel.peek(1);
    kernel.release(n).unwrap();
    assert_eq!(tx.reserve(1).0, 1);
}

#[test]
fn scenario_c_submit_beyond_reservation() {
    let (mut prod, _cons) = local_pair::<u64>(8).unwrap();
    assert_eq!(prod.reserve(3).0, 3);
    let err = prod.submit(5).unwrap_err();
    assert_eq!(
        err,
        Violation::SubmitOverflow {
            requested: 5,
            reserved: 3
        }
    );
    let err: xdp_engine::RingError = err.into();
    assert!(err.is_protocol_violation());
}
