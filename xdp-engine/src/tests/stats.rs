use crate::stats::{Stats, StatsSnapshot};

#[test]
fn test_snapshot_and_reset() {
    let stats = Stats::new();
    stats.record_rx(4, 240);
    stats.record_rx(1, 60);
    stats.record_tx(2, 120);
    stats.record_completions(2);
    stats.record_rx_wakeup();
    stats.record_wakeup_error();
    stats.record_fill_retry();
    stats.record_tx_ring_full();

    let snap = stats.snapshot();
    assert_eq!(snap.rx_packets, 5);
    assert_eq!(snap.rx_bytes, 300);
    assert_eq!(snap.tx_packets, 2);
    assert_eq!(snap.tx_completions, 2);
    assert_eq!(snap.rx_wakeups, 1);
    assert_eq!(snap.tx_wakeups, 0);
    assert_eq!(snap.wakeup_errors, 1);
    assert_eq!(snap.fill_retries, 1);
    assert_eq!(snap.tx_ring_full, 1);

    stats.reset();
    assert_eq!(stats.snapshot(), StatsSnapshot::default());
}

#[test]
fn test_rates() {
    let snap = StatsSnapshot {
        rx_packets: 1000,
        tx_packets: 500,
        ..Default::default()
    };
    assert_eq!(snap.rx_pps(2.0), 500.0);
    assert_eq!(snap.tx_pps(0.5), 1000.0);
    assert_eq!(snap.rx_pps(0.0), 0.0);
}
