use std::collections::HashMap;
use std::time::Duration;

use crate::config::{Direction, XdpConfig};
use crate::error::XdpError;

fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key: &str| map.get(key).cloned()
}

#[test]
fn test_default_is_valid() {
    let config = XdpConfig::default();
    config.validate().unwrap();
    assert_eq!(config.frame_size, 2048);
    assert_eq!(config.frame_count, 4096);
    assert_eq!(config.batch_size, 64);
    assert_eq!(config.direction, Direction::Both);
    assert!(config.need_wakeup);
}

#[test]
fn test_rejects_bad_values() {
    let cases = [
        XdpConfig {
            frame_size: 3000,
            ..Default::default()
        },
        XdpConfig {
            frame_size: 1024,
            ..Default::default()
        },
        XdpConfig {
            frame_count: 0,
            ..Default::default()
        },
        XdpConfig::default().with_ring_size(1000),
        XdpConfig {
            batch_size: 0,
            ..Default::default()
        },
        XdpConfig {
            batch_size: 128,
            ..XdpConfig::default().with_ring_size(64)
        },
        XdpConfig {
            retry_budget: 0,
            ..Default::default()
        },
    ];
    for config in cases {
        assert!(
            matches!(config.validate(), Err(XdpError::Config(_))),
            "{config:?} should be rejected"
        );
    }
}

#[test]
fn test_small_fill_ring_is_allowed() {
    let config = XdpConfig {
        fill_ring_size: 64,
        ..Default::default()
    };
    config.validate().unwrap();
}

#[test]
fn test_direction_halves() {
    assert!(Direction::Both.has_rx() && Direction::Both.has_tx());
    assert!(Direction::Rx.has_rx() && !Direction::Rx.has_tx());
    assert!(!Direction::Tx.has_rx() && Direction::Tx.has_tx());
}

#[test]
fn test_env_overlay() {
    let config = XdpConfig::default()
        .apply_vars(vars(&[
            ("XDP_FRAME_COUNT", "64"),
            ("XDP_BATCH_SIZE", " 16 "),
            ("XDP_RING_SIZE", "32"),
            ("XDP_ZERO_COPY", "off"),
            ("XDP_NEED_WAKEUP", "0"),
            ("XDP_RETRY_BUDGET", "3"),
            ("XDP_POLL_TIMEOUT_MS", "250"),
        ]))
        .unwrap();
    assert_eq!(config.frame_count, 64);
    assert_eq!(config.batch_size, 16);
    assert_eq!(config.fill_ring_size, 32);
    assert_eq!(config.tx_ring_size, 32);
    assert_eq!(config.zero_copy, Some(false));
    assert!(!config.need_wakeup);
    assert_eq!(config.retry_budget, 3);
    assert_eq!(config.poll_timeout, Some(Duration::from_millis(250)));
    assert_eq!(config.huge_page, None);
    config.validate().unwrap();
}

#[test]
fn test_env_zero_poll_timeout_blocks() {
    let config = XdpConfig::default()
        .apply_vars(vars(&[("XDP_POLL_TIMEOUT_MS", "0")]))
        .unwrap();
    assert_eq!(config.poll_timeout, None);
}

#[test]
fn test_env_malformed() {
    assert!(matches!(
        XdpConfig::default().apply_vars(vars(&[("XDP_FRAME_SIZE", "big")])),
        Err(XdpError::Config(_))
    ));
    assert!(matches!(
        XdpConfig::default().apply_vars(vars(&[("XDP_HUGE_PAGE", "maybe")])),
        Err(XdpError::Config(_))
    ));
}
