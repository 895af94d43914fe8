//
// veth_tx.rs - Transmit over a real AF_XDP socket
//
// Purpose:
//   Sends frames through a kernel-bound socket on one end of a veth pair and
//   checks that the kernel confirms every one of them on the completion ring.
//
// How it works:
//   - Opt-in: runs only with XDP_ENGINE_VETH_TEST=1 and CAP_NET_ADMIN/CAP_NET_RAW,
//     otherwise it reports that it was skipped and passes.
//   - Creates the veth pair `xdpe0` + `xdpe1` with `ip link` (needs sudo).
//   - Binds a transmit-only socket in copy mode on `xdpe0` queue 0 and runs
//     the event loop on a blocking thread until the source is drained.
//

use std::time::Duration;

use xdp_engine::{Direction, EventLoop, Socket, XdpConfig};
use xdp_tools::veth::VethPair;
use xdp_tools::{DummyFrames, REQUIRED_CAPS, has_caps, parse_mac};

const FRAMES: u64 = 256;

#[tokio::main]
pub async fn main() -> anyhow::Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .is_test(true)
        .init();

    if std::env::var("XDP_ENGINE_VETH_TEST").as_deref() != Ok("1") {
        println!("veth_tx: skipped (set XDP_ENGINE_VETH_TEST=1 to run)");
        return Ok(());
    }
    if !has_caps(REQUIRED_CAPS) {
        println!("veth_tx: skipped (missing capabilities)");
        return Ok(());
    }

    let pair = VethPair::create("xdpe")?;
    // give the link a moment to come up before binding
    tokio::time::sleep(Duration::from_millis(300)).await;

    let device = pair.dev(0);
    let config = XdpConfig {
        frame_count: 1024,
        zero_copy: Some(false),
        ..XdpConfig::default().with_ring_size(512)
    }
    .with_direction(Direction::Tx);
    let src = parse_mac("02:00:00:00:00:01").map_err(anyhow::Error::msg)?;
    let dst = parse_mac("02:00:00:00:00:02").map_err(anyhow::Error::msg)?;
    let mut frames = DummyFrames::new(src, dst, 60, FRAMES)?;

    let (report, stats) = tokio::task::spawn_blocking(move || -> anyhow::Result<_> {
        let socket = Socket::bind(&device, 0, &config)?;
        let stats = socket.stats().clone();
        let report = EventLoop::new(socket).run_tx(&mut frames)?;
        Ok((report, stats.snapshot()))
    })
    .await??;

    log::info!("veth_tx: {report:?}");
    anyhow::ensure!(report.sent == FRAMES, "sent {} of {FRAMES}", report.sent);
    anyhow::ensure!(
        report.shutdown.tx_outstanding == 0,
        "{} frames never completed",
        report.shutdown.tx_outstanding
    );
    anyhow::ensure!(stats.tx_completions == FRAMES);
    drop(pair);
    println!("veth_tx: ok");
    Ok(())
}
