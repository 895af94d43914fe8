//! Receives packets on one interface queue and prints each one as hex.
//!
//! The queue must already be redirected to an AF_XDP socket by an XDP
//! program; this tool only binds to it.

use clap::Parser;
use tokio_util::sync::CancellationToken;
use xdp_engine::{Direction, EventLoop, RxFrame, Socket, XdpConfig};
use xdp_tools::{REQUIRED_CAPS, hex, init_logger, require_caps, run_until_ctrl_c};

#[derive(Parser, Debug)]
#[command(arg_required_else_help = true)]
struct Args {
    /// Network interface, e.g. eth0
    device: String,

    /// Receive queue of the interface
    queue_id: u32,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logger();
    require_caps(REQUIRED_CAPS)?;

    let config = XdpConfig::default()
        .with_direction(Direction::Rx)
        .apply_env()?;
    let token = CancellationToken::new();
    let loop_token = token.clone();

    let report = run_until_ctrl_c(token, move || {
        let socket = Socket::bind(&args.device, args.queue_id, &config)?;
        let stats = socket.stats().clone();
        log::info!("waiting for packets on {} queue {}", args.device, args.queue_id);
        let mut event_loop = EventLoop::with_token(socket, loop_token);
        let report = event_loop.run_rx(&mut |frame: RxFrame<'_>| {
            println!("packet: {}", hex(frame.data));
        })?;
        Ok((report, stats.snapshot()))
    })
    .await?;

    let (report, stats) = report;
    log::info!(
        "received {} packets ({} bytes), {} rx wakeups",
        report.received,
        stats.rx_bytes,
        stats.rx_wakeups
    );
    Ok(())
}
