//! Sends dummy Ethernet frames out of one interface queue.

use std::time::Instant;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use xdp_engine::{Direction, EventLoop, Socket, XdpConfig};
use xdp_tools::{DummyFrames, REQUIRED_CAPS, init_logger, parse_mac, require_caps, run_until_ctrl_c};

#[derive(Parser, Debug)]
#[command(arg_required_else_help = true)]
struct Args {
    /// Network interface, e.g. eth0
    device: String,

    /// Transmit queue of the interface
    queue_id: u32,

    /// Number of frames to send
    #[clap(short, long, default_value_t = 1)]
    count: u64,

    /// Frame length in bytes, Ethernet header included
    #[clap(short, long, default_value_t = 60)]
    size: usize,

    /// Source MAC address
    #[clap(long, default_value = "01:23:45:67:89:01", value_parser = parse_mac)]
    src_mac: [u8; 6],

    /// Destination MAC address
    #[clap(long, default_value = "ab:cd:ef:ab:cd:ef", value_parser = parse_mac)]
    dst_mac: [u8; 6],
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logger();
    require_caps(REQUIRED_CAPS)?;

    let config = XdpConfig::default()
        .with_direction(Direction::Tx)
        .apply_env()?;
    if args.size > config.frame_size as usize {
        anyhow::bail!(
            "frame size {} exceeds the UMEM frame size {}",
            args.size,
            config.frame_size
        );
    }
    let mut frames = DummyFrames::new(args.src_mac, args.dst_mac, args.size, args.count)?;
    let token = CancellationToken::new();
    let loop_token = token.clone();

    let started = Instant::now();
    let (report, stats) = run_until_ctrl_c(token, move || {
        let socket = Socket::bind(&args.device, args.queue_id, &config)?;
        let stats = socket.stats().clone();
        log::info!("sending {} packets on {} queue {}", args.count, args.device, args.queue_id);
        let mut event_loop = EventLoop::with_token(socket, loop_token);
        let report = event_loop.run_tx(&mut frames)?;
        Ok((report, stats.snapshot()))
    })
    .await?;

    let elapsed = started.elapsed().as_secs_f64();
    log::info!(
        "sent {} packets, {} confirmed, {:.0} pps",
        report.sent,
        stats.tx_completions,
        stats.tx_pps(elapsed)
    );
    if report.shutdown.tx_outstanding > 0 {
        log::warn!(
            "{} packets were never confirmed by the kernel",
            report.shutdown.tx_outstanding
        );
    }
    Ok(())
}
