//! UDP load generator emitting the binary order feed in micro-bursts.

use std::net::{SocketAddr, UdpSocket};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use flash_feed::sim::{MarketSim, SimConfig};
use flash_feed::wire;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "market-sim", version, about = "Send synthetic order flow over UDP")]
struct Cli {
    /// Feed handler address
    #[arg(long, default_value = "127.0.0.1:1234")]
    target: SocketAddr,

    /// Number of bursts to send (runs forever if omitted)
    #[arg(long)]
    bursts: Option<u64>,

    /// Prefix each message with a sequence header
    #[arg(long)]
    sequenced: bool,

    /// Skip one sequence number every N messages to exercise gap detection
    #[arg(long, default_value_t = 0)]
    skip_every: u64,

    /// RNG seed
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Minimum pause between bursts
    #[arg(long, default_value_t = 1)]
    min_pause_ms: u64,

    /// Maximum pause between bursts
    #[arg(long, default_value_t = 10)]
    max_pause_ms: u64,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let socket = UdpSocket::bind("0.0.0.0:0").context("bind sender socket")?;
    socket
        .connect(cli.target)
        .with_context(|| format!("connect {}", cli.target))?;

    let config = SimConfig {
        sequenced: cli.sequenced,
        skip_every: cli.skip_every,
        ..SimConfig::default()
    };
    let mut sim = MarketSim::new(cli.seed, config);
    let mut pause_rng = ChaCha8Rng::seed_from_u64(cli.seed.wrapping_add(1));

    info!(
        target = %cli.target,
        sequenced = cli.sequenced,
        seed = cli.seed,
        "market simulator started"
    );

    let mut burst = Vec::with_capacity(128);
    let mut packet = Vec::with_capacity(wire::MAX_MESSAGE_LEN);
    let mut sent: u64 = 0;
    let mut bursts: u64 = 0;
    let mut last_status = Instant::now();
    let started = Instant::now();

    while cli.bursts.map_or(true, |n| bursts < n) {
        burst.clear();
        sim.burst(&mut burst);

        for item in &burst {
            packet.clear();
            wire::encode(&mut packet, item);
            socket.send(&packet).context("send datagram")?;
            sent += 1;
        }
        bursts += 1;

        if last_status.elapsed() >= Duration::from_secs(1) {
            info!(sent, bursts, price = sim.price(), "sim status");
            last_status = Instant::now();
        }

        let pause = pause_rng.gen_range(cli.min_pause_ms..=cli.max_pause_ms.max(cli.min_pause_ms));
        thread::sleep(Duration::from_millis(pause));
    }

    info!(
        sent,
        bursts,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "market simulator finished"
    );
    Ok(())
}
