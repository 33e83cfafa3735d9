use std::time::Instant;

use anyhow::Result;
use clap::Parser;
use flash_feed::report::{distribution, LatencySummary};
use flash_feed::{
    wire, Clock, Engine, MonotonicClock, MsgType, NoopListener, QueueItem, Side, SpscQueue,
};
use hdrhistogram::Histogram;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "latency-report", version, about = "In-process decode + queue + match latency")]
struct Cli {
    /// Messages to push through the pipeline
    #[arg(long, default_value_t = 1_000_000)]
    iterations: u64,

    /// Resting order capacity
    #[arg(long, default_value_t = 1_000_000)]
    book_capacity: u32,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let cli = Cli::parse();

    info!("preparing latency benchmark");

    // Setup
    let (mut producer, mut consumer) = SpscQueue::with_capacity::<QueueItem>(1024)?;
    let mut engine = Engine::new(cli.book_capacity, NoopListener);
    engine.warm_up();
    let clock = MonotonicClock::new();

    let mut decode_hist = Histogram::<u64>::new_with_bounds(1, 100_000_000, 3)?;
    let mut match_hist = Histogram::<u64>::new_with_bounds(1, 100_000_000, 3)?;

    info!(iterations = cli.iterations, "running");

    let mut packet = Vec::with_capacity(wire::MAX_MESSAGE_LEN);
    let started = Instant::now();

    for order_id in 1..=cli.iterations {
        // Alternating sides around a band of prices keeps the book shallow
        let item = QueueItem {
            kind: MsgType::AddOrder,
            id: order_id,
            price: 10_000 + (order_id % 100) as i32,
            quantity: 10,
            side: if order_id % 2 == 0 { Side::Buy } else { Side::Sell },
            ..QueueItem::default()
        };
        packet.clear();
        wire::encode(&mut packet, &item);

        // Critical measurement section
        let t0 = clock.now_ns();
        if let Some(mut slot) = producer.claim() {
            if wire::decode_into(&packet, &mut slot).is_ok() {
                slot.recv_ns = t0;
                slot.publish();
            }
        }
        let t1 = clock.now_ns();
        if let Some(slot) = consumer.peek() {
            engine.process_item(std::hint::black_box(&slot));
            slot.advance();
        }
        let t2 = clock.now_ns();

        decode_hist.saturating_record(t1 - t0);
        match_hist.saturating_record(t2 - t1);
    }

    let elapsed = started.elapsed();

    println!("\n=== Latency Report (ns) ===");
    println!("Total Ops:  {}", cli.iterations);
    println!("Throughput: {:.2} ops/sec", cli.iterations as f64 / elapsed.as_secs_f64());
    println!("Resting:    {}", engine.order_count());
    println!("--- decode + publish ------");
    println!("{}", LatencySummary::from_histogram(&decode_hist));
    println!("--- peek + match ----------");
    println!("{}", LatencySummary::from_histogram(&match_hist));
    println!("---------------------------");

    println!("\nMatch distribution:");
    print!("{}", distribution(&match_hist));
    Ok(())
}
