//! UDP feed handler: network thread -> SPSC queue -> pinned matching thread.

use std::io::BufRead;
use std::net::UdpSocket;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use flash_feed::config::ConfigError;
use flash_feed::engine::{pin_to_core, Engine};
use flash_feed::feed::{FeedHandler, FeedStats};
use flash_feed::report::{LatencySummary, PipelineReport};
use flash_feed::{
    BookEvent, ChannelListener, LoggingListener, MetricsListener, PipelineConfig, QueueItem,
    SpscQueue, TscClock,
};
use hdrhistogram::Histogram;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Book events buffered between the engine and the telemetry thread.
const EVENT_RING: usize = 1 << 16;

/// Interval between status lines.
const STATUS_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Parser, Debug)]
#[command(name = "feed-handler", version, about = "Receive the UDP order feed and match it")]
struct Cli {
    #[command(flatten)]
    config: PipelineConfig,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Cli::parse().config;
    config.validate().context("invalid configuration")?;

    let clock = TscClock::calibrate(config.calibration_window());

    let (producer, mut consumer) = SpscQueue::with_capacity::<QueueItem>(config.queue_capacity)
        .map_err(ConfigError::from)?;
    let (event_tx, mut event_rx) = rtrb::RingBuffer::<BookEvent>::new(EVENT_RING);
    let mut latency = Histogram::<u64>::new_with_bounds(1, 60_000_000_000, 3)
        .map_err(ConfigError::from)?;

    let socket = UdpSocket::bind(config.bind).with_context(|| format!("bind {}", config.bind))?;
    info!(
        bind = %config.bind,
        queue = config.queue_capacity,
        book = config.book_capacity,
        "feed handler listening"
    );

    let shutdown = Arc::new(AtomicBool::new(false));
    let stats = Arc::new(FeedStats::new());

    // === Matching thread ===
    let engine_thread = {
        let shutdown = Arc::clone(&shutdown);
        let book_capacity = config.book_capacity;
        let engine_core = config.engine_core;
        thread::Builder::new()
            .name("engine".into())
            .spawn(move || {
                if let Some(core) = engine_core {
                    if !pin_to_core(core) {
                        warn!(core, "could not pin engine thread");
                    }
                }
                let listener = (MetricsListener::new(), ChannelListener::new(event_tx));
                let mut engine = Engine::new(book_capacity, listener);
                engine.warm_up();
                engine.run(&mut consumer, &shutdown, &clock, &mut latency);
                (engine, latency)
            })
            .context("spawn engine thread")?
    };

    // === Network thread ===
    let feed_thread = {
        let shutdown = Arc::clone(&shutdown);
        let stats = Arc::clone(&stats);
        let feed_core = config.feed_core;
        thread::Builder::new()
            .name("feed".into())
            .spawn(move || {
                if let Some(core) = feed_core {
                    if !pin_to_core(core) {
                        warn!(core, "could not pin feed thread");
                    }
                }
                let mut feed = FeedHandler::new(producer, clock, stats);
                let result = feed.run_udp(&socket, &shutdown);
                // A dead feed stops the pipeline
                shutdown.store(true, Ordering::Release);
                result
            })
            .context("spawn feed thread")?
    };

    // === Telemetry thread ===
    let telemetry_thread = {
        let shutdown = Arc::clone(&shutdown);
        let stats = Arc::clone(&stats);
        let log_events = config.log_events;
        thread::Builder::new()
            .name("telemetry".into())
            .spawn(move || {
                let mut logger = LoggingListener;
                let mut next_status = Instant::now() + STATUS_INTERVAL;
                loop {
                    let mut drained = 0usize;
                    while let Ok(event) = event_rx.pop() {
                        drained += 1;
                        if log_events {
                            event.notify(&mut logger);
                        }
                    }
                    if Instant::now() >= next_status {
                        let s = stats.snapshot();
                        info!(
                            received = s.received,
                            accepted = s.accepted,
                            dropped = s.dropped,
                            malformed = s.malformed,
                            high_water = s.high_water,
                            "feed status"
                        );
                        next_status += STATUS_INTERVAL;
                    }
                    if drained == 0 {
                        if shutdown.load(Ordering::Acquire) && event_rx.is_abandoned() {
                            break;
                        }
                        thread::sleep(Duration::from_millis(1));
                    }
                }
            })
            .context("spawn telemetry thread")?
    };

    wait_for_stop(config.run_for(), &shutdown);
    info!("shutting down");
    shutdown.store(true, Ordering::Release);

    let feed_result = feed_thread
        .join()
        .map_err(|_| anyhow!("feed thread panicked"))?;
    let (engine, latency) = engine_thread
        .join()
        .map_err(|_| anyhow!("engine thread panicked"))?;
    let stats_engine = engine.stats();
    let sequence = *engine.sequence();
    let (metrics, channel) = engine.matcher.into_listener();
    let events_dropped = channel.dropped();
    // Dropping the channel lets the telemetry thread see the ring abandoned
    drop(channel);
    telemetry_thread
        .join()
        .map_err(|_| anyhow!("telemetry thread panicked"))?;

    let report = PipelineReport {
        feed: stats.snapshot(),
        engine: stats_engine,
        sequence: &sequence,
        metrics: &metrics,
        events_dropped,
        latency: LatencySummary::from_histogram(&latency),
    };
    println!("\n{report}");

    feed_result.context("feed socket error")
}

/// Block until `duration` elapses, Enter is pressed (when no duration is
/// given), or another thread raises `shutdown`.
fn wait_for_stop(duration: Option<Duration>, shutdown: &Arc<AtomicBool>) {
    let deadline = duration.map(|d| Instant::now() + d);
    if deadline.is_none() {
        info!("press Enter to stop");
        let shutdown = Arc::clone(shutdown);
        // Detached: a blocked stdin read must not hold up exit
        let _ = thread::Builder::new().name("stdin".into()).spawn(move || {
            let mut line = String::new();
            // EOF (no terminal) keeps running
            if matches!(std::io::stdin().lock().read_line(&mut line), Ok(n) if n > 0) {
                shutdown.store(true, Ordering::Release);
            }
        });
    }

    while !shutdown.load(Ordering::Acquire) {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            break;
        }
        thread::sleep(Duration::from_millis(50));
    }
}
