//! CLI for spindash — run the bike telemetry backend or replay an event log.

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};

use spindash_core::{
    Ack, IngestConfig, IngestCoordinator, JsonStore, MemoryStore, SensorEvent, StateStore,
    StatsAggregator,
};
use spindash_server::ServerConfig;

#[derive(Parser)]
#[command(name = "spindash")]
#[command(about = "spindash — session-aware telemetry backend for a connected exercise bike")]
#[command(version = spindash_core::VERSION)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the webhook ingest + dashboard query server
    Serve {
        /// Port to listen on
        #[arg(long, default_value = "8050")]
        port: u16,

        /// Bind address
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Shared secret the sensor must present. Falls back to
        /// $SPINDASH_API_KEY; with neither set, all pushes are refused.
        #[arg(long)]
        api_key: Option<String>,

        /// Samples retained per session (0 = unbounded)
        #[arg(long, default_value = "0")]
        max_points: usize,

        /// Milliseconds to pause after end_session before acknowledging,
        /// so a racing summary poll sees the end mark
        #[arg(long, default_value = "100")]
        end_quiesce_ms: u64,

        /// Persist session state to this JSON file (default: in-memory only)
        #[arg(long)]
        state_file: Option<String>,

        /// Authorize every /control caller (local development)
        #[arg(long)]
        dev_mode: bool,
    },

    /// Replay a JSONL event log through a local engine and print the summary
    Replay {
        /// Path to a file with one webhook event record per line
        path: String,

        /// Samples retained per session (0 = unbounded)
        #[arg(long, default_value = "0")]
        max_points: usize,
    },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            port,
            host,
            api_key,
            max_points,
            end_quiesce_ms,
            state_file,
            dev_mode,
        } => run_serve(
            &host,
            port,
            api_key,
            max_points,
            end_quiesce_ms,
            state_file.as_deref(),
            dev_mode,
        ),
        Commands::Replay { path, max_points } => run_replay(&path, max_points),
    }
}

fn run_serve(
    host: &str,
    port: u16,
    api_key: Option<String>,
    max_points: usize,
    end_quiesce_ms: u64,
    state_file: Option<&str>,
    dev_mode: bool,
) {
    let api_key = api_key.or_else(|| std::env::var("SPINDASH_API_KEY").ok());

    let store: Arc<dyn StateStore> = match state_file {
        Some(path) => match JsonStore::open(path) {
            Ok(store) => Arc::new(store),
            Err(e) => {
                eprintln!("Failed to open state file {path}: {e}");
                std::process::exit(1);
            }
        },
        None => Arc::new(MemoryStore::new()),
    };

    let ingest = IngestCoordinator::new(
        Arc::clone(&store),
        IngestConfig {
            max_points,
            end_quiesce: Duration::from_millis(end_quiesce_ms),
        },
    );
    let stats = StatsAggregator::new(store);

    let base = format!("http://{host}:{port}");
    println!("🚲 spindash v{}", spindash_core::VERSION);
    println!("   {base}");
    match state_file {
        Some(path) => println!("   state persisted to {path}"),
        None => println!("   in-memory state (lost on restart)"),
    }
    if api_key.is_none() {
        println!("   ⚠ no api key configured — all pushes will be refused");
        println!("     (pass --api-key or set SPINDASH_API_KEY)");
    }
    if dev_mode {
        println!("   dev mode: every /control caller is authorized");
    }
    println!();
    println!("   Endpoints:");
    println!("     POST /update     Sensor webhook (requires api key)");
    println!("     GET  /summary    Session summary (waiting / live / final)");
    println!("     GET  /series     Chart series for the retained session");
    println!("     GET  /control    Resistance-control authorization for the caller");
    println!("     GET  /health     Liveness");
    println!();
    println!("   Example push:");
    println!(
        "     curl -X POST {base}/update -H 'content-type: application/json' \\"
    );
    println!(
        "       -d '{{\"apikey\": \"...\", \"data\": {{\"event\": \"new_data\", \"t\": 1700000000, \"bike_mph\": 17.2, \"resistance\": 4, \"heart_bpm\": 141}}}}'"
    );
    println!();

    let config = ServerConfig { api_key, dev_mode };
    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(spindash_server::run_server(
        ingest, stats, config, host, port,
    ));
}

fn run_replay(path: &str, max_points: usize) {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => {
            eprintln!("Failed to read {path}: {e}");
            std::process::exit(1);
        }
    };

    let store = Arc::new(MemoryStore::new());
    let ingest = IngestCoordinator::new(
        store.clone(),
        IngestConfig {
            max_points,
            end_quiesce: Duration::ZERO,
        },
    );
    let stats = StatsAggregator::new(store);

    let mut appended = 0u64;
    let mut ignored = 0u64;
    let mut rejected = 0u64;
    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match SensorEvent::from_json(line).and_then(|event| ingest.submit(&event)) {
            Ok(Ack::IgnoredStale) => ignored += 1,
            Ok(_) => appended += 1,
            Err(e) => {
                rejected += 1;
                eprintln!("line {}: {e}", lineno + 1);
            }
        }
    }

    println!("{appended} handled, {ignored} ignored as stale, {rejected} rejected");
    match stats.summary() {
        Ok(summary) => match serde_json::to_string_pretty(&summary) {
            Ok(json) => println!("{json}"),
            Err(e) => eprintln!("Failed to encode summary: {e}"),
        },
        Err(e) => {
            eprintln!("Failed to compute summary: {e}");
            std::process::exit(1);
        }
    }
}
