//! orderpulse CLI - live dashboard over a directory of exported warehouse tables

use std::io::{self, BufRead};
use std::sync::mpsc::Sender;
use std::thread;

use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use orderpulse::{
    ChannelTriggers, ConfigResolver, ConsolePresenter, CsvWarehouse, OutputFormat, RefreshLoop,
    Result, ResultCache, Trigger,
};

const LOG_ENV_VAR: &str = "ORDERPULSE_LOG";
const DATA_DIR_ENV_VAR: &str = "ORDERPULSE_DATA_DIR";
const FORMAT_ENV_VAR: &str = "ORDERPULSE_FORMAT";
const DEFAULT_DATA_DIR: &str = "data";

fn main() -> Result<()> {
    init_tracing();

    let data_dir = std::env::var(DATA_DIR_ENV_VAR).unwrap_or_else(|_| DEFAULT_DATA_DIR.to_string());
    let format = match std::env::var(FORMAT_ENV_VAR) {
        Ok(value) => value.parse::<OutputFormat>()?,
        Err(_) => OutputFormat::Table,
    };

    println!("orderpulse v{}", env!("CARGO_PKG_VERSION"));
    println!("Commands: <enter> rerun, 'r' refresh now, 'q' quit.\n");
    info!(data_dir = %data_dir, %format, "starting dashboard");

    let cache = ResultCache::new();
    let resolver = ConfigResolver::standard();
    let warehouse = CsvWarehouse::new(&data_dir);
    let presenter = ConsolePresenter::stdout(format);

    let (tx, mut triggers) = ChannelTriggers::channel();
    spawn_stdin_reader(tx);

    let mut refresh = RefreshLoop::new(&cache, warehouse, &resolver, presenter);
    let summary = refresh.run(&mut triggers)?;

    let stats = cache.stats();
    info!(
        cycles = summary.cycles,
        aborted = summary.aborted,
        cache_hit_rate = stats.hit_rate(),
        "dashboard stopped"
    );
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_env(LOG_ENV_VAR)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

/// Forward stdin commands as triggers. EOF or a closed loop ends the thread.
fn spawn_stdin_reader(tx: Sender<Trigger>) {
    thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            let trigger = match line.trim().to_lowercase().as_str() {
                "" => Trigger::Rerun,
                "r" | "refresh" => Trigger::RefreshNow,
                "q" | "quit" | "exit" => Trigger::Shutdown,
                other => {
                    warn!(command = other, "unknown command");
                    continue;
                }
            };
            if tx.send(trigger).is_err() || trigger == Trigger::Shutdown {
                return;
            }
        }
        let _ = tx.send(Trigger::Shutdown);
    });
}
