//! `storectl`: writes entries into a store from one simulated context and
//! watches them arrive in another.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use clap::Parser;
use diskstore::backend::{BackendRegistry, MemoryBackend, SharedMemory};
use diskstore::{
    BridgeConfig, ChangeBridge, Store, StoreEnv, StoreOptions, TokioScheduler, Value,
};
use tokio::runtime::Handle;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Demonstrates debounced persistence and cross-context notifications.
#[derive(Debug, Parser)]
#[command(name = "storectl", version, about)]
struct Cli {
    /// Store namespace.
    #[arg(long, env = "STORECTL_NAMESPACE", default_value = "default")]
    namespace: String,

    /// Physical key prefix.
    #[arg(long, env = "STORECTL_PREFIX", default_value = "DSto")]
    prefix: String,

    /// Debounce interval before a write reaches the backend.
    #[arg(long, env = "STORECTL_FLUSH_DELAY_MS", default_value_t = 15)]
    flush_delay_ms: u64,

    /// Emit logs as JSON.
    #[arg(long)]
    json_logs: bool,

    /// Entries to store, as `key=value`. Values are parsed as JSON and fall
    /// back to plain text.
    entries: Vec<String>,
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.compact().init();
    }
}

fn parse_entry(raw: &str) -> anyhow::Result<(String, Value)> {
    let (key, value) = raw
        .split_once('=')
        .with_context(|| format!("entry {raw:?} is not key=value"))?;
    anyhow::ensure!(!key.is_empty(), "entry {raw:?} has an empty key");
    let value =
        serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

fn context_env(backend: Arc<dyn diskstore::StorageBackend>) -> StoreEnv {
    let backends = BackendRegistry::new(backend, Arc::new(MemoryBackend::new()));
    StoreEnv::new(backends, Arc::new(TokioScheduler::new(Handle::current())))
}

/// Waits out the flush window. Returns `false` if `interrupt` fired first.
async fn settle<F>(window: Duration, interrupt: F) -> bool
where
    F: Future<Output = std::io::Result<()>>,
{
    tokio::select! {
        () = tokio::time::sleep(window) => true,
        result = interrupt => match result {
            Ok(()) => {
                info!("interrupted, tearing down");
                false
            }
            Err(err) => {
                warn!(error = %err, "cannot listen for ctrl-c");
                tokio::time::sleep(window).await;
                true
            }
        },
    }
}

/// Flushes every store in `envs`, returning how many had unsaved data.
fn teardown_all(envs: &[&StoreEnv]) -> usize {
    envs.iter()
        .map(|env| {
            let report = env.teardown.trigger_teardown();
            for (target, err) in &report.failures {
                warn!(%target, error = %err, "teardown left unsaved data");
            }
            report.flushed
        })
        .sum()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.json_logs);

    let entries = cli
        .entries
        .iter()
        .map(|raw| parse_entry(raw))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let shared = SharedMemory::new();
    let writer = shared.context();
    let reader = shared.context();

    let bridge = ChangeBridge::new(
        Arc::new(reader.clone()),
        BridgeConfig {
            prefix: cli.prefix.clone(),
            ..BridgeConfig::default()
        },
    );
    bridge.subscribe(|event| {
        info!(
            key = %event.key,
            source = %event.source_context,
            new = ?event.new_value,
            "change observed"
        );
    });

    let flush_delay = Duration::from_millis(cli.flush_delay_ms);
    let options = StoreOptions {
        prefix: cli.prefix.clone(),
        ..StoreOptions::new(cli.namespace.clone()).with_flush_delay(flush_delay)
    };

    let writer_env = context_env(Arc::new(writer));
    let store = Store::open(options.clone(), &writer_env).context("opening writer store")?;
    for (key, value) in entries {
        store.set(key, value);
    }
    info!(key = store.physical_key(), size = store.size(), "entries staged");

    let reader_env = context_env(Arc::new(reader));
    let window = flush_delay + Duration::from_millis(5);
    if settle(window, tokio::signal::ctrl_c()).await {
        let view = Store::open(options, &reader_env).context("opening reader store")?;
        println!(
            "{}",
            serde_json::to_string_pretty(&Value::Object(view.export()))?
        );
    }

    let flushed = teardown_all(&[&writer_env, &reader_env]);
    info!(flushed, "teardown complete");
    Ok(())
}
