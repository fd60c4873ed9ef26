//! Shared test setup: tracing subscriber and small helpers.
//!
//! Environment variables:
//! - `RUST_LOG`: filter directives (e.g. `rbindex=debug`)
//! - `RBINDEX_LOG_DIR`: log directory (default: `logs/`)
//! - `RBINDEX_LOG_CONSOLE`: set to "0" to disable console output
//!
//! Engine events only appear when the crate is built with `--features tracing`.
//! Log files are NDJSON; inspect with `jq`:
//!
//! ```bash
//! jq 'select(.fields.key == 42)' logs/rbindex.jsonl
//! ```

#![allow(dead_code)]

use std::env;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Once;

use rbindex::{LockMode, RbTree};
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

static INIT: Once = Once::new();

/// Install the subscriber once per test binary.
pub fn init_tracing() {
    INIT.call_once(setup_tracing);
}

#[derive(Debug, Clone)]
pub struct TracingConfig {
    pub log_dir: PathBuf,
    pub log_file: String,
    pub console_enabled: bool,
    pub default_level: Level,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("logs"),
            log_file: "rbindex.jsonl".to_string(),
            console_enabled: true,
            default_level: Level::WARN,
        }
    }
}

impl TracingConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(dir) = env::var("RBINDEX_LOG_DIR") {
            config.log_dir = PathBuf::from(dir);
        }

        if env::var("RBINDEX_LOG_CONSOLE").is_ok_and(|v| v == "0") {
            config.console_enabled = false;
        }

        config
    }
}

fn make_filter(default_level: Level) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level.as_str()))
}

fn setup_tracing() {
    let config = TracingConfig::from_env();

    let console_layer = config.console_enabled.then(|| {
        tracing_subscriber::fmt::layer()
            .with_test_writer()
            .with_thread_ids(true)
            .with_target(true)
            .compact()
            .with_filter(make_filter(config.default_level))
    });

    // A missing log directory only costs the file layer.
    let file_layer = std::fs::create_dir_all(&config.log_dir)
        .and_then(|()| {
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(config.log_dir.join(&config.log_file))
        })
        .ok()
        .map(|file| {
            tracing_subscriber::fmt::layer()
                .with_writer(std::sync::Mutex::new(file))
                .with_thread_ids(true)
                .with_target(true)
                .json()
                .with_filter(make_filter(config.default_level))
        });

    let _ = Registry::default()
        .with(console_layer)
        .with(file_layer)
        .try_init();
}

/// Tree holding `key * 10` under each key.
pub fn tree_with(keys: impl IntoIterator<Item = i64>) -> RbTree<i64> {
    let tree = RbTree::new();
    for k in keys {
        tree.insert(k, k * 10, LockMode::None);
    }
    tree
}

/// Copy of the payload stored under `key`.
pub fn payload_of<V: Clone>(tree: &RbTree<V>, key: i64) -> Option<V> {
    let entry = tree.search(key, LockMode::None).ok()?.into_entry();
    let value = entry.lock().clone();
    Some(value)
}
