//! Engine and server configuration.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

use crate::lob::FreePolicy;

/// Default HTTP port for the session surface.
pub const DEFAULT_PORT: u16 = 10100;

/// Size in bytes above which an in-memory LOB moves to a spill file.
pub const DEFAULT_SPILL_THRESHOLD: usize = 4096;

/// Default lock wait before a conflicting row lock request fails.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(60);

/// Default interval between spill-file collection passes.
pub const DEFAULT_GC_INTERVAL: Duration = Duration::from_secs(300);

/// Which operations stay usable after `free()`.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FreePolicyKind {
    /// Everything except `free()` is rejected once a LOB is freed.
    #[default]
    Embedded,
    /// Streams opened before `free()` may still be drained.
    Client,
}

/// Command-line arguments for the server.
#[derive(Parser, Debug, Clone)]
#[command(name = "lobstore-rs")]
#[command(about = "Large-object streaming and lifecycle engine")]
#[command(version)]
pub struct Args {
    /// Host address to bind to.
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Port for the HTTP session surface.
    #[arg(long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Directory for spill files.
    #[arg(long, short = 'l')]
    pub location: Option<PathBuf>,

    /// In-memory size limit of a single LOB, in bytes.
    #[arg(long, default_value_t = DEFAULT_SPILL_THRESHOLD)]
    pub spill_threshold: usize,

    /// Row lock wait timeout, in milliseconds.
    #[arg(long, default_value_t = DEFAULT_LOCK_TIMEOUT.as_millis() as u64)]
    pub lock_timeout_ms: u64,

    /// Operations permitted after a LOB is freed.
    #[arg(long, value_enum, default_value_t = FreePolicyKind::Embedded)]
    pub free_policy: FreePolicyKind,

    /// Seconds between spill-file collection passes.
    #[arg(long, default_value_t = DEFAULT_GC_INTERVAL.as_secs())]
    pub gc_interval_secs: u64,

    /// Enable debug logging.
    #[arg(long, short = 'd')]
    pub debug: bool,

    /// Enable silent mode (minimal logging).
    #[arg(long, short = 's')]
    pub silent: bool,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            location: None,
            spill_threshold: DEFAULT_SPILL_THRESHOLD,
            lock_timeout_ms: DEFAULT_LOCK_TIMEOUT.as_millis() as u64,
            free_policy: FreePolicyKind::Embedded,
            gc_interval_secs: DEFAULT_GC_INTERVAL.as_secs(),
            debug: false,
            silent: false,
        }
    }
}

/// Engine configuration derived from command-line arguments.
#[derive(Debug, Clone)]
pub struct Config {
    /// Host address to bind to.
    pub host: String,
    /// Port for the HTTP session surface.
    pub port: u16,
    /// Directory for spill files.
    pub spill_dir: PathBuf,
    /// In-memory size limit of a single LOB, in bytes.
    pub spill_threshold: usize,
    /// Row lock wait timeout.
    pub lock_timeout: Duration,
    /// Operations permitted after a LOB is freed.
    pub free_policy: FreePolicyKind,
    /// Interval between spill-file collection passes.
    pub gc_interval: Duration,
    /// Enable debug logging.
    pub debug: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            spill_dir: default_spill_dir(),
            spill_threshold: DEFAULT_SPILL_THRESHOLD,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            free_policy: FreePolicyKind::Embedded,
            gc_interval: DEFAULT_GC_INTERVAL,
            debug: false,
        }
    }
}

impl From<Args> for Config {
    fn from(args: Args) -> Self {
        Self {
            host: args.host,
            port: args.port,
            spill_dir: args.location.unwrap_or_else(default_spill_dir),
            spill_threshold: args.spill_threshold,
            lock_timeout: Duration::from_millis(args.lock_timeout_ms),
            free_policy: args.free_policy,
            gc_interval: Duration::from_secs(args.gc_interval_secs.max(1)),
            debug: args.debug,
        }
    }
}

impl Config {
    /// Returns the bind address for the HTTP surface.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Returns the post-free capability table selected by this configuration.
    pub fn free_policy(&self) -> FreePolicy {
        match self.free_policy {
            FreePolicyKind::Embedded => FreePolicy::embedded(),
            FreePolicyKind::Client => FreePolicy::client(),
        }
    }
}

fn default_spill_dir() -> PathBuf {
    std::env::temp_dir().join("lobstore-rs")
}
