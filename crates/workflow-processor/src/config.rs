//! Ambient configuration (`SPEC_FULL.md` §6 supplemental): the operational
//! knobs named by `spec.md` §5's "SHOULD be rate-limited / concurrency-
//! bounded" language, read from environment variables in the same spirit
//! as the teacher's per-crate `config.rs` modules rather than a single
//! workspace-wide config type.

use std::time::Duration;

const DEFAULT_MAX_CONCURRENT_WORKERS: usize = 10;
const DEFAULT_DISPATCH_RATE_PER_SECOND: u32 = 100;
const DEFAULT_STALE_EXECUTION_TIMEOUT_SECS: u64 = 5 * 60;

/// Operational knobs for the engine's worker pool, none of which change
/// correctness — only how aggressively the host lets the engine run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Upper bound on workers processing batches concurrently *across*
    /// canvases (`spec.md` §5 point 3). Batches on the same canvas are
    /// already serialized by `try_start_batch`, independent of this knob.
    pub max_concurrent_workers: usize,
    /// Upper bound on `process-node` dispatches per second (`spec.md` §5
    /// point 3).
    pub dispatch_rate_per_second: u32,
    /// How long a task may sit in `EXECUTING` before a reconciler (an
    /// operational concern, `spec.md` §4.4.6) is allowed to treat it as
    /// stranded.
    pub stale_execution_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_workers: DEFAULT_MAX_CONCURRENT_WORKERS,
            dispatch_rate_per_second: DEFAULT_DISPATCH_RATE_PER_SECOND,
            stale_execution_timeout: Duration::from_secs(DEFAULT_STALE_EXECUTION_TIMEOUT_SECS),
        }
    }
}

impl EngineConfig {
    /// Read `CANVAS_ENGINE_MAX_CONCURRENT_WORKERS`,
    /// `CANVAS_ENGINE_DISPATCH_RATE_PER_SECOND` and
    /// `CANVAS_ENGINE_STALE_EXECUTION_TIMEOUT_SECS`, falling back to typed
    /// defaults for anything unset or unparsable. Never fails — a
    /// malformed environment variable is logged and ignored rather than
    /// aborting startup.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_concurrent_workers: env_usize("CANVAS_ENGINE_MAX_CONCURRENT_WORKERS", defaults.max_concurrent_workers),
            dispatch_rate_per_second: env_u32("CANVAS_ENGINE_DISPATCH_RATE_PER_SECOND", defaults.dispatch_rate_per_second),
            stale_execution_timeout: Duration::from_secs(env_u64(
                "CANVAS_ENGINE_STALE_EXECUTION_TIMEOUT_SECS",
                defaults.stale_execution_timeout.as_secs(),
            )),
        }
    }
}

fn env_usize(key: &str, default: usize) -> usize {
    parse_env(key, default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    parse_env(key, default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    parse_env(key, default)
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            log::warn!("ignoring unparsable {key}={raw:?}; using default");
            default
        }),
        Err(_) => default,
    }
}
