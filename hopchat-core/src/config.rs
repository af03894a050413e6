//! Protocol tuning knobs. Embedded by hosts in their own configuration files.

use serde::Deserialize;

use crate::dedup::{DEFAULT_DEDUP_CAPACITY, DEFAULT_DEDUP_MAX_AGE_TICKS};
use crate::protocol::DEFAULT_TTL;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Hop budget for locally authored chat packets (default 8).
    #[serde(default = "default_ttl")]
    pub default_ttl: u32,
    /// Maximum remembered message IDs (default 4096).
    #[serde(default = "default_dedup_capacity")]
    pub dedup_capacity: usize,
    /// Ticks after which a remembered message ID is forgotten (default 720).
    #[serde(default = "default_dedup_max_age_ticks")]
    pub dedup_max_age_ticks: u64,
}

fn default_ttl() -> u32 {
    DEFAULT_TTL
}
fn default_dedup_capacity() -> usize {
    DEFAULT_DEDUP_CAPACITY
}
fn default_dedup_max_age_ticks() -> u64 {
    DEFAULT_DEDUP_MAX_AGE_TICKS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_ttl: default_ttl(),
            dedup_capacity: default_dedup_capacity(),
            dedup_max_age_ticks: default_dedup_max_age_ticks(),
        }
    }
}
