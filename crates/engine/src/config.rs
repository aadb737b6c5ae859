//! Rewind configuration

use serde::{Deserialize, Serialize};

use crate::types::DEFAULT_SNAPSHOT_SLOTS;

/// What `rewind` does when the requested tic is no longer retained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RewindPolicy {
    /// Fail unless that exact tic is in the ring.
    #[default]
    Exact,
    /// Fall back to the newest retained tic before the requested one.
    #[serde(alias = "nearest")]
    NearestEarlier,
}

impl RewindPolicy {
    /// Parse `exact` or `nearest` (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "exact" => Some(RewindPolicy::Exact),
            "nearest" | "nearestearlier" | "nearest_earlier" => Some(RewindPolicy::NearestEarlier),
            _ => None,
        }
    }
}

/// Session configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewindConfig {
    /// Ring capacity; zero is treated as one.
    pub snapshot_slots: usize,
    pub policy: RewindPolicy,
    /// Seed for the game's random entity.
    pub seed: u64,
}

impl Default for RewindConfig {
    fn default() -> Self {
        Self {
            snapshot_slots: DEFAULT_SNAPSHOT_SLOTS,
            policy: RewindPolicy::Exact,
            seed: 1,
        }
    }
}

impl RewindConfig {
    /// Create from environment variables, falling back to defaults for
    /// anything unset or unparsable.
    pub fn from_env() -> Self {
        use std::env;

        let defaults = Self::default();

        let snapshot_slots = env::var("TETRIS_REWIND_SLOTS")
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(defaults.snapshot_slots);

        let policy = env::var("TETRIS_REWIND_POLICY")
            .ok()
            .and_then(|s| RewindPolicy::parse(&s))
            .unwrap_or(defaults.policy);

        let seed = env::var("TETRIS_REWIND_SEED")
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(defaults.seed);

        Self {
            snapshot_slots,
            policy,
            seed,
        }
        .normalized()
    }

    /// Parse a JSON object; missing fields take their defaults.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str::<Self>(json).map(Self::normalized)
    }

    fn normalized(mut self) -> Self {
        self.snapshot_slots = self.snapshot_slots.max(1);
        self
    }
}
