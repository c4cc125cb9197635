#![forbid(unsafe_code)]

//! Process-wide runtime tunables.

use std::env;

use serde::{Deserialize, Serialize};

/// Tunables read by the scheduler and component layer.
///
/// Installed with [`scheduler::configure`](crate::reactive::scheduler::configure).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Upper bound on flush rounds run by `settle()` before giving up.
    pub max_settle_rounds: usize,
    /// Emit a warning when two live components resolve to the same reference
    /// name inside one owner.
    pub warn_duplicate_refs: bool,
    /// Skip `set` calls whose value structurally equals the stored one.
    pub skip_unchanged_writes: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_settle_rounds: 32,
            warn_duplicate_refs: true,
            skip_unchanged_writes: true,
        }
    }
}

impl RuntimeConfig {
    /// Defaults overridden by `WEFT_MAX_SETTLE_ROUNDS` and
    /// `WEFT_WARN_DUPLICATE_REFS` when they are set and parse.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(val) = env::var("WEFT_MAX_SETTLE_ROUNDS")
            && let Ok(n) = val.parse()
        {
            config.max_settle_rounds = n;
        }
        if let Ok(val) = env::var("WEFT_WARN_DUPLICATE_REFS") {
            config.warn_duplicate_refs = val == "1" || val.eq_ignore_ascii_case("true");
        }
        config
    }

    #[must_use]
    pub fn with_max_settle_rounds(mut self, rounds: usize) -> Self {
        self.max_settle_rounds = rounds;
        self
    }

    #[must_use]
    pub fn with_warn_duplicate_refs(mut self, enabled: bool) -> Self {
        self.warn_duplicate_refs = enabled;
        self
    }

    #[must_use]
    pub fn with_skip_unchanged_writes(mut self, enabled: bool) -> Self {
        self.skip_unchanged_writes = enabled;
        self
    }
}
