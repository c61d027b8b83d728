// src/resolver/mod.rs

//! Dependency checking and install ordering
//!
//! The checker validates Requires and Conflicts of every element against
//! built-in capabilities, the packages added to the transaction and the
//! installed database. The orderer turns transaction-internal requirements
//! into a graph and sorts it, breaking dependency loops by severing
//! ordinary (co-requisite) edges.
//!
//! State that used to live for the whole process (whether the dependency
//! cache still works, the whiteout list) lives in a `ResolverContext`
//! created per run.

pub mod builtin;
pub mod check;
pub mod engine;
pub mod graph;
pub mod plan;

pub use check::{DepStatus, DependencyChecker};
pub use engine::Orderer;
pub use graph::{EdgeKind, OrderGraph};
pub use plan::{DependencyLoop, OrderOutcome, Placement, SeveredEdge};

use crate::config::ResolverConfig;
use crate::error::{Error, Result};
use std::collections::HashSet;
use tracing::warn;
use uuid::Uuid;

/// Per-run resolver state
#[derive(Debug, Clone)]
pub struct ResolverContext {
    run_id: Uuid,
    whiteouts: HashSet<(String, String)>,
    cache_enabled: bool,
    cache_hits: usize,
}

impl ResolverContext {
    /// Fresh context with a new run id
    pub fn new(config: &ResolverConfig) -> Result<Self> {
        Ok(Self {
            run_id: Uuid::new_v4(),
            whiteouts: config.whiteout_pairs()?.into_iter().collect(),
            cache_enabled: config.dependency_cache,
            cache_hits: 0,
        })
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Is the ordering edge "requirer needs provider" whited out?
    pub fn is_whiteout(&self, requirer: &str, provider: &str) -> bool {
        self.whiteouts
            .contains(&(requirer.to_string(), provider.to_string()))
    }

    pub fn cache_enabled(&self) -> bool {
        self.cache_enabled
    }

    /// Stop using the dependency cache for the rest of the run
    pub(crate) fn disable_cache(&mut self, err: &Error) {
        if self.cache_enabled {
            warn!("dependency cache disabled for this run: {}", err);
        }
        self.cache_enabled = false;
    }

    pub(crate) fn record_cache_hit(&mut self) {
        self.cache_hits += 1;
    }

    /// Dependencies answered from the cache so far
    pub fn cache_hits(&self) -> usize {
        self.cache_hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_from_config() {
        let config = ResolverConfig {
            dependency_whiteout: vec!["glibc-common>glibc".to_string()],
            ..Default::default()
        };
        let mut ctx = ResolverContext::new(&config).unwrap();

        assert!(ctx.is_whiteout("glibc-common", "glibc"));
        assert!(!ctx.is_whiteout("glibc", "glibc-common"));
        assert!(ctx.cache_enabled());

        ctx.disable_cache(&Error::LookupError("boom".to_string()));
        assert!(!ctx.cache_enabled());
    }

    #[test]
    fn test_bad_whiteout_rejected() {
        let config = ResolverConfig {
            dependency_whiteout: vec!["nonsense".to_string()],
            ..Default::default()
        };
        assert!(ResolverContext::new(&config).is_err());
    }
}
