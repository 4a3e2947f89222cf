//! Publication slot for a database's search index.
//!
//! Builders write here while searches read a snapshot. A search that finds
//! no published index reports "not ready" instead of blocking.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, warn};

use super::SearchIndex;
use crate::error::{MatchError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStatus {
    Success,
    InProgress,
    Failed,
}

#[derive(Debug)]
struct HandleState {
    status: BuildStatus,
    index: Option<Arc<SearchIndex>>,
    failure: Option<String>,
    generation: u64,
}

#[derive(Debug)]
pub struct IndexHandle {
    state: RwLock<HandleState>,
}

impl Default for IndexHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl IndexHandle {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(HandleState {
                status: BuildStatus::InProgress,
                index: None,
                failure: None,
                generation: 0,
            }),
        }
    }

    /// Mark a rebuild as started. The previous index stops being served.
    pub fn begin_build(&self) {
        let mut state = self.state.write();
        state.status = BuildStatus::InProgress;
        state.index = None;
        state.failure = None;
    }

    /// Publish a finished index; returns its generation number.
    pub fn publish(&self, index: SearchIndex) -> u64 {
        let mut state = self.state.write();
        state.generation += 1;
        debug!(
            generation = state.generation,
            num_poses = index.num_poses(),
            "Published search index"
        );
        state.status = BuildStatus::Success;
        state.index = Some(Arc::new(index));
        state.failure = None;
        state.generation
    }

    pub fn fail(&self, reason: impl Into<String>) {
        let reason = reason.into();
        warn!(reason = %reason, "Search index build failed");
        let mut state = self.state.write();
        state.status = BuildStatus::Failed;
        state.index = None;
        state.failure = Some(reason);
    }

    pub fn status(&self) -> BuildStatus {
        self.state.read().status
    }

    pub fn generation(&self) -> u64 {
        self.state.read().generation
    }

    /// Current index if one is published.
    pub fn snapshot(&self) -> Result<Arc<SearchIndex>> {
        let state = self.state.read();
        match (&state.index, state.status) {
            (Some(index), BuildStatus::Success) => Ok(Arc::clone(index)),
            (_, BuildStatus::Failed) => Err(MatchError::IndexBuildFailed(
                state.failure.clone().unwrap_or_default(),
            )),
            _ => Err(MatchError::IndexNotReady("index build in progress".to_string())),
        }
    }
}
