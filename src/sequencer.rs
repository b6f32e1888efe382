//! Per-graph step-id sequencing
//!
//! Each graph key owns an independent sequence seeded from a random positive
//! base, so retried graph runs do not collide with stale in-flight ids.
//! Issued ids are strictly increasing per graph key and never the invalid
//! sentinel.

use crate::core::config::CoordConfig;
use crate::core::errors::Result;
use crate::types::{
    GraphKey, StepId, StepSequenceEntry, StepSequenceRequest, StepSequenceResponse,
};
use dashmap::DashMap;
use std::collections::HashSet;
use tracing::{debug, info, warn};

struct GraphSequence {
    next: StepId,
    active: HashSet<StepId>,
}

impl GraphSequence {
    fn new() -> Self {
        Self {
            next: new_base_step_id(),
            active: HashSet::new(),
        }
    }
}

/// Random positive base for a fresh sequence. Bounded well below i64::MAX so
/// a long run of increments cannot overflow, and never zero or the sentinel.
fn new_base_step_id() -> StepId {
    fastrand::i64(1..=0x0fff_ffff_ffff_ffff)
}

/// Issues and retires step ids per logical graph run
pub struct StepSequencer {
    config: CoordConfig,
    graphs: DashMap<GraphKey, GraphSequence>,
}

impl StepSequencer {
    pub fn new(config: CoordConfig) -> Self {
        Self {
            config,
            graphs: DashMap::new(),
        }
    }

    /// Next unused step id for the graph; strictly increasing per graph key
    pub fn next_step_id(&self, graph_key: GraphKey) -> StepId {
        let mut seq = self
            .graphs
            .entry(graph_key)
            .or_insert_with(GraphSequence::new);
        let id = seq.next;
        seq.next += 1;
        seq.active.insert(id);
        if seq.active.len() > self.config.max_in_flight_steps {
            warn!(
                graph_key,
                in_flight = seq.active.len(),
                limit = self.config.max_in_flight_steps,
                "in-flight step window exceeded; retire_step_id is lagging"
            );
        }
        debug!(graph_key, step_id = id, "issued step id");
        id
    }

    /// Mark a step id as no longer active. No-op if unknown.
    pub fn retire_step_id(&self, graph_key: GraphKey, step_id: StepId) {
        if let Some(mut seq) = self.graphs.get_mut(&graph_key) {
            if seq.active.remove(&step_id) {
                debug!(graph_key, step_id, "retired step id");
            }
        }
    }

    /// Number of issued-but-not-retired step ids for the graph
    pub fn in_flight(&self, graph_key: GraphKey) -> usize {
        self.graphs
            .get(&graph_key)
            .map(|seq| seq.active.len())
            .unwrap_or(0)
    }

    /// Report the current step-id window for the requested graphs, creating
    /// sequences on demand. Failures (in distributed settings, coordinator
    /// disagreement or unreachability) arrive as the `Err` of the future.
    pub async fn get_step_sequence(
        &self,
        request: StepSequenceRequest,
    ) -> Result<StepSequenceResponse> {
        let entries = request
            .graph_keys
            .iter()
            .map(|&graph_key| {
                let seq = self
                    .graphs
                    .entry(graph_key)
                    .or_insert_with(GraphSequence::new);
                StepSequenceEntry {
                    graph_key,
                    next_step_id: seq.next,
                }
            })
            .collect();
        Ok(StepSequenceResponse { entries })
    }

    /// Re-seed the graph's sequence from a fresh random base and clear its
    /// active window. Returns the new next step id.
    pub async fn refresh_step_id_sequence(&self, graph_key: GraphKey) -> Result<StepId> {
        let mut seq = self
            .graphs
            .entry(graph_key)
            .or_insert_with(GraphSequence::new);
        seq.next = new_base_step_id();
        seq.active.clear();
        info!(graph_key, next_step_id = seq.next, "refreshed step id sequence");
        Ok(seq.next)
    }
}
