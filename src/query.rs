//! Timestamp and pipeline-statistics query infrastructure (C8, §4.5).
//!
//! One [`QueryPoolSet`] exists per `(frame, thread)` pair, owning a
//! timestamp pool and a single-query pipeline-statistics pool. Labeled
//! GPU timings are tracked as a push/pop tree; an unbalanced tree (a
//! `push` with no matching `pop`) is discarded with a warning rather than
//! resolved, since there is no sound timestamp pairing to resolve.

use ash::vk;

/// One entry in the push/pop tree: a named GPU time range.
#[derive(Debug, Clone)]
pub struct TimeQuery {
    pub name: String,
    pub depth: u32,
    pub start_query_index: u32,
    pub end_query_index: Option<u32>,
}

#[derive(Debug, Clone, Copy)]
pub struct ResolvedTimeQuery {
    pub depth: u32,
    pub start_ticks: u64,
    pub end_ticks: u64,
}

/// Push/pop tree of time queries for a single `(frame, thread)` pool.
/// Reset once per frame by the frame scheduler (§4.7 step 5).
#[derive(Default)]
pub struct QueryTree {
    queries: Vec<TimeQuery>,
    open_stack: Vec<usize>,
    next_timestamp_index: u32,
    capacity: u32,
}

impl QueryTree {
    pub fn new(capacity: u32) -> Self {
        QueryTree {
            queries: Vec::new(),
            open_stack: Vec::new(),
            next_timestamp_index: 0,
            capacity,
        }
    }

    pub fn reset(&mut self) {
        self.queries.clear();
        self.open_stack.clear();
        self.next_timestamp_index = 0;
    }

    /// Allocates a timestamp slot for a `push_marker` call; returns
    /// `None` if the pool's timestamp capacity is exhausted.
    pub fn push(&mut self, name: impl Into<String>) -> Option<u32> {
        if self.next_timestamp_index >= self.capacity * 2 {
            tracing::warn!(capacity = self.capacity, "GPU timestamp pool exhausted");
            return None;
        }
        let start_index = self.next_timestamp_index;
        self.next_timestamp_index += 1;
        let depth = self.open_stack.len() as u32;
        let position = self.queries.len();
        self.queries.push(TimeQuery {
            name: name.into(),
            depth,
            start_query_index: start_index,
            end_query_index: None,
        });
        self.open_stack.push(position);
        Some(start_index)
    }

    /// Allocates a timestamp slot for a `pop_marker` call, closing the
    /// most recently pushed still-open query.
    pub fn pop(&mut self) -> Option<u32> {
        let position = self.open_stack.pop()?;
        if self.next_timestamp_index >= self.capacity * 2 {
            tracing::warn!("GPU timestamp pool exhausted during pop");
            return None;
        }
        let end_index = self.next_timestamp_index;
        self.next_timestamp_index += 1;
        self.queries[position].end_query_index = Some(end_index);
        Some(end_index)
    }

    /// True once every pushed query has a matching pop (tree depth is 0).
    pub fn is_balanced(&self) -> bool {
        self.open_stack.is_empty()
    }

    /// Resolves every query against a 64-timestamp-value buffer read back
    /// from the pool (§4.5 — resolved in `present` against the previous
    /// frame with `WAIT_BIT`). Unbalanced trees are discarded, per this
    /// module's own invariant.
    pub fn resolve(&self, timestamps: &[u64]) -> Vec<ResolvedTimeQuery> {
        if !self.is_balanced() {
            tracing::warn!(name = "query_tree", "discarding unbalanced GPU query tree");
            return Vec::new();
        }
        self.queries
            .iter()
            .filter_map(|q| {
                let end = q.end_query_index?;
                Some(ResolvedTimeQuery {
                    depth: q.depth,
                    start_ticks: *timestamps.get(q.start_query_index as usize)?,
                    end_ticks: *timestamps.get(end as usize)?,
                })
            })
            .collect()
    }
}

/// Per-`(frame, thread)` native query pools. Timestamp pool size is
/// `2 * capacity` (a start + end slot per time query); the
/// pipeline-statistics pool holds the standard seven counters.
pub struct QueryPoolSet {
    pub timestamp_pool: vk::QueryPool,
    pub pipeline_stats_pool: vk::QueryPool,
    pub tree: QueryTree,
}

pub const PIPELINE_STATISTICS_FLAGS: vk::QueryPipelineStatisticFlags = vk::QueryPipelineStatisticFlags::from_raw(
    vk::QueryPipelineStatisticFlags::INPUT_ASSEMBLY_VERTICES.as_raw()
        | vk::QueryPipelineStatisticFlags::INPUT_ASSEMBLY_PRIMITIVES.as_raw()
        | vk::QueryPipelineStatisticFlags::VERTEX_SHADER_INVOCATIONS.as_raw()
        | vk::QueryPipelineStatisticFlags::CLIPPING_INVOCATIONS.as_raw()
        | vk::QueryPipelineStatisticFlags::CLIPPING_PRIMITIVES.as_raw()
        | vk::QueryPipelineStatisticFlags::FRAGMENT_SHADER_INVOCATIONS.as_raw()
        | vk::QueryPipelineStatisticFlags::COMPUTE_SHADER_INVOCATIONS.as_raw(),
);

/// Converts a raw tick delta to milliseconds using the physical device's
/// `timestampPeriod` (nanoseconds per tick), per §4.5.
pub fn ticks_to_ms(ticks: u64, timestamp_period_ns: f32) -> f64 {
    (ticks as f64) * (timestamp_period_ns as f64) / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balanced_tree_resolves_all_queries() {
        let mut tree = QueryTree::new(16);
        tree.push("frame");
        tree.push("shadow_pass");
        tree.pop();
        tree.pop();
        assert!(tree.is_balanced());

        let timestamps = vec![100, 200, 300, 400];
        let resolved = tree.resolve(&timestamps);
        assert_eq!(resolved.len(), 2);
    }

    #[test]
    fn unbalanced_tree_is_discarded() {
        let mut tree = QueryTree::new(16);
        tree.push("frame");
        tree.push("shadow_pass");
        tree.pop();
        assert!(!tree.is_balanced());
        assert!(tree.resolve(&[0, 1, 2, 3]).is_empty());
    }

    #[test]
    fn reset_clears_state_between_frames() {
        let mut tree = QueryTree::new(16);
        tree.push("a");
        tree.pop();
        tree.reset();
        assert!(tree.is_balanced());
        assert_eq!(tree.resolve(&[]).len(), 0);
    }

    #[test]
    fn ticks_conversion_matches_period() {
        let ms = ticks_to_ms(1_000_000, 1.0);
        assert!((ms - 1.0).abs() < 1e-9);
    }
}
