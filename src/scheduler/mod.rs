//! Placement policies. The manager constructs one by name and drives it
//! through the three-step select/score/pick protocol on every dispatch.

mod epvm;
mod roundrobin;

pub use epvm::Epvm;
pub use roundrobin::RoundRobin;

use std::collections::HashMap;

use thiserror::Error;
use tracing::warn;

use crate::node::Node;
use crate::task::Task;

#[derive(Debug, Error)]
pub enum SchedulingError {
    #[error("no candidate nodes match the resource request")]
    NoCandidates,
}

pub trait Scheduler {
    /// Nodes able to host the task; empty when none qualify.
    fn select_candidate_nodes(&self, task: &Task, nodes: &[Node]) -> Vec<Node>;
    /// Score each candidate by name; lower is better.
    fn score(&self, task: &Task, candidates: &[Node]) -> HashMap<String, f64>;
    /// The minimum-scored candidate; ties go to the earliest offered.
    fn pick(&self, scores: &HashMap<String, f64>, candidates: &[Node]) -> Option<Node>;
}

/// Policy selection by name at manager construction. A tagged enum rather
/// than a trait object: there are exactly two policies.
#[derive(Debug)]
pub enum AnyScheduler {
    RoundRobin(RoundRobin),
    Epvm(Epvm),
}

impl AnyScheduler {
    pub fn from_name(name: &str) -> Self {
        match name {
            "epvm" => AnyScheduler::Epvm(Epvm),
            "roundrobin" => AnyScheduler::RoundRobin(RoundRobin::default()),
            other => {
                warn!(scheduler = other, "unknown scheduler, using round-robin");
                AnyScheduler::RoundRobin(RoundRobin::default())
            }
        }
    }

    /// Record the index of the candidate a committed dispatch landed on.
    /// Round-robin rotates from here; E-PVM keeps no state.
    pub fn note_pick(&mut self, index: usize) {
        if let AnyScheduler::RoundRobin(rr) = self {
            rr.last = Some(index);
        }
    }
}

impl Scheduler for AnyScheduler {
    fn select_candidate_nodes(&self, task: &Task, nodes: &[Node]) -> Vec<Node> {
        match self {
            AnyScheduler::RoundRobin(s) => s.select_candidate_nodes(task, nodes),
            AnyScheduler::Epvm(s) => s.select_candidate_nodes(task, nodes),
        }
    }

    fn score(&self, task: &Task, candidates: &[Node]) -> HashMap<String, f64> {
        match self {
            AnyScheduler::RoundRobin(s) => s.score(task, candidates),
            AnyScheduler::Epvm(s) => s.score(task, candidates),
        }
    }

    fn pick(&self, scores: &HashMap<String, f64>, candidates: &[Node]) -> Option<Node> {
        match self {
            AnyScheduler::RoundRobin(s) => s.pick(scores, candidates),
            AnyScheduler::Epvm(s) => s.pick(scores, candidates),
        }
    }
}

/// Shared pick: first candidate with the strictly lowest score.
pub(crate) fn lowest_score(scores: &HashMap<String, f64>, candidates: &[Node]) -> Option<Node> {
    let mut best: Option<(&Node, f64)> = None;
    for node in candidates {
        let Some(score) = scores.get(&node.name).copied() else {
            continue;
        };
        match best {
            Some((_, lowest)) if score >= lowest => {}
            _ => best = Some((node, score)),
        }
    }
    best.map(|(node, _)| node.clone())
}
