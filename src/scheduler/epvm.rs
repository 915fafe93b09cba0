use std::collections::HashMap;

use super::{lowest_score, Scheduler};
use crate::node::Node;
use crate::task::Task;

/// Marginal-cost scheduler: charges each placement the increase in a convex
/// cost function over cpu, memory, and load, so loaded nodes price
/// themselves out long before they saturate.
#[derive(Debug, Default)]
pub struct Epvm;

/// Score handed to nodes already at or over capacity on some dimension.
/// Finite so a pick still exists when every node is saturated.
const SATURATION_SCORE: f64 = 1e9;

/// Usage after placement is capped here so the exponential stays finite even
/// against nodes with unknown capacity.
const MAX_USAGE: f64 = 10.0;

fn cost(usage: f64) -> f64 {
    2f64.powf(10.0 * usage) - 1.0
}

fn marginal_cost(before: f64, delta: f64) -> f64 {
    cost((before + delta).min(MAX_USAGE)) - cost(before.min(MAX_USAGE))
}

impl Scheduler for Epvm {
    fn select_candidate_nodes(&self, task: &Task, nodes: &[Node]) -> Vec<Node> {
        nodes
            .iter()
            .filter(|node| task.disk <= node.disk_remaining())
            .cloned()
            .collect()
    }

    fn score(&self, task: &Task, candidates: &[Node]) -> HashMap<String, f64> {
        let mut scores = HashMap::new();
        for node in candidates {
            let cores = node.cores.max(1) as f64;
            let stats = node.stats.clone().unwrap_or_default();

            let cpu_before = stats.cpu_usage;
            let cpu_delta = task.cpu as f64 / (1024.0 * cores);

            let mem_total = node.memory.max(1) as f64;
            let mem_before = node.memory_allocated as f64 / mem_total;
            let mem_delta = task.memory as f64 / mem_total;

            let load_before = stats.load.one / cores;
            let load_delta = 1.0 / cores;

            let score = if cpu_before >= 1.0 || mem_before >= 1.0 || load_before >= 1.0 {
                SATURATION_SCORE
            } else {
                marginal_cost(cpu_before, cpu_delta)
                    + marginal_cost(mem_before, mem_delta)
                    + marginal_cost(load_before, load_delta)
            };
            scores.insert(node.name.clone(), score);
        }
        scores
    }

    fn pick(&self, scores: &HashMap<String, f64>, candidates: &[Node]) -> Option<Node> {
        lowest_score(scores, candidates)
    }
}
