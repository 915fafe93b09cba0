use std::collections::HashMap;

use super::{lowest_score, Scheduler};
use crate::node::Node;
use crate::task::Task;

/// Rotates placements across all nodes in order, ignoring resources. The
/// rotation index is fed back by the manager after each committed dispatch.
#[derive(Debug, Default)]
pub struct RoundRobin {
    /// Index of the last candidate a dispatch committed to; `None` before
    /// the first placement.
    pub last: Option<usize>,
}

impl RoundRobin {
    fn next_index(&self, n: usize) -> usize {
        match self.last {
            Some(last) => (last + 1) % n,
            None => 0,
        }
    }
}

impl Scheduler for RoundRobin {
    fn select_candidate_nodes(&self, _task: &Task, nodes: &[Node]) -> Vec<Node> {
        nodes.to_vec()
    }

    fn score(&self, _task: &Task, candidates: &[Node]) -> HashMap<String, f64> {
        if candidates.is_empty() {
            return HashMap::new();
        }
        let next = self.next_index(candidates.len());
        candidates
            .iter()
            .enumerate()
            .map(|(i, node)| (node.name.clone(), if i == next { 0.0 } else { 1.0 }))
            .collect()
    }

    fn pick(&self, scores: &HashMap<String, f64>, candidates: &[Node]) -> Option<Node> {
        lowest_score(scores, candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nodes(n: usize) -> Vec<Node> {
        (0..n)
            .map(|i| Node::new(&format!("w{i}:5556"), &format!("http://w{i}:5556"), "worker"))
            .collect()
    }

    fn pick_once(rr: &mut RoundRobin, task: &Task, inventory: &[Node]) -> String {
        let candidates = rr.select_candidate_nodes(task, inventory);
        let scores = rr.score(task, &candidates);
        let picked = rr.pick(&scores, &candidates).unwrap();
        let index = candidates.iter().position(|c| c.name == picked.name).unwrap();
        rr.last = Some(index);
        picked.name
    }

    #[test]
    fn first_pick_lands_on_index_zero() {
        let mut rr = RoundRobin::default();
        let inventory = nodes(3);
        assert_eq!(pick_once(&mut rr, &Task::default(), &inventory), "w0:5556");
    }

    #[test]
    fn rotation_is_fair_over_k_rounds() {
        let mut rr = RoundRobin::default();
        let inventory = nodes(3);
        let task = Task::default();

        let mut placements: HashMap<String, usize> = HashMap::new();
        for i in 0..12 {
            let name = pick_once(&mut rr, &task, &inventory);
            assert_eq!(name, inventory[i % 3].name, "placement {i}");
            *placements.entry(name).or_default() += 1;
        }
        for node in &inventory {
            assert_eq!(placements[&node.name], 4);
        }
    }

    #[test]
    fn single_node_is_always_picked() {
        let mut rr = RoundRobin::default();
        let inventory = nodes(1);
        for _ in 0..5 {
            assert_eq!(pick_once(&mut rr, &Task::default(), &inventory), "w0:5556");
        }
    }
}
