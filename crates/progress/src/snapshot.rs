//! Point-in-time copies of a progress tree.

use crate::node::{MonitorNode, Node};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::atomic::Ordering;
use taskmon_core::{MonitorId, Time};

/// A snapshot of a monitor subtree at a point in time.
///
/// Aggregated values are computed from the children's snapshots, so the
/// numbers within one snapshot are consistent with each other even while
/// the live tree keeps moving.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    /// Node the snapshot was taken from
    pub id: MonitorId,

    /// When snapshot was taken
    pub taken_at: Time,

    /// Task label at that time
    pub task_name: String,

    /// Parent work units this node is worth
    pub parent_weight: u64,

    /// Declared total work
    pub total_work: u64,

    /// Units stepped on the node itself
    pub current_work: u64,

    /// Work done including weighted sub-task progress
    pub work_done: f64,

    /// Fraction of the total done, 0 when the total is unknown
    pub relative_work_done: f64,

    /// Own cancellation flag
    pub canceled: bool,

    /// Whether the node was finished
    pub done: bool,

    /// Sub-task snapshots in creation order
    pub children: Vec<ProgressSnapshot>,
}

impl ProgressSnapshot {
    fn capture(node: &Node, taken_at: Time) -> Self {
        let total_work = node.total_work.load(Ordering::SeqCst);
        let current_work = node.current_work.load(Ordering::SeqCst);
        let children: Vec<ProgressSnapshot> = node
            .children()
            .iter()
            .map(|child| Self::capture(child, taken_at))
            .collect();

        let work_done = children.iter().fold(current_work as f64, |acc, child| {
            acc + child.relative_work_done * child.parent_weight as f64
        });
        let relative_work_done = if total_work == 0 {
            0.0
        } else {
            work_done / total_work as f64
        };

        Self {
            id: node.id,
            taken_at,
            task_name: node.task_name(),
            parent_weight: node.parent_weight,
            total_work,
            current_work,
            work_done,
            relative_work_done,
            canceled: node.canceled.load(Ordering::SeqCst),
            done: node.done.load(Ordering::SeqCst),
            children,
        }
    }

    /// Relative work done as a percentage.
    pub fn percentage(&self) -> f64 {
        self.relative_work_done * 100.0
    }

    /// Number of nodes in this subtree, including itself.
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(Self::node_count).sum::<usize>()
    }

    /// Render the subtree as indented text, one line per node.
    pub fn render_tree(&self) -> String {
        let mut out = String::new();
        self.render_into(&mut out, 0);
        out
    }

    fn render_into(&self, out: &mut String, depth: usize) {
        let name = if self.task_name.is_empty() {
            "(unnamed)"
        } else {
            self.task_name.as_str()
        };
        out.push_str(&"  ".repeat(depth));
        out.push_str(&format!(
            "{} {:.1}% ({:.1}/{})",
            name,
            self.percentage(),
            self.work_done,
            self.total_work
        ));
        if depth > 0 {
            out.push_str(&format!(" weight={}", self.parent_weight));
        }
        if self.canceled {
            out.push_str(" [canceled]");
        }
        if self.done {
            out.push_str(" [done]");
        }
        out.push('\n');
        for child in &self.children {
            child.render_into(out, depth + 1);
        }
    }
}

impl MonitorNode {
    /// Take a snapshot of this node and its descendants.
    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot::capture(&self.node, Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::Monitor;

    #[test]
    fn test_snapshot_matches_live_aggregation() {
        let root = MonitorNode::named("build");
        root.set_total_work(10).unwrap();
        root.step_by(2).unwrap();
        let child = root.sub_task(8);
        child.set_task_name("compile");
        child.set_total_work(4).unwrap();
        child.step_by(2).unwrap();

        let snapshot = root.snapshot();
        assert_eq!(snapshot.id, root.id());
        assert_eq!(snapshot.node_count(), 2);
        assert!((snapshot.work_done - root.work_done()).abs() < 1e-9);
        assert!((snapshot.percentage() - 60.0).abs() < 1e-9);
        assert_eq!(snapshot.children[0].task_name, "compile");
        assert_eq!(snapshot.children[0].parent_weight, 8);
        assert_eq!(snapshot.children[0].taken_at, snapshot.taken_at);
    }

    #[test]
    fn test_render_tree() {
        let root = MonitorNode::named("sync");
        root.set_total_work(2).unwrap();
        let child = root.sub_task(2);
        child.set_total_work(1).unwrap();
        child.cancel();
        root.done();

        let text = root.snapshot().render_tree();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "sync 100.0% (2.0/2) [done]");
        assert_eq!(lines[1], "  (unnamed) 0.0% (0.0/1) weight=2 [canceled]");
    }

    #[test]
    fn test_snapshot_serializes() {
        let root = MonitorNode::named("fetch");
        root.uncertain_step_by(3).unwrap();
        let json = serde_json::to_value(root.snapshot()).unwrap();
        assert_eq!(json["task_name"], "fetch");
        assert_eq!(json["total_work"], 3);
        assert_eq!(json["relative_work_done"], 1.0);
        assert!(json["children"].as_array().unwrap().is_empty());
    }
}
