//! Tree-structured progress monitor.
//!
//! A [`MonitorNode`] divides its job into `total_work` abstract units. Units
//! can be stepped directly or delegated to a sub-task created with
//! [`MonitorNode::sub_task`]; a sub-task's fractional completion, multiplied
//! by its weight, is folded into its parent's work done. Deeply nested tasks
//! therefore report in units meaningful to any ancestor without the ancestor
//! knowing their internal step counts.

use crate::monitor::Monitor;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use taskmon_core::{Canceled, MonitorId};
use tracing::debug;

pub(crate) struct Node {
    pub(crate) id: MonitorId,
    pub(crate) total_work: AtomicU64,
    pub(crate) current_work: AtomicU64,
    pub(crate) canceled: AtomicBool,
    pub(crate) done: AtomicBool,
    pub(crate) task_name: RwLock<String>,
    pub(crate) parent: Option<Weak<Node>>,
    pub(crate) parent_weight: u64,
    pub(crate) children: RwLock<Vec<Arc<Node>>>,
}

impl Node {
    fn root() -> Self {
        Self::with_parent(None, 0, false, false)
    }

    fn with_parent(
        parent: Option<Weak<Node>>,
        parent_weight: u64,
        canceled: bool,
        done: bool,
    ) -> Self {
        Self {
            id: MonitorId::new(),
            total_work: AtomicU64::new(0),
            current_work: AtomicU64::new(0),
            canceled: AtomicBool::new(canceled),
            done: AtomicBool::new(done),
            task_name: RwLock::new(String::new()),
            parent,
            parent_weight,
            children: RwLock::new(Vec::new()),
        }
    }

    pub(crate) fn work_done(&self) -> f64 {
        let mut work_done = self.current_work.load(Ordering::SeqCst) as f64;
        for child in self.children() {
            work_done += child.relative_work_done() * child.parent_weight as f64;
        }
        work_done
    }

    pub(crate) fn relative_work_done(&self) -> f64 {
        let total = self.total_work.load(Ordering::SeqCst);
        if total == 0 {
            return 0.0;
        }
        self.work_done() / total as f64
    }

    fn check_cancel(&self) -> Result<(), Canceled> {
        if self.canceled.load(Ordering::SeqCst) {
            return Err(Canceled);
        }
        let mut ancestor = self.parent.as_ref().and_then(Weak::upgrade);
        while let Some(node) = ancestor {
            if node.canceled.load(Ordering::SeqCst) {
                return Err(Canceled);
            }
            ancestor = node.parent.as_ref().and_then(Weak::upgrade);
        }
        Ok(())
    }

    pub(crate) fn children(&self) -> Vec<Arc<Node>> {
        read(&self.children).clone()
    }

    pub(crate) fn task_name(&self) -> String {
        read(&self.task_name).clone()
    }
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

/// Add `n` to `counter`, stopping at `u64::MAX` instead of wrapping.
fn saturating_add(id: MonitorId, counter: &AtomicU64, n: u64) {
    let previous = match counter.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |value| {
        Some(value.saturating_add(n))
    }) {
        Ok(previous) | Err(previous) => previous,
    };
    if previous.checked_add(n).is_none() {
        debug!(monitor = %id, previous, n, "work counter saturated");
    }
}

/// Handle to a node in a progress tree.
///
/// Handles are cheap to clone and share the node they point to, so the same
/// node can be stepped by the task thread and polled by a reporter thread.
/// A node owns its children; children only hold a weak reference back to
/// their parent.
#[derive(Clone)]
pub struct MonitorNode {
    pub(crate) node: Arc<Node>,
}

impl MonitorNode {
    /// Create a root monitor with no total and an empty task name.
    pub fn new() -> Self {
        Self {
            node: Arc::new(Node::root()),
        }
    }

    /// Create a root monitor labeled `name`.
    pub fn named(name: impl Into<String>) -> Self {
        let monitor = Self::new();
        *write(&monitor.node.task_name) = name.into();
        monitor
    }

    /// Create and register a child worth `weight` of this node's work units.
    ///
    /// The child starts with a copy of this node's canceled and done flags.
    /// Later cancellation of this node reaches the child through
    /// [`Monitor::check_cancel`], not through the copied flag.
    pub fn sub_task(&self, weight: u64) -> MonitorNode {
        let canceled = self.node.canceled.load(Ordering::SeqCst);
        let done = self.node.done.load(Ordering::SeqCst);
        if done {
            debug!(parent = %self.node.id, weight, "sub-task created on a finished monitor");
        }
        let child = Arc::new(Node::with_parent(
            Some(Arc::downgrade(&self.node)),
            weight,
            canceled,
            done,
        ));
        write(&self.node.children).push(Arc::clone(&child));
        debug!(parent = %self.node.id, child = %child.id, weight, "sub-task created");
        MonitorNode { node: child }
    }

    /// Unique id of this node.
    pub fn id(&self) -> MonitorId {
        self.node.id
    }

    /// Whether this node has no parent.
    pub fn is_root(&self) -> bool {
        self.node.parent.is_none()
    }

    /// Parent node, if this is a sub-task and the parent is still alive.
    pub fn parent(&self) -> Option<MonitorNode> {
        self.node
            .parent
            .as_ref()
            .and_then(Weak::upgrade)
            .map(|node| MonitorNode { node })
    }

    /// Parent work units this node is worth once complete.
    pub fn parent_weight(&self) -> u64 {
        self.node.parent_weight
    }

    /// Units stepped on this node itself, excluding sub-tasks.
    pub fn current_work(&self) -> u64 {
        self.node.current_work.load(Ordering::SeqCst)
    }

    /// Sub-tasks in creation order.
    pub fn children(&self) -> Vec<MonitorNode> {
        self.node
            .children()
            .into_iter()
            .map(|node| MonitorNode { node })
            .collect()
    }
}

impl Default for MonitorNode {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MonitorNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitorNode")
            .field("id", &self.node.id)
            .field("task_name", &self.node.task_name())
            .field("current_work", &self.current_work())
            .field("total_work", &self.total_work())
            .field("canceled", &self.is_canceled())
            .field("done", &self.is_done())
            .field("children", &read(&self.node.children).len())
            .finish()
    }
}

impl Monitor for MonitorNode {
    fn set_total_work(&self, total: u64) -> Result<(), Canceled> {
        self.node.check_cancel()?;
        let previous = self.node.total_work.fetch_max(total, Ordering::SeqCst);
        if total < previous {
            debug!(monitor = %self.node.id, total, previous, "ignoring attempt to shrink total work");
        }
        Ok(())
    }

    fn step_by(&self, n: u64) -> Result<(), Canceled> {
        saturating_add(self.node.id, &self.node.current_work, n);
        self.node.check_cancel()
    }

    fn uncertain_step_by(&self, n: u64) -> Result<(), Canceled> {
        // Total before current: readers must never see current above total.
        saturating_add(self.node.id, &self.node.total_work, n);
        saturating_add(self.node.id, &self.node.current_work, n);
        self.node.check_cancel()
    }

    fn sub_task(&self, weight: u64) -> Arc<dyn Monitor> {
        Arc::new(MonitorNode::sub_task(self, weight))
    }

    fn cancel(&self) {
        if !self.node.canceled.swap(true, Ordering::SeqCst) {
            debug!(monitor = %self.node.id, "cancellation requested");
        }
    }

    fn is_canceled(&self) -> bool {
        self.node.canceled.load(Ordering::SeqCst)
    }

    fn check_cancel(&self) -> Result<(), Canceled> {
        self.node.check_cancel()
    }

    fn done(&self) {
        let total = self.node.total_work.load(Ordering::SeqCst);
        self.node.current_work.fetch_max(total, Ordering::SeqCst);
        if !self.node.done.swap(true, Ordering::SeqCst) {
            debug!(monitor = %self.node.id, "monitor done");
        }
    }

    fn is_done(&self) -> bool {
        self.node.done.load(Ordering::SeqCst)
    }

    fn work_done(&self) -> f64 {
        self.node.work_done()
    }

    fn total_work(&self) -> u64 {
        self.node.total_work.load(Ordering::SeqCst)
    }

    fn relative_work_done(&self) -> f64 {
        self.node.relative_work_done()
    }

    fn task_name(&self) -> String {
        self.node.task_name()
    }

    fn set_task_name(&self, name: &str) {
        *write(&self.node.task_name) = name.to_string();
    }
}
