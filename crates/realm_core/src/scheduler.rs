//! Tick-polled timer queue.
//!
//! Timed work (attack completion, delayed despawn) is pushed onto a min-heap
//! keyed by due time and drained by [`Scheduler::pop_due`] at the start of
//! each `advance`. Every task is tied to an entity through an explicit
//! handle map, so removing an entity cancels everything it had pending.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use crate::components::EntityId;
use crate::events::DespawnReason;

/// Work the scheduler can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    /// Close an entity's attack window.
    AttackFinish(EntityId),
    /// Remove an entity from the store.
    Despawn {
        /// Entity to remove.
        entity: EntityId,
        /// Reason reported in `EntityDespawned`.
        reason: DespawnReason,
    },
}

impl Task {
    /// Entity the task belongs to.
    #[must_use]
    pub const fn entity(&self) -> EntityId {
        match *self {
            Self::AttackFinish(entity) | Self::Despawn { entity, .. } => entity,
        }
    }
}

/// Handle for cancelling a scheduled task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskHandle(u64);

/// A task popped from the queue, with the time it was due.
///
/// Work that depends on time (cooldowns armed when a window closes) uses
/// `due_ms`, not the time of the `advance` that happened to drain it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DueTask {
    /// Handle the task was scheduled under.
    pub handle: TaskHandle,
    /// Time the task was due.
    pub due_ms: u64,
    /// The work itself.
    pub task: Task,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Entry {
    due_ms: u64,
    handle: TaskHandle,
    task: Task,
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed for min-heap behavior; equal due times run in schedule order.
        match other.due_ms.cmp(&self.due_ms) {
            Ordering::Equal => other.handle.cmp(&self.handle),
            ord => ord,
        }
    }
}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Min-heap of timed tasks with per-entity cancellation.
///
/// Cancelled entries stay in the heap and are skipped when popped.
#[derive(Debug, Clone, Default)]
pub struct Scheduler {
    heap: BinaryHeap<Entry>,
    live: HashMap<TaskHandle, EntityId>,
    by_entity: HashMap<EntityId, Vec<TaskHandle>>,
    next_handle: u64,
}

impl Scheduler {
    /// Create an empty scheduler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `task` to run once `now_ms >= due_ms`.
    pub fn schedule(&mut self, due_ms: u64, task: Task) -> TaskHandle {
        let handle = TaskHandle(self.next_handle);
        self.next_handle += 1;
        let entity = task.entity();
        self.heap.push(Entry {
            due_ms,
            handle,
            task,
        });
        self.live.insert(handle, entity);
        self.by_entity.entry(entity).or_default().push(handle);
        handle
    }

    /// Cancel one task. Returns false if it already ran or was cancelled.
    pub fn cancel(&mut self, handle: TaskHandle) -> bool {
        let Some(entity) = self.live.remove(&handle) else {
            return false;
        };
        self.forget(entity, handle);
        true
    }

    /// Cancel every pending task of an entity. Returns how many were
    /// cancelled.
    pub fn cancel_entity(&mut self, entity: EntityId) -> usize {
        let handles = self.by_entity.remove(&entity).unwrap_or_default();
        handles
            .into_iter()
            .filter(|h| self.live.remove(h).is_some())
            .count()
    }

    /// Pop the earliest task due at `now_ms`, skipping cancelled ones.
    pub fn pop_due(&mut self, now_ms: u64) -> Option<DueTask> {
        while let Some(top) = self.heap.peek() {
            if top.due_ms > now_ms {
                return None;
            }
            let entry = self.heap.pop()?;
            if let Some(entity) = self.live.remove(&entry.handle) {
                self.forget(entity, entry.handle);
                return Some(DueTask {
                    handle: entry.handle,
                    due_ms: entry.due_ms,
                    task: entry.task,
                });
            }
        }
        None
    }

    /// True while the task is waiting to run.
    #[must_use]
    pub fn is_pending(&self, handle: TaskHandle) -> bool {
        self.live.contains_key(&handle)
    }

    /// Number of pending tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.live.len()
    }

    /// True when nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Drop every task.
    pub fn clear(&mut self) {
        self.heap.clear();
        self.live.clear();
        self.by_entity.clear();
    }

    fn forget(&mut self, entity: EntityId, handle: TaskHandle) {
        if let Some(handles) = self.by_entity.get_mut(&entity) {
            handles.retain(|h| *h != handle);
            if handles.is_empty() {
                self.by_entity.remove(&entity);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pops_in_due_order() {
        let mut scheduler = Scheduler::new();
        scheduler.schedule(300, Task::AttackFinish(3));
        scheduler.schedule(100, Task::AttackFinish(1));
        scheduler.schedule(200, Task::AttackFinish(2));

        assert!(scheduler.pop_due(50).is_none());
        let due: Vec<_> = std::iter::from_fn(|| scheduler.pop_due(250))
            .map(|d| d.task.entity())
            .collect();
        assert_eq!(due, vec![1, 2]);
        assert_eq!(scheduler.len(), 1);
    }

    #[test]
    fn test_equal_due_times_keep_schedule_order() {
        let mut scheduler = Scheduler::new();
        scheduler.schedule(100, Task::AttackFinish(9));
        scheduler.schedule(100, Task::AttackFinish(4));
        assert_eq!(scheduler.pop_due(100).unwrap().task, Task::AttackFinish(9));
        assert_eq!(scheduler.pop_due(100).unwrap().task, Task::AttackFinish(4));
    }

    #[test]
    fn test_cancel_skips_task() {
        let mut scheduler = Scheduler::new();
        let handle = scheduler.schedule(100, Task::AttackFinish(1));
        assert!(scheduler.cancel(handle));
        assert!(!scheduler.cancel(handle));
        assert!(scheduler.pop_due(1000).is_none());
    }

    #[test]
    fn test_cancel_entity() {
        let mut scheduler = Scheduler::new();
        scheduler.schedule(100, Task::AttackFinish(1));
        scheduler.schedule(
            500,
            Task::Despawn {
                entity: 1,
                reason: DespawnReason::Killed,
            },
        );
        let other = scheduler.schedule(100, Task::AttackFinish(2));

        assert_eq!(scheduler.cancel_entity(1), 2);
        assert_eq!(scheduler.len(), 1);
        assert!(scheduler.is_pending(other));
        assert_eq!(scheduler.pop_due(1000).unwrap().handle, other);
    }

    #[test]
    fn test_late_pop_reports_due_time() {
        let mut scheduler = Scheduler::new();
        scheduler.schedule(400, Task::AttackFinish(1));
        let due = scheduler.pop_due(3000).unwrap();
        assert_eq!(due.due_ms, 400);
        assert_eq!(due.task, Task::AttackFinish(1));
    }
}
