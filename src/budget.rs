//! Global task budget.
//!
//! # Invariants
//! - The number of admitted tasks never exceeds `capacity`.
//! - Admission is all-or-nothing: a rejected task leaves no trace.
//! - The check-and-append step is atomic; two branches racing for the last
//!   slot cannot both win it.

use std::sync::Mutex;

/// Fixed-capacity tracker of every task ever admitted into the tree.
///
/// Passed around as an explicit handle; there is deliberately no global
/// instance. The mutex guards a critical section with no await points, so a
/// std mutex is sufficient.
#[derive(Debug)]
pub struct TaskBudget {
    capacity: usize,
    admitted: Mutex<Vec<String>>,
}

impl TaskBudget {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            admitted: Mutex::new(Vec::new()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of tasks admitted so far.
    pub fn admitted_count(&self) -> usize {
        self.admitted.lock().expect("budget mutex poisoned").len()
    }

    /// Whether the tracker is at capacity.
    pub fn is_full(&self) -> bool {
        self.admitted_count() >= self.capacity
    }

    /// Atomically admit `task_id` if there is room.
    ///
    /// Returns `false` (and records nothing) when the tracker is full.
    pub fn try_admit(&self, task_id: &str) -> bool {
        let mut admitted = self.admitted.lock().expect("budget mutex poisoned");
        if admitted.len() >= self.capacity {
            return false;
        }
        admitted.push(task_id.to_string());
        true
    }

    /// Ids of admitted tasks, in admission order.
    pub fn admitted_ids(&self) -> Vec<String> {
        self.admitted.lock().expect("budget mutex poisoned").clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn ceiling_is_exact() {
        let budget = TaskBudget::new(3);
        assert!(budget.try_admit("a"));
        assert!(budget.try_admit("b"));
        assert!(budget.try_admit("c"));
        assert!(!budget.try_admit("d"));
        assert_eq!(budget.admitted_count(), 3);
        assert_eq!(budget.admitted_ids(), vec!["a", "b", "c"]);
    }

    #[test]
    fn rejected_admission_records_nothing() {
        let budget = TaskBudget::new(1);
        assert!(budget.try_admit("a"));
        assert!(!budget.try_admit("b"));
        assert_eq!(budget.admitted_ids(), vec!["a"]);
    }

    #[test]
    fn concurrent_admissions_never_exceed_capacity() {
        let budget = Arc::new(TaskBudget::new(16));
        let handles: Vec<_> = (0..64)
            .map(|i| {
                let budget = Arc::clone(&budget);
                std::thread::spawn(move || budget.try_admit(&format!("t{}", i)))
            })
            .collect();
        let wins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|&won| won)
            .count();
        assert_eq!(wins, 16);
        assert_eq!(budget.admitted_count(), 16);
    }
}
