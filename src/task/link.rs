//! Dataflow links between tasks.
//!
//! A link is a named, typed slot connecting one producing task to any number
//! of consuming tasks. The slot is single-assignment: `set_value` succeeds
//! exactly once, and that same moment releases every waiter parked in
//! `await_ready` (and any waiter that arrives later).
//!
//! # Invariants
//! - `value` transitions unset -> set at most once; it is never overwritten.
//! - The readiness signal fires exactly when the value is stored, atomically.

use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::watch;

/// Where a link's content semantically originates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    Text,
    File,
    Database,
    Api,
    Url,
    Console,
}

/// Second `set_value` call on the same link.
#[derive(Debug, Clone, Error)]
#[error("value for link '{link_id}' was already set")]
pub struct AlreadySetError {
    pub link_id: String,
}

/// A single-assignment dataflow slot.
///
/// Owned by its producing task, shared (via `Arc`) with every consumer.
/// The readiness primitive is a watch channel: `send_if_modified` gives the
/// atomic "if unset, store and wake everyone" step, and receivers created at
/// any time observe an already-set value immediately.
pub struct Link {
    link_id: String,
    link_name: String,
    link_description: String,
    data_type: String,
    data_source_type: DataSource,
    /// Stamped once, when the link first appears in a `produces` list.
    producer: OnceLock<Producer>,
    slot: watch::Sender<Option<Value>>,
}

#[derive(Debug, Clone)]
struct Producer {
    task_id: String,
    task_name: String,
}

impl Link {
    pub fn new(
        link_id: impl Into<String>,
        link_name: impl Into<String>,
        link_description: impl Into<String>,
        data_type: impl Into<String>,
        data_source_type: DataSource,
    ) -> Self {
        let (slot, _) = watch::channel(None);
        Self {
            link_id: link_id.into(),
            link_name: link_name.into(),
            link_description: link_description.into(),
            data_type: data_type.into(),
            data_source_type,
            producer: OnceLock::new(),
            slot,
        }
    }

    pub fn link_id(&self) -> &str {
        &self.link_id
    }

    pub fn link_name(&self) -> &str {
        &self.link_name
    }

    pub fn data_type(&self) -> &str {
        &self.data_type
    }

    pub fn data_source_type(&self) -> DataSource {
        self.data_source_type
    }

    /// Current value, if already produced.
    pub fn value(&self) -> Option<Value> {
        self.slot.borrow().clone()
    }

    pub fn is_ready(&self) -> bool {
        self.slot.borrow().is_some()
    }

    /// Record which task produces this link. First stamp wins.
    pub fn stamp_producer(&self, task_id: &str, task_name: &str) {
        let _ = self.producer.set(Producer {
            task_id: task_id.to_string(),
            task_name: task_name.to_string(),
        });
    }

    /// Suspend until the value is set; return it immediately if it already is.
    ///
    /// Cooperative: parks only this future, never a worker thread. Any number
    /// of concurrent waiters are all released by the one `set_value` call.
    /// Never times out on its own; callers impose deadlines externally.
    pub async fn await_ready(&self) -> Value {
        let mut rx = self.slot.subscribe();
        let result = match rx.wait_for(|slot| slot.is_some()).await {
            Ok(slot) => slot.clone().unwrap_or(Value::Null),
            // The sender lives inside self, which the caller borrows, so it
            // cannot have been dropped while we wait.
            Err(_) => Value::Null,
        };
        result
    }

    /// Store the value and release all current and future waiters.
    ///
    /// # Errors
    /// `AlreadySetError` on any call after the first; the stored value is
    /// left untouched.
    pub fn set_value(&self, value: Value) -> Result<(), AlreadySetError> {
        let mut candidate = Some(value);
        let stored = self.slot.send_if_modified(|slot| {
            if slot.is_some() {
                false
            } else {
                *slot = candidate.take();
                true
            }
        });
        if stored {
            Ok(())
        } else {
            Err(AlreadySetError {
                link_id: self.link_id.clone(),
            })
        }
    }

    /// Serializable point-in-time view of this link.
    pub fn snapshot(&self) -> LinkSnapshot {
        let producer = self.producer.get();
        LinkSnapshot {
            link_id: self.link_id.clone(),
            link_name: self.link_name.clone(),
            link_description: self.link_description.clone(),
            data_type: self.data_type.clone(),
            data_source_type: self.data_source_type,
            value: self.value(),
            produced_by_task_id: producer.map(|p| p.task_id.clone()),
            produced_by_task_name: producer.map(|p| p.task_name.clone()),
        }
    }
}

impl std::fmt::Debug for Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Link")
            .field("link_id", &self.link_id)
            .field("link_name", &self.link_name)
            .field("data_type", &self.data_type)
            .field("ready", &self.is_ready())
            .finish()
    }
}

/// Serializable view of a [`Link`] for the run artifact.
#[derive(Debug, Clone, Serialize)]
pub struct LinkSnapshot {
    pub link_id: String,
    pub link_name: String,
    pub link_description: String,
    pub data_type: String,
    pub data_source_type: DataSource,
    pub value: Option<Value>,
    pub produced_by_task_id: Option<String>,
    pub produced_by_task_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    fn link() -> Link {
        Link::new("l1", "total", "running total", "number", DataSource::Text)
    }

    #[test]
    fn second_set_fails_and_value_is_unchanged() {
        let link = link();
        link.set_value(json!(1)).unwrap();
        let err = link.set_value(json!(2)).unwrap_err();
        assert_eq!(err.link_id, "l1");
        assert_eq!(link.value(), Some(json!(1)));
    }

    #[test]
    fn await_after_set_returns_immediately() {
        let link = link();
        link.set_value(json!("done")).unwrap();
        tokio_test::block_on(async {
            assert_eq!(link.await_ready().await, json!("done"));
        });
    }

    #[tokio::test]
    async fn waiter_parked_before_set_is_released() {
        let link = Arc::new(link());
        let waiter = {
            let link = Arc::clone(&link);
            tokio::spawn(async move { link.await_ready().await })
        };
        tokio::task::yield_now().await;
        link.set_value(json!(42)).unwrap();
        assert_eq!(waiter.await.unwrap(), json!(42));
    }

    #[tokio::test]
    async fn all_concurrent_waiters_are_released() {
        let link = Arc::new(link());
        let waiters: Vec<_> = (0..8)
            .map(|_| {
                let link = Arc::clone(&link);
                tokio::spawn(async move { link.await_ready().await })
            })
            .collect();
        tokio::task::yield_now().await;
        link.set_value(json!(7)).unwrap();
        for waiter in waiters {
            assert_eq!(waiter.await.unwrap(), json!(7));
        }
    }

    #[test]
    fn producer_stamp_is_first_wins() {
        let link = link();
        link.stamp_producer("t1", "first");
        link.stamp_producer("t2", "second");
        let snapshot = link.snapshot();
        assert_eq!(snapshot.produced_by_task_id.as_deref(), Some("t1"));
        assert_eq!(snapshot.produced_by_task_name.as_deref(), Some("first"));
    }
}
