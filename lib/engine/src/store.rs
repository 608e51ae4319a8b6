//! Persistence seam for schedule state.
//!
//! The engine never writes state piecemeal. Every processing pass produces
//! one `ChangeSet` holding the full post-event state of each schedule it
//! changed (plus any removals), and the store must apply it all or nothing.
//! That makes group cancellation and the "event consumed" marker atomic
//! with the state change they belong to.
//!
//! Removed schedules leave a tombstone behind. A store reports tombstones
//! on load so a schedule that was retired or cancelled is never brought
//! back by registering its definition again.

use crate::error::StoreError;
use async_trait::async_trait;
use automation_core::ScheduleId;
use automation_schedule::Schedule;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::Mutex;

/// A schedule as held by the engine and persisted by a store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleRecord {
    /// The schedule, including runtime state.
    pub schedule: Schedule,
    /// Registration order, used to break priority ties.
    pub insertion: u64,
    /// Sequence number of the last event applied to this schedule.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sequence: Option<u64>,
}

impl ScheduleRecord {
    /// Returns true if the event with `sequence` was already applied.
    #[must_use]
    pub fn has_consumed(&self, sequence: u64) -> bool {
        self.last_sequence.is_some_and(|last| sequence <= last)
    }
}

/// Changes to apply atomically.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    /// Records to insert or replace.
    pub upserts: Vec<ScheduleRecord>,
    /// Schedules to delete. Each leaves a tombstone.
    pub removals: Vec<ScheduleId>,
}

impl ChangeSet {
    /// Returns true if there is nothing to apply.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.upserts.is_empty() && self.removals.is_empty()
    }

    /// Applies the changes to in-memory state.
    pub fn apply_to(
        self,
        records: &mut BTreeMap<ScheduleId, ScheduleRecord>,
        retired: &mut BTreeSet<ScheduleId>,
    ) {
        for id in self.removals {
            records.remove(&id);
            retired.insert(id);
        }
        for record in self.upserts {
            records.insert(record.schedule.id(), record);
        }
    }
}

/// Everything a store holds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    /// Active schedules.
    pub records: Vec<ScheduleRecord>,
    /// Tombstones of schedules that were removed.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub retired: BTreeSet<ScheduleId>,
}

impl StoreSnapshot {
    /// Builds a snapshot from keyed state.
    #[must_use]
    pub fn from_parts(
        records: BTreeMap<ScheduleId, ScheduleRecord>,
        retired: BTreeSet<ScheduleId>,
    ) -> Self {
        Self {
            records: records.into_values().collect(),
            retired,
        }
    }

    /// Splits the snapshot into keyed state.
    #[must_use]
    pub fn into_parts(self) -> (BTreeMap<ScheduleId, ScheduleRecord>, BTreeSet<ScheduleId>) {
        let records = self
            .records
            .into_iter()
            .map(|record| (record.schedule.id(), record))
            .collect();
        (records, self.retired)
    }
}

/// Durable storage for schedule records.
#[async_trait]
pub trait ScheduleStore: Send + Sync {
    /// Loads every persisted record and tombstone.
    async fn load(&self) -> Result<StoreSnapshot, StoreError>;

    /// Applies a change set atomically.
    async fn commit(&self, changes: ChangeSet) -> Result<(), StoreError>;
}

#[async_trait]
impl<S: ScheduleStore + ?Sized> ScheduleStore for Arc<S> {
    async fn load(&self) -> Result<StoreSnapshot, StoreError> {
        (**self).load().await
    }

    async fn commit(&self, changes: ChangeSet) -> Result<(), StoreError> {
        (**self).commit(changes).await
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    records: BTreeMap<ScheduleId, ScheduleRecord>,
    retired: BTreeSet<ScheduleId>,
}

/// A store that keeps records in memory.
#[derive(Debug, Default)]
pub struct InMemoryScheduleStore {
    state: Mutex<MemoryState>,
}

impl InMemoryScheduleStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the stored record for a schedule.
    pub async fn get(&self, id: ScheduleId) -> Option<ScheduleRecord> {
        self.state.lock().await.records.get(&id).cloned()
    }

    /// Returns how many records are stored.
    pub async fn len(&self) -> usize {
        self.state.lock().await.records.len()
    }

    /// Returns true if a tombstone exists for `id`.
    pub async fn is_retired(&self, id: ScheduleId) -> bool {
        self.state.lock().await.retired.contains(&id)
    }
}

#[async_trait]
impl ScheduleStore for InMemoryScheduleStore {
    async fn load(&self) -> Result<StoreSnapshot, StoreError> {
        let state = self.state.lock().await;
        Ok(StoreSnapshot::from_parts(state.records.clone(), state.retired.clone()))
    }

    async fn commit(&self, changes: ChangeSet) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let MemoryState { records, retired } = &mut *state;
        changes.apply_to(records, retired);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use automation_schedule::{ScheduleBuilder, Trigger, TriggerType};

    fn record(insertion: u64) -> ScheduleRecord {
        ScheduleRecord {
            schedule: ScheduleBuilder::new()
                .with_trigger(Trigger::new(TriggerType::AppInit, 1.0))
                .build(),
            insertion,
            last_sequence: None,
        }
    }

    #[test]
    fn has_consumed_compares_sequences() {
        let mut record = record(0);
        assert!(!record.has_consumed(0));
        record.last_sequence = Some(5);
        assert!(record.has_consumed(5));
        assert!(record.has_consumed(4));
        assert!(!record.has_consumed(6));
    }

    #[tokio::test]
    async fn in_memory_store_applies_change_sets() {
        let store = InMemoryScheduleStore::new();
        let first = record(0);
        let second = record(1);
        let first_id = first.schedule.id();

        store
            .commit(ChangeSet {
                upserts: vec![first, second.clone()],
                removals: Vec::new(),
            })
            .await
            .expect("commit");
        assert_eq!(store.len().await, 2);

        store
            .commit(ChangeSet {
                upserts: Vec::new(),
                removals: vec![first_id],
            })
            .await
            .expect("commit");
        let loaded = store.load().await.expect("load");
        assert_eq!(loaded.records, vec![second]);
        assert!(loaded.retired.contains(&first_id));
        assert!(store.is_retired(first_id).await);
    }

    #[tokio::test]
    async fn shared_store_through_arc() {
        let store = Arc::new(InMemoryScheduleStore::new());
        let shared: Arc<InMemoryScheduleStore> = Arc::clone(&store);
        let record = record(3);
        let id = record.schedule.id();

        shared
            .commit(ChangeSet {
                upserts: vec![record],
                removals: Vec::new(),
            })
            .await
            .expect("commit");
        assert_eq!(store.get(id).await.map(|r| r.insertion), Some(3));
    }
}
