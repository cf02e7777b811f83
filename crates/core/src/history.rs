use chrono::{DateTime, Duration as TimeDelta, Utc};
use std::num::NonZeroUsize;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::ring::RingBuffer;
use crate::sample::{RateRecord, Sample};
use crate::{PulseError, Result};

/// Anything that can be retained in a [`HistoryWindow`].
pub trait Timestamped {
    fn timestamp(&self) -> DateTime<Utc>;
}

impl Timestamped for RateRecord {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

impl Timestamped for Sample {
    fn timestamp(&self) -> DateTime<Utc> {
        Sample::timestamp(self)
    }
}

/// Bounded, time-ordered record history shared between a sampling task and
/// any number of readers.
///
/// Storage is capped at `capacity` records (oldest evicted first). Retention
/// by age is applied at read time: [`query`](Self::query) filters by cutoff,
/// it does not evict. Every read returns an owned copy, so readers never
/// observe an append in progress.
#[derive(Debug)]
pub struct HistoryWindow<T = RateRecord> {
    records: RwLock<RingBuffer<T>>,
}

impl<T: Timestamped + Clone> HistoryWindow<T> {
    /// Fails with [`PulseError::Config`] if `capacity` is zero.
    pub fn new(capacity: usize) -> Result<Self> {
        let capacity = NonZeroUsize::new(capacity)
            .ok_or_else(|| PulseError::Config("history capacity must be positive".into()))?;
        Ok(Self {
            records: RwLock::new(RingBuffer::new(capacity)),
        })
    }

    /// Append a record, evicting the oldest one at capacity.
    ///
    /// Records older than the newest retained one are dropped so the window
    /// stays time-ordered; returns `false` in that case.
    pub fn append(&self, record: T) -> bool {
        let mut records = self.write();
        if let Some(newest) = records.newest() {
            if record.timestamp() < newest.timestamp() {
                tracing::warn!(
                    "dropping out-of-order history record ({} < {})",
                    record.timestamp(),
                    newest.timestamp()
                );
                return false;
            }
        }
        records.push(record);
        true
    }

    /// All retained records with `timestamp > cutoff`, oldest first.
    pub fn query(&self, cutoff: DateTime<Utc>) -> Vec<T> {
        let records = self.read();
        let mut newer: Vec<T> = records
            .iter()
            .rev()
            .take_while(|r| r.timestamp() > cutoff)
            .cloned()
            .collect();
        newer.reverse();
        newer
    }

    /// Records from the last `minutes` minutes relative to `now`.
    pub fn query_minutes(&self, minutes: u32, now: DateTime<Utc>) -> Vec<T> {
        self.query(now - TimeDelta::minutes(i64::from(minutes)))
    }

    /// Every retained record, oldest first.
    pub fn snapshot(&self) -> Vec<T> {
        self.read().iter().cloned().collect()
    }

    pub fn latest(&self) -> Option<T> {
        self.read().newest().cloned()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.read().capacity()
    }

    // Writers only ever push whole records, so a poisoned lock is still consistent.
    fn read(&self) -> RwLockReadGuard<'_, RingBuffer<T>> {
        self.records.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RingBuffer<T>> {
        self.records.write().unwrap_or_else(PoisonError::into_inner)
    }
}
