use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};

use crate::units;

/// Name of a monotonic counter, e.g. `"bytes_sent"` or `"frames"`.
pub type CounterName = Cow<'static, str>;

/// One timestamped reading of a set of monotonic counters.
///
/// Built once by a counter source and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    timestamp: DateTime<Utc>,
    counters:  BTreeMap<CounterName, u64>,
}

impl Sample {
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            counters: BTreeMap::new(),
        }
    }

    /// Start a sample stamped with the current wall-clock time.
    pub fn now() -> Self {
        Self::new(Utc::now())
    }

    /// Builder-style counter insertion.
    #[must_use]
    pub fn with(mut self, name: impl Into<CounterName>, value: u64) -> Self {
        self.counters.insert(name.into(), value);
        self
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn counter(&self, name: &str) -> Option<u64> {
        self.counters.get(name).copied()
    }

    pub fn counters(&self) -> &BTreeMap<CounterName, u64> {
        &self.counters
    }
}

/// Per-second rates derived from two consecutive [`Sample`]s.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateRecord {
    pub(crate) timestamp:       DateTime<Utc>,
    pub(crate) elapsed_secs:    f64,
    /// Rate per counter. Discontinuous counters hold `0.0` here.
    pub(crate) rates:           BTreeMap<CounterName, f64>,
    /// Counters that went backwards during this interval.
    pub(crate) discontinuities: BTreeSet<CounterName>,
}

impl RateRecord {
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Seconds between the two samples this record was derived from.
    pub fn elapsed_secs(&self) -> f64 {
        self.elapsed_secs
    }

    /// Per-second rate of `name`, or `None` when the counter was absent from
    /// either sample or reset during the interval.
    pub fn rate(&self, name: &str) -> Option<f64> {
        if self.discontinuities.contains(name) {
            return None;
        }
        self.rates.get(name).copied()
    }

    /// Binary megabits per second for a byte counter.
    pub fn mbps(&self, name: &str) -> Option<f64> {
        self.rate(name).map(units::bytes_per_sec_to_mbps)
    }

    pub fn rates(&self) -> &BTreeMap<CounterName, f64> {
        &self.rates
    }

    pub fn is_discontinuous(&self) -> bool {
        !self.discontinuities.is_empty()
    }

    pub fn discontinuities(&self) -> impl Iterator<Item = &str> {
        self.discontinuities.iter().map(|c| c.as_ref())
    }
}
