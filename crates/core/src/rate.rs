//! Rate derivation between two consecutive samples.

use std::collections::{BTreeMap, BTreeSet};

use crate::sample::{RateRecord, Sample};
use crate::{PulseError, Result};

/// Derive per-second rates from `previous` to `current`.
///
/// Only counters present in both samples are considered. A counter that went
/// backwards (interface reset, wrap) is flagged as a discontinuity and its rate
/// is recorded as `0.0`; the other counters of the tick are unaffected.
///
/// Fails with [`PulseError::InvalidInterval`] when `current` is not strictly
/// newer than `previous`.
pub fn estimate(current: &Sample, previous: &Sample) -> Result<RateRecord> {
    let delta = current.timestamp() - previous.timestamp();
    let elapsed_secs = match delta.num_nanoseconds() {
        Some(ns) => ns as f64 / 1e9,
        None => delta.num_milliseconds() as f64 / 1e3,
    };
    if elapsed_secs <= 0.0 {
        return Err(PulseError::InvalidInterval {
            elapsed_ms: delta.num_milliseconds(),
        });
    }

    let mut rates = BTreeMap::new();
    let mut discontinuities = BTreeSet::new();

    for (name, &now) in current.counters() {
        let Some(before) = previous.counter(name) else {
            continue;
        };
        match now.checked_sub(before) {
            Some(diff) => {
                rates.insert(name.clone(), diff as f64 / elapsed_secs);
            }
            None => {
                rates.insert(name.clone(), 0.0);
                discontinuities.insert(name.clone());
            }
        }
    }

    Ok(RateRecord {
        timestamp: current.timestamp(),
        elapsed_secs,
        rates,
        discontinuities,
    })
}
