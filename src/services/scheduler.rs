//! Cross-project priority scheduling.
//!
//! When a worker asks for "any job", the project most in need of work is
//! sampled with probability proportional to its priority weight:
//!
//!   weight = jobs left to do * mean seconds per job / seconds to deadline
//!
//! A project without deadline weighs 1, a project past its deadline keeps
//! the full numerator, and a drained project weighs 0 and is never chosen.

use chrono::NaiveDateTime;

use crate::entity::project;

/// Assumed mean processing time before any job of a project has finished.
///
/// Deliberately high so a brand-new project is likely to be served at
/// least once and yield a real processing-time sample.
pub const DEFAULT_MEAN_PROCESSING_TIME: f64 = 3600.0;

/// Priority weight of one project at `now`.
pub fn priority_weight(p: &project::Model, now: NaiveDateTime) -> f64 {
    let remaining = p.nr_added - p.nr_claimed;
    if remaining <= 0 {
        return 0.0;
    }
    let Some(deadline) = p.deadline else {
        return 1.0;
    };

    let processed = p.nr_finished + p.nr_failed;
    let mean_processing_time = if p.processing_time_total > 0.0 && processed > 0 {
        p.processing_time_total / processed as f64
    } else {
        DEFAULT_MEAN_PROCESSING_TIME
    };

    let numerator = remaining as f64 * mean_processing_time;
    let seconds_left = (deadline - now).num_milliseconds() as f64 / 1000.0;
    if seconds_left <= 0.0 {
        numerator
    } else {
        numerator / seconds_left
    }
}

/// Pick the first project whose cumulative weight reaches `r`, where
/// `r` is drawn uniformly from `[0, total weight)`. Weightless projects
/// are skipped.
pub fn pick_weighted(weights: &[(String, f64)], r: f64) -> Option<&str> {
    let mut upto = 0.0;
    let mut last = None;
    for (id, weight) in weights {
        if *weight <= 0.0 {
            continue;
        }
        if upto + weight >= r {
            return Some(id);
        }
        upto += weight;
        last = Some(id.as_str());
    }
    // r can only exceed the sum through float rounding
    last
}
