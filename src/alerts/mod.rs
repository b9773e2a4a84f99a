//! Alert rule engine.
//!
//! Turns aggregate metrics and extracted field issues into deduplicated,
//! severity-ranked operator alerts. Metric rules are re-evaluated on a
//! schedule and keyed by a stable rule id; issue alerts are created once per
//! observation fingerprint. Lifecycle is forward-only:
//! active → acknowledged → resolved.

pub mod engine;
pub mod rules;
