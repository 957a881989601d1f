//! Scalar reward from verification, timing and regressions.

mod calculator;

pub use calculator::{default_time_score, RewardBreakdown, RewardCalculator, RewardWeights, EPSILON};
