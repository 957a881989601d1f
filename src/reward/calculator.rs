use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Floor for the estimated time in the time ratio.
pub const EPSILON: f64 = 1e-6;

/// Partial credit floor for solving over the expected command count.
const OVER_BUDGET_EFFICIENCY_FLOOR: f64 = 0.7;

/// Penalty weights applied to the base score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RewardWeights {
    pub time_penalty_weight: f64,
    pub regression_weight: f64,
}

impl Default for RewardWeights {
    fn default() -> Self {
        Self {
            time_penalty_weight: 0.1,
            regression_weight: 0.3,
        }
    }
}

/// Reward for one step, with the pieces it was computed from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewardBreakdown {
    pub base_reward: f64,
    pub time_score: f64,
    pub regression_score: f64,
    pub total_reward: f64,
    pub components: BTreeMap<String, f64>,
}

impl RewardBreakdown {
    /// Breakdown for a step that produced no reward.
    pub fn zero() -> Self {
        Self {
            base_reward: 0.0,
            time_score: 0.0,
            regression_score: 0.0,
            total_reward: 0.0,
            components: BTreeMap::new(),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// `1` while on time, `1/ratio` once over.
pub fn default_time_score(time_ratio: f64) -> f64 {
    if time_ratio <= 1.0 {
        1.0
    } else {
        1.0 / time_ratio
    }
}

#[derive(Debug, Clone)]
pub struct RewardCalculator {
    weights: RewardWeights,
    time_scorer: fn(f64) -> f64,
}

impl Default for RewardCalculator {
    fn default() -> Self {
        Self::new()
    }
}

impl RewardCalculator {
    pub fn new() -> Self {
        Self {
            weights: RewardWeights::default(),
            time_scorer: default_time_score,
        }
    }

    pub fn with_weights(mut self, weights: RewardWeights) -> Self {
        self.weights = weights;
        self
    }

    /// Replaces the time-ratio to score mapping. Its output is clamped to [0, 1].
    pub fn with_time_scorer(mut self, scorer: fn(f64) -> f64) -> Self {
        self.time_scorer = scorer;
        self
    }

    pub fn weights(&self) -> &RewardWeights {
        &self.weights
    }

    /// Combines the verification base score with time and regression penalties.
    ///
    /// `total = base × (1 − tw·(1 − time)) × (1 − rw·(1 − regression))`,
    /// clamped to [0, 1]. Negative or non-finite inputs count as zero.
    pub fn calculate(
        &self,
        base_score: f64,
        actual_time: f64,
        estimated_time: f64,
        regression_count: usize,
        baseline_test_total: usize,
    ) -> RewardBreakdown {
        let base = clamp_unit(non_negative(base_score));
        let actual = non_negative(actual_time);
        let estimated = non_negative(estimated_time);

        let time_ratio = actual / estimated.max(EPSILON);
        let time_score = clamp_unit((self.time_scorer)(time_ratio));
        let regression_score =
            clamp_unit(1.0 - regression_count as f64 / baseline_test_total.max(1) as f64);

        let time_penalty = self.weights.time_penalty_weight * (1.0 - time_score);
        let regression_penalty = self.weights.regression_weight * (1.0 - regression_score);
        let total_reward = clamp_unit(base * (1.0 - time_penalty) * (1.0 - regression_penalty));

        let mut components = BTreeMap::new();
        components.insert("verification_score".to_string(), base);
        components.insert("time_ratio".to_string(), time_ratio);
        components.insert("time_penalty".to_string(), time_penalty);
        components.insert("regression_penalty".to_string(), regression_penalty);
        components.insert("regression_count".to_string(), regression_count as f64);

        debug!(
            "Reward: base {:.3}, time {:.3}, regression {:.3} -> {:.3}",
            base, time_score, regression_score, total_reward
        );

        RewardBreakdown {
            base_reward: base,
            time_score,
            regression_score,
            total_reward,
            components,
        }
    }

    /// Command-efficiency credit. Reported alongside the reward, never folded
    /// into `total_reward`.
    pub fn efficiency(expected_commands: u32, actual_commands: u32, solved: bool) -> f64 {
        if !solved || actual_commands == 0 {
            return 1.0;
        }
        let ratio = f64::from(expected_commands) / f64::from(actual_commands);
        if actual_commands <= expected_commands {
            ratio.min(1.0)
        } else {
            ratio.max(OVER_BUDGET_EFFICIENCY_FLOOR)
        }
    }
}

fn non_negative(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}
