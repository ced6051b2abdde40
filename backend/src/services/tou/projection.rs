//! Base-year level and multi-year projection of a group.

use super::stats::GroupStats;

/// Groups with fewer events use the mean as their final value.
pub const SMALL_VOLUME_THRESHOLD: usize = 32;

/// Part of the potential taken as the improvement target.
pub const POTENTIAL_TARGET_SHARE: f64 = 0.75;

#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    /// count < 32
    pub small_volume: bool,
    /// Q2 > mean
    pub median_above_mean: bool,
    pub final_value: f64,
    pub current_level: f64,
    pub potential: f64,
    pub potential_target: f64,
    pub rate: f64,
    /// Base year first, then one value per projected year
    pub annual: Vec<f64>,
}

/// Annual rate that brings `current_level` down by `target` over `horizon` years.
///
/// Zero current level or zero horizon yields a rate of 0.
pub fn annual_rate(current_level: f64, target: f64, horizon: u32) -> f64 {
    if current_level == 0.0 || horizon == 0 {
        return 0.0;
    }
    let ratio = (current_level - target) / current_level;
    if ratio <= 0.0 {
        return -1.0;
    }
    ratio.powf(1.0 / horizon as f64) - 1.0
}

/// `years + 1` values starting at `base`, each the previous times `1 + rate`.
pub fn compound(base: f64, rate: f64, years: u32) -> Vec<f64> {
    let mut values = Vec::with_capacity(years as usize + 1);
    let mut current = base;
    values.push(current);
    for _ in 0..years {
        current += current * rate;
        values.push(current);
    }
    values
}

pub fn project(stats: &GroupStats, horizon: u32) -> Projection {
    let small_volume = stats.count < SMALL_VOLUME_THRESHOLD;
    let median_above_mean = stats.q2 > stats.mean;
    let final_value = if small_volume { stats.mean } else { stats.q1 };
    let current_level = if median_above_mean { stats.q2 } else { stats.mean };
    let potential = current_level - final_value;
    let potential_target = potential * POTENTIAL_TARGET_SHARE;
    let rate = annual_rate(current_level, potential_target, horizon);

    Projection {
        small_volume,
        median_above_mean,
        final_value,
        current_level,
        potential,
        potential_target,
        rate,
        annual: compound(current_level, rate, horizon),
    }
}
