//! Descriptive statistics over per-group downtime values.

use std::collections::HashMap;

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Quantile with linear interpolation between closest ranks.
///
/// `sorted` must be in ascending order.
pub fn quantile(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        n => {
            let position = q.clamp(0.0, 1.0) * (n - 1) as f64;
            let lower = position.floor() as usize;
            let upper = position.ceil() as usize;
            let weight = position - lower as f64;
            sorted[lower] + (sorted[upper] - sorted[lower]) * weight
        }
    }
}

/// Most frequent value after rounding to two decimals; ties resolve to the smallest.
pub fn mode_rounded(values: &[f64]) -> f64 {
    let mut counts: HashMap<i64, usize> = HashMap::new();
    for value in values {
        *counts.entry((value * 100.0).round_ties_even() as i64).or_default() += 1;
    }
    counts
        .into_iter()
        .max_by(|(a_key, a_count), (b_key, b_count)| {
            a_count.cmp(b_count).then_with(|| b_key.cmp(a_key))
        })
        .map(|(key, _)| key as f64 / 100.0)
        .unwrap_or(0.0)
}

/// Summary of one aggregation group.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroupStats {
    pub count: usize,
    pub mean: f64,
    pub q1: f64,
    pub q2: f64,
    pub mode: f64,
}

impl GroupStats {
    pub fn from_values(mut values: Vec<f64>) -> Self {
        values.sort_by(|a, b| a.total_cmp(b));
        Self {
            count: values.len(),
            mean: mean(&values),
            q1: quantile(&values, 0.25),
            q2: quantile(&values, 0.5),
            mode: mode_rounded(&values),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantile_linear_interpolation() {
        let sorted = [1.0, 2.0, 3.0, 4.0];
        assert!((quantile(&sorted, 0.25) - 1.75).abs() < 1e-12);
        assert!((quantile(&sorted, 0.5) - 2.5).abs() < 1e-12);
        assert_eq!(quantile(&[7.0], 0.25), 7.0);
    }

    #[test]
    fn test_mode_ties_take_smallest() {
        assert_eq!(mode_rounded(&[2.0, 1.0, 2.0, 1.0, 3.0]), 1.0);
        assert_eq!(mode_rounded(&[1.234, 1.231, 5.0]), 1.23);
    }

    #[test]
    fn test_group_stats() {
        let stats = GroupStats::from_values(vec![4.0, 1.0, 3.0, 2.0]);
        assert_eq!(stats.count, 4);
        assert_eq!(stats.mean, 2.5);
        assert!((stats.q1 - 1.75).abs() < 1e-12);
        assert_eq!(stats.q2, 2.5);
        assert_eq!(stats.mode, 1.0);
    }
}
