//! Filter window and smoothing strategies
//!
//! The window holds the last `filter_len` validated distances with their
//! raw DQFs. Every cycle re-applies the selected strategy over the whole
//! window, so switching strategies mid-run would be cheap; the quirky
//! details (upper-middle median, first-index minimum) follow the behavior
//! the eval kits have always shipped with.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Smoothing strategy for continuous ranging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterMode {
    /// Arithmetic mean of distance and DQF
    Average,
    /// Median of distance and DQF
    Median,
    /// Minimum distance with its paired DQF
    Minimum,
    /// Maximum distance with its paired DQF
    Maximum,
    /// Variance-weighted blend of mean and minimum
    WeightedMinimum,
}

impl FilterMode {
    /// Two-letter code used by the tooling ('av', 'me', 'mi', 'ma', 'mv')
    pub fn short_code(&self) -> &'static str {
        match self {
            FilterMode::Average => "av",
            FilterMode::Median => "me",
            FilterMode::Minimum => "mi",
            FilterMode::Maximum => "ma",
            FilterMode::WeightedMinimum => "mv",
        }
    }
}

impl FromStr for FilterMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "av" => Ok(FilterMode::Average),
            "me" => Ok(FilterMode::Median),
            "mi" => Ok(FilterMode::Minimum),
            "ma" => Ok(FilterMode::Maximum),
            "mv" => Ok(FilterMode::WeightedMinimum),
            other => Err(format!(
                "unknown filter mode '{other}' (expected av, me, mi, ma or mv)"
            )),
        }
    }
}

impl fmt::Display for FilterMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_code())
    }
}

/// Rolling distance/DQF window with a shared write index
#[derive(Debug, Clone)]
pub(crate) struct FilterWindow {
    dist: Vec<f64>,
    dqf: Vec<f64>,
    idx: usize,
}

impl FilterWindow {
    pub fn new(len: usize) -> Self {
        Self {
            dist: vec![-1.0; len],
            dqf: vec![-1.0; len],
            idx: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.dist.len()
    }

    pub fn index(&self) -> usize {
        self.idx
    }

    /// Floods the whole window with one sample pair.
    pub fn fill(&mut self, dist: f64, dqf: f64) {
        self.dist.fill(dist);
        self.dqf.fill(dqf);
    }

    /// Writes one sample pair at the current index.
    pub fn store(&mut self, dist: f64, dqf: f64) {
        self.dist[self.idx] = dist;
        self.dqf[self.idx] = dqf;
    }

    pub fn advance(&mut self) {
        self.idx = (self.idx + 1) % self.dist.len();
    }

    /// Distance written `back` cycles before the current index.
    pub fn recent_dist(&self, back: usize) -> f64 {
        let len = self.dist.len() as isize;
        let pos = (self.idx as isize - back as isize).rem_euclid(len);
        self.dist[pos as usize]
    }

    /// Applies the strategy over the whole window, yielding the filtered
    /// distance and DQF.
    pub fn apply(&self, mode: FilterMode) -> (f64, f64) {
        match mode {
            FilterMode::Average => (mean_var(&self.dist).0, mean_var(&self.dqf).0),
            FilterMode::Median => (median(&self.dist), median(&self.dqf)),
            FilterMode::Minimum => {
                let (dist, idx) = min_with_index(&self.dist);
                (dist, self.dqf[idx])
            }
            FilterMode::Maximum => {
                let (dist, idx) = max_with_index(&self.dist);
                (dist, self.dqf[idx])
            }
            FilterMode::WeightedMinimum => {
                (weighted_min(&self.dist), weighted_min(&self.dqf))
            }
        }
    }
}

/// Mean and population variance.
pub(crate) fn mean_var(values: &[f64]) -> (f64, f64) {
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    (mean, var)
}

/// Upper-middle element of the sorted values (index `round(n / 2)`).
fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    sorted[(sorted.len() as f64 / 2.0).round() as usize]
}

/// Smallest value together with its first position.
fn min_with_index(values: &[f64]) -> (f64, usize) {
    let mut best = (values[0], 0);
    for (i, &v) in values.iter().enumerate().skip(1) {
        if v < best.0 {
            best = (v, i);
        }
    }
    best
}

/// Largest value together with its first position.
fn max_with_index(values: &[f64]) -> (f64, usize) {
    let mut best = (values[0], 0);
    for (i, &v) in values.iter().enumerate().skip(1) {
        if v > best.0 {
            best = (v, i);
        }
    }
    best
}

/// Blend of mean and minimum, weighted by the window's variance.
///
/// A calm window (low variance) trusts the mean; a noisy one leans towards
/// the minimum, which for radio ranging is the physically likelier value
/// since multipath only ever makes distances read long.
fn weighted_min(values: &[f64]) -> f64 {
    const WEIGHT_THRESHOLD: f64 = 100.0;
    let minimum = min_with_index(values).0;
    let (mean, var) = mean_var(values);
    let b = WEIGHT_THRESHOLD / (WEIGHT_THRESHOLD + var);
    b * mean + (1.0 - b) * minimum
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_var_is_population_variance() {
        let (mean, var) = mean_var(&[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(mean, 2.5);
        assert_eq!(var, 1.25);
    }

    #[test]
    fn test_median_picks_the_upper_middle() {
        assert_eq!(median(&[1.0, 2.0, 3.0, 4.0, 5.0]), 4.0);
        assert_eq!(median(&[9.0, 2.0, 4.0, 7.0, 1.0, 5.0]), 5.0);
        assert_eq!(median(&[2.0, 1.0]), 2.0);
    }

    #[test]
    fn test_min_and_max_report_first_index() {
        assert_eq!(min_with_index(&[3.0, 1.0, 1.0, 2.0]), (1.0, 1));
        assert_eq!(max_with_index(&[3.0, 5.0, 5.0, 2.0]), (5.0, 1));
    }

    #[test]
    fn test_weighted_min_blends_by_variance() {
        // mean 28, population variance 1296, b = 100 / 1396
        let values = [10.0, 10.0, 10.0, 10.0, 100.0];
        let expected = (100.0 / 1396.0) * 28.0 + (1296.0 / 1396.0) * 10.0;
        assert!((weighted_min(&values) - expected).abs() < 1e-9);
    }

    #[test]
    fn test_weighted_min_of_constant_window_is_the_value() {
        assert_eq!(weighted_min(&[42.0; 5]), 42.0);
    }

    #[test]
    fn test_min_max_modes_pair_the_dqf() {
        let mut window = FilterWindow::new(3);
        window.store(300.0, 80.0);
        window.advance();
        window.store(250.0, 60.0);
        window.advance();
        window.store(280.0, 90.0);
        window.advance();

        assert_eq!(window.apply(FilterMode::Minimum), (250.0, 60.0));
        assert_eq!(window.apply(FilterMode::Maximum), (300.0, 80.0));
    }

    #[test]
    fn test_all_strategies_are_invariant_on_a_constant_window() {
        let mut window = FilterWindow::new(5);
        window.fill(123.0, 77.0);
        for mode in [
            FilterMode::Average,
            FilterMode::Median,
            FilterMode::Minimum,
            FilterMode::Maximum,
            FilterMode::WeightedMinimum,
        ] {
            assert_eq!(window.apply(mode), (123.0, 77.0), "mode: {mode}");
        }
    }

    #[test]
    fn test_short_code_round_trip() {
        for mode in [
            FilterMode::Average,
            FilterMode::Median,
            FilterMode::Minimum,
            FilterMode::Maximum,
            FilterMode::WeightedMinimum,
        ] {
            assert_eq!(mode.short_code().parse::<FilterMode>(), Ok(mode));
        }
        assert!("xx".parse::<FilterMode>().is_err());
    }
}
