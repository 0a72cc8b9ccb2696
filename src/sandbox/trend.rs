//! Least-squares linear trend over equally spaced periods.

/// Name of the projected-value column in forecast tables.
pub const FORECAST_COLUMN: &str = "forecast";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearTrend {
    pub slope: f64,
    pub intercept: f64,
    /// Number of observed periods the fit used.
    pub periods: usize,
}

impl LinearTrend {
    /// Fit `y = intercept + slope * t` with `t = 0, 1, 2, ...`. Needs at least
    /// two observations.
    pub fn fit(values: &[f64]) -> Option<Self> {
        let n = values.len();
        if n < 2 || values.iter().any(|v| !v.is_finite()) {
            return None;
        }
        let n_f = n as f64;
        let mean_t = (n_f - 1.0) / 2.0;
        let mean_y = values.iter().sum::<f64>() / n_f;

        let (mut cov, mut var) = (0.0, 0.0);
        for (t, y) in values.iter().enumerate() {
            let dt = t as f64 - mean_t;
            cov += dt * (y - mean_y);
            var += dt * dt;
        }
        let slope = cov / var;
        Some(Self {
            slope,
            intercept: mean_y - slope * mean_t,
            periods: n,
        })
    }

    /// Values for the `horizon` periods after the last observation.
    pub fn extrapolate(&self, horizon: usize) -> Vec<f64> {
        (0..horizon)
            .map(|h| self.intercept + self.slope * (self.periods + h) as f64)
            .collect()
    }
}

/// Labels for future periods. Integer axes with a constant step (years,
/// month numbers) continue the sequence; anything else, including a sequence
/// that would overflow `i64`, gets "<last> +h".
pub fn future_labels(observed: &[String], horizon: usize) -> FutureLabels {
    let numeric: Option<Vec<i64>> = observed.iter().map(|s| s.trim().parse::<i64>().ok()).collect();
    if let Some(continued) = numeric.and_then(|nums| continue_sequence(&nums, horizon)) {
        return FutureLabels::Integer(continued);
    }
    let last = observed.last().map(String::as_str).unwrap_or("t");
    FutureLabels::Text((1..=horizon).map(|h| format!("{} +{}", last, h)).collect())
}

fn continue_sequence(nums: &[i64], horizon: usize) -> Option<Vec<i64>> {
    let (&last, rest) = nums.split_last()?;
    let step = last.checked_sub(*rest.last()?)?;
    if step == 0 {
        return None;
    }
    for pair in nums.windows(2) {
        if pair[1].checked_sub(pair[0])? != step {
            return None;
        }
    }
    (1..=i64::try_from(horizon).ok()?)
        .map(|h| step.checked_mul(h).and_then(|offset| last.checked_add(offset)))
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub enum FutureLabels {
    Integer(Vec<i64>),
    Text(Vec<String>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_exact_line() {
        let trend = LinearTrend::fit(&[10.0, 12.0, 14.0, 16.0]).unwrap();
        assert!((trend.slope - 2.0).abs() < 1e-9);
        assert!((trend.intercept - 10.0).abs() < 1e-9);
        assert_eq!(trend.extrapolate(2), vec![18.0, 20.0]);
    }

    #[test]
    fn test_fit_needs_two_points() {
        assert!(LinearTrend::fit(&[5.0]).is_none());
        assert!(LinearTrend::fit(&[1.0, f64::NAN]).is_none());
    }

    #[test]
    fn test_future_labels() {
        let years = vec!["2022".to_string(), "2023".to_string(), "2024".to_string()];
        assert_eq!(future_labels(&years, 2), FutureLabels::Integer(vec![2025, 2026]));

        let quarters = vec!["Q3".to_string(), "Q4".to_string()];
        assert_eq!(future_labels(&quarters, 1), FutureLabels::Text(vec!["Q4 +1".to_string()]));
    }

    #[test]
    fn test_future_labels_near_i64_bounds_fall_back_to_text() {
        let top = vec![(i64::MAX - 1).to_string(), i64::MAX.to_string()];
        assert_eq!(
            future_labels(&top, 1),
            FutureLabels::Text(vec![format!("{} +1", i64::MAX)])
        );

        let wide = vec![i64::MIN.to_string(), "0".to_string(), i64::MAX.to_string()];
        assert!(matches!(future_labels(&wide, 2), FutureLabels::Text(_)));

        let descending = vec!["5".to_string(), "3".to_string()];
        assert_eq!(future_labels(&descending, 2), FutureLabels::Integer(vec![1, -1]));
    }
}
