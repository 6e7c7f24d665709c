use std::str::FromStr;
use std::time::Duration;

/// Aggregation applied to the samples of a time window. This is the complete
/// set of supported functions; anything else is rejected at parse time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WindowFunction {
    Avg,
    Min,
    Max,
    Last,
    First,
    Sum,
    Count,
    /// Absolute difference between the last and the first sample.
    Diff,
    /// Value at the 90th-percentile rank of the sorted samples.
    Percentile90,
}

impl FromStr for WindowFunction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "avg" => Ok(Self::Avg),
            "min" => Ok(Self::Min),
            "max" => Ok(Self::Max),
            "last" => Ok(Self::Last),
            "first" => Ok(Self::First),
            "sum" => Ok(Self::Sum),
            "count" => Ok(Self::Count),
            "diff" => Ok(Self::Diff),
            "percentile90" => Ok(Self::Percentile90),
            _ => Err(format!("unknown window function: {s}")),
        }
    }
}

impl std::fmt::Display for WindowFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Avg => "avg",
            Self::Min => "min",
            Self::Max => "max",
            Self::Last => "last",
            Self::First => "first",
            Self::Sum => "sum",
            Self::Count => "count",
            Self::Diff => "diff",
            Self::Percentile90 => "percentile90",
        };
        write!(f, "{name}")
    }
}

impl WindowFunction {
    /// Reduces a time-ordered sample sequence to one value. An empty
    /// sequence has no value.
    ///
    /// # Examples
    ///
    /// ```
    /// use hmon_alert::window::WindowFunction;
    ///
    /// let samples = [4.0, 1.0, 7.0];
    /// assert_eq!(WindowFunction::Avg.apply(&samples), Some(4.0));
    /// assert_eq!(WindowFunction::Diff.apply(&samples), Some(3.0));
    /// assert_eq!(WindowFunction::Max.apply(&[]), None);
    /// ```
    pub fn apply(&self, samples: &[f64]) -> Option<f64> {
        let first = *samples.first()?;
        let last = *samples.last()?;
        let value = match self {
            Self::Avg => samples.iter().sum::<f64>() / samples.len() as f64,
            Self::Min => samples.iter().copied().fold(f64::INFINITY, f64::min),
            Self::Max => samples.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Self::Last => last,
            Self::First => first,
            Self::Sum => samples.iter().sum(),
            Self::Count => samples.len() as f64,
            Self::Diff => (last - first).abs(),
            Self::Percentile90 => {
                let mut sorted = samples.to_vec();
                sorted.sort_by(f64::total_cmp);
                let rank = (sorted.len() as f64 * 0.9) as usize;
                sorted[rank.min(sorted.len() - 1)]
            }
        };
        Some(value)
    }
}

/// Parses a window literal: `30s`, `5m`, `2h`, `1d`, `1w`, or bare seconds.
///
/// # Examples
///
/// ```
/// use hmon_alert::window::parse_window;
/// use std::time::Duration;
///
/// assert_eq!(parse_window("5m"), Some(Duration::from_secs(300)));
/// assert_eq!(parse_window("90"), Some(Duration::from_secs(90)));
/// assert_eq!(parse_window("0m"), None);
/// assert_eq!(parse_window("5y"), None);
/// ```
pub fn parse_window(literal: &str) -> Option<Duration> {
    let literal = literal.trim();
    let split = literal
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(literal.len());
    let (digits, unit) = literal.split_at(split);
    let amount: u64 = digits.parse().ok()?;
    let multiplier = match unit {
        "" | "s" => 1,
        "m" => 60,
        "h" => 3_600,
        "d" => 86_400,
        "w" => 604_800,
        _ => return None,
    };
    match amount.checked_mul(multiplier)? {
        0 => None,
        secs => Some(Duration::from_secs(secs)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_function_reduces_a_known_series() {
        let samples = [10.0, 30.0, 20.0, 40.0];
        let cases = [
            (WindowFunction::Avg, 25.0),
            (WindowFunction::Min, 10.0),
            (WindowFunction::Max, 40.0),
            (WindowFunction::Last, 40.0),
            (WindowFunction::First, 10.0),
            (WindowFunction::Sum, 100.0),
            (WindowFunction::Count, 4.0),
            (WindowFunction::Diff, 30.0),
            (WindowFunction::Percentile90, 40.0),
        ];
        for (function, expected) in cases {
            assert_eq!(function.apply(&samples), Some(expected), "{function}");
        }
    }

    #[test]
    fn percentile90_uses_floor_rank_of_sorted_samples() {
        let samples: Vec<f64> = (1..=20).rev().map(f64::from).collect();
        // floor(20 * 0.9) = 18 -> 19th smallest value
        assert_eq!(WindowFunction::Percentile90.apply(&samples), Some(19.0));
        assert_eq!(WindowFunction::Percentile90.apply(&[7.0]), Some(7.0));
    }

    #[test]
    fn diff_of_single_sample_is_zero() {
        assert_eq!(WindowFunction::Diff.apply(&[5.0]), Some(0.0));
    }

    #[test]
    fn unknown_function_names_are_rejected() {
        assert!("median".parse::<WindowFunction>().is_err());
        assert!("AVG".parse::<WindowFunction>().is_err());
    }

    #[test]
    fn window_units() {
        assert_eq!(parse_window("30s"), Some(Duration::from_secs(30)));
        assert_eq!(parse_window("2h"), Some(Duration::from_secs(7200)));
        assert_eq!(parse_window("1d"), Some(Duration::from_secs(86400)));
        assert_eq!(parse_window("1w"), Some(Duration::from_secs(604800)));
        assert_eq!(parse_window(""), None);
        assert_eq!(parse_window("m"), None);
    }
}
