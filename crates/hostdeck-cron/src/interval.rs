//! Interval expressions: `<digits><unit>`.

use std::fmt;
use std::str::FromStr;

use chrono::TimeDelta;
use once_cell::sync::Lazy;
use regex::Regex;

static INTERVAL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([0-9]+)([SMHDW])$").expect("interval pattern compiles"));

/// Rejected interval expression.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidIntervalError {
    #[error("malformed interval {0:?}: expected <digits><S|M|H|D|W>, e.g. \"30M\"")]
    Malformed(String),
    #[error("interval {0:?} is zero; intervals must be at least one minute")]
    Zero(String),
    #[error("interval {0:?} is too large")]
    Overflow(String),
}

/// A positive number of minutes, parsed once from an expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interval {
    expression: String,
    minutes: u64,
    delta: TimeDelta,
}

/// Minutes per unit letter. `S` counts whole minutes as well.
fn unit_minutes(unit: &str) -> Option<u64> {
    match unit {
        "S" | "M" => Some(1),
        "H" => Some(60),
        "D" => Some(1_440),
        "W" => Some(10_080),
        _ => None,
    }
}

impl Interval {
    pub fn parse(expression: &str) -> Result<Self, InvalidIntervalError> {
        let malformed = || InvalidIntervalError::Malformed(expression.to_string());

        let caps = INTERVAL_RE.captures(expression).ok_or_else(malformed)?;
        let unit = unit_minutes(&caps[2]).ok_or_else(malformed)?;
        let count: u64 = caps[1]
            .parse()
            .map_err(|_| InvalidIntervalError::Overflow(expression.to_string()))?;

        let minutes = count
            .checked_mul(unit)
            .ok_or_else(|| InvalidIntervalError::Overflow(expression.to_string()))?;
        if minutes == 0 {
            return Err(InvalidIntervalError::Zero(expression.to_string()));
        }
        let delta = i64::try_from(minutes)
            .ok()
            .and_then(TimeDelta::try_minutes)
            .ok_or_else(|| InvalidIntervalError::Overflow(expression.to_string()))?;

        Ok(Self {
            expression: expression.to_string(),
            minutes,
            delta,
        })
    }

    pub fn minutes(&self) -> u64 {
        self.minutes
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    pub fn as_delta(&self) -> TimeDelta {
        self.delta
    }
}

impl FromStr for Interval {
    type Err = InvalidIntervalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Interval::parse(s)
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expression)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_expressions() {
        let cases = [
            ("30S", 30),
            ("1M", 1),
            ("30M", 30),
            ("1H", 60),
            ("12H", 720),
            ("1D", 1_440),
            ("2W", 20_160),
            ("007M", 7),
        ];
        for (expr, minutes) in cases {
            let interval = Interval::parse(expr).unwrap();
            assert_eq!(interval.minutes(), minutes, "{expr}");
            assert_eq!(interval.expression(), expr);
        }
    }

    #[test]
    fn test_invalid_expressions() {
        for expr in ["", "H", "1", "1h", "1X", " 1H", "1H ", "1 H", "-1H", "1.5H", "1HH", "H1", "\u{0661}H", "１H"] {
            assert_eq!(
                Interval::parse(expr),
                Err(InvalidIntervalError::Malformed(expr.to_string())),
                "{expr:?}"
            );
        }
    }

    #[test]
    fn test_zero_rejected() {
        assert_eq!(
            Interval::parse("0D"),
            Err(InvalidIntervalError::Zero("0D".into()))
        );
    }

    #[test]
    fn test_overflow_rejected() {
        assert!(matches!(
            Interval::parse("99999999999999999999999M"),
            Err(InvalidIntervalError::Overflow(_))
        ));
        assert!(matches!(
            Interval::parse("9999999999999999W"),
            Err(InvalidIntervalError::Overflow(_))
        ));
    }

    #[test]
    fn test_as_delta() {
        let interval: Interval = "1H".parse().unwrap();
        assert_eq!(interval.as_delta(), TimeDelta::minutes(60));
        assert_eq!(interval.to_string(), "1H");
    }
}
