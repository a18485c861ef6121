//! Threshold comparison for test statistics

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Comparison applied between a statistic and its threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparison {
    #[serde(rename = ">", alias = "gt")]
    Gt,
    #[serde(rename = ">=", alias = "ge")]
    Ge,
    #[serde(rename = "<", alias = "lt")]
    Lt,
    #[serde(rename = "<=", alias = "le")]
    Le,
    #[serde(rename = "==", alias = "eq")]
    Eq,
}

impl Comparison {
    /// Whether `value <op> threshold` holds. Non-finite values never match.
    pub fn holds(self, value: f64, threshold: f64) -> bool {
        if !value.is_finite() {
            return false;
        }
        match self {
            Comparison::Gt => value > threshold,
            Comparison::Ge => value >= threshold,
            Comparison::Lt => value < threshold,
            Comparison::Le => value <= threshold,
            Comparison::Eq => value == threshold,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Comparison::Gt => ">",
            Comparison::Ge => ">=",
            Comparison::Lt => "<",
            Comparison::Le => "<=",
            Comparison::Eq => "==",
        }
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for Comparison {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            ">" | "gt" => Ok(Comparison::Gt),
            ">=" | "ge" => Ok(Comparison::Ge),
            "<" | "lt" => Ok(Comparison::Lt),
            "<=" | "le" => Ok(Comparison::Le),
            "==" | "eq" => Ok(Comparison::Eq),
            other => Err(anyhow::anyhow!("unknown comparison operator: {other}")),
        }
    }
}

/// A configured threshold and the direction it is tested in
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Threshold {
    pub value: f64,
    pub comparison: Comparison,
}

impl Threshold {
    pub fn new(value: f64, comparison: Comparison) -> Self {
        Self { value, comparison }
    }

    /// Whether `statistic` exceeds (or matches) the threshold
    pub fn check(&self, statistic: f64) -> bool {
        self.comparison.holds(statistic, self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boundary_values_distinguish_all_operators() {
        let at = 1.0;
        assert!(!Comparison::Gt.holds(at, 1.0));
        assert!(Comparison::Ge.holds(at, 1.0));
        assert!(!Comparison::Lt.holds(at, 1.0));
        assert!(Comparison::Le.holds(at, 1.0));
        assert!(Comparison::Eq.holds(at, 1.0));
    }

    #[test]
    fn test_less_than_is_strict() {
        // `<` must not behave like `<=` at the boundary
        assert_ne!(
            Comparison::Lt.holds(0.5, 0.5),
            Comparison::Le.holds(0.5, 0.5)
        );
        assert!(Comparison::Lt.holds(0.49, 0.5));
    }

    #[test]
    fn test_off_boundary_values() {
        assert!(Comparison::Gt.holds(2.0, 1.0));
        assert!(!Comparison::Lt.holds(2.0, 1.0));
        assert!(!Comparison::Eq.holds(2.0, 1.0));
        assert!(Comparison::Le.holds(0.0, 1.0));
    }

    #[test]
    fn test_non_finite_never_matches() {
        for op in [
            Comparison::Gt,
            Comparison::Ge,
            Comparison::Lt,
            Comparison::Le,
            Comparison::Eq,
        ] {
            assert!(!op.holds(f64::NAN, 1.0));
            assert!(!op.holds(f64::INFINITY, 1.0));
        }
    }

    #[test]
    fn test_parse_operators() {
        assert_eq!("<".parse::<Comparison>().unwrap(), Comparison::Lt);
        assert_eq!("<=".parse::<Comparison>().unwrap(), Comparison::Le);
        assert_eq!("ge".parse::<Comparison>().unwrap(), Comparison::Ge);
        assert!("=<".parse::<Comparison>().is_err());

        let op: Comparison = serde_json::from_str("\"<\"").unwrap();
        assert_eq!(op, Comparison::Lt);
        assert_eq!(serde_json::to_string(&Comparison::Le).unwrap(), "\"<=\"");
    }

    #[test]
    fn test_threshold_check() {
        let threshold = Threshold::new(0.5, Comparison::Gt);
        assert!(threshold.check(0.658));
        assert!(!threshold.check(0.5));
    }
}
