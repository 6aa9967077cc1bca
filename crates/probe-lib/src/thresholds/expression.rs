//! Threshold expression parsing
//!
//! Grammar: `<aggregation> <op> <number>`, e.g. `p(95)<2000`, `rate < 0.1`,
//! `avg<=250`. `p95` is accepted as shorthand for `p(95)`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Statistic a threshold reads from a series
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Aggregation {
    Avg,
    Min,
    Max,
    Med,
    Percentile(f64),
    Rate,
    Count,
    Value,
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Aggregation::Avg => f.write_str("avg"),
            Aggregation::Min => f.write_str("min"),
            Aggregation::Max => f.write_str("max"),
            Aggregation::Med => f.write_str("med"),
            Aggregation::Percentile(p) => write!(f, "p({})", p),
            Aggregation::Rate => f.write_str("rate"),
            Aggregation::Count => f.write_str("count"),
            Aggregation::Value => f.write_str("value"),
        }
    }
}

impl FromStr for Aggregation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s {
            "avg" => return Ok(Aggregation::Avg),
            "min" => return Ok(Aggregation::Min),
            "max" => return Ok(Aggregation::Max),
            "med" => return Ok(Aggregation::Med),
            "rate" => return Ok(Aggregation::Rate),
            "count" => return Ok(Aggregation::Count),
            "value" => return Ok(Aggregation::Value),
            _ => {}
        }

        let digits = s
            .strip_prefix("p(")
            .and_then(|rest| rest.strip_suffix(')'))
            .or_else(|| s.strip_prefix('p'))
            .ok_or_else(|| format!("unknown aggregation `{}`", s))?;

        let p: f64 = digits
            .trim()
            .parse()
            .map_err(|_| format!("invalid percentile `{}`", s))?;
        if !(0.0..=100.0).contains(&p) {
            return Err(format!("percentile {} outside 0..=100", p));
        }
        Ok(Aggregation::Percentile(p))
    }
}

/// Comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparison {
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
}

impl Comparison {
    pub fn holds(&self, observed: f64, bound: f64) -> bool {
        match self {
            Comparison::Lt => observed < bound,
            Comparison::Le => observed <= bound,
            Comparison::Gt => observed > bound,
            Comparison::Ge => observed >= bound,
            Comparison::Eq => (observed - bound).abs() < f64::EPSILON,
            Comparison::Ne => (observed - bound).abs() >= f64::EPSILON,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Comparison::Lt => "<",
            Comparison::Le => "<=",
            Comparison::Gt => ">",
            Comparison::Ge => ">=",
            Comparison::Eq => "==",
            Comparison::Ne => "!=",
        }
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Parsed `<aggregation> <op> <number>`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdExpr {
    pub aggregation: Aggregation,
    pub op: Comparison,
    pub bound: f64,
}

impl ThresholdExpr {
    pub fn holds(&self, observed: f64) -> bool {
        self.op.holds(observed, self.bound)
    }
}

impl fmt::Display for ThresholdExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.aggregation, self.op, self.bound)
    }
}

impl FromStr for ThresholdExpr {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let at = s
            .find(['<', '>', '=', '!'])
            .ok_or_else(|| "missing comparison operator".to_string())?;
        let (lhs, rest) = s.split_at(at);

        let (op, rhs) = if let Some(rhs) = rest.strip_prefix("<=") {
            (Comparison::Le, rhs)
        } else if let Some(rhs) = rest.strip_prefix(">=") {
            (Comparison::Ge, rhs)
        } else if let Some(rhs) = rest.strip_prefix("==") {
            (Comparison::Eq, rhs)
        } else if let Some(rhs) = rest.strip_prefix("!=") {
            (Comparison::Ne, rhs)
        } else if let Some(rhs) = rest.strip_prefix('<') {
            (Comparison::Lt, rhs)
        } else if let Some(rhs) = rest.strip_prefix('>') {
            (Comparison::Gt, rhs)
        } else {
            return Err(format!("unknown operator in `{}`", rest.trim()));
        };

        let aggregation: Aggregation = lhs.parse()?;
        let bound: f64 = rhs
            .trim()
            .parse()
            .map_err(|_| format!("`{}` is not a number", rhs.trim()))?;
        if !bound.is_finite() {
            return Err(format!("`{}` is not a finite number", rhs.trim()));
        }

        Ok(Self {
            aggregation,
            op,
            bound,
        })
    }
}
