//! Numeric literals used for initial conditions and constants
use std::fmt;

use serde::{Deserialize, Serialize};

/// A single numeric value from the design description.
///
/// Initial conditions of delays and FIFOs are vectors of these. Complex
/// values keep their components separate so each can be rendered into the
/// real or imaginary array of a FIFO record.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
#[serde(untagged)]
pub enum NumericValue {
    Int(i64),
    Real(f64),
    Complex { re: f64, im: f64 },
}

impl NumericValue {
    pub fn is_complex(&self) -> bool {
        matches!(self, NumericValue::Complex { .. })
    }

    pub fn re(&self) -> f64 {
        match self {
            NumericValue::Int(v) => *v as f64,
            NumericValue::Real(v) => *v,
            NumericValue::Complex { re, .. } => *re,
        }
    }

    pub fn im(&self) -> f64 {
        match self {
            NumericValue::Complex { im, .. } => *im,
            _ => 0.0,
        }
    }

    /// Renders the real component as a C literal
    pub fn c_literal_re(&self, floating: bool) -> String {
        render_component(self.re(), matches!(self, NumericValue::Int(_)), floating)
    }

    /// Renders the imaginary component as a C literal
    pub fn c_literal_im(&self, floating: bool) -> String {
        render_component(self.im(), matches!(self, NumericValue::Int(_)), floating)
    }
}

impl From<i64> for NumericValue {
    fn from(v: i64) -> Self {
        NumericValue::Int(v)
    }
}

impl From<f64> for NumericValue {
    fn from(v: f64) -> Self {
        NumericValue::Real(v)
    }
}

fn render_component(v: f64, from_int: bool, floating: bool) -> String {
    if floating {
        // Always emit a decimal point so the literal stays a double
        if v == v.trunc() && v.is_finite() {
            format!("{v:.1}")
        } else {
            format!("{v}")
        }
    } else if from_int || v == v.trunc() {
        format!("{}", v as i64)
    } else {
        format!("{v}")
    }
}

impl fmt::Display for NumericValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NumericValue::Int(v) => write!(f, "{v}"),
            NumericValue::Real(v) => write!(f, "{v}"),
            NumericValue::Complex { re, im } if *im < 0.0 => write!(f, "{re}{im}i"),
            NumericValue::Complex { re, im } => write!(f, "{re}+{im}i"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literals() {
        assert_eq!(NumericValue::Int(7).c_literal_re(false), "7");
        assert_eq!(NumericValue::Int(7).c_literal_re(true), "7.0");
        assert_eq!(NumericValue::Real(1.5).c_literal_re(true), "1.5");

        let c = NumericValue::Complex { re: 1.0, im: -2.0 };
        assert_eq!(c.c_literal_re(true), "1.0");
        assert_eq!(c.c_literal_im(true), "-2.0");
        assert_eq!(c.to_string(), "1-2i");
    }
}
