//! Data types carried on the arcs of a design graph
//!
//! A [DataType] describes one sample: base numeric type, complex flag and
//! shape. The shape is a non-empty dimension vector; a scalar is any shape
//! whose dimensions are all 1. Block expansion prepends an outer dimension
//! used for multi-sample FIFO transactions.
use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, bail};
use serde::{Deserialize, Serialize};

fn default_shape() -> Vec<usize> {
    vec![1]
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct DataType {
    /// True if the type is floating point, false if integer or fixed point
    #[serde(default)]
    pub floating: bool,
    /// True if the type is signed
    #[serde(default)]
    pub signed: bool,
    /// True if both real and imaginary components are stored
    #[serde(default)]
    pub complex: bool,
    /// Total number of bits in the base type
    pub total_bits: u32,
    /// Number of fractional bits for integer / fixed point types
    #[serde(default)]
    pub fractional_bits: u32,
    /// Dimension vector.  Must be non-empty; `[1]` is a scalar
    #[serde(default = "default_shape")]
    pub shape: Vec<usize>,
}

impl DataType {
    pub fn new(floating: bool, signed: bool, complex: bool, total_bits: u32) -> Self {
        Self {
            floating,
            signed,
            complex,
            total_bits,
            fractional_bits: 0,
            shape: default_shape(),
        }
    }

    pub fn with_shape(mut self, shape: Vec<usize>) -> Self {
        assert!(!shape.is_empty(), "shape must be non-empty");
        self.shape = shape;
        self
    }

    /// A scalar has every dimension equal to 1
    pub fn is_scalar(&self) -> bool {
        self.shape.iter().all(|d| *d == 1)
    }

    pub fn is_bool(&self) -> bool {
        !self.floating && self.total_bits == 1
    }

    /// Number of scalar elements in one sample (product of the dimensions).
    /// The complex flag does not contribute; real and imaginary parts are
    /// stored in separate arrays.
    pub fn elements(&self) -> usize {
        self.shape.iter().product()
    }

    /// The equivalent type used for storage on a CPU.
    ///
    /// Single-bit booleans are promoted to 8-bit storage; everything else is
    /// widened to the next standard width.
    pub fn cpu_storage_type(&self) -> DataType {
        let mut cpu = self.clone();
        if !cpu.floating {
            cpu.total_bits = match cpu.total_bits {
                0..=8 => 8,
                9..=16 => 16,
                17..=32 => 32,
                _ => 64,
            };
        }
        cpu
    }

    /// Bytes occupied by one scalar element in CPU storage.
    /// Complex types double the on-wire byte count.
    pub fn element_bytes(&self) -> usize {
        let base = (self.cpu_storage_type().total_bits as usize) / 8;
        if self.complex {
            base * 2
        } else {
            base
        }
    }

    /// Bytes occupied by one full sample (all elements)
    pub fn sample_bytes(&self) -> usize {
        self.element_bytes() * self.elements()
    }

    /// Expands the type for a block of `block_size` samples by prepending an
    /// outer dimension.  A scalar becomes a vector of length `block_size`.
    /// Expansion by 1 is the identity.
    pub fn expand_for_block(&self, block_size: usize) -> DataType {
        let mut expanded = self.clone();
        if block_size == 1 {
            return expanded;
        }
        if self.is_scalar() {
            expanded.shape = vec![block_size];
        } else {
            expanded.shape.insert(0, block_size);
        }
        expanded
    }

    /// Multiplies the outermost dimension by `factor`.  Used for sub-block
    /// semantics where the port type already carries the outer dimension.
    pub fn expand_outer(&self, factor: usize) -> DataType {
        let mut expanded = self.clone();
        expanded.shape[0] *= factor;
        expanded
    }

    /// The C type used to store one element of this type
    pub fn c_type(&self) -> String {
        if self.floating {
            match self.total_bits {
                32 => "float".to_string(),
                64 => "double".to_string(),
                bits => panic!("no C floating point type with {bits} bits"),
            }
        } else {
            let cpu = self.cpu_storage_type();
            if self.signed {
                format!("int{}_t", cpu.total_bits)
            } else {
                format!("uint{}_t", cpu.total_bits)
            }
        }
    }

    /// Renders the C array suffix for this shape, e.g. `[4][2]`.
    /// Scalars render as the empty string.
    pub fn c_dims(&self) -> String {
        if self.is_scalar() {
            String::new()
        } else {
            self.shape.iter().map(|d| format!("[{d}]")).collect()
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let base = if self.floating {
            match self.total_bits {
                32 => "single".to_string(),
                _ => "double".to_string(),
            }
        } else if self.is_bool() {
            "boolean".to_string()
        } else if self.fractional_bits == 0 {
            format!(
                "{}int{}",
                if self.signed { "" } else { "u" },
                self.total_bits
            )
        } else {
            format!(
                "{}fix{}_{}",
                if self.signed { "s" } else { "u" },
                self.total_bits,
                self.fractional_bits
            )
        };

        write!(f, "{base}{}", if self.complex { "c" } else { "" })
    }
}

impl FromStr for DataType {
    type Err = anyhow::Error;

    /// Parses the Simulink style type descriptions used in exported graphs,
    /// e.g. `double`, `single`, `int16`, `uint8`, `boolean`, `sfix18_12`.
    /// A trailing `c` marks the type complex.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();

        // A trailing `c` is only a complex marker if what remains still
        // parses as a type
        match parse_base(trimmed) {
            Ok(dt) => Ok(dt),
            Err(e) => match trimmed.strip_suffix('c') {
                Some(base) => {
                    let mut dt = parse_base(base).map_err(|_| e)?;
                    dt.complex = true;
                    Ok(dt)
                }
                None => Err(e),
            },
        }
    }
}

fn parse_base(base: &str) -> anyhow::Result<DataType> {
    let dt = match base {
        "double" => DataType::new(true, true, false, 64),
        "single" | "float" => DataType::new(true, true, false, 32),
        "boolean" | "bool" | "logical" => DataType::new(false, false, false, 1),
        _ => {
            if let Some(bits) = base.strip_prefix("uint") {
                DataType::new(false, false, false, bits.parse()?)
            } else if let Some(bits) = base.strip_prefix("int") {
                DataType::new(false, true, false, bits.parse()?)
            } else if let Some(fixed) = base.strip_prefix("sfix") {
                parse_fixed(fixed, true)?
            } else if let Some(fixed) = base.strip_prefix("ufix") {
                parse_fixed(fixed, false)?
            } else {
                bail!("unknown data type: {base}");
            }
        }
    };

    Ok(dt)
}

fn parse_fixed(desc: &str, signed: bool) -> anyhow::Result<DataType> {
    let (total, frac) = match desc.split_once('_') {
        Some((total, frac)) => (total.parse()?, frac.parse()?),
        None => (desc.parse()?, 0),
    };
    if frac > total {
        return Err(anyhow!(
            "fixed point type has more fractional bits ({frac}) than total bits ({total})"
        ));
    }
    let mut dt = DataType::new(false, signed, false, total);
    dt.fractional_bits = frac;
    Ok(dt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_standard_types() {
        let dt: DataType = "int32".parse().unwrap();
        assert_eq!(dt, DataType::new(false, true, false, 32));
        assert_eq!(dt.c_type(), "int32_t");

        let dt: DataType = "double".parse().unwrap();
        assert!(dt.floating);
        assert_eq!(dt.c_type(), "double");

        let dt: DataType = "boolean".parse().unwrap();
        assert!(dt.is_bool());
        assert_eq!(dt.cpu_storage_type().total_bits, 8);
        assert_eq!(dt.c_type(), "uint8_t");
    }

    #[test]
    fn parse_fixed_point() {
        let dt: DataType = "sfix18_12".parse().unwrap();
        assert_eq!(dt.total_bits, 18);
        assert_eq!(dt.fractional_bits, 12);
        assert!(dt.signed);
        // 18 bits widen to 32-bit storage
        assert_eq!(dt.c_type(), "int32_t");
    }

    #[test]
    fn parse_complex_suffix() {
        let dt: DataType = "singlec".parse().unwrap();
        assert!(dt.complex);
        assert_eq!(dt.total_bits, 32);
        // complex doubles the on-wire size
        assert_eq!(dt.element_bytes(), 8);
    }

    #[test]
    fn block_expansion() {
        let scalar = DataType::new(false, true, false, 32);
        assert!(scalar.is_scalar());
        assert_eq!(scalar.expand_for_block(4).shape, vec![4]);
        assert_eq!(scalar.expand_for_block(1).shape, vec![1]);

        let vector = scalar.clone().with_shape(vec![8]);
        assert_eq!(vector.expand_for_block(4).shape, vec![4, 8]);
        assert_eq!(vector.expand_outer(4).shape, vec![32]);
    }

    #[test]
    fn display_round_trip() {
        for name in ["double", "single", "int16", "uint8", "sfix18_12", "int32c"] {
            let dt: DataType = name.parse().unwrap();
            assert_eq!(dt.to_string(), name);
        }
    }
}
