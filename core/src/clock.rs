//! Clock domains and their rational rates
//!
//! A clock domain runs at a rational rate `(p, q)` relative to the base
//! rate `(1, 1)`. A FIFO port belonging to a domain with rate `(p, q)`
//! participates in `B * p / q` iterations of a partition's outer loop of
//! block size `B`.
use num::integer::gcd;
use serde::{Deserialize, Serialize};

/// Prefix for the generated block index variables
pub const BLOCK_IND_VAR_PREFIX: &str = "blkInd";

/// The rational rate of a clock domain relative to the base rate
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClockDomain {
    pub numerator: u64,
    pub denominator: u64,
}

impl Default for ClockDomain {
    fn default() -> Self {
        Self::BASE
    }
}

impl ClockDomain {
    pub const BASE: ClockDomain = ClockDomain {
        numerator: 1,
        denominator: 1,
    };

    /// Creates a rate reduced to lowest terms
    pub fn new(numerator: u64, denominator: u64) -> Self {
        assert!(
            numerator > 0 && denominator > 0,
            "clock rates must be positive"
        );
        let g = gcd(numerator, denominator);
        Self {
            numerator: numerator / g,
            denominator: denominator / g,
        }
    }

    pub fn is_base(&self) -> bool {
        *self == Self::BASE
    }

    /// Pure upsample domains (and the base domain) advance their index every
    /// iteration; rational and downsample domains need a phase counter
    pub fn is_integer_rate(&self) -> bool {
        self.denominator == 1
    }

    /// The number of samples this domain sees per `base_block_size` samples
    /// of the base domain.  The caller must have validated divisibility.
    pub fn scale_block_size(&self, base_block_size: usize) -> usize {
        base_block_size * self.numerator as usize / self.denominator as usize
    }

    /// True if `base_block_size` iterations land on a whole number of this
    /// domain's samples
    pub fn divides_block(&self, base_block_size: usize) -> bool {
        (base_block_size * self.numerator as usize) % self.denominator as usize == 0
    }

    /// Name of the generated index variable for this rate.
    /// The base rate uses the bare prefix; other rates append `_N<p>_D<q>`.
    pub fn index_var_name(&self) -> String {
        self.var_name(false)
    }

    /// Name of the generated phase counter variable for this rate
    pub fn counter_var_name(&self) -> String {
        self.var_name(true)
    }

    fn var_name(&self, counter: bool) -> String {
        let mut name = BLOCK_IND_VAR_PREFIX.to_string();
        if !self.is_base() {
            name += &format!("_N{}_D{}", self.numerator, self.denominator);
        }
        if counter {
            name += "_C";
        }
        name
    }

    /// Total bits needed for the index variable of this rate with base block
    /// size `block_size` (one sign bit on top of the magnitude)
    pub fn index_bits(&self, block_size: usize) -> u32 {
        let span = self.scale_block_size(block_size).max(1);
        ceil_log2(span) + 1
    }

    /// Total bits needed for the phase counter of this rate
    pub fn counter_bits(&self, block_size: usize) -> u32 {
        let span = (block_size * self.denominator as usize).max(1);
        ceil_log2(span) + 1
    }
}

fn ceil_log2(v: usize) -> u32 {
    debug_assert!(v > 0);
    usize::BITS - (v - 1).leading_zeros()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization() {
        assert_eq!(ClockDomain::new(2, 4), ClockDomain::new(1, 2));
        assert!(ClockDomain::new(3, 3).is_base());
        assert!(ClockDomain::new(4, 1).is_integer_rate());
        assert!(!ClockDomain::new(2, 3).is_integer_rate());
    }

    #[test]
    fn block_scaling() {
        let half = ClockDomain::new(1, 2);
        assert_eq!(half.scale_block_size(4), 2);
        assert!(half.divides_block(4));
        assert!(!half.divides_block(3));
    }

    #[test]
    fn var_names() {
        assert_eq!(ClockDomain::BASE.index_var_name(), "blkInd");
        let r = ClockDomain::new(1, 2);
        assert_eq!(r.index_var_name(), "blkInd_N1_D2");
        assert_eq!(r.counter_var_name(), "blkInd_N1_D2_C");
    }

    #[test]
    fn bit_widths() {
        // B=4, rate (1,2): index spans [0,2) -> 1 magnitude bit + sign
        assert_eq!(ClockDomain::new(1, 2).index_bits(4), 2);
        // counter spans [0,8) -> 3 magnitude bits + sign
        assert_eq!(ClockDomain::new(1, 2).counter_bits(4), 4);
        assert_eq!(ClockDomain::BASE.index_bits(1), 1);
    }
}
