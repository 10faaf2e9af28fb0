//! Planning of per-rate index and counter variables
//!
//! A partition whose FIFOs sit in different clock domains advances one
//! index per distinct rate inside its outer compute loop. Integer rates
//! step their index every iteration; rational and downsample rates carry a
//! phase counter and step their index once per `q` iterations.
use std::collections::BTreeSet;

use laminar_core::clock::ClockDomain;

use crate::emit::cwriter::CWriter;

/// The planned variables for one non-base rate
#[derive(Debug, Clone, PartialEq)]
pub struct RatePlan {
    pub rate: ClockDomain,
    pub index_var: String,
    pub index_type: String,
    /// Present only for rates with a non-unit denominator
    pub counter_var: Option<String>,
    pub counter_type: String,
}

/// Plans index variables for every non-base rate used by a partition
pub fn plan_rates(rates: &BTreeSet<ClockDomain>, block_size: usize) -> Vec<RatePlan> {
    rates
        .iter()
        .filter(|r| !r.is_base())
        .map(|rate| RatePlan {
            rate: *rate,
            index_var: rate.index_var_name(),
            index_type: int_type_for_bits(rate.index_bits(block_size)),
            counter_var: (!rate.is_integer_rate()).then(|| rate.counter_var_name()),
            counter_type: int_type_for_bits(rate.counter_bits(block_size)),
        })
        .collect()
}

/// The narrowest standard C integer type holding `bits` bits
pub fn int_type_for_bits(bits: u32) -> String {
    let width = match bits {
        0..=8 => 8,
        9..=16 => 16,
        17..=32 => 32,
        _ => 64,
    };
    format!("int{width}_t")
}

/// Declares the planned variables, all starting at zero
pub fn emit_declarations(w: &mut CWriter, plans: &[RatePlan]) {
    for plan in plans {
        w.line(format!("{} {} = 0;", plan.index_type, plan.index_var));
        if let Some(counter) = &plan.counter_var {
            w.line(format!("{} {counter} = 0;", plan.counter_type));
        }
    }
}

/// Advances every planned rate at the foot of the compute loop
pub fn emit_advancement(w: &mut CWriter, plans: &[RatePlan]) {
    for plan in plans {
        match &plan.counter_var {
            None => {
                w.line(format!("{} += {};", plan.index_var, plan.rate.numerator));
            }
            Some(counter) => {
                w.open(format!(
                    "if ({counter} < {})",
                    plan.rate.denominator - 1
                ));
                w.line(format!("{counter}++;"));
                w.open_else();
                w.line(format!("{counter} = 0;"));
                w.line(format!("{} += {};", plan.index_var, plan.rate.numerator));
                w.close();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rates(list: &[(u64, u64)]) -> BTreeSet<ClockDomain> {
        list.iter().map(|(p, q)| ClockDomain::new(*p, *q)).collect()
    }

    /// Interprets the advancement semantics for `iterations` loop passes
    fn simulate(rate: ClockDomain, iterations: usize) -> (u64, u64) {
        let mut index = 0u64;
        let mut counter = 0u64;
        for _ in 0..iterations {
            if rate.is_integer_rate() {
                index += rate.numerator;
            } else if counter < rate.denominator - 1 {
                counter += 1;
            } else {
                counter = 0;
                index += rate.numerator;
            }
        }
        (index, counter)
    }

    #[test]
    fn base_rate_is_not_planned() {
        let plans = plan_rates(&rates(&[(1, 1), (1, 2)]), 4);
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].index_var, "blkInd_N1_D2");
        assert_eq!(plans[0].counter_var.as_deref(), Some("blkInd_N1_D2_C"));
    }

    #[test]
    fn integer_rates_have_no_counter() {
        let plans = plan_rates(&rates(&[(3, 1)]), 4);
        assert_eq!(plans[0].counter_var, None);
    }

    #[test]
    fn downsample_index_after_full_block() {
        // Base block 4 at rate (1,2): index 2, counter 0
        let (index, counter) = simulate(ClockDomain::new(1, 2), 4);
        assert_eq!(index, 2);
        assert_eq!(counter, 0);
    }

    #[test]
    fn rational_rate_bookkeeping() {
        // Rate (2,3) over 7 iterations: the index is the largest multiple
        // of p not exceeding B*p/q; the counter holds the leftover phase
        let (index, counter) = simulate(ClockDomain::new(2, 3), 7);
        assert_eq!(index, 4);
        assert_eq!(counter, 1);

        let (index, _) = simulate(ClockDomain::new(3, 1), 5);
        assert_eq!(index, 15);
    }

    #[test]
    fn emitted_advancement_shape() {
        let plans = plan_rates(&rates(&[(1, 2)]), 4);
        let mut w = CWriter::new();
        emit_advancement(&mut w, &plans);
        let text = w.finish();
        assert!(text.contains("if (blkInd_N1_D2_C < 1)"));
        assert!(text.contains("blkInd_N1_D2 += 1;"));
    }

    #[test]
    fn declared_widths() {
        let plans = plan_rates(&rates(&[(1, 2)]), 4);
        // Index spans [0,2): 2 bits fit in int8_t; counter spans [0,8)
        assert_eq!(plans[0].index_type, "int8_t");
        assert_eq!(plans[0].counter_type, "int8_t");
    }
}
