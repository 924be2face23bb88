//! Cardinality encoders
//!
//! "Exactly one of these n things" and "at least k of these n bits" turn up constantly
//! once a grid has more than one tile variant per cell or more than one splitter type
//! per node; these are the two shapes the rest of the compiler needs and nothing more
//! (the source's `cardinality` module is not in the retrieval pack — these are
//! reconstructed from its call sites in `belt_balancer.py`: `quadratic_one` gates
//! splitter-type one-hot fields, `logarithmic_one` gates node placement, and a
//! popcount-then-compare ≥k backs edge-splitter enforcement).

#![forbid(unsafe_code)]

use crate::arithmetic::{bin_length, get_popcount_r};
use crate::bits::{implies, Clause, Literal};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CardinalityError {
    #[error("cardinality constraints need at least one variable (got 0)")]
    Empty,
    #[error("adder_greater_equal: k={k} exceeds the {n} available bits and can never hold")]
    ThresholdUnreachable { k: usize, n: usize },
}

/// At-most-one over `variables`, quadratic in clause count: every pair is mutually
/// exclusive. Cheap to state, cheap for a solver to propagate on small `n`, and the
/// natural choice when `n` is the handful of tile variants a single cell can hold.
pub fn quadratic_amo(variables: &[Literal]) -> Vec<Clause> {
    let mut clauses = Vec::new();
    for i in 0..variables.len() {
        for j in (i + 1)..variables.len() {
            clauses.push(vec![-variables[i], -variables[j]]);
        }
    }
    clauses
}

/// Exactly-one over `variables`: at-most-one plus a single clause asserting at least
/// one is true.
pub fn quadratic_exactly_one(variables: &[Literal]) -> Result<Vec<Clause>, CardinalityError> {
    if variables.is_empty() {
        return Err(CardinalityError::Empty);
    }
    let mut clauses = quadratic_amo(variables);
    clauses.push(variables.to_vec());
    Ok(clauses)
}

/// Exactly-one over `variables`, encoded with `⌈log2(n)⌉` auxiliary "index" bits
/// instead of `O(n²)` pairwise clauses: each candidate's selector literal implies its
/// index number onto the auxiliary bits, and vice versa, so a satisfying assignment
/// picks exactly one candidate by construction of the index encoding. Preferred over
/// [`quadratic_exactly_one`] once `n` is large enough that the pairwise blow-up
/// matters (the node-placement one-hot over every grid cell, for instance).
pub fn logarithmic_exactly_one(
    variables: &[Literal],
    allocator: &mut impl FnMut() -> Literal,
) -> Result<Vec<Clause>, CardinalityError> {
    if variables.is_empty() {
        return Err(CardinalityError::Empty);
    }
    if variables.len() == 1 {
        return Ok(vec![vec![variables[0]]]);
    }

    let index_bits = bin_length(variables.len());
    let index: Vec<Literal> = (0..index_bits).map(|_| allocator()).collect();

    let mut clauses = Vec::new();
    clauses.push(variables.to_vec());
    clauses.extend(quadratic_amo(variables));

    for (i, &var) in variables.iter().enumerate() {
        let bits = crate::bits::get_bits(i as u64, index_bits);
        let index_clause: Vec<Clause> = bits
            .enumerate()
            .map(|(bit_pos, bit)| vec![crate::bits::set_variable(index[bit_pos], bit)])
            .collect();
        clauses.extend(implies(&[var], &index_clause));
    }

    Ok(clauses)
}

/// `popcount(bits) >= k`, via [`get_popcount`](crate::arithmetic::get_popcount) plus a
/// comparison against the fixed threshold `k`. `k == 0` is always true (no clauses);
/// `k` above `bits.len()` can never hold.
pub fn adder_greater_equal_r(
    bits: &[Literal],
    k: usize,
    allocator: &mut impl FnMut() -> Literal,
) -> Result<Vec<Clause>, CardinalityError> {
    if k == 0 {
        return Ok(Vec::new());
    }
    if k > bits.len() {
        return Err(CardinalityError::ThresholdUnreachable { k, n: bits.len() });
    }
    if bits.len() == 1 {
        // k must be 1 here (k <= bits.len() and k > 0).
        return Ok(vec![vec![bits[0]]]);
    }

    let width = bin_length(bits.len() + 1);
    let count: Vec<Literal> = (0..width).map(|_| allocator()).collect();
    let mut clauses = get_popcount_r(bits, &count, allocator)
        .map_err(|_| CardinalityError::ThresholdUnreachable { k, n: bits.len() })?;

    // count >= k, expressed bit-by-bit from the top: the usual "greater-or-equal than
    // a constant" unrolling over a binary counter.
    let k_bits: Vec<bool> = crate::bits::get_bits(k as u64, width).collect();
    let mut prefix_equal: Vec<Literal> = Vec::new();
    for bit_pos in (0..width).rev() {
        if k_bits[bit_pos] {
            // count's bit must be 1 here unless a strictly higher bit already exceeds k.
            clauses.push({
                let mut clause: Clause = prefix_equal.iter().map(|&l| -l).collect();
                clause.push(count[bit_pos]);
                clause
            });
            prefix_equal.push(count[bit_pos]);
        } else {
            // a 1 here alone (with equality above) already clears the threshold; no
            // clause needed, but track equality for subsequent lower bits.
            prefix_equal.push(-count[bit_pos]);
        }
    }

    Ok(clauses)
}

/// Back-compat convenience wrapper: panics instead of returning a `Result`.
pub fn adder_greater_equal(
    bits: &[Literal],
    k: usize,
    allocator: &mut impl FnMut() -> Literal,
) -> Vec<Clause> {
    adder_greater_equal_r(bits, k, allocator).expect("adder_greater_equal: invalid shape")
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter(Literal);
    impl Counter {
        fn alloc_fn(&mut self) -> impl FnMut() -> Literal + '_ {
            move || {
                self.0 += 1;
                self.0
            }
        }
    }

    fn all_assignments(n: usize) -> impl Iterator<Item = Vec<bool>> {
        (0u64..(1 << n)).map(move |mask| (0..n).map(|i| (mask & (1 << i)) != 0).collect())
    }

    fn solutions_restricted(clauses: &[Clause], total_vars: usize, free: &[Literal]) -> Vec<Vec<bool>> {
        let mut seen = std::collections::BTreeSet::new();
        for assignment in all_assignments(total_vars) {
            let sat = clauses.iter().all(|clause| {
                clause.iter().any(|&lit| {
                    let idx = (lit.unsigned_abs() as usize) - 1;
                    if lit > 0 { assignment[idx] } else { !assignment[idx] }
                })
            });
            if sat {
                let restricted: Vec<bool> = free.iter().map(|&v| assignment[(v.unsigned_abs() as usize) - 1]).collect();
                seen.insert(restricted);
            }
        }
        seen.into_iter().collect()
    }

    #[test]
    fn quadratic_exactly_one_allows_exactly_the_one_hot_assignments() {
        let vars = vec![1, 2, 3];
        let clauses = quadratic_exactly_one(&vars).unwrap();
        let sols = solutions_restricted(&clauses, 3, &vars);
        assert_eq!(sols.len(), 3);
        for sol in &sols {
            assert_eq!(sol.iter().filter(|&&b| b).count(), 1);
        }
    }

    #[test]
    fn logarithmic_exactly_one_matches_quadratic_solution_set() {
        for n in 1..=5usize {
            let vars: Vec<Literal> = (1..=n as i32).collect();
            let mut ctr = Counter(n as i32);
            let clauses = logarithmic_exactly_one(&vars, &mut ctr.alloc_fn()).unwrap();
            let sols = solutions_restricted(&clauses, ctr.0 as usize, &vars);
            assert_eq!(sols.len(), n, "n={n}");
            for sol in &sols {
                assert_eq!(sol.iter().filter(|&&b| b).count(), 1);
            }
        }
    }

    fn is_satisfiable(clauses: &[Clause], total_vars: usize) -> bool {
        all_assignments(total_vars).any(|assignment| {
            clauses.iter().all(|clause| {
                clause.iter().any(|&lit| {
                    let idx = (lit.unsigned_abs() as usize) - 1;
                    if lit > 0 { assignment[idx] } else { !assignment[idx] }
                })
            })
        })
    }

    #[test]
    fn adder_greater_equal_counts_correctly() {
        for n in 2..=5usize {
            for k in 0..=n {
                let bits: Vec<Literal> = (1..=n as i32).collect();
                let mut ctr = Counter(n as i32);
                let clauses = adder_greater_equal(&bits, k, &mut ctr.alloc_fn());
                for mask in 0u64..(1 << n) {
                    let mut fixed = clauses.clone();
                    for (i, &b) in bits.iter().enumerate() {
                        fixed.push(vec![crate::bits::set_variable(b, (mask & (1 << i)) != 0)]);
                    }
                    let expected = (mask.count_ones() as usize) >= k;
                    assert_eq!(is_satisfiable(&fixed, ctr.0 as usize), expected, "n={n} k={k} mask={mask}");
                }
            }
        }
    }

    #[test]
    fn adder_greater_equal_k_zero_is_vacuous() {
        let bits: Vec<Literal> = vec![1, 2, 3];
        let mut ctr = Counter(3);
        assert!(adder_greater_equal(&bits, 0, &mut ctr.alloc_fn()).is_empty());
    }

    #[test]
    fn adder_greater_equal_rejects_unreachable_threshold() {
        let bits: Vec<Literal> = vec![1, 2, 3];
        let mut ctr = Counter(3);
        assert_eq!(
            adder_greater_equal_r(&bits, 4, &mut ctr.alloc_fn()),
            Err(CardinalityError::ThresholdUnreachable { k: 4, n: 3 })
        );
    }
}
