//! Arithmetic encoders
//!
//! Ripple-carry addition, increment, two's-complement inversion, and popcount,
//! all expressed directly as CNF over freshly-allocated carry/output literals. These
//! are the building blocks the cardinality encoders (`cardinality`) and the colour
//! propagation rules (`layout`) are built from: a belt's colour is "the upstream
//! colour, incremented by one", and a ≥k cardinality constraint is "popcount, then
//! compare".
//!
//! Every function here takes an `allocator: &mut impl FnMut() -> Literal` for any
//! literal it needs beyond its inputs and outputs, mirroring the source's
//! `AllocatorType = Callable[[], int]` convention.

#![forbid(unsafe_code)]

use crate::bits::{implies, variables_different, variables_same, Clause, Literal};

/// Errors raised when an arithmetic encoder's shape preconditions are violated.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ArithError {
    #[error("add_numbers: input_a and input_b must have equal length (got {a} and {b})")]
    UnequalAddends { a: usize, b: usize },
    #[error("add_numbers: output length {out} must equal input length {input} or input length + 1")]
    BadOutputWidth { input: usize, out: usize },
    #[error("sum_numbers requires at least two numbers (got {0})")]
    TooFewNumbers(usize),
    #[error("sum_numbers: every number and the output must share one width (got widths {widths:?})")]
    MismatchedWidths { widths: Vec<usize> },
    #[error("increment_number: input and output must have equal, nonzero length (got {a} and {b})")]
    BadIncrementWidth { a: usize, b: usize },
    #[error("invert_number: input and output must have equal length (got {a} and {b})")]
    BadInvertWidth { a: usize, b: usize },
    #[error("get_popcount requires at least two input bits (got {0})")]
    TooFewBits(usize),
    #[error("get_popcount: output width must be ceil(log2(n+1)) = {expected} for n={n} bits (got {got})")]
    BadPopcountWidth { n: usize, expected: usize, got: usize },
}

/// `⌈log2(value)⌉`, the number of bits needed to distinguish `0..value`.
pub fn bin_length(value: usize) -> usize {
    if value <= 1 {
        return 0;
    }
    let mut bits = 0usize;
    let mut x = value - 1;
    while x > 0 {
        bits += 1;
        x >>= 1;
    }
    bits
}

/// Full ripple-carry adder: `out = a + b (+ carry_in)`.
///
/// `out` must be exactly `a.len()` (`allow_overflow` governs whether a dropped top
/// carry is forbidden or tolerated) or `a.len() + 1` (the top carry becomes the extra
/// output bit, and `allow_overflow` is ignored in that case).
pub fn add_numbers_r(
    input_a: &[Literal],
    input_b: &[Literal],
    output: &[Literal],
    allocator: &mut impl FnMut() -> Literal,
    carry_in: Option<Literal>,
    allow_overflow: bool,
) -> Result<Vec<Clause>, ArithError> {
    if input_a.len() != input_b.len() {
        return Err(ArithError::UnequalAddends { a: input_a.len(), b: input_b.len() });
    }
    if output.len() != input_a.len() && output.len() != input_a.len() + 1 {
        return Err(ArithError::BadOutputWidth { input: input_a.len(), out: output.len() });
    }

    let mut clauses = Vec::new();
    let mut carry_in = carry_in;

    for ((&in_a, &in_b), &out) in input_a.iter().zip(input_b.iter()).zip(output.iter()) {
        let carry_out = allocator();
        match carry_in {
            None => {
                clauses.extend([
                    vec![-in_a, -in_b, carry_out],
                    vec![in_a, -carry_out],
                    vec![in_b, -carry_out],
                    vec![in_a, in_b, -out],
                    vec![-in_a, in_b, out],
                    vec![in_a, -in_b, out],
                    vec![-in_a, -in_b, -out],
                ]);
            },
            Some(c_in) => {
                // carry_out <-> majority(in_a, in_b, c_in)
                clauses.extend([
                    vec![-in_a, -in_b, carry_out],
                    vec![-in_a, -c_in, carry_out],
                    vec![-in_b, -c_in, carry_out],
                    vec![in_a, in_b, -carry_out],
                    vec![in_a, c_in, -carry_out],
                    vec![in_b, c_in, -carry_out],
                ]);
                // out <-> in_a xor in_b xor c_in
                clauses.extend([
                    vec![in_a, in_b, c_in, -out],
                    vec![in_a, in_b, -c_in, out],
                    vec![in_a, -in_b, c_in, out],
                    vec![in_a, -in_b, -c_in, -out],
                    vec![-in_a, in_b, c_in, out],
                    vec![-in_a, in_b, -c_in, -out],
                    vec![-in_a, -in_b, c_in, -out],
                    vec![-in_a, -in_b, -c_in, out],
                ]);
            },
        }
        carry_in = Some(carry_out);
    }
    let carry_in = carry_in.expect("at least one bit of width");

    if output.len() > input_a.len() {
        clauses.extend(variables_same(carry_in, output[output.len() - 1]));
    } else if !allow_overflow {
        clauses.push(vec![-carry_in]);
    }

    Ok(clauses)
}

/// Back-compat convenience wrapper: panics instead of returning a `Result`.
pub fn add_numbers(
    input_a: &[Literal],
    input_b: &[Literal],
    output: &[Literal],
    allocator: &mut impl FnMut() -> Literal,
    carry_in: Option<Literal>,
    allow_overflow: bool,
) -> Vec<Clause> {
    add_numbers_r(input_a, input_b, output, allocator, carry_in, allow_overflow)
        .expect("add_numbers: invalid shape")
}

/// Chain [`add_numbers`] left to right over `numbers`, allocating intermediate
/// width-equal numbers for everything but the final sum (which lands in `output`).
pub fn sum_numbers_r(
    numbers: &[Vec<Literal>],
    output: &[Literal],
    allocator: &mut impl FnMut() -> Literal,
    allow_overflow: bool,
) -> Result<Vec<Clause>, ArithError> {
    if numbers.len() < 2 {
        return Err(ArithError::TooFewNumbers(numbers.len()));
    }
    let size = numbers[0].len();
    if numbers.iter().any(|n| n.len() != size) || output.len() != size {
        let mut widths: Vec<usize> = numbers.iter().map(|n| n.len()).collect();
        widths.push(output.len());
        return Err(ArithError::MismatchedWidths { widths });
    }

    let mut clauses = Vec::new();
    let mut number_in = numbers[0].clone();
    for (i, number) in numbers[1..].iter().enumerate() {
        let number_out = if i == numbers.len() - 2 {
            output.to_vec()
        } else {
            (0..size).map(|_| allocator()).collect()
        };
        clauses.extend(add_numbers_r(&number_in, number, &number_out, allocator, None, allow_overflow)?);
        number_in = number_out;
    }
    Ok(clauses)
}

/// Back-compat convenience wrapper: panics instead of returning a `Result`.
pub fn sum_numbers(
    numbers: &[Vec<Literal>],
    output: &[Literal],
    allocator: &mut impl FnMut() -> Literal,
    allow_overflow: bool,
) -> Vec<Clause> {
    sum_numbers_r(numbers, output, allocator, allow_overflow).expect("sum_numbers: invalid shape")
}

/// `output = input + 1`, wrapping on overflow, without allocating any auxiliary
/// literals: bit `i` differs from the input under the precondition that every lower
/// bit of the input is 1 (there is a carry into position `i`), and agrees otherwise.
pub fn increment_number_r(
    input: &[Literal],
    output: &[Literal],
) -> Result<Vec<Clause>, ArithError> {
    if input.len() != output.len() || input.is_empty() {
        return Err(ArithError::BadIncrementWidth { a: input.len(), b: output.len() });
    }
    let mut clauses = Vec::new();
    for i in 0..input.len() {
        clauses.extend(implies(&input[..i], &variables_different(input[i], output[i])));
        for &var in &input[..i] {
            clauses.extend(implies(&[-var], &variables_same(input[i], output[i])));
        }
    }
    Ok(clauses)
}

/// Back-compat convenience wrapper: panics instead of returning a `Result`.
pub fn increment_number(input: &[Literal], output: &[Literal]) -> Vec<Clause> {
    increment_number_r(input, output).expect("increment_number: invalid shape")
}

/// Two's-complement negation: `output = -input mod 2^n`. Zero negates to itself and
/// needs no special case, but the bit pattern with only the top bit set (the most
/// negative representable value) has no representable negation, so it is forbidden
/// by the extra clause `input[0] ∨ input[1] ∨ … ∨ ¬input[n-1]` — violated exactly
/// when every bit below the top is 0 and the top bit is 1.
pub fn invert_number_r(
    input: &[Literal],
    output: &[Literal],
    allocator: &mut impl FnMut() -> Literal,
) -> Result<Vec<Clause>, ArithError> {
    if input.len() != output.len() {
        return Err(ArithError::BadInvertWidth { a: input.len(), b: output.len() });
    }
    // Bit 0 passes through unchanged (out[0] = in[0]) and carries AND(in[0], out[0])
    // = in[0] into bit 1; every later bit is in[i] xor carry_in, carrying
    // OR(in[i], carry_in) onward. The asymmetry against a plain adder is what makes
    // this a negation rather than an increment: bits below the lowest set bit of the
    // input stay zero, the lowest set bit itself is unchanged, and every bit above it
    // is inverted — which falls out of this recurrence without a separate case split.
    let mut clauses = Vec::new();
    let mut carry_in: Option<Literal> = None;

    for i in 0..input.len() {
        let var_a = input[i];
        let var_b = output[i];
        let carry_out = if i == input.len() - 1 { None } else { Some(allocator()) };

        match carry_in {
            None => {
                clauses.extend(variables_same(var_a, var_b));
                if let Some(c_out) = carry_out {
                    clauses.extend([
                        vec![-var_a, -var_b, c_out],
                        vec![var_a, -c_out],
                        vec![var_b, -c_out],
                    ]);
                }
            },
            Some(c_in) => {
                // var_b <-> var_a xor c_in
                clauses.extend([
                    vec![-var_a, -var_b, -c_in],
                    vec![-var_a, var_b, c_in],
                    vec![var_a, -var_b, c_in],
                    vec![var_a, var_b, -c_in],
                ]);
                if let Some(c_out) = carry_out {
                    // c_out <-> majority(var_a, var_b, c_in)
                    clauses.extend([
                        vec![-var_a, -var_b, c_out],
                        vec![-var_a, -c_in, c_out],
                        vec![-var_b, -c_in, c_out],
                        vec![var_a, var_b, -c_out],
                        vec![var_a, c_in, -c_out],
                        vec![var_b, c_in, -c_out],
                    ]);
                }
            },
        }
        carry_in = carry_out;
    }

    let mut forbid_zero: Clause = input[..input.len() - 1].to_vec();
    forbid_zero.push(-input[input.len() - 1]);
    clauses.push(forbid_zero);

    Ok(clauses)
}

/// Back-compat convenience wrapper: panics instead of returning a `Result`.
pub fn invert_number(
    input: &[Literal],
    output: &[Literal],
    allocator: &mut impl FnMut() -> Literal,
) -> Vec<Clause> {
    invert_number_r(input, output, allocator).expect("invert_number: invalid shape")
}

/// Popcount of `bits` into a fresh number of width `bin_length(bits.len() + 1)`, via
/// divide-and-conquer: split in half, recurse on each half, add the two partial
/// counts together (carrying in a leftover bit when `bits.len()` is odd).
pub fn get_popcount_r(
    bits: &[Literal],
    output: &[Literal],
    allocator: &mut impl FnMut() -> Literal,
) -> Result<Vec<Clause>, ArithError> {
    if bits.len() < 2 {
        return Err(ArithError::TooFewBits(bits.len()));
    }
    let expected = bin_length(bits.len() + 1);
    if output.len() != expected {
        return Err(ArithError::BadPopcountWidth { n: bits.len(), expected, got: output.len() });
    }

    let mut clauses = Vec::new();
    if bits.len() <= 3 {
        let carry_in = if bits.len() == 3 { Some(bits[2]) } else { None };
        clauses.extend(add_numbers_r(&[bits[0]], &[bits[1]], output, allocator, carry_in, false)?);
    } else {
        let carry_in = if bits.len() % 2 != 0 { Some(*bits.last().unwrap()) } else { None };
        let sub_size = bits.len() / 2;

        let output_a: Vec<Literal> = (0..(output.len() - 1)).map(|_| allocator()).collect();
        let output_b: Vec<Literal> = (0..(output.len() - 1)).map(|_| allocator()).collect();

        clauses.extend(get_popcount_r(&bits[..sub_size], &output_a, allocator)?);
        clauses.extend(get_popcount_r(&bits[sub_size..(2 * sub_size)], &output_b, allocator)?);
        clauses.extend(add_numbers_r(&output_a, &output_b, output, allocator, carry_in, false)?);
    }
    Ok(clauses)
}

/// Back-compat convenience wrapper: panics instead of returning a `Result`.
pub fn get_popcount(
    bits: &[Literal],
    output: &[Literal],
    allocator: &mut impl FnMut() -> Literal,
) -> Vec<Clause> {
    get_popcount_r(bits, output, allocator).expect("get_popcount: invalid shape")
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter(Literal);
    impl Counter {
        fn alloc(&mut self) -> Literal {
            self.0 += 1;
            self.0
        }
    }

    fn all_assignments(n: usize) -> impl Iterator<Item = Vec<bool>> {
        (0u64..(1 << n)).map(move |mask| (0..n).map(|i| (mask & (1 << i)) != 0).collect())
    }

    fn value_at(assignment: &[bool], vars: &[Literal]) -> u64 {
        let mut v = 0u64;
        for (i, &var) in vars.iter().enumerate() {
            let idx = (var.unsigned_abs() as usize) - 1;
            if assignment[idx] {
                v |= 1 << i;
            }
        }
        v
    }

    fn solve_for_outputs(clauses: &[Clause], total_vars: usize, free_vars: &[Literal]) -> Vec<Vec<bool>> {
        // Brute-force all assignments to `total_vars` boolean variables, keep the
        // ones satisfying `clauses`, and return their values restricted to `free_vars`.
        let mut results = Vec::new();
        for assignment in all_assignments(total_vars) {
            let sat = clauses.iter().all(|clause| {
                clause.iter().any(|&lit| {
                    let idx = (lit.unsigned_abs() as usize) - 1;
                    if lit > 0 { assignment[idx] } else { !assignment[idx] }
                })
            });
            if sat {
                results.push(free_vars.iter().map(|&v| assignment[(v.unsigned_abs() as usize) - 1]).collect());
            }
        }
        results
    }

    #[test]
    fn add_numbers_realises_addition_mod_width_with_overflow_allowed() {
        // 2-bit a + 2-bit b -> 2-bit out, allow_overflow: out = (a+b) mod 4
        let a = vec![1, 2];
        let b = vec![3, 4];
        let out = vec![5, 6];
        let mut ctr = Counter(6);
        let clauses = add_numbers(&a, &b, &out, &mut ctr.alloc_fn(), None, true);

        for av in 0u64..4 {
            for bv in 0u64..4 {
                let mut fixed = clauses.clone();
                fixed.extend(crate::bits::set_number(av, &a));
                fixed.extend(crate::bits::set_number(bv, &b));
                let sols = solve_for_outputs(&fixed, ctr.0 as usize, &out);
                assert_eq!(sols.len(), 1);
                let got = value_at(&sols[0], &out);
                assert_eq!(got, (av + bv) % 4);
            }
        }
    }

    impl Counter {
        fn alloc_fn(&mut self) -> impl FnMut() -> Literal + '_ {
            move || {
                self.0 += 1;
                self.0
            }
        }
    }

    #[test]
    fn add_numbers_forbids_overflow_by_default() {
        let a = vec![1, 2];
        let b = vec![3, 4];
        let out = vec![5, 6];
        let mut ctr = Counter(6);
        let clauses = add_numbers(&a, &b, &out, &mut ctr.alloc_fn(), None, false);

        // 3 + 3 = 6 overflows a 2-bit output -> UNSAT once a,b are pinned to 3,3.
        let mut fixed = clauses.clone();
        fixed.extend(crate::bits::set_number(3, &a));
        fixed.extend(crate::bits::set_number(3, &b));
        let sols = solve_for_outputs(&fixed, ctr.0 as usize, &out);
        assert!(sols.is_empty());
    }

    #[test]
    fn increment_number_wraps_mod_width() {
        let input = vec![1, 2, 3];
        let output = vec![4, 5, 6];
        let clauses = increment_number(&input, &output);
        for v in 0u64..8 {
            let mut fixed = clauses.clone();
            fixed.extend(crate::bits::set_number(v, &input));
            let sols = solve_for_outputs(&fixed, 6, &output);
            assert_eq!(sols.len(), 1);
            assert_eq!(value_at(&sols[0], &output), (v + 1) % 8);
        }
    }

    #[test]
    fn invert_number_realises_twos_complement_and_forbids_most_negative_value() {
        let input = vec![1, 2, 3];
        let output = vec![4, 5, 6];
        let mut ctr = Counter(6);
        let clauses = invert_number(&input, &output, &mut ctr.alloc_fn());

        for v in 0u64..8 {
            let mut fixed = clauses.clone();
            fixed.extend(crate::bits::set_number(v, &input));
            let sols = solve_for_outputs(&fixed, ctr.0 as usize, &output);
            if v == 4 {
                // 0b100: only the top bit set, the most negative 3-bit value; its
                // negation would overflow the width, so this input is unsatisfiable.
                assert!(sols.is_empty(), "most-negative-value input must be forbidden");
            } else {
                assert_eq!(sols.len(), 1);
                assert_eq!(value_at(&sols[0], &output), (8 - v) % 8);
            }
        }
    }

    #[test]
    fn get_popcount_equals_sum_of_input_bits() {
        for n in 2..=6usize {
            let bits: Vec<Literal> = (1..=(n as i32)).collect();
            let width = bin_length(n + 1);
            let mut ctr = Counter(n as i32);
            let output: Vec<Literal> = (0..width).map(|_| ctr.alloc_fn()()).collect();
            let clauses = get_popcount(&bits, &output, &mut ctr.alloc_fn());

            for mask in 0u64..(1 << n) {
                let mut fixed = clauses.clone();
                for (i, &b) in bits.iter().enumerate() {
                    fixed.push(vec![crate::bits::set_variable(b, (mask & (1 << i)) != 0)]);
                }
                let sols = solve_for_outputs(&fixed, ctr.0 as usize, &output);
                assert_eq!(sols.len(), 1, "n={n} mask={mask}");
                let got = value_at(&sols[0], &output);
                assert_eq!(got, mask.count_ones() as u64, "n={n} mask={mask}");
            }
        }
    }

    #[test]
    fn bin_length_matches_ceil_log2() {
        assert_eq!(bin_length(0), 0);
        assert_eq!(bin_length(1), 0);
        assert_eq!(bin_length(2), 1);
        assert_eq!(bin_length(3), 2);
        assert_eq!(bin_length(4), 2);
        assert_eq!(bin_length(5), 3);
        assert_eq!(bin_length(9), 4);
    }
}
