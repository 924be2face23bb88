//! Bit & clause primitives
//!
//! The smallest building blocks the rest of the compiler is built from: turning a
//! boolean into a signed literal, pinning a literal pair to be equal or different,
//! broadcasting an implication over a list of consequence clauses, and pinning a
//! fixed integer onto the little-endian binary expansion of a literal list.
//!
//! Every function here is a pure mapping from its arguments to a `Vec<Clause>` (or a
//! single `Clause`) — none of them allocate fresh variables, so none of them need an
//! allocator callback. That is what separates this module from `arithmetic` and
//! `cardinality`, both of which introduce auxiliary literals.

#![forbid(unsafe_code)]

/// A signed, nonzero integer identifying a boolean variable. Negation flips polarity.
/// Zero is never a valid literal.
pub type Literal = i32;

/// A finite disjunction of literals.
pub type Clause = Vec<Literal>;

/// Map a boolean onto a literal: `v` if `value`, `-v` otherwise.
#[inline]
pub fn set_variable(var: Literal, value: bool) -> Literal {
    if value {
        var
    } else {
        -var
    }
}

/// Negate every literal in a clause (De Morgan: turns `a ∨ b ∨ c` into the clause
/// that forbids `a ∧ b ∧ c`, i.e. `¬a ∨ ¬b ∨ ¬c`, when used on a precondition that
/// must be ruled out unconditionally).
#[inline]
pub fn invert_components(clause: &[Literal]) -> Clause {
    clause.iter().map(|&l| -l).collect()
}

/// Clauses enforcing `a ↔ b`.
#[inline]
pub fn variables_same(a: Literal, b: Literal) -> Vec<Clause> {
    vec![vec![-a, b], vec![a, -b]]
}

/// Clauses enforcing `a ⊕ b` (exactly one of the two is true).
#[inline]
pub fn variables_different(a: Literal, b: Literal) -> Vec<Clause> {
    vec![vec![a, b], vec![-a, -b]]
}

/// For every consequence clause `C`, produce `¬pre₁ ∨ ¬pre₂ ∨ … ∨ C` — i.e. broadcast
/// the negated conjunction of `condition` across each consequence. An empty
/// `consequences` list produces an empty list of clauses (there is nothing to imply).
pub fn implies(condition: &[Literal], consequences: &[Clause]) -> Vec<Clause> {
    let inverse: Clause = condition.iter().map(|&v| -v).collect();
    consequences
        .iter()
        .map(|c| {
            let mut clause = inverse.clone();
            clause.extend_from_slice(c);
            clause
        })
        .collect()
}

/// Yield the bits of `value` in little-endian order, `total_bits` of them.
pub fn get_bits(value: u64, total_bits: usize) -> impl Iterator<Item = bool> {
    (0..total_bits).map(move |bit| (value & (1 << bit)) != 0)
}

/// Decode a little-endian bit sequence back into an integer, optionally interpreting
/// the top bit as a two's-complement sign.
///
/// # Panics
/// Panics if `signed` is set and `bits` has fewer than 2 entries (mirrors the source's
/// `assert len(bits) > 1` — a single-bit signed number is not meaningful here).
pub fn read_number(bits: &[bool], signed: bool) -> i64 {
    let mut result: i64 = 0;
    for (i, &bit) in bits.iter().enumerate() {
        if bit {
            result |= 1 << i;
        }
    }
    if signed {
        assert!(bits.len() > 1, "signed_num fields must have at least 2 bits");
        if *bits.last().unwrap() {
            result -= 1i64 << bits.len();
        }
    }
    result
}

/// Errors raised by the bit/clause primitives when a caller's inputs cannot be
/// satisfied by construction.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EncodeError {
    #[error("value {value} does not fit in {bits} bits")]
    ValueTooWide { value: u64, bits: usize },
    #[error("set_numbers requires equal-length variable lists (got {a} and {b})")]
    UnequalLengths { a: usize, b: usize },
}

/// Unit clauses pinning the little-endian binary expansion of `value` onto
/// `variables`. Fails if `value` does not fit in `variables.len()` bits.
pub fn set_number_r(value: u64, variables: &[Literal]) -> Result<Vec<Clause>, EncodeError> {
    if variables.is_empty() {
        if value != 0 {
            return Err(EncodeError::ValueTooWide { value, bits: 0 });
        }
        return Ok(Vec::new());
    }
    if variables.len() < 64 && value >= (1u64 << variables.len()) {
        return Err(EncodeError::ValueTooWide { value, bits: variables.len() });
    }
    Ok(variables
        .iter()
        .zip(get_bits(value, variables.len()))
        .map(|(&var, bit)| vec![set_variable(var, bit)])
        .collect())
}

/// Back-compat convenience wrapper: panics instead of returning a `Result`. Used at
/// call sites where the width has already been validated by the caller (e.g. a
/// template-derived colour field sized from `max_colour`).
#[inline]
pub fn set_number(value: u64, variables: &[Literal]) -> Vec<Clause> {
    set_number_r(value, variables).expect("set_number: value does not fit in the given width")
}

/// The negation of `set_number(value, variables)`: a single clause forbidding exactly
/// that value (at least one bit must differ from it).
pub fn set_not_number(value: u64, variables: &[Literal]) -> Clause {
    set_number(value, variables)
        .into_iter()
        .map(|clause| -clause[0])
        .collect()
}

/// Assigns `value_a` to `vars_a` and `value_b` to `vars_b` simultaneously, sharing
/// literals where the two encodings agree bit-for-bit and correlating the literals
/// at positions where they differ, so the resulting clause set is strictly tighter
/// than two independent [`set_number`] calls plus nothing.
///
/// For bit position *i*: if `value_a` and `value_b` agree there, both `vars_a[i]`
/// and `vars_b[i]` are pinned directly to that shared bit. Where they disagree,
/// `vars_a[i]` and `vars_b[i]` are forced to differ (one of the two values is
/// realised on each side), and all differing positions are correlated against the
/// first such position: same bit-in-`value_a` ⇒ `vars_a` agree there; opposite bit
/// ⇒ `vars_a` disagree there. This is what lets the network compiler say "pick one
/// of two possible input colour pairs, consistently across a splitter": fixing which
/// side received the first differing bit fixes every other differing bit in lockstep.
pub fn set_numbers_r(
    value_a: u64,
    value_b: u64,
    vars_a: &[Literal],
    vars_b: &[Literal],
) -> Result<Vec<Clause>, EncodeError> {
    if vars_a.len() != vars_b.len() {
        return Err(EncodeError::UnequalLengths { a: vars_a.len(), b: vars_b.len() });
    }
    let total_bits = vars_a.len();
    if total_bits < 64 {
        if value_a >= (1u64 << total_bits) {
            return Err(EncodeError::ValueTooWide { value: value_a, bits: total_bits });
        }
        if value_b >= (1u64 << total_bits) {
            return Err(EncodeError::ValueTooWide { value: value_b, bits: total_bits });
        }
    }

    let mut clauses = Vec::new();
    let mut differences: Vec<(Literal, Literal, bool)> = Vec::new();

    for (i, (&var_a, &var_b)) in vars_a.iter().zip(vars_b.iter()).enumerate() {
        let bit_a = (value_a & (1 << i)) != 0;
        let bit_b = (value_b & (1 << i)) != 0;
        if bit_a == bit_b {
            clauses.push(vec![set_variable(var_a, bit_a)]);
            clauses.push(vec![set_variable(var_b, bit_a)]);
        } else {
            clauses.extend(variables_different(var_a, var_b));
            differences.push((var_a, var_b, bit_a));
        }
    }

    if let Some(&(var_a0, _var_b0, bit_a0)) = differences.first() {
        for &(var_a1, _var_b1, bit_a1) in &differences[1..] {
            if bit_a0 == bit_a1 {
                clauses.extend(variables_same(var_a0, var_a1));
            } else {
                clauses.extend(variables_different(var_a0, var_a1));
            }
        }
    }

    Ok(clauses)
}

/// Back-compat convenience wrapper: panics instead of returning a `Result`.
#[inline]
pub fn set_numbers(
    value_a: u64,
    value_b: u64,
    vars_a: &[Literal],
    vars_b: &[Literal],
) -> Vec<Clause> {
    set_numbers_r(value_a, value_b, vars_a, vars_b).expect("set_numbers: invalid inputs")
}
