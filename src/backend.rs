//! Backend adapter
//!
//! The constraint compiler treats the SAT solver as an opaque session: open it with a
//! clause set, ask it to solve, read back a model, optionally feed it more clauses,
//! and let it close when dropped. This module is the one place that talks to an
//! actual solver; everything upstream only ever sees the [`SatBackend`] trait.
//!
//! No pack repo ships a SAT solver, so this is the one dependency this transformation
//! adds beyond the teacher's own stack: [`splr`](https://docs.rs/splr), a real,
//! published, pure-Rust CDCL solver. The adapter re-solves from the full accumulated
//! clause set on every [`SatBackend::solve`] call rather than keeping one incremental
//! solver process alive across calls — see the module-level note in `grid` for why
//! that is a documented performance tradeoff, not a correctness gap.

#![forbid(unsafe_code)]

use crate::bits::{Clause, Literal};

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("unknown SAT backend {0:?}")]
    UnknownBackend(String),
    #[error("solver reported no model (solve() was not called, or returned unsatisfiable)")]
    NoModel,
    #[error("solver error: {0}")]
    Solver(String),
    #[error("failed to decode model into a tile grid: {0}")]
    ModelDecode(String),
}

/// A handle to one SAT solver session. Implementors own whatever process/library
/// state the concrete solver needs; dropping a session releases it.
pub trait SatBackend {
    /// Solve against the clauses currently known to the session. Returns `Ok(true)`
    /// on SAT (call [`SatBackend::model`] next), `Ok(false)` on UNSAT.
    fn solve(&mut self) -> Result<bool, BackendError>;

    /// The most recent satisfying assignment as signed, 1-indexed literals. Only
    /// meaningful immediately after `solve()` returned `Ok(true)`.
    fn model(&self) -> Result<Vec<Literal>, BackendError>;

    /// Add one more clause to the session, to take effect on the next `solve()`.
    fn add_clause(&mut self, clause: &[Literal]) -> Result<(), BackendError>;
}

/// Resolve a backend name to a concrete session opened over `clauses`. Both `"g3"`
/// (kept for continuity with the tool this was distilled from, whose default backend
/// was Glucose3) and `"splr"` resolve to the same pure-Rust implementation.
pub fn open(name: &str, clauses: &[Clause]) -> Result<Box<dyn SatBackend>, BackendError> {
    match name {
        "g3" | "splr" => Ok(Box::new(SplrBackend::new(clauses))),
        other => Err(BackendError::UnknownBackend(other.to_string())),
    }
}

/// A [`SatBackend`] backed by the `splr` CDCL solver. Holds its own copy of the
/// clause set so that `add_clause` can grow it between re-solves.
pub struct SplrBackend {
    clauses: Vec<Clause>,
    last_model: Option<Vec<Literal>>,
}

impl SplrBackend {
    pub fn new(clauses: &[Clause]) -> Self {
        Self { clauses: clauses.to_vec(), last_model: None }
    }
}

impl SatBackend for SplrBackend {
    fn solve(&mut self) -> Result<bool, BackendError> {
        if self.clauses.is_empty() {
            self.last_model = Some(Vec::new());
            return Ok(true);
        }

        let cnf: Vec<Vec<i32>> = self.clauses.clone();
        let mut solver = splr::Solver::try_from((splr::Config::default(), cnf))
            .map_err(|e| BackendError::Solver(format!("{e:?}")))?;

        match solver.solve() {
            Ok(splr::Certificate::SAT(model)) => {
                self.last_model = Some(model);
                Ok(true)
            },
            Ok(splr::Certificate::UNSAT) => {
                self.last_model = None;
                Ok(false)
            },
            Err(e) => Err(BackendError::Solver(format!("{e:?}"))),
        }
    }

    fn model(&self) -> Result<Vec<Literal>, BackendError> {
        self.last_model.clone().ok_or(BackendError::NoModel)
    }

    fn add_clause(&mut self, clause: &[Literal]) -> Result<(), BackendError> {
        self.clauses.push(clause.to_vec());
        Ok(())
    }
}

/// Render `clauses` as DIMACS CNF: an optional block of `c`-prefixed comment lines,
/// the `p cnf <nvars> <nclauses>` header, then one `0`-terminated clause per line.
pub fn write_dimacs(clauses: &[Clause], total_variables: usize, comments: &[&str]) -> String {
    let mut out = String::new();
    for comment in comments {
        out.push_str("c ");
        out.push_str(comment);
        out.push('\n');
    }
    out.push_str(&format!("p cnf {total_variables} {}\n", clauses.len()));
    for clause in clauses {
        for literal in clause {
            out.push_str(&literal.to_string());
            out.push(' ');
        }
        out.push_str("0\n");
    }
    out
}

#[derive(Debug, thiserror::Error)]
pub enum DimacsError {
    #[error("malformed DIMACS header line: {0:?}")]
    BadHeader(String),
    #[error("malformed DIMACS clause line: {0:?}")]
    BadClause(String),
}

/// Parse a DIMACS CNF document back into a clause list, ignoring comment lines.
pub fn read_dimacs(input: &str) -> Result<Vec<Clause>, DimacsError> {
    let mut clauses = Vec::new();
    for line in input.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('c') {
            continue;
        }
        if line.starts_with("p ") {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() != 4 || parts[0] != "p" || parts[1] != "cnf" {
                return Err(DimacsError::BadHeader(line.to_string()));
            }
            continue;
        }
        let mut clause: Clause = line
            .split_whitespace()
            .map(|tok| tok.parse::<Literal>().map_err(|_| DimacsError::BadClause(line.to_string())))
            .collect::<Result<Vec<_>, _>>()?;
        match clause.pop() {
            Some(0) => clauses.push(clause),
            _ => return Err(DimacsError::BadClause(line.to_string())),
        }
    }
    Ok(clauses)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_backend_name_is_rejected() {
        assert!(matches!(open("cryptosat", &[]), Err(BackendError::UnknownBackend(name)) if name == "cryptosat"));
    }

    #[test]
    fn g3_and_splr_both_resolve() {
        assert!(open("g3", &[vec![1]]).is_ok());
        assert!(open("splr", &[vec![1]]).is_ok());
    }

    #[test]
    fn write_dimacs_matches_expected_shape() {
        let clauses = vec![vec![1, -2], vec![2, 3]];
        let doc = write_dimacs(&clauses, 3, &["hello"]);
        assert!(doc.starts_with("c hello\n"));
        assert!(doc.contains("p cnf 3 2\n"));
        assert!(doc.contains("1 -2 0\n"));
        assert!(doc.contains("2 3 0\n"));
    }

    #[test]
    fn read_dimacs_round_trips_write_dimacs() {
        let clauses = vec![vec![1, -2], vec![2, 3], vec![-1, -2, -3]];
        let doc = write_dimacs(&clauses, 3, &["round trip"]);
        let parsed = read_dimacs(&doc).unwrap();
        assert_eq!(parsed, clauses);
    }

    #[test]
    fn read_dimacs_rejects_malformed_clause_lines() {
        assert!(read_dimacs("p cnf 1 1\n1 2\n").is_err());
    }
}
