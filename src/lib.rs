//! A constraint compiler that reduces factory-conveyor balancer layout synthesis to
//! Boolean satisfiability.
//!
//! A grid of tile cells is given a declarative field schema (`template`), laid out
//! on a 2-D board with edge-aware neighbour lookup (`grid`), and progressively
//! constrained by per-cell well-formedness and layout rules (`layout`) plus, for
//! balancer synthesis specifically, a splitter-network topology (`network`). The
//! `bits`, `arithmetic`, and `cardinality` modules are the shared CNF-encoding
//! primitives every layer above them is built from. `backend` is the one place that
//! talks to an actual SAT solver; everything else only ever produces clauses.
//!
//! Two CLI binaries, `belt_balancer` and `make_block`, expose this compiler as
//! standalone tools — see their module docs under `src/bin/`.

#![forbid(unsafe_code)]
#![deny(missing_docs, rust_2018_idioms)]

/// Ripple-carry adders, increment, two's-complement inversion, and popcount over
/// literal vectors.
pub mod arithmetic;
/// SAT solver session adapter and DIMACS CNF (de)serialization.
pub mod backend;
/// Bit/clause primitives with no auxiliary-variable allocation.
pub mod bits;
/// At-most/exactly/at-least-k encodings over literal lists.
pub mod cardinality;
/// Crate-level CLI usage errors.
pub mod errors;
/// 2-D tile addressing, edge policy, and the clause accumulator.
pub mod grid;
/// Per-cell well-formedness, intersection, underground, loop, and colour rules.
pub mod layout;
/// Splitter-network topology and its compilation onto a grid.
pub mod network;
/// Declarative per-cell field schema.
pub mod template;

/// A SAT solver session; see [`backend::open`] to acquire one.
pub use backend::{BackendError, DimacsError, SatBackend};
/// A signed literal and a clause (disjunction of literals).
pub use bits::{Clause, EncodeError, Literal};
/// Errors raised by CLI invocation before any constraint construction begins.
pub use errors::UsageError;
/// Grid, its edge policy, and the decoded solution it produces.
pub use grid::{EdgeAxisModes, EdgeMode, Grid, GridError, Solution, TileRef};
/// Splitter-network document types.
pub use network::{Network, NetworkError, SplitterNode};
/// Tile template, its field kinds, and the per-cell instance/record types it produces.
pub use template::{FieldKind, TemplateError, TileInstance, TileRecord, TileTemplate};
