//! Grid and edge model
//!
//! 2-D addressing over a dense block of tile variables, edge-aware neighbour lookup,
//! and the clause accumulator every layout/network rule appends to. Grounded on the
//! source's `BaseGrid`: row-major tile numbering (`index = y*width + x`), the three
//! edge policies, and the re-solve loop behind `itersolve`.

#![forbid(unsafe_code)]

use std::collections::{HashMap, HashSet};

use crate::backend::{BackendError, SatBackend};
use crate::bits::{Clause, Literal};
use crate::template::{TemplateError, TileInstance, TileRecord, TileTemplate};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum GridError {
    #[error("grid dimensions must both be positive (got {width}x{height})")]
    EmptyGrid { width: usize, height: usize },
    #[error("coordinates ({x}, {y}) out of bounds for a {width}x{height} grid")]
    OutOfBounds { x: i64, y: i64, width: usize, height: usize },
}

/// Neighbour-lookup policy at a grid edge, settable independently per axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeMode {
    /// Drop the constraint entirely when the neighbour falls off the grid.
    Ignore,
    /// Treat the out-of-bounds neighbour as permanently absent/false.
    Block,
    /// Wrap the coordinate modulo the axis size (toroidal grid).
    Tile,
}

/// Per-axis edge policy; `uniform` mirrors the source's single-mode shorthand that
/// expands to the same mode on both axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeAxisModes {
    pub x: EdgeMode,
    pub y: EdgeMode,
}

impl EdgeAxisModes {
    pub fn uniform(mode: EdgeMode) -> Self {
        Self { x: mode, y: mode }
    }
}

/// The result of an edge-aware neighbour lookup.
pub enum TileRef {
    Real(TileInstance),
    Blocked,
    Ignored,
}

/// A decoded grid: one [`TileRecord`] per cell, indexed `(x, y)`.
pub struct Solution {
    width: usize,
    height: usize,
    records: Vec<TileRecord>,
}

impl Solution {
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn get(&self, x: usize, y: usize) -> &TileRecord {
        &self.records[y * self.width + x]
    }

    /// Render this solution as `cells[W][H]`, per §6's solution output format: one
    /// JSON object per cell, indexed `cells[x][y]`.
    pub fn to_json(&self, template: &TileTemplate) -> serde_json::Value {
        let columns: Vec<serde_json::Value> = (0..self.width)
            .map(|x| {
                let rows: Vec<serde_json::Value> = (0..self.height).map(|y| self.get(x, y).to_json(template)).collect();
                serde_json::Value::Array(rows)
            })
            .collect();
        serde_json::Value::Array(columns)
    }
}

/// A grid instance: a fixed tile template over a `width * height` board, with a
/// monotonically growing literal space and an append-only clause accumulator.
pub struct Grid {
    pub template: TileTemplate,
    pub width: usize,
    pub height: usize,
    extra_variables: usize,
    clauses: Vec<Clause>,
    /// Opt-in clause-count tally keyed by call site, for profiling. Cheap enough
    /// (one `HashMap` bump per call) to leave always-on rather than gate behind a
    /// feature flag.
    clause_count_by_site: HashMap<&'static str, usize>,
}

impl Grid {
    pub fn new(template: TileTemplate, width: usize, height: usize) -> Result<Self, GridError> {
        if width == 0 || height == 0 {
            return Err(GridError::EmptyGrid { width, height });
        }
        Ok(Self {
            template,
            width,
            height,
            extra_variables: 0,
            clauses: Vec::new(),
            clause_count_by_site: HashMap::new(),
        })
    }

    pub fn total_variables(&self) -> usize {
        self.width * self.height * self.template.size
    }

    pub fn tile_size(&self) -> usize {
        self.template.size
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    pub fn clause_count_by_site(&self) -> &HashMap<&'static str, usize> {
        &self.clause_count_by_site
    }

    /// Append clauses produced at `site`, bumping that site's tally.
    pub fn push_clauses(&mut self, site: &'static str, clauses: impl IntoIterator<Item = Clause>) {
        let before = self.clauses.len();
        self.clauses.extend(clauses);
        *self.clause_count_by_site.entry(site).or_insert(0) += self.clauses.len() - before;
    }

    /// Fresh auxiliary literal numbered after the dense tile-variable block.
    pub fn allocate_variable(&mut self) -> Literal {
        let result = 1 + self.total_variables() + self.extra_variables;
        self.extra_variables += 1;
        result as Literal
    }

    /// An `FnMut() -> Literal` closure over this grid's allocator, for passing to the
    /// arithmetic/cardinality encoders.
    pub fn allocator(&mut self) -> impl FnMut() -> Literal + '_ {
        move || self.allocate_variable()
    }

    pub fn get_tile_instance_r(&self, x: usize, y: usize) -> Result<TileInstance, GridError> {
        if x >= self.width || y >= self.height {
            return Err(GridError::OutOfBounds {
                x: x as i64,
                y: y as i64,
                width: self.width,
                height: self.height,
            });
        }
        Ok(self.template.instantiate(y * self.width + x))
    }

    pub fn get_tile_instance(&self, x: usize, y: usize) -> TileInstance {
        self.get_tile_instance_r(x, y).expect("coordinates out of bounds")
    }

    /// Iterate every tile on the board in the source's x-outer, y-inner order.
    pub fn iterate_tiles(&self) -> impl Iterator<Item = TileInstance> + '_ {
        (0..self.width).flat_map(move |x| (0..self.height).map(move |y| self.get_tile_instance(x, y)))
    }

    /// Edge-aware neighbour lookup at `(x + dx, y + dy)`.
    pub fn get_tile_instance_offset(
        &self,
        x: usize,
        y: usize,
        dx: i64,
        dy: i64,
        edge_modes: EdgeAxisModes,
    ) -> TileRef {
        let pos_x = x as i64 + dx;
        let pos_y = y as i64 + dy;

        let mut ignored = false;
        let resolved_x = match resolve_axis(pos_x, self.width, edge_modes.x) {
            AxisResult::Blocked => return TileRef::Blocked,
            AxisResult::Ignored => {
                ignored = true;
                0
            },
            AxisResult::Resolved(v) => v,
        };
        let resolved_y = match resolve_axis(pos_y, self.height, edge_modes.y) {
            AxisResult::Blocked => return TileRef::Blocked,
            AxisResult::Ignored => {
                ignored = true;
                0
            },
            AxisResult::Resolved(v) => v,
        };

        if ignored {
            return TileRef::Ignored;
        }
        TileRef::Real(self.get_tile_instance(resolved_x, resolved_y))
    }

    /// Decode a raw SAT model (signed literals, 1-indexed) into a [`Solution`].
    pub fn parse_solution(&self, model: &[Literal]) -> Result<Solution, TemplateError> {
        let total = self.total_variables();
        let mut variables = vec![false; total];
        for &item in model {
            if item > 0 && (item as usize) <= total {
                variables[(item as usize) - 1] = true;
            }
        }
        let records = self.template.parse_all(&variables)?;
        Ok(Solution { width: self.width, height: self.height, records })
    }

    /// Open a backend session over the accumulated clauses and enumerate models,
    /// blocking each model's projection onto `important_variables` before re-solving.
    pub fn itersolve<'g>(
        &'g self,
        important_variables: &[Literal],
        backend_name: &str,
    ) -> Result<SolutionIter<'g>, BackendError> {
        let backend = crate::backend::open(backend_name, &self.clauses)?;
        Ok(SolutionIter {
            grid: self,
            important_variables: important_variables.iter().map(|l| l.unsigned_abs()).collect(),
            backend,
            done: false,
        })
    }
}

enum AxisResult {
    Resolved(usize),
    Blocked,
    Ignored,
}

fn resolve_axis(pos: i64, size: usize, mode: EdgeMode) -> AxisResult {
    if pos >= 0 && (pos as usize) < size {
        return AxisResult::Resolved(pos as usize);
    }
    match mode {
        EdgeMode::Tile => AxisResult::Resolved(pos.rem_euclid(size as i64) as usize),
        EdgeMode::Block => AxisResult::Blocked,
        EdgeMode::Ignore => AxisResult::Ignored,
    }
}

/// Lazy enumeration of models, one backend session held open for the lifetime of the
/// iterator. Dropping the iterator closes the backend (via the session's `Drop`).
pub struct SolutionIter<'g> {
    grid: &'g Grid,
    important_variables: HashSet<u32>,
    backend: Box<dyn SatBackend>,
    done: bool,
}

impl Iterator for SolutionIter<'_> {
    type Item = Result<Solution, BackendError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.backend.solve() {
            Err(e) => {
                self.done = true;
                Some(Err(e))
            },
            Ok(false) => {
                self.done = true;
                None
            },
            Ok(true) => {
                let model = match self.backend.model() {
                    Ok(m) => m,
                    Err(e) => {
                        self.done = true;
                        return Some(Err(e));
                    },
                };

                let solution = match self.grid.parse_solution(&model) {
                    Ok(s) => s,
                    Err(e) => {
                        self.done = true;
                        return Some(Err(BackendError::ModelDecode(e.to_string())));
                    },
                };

                let blocking: Clause = model
                    .iter()
                    .filter(|&&lit| self.important_variables.contains(&lit.unsigned_abs()))
                    .map(|&lit| -lit)
                    .collect();
                if !blocking.is_empty() {
                    if let Err(e) = self.backend.add_clause(&blocking) {
                        self.done = true;
                        return Some(Err(e));
                    }
                }

                Some(Ok(solution))
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::FieldKind;

    fn tiny_template() -> TileTemplate {
        TileTemplate::new(vec![("flag", FieldKind::Bool)]).unwrap()
    }

    #[test]
    fn total_variables_and_allocation_order() {
        let mut grid = Grid::new(tiny_template(), 3, 2).unwrap();
        assert_eq!(grid.total_variables(), 6);
        assert_eq!(grid.allocate_variable(), 7);
        assert_eq!(grid.allocate_variable(), 8);
    }

    #[test]
    fn get_tile_instance_uses_row_major_indexing() {
        let grid = Grid::new(tiny_template(), 3, 2).unwrap();
        // index = y*width + x; cell (2,1) -> index 5 -> literal 6.
        assert_eq!(grid.get_tile_instance(2, 1).literal(&grid.template, "flag"), Some(6));
    }

    #[test]
    fn iterate_tiles_is_x_outer_y_inner() {
        let grid = Grid::new(tiny_template(), 2, 2).unwrap();
        let literals: Vec<Literal> =
            grid.iterate_tiles().map(|t| t.literal(&grid.template, "flag").unwrap()).collect();
        // (0,0)=1 (0,1)=3 (1,0)=2 (1,1)=4
        assert_eq!(literals, vec![1, 3, 2, 4]);
    }

    #[test]
    fn out_of_bounds_tile_access_is_rejected() {
        let grid = Grid::new(tiny_template(), 2, 2).unwrap();
        assert!(grid.get_tile_instance_r(2, 0).is_err());
    }

    #[test]
    fn edge_mode_block_returns_blocked_sentinel() {
        let grid = Grid::new(tiny_template(), 2, 2).unwrap();
        let result = grid.get_tile_instance_offset(0, 0, -1, 0, EdgeAxisModes::uniform(EdgeMode::Block));
        assert!(matches!(result, TileRef::Blocked));
    }

    #[test]
    fn edge_mode_ignore_returns_ignored_sentinel() {
        let grid = Grid::new(tiny_template(), 2, 2).unwrap();
        let result = grid.get_tile_instance_offset(0, 0, -1, 0, EdgeAxisModes::uniform(EdgeMode::Ignore));
        assert!(matches!(result, TileRef::Ignored));
    }

    #[test]
    fn edge_mode_tile_wraps_coordinates() {
        let grid = Grid::new(tiny_template(), 2, 2).unwrap();
        let result = grid.get_tile_instance_offset(0, 0, -1, 0, EdgeAxisModes::uniform(EdgeMode::Tile));
        match result {
            TileRef::Real(tile) => assert_eq!(tile.literal(&grid.template, "flag"), Some(2)),
            _ => panic!("expected a wrapped real tile"),
        }
    }

    #[test]
    fn in_bounds_offset_is_unaffected_by_edge_mode() {
        let grid = Grid::new(tiny_template(), 2, 2).unwrap();
        let result = grid.get_tile_instance_offset(0, 0, 1, 0, EdgeAxisModes::uniform(EdgeMode::Block));
        match result {
            TileRef::Real(tile) => assert_eq!(tile.literal(&grid.template, "flag"), Some(2)),
            _ => panic!("expected a real tile"),
        }
    }

    #[test]
    fn zero_sized_grid_is_rejected() {
        assert_eq!(Grid::new(tiny_template(), 0, 2).unwrap_err(), GridError::EmptyGrid { width: 0, height: 2 });
    }

    #[test]
    fn push_clauses_tracks_count_by_site() {
        let mut grid = Grid::new(tiny_template(), 2, 2).unwrap();
        grid.push_clauses("layout::well_formed", vec![vec![1, 2], vec![-1]]);
        grid.push_clauses("layout::well_formed", vec![vec![3]]);
        assert_eq!(grid.clause_count_by_site()["layout::well_formed"], 3);
        assert_eq!(grid.clauses().len(), 3);
    }

    #[test]
    fn solution_to_json_is_indexed_cells_x_y() {
        let grid = Grid::new(tiny_template(), 2, 1).unwrap();
        // cell (0,0) -> literal 1 (true), cell (1,0) -> literal 2 (false/absent).
        let solution = grid.parse_solution(&[1]).unwrap();
        let json = solution.to_json(&grid.template);
        assert_eq!(json[0][0]["flag"], serde_json::json!(true));
        assert_eq!(json[1][0]["flag"], serde_json::json!(false));
    }
}
