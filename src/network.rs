//! Splitter network compiler
//!
//! A [`Network`] is the target topology a balancer grid must realise: an ordered
//! list of splitter nodes, each holding an `(input_colours, output_colours)` pair
//! over a common colour alphabet, with `None` standing for "don't care /
//! recirculation" — a lane with no internal partner, left to the solver (and, at
//! the CLI layer, to the grid's edge lanes) rather than pinned to another node's
//! colour. Compiling a network onto a [`Grid`] ties every grid cell flagged as a
//! splitter to exactly one network node and couples the colour fields across the
//! two physical cells a splitter occupies, and across its downstream neighbours,
//! so that the wiring the network describes is realised in the grid's colour flow.
//!
//! Grounded directly on `belt_balancer.py`'s `create_balancer`/`setup_balancer_ends`/
//! `enforce_edge_splitters`.

#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

use crate::bits::{implies, invert_components, set_number_r, set_numbers_r, variables_different, Literal};
use crate::cardinality::adder_greater_equal;
use crate::grid::{EdgeAxisModes, Grid, TileRef};
use crate::layout::{core_template, direction_to_vec};
use crate::template::{FieldKind, TemplateError, TileInstance, TileTemplate};

#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    #[error("network has {0} nodes, which does not fit in the grid's node field")]
    TooManyNodes(usize),
    #[error("node {0} has more than one don't-care ('null') lane; at most one of its four input/output slots may be null")]
    TooManyDontCares(usize),
    #[error("{lanes} lane(s) do not fit on an edge of height {height}")]
    LaneCountExceedsHeight { lanes: usize, height: usize },
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error(transparent)]
    Cardinality(#[from] crate::cardinality::CardinalityError),
    #[error(transparent)]
    Encode(#[from] crate::bits::EncodeError),
}

/// One splitter's wiring: the colour carried by each of its two inputs, and the
/// colour carried by each of its two outputs. `None` is the don't-care/recirculation
/// sentinel — the source's `null` in the JSON document. The JSON shape is a
/// two-element array `[input_colours, output_colours]` (§6), not a `{"inputs":
/// ..., "outputs": ...}` object, so `Serialize`/`Deserialize` are hand-written
/// against the tuple form rather than derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitterNode {
    pub inputs: [Option<u32>; 2],
    pub outputs: [Option<u32>; 2],
}

impl Serialize for SplitterNode {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        (self.inputs, self.outputs).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for SplitterNode {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let (inputs, outputs) = <([Option<u32>; 2], [Option<u32>; 2])>::deserialize(deserializer)?;
        Ok(SplitterNode { inputs, outputs })
    }
}

/// A full splitter-network document: a bare JSON array of nodes (§6), hence
/// `#[serde(transparent)]` rather than the `{"nodes": [...]}` wrapper a plain
/// derive would otherwise produce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Network {
    pub nodes: Vec<SplitterNode>,
}

/// The colour reserved, by convention, to mark a lane as carrying the balancer's
/// overall external input — the value `get_input_output_colours` would have read
/// off `network.py`, which is not present in the retrieval pack. A node whose two
/// input lanes are *both* pinned to this colour (not `null`) is "fully" connected
/// to the outside world on its input side (`belt_balancer.py --edge-splitters`'s
/// help text: "any splitter that has both connections to the input ... of the
/// balancer"); `null` lanes (see [`SplitterNode`]) cover the partial case, one
/// real internal wire plus one lane left to the solver. Fixed at 0/1 rather than
/// derived per-network so that a network document can reference them directly
/// (a per-network "first unused colour" could not be written down in advance).
pub const NETWORK_INPUT_COLOUR: u32 = 0;
/// See [`NETWORK_INPUT_COLOUR`]; the output-side counterpart.
pub const NETWORK_OUTPUT_COLOUR: u32 = 1;

impl Network {
    /// At most one of a node's four lanes may be `null`, matching the source's
    /// `assert sum(colour is None for colour in input_colours + output_colours) <= 1`.
    pub fn validate(&self) -> Result<(), NetworkError> {
        for (i, node) in self.nodes.iter().enumerate() {
            let dont_cares = node.inputs.iter().chain(node.outputs.iter()).filter(|c| c.is_none()).count();
            if dont_cares > 1 {
                return Err(NetworkError::TooManyDontCares(i));
            }
        }
        Ok(())
    }

    /// The distinct defined colour values appearing in this network, used to gate
    /// the colour domain down via `layout::prevent_colour` on a compiled grid.
    pub fn referenced_colours(&self) -> Vec<u32> {
        let mut seen: Vec<u32> = self
            .nodes
            .iter()
            .flat_map(|n| n.inputs.iter().chain(n.outputs.iter()))
            .filter_map(|&c| c)
            .collect();
        seen.sort_unstable();
        seen.dedup();
        seen
    }

    /// `(input_lanes, output_lanes)`: the count of `None` ("don't-care") input and
    /// output slots across every node. By construction a `None` lane has no
    /// internal partner, so this is also the balancer's external edge lane count.
    pub fn external_lane_counts(&self) -> (usize, usize) {
        let inputs = self.nodes.iter().flat_map(|n| n.inputs.iter()).filter(|c| c.is_none()).count();
        let outputs = self.nodes.iter().flat_map(|n| n.outputs.iter()).filter(|c| c.is_none()).count();
        (inputs, outputs)
    }

    /// Node indices whose two input lanes are *both* pinned to
    /// [`NETWORK_INPUT_COLOUR`] — "edge input splitters", fully fed from the
    /// balancer's overall input. Used to size `--edge-splitters`'s placement.
    pub fn edge_input_splitters(&self) -> Vec<usize> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.inputs.iter().all(|&c| c == Some(NETWORK_INPUT_COLOUR)))
            .map(|(i, _)| i)
            .collect()
    }

    /// Symmetric to [`Network::edge_input_splitters`] on the output side.
    pub fn edge_output_splitters(&self) -> Vec<usize> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.outputs.iter().all(|&c| c == Some(NETWORK_OUTPUT_COLOUR)))
            .map(|(i, _)| i)
            .collect()
    }

    /// The count of output lanes, across every node, pinned to
    /// [`NETWORK_INPUT_COLOUR`] — internal wiring deliberately looped back to read
    /// as "external input", exempting that many edge input splitters from the
    /// edge-column requirement.
    pub fn recirculate_input(&self) -> usize {
        self.nodes.iter().flat_map(|n| n.outputs.iter()).filter(|&&c| c == Some(NETWORK_INPUT_COLOUR)).count()
    }

    /// Symmetric to [`Network::recirculate_input`]: input lanes pinned to
    /// [`NETWORK_OUTPUT_COLOUR`].
    pub fn recirculate_output(&self) -> usize {
        self.nodes.iter().flat_map(|n| n.inputs.iter()).filter(|&&c| c == Some(NETWORK_OUTPUT_COLOUR)).count()
    }
}

/// The per-cell template for a network-compiled grid: [`core_template`] plus a
/// `node` one-hot field wide enough to name any node index (only meaningful on
/// cells where `is_splitter[0]` holds; all other cells leave `node` at all-zero).
pub fn network_template(max_colour: u32, node_count: usize) -> Result<TileTemplate, TemplateError> {
    let base = core_template(max_colour)?;
    let node_field = TileTemplate::new(vec![("node", FieldKind::OneHot(node_count.max(1)))])?;
    base.merge(&node_field)
}

fn field<'a>(tile: &'a TileInstance, template: &TileTemplate, name: &str) -> Result<Vec<Literal>, NetworkError> {
    tile.literals(template, name).ok_or_else(|| NetworkError::Template(TemplateError::UnknownField(name.to_string())))
}

/// Tie every splitter-flagged cell to exactly one network node and couple colours
/// across the wiring the network describes. A cell is node `i`'s "left half" only
/// if `is_splitter[0]` holds there; the perpendicular neighbour is its paired
/// "right half", found geometrically rather than via its own `node` bit.
pub fn create_balancer(grid: &mut Grid, network: &Network, edge: EdgeAxisModes) -> Result<(), NetworkError> {
    network.validate()?;
    if network.nodes.len() > u32::MAX as usize {
        return Err(NetworkError::TooManyNodes(network.nodes.len()));
    }
    let template = grid.template.clone();
    let node_count = network.nodes.len();

    for x in 0..grid.width {
        for y in 0..grid.height {
            let tile = grid.get_tile_instance(x, y);
            let is_splitter = field(&tile, &template, "is_splitter")?;
            let node_lits = field(&tile, &template, "node")?;

            let mut clauses = Vec::new();
            for (i, &node_lit) in node_lits.iter().enumerate() {
                if i >= node_count {
                    clauses.push(vec![-node_lit]);
                }
            }
            // `is_splitter[0] <=> exactly one of node[0..node_count]` holds: a cell
            // tags a node only through its left half.
            let mut group = vec![-is_splitter[0]];
            group.extend(node_lits.iter().take(node_count).copied());
            clauses.extend(crate::cardinality::quadratic_exactly_one(&group)?);
            grid.push_clauses("network::splitter_tie", clauses);
        }
    }

    // Exactly one cell claims each node index, across the whole grid.
    for i in 0..node_count {
        let mut bits = Vec::with_capacity(grid.width * grid.height);
        for x in 0..grid.width {
            for y in 0..grid.height {
                let tile = grid.get_tile_instance(x, y);
                bits.push(field(&tile, &template, "node")?[i]);
            }
        }
        let clauses = crate::cardinality::logarithmic_exactly_one(&bits, &mut grid.allocator())?;
        grid.push_clauses("network::node_location", clauses);
    }

    for (node_index, node) in network.nodes.iter().enumerate() {
        couple_node(grid, node_index, node, edge)?;
    }

    Ok(())
}

/// Gate clauses on `colours` for one side (inputs or outputs) of a node, pinning
/// `field_a`/`field_b` — either the splitter's own colour fields (input side) or
/// its downstream neighbours' colour fields (output side) — per §4.G's
/// per-orientation coupling rule.
fn colour_pair_clauses(
    precondition: &[Literal],
    colours: [Option<u32>; 2],
    dir_a: Literal,
    dir_b: Literal,
    field_a: &[Literal],
    field_b: &[Literal],
) -> Result<Vec<crate::bits::Clause>, NetworkError> {
    let mut clauses = Vec::new();
    match colours {
        [Some(a), Some(b)] => {
            clauses.extend(implies(precondition, &[vec![dir_a], vec![dir_b]]));
            let coupling = set_numbers_r(a as u64, b as u64, field_a, field_b)?;
            clauses.extend(implies(precondition, &coupling));
        },
        [Some(c), None] | [None, Some(c)] => {
            clauses.extend(implies(precondition, &variables_different(dir_a, dir_b)));
            let mut pre_a = precondition.to_vec();
            pre_a.push(dir_a);
            clauses.extend(implies(&pre_a, &set_number_r(c as u64, field_a)?));
            let mut pre_b = precondition.to_vec();
            pre_b.push(dir_b);
            clauses.extend(implies(&pre_b, &set_number_r(c as u64, field_b)?));
        },
        [None, None] => {
            // Ruled out by `Network::validate`'s "at most one don't-care lane"
            // invariant; nothing to couple when neither side is pinned.
        },
    }
    Ok(clauses)
}

/// For every cell and every candidate orientation `direction`, tie node `i`'s two
/// physical halves and their downstream neighbours to the node's input/output
/// colours. Mirrors `belt_balancer.py`'s `create_balancer` inner loop literally:
/// `tile00`/`tile01` are the splitter's own two cells (perpendicular to
/// `direction`), `tile10`/`tile11` their one-step-downstream neighbours, used for
/// the output-side coupling.
fn couple_node(grid: &mut Grid, node_index: usize, node: &SplitterNode, edge: EdgeAxisModes) -> Result<(), NetworkError> {
    let template = grid.template.clone();
    // If any input lane is don't-care, this node's orientation is pinned by its
    // (fully defined) output side instead.
    let input_has_none = node.inputs.iter().any(|c| c.is_none());

    for x in 0..grid.width {
        for y in 0..grid.height {
            let tile00 = grid.get_tile_instance(x, y);
            let this_node = field(&tile00, &template, "node")?[node_index];
            let input_dir00 = field(&tile00, &template, "input_direction")?;
            let output_dir00 = field(&tile00, &template, "output_direction")?;
            let colour00 = field(&tile00, &template, "colour")?;

            let facing00 = if input_has_none { &output_dir00 } else { &input_dir00 };
            let mut facing_clause = vec![-this_node];
            facing_clause.extend(facing00.iter().copied());
            grid.push_clauses("network::node_facing", vec![facing_clause]);

            for direction in 0u8..4 {
                let (dx0, dy0) = direction_to_vec(direction);
                let (dx1, dy1) = direction_to_vec((direction + 1) % 4);

                let facing_lit = facing00[direction as usize];
                let precondition = vec![this_node, facing_lit];

                let tile10 = grid.get_tile_instance_offset(x, y, dx0, dy0, edge);
                let tile01 = grid.get_tile_instance_offset(x, y, dx1, dy1, edge);
                let tile11 = grid.get_tile_instance_offset(x, y, dx0 + dx1, dy0 + dy1, edge);

                if matches!(tile10, TileRef::Blocked) || matches!(tile01, TileRef::Blocked) || matches!(tile11, TileRef::Blocked)
                {
                    grid.push_clauses("network::couple_blocked", vec![invert_components(&precondition)]);
                    continue;
                }
                let (TileRef::Real(tile01), TileRef::Real(tile10), TileRef::Real(tile11)) = (tile01, tile10, tile11)
                else {
                    // Edge in `Ignore` mode with no neighbour there: nothing to
                    // couple at this orientation.
                    continue;
                };

                let input_dir01 = field(&tile01, &template, "input_direction")?;
                let output_dir01 = field(&tile01, &template, "output_direction")?;
                let colour01 = field(&tile01, &template, "colour")?;
                let colour10 = field(&tile10, &template, "colour")?;
                let colour11 = field(&tile11, &template, "colour")?;

                let mut clauses = colour_pair_clauses(
                    &precondition,
                    node.inputs,
                    input_dir00[direction as usize],
                    input_dir01[direction as usize],
                    &colour00,
                    &colour01,
                )?;
                clauses.extend(colour_pair_clauses(
                    &precondition,
                    node.outputs,
                    output_dir00[direction as usize],
                    output_dir01[direction as usize],
                    &colour10,
                    &colour11,
                )?);
                grid.push_clauses("network::colour_coupling", clauses);
            }
        }
    }
    Ok(())
}

/// Which edge column a balancer's external lanes sit on. Both sides pin the same
/// straight-through-facing-east belt (`input_direction`/`output_direction` both east)
/// — only the column differs; a belt's direction fields name the flow's compass
/// heading, not which physical side material enters from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// `x == 0`.
    Left,
    /// `x == grid.width - 1`.
    Right,
}

/// The candidate start offsets `setup_balancer_ends` allocated for one edge: either a
/// single fixed placement with no selector variable at all (the edge's lane count
/// exactly fills the grid height, so there is only one possible offset, `0`), or one
/// selector literal per candidate offset with exactly one true.
#[derive(Debug, Clone)]
pub enum OffsetSet {
    /// The only possible offset, with no cardinality gadget allocated for it —
    /// mirrors the source's `len(offsets) == 0` branch.
    Fixed(usize),
    /// `(offset, selector literal)` pairs, exactly one of which is true.
    Candidates(Vec<(usize, Literal)>),
}

impl OffsetSet {
    /// `None` if offset `k` isn't a candidate at all; `Some(None)` if `k` is the
    /// fixed placement (always true, no literal); `Some(Some(lit))` if true exactly
    /// when `lit` holds.
    fn literal_for(&self, k: usize) -> Option<Option<Literal>> {
        match self {
            OffsetSet::Fixed(fixed) => (*fixed == k).then_some(None),
            OffsetSet::Candidates(cands) => cands.iter().find(|&&(o, _)| o == k).map(|&(_, l)| Some(l)),
        }
    }
}

/// The per-cell clauses pinning a single edge lane cell: a plain belt facing east
/// (`input_direction[0]` and `output_direction[0]` both set — a straight
/// west-to-east belt per this crate's direction convention, not a splitter or
/// underground), colour pinned only when the caller names one (`None` leaves the
/// colour unconstrained, for a lane whose partner inside the network is itself a
/// don't-care).
fn lane_clauses(
    tile: &TileInstance,
    template: &TileTemplate,
    colour: Option<Option<u64>>,
) -> Result<Vec<crate::bits::Clause>, NetworkError> {
    let input_dir = field(tile, template, "input_direction")?;
    let output_dir = field(tile, template, "output_direction")?;
    let is_splitter = field(tile, template, "is_splitter")?;
    let underground = field(tile, template, "underground")?;

    let mut clauses = Vec::new();
    match colour {
        Some(lane_colour) => {
            clauses.push(vec![input_dir[0]]); // east
            clauses.push(vec![output_dir[0]]); // east
            for (i, &lit) in input_dir.iter().enumerate() {
                if i != 0 {
                    clauses.push(vec![-lit]);
                }
            }
            for (i, &lit) in output_dir.iter().enumerate() {
                if i != 0 {
                    clauses.push(vec![-lit]);
                }
            }
            for &lit in &is_splitter {
                clauses.push(vec![-lit]);
            }
            for &lit in &underground {
                clauses.push(vec![-lit]);
            }
            if let Some(c) = lane_colour {
                let colour_lits = field(tile, template, "colour")?;
                clauses.extend(set_number_r(c, &colour_lits)?);
            }
        },
        None => {
            for &lit in input_dir.iter().chain(output_dir.iter()).chain(is_splitter.iter()).chain(underground.iter()) {
                clauses.push(vec![-lit]);
            }
        },
    }
    Ok(clauses)
}

/// Lay out a balancer's external lanes on one edge column: a contiguous run of
/// `lane_colours.len()` belt cells, each pinned to its lane's colour (or left
/// unconstrained if that lane's colour is `None`), at one of the candidate vertical
/// offsets (exactly one holds), with every other cell on that column forced empty.
/// Grounded on `belt_balancer.py`'s `setup_balancer_ends`.
pub fn setup_balancer_ends(grid: &mut Grid, side: Side, lane_colours: &[Option<u64>]) -> Result<OffsetSet, NetworkError> {
    let template = grid.template.clone();
    let height = grid.height;
    let lanes = lane_colours.len();
    if lanes > height {
        return Err(NetworkError::LaneCountExceedsHeight { lanes, height });
    }
    let x = match side {
        Side::Left => 0,
        Side::Right => grid.width.saturating_sub(1),
    };

    if lanes == height {
        for y in 0..height {
            let tile = grid.get_tile_instance(x, y);
            let clauses = lane_clauses(&tile, &template, Some(lane_colours[y]))?;
            grid.push_clauses("network::setup_balancer_ends", clauses);
        }
        return Ok(OffsetSet::Fixed(0));
    }

    let candidate_count = height - lanes;
    let offsets: Vec<Literal> = (0..candidate_count).map(|_| grid.allocate_variable()).collect();
    let exactly_one = crate::cardinality::quadratic_exactly_one(&offsets)?;
    grid.push_clauses("network::setup_balancer_ends_offset", exactly_one);

    for (k, &offset_lit) in offsets.iter().enumerate() {
        let mut consequences = Vec::new();
        for y in 0..height {
            let colour = if y >= k && y < k + lanes { Some(lane_colours[y - k]) } else { None };
            let tile = grid.get_tile_instance(x, y);
            consequences.extend(lane_clauses(&tile, &template, colour)?);
        }
        let clauses = implies(&[offset_lit], &consequences);
        grid.push_clauses("network::setup_balancer_ends", clauses);
    }

    Ok(OffsetSet::Candidates(offsets.into_iter().enumerate().collect()))
}

/// `--aligned`: tie a balancer's input and output edge offsets together so that the
/// lane ranges `[start, start+I)` and `[end, end+O)` overlap rather than drift
/// independently. When `I >= O`, every start offset `k` requires the end offset to
/// lie in `[k, k + (I - O)]`; when `O > I`, the symmetric relation holds. A `Fixed`
/// side (no slack) trivially satisfies every disjunct it appears in.
pub fn align_offsets(grid: &mut Grid, start: &OffsetSet, end: &OffsetSet, input_lanes: usize, output_lanes: usize) {
    let slack = input_lanes.abs_diff(output_lanes);

    let start_offsets: Vec<usize> = match start {
        OffsetSet::Fixed(k) => vec![*k],
        OffsetSet::Candidates(cands) => cands.iter().map(|&(k, _)| k).collect(),
    };

    for &k in &start_offsets {
        let Some(start_cond) = start.literal_for(k) else { continue };
        let allowed_end: Vec<usize> =
            if input_lanes >= output_lanes { (k..=(k + slack)).collect() } else { (k.saturating_sub(slack)..=k).collect() };

        let mut disjunction = Vec::new();
        let mut trivially_satisfied = false;
        for &e in &allowed_end {
            match end.literal_for(e) {
                Some(None) => {
                    trivially_satisfied = true;
                    break;
                },
                Some(Some(lit)) => disjunction.push(lit),
                None => {},
            }
        }
        if trivially_satisfied {
            continue;
        }

        match start_cond {
            // `start` is the fixed, variable-free placement: the constraint holds
            // unconditionally, and an empty disjunction correctly renders the grid
            // unsatisfiable (no end offset can ever align with it).
            None => grid.push_clauses("network::align_offsets", vec![disjunction]),
            Some(lit) => {
                let clauses = implies(&[lit], &[disjunction]);
                grid.push_clauses("network::align_offsets", clauses);
            },
        }
    }
}

/// Require every "edge input splitter" ([`Network::edge_input_splitters`]) to land
/// on the second column from the left, oriented east, and symmetrically every
/// "edge output splitter" on the second column from the right. When some internal
/// wiring recirculates back into the input (resp. out of the output) — see
/// [`Network::recirculate_input`]/[`Network::recirculate_output`] — that many edge
/// splitters are exempted instead of forcing every one of them there. Grounded
/// directly on `belt_balancer.py`'s `enforce_edge_splitters`.
pub fn enforce_edge_splitters(grid: &mut Grid, network: &Network) -> Result<(), NetworkError> {
    enforce_edge_splitters_side(grid, Side::Left, &network.edge_input_splitters(), network.recirculate_input())?;
    enforce_edge_splitters_side(grid, Side::Right, &network.edge_output_splitters(), network.recirculate_output())?;
    Ok(())
}

fn enforce_edge_splitters_side(
    grid: &mut Grid,
    side: Side,
    splitters: &[usize],
    recirculate: usize,
) -> Result<(), NetworkError> {
    if grid.width < 2 || splitters.is_empty() {
        return Ok(());
    }
    let template = grid.template.clone();
    let edge_x = match side {
        Side::Left => 1,
        Side::Right => grid.width - 2,
    };
    let (site_force, site_select) = match side {
        Side::Left => ("network::enforce_edge_splitters_input_force", "network::enforce_edge_splitters_input_select"),
        Side::Right => ("network::enforce_edge_splitters_output_force", "network::enforce_edge_splitters_output_select"),
    };

    if recirculate == 0 {
        // No recirculation: every edge-exposed splitter must sit in the edge
        // column, oriented straight through.
        for &i in splitters {
            let mut node_bits = Vec::with_capacity(grid.height);
            for y in 0..grid.height {
                let tile = grid.get_tile_instance(edge_x, y);
                node_bits.push(field(&tile, &template, "node")?[i]);
            }
            grid.push_clauses(site_force, vec![node_bits]);
            for y in 0..grid.height {
                let tile = grid.get_tile_instance(edge_x, y);
                let node_lit = field(&tile, &template, "node")?[i];
                let input_dir = field(&tile, &template, "input_direction")?;
                let output_dir = field(&tile, &template, "output_direction")?;
                let clauses = implies(&[node_lit], &[vec![input_dir[0]], vec![output_dir[0]]]);
                grid.push_clauses(site_force, clauses);
            }
        }
        return Ok(());
    }

    // Some internal wiring recirculates; only `splitters.len() - recirculate` of
    // the edge-exposed splitters need to land in the edge column.
    let edge_splitter_min = splitters.len().saturating_sub(recirculate);
    if edge_splitter_min == 0 {
        return Ok(());
    }
    let mut selectors = Vec::with_capacity(splitters.len());
    for &i in splitters {
        let mut node_bits = Vec::with_capacity(grid.height);
        for y in 0..grid.height {
            let tile = grid.get_tile_instance(edge_x, y);
            node_bits.push(field(&tile, &template, "node")?[i]);
        }
        let selector = grid.allocate_variable();
        let clauses = implies(&[selector], &[node_bits]);
        grid.push_clauses(site_select, clauses);
        selectors.push(selector);
    }
    let clauses = adder_greater_equal(&selectors, edge_splitter_min, &mut grid.allocator());
    grid.push_clauses(site_select, clauses);
    Ok(())
}

/// Read a node's input colours `(lane0, lane1)` and output colours `(lane0, lane1)`
/// out of a decoded [`crate::grid::Solution`], for summarising a solved balancer —
/// both lanes are `node` one-hot matches combined with the direction the
/// corresponding field picked. Returns `None` for a lane with no resolvable colour.
pub fn get_input_output_colours(
    solution: &crate::grid::Solution,
    template: &TileTemplate,
    node_index: usize,
) -> Option<([Option<i64>; 2], [Option<i64>; 2])> {
    let mut inputs = [None; 2];
    let mut outputs = [None; 2];
    let mut found_input = 0usize;
    let mut found_output = 0usize;

    for x in 0..solution.width() {
        for y in 0..solution.height() {
            let record = solution.get(x, y);
            let crate::template::ParsedValue::OneHot(Some(node)) =
                record.field(template, "node").cloned().unwrap_or(crate::template::ParsedValue::OneHot(None))
            else {
                continue;
            };
            if node != node_index {
                continue;
            }
            let crate::template::ParsedValue::Num(colour) =
                record.field(template, "colour").cloned().unwrap_or(crate::template::ParsedValue::Num(0))
            else {
                continue;
            };
            if let Some(crate::template::ParsedValue::OneHot(Some(_))) = record.field(template, "input_direction") {
                if found_input < 2 {
                    inputs[found_input] = Some(colour);
                    found_input += 1;
                }
            }
            if let Some(crate::template::ParsedValue::OneHot(Some(_))) = record.field(template, "output_direction") {
                if found_output < 2 {
                    outputs[found_output] = Some(colour);
                    found_output += 1;
                }
            }
        }
    }

    Some((inputs, outputs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{EdgeMode, Grid};

    #[test]
    fn network_json_round_trips_null_as_none() {
        let doc = r#"[[[null,1],[0,null]],[[0,null],[null,0]]]"#;
        let network: Network = serde_json::from_str(doc).unwrap();
        assert_eq!(network.nodes[0].inputs, [None, Some(1)]);
        assert_eq!(network.nodes[1].outputs, [None, Some(0)]);

        let reencoded = serde_json::to_string(&network).unwrap();
        let round_tripped: Network = serde_json::from_str(&reencoded).unwrap();
        assert_eq!(network, round_tripped);
    }

    #[test]
    fn validate_rejects_more_than_one_dont_care_lane() {
        let network = Network { nodes: vec![SplitterNode { inputs: [None, None], outputs: [Some(1), Some(2)] }] };
        assert!(matches!(network.validate(), Err(NetworkError::TooManyDontCares(0))));
    }

    #[test]
    fn validate_accepts_a_single_dont_care_lane() {
        let network = Network { nodes: vec![SplitterNode { inputs: [None, Some(1)], outputs: [Some(0), Some(1)] }] };
        assert!(network.validate().is_ok());
    }

    #[test]
    fn referenced_colours_is_sorted_and_deduplicated() {
        let network = Network {
            nodes: vec![
                SplitterNode { inputs: [Some(2), Some(0)], outputs: [None, Some(1)] },
                SplitterNode { inputs: [None, None], outputs: [Some(0), None] },
            ],
        };
        assert_eq!(network.referenced_colours(), vec![0, 1, 2]);
    }

    #[test]
    fn network_template_adds_a_node_field_on_top_of_core_template() {
        let template = network_template(1, 3).unwrap();
        let base_size = core_template(1).unwrap().size;
        assert_eq!(template.size, base_size + 3);
        assert!(template.field_names().any(|f| f == "node"));
    }

    #[test]
    fn create_balancer_rejects_invalid_networks() {
        let template = network_template(2, 1).unwrap();
        let mut grid = Grid::new(template, 2, 2).unwrap();
        let network = Network { nodes: vec![SplitterNode { inputs: [None, None], outputs: [None, Some(1)] }] };
        let edge = EdgeAxisModes::uniform(EdgeMode::Block);
        assert!(create_balancer(&mut grid, &network, edge).is_err());
    }

    #[test]
    fn create_balancer_on_a_single_node_network_adds_clauses() {
        let template = network_template(2, 1).unwrap();
        let mut grid = Grid::new(template, 3, 2).unwrap();
        let network = Network { nodes: vec![SplitterNode { inputs: [Some(1), Some(1)], outputs: [Some(1), Some(1)] }] };
        let edge = EdgeAxisModes::uniform(EdgeMode::Block);
        create_balancer(&mut grid, &network, edge).unwrap();
        assert!(!grid.clauses().is_empty());
    }

    #[test]
    fn enforce_edge_splitters_with_no_edge_splitters_adds_nothing() {
        let template = network_template(2, 1).unwrap();
        let mut grid = Grid::new(template, 2, 1).unwrap();
        let network = Network { nodes: vec![SplitterNode { inputs: [Some(2), Some(2)], outputs: [Some(2), Some(2)] }] };
        enforce_edge_splitters(&mut grid, &network).unwrap();
        assert!(grid.clauses().is_empty());
    }

    #[test]
    fn enforce_edge_splitters_with_a_fully_external_node_adds_constraints() {
        let template = network_template(1, 1).unwrap();
        let mut grid = Grid::new(template, 3, 2).unwrap();
        let network = Network { nodes: vec![SplitterNode { inputs: [Some(0), Some(0)], outputs: [Some(1), Some(1)] }] };
        enforce_edge_splitters(&mut grid, &network).unwrap();
        assert!(!grid.clauses().is_empty());
    }

    #[test]
    fn enforce_edge_splitters_exempts_recirculating_splitters() {
        // Two edge input splitters, one of which also recirculates (an internal
        // wire is tagged with the network input colour on its output side) -- only
        // `2 - 1 = 1` of them need land in the edge column, so the adder-based
        // threshold path runs rather than the unconditional force.
        let template = network_template(2, 3).unwrap();
        let mut grid = Grid::new(template, 4, 2).unwrap();
        let network = Network {
            nodes: vec![
                SplitterNode { inputs: [Some(0), Some(0)], outputs: [Some(2), Some(2)] },
                SplitterNode { inputs: [Some(0), Some(0)], outputs: [Some(0), Some(2)] },
                SplitterNode { inputs: [Some(2), Some(2)], outputs: [Some(2), Some(2)] },
            ],
        };
        assert_eq!(network.edge_input_splitters(), vec![0, 1]);
        assert_eq!(network.recirculate_input(), 1);
        enforce_edge_splitters(&mut grid, &network).unwrap();
        assert!(!grid.clauses().is_empty());
    }

    #[test]
    fn external_lane_counts_counts_none_slots() {
        let network = Network {
            nodes: vec![
                SplitterNode { inputs: [None, Some(1)], outputs: [Some(0), None] },
                SplitterNode { inputs: [Some(0), None], outputs: [None, None] },
            ],
        };
        assert_eq!(network.external_lane_counts(), (2, 3));
    }

    #[test]
    fn edge_input_splitters_requires_both_lanes_pinned_to_the_input_colour() {
        let network = Network {
            nodes: vec![
                // Both inputs pinned: an edge input splitter.
                SplitterNode { inputs: [Some(NETWORK_INPUT_COLOUR), Some(NETWORK_INPUT_COLOUR)], outputs: [Some(2), Some(2)] },
                // Only one input pinned: not fully external, so not counted.
                SplitterNode { inputs: [Some(NETWORK_INPUT_COLOUR), Some(3)], outputs: [Some(2), Some(2)] },
                // A `null` lane never matches, even against the reserved colour.
                SplitterNode { inputs: [None, Some(NETWORK_INPUT_COLOUR)], outputs: [Some(2), Some(2)] },
            ],
        };
        assert_eq!(network.edge_input_splitters(), vec![0]);
    }

    #[test]
    fn recirculate_counts_colours_looped_back_onto_the_opposite_port() {
        let network = Network {
            nodes: vec![
                SplitterNode { inputs: [Some(2), Some(2)], outputs: [Some(NETWORK_INPUT_COLOUR), Some(2)] },
                SplitterNode { inputs: [Some(NETWORK_OUTPUT_COLOUR), Some(2)], outputs: [Some(2), Some(2)] },
            ],
        };
        assert_eq!(network.recirculate_input(), 1);
        assert_eq!(network.recirculate_output(), 1);
    }

    #[test]
    fn setup_balancer_ends_with_lanes_matching_height_needs_no_offset_variable() {
        let before = network_template(2, 1).unwrap();
        let mut grid = Grid::new(before, 1, 2).unwrap();
        let offsets = setup_balancer_ends(&mut grid, Side::Left, &[Some(0), Some(1)]).unwrap();
        assert!(matches!(offsets, OffsetSet::Fixed(0)));
    }

    #[test]
    fn setup_balancer_ends_with_slack_allocates_one_selector_per_offset() {
        let template = network_template(2, 1).unwrap();
        let mut grid = Grid::new(template, 1, 4).unwrap();
        let offsets = setup_balancer_ends(&mut grid, Side::Left, &[Some(0), Some(1)]).unwrap();
        match offsets {
            OffsetSet::Candidates(cands) => assert_eq!(cands.len(), 2), // height 4, lanes 2 -> 2 offsets
            OffsetSet::Fixed(_) => panic!("expected candidate offsets"),
        }
        assert!(!grid.clauses().is_empty());
    }

    #[test]
    fn setup_balancer_ends_accepts_unconstrained_lanes() {
        let template = network_template(2, 1).unwrap();
        let mut grid = Grid::new(template, 1, 2).unwrap();
        let offsets = setup_balancer_ends(&mut grid, Side::Left, &[None, Some(1)]).unwrap();
        assert!(matches!(offsets, OffsetSet::Fixed(0)));
    }

    #[test]
    fn setup_balancer_ends_rejects_more_lanes_than_height() {
        let template = network_template(2, 1).unwrap();
        let mut grid = Grid::new(template, 1, 1).unwrap();
        assert!(matches!(
            setup_balancer_ends(&mut grid, Side::Left, &[Some(0), Some(1)]),
            Err(NetworkError::LaneCountExceedsHeight { lanes: 2, height: 1 })
        ));
    }

    #[test]
    fn align_offsets_between_two_fixed_sides_with_no_overlap_forces_unsat() {
        let template = network_template(1, 1).unwrap();
        let mut grid = Grid::new(template, 2, 3).unwrap();
        let start = OffsetSet::Fixed(0);
        let end = OffsetSet::Fixed(2);
        // input_lanes == output_lanes == 3 -> slack 0, so only offset 0 is allowed on
        // the end side; it is fixed at 2, so the alignment clause is unsatisfiable.
        align_offsets(&mut grid, &start, &end, 3, 3);
        assert!(grid.clauses().iter().any(|c| c.is_empty()));
    }
}
