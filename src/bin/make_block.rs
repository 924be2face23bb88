//! Single-tile layout generator CLI
//!
//! Builds a `width * height` grid of bare layout constraints (no splitter network
//! bolted on, splitters forbidden outright) and enumerates satisfying layouts.
//! Mirrors the source's `make_block.py` `argparse` block: `width`/`height` are
//! positional, a loop-free default, `--allow-empty` to admit the all-empty layout,
//! and `--single-loop` to instead require the grid to encode one single belt cycle
//! touching every cell (anchored at the origin so rotations of the same cycle
//! aren't enumerated as distinct solutions).
//!
//! ```text
//! make_block 4 4 [--tile] [--underground-length 4] [--allow-empty] \
//!     [--single-loop] [--all] [--label NAME] [--solver g3] [--output PATH]
//! ```

#![forbid(unsafe_code)]

use std::io::Write;
use std::path::PathBuf;

use beltsat::errors::UsageError;
use beltsat::grid::{EdgeAxisModes, EdgeMode, Grid};
use beltsat::layout;
use tracing::info;

struct Args {
    width: usize,
    height: usize,
    edge_mode: EdgeMode,
    underground_length: usize,
    allow_empty: bool,
    single_loop: bool,
    all: bool,
    label: Option<String>,
    solver: String,
    output: Option<PathBuf>,
}

/// `true` iff `n` is a positive power of two, the shape `--single-loop` needs so the
/// single cycle can anchor without a parity mismatch.
fn is_power_of_two(n: usize) -> bool {
    n > 0 && (n & (n - 1)) == 0
}

fn parse_args(raw: &[String]) -> Result<Args, UsageError> {
    let mut positionals = Vec::new();
    let mut tile = false;
    let mut allow_empty = false;
    let mut single_loop = false;
    let mut all = false;
    let mut label = None;
    let mut solver = "g3".to_string();
    let mut output = None;
    let mut underground_length = 4usize;

    let mut it = raw.iter();
    while let Some(a) = it.next() {
        match a.as_str() {
            "--tile" => tile = true,
            "--allow-empty" => allow_empty = true,
            "--single-loop" => single_loop = true,
            "--all" => all = true,
            "--label" => {
                let v = it.next().ok_or(UsageError::FlagNeedsValue { flag: "label".to_string() })?;
                label = Some(v.clone());
            },
            "--solver" => {
                let v = it.next().ok_or(UsageError::FlagNeedsValue { flag: "solver".to_string() })?;
                solver = v.clone();
            },
            "--output" => {
                let v = it.next().ok_or(UsageError::FlagNeedsValue { flag: "output".to_string() })?;
                output = Some(PathBuf::from(v));
            },
            "--underground-length" => {
                let v = it.next().ok_or(UsageError::FlagNeedsValue { flag: "underground-length".to_string() })?;
                let signed: i64 = v.parse().map_err(|_| UsageError::InvalidFlagValue {
                    flag: "underground-length".to_string(),
                    value: v.clone(),
                    reason: "expected an integer".to_string(),
                })?;
                if signed < 0 {
                    return Err(UsageError::NegativeUndergroundLength(signed));
                }
                underground_length = signed as usize;
            },
            other if other.starts_with("--") => return Err(UsageError::UnknownFlag(other.to_string())),
            other => positionals.push(other.to_string()),
        }
    }

    if positionals.is_empty() {
        return Err(UsageError::MissingArgument("width"));
    }
    if positionals.len() < 2 {
        return Err(UsageError::MissingArgument("height"));
    }

    let width = positionals[0].parse().map_err(|_| UsageError::InvalidFlagValue {
        flag: "width".to_string(),
        value: positionals[0].clone(),
        reason: "expected a non-negative integer".to_string(),
    })?;
    let height = positionals[1].parse().map_err(|_| UsageError::InvalidFlagValue {
        flag: "height".to_string(),
        value: positionals[1].clone(),
        reason: "expected a non-negative integer".to_string(),
    })?;
    if width == 0 {
        return Err(UsageError::MissingArgument("width"));
    }
    if height == 0 {
        return Err(UsageError::MissingArgument("height"));
    }

    if allow_empty && single_loop {
        return Err(UsageError::IncompatibleFlags);
    }
    if single_loop {
        let product = width * height;
        if !is_power_of_two(product) {
            return Err(UsageError::SingleLoopRequiresPowerOfTwo { width, height, product });
        }
    }

    // The default edge mode is `Block`; `--tile` switches it to the wraparound
    // `Tile` mode instead.
    let edge_mode = if tile { EdgeMode::Tile } else { EdgeMode::Block };

    Ok(Args { width, height, edge_mode, underground_length, allow_empty, single_loop, all, label, solver, output })
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "make_block=info".into()))
        .with_target(false)
        .compact()
        .init();
}

/// At least one cell must be non-empty, ruling out the trivial all-blank layout
/// unless `--allow-empty` was given.
fn forbid_totally_empty_layout(grid: &mut Grid) {
    let template = grid.template.clone();
    let (width, height) = (grid.width, grid.height);
    let mut disjunction = Vec::new();
    for x in 0..width {
        for y in 0..height {
            let tile = grid.get_tile_instance(x, y);
            disjunction.extend(tile.literals(&template, "all_direction").unwrap_or_default());
            disjunction.extend(tile.literals(&template, "is_splitter").unwrap_or_default());
            disjunction.extend(tile.literals(&template, "underground").unwrap_or_default());
        }
    }
    grid.push_clauses("make_block::forbid_totally_empty_layout", vec![disjunction]);
}

/// Every cell must carry a belt (one of input/output/underground set); no gaps are
/// admitted, matching `--single-loop`'s "the cycle visits every cell" requirement.
fn require_every_cell_occupied(grid: &mut Grid) {
    let template = grid.template.clone();
    let (width, height) = (grid.width, grid.height);
    for x in 0..width {
        for y in 0..height {
            let tile = grid.get_tile_instance(x, y);
            let mut clause = tile.literals(&template, "all_direction").unwrap_or_default();
            clause.extend(tile.literals(&template, "underground").unwrap_or_default());
            grid.push_clauses("make_block::require_every_cell_occupied", vec![clause]);
        }
    }
}

/// No splitters at all: `make_block` only ever produces plain belt layouts.
fn forbid_splitters(grid: &mut Grid) {
    let template = grid.template.clone();
    let (width, height) = (grid.width, grid.height);
    for x in 0..width {
        for y in 0..height {
            let tile = grid.get_tile_instance(x, y);
            let is_splitter = tile.literals(&template, "is_splitter").unwrap_or_default();
            let clauses = is_splitter.into_iter().map(|lit| vec![-lit]).collect::<Vec<_>>();
            grid.push_clauses("make_block::forbid_splitters", clauses);
        }
    }
}

fn run() -> anyhow::Result<()> {
    init_tracing();

    let raw: Vec<String> = std::env::args().skip(1).collect();
    let args = parse_args(&raw)?;

    info!(
        width = args.width,
        height = args.height,
        single_loop = args.single_loop,
        label = args.label.as_deref().unwrap_or(""),
        "building block"
    );

    // Colour only needs enough range to count a single pass around the longest
    // possible cycle; `max_colour` bounds the `colour` field's bit width.
    let max_colour = (args.width * args.height) as u32;
    let template = layout::core_template(max_colour)?;
    let mut grid = Grid::new(template, args.width, args.height)?;
    let edge = EdgeAxisModes::uniform(args.edge_mode);

    layout::well_formed(&mut grid);
    layout::prevent_intersection(&mut grid, edge);
    layout::prevent_bad_undergrounding(&mut grid);
    if args.underground_length > 0 {
        layout::set_maximum_underground_length(&mut grid, args.underground_length, edge);
        layout::prevent_empty_along_underground(&mut grid, args.underground_length, edge);
    }
    layout::prevent_small_loops(&mut grid, layout::LayoutConfig::default());
    forbid_splitters(&mut grid);

    if args.single_loop {
        require_every_cell_occupied(&mut grid);
        layout::colour_propagation(&mut grid, edge);
        layout::pin_colour(&mut grid, 0, 0, 0);
    } else if !args.allow_empty {
        forbid_totally_empty_layout(&mut grid);
    }

    info!(clauses = grid.clauses().len(), variables = grid.total_variables(), "starting search");

    let important_variables: Vec<beltsat::Literal> = grid
        .iterate_tiles()
        .flat_map(|tile| {
            let mut lits = tile.literals(&grid.template, "input_direction").unwrap_or_default();
            lits.extend(tile.literals(&grid.template, "output_direction").unwrap_or_default());
            lits.extend(tile.literals(&grid.template, "underground").unwrap_or_default());
            lits.extend(tile.literals(&grid.template, "is_splitter").unwrap_or_default());
            lits
        })
        .collect();

    let mut out: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(std::fs::File::create(path).map_err(|source| UsageError::Io { path: path.clone(), source })?),
        None => Box::new(std::io::stdout()),
    };

    let mut found = 0usize;
    for solution in grid.itersolve(&important_variables, &args.solver)? {
        let solution = solution?;
        writeln!(out, "{}", serde_json::to_string(&solution.to_json(&grid.template))?)?;
        found += 1;
        if !args.all {
            break;
        }
    }

    info!(found, "search complete");
    Ok(())
}

fn main() {
    if let Err(err) = run() {
        eprintln!("make_block: {err}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_args_rejects_missing_dimensions() {
        let raw: Vec<String> = vec![];
        assert!(matches!(parse_args(&raw), Err(UsageError::MissingArgument("width"))));
    }

    #[test]
    fn parse_args_rejects_allow_empty_with_single_loop() {
        let raw = vec!["2".to_string(), "2".to_string(), "--allow-empty".to_string(), "--single-loop".to_string()];
        assert!(matches!(parse_args(&raw), Err(UsageError::IncompatibleFlags)));
    }

    #[test]
    fn parse_args_rejects_single_loop_on_a_non_power_of_two_board() {
        let raw = vec!["3".to_string(), "3".to_string(), "--single-loop".to_string()];
        assert!(matches!(parse_args(&raw), Err(UsageError::SingleLoopRequiresPowerOfTwo { .. })));
    }

    #[test]
    fn parse_args_accepts_single_loop_on_a_power_of_two_board() {
        let raw = vec!["4".to_string(), "2".to_string(), "--single-loop".to_string()];
        let args = parse_args(&raw).unwrap();
        assert!(args.single_loop);
    }

    #[test]
    fn parse_args_defaults_edge_mode_to_block_and_switches_on_tile() {
        let raw = vec!["2".to_string(), "2".to_string()];
        assert_eq!(parse_args(&raw).unwrap().edge_mode, EdgeMode::Block);

        let raw = vec!["2".to_string(), "2".to_string(), "--tile".to_string()];
        assert_eq!(parse_args(&raw).unwrap().edge_mode, EdgeMode::Tile);
    }

    #[test]
    fn parse_args_rejects_negative_underground_length() {
        let raw = vec!["2".to_string(), "2".to_string(), "--underground-length".to_string(), "-1".to_string()];
        assert!(matches!(parse_args(&raw), Err(UsageError::NegativeUndergroundLength(-1))));
    }

    #[test]
    fn parse_args_captures_label_and_output_path() {
        let raw = vec![
            "2".to_string(),
            "2".to_string(),
            "--label".to_string(),
            "demo".to_string(),
            "--output".to_string(),
            "out.jsonl".to_string(),
        ];
        let args = parse_args(&raw).unwrap();
        assert_eq!(args.label.as_deref(), Some("demo"));
        assert_eq!(args.output, Some(PathBuf::from("out.jsonl")));
    }

    #[test]
    fn is_power_of_two_matches_expected_values() {
        assert!(is_power_of_two(1));
        assert!(is_power_of_two(16));
        assert!(!is_power_of_two(0));
        assert!(!is_power_of_two(6));
    }
}
