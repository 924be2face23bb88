//! Belt balancer CLI
//!
//! Compiles a splitter [`Network`] onto a `width * height` grid and enumerates
//! satisfying layouts, one JSON object per line on stdout. Argument order and flag
//! names mirror the source's `belt_balancer.py` `argparse` block: `network`,
//! `width` and `height` are positional, everything else is an optional flag.
//!
//! ```text
//! belt_balancer network.json 8 4 \
//!     [--edge-splitters] [--aligned] [--underground-length 4] \
//!     [--all] [--solver g3]
//! ```

#![forbid(unsafe_code)]

use std::path::PathBuf;

use beltsat::errors::UsageError;
use beltsat::grid::{EdgeAxisModes, EdgeMode, Grid};
use beltsat::layout;
use beltsat::network::{self, Network, Side};
use tracing::info;

struct Args {
    network_path: PathBuf,
    width: usize,
    height: usize,
    edge_splitters: bool,
    aligned: bool,
    underground_length: usize,
    all: bool,
    solver: String,
}

fn parse_usize(flag: &'static str, value: &str) -> Result<usize, UsageError> {
    value.parse().map_err(|_| UsageError::InvalidFlagValue {
        flag: flag.to_string(),
        value: value.to_string(),
        reason: "expected a non-negative integer".to_string(),
    })
}

fn parse_args(raw: &[String]) -> Result<Args, UsageError> {
    let mut positionals = Vec::new();
    let mut edge_splitters = false;
    let mut aligned = false;
    let mut all = false;
    let mut underground_length = 4usize;
    let mut solver = "g3".to_string();

    let mut it = raw.iter();
    while let Some(a) = it.next() {
        match a.as_str() {
            "--edge-splitters" => edge_splitters = true,
            "--aligned" => aligned = true,
            "--all" => all = true,
            "--underground-length" => {
                let v = it.next().ok_or(UsageError::FlagNeedsValue { flag: "underground-length".to_string() })?;
                underground_length = parse_usize("underground-length", v)?;
            },
            "--solver" => {
                let v = it.next().ok_or(UsageError::FlagNeedsValue { flag: "solver".to_string() })?;
                solver = v.clone();
            },
            other if other.starts_with("--") => return Err(UsageError::UnknownFlag(other.to_string())),
            other => positionals.push(other.to_string()),
        }
    }

    if positionals.is_empty() {
        return Err(UsageError::MissingArgument("network"));
    }
    if positionals.len() < 2 {
        return Err(UsageError::MissingArgument("width"));
    }
    if positionals.len() < 3 {
        return Err(UsageError::MissingArgument("height"));
    }

    let network_path = PathBuf::from(&positionals[0]);
    let width = parse_usize("width", &positionals[1])?;
    let height = parse_usize("height", &positionals[2])?;
    if width == 0 {
        return Err(UsageError::MissingArgument("width"));
    }
    if height == 0 {
        return Err(UsageError::MissingArgument("height"));
    }

    Ok(Args { network_path, width, height, edge_splitters, aligned, underground_length, all, solver })
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "belt_balancer=info".into()))
        .with_target(false)
        .compact()
        .init();
}

fn load_network(path: &PathBuf) -> Result<Network, UsageError> {
    let text = std::fs::read_to_string(path).map_err(|source| UsageError::Io { path: path.clone(), source })?;
    let network: Network =
        serde_json::from_str(&text).map_err(|source| UsageError::NetworkJson { path: path.clone(), source })?;
    network.validate()?;
    Ok(network)
}

fn run() -> anyhow::Result<()> {
    init_tracing();

    let raw: Vec<String> = std::env::args().skip(1).collect();
    let args = parse_args(&raw)?;

    let network = load_network(&args.network_path)?;
    info!(nodes = network.nodes.len(), width = args.width, height = args.height, "compiling balancer");

    // `network::NETWORK_INPUT_COLOUR`/`NETWORK_OUTPUT_COLOUR` are pinned onto the
    // grid's edge lanes below even when a network never references them itself, so
    // the colour domain must be wide enough to hold them and the prevent_colour
    // gating below must not forbid them.
    let mut referenced = network.referenced_colours();
    referenced.push(network::NETWORK_INPUT_COLOUR);
    referenced.push(network::NETWORK_OUTPUT_COLOUR);
    referenced.sort_unstable();
    referenced.dedup();
    let max_colour = referenced.iter().copied().max().unwrap_or(0);
    let template = network::network_template(max_colour, network.nodes.len())?;
    let mut grid = Grid::new(template, args.width, args.height)?;

    // The source pins the x axis open (so an edge lane may feed straight off the
    // grid) and the y axis blocked (no belt may run off the top or bottom).
    let edge = EdgeAxisModes { x: EdgeMode::Ignore, y: EdgeMode::Block };

    layout::well_formed(&mut grid);
    layout::prevent_intersection(&mut grid, edge);
    layout::prevent_bad_undergrounding(&mut grid);
    if args.underground_length > 0 {
        layout::set_maximum_underground_length(&mut grid, args.underground_length, edge);
        layout::prevent_empty_along_underground(&mut grid, args.underground_length, edge);
    }
    layout::prevent_small_loops(&mut grid, layout::LayoutConfig::default());
    layout::prevent_bad_colouring(&mut grid, edge);
    for c in 0..=max_colour {
        if !referenced.contains(&c) {
            layout::prevent_colour(&mut grid, c as u64);
        }
    }

    network::create_balancer(&mut grid, &network, edge)?;
    if args.edge_splitters {
        network::enforce_edge_splitters(&mut grid, &network)?;
    }

    // Every external lane on a side shares the same network-wide colour (see
    // DESIGN.md / `network::NETWORK_INPUT_COLOUR`).
    let (input_lanes, output_lanes) = network.external_lane_counts();
    let input_colours: Vec<Option<u64>> = vec![Some(network::NETWORK_INPUT_COLOUR as u64); input_lanes];
    let output_colours: Vec<Option<u64>> = vec![Some(network::NETWORK_OUTPUT_COLOUR as u64); output_lanes];
    let start = network::setup_balancer_ends(&mut grid, Side::Left, &input_colours)?;
    let end = network::setup_balancer_ends(&mut grid, Side::Right, &output_colours)?;
    if args.aligned {
        network::align_offsets(&mut grid, &start, &end, input_lanes, output_lanes);
    }

    info!(clauses = grid.clauses().len(), variables = grid.total_variables(), "starting search");

    let important_variables: Vec<beltsat::Literal> = grid
        .iterate_tiles()
        .flat_map(|tile| tile.literals(&grid.template, "node").unwrap_or_default())
        .collect();

    let mut found = 0usize;
    for solution in grid.itersolve(&important_variables, &args.solver)? {
        let solution = solution?;
        println!("{}", serde_json::to_string(&solution.to_json(&grid.template))?);
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
        eprintln!("belt_balancer: {err}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_args_rejects_missing_network_argument() {
        let raw: Vec<String> = vec![];
        assert!(matches!(parse_args(&raw), Err(UsageError::MissingArgument("network"))));
    }

    #[test]
    fn parse_args_rejects_missing_height_argument() {
        let raw = vec!["n.json".to_string(), "4".to_string()];
        assert!(matches!(parse_args(&raw), Err(UsageError::MissingArgument("height"))));
    }

    #[test]
    fn parse_args_rejects_unknown_flag() {
        let raw = vec!["n.json".to_string(), "2".to_string(), "2".to_string(), "--bogus".to_string()];
        assert!(parse_args(&raw).is_err());
    }

    #[test]
    fn parse_args_accepts_a_minimal_valid_invocation() {
        let raw = vec!["n.json".to_string(), "3".to_string(), "2".to_string()];
        let args = parse_args(&raw).unwrap();
        assert_eq!(args.width, 3);
        assert_eq!(args.height, 2);
        assert_eq!(args.solver, "g3");
        assert_eq!(args.underground_length, 4);
        assert!(!args.edge_splitters);
        assert!(!args.aligned);
        assert!(!args.all);
    }

    #[test]
    fn parse_args_accepts_flags_in_any_position() {
        let raw = vec![
            "--edge-splitters".to_string(),
            "n.json".to_string(),
            "3".to_string(),
            "--aligned".to_string(),
            "2".to_string(),
            "--solver".to_string(),
            "splr".to_string(),
        ];
        let args = parse_args(&raw).unwrap();
        assert_eq!(args.network_path, PathBuf::from("n.json"));
        assert_eq!(args.width, 3);
        assert_eq!(args.height, 2);
        assert!(args.edge_splitters);
        assert!(args.aligned);
        assert_eq!(args.solver, "splr");
    }
}
