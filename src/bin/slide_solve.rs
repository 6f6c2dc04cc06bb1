use std::path::PathBuf;

use clap::Parser;
use slide_search::board::Board;
use slide_search::report::SolveReport;
use slide_search::search::{PathStep, SearchBudget, Solver, SolverConfig};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "slide_solve")]
#[command(about = "Parallel best-first solver for sliding-block puzzles")]
struct Cli {
    /// Board file (`.k` format)
    board: PathBuf,

    /// State budget in Mi states (overrides --memory-mb)
    #[arg(long)]
    states: Option<u64>,

    /// Memory budget in MiB, used when --states is not given
    #[arg(long, default_value_t = 512)]
    memory_mb: u64,

    /// Worker threads (defaults to available parallelism)
    #[arg(long)]
    threads: Option<usize>,

    /// Keep the whole placement for roughly one state in this many
    #[arg(long, default_value_t = 8)]
    full_ratio: u32,

    /// Print the JSON report before and after solving
    #[arg(long)]
    json: bool,
}

fn run(cli: &Cli) -> Result<bool, Box<dyn std::error::Error>> {
    let board = Board::load(&cli.board)?;
    println!(
        "{}: {} pieces {} types {} spaces",
        board.name(),
        board.piece_count(),
        board.types().len(),
        board.free_count()
    );

    let budget = match cli.states {
        Some(mi) => SearchBudget::default()
            .with_full_ratio(cli.full_ratio)
            .resized(mi.saturating_mul(1 << 20)),
        None => {
            SearchBudget::from_memory(cli.memory_mb.saturating_mul(1 << 20), cli.full_ratio)
        }
    };
    let config = match cli.threads {
        Some(n) => SolverConfig::with_threads(n),
        None => SolverConfig::default(),
    };

    let print_report = |steps: &[PathStep]| -> serde_json::Result<()> {
        if cli.json {
            println!("{}\n", SolveReport::new(&board, steps).to_json()?);
        }
        Ok(())
    };

    let solver = Solver::new(&board, budget)?;
    print_report(&[])?;
    let outcome = solver.solve(&config)?;
    let stats = outcome.stats;

    let solved = match outcome.solution {
        Some(handle) => {
            let steps = solver.reconstruct_path(handle)?;
            println!(
                "solved in {} moves ({} states examined, {} unique ({:.1}%), {:.1}s)",
                steps.len(),
                stats.examined,
                stats.unique,
                stats.unique_percent(),
                stats.elapsed.as_secs_f64()
            );
            print_report(&steps)?;
            true
        }
        None => {
            println!("No solution found in {} states", stats.unique);
            false
        }
    };
    solver.teardown();
    Ok(solved)
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(2);
        }
    }
}
