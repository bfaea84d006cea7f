use crate::{generate_problem, Problem, RunManifest};
use anyhow::Context;
use clap::{Parser, Subcommand};
use ctp_core::{solve, SolverConfig};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "ctp")]
#[command(version)]
#[command(about = "Optimal navigation with uncertain roads by value iteration")]
#[command(long_about = "Solves Canadian-Traveller style problems: roads may be open, closed or \
    unknown with a known probability, and unknown roads are revealed on arrival.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Solve a problem file and print the policy
    Solve {
        /// Problem file (JSON)
        #[arg(long)]
        problem: PathBuf,

        /// Solver configuration file (JSON); flags below override it
        #[arg(long)]
        config: Option<PathBuf>,

        /// Maximum number of sweeps
        #[arg(long)]
        max_sweeps: Option<usize>,

        /// Maximum number of unknown edges
        #[arg(long)]
        max_unknown: Option<usize>,

        /// Compute each sweep in parallel from the previous sweep's values
        #[arg(long)]
        parallel: bool,

        /// Print every state, not just the summary
        #[arg(long)]
        print_states: bool,

        /// Write the run manifest and policy here (JSON)
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Write a random connected problem
    Generate {
        /// Number of vertices
        #[arg(long, default_value = "6")]
        vertices: usize,

        /// Edges on top of the spanning path
        #[arg(long, default_value = "3")]
        extra_edges: usize,

        /// Number of unknown edges
        #[arg(long, default_value = "2")]
        unknown: usize,

        /// Random seed
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Output problem file
        #[arg(long)]
        out: PathBuf,
    },
}

pub struct SolveArgs {
    pub problem: PathBuf,
    pub config: Option<PathBuf>,
    pub max_sweeps: Option<usize>,
    pub max_unknown: Option<usize>,
    pub parallel: bool,
    pub print_states: bool,
    pub out: Option<PathBuf>,
}

pub fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Solve {
            problem,
            config,
            max_sweeps,
            max_unknown,
            parallel,
            print_states,
            out,
        } => run_solve_command(SolveArgs {
            problem,
            config,
            max_sweeps,
            max_unknown,
            parallel,
            print_states,
            out,
        }),
        Commands::Generate { vertices, extra_edges, unknown, seed, out } => {
            run_generate_command(vertices, extra_edges, unknown, seed, out)
        }
    }
}

/// File config first, then command-line overrides.
pub fn resolve_config(args: &SolveArgs) -> anyhow::Result<SolverConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str(&json).with_context(|| format!("parsing {}", path.display()))?
        }
        None => SolverConfig::default(),
    };

    if let Some(max_sweeps) = args.max_sweeps {
        config.max_sweeps = max_sweeps;
    }
    if let Some(max_unknown) = args.max_unknown {
        config.max_unknown_edges = max_unknown;
    }
    if args.parallel {
        config.use_parallel = true;
    }
    Ok(config)
}

pub fn run_solve_command(args: SolveArgs) -> anyhow::Result<()> {
    let config = resolve_config(&args)?;
    let problem = Problem::load_from_file(&args.problem)?;
    info!(
        problem = %problem.name,
        vertices = problem.graph.num_vertices(),
        edges = problem.graph.num_edges(),
        unknown = problem.beliefs.len(),
        "loaded problem"
    );

    let mut space = problem
        .build_space(&config)
        .with_context(|| format!("building state space for {}", args.problem.display()))?;
    let report = solve(&mut space, &problem.graph, &config).context("value iteration failed")?;

    println!("CTP value iteration");
    println!("===================");
    println!("Problem: {}", problem.name);
    println!("Start: {}  Goal: {}", problem.start, problem.goal);
    println!("States: {}", space.len());
    println!("Sweeps: {} (converged: {})", report.sweeps, report.converged);

    if let Some(start) = space.initial_state() {
        println!("Start state: {}", space.display(start));
    }

    if args.print_states {
        println!();
        for id in space.ids() {
            println!("{}", space.display(id));
        }
    }

    if let Some(out) = &args.out {
        let manifest = RunManifest::new(&problem, &config, report, &space);
        manifest.save_to_file(out)?;
        info!(path = %out.display(), run_id = %manifest.run_id, "wrote manifest");
    }

    Ok(())
}

pub fn run_generate_command(
    vertices: usize,
    extra_edges: usize,
    unknown: usize,
    seed: u64,
    out: PathBuf,
) -> anyhow::Result<()> {
    let problem = generate_problem(vertices, extra_edges, unknown, seed);
    problem.save_to_file(&out)?;
    println!(
        "Wrote {} ({} vertices, {} edges, {} unknown) to {}",
        problem.name,
        problem.graph.num_vertices(),
        problem.graph.num_edges(),
        problem.beliefs.len(),
        out.display()
    );
    Ok(())
}
