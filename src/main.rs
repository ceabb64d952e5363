mod cli;

use bnb::{config::SolverConfig, frontier::Traversal, scheduler::SchedulerType};
use clap::{Parser, Subcommand};
use std::{error::Error, path::PathBuf};

#[derive(Parser, Debug)]
#[command(author, version, about = "Branch-and-bound search on threads and ranks", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Solve a knapsack instance file or every instance in a directory
    Solve {
        #[arg(value_name = "PATH")]
        path: PathBuf,

        /// serial, recursive, rounds, default, priority, master-worker, hybrid or work-stealing
        #[arg(short, long, default_value = "work-stealing")]
        scheduler: SchedulerType,

        /// Number of ranks of the distributed schedulers
        #[arg(short, long, default_value_t = 4)]
        ranks: usize,

        /// Threads per pool, or "auto" for all available cores
        #[arg(short, long, default_value = "auto", value_parser = parse_num_threads)]
        threads: usize,

        /// dfs, bfs or auto
        #[arg(long, default_value = "dfs")]
        traversal: Traversal,

        /// A subproblem converges once its bounds are at most this far apart
        #[arg(long, default_value_t = 0.0)]
        epsilon: f64,

        /// Search iterations between two contacts with other ranks
        #[arg(long, default_value_t = 64)]
        comm_frequency: usize,

        /// Maximum number of subproblems per transfer
        #[arg(long, default_value_t = 8)]
        package_size: usize,

        /// Bound rounds between two termination checks of the work-stealing scheduler
        #[arg(long, default_value_t = 4)]
        termination_check: usize,

        /// Share of its queue a work-stealing victim hands over
        #[arg(long, default_value_t = 0.5)]
        steal_fraction: f64,

        /// Stop after this many files
        #[arg(short, long)]
        limit: Option<usize>,

        #[arg(long)]
        no_progress_bar: bool,

        /// Print a table of search counters per instance
        #[arg(long)]
        stats: bool,
    },
    /// Print a random knapsack instance
    Generate {
        #[arg(value_name = "ITEMS")]
        num_items: usize,

        #[arg(long)]
        seed: Option<u64>,
    },
}

fn parse_num_threads(s: &str) -> Result<usize, String> {
    if s == "auto" {
        Ok(std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1))
    } else {
        s.parse::<usize>()
            .map_err(|_| format!("Invalid number of threads: {}", s))
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    match Args::parse().command {
        Command::Solve {
            path,
            scheduler,
            ranks,
            threads,
            traversal,
            epsilon,
            comm_frequency,
            package_size,
            termination_check,
            steal_fraction,
            limit,
            no_progress_bar,
            stats,
        } => {
            let config = SolverConfig::default()
                .with_ranks(ranks)
                .with_threads(threads)
                .with_traversal(traversal)
                .with_epsilon(epsilon)
                .with_communication_frequency(comm_frequency)
                .with_max_package_size(package_size)
                .with_termination_check_frequency(termination_check)
                .with_steal_fraction(steal_fraction);
            cli::solve::solve(path, limit, scheduler, config, no_progress_bar, stats)
        }
        Command::Generate { num_items, seed } => cli::generate::generate(num_items, seed),
    }
}
