use crate::cli::{self, Stats};
use bnb::{
    config::SolverConfig, constants::KNAPSACK_WORST_BOUND, knapsack::Knapsack,
    knapsack::parse_knapsack, measure_time, problem::Goal, record_time, scheduler::SchedulerType,
    scheduler::Solver, utils::human_duration,
};
use log::{error, info};
use memmap2::Mmap;
use std::{
    error::Error,
    fs::File,
    path::{Path, PathBuf},
    time::Instant,
};

pub fn solve(
    path: PathBuf,
    limit: Option<usize>,
    scheduler: SchedulerType,
    config: SolverConfig,
    no_progress_bar: bool,
    show_search_stats: bool,
) -> Result<(), Box<dyn Error>> {
    let progress = cli::init_logging();

    let start = Instant::now();
    let solver = Solver::<Knapsack>::new(scheduler, config.clone())?;
    info!("Initialized {} solver with {:?}", scheduler, config);

    let mut stats = Stats::new();
    let mut queue = cli::get_problem_input_queue(&path, limit)?;

    // Solve the first file to estimate the remaining runtime
    let Some(first_file) = queue.pop_front() else {
        return Ok(());
    };
    let first_duration = measure_time!({
        solve_file(&first_file, &solver, &mut stats).map_err(|e| {
            error!("Error while solving {:?}: {}", first_file, e);
            e
        })?
    });

    if !queue.is_empty() {
        let pb = if !no_progress_bar && cli::should_use_progress_bar(queue.len(), first_duration) {
            Some(cli::create_progress_bar(&progress, queue.len()))
        } else {
            None
        };

        for path in queue {
            if let Err(e) = solve_file(&path, &solver, &mut stats) {
                stats.errors += 1;
                error!("Error while solving {:?}: {}", path, e);
            }
            if let Some(pb) = &pb {
                pb.inc(1);
            }
        }
        if let Some(pb) = &pb {
            pb.finish_with_message("done");
        }
    }

    stats.print_summary(show_search_stats);
    info!("Total runtime: {}", human_duration(start.elapsed()));

    Ok(())
}

/// Solves a single knapsack instance file and records the outcome.
fn solve_file(
    path: &Path,
    solver: &Solver<Knapsack>,
    stats: &mut Stats,
) -> Result<Option<i64>, Box<dyn Error>> {
    info!("Solving {:?}", path);
    stats.processed += 1;

    let problem = {
        let file = File::open(path)?;
        // SAFETY: instance files are not modified while they are being solved
        let mmap = unsafe { Mmap::map(&file)? };

        record_time!(stats.parse_durations, { parse_knapsack(&mmap)? })
    };
    info!(
        "Instance: {} items, capacity {}",
        problem.num_items(),
        problem.capacity
    );

    let solution = record_time!(stats.solve_durations, {
        solver.solve(&problem, Goal::Maximize, KNAPSACK_WORST_BOUND)?
    });

    let label = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    stats.searches.push((label, solution.stats));

    match solution.value(&problem) {
        Some(value) => {
            stats.solved += 1;
            info!("Optimum {}", value);
            Ok(Some(value))
        }
        None => {
            stats.without_solution += 1;
            info!("No solution");
            Ok(None)
        }
    }
}
