pub mod generate;
pub mod solve;

use std::{
    collections::VecDeque,
    error::Error,
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use bnb::{constants::PROGRESS_BAR_THRESHOLD, stats::SearchStats, utils::human_duration};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use indicatif_log_bridge::LogWrapper;
use log::{info, warn};

/// Initializes `env_logger` (default level `info`) behind a bridge that keeps log lines
/// from tearing progress bars drawn on the returned [`MultiProgress`].
pub fn init_logging() -> MultiProgress {
    let logger = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .build();
    let level = logger.filter();
    let progress = MultiProgress::new();

    if LogWrapper::new(progress.clone(), logger).try_init().is_ok() {
        log::set_max_level(level);
    }
    progress
}

/// Collects the instance files to solve: the file itself, or the files of a directory
/// in name order, at most `limit` of them.
pub fn get_problem_input_queue(
    path: &Path,
    limit: Option<usize>,
) -> Result<VecDeque<PathBuf>, Box<dyn Error>> {
    let mut files = if path.is_file() {
        vec![path.to_path_buf()]
    } else if path.is_dir() {
        let mut entries: Vec<PathBuf> = fs::read_dir(path)?
            .filter_map(Result::ok)
            .map(|e| e.path())
            .filter(|p| p.is_file())
            .collect();
        entries.sort();
        entries
    } else {
        return Err(format!("Path {:?} is not a file or directory", path).into());
    };

    if let Some(limit) = limit {
        files.truncate(limit);
    }
    Ok(files.into())
}

/// Estimates the remaining runtime from the first solve.
pub fn should_use_progress_bar(remaining: usize, first_duration: Duration) -> bool {
    first_duration.saturating_mul(remaining as u32) >= PROGRESS_BAR_THRESHOLD
}

pub fn create_progress_bar(progress: &MultiProgress, len: usize) -> ProgressBar {
    let pb = progress.add(ProgressBar::new(len as u64));
    match ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] {wide_bar:.cyan/blue} {pos}/{len} ({eta}) {msg}",
    ) {
        Ok(style) => pb.set_style(style.progress_chars("=> ")),
        Err(e) => warn!("Falling back to the default progress style: {}", e),
    }
    pb
}

/// Aggregated results of a run over one or more instance files.
#[derive(Debug, Default)]
pub struct Stats {
    pub processed: usize,
    pub solved: usize,
    pub without_solution: usize,
    pub errors: usize,
    pub parse_durations: Vec<Duration>,
    pub solve_durations: Vec<Duration>,
    /// Search counters per instance, labelled by file name.
    pub searches: Vec<(String, SearchStats)>,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn print_summary(&self, show_search_stats: bool) {
        info!(
            "Processed {} file(s): {} solved, {} without solution, {} error(s)",
            self.processed, self.solved, self.without_solution, self.errors
        );
        log_durations("Parse", &self.parse_durations);
        log_durations("Solve", &self.solve_durations);

        if show_search_stats && !self.searches.is_empty() {
            let table = bnb::stats::stats_table(
                self.searches
                    .iter()
                    .map(|(label, stats)| (label.clone(), stats)),
            );
            info!("Search statistics:\n{}", table);
        }
    }
}

fn log_durations(label: &str, durations: &[Duration]) {
    if durations.is_empty() {
        return;
    }

    let mut sorted = durations.to_vec();
    sorted.sort();
    let total: Duration = sorted.iter().sum();
    let median = if sorted.len() % 2 == 1 {
        sorted[sorted.len() / 2]
    } else {
        let hi = sorted.len() / 2;
        (sorted[hi - 1] + sorted[hi]) / 2
    };

    info!(
        "{} time: total {}, avg {}, min {}, median {}, max {}",
        label,
        human_duration(total),
        human_duration(total / sorted.len() as u32),
        human_duration(sorted[0]),
        human_duration(median),
        human_duration(sorted[sorted.len() - 1]),
    );
}
