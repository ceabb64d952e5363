use std::time::Duration;

/// Pending-task count above which AUTOMATIC traversal switches from BFS to DFS.
pub const AUTOMATIC_DFS_THRESHOLD: usize = 4096;

/// Minimal runtime after which to show a progress bar instead of simple log messages.
pub const PROGRESS_BAR_THRESHOLD: Duration = Duration::from_millis(500);

/// Worst score used for maximization runs of the bundled knapsack problem.
pub const KNAPSACK_WORST_BOUND: i64 = -1;
