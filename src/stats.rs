use comfy_table::{Cell, ContentArrangement, Table};
use num_format::{Locale, ToFormattedString};

use serde::{Deserialize, Serialize};

/// Counters collected by one thread or rank during a search.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchStats {
    /// Subproblems popped from a task container.
    pub explored: u64,
    /// Subproblems discarded because their relaxed bound could not beat the incumbent.
    pub pruned: u64,
    /// Subproblems classified as infeasible.
    pub infeasible: u64,
    /// Fully feasible subproblems evaluated.
    pub full: u64,
    /// Subproblems that were split into children.
    pub branched: u64,
    /// Times the incumbent improved.
    pub improvements: u64,
    /// Messages sent to other ranks.
    pub messages: u64,
    /// Subproblems handed to other workers.
    pub transferred: u64,
    /// Work requests issued to peers or the coordinator.
    pub requests: u64,
    /// Largest task container observed.
    pub max_frontier: u64,
}

impl SearchStats {
    pub fn merge(&mut self, other: &SearchStats) {
        self.explored += other.explored;
        self.pruned += other.pruned;
        self.infeasible += other.infeasible;
        self.full += other.full;
        self.branched += other.branched;
        self.improvements += other.improvements;
        self.messages += other.messages;
        self.transferred += other.transferred;
        self.requests += other.requests;
        self.max_frontier = self.max_frontier.max(other.max_frontier);
    }

    #[inline(always)]
    pub fn observe_frontier(&mut self, len: usize) {
        self.max_frontier = self.max_frontier.max(len as u64);
    }
}

/// Renders one row per labelled stats entry plus a total row.
pub fn stats_table<'a>(rows: impl IntoIterator<Item = (String, &'a SearchStats)>) -> Table {
    let fmt = |n: u64| n.to_formatted_string(&Locale::en);

    let mut table = Table::new();
    table
        .load_preset(comfy_table::presets::UTF8_HORIZONTAL_ONLY)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            "Run", "Explored", "Pruned", "Infeasible", "Full", "Branched", "Improved", "Messages",
            "Transferred",
        ]);

    let mut total = SearchStats::default();
    let mut num_rows = 0;
    for (label, stats) in rows {
        total.merge(stats);
        num_rows += 1;
        table.add_row(vec![
            Cell::new(label),
            Cell::new(fmt(stats.explored)),
            Cell::new(fmt(stats.pruned)),
            Cell::new(fmt(stats.infeasible)),
            Cell::new(fmt(stats.full)),
            Cell::new(fmt(stats.branched)),
            Cell::new(fmt(stats.improvements)),
            Cell::new(fmt(stats.messages)),
            Cell::new(fmt(stats.transferred)),
        ]);
    }

    if num_rows > 1 {
        table.add_row(vec![
            Cell::new("Σ"),
            Cell::new(fmt(total.explored)),
            Cell::new(fmt(total.pruned)),
            Cell::new(fmt(total.infeasible)),
            Cell::new(fmt(total.full)),
            Cell::new(fmt(total.branched)),
            Cell::new(fmt(total.improvements)),
            Cell::new(fmt(total.messages)),
            Cell::new(fmt(total.transferred)),
        ]);
    }

    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_sums_and_keeps_max_frontier() {
        let mut a = SearchStats {
            explored: 10,
            pruned: 2,
            max_frontier: 7,
            ..Default::default()
        };
        let b = SearchStats {
            explored: 5,
            messages: 3,
            max_frontier: 4,
            ..Default::default()
        };
        a.merge(&b);

        assert_eq!(a.explored, 15);
        assert_eq!(a.pruned, 2);
        assert_eq!(a.messages, 3);
        assert_eq!(a.max_frontier, 7);
    }

    #[test]
    fn test_table_has_total_row() {
        let a = SearchStats {
            explored: 1234,
            ..Default::default()
        };
        let b = SearchStats::default();
        let table = stats_table([("rank 0".to_string(), &a), ("rank 1".to_string(), &b)]);
        let rendered = table.to_string();

        assert!(rendered.contains("1,234"), "{}", rendered);
        assert!(rendered.contains("Σ"), "{}", rendered);
    }
}
