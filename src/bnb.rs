use log::{debug, trace};

use crate::{
    frontier::{Frontier, TaskDeque, Traversal},
    incumbent::Incumbent,
    problem::{Feasibility, Goal, Problem, Score},
    stats::SearchStats,
};

/// Result of a branch-and-bound run.
pub struct Solution<P: Problem> {
    /// Best fully feasible subproblem, `None` if no subproblem was ever feasible.
    pub subproblem: Option<P::Subproblem>,
    /// Final best bound. Equals the worst bound if nothing feasible was found.
    pub bound: P::Score,
    pub stats: SearchStats,
}

impl<P: Problem> Solution<P> {
    pub fn from_incumbent(incumbent: Incumbent<P>, stats: SearchStats) -> Self {
        Self {
            bound: incumbent.bound(),
            subproblem: incumbent.into_best(),
            stats,
        }
    }

    /// Objective value of the winning subproblem.
    pub fn value(&self, problem: &P) -> Option<P::Score> {
        self.subproblem
            .as_ref()
            .map(|subproblem| problem.contained_upper_bound(subproblem))
    }
}

impl<P: Problem> std::fmt::Debug for Solution<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Solution")
            .field("subproblem", &self.subproblem)
            .field("bound", &self.bound)
            .field("stats", &self.stats)
            .finish()
    }
}

/// Outcome of evaluating one subproblem against a bound.
#[derive(Debug)]
pub enum Evaluation<S, B> {
    /// The relaxed bound cannot beat the current best bound.
    Pruned,
    Infeasible,
    Evaluated {
        /// Objective value if the subproblem is fully feasible.
        full_value: Option<B>,
        /// Children, empty if the bounds have converged.
        children: Vec<S>,
    },
}

impl<S, B> Evaluation<S, B> {
    pub fn record(&self, stats: &mut SearchStats) {
        stats.explored += 1;
        match self {
            Evaluation::Pruned => stats.pruned += 1,
            Evaluation::Infeasible => stats.infeasible += 1,
            Evaluation::Evaluated {
                full_value,
                children,
            } => {
                stats.full += u64::from(full_value.is_some());
                stats.branched += u64::from(!children.is_empty());
            }
        }
    }
}

/// Returns true if the subproblem's relaxed bound cannot beat `best_bound`.
#[inline(always)]
pub fn is_prunable<P: Problem>(
    problem: &P,
    goal: Goal,
    subproblem: &P::Subproblem,
    best_bound: P::Score,
) -> bool {
    !goal.is_better(problem.bounds(subproblem).lower, best_bound)
}

/// Bounds, classifies and, unless converged, splits one subproblem.
///
/// The incumbent is not touched: callers offer `full_value` to whatever holds
/// their best bound, so the same evaluation serves serial, threaded and
/// distributed workers.
pub fn evaluate<P: Problem>(
    problem: &P,
    goal: Goal,
    epsilon: f64,
    subproblem: &P::Subproblem,
    best_bound: P::Score,
) -> Evaluation<P::Subproblem, P::Score> {
    let bounds = problem.bounds(subproblem);
    if !goal.is_better(bounds.lower, best_bound) {
        return Evaluation::Pruned;
    }

    let (full_value, candidate) = match problem.feasibility(subproblem) {
        Feasibility::None => return Evaluation::Infeasible,
        Feasibility::Full => {
            let value = problem.contained_upper_bound(subproblem);
            (Some(value), value)
        }
        Feasibility::Partial => (None, bounds.upper),
    };

    let children = if (candidate.to_f64() - bounds.lower.to_f64()).abs() > epsilon {
        problem.split(subproblem)
    } else {
        Vec::new()
    };

    Evaluation::Evaluated {
        full_value,
        children,
    }
}

/// Single-threaded branch-and-bound.
pub struct BnbSolver<'a, P: Problem> {
    problem: &'a P,
    epsilon: f64,
    pub incumbent: Incumbent<P>,
    pub stats: SearchStats,
}

impl<'a, P: Problem> BnbSolver<'a, P> {
    pub fn new(problem: &'a P, goal: Goal, worst_bound: P::Score, epsilon: f64) -> Self {
        Self::with_incumbent(problem, Incumbent::new(goal, worst_bound), epsilon)
    }

    pub fn with_incumbent(problem: &'a P, incumbent: Incumbent<P>, epsilon: f64) -> Self {
        BnbSolver {
            problem,
            epsilon,
            incumbent,
            stats: SearchStats::default(),
        }
    }

    /// Explores the whole tree below the initial subproblem.
    pub fn solve(mut self, traversal: Traversal) -> Solution<P> {
        let mut frontier = TaskDeque::new(traversal);
        frontier.push(self.problem.initial_subproblem());
        self.drain(&mut frontier);
        Solution::from_incumbent(self.incumbent, self.stats)
    }

    /// Processes subproblems until the frontier is empty.
    pub fn drain<F: Frontier<P::Subproblem> + ?Sized>(&mut self, frontier: &mut F) {
        while let Some(subproblem) = frontier.pop() {
            let children = self.step(&subproblem);
            frontier.extend(children);
            self.stats.observe_frontier(frontier.len());
        }
    }

    /// Evaluates one subproblem, updates the incumbent and returns its children.
    pub fn step(&mut self, subproblem: &P::Subproblem) -> Vec<P::Subproblem> {
        let evaluation = evaluate(
            self.problem,
            self.incumbent.goal(),
            self.epsilon,
            subproblem,
            self.incumbent.bound(),
        );
        evaluation.record(&mut self.stats);

        match evaluation {
            Evaluation::Pruned | Evaluation::Infeasible => {
                trace!("Discarded {:?}", subproblem);
                Vec::new()
            }
            Evaluation::Evaluated {
                full_value,
                children,
            } => {
                if let Some(value) = full_value {
                    if self.incumbent.offer(subproblem, value) {
                        self.stats.improvements += 1;
                        debug!("New incumbent with value {}", value);
                    }
                }
                children
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use serde::{Deserialize, Serialize};

    use super::*;
    use crate::{
        knapsack::{Knapsack, fixture},
        problem::Bounds,
    };

    /// Assignment of rows to distinct columns, minimizing the total cost.
    #[derive(Debug, Clone)]
    pub(crate) struct Assignment {
        pub costs: Vec<Vec<i64>>,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub(crate) struct Partial {
        pub columns: Vec<usize>,
        pub cost: i64,
    }

    impl Assignment {
        /// Costs within a row are distinct (they differ modulo `n`), so row minima and maxima differ.
        pub fn random(n: usize, rng: &mut fastrand::Rng) -> Self {
            let costs = (0..n)
                .map(|_| (0..n).map(|c| rng.i64(1..10) * n as i64 + c as i64).collect())
                .collect();
            Assignment { costs }
        }

        pub fn brute_force(&self) -> i64 {
            let n = self.costs.len();
            let mut best = i64::MAX;
            let mut columns: Vec<usize> = (0..n).collect();
            permute(&mut columns, 0, &mut |perm| {
                let cost = perm.iter().enumerate().map(|(r, &c)| self.costs[r][c]).sum();
                best = best.min(cost);
            });
            best
        }

        fn remaining_rows(&self, partial: &Partial) -> impl Iterator<Item = &Vec<i64>> {
            self.costs[partial.columns.len()..].iter()
        }
    }

    fn permute(items: &mut Vec<usize>, k: usize, visit: &mut impl FnMut(&[usize])) {
        if k == items.len() {
            visit(items);
            return;
        }
        for i in k..items.len() {
            items.swap(k, i);
            permute(items, k + 1, visit);
            items.swap(k, i);
        }
    }

    impl Problem for Assignment {
        type Subproblem = Partial;
        type Score = i64;

        fn initial_subproblem(&self) -> Partial {
            Partial {
                columns: Vec::new(),
                cost: 0,
            }
        }

        fn split(&self, partial: &Partial) -> Vec<Partial> {
            let row = partial.columns.len();
            (0..self.costs.len())
                .filter(|c| !partial.columns.contains(c))
                .map(|c| {
                    let mut child = partial.clone();
                    child.columns.push(c);
                    child.cost += self.costs[row][c];
                    child
                })
                .collect()
        }

        fn feasibility(&self, partial: &Partial) -> Feasibility {
            if partial.columns.len() == self.costs.len() {
                Feasibility::Full
            } else {
                Feasibility::Partial
            }
        }

        fn bounds(&self, partial: &Partial) -> Bounds<i64> {
            let rows = || self.remaining_rows(partial);
            let lower = partial.cost + rows().map(|r| *r.iter().min().unwrap()).sum::<i64>();
            let upper = partial.cost + rows().map(|r| *r.iter().max().unwrap()).sum::<i64>();
            Bounds::new(lower, upper)
        }

        fn contained_upper_bound(&self, partial: &Partial) -> i64 {
            partial.cost
        }
    }

    #[test]
    fn test_knapsack_fixtures() {
        for (capacity, expected) in [(10, 30), (100, 36), (1, 0)] {
            let problem = fixture(capacity);
            for traversal in [Traversal::Dfs, Traversal::Bfs, Traversal::Automatic] {
                let solution = BnbSolver::new(&problem, Goal::Maximize, -1, 0.0).solve(traversal);
                assert_eq!(
                    solution.value(&problem),
                    Some(expected),
                    "capacity {} with {:?}",
                    capacity,
                    traversal
                );
                assert_eq!(solution.bound, expected);
            }
        }
    }

    #[test]
    fn test_pruning_matches_brute_force_knapsack() {
        let mut rng = fastrand::Rng::new();
        println!("Seed: {}", rng.get_seed());

        for _ in 0..30 {
            let problem = Knapsack::random(rng.usize(1..14), &mut rng);
            let expected = problem.brute_force();
            let solution = BnbSolver::new(&problem, Goal::Maximize, -1, 0.0).solve(Traversal::Dfs);
            assert_eq!(
                solution.value(&problem),
                Some(expected),
                "instance:\n{}",
                problem.to_instance_string()
            );
        }
    }

    #[test]
    fn test_pruning_matches_brute_force_assignment() {
        let mut rng = fastrand::Rng::new();
        println!("Seed: {}", rng.get_seed());

        for _ in 0..10 {
            let problem = Assignment::random(rng.usize(2..7), &mut rng);
            let expected = problem.brute_force();
            for traversal in [Traversal::Dfs, Traversal::Bfs] {
                let solution =
                    BnbSolver::new(&problem, Goal::Minimize, i64::MAX, 0.0).solve(traversal);
                assert_eq!(solution.value(&problem), Some(expected), "{:?}", problem.costs);
            }
        }
    }

    #[test]
    fn test_pruning_reduces_work() {
        let mut rng = fastrand::Rng::with_seed(7);
        let problem = Knapsack::random(20, &mut rng);
        let solution = BnbSolver::new(&problem, Goal::Maximize, -1, 0.0).solve(Traversal::Dfs);

        assert!(solution.stats.pruned > 0);
        assert!(solution.stats.explored < 1 << 21, "{:?}", solution.stats);
        assert!(solution.stats.improvements >= 1);
    }

    #[test]
    fn test_no_feasible_subproblem_keeps_worst_bound() {
        // The worst bound already beats everything reachable => root is pruned
        let problem = fixture(10);
        let solution = BnbSolver::new(&problem, Goal::Maximize, 1000, 0.0).solve(Traversal::Dfs);

        assert!(solution.subproblem.is_none());
        assert_eq!(solution.bound, 1000);
        assert_eq!(solution.stats.pruned, 1);
    }

    #[test]
    fn test_epsilon_stops_expansion() {
        let problem = fixture(10);
        let solution = BnbSolver::new(&problem, Goal::Maximize, -1, 1000.0).solve(Traversal::Dfs);

        // Root bounds differ by less than epsilon => root is never split
        assert_eq!(solution.stats.explored, 1);
        assert_eq!(solution.stats.branched, 0);
    }

    #[test]
    fn test_evaluate_outcomes() {
        let problem = fixture(10);
        let root = problem.initial_subproblem();

        assert!(matches!(
            evaluate(&problem, Goal::Maximize, 0.0, &root, 31),
            Evaluation::Pruned
        ));
        assert!(is_prunable(&problem, Goal::Maximize, &root, 31));
        assert!(!is_prunable(&problem, Goal::Maximize, &root, 30));

        let mut over = root.clone();
        for _ in 0..4 {
            over = problem.split(&over).pop().unwrap();
        }
        assert!(matches!(
            evaluate(&problem, Goal::Maximize, 0.0, &over, -1),
            Evaluation::Infeasible
        ));

        match evaluate(&problem, Goal::Maximize, 0.0, &root, -1) {
            Evaluation::Evaluated {
                full_value,
                children,
            } => {
                assert_eq!(full_value, None);
                assert_eq!(children.len(), 2);
            }
            other => panic!("Unexpected evaluation {:?}", other),
        }
    }

    #[test]
    fn test_incumbent_never_regresses() {
        let mut rng = fastrand::Rng::with_seed(3);
        let problem = Knapsack::random(16, &mut rng);
        let mut solver = BnbSolver::new(&problem, Goal::Maximize, -1, 0.0);
        let mut frontier = TaskDeque::new(Traversal::Bfs);
        frontier.push(problem.initial_subproblem());

        let mut last = solver.incumbent.bound();
        while let Some(subproblem) = frontier.pop() {
            frontier.extend(solver.step(&subproblem));
            let now = solver.incumbent.bound();
            assert!(now >= last, "bound regressed from {} to {}", last, now);
            last = now;
        }
        assert_eq!(last, problem.brute_force());
    }
}
