use std::fmt::{Debug, Display};

use log::info;

use crate::codec::Wire;

/// Direction of the optimization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Goal {
    Maximize,
    Minimize,
}

impl Goal {
    /// Returns true if `a` is strictly better than `b`.
    #[inline(always)]
    pub fn is_better<S: Score>(self, a: S, b: S) -> bool {
        match self {
            Goal::Maximize => a > b,
            Goal::Minimize => a < b,
        }
    }

    /// Returns true if `a` is better than or equal to `b`.
    #[inline(always)]
    pub fn is_at_least_as_good<S: Score>(self, a: S, b: S) -> bool {
        match self {
            Goal::Maximize => a >= b,
            Goal::Minimize => a <= b,
        }
    }

    /// Picks the better of two scores, preferring `a` on ties.
    #[inline(always)]
    pub fn best_of<S: Score>(self, a: S, b: S) -> S {
        if self.is_better(b, a) { b } else { a }
    }

    /// Maps a score onto a scale where larger always means better.
    /// Used to order priority queues independent of the goal.
    #[inline(always)]
    pub fn orient(self, value: f64) -> f64 {
        match self {
            Goal::Maximize => value,
            Goal::Minimize => -value,
        }
    }
}

/// Numeric type of bounds and objective values.
///
/// Distributed schedulers send scores between ranks, so float scores must stay finite.
pub trait Score: Copy + PartialOrd + Debug + Display + Send + Sync + Wire + 'static {
    fn to_f64(self) -> f64;
}

macro_rules! impl_score {
    ($($ty:ty),*) => {
        $(
            impl Score for $ty {
                #[inline(always)]
                fn to_f64(self) -> f64 {
                    self as f64
                }
            }
        )*
    };
}

impl_score!(i32, i64, u32, u64, f32, f64);

/// Tri-state classification of a subproblem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feasibility {
    /// A complete, evaluable candidate solution.
    Full,
    /// Not complete, but a usable bound exists.
    Partial,
    /// Provably not worth exploring.
    None,
}

/// Admissible estimate interval of a subproblem.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds<S> {
    /// The relaxed bound used for pruning.
    /// Must never be weaker than the best value reachable from the subproblem.
    pub lower: S,
    /// The tighter estimate, used as the convergence candidate of partial subproblems.
    pub upper: S,
}

impl<S> Bounds<S> {
    pub fn new(lower: S, upper: S) -> Self {
        Self { lower, upper }
    }
}

/// Description of a combinatorial optimization problem solvable by branch-and-bound.
///
/// The implementing value holds the immutable problem constants. Subproblems are
/// plain values without references into the problem, so they can be moved between
/// threads and encoded for other ranks.
///
/// Soundness of pruning is the implementor's obligation: [`Problem::bounds`] must be
/// admissible, otherwise the engines silently return suboptimal results.
pub trait Problem: Sync {
    type Subproblem: Clone + Send + Debug + Wire + 'static;
    type Score: Score;

    /// Root of the search tree.
    fn initial_subproblem(&self) -> Self::Subproblem;

    /// Children of `subproblem`. Must not include the parent itself.
    fn split(&self, subproblem: &Self::Subproblem) -> Vec<Self::Subproblem>;

    fn feasibility(&self, subproblem: &Self::Subproblem) -> Feasibility;

    fn bounds(&self, subproblem: &Self::Subproblem) -> Bounds<Self::Score>;

    /// Objective value of a subproblem. Only meaningful for [`Feasibility::Full`] subproblems.
    fn contained_upper_bound(&self, subproblem: &Self::Subproblem) -> Self::Score;

    /// Reports the final answer. Called once per solve.
    fn print_solution(&self, subproblem: &Self::Subproblem) {
        info!(
            "Best solution {:?} with value {}",
            subproblem,
            self.contained_upper_bound(subproblem)
        );
    }
}
