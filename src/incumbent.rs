use std::sync::Mutex;

use crossbeam_utils::CachePadded;

use crate::problem::{Goal, Problem};

/// Best bound and best fully feasible subproblem known to one worker.
///
/// The bound only ever improves. It may be better than the value of the stored
/// subproblem when it was tightened with a bound found elsewhere.
pub struct Incumbent<P: Problem> {
    goal: Goal,
    bound: P::Score,
    best: Option<(P::Subproblem, P::Score)>,
}

impl<P: Problem> Clone for Incumbent<P> {
    fn clone(&self) -> Self {
        Self {
            goal: self.goal,
            bound: self.bound,
            best: self.best.clone(),
        }
    }
}

impl<P: Problem> std::fmt::Debug for Incumbent<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Incumbent")
            .field("goal", &self.goal)
            .field("bound", &self.bound)
            .field("best", &self.best)
            .finish()
    }
}

impl<P: Problem> Incumbent<P> {
    pub fn new(goal: Goal, worst_bound: P::Score) -> Self {
        Self {
            goal,
            bound: worst_bound,
            best: None,
        }
    }

    #[inline(always)]
    pub fn goal(&self) -> Goal {
        self.goal
    }

    #[inline(always)]
    pub fn bound(&self) -> P::Score {
        self.bound
    }

    pub fn best(&self) -> Option<&P::Subproblem> {
        self.best.as_ref().map(|(subproblem, _)| subproblem)
    }

    pub fn best_value(&self) -> Option<P::Score> {
        self.best.as_ref().map(|&(_, value)| value)
    }

    /// Offers a fully feasible subproblem with the given value.
    /// Accepted if the value is at least as good as the current bound.
    pub fn offer(&mut self, subproblem: &P::Subproblem, value: P::Score) -> bool {
        if !self.goal.is_at_least_as_good(value, self.bound) {
            return false;
        }
        self.bound = value;
        self.best = Some((subproblem.clone(), value));
        true
    }

    /// Folds in a bound found elsewhere. Returns true if it improved the local bound.
    pub fn tighten(&mut self, bound: P::Score) -> bool {
        if self.goal.is_better(bound, self.bound) {
            self.bound = bound;
            true
        } else {
            false
        }
    }

    pub fn into_best(self) -> Option<P::Subproblem> {
        self.best.map(|(subproblem, _)| subproblem)
    }
}

/// Incumbent shared by the threads of one process.
/// Every read-modify-write happens under the lock.
pub struct SharedIncumbent<P: Problem> {
    goal: Goal,
    inner: CachePadded<Mutex<Incumbent<P>>>,
}

impl<P: Problem> SharedIncumbent<P> {
    pub fn new(incumbent: Incumbent<P>) -> Self {
        Self {
            goal: incumbent.goal(),
            inner: CachePadded::new(Mutex::new(incumbent)),
        }
    }

    pub fn goal(&self) -> Goal {
        self.goal
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Incumbent<P>> {
        // A panicking worker cannot leave the incumbent half-updated, so poisoning is ignored.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn bound(&self) -> P::Score {
        self.lock().bound()
    }

    pub fn offer(&self, subproblem: &P::Subproblem, value: P::Score) -> bool {
        self.lock().offer(subproblem, value)
    }

    pub fn tighten(&self, bound: P::Score) -> bool {
        self.lock().tighten(bound)
    }

    pub fn into_inner(self) -> Incumbent<P> {
        CachePadded::into_inner(self.inner)
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
