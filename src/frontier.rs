use std::{
    cmp::Ordering,
    collections::{BinaryHeap, VecDeque},
};

use crate::constants::AUTOMATIC_DFS_THRESHOLD;

/// Pop order of a task container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Traversal {
    /// Stack discipline.
    #[default]
    Dfs,
    /// Queue discipline.
    Bfs,
    /// Queue discipline until the container grows past [`AUTOMATIC_DFS_THRESHOLD`], then stack discipline.
    Automatic,
}

impl std::str::FromStr for Traversal {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dfs" => Ok(Traversal::Dfs),
            "bfs" => Ok(Traversal::Bfs),
            "auto" | "automatic" => Ok(Traversal::Automatic),
            _ => Err(format!(
                "Unknown traversal: {}. Use 'dfs', 'bfs' or 'auto'",
                s
            )),
        }
    }
}

/// Pending subproblems of one worker.
pub trait Frontier<S> {
    fn push(&mut self, item: S);

    /// Removes the next item to process.
    fn pop(&mut self) -> Option<S>;

    /// Removes up to `n` items for handing them to another worker,
    /// taking from the end that `pop` reaches last.
    fn split_off(&mut self, n: usize) -> Vec<S>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn extend(&mut self, items: Vec<S>) {
        for item in items {
            self.push(item);
        }
    }
}

/// Double-ended task container whose pop order follows a [`Traversal`].
#[derive(Debug, Clone)]
pub struct TaskDeque<S> {
    items: VecDeque<S>,
    traversal: Traversal,
}

impl<S> TaskDeque<S> {
    pub fn new(traversal: Traversal) -> Self {
        Self {
            items: VecDeque::new(),
            traversal,
        }
    }

    /// Whether the next pop takes from the back.
    #[inline(always)]
    fn pops_back(&self) -> bool {
        match self.traversal {
            Traversal::Dfs => true,
            Traversal::Bfs => false,
            Traversal::Automatic => self.items.len() > AUTOMATIC_DFS_THRESHOLD,
        }
    }
}

impl<S> Frontier<S> for TaskDeque<S> {
    #[inline(always)]
    fn push(&mut self, item: S) {
        self.items.push_back(item);
    }

    #[inline(always)]
    fn pop(&mut self) -> Option<S> {
        if self.pops_back() {
            self.items.pop_back()
        } else {
            self.items.pop_front()
        }
    }

    fn split_off(&mut self, n: usize) -> Vec<S> {
        let n = n.min(self.items.len());
        if self.pops_back() {
            self.items.drain(..n).collect()
        } else {
            let keep = self.items.len() - n;
            self.items.drain(keep..).collect()
        }
    }

    #[inline(always)]
    fn len(&self) -> usize {
        self.items.len()
    }
}

/// Task container ordered by a priority; the highest priority is popped first.
/// Ties are broken in insertion order.
pub struct PriorityFrontier<S, K> {
    heap: BinaryHeap<Ranked<S>>,
    priority: K,
    next_seq: u64,
}

impl<S, K: Fn(&S) -> f64> PriorityFrontier<S, K> {
    pub fn new(priority: K) -> Self {
        Self {
            heap: BinaryHeap::new(),
            priority,
            next_seq: 0,
        }
    }
}

impl<S, K: Fn(&S) -> f64> Frontier<S> for PriorityFrontier<S, K> {
    fn push(&mut self, item: S) {
        let key = (self.priority)(&item);
        self.heap.push(Ranked {
            key,
            seq: self.next_seq,
            item,
        });
        self.next_seq += 1;
    }

    fn pop(&mut self) -> Option<S> {
        self.heap.pop().map(|ranked| ranked.item)
    }

    fn split_off(&mut self, n: usize) -> Vec<S> {
        // The heap only gives cheap access to its best items, so peers receive those.
        (0..n).map_while(|_| self.pop()).collect()
    }

    fn len(&self) -> usize {
        self.heap.len()
    }
}

struct Ranked<S> {
    key: f64,
    seq: u64,
    item: S,
}

impl<S> PartialEq for Ranked<S> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<S> Eq for Ranked<S> {}

impl<S> PartialOrd for Ranked<S> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<S> Ord for Ranked<S> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key
            .total_cmp(&other.key)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain<F: Frontier<u32>>(frontier: &mut F) -> Vec<u32> {
        std::iter::from_fn(|| frontier.pop()).collect()
    }

    #[test]
    fn test_dfs_and_bfs_pop_order() {
        let mut dfs = TaskDeque::new(Traversal::Dfs);
        let mut bfs = TaskDeque::new(Traversal::Bfs);
        for i in 0..4 {
            dfs.push(i);
            bfs.push(i);
        }

        assert_eq!(drain(&mut dfs), vec![3, 2, 1, 0]);
        assert_eq!(drain(&mut bfs), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_automatic_switches_to_dfs_when_large() {
        let mut auto = TaskDeque::new(Traversal::Automatic);
        for i in 0..3 {
            auto.push(i);
        }
        assert_eq!(auto.pop(), Some(0), "small containers pop FIFO");

        let mut auto = TaskDeque::new(Traversal::Automatic);
        for i in 0..=AUTOMATIC_DFS_THRESHOLD as u32 {
            auto.push(i);
        }
        assert_eq!(
            auto.pop(),
            Some(AUTOMATIC_DFS_THRESHOLD as u32),
            "large containers pop LIFO"
        );
        assert_eq!(auto.pop(), Some(0), "back at the threshold => FIFO again");
    }

    #[test]
    fn test_split_off_takes_from_far_end() {
        let mut dfs = TaskDeque::new(Traversal::Dfs);
        let mut bfs = TaskDeque::new(Traversal::Bfs);
        for i in 0..5 {
            dfs.push(i);
            bfs.push(i);
        }

        assert_eq!(dfs.split_off(2), vec![0, 1]);
        assert_eq!(bfs.split_off(2), vec![3, 4]);
        assert_eq!(dfs.len(), 3);
        assert_eq!(bfs.split_off(10), vec![0, 1, 2]);
        assert!(bfs.is_empty());
    }

    #[test]
    fn test_priority_order_and_ties() {
        let mut frontier = PriorityFrontier::new(|x: &u32| (*x / 10) as f64);
        frontier.extend(vec![5, 31, 12, 30, 17]);

        // 31 and 30 share priority 3 => insertion order
        assert_eq!(drain(&mut frontier), vec![31, 30, 12, 17, 5]);
    }

    #[test]
    fn test_priority_split_off_hands_out_best() {
        let mut frontier = PriorityFrontier::new(|x: &u32| *x as f64);
        frontier.extend(vec![1, 9, 4, 7]);

        assert_eq!(frontier.split_off(2), vec![9, 7]);
        assert_eq!(frontier.len(), 2);
    }

    #[test]
    fn test_traversal_from_str() {
        assert_eq!("DFS".parse::<Traversal>(), Ok(Traversal::Dfs));
        assert_eq!("auto".parse::<Traversal>(), Ok(Traversal::Automatic));
        assert!("random".parse::<Traversal>().is_err());
    }
}
