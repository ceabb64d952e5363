use std::fmt::Write as _;

use itertools::Itertools;
use log::info;
use serde::{Deserialize, Serialize};

use crate::problem::{Bounds, Feasibility, Problem};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Item {
    pub weight: i64,
    pub value: i64,
    /// Position of the item in the instance as given.
    pub index: usize,
}

/// A knapsack instance. Items are kept sorted by value density so the
/// fractional relaxation can be computed greedily.
#[derive(Debug, Clone)]
pub struct Knapsack {
    pub capacity: i64,
    pub items: Vec<Item>,
}

/// A partial selection: the first `level` items (in density order) are decided.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KnapsackNode {
    pub level: usize,
    pub weight: i64,
    pub value: i64,
    pub taken: Vec<bool>,
}

impl Knapsack {
    /// Creates an instance from `(weight, value)` pairs.
    pub fn new(capacity: i64, items: &[(i64, i64)]) -> Self {
        let items = items
            .iter()
            .enumerate()
            .map(|(index, &(weight, value))| Item {
                weight,
                value,
                index,
            })
            .sorted_by(|a, b| {
                // a.value / a.weight > b.value / b.weight, without division
                (b.value as i128 * a.weight as i128)
                    .cmp(&(a.value as i128 * b.weight as i128))
                    .then(a.index.cmp(&b.index))
            })
            .collect();

        Knapsack { capacity, items }
    }

    pub fn num_items(&self) -> usize {
        self.items.len()
    }

    /// Value of the node plus the Dantzig bound of the remaining capacity, floored.
    pub fn relaxed_value(&self, node: &KnapsackNode) -> i64 {
        let mut remaining = self.capacity - node.weight;
        if remaining < 0 {
            return node.value;
        }

        let mut bound = node.value;
        for item in &self.items[node.level..] {
            if item.weight <= remaining {
                remaining -= item.weight;
                bound += item.value;
            } else {
                // Fractional part of the first item that does not fit
                bound += (remaining as i128 * item.value as i128 / item.weight as i128) as i64;
                break;
            }
        }
        bound
    }

    /// Original indices of the items selected by the node.
    pub fn selected_items(&self, node: &KnapsackNode) -> Vec<usize> {
        node.taken
            .iter()
            .zip(&self.items)
            .filter(|&(&taken, _)| taken)
            .map(|(_, item)| item.index)
            .sorted()
            .collect()
    }

    /// Exhaustive enumeration of all subsets. Only for small instances.
    pub fn brute_force(&self) -> i64 {
        assert!(self.items.len() < 25, "brute force on too many items");
        (0u32..1 << self.items.len())
            .filter_map(|mask| {
                let (weight, value) = self
                    .items
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| mask & (1 << i) != 0)
                    .fold((0, 0), |(w, v), (_, item)| (w + item.weight, v + item.value));
                (weight <= self.capacity).then_some(value)
            })
            .max()
            .unwrap_or(0)
    }

    /// Generates a random instance with capacity at half the total weight.
    pub fn random(num_items: usize, rng: &mut fastrand::Rng) -> Self {
        let items = (0..num_items)
            .map(|_| (rng.i64(1..=50), rng.i64(1..=100)))
            .collect::<Vec<_>>();
        let capacity = items.iter().map(|(w, _)| w).sum::<i64>() / 2;
        Knapsack::new(capacity, &items)
    }

    /// Writes the instance in the text format read by [`parse_knapsack`], in original item order.
    pub fn to_instance_string(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{} {}", self.items.len(), self.capacity);
        for item in self.items.iter().sorted_by_key(|item| item.index) {
            let _ = writeln!(out, "{} {}", item.weight, item.value);
        }
        out
    }
}

impl Problem for Knapsack {
    type Subproblem = KnapsackNode;
    type Score = i64;

    fn initial_subproblem(&self) -> KnapsackNode {
        KnapsackNode {
            level: 0,
            weight: 0,
            value: 0,
            taken: Vec::with_capacity(self.items.len()),
        }
    }

    fn split(&self, node: &KnapsackNode) -> Vec<KnapsackNode> {
        let Some(item) = self.items.get(node.level) else {
            return Vec::new();
        };

        let mut skip = node.clone();
        skip.level += 1;
        skip.taken.push(false);

        let mut take = node.clone();
        take.level += 1;
        take.weight += item.weight;
        take.value += item.value;
        take.taken.push(true);

        // Depth-first containers pop the last child first => try taking the item first
        vec![skip, take]
    }

    fn feasibility(&self, node: &KnapsackNode) -> Feasibility {
        if node.weight > self.capacity {
            Feasibility::None
        } else if node.level == self.items.len() || self.relaxed_value(node) == node.value {
            // Nothing left that could add value => leaving out the rest is optimal
            Feasibility::Full
        } else {
            Feasibility::Partial
        }
    }

    fn bounds(&self, node: &KnapsackNode) -> Bounds<i64> {
        Bounds::new(self.relaxed_value(node), node.value)
    }

    fn contained_upper_bound(&self, node: &KnapsackNode) -> i64 {
        node.value
    }

    fn print_solution(&self, node: &KnapsackNode) {
        info!(
            "Best packing: value {}, weight {}/{}, items [{}]",
            node.value,
            node.weight,
            self.capacity,
            self.selected_items(node).iter().join(", ")
        );
    }
}

/// Parses a knapsack instance: `<n> <capacity>` followed by `n` lines of `<weight> <value>`.
/// Lines starting with `c` are comments.
pub fn parse_knapsack(data: &[u8]) -> Result<Knapsack, String> {
    let text = std::str::from_utf8(data).map_err(|e| format!("Instance is not UTF-8: {}", e))?;
    let mut numbers = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('c'))
        .flat_map(str::split_ascii_whitespace)
        .map(|token| {
            token
                .parse::<i64>()
                .map_err(|_| format!("Expected integer, found {:?}", token))
        });

    let mut next = |what: &str| {
        numbers
            .next()
            .unwrap_or_else(|| Err(format!("Unexpected EOF while reading {}", what)))
    };

    let num_items = next("number of items")?;
    let num_items =
        usize::try_from(num_items).map_err(|_| format!("Invalid number of items: {}", num_items))?;
    let capacity = next("capacity")?;

    let mut items = Vec::with_capacity(num_items);
    for i in 0..num_items {
        let weight = next("item weight")?;
        let value = next("item value")?;
        if weight < 0 || value < 0 {
            return Err(format!("Item {} has negative weight or value", i + 1));
        }
        items.push((weight, value));
    }

    if numbers.next().is_some() {
        return Err("Unexpected trailing data after the last item".to_string());
    }

    Ok(Knapsack::new(capacity, &items))
}

/// Five items of weight 3 with values `[10, 2, 10, 4, 10]`.
#[cfg(test)]
pub(crate) fn fixture(capacity: i64) -> Knapsack {
    Knapsack::new(capacity, &[(3, 10), (3, 2), (3, 10), (3, 4), (3, 10)])
}
