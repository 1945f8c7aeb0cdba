//! # Stereo association table
//!
//! For every pixel of the other view, the list of this view's nodes currently matched to it.
//! Counts drive the uniqueness penalty that discourages many-to-one correspondences.

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use crate::cost::Cost;

// -----------------------------------------------------------------------------------------------
// DATA STRUCTURES
// -----------------------------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssociationTable {
    counts: Vec<u16>,
    matches: Vec<Vec<usize>>,
    /// Upper bound on the list length of a pixel. Nodes matching the same pixel lie on one row
    /// at distinct disparities, so there can be at most one per real label.
    capacity: usize,
}

// -----------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// -----------------------------------------------------------------------------------------------

impl AssociationTable {
    pub fn new(pixel_count: usize, capacity: usize) -> Self {
        Self {
            counts: vec![0; pixel_count],
            matches: vec![Vec::new(); pixel_count],
            capacity,
        }
    }

    pub fn clear(&mut self) {
        for (c, m) in self.counts.iter_mut().zip(self.matches.iter_mut()) {
            *c = 0;
            m.clear();
        }
    }

    /// Record that `node` now matches `target`.
    pub fn add(&mut self, target: usize, node: usize) {
        debug_assert!(self.matches[target].len() < self.capacity);
        self.matches[target].push(node);
        self.counts[target] += 1;
    }

    /// Forget a match previously recorded with `add`.
    pub fn remove(&mut self, target: usize, node: usize) {
        let list = &mut self.matches[target];
        if let Some(pos) = list.iter().position(|&n| n == node) {
            list.swap_remove(pos);
            self.counts[target] -= 1;
        }
    }

    pub fn count(&self, target: usize) -> u16 {
        self.counts[target]
    }

    pub fn counts(&self) -> &[u16] {
        &self.counts
    }

    /// Nodes matched to `target`, in no particular order.
    pub fn matches(&self, target: usize) -> &[usize] {
        &self.matches[target]
    }

    /// Recompute the table from scratch given each node's current target.
    pub fn rebuild<I>(&mut self, assignment: I)
    where
        I: IntoIterator<Item = (usize, Option<usize>)>,
    {
        self.clear();
        for (node, target) in assignment {
            if let Some(t) = target {
                self.add(t, node);
            }
        }
    }

    /// Total uniqueness penalty of the table, `penalties[k]` being the cost of a count of `k`.
    pub fn penalty(&self, penalties: &[Cost]) -> Cost {
        self.counts.iter().map(|&c| penalties[c as usize]).sum()
    }
}

// -----------------------------------------------------------------------------------------------
// TESTS
// -----------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_remove_keeps_counts_in_sync() {
        let mut table = AssociationTable::new(4, 3);
        table.add(2, 10);
        table.add(2, 11);
        table.add(0, 12);
        assert_eq!(table.count(2), 2);

        table.remove(2, 10);
        table.remove(2, 99);
        assert_eq!(table.count(2), 1);
        assert_eq!(table.matches(2), &[11]);

        let mut rebuilt = AssociationTable::new(4, 3);
        rebuilt.rebuild(vec![(11, Some(2)), (12, Some(0)), (13, None)]);
        assert_eq!(rebuilt, table);
    }

    #[test]
    fn penalty_sums_per_pixel_costs() {
        let mut table = AssociationTable::new(3, 3);
        table.rebuild(vec![(0, Some(1)), (1, Some(1)), (2, Some(2))]);
        assert_eq!(table.penalty(&[0, 0, 600, 1320]), 600);
    }
}
