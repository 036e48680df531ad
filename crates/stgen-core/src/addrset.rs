use std::collections::BTreeSet;

use crate::types::Addr;

/// An inclusive `(start, end)` address range with `start <= end`.
pub type AddrRange = (Addr, Addr);

/// An ordered set of disjoint, non-adjacent address ranges.
///
/// Many single-address insertions compress into few stored ranges.
/// Invariant: for any two stored ranges `r1 < r2`, `r1.1 + 1 < r2.0`;
/// merging on insert restores it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddrSet {
    ranges: BTreeSet<AddrRange>,
}

impl AddrSet {
    pub fn new() -> Self {
        Self {
            ranges: BTreeSet::new(),
        }
    }

    /// Inserts `range`, merging with any adjacent or overlapping
    /// stored ranges. Inserting an already-covered range is a no-op.
    pub fn insert(&mut self, range: AddrRange) {
        debug_assert!(range.0 <= range.1);

        let mut range = range;
        loop {
            if self.ranges.is_empty() {
                self.ranges.insert(range);
                return;
            }

            // The stored range that may border or overlap `range`: the
            // first one ordered at or after it, unless the predecessor
            // reaches up to (or beyond) range.0 - 1.
            let it = match self.ranges.range(range..).next() {
                None => *self
                    .ranges
                    .iter()
                    .next_back()
                    .expect("set checked non-empty"),
                Some(&lb) => match self.ranges.range(..range).next_back() {
                    Some(&prev) if range.0 <= prev.1.saturating_add(1) => prev,
                    _ => lb,
                },
            };

            if it.1.checked_add(1) == Some(range.0) {
                // extend `it` upward; recheck, may now reach others
                self.ranges.remove(&it);
                range = (it.0, range.1);
            } else if range.1.checked_add(1) == Some(it.0) {
                // extend `it` downward; recheck
                self.ranges.remove(&it);
                range = (range.0, it.1);
            } else if range.0 > it.1 {
                self.ranges.insert(range);
                return;
            } else if range.0 >= it.0 {
                if range.1 > it.1 {
                    // extend `it` to the end of `range`; recheck
                    self.ranges.remove(&it);
                    range = (it.0, range.1);
                } else {
                    // `it` encompasses `range`
                    return;
                }
            } else if range.1 < it.0 {
                // strictly below, nothing to merge
                self.ranges.insert(range);
                return;
            } else if range.1 <= it.1 {
                // start address extended downward; no recheck needed
                self.ranges.remove(&it);
                self.ranges.insert((range.0, it.1));
                return;
            } else {
                // `range` encompasses `it`; drop `it` and recheck
                self.ranges.remove(&it);
            }
        }
    }

    pub fn clear(&mut self) {
        self.ranges.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    /// Iterates stored ranges in ascending start order.
    pub fn iter(&self) -> impl Iterator<Item = &AddrRange> {
        self.ranges.iter()
    }
}

impl<'a> IntoIterator for &'a AddrSet {
    type Item = &'a AddrRange;
    type IntoIter = std::collections::btree_set::Iter<'a, AddrRange>;

    fn into_iter(self) -> Self::IntoIter {
        self.ranges.iter()
    }
}
