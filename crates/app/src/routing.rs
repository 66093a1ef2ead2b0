//! Routing table — which controller owns which unit.
//!
//! Units are sorted by key and cut into contiguous blocks of at most
//! `partition_size`; block `i` goes to `controller_i`. Given the same unit set
//! the assignment is always the same.

use std::collections::{BTreeMap, BTreeSet};
use std::num::NonZeroUsize;

use serde::Serialize;

use homewatch_domain::id::ControllerId;
use homewatch_domain::unit::UnitKey;

/// Number of controllers needed for `units` units.
#[must_use]
pub fn controllers_needed(units: usize, partition_size: NonZeroUsize) -> usize {
    units.div_ceil(partition_size.get())
}

/// Immutable unit → controller mapping. Rebuilt wholesale on every rebalance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RoutingTable {
    assignments: BTreeMap<UnitKey, ControllerId>,
}

impl RoutingTable {
    /// Partition `units` into blocks of `partition_size`.
    #[must_use]
    pub fn plan(units: &BTreeSet<UnitKey>, partition_size: NonZeroUsize) -> Self {
        let assignments = units
            .iter()
            .enumerate()
            .map(|(index, unit)| {
                (
                    *unit,
                    ControllerId::from_index(index / partition_size.get()),
                )
            })
            .collect();
        Self { assignments }
    }

    /// Controller that owns `unit`, if any.
    #[must_use]
    pub fn controller_for(&self, unit: &UnitKey) -> Option<ControllerId> {
        self.assignments.get(unit).copied()
    }

    /// Units routed to `controller`, in key order.
    #[must_use]
    pub fn units_of(&self, controller: ControllerId) -> Vec<UnitKey> {
        self.assignments
            .iter()
            .filter(|(_, owner)| **owner == controller)
            .map(|(unit, _)| *unit)
            .collect()
    }

    /// Number of distinct controllers referenced by the table.
    #[must_use]
    pub fn controller_count(&self) -> usize {
        self.assignments
            .values()
            .next_back()
            .map_or(0, |id| id.index() + 1)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    /// Iterate assignments in unit order.
    pub fn iter(&self) -> impl Iterator<Item = (&UnitKey, &ControllerId)> {
        self.assignments.iter()
    }
}
