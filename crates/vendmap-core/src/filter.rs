//! Filtered view and status tallies over a registry snapshot.

use serde::{Deserialize, Serialize};

use crate::machines::{Category, Machine, OperatingStatus};

/// Active selectors. `None` means "no constraint"; set selectors combine with AND.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterState {
    pub category: Option<Category>,
    pub status: Option<OperatingStatus>,
}

impl FilterState {
    #[must_use]
    pub fn with_category(mut self, category: Option<Category>) -> Self {
        self.category = category;
        self
    }

    #[must_use]
    pub fn with_status(mut self, status: Option<OperatingStatus>) -> Self {
        self.status = status;
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.category.is_none() && self.status.is_none()
    }

    #[must_use]
    pub fn matches(&self, machine: &Machine) -> bool {
        self.category.map_or(true, |c| machine.category == c)
            && self.status.map_or(true, |s| machine.status == s)
    }
}

/// Per-status tally of the whole snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub total: usize,
    pub operating: usize,
    pub under_maintenance: usize,
    pub out_of_order: usize,
}

impl StatusCounts {
    #[must_use]
    pub fn tally(machines: &[Machine]) -> Self {
        machines.iter().fold(
            Self {
                total: machines.len(),
                ..Self::default()
            },
            |mut counts, machine| {
                match machine.status {
                    OperatingStatus::Operating => counts.operating += 1,
                    OperatingStatus::UnderMaintenance => counts.under_maintenance += 1,
                    OperatingStatus::OutOfOrder => counts.out_of_order += 1,
                }
                counts
            },
        )
    }
}

/// What the presentation layer renders: matching machines in snapshot order
/// plus counts over the unfiltered snapshot ("N of M").
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DerivedView {
    pub machines: Vec<Machine>,
    pub counts: StatusCounts,
}

/// Derive the view for `filter`. Pure; the snapshot is only read.
#[must_use]
pub fn derive_view(snapshot: &[Machine], filter: &FilterState) -> DerivedView {
    DerivedView {
        machines: snapshot
            .iter()
            .filter(|m| filter.matches(m))
            .cloned()
            .collect(),
        counts: StatusCounts::tally(snapshot),
    }
}
