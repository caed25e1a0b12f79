use crate::types::ReviewRequestId;
use serde::Serialize;
use std::collections::BTreeSet;

/// Outcome of comparing live environments with open merge requests.
///
/// The three sets are pairwise disjoint and together cover the union of
/// both inputs. Callers must treat them as unordered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Diff {
    pub to_create: BTreeSet<ReviewRequestId>,
    pub to_remove: BTreeSet<ReviewRequestId>,
    pub unchanged: BTreeSet<ReviewRequestId>,
}

impl Diff {
    pub fn compute(
        existing: &BTreeSet<ReviewRequestId>,
        desired: &BTreeSet<ReviewRequestId>,
    ) -> Self {
        Self {
            to_create: desired.difference(existing).copied().collect(),
            to_remove: existing.difference(desired).copied().collect(),
            unchanged: existing.intersection(desired).copied().collect(),
        }
    }

    pub fn is_converged(&self) -> bool {
        self.to_create.is_empty() && self.to_remove.is_empty()
    }
}
