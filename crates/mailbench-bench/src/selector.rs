use rand::Rng;

use mailbench_core::{CoreError, CoreResult, OperationWeights};

use crate::operation::OperationKind;

/// Weighted choice among create, list and search.
///
/// A single roll in `[0, total)` is mapped onto cumulative ranges in the
/// fixed order create, list, search. Zero-weight kinds are unreachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationSelector {
    create_upper: u64,
    list_upper: u64,
    total: u64,
}

impl OperationSelector {
    /// Fails when all weights are zero.
    pub fn new(weights: OperationWeights) -> CoreResult<Self> {
        let total = weights.total();
        if total == 0 {
            return Err(CoreError::ValidationError(
                "operation weights must sum to a positive total".to_string(),
            ));
        }
        let create_upper = u64::from(weights.create_weight);
        Ok(Self {
            create_upper,
            list_upper: create_upper + u64::from(weights.list_weight),
            total,
        })
    }

    pub fn select<R: Rng + ?Sized>(&self, rng: &mut R) -> OperationKind {
        let roll = rng.gen_range(0..self.total);
        if roll < self.create_upper {
            OperationKind::Create
        } else if roll < self.list_upper {
            OperationKind::List
        } else {
            OperationKind::Search
        }
    }
}
