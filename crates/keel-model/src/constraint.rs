//! Colocation constraints between resource pairs.

use serde::{Deserialize, Serialize};

use crate::resource::ResourceId;
use crate::score::Score;

/// Index of a colocation in the working set's constraint arena.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ColocationId(pub usize);

/// "Run `dependent` with (or away from) `primary`, this strongly."
///
/// An infinite score makes the colocation mandatory in either direction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Colocation {
    pub id: ColocationId,
    /// Constraint id from the configuration, used in logs.
    pub label: String,
    pub dependent: ResourceId,
    pub primary: ResourceId,
    pub score: Score,
    /// Whether the dependent influences the primary's placement even when
    /// the dependent is not active.
    pub influence: bool,
}
