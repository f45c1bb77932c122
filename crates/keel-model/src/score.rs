//! Placement scores with distinguished infinities.
//!
//! A score expresses how strongly a resource wants (or refuses) to run
//! somewhere. `INFINITY` means "mandatory yes", `-INFINITY` means
//! "mandatory no"; everything in between is a preference. Addition
//! saturates: once a score is infinite it stays infinite, and `-INFINITY`
//! wins over `INFINITY` when both are involved.

use std::fmt;
use std::ops::Add;

use serde::{Deserialize, Serialize};

/// Magnitude used for the distinguished infinities. Finite scores are
/// clamped to stay strictly inside this bound.
pub const SCORE_INFINITY: i64 = 1_000_000;

/// A placement score. Ordering and equality are plain integer semantics.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Score(i64);

impl Score {
    /// Mandatory "yes".
    pub const INFINITY: Score = Score(SCORE_INFINITY);
    /// Mandatory "no".
    pub const NEG_INFINITY: Score = Score(-SCORE_INFINITY);
    /// Neutral.
    pub const ZERO: Score = Score(0);

    /// Create a score, clamping into `[-INFINITY, INFINITY]`.
    pub fn new(value: i64) -> Score {
        Score(value.clamp(-SCORE_INFINITY, SCORE_INFINITY))
    }

    pub fn value(self) -> i64 {
        self.0
    }

    pub fn is_infinite(self) -> bool {
        self.0 == SCORE_INFINITY
    }

    pub fn is_neg_infinite(self) -> bool {
        self.0 == -SCORE_INFINITY
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }
}

impl Add for Score {
    type Output = Score;

    /// Saturating score addition. `-INFINITY` dominates `INFINITY`.
    fn add(self, rhs: Score) -> Score {
        if self.is_neg_infinite() || rhs.is_neg_infinite() {
            Score::NEG_INFINITY
        } else if self.is_infinite() || rhs.is_infinite() {
            Score::INFINITY
        } else {
            Score::new(self.0.saturating_add(rhs.0))
        }
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_infinite() {
            write!(f, "INFINITY")
        } else if self.is_neg_infinite() {
            write!(f, "-INFINITY")
        } else {
            write!(f, "{}", self.0)
        }
    }
}
