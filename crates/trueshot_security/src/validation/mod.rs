//! # Reasonableness Validation
//!
//! Bounded-distance sanity check of the eye position a client reports with
//! its fire request.
//!
//! ## Philosophy
//!
//! The client says "I fired from here". The server only asks whether "here"
//! is close to where it believes the shooter's eye is. Anything subtler is
//! out of scope.
//!
//! With no authoritative position to compare against (pawn gone, not yet
//! replicated) the check passes.

use trueshot_shared::constants::REASONABLE_DISTANCE_SQUARED;
use trueshot_shared::Vec3;

/// Validator for reported eye positions.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ReasonablenessValidator {
    limit_squared: f32,
}

impl ReasonablenessValidator {
    /// Creates a validator with the standard limit.
    #[must_use]
    pub const fn new() -> Self {
        Self { limit_squared: REASONABLE_DISTANCE_SQUARED }
    }

    /// Squared distance limit in use.
    #[must_use]
    pub const fn limit_squared(&self) -> f32 {
        self.limit_squared
    }

    /// True if a squared distance is inside the plausible range.
    ///
    /// Strict: exactly the limit is not reasonable. NaN never is.
    #[inline]
    #[must_use]
    pub fn within_bounds(&self, distance_squared: f32) -> bool {
        distance_squared < self.limit_squared
    }

    /// Checks `reported` against `authoritative`. Fails open on `None`.
    ///
    /// A non-finite reported position is never reasonable.
    #[must_use]
    pub fn is_reasonable(&self, reported: Vec3, authoritative: Option<Vec3>) -> bool {
        authoritative.map_or(true, |eye| self.within_bounds(reported.distance_squared(eye)))
    }
}

impl Default for ReasonablenessValidator {
    fn default() -> Self {
        Self::new()
    }
}
