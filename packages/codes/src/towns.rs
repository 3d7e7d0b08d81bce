//! Massachusetts municipalities.
//!
//! The id-to-name mapping itself is derived from the town survey by the
//! boundary consolidation stage.

/// Number of cities and towns in Massachusetts.
pub const MASSACHUSETTS_TOWN_COUNT: usize = 351;
