//! Board vertices and out-of-band sentinels.
//!
//! A vertex is a board intersection index (`y * board_size + x`) stored in an
//! `i16`. Negative values are sentinels that never refer to board points.

/// A board point or one of the sentinels below.
pub type Vertex = i16;

/// The pass move.
pub const PASS: Vertex = -1;

/// "No vertex" marker, used before a move has been chosen.
pub const NULL_VERTEX: Vertex = -2;

/// Resignation, returned by the search in hopeless positions.
pub const RESIGN: Vertex = -3;

/// Dense index for per-move buffers: board points map to themselves and the
/// pass move maps to the extra trailing slot. Buffers sized
/// `num_intersections + 1` cover every playable move.
#[inline]
pub fn policy_slot(vertex: Vertex, num_intersections: usize) -> usize {
    if vertex == PASS {
        num_intersections
    } else {
        debug_assert!(vertex >= 0 && (vertex as usize) < num_intersections);
        vertex as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinels_are_disjoint() {
        assert_ne!(PASS, NULL_VERTEX);
        assert_ne!(PASS, RESIGN);
        assert_ne!(NULL_VERTEX, RESIGN);
        assert!(PASS < 0 && NULL_VERTEX < 0 && RESIGN < 0);
    }

    #[test]
    fn test_policy_slot() {
        assert_eq!(policy_slot(0, 81), 0);
        assert_eq!(policy_slot(80, 81), 80);
        assert_eq!(policy_slot(PASS, 81), 81);
    }
}
