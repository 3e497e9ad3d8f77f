//! Hand-crafted move weights for network-free play.
//!
//! A crude stand-in for a trained pattern model: tactical features multiply
//! a base weight per legal move and the result is normalized. Good enough to
//! keep the search sensible when the evaluator is disabled.

use engine_core::{Color, Vertex};

use crate::board::GoState;

const GAMMA_CAPTURE: f32 = 12.0;
const GAMMA_ESCAPE: f32 = 8.0;
const GAMMA_NEAR_LAST: f32 = 3.0;
const GAMMA_SELF_EYE: f32 = 0.05;

impl GoState {
    /// Normalized move weights over the intersections for `color`. Illegal
    /// moves get zero; the legal mass sums to one when any move is legal.
    pub fn compute_pattern_policy(&self, color: Color) -> Vec<f32> {
        let n = self.num_intersections();
        let mut weights = vec![0.0f32; n];
        let mut sum = 0.0f32;

        for idx in 0..n {
            let vtx = idx as Vertex;
            if !self.legal(vtx, color, None) {
                continue;
            }
            let mut w = 1.0f32;
            if self.capture_move(vtx, color) {
                w *= GAMMA_CAPTURE;
            }
            if self.escape_move(vtx, color) {
                w *= GAMMA_ESCAPE;
            }
            if self.near_last_move(vtx) {
                w *= GAMMA_NEAR_LAST;
            }
            if self.real_eye(vtx, color) {
                w *= GAMMA_SELF_EYE;
            }
            weights[idx] = w;
            sum += w;
        }

        if sum > 0.0 {
            for w in &mut weights {
                *w /= sum;
            }
        }
        weights
    }

    fn near_last_move(&self, vertex: Vertex) -> bool {
        let last = self.last_move();
        if last < 0 {
            return false;
        }
        let (x, y) = self.xy_of(vertex);
        let (lx, ly) = self.xy_of(last);
        x.abs_diff(lx) <= 2 && y.abs_diff(ly) <= 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_normalizes() {
        let state = GoState::new(5, 0.0);
        let policy = state.compute_pattern_policy(Color::Black);
        let sum: f32 = policy.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_captures_are_preferred() {
        let mut state = GoState::new(5, 0.0);
        // White at (1,0) in atari; Black captures at (1,1).
        for vtx in [
            state.vertex_of(0, 0),
            state.vertex_of(1, 0),
            state.vertex_of(2, 0),
            state.vertex_of(4, 4),
        ] {
            assert!(state.play_move(vtx));
        }
        let policy = state.compute_pattern_policy(Color::Black);
        let capture = policy[state.index_of(1, 1)];
        let quiet = policy[state.index_of(3, 3)];
        assert!(capture > quiet);
    }

    #[test]
    fn test_illegal_moves_have_zero_mass() {
        let mut state = GoState::new(5, 0.0);
        assert!(state.play_move(state.vertex_of(2, 2)));
        let policy = state.compute_pattern_policy(Color::White);
        assert_eq!(policy[state.index_of(2, 2)], 0.0);
    }
}
