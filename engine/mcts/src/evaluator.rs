//! Evaluator seam between the search and the network.
//!
//! The search asks an `Evaluator` for a policy/value/ownership snapshot of a
//! position and never assumes anything about batching or the backing
//! implementation. The uniform evaluator keeps the search runnable (and
//! testable) without any weights.

use engine_core::{Color, GameState, Vertex};
use thiserror::Error;

/// Errors surfaced by an evaluator backend.
#[derive(Debug, Error)]
pub enum EvaluatorError {
    #[error("evaluation failed: {0}")]
    EvaluationFailed(String),

    #[error("evaluation timed out after {0} ms")]
    TimedOut(u64),

    #[error("model error: {0}")]
    ModelError(String),
}

/// Symmetry handling for a single evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ensemble {
    /// No symmetry augmentation.
    None,
    /// Evaluate under the given symmetry index.
    Direct(usize),
    /// Pick one of the eight symmetries uniformly.
    Random,
}

/// One evaluation: policy, win/draw/loss, score lead and ownership, all from
/// the side to move's perspective.
#[derive(Debug, Clone)]
pub struct NetResult {
    /// Per-intersection move priors.
    pub policy: Vec<f32>,
    pub pass_policy: f32,
    /// Win / draw / loss for the side to move.
    pub wdl: [f32; 3],
    /// Direct winrate head for the side to move.
    pub stm_winrate: f32,
    /// Expected score lead for the side to move.
    pub final_score: f32,
    /// Per-intersection ownership, +1 = side to move.
    pub ownership: Vec<f32>,
    pub board_size: usize,
    pub komi: f32,
}

impl NetResult {
    /// Approximate heap footprint, used for cache budgeting.
    pub fn memory_bytes(&self) -> usize {
        std::mem::size_of::<Self>()
            + (self.policy.len() + self.ownership.len()) * std::mem::size_of::<f32>()
    }
}

/// Position evaluator. Implementations may batch requests across worker
/// threads internally; from the caller's side a call is a bounded wait.
pub trait Evaluator<S: GameState>: Send + Sync {
    fn evaluate(
        &self,
        state: &S,
        ensemble: Ensemble,
        temperature: f32,
    ) -> Result<NetResult, EvaluatorError>;
}

/// Softmax with temperature over raw scores.
pub fn softmax(input: &[f32], temperature: f32) -> Vec<f32> {
    debug_assert!(temperature > 0.0);
    let max = input.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let mut out: Vec<f32> = input
        .iter()
        .map(|&v| ((v - max) / temperature).exp())
        .collect();
    let sum: f32 = out.iter().sum();
    if sum > 0.0 {
        for v in &mut out {
            *v /= sum;
        }
    }
    out
}

/// Uniform priors over legal moves, neutral value. For tests and as a
/// stand-in while no weights are loaded.
#[derive(Debug, Clone, Default)]
pub struct UniformEvaluator;

impl UniformEvaluator {
    pub fn new() -> Self {
        Self
    }
}

impl<S: GameState> Evaluator<S> for UniformEvaluator {
    fn evaluate(
        &self,
        state: &S,
        _ensemble: Ensemble,
        _temperature: f32,
    ) -> Result<NetResult, EvaluatorError> {
        let n = state.num_intersections();
        let color = state.to_move();
        let mut policy = vec![0.0f32; n];
        let mut legal = 0usize;
        for idx in 0..n {
            if state.is_legal(idx as Vertex, color) {
                policy[idx] = 1.0;
                legal += 1;
            }
        }
        let prob = 1.0 / (legal + 1) as f32;
        for p in policy.iter_mut() {
            *p *= prob;
        }
        Ok(NetResult {
            policy,
            pass_policy: prob,
            wdl: [0.5, 0.0, 0.5],
            stm_winrate: 0.5,
            final_score: 0.0,
            ownership: vec![0.0; n],
            board_size: state.board_size(),
            komi: state.komi(),
        })
    }
}

/// Re-orient a side-to-move result to Black's perspective, returning the
/// black win-loss value and black score lead.
pub(crate) fn black_orientation(
    result: &NetResult,
    color: Color,
    use_stm_winrate: bool,
) -> (f32, f32) {
    let mut wl = if use_stm_winrate {
        result.stm_winrate
    } else {
        (result.wdl[0] - result.wdl[2] + 1.0) / 2.0
    };
    let mut score = result.final_score;
    if color == Color::White {
        wl = 1.0 - wl;
        score = -score;
    }
    (wl, score)
}
