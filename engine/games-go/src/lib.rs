//! Go board and rules for the hoshi engine.
//!
//! `GoState` is a complete position (stones, history, komi) implementing the
//! `engine_core::GameState` interface the search consumes. The crate covers
//! legality with simple ko and positional superko, Zobrist fingerprints with
//! symmetry variants, Benson-style pass-alive detection, area scoring, and a
//! hand-crafted pattern policy for network-free play.

pub mod board;
pub mod pattern;
pub mod safety;
pub mod zobrist;

pub use board::GoState;

use engine_core::{Color, GameState, MoveFilter, Vertex, PASS, RESIGN};

/// GTP column letters; the letter I is skipped by convention.
const COLUMNS: &[u8] = b"ABCDEFGHJKLMNOPQRST";

impl GameState for GoState {
    fn board_size(&self) -> usize {
        GoState::board_size(self)
    }

    fn num_intersections(&self) -> usize {
        GoState::num_intersections(self)
    }

    fn komi(&self) -> f32 {
        GoState::komi(self)
    }

    fn to_move(&self) -> Color {
        GoState::to_move(self)
    }

    fn passes(&self) -> u8 {
        GoState::passes(self)
    }

    fn move_number(&self) -> u32 {
        GoState::move_number(self)
    }

    fn last_move(&self) -> Vertex {
        GoState::last_move(self)
    }

    fn vertex_of(&self, x: usize, y: usize) -> Vertex {
        GoState::vertex_of(self, x, y)
    }

    fn index_of(&self, x: usize, y: usize) -> usize {
        GoState::index_of(self, x, y)
    }

    fn xy_of(&self, vertex: Vertex) -> (usize, usize) {
        GoState::xy_of(self, vertex)
    }

    fn vertex_text(&self, vertex: Vertex) -> String {
        match vertex {
            PASS => "pass".to_string(),
            RESIGN => "resign".to_string(),
            v if v >= 0 => {
                let (x, y) = self.xy_of(v);
                format!("{}{}", COLUMNS[x] as char, y + 1)
            }
            _ => "null".to_string(),
        }
    }

    fn play(&mut self, vertex: Vertex) -> bool {
        self.play_move(vertex)
    }

    fn play_assume_legal(&mut self, vertex: Vertex) {
        self.play_move_unchecked(vertex)
    }

    fn is_legal_filtered(
        &self,
        vertex: Vertex,
        color: Color,
        filter: Option<MoveFilter<'_>>,
    ) -> bool {
        self.legal(vertex, color, filter)
    }

    fn is_capture(&self, vertex: Vertex, color: Color) -> bool {
        self.capture_move(vertex, color)
    }

    fn is_simple_eye(&self, vertex: Vertex, color: Color) -> bool {
        self.simple_eye(vertex, color)
    }

    fn is_real_eye(&self, vertex: Vertex, color: Color) -> bool {
        self.real_eye(vertex, color)
    }

    fn is_escape(&self, vertex: Vertex, color: Color) -> bool {
        self.escape_move(vertex, color)
    }

    fn strict_safe_area(&self) -> Vec<bool> {
        self.compute_strict_safe_area()
    }

    fn pass_alive_ownership(&self, out: &mut [f32]) {
        self.compute_ownership(out)
    }

    fn simple_final_score(&self, effective_komi: f32) -> f32 {
        self.compute_simple_final_score(effective_komi)
    }

    fn hash(&self) -> u64 {
        self.position_hash()
    }

    fn ko_hash(&self) -> u64 {
        self.position_ko_hash()
    }

    fn move_hash(&self, vertex: Vertex, color: Color) -> u64 {
        self.stone_key(vertex, color)
    }

    fn symmetry_hash(&self, symm: usize) -> u64 {
        self.symmetry_position_hash(symm)
    }

    fn symmetry_ko_hash(&self, symm: usize) -> u64 {
        self.symmetry_position_ko_hash(symm)
    }

    fn is_superko(&self) -> bool {
        self.superko()
    }

    fn pattern_policy(&self, color: Color) -> Vec<f32> {
        self.compute_pattern_policy(color)
    }
}
