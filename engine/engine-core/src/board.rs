//! The board interface consumed by the search.
//!
//! The search never inspects stones directly; everything it needs from the
//! rules engine flows through this trait. Forking a position for a playout is
//! expressed as `Clone`, so implementations should keep their state cheap to
//! copy.

use crate::color::Color;
use crate::vertex::Vertex;

/// Caller-supplied move restriction, e.g. the avoid/allow lists of an
/// analysis request. Returning `false` vetoes the move.
pub type MoveFilter<'a> = &'a (dyn Fn(Vertex, Color) -> bool + Sync);

/// A full game position: board, history, komi and bookkeeping.
///
/// All queries are pure; only `play` and `play_assume_legal` mutate. Hashes
/// are Zobrist-style 64-bit fingerprints: `hash` covers stones, side to move,
/// ko and komi, while `ko_hash` covers the stone configuration alone and
/// drives superko detection.
pub trait GameState: Clone + Send + Sync {
    fn board_size(&self) -> usize;
    fn num_intersections(&self) -> usize;
    fn komi(&self) -> f32;
    fn to_move(&self) -> Color;

    /// Number of consecutive passes ending the move history.
    fn passes(&self) -> u8;
    fn move_number(&self) -> u32;
    fn last_move(&self) -> Vertex;

    fn vertex_of(&self, x: usize, y: usize) -> Vertex;
    fn index_of(&self, x: usize, y: usize) -> usize;
    fn xy_of(&self, vertex: Vertex) -> (usize, usize);

    /// GTP-style coordinate text ("D4", "pass", "resign").
    fn vertex_text(&self, vertex: Vertex) -> String;

    /// Play a move for the side to move. Returns `false` and leaves the
    /// position untouched if the move is illegal.
    fn play(&mut self, vertex: Vertex) -> bool;

    /// Play a move already known to be legal.
    fn play_assume_legal(&mut self, vertex: Vertex);

    fn is_legal(&self, vertex: Vertex, color: Color) -> bool {
        self.is_legal_filtered(vertex, color, None)
    }

    /// Legality under an optional caller-supplied filter.
    fn is_legal_filtered(
        &self,
        vertex: Vertex,
        color: Color,
        filter: Option<MoveFilter<'_>>,
    ) -> bool;

    /// Would playing `vertex` capture at least one opposing chain?
    fn is_capture(&self, vertex: Vertex, color: Color) -> bool;

    /// Empty point fully surrounded by own stones (or the edge).
    fn is_simple_eye(&self, vertex: Vertex, color: Color) -> bool;

    /// Simple eye that also passes the diagonal false-eye test.
    fn is_real_eye(&self, vertex: Vertex, color: Color) -> bool;

    /// Would playing `vertex` rescue an own chain in atari?
    fn is_escape(&self, vertex: Vertex, color: Color) -> bool;

    /// Pass-alive territory of both sides, one flag per intersection. Moves
    /// inside this area are pointless and are skipped at expansion.
    fn strict_safe_area(&self) -> Vec<bool>;

    /// Rules-based ownership of the current position, +1 Black / -1 White
    /// per intersection, written into `out` (length `num_intersections`).
    fn pass_alive_ownership(&self, out: &mut [f32]);

    /// Area score from Black's perspective minus `effective_komi`.
    fn simple_final_score(&self, effective_komi: f32) -> f32;

    fn hash(&self) -> u64;
    fn ko_hash(&self) -> u64;

    /// Zobrist delta of placing a stone, for incremental next-position
    /// hashes.
    fn move_hash(&self, vertex: Vertex, color: Color) -> u64;

    /// `hash` of the position transformed by one of the eight symmetries.
    fn symmetry_hash(&self, symm: usize) -> u64;

    /// `ko_hash` of the position transformed by one of the eight symmetries.
    fn symmetry_ko_hash(&self, symm: usize) -> u64;

    /// Does the current position repeat an earlier whole-board position?
    fn is_superko(&self) -> bool;

    /// Hand-crafted pattern policy over the intersections, used when the
    /// network is disabled. Entries for illegal moves are zero; the sum over
    /// legal moves is 1 (or 0 when nothing is legal).
    fn pattern_policy(&self, color: Color) -> Vec<f32>;
}
