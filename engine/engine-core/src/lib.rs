//! Core traits and types for the hoshi Go engine
//!
//! This crate provides the fundamental abstractions shared by the board
//! implementation and the search:
//! - `Color`: side to move
//! - `Vertex`: board points plus the pass/resign sentinels
//! - `GameState`: the narrow interface the search consumes for legality,
//!   hashing, symmetries and scoring
//! - `symmetry`: the eight board symmetries

pub mod board;
pub mod color;
pub mod symmetry;
pub mod vertex;

// Re-export main types for convenience
pub use board::{GameState, MoveFilter};
pub use color::Color;
pub use symmetry::{transform_index, transform_vertex, IDENTITY_SYMMETRY, NUM_SYMMETRIES};
pub use vertex::{policy_slot, Vertex, NULL_VERTEX, PASS, RESIGN};
