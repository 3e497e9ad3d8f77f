//! Centralized configuration loading from hoshi.toml.
//!
//! The front end (GTP loop, self-play runner) parses no search options of
//! its own: it loads a `CentralConfig` here and converts it into the typed
//! records the search consumes.
//!
//! # Configuration Priority
//!
//! Settings are loaded with the following priority (highest to lowest):
//! 1. Environment variables (`HOSHI_<SECTION>_<KEY>`)
//! 2. hoshi.toml file
//! 3. Built-in defaults
//!
//! # Environment Variable Override Pattern
//!
//! ```text
//! HOSHI_<SECTION>_<KEY>=value
//!
//! Examples:
//!     HOSHI_SEARCH_THREADS=8
//!     HOSHI_SEARCH_PLAYOUTS=1600
//!     HOSHI_GAME_BOARD_SIZE=9
//!     HOSHI_ANALYSIS_DIALECT=kata
//! ```

mod defaults;
mod loader;
mod structs;

pub use defaults::*;
pub use loader::{apply_env_overrides, load_config, load_from_path, CONFIG_SEARCH_PATHS};
pub use structs::*;
