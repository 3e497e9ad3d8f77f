//! Configuration loading logic.
//!
//! Handles loading config from files and applying environment variable
//! overrides.

use std::path::PathBuf;

use tracing::{debug, info, warn};

use crate::CentralConfig;

/// Standard locations to search for hoshi.toml
pub const CONFIG_SEARCH_PATHS: &[&str] = &[
    "hoshi.toml",    // Current directory
    "../hoshi.toml", // Parent directory (when running from a subdirectory)
    "/etc/hoshi/hoshi.toml",
];

/// Load the central configuration from hoshi.toml.
///
/// Searches for hoshi.toml in the following order:
/// 1. Path specified by the HOSHI_CONFIG environment variable
/// 2. Current directory
/// 3. Parent directory
/// 4. /etc/hoshi
///
/// After loading, environment variable overrides are applied.
pub fn load_config() -> CentralConfig {
    if let Ok(path) = std::env::var("HOSHI_CONFIG") {
        let path = PathBuf::from(&path);
        if path.exists() {
            info!("Loading config from HOSHI_CONFIG: {}", path.display());
            return load_from_path(&path);
        }
        warn!(
            "HOSHI_CONFIG={} not found, searching defaults",
            path.display()
        );
    }

    for path_str in CONFIG_SEARCH_PATHS {
        let path = PathBuf::from(path_str);
        if path.exists() {
            info!("Loading config from {}", path.display());
            return load_from_path(&path);
        }
    }

    debug!("No hoshi.toml found, using built-in defaults");
    apply_env_overrides(CentralConfig::default())
}

/// Load configuration from a specific path.
pub fn load_from_path(path: &PathBuf) -> CentralConfig {
    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => apply_env_overrides(config),
            Err(e) => {
                warn!("Failed to parse {}: {}, using defaults", path.display(), e);
                apply_env_overrides(CentralConfig::default())
            }
        },
        Err(e) => {
            warn!("Failed to read {}: {}, using defaults", path.display(), e);
            apply_env_overrides(CentralConfig::default())
        }
    }
}

/// Macro to reduce env override boilerplate
macro_rules! env_override {
    // String field
    ($config:expr, $section:ident . $field:ident, $key:expr) => {
        if let Ok(v) = std::env::var($key) {
            $config.$section.$field = v;
        }
    };
    // Parseable field (usize, u32, f32, bool, ...)
    ($config:expr, $section:ident . $field:ident, $key:expr, parse) => {
        if let Ok(v) =
            std::env::var($key).and_then(|s| s.parse().map_err(|_| std::env::VarError::NotPresent))
        {
            $config.$section.$field = v;
        }
    };
}

/// Apply environment variable overrides to a configuration.
///
/// Environment variables follow the pattern: HOSHI_<SECTION>_<KEY>
pub fn apply_env_overrides(mut config: CentralConfig) -> CentralConfig {
    // Game
    env_override!(config, game.board_size, "HOSHI_GAME_BOARD_SIZE", parse);
    env_override!(config, game.komi, "HOSHI_GAME_KOMI", parse);

    // Search
    env_override!(config, search.threads, "HOSHI_SEARCH_THREADS", parse);
    env_override!(config, search.playouts, "HOSHI_SEARCH_PLAYOUTS", parse);
    env_override!(config, search.batch_size, "HOSHI_SEARCH_BATCH_SIZE", parse);
    env_override!(
        config,
        search.cache_memory_mib,
        "HOSHI_SEARCH_CACHE_MEMORY_MIB",
        parse
    );
    env_override!(config, search.search_mode, "HOSHI_SEARCH_SEARCH_MODE");
    env_override!(config, search.ponder, "HOSHI_SEARCH_PONDER", parse);
    env_override!(config, search.reuse_tree, "HOSHI_SEARCH_REUSE_TREE", parse);
    env_override!(
        config,
        search.analysis_verbose,
        "HOSHI_SEARCH_ANALYSIS_VERBOSE",
        parse
    );
    env_override!(config, search.ci_alpha, "HOSHI_SEARCH_CI_ALPHA", parse);
    env_override!(
        config,
        search.lcb_reduction,
        "HOSHI_SEARCH_LCB_REDUCTION",
        parse
    );
    env_override!(
        config,
        search.resign_threshold,
        "HOSHI_SEARCH_RESIGN_THRESHOLD",
        parse
    );
    env_override!(config, search.gumbel, "HOSHI_SEARCH_GUMBEL", parse);
    env_override!(
        config,
        search.gumbel_playouts,
        "HOSHI_SEARCH_GUMBEL_PLAYOUTS",
        parse
    );
    env_override!(
        config,
        search.dirichlet_noise,
        "HOSHI_SEARCH_DIRICHLET_NOISE",
        parse
    );
    env_override!(
        config,
        search.symm_pruning,
        "HOSHI_SEARCH_SYMM_PRUNING",
        parse
    );
    env_override!(config, search.seed, "HOSHI_SEARCH_SEED", parse);

    // Time
    env_override!(config, time.const_time_secs, "HOSHI_TIME_CONST_TIME_SECS", parse);
    env_override!(
        config,
        time.lag_buffer_secs,
        "HOSHI_TIME_LAG_BUFFER_SECS",
        parse
    );
    env_override!(config, time.ponder_factor, "HOSHI_TIME_PONDER_FACTOR", parse);

    // Analysis
    env_override!(
        config,
        analysis.interval_centis,
        "HOSHI_ANALYSIS_INTERVAL_CENTIS",
        parse
    );
    env_override!(config, analysis.max_moves, "HOSHI_ANALYSIS_MAX_MOVES", parse);
    env_override!(config, analysis.ownership, "HOSHI_ANALYSIS_OWNERSHIP", parse);
    env_override!(config, analysis.dialect, "HOSHI_ANALYSIS_DIALECT");

    config
}
