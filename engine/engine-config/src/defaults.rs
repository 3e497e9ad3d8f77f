//! Default configuration values.
//!
//! The single source of truth for every default the config surface knows.
//! The search-parameter values mirror `mcts::SearchParams::default()`.

// Game defaults
pub const BOARD_SIZE: usize = 19;
pub const KOMI: f32 = 7.5;

// Search defaults
pub const THREADS: usize = 0; // 0 = pick from hardware parallelism
pub const PLAYOUTS: i64 = -1; // negative = unbounded
pub const BATCH_SIZE: usize = 0; // 0 = derive from threads
pub const CACHE_MEMORY_MIB: usize = 400;
pub const SEARCH_MODE: &str = "dcnn";
pub const PONDER: bool = false;
pub const REUSE_TREE: bool = false;
pub const ANALYSIS_VERBOSE: bool = false;

pub const CI_ALPHA: f32 = 1e-5;
pub const LCB_REDUCTION: f32 = 0.02;
pub const LCB_UTILITY_FACTOR: f32 = 0.1;
pub const FPU_REDUCTION: f32 = 0.25;
pub const CPUCT_INIT: f32 = 0.5;
pub const CPUCT_BASE: f32 = 19_652.0;
pub const CPUCT_BASE_FACTOR: f32 = 1.0;
pub const DRAW_FACTOR: f32 = 0.0;
pub const SCORE_UTILITY_FACTOR: f32 = 0.1;
pub const SCORE_UTILITY_DIV: f32 = 20.0;
pub const COMPLETED_Q_UTILITY_FACTOR: f32 = 0.0;
pub const ROOT_POLICY_TEMP: f32 = 1.0;
pub const POLICY_TEMP: f32 = 1.0;

pub const RESIGN_THRESHOLD: f32 = 0.1;
pub const RESIGN_PLAYOUTS: u32 = 0;
pub const REDUCE_PLAYOUTS: u32 = 0;
pub const REDUCE_PLAYOUTS_PROB: f32 = 0.0;

pub const DIRICHLET_NOISE: bool = false;
pub const DIRICHLET_EPSILON: f32 = 0.25;
pub const DIRICHLET_INIT: f32 = 0.03;
pub const DIRICHLET_FACTOR: f32 = 361.0;

pub const GUMBEL: bool = false;
pub const GUMBEL_CONSIDERED_MOVES: usize = 16;
pub const GUMBEL_PLAYOUTS: u32 = 400;
pub const ALWAYS_COMPLETED_Q_POLICY: bool = false;

pub const FIRST_PASS_BONUS: bool = false;
pub const SYMM_PRUNING: bool = false;
pub const USE_STM_WINRATE: bool = false;
pub const SEED: u64 = 0;

// Time defaults
pub const CONST_TIME_SECS: f32 = 0.0;
pub const LAG_BUFFER_SECS: f32 = 0.0;
pub const PONDER_FACTOR: u32 = 100;

// Analysis defaults
pub const ANALYSIS_INTERVAL_CENTIS: u32 = 0;
pub const ANALYSIS_MAX_MOVES: usize = usize::MAX;
pub const ANALYSIS_OWNERSHIP: bool = false;
pub const ANALYSIS_MOVES_OWNERSHIP: bool = false;
pub const ANALYSIS_DIALECT: &str = "native";
