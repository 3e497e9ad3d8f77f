//! Configuration struct definitions.
//!
//! All config structs with serde deserialization support and default
//! values, plus the conversions into the typed records the search takes.

use mcts::{AnalysisConfig, AnalysisDialect, ParamsError, SearchMode, SearchParams};
use serde::Deserialize;
use thiserror::Error;

use crate::defaults;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown search mode '{0}' (expected dcnn, nodcnn, rollout or rootdcnn)")]
    UnknownSearchMode(String),

    #[error("unknown analysis dialect '{0}' (expected native, kata or leelaz)")]
    UnknownDialect(String),

    #[error(transparent)]
    Invalid(#[from] ParamsError),
}

// ============================================================================
// Serde default functions (required for #[serde(default = "...")])
// ============================================================================

fn d_board_size() -> usize {
    defaults::BOARD_SIZE
}
fn d_komi() -> f32 {
    defaults::KOMI
}
fn d_threads() -> usize {
    defaults::THREADS
}
fn d_playouts() -> i64 {
    defaults::PLAYOUTS
}
fn d_batch_size() -> usize {
    defaults::BATCH_SIZE
}
fn d_cache_memory_mib() -> usize {
    defaults::CACHE_MEMORY_MIB
}
fn d_search_mode() -> String {
    defaults::SEARCH_MODE.into()
}
fn d_ponder() -> bool {
    defaults::PONDER
}
fn d_reuse_tree() -> bool {
    defaults::REUSE_TREE
}
fn d_analysis_verbose() -> bool {
    defaults::ANALYSIS_VERBOSE
}
fn d_ci_alpha() -> f32 {
    defaults::CI_ALPHA
}
fn d_lcb_reduction() -> f32 {
    defaults::LCB_REDUCTION
}
fn d_lcb_utility_factor() -> f32 {
    defaults::LCB_UTILITY_FACTOR
}
fn d_fpu_reduction() -> f32 {
    defaults::FPU_REDUCTION
}
fn d_cpuct_init() -> f32 {
    defaults::CPUCT_INIT
}
fn d_cpuct_base() -> f32 {
    defaults::CPUCT_BASE
}
fn d_cpuct_base_factor() -> f32 {
    defaults::CPUCT_BASE_FACTOR
}
fn d_draw_factor() -> f32 {
    defaults::DRAW_FACTOR
}
fn d_score_utility_factor() -> f32 {
    defaults::SCORE_UTILITY_FACTOR
}
fn d_score_utility_div() -> f32 {
    defaults::SCORE_UTILITY_DIV
}
fn d_completed_q_utility_factor() -> f32 {
    defaults::COMPLETED_Q_UTILITY_FACTOR
}
fn d_root_policy_temp() -> f32 {
    defaults::ROOT_POLICY_TEMP
}
fn d_policy_temp() -> f32 {
    defaults::POLICY_TEMP
}
fn d_resign_threshold() -> f32 {
    defaults::RESIGN_THRESHOLD
}
fn d_resign_playouts() -> u32 {
    defaults::RESIGN_PLAYOUTS
}
fn d_reduce_playouts() -> u32 {
    defaults::REDUCE_PLAYOUTS
}
fn d_reduce_playouts_prob() -> f32 {
    defaults::REDUCE_PLAYOUTS_PROB
}
fn d_dirichlet_noise() -> bool {
    defaults::DIRICHLET_NOISE
}
fn d_dirichlet_epsilon() -> f32 {
    defaults::DIRICHLET_EPSILON
}
fn d_dirichlet_init() -> f32 {
    defaults::DIRICHLET_INIT
}
fn d_dirichlet_factor() -> f32 {
    defaults::DIRICHLET_FACTOR
}
fn d_gumbel() -> bool {
    defaults::GUMBEL
}
fn d_gumbel_considered_moves() -> usize {
    defaults::GUMBEL_CONSIDERED_MOVES
}
fn d_gumbel_playouts() -> u32 {
    defaults::GUMBEL_PLAYOUTS
}
fn d_always_completed_q_policy() -> bool {
    defaults::ALWAYS_COMPLETED_Q_POLICY
}
fn d_first_pass_bonus() -> bool {
    defaults::FIRST_PASS_BONUS
}
fn d_symm_pruning() -> bool {
    defaults::SYMM_PRUNING
}
fn d_use_stm_winrate() -> bool {
    defaults::USE_STM_WINRATE
}
fn d_seed() -> u64 {
    defaults::SEED
}
fn d_const_time() -> f32 {
    defaults::CONST_TIME_SECS
}
fn d_lag_buffer() -> f32 {
    defaults::LAG_BUFFER_SECS
}
fn d_ponder_factor() -> u32 {
    defaults::PONDER_FACTOR
}
fn d_interval_centis() -> u32 {
    defaults::ANALYSIS_INTERVAL_CENTIS
}
fn d_max_moves() -> usize {
    defaults::ANALYSIS_MAX_MOVES
}
fn d_ownership() -> bool {
    defaults::ANALYSIS_OWNERSHIP
}
fn d_moves_ownership() -> bool {
    defaults::ANALYSIS_MOVES_OWNERSHIP
}
fn d_dialect() -> String {
    defaults::ANALYSIS_DIALECT.into()
}

// ============================================================================
// Config sections
// ============================================================================

/// Board settings the front end needs to set up a game.
#[derive(Debug, Clone, Deserialize)]
pub struct GameSection {
    #[serde(default = "d_board_size")]
    pub board_size: usize,
    #[serde(default = "d_komi")]
    pub komi: f32,
}

impl Default for GameSection {
    fn default() -> Self {
        Self {
            board_size: d_board_size(),
            komi: d_komi(),
        }
    }
}

/// Everything the search itself consumes.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchSection {
    #[serde(default = "d_threads")]
    pub threads: usize,
    #[serde(default = "d_playouts")]
    pub playouts: i64,
    #[serde(default = "d_batch_size")]
    pub batch_size: usize,
    #[serde(default = "d_cache_memory_mib")]
    pub cache_memory_mib: usize,
    #[serde(default = "d_search_mode")]
    pub search_mode: String,
    #[serde(default = "d_ponder")]
    pub ponder: bool,
    #[serde(default = "d_reuse_tree")]
    pub reuse_tree: bool,
    #[serde(default = "d_analysis_verbose")]
    pub analysis_verbose: bool,

    #[serde(default = "d_ci_alpha")]
    pub ci_alpha: f32,
    #[serde(default = "d_lcb_reduction")]
    pub lcb_reduction: f32,
    #[serde(default = "d_lcb_utility_factor")]
    pub lcb_utility_factor: f32,
    #[serde(default = "d_fpu_reduction")]
    pub fpu_reduction: f32,
    /// Root FPU falls back to `fpu_reduction` when absent.
    #[serde(default)]
    pub fpu_root_reduction: Option<f32>,
    #[serde(default = "d_cpuct_init")]
    pub cpuct_init: f32,
    #[serde(default = "d_cpuct_base")]
    pub cpuct_base: f32,
    #[serde(default = "d_cpuct_base_factor")]
    pub cpuct_base_factor: f32,
    #[serde(default = "d_draw_factor")]
    pub draw_factor: f32,
    #[serde(default = "d_score_utility_factor")]
    pub score_utility_factor: f32,
    #[serde(default = "d_score_utility_div")]
    pub score_utility_div: f32,
    #[serde(default = "d_completed_q_utility_factor")]
    pub completed_q_utility_factor: f32,
    #[serde(default = "d_root_policy_temp")]
    pub root_policy_temp: f32,
    #[serde(default = "d_policy_temp")]
    pub policy_temp: f32,

    #[serde(default = "d_resign_threshold")]
    pub resign_threshold: f32,
    #[serde(default = "d_resign_playouts")]
    pub resign_playouts: u32,
    #[serde(default = "d_reduce_playouts")]
    pub reduce_playouts: u32,
    #[serde(default = "d_reduce_playouts_prob")]
    pub reduce_playouts_prob: f32,

    #[serde(default = "d_dirichlet_noise")]
    pub dirichlet_noise: bool,
    #[serde(default = "d_dirichlet_epsilon")]
    pub dirichlet_epsilon: f32,
    #[serde(default = "d_dirichlet_init")]
    pub dirichlet_init: f32,
    #[serde(default = "d_dirichlet_factor")]
    pub dirichlet_factor: f32,

    #[serde(default = "d_gumbel")]
    pub gumbel: bool,
    #[serde(default = "d_gumbel_considered_moves")]
    pub gumbel_considered_moves: usize,
    #[serde(default = "d_gumbel_playouts")]
    pub gumbel_playouts: u32,
    #[serde(default = "d_always_completed_q_policy")]
    pub always_completed_q_policy: bool,

    #[serde(default = "d_first_pass_bonus")]
    pub first_pass_bonus: bool,
    #[serde(default = "d_symm_pruning")]
    pub symm_pruning: bool,
    #[serde(default = "d_use_stm_winrate")]
    pub use_stm_winrate: bool,
    #[serde(default = "d_seed")]
    pub seed: u64,
}

impl Default for SearchSection {
    fn default() -> Self {
        Self {
            threads: d_threads(),
            playouts: d_playouts(),
            batch_size: d_batch_size(),
            cache_memory_mib: d_cache_memory_mib(),
            search_mode: d_search_mode(),
            ponder: d_ponder(),
            reuse_tree: d_reuse_tree(),
            analysis_verbose: d_analysis_verbose(),
            ci_alpha: d_ci_alpha(),
            lcb_reduction: d_lcb_reduction(),
            lcb_utility_factor: d_lcb_utility_factor(),
            fpu_reduction: d_fpu_reduction(),
            fpu_root_reduction: None,
            cpuct_init: d_cpuct_init(),
            cpuct_base: d_cpuct_base(),
            cpuct_base_factor: d_cpuct_base_factor(),
            draw_factor: d_draw_factor(),
            score_utility_factor: d_score_utility_factor(),
            score_utility_div: d_score_utility_div(),
            completed_q_utility_factor: d_completed_q_utility_factor(),
            root_policy_temp: d_root_policy_temp(),
            policy_temp: d_policy_temp(),
            resign_threshold: d_resign_threshold(),
            resign_playouts: d_resign_playouts(),
            reduce_playouts: d_reduce_playouts(),
            reduce_playouts_prob: d_reduce_playouts_prob(),
            dirichlet_noise: d_dirichlet_noise(),
            dirichlet_epsilon: d_dirichlet_epsilon(),
            dirichlet_init: d_dirichlet_init(),
            dirichlet_factor: d_dirichlet_factor(),
            gumbel: d_gumbel(),
            gumbel_considered_moves: d_gumbel_considered_moves(),
            gumbel_playouts: d_gumbel_playouts(),
            always_completed_q_policy: d_always_completed_q_policy(),
            first_pass_bonus: d_first_pass_bonus(),
            symm_pruning: d_symm_pruning(),
            use_stm_winrate: d_use_stm_winrate(),
            seed: d_seed(),
        }
    }
}

/// Clock-related knobs.
#[derive(Debug, Clone, Deserialize)]
pub struct TimeSection {
    #[serde(default = "d_const_time")]
    pub const_time_secs: f32,
    #[serde(default = "d_lag_buffer")]
    pub lag_buffer_secs: f32,
    #[serde(default = "d_ponder_factor")]
    pub ponder_factor: u32,
}

impl Default for TimeSection {
    fn default() -> Self {
        Self {
            const_time_secs: d_const_time(),
            lag_buffer_secs: d_lag_buffer(),
            ponder_factor: d_ponder_factor(),
        }
    }
}

/// Analysis output settings.
#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisSection {
    #[serde(default = "d_interval_centis")]
    pub interval_centis: u32,
    #[serde(default = "d_max_moves")]
    pub max_moves: usize,
    #[serde(default = "d_ownership")]
    pub ownership: bool,
    #[serde(default = "d_moves_ownership")]
    pub moves_ownership: bool,
    #[serde(default = "d_dialect")]
    pub dialect: String,
}

impl Default for AnalysisSection {
    fn default() -> Self {
        Self {
            interval_centis: d_interval_centis(),
            max_moves: d_max_moves(),
            ownership: d_ownership(),
            moves_ownership: d_moves_ownership(),
            dialect: d_dialect(),
        }
    }
}

/// The whole configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CentralConfig {
    #[serde(default)]
    pub game: GameSection,
    #[serde(default)]
    pub search: SearchSection,
    #[serde(default)]
    pub time: TimeSection,
    #[serde(default)]
    pub analysis: AnalysisSection,
}

impl CentralConfig {
    /// Build the validated search parameter record.
    pub fn search_params(&self) -> Result<SearchParams, ConfigError> {
        let search_mode = match self.search.search_mode.as_str() {
            "dcnn" => SearchMode::Dcnn,
            "nodcnn" => SearchMode::NoDcnn,
            "rollout" => SearchMode::Rollout,
            "rootdcnn" => SearchMode::RootDcnn,
            other => return Err(ConfigError::UnknownSearchMode(other.to_string())),
        };
        let threads = if self.search.threads == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        } else {
            self.search.threads
        };
        let batch_size = if self.search.batch_size == 0 {
            (threads / 2).max(1)
        } else {
            self.search.batch_size
        };
        let playouts = if self.search.playouts < 0 {
            u32::MAX / 2
        } else {
            self.search.playouts.min(i64::from(u32::MAX / 2)) as u32
        };

        let params = SearchParams {
            cpuct_init: self.search.cpuct_init,
            cpuct_base: self.search.cpuct_base,
            cpuct_base_factor: self.search.cpuct_base_factor,
            draw_factor: self.search.draw_factor,
            score_utility_factor: self.search.score_utility_factor,
            score_utility_div: self.search.score_utility_div,
            fpu_reduction: self.search.fpu_reduction,
            fpu_root_reduction: self
                .search
                .fpu_root_reduction
                .unwrap_or(self.search.fpu_reduction),
            root_policy_temp: self.search.root_policy_temp,
            policy_temp: self.search.policy_temp,
            ci_alpha: self.search.ci_alpha,
            lcb_reduction: self.search.lcb_reduction,
            lcb_utility_factor: self.search.lcb_utility_factor,
            gumbel: self.search.gumbel,
            gumbel_considered_moves: self.search.gumbel_considered_moves,
            gumbel_playouts: self.search.gumbel_playouts,
            completed_q_utility_factor: self.search.completed_q_utility_factor,
            always_completed_q_policy: self.search.always_completed_q_policy,
            dirichlet_noise: self.search.dirichlet_noise,
            dirichlet_epsilon: self.search.dirichlet_epsilon,
            dirichlet_init: self.search.dirichlet_init,
            dirichlet_factor: self.search.dirichlet_factor,
            symm_pruning: self.search.symm_pruning,
            first_pass_bonus: self.search.first_pass_bonus,
            use_stm_winrate: self.search.use_stm_winrate,
            search_mode,
            threads,
            playouts,
            ponder: self.search.ponder,
            reuse_tree: self.search.reuse_tree,
            analysis_verbose: self.search.analysis_verbose,
            resign_threshold: self.search.resign_threshold,
            resign_playouts: self.search.resign_playouts,
            reduce_playouts: self.search.reduce_playouts,
            reduce_playouts_prob: self.search.reduce_playouts_prob,
            cache_memory_mib: self.search.cache_memory_mib,
            batch_size,
            const_time_secs: self.time.const_time_secs,
            lag_buffer_secs: self.time.lag_buffer_secs,
            ponder_factor: self.time.ponder_factor,
            seed: self.search.seed,
        };
        params.validate()?;
        Ok(params)
    }

    /// Build the analysis request record.
    pub fn analysis_config(&self) -> Result<AnalysisConfig, ConfigError> {
        let dialect = match self.analysis.dialect.as_str() {
            "native" => AnalysisDialect::Native,
            "kata" => AnalysisDialect::Kata,
            "leelaz" | "lz" => AnalysisDialect::Leelaz,
            other => return Err(ConfigError::UnknownDialect(other.to_string())),
        };
        Ok(AnalysisConfig {
            interval_centis: self.analysis.interval_centis,
            max_moves: self.analysis.max_moves,
            ownership: self.analysis.ownership,
            moves_ownership: self.analysis.moves_ownership,
            dialect,
            avoid: Vec::new(),
            allow: Vec::new(),
        })
    }
}
