//! Search configuration.
//!
//! One immutable record per search. The front end builds it once (from its
//! option surface), validates it, and hands it to the driver by reference;
//! nothing in the hot path reads configuration through string keys.

use thiserror::Error;

/// Rejected configuration values, surfaced before any search starts.
#[derive(Debug, Error)]
pub enum ParamsError {
    #[error("ci_alpha must lie in (0, 1), got {0}")]
    CiAlpha(f32),

    #[error("lcb_reduction must lie in [0, 1], got {0}")]
    LcbReduction(f32),

    #[error("dirichlet_epsilon must lie in [0, 1], got {0}")]
    DirichletEpsilon(f32),

    #[error("{name} must be positive, got {value}")]
    NotPositive { name: &'static str, value: f32 },

    #[error("threads must be at least 1")]
    NoThreads,
}

/// How child candidates are scored during descent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    /// Network policy/value everywhere (the default).
    Dcnn,
    /// Pattern policy everywhere, no network.
    NoDcnn,
    /// Pattern policy plus UCT selection with progressive widening.
    Rollout,
    /// Network at the root only, pattern policy below.
    RootDcnn,
}

/// Immutable per-search parameter record.
#[derive(Debug, Clone)]
pub struct SearchParams {
    // PUCT
    pub cpuct_init: f32,
    pub cpuct_base: f32,
    pub cpuct_base_factor: f32,
    pub draw_factor: f32,
    pub score_utility_factor: f32,
    pub score_utility_div: f32,
    pub fpu_reduction: f32,
    pub fpu_root_reduction: f32,

    // Policy shaping
    pub root_policy_temp: f32,
    pub policy_temp: f32,

    // Best-move rule
    pub ci_alpha: f32,
    pub lcb_reduction: f32,
    pub lcb_utility_factor: f32,

    // Gumbel
    pub gumbel: bool,
    pub gumbel_considered_moves: usize,
    pub gumbel_playouts: u32,
    pub completed_q_utility_factor: f32,
    pub always_completed_q_policy: bool,

    // Root exploration
    pub dirichlet_noise: bool,
    pub dirichlet_epsilon: f32,
    pub dirichlet_init: f32,
    pub dirichlet_factor: f32,

    // Expansion
    pub symm_pruning: bool,
    pub first_pass_bonus: bool,
    pub use_stm_winrate: bool,

    // Mode
    pub search_mode: SearchMode,

    // Driver
    pub threads: usize,
    pub playouts: u32,
    pub ponder: bool,
    pub reuse_tree: bool,
    pub analysis_verbose: bool,
    pub resign_threshold: f32,
    pub resign_playouts: u32,
    pub reduce_playouts: u32,
    pub reduce_playouts_prob: f32,
    pub cache_memory_mib: usize,
    pub batch_size: usize,

    // Time
    pub const_time_secs: f32,
    pub lag_buffer_secs: f32,
    pub ponder_factor: u32,

    /// Base RNG seed; workers derive their own streams from it.
    pub seed: u64,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            cpuct_init: 0.5,
            cpuct_base: 19_652.0,
            cpuct_base_factor: 1.0,
            draw_factor: 0.0,
            score_utility_factor: 0.1,
            score_utility_div: 20.0,
            fpu_reduction: 0.25,
            fpu_root_reduction: 0.25,
            root_policy_temp: 1.0,
            policy_temp: 1.0,
            ci_alpha: 1e-5,
            lcb_reduction: 0.02,
            lcb_utility_factor: 0.1,
            gumbel: false,
            gumbel_considered_moves: 16,
            gumbel_playouts: 400,
            completed_q_utility_factor: 0.0,
            always_completed_q_policy: false,
            dirichlet_noise: false,
            dirichlet_epsilon: 0.25,
            dirichlet_init: 0.03,
            dirichlet_factor: 361.0,
            symm_pruning: false,
            first_pass_bonus: false,
            use_stm_winrate: false,
            search_mode: SearchMode::Dcnn,
            threads: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            playouts: u32::MAX / 2,
            ponder: false,
            reuse_tree: false,
            analysis_verbose: false,
            resign_threshold: 0.1,
            resign_playouts: 0,
            reduce_playouts: 0,
            reduce_playouts_prob: 0.0,
            cache_memory_mib: 400,
            batch_size: 1,
            const_time_secs: 0.0,
            lag_buffer_secs: 0.0,
            ponder_factor: 100,
            seed: 0,
        }
    }
}

impl SearchParams {
    /// Check the record before it reaches the driver. Configuration is the
    /// only error class allowed to surface to the user.
    pub fn validate(&self) -> Result<(), ParamsError> {
        if !(self.ci_alpha > 0.0 && self.ci_alpha < 1.0) {
            return Err(ParamsError::CiAlpha(self.ci_alpha));
        }
        if !(0.0..=1.0).contains(&self.lcb_reduction) {
            return Err(ParamsError::LcbReduction(self.lcb_reduction));
        }
        if !(0.0..=1.0).contains(&self.dirichlet_epsilon) {
            return Err(ParamsError::DirichletEpsilon(self.dirichlet_epsilon));
        }
        for (name, value) in [
            ("cpuct_base", self.cpuct_base),
            ("score_utility_div", self.score_utility_div),
            ("root_policy_temp", self.root_policy_temp),
            ("policy_temp", self.policy_temp),
        ] {
            if value <= 0.0 {
                return Err(ParamsError::NotPositive { name, value });
            }
        }
        if self.threads == 0 {
            return Err(ParamsError::NoThreads);
        }
        Ok(())
    }

    /// Is the network consulted for this (root or interior) expansion?
    #[inline]
    pub fn use_network(&self, is_root: bool) -> bool {
        match self.search_mode {
            SearchMode::Dcnn => true,
            SearchMode::NoDcnn | SearchMode::Rollout => false,
            SearchMode::RootDcnn => is_root,
        }
    }

    /// UCT descent with progressive widening instead of PUCT.
    #[inline]
    pub fn rollout_selection(&self) -> bool {
        self.search_mode == SearchMode::Rollout
    }

    /// Small deterministic configuration for tests.
    pub fn for_testing() -> Self {
        Self {
            threads: 1,
            playouts: 100,
            seed: 42,
            ..Self::default()
        }
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    pub fn with_playouts(mut self, playouts: u32) -> Self {
        self.playouts = playouts;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_gumbel(mut self, considered_moves: usize, playouts: u32) -> Self {
        self.gumbel = true;
        self.gumbel_considered_moves = considered_moves;
        self.gumbel_playouts = playouts;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(SearchParams::default().validate().is_ok());
        assert!(SearchParams::for_testing().validate().is_ok());
    }

    #[test]
    fn test_ci_alpha_bounds() {
        let mut p = SearchParams::default();
        p.ci_alpha = 0.0;
        assert!(matches!(p.validate(), Err(ParamsError::CiAlpha(_))));
        p.ci_alpha = 1.0;
        assert!(p.validate().is_err());
        p.ci_alpha = 0.05;
        assert!(p.validate().is_ok());
    }

    #[test]
    fn test_mode_network_gate() {
        let mut p = SearchParams::default();
        assert!(p.use_network(false));
        p.search_mode = SearchMode::NoDcnn;
        assert!(!p.use_network(true));
        p.search_mode = SearchMode::RootDcnn;
        assert!(p.use_network(true));
        assert!(!p.use_network(false));
        p.search_mode = SearchMode::Rollout;
        assert!(p.rollout_selection());
    }

    #[test]
    fn test_builder() {
        let p = SearchParams::for_testing().with_playouts(7).with_seed(9);
        assert_eq!(p.playouts, 7);
        assert_eq!(p.seed, 9);
    }
}
