//! Parallel neural-network-guided Monte Carlo tree search.
//!
//! The search tree is shared by worker threads without locks on the hot
//! path: node statistics are atomics, children are published once through
//! an expansion handshake, and concurrent descents repel each other through
//! virtual losses. Each playout runs four phases:
//!
//! 1. **Selection**: descend by PUCT (or UCT in rollout mode, or the
//!    Gumbel Sequential Halving schedule at the root)
//! 2. **Expansion**: the single CAS winner evaluates the leaf and publishes
//!    its children sorted by prior
//! 3. **Evaluation**: the network (or the board's pattern policy) supplies
//!    policy, value, score and ownership; results are cached by position
//!    fingerprint
//! 4. **Backup**: visit counts, value accumulators and Welford variance
//!    update atomically from leaf to root
//!
//! Move choice combines lower confidence bounds with score utility; in
//! Gumbel mode the schedule's max-visit arm is chosen instead. The driver
//! handles time controls, pondering, analysis streaming, subtree reuse and
//! resignation.
//!
//! The board rules and the network sit behind the `engine_core::GameState`
//! and [`Evaluator`] seams; nothing in this crate depends on a concrete
//! game or model.

pub mod analysis;
pub mod atomics;
pub mod cache;
pub mod evaluator;
pub mod expand;
pub mod gumbel;
pub mod lcb;
pub mod node;
pub mod params;
pub mod search;
pub mod select;
pub mod time_manager;

// Re-export main types
pub use analysis::{AnalysisConfig, AnalysisDialect, AnalysisSink, MoveRestriction, StdoutSink};
pub use atomics::AtomicF64;
pub use cache::{CachedEvaluator, EvalCache};
pub use evaluator::{softmax, Ensemble, Evaluator, EvaluatorError, NetResult, UniformEvaluator};
pub use lcb::LcbTable;
pub use node::{Edge, Node, NodeEvals, VIRTUAL_LOSS_COUNT};
pub use params::{ParamsError, SearchMode, SearchParams};
pub use search::{ComputationTag, Search, SearchError, SearchReport, SearchStopper};
pub use select::SelectCtx;
pub use time_manager::{TimeControl, TimeManager};
