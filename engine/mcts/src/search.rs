//! The search driver.
//!
//! One `Search` owns a position, an evaluator and the root of the tree. A
//! search run spawns worker threads that share the tree; each worker forks
//! the root position, descends by selection while holding virtual losses,
//! expands (or terminally scores) the leaf and backs the evaluation up the
//! path. The driver supervises the budget, streams analysis records and
//! extracts the final move choice.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use engine_core::{Color, GameState, Vertex, PASS, RESIGN};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use thiserror::Error;
use tracing::{debug, info, trace, warn};

use crate::analysis::{analysis_record, verbose_summary, AnalysisConfig, AnalysisSink};
use crate::evaluator::{Evaluator, EvaluatorError};
use crate::expand::{expand_node, prepare_root};
use crate::lcb::LcbTable;
use crate::node::{Node, NodeEvals};
use crate::params::{ParamsError, SearchParams};
use crate::select::SelectCtx;
use crate::time_manager::TimeManager;

/// Consecutive evaluator failures tolerated before a run gives up.
const MAX_EVAL_FAILURES: u32 = 64;

/// Errors a search can surface. Transient trouble inside a playout recovers
/// locally; only configuration and total evaluator loss reach the caller.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ParamsError),

    #[error("evaluator unavailable: {0}")]
    Evaluator(#[from] EvaluatorError),
}

/// How a computation request treats its budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputationTag {
    /// Time control and early-stop reductions apply.
    Normal,
    /// Run the full playout budget, ignoring the clock and early stop.
    Forced,
}

/// Outcome of one search run.
#[derive(Debug, Clone)]
pub struct SearchReport {
    pub best_move: Vertex,
    pub root_visits: u32,
    /// Completed playouts in this run.
    pub playouts: u32,
    /// Winrate of the chosen move for the side to move at the root.
    pub best_winrate: f32,
    pub root_winrate: f32,
    pub root_score_lead: f32,
    pub pv: Vec<Vertex>,
}

/// Handle for interrupting a running search from another thread.
#[derive(Debug, Clone)]
pub struct SearchStopper(Arc<AtomicBool>);

impl SearchStopper {
    pub fn stop(&self) {
        self.0.store(true, Ordering::Release);
    }
}

enum PlayoutOutcome {
    Completed,
    Aborted,
    EvaluatorFailed,
}

/// The rules-based evaluation of a finished position.
fn terminal_evals<S: GameState>(state: &S) -> NodeEvals {
    let mut ownership = vec![0.0f32; state.num_intersections()];
    state.pass_alive_ownership(&mut ownership);
    let score = state.simple_final_score(state.komi());
    const EPS: f32 = 1e-4;
    let (black_wl, draw) = if score > EPS {
        (1.0, 0.0)
    } else if score < -EPS {
        (0.0, 0.0)
    } else {
        (0.5, 1.0)
    };
    NodeEvals {
        black_wl,
        draw,
        black_final_score: score,
        black_ownership: ownership,
    }
}

/// One descent: select downward under virtual loss, expand or terminally
/// score the leaf, and back the result up the path. An aborted descent
/// (expansion race, invalid node, evaluator hiccup) releases its virtual
/// losses and leaves every statistic untouched.
#[allow(clippy::too_many_arguments)]
fn run_playout<S, E>(
    root: &Node,
    root_state: &S,
    evaluator: &E,
    params: &SearchParams,
    noise: Option<&[f32]>,
    analysis: Option<&AnalysisConfig>,
    rng: &mut ChaCha20Rng,
) -> PlayoutOutcome
where
    S: GameState,
    E: Evaluator<S>,
{
    let mut state = root_state.clone();
    root.increment_threads();
    let mut path: Vec<&Node> = Vec::with_capacity(64);
    path.push(root);
    let mut node: &Node = root;
    let mut is_root = true;
    let mut failed = false;

    let evals: Option<NodeEvals> = loop {
        if !node.is_valid() {
            break None;
        }

        if state.passes() >= 2 {
            // Two consecutive passes end the game; the node becomes
            // terminal and the rules supply the evaluation.
            if node.expandable() {
                node.set_terminal();
            }
            if !node.is_expanded() {
                break None;
            }
            let evals = terminal_evals(&state);
            node.apply_evals(&evals);
            break Some(evals);
        }

        if node.expandable() {
            match expand_node(node, &state, evaluator, params, analysis, is_root) {
                Ok(Some(evals)) => break Some(evals),
                Ok(None) => {}
                Err(err) => {
                    warn!(error = %err, "expansion failed, playout dropped");
                    failed = true;
                    break None;
                }
            }
        }
        if node.is_expanding() {
            // Another worker owns the expansion; back off and retry from
            // the top rather than blocking the descent.
            break None;
        }
        node.wait_expanded();
        if !node.has_children() {
            let evals = terminal_evals(&state);
            break Some(evals);
        }

        let color = state.to_move();
        let child = if params.rollout_selection() {
            node.uct_select_child(color, &state, params)
        } else {
            let mut ctx = SelectCtx {
                params,
                root_noise: noise,
                num_intersections: state.num_intersections(),
                rng,
            };
            node.puct_select_child(color, is_root, &mut ctx)
        };
        child.increment_threads();
        state.play_assume_legal(child.vertex());
        path.push(child);
        node = child;
        is_root = false;
    };

    match evals {
        Some(evals) => {
            for visited in path.iter().rev() {
                visited.update(&evals);
                visited.decrement_threads();
            }
            PlayoutOutcome::Completed
        }
        None => {
            for visited in path.iter().rev() {
                visited.decrement_threads();
            }
            if failed {
                PlayoutOutcome::EvaluatorFailed
            } else {
                PlayoutOutcome::Aborted
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn worker_loop<S, E>(
    root: &Node,
    root_state: &S,
    evaluator: &E,
    params: &SearchParams,
    noise: Option<&[f32]>,
    analysis: Option<&AnalysisConfig>,
    stop: &AtomicBool,
    playouts_done: &AtomicU32,
    failures: &AtomicU32,
    max_playouts: u32,
    deadline: Option<Instant>,
    rng: &mut ChaCha20Rng,
) where
    S: GameState,
    E: Evaluator<S>,
{
    loop {
        if stop.load(Ordering::Acquire) {
            break;
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            stop.store(true, Ordering::Release);
            break;
        }
        if playouts_done.load(Ordering::Relaxed) >= max_playouts {
            break;
        }
        match run_playout(root, root_state, evaluator, params, noise, analysis, rng) {
            PlayoutOutcome::Completed => {
                playouts_done.fetch_add(1, Ordering::Relaxed);
                failures.store(0, Ordering::Relaxed);
            }
            PlayoutOutcome::Aborted => std::thread::yield_now(),
            PlayoutOutcome::EvaluatorFailed => {
                if failures.fetch_add(1, Ordering::Relaxed) + 1 >= MAX_EVAL_FAILURES {
                    warn!("evaluator keeps failing, stopping the search");
                    stop.store(true, Ordering::Release);
                    break;
                }
            }
        }
    }
}

/// The search driver: position, evaluator, tree and clocks.
pub struct Search<S: GameState, E: Evaluator<S>> {
    state: S,
    evaluator: E,
    params: SearchParams,
    lcb: LcbTable,
    time_manager: TimeManager,
    root: Option<Box<Node>>,
    stop: Arc<AtomicBool>,
    rng: ChaCha20Rng,
}

impl<S: GameState, E: Evaluator<S>> Search<S, E> {
    pub fn new(state: S, evaluator: E, params: SearchParams) -> Result<Self, SearchError> {
        params.validate()?;
        let lcb = LcbTable::new(params.ci_alpha);
        let rng = ChaCha20Rng::seed_from_u64(params.seed);
        Ok(Self {
            state,
            evaluator,
            params,
            lcb,
            time_manager: TimeManager::new(),
            root: None,
            stop: Arc::new(AtomicBool::new(false)),
            rng,
        })
    }

    pub fn state(&self) -> &S {
        &self.state
    }

    pub fn params(&self) -> &SearchParams {
        &self.params
    }

    pub fn time_manager_mut(&mut self) -> &mut TimeManager {
        &mut self.time_manager
    }

    /// The current root, if a tree exists.
    pub fn root(&self) -> Option<&Node> {
        self.root.as_deref()
    }

    /// Interrupt handle; clone it to another thread to stop a running
    /// search or ponder.
    pub fn stopper(&self) -> SearchStopper {
        SearchStopper(Arc::clone(&self.stop))
    }

    /// Replace the position. The tree survives only if the position is
    /// unchanged.
    pub fn set_state(&mut self, state: S) {
        if state.hash() != self.state.hash() {
            self.root = None;
        }
        self.state = state;
    }

    /// Advance the internal position by an actual move. With `reuse_tree`
    /// the matching subtree becomes the new root; everything else is
    /// dropped.
    pub fn play_move(&mut self, vertex: Vertex) -> bool {
        if !self.state.play(vertex) {
            return false;
        }
        self.root = if self.params.reuse_tree {
            let reused = self
                .root
                .take()
                .and_then(|mut root| root.pop_child(vertex));
            if reused.is_some() {
                trace!(vertex, "subtree reused as new root");
            }
            reused
        } else {
            None
        };
        true
    }

    pub fn clear_tree(&mut self) {
        self.root = None;
    }

    /// Run a fixed-playout computation.
    pub fn computation(
        &mut self,
        playouts: u32,
        tag: ComputationTag,
    ) -> Result<SearchReport, SearchError> {
        if self.game_over() {
            return Ok(self.finished_report());
        }
        let (playouts, deadline) = match tag {
            ComputationTag::Forced => (playouts, None),
            ComputationTag::Normal => {
                let (budget_playouts, deadline) = self.move_budget();
                (playouts.min(budget_playouts), deadline)
            }
        };
        self.run_search(playouts, deadline, None)
    }

    /// Search under the time control and report the move to play, or the
    /// resign sentinel in hopeless positions.
    pub fn think_best_move(&mut self) -> Result<Vertex, SearchError> {
        if self.game_over() {
            return Ok(PASS);
        }
        let color = self.state.to_move();
        let started = Instant::now();
        let (playouts, deadline) = self.move_budget();
        let report = self.run_search(playouts, deadline, None)?;
        self.time_manager.consume(color, started.elapsed());

        if report.root_visits >= self.params.resign_playouts
            && report.best_winrate < self.params.resign_threshold
        {
            debug!(winrate = report.best_winrate, "resigning");
            return Ok(RESIGN);
        }
        Ok(report.best_move)
    }

    /// Stream analysis records while searching. With `keep_running` the
    /// search goes on until the stopper fires (the ponder/analyze loop);
    /// otherwise the regular budget applies and the chosen move returns.
    pub fn analyze(
        &mut self,
        keep_running: bool,
        config: &AnalysisConfig,
        sink: &dyn AnalysisSink,
    ) -> Result<Option<Vertex>, SearchError> {
        if self.game_over() {
            return Ok((!keep_running).then_some(PASS));
        }
        let (playouts, deadline) = if keep_running {
            (u32::MAX / 2, None)
        } else {
            self.move_budget()
        };
        let report = self.run_search(playouts, deadline, Some((config, sink)))?;
        Ok((!keep_running).then_some(report.best_move))
    }

    /// Background search on the opponent's time: runs until interrupted,
    /// with the budget widened by the ponder factor.
    pub fn ponder(&mut self) -> Result<SearchReport, SearchError> {
        if self.game_over() {
            return Ok(self.finished_report());
        }
        let playouts = self
            .params
            .playouts
            .saturating_mul(self.params.ponder_factor.max(1));
        self.run_search(playouts, None, None)
    }

    /// Temperature-proportional move choice over the root's visit counts,
    /// considering only children above `min_visits`. Falls back first to
    /// every visited child, then to the strongest prior.
    pub fn randomize_best_move(&mut self, temperature: f32, min_visits: u32) -> Vertex {
        let mut min_visits = min_visits;
        loop {
            let Some(root) = self.root.as_deref() else {
                return self.policy_fallback_move();
            };
            let mut accum = 0.0f32;
            let mut accum_list: Vec<(f32, Vertex)> = Vec::new();
            for edge in root.children() {
                if let Some(node) = edge.get() {
                    let visits = node.visits();
                    if visits > min_visits {
                        accum += (visits as f32).powf(1.0 / temperature);
                        accum_list.push((accum, node.vertex()));
                    }
                }
            }
            if accum_list.is_empty() {
                if min_visits > 0 {
                    // Nothing cleared the bar; retry counting every visit.
                    min_visits = 0;
                    continue;
                }
                return root.best_move(&self.params, &self.lcb);
            }
            let pick = self.rng.gen_range(0.0..accum);
            for (bound, vertex) in accum_list {
                if pick < bound {
                    return vertex;
                }
            }
            return PASS;
        }
    }

    /// Training policy target over the policy slots. Under Gumbel (or on
    /// request) this is the completed-Q-mixed target; otherwise the plain
    /// visit distribution.
    pub fn root_policy_target(&self) -> Option<Vec<f32>> {
        let root = self.root.as_deref()?;
        let color = root.color()?;
        let n = self.state.num_intersections();
        if self.params.gumbel || self.params.always_completed_q_policy {
            return Some(root.completed_q_policy(color, n, &self.params));
        }
        let mut target = vec![0.0f32; n + 1];
        let mut total = 0.0f32;
        for edge in root.children() {
            if let Some(node) = edge.get() {
                let visits = node.visits() as f32;
                target[engine_core::policy_slot(edge.vertex(), n)] = visits;
                total += visits;
            }
        }
        if total > 0.0 {
            for v in target.iter_mut() {
                *v /= total;
            }
        }
        Some(target)
    }

    fn game_over(&self) -> bool {
        self.state.passes() >= 2
    }

    fn finished_report(&self) -> SearchReport {
        SearchReport {
            best_move: PASS,
            root_visits: 0,
            playouts: 0,
            best_winrate: 0.5,
            root_winrate: 0.5,
            root_score_lead: 0.0,
            pv: Vec::new(),
        }
    }

    /// Playout and wall-clock budget for the next move.
    fn move_budget(&mut self) -> (u32, Option<Instant>) {
        let mut playouts = self.params.playouts;
        if self.params.reduce_playouts > 0
            && self.rng.gen::<f32>() < self.params.reduce_playouts_prob
        {
            trace!(reduced = self.params.reduce_playouts, "early-stop budget");
            playouts = playouts.min(self.params.reduce_playouts);
        }
        let deadline = self
            .time_manager
            .budget(
                self.state.to_move(),
                self.state.num_intersections(),
                self.state.move_number(),
                &self.params,
            )
            .map(|budget| Instant::now() + budget);
        (playouts, deadline)
    }

    /// Best legal move straight off the pattern policy; the no-search
    /// escape hatch when the root cannot expand.
    fn policy_fallback_move(&self) -> Vertex {
        let color = self.state.to_move();
        let policy = self.state.pattern_policy(color);
        policy
            .iter()
            .enumerate()
            .filter(|(_, &p)| p > 0.0)
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(idx, _)| idx as Vertex)
            .unwrap_or(PASS)
    }

    fn run_search(
        &mut self,
        max_playouts: u32,
        deadline: Option<Instant>,
        analysis: Option<(&AnalysisConfig, &dyn AnalysisSink)>,
    ) -> Result<SearchReport, SearchError> {
        self.stop.store(false, Ordering::Release);

        let mut root = self
            .root
            .take()
            .unwrap_or_else(|| Box::new(Node::new_root()));

        let analysis_config = analysis.map(|(config, _)| config);
        let prep = prepare_root(
            &mut root,
            &self.state,
            &self.evaluator,
            &self.params,
            analysis_config,
            &mut self.rng,
        );
        let (root_evals, noise) = match prep {
            Ok(prep) => prep,
            Err(err) => {
                // No evaluation at the root: answer from the policy alone.
                warn!(error = %err, "root expansion failed, returning policy move");
                let best_move = self.policy_fallback_move();
                return Ok(SearchReport {
                    best_move,
                    root_visits: 0,
                    playouts: 0,
                    best_winrate: 0.5,
                    root_winrate: 0.5,
                    root_score_lead: 0.0,
                    pv: vec![best_move],
                });
            }
        };
        if let Some(evals) = &root_evals {
            root.update(evals);
        }

        let playouts_done = AtomicU32::new(0);
        let failures = AtomicU32::new(0);
        let started = Instant::now();

        {
            let root: &Node = &root;
            let state = &self.state;
            let evaluator = &self.evaluator;
            let params = &self.params;
            let lcb = &self.lcb;
            let stop: &AtomicBool = &self.stop;
            let noise = noise.as_deref();
            let seed = self.params.seed;
            let playouts_done = &playouts_done;
            let failures = &failures;

            std::thread::scope(|scope| {
                for thread_index in 0..params.threads {
                    let mut rng = ChaCha20Rng::seed_from_u64(
                        seed ^ (thread_index as u64).wrapping_mul(0x9e37_79b9_7f4a_7c15),
                    );
                    scope.spawn(move || {
                        worker_loop(
                            root,
                            state,
                            evaluator,
                            params,
                            noise,
                            analysis_config,
                            stop,
                            playouts_done,
                            failures,
                            max_playouts,
                            deadline,
                            &mut rng,
                        );
                    });
                }

                // Supervise: watch the budget and pace the analysis output.
                let mut next_emit = analysis.and_then(|(config, _)| {
                    (config.interval_centis > 0).then(|| started + config.interval())
                });
                loop {
                    if stop.load(Ordering::Acquire)
                        || playouts_done.load(Ordering::Relaxed) >= max_playouts
                    {
                        break;
                    }
                    let now = Instant::now();
                    if deadline.is_some_and(|d| now >= d) {
                        stop.store(true, Ordering::Release);
                        break;
                    }
                    if let (Some((config, sink)), Some(at)) = (analysis, next_emit) {
                        if now >= at {
                            let record = analysis_record(root, state, config, params, lcb);
                            if !record.is_empty() {
                                sink.emit(&record);
                            }
                            next_emit = Some(now + config.interval());
                        }
                    }
                    std::thread::sleep(Duration::from_millis(2));
                }
            });
        }

        debug_assert_eq!(root.running_threads(), 0);

        if let Some((config, sink)) = analysis {
            let record = analysis_record(&root, &self.state, config, &self.params, &self.lcb);
            if !record.is_empty() {
                sink.emit(&record);
            }
        }

        let color = root.color().unwrap_or(Color::Black);
        let best_move = if self.params.gumbel && self.params.gumbel_playouts > 0 {
            let mut ctx = SelectCtx {
                params: &self.params,
                root_noise: None,
                num_intersections: self.state.num_intersections(),
                rng: &mut self.rng,
            };
            root.gumbel_move(&mut ctx)
        } else {
            root.best_move(&self.params, &self.lcb)
        };
        let best_winrate = root
            .get_child(best_move)
            .filter(|child| child.visits() > 0)
            .map(|child| child.wl(color, false))
            .unwrap_or_else(|| root.net_wl(color));

        let report = SearchReport {
            best_move,
            root_visits: root.visits(),
            playouts: playouts_done.load(Ordering::Relaxed),
            best_winrate,
            root_winrate: root.wl(color, false),
            root_score_lead: root.final_score(color),
            pv: root.principal_variation(&self.params, &self.lcb),
        };

        trace!(
            playouts = report.playouts,
            visits = report.root_visits,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "search finished"
        );
        if self.params.analysis_verbose {
            info!(
                "\n{}",
                verbose_summary(&root, &self.state, &self.params, &self.lcb)
            );
        }

        self.root = Some(root);
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::{Ensemble, NetResult, UniformEvaluator};
    use games_go::GoState;
    use std::sync::Mutex;

    /// Stub evaluator: fixed priors by vertex, value judged by which of two
    /// probe points holds a black stone.
    struct ProbeEvaluator {
        priors: Vec<(Vertex, f32)>,
        pass_policy: f32,
        good_black: Option<Vertex>,
        bad_black: Option<Vertex>,
    }

    impl ProbeEvaluator {
        fn with_priors(priors: Vec<(Vertex, f32)>) -> Self {
            Self {
                priors,
                pass_policy: 0.01,
                good_black: None,
                bad_black: None,
            }
        }
    }

    impl Evaluator<GoState> for ProbeEvaluator {
        fn evaluate(
            &self,
            state: &GoState,
            _ensemble: Ensemble,
            _temperature: f32,
        ) -> Result<NetResult, EvaluatorError> {
            let n = state.num_intersections();
            let mut policy = vec![1e-4f32; n];
            for &(vertex, prior) in &self.priors {
                policy[vertex as usize] = prior;
            }

            let black_wl = if self
                .good_black
                .is_some_and(|v| state.stone_at(v as usize) == Some(Color::Black))
            {
                0.9
            } else if self
                .bad_black
                .is_some_and(|v| state.stone_at(v as usize) == Some(Color::Black))
            {
                0.1
            } else {
                0.5
            };
            let stm_wl = match state.to_move() {
                Color::Black => black_wl,
                Color::White => 1.0 - black_wl,
            };
            Ok(NetResult {
                policy,
                pass_policy: self.pass_policy,
                wdl: [stm_wl, 0.0, 1.0 - stm_wl],
                stm_winrate: stm_wl,
                final_score: 0.0,
                ownership: vec![0.0; n],
                board_size: state.board_size(),
                komi: state.komi(),
            })
        }
    }

    fn quick_params() -> SearchParams {
        SearchParams::for_testing()
    }

    #[test]
    fn test_single_playout_expansion() {
        // A 9x9 board with the policy peaked on the center point.
        let state = GoState::new(9, 7.0);
        let center = state.vertex_of(4, 4);
        let evaluator = ProbeEvaluator::with_priors(vec![(center, 0.9)]);
        let mut search =
            Search::new(state, evaluator, quick_params().with_playouts(1)).unwrap();

        let report = search
            .computation(1, ComputationTag::Forced)
            .unwrap();
        let root = search.root().unwrap();

        assert!(root.has_children());
        // The board is wide open, so pass was suppressed by the 3/4 rule.
        assert!(root.children().iter().all(|e| e.vertex() != PASS));
        // The center carries almost all the renormalized mass and sits
        // first in the descending-prior order.
        let first = &root.children()[0];
        assert_eq!(first.vertex(), center);
        assert!(first.policy() > 0.9);
        // Root evaluation plus one playout.
        assert_eq!(report.playouts, 1);
        assert_eq!(root.visits(), 2);
        assert!((root.wl(Color::Black, false) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_puct_argmax_follows_prior_quality() {
        let state = GoState::new(5, 0.0);
        let a = state.vertex_of(1, 1);
        let b = state.vertex_of(3, 3);
        let evaluator = ProbeEvaluator::with_priors(vec![(a, 0.1), (b, 0.9)]);
        let mut search = Search::new(state, evaluator, quick_params()).unwrap();

        let report = search.computation(16, ComputationTag::Forced).unwrap();
        let root = search.root().unwrap();
        let visits_a = root.get_child(a).map_or(0, Node::visits);
        let visits_b = root.get_child(b).map_or(0, Node::visits);
        assert!(visits_b > visits_a, "b {} vs a {}", visits_b, visits_a);
        assert_eq!(report.best_move, b);
    }

    #[test]
    fn test_virtual_loss_parallel_search() {
        // Two equal-prior candidates with sharply different values; four
        // workers must still pile onto the good one, finish cleanly and
        // release every virtual loss.
        let state = GoState::new(5, 0.0);
        let good = state.vertex_of(1, 1);
        let bad = state.vertex_of(3, 3);
        let evaluator = ProbeEvaluator {
            priors: vec![(good, 0.45), (bad, 0.45)],
            pass_policy: 0.01,
            good_black: Some(good),
            bad_black: Some(bad),
        };
        let params = quick_params().with_threads(4).with_playouts(1000);
        let mut search = Search::new(state, evaluator, params).unwrap();

        let report = search.computation(1000, ComputationTag::Forced).unwrap();
        let root = search.root().unwrap();

        assert_eq!(root.running_threads(), 0);
        let visits_good = root.get_child(good).map_or(0, Node::visits) as f32;
        assert!(report.playouts >= 900);
        assert!(
            visits_good / report.playouts as f32 >= 0.7,
            "good child got {} of {} playouts",
            visits_good,
            report.playouts
        );
        assert_eq!(report.best_move, good);
    }

    #[test]
    fn test_gumbel_schedule_through_driver() {
        let state = GoState::new(5, 0.0);
        let params = quick_params().with_gumbel(4, 1000);
        let mut search = Search::new(state, UniformEvaluator::new(), params).unwrap();
        search.computation(24, ComputationTag::Forced).unwrap();

        let root = search.root().unwrap();
        let mut visits: Vec<u32> = root
            .children()
            .iter()
            .map(|e| e.get().map_or(0, Node::visits))
            .collect();
        visits.sort_unstable_by(|x, y| y.cmp(x));
        // Two epochs of Sequential Halving over four arms.
        assert_eq!(&visits[..4], &[14, 6, 2, 2]);
        assert!(visits[4..].iter().all(|&v| v == 0));
    }

    #[test]
    fn test_gumbel_with_zero_budget_matches_puct() {
        let run = |gumbel: bool| {
            let state = GoState::new(5, 0.0);
            let mut params = quick_params().with_seed(99);
            if gumbel {
                params = params.with_gumbel(4, 0);
            }
            let mut search = Search::new(state, UniformEvaluator::new(), params).unwrap();
            let report = search.computation(40, ComputationTag::Forced).unwrap();
            let visits: Vec<u32> = search
                .root()
                .unwrap()
                .children()
                .iter()
                .map(|e| e.get().map_or(0, Node::visits))
                .collect();
            (report.best_move, visits)
        };
        assert_eq!(run(false), run(true));
    }

    #[test]
    fn test_single_thread_determinism() {
        let run = || {
            let state = GoState::new(9, 7.0);
            let params = quick_params().with_seed(1234).with_playouts(50);
            let mut search = Search::new(state, UniformEvaluator::new(), params).unwrap();
            search.computation(50, ComputationTag::Forced).unwrap().best_move
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_visits_match_children_after_drain() {
        let state = GoState::new(5, 0.0);
        let mut search =
            Search::new(state, UniformEvaluator::new(), quick_params()).unwrap();
        search.computation(60, ComputationTag::Forced).unwrap();
        let root = search.root().unwrap();
        let child_sum: u32 = root
            .children()
            .iter()
            .map(|e| e.get().map_or(0, Node::visits))
            .sum();
        // Every backup but the root's own evaluation went through a child.
        assert_eq!(root.visits(), child_sum + 1);
    }

    #[test]
    fn test_lcb_best_move_prefers_well_explored() {
        // Few-visit child with flashy winrate loses to a well-explored one.
        let state = GoState::new(5, 0.0);
        let params = quick_params();
        let lcb = LcbTable::new(params.ci_alpha);
        let root = Node::new(engine_core::NULL_VERTEX, 1.0);
        assert!(root.acquire_expanding());
        root.set_color(Color::Black);
        root.set_children(vec![
            crate::node::Edge::new(7, 0.5),
            crate::node::Edge::new(9, 0.5),
        ]);
        root.expand_done();
        root.update(&NodeEvals {
            black_wl: 0.5,
            draw: 0.0,
            black_final_score: 0.0,
            black_ownership: Vec::new(),
        });

        let flashy = root.children()[0].inflate();
        let solid = root.children()[1].inflate();
        for i in 0..200 {
            let wl = if i % 2 == 0 { 0.62 } else { 0.58 };
            solid.update(&NodeEvals {
                black_wl: wl,
                draw: 0.0,
                black_final_score: 0.0,
                black_ownership: Vec::new(),
            });
            root.update(&NodeEvals {
                black_wl: wl,
                draw: 0.0,
                black_final_score: 0.0,
                black_ownership: Vec::new(),
            });
        }
        for wl in [0.95, 0.85] {
            flashy.update(&NodeEvals {
                black_wl: wl,
                draw: 0.0,
                black_final_score: 0.0,
                black_ownership: Vec::new(),
            });
            root.update(&NodeEvals {
                black_wl: wl,
                draw: 0.0,
                black_final_score: 0.0,
                black_ownership: Vec::new(),
            });
        }

        assert_eq!(root.best_move(&params, &lcb), 9);
        let list = root.lcb_utility_list(Color::Black, &params, &lcb);
        assert_eq!(list[0].1, 9);
    }

    #[test]
    fn test_lcb_reduction_one_is_visit_argmax() {
        let state = GoState::new(5, 0.0);
        let a = state.vertex_of(1, 1);
        let b = state.vertex_of(3, 3);
        let evaluator = ProbeEvaluator::with_priors(vec![(a, 0.2), (b, 0.6)]);
        let mut params = quick_params();
        params.lcb_reduction = 1.0;
        let mut search = Search::new(state, evaluator, params).unwrap();
        search.computation(32, ComputationTag::Forced).unwrap();
        let root = search.root().unwrap();
        let most_visited = root
            .children()
            .iter()
            .max_by_key(|e| e.get().map_or(0, Node::visits))
            .unwrap()
            .vertex();
        assert_eq!(
            root.best_move(search.params(), &LcbTable::new(1e-5)),
            most_visited
        );
    }

    #[test]
    fn test_tree_reuse_keeps_subtree() {
        let state = GoState::new(5, 0.0);
        let mut params = quick_params();
        params.reuse_tree = true;
        let mut search = Search::new(state, UniformEvaluator::new(), params).unwrap();
        let report = search.computation(40, ComputationTag::Forced).unwrap();
        let best = report.best_move;
        let kept_visits = search
            .root()
            .unwrap()
            .get_child(best)
            .map_or(0, Node::visits);
        assert!(kept_visits > 0);

        assert!(search.play_move(best));
        let root = search.root().expect("subtree reused");
        assert_eq!(root.visits(), kept_visits);

        // Without reuse the tree is dropped.
        let state = GoState::new(5, 0.0);
        let mut search =
            Search::new(state, UniformEvaluator::new(), quick_params()).unwrap();
        let report = search.computation(10, ComputationTag::Forced).unwrap();
        assert!(search.play_move(report.best_move));
        assert!(search.root().is_none());
    }

    #[test]
    fn test_root_expansion_failure_falls_back_to_policy() {
        struct DeadEvaluator;
        impl Evaluator<GoState> for DeadEvaluator {
            fn evaluate(
                &self,
                _state: &GoState,
                _ensemble: Ensemble,
                _temperature: f32,
            ) -> Result<NetResult, EvaluatorError> {
                Err(EvaluatorError::EvaluationFailed("offline".into()))
            }
        }
        let state = GoState::new(5, 0.0);
        let mut search = Search::new(state, DeadEvaluator, quick_params()).unwrap();
        let report = search.computation(10, ComputationTag::Forced).unwrap();
        assert_eq!(report.playouts, 0);
        assert!(report.best_move >= 0, "policy fallback returns a board move");
    }

    #[test]
    fn test_stopper_interrupts_analysis() {
        struct CountingSink(Mutex<usize>);
        impl AnalysisSink for CountingSink {
            fn emit(&self, _line: &str) {
                *self.0.lock().unwrap() += 1;
            }
        }

        let state = GoState::new(9, 7.0);
        let params = quick_params().with_playouts(u32::MAX / 2).with_threads(2);
        let mut search = Search::new(state, UniformEvaluator::new(), params).unwrap();
        let stopper = search.stopper();

        let sink = CountingSink(Mutex::new(0));
        let config = AnalysisConfig {
            interval_centis: 1,
            ..AnalysisConfig::default()
        };

        std::thread::scope(|scope| {
            scope.spawn(move || {
                std::thread::sleep(Duration::from_millis(120));
                stopper.stop();
            });
            let out = search.analyze(true, &config, &sink).unwrap();
            assert!(out.is_none());
        });
        assert!(*sink.0.lock().unwrap() >= 1);
        assert_eq!(search.root().unwrap().running_threads(), 0);
    }

    #[test]
    fn test_game_over_returns_pass() {
        let mut state = GoState::new(5, 0.0);
        assert!(state.play_move(state.vertex_of(2, 2)));
        assert!(state.play_move(PASS));
        assert!(state.play_move(PASS));
        let mut search =
            Search::new(state, UniformEvaluator::new(), quick_params()).unwrap();
        assert_eq!(search.think_best_move().unwrap(), PASS);
    }

    #[test]
    fn test_resignation_in_lost_position() {
        // Evaluator that hates Black everywhere.
        struct GrimEvaluator;
        impl Evaluator<GoState> for GrimEvaluator {
            fn evaluate(
                &self,
                state: &GoState,
                _ensemble: Ensemble,
                _temperature: f32,
            ) -> Result<NetResult, EvaluatorError> {
                let n = state.num_intersections();
                let stm_wl = match state.to_move() {
                    Color::Black => 0.02,
                    Color::White => 0.98,
                };
                Ok(NetResult {
                    policy: vec![1.0 / n as f32; n],
                    pass_policy: 0.01,
                    wdl: [stm_wl, 0.0, 1.0 - stm_wl],
                    stm_winrate: stm_wl,
                    final_score: -40.0,
                    ownership: vec![0.0; n],
                    board_size: state.board_size(),
                    komi: state.komi(),
                })
            }
        }

        let state = GoState::new(5, 0.0);
        let mut params = quick_params().with_playouts(30);
        params.resign_threshold = 0.1;
        params.resign_playouts = 10;
        let mut search = Search::new(state, GrimEvaluator, params).unwrap();
        assert_eq!(search.think_best_move().unwrap(), RESIGN);
    }

    #[test]
    fn test_rollout_mode_runs_without_network() {
        let state = GoState::new(5, 0.0);
        let mut params = quick_params();
        params.search_mode = crate::params::SearchMode::Rollout;
        let mut search = Search::new(state, UniformEvaluator::new(), params).unwrap();
        let report = search.computation(30, ComputationTag::Forced).unwrap();
        assert!(report.playouts > 0);
        assert!(report.best_move >= 0 || report.best_move == PASS);
    }
}
