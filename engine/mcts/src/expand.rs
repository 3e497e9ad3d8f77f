//! Node expansion.
//!
//! Exactly one worker may expand a node: the winner of the CAS on the
//! expansion state evaluates the position, enumerates and renormalizes the
//! candidate children, publishes them sorted by descending prior, and
//! releases the handshake. Everyone else either proceeds on the published
//! children or backs off and retries from the parent.

use engine_core::{transform_vertex, Color, GameState, NUM_SYMMETRIES, PASS};
use rand_chacha::ChaCha20Rng;
use rand_distr::{Distribution, Gamma};
use tracing::trace;

use crate::analysis::AnalysisConfig;
use crate::evaluator::{black_orientation, Ensemble, Evaluator, EvaluatorError, NetResult};
use crate::node::{Edge, Node, NodeEvals};
use crate::params::SearchParams;

/// Rewinds the expansion handshake unless the expansion publishes. Keeps the
/// node reusable on every exit path, including evaluator failures.
struct ExpandGuard<'a> {
    node: &'a Node,
    armed: bool,
}

impl<'a> ExpandGuard<'a> {
    fn new(node: &'a Node) -> Self {
        Self { node, armed: true }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for ExpandGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.node.expand_cancel();
        }
    }
}

/// Synthesize an evaluator result from the board's pattern policy when the
/// network is switched off.
fn pattern_result<S: GameState>(state: &S, color: Color) -> NetResult {
    let n = state.num_intersections();
    NetResult {
        policy: state.pattern_policy(color),
        // A sliver of pass mass avoids a dead end when nothing is legal.
        pass_policy: 0.1 / n as f32,
        wdl: [0.5, 0.0, 0.5],
        stm_winrate: 0.5,
        final_score: 0.0,
        ownership: vec![0.0; n],
        board_size: state.board_size(),
        komi: state.komi(),
    }
}

/// Expand `node` for the position in `state`.
///
/// Returns `Ok(Some(evals))` when this call performed the expansion,
/// `Ok(None)` when another worker holds or finished it, and an error when
/// the evaluator failed (the handshake is rewound and the caller must
/// release its virtual losses).
pub(crate) fn expand_node<S, E>(
    node: &Node,
    state: &S,
    evaluator: &E,
    params: &SearchParams,
    analysis: Option<&AnalysisConfig>,
    is_root: bool,
) -> Result<Option<NodeEvals>, EvaluatorError>
where
    S: GameState,
    E: Evaluator<S>,
{
    debug_assert!(state.passes() < 2);
    if !node.acquire_expanding() {
        return Ok(None);
    }
    let mut guard = ExpandGuard::new(node);

    let color = state.to_move();
    node.set_color(color);

    let temperature = if is_root {
        params.root_policy_temp
    } else {
        params.policy_temp
    };

    let result = if params.use_network(is_root) {
        evaluator.evaluate(state, Ensemble::Random, temperature)?
    } else {
        pattern_result(state, color)
    };

    let n = state.num_intersections();
    if result.policy.len() != n || result.ownership.len() != n {
        return Err(EvaluatorError::EvaluationFailed(format!(
            "policy/ownership size mismatch: got {}/{}, board has {}",
            result.policy.len(),
            result.ownership.len(),
            n
        )));
    }

    // Snapshot the evaluation Black-oriented before touching the children.
    let (black_wl, black_score) = black_orientation(&result, color, params.use_stm_winrate);
    let mut black_ownership = result.ownership.clone();
    if color == Color::White {
        for owner in black_ownership.iter_mut() {
            *owner = -*owner;
        }
    }
    node.set_net_black_wl(black_wl);
    let evals = NodeEvals {
        black_wl,
        draw: result.wdl[1],
        black_final_score: black_score,
        black_ownership,
    };

    // Candidate children: legal, outside the safe area, not vetoed, and not
    // a symmetry duplicate in the opening.
    let board_size = state.board_size();
    let safe_area = state.strict_safe_area();
    let move_number = state.move_number();
    let filter = analysis.map(|config| {
        move |vertex, color| config.permits(vertex, color, move_number)
    });

    let apply_symm_pruning =
        params.symm_pruning && move_number <= board_size as u32;
    let mut symm_base = [0u64; NUM_SYMMETRIES];
    if apply_symm_pruning {
        for (symm, base) in symm_base.iter_mut().enumerate() {
            *base = state.symmetry_hash(symm);
        }
    }

    let mut candidates: Vec<(f32, i16)> = Vec::new();
    let mut moves_hash: Vec<u64> = Vec::new();
    let mut legal_accumulate = 0.0f32;

    for idx in 0..n {
        let vertex = idx as i16;
        let policy = result.policy[idx];

        if safe_area[idx] {
            continue;
        }
        let legal = match &filter {
            Some(f) => state.is_legal_filtered(vertex, color, Some(f)),
            None => state.is_legal(vertex, color),
        };
        if !legal {
            continue;
        }

        if apply_symm_pruning {
            // The incremental next-position hash ignores captures, which is
            // fine this early in the game.
            let hash_found = (1..NUM_SYMMETRIES).any(|symm| {
                let symm_vtx = transform_vertex(board_size, symm, vertex);
                let symm_hash = symm_base[symm] ^ state.move_hash(symm_vtx, color);
                moves_hash.contains(&symm_hash)
            });
            if hash_found {
                // A pruned twin is still a legal move; its mass stays in
                // the normalizer.
                legal_accumulate += policy;
                continue;
            }
            moves_hash.push(state.hash() ^ state.move_hash(vertex, color));
        }

        candidates.push((policy, vertex));
        legal_accumulate += policy;
    }

    // With most of the board still open, passing is never worth a visit.
    let allow_pass = candidates.len() <= 3 * n / 4;
    if allow_pass || candidates.is_empty() {
        candidates.push((result.pass_policy, PASS));
        legal_accumulate += result.pass_policy;
    }

    if legal_accumulate < 1e-8 {
        // The policy mass sat entirely on illegal moves.
        let uniform = 1.0 / candidates.len() as f32;
        for candidate in candidates.iter_mut() {
            candidate.0 = uniform;
        }
    } else {
        for candidate in candidates.iter_mut() {
            candidate.0 /= legal_accumulate;
        }
    }

    candidates.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    let children: Vec<Edge> = candidates
        .into_iter()
        .map(|(policy, vertex)| Edge::new(vertex, policy))
        .collect();
    debug_assert!(!children.is_empty());

    trace!(
        vertex = node.vertex(),
        children = children.len(),
        is_root,
        "node expanded"
    );

    node.set_children(children);
    guard.disarm();
    node.expand_done();

    Ok(Some(evals))
}

/// Noise amplitudes per policy slot for the root's children, or `None` when
/// the Gamma sample collapses.
fn dirichlet_buffer(
    root: &Node,
    num_intersections: usize,
    params: &SearchParams,
    rng: &mut ChaCha20Rng,
) -> Vec<f32> {
    let child_count = root.children().len();
    let mut buffer = vec![0.0f32; num_intersections + 1];
    if child_count == 0 {
        return buffer;
    }

    let alpha = params.dirichlet_init * params.dirichlet_factor / child_count as f32;
    if alpha <= 0.0 {
        return buffer;
    }
    let gamma = Gamma::new(f64::from(alpha), 1.0).unwrap();
    let mut samples: Vec<f32> = (0..child_count)
        .map(|_| gamma.sample(rng) as f32)
        .collect();

    let sum: f32 = samples.iter().sum();
    if sum < f32::MIN_POSITIVE {
        // Degenerate draw; leave the buffer silent rather than divide by it.
        return buffer;
    }
    for sample in samples.iter_mut() {
        *sample /= sum;
    }

    for (edge, sample) in root.children().iter().zip(samples.iter()) {
        let slot = engine_core::policy_slot(edge.vertex(), num_intersections);
        buffer[slot] = *sample;
    }
    buffer
}

/// Root preparation: expand (when fresh), inflate every child, draw the
/// Dirichlet buffer, set the score bonuses and prune superko children.
///
/// Returns the root evaluation (when this call expanded it) and the noise
/// buffer (when noise is enabled).
pub(crate) fn prepare_root<S, E>(
    root: &mut Node,
    state: &S,
    evaluator: &E,
    params: &SearchParams,
    analysis: Option<&AnalysisConfig>,
    rng: &mut ChaCha20Rng,
) -> Result<(Option<NodeEvals>, Option<Vec<f32>>), EvaluatorError>
where
    S: GameState,
    E: Evaluator<S>,
{
    let evals = expand_node(root, state, evaluator, params, analysis, true)?;
    debug_assert!(root.has_children());

    for edge in root.children() {
        edge.inflate();
    }

    let noise = params.dirichlet_noise.then(|| {
        dirichlet_buffer(root, state.num_intersections(), params, rng)
    });

    root.set_score_bonus(0.0);
    for edge in root.children() {
        let child = edge.inflate();
        let bonus = if params.first_pass_bonus && edge.vertex() == PASS {
            // Half a komi point nudges the game toward actually ending.
            0.5
        } else {
            0.0
        };
        child.set_score_bonus(bonus);
    }

    kill_root_superkos(root, state);

    Ok((evals, noise))
}

/// Invalidate and drop root children whose move would recreate an earlier
/// whole-board position.
fn kill_root_superkos<S: GameState>(root: &mut Node, state: &S) {
    for edge in root.children() {
        let vertex = edge.vertex();
        if vertex == PASS {
            continue;
        }
        let mut fork = state.clone();
        fork.play_assume_legal(vertex);
        if fork.is_superko() {
            if let Some(child) = edge.get() {
                child.invalidate();
            }
            trace!(vertex, "superko child pruned at root");
        }
    }
    if let Some(children) = root.children_mut() {
        children.retain(|edge| edge.get().is_none_or(Node::is_valid));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::UniformEvaluator;
    use games_go::GoState;
    use rand::SeedableRng;

    fn expand_fresh(
        state: &GoState,
        params: &SearchParams,
    ) -> (Node, Option<NodeEvals>) {
        let node = Node::new(engine_core::NULL_VERTEX, 1.0);
        let evals = expand_node(
            &node,
            state,
            &UniformEvaluator::new(),
            params,
            None,
            false,
        )
        .unwrap();
        (node, evals)
    }

    #[test]
    fn test_expansion_publishes_sorted_children() {
        let state = GoState::new(5, 0.0);
        let params = SearchParams::for_testing();
        let (node, evals) = expand_fresh(&state, &params);

        assert!(evals.is_some());
        assert!(node.is_expanded());
        assert!(node.has_children());
        assert_eq!(node.color(), Some(Color::Black));

        let children = node.children();
        assert!(!children.is_empty());
        for pair in children.windows(2) {
            assert!(pair[0].policy() >= pair[1].policy());
        }
        let sum: f32 = children.iter().map(Edge::policy).sum();
        assert!((sum - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_expansion_race_returns_none() {
        let state = GoState::new(5, 0.0);
        let params = SearchParams::for_testing();
        let node = Node::new(engine_core::NULL_VERTEX, 1.0);
        assert!(node.acquire_expanding());
        let out = expand_node(
            &node,
            &state,
            &UniformEvaluator::new(),
            &params,
            None,
            false,
        )
        .unwrap();
        assert!(out.is_none());
        node.expand_cancel();
    }

    #[test]
    fn test_evaluator_failure_cancels() {
        struct FailingEvaluator;
        impl<S: GameState> Evaluator<S> for FailingEvaluator {
            fn evaluate(
                &self,
                _state: &S,
                _ensemble: Ensemble,
                _temperature: f32,
            ) -> Result<NetResult, EvaluatorError> {
                Err(EvaluatorError::EvaluationFailed("down".into()))
            }
        }

        let state = GoState::new(5, 0.0);
        let params = SearchParams::for_testing();
        let node = Node::new(engine_core::NULL_VERTEX, 1.0);
        let out = expand_node(&node, &state, &FailingEvaluator, &params, None, false);
        assert!(out.is_err());
        // The handshake must be rewound so a later attempt can succeed.
        assert!(node.expandable());
        let retry = expand_node(
            &node,
            &state,
            &UniformEvaluator::new(),
            &params,
            None,
            false,
        )
        .unwrap();
        assert!(retry.is_some());
    }

    #[test]
    fn test_pass_disabled_on_open_board() {
        // An empty board has every intersection legal, which exceeds the
        // three-quarters threshold, so pass is not among the children.
        let state = GoState::new(5, 0.0);
        let params = SearchParams::for_testing();
        let (node, _) = expand_fresh(&state, &params);
        assert!(node.children().iter().all(|e| e.vertex() != PASS));
    }

    #[test]
    fn test_pattern_expansion_without_network() {
        let state = GoState::new(5, 0.0);
        let mut params = SearchParams::for_testing();
        params.search_mode = crate::params::SearchMode::NoDcnn;
        let (node, evals) = expand_fresh(&state, &params);
        let evals = evals.unwrap();
        assert!((evals.black_wl - 0.5).abs() < 1e-6);
        assert!(evals.black_ownership.iter().all(|&o| o == 0.0));
        assert!(node.has_children());
    }

    #[test]
    fn test_move_filter_vetoes_candidates() {
        let state = GoState::new(5, 0.0);
        let params = SearchParams::for_testing();
        let banned = state.vertex_of(2, 2);
        let mut config = AnalysisConfig::default();
        config.avoid.push(crate::analysis::MoveRestriction {
            vertex: banned,
            color: Color::Black,
            until_move: 100,
        });
        let node = Node::new(engine_core::NULL_VERTEX, 1.0);
        let out = expand_node(
            &node,
            &state,
            &UniformEvaluator::new(),
            &params,
            Some(&config),
            false,
        )
        .unwrap();
        assert!(out.is_some());
        assert!(node.children().iter().all(|e| e.vertex() != banned));
    }

    #[test]
    fn test_symmetry_pruning_keeps_policy_mass() {
        let state = GoState::new(5, 0.0);
        let mut params = SearchParams::for_testing();
        params.symm_pruning = true;
        let (node, _) = expand_fresh(&state, &params);
        // The empty board has only a handful of symmetry-distinct moves
        // (6 on 5x5), far fewer than 25.
        assert!(node.children().len() < 25);
        assert!(!node.children().is_empty());
        // The pruned twins' mass was accumulated, so priors still sum to 1.
        let sum: f32 = node.children().iter().map(Edge::policy).sum();
        assert!((sum - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_prepare_root_sets_first_pass_bonus() {
        let mut state = GoState::new(5, 0.0);
        // Put enough stones down that the legal move count drops below the
        // three-quarters threshold and the pass child exists.
        for x in 0..4 {
            assert!(state.play_move(state.vertex_of(x, 0)));
            assert!(state.play_move(state.vertex_of(x, 2)));
        }
        let mut params = SearchParams::for_testing();
        params.first_pass_bonus = true;
        let mut root = Node::new(engine_core::NULL_VERTEX, 1.0);
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        let (evals, noise) = prepare_root(
            &mut root,
            &state,
            &UniformEvaluator::new(),
            &params,
            None,
            &mut rng,
        )
        .unwrap();
        assert!(evals.is_some());
        assert!(noise.is_none());
        let pass_edge = root
            .children()
            .iter()
            .find(|e| e.vertex() == PASS)
            .expect("pass child present on a crowded board");
        assert!((pass_edge.get().unwrap().score_bonus() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_prepare_root_noise_buffer() {
        let state = GoState::new(5, 0.0);
        let mut params = SearchParams::for_testing();
        params.dirichlet_noise = true;
        let mut root = Node::new(engine_core::NULL_VERTEX, 1.0);
        let mut rng = ChaCha20Rng::seed_from_u64(5);
        let (_, noise) = prepare_root(
            &mut root,
            &state,
            &UniformEvaluator::new(),
            &params,
            None,
            &mut rng,
        )
        .unwrap();
        let noise = noise.expect("noise requested");
        let sum: f32 = noise.iter().sum();
        assert!((sum - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_prepare_root_prunes_superko() {
        // Send two, return one: Black sacrifices two stones in the corner,
        // White captures both and stands in atari; Black recapturing at
        // (1,0) would exactly recreate the position after move six.
        let mut state = GoState::new(5, 0.0);
        for (x, y) in [
            (1, 0), // B
            (0, 1), // W
            (3, 0), // B
            (1, 1), // W
            (2, 1), // B
            (4, 4), // W elsewhere
            (0, 0), // B sends two
            (2, 0), // W captures both
        ] {
            assert!(state.play_move(state.vertex_of(x, y)));
        }
        assert_eq!(state.passes(), 0);

        let offending = state.vertex_of(1, 0);
        {
            // The offending move really is legal and really does repeat.
            let mut fork = state.clone();
            assert!(fork.play_move(offending));
            assert!(fork.superko());
        }
        let params = SearchParams::for_testing();
        let mut root = Node::new(engine_core::NULL_VERTEX, 1.0);
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        prepare_root(
            &mut root,
            &state,
            &UniformEvaluator::new(),
            &params,
            None,
            &mut rng,
        )
        .unwrap();
        assert!(root
            .children()
            .iter()
            .all(|edge| edge.vertex() != offending));
        assert!(!root.children().is_empty());
    }
}
