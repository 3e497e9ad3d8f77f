//! Child selection during descent.
//!
//! Three scoring rules share the same shape: visit the children, score each
//! candidate, inflate the winner. PUCT is the default; UCT with progressive
//! widening serves rollout mode; the plain prior argmax backs fallback
//! paths. Gumbel root selection lives in `gumbel.rs` and is dispatched from
//! here.

use engine_core::{Color, GameState, Vertex};
use rand_chacha::ChaCha20Rng;

use crate::node::{Edge, Node};
use crate::params::SearchParams;

/// Shared read-only context for one descent step.
pub struct SelectCtx<'a> {
    pub params: &'a SearchParams,
    /// Dirichlet noise per policy slot, present at the root only.
    pub root_noise: Option<&'a [f32]>,
    pub num_intersections: usize,
    pub rng: &'a mut ChaCha20Rng,
}

impl<'a> SelectCtx<'a> {
    /// The prior used for scoring, mixed with root noise when enabled.
    fn search_policy(&self, edge: &Edge, noise_on: bool) -> f32 {
        let policy = edge.policy();
        match (noise_on, self.root_noise) {
            (true, Some(noise)) => {
                let slot = engine_core::policy_slot(edge.vertex(), self.num_intersections);
                let epsilon = self.params.dirichlet_epsilon;
                policy * (1.0 - epsilon) + epsilon * noise[slot]
            }
            _ => policy,
        }
    }
}

/// Progressive widening schedule: how many of the best-prior candidates UCT
/// may consider at `parent_visits`. Monotone non-decreasing and at least 1.
pub(crate) fn compute_width(parent_visits: u32) -> usize {
    ((parent_visits + 1) as f32).powf(0.4).floor().max(1.0) as usize
}

impl Node {
    /// PUCT child selection, the default descent rule.
    pub fn puct_select_child<'a>(
        &'a self,
        color: Color,
        is_root: bool,
        ctx: &mut SelectCtx<'_>,
    ) -> &'a Node {
        self.wait_expanded();
        debug_assert!(self.has_children());

        // At a fresh root the Gumbel schedule replaces PUCT entirely until
        // its playout budget is spent.
        if is_root && self.should_apply_gumbel(ctx.params) {
            return self.gumbel_select_child(color, false, ctx);
        }

        let params = ctx.params;

        let mut parent_visits = 0u32;
        let mut total_visited_policy = 0.0f32;
        for edge in self.children() {
            if let Some(node) = edge.get() {
                if node.is_valid() {
                    let visits = node.visits();
                    parent_visits += visits;
                    if visits > 0 {
                        total_visited_policy += edge.policy();
                    }
                }
            }
        }

        let noise_on = is_root && params.dirichlet_noise;
        let fpu_reduction_factor = if is_root {
            params.fpu_root_reduction
        } else {
            params.fpu_reduction
        };

        let cpuct = params.cpuct_init
            + params.cpuct_base_factor
                * ((parent_visits as f32 + params.cpuct_base + 1.0) / params.cpuct_base).ln();
        let numerator = (parent_visits as f32).sqrt();
        let fpu_reduction = fpu_reduction_factor * total_visited_policy.sqrt();
        let fpu_value = self.net_wl(color) - fpu_reduction;
        let parent_score = self.final_score(color);

        let mut best: Option<&Edge> = None;
        let mut best_value = f32::NEG_INFINITY;

        for edge in self.children() {
            let node = edge.get();
            if let Some(node) = node {
                if !node.is_active() {
                    continue;
                }
            }

            // Unvisited children start from the first-play-urgency value.
            let mut q_value = fpu_value;
            let mut denom = 1.0f32;
            let mut utility = 0.0f32;

            if let Some(node) = node {
                let visits = node.visits();
                if node.is_expanding() {
                    // Another worker is inside; steer well clear.
                    q_value = -1.0 - fpu_reduction;
                } else if visits > 0 {
                    q_value = node.wl(color, true) + node.draw() * params.draw_factor;
                    utility += params.score_utility_factor
                        * node.score_utility(color, params.score_utility_div, parent_score);
                }
                denom += visits as f32;
            }

            let psa = ctx.search_policy(edge, noise_on);
            let puct = cpuct * psa * (numerator / denom);
            let value = q_value + puct + utility;

            if value > best_value {
                best_value = value;
                best = Some(edge);
            }
        }

        best.expect("active child must exist").inflate()
    }

    /// UCT selection for rollout mode: log-visit exploration with a decaying
    /// prior bonus, restricted to a progressively widening candidate set.
    /// Capturing candidates widen the set by one each.
    pub fn uct_select_child<'a, S: GameState>(
        &'a self,
        color: Color,
        state: &S,
        params: &SearchParams,
    ) -> &'a Node {
        self.wait_expanded();
        debug_assert!(self.has_children());

        let mut parent_visits = 0u32;
        for edge in self.children() {
            if let Some(node) = edge.get() {
                if node.is_valid() {
                    parent_visits += node.visits();
                }
            }
        }

        let cpuct = params.cpuct_init;
        let parent_q = self.wl(color, false);
        let numerator = (parent_visits as f32 + 1.0).ln();

        let mut best: Option<&Edge> = None;
        let mut best_value = f32::NEG_INFINITY;
        let mut width = compute_width(parent_visits);
        let mut considered = 0usize;

        for edge in self.children() {
            if state.is_capture(edge.vertex(), color) {
                width += 1;
            }
            considered += 1;
            if considered > width {
                break;
            }

            let node = edge.get();
            if let Some(node) = node {
                if !node.is_active() {
                    continue;
                }
            }

            let mut q_value = parent_q;
            let mut visits = 0u32;
            if let Some(node) = node {
                visits = node.visits();
                if node.is_expanding() {
                    q_value = -1.0;
                } else if visits > 0 {
                    q_value = node.wl(color, true);
                }
            }

            let denom = 1.0 + visits as f32;
            let psa = edge.policy();
            let bonus = (1000.0 / (parent_visits as f32 + 1000.0)).sqrt() * psa;
            let uct = cpuct * (numerator / denom).sqrt();
            let value = q_value + uct + bonus;

            if value > best_value {
                best_value = value;
                best = Some(edge);
            }
        }

        best.expect("active child must exist").inflate()
    }

    /// Highest-prior child, used when no statistics are trustworthy yet.
    pub fn prob_select_child(&self) -> &Node {
        self.wait_expanded();
        debug_assert!(self.has_children());

        let mut best: Option<&Edge> = None;
        let mut best_prob = f32::NEG_INFINITY;

        for edge in self.children() {
            let node = edge.get();
            if let Some(node) = node {
                if !node.is_active() {
                    continue;
                }
            }
            let mut prob = edge.policy();
            if node.is_some_and(Node::is_expanding) {
                prob += -1.0;
            }
            if prob > best_prob {
                best_prob = prob;
                best = Some(edge);
            }
        }

        best.expect("active child must exist").inflate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeEvals;
    use rand::SeedableRng;

    fn expanded_node(policies: &[(Vertex, f32)]) -> Node {
        let node = Node::new(engine_core::NULL_VERTEX, 1.0);
        assert!(node.acquire_expanding());
        node.set_color(Color::Black);
        node.set_children(
            policies
                .iter()
                .map(|&(vtx, policy)| Edge::new(vtx, policy))
                .collect(),
        );
        node.expand_done();
        node
    }

    fn evals(black_wl: f32) -> NodeEvals {
        NodeEvals {
            black_wl,
            draw: 0.0,
            black_final_score: 0.0,
            black_ownership: Vec::new(),
        }
    }

    fn ctx<'a>(params: &'a SearchParams, rng: &'a mut ChaCha20Rng) -> SelectCtx<'a> {
        SelectCtx {
            params,
            root_noise: None,
            num_intersections: 81,
            rng,
        }
    }

    #[test]
    fn test_puct_prefers_prior_when_unvisited() {
        let params = SearchParams::for_testing();
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        let node = expanded_node(&[(7, 0.9), (3, 0.1)]);
        node.update(&evals(0.5));
        let chosen = node.puct_select_child(Color::Black, false, &mut ctx(&params, &mut rng));
        assert_eq!(chosen.vertex(), 7);
    }

    #[test]
    fn test_puct_prefers_quality_with_visits() {
        let params = SearchParams::for_testing();
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        let node = expanded_node(&[(7, 0.5), (3, 0.5)]);
        node.update(&evals(0.5));
        // Give both children visits; vertex 3 looks much better.
        let a = node.children()[0].inflate();
        let b = node.children()[1].inflate();
        for _ in 0..20 {
            a.update(&evals(0.1));
            b.update(&evals(0.9));
            node.update(&evals(0.5));
        }
        let chosen = node.puct_select_child(Color::Black, false, &mut ctx(&params, &mut rng));
        assert_eq!(chosen.vertex(), 3);
    }

    #[test]
    fn test_puct_skips_inactive_children() {
        let params = SearchParams::for_testing();
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        let node = expanded_node(&[(7, 0.9), (3, 0.1)]);
        node.update(&evals(0.5));
        node.children()[0].inflate().invalidate();
        let chosen = node.puct_select_child(Color::Black, false, &mut ctx(&params, &mut rng));
        assert_eq!(chosen.vertex(), 3);
    }

    #[test]
    fn test_prob_select_penalizes_expanding() {
        let node = expanded_node(&[(7, 0.6), (3, 0.4)]);
        assert!(node.children()[0].inflate().acquire_expanding());
        let chosen = node.prob_select_child();
        assert_eq!(chosen.vertex(), 3);
        node.children()[0].get().unwrap().expand_cancel();
    }

    #[test]
    fn test_compute_width_monotone() {
        let mut last = 0;
        for visits in [0u32, 1, 10, 100, 1000, 10_000] {
            let width = compute_width(visits);
            assert!(width >= 1);
            assert!(width >= last);
            last = width;
        }
        // Sub-linear growth.
        assert!(compute_width(10_000) < 100);
    }

    #[test]
    fn test_virtual_loss_repels_second_selector() {
        let params = SearchParams::for_testing();
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        let node = expanded_node(&[(7, 0.5), (3, 0.5)]);
        node.update(&evals(0.5));
        let a = node.children()[0].inflate();
        let b = node.children()[1].inflate();
        for _ in 0..10 {
            a.update(&evals(0.6));
            b.update(&evals(0.6));
            node.update(&evals(0.6));
        }
        let first = node.puct_select_child(Color::Black, false, &mut ctx(&params, &mut rng));
        // A worker sitting inside the chosen child pushes the next one away.
        first.increment_threads();
        let second = node.puct_select_child(Color::Black, false, &mut ctx(&params, &mut rng));
        assert_ne!(first.vertex(), second.vertex());
        first.decrement_threads();
    }
}
