//! Gumbel root selection and Sequential Halving.
//!
//! While the root's playout budget for Gumbel search lasts, descents from
//! the root follow a deterministic Sequential-Halving visit schedule over
//! the top Gumbel-perturbed arms instead of PUCT. One epoch distributes
//! `log2(m)+1` rounds over `m` arms; for m = 4 the per-round distribution is
//!
//!   (1, 1, 1, 1) -> (2, 2, 0, 0) -> (4, 0, 0, 0)
//!
//! repeated epoch after epoch, so after two epochs the accumulated visits
//! are 14 | 6 | 2 | 2.

use engine_core::{policy_slot, Color, Vertex};
use rand::Rng;
use rand_distr::Gumbel;

use crate::evaluator::softmax;
use crate::node::Node;
use crate::params::SearchParams;
use crate::select::SelectCtx;

const MASKED_LOGIT: f32 = -1e6;

impl Node {
    /// Is the Gumbel schedule still driving this root?
    pub fn should_apply_gumbel(&self, params: &SearchParams) -> bool {
        let playouts = self.visits().saturating_sub(1);
        params.gumbel && params.gumbel_playouts > playouts
    }

    /// Mixed Q value: win-loss plus a score-lead utility share, used both by
    /// the halving mask and the policy target.
    pub(crate) fn gumbel_q_value(
        &self,
        color: Color,
        parent_score: f32,
        params: &SearchParams,
    ) -> f32 {
        self.wl(color, false)
            + params.completed_q_utility_factor
                * self.score_utility(color, params.score_utility_div, parent_score)
    }

    /// The sigma transform: progressively scales Q up against the prior as
    /// the arm with the most visits grows.
    fn sigma(completed_q: f32, max_visits: u32) -> f32 {
        (50.0 + max_visits as f32) * 0.1 * completed_q
    }

    /// Pick the root arm with the highest Gumbel logit after applying the
    /// Sequential Halving visit mask. With `only_max_visit` the mask keeps
    /// only the arms that accumulated the most visits, which is the final
    /// move choice in Gumbel mode.
    pub fn gumbel_select_child<'a>(
        &'a self,
        color: Color,
        only_max_visit: bool,
        ctx: &mut SelectCtx<'_>,
    ) -> &'a Node {
        self.wait_expanded();
        debug_assert!(self.has_children());

        let slots = ctx.num_intersections + 1;
        let mut logits = vec![MASKED_LOGIT; slots];
        let gumbel = Gumbel::new(0.0f32, 1.0f32).unwrap();

        let mut parent_visits = 0u32;
        let mut max_visits = 0u32;
        for edge in self.children() {
            let slot = policy_slot(edge.vertex(), ctx.num_intersections);
            let g: f32 = ctx.rng.sample(gumbel);
            logits[slot] = g + (f64::from(edge.policy()) + 1e-8).ln() as f32;
            if let Some(node) = edge.get() {
                if node.is_valid() {
                    let visits = node.visits();
                    parent_visits += visits;
                    max_visits = max_visits.max(visits);
                }
            }
        }

        let considered_moves = ctx
            .params
            .gumbel_considered_moves
            .min(self.children().len());
        self.process_gumbel_logits(
            &mut logits,
            color,
            parent_visits,
            max_visits,
            considered_moves,
            MASKED_LOGIT,
            only_max_visit,
            ctx.params,
            ctx.num_intersections,
        );

        let mut best = None;
        let mut best_value = f32::NEG_INFINITY;
        for edge in self.children() {
            let value = logits[policy_slot(edge.vertex(), ctx.num_intersections)];
            if value > best_value {
                best_value = value;
                best = Some(edge);
            }
        }
        best.expect("root has children").inflate()
    }

    /// The move the Gumbel schedule reports once the budget is spent.
    pub fn gumbel_move(&self, ctx: &mut SelectCtx<'_>) -> Vertex {
        self.wait_expanded();
        debug_assert!(self.has_children());
        let color = self.color().unwrap_or(Color::Black);
        self.gumbel_select_child(color, true, ctx).vertex()
    }

    /// Apply the Sequential Halving mask: the arm to visit next is the one
    /// whose accumulated visits equal the schedule's target count; every
    /// other arm is pushed to `mval`. Visited target arms additionally get
    /// their sigma-scaled mixed Q added so halving keeps the best arms.
    #[allow(clippy::too_many_arguments)]
    fn process_gumbel_logits(
        &self,
        logits: &mut [f32],
        color: Color,
        root_visits: u32,
        max_visits: u32,
        considered_moves: usize,
        mval: f32,
        only_max_visit: bool,
        params: &SearchParams,
        num_intersections: usize,
    ) {
        // Round the arm count down to a power of two and build the per-slot
        // visit totals of one epoch: for four arms the totals are 7|3|1|1.
        let n = (considered_moves.max(1) as f32).log2() as usize + 1;
        let adj = 1usize << (n - 1);

        let mut table = vec![0u32; adj];
        {
            let mut r = 1u32;
            let mut w = adj;
            for _ in 0..n {
                for j in 0..w {
                    table[adj - j - 1] += r;
                }
                w /= 2;
                r *= 2;
            }
        }

        let visits_per_round = (n * adj) as u32;
        let rounds = root_visits / visits_per_round;
        let visits_this_round = root_visits - rounds * visits_per_round;
        let m = (visits_this_round / adj as u32) as usize;

        let mut height = 0u32;
        let mut width = adj as u32;
        let mut offset = 0u32;
        {
            let mut t = 1u32;
            for _ in 0..m {
                height += t;
                width /= 2;
                offset += width;
                t *= 2;
            }
        }

        let parent_score = self.final_score(color);
        let idx = (offset + root_visits % width) as usize;
        let considered_visits = if only_max_visit {
            max_visits
        } else {
            table[idx] * rounds + height + (visits_this_round - m as u32 * adj as u32) / width
        };

        for edge in self.children() {
            let slot = policy_slot(edge.vertex(), num_intersections);
            let node = edge.get();
            if let Some(node) = node {
                if !node.is_active() {
                    logits[slot] = mval;
                    continue;
                }
            }
            let visits = node.map_or(0, Node::visits);
            if visits == considered_visits {
                if visits > 0 {
                    let node = node.expect("visited arm is inflated");
                    logits[slot] +=
                        Self::sigma(node.gumbel_q_value(color, parent_score, params), max_visits);
                }
                // Unvisited target arms share an identical completed Q, so
                // the bare Gumbel logit already ranks them.
            } else {
                logits[slot] = mval;
            }
        }
    }

    /// Root policy target: priors renormalized over the children, shifted in
    /// logit space by the sigma of each child's completed Q, sharpened by a
    /// softmax and cleaned of sub-noise mass.
    pub fn completed_q_policy(
        &self,
        color: Color,
        num_intersections: usize,
        params: &SearchParams,
    ) -> Vec<f32> {
        let slots = num_intersections + 1;
        let mut prob = vec![0.0f32; slots];
        let mut acc = 0.0f32;
        for edge in self.children() {
            let slot = policy_slot(edge.vertex(), num_intersections);
            acc += edge.policy();
            prob[slot] = edge.policy();
        }
        if acc > 0.0 {
            for v in prob.iter_mut() {
                *v /= acc;
            }
        }
        self.mix_logits_completed_q(color, params, &mut prob, num_intersections);
        prob
    }

    fn mix_logits_completed_q(
        &self,
        color: Color,
        params: &SearchParams,
        prob: &mut Vec<f32>,
        num_intersections: usize,
    ) {
        let slots = num_intersections + 1;
        if prob.len() != slots {
            return;
        }
        let parent_score = self.final_score(color);

        let mut max_visits = 0u32;
        let mut parent_visits = 0u32;
        let mut weighted_q = 0.0f32;
        let mut weighted_pi = 0.0f32;
        for edge in self.children() {
            let visits = edge
                .get()
                .filter(|n| n.is_active())
                .map_or(0, Node::visits);
            parent_visits += visits;
            max_visits = max_visits.max(visits);
            if visits > 0 {
                let node = edge.get().expect("visited arm is inflated");
                weighted_q += edge.policy() * node.gumbel_q_value(color, parent_score, params);
                weighted_pi += edge.policy();
            }
        }

        // Completed Q: real mixed Q for visited arms, the visit-weighted
        // mixture as an imputation for the rest.
        let raw_value = self.gumbel_q_value(color, parent_score, params);
        let mut completed = Vec::with_capacity(self.children().len());
        let mut max_q = f32::MIN;
        let mut min_q = f32::MAX;
        for edge in self.children() {
            let visits = edge
                .get()
                .filter(|n| n.is_active())
                .map_or(0, Node::visits);
            let q = if visits == 0 {
                let mixture = if weighted_pi > 0.0 {
                    (parent_visits as f32 / weighted_pi) * weighted_q
                } else {
                    0.0
                };
                (raw_value + mixture) / (1.0 + parent_visits as f32)
            } else {
                edge.get()
                    .expect("visited arm is inflated")
                    .gumbel_q_value(color, parent_score, params)
            };
            max_q = max_q.max(q);
            min_q = min_q.min(q);
            completed.push(q);
        }
        for q in completed.iter_mut() {
            *q = (*q - min_q) / (max_q - min_q).max(1e-8);
        }

        let mut logits_q = vec![MASKED_LOGIT; slots];
        for (edge, q) in self.children().iter().zip(completed.iter()) {
            let slot = policy_slot(edge.vertex(), num_intersections);
            let logit = (f64::from(prob[slot]) + 1e-8).ln() as f32;
            logits_q[slot] = logit + Self::sigma(*q, max_visits);
        }
        *prob = softmax(&logits_q, 1.0);

        // Zero out entries too small to be more than noise, renormalize.
        let psize = prob.len() as f32;
        let threshold = 1.0 / (psize * psize);
        let mut kept = 0.0f32;
        for v in prob.iter_mut() {
            if *v < threshold {
                *v = 0.0;
            } else {
                kept += *v;
            }
        }
        if kept > 0.0 {
            for v in prob.iter_mut() {
                *v /= kept;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{Edge, NodeEvals};
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    fn evals(black_wl: f32) -> NodeEvals {
        NodeEvals {
            black_wl,
            draw: 0.0,
            black_final_score: 0.0,
            black_ownership: Vec::new(),
        }
    }

    fn gumbel_root(priors: &[f32]) -> Node {
        let node = Node::new(engine_core::NULL_VERTEX, 1.0);
        assert!(node.acquire_expanding());
        node.set_color(Color::Black);
        let mut edges: Vec<Edge> = priors
            .iter()
            .enumerate()
            .map(|(i, &p)| Edge::new(i as Vertex, p))
            .collect();
        edges.sort_by(|a, b| b.policy().partial_cmp(&a.policy()).unwrap());
        node.set_children(edges);
        node.expand_done();
        for edge in node.children() {
            edge.inflate();
        }
        node.update(&evals(0.5));
        node
    }

    fn params_with_gumbel(considered: usize, playouts: u32) -> SearchParams {
        SearchParams::for_testing().with_gumbel(considered, playouts)
    }

    #[test]
    fn test_should_apply_gumbel_budget() {
        let params = params_with_gumbel(4, 2);
        let node = gumbel_root(&[0.4, 0.3, 0.2, 0.1]);
        assert!(node.should_apply_gumbel(&params));
        node.update(&evals(0.5));
        node.update(&evals(0.5));
        // Three visits: playouts so far = 2, budget spent.
        assert!(!node.should_apply_gumbel(&params));
        let off = SearchParams::for_testing();
        assert!(!node.should_apply_gumbel(&off));
    }

    #[test]
    fn test_sequential_halving_schedule_two_epochs() {
        // Six children, four considered arms, 24 playouts = 2 epochs of
        // 3 * 4 visits. The accumulated distribution over the considered
        // arms must be 14 | 6 | 2 | 2 with both leftover arms untouched.
        let params = params_with_gumbel(4, 1000);
        let node = gumbel_root(&[0.30, 0.25, 0.20, 0.15, 0.06, 0.04]);
        let mut rng = ChaCha20Rng::seed_from_u64(7);

        for _ in 0..24 {
            let child = {
                let mut ctx = SelectCtx {
                    params: &params,
                    root_noise: None,
                    num_intersections: 81,
                    rng: &mut rng,
                };
                node.gumbel_select_child(Color::Black, false, &mut ctx)
            };
            // Better arms return better values so halving has a signal.
            let quality = 0.9 - 0.1 * child.vertex() as f32;
            child.update(&evals(quality));
            node.update(&evals(quality));
        }

        let mut visits: Vec<u32> = node
            .children()
            .iter()
            .map(|e| e.get().map_or(0, Node::visits))
            .collect();
        visits.sort_unstable_by(|a, b| b.cmp(a));
        assert_eq!(visits, vec![14, 6, 2, 2, 0, 0]);
    }

    #[test]
    fn test_gumbel_move_only_max_visit() {
        let params = params_with_gumbel(4, 1000);
        let node = gumbel_root(&[0.4, 0.3, 0.2, 0.1]);
        let mut rng = ChaCha20Rng::seed_from_u64(3);
        // Manually give one arm a commanding visit count.
        let winner = node.children()[2].inflate();
        for _ in 0..8 {
            winner.update(&evals(0.8));
            node.update(&evals(0.8));
        }
        let mut ctx = SelectCtx {
            params: &params,
            root_noise: None,
            num_intersections: 81,
            rng: &mut rng,
        };
        assert_eq!(node.gumbel_move(&mut ctx), winner.vertex());
    }

    #[test]
    fn test_completed_q_policy_normalizes_and_prunes() {
        let params = params_with_gumbel(4, 1000);
        let node = gumbel_root(&[0.5, 0.3, 0.15, 0.05]);
        // Visit two arms with contrasting outcomes.
        let good = node.children()[1].inflate();
        let bad = node.children()[0].inflate();
        for _ in 0..6 {
            good.update(&evals(0.9));
            bad.update(&evals(0.2));
            node.update(&evals(0.55));
        }
        let prob = node.completed_q_policy(Color::Black, 81, &params);
        let sum: f32 = prob.iter().sum();
        assert!((sum - 1.0).abs() < 1e-4);
        // The well-performing arm outweighs the high-prior weak arm.
        let good_slot = policy_slot(good.vertex(), 81);
        let bad_slot = policy_slot(bad.vertex(), 81);
        assert!(prob[good_slot] > prob[bad_slot]);
    }
}
