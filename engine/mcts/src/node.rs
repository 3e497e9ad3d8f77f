//! Search tree nodes and edges.
//!
//! A `Node` is a position reached by the move on its incoming edge; its
//! statistics are plain atomics so that any number of workers can descend
//! and back up concurrently without locks. The only lock on a node guards
//! the per-intersection ownership averages, which must stay mutually
//! consistent.
//!
//! Values are accumulated from Black's perspective and re-oriented on read.

use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::{Mutex, OnceLock};

use engine_core::{Color, Vertex, NULL_VERTEX};

use crate::atomics::AtomicF64;
use crate::lcb::LcbTable;
use crate::params::SearchParams;

/// Statistics penalty per concurrently descending worker.
pub const VIRTUAL_LOSS_COUNT: u32 = 3;

const STATUS_ACTIVE: u8 = 0;
const STATUS_PRUNED: u8 = 1;
const STATUS_INVALID: u8 = 2;

const EXPAND_INITIAL: u8 = 0;
const EXPAND_EXPANDING: u8 = 1;
const EXPAND_EXPANDED: u8 = 2;

const COLOR_BLACK: u8 = 0;
const COLOR_WHITE: u8 = 1;
const COLOR_INVALID: u8 = 2;

/// Leaf evaluation carried up the path by a backup, Black-oriented.
#[derive(Debug, Clone)]
pub struct NodeEvals {
    pub black_wl: f32,
    pub draw: f32,
    pub black_final_score: f32,
    pub black_ownership: Vec<f32>,
}

/// A lazily-inflated reference to a child node. The vertex and prior live on
/// the edge so selection can score children without materializing them.
#[derive(Debug)]
pub struct Edge {
    vertex: Vertex,
    policy: f32,
    node: OnceLock<Box<Node>>,
}

impl Edge {
    pub(crate) fn new(vertex: Vertex, policy: f32) -> Self {
        Self {
            vertex,
            policy,
            node: OnceLock::new(),
        }
    }

    /// Wrap an existing node, used when a subtree is re-rooted.
    pub(crate) fn from_node(node: Box<Node>) -> Self {
        let edge = Self::new(node.vertex(), node.policy());
        let _ = edge.node.set(node);
        edge
    }

    #[inline]
    pub fn vertex(&self) -> Vertex {
        self.vertex
    }

    #[inline]
    pub fn policy(&self) -> f32 {
        self.policy
    }

    /// The child node, if it has been materialized.
    #[inline]
    pub fn get(&self) -> Option<&Node> {
        self.node.get().map(|b| b.as_ref())
    }

    /// Materialize the child. Idempotent; concurrent callers all receive the
    /// single published node.
    pub fn inflate(&self) -> &Node {
        self.node
            .get_or_init(|| Box::new(Node::new(self.vertex, self.policy)))
    }

    /// Detach the child, returning the edge to its uninflated state.
    pub(crate) fn release(&mut self) -> Option<Box<Node>> {
        self.node.take()
    }
}

/// A tree node with atomic search statistics.
#[derive(Debug)]
pub struct Node {
    vertex: Vertex,
    policy: f32,

    color: AtomicU8,
    status: AtomicU8,
    expand_state: AtomicU8,

    visits: AtomicU32,
    running_threads: AtomicU32,

    acc_black_wl: AtomicF64,
    acc_draw: AtomicF64,
    acc_black_score: AtomicF64,
    /// Welford M2 running numerator for the win-loss variance.
    squared_eval_diff: AtomicF64,

    /// Raw network win-loss snapshot, set once at expansion (f32 bits).
    net_black_wl: AtomicU32,
    /// Additive score shim applied at the root (f32 bits).
    score_bonus: AtomicU32,

    /// Published exactly once by the winning expander.
    children: OnceLock<Vec<Edge>>,

    /// Running mean of Black ownership per intersection.
    avg_black_ownership: Mutex<Vec<f32>>,
}

impl Node {
    pub fn new(vertex: Vertex, policy: f32) -> Self {
        Self {
            vertex,
            policy,
            color: AtomicU8::new(COLOR_INVALID),
            status: AtomicU8::new(STATUS_ACTIVE),
            expand_state: AtomicU8::new(EXPAND_INITIAL),
            visits: AtomicU32::new(0),
            running_threads: AtomicU32::new(0),
            acc_black_wl: AtomicF64::new(0.0),
            acc_draw: AtomicF64::new(0.0),
            acc_black_score: AtomicF64::new(0.0),
            squared_eval_diff: AtomicF64::new(0.0),
            net_black_wl: AtomicU32::new(0.5f32.to_bits()),
            score_bonus: AtomicU32::new(0.0f32.to_bits()),
            children: OnceLock::new(),
            avg_black_ownership: Mutex::new(Vec::new()),
        }
    }

    /// Detached root for a fresh search.
    pub fn new_root() -> Self {
        Self::new(NULL_VERTEX, 1.0)
    }

    #[inline]
    pub fn vertex(&self) -> Vertex {
        self.vertex
    }

    #[inline]
    pub fn policy(&self) -> f32 {
        self.policy
    }

    // ------------------------------------------------------------------
    // Expansion handshake
    // ------------------------------------------------------------------

    /// Try to become the unique expander. Fails when another worker already
    /// holds or finished the expansion.
    pub fn acquire_expanding(&self) -> bool {
        self.expand_state
            .compare_exchange(
                EXPAND_INITIAL,
                EXPAND_EXPANDING,
                Ordering::Acquire,
                Ordering::Relaxed,
            )
            .is_ok()
    }

    /// Publish the expansion. Pairs with the acquire in `wait_expanded`.
    pub fn expand_done(&self) {
        let prev = self.expand_state.swap(EXPAND_EXPANDED, Ordering::Release);
        debug_assert_eq!(prev, EXPAND_EXPANDING);
    }

    /// Abandon a failed expansion, returning the node to its initial state.
    pub fn expand_cancel(&self) {
        let prev = self.expand_state.swap(EXPAND_INITIAL, Ordering::Release);
        debug_assert_eq!(prev, EXPAND_EXPANDING);
    }

    /// Spin until a concurrent expander publishes.
    pub fn wait_expanded(&self) {
        while self.expand_state.load(Ordering::Acquire) != EXPAND_EXPANDED {
            std::thread::yield_now();
        }
    }

    #[inline]
    pub fn expandable(&self) -> bool {
        self.expand_state.load(Ordering::Relaxed) == EXPAND_INITIAL
    }

    #[inline]
    pub fn is_expanding(&self) -> bool {
        self.expand_state.load(Ordering::Relaxed) == EXPAND_EXPANDING
    }

    #[inline]
    pub fn is_expanded(&self) -> bool {
        self.expand_state.load(Ordering::Relaxed) == EXPAND_EXPANDED
    }

    /// Mark a two-pass (or otherwise finished) position. Terminal nodes have
    /// no children and an invalid color. Returns false if another worker got
    /// there first.
    pub fn set_terminal(&self) -> bool {
        if !self.acquire_expanding() {
            return false;
        }
        self.color.store(COLOR_INVALID, Ordering::Relaxed);
        self.expand_done();
        true
    }

    pub(crate) fn set_color(&self, color: Color) {
        let code = match color {
            Color::Black => COLOR_BLACK,
            Color::White => COLOR_WHITE,
        };
        self.color.store(code, Ordering::Relaxed);
    }

    /// Side to move at this node; `None` marks terminal or uninitialized.
    pub fn color(&self) -> Option<Color> {
        match self.color.load(Ordering::Relaxed) {
            COLOR_BLACK => Some(Color::Black),
            COLOR_WHITE => Some(Color::White),
            _ => None,
        }
    }

    /// Expanded with a real child list (terminal nodes report false).
    #[inline]
    pub fn has_children(&self) -> bool {
        self.color.load(Ordering::Relaxed) != COLOR_INVALID
    }

    pub(crate) fn set_children(&self, children: Vec<Edge>) {
        debug_assert!(self.is_expanding());
        let set = self.children.set(children).is_ok();
        debug_assert!(set, "children published twice");
    }

    /// The child edges. Empty until expansion publishes.
    pub fn children(&self) -> &[Edge] {
        self.children.get().map_or(&[], |c| c.as_slice())
    }

    pub(crate) fn children_mut(&mut self) -> Option<&mut Vec<Edge>> {
        self.children.get_mut()
    }

    // ------------------------------------------------------------------
    // Status
    // ------------------------------------------------------------------

    #[inline]
    pub fn is_active(&self) -> bool {
        self.status.load(Ordering::Relaxed) == STATUS_ACTIVE
    }

    #[inline]
    pub fn is_pruned(&self) -> bool {
        self.status.load(Ordering::Relaxed) == STATUS_PRUNED
    }

    /// Not invalidated (active or pruned).
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.status.load(Ordering::Relaxed) != STATUS_INVALID
    }

    /// Toggle between active and pruned. Invalidation is permanent and wins.
    pub fn set_active(&self, active: bool) {
        if self.is_valid() {
            let v = if active { STATUS_ACTIVE } else { STATUS_PRUNED };
            self.status.store(v, Ordering::Relaxed);
        }
    }

    pub fn invalidate(&self) {
        self.status.store(STATUS_INVALID, Ordering::Relaxed);
    }

    // ------------------------------------------------------------------
    // Virtual loss
    // ------------------------------------------------------------------

    #[inline]
    pub fn increment_threads(&self) {
        self.running_threads.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn decrement_threads(&self) {
        let prev = self.running_threads.fetch_sub(1, Ordering::Relaxed);
        debug_assert!(prev > 0);
    }

    #[inline]
    pub fn running_threads(&self) -> u32 {
        self.running_threads.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn virtual_loss(&self) -> u32 {
        VIRTUAL_LOSS_COUNT * self.running_threads()
    }

    // ------------------------------------------------------------------
    // Statistics
    // ------------------------------------------------------------------

    #[inline]
    pub fn visits(&self) -> u32 {
        self.visits.load(Ordering::Relaxed)
    }

    pub(crate) fn set_net_black_wl(&self, wl: f32) {
        self.net_black_wl.store(wl.to_bits(), Ordering::Relaxed);
    }

    /// Raw network win-loss for `color`, untouched by search statistics.
    pub fn net_wl(&self, color: Color) -> f32 {
        let black = f32::from_bits(self.net_black_wl.load(Ordering::Relaxed));
        match color {
            Color::Black => black,
            Color::White => 1.0 - black,
        }
    }

    pub fn score_bonus(&self) -> f32 {
        f32::from_bits(self.score_bonus.load(Ordering::Relaxed))
    }

    pub fn set_score_bonus(&self, bonus: f32) {
        self.score_bonus.store(bonus.to_bits(), Ordering::Relaxed);
    }

    /// Fold one leaf evaluation into the node. Welford's M2 delta is
    /// computed against the accumulator values before this backup.
    pub fn update(&self, evals: &NodeEvals) {
        let eval = f64::from(evals.black_wl);
        let old_acc = self.acc_black_wl.load(Ordering::Relaxed);
        let old_visits = self.visits() as i64;

        let delta = if old_visits > 0 {
            let old_delta = eval - old_acc / old_visits as f64;
            let new_delta = eval - (old_acc + eval) / (old_visits + 1) as f64;
            old_delta * new_delta
        } else {
            0.0
        };

        self.visits.fetch_add(1, Ordering::Relaxed);
        self.squared_eval_diff.fetch_add(delta, Ordering::Relaxed);
        self.acc_black_wl.fetch_add(eval, Ordering::Relaxed);
        self.acc_draw
            .fetch_add(f64::from(evals.draw), Ordering::Relaxed);
        self.acc_black_score
            .fetch_add(f64::from(evals.black_final_score), Ordering::Relaxed);

        let mut avg = self
            .avg_black_ownership
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if avg.len() != evals.black_ownership.len() {
            avg.resize(evals.black_ownership.len(), 0.0);
        }
        let divisor = (old_visits + 1) as f32;
        for (slot, &owner) in avg.iter_mut().zip(evals.black_ownership.iter()) {
            *slot += (owner - *slot) / divisor;
        }
    }

    /// Store the leaf's own network snapshot (also used for terminal
    /// rules-based values).
    pub(crate) fn apply_evals(&self, evals: &NodeEvals) {
        self.set_net_black_wl(evals.black_wl);
    }

    /// Mean win-loss for `color`. With `use_virtual_loss` the estimate is
    /// diluted by the running descents so concurrent workers spread out.
    pub fn wl(&self, color: Color, use_virtual_loss: bool) -> f32 {
        let vl = if use_virtual_loss { self.virtual_loss() } else { 0 };
        let visits = self.visits() + vl;
        if visits == 0 {
            // Freshly expanded, backup still in flight: the raw network
            // value is the only estimate available.
            return self.net_wl(color);
        }
        let mut acc = self.acc_black_wl.load(Ordering::Relaxed);
        if color == Color::White && use_virtual_loss {
            acc += f64::from(vl);
        }
        let eval = (acc / f64::from(visits)) as f32;
        match color {
            Color::Black => eval,
            Color::White => 1.0 - eval,
        }
    }

    pub fn draw(&self) -> f32 {
        let visits = self.visits();
        if visits == 0 {
            return 0.0;
        }
        (self.acc_draw.load(Ordering::Relaxed) / f64::from(visits)) as f32
    }

    /// Mean final score for `color`.
    pub fn final_score(&self, color: Color) -> f32 {
        let visits = self.visits();
        if visits == 0 {
            return 0.0;
        }
        let score = (self.acc_black_score.load(Ordering::Relaxed) / f64::from(visits)) as f32;
        match color {
            Color::Black => score,
            Color::White => -score,
        }
    }

    /// Squashed score-lead utility relative to the parent's score.
    pub fn score_utility(&self, color: Color, div: f32, parent_score: f32) -> f32 {
        let score = self.final_score(color) + self.score_bonus();
        ((score - parent_score) / div).tanh()
    }

    pub fn lcb_variance(&self, default_var: f32, visits: u32) -> f32 {
        if visits > 1 {
            (self.squared_eval_diff.load(Ordering::Relaxed) / f64::from(visits - 1)) as f32
        } else {
            default_var
        }
    }

    /// Lower confidence bound on the winrate. Below two visits there is no
    /// variance estimate, so the node sorts behind everything visited.
    pub fn lcb(&self, color: Color, table: &LcbTable) -> f32 {
        let visits = self.visits();
        if visits <= 1 {
            return self.policy - 1e6;
        }
        let mean = self.wl(color, false);
        let variance = self.lcb_variance(1.0, visits);
        let stddev = (variance / visits as f32).sqrt();
        mean - table.quantile(visits - 1) * stddev
    }

    /// Ownership snapshot oriented for `color`.
    pub fn ownership(&self, color: Color) -> Vec<f32> {
        let avg = self
            .avg_black_ownership
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match color {
            Color::Black => avg.clone(),
            Color::White => avg.iter().map(|&v| -v).collect(),
        }
    }

    // ------------------------------------------------------------------
    // Child access and move choice
    // ------------------------------------------------------------------

    /// Find and materialize the child played at `vertex`.
    pub fn get_child(&self, vertex: Vertex) -> Option<&Node> {
        self.children()
            .iter()
            .find(|edge| edge.vertex() == vertex)
            .map(Edge::inflate)
    }

    /// Remove and return the child played at `vertex`, inflating if needed.
    /// Used when the tree is re-rooted after an actual move.
    pub(crate) fn pop_child(&mut self, vertex: Vertex) -> Option<Box<Node>> {
        let children = self.children.get_mut()?;
        let pos = children.iter().position(|e| e.vertex() == vertex)?;
        let mut edge = children.remove(pos);
        edge.inflate();
        edge.release()
    }

    /// Mixed lower-confidence scores per visited child, best first:
    /// `(lcb + u·score_utility)·(1−r) + r·visits/Σvisits`.
    pub fn lcb_utility_list(
        &self,
        color: Color,
        params: &SearchParams,
        table: &LcbTable,
    ) -> Vec<(f32, Vertex)> {
        self.wait_expanded();
        debug_assert!(self.has_children());

        let lcb_utility_factor = params.lcb_utility_factor.max(0.0);
        let lcb_reduction = params.lcb_reduction.clamp(0.0, 1.0);
        let parent_score = self.final_score(color);

        let mut parent_visits = 0u32;
        for edge in self.children() {
            if let Some(node) = edge.get() {
                if node.is_active() {
                    parent_visits += node.visits();
                }
            }
        }
        if parent_visits == 0 {
            return Vec::new();
        }

        let mut list = Vec::new();
        for edge in self.children() {
            let node = match edge.get() {
                Some(node) if node.is_active() => node,
                _ => continue,
            };
            let visits = node.visits();
            if visits == 0 {
                continue;
            }
            let lcb = node.lcb(color, table);
            let utility = lcb_utility_factor
                * node.score_utility(color, params.score_utility_div, parent_score);
            let visit_ratio = visits as f32 / parent_visits as f32;
            let mixed =
                (lcb + utility) * (1.0 - lcb_reduction) + lcb_reduction * visit_ratio;
            list.push((mixed, node.vertex()));
        }
        list.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        list
    }

    /// The move the search would report right now.
    pub fn best_move(&self, params: &SearchParams, table: &LcbTable) -> Vertex {
        self.wait_expanded();
        debug_assert!(self.has_children());

        let color = match self.color() {
            Some(color) => color,
            None => return NULL_VERTEX,
        };
        let list = self.lcb_utility_list(color, params, table);
        if let Some(&(_, vertex)) = list.first() {
            return vertex;
        }
        // Nothing visited yet: fall back to the strongest prior.
        self.prob_select_child().vertex()
    }

    /// Follow best moves downward to build the principal variation.
    pub fn principal_variation(&self, params: &SearchParams, table: &LcbTable) -> Vec<Vertex> {
        let mut pv = Vec::new();
        let mut node = self;
        while node.has_children() {
            let vertex = node.best_move(params, table);
            if vertex == NULL_VERTEX {
                break;
            }
            pv.push(vertex);
            match node.get_child(vertex) {
                Some(child) => node = child,
                None => break,
            }
        }
        pv
    }

    // ------------------------------------------------------------------
    // Tree diagnostics
    // ------------------------------------------------------------------

    /// KL divergence between the all-on-best-move distribution and the
    /// realized visit distribution. Zero when the best move took every
    /// visit; -1 when nothing has been visited.
    pub fn kl_divergence(&self, params: &SearchParams, table: &LcbTable) -> f32 {
        if !self.is_expanded() || !self.has_children() {
            return -1.0;
        }
        let vertex = self.best_move(params, table);
        let mut parent_visits = 0u32;
        let mut best_visits = 0u32;
        for edge in self.children() {
            if let Some(node) = edge.get() {
                if node.is_active() {
                    let visits = node.visits();
                    parent_visits += visits;
                    if node.vertex() == vertex {
                        best_visits = visits;
                    }
                }
            }
        }
        if parent_visits == best_visits {
            return 0.0;
        }
        if parent_visits == 0 || best_visits == 0 {
            return -1.0;
        }
        -(best_visits as f32 / parent_visits as f32).ln()
    }

    /// Standard deviation of the win-loss samples, scaled to percent.
    pub fn tree_complexity(&self) -> f32 {
        let visits = self.visits();
        if visits <= 1 {
            return 0.0;
        }
        (100.0 * self.lcb_variance(1.0, visits)).sqrt()
    }

    /// Count reachable nodes and uninflated edges, depth first.
    pub fn node_count(&self) -> (usize, usize) {
        let mut nodes = 1usize;
        let mut edges = 0usize;
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            for edge in node.children() {
                match edge.get() {
                    Some(child) => {
                        nodes += 1;
                        if !child.is_expanding() {
                            stack.push(child);
                        }
                    }
                    None => edges += 1,
                }
            }
        }
        (nodes, edges)
    }
}
