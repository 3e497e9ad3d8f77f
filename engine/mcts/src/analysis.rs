//! Streaming analysis records.
//!
//! While a search runs (or afterwards on demand), the driver snapshots the
//! root's mixed-LCB list and renders one record per child in one of three
//! textual dialects understood by GUIs. Records flow through a sink so the
//! front end decides where the text goes.

use engine_core::{Color, GameState, Vertex};

use crate::lcb::LcbTable;
use crate::node::Node;
use crate::params::{SearchMode, SearchParams};

/// Which analysis text format to emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AnalysisDialect {
    /// This engine's own format, including KL divergence and complexity.
    #[default]
    Native,
    /// KataGo-style floats.
    Kata,
    /// Leela-Zero-style 10000-scaled integers.
    Leelaz,
}

/// A caller-imposed restriction on candidate moves, active while
/// `move_number <= until_move`.
#[derive(Debug, Clone)]
pub struct MoveRestriction {
    pub vertex: Vertex,
    pub color: Color,
    pub until_move: u32,
}

/// Analysis request configuration.
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    /// Emission interval in centiseconds; zero emits only a final record.
    pub interval_centis: u32,
    /// Children beyond this rank are dropped from each record.
    pub max_moves: usize,
    /// Emit root ownership with each record.
    pub ownership: bool,
    /// Emit per-move ownership with each candidate.
    pub moves_ownership: bool,
    pub dialect: AnalysisDialect,
    pub avoid: Vec<MoveRestriction>,
    pub allow: Vec<MoveRestriction>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            interval_centis: 0,
            max_moves: usize::MAX,
            ownership: false,
            moves_ownership: false,
            dialect: AnalysisDialect::default(),
            avoid: Vec::new(),
            allow: Vec::new(),
        }
    }
}

impl AnalysisConfig {
    /// Does the avoid/allow surface permit this move right now?
    pub fn permits(&self, vertex: Vertex, color: Color, move_number: u32) -> bool {
        let vetoed = self.avoid.iter().any(|r| {
            r.vertex == vertex && r.color == color && move_number <= r.until_move
        });
        if vetoed {
            return false;
        }
        let allow_applies = self
            .allow
            .iter()
            .any(|r| r.color == color && move_number <= r.until_move);
        if allow_applies {
            return self
                .allow
                .iter()
                .any(|r| r.vertex == vertex && r.color == color && move_number <= r.until_move);
        }
        true
    }

    pub fn interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(u64::from(self.interval_centis) * 10)
    }
}

/// Where analysis text goes. The driver never prints on its own.
pub trait AnalysisSink: Send + Sync {
    fn emit(&self, line: &str);
}

/// Sink writing each record to stdout, the GTP convention.
#[derive(Debug, Default)]
pub struct StdoutSink;

impl AnalysisSink for StdoutSink {
    fn emit(&self, line: &str) {
        println!("{line}");
    }
}

fn ownership_text<S: GameState>(state: &S, name: &str, ownership: &[f32]) -> String {
    let size = state.board_size();
    let mut out = String::with_capacity(name.len() + ownership.len() * 10);
    out.push_str(name);
    out.push(' ');
    for y in (0..size).rev() {
        for x in 0..size {
            out.push_str(&format!("{:.6} ", ownership[state.index_of(x, y)]));
        }
    }
    out
}

/// Render one analysis record for the current root. Returns an empty string
/// when nothing has been visited yet.
pub(crate) fn analysis_record<S: GameState>(
    root: &Node,
    state: &S,
    config: &AnalysisConfig,
    params: &SearchParams,
    table: &LcbTable,
) -> String {
    let color = match root.color() {
        Some(color) => color,
        None => return String::new(),
    };
    let lcb_list = root.lcb_utility_list(color, params, table);
    if lcb_list.is_empty() {
        return String::new();
    }

    let root_visits = (root.visits().saturating_sub(1)).max(1) as f32;
    let pattern_only = matches!(
        params.search_mode,
        SearchMode::NoDcnn | SearchMode::Rollout
    );

    let mut out = String::new();
    let mut order = 0usize;
    for (lcb, vertex) in lcb_list {
        if order >= config.max_moves {
            break;
        }
        let lcb = lcb.max(0.0);
        let child = match root.get_child(vertex) {
            Some(child) => child,
            None => continue,
        };
        let visits = child.visits();
        let winrate = child.wl(color, false);
        let score_lead = child.final_score(color);
        let prior = child.policy();

        // Pattern search spreads visits thinly; drop sub-percent children.
        if pattern_only && (visits as f32) / root_visits < 0.01 {
            continue;
        }

        let mut pv_text = state.vertex_text(vertex);
        for pv_vertex in child.principal_variation(params, table) {
            pv_text.push(' ');
            pv_text.push_str(&state.vertex_text(pv_vertex));
        }

        match config.dialect {
            AnalysisDialect::Native => {
                let kl = child.kl_divergence(params, table);
                let complexity = child.tree_complexity();
                out.push_str(&format!(
                    "info move {} visits {} winrate {:.6} scorelead {:.6} prior {:.6} lcb {:.6} kl {:.6} complexity {:.6} order {} pv {}",
                    state.vertex_text(vertex),
                    visits,
                    winrate,
                    score_lead,
                    prior,
                    lcb,
                    kl,
                    complexity,
                    order,
                    pv_text,
                ));
            }
            AnalysisDialect::Kata => {
                out.push_str(&format!(
                    "info move {} visits {} winrate {:.6} scoreLead {:.6} prior {:.6} lcb {:.6} order {} pv {}",
                    state.vertex_text(vertex),
                    visits,
                    winrate,
                    score_lead,
                    prior,
                    lcb,
                    order,
                    pv_text,
                ));
            }
            AnalysisDialect::Leelaz => {
                out.push_str(&format!(
                    "info move {} visits {} winrate {} scoreLead {:.6} prior {} lcb {} order {} pv {}",
                    state.vertex_text(vertex),
                    visits,
                    scaled(winrate),
                    score_lead,
                    scaled(prior),
                    scaled(lcb),
                    order,
                    pv_text,
                ));
            }
        }

        if config.moves_ownership {
            let name = match config.dialect {
                AnalysisDialect::Native => "movesownership",
                _ => "movesOwnership",
            };
            out.push(' ');
            out.push_str(&ownership_text(state, name, &child.ownership(color)));
        }
        out.push(' ');
        order += 1;
    }

    if config.ownership {
        out.push_str(&ownership_text(state, "ownership", &root.ownership(color)));
    }

    out.trim_end().to_string()
}

fn scaled(value: f32) -> i32 {
    ((10_000.0 * value) as i32).min(10_000)
}

/// Human-readable dump of the root's search list and tree statistics, shown
/// in verbose mode after a search finishes.
pub(crate) fn verbose_summary<S: GameState>(
    root: &Node,
    state: &S,
    params: &SearchParams,
    table: &LcbTable,
) -> String {
    let color = match root.color() {
        Some(color) => color,
        None => return " * Search List: N/A\n".to_string(),
    };
    let lcb_list = root.lcb_utility_list(color, params, table);
    if lcb_list.is_empty() {
        return " * Search List: N/A\n".to_string();
    }

    let parent_visits = root.visits().saturating_sub(1).max(1);
    let mut out = String::from(" * Search List:\n");
    out.push_str(&format!(
        "{:>6} {:>9} {:>7} {:>7} {:>7} {:>7} {:>7} {:>7}\n",
        "move", "visits", "WL(%)", "LCB(%)", "D(%)", "P(%)", "N(%)", "S"
    ));

    for (lcb, vertex) in &lcb_list {
        let child = match root.get_child(*vertex) {
            Some(child) => child,
            None => continue,
        };
        let visits = child.visits();
        let mut pv_text = state.vertex_text(*vertex);
        for pv_vertex in child.principal_variation(params, table) {
            pv_text.push(' ');
            pv_text.push_str(&state.vertex_text(pv_vertex));
        }
        out.push_str(&format!(
            "{:>6} {:>9} {:>7.2} {:>7.2} {:>7.2} {:>7.2} {:>7.2} {:>7.2} | PV: {}\n",
            state.vertex_text(*vertex),
            visits,
            child.wl(color, false) * 100.0,
            lcb.max(0.0) * 100.0,
            child.draw() * 100.0,
            child.policy() * 100.0,
            visits as f32 / parent_visits as f32 * 100.0,
            child.final_score(color),
            pv_text,
        ));
    }

    let (nodes, edges) = root.node_count();
    let node_mem = std::mem::size_of::<Node>() + std::mem::size_of::<crate::node::Edge>();
    let edge_mem = std::mem::size_of::<crate::node::Edge>();
    let mem_mib = (nodes * node_mem + edges * edge_mem) as f64 / (1024.0 * 1024.0);

    out.push_str(" * Tree Status:\n");
    out.push_str(&format!(
        "   root KL: {:.4}\n   root C: {:.4}\n   nodes: {}\n   edges: {}\n   memory: {:.4} (MiB)\n",
        root.kl_divergence(params, table),
        root.tree_complexity(),
        nodes,
        edges,
        mem_mib,
    ));
    out
}
