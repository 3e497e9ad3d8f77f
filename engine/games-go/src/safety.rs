//! Static safety and scoring: Benson-style pass-alive detection, area
//! ownership and the simple final score.

use engine_core::Color;

use crate::board::GoState;

impl GoState {
    /// Intersections where play is pointless for either side: stones of
    /// pass-alive chains plus their enclosed vital regions.
    pub fn compute_strict_safe_area(&self) -> Vec<bool> {
        let mut safe = vec![false; self.num_intersections()];
        for color in [Color::Black, Color::White] {
            mark_pass_alive(self, color, &mut safe);
        }
        safe
    }

    /// Area ownership of the current position: +1 Black, -1 White, 0 for
    /// contested empty regions.
    pub fn compute_ownership(&self, out: &mut [f32]) {
        debug_assert_eq!(out.len(), self.num_intersections());
        let regions = empty_regions(self);

        for idx in 0..self.num_intersections() {
            out[idx] = match self.stone_at(idx) {
                Some(Color::Black) => 1.0,
                Some(Color::White) => -1.0,
                None => 0.0,
            };
        }
        for region in &regions {
            let value = match (region.touches_black, region.touches_white) {
                (true, false) => 1.0,
                (false, true) => -1.0,
                _ => 0.0,
            };
            for &idx in &region.points {
                out[idx] = value;
            }
        }
    }

    /// Area score from Black's perspective, komi already applied.
    pub fn compute_simple_final_score(&self, effective_komi: f32) -> f32 {
        let mut ownership = vec![0.0f32; self.num_intersections()];
        self.compute_ownership(&mut ownership);
        let diff: f32 = ownership.iter().sum();
        diff - effective_komi
    }
}

struct EmptyRegion {
    points: Vec<usize>,
    touches_black: bool,
    touches_white: bool,
}

fn empty_regions(state: &GoState) -> Vec<EmptyRegion> {
    let n = state.num_intersections();
    let mut seen = vec![false; n];
    let mut regions = Vec::new();

    for start in 0..n {
        if seen[start] || state.stone_at(start).is_some() {
            continue;
        }
        let mut region = EmptyRegion {
            points: Vec::new(),
            touches_black: false,
            touches_white: false,
        };
        let mut queue = vec![start];
        seen[start] = true;
        while let Some(idx) = queue.pop() {
            region.points.push(idx);
            for nb in state.neighbors(idx) {
                match state.stone_at(nb) {
                    None => {
                        if !seen[nb] {
                            seen[nb] = true;
                            queue.push(nb);
                        }
                    }
                    Some(Color::Black) => region.touches_black = true,
                    Some(Color::White) => region.touches_white = true,
                }
            }
        }
        regions.push(region);
    }
    regions
}

/// Benson's algorithm, one color at a time. A chain is pass-alive when it
/// retains two vital regions after iteratively discarding chains that do
/// not; a region is vital to a chain when every empty point of the region
/// is one of the chain's liberties.
fn mark_pass_alive(state: &GoState, color: Color, safe: &mut [bool]) {
    let n = state.num_intersections();

    // Chains of `color`, labelled per intersection.
    let mut chain_id = vec![usize::MAX; n];
    let mut chains: Vec<Vec<usize>> = Vec::new();
    for idx in 0..n {
        if state.stone_at(idx) == Some(color) && chain_id[idx] == usize::MAX {
            let (stones, _) = state.chain_and_liberties(idx);
            let id = chains.len();
            for &s in &stones {
                chain_id[s] = id;
            }
            chains.push(stones);
        }
    }
    if chains.is_empty() {
        return;
    }

    // Regions: connected components of points not of `color`.
    let mut region_id = vec![usize::MAX; n];
    let mut regions: Vec<Vec<usize>> = Vec::new();
    for start in 0..n {
        if state.stone_at(start) == Some(color) || region_id[start] != usize::MAX {
            continue;
        }
        let id = regions.len();
        let mut points = Vec::new();
        let mut queue = vec![start];
        region_id[start] = id;
        while let Some(idx) = queue.pop() {
            points.push(idx);
            for nb in state.neighbors(idx) {
                if state.stone_at(nb) != Some(color) && region_id[nb] == usize::MAX {
                    region_id[nb] = id;
                    queue.push(nb);
                }
            }
        }
        regions.push(points);
    }

    // Adjacent chains per region, and vitality per (region, chain).
    let mut adjacent: Vec<Vec<usize>> = vec![Vec::new(); regions.len()];
    let mut vital_to: Vec<Vec<usize>> = vec![Vec::new(); regions.len()];
    for (rid, points) in regions.iter().enumerate() {
        let mut adj = Vec::new();
        for &idx in points {
            for nb in state.neighbors(idx) {
                if let Some(c) = chain_id.get(nb).copied() {
                    if c != usize::MAX && !adj.contains(&c) {
                        adj.push(c);
                    }
                }
            }
        }
        for &cid in &adj {
            let vital = points.iter().all(|&idx| {
                state.stone_at(idx).is_some()
                    || state.neighbors(idx).any(|nb| chain_id[nb] == cid)
            });
            if vital {
                vital_to[rid].push(cid);
            }
        }
        adjacent[rid] = adj;
    }

    // Iterative removal.
    let mut alive = vec![true; chains.len()];
    loop {
        let mut changed = false;
        for cid in 0..chains.len() {
            if !alive[cid] {
                continue;
            }
            let vital_count = (0..regions.len())
                .filter(|&rid| {
                    vital_to[rid].contains(&cid)
                        && adjacent[rid].iter().all(|&c| alive[c])
                })
                .count();
            if vital_count < 2 {
                alive[cid] = false;
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }

    for (cid, stones) in chains.iter().enumerate() {
        if alive[cid] {
            for &idx in stones {
                safe[idx] = true;
            }
        }
    }
    for (rid, points) in regions.iter().enumerate() {
        let enclosed = !adjacent[rid].is_empty()
            && adjacent[rid].iter().all(|&c| alive[c])
            && !vital_to[rid].is_empty();
        if enclosed {
            // Opponent stones inside a vital region are dead where they
            // stand and count as safe territory too.
            for &idx in points {
                safe[idx] = true;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_core::PASS;

    #[test]
    fn test_empty_board_is_unsafe_and_scores_komi() {
        let state = GoState::new(9, 7.0);
        let safe = state.compute_strict_safe_area();
        assert!(safe.iter().all(|&s| !s));
        // Empty board: one contested region, score is minus komi.
        let score = state.compute_simple_final_score(7.0);
        assert!((score + 7.0).abs() < 1e-6);
    }

    #[test]
    fn test_ownership_single_stone() {
        let mut state = GoState::new(5, 0.0);
        assert!(state.play_move(state.vertex_of(2, 2)));
        let mut out = vec![0.0; 25];
        state.compute_ownership(&mut out);
        // The lone black stone owns the whole board.
        assert!(out.iter().all(|&v| (v - 1.0).abs() < 1e-6));
        let score = state.compute_simple_final_score(0.0);
        assert!((score - 25.0).abs() < 1e-6);
    }

    #[test]
    fn test_split_board_score() {
        let mut state = GoState::new(5, 0.0);
        // Black wall on column 1, White wall on column 3.
        for y in 0..5 {
            assert!(state.play_move(state.vertex_of(1, y)));
            assert!(state.play_move(state.vertex_of(3, y)));
        }
        // Black: columns 0-1 (10 points), White: columns 3-4 (10 points),
        // column 2 is contested.
        let score = state.compute_simple_final_score(0.0);
        assert!(score.abs() < 1e-6, "score = {}", score);
        assert!(state.play_move(PASS));
        let mut out = vec![0.0; 25];
        state.compute_ownership(&mut out);
        assert!((out[state.index_of(0, 0)] - 1.0).abs() < 1e-6);
        assert!((out[state.index_of(4, 0)] + 1.0).abs() < 1e-6);
        assert!(out[state.index_of(2, 0)].abs() < 1e-6);
    }

    #[test]
    fn test_two_eye_corner_group_is_pass_alive() {
        let mut state = GoState::new(5, 0.0);
        // Black corner group with eyes at (0,0) and (2,0):
        //   . B . B .
        //   B B B B .
        let black = [(1, 0), (3, 0), (0, 1), (1, 1), (2, 1), (3, 1)];
        for &(x, y) in &black {
            assert!(state.play_move(state.vertex_of(x, y)));
            assert!(state.play_move(PASS));
        }
        let safe = state.compute_strict_safe_area();
        assert!(safe[state.index_of(1, 0)], "group stones should be safe");
        assert!(safe[state.index_of(0, 0)], "eye point should be safe");
        assert!(safe[state.index_of(2, 0)], "eye point should be safe");
        // Open space far away stays unsafe.
        assert!(!safe[state.index_of(4, 4)]);
    }

    #[test]
    fn test_one_eye_group_is_not_pass_alive() {
        let mut state = GoState::new(5, 0.0);
        // Single-eye corner group: eye at (0,0) only.
        let black = [(1, 0), (0, 1), (1, 1)];
        for &(x, y) in &black {
            assert!(state.play_move(state.vertex_of(x, y)));
            assert!(state.play_move(PASS));
        }
        let safe = state.compute_strict_safe_area();
        assert!(!safe[state.index_of(1, 0)]);
        assert!(!safe[state.index_of(0, 0)]);
    }
}
