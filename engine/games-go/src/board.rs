//! The Go position: stones, captures, ko, hashing and move history.
//!
//! Chains and liberties are recomputed by flood fill on demand. That keeps
//! the state a plain value type that clones cheaply, which is what the
//! search wants when it forks a position per playout.

use engine_core::{transform_index, Color, MoveFilter, Vertex, NULL_VERTEX, PASS};

use crate::zobrist::{komi_key, TABLES};

/// A Go position with full history, suitable for superko detection.
#[derive(Debug, Clone)]
pub struct GoState {
    board_size: usize,
    num_intersections: usize,
    stones: Vec<Option<Color>>,
    to_move: Color,
    komi: f32,
    passes: u8,
    move_number: u32,
    last_move: Vertex,
    ko_point: Option<usize>,
    /// Zobrist over the stone configuration only.
    stones_hash: u64,
    /// `stones_hash` after every position in the game, oldest first.
    history: Vec<u64>,
    prisoners: [u32; 2],
}

impl GoState {
    pub fn new(board_size: usize, komi: f32) -> Self {
        assert!(
            (2..=crate::zobrist::MAX_BOARD_SIZE).contains(&board_size),
            "unsupported board size {}",
            board_size
        );
        let num_intersections = board_size * board_size;
        Self {
            board_size,
            num_intersections,
            stones: vec![None; num_intersections],
            to_move: Color::Black,
            komi,
            passes: 0,
            move_number: 0,
            last_move: NULL_VERTEX,
            ko_point: None,
            stones_hash: 0,
            history: vec![0],
            prisoners: [0, 0],
        }
    }

    /// Clear the board, keeping size and komi.
    pub fn clear(&mut self) {
        *self = Self::new(self.board_size, self.komi);
    }

    pub fn set_komi(&mut self, komi: f32) {
        self.komi = komi;
    }

    #[inline]
    pub fn board_size(&self) -> usize {
        self.board_size
    }

    #[inline]
    pub fn num_intersections(&self) -> usize {
        self.num_intersections
    }

    #[inline]
    pub fn komi(&self) -> f32 {
        self.komi
    }

    #[inline]
    pub fn to_move(&self) -> Color {
        self.to_move
    }

    #[inline]
    pub fn passes(&self) -> u8 {
        self.passes
    }

    #[inline]
    pub fn move_number(&self) -> u32 {
        self.move_number
    }

    #[inline]
    pub fn last_move(&self) -> Vertex {
        self.last_move
    }

    #[inline]
    pub fn stone_at(&self, index: usize) -> Option<Color> {
        self.stones[index]
    }

    #[inline]
    pub fn prisoners(&self, color: Color) -> u32 {
        self.prisoners[color.index()]
    }

    /// Orthogonal neighbors of an intersection.
    pub(crate) fn neighbors(&self, index: usize) -> impl Iterator<Item = usize> {
        let size = self.board_size;
        let x = index % size;
        let y = index / size;
        let mut out = [usize::MAX; 4];
        let mut n = 0;
        if x > 0 {
            out[n] = index - 1;
            n += 1;
        }
        if x + 1 < size {
            out[n] = index + 1;
            n += 1;
        }
        if y > 0 {
            out[n] = index - size;
            n += 1;
        }
        if y + 1 < size {
            out[n] = index + size;
            n += 1;
        }
        out.into_iter().take(n)
    }

    pub(crate) fn diagonals(&self, index: usize) -> impl Iterator<Item = Option<usize>> {
        let size = self.board_size;
        let x = (index % size) as isize;
        let y = (index / size) as isize;
        [(-1, -1), (1, -1), (-1, 1), (1, 1)]
            .into_iter()
            .map(move |(dx, dy)| {
                let (nx, ny) = (x + dx, y + dy);
                if nx >= 0 && nx < size as isize && ny >= 0 && ny < size as isize {
                    Some((ny * size as isize + nx) as usize)
                } else {
                    None
                }
            })
    }

    /// Flood-fill the chain containing `index`, returning its stones and its
    /// distinct liberties.
    pub(crate) fn chain_and_liberties(&self, index: usize) -> (Vec<usize>, Vec<usize>) {
        let Some(color) = self.stones[index] else {
            return (Vec::new(), Vec::new());
        };
        let mut seen = vec![false; self.num_intersections];
        let mut lib_seen = vec![false; self.num_intersections];
        let mut chain = Vec::new();
        let mut libs = Vec::new();
        let mut queue = vec![index];
        seen[index] = true;

        while let Some(idx) = queue.pop() {
            chain.push(idx);
            for n in self.neighbors(idx) {
                match self.stones[n] {
                    None => {
                        if !lib_seen[n] {
                            lib_seen[n] = true;
                            libs.push(n);
                        }
                    }
                    Some(c) if c == color && !seen[n] => {
                        seen[n] = true;
                        queue.push(n);
                    }
                    _ => {}
                }
            }
        }
        (chain, libs)
    }

    pub(crate) fn liberty_count(&self, index: usize) -> usize {
        self.chain_and_liberties(index).1.len()
    }

    fn filter_permits(filter: Option<MoveFilter<'_>>, vertex: Vertex, color: Color) -> bool {
        filter.map_or(true, |f| f(vertex, color))
    }

    /// Full legality: bounds, occupancy, ko and the suicide rule, plus the
    /// optional caller filter.
    pub fn legal(&self, vertex: Vertex, color: Color, filter: Option<MoveFilter<'_>>) -> bool {
        if !Self::filter_permits(filter, vertex, color) {
            return false;
        }
        if vertex == PASS {
            return true;
        }
        if vertex < 0 || vertex as usize >= self.num_intersections {
            return false;
        }
        let index = vertex as usize;
        if self.stones[index].is_some() {
            return false;
        }
        if self.ko_point == Some(index) {
            return false;
        }

        // Any empty neighbor keeps the new stone alive.
        let mut has_liberty = false;
        let mut captures = false;
        let mut connects_alive = false;
        for n in self.neighbors(index) {
            match self.stones[n] {
                None => has_liberty = true,
                Some(c) if c == color => {
                    if self.liberty_count(n) >= 2 {
                        connects_alive = true;
                    }
                }
                Some(_) => {
                    if self.liberty_count(n) == 1 {
                        captures = true;
                    }
                }
            }
        }
        has_liberty || captures || connects_alive
    }

    /// Play a move for the side to move. Illegal moves are rejected and the
    /// position is left untouched.
    pub fn play_move(&mut self, vertex: Vertex) -> bool {
        if !self.legal(vertex, self.to_move, None) {
            return false;
        }
        self.play_move_unchecked(vertex);
        true
    }

    /// Play a move known to be legal.
    pub fn play_move_unchecked(&mut self, vertex: Vertex) {
        debug_assert!(self.legal(vertex, self.to_move, None));
        let color = self.to_move;

        if vertex == PASS {
            self.passes = self.passes.saturating_add(1);
            self.ko_point = None;
        } else {
            let index = vertex as usize;
            self.put_stone(index, color);

            // Remove opposing chains left without liberties.
            let mut captured = Vec::new();
            for n in self.neighbors(index) {
                if self.stones[n] == Some(color.opponent()) {
                    let (chain, libs) = self.chain_and_liberties(n);
                    if libs.is_empty() {
                        captured.extend(chain);
                    }
                }
            }
            captured.sort_unstable();
            captured.dedup();
            for &idx in &captured {
                self.remove_stone(idx, color.opponent());
            }
            self.prisoners[color.index()] += captured.len() as u32;

            // Simple ko: a single stone capturing a single stone while
            // ending with one liberty.
            self.ko_point = None;
            if captured.len() == 1 {
                let (chain, libs) = self.chain_and_liberties(index);
                if chain.len() == 1 && libs.len() == 1 {
                    self.ko_point = Some(captured[0]);
                }
            }

            self.passes = 0;
        }

        self.to_move = color.opponent();
        self.move_number += 1;
        self.last_move = vertex;
        self.history.push(self.stones_hash);
    }

    fn put_stone(&mut self, index: usize, color: Color) {
        debug_assert!(self.stones[index].is_none());
        self.stones[index] = Some(color);
        self.stones_hash ^= TABLES.stone[color.index()][index];
    }

    fn remove_stone(&mut self, index: usize, color: Color) {
        debug_assert_eq!(self.stones[index], Some(color));
        self.stones[index] = None;
        self.stones_hash ^= TABLES.stone[color.index()][index];
    }

    /// Fingerprint of the full search position: stones, side to move, ko and
    /// komi.
    pub fn position_hash(&self) -> u64 {
        let mut h = self.stones_hash ^ komi_key(self.komi);
        if self.to_move == Color::White {
            h ^= TABLES.side;
        }
        if let Some(ko) = self.ko_point {
            h ^= TABLES.ko[ko];
        }
        h
    }

    /// Stone-configuration hash used for superko detection.
    #[inline]
    pub fn position_ko_hash(&self) -> u64 {
        self.stones_hash
    }

    pub fn stone_key(&self, vertex: Vertex, color: Color) -> u64 {
        debug_assert!(vertex >= 0);
        TABLES.stone[color.index()][vertex as usize]
    }

    pub fn symmetry_position_hash(&self, symm: usize) -> u64 {
        let mut h = self.symmetry_stones_hash(symm) ^ komi_key(self.komi);
        if self.to_move == Color::White {
            h ^= TABLES.side;
        }
        if let Some(ko) = self.ko_point {
            h ^= TABLES.ko[transform_index(self.board_size, symm, ko)];
        }
        h
    }

    #[inline]
    pub fn symmetry_position_ko_hash(&self, symm: usize) -> u64 {
        self.symmetry_stones_hash(symm)
    }

    fn symmetry_stones_hash(&self, symm: usize) -> u64 {
        let mut h = 0u64;
        for (idx, stone) in self.stones.iter().enumerate() {
            if let Some(color) = stone {
                let t = transform_index(self.board_size, symm, idx);
                h ^= TABLES.stone[color.index()][t];
            }
        }
        h
    }

    /// True when the last real move recreated an earlier stone
    /// configuration. Passes never violate superko.
    pub fn superko(&self) -> bool {
        if self.last_move == PASS {
            return false;
        }
        let last = self.history.len() - 1;
        self.history[..last].contains(&self.history[last])
    }

    // ------------------------------------------------------------------
    // Tactical predicates
    // ------------------------------------------------------------------

    pub fn capture_move(&self, vertex: Vertex, color: Color) -> bool {
        if vertex < 0 || self.stones[vertex as usize].is_some() {
            return false;
        }
        self.neighbors(vertex as usize).any(|n| {
            self.stones[n] == Some(color.opponent()) && self.liberty_count(n) == 1
        })
    }

    pub fn simple_eye(&self, vertex: Vertex, color: Color) -> bool {
        if vertex < 0 || self.stones[vertex as usize].is_some() {
            return false;
        }
        self.neighbors(vertex as usize)
            .all(|n| self.stones[n] == Some(color))
    }

    pub fn real_eye(&self, vertex: Vertex, color: Color) -> bool {
        if !self.simple_eye(vertex, color) {
            return false;
        }
        let mut off_board = 0;
        let mut hostile = 0;
        for d in self.diagonals(vertex as usize) {
            match d {
                None => off_board += 1,
                Some(idx) => {
                    if self.stones[idx] == Some(color.opponent()) {
                        hostile += 1;
                    }
                }
            }
        }
        // Edge and corner eyes tolerate no hostile diagonal at all.
        if off_board > 0 {
            hostile == 0
        } else {
            hostile <= 1
        }
    }

    pub fn escape_move(&self, vertex: Vertex, color: Color) -> bool {
        if vertex < 0 || self.stones[vertex as usize].is_some() {
            return false;
        }
        let index = vertex as usize;
        let in_atari = self
            .neighbors(index)
            .any(|n| self.stones[n] == Some(color) && self.liberty_count(n) == 1);
        if !in_atari {
            return false;
        }
        if self.capture_move(vertex, color) {
            return true;
        }
        // Distinct liberties of the merged chain, the played point excluded.
        let mut libs = vec![false; self.num_intersections];
        let mut count = 0;
        let mut add = |idx: usize, libs: &mut Vec<bool>, count: &mut usize| {
            if idx != index && !libs[idx] {
                libs[idx] = true;
                *count += 1;
            }
        };
        for n in self.neighbors(index) {
            match self.stones[n] {
                None => add(n, &mut libs, &mut count),
                Some(c) if c == color => {
                    for lib in self.chain_and_liberties(n).1 {
                        add(lib, &mut libs, &mut count);
                    }
                }
                _ => {}
            }
        }
        count >= 2
    }

    // ------------------------------------------------------------------
    // Coordinates
    // ------------------------------------------------------------------

    #[inline]
    pub fn vertex_of(&self, x: usize, y: usize) -> Vertex {
        debug_assert!(x < self.board_size && y < self.board_size);
        (y * self.board_size + x) as Vertex
    }

    #[inline]
    pub fn index_of(&self, x: usize, y: usize) -> usize {
        y * self.board_size + x
    }

    #[inline]
    pub fn xy_of(&self, vertex: Vertex) -> (usize, usize) {
        debug_assert!(vertex >= 0);
        let idx = vertex as usize;
        (idx % self.board_size, idx / self.board_size)
    }
}
