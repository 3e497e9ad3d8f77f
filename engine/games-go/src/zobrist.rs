//! Zobrist hashing tables.
//!
//! Process-wide immutable tables generated once from a fixed seed, so hashes
//! are stable across runs and threads. Keys exist for every stone/point
//! combination, the ko point, and the side to move; komi is folded in through
//! a bit mixer so that positions differing only in komi fingerprint apart.

use once_cell::sync::Lazy;

/// Largest supported board edge.
pub const MAX_BOARD_SIZE: usize = 19;

/// Largest supported intersection count.
pub const MAX_INTERSECTIONS: usize = MAX_BOARD_SIZE * MAX_BOARD_SIZE;

const SEED: u64 = 0x9f2b_315c_74d1_8e6b;

/// splitmix64, also used to derive the table entries.
#[inline]
pub fn mix64(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9e37_79b9_7f4a_7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

pub struct ZobristTables {
    /// Stone keys, indexed `[color][intersection]`.
    pub stone: [[u64; MAX_INTERSECTIONS]; 2],
    /// Ko-point keys.
    pub ko: [u64; MAX_INTERSECTIONS],
    /// Toggled while White is to move.
    pub side: u64,
}

pub static TABLES: Lazy<ZobristTables> = Lazy::new(|| {
    let mut state = SEED;
    let mut next = || {
        state = mix64(state);
        state
    };

    let mut stone = [[0u64; MAX_INTERSECTIONS]; 2];
    for row in stone.iter_mut() {
        for key in row.iter_mut() {
            *key = next();
        }
    }
    let mut ko = [0u64; MAX_INTERSECTIONS];
    for key in ko.iter_mut() {
        *key = next();
    }
    let side = next();

    ZobristTables { stone, ko, side }
});

/// Fingerprint contribution of the komi value.
#[inline]
pub fn komi_key(komi: f32) -> u64 {
    mix64(komi.to_bits() as u64 ^ 0xc2b2_ae3d_27d4_eb4f)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tables_are_stable() {
        // Same process-wide table on every access.
        assert_eq!(TABLES.stone[0][0], TABLES.stone[0][0]);
        assert_ne!(TABLES.stone[0][0], TABLES.stone[1][0]);
        assert_ne!(TABLES.stone[0][0], TABLES.ko[0]);
    }

    #[test]
    fn test_komi_key_separates_values() {
        assert_ne!(komi_key(6.5), komi_key(7.5));
        assert_eq!(komi_key(6.5), komi_key(6.5));
    }

    #[test]
    fn test_keys_nonzero() {
        assert_ne!(TABLES.side, 0);
        for idx in 0..MAX_INTERSECTIONS {
            assert_ne!(TABLES.stone[0][idx], 0);
            assert_ne!(TABLES.stone[1][idx], 0);
        }
    }
}
