//! RNG module - the RANDOM entity
//!
//! A xorshift128+ generator whose whole state is the pair `(s0, s1)`. Being an
//! entity, it lives in the registry and is captured by snapshots, so a rewound
//! game draws exactly the same numbers again.
//!
//! The 7-bag piece randomizer is built on [`Random::shuffle`].

use crate::entity::EntityType;
use crate::error::{SnapshotError, SnapshotResult};
use crate::types::{PieceKind, TypeTag};
use crate::wire::{Reader, Writer};

/// xorshift128+ generator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Random {
    s0: u64,
    s1: u64,
}

impl Random {
    /// Create a new RNG with the given seed
    pub fn new(seed: u64) -> Self {
        // Expand the seed with splitmix64 so that small seeds still give a
        // well-mixed, non-zero state.
        let mut sm = seed;
        let s0 = splitmix64(&mut sm);
        let s1 = splitmix64(&mut sm);
        Self::from_state(s0, s1)
    }

    /// Restore a generator from raw state. An all-zero state is replaced by a
    /// fixed non-zero one since xorshift would only ever produce zeros.
    pub fn from_state(s0: u64, s1: u64) -> Self {
        if s0 == 0 && s1 == 0 {
            Self { s0: 1, s1: 0 }
        } else {
            Self { s0, s1 }
        }
    }

    pub fn state(&self) -> (u64, u64) {
        (self.s0, self.s1)
    }

    /// Generate next random u64
    pub fn next_u64(&mut self) -> u64 {
        let mut x = self.s0;
        let y = self.s1;
        self.s0 = y;
        x ^= x << 23;
        x ^= x >> 17;
        x ^= y ^ (y >> 26);
        self.s1 = x;
        x.wrapping_add(y)
    }

    pub fn next_u32(&mut self) -> u32 {
        (self.next_u64() >> 32) as u32
    }

    /// Generate random value in range [0, max)
    pub fn next_range(&mut self, max: u32) -> u32 {
        if max == 0 {
            return 0;
        }
        self.next_u32() % max
    }

    /// Uniform float in [0, 1)
    pub fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Shuffle a slice using Fisher-Yates
    pub fn shuffle<T>(&mut self, slice: &mut [T]) {
        for i in (1..slice.len()).rev() {
            let j = self.next_range((i + 1) as u32) as usize;
            slice.swap(i, j);
        }
    }

    /// A freshly shuffled 7-bag.
    pub fn next_bag(&mut self) -> [PieceKind; 7] {
        let mut bag = PieceKind::ALL;
        self.shuffle(&mut bag);
        bag
    }
}

fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9e37_79b9_7f4a_7c15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

impl EntityType for Random {
    const TAG: TypeTag = TypeTag::RANDOM;

    fn serialize(&self, out: &mut Writer) -> SnapshotResult<()> {
        out.seq(2)?;
        out.int(self.s0 as i64)?;
        out.int(self.s1 as i64)
    }

    fn deserialize(input: &mut Reader<'_>) -> SnapshotResult<Self> {
        input.seq_of(2, "random state")?;
        let s0 = input.int()? as u64;
        let s1 = input.int()? as u64;
        if s0 == 0 && s1 == 0 {
            return Err(SnapshotError::corrupt("random state is all zeros"));
        }
        Ok(Self { s0, s1 })
    }
}

impl Default for Random {
    fn default() -> Self {
        Self::new(1)
    }
}
