#[derive(Debug, Clone, Copy)]
pub enum EntrySize {
    Small,
    Medium,
    Large,
}

/// Deterministic key/value generator, so every run inserts the same data.
pub struct DataGenerator {
    seed: u64,
}

impl DataGenerator {
    pub fn new() -> Self {
        Self { seed: 42 }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self { seed }
    }

    pub fn key(&self, id: u64) -> Vec<u8> {
        format!("key{:010}", id).into_bytes()
    }

    pub fn value(&self, id: u64, size: EntrySize) -> Vec<u8> {
        let len = self.value_len(size);
        let mut value = Vec::with_capacity(len);
        let mut state = self.seed ^ id;
        while value.len() < len {
            state = next_state(state);
            value.extend_from_slice(&state.to_le_bytes());
        }
        value.truncate(len);
        value
    }

    pub fn value_len(&self, size: EntrySize) -> usize {
        match size {
            EntrySize::Small => 16,
            EntrySize::Medium => 200,
            EntrySize::Large => 2000,
        }
    }

    pub fn sequential_ids(&self, count: usize) -> Vec<u64> {
        (0..count as u64).collect()
    }

    /// Every id in `0..count` exactly once, in a scrambled order.
    pub fn shuffled_ids(&self, count: usize) -> Vec<u64> {
        let mut ids = self.sequential_ids(count);
        let mut state = self.seed;
        for i in (1..ids.len()).rev() {
            state = next_state(state);
            let j = (state % (i as u64 + 1)) as usize;
            ids.swap(i, j);
        }
        ids
    }

    pub fn entries(&self, ids: &[u64], size: EntrySize) -> Vec<(Vec<u8>, Vec<u8>)> {
        ids.iter()
            .map(|&id| (self.key(id), self.value(id, size)))
            .collect()
    }
}

impl Default for DataGenerator {
    fn default() -> Self {
        Self::new()
    }
}

// splitmix64
fn next_state(state: u64) -> u64 {
    let mut z = state.wrapping_add(0x9e37_79b9_7f4a_7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}
