/// Occupancy map for heap slots.
///
/// The allocator takes the first zero bit; the collector clears bits as it
/// frees slots, and `Storage::verify` counts them against the object list.
#[derive(Clone, Debug, Default)]
pub struct BitSet {
    data: Vec<usize>,
}

impl BitSet {
    /// Creates a new, empty bitset.
    pub fn new() -> Self {
        Default::default()
    }

    const BITS_PER_WORD: usize = std::mem::size_of::<usize>() * 8;

    /// Index of the lowest clear bit; bits past the end are clear.
    pub fn find_first_zero(&self) -> usize {
        for (idx, word) in self.data.iter().enumerate() {
            let z = word.trailing_ones() as usize;
            if z < Self::BITS_PER_WORD {
                return (idx * Self::BITS_PER_WORD) + z;
            }
        }
        self.data.len() * Self::BITS_PER_WORD
    }

    pub fn get(&self, idx: usize) -> bool {
        let word = idx / Self::BITS_PER_WORD;
        let bit = idx % Self::BITS_PER_WORD;
        match self.data.get(word) {
            Some(w) => w & (1 << bit) != 0,
            None => false,
        }
    }

    pub fn set(&mut self, idx: usize) {
        let word = idx / Self::BITS_PER_WORD;
        let bit = idx % Self::BITS_PER_WORD;
        if word >= self.data.len() {
            self.data.resize(word + 1, 0);
        }
        self.data[word] |= 1 << bit;
    }

    pub fn clear(&mut self, idx: usize) {
        let word = idx / Self::BITS_PER_WORD;
        let bit = idx % Self::BITS_PER_WORD;
        if let Some(w) = self.data.get_mut(word) {
            *w &= !(1 << bit);
        }
    }

    /// Number of set bits.
    pub fn count(&self) -> usize {
        self.data.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Indices of the set bits, in increasing order.
    pub fn ones(&self) -> impl Iterator<Item = usize> + '_ {
        self.data.iter().enumerate().flat_map(|(idx, &word)| {
            let mut word = word;
            std::iter::from_fn(move || {
                if word == 0 {
                    return None;
                }
                let bit = word.trailing_zeros() as usize;
                word &= word - 1;
                Some(idx * Self::BITS_PER_WORD + bit)
            })
        })
    }
}
