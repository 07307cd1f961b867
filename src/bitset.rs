use alloc::vec;
use alloc::vec::Vec;

type Frame = u64;
const BITS_PER_FRAME: usize = core::mem::size_of::<Frame>() * 8;

/// A dense set of small integers. `insert` grows the set as needed, so
/// it doubles as a liveness set over safepoint indices and as the
/// backing store of fixed-length reference bitmaps.
#[derive(Clone, Default)]
#[cfg_attr(
    feature = "enable-serde",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct BitSet {
    bits: Vec<Frame>,
}

impl BitSet {
    pub fn new() -> Self {
        Self { bits: vec![] }
    }

    pub fn with_capacity(n: usize) -> Self {
        let no_of_frames = (n + BITS_PER_FRAME - 1) / BITS_PER_FRAME;
        Self {
            bits: vec![0; no_of_frames],
        }
    }

    pub fn compute_index(&self, el: usize) -> (usize, usize) {
        (el / BITS_PER_FRAME, el % BITS_PER_FRAME)
    }

    pub fn insert(&mut self, el: usize) {
        let (frame_no, idx) = self.compute_index(el);
        if frame_no >= self.bits.len() {
            self.bits.resize(frame_no + 1, 0);
        }
        self.bits[frame_no] |= 1 << idx;
    }

    pub fn contains(&self, el: usize) -> bool {
        let (frame_no, idx) = self.compute_index(el);
        match self.bits.get(frame_no) {
            Some(frame) => frame & (1 << idx) != 0,
            None => false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bits.iter().all(|frame| *frame == 0)
    }

    pub fn count(&self) -> usize {
        self.bits.iter().map(|frame| frame.count_ones() as usize).sum()
    }

    /// The frames up to and including the last non-zero one.
    fn significant(&self) -> &[Frame] {
        let end = self
            .bits
            .iter()
            .rposition(|frame| *frame != 0)
            .map_or(0, |i| i + 1);
        &self.bits[..end]
    }

    pub fn iter(&self) -> BitSetIter {
        BitSetIter {
            next_frame_idx: 0,
            curr_frame: 0,
            bits: &self.bits,
        }
    }
}

pub struct BitSetIter<'a> {
    next_frame_idx: usize,
    curr_frame: Frame,
    bits: &'a [Frame],
}

impl<'a> Iterator for BitSetIter<'a> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        while self.curr_frame == 0 {
            if self.next_frame_idx >= self.bits.len() {
                return None;
            }
            self.curr_frame = self.bits[self.next_frame_idx];
            self.next_frame_idx += 1;
        }
        let skip = self.curr_frame.trailing_zeros();
        self.curr_frame &= !(1 << skip);
        Some((self.next_frame_idx - 1) * BITS_PER_FRAME + skip as usize)
    }
}

use core::fmt;
use core::hash::{Hash, Hasher};

impl PartialEq for BitSet {
    fn eq(&self, other: &Self) -> bool {
        self.significant() == other.significant()
    }
}

impl Eq for BitSet {}

impl Hash for BitSet {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.significant().hash(state);
    }
}

impl fmt::Debug for BitSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{ ")?;
        for el in self.iter() {
            write!(f, "{el} ")?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operations() {
        let mut set = BitSet::with_capacity(200);
        set.insert(10);
        set.insert(11);
        set.insert(199);
        set.insert(23);
        set.insert(45);
        let els = [10, 11, 23, 45, 199];
        assert_eq!(set.iter().collect::<Vec<_>>(), els);
        assert!(set.contains(10));
        assert!(!set.contains(12));
        assert!(!set.contains(197));
        assert!(!set.contains(4000));
        set.insert(73);
        assert_eq!(set.iter().collect::<Vec<_>>(), [10, 11, 23, 45, 73, 199]);
        assert_eq!(set.count(), 6);
    }

    #[test]
    fn grows_on_insert() {
        let mut set = BitSet::new();
        assert!(set.is_empty());
        set.insert(130);
        assert!(set.contains(130));
        assert_eq!(set.iter().collect::<Vec<_>>(), [130]);
        assert!(!set.is_empty());
        assert!(!set.contains(100_000));
    }

    #[test]
    fn equality_ignores_capacity() {
        let mut a = BitSet::with_capacity(1000);
        let mut b = BitSet::new();
        assert_eq!(a, b);
        a.insert(3);
        b.insert(3);
        assert_eq!(a, b);
        b.insert(64);
        assert_ne!(a, b);
    }
}
