//! Linear ranges

use serde::{Deserialize, Serialize};

/// A range of linear offsets. `from` is the anchor and `to` the focus, so a
/// range may be backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Range {
    pub from: usize,
    pub to: usize,
}

impl Range {
    pub fn new(from: usize, to: usize) -> Self {
        Self { from, to }
    }

    pub fn collapsed(offset: usize) -> Self {
        Self::new(offset, offset)
    }

    pub fn start(&self) -> usize {
        self.from.min(self.to)
    }

    pub fn end(&self) -> usize {
        self.from.max(self.to)
    }

    pub fn len(&self) -> usize {
        self.end() - self.start()
    }

    pub fn is_collapsed(&self) -> bool {
        self.from == self.to
    }

    pub fn is_backwards(&self) -> bool {
        self.from > self.to
    }

    pub fn contains_offset(&self, offset: usize) -> bool {
        offset >= self.start() && offset < self.end()
    }

    pub fn flipped(&self) -> Self {
        Self::new(self.to, self.from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backwards_range() {
        let range = Range::new(7, 3);
        assert!(range.is_backwards());
        assert_eq!(range.start(), 3);
        assert_eq!(range.end(), 7);
        assert_eq!(range.len(), 4);
        assert!(!range.flipped().is_backwards());
    }

    #[test]
    fn test_collapsed() {
        let range = Range::collapsed(5);
        assert!(range.is_collapsed());
        assert!(!range.contains_offset(5));
        assert_eq!(range.len(), 0);
    }
}
