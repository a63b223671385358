//! Utilities for generating fresh holes.

/// A counter producing hole numbers that haven't been handed out before.
///
/// The counter is owned by whoever drives generalization and threaded through
/// every call, so numbering is deterministic for a given sequence of calls.
#[derive(Debug, Clone, Default)]
pub struct Fresh {
    next: usize,
}

impl Fresh {
    /// Create a counter starting at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a hole number not returned before.
    pub fn gen(&mut self) -> usize {
        let k = self.next;
        self.next += 1;
        k
    }

    /// The number of holes handed out so far.
    #[must_use]
    pub fn issued(&self) -> usize {
        self.next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn holes_are_never_reused() {
        let mut fresh = Fresh::new();
        assert_eq!(fresh.gen(), 0);
        assert_eq!(fresh.gen(), 1);
        assert_eq!(fresh.gen(), 2);
        assert_eq!(fresh.issued(), 3);
    }
}
