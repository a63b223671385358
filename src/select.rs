//! Ranking repeated subterms.

use itertools::Itertools;

use crate::{
    subterms::{Digest, SubtermIndex},
    term::Term,
};

/// A class of structurally equivalent subterms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    pub digest: Digest,
    /// The shared local normal form.
    pub term: Term,
    /// The number of occurrences.
    pub frequency: usize,
    /// The programs with at least one occurrence, in ascending order.
    pub programs: Vec<usize>,
    /// The number of holes in the normal form.
    pub placeholders: usize,
    pub size: usize,
    /// The position of the digest in discovery order.
    pub discovered: usize,
}

impl Pattern {
    /// The ranking score, occurrences weighted by size.
    #[must_use]
    pub fn weight(&self) -> usize {
        self.frequency * self.size
    }
}

/// The patterns occurring at least `min_frequency` times with at least
/// `min_size` nodes, by descending weight. Patterns of equal weight stay in
/// discovery order.
#[must_use]
pub fn select(index: &SubtermIndex, min_frequency: usize, min_size: usize) -> Vec<Pattern> {
    let mut patterns: Vec<Pattern> = index
        .iter()
        .enumerate()
        .filter_map(|(discovered, (digest, occurrences))| {
            let first = occurrences.first()?;
            if occurrences.len() < min_frequency || first.size < min_size {
                return None;
            }
            Some(Pattern {
                digest: *digest,
                term: first.normalized.clone(),
                frequency: occurrences.len(),
                programs: occurrences.iter().map(|o| o.program).dedup().collect(),
                placeholders: first.placeholders.len(),
                size: first.size,
                discovered,
            })
        })
        .collect();
    patterns.sort_by(|a, b| b.weight().cmp(&a.weight()));
    patterns
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subterms::{extract, Bounds};

    fn index(programs: &[&str]) -> SubtermIndex {
        let programs: Vec<Term> = programs.iter().map(|s| s.parse().unwrap()).collect();
        extract(&programs, Bounds::default())
    }

    #[test]
    fn ranks_by_frequency_times_size() {
        let index = index(&[
            "(lam (add (mul $0 2) 1))",
            "(lam (add (mul $0 2) 1))",
            "(lam (sub (mul $0 2) 7))",
        ]);
        let patterns = select(&index, 2, 3);
        let texts: Vec<String> = patterns.iter().map(|p| p.term.to_string()).collect();
        assert_eq!(
            texts,
            [
                "(lam (add (mul $0 2) 1))",
                "(add (mul #0 2) 1)",
                "(mul #0 2)",
                "(add (mul #0 2))",
                "(mul #0)",
            ]
        );
        assert_eq!(patterns[2].frequency, 3);
        assert_eq!(patterns[2].programs, [0, 1, 2]);
        assert_eq!(patterns[2].placeholders, 1);
    }

    #[test]
    fn ties_keep_discovery_order() {
        let index = index(&["(pair (add $0 1) (sub $0 1))", "(pair (add $0 1) (sub $0 1))"]);
        let texts: Vec<String> = select(&index, 2, 5)
            .iter()
            .map(|p| p.term.to_string())
            .collect();
        assert_eq!(
            texts,
            [
                "(pair (add #0 1) (sub #0 1))",
                "(pair (add #0 1))",
                "(add #0 1)",
                "(sub #0 1)",
            ]
        );
    }

    #[test]
    fn thresholds_filter() {
        let index = index(&["(lam (add $0 1))", "(lam (sub $0 1))"]);
        assert!(select(&index, 2, 3).is_empty());
        assert_eq!(select(&index, 1, 6).len(), 2);
    }
}
