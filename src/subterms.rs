//! Subterm enumeration and structural hashing.
//!
//! Every subterm of the corpus within the size bounds is put into local
//! normal form, where each variable bound outside the subterm becomes a hole
//! numbered by first appearance. Two subterms are structurally equivalent
//! when their normal forms are equal, which is tested through a digest of the
//! normal form's text.

use std::fmt::{self, Display, Formatter};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};

use crate::term::{DeBruijnIndex, Term};

/// The default smallest subterm considered.
pub const DEFAULT_MIN_SIZE: usize = 3;
/// The default largest subterm considered.
pub const DEFAULT_MAX_SIZE: usize = 40;

/// Inclusive bounds on the size of enumerated subterms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bounds {
    pub min_size: usize,
    pub max_size: usize,
}

impl Default for Bounds {
    fn default() -> Self {
        Self {
            min_size: DEFAULT_MIN_SIZE,
            max_size: DEFAULT_MAX_SIZE,
        }
    }
}

impl Bounds {
    #[must_use]
    pub fn contains(&self, size: usize) -> bool {
        (self.min_size..=self.max_size).contains(&size)
    }
}

/// The first 16 bytes of the SHA-256 hash of a normal form's text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Digest([u8; 16]);

impl Digest {
    /// Hash the text form of `normalized`.
    #[must_use]
    pub fn of(normalized: &Term) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(normalized.to_string().as_bytes());
        let hash = hasher.finalize();
        let mut bytes = [0; 16];
        bytes.copy_from_slice(&hash[..16]);
        Digest(bytes)
    }
}

impl Display for Digest {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for b in self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

/// One place a subterm occurs in the corpus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Occurrence {
    /// The index of the program it occurs in.
    pub program: usize,
    /// The child positions leading to it from the program's root.
    pub path: Vec<usize>,
    /// The subterm as it appears.
    pub concrete: Term,
    /// The subterm in local normal form.
    pub normalized: Term,
    /// For each hole of the normal form, the variable it replaced, as an
    /// index relative to the subterm's root.
    pub placeholders: Vec<usize>,
    /// The number of nodes in the subterm.
    pub size: usize,
}

/// Subterm occurrences grouped by digest, in order of discovery.
#[derive(Debug, Clone, Default)]
pub struct SubtermIndex {
    entries: IndexMap<Digest, Vec<Occurrence>>,
}

impl SubtermIndex {
    /// The occurrences with digest `digest`.
    #[must_use]
    pub fn get(&self, digest: &Digest) -> Option<&[Occurrence]> {
        self.entries.get(digest).map(Vec::as_slice)
    }

    /// Every digest with its occurrences, in order of discovery.
    pub fn iter(&self) -> impl Iterator<Item = (&Digest, &[Occurrence])> + '_ {
        self.entries.iter().map(|(d, occs)| (d, occs.as_slice()))
    }

    /// The number of distinct digests.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The total number of occurrences.
    #[must_use]
    pub fn occurrences(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }
}

/// Put `term` in local normal form, returning the normal form and the
/// variable each hole replaced.
#[must_use]
pub fn normalize(term: &Term) -> (Term, Vec<usize>) {
    let mut placeholders: Vec<usize> = Vec::new();
    let normalized = term.transform(|t, depth| match t {
        Term::Var(DeBruijnIndex(i)) if *i >= depth => {
            let referent = i - depth;
            let k = placeholders
                .iter()
                .position(|&r| r == referent)
                .unwrap_or_else(|| {
                    placeholders.push(referent);
                    placeholders.len() - 1
                });
            Some(Term::Hole(k))
        }
        _ => None,
    });
    (normalized, placeholders)
}

/// Enumerate every subterm of `programs` whose size is within `bounds`,
/// excluding leaves.
#[must_use]
pub fn extract(programs: &[Term], bounds: Bounds) -> SubtermIndex {
    let mut index = SubtermIndex::default();
    for (program, term) in programs.iter().enumerate() {
        let mut path = Vec::new();
        walk(term, &mut path, &mut |subterm, path| {
            let size = subterm.size();
            if subterm.is_leaf() || !bounds.contains(size) {
                return;
            }
            let (normalized, placeholders) = normalize(subterm);
            index
                .entries
                .entry(Digest::of(&normalized))
                .or_default()
                .push(Occurrence {
                    program,
                    path: path.to_vec(),
                    concrete: subterm.clone(),
                    normalized,
                    placeholders,
                    size,
                });
        });
    }
    index
}

fn walk<F: FnMut(&Term, &[usize])>(term: &Term, path: &mut Vec<usize>, f: &mut F) {
    f(term, path);
    for (i, child) in term.children().into_iter().enumerate() {
        path.push(i);
        walk(child, path, f);
        path.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn digest(s: &str) -> Digest {
        Digest::of(&normalize(&s.parse().unwrap()).0)
    }

    #[test]
    fn equivalence_is_up_to_placeholder_renaming() {
        assert_eq!(digest("(add $0 $1)"), digest("(add $1 $0)"));
        assert_ne!(digest("(add $0 $0)"), digest("(add $0 $1)"));
        assert_eq!(digest("(lam (add $0 $1))"), digest("(lam (add $0 $2))"));
        assert_ne!(digest("(lam (add $1 $0))"), digest("(lam (add $0 $1))"));
    }

    #[test]
    fn normal_form_records_referents() {
        let (normalized, placeholders) = normalize(&"(lam (add $2 (mul $0 $2)))".parse().unwrap());
        assert_eq!(normalized.to_string(), "(lam (add #0 (mul $0 #0)))");
        assert_eq!(placeholders, [1]);
    }

    #[test]
    fn extraction_respects_bounds_and_skips_leaves() {
        let programs: Vec<Term> = ["(lam (add $0 1))", "(lam (add $0 1))"]
            .iter()
            .map(|s| s.parse().unwrap())
            .collect();
        let index = extract(&programs, Bounds { min_size: 1, max_size: 5 });
        assert_eq!(index.len(), 2);
        assert!(index.iter().all(|(_, occs)| occs.len() == 2));

        let (_, occs) = index.iter().next().unwrap();
        assert_eq!(occs[0].normalized.to_string(), "(add #0 1)");
        assert_eq!(occs[0].path, [0]);
        assert_eq!(occs[1].program, 1);
        let reached = occs[1]
            .path
            .iter()
            .try_fold(&programs[1], |term, &i| term.children().get(i).copied());
        assert_eq!(reached, Some(&occs[1].concrete));

        let big = extract(&programs, Bounds { min_size: 6, max_size: 6 });
        assert_eq!(big.occurrences(), 2);
    }

    #[test]
    fn digests_print_as_hex() {
        let text = digest("(add $0 1)").to_string();
        assert_eq!(text.len(), 32);
        assert!(text.bytes().all(|b| b.is_ascii_hexdigit()));
    }
}
