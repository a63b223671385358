//! The primary interface for library learning through anti-unification.
//!
//! The [`Miner`] compresses a corpus of closed terms by repeatedly finding
//! the abstraction whose introduction shrinks the corpus the most, adding it
//! to the library, and rewriting every match of its body into a call. The
//! encoded size of the corpus (programs plus abstraction bodies) strictly
//! decreases with every abstraction added.

use std::{
    collections::HashSet,
    fmt::{self, Display, Formatter},
};

use egg::Symbol;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::{
    anti_unify::{anti_unify, Candidate, CloseError},
    fresh::Fresh,
    rewrite::Rewriter,
    select::select,
    subterms::{self, extract, Bounds, Digest, Occurrence, SubtermIndex},
    term::Term,
};

/// The default number of mining iterations.
pub const DEFAULT_ITERATIONS: usize = 10;
/// The default largest number of parameters of an abstraction.
pub const DEFAULT_MAX_ARITY: usize = 3;
/// The default number of occurrences a pattern needs to be considered.
pub const DEFAULT_MIN_FREQUENCY: usize = 2;
/// The default size charged for defining an abstraction, on top of its body.
pub const DEFAULT_DEFINITION_OVERHEAD: usize = 4;
/// The default number of pairs anti-unified per iteration.
pub const DEFAULT_MAX_PAIRS: usize = 2000;

/// Settings for a [`Miner`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MinerConfig {
    /// The most abstractions to learn.
    pub iterations: usize,
    /// The most parameters an abstraction may take.
    pub max_arity: usize,
    /// The smallest subterm considered.
    pub min_size: usize,
    /// The largest subterm considered.
    pub max_size: usize,
    /// The fewest occurrences for a repeated subterm to seed a candidate, and
    /// the fewest uses for a candidate to be registered.
    pub min_frequency: usize,
    /// The size charged for defining an abstraction. This is a heuristic
    /// stand-in for the cost of a definition, not an exact encoding cost.
    pub definition_overhead: usize,
    /// The most pairs of subterms anti-unified per iteration.
    pub max_pairs: usize,
}

impl Default for MinerConfig {
    fn default() -> Self {
        Self {
            iterations: DEFAULT_ITERATIONS,
            max_arity: DEFAULT_MAX_ARITY,
            min_size: subterms::DEFAULT_MIN_SIZE,
            max_size: subterms::DEFAULT_MAX_SIZE,
            min_frequency: DEFAULT_MIN_FREQUENCY,
            definition_overhead: DEFAULT_DEFINITION_OVERHEAD,
            max_pairs: DEFAULT_MAX_PAIRS,
        }
    }
}

impl MinerConfig {
    /// The subterm size bounds.
    #[must_use]
    pub fn bounds(&self) -> Bounds {
        Bounds {
            min_size: self.min_size,
            max_size: self.max_size,
        }
    }
}

/// A learned abstraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Abstraction {
    /// `fn_<order>`.
    pub name: Symbol,
    pub arity: usize,
    /// The body, with holes `#0` to `#arity - 1`.
    pub body: Term,
    /// The position of the abstraction in the library.
    pub order: usize,
    /// The number of calls introduced when it was registered.
    pub uses: usize,
    /// The decrease in encoded corpus size it achieved.
    pub gain: usize,
}

impl Abstraction {
    /// The body with its holes replaced by `args`.
    #[must_use]
    pub fn instantiate(&self, args: &[Term]) -> Term {
        self.body.instantiate(args)
    }
}

/// The abstractions learned so far, in order of discovery.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Library {
    abstractions: Vec<Abstraction>,
}

impl Library {
    /// Look up an abstraction by name.
    #[must_use]
    pub fn get(&self, name: Symbol) -> Option<&Abstraction> {
        self.abstractions.iter().find(|a| a.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Abstraction> + '_ {
        self.abstractions.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.abstractions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.abstractions.is_empty()
    }

    /// The total size of the abstraction bodies.
    #[must_use]
    pub fn size(&self) -> usize {
        self.abstractions.iter().map(|a| a.body.size()).sum()
    }

    /// The name the next abstraction will get.
    #[must_use]
    pub fn next_name(&self) -> Symbol {
        Symbol::from(format!("fn_{}", self.abstractions.len()))
    }

    fn push(&mut self, abstraction: Abstraction) {
        self.abstractions.push(abstraction);
    }
}

/// The size of a corpus together with the library it uses.
#[must_use]
pub fn encoded_size(programs: &[Term], library: &Library) -> usize {
    programs.iter().map(Term::size).sum::<usize>() + library.size()
}

/// Why mining stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    /// The configured number of iterations ran.
    IterationBudget,
    /// No candidate would decrease the encoded size.
    NoProfitableAbstraction,
}

impl Display for StopReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::IterationBudget => f.write_str("iteration budget exhausted"),
            StopReason::NoProfitableAbstraction => f.write_str("no profitable abstraction"),
        }
    }
}

/// Counters describing a mining run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MiningStats {
    /// The number of abstractions registered.
    pub iterations: usize,
    /// The encoded size before mining.
    pub initial_size: usize,
    /// The encoded size after mining.
    pub final_size: usize,
    pub pairs_considered: usize,
    /// Candidates discarded for needing too many parameters.
    pub arity_overflows: usize,
    /// Candidates discarded because a hole would capture a bound variable.
    pub capture_rejections: usize,
    /// Distinct candidates scored against the whole corpus.
    pub candidates_scored: usize,
}

/// The output of a [`Compressor`].
#[derive(Debug, Clone, PartialEq)]
pub struct MiningResult {
    pub library: Library,
    /// The rewritten corpus, in input order.
    pub programs: Vec<Term>,
    pub stop: StopReason,
    pub stats: MiningStats,
}

impl MiningResult {
    /// The encoded size of the rewritten corpus and its library.
    #[must_use]
    pub fn encoded_size(&self) -> usize {
        encoded_size(&self.programs, &self.library)
    }
}

/// Something that compresses a corpus of closed terms by learning a library.
pub trait Compressor {
    /// Compress `programs`.
    fn compress(&self, programs: &[Term]) -> MiningResult;
}

/// A candidate scored against the whole corpus.
#[derive(Debug, Clone)]
struct Scored {
    candidate: Candidate,
    programs: Vec<Term>,
    uses: usize,
    score: usize,
}

/// The greedy compression-gain miner.
#[derive(Debug, Clone, Copy, Default)]
pub struct Miner {
    config: MinerConfig,
}

impl Miner {
    #[must_use]
    pub fn new(config: MinerConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &MinerConfig {
        &self.config
    }

    /// The pairs of occurrences to anti-unify: the first two occurrences of
    /// every repeated pattern, then pairs of distinct subterms with the same
    /// head, in rank order.
    fn pairs<'a>(&self, index: &'a SubtermIndex) -> Vec<(&'a Occurrence, &'a Occurrence)> {
        let max = self.config.max_pairs;
        let occurrences = |digest: &Digest| index.get(digest).unwrap_or_default();

        let mut pairs: Vec<_> = select(index, self.config.min_frequency, self.config.min_size)
            .iter()
            .filter_map(|pattern| match occurrences(&pattern.digest) {
                [first, second, ..] => Some((first, second)),
                _ => None,
            })
            .take(max)
            .collect();

        let representatives: Vec<&Occurrence> = select(index, 1, self.config.min_size)
            .iter()
            .filter_map(|pattern| occurrences(&pattern.digest).first())
            .collect();
        'outer: for (i, a) in representatives.iter().enumerate() {
            for b in &representatives[i + 1..] {
                if pairs.len() >= max {
                    break 'outer;
                }
                if a.concrete.head() == b.concrete.head() {
                    pairs.push((*a, *b));
                }
            }
        }
        pairs
    }

    /// Rewrite the corpus with `candidate` and measure the decrease in
    /// encoded size, net of the new definition.
    fn score(&self, candidate: Candidate, name: Symbol, programs: &[Term]) -> Option<Scored> {
        let rewriter = Rewriter::new(name, &candidate.body, candidate.arity);
        let (rewritten, uses) = rewriter.rewrite_all(programs);
        if uses < self.config.min_frequency {
            return None;
        }
        let before: usize = programs.iter().map(Term::size).sum();
        let after: usize = rewritten.iter().map(Term::size).sum();
        let cost = after + candidate.body.size() + self.config.definition_overhead;
        let score = before.checked_sub(cost).filter(|&s| s > 0)?;
        Some(Scored {
            candidate,
            programs: rewritten,
            uses,
            score,
        })
    }

    /// Find the most profitable abstraction for `programs`, if any.
    fn step(
        &self,
        programs: &[Term],
        library: &Library,
        fresh: &mut Fresh,
        stats: &mut MiningStats,
    ) -> Option<Scored> {
        let index = extract(programs, self.config.bounds());
        let pairs = self.pairs(&index);
        debug!(
            "{} distinct subterms in {} occurrences, {} pairs",
            index.len(),
            index.occurrences(),
            pairs.len()
        );

        let name = library.next_name();
        let mut seen = HashSet::new();
        let mut best: Option<Scored> = None;
        for (a, b) in pairs {
            stats.pairs_considered += 1;
            let generalization = anti_unify(&a.concrete, &b.concrete, fresh);
            if a.size + b.size <= generalization.term.size() + self.config.definition_overhead {
                continue;
            }
            let candidate = match generalization.close(self.config.max_arity) {
                Ok(candidate) => candidate,
                Err(CloseError::AntiUnificationArityOverflow { .. }) => {
                    stats.arity_overflows += 1;
                    continue;
                }
                Err(CloseError::Capture { .. }) => {
                    stats.capture_rejections += 1;
                    continue;
                }
                Err(CloseError::Trivial) => continue,
            };
            if !seen.insert(candidate.body.clone()) {
                continue;
            }
            stats.candidates_scored += 1;
            if let Some(scored) = self.score(candidate, name, programs) {
                debug!("candidate {} scores {}", scored.candidate.body, scored.score);
                if best.as_ref().map_or(true, |best| scored.score > best.score) {
                    best = Some(scored);
                }
            }
        }
        best
    }
}

impl Compressor for Miner {
    fn compress(&self, programs: &[Term]) -> MiningResult {
        let mut programs = programs.to_vec();
        let mut library = Library::default();
        let mut fresh = Fresh::new();
        let mut stats = MiningStats {
            initial_size: encoded_size(&programs, &library),
            ..MiningStats::default()
        };
        info!(
            "mining {} programs of encoded size {}",
            programs.len(),
            stats.initial_size
        );

        let mut stop = StopReason::IterationBudget;
        for _ in 0..self.config.iterations {
            let Some(best) = self.step(&programs, &library, &mut fresh, &mut stats) else {
                stop = StopReason::NoProfitableAbstraction;
                break;
            };
            let abstraction = Abstraction {
                name: library.next_name(),
                arity: best.candidate.arity,
                body: best.candidate.body,
                order: library.len(),
                uses: best.uses,
                gain: best.score,
            };
            info!(
                "learned {} = {} (arity {}, {} uses, gain {})",
                abstraction.name, abstraction.body, abstraction.arity, abstraction.uses, abstraction.gain
            );
            library.push(abstraction);
            programs = best.programs;
            stats.iterations += 1;
        }

        stats.final_size = encoded_size(&programs, &library);
        debug!("{} holes issued", fresh.issued());
        info!(
            "stopped after {} abstractions ({}), encoded size {} -> {}",
            library.len(),
            stop,
            stats.initial_size,
            stats.final_size
        );
        MiningResult {
            library,
            programs,
            stop,
            stats,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn terms(programs: &[&str]) -> Vec<Term> {
        programs.iter().map(|s| s.parse().unwrap()).collect()
    }

    fn conjunctions() -> Vec<Term> {
        terms(&[
            "(lam (lam (and (gt $1 0) (eq $0 -1))))",
            "(lam (lam (and (gt $1 0) (eq $0 -1))))",
            "(lam (lam (lam (and (and (gt $2 0) (eq $1 -1)) (lt $0 5)))))",
        ])
    }

    #[test]
    fn learns_the_shared_conjunction() {
        let result = Miner::default().compress(&conjunctions());
        let library: Vec<_> = result.library.iter().collect();
        assert_eq!(library.len(), 1);
        assert_eq!(library[0].name, Symbol::from("fn_0"));
        assert_eq!(library[0].body.to_string(), "(and (gt #0 0) (eq #1 -1))");
        assert_eq!(library[0].arity, 2);
        assert_eq!(library[0].uses, 3);
        assert_eq!(library[0].gain, 13);
        assert_eq!(
            result.programs,
            terms(&[
                "(lam (lam (fn_0 $1 $0)))",
                "(lam (lam (fn_0 $1 $0)))",
                "(lam (lam (lam (and (fn_0 $2 $1) (lt $0 5)))))",
            ])
        );
        assert_eq!(result.stop, StopReason::NoProfitableAbstraction);
        assert_eq!(result.stats.initial_size, 54);
        assert_eq!(result.stats.final_size, 37);
        assert_eq!(result.encoded_size(), 37);
    }

    #[test]
    fn encoded_size_never_increases() {
        let corpus = terms(&[
            "(lam (add (mul $0 2) (mul $0 3)))",
            "(lam (sub (mul $0 2) (mul $0 3)))",
            "(lam (lam (add (mul $1 2) (mul $0 3))))",
            "(lam (pair (add (mul $0 2) (mul $0 3)) (len v0)))",
            "(lam (get 0 (add (mul $0 2) (mul $0 3))))",
        ]);
        let result = Miner::default().compress(&corpus);
        assert!(!result.library.is_empty());
        assert!(result.stats.final_size < result.stats.initial_size);

        let mut size = encoded_size(&corpus, &Library::default());
        let mut programs = corpus;
        let mut library = Library::default();
        for abstraction in result.library.iter() {
            let (rewritten, _) = Rewriter::new(abstraction.name, &abstraction.body, abstraction.arity)
                .rewrite_all(&programs);
            programs = rewritten;
            library.push(abstraction.clone());
            let next = encoded_size(&programs, &library);
            assert!(next < size);
            size = next;
        }
        assert_eq!(programs, result.programs);
    }

    #[test]
    fn iteration_budget_limits_the_library() {
        let config = MinerConfig {
            iterations: 1,
            ..MinerConfig::default()
        };
        let corpus = terms(&[
            "(lam (add (mul $0 2) (mul $0 3)))",
            "(lam (sub (mul $0 2) (mul $0 3)))",
            "(lam (lam (add (mul $1 2) (mul $0 3))))",
            "(lam (pair (add (mul $0 2) (mul $0 3)) (len v0)))",
        ]);
        let result = Miner::new(config).compress(&corpus);
        assert_eq!(result.library.len(), 1);
        assert_eq!(result.stop, StopReason::IterationBudget);

        let none = MinerConfig {
            iterations: 0,
            ..MinerConfig::default()
        };
        let result = Miner::new(none).compress(&corpus);
        assert!(result.library.is_empty());
        assert_eq!(result.programs, corpus);
    }

    #[test]
    fn unrelated_programs_yield_nothing() {
        let corpus = terms(&["(lam (add $0 1))", "(lam (len $0))"]);
        let result = Miner::default().compress(&corpus);
        assert!(result.library.is_empty());
        assert_eq!(result.stop, StopReason::NoProfitableAbstraction);
        assert_eq!(result.stats.final_size, result.stats.initial_size);
    }

    #[test]
    fn arity_limit_is_respected() {
        let config = MinerConfig {
            max_arity: 1,
            ..MinerConfig::default()
        };
        let result = Miner::new(config).compress(&conjunctions());
        assert!(result.library.iter().all(|a| a.arity <= 1));
        assert!(result.stats.arity_overflows > 0);
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let config: MinerConfig = serde_json::from_str(r#"{"max_arity": 2}"#).unwrap();
        assert_eq!(config.max_arity, 2);
        assert_eq!(config.iterations, DEFAULT_ITERATIONS);
        assert_eq!(config.bounds(), Bounds::default());
    }
}
