//! Reading source entries and turning them into a corpus of programs.
//!
//! Ingestion never fails as a whole. Each entry either becomes a [`Program`]
//! or is rejected with an [`Issue`] saying why, and programs that keep free
//! symbols are recorded as well.

use std::collections::HashSet;

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    canonical::{self, Canonical, FreeSymbolMap},
    convert::{self, ConvertError},
    syntax::parse_function,
    term::Term,
};

/// One entry of an input corpus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceEntry {
    pub id: String,
    /// Anything describing the program. Carried along but never interpreted.
    #[serde(default)]
    pub description: serde_json::Value,
    /// The source of a single function, or a term in text form if it starts
    /// with a parenthesis.
    pub source: String,
}

/// Something that went wrong with one entry.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind")]
pub enum Issue {
    /// The program uses a construct that can't be represented. It is excluded
    /// from the corpus.
    #[error("{id}: unsupported construct: {construct}")]
    StructuralUnsupported { id: String, construct: String },
    /// The program refers to names it doesn't define. It is kept.
    #[error("{id}: free symbols remain: {}", .symbols.join(", "))]
    FreeSymbolLeak { id: String, symbols: Vec<String> },
    /// The entry was rejected before conversion.
    #[error("malformed entry{}: {reason}", .id.as_ref().map(|id| format!(" {id}")).unwrap_or_default())]
    Malformed { id: Option<String>, reason: String },
}

impl Issue {
    fn malformed<S: Into<String>>(id: Option<&str>, reason: S) -> Self {
        Issue::Malformed {
            id: id.map(str::to_owned),
            reason: reason.into(),
        }
    }
}

fn accept(value: serde_json::Value, entries: &mut Vec<SourceEntry>, issues: &mut Vec<Issue>) {
    let id = value
        .get("id")
        .and_then(serde_json::Value::as_str)
        .map(str::to_owned);
    match serde_json::from_value(value) {
        Ok(entry) => entries.push(entry),
        Err(e) => issues.push(Issue::malformed(id.as_deref(), e.to_string())),
    }
}

/// Parse a corpus given either as a JSON array of entries or as one entry per
/// line. Entries that don't have the expected shape are reported as issues.
#[must_use]
pub fn read_entries(text: &str) -> (Vec<SourceEntry>, Vec<Issue>) {
    let mut entries = Vec::new();
    let mut issues = Vec::new();
    if text.trim_start().starts_with('[') {
        match serde_json::from_str::<Vec<serde_json::Value>>(text) {
            Ok(values) => {
                for value in values {
                    accept(value, &mut entries, &mut issues);
                }
            }
            Err(e) => issues.push(Issue::malformed(None, e.to_string())),
        }
    } else {
        for (i, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(line) {
                Ok(value) => accept(value, &mut entries, &mut issues),
                Err(e) => issues.push(Issue::malformed(None, format!("line {}: {e}", i + 1))),
            }
        }
    }
    (entries, issues)
}

/// A converted program.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub id: String,
    pub source: String,
    pub description: serde_json::Value,
    /// The name of the function.
    pub name: String,
    /// The names of its parameters, in order.
    pub params: Vec<String>,
    /// The canonical term.
    pub term: Term,
    /// The origin of each canonical free symbol.
    pub free: FreeSymbolMap,
    pub size: usize,
}

/// The programs of a corpus and the issues found while building it.
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    programs: Vec<Program>,
    issues: Vec<Issue>,
}

impl Corpus {
    /// Convert every entry, recording an issue for each one that fails.
    pub fn ingest<I: IntoIterator<Item = SourceEntry>>(entries: I) -> Self {
        let mut corpus = Corpus::default();
        let mut ids = HashSet::new();
        for entry in entries {
            let id = entry.id.trim();
            if id.is_empty() {
                corpus.reject(Issue::malformed(None, "empty id"));
            } else if !ids.insert(id.to_owned()) {
                corpus.reject(Issue::malformed(Some(id), "duplicate id"));
            } else if entry.source.trim().is_empty() {
                corpus.reject(Issue::malformed(Some(id), "empty source"));
            } else {
                let id = id.to_owned();
                corpus.add(id, entry);
            }
        }
        debug!(
            "ingested {} programs with {} issues",
            corpus.programs.len(),
            corpus.issues.len()
        );
        corpus
    }

    /// Read and ingest a corpus in either of the formats [`read_entries`]
    /// accepts.
    #[must_use]
    pub fn from_json(text: &str) -> Self {
        let (entries, issues) = read_entries(text);
        let mut corpus = Corpus::ingest(entries);
        let mut all = issues;
        all.append(&mut corpus.issues);
        corpus.issues = all;
        corpus
    }

    fn reject(&mut self, issue: Issue) {
        warn!("{issue}");
        self.issues.push(issue);
    }

    fn add(&mut self, id: String, entry: SourceEntry) {
        if entry.source.trim_start().starts_with('(') {
            return self.add_term(id, entry);
        }
        let tree = match parse_function(&entry.source) {
            Ok(tree) => tree,
            Err(e) => return self.reject(Issue::malformed(Some(&id), e.to_string())),
        };
        let converted = match convert::convert(&tree) {
            Ok(converted) => converted,
            Err(ConvertError::StructuralUnsupported { construct }) => {
                return self.reject(Issue::StructuralUnsupported { id, construct })
            }
            Err(ConvertError::Malformed(reason)) => {
                return self.reject(Issue::malformed(Some(&id), reason))
            }
        };
        let Canonical { term, map } = canonical::canonicalize(&converted.term, &converted.free);
        self.admit(id, entry, converted.name, converted.params, term, map);
    }

    /// Add an entry whose source is already a term in text form. Its leading
    /// lambdas are named `x0`, `x1`, ... and the function is named after the
    /// entry.
    fn add_term(&mut self, id: String, entry: SourceEntry) {
        let parsed = canonical::canonicalize_text(&entry.source)
            .and_then(|(text, map)| Ok((text.parse::<Term>()?, map)));
        let (term, map) = match parsed {
            Ok(parsed) => parsed,
            Err(e) => return self.reject(Issue::malformed(Some(&id), e.to_string())),
        };
        if !term.is_closed() {
            return self.reject(Issue::malformed(Some(&id), "term has unbound variables"));
        }
        let mut placeholders = false;
        term.visit(&mut |t, _| {
            placeholders |= matches!(t, Term::Hole(_) | Term::Abstraction(..));
        });
        if placeholders {
            return self.reject(Issue::malformed(Some(&id), "term has holes or abstraction calls"));
        }

        let mut params = Vec::new();
        let mut body = &term;
        while let Term::Lambda(inner) = body {
            params.push(format!("x{}", params.len()));
            body = inner;
        }
        let name = id.clone();
        self.admit(id, entry, name, params, term, map);
    }

    fn admit(
        &mut self,
        id: String,
        entry: SourceEntry,
        name: String,
        params: Vec<String>,
        term: Term,
        map: FreeSymbolMap,
    ) {
        let leaked: Vec<String> = term
            .free_symbols()
            .iter()
            .map(|s| map.get(s.as_str()).map_or_else(|| s.to_string(), |o| o.identifier.clone()))
            .collect();
        if !leaked.is_empty() {
            let issue = Issue::FreeSymbolLeak {
                id: id.clone(),
                symbols: leaked,
            };
            debug!("{issue}");
            self.issues.push(issue);
        }

        self.programs.push(Program {
            id,
            source: entry.source,
            description: entry.description,
            name,
            params,
            size: term.size(),
            term,
            free: map,
        });
    }

    /// The programs, in input order.
    #[must_use]
    pub fn programs(&self) -> &[Program] {
        &self.programs
    }

    /// The terms of the programs, in input order.
    #[must_use]
    pub fn terms(&self) -> Vec<Term> {
        self.programs.iter().map(|p| p.term.clone()).collect()
    }

    #[must_use]
    pub fn issues(&self) -> &[Issue] {
        &self.issues
    }

    /// The number of programs excluded for using unsupported constructs.
    #[must_use]
    pub fn excluded(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| matches!(i, Issue::StructuralUnsupported { .. }))
            .count()
    }

    /// The number of entries rejected before conversion.
    #[must_use]
    pub fn malformed(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| matches!(i, Issue::Malformed { .. }))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::learn::{Compressor, Miner, StopReason};

    fn entry(id: &str, source: &str) -> SourceEntry {
        SourceEntry {
            id: id.to_owned(),
            description: serde_json::Value::Null,
            source: source.to_owned(),
        }
    }

    fn conjunctions() -> Vec<SourceEntry> {
        vec![
            entry("f", "def f(a, b):\n    return a > 0 and b == -1\n"),
            entry("g", "def g(a, b):\n    return a > 0 and b == -1\n"),
            entry("h", "def h(a, b, c):\n    return a > 0 and b == -1 and c < 5\n"),
        ]
    }

    #[test]
    fn conjunction_corpus_compresses_to_one_abstraction() {
        let corpus = Corpus::ingest(conjunctions());
        assert!(corpus.issues().is_empty());
        let result = Miner::default().compress(&corpus.terms());

        let library: Vec<_> = result.library.iter().collect();
        assert_eq!(library.len(), 1);
        assert_eq!(library[0].body.to_string(), "(and (gt #0 0) (eq #1 -1))");
        assert_eq!(library[0].arity, 2);
        let programs: Vec<String> = result.programs.iter().map(ToString::to_string).collect();
        assert_eq!(
            programs,
            [
                "(lam (lam (fn_0 $1 $0)))",
                "(lam (lam (fn_0 $1 $0)))",
                "(lam (lam (lam (and (fn_0 $2 $1) (lt $0 5)))))",
            ]
        );
        assert_eq!(result.stop, StopReason::NoProfitableAbstraction);
    }

    #[test]
    fn loops_are_excluded_and_the_rest_is_mined() {
        let mut entries = conjunctions();
        entries.insert(
            1,
            entry(
                "total",
                "def total(xs):\n    t = 0\n    for x in xs:\n        t += x\n    return t\n",
            ),
        );
        let corpus = Corpus::ingest(entries);
        assert_eq!(corpus.programs().len(), 3);
        assert_eq!(corpus.excluded(), 1);
        assert!(matches!(
            &corpus.issues()[0],
            Issue::StructuralUnsupported { id, .. } if id == "total"
        ));

        let result = Miner::default().compress(&corpus.terms());
        assert!(!result.library.is_empty());
    }

    #[test]
    fn malformed_entries_are_rejected_with_a_reason() {
        let corpus = Corpus::ingest(vec![
            entry("", "def f(a):\n    return a\n"),
            entry("a", "def f(a):\n    return a\n"),
            entry("a", "def g(a):\n    return a\n"),
            entry("b", "   \n"),
            entry("c", "def f(a):\n    return a +\n"),
        ]);
        assert_eq!(corpus.programs().len(), 1);
        assert_eq!(corpus.malformed(), 4);
        let reasons: Vec<String> = corpus
            .issues()
            .iter()
            .map(|issue| match issue {
                Issue::Malformed { reason, .. } => reason.clone(),
                other => panic!("unexpected {other}"),
            })
            .collect();
        assert_eq!(reasons[..3], ["empty id", "duplicate id", "empty source"]);
        assert!(reasons[3].starts_with("line 2"));
    }

    #[test]
    fn free_symbols_are_canonicalized_and_recorded() {
        let corpus = Corpus::ingest(vec![entry(
            "p",
            "def p(board):\n    return board[ROW] + len(WIDTH) + board[A]\n",
        )]);
        let program = &corpus.programs()[0];
        assert_eq!(
            program.term.to_string(),
            "(lam (add (add (get v0 $0) (len v1)) (get A $0)))"
        );
        assert_eq!(program.free["v0"].identifier, "ROW");
        assert_eq!(program.params, ["board"]);
        assert_eq!(
            corpus.issues(),
            [Issue::FreeSymbolLeak {
                id: "p".to_owned(),
                symbols: vec!["ROW".to_owned(), "WIDTH".to_owned(), "A".to_owned()],
            }]
        );
    }

    #[test]
    fn entries_may_be_given_as_terms() {
        let mut entries = conjunctions();
        entries.push(entry("t", "(lam (lam (and (gt $1 0) (eq (len ROW) -1))))"));
        entries.push(entry("open", "(lam (add $1 1))"));
        entries.push(entry("hole", "(lam (add #0 1))"));
        entries.push(entry("bad", "(lam (add 1"));
        let corpus = Corpus::ingest(entries);

        assert_eq!(corpus.programs().len(), 4);
        let t = &corpus.programs()[3];
        assert_eq!(t.name, "t");
        assert_eq!(t.params, ["x0", "x1"]);
        assert_eq!(t.term.to_string(), "(lam (lam (and (gt $1 0) (eq (len v0) -1))))");
        assert_eq!(t.free["v0"].identifier, "ROW");
        assert_eq!(corpus.malformed(), 3);
        assert!(matches!(
            &corpus.issues()[1],
            Issue::Malformed { id: Some(id), reason } if id == "open" && reason == "term has unbound variables"
        ));

        let result = Miner::default().compress(&corpus.terms());
        assert!(!result.library.is_empty());
    }

    #[test]
    fn reads_arrays_and_lines() {
        let array = r#"[{"id": "f", "description": {"turn": 3}, "source": "def f(a):\n    return a\n"},
                        {"id": "g"}]"#;
        let (entries, issues) = read_entries(array);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].description["turn"], 3);
        assert!(matches!(&issues[..], [Issue::Malformed { id: Some(id), .. }] if id == "g"));

        let lines = "{\"id\": \"f\", \"source\": \"def f(a):\\n    return a\\n\"}\n\nnot json\n";
        let (entries, issues) = read_entries(lines);
        assert_eq!(entries.len(), 1);
        assert!(matches!(
            &issues[..],
            [Issue::Malformed { id: None, reason }] if reason.starts_with("line 3")
        ));

        let corpus = Corpus::from_json(lines);
        assert_eq!(corpus.programs().len(), 1);
        assert_eq!(corpus.malformed(), 1);
    }
}
