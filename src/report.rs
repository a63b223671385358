//! The JSON summary of a mining run.

use indexmap::IndexMap;
use serde::Serialize;

use crate::{
    canonical::FreeSymbolMap,
    corpus::{Corpus, Issue},
    learn::{MiningResult, MiningStats, StopReason},
    materialize::{self, Inline, MaterializeError},
    term::Term,
    util::compression_factor,
};

/// What to include in a report beyond the learned library and the rewritten
/// programs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportOptions {
    /// Print every abstraction and program as source.
    pub materialize: bool,
    /// How far to inline abstraction calls when printing programs.
    pub inline: Inline,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            materialize: false,
            inline: Inline::Depth(0),
        }
    }
}

/// A learned abstraction as it appears in a report.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AbstractionReport {
    pub name: String,
    pub arity: usize,
    pub body: Term,
    pub uses: usize,
    pub gain: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Statistics {
    pub programs: usize,
    pub excluded: usize,
    pub malformed: usize,
    pub initial_size: usize,
    pub final_size: usize,
    pub compression_factor: f64,
    pub stop: StopReason,
    pub mining: MiningStats,
}

/// The output of the `libmine` tool.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub abstractions: Vec<AbstractionReport>,
    /// The rewritten term of each program, by id.
    pub programs: IndexMap<String, Term>,
    /// Programs printed as source, by id. Only present when materializing.
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub sources: IndexMap<String, String>,
    /// The origins of the canonical free symbols of each program that has
    /// any, by id.
    pub free_variables: IndexMap<String, FreeSymbolMap>,
    pub issues: Vec<Issue>,
    pub statistics: Statistics,
}

impl Report {
    /// Summarize mining `corpus` into `result`.
    ///
    /// # Errors
    ///
    /// Returns an error if a program can't be materialized, which only
    /// happens when `result` was not produced from `corpus`.
    pub fn new(
        corpus: &Corpus,
        result: &MiningResult,
        options: ReportOptions,
    ) -> Result<Self, MaterializeError> {
        let abstractions = result
            .library
            .iter()
            .map(|abstraction| AbstractionReport {
                name: abstraction.name.to_string(),
                arity: abstraction.arity,
                body: abstraction.body.clone(),
                uses: abstraction.uses,
                gain: abstraction.gain,
                source: options
                    .materialize
                    .then(|| materialize::materialize_abstraction(abstraction)),
            })
            .collect();

        let mut programs = IndexMap::new();
        let mut sources = IndexMap::new();
        for (program, term) in corpus.programs().iter().zip(&result.programs) {
            programs.insert(program.id.clone(), term.clone());
            if options.materialize {
                let source =
                    materialize::materialize_program(program, term, &result.library, options.inline)?;
                sources.insert(program.id.clone(), source);
            }
        }

        let free_variables = corpus
            .programs()
            .iter()
            .filter(|program| !program.free.is_empty())
            .map(|program| (program.id.clone(), program.free.clone()))
            .collect();

        let initial_size = result.stats.initial_size;
        let final_size = result.encoded_size();
        Ok(Self {
            abstractions,
            programs,
            sources,
            free_variables,
            issues: corpus.issues().to_vec(),
            statistics: Statistics {
                programs: corpus.programs().len(),
                excluded: corpus.excluded(),
                malformed: corpus.malformed(),
                initial_size,
                final_size,
                compression_factor: compression_factor(initial_size, final_size),
                stop: result.stop,
                mining: result.stats,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::learn::{Compressor, Miner};

    const CORPUS: &str = r#"[
        {"id": "f", "source": "def f(a, b):\n    return a > 0 and b == -1\n"},
        {"id": "g", "source": "def g(a, b):\n    return a > 0 and b == -1\n"},
        {"id": "h", "source": "def h(a, b, c):\n    return a > 0 and b == -1 and c < 5\n"},
        {"id": "w", "source": "def w(xs):\n    while xs:\n        xs = xs[1:]\n    return xs\n"},
        {"id": "k", "source": "def k(x):\n    return x * SCALE\n"}
    ]"#;

    fn report(options: ReportOptions) -> Report {
        let corpus = Corpus::from_json(CORPUS);
        let result = Miner::default().compress(&corpus.terms());
        Report::new(&corpus, &result, options).unwrap()
    }

    #[test]
    fn summarizes_the_run() {
        let report = report(ReportOptions::default());
        assert_eq!(report.abstractions.len(), 1);
        assert_eq!(report.abstractions[0].name, "fn_0");
        assert_eq!(report.abstractions[0].uses, 3);
        assert_eq!(report.abstractions[0].source, None);
        assert_eq!(
            report.programs["h"].to_string(),
            "(lam (lam (lam (and (fn_0 $2 $1) (lt $0 5)))))"
        );
        assert_eq!(report.programs.len(), 4);
        assert!(report.sources.is_empty());
        assert_eq!(report.free_variables.len(), 1);
        assert_eq!(report.free_variables["k"]["v0"].identifier, "SCALE");

        let stats = &report.statistics;
        assert_eq!((stats.programs, stats.excluded, stats.malformed), (4, 1, 0));
        assert!(stats.final_size < stats.initial_size);
        assert!(stats.compression_factor > 1.0);
        assert_eq!(stats.stop, StopReason::NoProfitableAbstraction);
    }

    #[test]
    fn materializes_on_request() {
        let report = report(ReportOptions {
            materialize: true,
            inline: Inline::Depth(0),
        });
        assert_eq!(
            report.abstractions[0].source.as_deref(),
            Some("def fn_0(a0, a1):\n    return a0 > 0 and a1 == -1")
        );
        assert_eq!(report.sources["f"], "def f(a, b):\n    return fn_0(a, b)");
        assert_eq!(report.sources["k"], "def k(x):\n    return x * SCALE");
    }

    #[test]
    fn serializes_terms_as_text() {
        let json = serde_json::to_value(report(ReportOptions::default())).unwrap();
        assert_eq!(json["abstractions"][0]["body"], "(and (gt #0 0) (eq #1 -1))");
        assert_eq!(json["programs"]["f"], "(lam (lam (fn_0 $1 $0)))");
        assert_eq!(json["issues"][0]["kind"], "StructuralUnsupported");
        assert_eq!(json["statistics"]["stop"], "NoProfitableAbstraction");
        assert!(json.get("sources").is_none());
    }
}
