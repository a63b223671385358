#![warn(
    clippy::all,
    clippy::pedantic,
    anonymous_parameters,
    elided_lifetimes_in_paths,
    missing_copy_implementations,
    missing_debug_implementations,
    single_use_lifetimes,
    trivial_casts,
    unreachable_pub,
    unused_lifetimes
)]
#![allow(clippy::module_name_repetitions)]

//! Library learning over corpora of small programs.
//!
//! Programs are converted into closed lambda terms using de Bruijn indices,
//! their free symbols are canonicalized, and the corpus is then compressed by
//! repeatedly anti-unifying recurring subterms into named abstractions.

pub mod anti_unify;
pub mod canonical;
pub mod convert;
pub mod corpus;
pub mod eval;
pub mod fresh;
pub mod learn;
pub mod materialize;
pub mod primitive;
pub mod report;
pub mod rewrite;
pub mod select;
pub mod subterms;
pub mod syntax;
pub mod term;
pub mod util;

pub use corpus::{Corpus, Program, SourceEntry};
pub use learn::{Compressor, Miner, MinerConfig, MiningResult};
pub use term::Term;
