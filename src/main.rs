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

use anyhow::Context;
use clap::Parser;
use libmine::{
    materialize::Inline,
    report::{Report, ReportOptions},
    Compressor, Corpus, Miner, MinerConfig,
};
use log::info;
use std::{
    fs,
    io::{self, Read},
    path::PathBuf,
};

#[derive(Debug, Parser)]
#[clap(version, author, about)]
struct Opts {
    /// The input corpus, a JSON array or one JSON entry per line. If no file
    /// is specified, reads from stdin.
    #[clap(value_parser)]
    file: Option<PathBuf>,

    /// A JSON file of mining settings. Flags given on the command line
    /// override it.
    #[clap(long, value_parser)]
    config: Option<PathBuf>,

    /// Enables pretty-printing of JSON output.
    #[clap(long)]
    pretty: bool,

    /// The most abstractions to learn.
    #[clap(long, value_parser)]
    iterations: Option<usize>,

    /// The most parameters an abstraction may take.
    #[clap(long, value_parser)]
    max_arity: Option<usize>,

    /// The smallest subterm considered.
    #[clap(long, value_parser)]
    min_size: Option<usize>,

    /// The largest subterm considered.
    #[clap(long, value_parser)]
    max_size: Option<usize>,

    /// The fewest occurrences for a pattern to be considered.
    #[clap(long, value_parser)]
    min_frequency: Option<usize>,

    /// The size charged for defining an abstraction.
    #[clap(long, value_parser)]
    overhead: Option<usize>,

    /// The most pairs of subterms anti-unified per iteration.
    #[clap(long, value_parser)]
    max_pairs: Option<usize>,

    /// Print the learned abstractions and the rewritten programs as source.
    #[clap(long)]
    materialize: bool,

    /// When materializing, inline abstraction calls this many levels deep.
    /// Inlines everything if given without a value.
    #[clap(long, value_parser, min_values = 0)]
    inline_depth: Option<Option<usize>>,
}

impl Opts {
    fn miner_config(&self) -> anyhow::Result<MinerConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let text = fs::read_to_string(path)
                    .with_context(|| format!("Error reading {}", path.display()))?;
                serde_json::from_str(&text)
                    .with_context(|| format!("Error parsing {}", path.display()))?
            }
            None => MinerConfig::default(),
        };
        let overrides = [
            (&mut config.iterations, self.iterations),
            (&mut config.max_arity, self.max_arity),
            (&mut config.min_size, self.min_size),
            (&mut config.max_size, self.max_size),
            (&mut config.min_frequency, self.min_frequency),
            (&mut config.definition_overhead, self.overhead),
            (&mut config.max_pairs, self.max_pairs),
        ];
        for (setting, flag) in overrides {
            if let Some(value) = flag {
                *setting = value;
            }
        }
        anyhow::ensure!(
            config.min_size <= config.max_size,
            "min-size {} exceeds max-size {}",
            config.min_size,
            config.max_size
        );
        Ok(config)
    }

    fn report_options(&self) -> ReportOptions {
        ReportOptions {
            materialize: self.materialize,
            inline: match self.inline_depth {
                None => Inline::Depth(0),
                Some(None) => Inline::Full,
                Some(Some(depth)) => Inline::Depth(depth),
            },
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let opts: Opts = Opts::parse();
    let config = opts.miner_config()?;

    let input = opts
        .file
        .as_ref()
        .map_or_else(
            || {
                let mut buf = String::new();
                io::stdin().read_to_string(&mut buf).map(|_| buf)
            },
            fs::read_to_string,
        )
        .context("Error reading input")?;

    let corpus = Corpus::from_json(&input);
    info!(
        "mining {} programs ({} issues)",
        corpus.programs().len(),
        corpus.issues().len()
    );
    let result = Miner::new(config).compress(&corpus.terms());
    let report = Report::new(&corpus, &result, opts.report_options())
        .context("Error materializing programs")?;

    if opts.pretty {
        serde_json::to_writer_pretty(io::stdout(), &report)
            .context("Error pretty-printing JSON output")?;
    } else {
        serde_json::to_writer(io::stdout(), &report).context("Error printing JSON output")?;
    }
    println!();
    Ok(())
}
