//! Propalign command-line interface.
//!
//! `align` runs a single scoring + matching pass over a corpus; `train` runs
//! the iterative refinement loop and writes the resulting probability tables
//! alongside the final alignments.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;

mod input;
mod matcher;
mod models;
mod output;
mod prob;
mod scorer;
mod train;

use input::{load_corpus, AlignmentFormat, Corpus};
use models::{ScorerParams, TrainParams, WeightTable};
use output::{
    load_prob_tables_file, print_summary, save_prob_tables_file, write_alignments_file,
    write_alignments_json_file,
};
use scorer::SimilarityScorer;
use train::{align_corpus, train};

#[derive(Parser)]
#[command(name = "propalign")]
#[command(about = "Cross-lingual predicate-argument alignment over word-aligned bitext")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Word-alignment input format (CLI version, mirrors input::AlignmentFormat)
#[derive(Clone, Copy, Debug, ValueEnum)]
enum CliAlignmentFormat {
    /// srcSpan-dstSpan tokens, 1-based, `rejected` skips a pair
    Spans,
    /// GIZA-style ({ idx ... }) bracket groups, one per source terminal
    Giza,
}

impl From<CliAlignmentFormat> for AlignmentFormat {
    fn from(format: CliAlignmentFormat) -> Self {
        match format {
            CliAlignmentFormat::Spans => AlignmentFormat::Spans,
            CliAlignmentFormat::Giza => AlignmentFormat::GizaBrackets,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Align a corpus with a single scoring + matching pass
    ///
    /// All scoring parameters default to ScorerParams::default(). Override
    /// any parameter explicitly to customize behavior.
    Align {
        /// Source-side sentences (JSONL)
        #[arg(long)]
        src: PathBuf,

        /// Destination-side sentences (JSONL)
        #[arg(long)]
        dst: PathBuf,

        /// Word alignment file, one line per sentence pair
        #[arg(long)]
        alignment: PathBuf,

        /// Word alignment format
        #[arg(long, value_enum, default_value = "spans")]
        format: CliAlignmentFormat,

        /// Output file for alignment records
        #[arg(long)]
        output: PathBuf,

        /// Also write a JSON dump with argument pairs (derived path + .json)
        #[arg(long)]
        json: bool,

        /// Previously trained probability tables to blend in
        #[arg(long)]
        prob_tables: Option<PathBuf>,

        /// Predicate-probability blend weight [default: 0 without tables]
        #[arg(long)]
        alpha: Option<f64>,

        /// Argument-probability blend weight [default: 0 without tables]
        #[arg(long)]
        beta: Option<f64>,

        /// Minimum composite similarity for an emitted alignment [default: 0.05]
        #[arg(long)]
        min_similarity: Option<f64>,

        /// ARG0/ARG1 pooling factor [default: 0.75]
        #[arg(long)]
        arg01_factor: Option<f64>,

        /// Beta-squared of the composite F-measure [default: 1.5]
        #[arg(long)]
        beta_sqr: Option<f64>,

        /// Suppress progress output
        #[arg(long)]
        quiet: bool,
    },

    /// Run the iterative refinement loop over a corpus
    Train {
        /// Source-side sentences (JSONL)
        #[arg(long)]
        src: PathBuf,

        /// Destination-side sentences (JSONL)
        #[arg(long)]
        dst: PathBuf,

        /// Word alignment file, one line per sentence pair
        #[arg(long)]
        alignment: PathBuf,

        /// Word alignment format
        #[arg(long, value_enum, default_value = "spans")]
        format: CliAlignmentFormat,

        /// Held-out source sentences for the grid search (JSONL)
        #[arg(long)]
        validation_src: Option<PathBuf>,

        /// Held-out destination sentences (JSONL)
        #[arg(long)]
        validation_dst: Option<PathBuf>,

        /// Held-out word alignment file
        #[arg(long)]
        validation_alignment: Option<PathBuf>,

        /// Output file for the final round's alignment records
        #[arg(long)]
        output: PathBuf,

        /// Output file for the trained probability tables
        #[arg(long)]
        prob_output: Option<PathBuf>,

        /// Number of refinement rounds [default: 5]
        #[arg(long)]
        rounds: Option<usize>,

        /// Early-stop agreement threshold [default: 0.98]
        #[arg(long)]
        convergence: Option<f64>,

        /// Re-estimate POS weight tables each round
        #[arg(long)]
        reweight_pos: bool,

        /// Minimum composite similarity for an emitted alignment [default: 0.05]
        #[arg(long)]
        min_similarity: Option<f64>,

        /// ARG0/ARG1 pooling factor [default: 0.75]
        #[arg(long)]
        arg01_factor: Option<f64>,

        /// Suppress progress output
        #[arg(long)]
        quiet: bool,
    },

    /// Show corpus statistics
    Stats {
        /// Source-side sentences (JSONL)
        #[arg(long)]
        src: PathBuf,

        /// Destination-side sentences (JSONL)
        #[arg(long)]
        dst: PathBuf,

        /// Word alignment file, one line per sentence pair
        #[arg(long)]
        alignment: PathBuf,

        /// Word alignment format
        #[arg(long, value_enum, default_value = "spans")]
        format: CliAlignmentFormat,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Align {
            src,
            dst,
            alignment,
            format,
            output,
            json,
            prob_tables,
            alpha,
            beta,
            min_similarity,
            arg01_factor,
            beta_sqr,
            quiet,
        } => {
            let corpus = load_corpus(&src, &dst, &alignment, format.into())?;
            report_corpus(&corpus, quiet);

            let defaults = ScorerParams::default();
            let prob = match prob_tables {
                Some(path) => Some(Arc::new(load_prob_tables_file(&path)?)),
                None => None,
            };
            let params = ScorerParams {
                min_pred_similarity: min_similarity.unwrap_or(defaults.min_pred_similarity),
                arg01_factor: arg01_factor.unwrap_or(defaults.arg01_factor),
                beta_sqr: beta_sqr.unwrap_or(defaults.beta_sqr),
                pred_prob_weight: alpha.unwrap_or(defaults.pred_prob_weight),
                arg_prob_weight: beta.unwrap_or(defaults.arg_prob_weight),
                ..defaults
            };
            let scorer = SimilarityScorer::with_model(
                params,
                WeightTable::new(),
                WeightTable::new(),
                prob,
            );

            let alignments = align_corpus(&scorer, &corpus.pairs, !quiet);
            let count: usize = alignments.iter().map(|a| a.len()).sum();
            write_alignments_file(&alignments, &output)?;
            if json {
                let json_path = output.with_extension("json");
                write_alignments_json_file(&alignments, &json_path)?;
            }
            if !quiet {
                eprintln!(
                    "{} alignments over {} pairs ({} rejected) -> {}",
                    count,
                    corpus.pairs.len(),
                    corpus.rejected,
                    output.display()
                );
            }
        }

        Commands::Train {
            src,
            dst,
            alignment,
            format,
            validation_src,
            validation_dst,
            validation_alignment,
            output,
            prob_output,
            rounds,
            convergence,
            reweight_pos,
            min_similarity,
            arg01_factor,
            quiet,
        } => {
            let corpus = load_corpus(&src, &dst, &alignment, format.into())?;
            report_corpus(&corpus, quiet);

            let validation = match (&validation_src, &validation_dst, &validation_alignment) {
                (Some(vsrc), Some(vdst), Some(valign)) => {
                    let held_out = load_corpus(vsrc, vdst, valign, format.into())?;
                    report_corpus(&held_out, quiet);
                    Some(held_out)
                }
                _ => None,
            };

            let scorer_defaults = ScorerParams::default();
            let scorer_params = ScorerParams {
                min_pred_similarity: min_similarity.unwrap_or(scorer_defaults.min_pred_similarity),
                arg01_factor: arg01_factor.unwrap_or(scorer_defaults.arg01_factor),
                ..scorer_defaults
            };
            let train_defaults = TrainParams::default();
            let train_params = TrainParams {
                rounds: rounds.unwrap_or(train_defaults.rounds),
                convergence: convergence.unwrap_or(train_defaults.convergence),
                reweight_pos,
                ..train_defaults
            };

            let outcome = train(
                &corpus.pairs,
                validation.as_ref().map(|c| c.pairs.as_slice()),
                &scorer_params,
                &train_params,
                !quiet,
            );

            write_alignments_file(&outcome.alignments, &output)?;
            if let Some(prob_path) = prob_output {
                save_prob_tables_file(&outcome.prob, &prob_path)?;
                if !quiet {
                    eprintln!("probability tables -> {}", prob_path.display());
                }
            }
            print_summary(&outcome.rounds, corpus.pairs.len(), corpus.rejected);
        }

        Commands::Stats {
            src,
            dst,
            alignment,
            format,
        } => {
            let corpus = load_corpus(&src, &dst, &alignment, format.into())?;
            let src_predicates: usize =
                corpus.pairs.iter().map(|p| p.src.predicates.len()).sum();
            let dst_predicates: usize =
                corpus.pairs.iter().map(|p| p.dst.predicates.len()).sum();
            let links: usize = corpus
                .pairs
                .iter()
                .map(|p| p.word_alignment.link_count())
                .sum();

            println!("Sentence pairs: {}", corpus.pairs.len());
            println!("Rejected pairs: {}", corpus.rejected);
            println!("Source predicates: {}", src_predicates);
            println!("Destination predicates: {}", dst_predicates);
            println!("Word alignment links: {}", links);
        }
    }

    Ok(())
}

fn report_corpus(corpus: &Corpus, quiet: bool) {
    if !quiet {
        eprintln!(
            "loaded {} sentence pairs ({} rejected)",
            corpus.pairs.len(),
            corpus.rejected
        );
    }
}
