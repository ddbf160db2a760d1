//! Propalign: cross-lingual predicate-argument alignment.
//!
//! Aligns semantic-role annotations between two parallel sentences using an
//! independently produced word-level alignment as evidence: pairwise
//! similarity scoring, optimal bipartite matching of predicates and (within a
//! matched pair) of their arguments, smoothed translation-probability tables
//! built from observed alignments, and an iterative self-training loop that
//! alternates probability re-estimation and alignment-parameter search.
//!
//! # Example
//!
//! ```no_run
//! use propalign::prelude::*;
//! use std::path::Path;
//!
//! let corpus = load_corpus(
//!     Path::new("src.jsonl"),
//!     Path::new("dst.jsonl"),
//!     Path::new("alignment.txt"),
//!     AlignmentFormat::Spans,
//! ).unwrap();
//!
//! // One-shot inference with the baseline lexical scorer.
//! let scorer = SimilarityScorer::new(ScorerParams::default());
//! let alignments = align_corpus(&scorer, &corpus.pairs, false);
//!
//! // Bootstrap training: re-estimate probabilities and re-tune the blend.
//! let outcome = train(&corpus.pairs, None, &ScorerParams::default(), &TrainParams::default(), false);
//! println!("{} rounds, {} aligned pairs", outcome.rounds.len(), outcome.alignments.len());
//! ```

pub mod input;
pub mod matcher;
pub mod models;
pub mod output;
pub mod prob;
pub mod scorer;
pub mod train;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::input::{
        load_corpus, parse_giza_alignment, parse_span_alignment, read_sentences, AlignmentFormat,
        Corpus, InputError,
    };
    pub use crate::matcher::{align_sentence_pair, optimal_matches};
    pub use crate::models::{
        Alignment, ArgAlignmentPair, ArgumentSpan, Direction, PredicateInstance, ScorerParams,
        Sentence, SentencePair, Similarity, SimilarityPair, Terminal, TerminalId, TrainParams,
        WeightTable, WordAlignment,
    };
    pub use crate::output::{
        format_alignment, load_prob_tables_file, print_summary, save_prob_tables_file,
        write_alignments, write_alignments_file, write_alignments_json_file, OutputError,
    };
    pub use crate::prob::{AlignmentProb, CountProb, SmoothedDist};
    pub use crate::scorer::{composite_score, f_score, reestimate_weight_table, SimilarityScorer};
    pub use crate::train::{align_corpus, train, RoundStats, TrainOutcome};
}

// Re-export commonly used types at the crate root
pub use models::{Alignment, ScorerParams, SentencePair, TrainParams};
pub use prob::AlignmentProb;
pub use scorer::SimilarityScorer;
