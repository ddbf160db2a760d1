//! Output formatting: alignment records, probability tables, summaries.

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;
use thiserror::Error;

use crate::models::Alignment;
use crate::prob::{AlignmentProb, AlignmentProbData};
use crate::train::RoundStats;

#[derive(Error, Debug)]
pub enum OutputError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("probability table serialization error: {0}")]
    Bincode(#[from] bincode::Error),
}

/// Format one alignment record:
/// `sentenceId, srcId, dstId, score; [srcRoleset, dstRoleset]` (1-based ids).
pub fn format_alignment(alignment: &Alignment) -> String {
    format!(
        "{}, {}, {}, {:.4}; [{}, {}]",
        alignment.pair_id,
        alignment.src_index + 1,
        alignment.dst_index + 1,
        alignment.score,
        alignment.src_roleset,
        alignment.dst_roleset
    )
}

/// Write one alignment record line per matched predicate pair.
pub fn write_alignments<W: Write>(
    alignments: &[Vec<Alignment>],
    writer: &mut W,
) -> Result<(), OutputError> {
    for pair_alignments in alignments {
        for alignment in pair_alignments {
            writeln!(writer, "{}", format_alignment(alignment))?;
        }
    }
    Ok(())
}

pub fn write_alignments_file(
    alignments: &[Vec<Alignment>],
    path: &Path,
) -> Result<(), OutputError> {
    let mut file = File::create(path)?;
    write_alignments(alignments, &mut file)
}

/// Write alignments as JSON, including argument pairs, for downstream
/// consumers that need more than the record lines.
pub fn write_alignments_json<W: Write>(
    alignments: &[Vec<Alignment>],
    writer: &mut W,
) -> Result<(), OutputError> {
    let flat: Vec<&Alignment> = alignments.iter().flatten().collect();
    serde_json::to_writer_pretty(writer, &flat)?;
    Ok(())
}

pub fn write_alignments_json_file(
    alignments: &[Vec<Alignment>],
    path: &Path,
) -> Result<(), OutputError> {
    let mut file = File::create(path)?;
    write_alignments_json(alignments, &mut file)
}

/// Persist a finalized probability model as an opaque blob.
pub fn save_prob_tables<W: Write>(prob: &AlignmentProb, writer: &mut W) -> Result<(), OutputError> {
    bincode::serialize_into(writer, &prob.to_data())?;
    Ok(())
}

pub fn save_prob_tables_file(prob: &AlignmentProb, path: &Path) -> Result<(), OutputError> {
    let mut file = File::create(path)?;
    save_prob_tables(prob, &mut file)
}

/// Load a probability model persisted by [`save_prob_tables`].
pub fn load_prob_tables<R: Read>(reader: R) -> Result<AlignmentProb, OutputError> {
    let data: AlignmentProbData = bincode::deserialize_from(reader)?;
    Ok(AlignmentProb::from_data(data))
}

pub fn load_prob_tables_file(path: &Path) -> Result<AlignmentProb, OutputError> {
    let file = File::open(path)?;
    load_prob_tables(file)
}

/// Print a run summary to stdout.
pub fn print_summary(rounds: &[RoundStats], pair_count: usize, rejected: usize) {
    println!("\n=== Alignment Summary ===");
    println!("Sentence pairs: {} ({} rejected)", pair_count, rejected);
    for stats in rounds {
        let validation = stats
            .validation_score
            .map(|score| format!("{:.2}", score))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  Round {}: {} alignments, score {:.2}, agreement {:.3}, alpha {:.2}, beta {:.2}, validation {}",
            stats.round,
            stats.alignment_count,
            stats.total_score,
            stats.agreement,
            stats.selected_alpha,
            stats.selected_beta,
            validation
        );
    }
}
