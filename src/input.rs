//! Corpus and word-alignment input.
//!
//! Sentences arrive as JSONL produced by the external annotation layer, one
//! sentence per line per side. Word alignments arrive either in the span
//! format (`srcSpan-dstSpan` tokens, 1-based) or as GIZA-style bracket
//! groups. Malformed alignments skip the affected pair and are counted as
//! rejected; they never abort the batch.

use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use thiserror::Error;

use crate::models::{Sentence, SentencePair, WordAlignment};

#[derive(Error, Debug)]
pub enum InputError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("malformed alignment token '{token}': {reason}")]
    MalformedToken { token: String, reason: String },
    #[error(
        "bad instance for sentence {sentence_id} ({src_file} / {dst_file}): \
         {src_expected} source terminals vs {src_actual} alignment groups, \
         {dst_expected} destination terminals vs {dst_actual} referenced"
    )]
    BadInstance {
        sentence_id: u32,
        src_file: String,
        dst_file: String,
        src_expected: usize,
        src_actual: usize,
        dst_expected: usize,
        dst_actual: usize,
    },
    #[error(
        "sentence count mismatch: {src_file} has {src_count}, {dst_file} has {dst_count}, \
         {alignment_file} has {alignment_count} lines"
    )]
    SentenceCountMismatch {
        src_file: String,
        dst_file: String,
        alignment_file: String,
        src_count: usize,
        dst_count: usize,
        alignment_count: usize,
    },
}

/// Word-alignment input format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlignmentFormat {
    /// `srcSpan-dstSpan` tokens with optional `(subscript)` and `[...]`
    /// annotations; a bare `rejected` line skips the pair.
    Spans,
    /// GIZA-style `({ idx idx ... })` groups, one per source terminal.
    GizaBrackets,
}

/// A loaded corpus: the usable pairs plus the count of rejected ones, kept
/// separate from successes for corpus-level statistics.
#[derive(Debug)]
pub struct Corpus {
    pub pairs: Vec<SentencePair>,
    pub rejected: usize,
}

/// Parse one span-format alignment line into 0-based links.
///
/// Returns `Ok(None)` for a bare `rejected` line: the pair has no usable
/// alignment and must be skipped, not errored.
pub fn parse_span_alignment(line: &str) -> Result<Option<Vec<(u32, u32)>>, InputError> {
    let trimmed = line.trim();
    if trimmed == "rejected" {
        return Ok(None);
    }
    let mut links = Vec::new();
    for token in trimmed.split_whitespace() {
        let cleaned = strip_annotations(token);
        if cleaned.is_empty() {
            continue;
        }
        let (src_part, dst_part) =
            cleaned
                .split_once('-')
                .ok_or_else(|| InputError::MalformedToken {
                    token: token.to_string(),
                    reason: "missing '-' separator".to_string(),
                })?;
        let src_positions = parse_positions(src_part, token)?;
        let dst_positions = parse_positions(dst_part, token)?;
        for &s in &src_positions {
            for &d in &dst_positions {
                links.push((s - 1, d - 1));
            }
        }
    }
    Ok(Some(links))
}

/// Drop `[...]` annotations and a trailing `(subscript)` from a span token.
fn strip_annotations(token: &str) -> String {
    let mut cleaned = String::with_capacity(token.len());
    let mut depth = 0usize;
    for c in token.chars() {
        match c {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            _ if depth == 0 => cleaned.push(c),
            _ => {}
        }
    }
    if let Some(open) = cleaned.find('(') {
        cleaned.truncate(open);
    }
    cleaned
}

/// Parse a comma-separated list of 1-based positions.
fn parse_positions(part: &str, token: &str) -> Result<Vec<u32>, InputError> {
    let mut positions = Vec::new();
    for piece in part.split(',') {
        let value: u32 = piece.trim().parse().map_err(|_| InputError::MalformedToken {
            token: token.to_string(),
            reason: format!("unparseable position '{}'", piece),
        })?;
        if value == 0 {
            return Err(InputError::MalformedToken {
                token: token.to_string(),
                reason: "positions are 1-based".to_string(),
            });
        }
        positions.push(value);
    }
    if positions.is_empty() {
        return Err(InputError::MalformedToken {
            token: token.to_string(),
            reason: "empty span".to_string(),
        });
    }
    Ok(positions)
}

/// Parse one GIZA bracket line into 0-based links.
///
/// The group count must equal the source terminal count and the enumerated
/// destination indices must cover the destination terminals exactly;
/// otherwise the pair is a structurally bad instance.
pub fn parse_giza_alignment(
    line: &str,
    src_terminals: usize,
    dst_terminals: usize,
    sentence_id: u32,
    src_file: &str,
    dst_file: &str,
) -> Result<Vec<(u32, u32)>, InputError> {
    let mut links = Vec::new();
    let mut covered: BTreeSet<u32> = BTreeSet::new();
    let mut groups = 0usize;

    let mut rest = line;
    while let Some(open) = rest.find("({") {
        let after = &rest[open + 2..];
        let close = after.find("})").ok_or_else(|| InputError::MalformedToken {
            token: line.to_string(),
            reason: "unterminated '({' group".to_string(),
        })?;
        let body = &after[..close];
        for piece in body.split_whitespace() {
            let index: u32 = piece.parse().map_err(|_| InputError::MalformedToken {
                token: piece.to_string(),
                reason: "unparseable destination index".to_string(),
            })?;
            if index == 0 {
                return Err(InputError::MalformedToken {
                    token: piece.to_string(),
                    reason: "destination indices are 1-based".to_string(),
                });
            }
            covered.insert(index);
            links.push((groups as u32, index - 1));
        }
        groups += 1;
        rest = &after[close + 2..];
    }

    let dst_referenced = covered.len();
    let in_range = covered.iter().all(|&i| i as usize <= dst_terminals);
    if groups != src_terminals || dst_referenced != dst_terminals || !in_range {
        return Err(InputError::BadInstance {
            sentence_id,
            src_file: src_file.to_string(),
            dst_file: dst_file.to_string(),
            src_expected: src_terminals,
            src_actual: groups,
            dst_expected: dst_terminals,
            dst_actual: dst_referenced,
        });
    }
    Ok(links)
}

/// Read a JSONL sentence file, one [`Sentence`] per non-empty line.
pub fn read_sentences(path: &Path) -> Result<Vec<Sentence>, InputError> {
    let reader = BufReader::new(File::open(path)?);
    let mut sentences = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        sentences.push(serde_json::from_str(&line)?);
    }
    Ok(sentences)
}

/// Load a full corpus: both sentence files plus the alignment file.
///
/// The three files must agree on line count (structural, fatal). Individual
/// malformed or rejected alignment lines skip their pair with a warning and
/// are tallied in [`Corpus::rejected`].
pub fn load_corpus(
    src_path: &Path,
    dst_path: &Path,
    alignment_path: &Path,
    format: AlignmentFormat,
) -> Result<Corpus, InputError> {
    let src_sentences = read_sentences(src_path)?;
    let dst_sentences = read_sentences(dst_path)?;
    let alignment_lines: Vec<String> = BufReader::new(File::open(alignment_path)?)
        .lines()
        .collect::<Result<_, _>>()?;

    if src_sentences.len() != dst_sentences.len() || src_sentences.len() != alignment_lines.len() {
        return Err(InputError::SentenceCountMismatch {
            src_file: src_path.display().to_string(),
            dst_file: dst_path.display().to_string(),
            alignment_file: alignment_path.display().to_string(),
            src_count: src_sentences.len(),
            dst_count: dst_sentences.len(),
            alignment_count: alignment_lines.len(),
        });
    }

    let src_name = src_path.display().to_string();
    let dst_name = dst_path.display().to_string();
    let mut pairs = Vec::with_capacity(src_sentences.len());
    let mut rejected = 0usize;

    for (index, ((src, dst), line)) in src_sentences
        .into_iter()
        .zip(dst_sentences)
        .zip(alignment_lines)
        .enumerate()
    {
        let id = index as u32;
        let links = match format {
            AlignmentFormat::Spans => match parse_span_alignment(&line) {
                Ok(Some(links)) => links,
                Ok(None) => {
                    log::warn!("sentence {}: alignment rejected, skipping pair", id);
                    rejected += 1;
                    continue;
                }
                Err(error) => {
                    log::warn!("sentence {}: {}, skipping pair", id, error);
                    rejected += 1;
                    continue;
                }
            },
            AlignmentFormat::GizaBrackets => {
                match parse_giza_alignment(
                    &line,
                    src.terminal_count(),
                    dst.terminal_count(),
                    id,
                    &src_name,
                    &dst_name,
                ) {
                    Ok(links) => links,
                    Err(error) => {
                        log::warn!("{}, skipping pair", error);
                        rejected += 1;
                        continue;
                    }
                }
            }
        };
        let word_alignment =
            WordAlignment::from_links(src.terminal_count(), dst.terminal_count(), &links);
        pairs.push(SentencePair {
            id,
            src,
            dst,
            word_alignment,
        });
    }

    Ok(Corpus { pairs, rejected })
}
