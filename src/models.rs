//! Data structures for the predicate-argument alignment pipeline.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Label of the predicate's own span.
pub const REL_LABEL: &str = "rel";

/// Whether a label is one of the primary roles (`rel`, `ARG0`, `ARG1`).
/// Primary-to-primary mismatches still carry partial evidence weight.
pub fn is_primary_label(label: &str) -> bool {
    label == REL_LABEL || label == "ARG0" || label == "ARG1"
}

/// Whether a label is a core argument (`ARG0` or `ARG1`).
pub fn is_core_label(label: &str) -> bool {
    label == "ARG0" || label == "ARG1"
}

/// Scoring direction between the two sides of a sentence pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    SrcToDst,
    DstToSrc,
}

/// Identifies one terminal node globally: which tree it belongs to and its
/// position among that tree's terminals. Replaces packed 64-bit
/// `tree << 32 | terminal` keys with an ordered value type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TerminalId {
    pub tree: u32,
    pub terminal: u32,
}

impl TerminalId {
    pub fn new(tree: u32, terminal: u32) -> Self {
        TerminalId { tree, terminal }
    }
}

/// A terminal node: a token word or an empty/trace element, with its POS tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Terminal {
    pub word: String,
    pub pos: String,
}

/// A labeled argument span: the set of terminal positions realizing one
/// semantic role. Non-overlapping within an instance by upstream construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArgumentSpan {
    pub label: String,
    pub positions: BTreeSet<u32>,
}

impl ArgumentSpan {
    pub fn new<I: IntoIterator<Item = u32>>(label: &str, positions: I) -> Self {
        ArgumentSpan {
            label: label.to_string(),
            positions: positions.into_iter().collect(),
        }
    }

    pub fn token_count(&self) -> usize {
        self.positions.len()
    }
}

/// Raw predicate as produced by the external annotation layer: one ordered
/// span list in which the `rel` span sits among the arguments.
#[derive(Debug, Clone, Deserialize)]
pub struct RawPredicate {
    pub position: TerminalId,
    pub roleset: String,
    pub spans: Vec<ArgumentSpan>,
}

/// A predicate occurrence with its roleset id and argument spans.
///
/// The `rel` span is split out at construction; `args` holds only the real
/// arguments, and argument-pair indices in [`Alignment`] refer to `args`.
#[derive(Debug, Clone, Deserialize)]
#[serde(from = "RawPredicate")]
pub struct PredicateInstance {
    pub position: TerminalId,
    pub roleset: String,
    pub rel: Option<ArgumentSpan>,
    pub args: Vec<ArgumentSpan>,
}

impl PredicateInstance {
    /// Build an instance from an ordered span list, separating the `rel` span
    /// and discarding empty spans.
    pub fn new(position: TerminalId, roleset: &str, spans: Vec<ArgumentSpan>) -> Self {
        let mut rel = None;
        let mut args = Vec::with_capacity(spans.len());
        for span in spans {
            if span.positions.is_empty() {
                continue;
            }
            if span.label == REL_LABEL && rel.is_none() {
                rel = Some(span);
            } else {
                args.push(span);
            }
        }
        PredicateInstance {
            position,
            roleset: roleset.to_string(),
            rel,
            args,
        }
    }
}

impl From<RawPredicate> for PredicateInstance {
    fn from(raw: RawPredicate) -> Self {
        PredicateInstance::new(raw.position, &raw.roleset, raw.spans)
    }
}

/// One language side of a sentence pair: ordered terminals plus the predicate
/// instances annotated on them. Immutable after construction.
#[derive(Debug, Clone, Deserialize)]
#[serde(from = "RawSentence")]
pub struct Sentence {
    pub tree_index: u32,
    pub terminals: Vec<Terminal>,
    pub predicates: Vec<PredicateInstance>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawSentence {
    pub tree_index: u32,
    pub terminals: Vec<Terminal>,
    #[serde(default)]
    pub predicates: Vec<PredicateInstance>,
}

impl Sentence {
    /// Build a sentence, dropping predicates whose position falls outside the
    /// terminal range and ordering the rest by position.
    pub fn new(
        tree_index: u32,
        terminals: Vec<Terminal>,
        predicates: Vec<PredicateInstance>,
    ) -> Self {
        let len = terminals.len() as u32;
        let mut predicates: Vec<PredicateInstance> = predicates
            .into_iter()
            .filter(|p| {
                let ok = p.position.tree == tree_index && p.position.terminal < len;
                if !ok {
                    log::debug!(
                        "dropping predicate {} at {:?}: outside tree {} ({} terminals)",
                        p.roleset,
                        p.position,
                        tree_index,
                        len
                    );
                }
                ok
            })
            .collect();
        predicates.sort_by_key(|p| p.position);
        Sentence {
            tree_index,
            terminals,
            predicates,
        }
    }

    pub fn terminal_count(&self) -> usize {
        self.terminals.len()
    }

    pub fn pos_tag(&self, position: u32) -> &str {
        self.terminals
            .get(position as usize)
            .map(|t| t.pos.as_str())
            .unwrap_or("")
    }
}

impl From<RawSentence> for Sentence {
    fn from(raw: RawSentence) -> Self {
        Sentence::new(raw.tree_index, raw.terminals, raw.predicates)
    }
}

/// Word-level alignment between the terminal positions of the two sides.
///
/// Every own-side terminal has an entry (possibly empty); an absent link is
/// zero evidence, never an error.
#[derive(Debug, Clone)]
pub struct WordAlignment {
    src_to_dst: Vec<BTreeSet<u32>>,
    dst_to_src: Vec<BTreeSet<u32>>,
}

impl WordAlignment {
    /// Build from 0-based (src, dst) link pairs. Links whose endpoints fall
    /// outside either sentence are dropped (the word aligner may have been
    /// run against a different tree).
    pub fn from_links(src_len: usize, dst_len: usize, links: &[(u32, u32)]) -> Self {
        let mut src_to_dst = vec![BTreeSet::new(); src_len];
        let mut dst_to_src = vec![BTreeSet::new(); dst_len];
        for &(s, d) in links {
            if (s as usize) < src_len && (d as usize) < dst_len {
                src_to_dst[s as usize].insert(d);
                dst_to_src[d as usize].insert(s);
            } else {
                log::debug!(
                    "dropping out-of-range link {}-{} ({} src / {} dst terminals)",
                    s,
                    d,
                    src_len,
                    dst_len
                );
            }
        }
        WordAlignment {
            src_to_dst,
            dst_to_src,
        }
    }

    pub fn empty(src_len: usize, dst_len: usize) -> Self {
        WordAlignment {
            src_to_dst: vec![BTreeSet::new(); src_len],
            dst_to_src: vec![BTreeSet::new(); dst_len],
        }
    }

    /// Positions on the opposite side aligned to `position` on the `dir` side.
    pub fn aligned(&self, dir: Direction, position: u32) -> Option<&BTreeSet<u32>> {
        match dir {
            Direction::SrcToDst => self.src_to_dst.get(position as usize),
            Direction::DstToSrc => self.dst_to_src.get(position as usize),
        }
    }

    pub fn link_count(&self) -> usize {
        self.src_to_dst.iter().map(|s| s.len()).sum()
    }
}

/// A parallel sentence pair with its word alignment. Read-only once built.
#[derive(Debug, Clone)]
pub struct SentencePair {
    pub id: u32,
    pub src: Sentence,
    pub dst: Sentence,
    pub word_alignment: WordAlignment,
}

/// One directional similarity: the scalar score plus a per-POS
/// (score, weight) breakdown consumed only by offline POS reweighting.
#[derive(Debug, Clone, Default)]
pub struct Similarity {
    pub score: f64,
    pub pos_evidence: HashMap<String, (f64, f64)>,
}

/// The two directional similarities of a candidate predicate pair and their
/// symmetric composite.
#[derive(Debug, Clone)]
pub struct SimilarityPair {
    pub forward: Similarity,
    pub backward: Similarity,
    pub composite: f64,
}

/// A matched argument pair within one predicate alignment. Indices refer to
/// the instances' non-`rel` argument lists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArgAlignmentPair {
    pub src_arg: usize,
    pub dst_arg: usize,
    pub score: f64,
}

/// One predicate alignment produced by the optimal matcher. Never mutated
/// after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alignment {
    pub pair_id: u32,
    pub src_index: usize,
    pub dst_index: usize,
    pub src_roleset: String,
    pub dst_roleset: String,
    pub score: f64,
    pub arg_pairs: Vec<ArgAlignmentPair>,
}

/// Part-of-speech weight table threaded into the scorer as a value object.
/// The offline reweighting step produces a new table rather than mutating a
/// shared one.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WeightTable {
    weights: HashMap<String, f64>,
}

impl WeightTable {
    pub fn new() -> Self {
        WeightTable::default()
    }

    pub fn from_weights(weights: HashMap<String, f64>) -> Self {
        WeightTable { weights }
    }

    /// Weight for a POS tag; unlisted tags weigh 1.0.
    pub fn get(&self, pos: &str) -> f64 {
        self.weights.get(pos).copied().unwrap_or(1.0)
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }
}

/// Scoring parameters. All of the empirically tuned constants from the
/// original model are surfaced here as tunable defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScorerParams {
    /// Share of the argument pool given to ARG0/ARG1 evidence.
    pub arg01_factor: f64,
    /// β² of the composite F-measure.
    pub beta_sqr: f64,
    /// Evidence weight for an exact label match.
    pub exact_match_weight: f64,
    /// Evidence weight when both labels are primary (`rel`/ARG0/ARG1).
    pub primary_match_weight: f64,
    /// Evidence weight for any other label pairing.
    pub other_match_weight: f64,
    /// ARG0/ARG1 evidence volume must reach this multiple of the predicate
    /// evidence volume before the balanced blend kicks in.
    pub core_dominance: f64,
    /// Predicate share of the final blend when core evidence dominates.
    pub balanced_pred_blend: f64,
    /// Predicate share of the final blend otherwise.
    pub skewed_pred_blend: f64,
    /// Composite scores below this are unaligned, not low-scoring output.
    pub min_pred_similarity: f64,
    /// Assignment cost ceiling: cost = max_similarity - similarity.
    pub max_similarity: f64,
    /// Blend weight of the roleset translation probability (alpha).
    pub pred_prob_weight: f64,
    /// Blend weight of the argument-label translation probability (beta).
    pub arg_prob_weight: f64,
}

impl Default for ScorerParams {
    fn default() -> Self {
        ScorerParams {
            arg01_factor: 0.75,
            beta_sqr: 1.5,
            exact_match_weight: 1.0,
            primary_match_weight: 0.7,
            other_match_weight: 0.4,
            core_dominance: 2.0,
            balanced_pred_blend: 0.5,
            skewed_pred_blend: 0.7,
            min_pred_similarity: 0.05,
            max_similarity: 3.0,
            pred_prob_weight: 0.0,
            arg_prob_weight: 0.0,
        }
    }
}

impl ScorerParams {
    /// Copy of these params with the probability blend weights replaced.
    pub fn with_prob_weights(&self, alpha: f64, beta: f64) -> Self {
        ScorerParams {
            pred_prob_weight: alpha,
            arg_prob_weight: beta,
            ..self.clone()
        }
    }
}

/// Parameters of the iterative refinement loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainParams {
    /// Number of align/re-estimate rounds.
    pub rounds: usize,
    /// Grid of predicate-probability blend weights (alpha).
    pub alpha_grid: Vec<f64>,
    /// Grid of argument-probability blend weights (beta).
    pub beta_grid: Vec<f64>,
    /// Stop early when consecutive rounds' alignments agree at this Dice
    /// overlap or better.
    pub convergence: f64,
    /// Re-estimate POS weight tables each round.
    pub reweight_pos: bool,
}

impl Default for TrainParams {
    fn default() -> Self {
        TrainParams {
            rounds: 5,
            alpha_grid: vec![0.15, 0.20, 0.25, 0.30, 0.35],
            beta_grid: vec![0.0, 0.1, 0.2, 0.3, 0.4, 0.5, 0.6],
            convergence: 0.98,
            reweight_pos: false,
        }
    }
}
