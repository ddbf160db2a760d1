//! Similarity scoring between predicate-argument instances.
//!
//! This is the hot path of the aligner: every candidate predicate pair is
//! scored in both directions against the word alignment before optimal
//! matching, and matched pairs are scored again span-by-span to align their
//! arguments.

use std::collections::HashMap;
use std::sync::Arc;

use crate::models::{
    is_core_label, is_primary_label, ArgumentSpan, Direction, PredicateInstance, ScorerParams,
    Sentence, SentencePair, Similarity, SimilarityPair, WeightTable, REL_LABEL,
};
use crate::prob::AlignmentProb;

/// F-measure of two scores with an explicit β² weight on the first.
#[inline]
pub fn f_score(p: f64, r: f64, beta_sqr: f64) -> f64 {
    let denom = beta_sqr * p + r;
    if denom == 0.0 {
        0.0
    } else {
        (1.0 + beta_sqr) * p * r / denom
    }
}

/// Symmetric composite of two directional scores.
///
/// The β² weight always attaches to the larger score, so swapping which side
/// is "source" cannot change the result and the composite leans toward the
/// weaker direction.
#[inline]
pub fn composite_score(s: f64, d: f64, beta_sqr: f64) -> f64 {
    if s >= d {
        f_score(s, d, beta_sqr)
    } else {
        f_score(d, s, beta_sqr)
    }
}

/// (score-sum, weight) accumulator for one pooled group of argument spans.
#[derive(Default, Clone, Copy)]
struct Pool {
    sum: f64,
    weight: f64,
}

impl Pool {
    fn add(&mut self, score: f64, weight: f64) {
        self.sum += score * weight;
        self.weight += weight;
    }
}

/// Scores candidate predicate pairs of a [`SentencePair`].
///
/// Holds its POS weight tables and optional probability model by value; a
/// retrained model is a new scorer, never a mutation of a shared one.
pub struct SimilarityScorer {
    params: ScorerParams,
    src_weights: WeightTable,
    dst_weights: WeightTable,
    prob: Option<Arc<AlignmentProb>>,
}

impl SimilarityScorer {
    /// Purely lexical scorer: unit POS weights, no probability model.
    pub fn new(params: ScorerParams) -> Self {
        SimilarityScorer {
            params,
            src_weights: WeightTable::new(),
            dst_weights: WeightTable::new(),
            prob: None,
        }
    }

    pub fn with_model(
        params: ScorerParams,
        src_weights: WeightTable,
        dst_weights: WeightTable,
        prob: Option<Arc<AlignmentProb>>,
    ) -> Self {
        SimilarityScorer {
            params,
            src_weights,
            dst_weights,
            prob,
        }
    }

    pub fn params(&self) -> &ScorerParams {
        &self.params
    }

    /// Both directional similarities of a candidate pair plus their composite.
    pub fn similarity(&self, pair: &SentencePair, src_index: usize, dst_index: usize) -> SimilarityPair {
        let src_inst = &pair.src.predicates[src_index];
        let dst_inst = &pair.dst.predicates[dst_index];
        let forward = self.directional(src_inst, dst_inst, pair, Direction::SrcToDst);
        let backward = self.directional(dst_inst, src_inst, pair, Direction::DstToSrc);
        let composite = composite_score(forward.score, backward.score, self.params.beta_sqr);
        SimilarityPair {
            forward,
            backward,
            composite,
        }
    }

    /// Directional similarity of `lhs` against `rhs`, walking `lhs`'s spans
    /// through the word alignment.
    pub fn directional(
        &self,
        lhs: &PredicateInstance,
        rhs: &PredicateInstance,
        pair: &SentencePair,
        dir: Direction,
    ) -> Similarity {
        let (sentence, weights) = self.own_side(pair, dir);
        let mut pos_evidence = HashMap::new();

        let (mut rel_score, rel_weight) = match &lhs.rel {
            Some(rel) => self.span_score(rel, lhs, rhs, sentence, pair, dir, weights, &mut pos_evidence),
            None => (0.0, 0.0),
        };

        let mut core = Pool::default();
        let mut other = Pool::default();
        for arg in &lhs.args {
            let (score, weight) =
                self.span_score(arg, lhs, rhs, sentence, pair, dir, weights, &mut pos_evidence);
            if weight == 0.0 {
                continue;
            }
            if is_core_label(&arg.label) {
                core.add(score, weight);
            } else {
                other.add(score, weight);
            }
        }

        let a = self.params.arg01_factor;
        let arg_denom = a * core.weight + (1.0 - a) * other.weight;
        let arg_score = if arg_denom == 0.0 {
            0.0
        } else {
            (a * core.sum + (1.0 - a) * other.sum) / arg_denom
        };

        let alpha = self.params.pred_prob_weight;
        if alpha > 0.0 {
            if let Some(prob) = &self.prob {
                rel_score = (1.0 - alpha) * rel_score
                    + alpha * prob.pred_prob(dir, &lhs.roleset, &rhs.roleset);
            }
        }

        // A bare predicate match is weak evidence; agreement on the core
        // arguments, when there is enough of it, carries equal weight.
        let pred_blend = if core.weight > 0.0 && core.weight >= self.params.core_dominance * rel_weight
        {
            self.params.balanced_pred_blend
        } else {
            self.params.skewed_pred_blend
        };

        Similarity {
            score: pred_blend * rel_score + (1.0 - pred_blend) * arg_score,
            pos_evidence,
        }
    }

    /// Weighted argument-pair similarity matrix for a matched predicate pair,
    /// indexed by the instances' non-`rel` argument lists.
    pub fn arg_similarity_matrix(
        &self,
        pair: &SentencePair,
        src_inst: &PredicateInstance,
        dst_inst: &PredicateInstance,
    ) -> Vec<Vec<f64>> {
        let (_, src_arg_weights) = self.compute_arg_weights(src_inst);
        let (_, dst_arg_weights) = self.compute_arg_weights(dst_inst);

        let mut matrix = vec![vec![0.0; dst_inst.args.len()]; src_inst.args.len()];
        for (i, src_arg) in src_inst.args.iter().enumerate() {
            for (j, dst_arg) in dst_inst.args.iter().enumerate() {
                let forward = self.span_pair_directional(
                    src_arg,
                    dst_arg,
                    src_inst,
                    dst_inst,
                    &pair.src,
                    pair,
                    Direction::SrcToDst,
                    &self.src_weights,
                );
                let backward = self.span_pair_directional(
                    dst_arg,
                    src_arg,
                    dst_inst,
                    src_inst,
                    &pair.dst,
                    pair,
                    Direction::DstToSrc,
                    &self.dst_weights,
                );
                let similarity = composite_score(forward, backward, self.params.beta_sqr);
                matrix[i][j] =
                    similarity * self.importance_factor(src_arg_weights[i], dst_arg_weights[j]);
            }
        }
        matrix
    }

    /// Distribute a unit importance budget over an instance's spans: the
    /// `rel` span takes the predicate blend share, the remainder spreads over
    /// the arguments proportional to the ARG0/ARG1-favoring scheme.
    pub fn compute_arg_weights(&self, inst: &PredicateInstance) -> (f64, Vec<f64>) {
        let rel_tokens = inst.rel.as_ref().map(|r| r.token_count()).unwrap_or(0) as f64;
        let core_tokens: f64 = inst
            .args
            .iter()
            .filter(|a| is_core_label(&a.label))
            .map(|a| a.token_count() as f64)
            .sum();

        let pred_share = if inst.rel.is_none() {
            0.0
        } else if core_tokens > 0.0 && core_tokens >= self.params.core_dominance * rel_tokens {
            self.params.balanced_pred_blend
        } else {
            self.params.skewed_pred_blend
        };

        let a = self.params.arg01_factor;
        let mut weights: Vec<f64> = inst
            .args
            .iter()
            .map(|arg| {
                let share = if is_core_label(&arg.label) { a } else { 1.0 - a };
                share * arg.token_count() as f64
            })
            .collect();
        let total: f64 = weights.iter().sum();
        if total > 0.0 {
            let scale = (1.0 - pred_share) / total;
            for w in &mut weights {
                *w *= scale;
            }
        }
        (pred_share, weights)
    }

    fn importance_factor(&self, src_weight: f64, dst_weight: f64) -> f64 {
        if dst_weight <= 0.0 || src_weight <= 0.0 {
            return 0.0;
        }
        f_score(
            src_weight,
            dst_weight,
            self.params.beta_sqr * src_weight / dst_weight,
        )
    }

    fn own_side<'a>(&'a self, pair: &'a SentencePair, dir: Direction) -> (&'a Sentence, &'a WeightTable) {
        match dir {
            Direction::SrcToDst => (&pair.src, &self.src_weights),
            Direction::DstToSrc => (&pair.dst, &self.dst_weights),
        }
    }

    /// Score one lhs span against every span of `rhs`. Returns the
    /// POS-weighted mean token score and the evidence weight; tokens without
    /// any aligned position contribute to neither.
    #[allow(clippy::too_many_arguments)]
    fn span_score(
        &self,
        span: &ArgumentSpan,
        lhs: &PredicateInstance,
        rhs: &PredicateInstance,
        sentence: &Sentence,
        pair: &SentencePair,
        dir: Direction,
        weights: &WeightTable,
        pos_evidence: &mut HashMap<String, (f64, f64)>,
    ) -> (f64, f64) {
        let mut num = 0.0;
        let mut den = 0.0;
        for &position in &span.positions {
            let aligned = match pair.word_alignment.aligned(dir, position) {
                Some(set) if !set.is_empty() => set,
                _ => continue,
            };
            let pos_tag = sentence.pos_tag(position);
            let weight = weights.get(pos_tag);
            let mut contribution = 0.0;
            for &q in aligned {
                if let Some(rhs_label) = containing_label(rhs, q) {
                    contribution +=
                        self.match_weight(&span.label, rhs_label, &lhs.roleset, &rhs.roleset, dir);
                }
            }
            let token_score = contribution.min(1.0);
            num += token_score * weight;
            den += weight;
            let entry = pos_evidence.entry(pos_tag.to_string()).or_insert((0.0, 0.0));
            entry.0 += token_score * weight;
            entry.1 += weight;
        }
        if den == 0.0 {
            (0.0, 0.0)
        } else {
            (num / den, den)
        }
    }

    /// Token-alignment scoring restricted to one specific span pair.
    #[allow(clippy::too_many_arguments)]
    fn span_pair_directional(
        &self,
        span_a: &ArgumentSpan,
        span_b: &ArgumentSpan,
        lhs: &PredicateInstance,
        rhs: &PredicateInstance,
        sentence: &Sentence,
        pair: &SentencePair,
        dir: Direction,
        weights: &WeightTable,
    ) -> f64 {
        let label_weight =
            self.match_weight(&span_a.label, &span_b.label, &lhs.roleset, &rhs.roleset, dir);
        let mut num = 0.0;
        let mut den = 0.0;
        for &position in &span_a.positions {
            let aligned = match pair.word_alignment.aligned(dir, position) {
                Some(set) if !set.is_empty() => set,
                _ => continue,
            };
            let weight = weights.get(sentence.pos_tag(position));
            let hits = aligned.iter().filter(|q| span_b.positions.contains(q)).count();
            let token_score = (label_weight * hits as f64).min(1.0);
            num += token_score * weight;
            den += weight;
        }
        if den == 0.0 {
            0.0
        } else {
            num / den
        }
    }

    /// Evidence weight of a label pairing, optionally blended with the
    /// argument-label translation probability.
    fn match_weight(
        &self,
        lhs_label: &str,
        rhs_label: &str,
        lhs_roleset: &str,
        rhs_roleset: &str,
        dir: Direction,
    ) -> f64 {
        let lex = if lhs_label == rhs_label {
            self.params.exact_match_weight
        } else if is_primary_label(lhs_label) && is_primary_label(rhs_label) {
            self.params.primary_match_weight
        } else {
            self.params.other_match_weight
        };
        let beta = self.params.arg_prob_weight;
        if beta > 0.0 {
            if let Some(prob) = &self.prob {
                let p = prob.arg_prob(dir, lhs_roleset, rhs_roleset, lhs_label, rhs_label);
                return (1.0 - beta) * lex + beta * p;
            }
        }
        lex
    }
}

/// Which of `inst`'s spans contains the terminal position, if any.
fn containing_label(inst: &PredicateInstance, position: u32) -> Option<&str> {
    if let Some(rel) = &inst.rel {
        if rel.positions.contains(&position) {
            return Some(REL_LABEL);
        }
    }
    inst.args
        .iter()
        .find(|a| a.positions.contains(&position))
        .map(|a| a.label.as_str())
}

/// Re-estimate a POS weight table from a batch of similarity breakdowns.
///
/// A tag's weight is its mean evidence score relative to the global mean,
/// clamped to [0.5, 3.0] for stability. Produces a fresh table; the scorer
/// holding the old one is untouched.
pub fn reestimate_weight_table<'a, I>(similarities: I) -> WeightTable
where
    I: IntoIterator<Item = &'a Similarity>,
{
    let mut per_pos: HashMap<String, (f64, f64)> = HashMap::new();
    let mut total_score = 0.0;
    let mut total_weight = 0.0;
    for sim in similarities {
        for (pos, &(score, weight)) in &sim.pos_evidence {
            let entry = per_pos.entry(pos.clone()).or_insert((0.0, 0.0));
            entry.0 += score;
            entry.1 += weight;
            total_score += score;
            total_weight += weight;
        }
    }
    if total_weight == 0.0 || total_score == 0.0 {
        return WeightTable::new();
    }
    let global_mean = total_score / total_weight;
    let weights = per_pos
        .into_iter()
        .filter(|(_, (_, weight))| *weight > 0.0)
        .map(|(pos, (score, weight))| {
            let mean = score / weight;
            (pos, (mean / global_mean).clamp(0.5, 3.0))
        })
        .collect();
    WeightTable::from_weights(weights)
}
