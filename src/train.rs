//! Iterative refinement of the aligner.
//!
//! A coordinate-ascent bootstrap with no ground truth: align the corpus with
//! the current scorer, rebuild the probability tables from the resulting
//! alignments, grid-search the blend of lexical similarity and probability
//! model on a validation set, and repeat. Internal consistency is the only
//! objective, so the loop can settle into a self-reinforcing equilibrium;
//! the convergence check makes that termination explicit.

use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;

use crate::matcher::align_sentence_pair;
use crate::models::{Alignment, ScorerParams, SentencePair, TrainParams, WeightTable};
use crate::prob::AlignmentProb;
use crate::scorer::{reestimate_weight_table, SimilarityScorer};

/// Statistics of one refinement round.
#[derive(Debug, Clone, Serialize)]
pub struct RoundStats {
    pub round: usize,
    pub alignment_count: usize,
    pub total_score: f64,
    /// Dice agreement with the previous round's alignments; 0 on round 0.
    pub agreement: f64,
    pub selected_alpha: f64,
    pub selected_beta: f64,
    /// Validation-set score of the selected candidate; absent when the round
    /// terminated on convergence before the grid search ran.
    pub validation_score: Option<f64>,
}

/// Everything the loop produces: the selected scorer configuration, the last
/// round's probability model and alignments, and per-round statistics.
pub struct TrainOutcome {
    pub scorer_params: ScorerParams,
    pub src_weights: WeightTable,
    pub dst_weights: WeightTable,
    pub prob: Arc<AlignmentProb>,
    pub alignments: Vec<Vec<Alignment>>,
    pub rounds: Vec<RoundStats>,
}

/// Align every pair of a corpus in parallel.
pub fn align_corpus(
    scorer: &SimilarityScorer,
    corpus: &[SentencePair],
    show_progress: bool,
) -> Vec<Vec<Alignment>> {
    let progress = if show_progress {
        let pb = ProgressBar::new(corpus.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len}")
                .unwrap()
                .progress_chars("#>-"),
        );
        Some(pb)
    } else {
        None
    };

    let alignments: Vec<Vec<Alignment>> = corpus
        .par_iter()
        .map(|pair| {
            let result = align_sentence_pair(scorer, pair);
            if let Some(pb) = &progress {
                pb.inc(1);
            }
            result
        })
        .collect();

    if let Some(pb) = progress {
        pb.finish_and_clear();
    }
    alignments
}

/// Run the refinement loop.
///
/// `validation` defaults to the training corpus itself when absent. Runs at
/// least one round even if `params.rounds` is 0, so the outcome always
/// carries a probability model and a full set of alignments.
pub fn train(
    corpus: &[SentencePair],
    validation: Option<&[SentencePair]>,
    base_params: &ScorerParams,
    params: &TrainParams,
    show_progress: bool,
) -> TrainOutcome {
    let rounds = params.rounds.max(1);
    let eval_set = validation.unwrap_or(corpus);

    let mut src_weights = WeightTable::new();
    let mut dst_weights = WeightTable::new();
    let mut scorer = SimilarityScorer::new(base_params.with_prob_weights(0.0, 0.0));
    let mut prob: Option<Arc<AlignmentProb>> = None;
    let mut alignments: Vec<Vec<Alignment>> = Vec::new();
    let mut previous_keys: Option<HashSet<(u32, usize, usize)>> = None;
    let mut stats = Vec::new();

    for round in 0..rounds {
        alignments = align_corpus(&scorer, corpus, show_progress);
        let alignment_count: usize = alignments.iter().map(|a| a.len()).sum();
        let total_score: f64 = alignments.iter().flatten().map(|a| a.score).sum();

        let keys: HashSet<(u32, usize, usize)> = alignments
            .iter()
            .flatten()
            .map(|a| (a.pair_id, a.src_index, a.dst_index))
            .collect();
        let agreement = previous_keys
            .as_ref()
            .map(|prev| dice_agreement(prev, &keys))
            .unwrap_or(0.0);

        if round > 0 && agreement >= params.convergence {
            log::info!(
                "round {}: agreement {:.4} reached convergence threshold {:.4}",
                round,
                agreement,
                params.convergence
            );
            stats.push(RoundStats {
                round,
                alignment_count,
                total_score,
                agreement,
                selected_alpha: scorer.params().pred_prob_weight,
                selected_beta: scorer.params().arg_prob_weight,
                validation_score: None,
            });
            break;
        }

        let new_prob = Arc::new(AlignmentProb::build(corpus, &alignments));

        if params.reweight_pos {
            let (src, dst) = reestimate_tables(&scorer, corpus, &alignments);
            src_weights = src;
            dst_weights = dst;
        }

        // The do-nothing baseline is always candidate 0, so first-maximum
        // selection can never regress below it.
        let mut candidates = vec![(0.0, 0.0)];
        for &alpha in &params.alpha_grid {
            for &beta in &params.beta_grid {
                candidates.push((alpha, beta));
            }
        }
        let evaluations: Vec<(f64, usize)> = candidates
            .par_iter()
            .map(|&(alpha, beta)| {
                let candidate = SimilarityScorer::with_model(
                    base_params.with_prob_weights(alpha, beta),
                    src_weights.clone(),
                    dst_weights.clone(),
                    Some(new_prob.clone()),
                );
                evaluate_candidate(&candidate, eval_set)
            })
            .collect();

        let mut best = 0;
        for (index, evaluation) in evaluations.iter().enumerate() {
            if evaluation.0 > evaluations[best].0 {
                best = index;
            }
        }
        let (alpha, beta) = candidates[best];
        log::info!(
            "round {}: {} alignments, score {:.2}; selected alpha={:.2} beta={:.2} ({:.2} on validation)",
            round,
            alignment_count,
            total_score,
            alpha,
            beta,
            evaluations[best].0
        );

        stats.push(RoundStats {
            round,
            alignment_count,
            total_score,
            agreement,
            selected_alpha: alpha,
            selected_beta: beta,
            validation_score: Some(evaluations[best].0),
        });

        scorer = SimilarityScorer::with_model(
            base_params.with_prob_weights(alpha, beta),
            src_weights.clone(),
            dst_weights.clone(),
            Some(new_prob.clone()),
        );
        prob = Some(new_prob);
        previous_keys = Some(keys);
    }

    let prob = prob.unwrap_or_else(|| Arc::new(AlignmentProb::build(corpus, &alignments)));
    TrainOutcome {
        scorer_params: scorer.params().clone(),
        src_weights,
        dst_weights,
        prob,
        alignments,
        rounds: stats,
    }
}

/// Sum of composite alignment scores over a corpus, with the alignment count.
fn evaluate_candidate(scorer: &SimilarityScorer, corpus: &[SentencePair]) -> (f64, usize) {
    let mut total = 0.0;
    let mut count = 0;
    for pair in corpus {
        for alignment in align_sentence_pair(scorer, pair) {
            total += alignment.score;
            count += 1;
        }
    }
    (total, count)
}

/// Dice overlap of two alignment key sets; 1 when both are empty.
fn dice_agreement(a: &HashSet<(u32, usize, usize)>, b: &HashSet<(u32, usize, usize)>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let shared = a.intersection(b).count();
    2.0 * shared as f64 / (a.len() + b.len()) as f64
}

/// Re-score the matched pairs and rebuild both POS weight tables from the
/// per-POS evidence breakdowns.
fn reestimate_tables(
    scorer: &SimilarityScorer,
    corpus: &[SentencePair],
    alignments: &[Vec<Alignment>],
) -> (WeightTable, WeightTable) {
    let mut forward = Vec::new();
    let mut backward = Vec::new();
    for (pair, pair_alignments) in corpus.iter().zip(alignments) {
        for alignment in pair_alignments {
            let sim = scorer.similarity(pair, alignment.src_index, alignment.dst_index);
            forward.push(sim.forward);
            backward.push(sim.backward);
        }
    }
    (
        reestimate_weight_table(forward.iter()),
        reestimate_weight_table(backward.iter()),
    )
}
