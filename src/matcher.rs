//! Optimal one-to-one matching of predicates and arguments.
//!
//! Wraps a minimum-cost assignment solver (Kuhn-Munkres with potentials and
//! shortest augmenting paths) applied twice: once over the predicate
//! similarity matrix of a sentence pair, and once per matched predicate pair
//! over the argument-pair similarity matrix.

use crate::models::{Alignment, ArgAlignmentPair, PredicateInstance, SentencePair};
use crate::scorer::SimilarityScorer;

/// Score and optimally match the predicates of one sentence pair.
///
/// Returns one [`Alignment`] per destination predicate whose assigned source
/// clears the similarity threshold; below-threshold pairs are dropped, not
/// emitted with a low score. Pairs without predicates on either side
/// short-circuit to an empty result.
pub fn align_sentence_pair(scorer: &SimilarityScorer, pair: &SentencePair) -> Vec<Alignment> {
    let n = pair.src.predicates.len();
    let m = pair.dst.predicates.len();
    if n == 0 || m == 0 {
        return Vec::new();
    }

    let mut similarity = vec![vec![0.0; m]; n];
    for (i, row) in similarity.iter_mut().enumerate() {
        for (j, cell) in row.iter_mut().enumerate() {
            *cell = scorer.similarity(pair, i, j).composite;
        }
    }

    let mut alignments = Vec::new();
    for (src_index, dst_index) in optimal_matches(&similarity, scorer.params().max_similarity) {
        let score = similarity[src_index][dst_index];
        if score < scorer.params().min_pred_similarity {
            continue;
        }
        let src_inst = &pair.src.predicates[src_index];
        let dst_inst = &pair.dst.predicates[dst_index];
        alignments.push(Alignment {
            pair_id: pair.id,
            src_index,
            dst_index,
            src_roleset: src_inst.roleset.clone(),
            dst_roleset: dst_inst.roleset.clone(),
            score,
            arg_pairs: align_arguments(scorer, pair, src_inst, dst_inst),
        });
    }
    alignments
}

/// Match the arguments of one matched predicate pair. Every matched index
/// pair with a positive score survives; there is no fixed threshold here.
fn align_arguments(
    scorer: &SimilarityScorer,
    pair: &SentencePair,
    src_inst: &PredicateInstance,
    dst_inst: &PredicateInstance,
) -> Vec<ArgAlignmentPair> {
    let matrix = scorer.arg_similarity_matrix(pair, src_inst, dst_inst);
    if matrix.is_empty() || matrix[0].is_empty() {
        return Vec::new();
    }
    optimal_matches(&matrix, scorer.params().max_similarity)
        .into_iter()
        .filter_map(|(src_arg, dst_arg)| {
            let score = matrix[src_arg][dst_arg];
            (score > 0.0).then_some(ArgAlignmentPair {
                src_arg,
                dst_arg,
                score,
            })
        })
        .collect()
}

/// Optimal one-to-one matching of an `n x m` similarity matrix.
///
/// The matrix is padded to `max(n, m)` square with zero similarity and
/// converted to costs as `max_similarity - similarity`; the minimum-cost
/// perfect assignment then maximizes total similarity. Returns real
/// (row, column) matches in column order. Ties in total cost may resolve to
/// any optimal assignment.
pub fn optimal_matches(similarity: &[Vec<f64>], max_similarity: f64) -> Vec<(usize, usize)> {
    let n = similarity.len();
    let m = if n == 0 { 0 } else { similarity[0].len() };
    if n == 0 || m == 0 {
        return Vec::new();
    }

    let k = n.max(m);
    let mut cost = vec![vec![max_similarity; k]; k];
    for (i, row) in similarity.iter().enumerate() {
        for (j, &sim) in row.iter().enumerate() {
            cost[i][j] = max_similarity - sim;
        }
    }

    solve_assignment(&cost)
        .into_iter()
        .enumerate()
        .filter(|&(column, row)| column < m && row < n)
        .map(|(column, row)| (row, column))
        .collect()
}

/// Minimum-cost perfect assignment on a square cost matrix.
///
/// Kuhn-Munkres in the potentials formulation: for each row, grow a shortest
/// augmenting path over reduced costs, updating the dual potentials until a
/// free column is reached. O(k^3). Returns the assigned row for each column.
fn solve_assignment(cost: &[Vec<f64>]) -> Vec<usize> {
    let k = cost.len();
    if k == 0 {
        return Vec::new();
    }

    // 1-indexed working arrays; p[j] is the row matched to column j, 0 = free.
    let mut u = vec![0.0f64; k + 1];
    let mut v = vec![0.0f64; k + 1];
    let mut p = vec![0usize; k + 1];
    let mut way = vec![0usize; k + 1];

    for i in 1..=k {
        p[0] = i;
        let mut j0 = 0usize;
        let mut minv = vec![f64::INFINITY; k + 1];
        let mut used = vec![false; k + 1];

        loop {
            used[j0] = true;
            let i0 = p[j0];
            let mut delta = f64::INFINITY;
            let mut j1 = 0usize;
            for j in 1..=k {
                if used[j] {
                    continue;
                }
                let reduced = cost[i0 - 1][j - 1] - u[i0] - v[j];
                if reduced < minv[j] {
                    minv[j] = reduced;
                    way[j] = j0;
                }
                if minv[j] < delta {
                    delta = minv[j];
                    j1 = j;
                }
            }
            for j in 0..=k {
                if used[j] {
                    u[p[j]] += delta;
                    v[j] -= delta;
                } else {
                    minv[j] -= delta;
                }
            }
            j0 = j1;
            if p[j0] == 0 {
                break;
            }
        }

        // Augment along the recorded path.
        loop {
            let j1 = way[j0];
            p[j0] = p[j1];
            j0 = j1;
            if j0 == 0 {
                break;
            }
        }
    }

    (1..=k).map(|j| p[j] - 1).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        ArgumentSpan, PredicateInstance, ScorerParams, Sentence, Terminal, TerminalId,
        WordAlignment,
    };

    fn permutations(k: usize) -> Vec<Vec<usize>> {
        if k == 0 {
            return vec![Vec::new()];
        }
        let mut result = Vec::new();
        for rest in permutations(k - 1) {
            for slot in 0..=rest.len() {
                let mut perm = rest.clone();
                perm.insert(slot, k - 1);
                result.push(perm);
            }
        }
        result
    }

    /// Best total similarity over all one-to-one assignments, by brute force.
    fn brute_force_best(similarity: &[Vec<f64>]) -> f64 {
        let n = similarity.len();
        let m = similarity[0].len();
        let k = n.max(m);
        let mut best = f64::NEG_INFINITY;
        for perm in permutations(k) {
            let total: f64 = perm
                .iter()
                .enumerate()
                .filter(|&(row, &col)| row < n && col < m)
                .map(|(row, &col)| similarity[row][col])
                .sum();
            best = best.max(total);
        }
        best
    }

    fn matched_total(similarity: &[Vec<f64>]) -> f64 {
        optimal_matches(similarity, 3.0)
            .iter()
            .map(|&(i, j)| similarity[i][j])
            .sum()
    }

    #[test]
    fn test_assignment_matches_brute_force_square() {
        let cases: Vec<Vec<Vec<f64>>> = vec![
            vec![
                vec![0.9, 0.2, 0.1],
                vec![0.8, 0.85, 0.0],
                vec![0.3, 0.9, 0.4],
            ],
            vec![
                vec![0.5, 0.5, 0.5],
                vec![0.5, 0.5, 0.5],
                vec![0.5, 0.5, 0.5],
            ],
            vec![
                vec![0.0, 1.0, 0.0],
                vec![1.0, 0.0, 0.0],
                vec![0.0, 0.0, 1.0],
            ],
        ];
        for similarity in cases {
            let expected = brute_force_best(&similarity);
            let actual = matched_total(&similarity);
            assert!(
                (actual - expected).abs() < 1e-9,
                "optimal {} vs brute force {}",
                actual,
                expected
            );
        }
    }

    #[test]
    fn test_assignment_matches_brute_force_rectangular() {
        let wide = vec![vec![0.9, 0.1, 0.6, 0.3], vec![0.2, 0.8, 0.7, 0.1]];
        let tall = vec![vec![0.9, 0.1], vec![0.85, 0.8], vec![0.1, 0.75]];
        for similarity in [wide, tall] {
            let expected = brute_force_best(&similarity);
            let actual = matched_total(&similarity);
            assert!((actual - expected).abs() < 1e-9);
        }
    }

    #[test]
    fn test_each_destination_matched_at_most_once() {
        let similarity = vec![
            vec![0.9, 0.9, 0.9],
            vec![0.9, 0.9, 0.9],
            vec![0.9, 0.9, 0.9],
            vec![0.9, 0.9, 0.9],
        ];
        let matches = optimal_matches(&similarity, 3.0);
        assert_eq!(matches.len(), 3);

        let mut dst_seen = std::collections::HashSet::new();
        let mut src_seen = std::collections::HashSet::new();
        for (src, dst) in matches {
            assert!(dst_seen.insert(dst), "destination {} matched twice", dst);
            assert!(src_seen.insert(src), "source {} matched twice", src);
        }
    }

    #[test]
    fn test_empty_matrix() {
        assert!(optimal_matches(&[], 3.0).is_empty());
        let no_columns: Vec<Vec<f64>> = vec![Vec::new()];
        assert!(optimal_matches(&no_columns, 3.0).is_empty());
    }

    // Sentence-pair level tests.

    fn predicate(position: u32, roleset: &str, spans: Vec<ArgumentSpan>) -> PredicateInstance {
        PredicateInstance::new(TerminalId::new(0, position), roleset, spans)
    }

    fn sentence(words: usize, predicates: Vec<PredicateInstance>) -> Sentence {
        let terminals = (0..words)
            .map(|i| Terminal {
                word: format!("w{}", i),
                pos: "NN".to_string(),
            })
            .collect();
        Sentence::new(0, terminals, predicates)
    }

    fn identity_pair(words: usize, src: Vec<PredicateInstance>, dst: Vec<PredicateInstance>) -> SentencePair {
        let links: Vec<(u32, u32)> = (0..words as u32).map(|i| (i, i)).collect();
        SentencePair {
            id: 7,
            src: sentence(words, src),
            dst: sentence(words, dst),
            word_alignment: WordAlignment::from_links(words, words, &links),
        }
    }

    #[test]
    fn test_identity_scenario_end_to_end() {
        let pred = || {
            predicate(
                0,
                "run.01",
                vec![ArgumentSpan::new("rel", [0]), ArgumentSpan::new("ARG0", [1])],
            )
        };
        let pair = identity_pair(2, vec![pred()], vec![pred()]);
        let scorer = SimilarityScorer::new(ScorerParams::default());

        let alignments = align_sentence_pair(&scorer, &pair);
        assert_eq!(alignments.len(), 1);

        let alignment = &alignments[0];
        assert_eq!(alignment.pair_id, 7);
        assert_eq!(alignment.src_index, 0);
        assert_eq!(alignment.dst_index, 0);
        assert!((alignment.score - 1.0).abs() < 1e-12);
        assert_eq!(alignment.arg_pairs.len(), 1);
        assert_eq!(alignment.arg_pairs[0].src_arg, 0);
        assert_eq!(alignment.arg_pairs[0].dst_arg, 0);
        assert!(alignment.arg_pairs[0].score > 0.0);
    }

    #[test]
    fn test_no_predicates_short_circuits() {
        let pair = identity_pair(3, Vec::new(), Vec::new());
        let scorer = SimilarityScorer::new(ScorerParams::default());
        assert!(align_sentence_pair(&scorer, &pair).is_empty());

        let pred = predicate(0, "run.01", vec![ArgumentSpan::new("rel", [0])]);
        let pair = identity_pair(3, vec![pred], Vec::new());
        assert!(align_sentence_pair(&scorer, &pair).is_empty());
    }

    #[test]
    fn test_threshold_drops_weak_pairs() {
        // Source and destination predicates share no aligned material.
        let src = predicate(0, "run.01", vec![ArgumentSpan::new("rel", [0])]);
        let dst = predicate(2, "walk.01", vec![ArgumentSpan::new("rel", [2])]);
        let pair = SentencePair {
            id: 0,
            src: sentence(3, vec![src]),
            dst: sentence(3, vec![dst]),
            // rel tokens align outside each other's spans.
            word_alignment: WordAlignment::from_links(3, 3, &[(0, 1), (1, 2)]),
        };
        let scorer = SimilarityScorer::new(ScorerParams::default());

        let alignments = align_sentence_pair(&scorer, &pair);
        assert!(alignments.is_empty());
    }

    #[test]
    fn test_two_predicates_align_to_their_counterparts() {
        let src = vec![
            predicate(
                0,
                "say.01",
                vec![ArgumentSpan::new("rel", [0]), ArgumentSpan::new("ARG1", [1])],
            ),
            predicate(
                2,
                "run.01",
                vec![ArgumentSpan::new("rel", [2]), ArgumentSpan::new("ARG0", [3])],
            ),
        ];
        let dst = vec![
            predicate(
                2,
                "correr.01",
                vec![ArgumentSpan::new("rel", [2]), ArgumentSpan::new("ARG0", [3])],
            ),
            predicate(
                0,
                "decir.01",
                vec![ArgumentSpan::new("rel", [0]), ArgumentSpan::new("ARG1", [1])],
            ),
        ];
        let pair = identity_pair(4, src, dst);
        let scorer = SimilarityScorer::new(ScorerParams::default());

        let alignments = align_sentence_pair(&scorer, &pair);
        assert_eq!(alignments.len(), 2);

        // Predicates are ordered by position, so dst 0 is decir (terminal 0)
        // and dst 1 is correr (terminal 2).
        assert_eq!(alignments[0].dst_index, 0);
        assert_eq!(alignments[0].src_index, 0);
        assert_eq!(alignments[0].src_roleset, "say.01");
        assert_eq!(alignments[0].dst_roleset, "decir.01");
        assert_eq!(alignments[1].dst_index, 1);
        assert_eq!(alignments[1].src_index, 1);
        for alignment in &alignments {
            assert!((alignment.score - 1.0).abs() < 1e-9);
        }
    }
}
