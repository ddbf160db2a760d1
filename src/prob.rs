//! Smoothed conditional probability tables built from observed alignments.
//!
//! Raw co-occurrence counts accumulate in [`CountProb`]; finalization applies
//! Simple Good-Turing discounting (with an add-N fallback on sparse data) and
//! produces an immutable [`SmoothedDist`] whose held-out mass is redistributed
//! through a coarser backoff distribution. [`AlignmentProb`] bundles the
//! three-level backoff hierarchy used by the scorer.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::hash::Hash;
use std::sync::Arc;

use crate::models::{Alignment, Direction, SentencePair};

/// Minimum number of distinct frequency classes for a stable SGT fit.
const SGT_MIN_CLASSES: usize = 5;

/// Raw frequency accumulator for one discrete distribution. Accumulating
/// state only; finalization consumes it, so a finalized table can never be
/// silently dirtied by further counts.
#[derive(Debug, Clone, Default)]
pub struct CountProb<T: Eq + Hash> {
    counts: HashMap<T, u64>,
    total: u64,
}

impl<T: Eq + Hash + Clone> CountProb<T> {
    pub fn new() -> Self {
        CountProb {
            counts: HashMap::new(),
            total: 0,
        }
    }

    pub fn add_count(&mut self, key: T) {
        *self.counts.entry(key).or_insert(0) += 1;
        self.total += 1;
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    /// Number of distinct seen keys.
    pub fn distinct(&self) -> usize {
        self.counts.len()
    }

    /// Freeze into a smoothed distribution.
    ///
    /// `unseen_count` is the number of candidate keys never counted here
    /// (observed elsewhere in the corpus); it sizes the held-out mass for the
    /// sparse-data fallback. `backoff` receives the unseen mass; without one,
    /// unseen keys score 0.
    pub fn finalize(self, unseen_count: usize, backoff: Option<Arc<SmoothedDist<T>>>) -> SmoothedDist<T> {
        if self.total == 0 {
            // No observations at all: when unseen candidates exist and a
            // backoff is configured, the entire unit mass flows through it.
            let unseen_factor = if unseen_count > 0 && backoff.is_some() {
                1.0
            } else {
                0.0
            };
            return SmoothedDist {
                probs: HashMap::new(),
                unseen_factor,
                backoff,
            };
        }

        let mut freq_classes: BTreeMap<u64, u64> = BTreeMap::new();
        for &count in self.counts.values() {
            *freq_classes.entry(count).or_insert(0) += 1;
        }

        let (probs, unseen_mass) = if freq_classes.len() >= SGT_MIN_CLASSES {
            sgt_probs(&self.counts, &freq_classes, self.total)
        } else {
            add_n_probs(&self.counts, self.total, unseen_count)
        };

        let unseen_factor = match &backoff {
            Some(coarser) if unseen_mass > 0.0 => {
                // "Sum of backoff probabilities over truly-unseen keys" in
                // complement form, so the candidate set never has to be
                // materialized.
                let seen_backoff: f64 = self.counts.keys().map(|k| coarser.prob(k)).sum();
                let denom = 1.0 - seen_backoff;
                if denom > f64::EPSILON {
                    unseen_mass / denom
                } else {
                    0.0
                }
            }
            _ => 0.0,
        };

        SmoothedDist {
            probs,
            unseen_factor,
            backoff,
        }
    }
}

/// Simple Good-Turing: fit a power law to the frequency-of-frequencies via
/// the Z-transform, derive adjusted counts r* = (r+1)·S(r+1)/S(r), and
/// renormalize the seen mass to 1 - N1/total.
fn sgt_probs<T: Eq + Hash + Clone>(
    counts: &HashMap<T, u64>,
    freq_classes: &BTreeMap<u64, u64>,
    total: u64,
) -> (HashMap<T, f64>, f64) {
    let rs: Vec<f64> = freq_classes.keys().map(|&r| r as f64).collect();
    let ns: Vec<f64> = freq_classes.values().map(|&n| n as f64).collect();
    let class_count = rs.len();

    // Gale & Sampson Z-transform: spread each class count over the gap to
    // its neighboring populated classes before fitting.
    let mut log_r = Vec::with_capacity(class_count);
    let mut log_z = Vec::with_capacity(class_count);
    for i in 0..class_count {
        let q = if i == 0 { 0.0 } else { rs[i - 1] };
        let t = if i + 1 < class_count {
            rs[i + 1]
        } else {
            2.0 * rs[i] - q
        };
        let z = ns[i] / (0.5 * (t - q));
        log_r.push(rs[i].ln());
        log_z.push(z.ln());
    }
    let (slope, intercept) = linear_fit(&log_r, &log_z);
    let smoothed = |r: f64| (intercept + slope * r.ln()).exp();

    let mut adjusted: HashMap<u64, f64> = HashMap::new();
    for &r in freq_classes.keys() {
        let r_f = r as f64;
        adjusted.insert(r, (r_f + 1.0) * smoothed(r_f + 1.0) / smoothed(r_f));
    }

    let singletons = *freq_classes.get(&1).unwrap_or(&0) as f64;
    let unseen_mass = singletons / total as f64;

    let norm: f64 = freq_classes
        .iter()
        .map(|(&r, &n)| n as f64 * adjusted[&r])
        .sum();
    let probs = counts
        .iter()
        .map(|(key, &count)| (key.clone(), (1.0 - unseen_mass) * adjusted[&count] / norm))
        .collect();
    (probs, unseen_mass)
}

/// Add-N fallback for distributions with too few frequency classes:
/// N = 0.5·sqrt(total / (total + unseen)).
fn add_n_probs<T: Eq + Hash + Clone>(
    counts: &HashMap<T, u64>,
    total: u64,
    unseen_count: usize,
) -> (HashMap<T, f64>, f64) {
    let total_f = total as f64;
    let n = 0.5 * (total_f / (total_f + unseen_count as f64)).sqrt();
    let z = total_f + n * (counts.len() + unseen_count) as f64;
    let probs = counts
        .iter()
        .map(|(key, &count)| (key.clone(), (count as f64 + n) / z))
        .collect();
    (probs, n * unseen_count as f64 / z)
}

/// Least-squares line through (xs, ys).
fn linear_fit(xs: &[f64], ys: &[f64]) -> (f64, f64) {
    let count = xs.len() as f64;
    let mean_x = xs.iter().sum::<f64>() / count;
    let mean_y = ys.iter().sum::<f64>() / count;
    let mut cov = 0.0;
    let mut var = 0.0;
    for (&x, &y) in xs.iter().zip(ys) {
        cov += (x - mean_x) * (y - mean_y);
        var += (x - mean_x) * (x - mean_x);
    }
    let slope = if var == 0.0 { 0.0 } else { cov / var };
    (slope, mean_y - slope * mean_x)
}

/// A finalized, immutable smoothed distribution. Concurrent readers share it
/// freely; the backoff pointer is a lookup relation to another finalized
/// distribution, never an owning one.
#[derive(Debug, Clone)]
pub struct SmoothedDist<T: Eq + Hash> {
    probs: HashMap<T, f64>,
    unseen_factor: f64,
    backoff: Option<Arc<SmoothedDist<T>>>,
}

impl<T: Eq + Hash + Clone> SmoothedDist<T> {
    /// Probability of a key: the smoothed seen probability, or the scaled
    /// backoff probability for unseen keys, or 0 without a backoff.
    pub fn prob<Q>(&self, key: &Q) -> f64
    where
        T: std::borrow::Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        if let Some(&p) = self.probs.get(key) {
            return p;
        }
        match &self.backoff {
            Some(coarser) => coarser.prob(key) * self.unseen_factor,
            None => 0.0,
        }
    }

    /// Total probability mass assigned to seen keys.
    pub fn seen_mass(&self) -> f64 {
        self.probs.values().sum()
    }

    pub fn unseen_factor(&self) -> f64 {
        self.unseen_factor
    }
}

/// Serializable flat form of one table: probabilities plus the unseen scale.
/// Backoff wiring is structural and rebuilt on load.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TableData {
    probs: HashMap<String, f64>,
    unseen_factor: f64,
}

impl TableData {
    fn of(dist: &SmoothedDist<String>) -> Self {
        TableData {
            probs: dist.probs.clone(),
            unseen_factor: dist.unseen_factor,
        }
    }

    fn into_dist(self, backoff: Option<Arc<SmoothedDist<String>>>) -> SmoothedDist<String> {
        SmoothedDist {
            probs: self.probs,
            unseen_factor: self.unseen_factor,
            backoff,
        }
    }
}

type LabelDist = SmoothedDist<String>;

/// Tables conditioned on one side: the "rhs" of every lookup is the side the
/// direction points to.
#[derive(Debug)]
struct DirectionModel {
    pred_marginal: Arc<LabelDist>,
    pred_trans: HashMap<String, LabelDist>,
    arg_marginal: Arc<LabelDist>,
    arg_trans: HashMap<String, Arc<LabelDist>>,
    /// lhs roleset -> rhs roleset -> lhs label -> distribution over rhs labels.
    arg_trans_by_pred: HashMap<String, HashMap<String, HashMap<String, LabelDist>>>,
}

/// The full probability model: one [`DirectionModel`] per direction, built
/// fresh from a corpus of alignments each training round and immutable
/// afterward.
#[derive(Debug)]
pub struct AlignmentProb {
    forward: DirectionModel,
    backward: DirectionModel,
}

#[derive(Debug, Default)]
struct DirectionBuilder {
    pred_marginal: CountProb<String>,
    pred_trans: HashMap<String, CountProb<String>>,
    arg_marginal: CountProb<String>,
    arg_trans: HashMap<String, CountProb<String>>,
    arg_trans_by_pred: HashMap<String, HashMap<String, HashMap<String, CountProb<String>>>>,
}

impl DirectionBuilder {
    fn count_pred(&mut self, lhs_roleset: &str, rhs_roleset: &str) {
        self.pred_marginal.add_count(rhs_roleset.to_string());
        self.pred_trans
            .entry(lhs_roleset.to_string())
            .or_default()
            .add_count(rhs_roleset.to_string());
    }

    fn count_arg(&mut self, lhs_roleset: &str, rhs_roleset: &str, lhs_label: &str, rhs_label: &str) {
        self.arg_marginal.add_count(rhs_label.to_string());
        self.arg_trans
            .entry(lhs_label.to_string())
            .or_default()
            .add_count(rhs_label.to_string());
        self.arg_trans_by_pred
            .entry(lhs_roleset.to_string())
            .or_default()
            .entry(rhs_roleset.to_string())
            .or_default()
            .entry(lhs_label.to_string())
            .or_default()
            .add_count(rhs_label.to_string());
    }

    /// Finalize coarsest to finest so every backoff pointer is already frozen
    /// when its dependents need it.
    fn finalize(self, roleset_candidates: usize, label_candidates: usize) -> DirectionModel {
        let pred_marginal = Arc::new({
            let unseen = roleset_candidates.saturating_sub(self.pred_marginal.distinct());
            self.pred_marginal.finalize(unseen, None)
        });
        let pred_trans = self
            .pred_trans
            .into_iter()
            .map(|(roleset, counts)| {
                let unseen = roleset_candidates.saturating_sub(counts.distinct());
                (roleset, counts.finalize(unseen, Some(pred_marginal.clone())))
            })
            .collect();

        let arg_marginal = Arc::new({
            let unseen = label_candidates.saturating_sub(self.arg_marginal.distinct());
            self.arg_marginal.finalize(unseen, None)
        });
        let arg_trans: HashMap<String, Arc<LabelDist>> = self
            .arg_trans
            .into_iter()
            .map(|(label, counts)| {
                let unseen = label_candidates.saturating_sub(counts.distinct());
                (
                    label,
                    Arc::new(counts.finalize(unseen, Some(arg_marginal.clone()))),
                )
            })
            .collect();
        let arg_trans_by_pred = self
            .arg_trans_by_pred
            .into_iter()
            .map(|(lhs_roleset, by_rhs)| {
                let by_rhs = by_rhs
                    .into_iter()
                    .map(|(rhs_roleset, by_label)| {
                        let by_label = by_label
                            .into_iter()
                            .map(|(label, counts)| {
                                let unseen = label_candidates.saturating_sub(counts.distinct());
                                let backoff = arg_trans.get(&label).cloned();
                                (label, counts.finalize(unseen, backoff))
                            })
                            .collect();
                        (rhs_roleset, by_label)
                    })
                    .collect();
                (lhs_roleset, by_rhs)
            })
            .collect();

        DirectionModel {
            pred_marginal,
            pred_trans,
            arg_marginal,
            arg_trans,
            arg_trans_by_pred,
        }
    }
}

impl AlignmentProb {
    /// Build the full model from a corpus and its current alignments.
    ///
    /// Pass 1 accumulates counts from every matched predicate and argument
    /// pair and sizes the candidate sets from every instance observed in the
    /// corpus, aligned or not, so unseen denominators are accurate. Pass 2
    /// finalizes bottom-up.
    pub fn build(pairs: &[SentencePair], alignments: &[Vec<Alignment>]) -> AlignmentProb {
        let mut src_rolesets: HashSet<&str> = HashSet::new();
        let mut dst_rolesets: HashSet<&str> = HashSet::new();
        let mut src_labels: HashSet<&str> = HashSet::new();
        let mut dst_labels: HashSet<&str> = HashSet::new();
        for pair in pairs {
            for inst in &pair.src.predicates {
                src_rolesets.insert(&inst.roleset);
                for arg in &inst.args {
                    src_labels.insert(&arg.label);
                }
            }
            for inst in &pair.dst.predicates {
                dst_rolesets.insert(&inst.roleset);
                for arg in &inst.args {
                    dst_labels.insert(&arg.label);
                }
            }
        }

        let mut forward = DirectionBuilder::default();
        let mut backward = DirectionBuilder::default();
        for (pair, pair_alignments) in pairs.iter().zip(alignments) {
            for alignment in pair_alignments {
                let src_inst = &pair.src.predicates[alignment.src_index];
                let dst_inst = &pair.dst.predicates[alignment.dst_index];
                forward.count_pred(&src_inst.roleset, &dst_inst.roleset);
                backward.count_pred(&dst_inst.roleset, &src_inst.roleset);
                for arg_pair in &alignment.arg_pairs {
                    let src_label = &src_inst.args[arg_pair.src_arg].label;
                    let dst_label = &dst_inst.args[arg_pair.dst_arg].label;
                    forward.count_arg(&src_inst.roleset, &dst_inst.roleset, src_label, dst_label);
                    backward.count_arg(&dst_inst.roleset, &src_inst.roleset, dst_label, src_label);
                }
            }
        }

        AlignmentProb {
            forward: forward.finalize(dst_rolesets.len(), dst_labels.len()),
            backward: backward.finalize(src_rolesets.len(), src_labels.len()),
        }
    }

    fn model(&self, dir: Direction) -> &DirectionModel {
        match dir {
            Direction::SrcToDst => &self.forward,
            Direction::DstToSrc => &self.backward,
        }
    }

    /// P(rhs roleset | lhs roleset) in the given direction, falling through
    /// to the roleset marginal when the conditioning roleset was never seen
    /// in an alignment.
    pub fn pred_prob(&self, dir: Direction, lhs_roleset: &str, rhs_roleset: &str) -> f64 {
        let model = self.model(dir);
        match model.pred_trans.get(lhs_roleset) {
            Some(dist) => dist.prob(rhs_roleset),
            None => model.pred_marginal.prob(rhs_roleset),
        }
    }

    /// P(rhs label | lhs label, predicate pair): finest table first, then the
    /// label-conditioned table, then the label marginal.
    pub fn arg_prob(
        &self,
        dir: Direction,
        lhs_roleset: &str,
        rhs_roleset: &str,
        lhs_label: &str,
        rhs_label: &str,
    ) -> f64 {
        let model = self.model(dir);
        if let Some(dist) = model
            .arg_trans_by_pred
            .get(lhs_roleset)
            .and_then(|by_rhs| by_rhs.get(rhs_roleset))
            .and_then(|by_label| by_label.get(lhs_label))
        {
            return dist.prob(rhs_label);
        }
        if let Some(dist) = model.arg_trans.get(lhs_label) {
            return dist.prob(rhs_label);
        }
        model.arg_marginal.prob(rhs_label)
    }

    /// Flatten into the serializable form.
    pub fn to_data(&self) -> AlignmentProbData {
        AlignmentProbData {
            forward: DirectionData::of(&self.forward),
            backward: DirectionData::of(&self.backward),
        }
    }

    /// Rebuild from the serializable form, rewiring the backoff hierarchy.
    pub fn from_data(data: AlignmentProbData) -> AlignmentProb {
        AlignmentProb {
            forward: data.forward.into_model(),
            backward: data.backward.into_model(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct DirectionData {
    pred_marginal: TableData,
    pred_trans: HashMap<String, TableData>,
    arg_marginal: TableData,
    arg_trans: HashMap<String, TableData>,
    arg_trans_by_pred: HashMap<String, HashMap<String, HashMap<String, TableData>>>,
}

impl DirectionData {
    fn of(model: &DirectionModel) -> Self {
        DirectionData {
            pred_marginal: TableData::of(&model.pred_marginal),
            pred_trans: model
                .pred_trans
                .iter()
                .map(|(k, d)| (k.clone(), TableData::of(d)))
                .collect(),
            arg_marginal: TableData::of(&model.arg_marginal),
            arg_trans: model
                .arg_trans
                .iter()
                .map(|(k, d)| (k.clone(), TableData::of(d)))
                .collect(),
            arg_trans_by_pred: model
                .arg_trans_by_pred
                .iter()
                .map(|(lhs, by_rhs)| {
                    let by_rhs = by_rhs
                        .iter()
                        .map(|(rhs, by_label)| {
                            let by_label = by_label
                                .iter()
                                .map(|(label, d)| (label.clone(), TableData::of(d)))
                                .collect();
                            (rhs.clone(), by_label)
                        })
                        .collect();
                    (lhs.clone(), by_rhs)
                })
                .collect(),
        }
    }

    fn into_model(self) -> DirectionModel {
        let pred_marginal = Arc::new(self.pred_marginal.into_dist(None));
        let pred_trans = self
            .pred_trans
            .into_iter()
            .map(|(k, data)| (k, data.into_dist(Some(pred_marginal.clone()))))
            .collect();
        let arg_marginal = Arc::new(self.arg_marginal.into_dist(None));
        let arg_trans: HashMap<String, Arc<LabelDist>> = self
            .arg_trans
            .into_iter()
            .map(|(k, data)| (k, Arc::new(data.into_dist(Some(arg_marginal.clone())))))
            .collect();
        let arg_trans_by_pred = self
            .arg_trans_by_pred
            .into_iter()
            .map(|(lhs, by_rhs)| {
                let by_rhs = by_rhs
                    .into_iter()
                    .map(|(rhs, by_label)| {
                        let by_label = by_label
                            .into_iter()
                            .map(|(label, data)| {
                                let backoff = arg_trans.get(&label).cloned();
                                (label, data.into_dist(backoff))
                            })
                            .collect();
                        (rhs, by_label)
                    })
                    .collect();
                (lhs, by_rhs)
            })
            .collect();
        DirectionModel {
            pred_marginal,
            pred_trans,
            arg_marginal,
            arg_trans,
            arg_trans_by_pred,
        }
    }
}

/// Opaque persisted form of [`AlignmentProb`]; round-trips exactly.
#[derive(Debug, Serialize, Deserialize)]
pub struct AlignmentProbData {
    forward: DirectionData,
    backward: DirectionData,
}
