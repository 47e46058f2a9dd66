//! Precision/recall evaluation of a ranking against known relevant documents.
//!
//! Curves are explicit ordered sequences of [`RecallPoint`]s: the raw curve has
//! one point per relevant hit in rank order, the interpolated curve has one
//! point per standard recall level 0.0, 0.1, ..., 1.0.

use crate::{DocId, Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Number of standard recall levels in an interpolated curve.
pub const RECALL_LEVELS: usize = 11;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RecallPoint {
    pub precision: f64,
    pub recall: f64,
}

impl RecallPoint {
    pub fn new(precision: f64, recall: f64) -> Self {
        Self { precision, recall }
    }
}

fn recall_level(i: usize) -> f64 {
    i as f64 / 10.0
}

/// Walk `ranked` and emit a point at every relevant hit, plus P@k.
///
/// A document id repeated in `ranked` takes up a rank each time but only
/// counts as a hit the first time, so recall never exceeds 1.0.
///
/// P@k divides the relevant count at rank `k` by `k`. When fewer than `k`
/// documents were ranked the count at the last rank is still divided by `k`,
/// so short rankings are penalised.
pub fn recall_points_and_precision_at_k(
    relevant: &BTreeSet<DocId>,
    ranked: &[DocId],
    k: usize,
) -> Result<(Vec<RecallPoint>, f64)> {
    if relevant.is_empty() {
        return Err(Error::InvalidQuery);
    }
    let total = relevant.len() as f64;
    let mut points = Vec::new();
    let mut found = BTreeSet::new();
    let mut hits = 0usize;
    let mut hits_at_k = 0usize;

    for (i, doc_id) in ranked.iter().enumerate() {
        let position = i + 1;
        if relevant.contains(doc_id) && found.insert(*doc_id) {
            hits += 1;
            points.push(RecallPoint::new(hits as f64 / position as f64, hits as f64 / total));
        }
        if position <= k {
            hits_at_k = hits;
        }
    }

    let precision_at_k = if k == 0 { 0.0 } else { hits_at_k as f64 / k as f64 };
    Ok((points, precision_at_k))
}

/// Interpolate a raw curve onto the 11 standard recall levels.
///
/// The precision at level r is the best precision among points with recall
/// >= r. Once a level has no such point, it and every later level get 0.0.
/// An empty curve interpolates to an empty curve.
pub fn interpolate_recall_points(points: &[RecallPoint]) -> Vec<RecallPoint> {
    if points.is_empty() {
        return Vec::new();
    }
    let mut out = Vec::with_capacity(RECALL_LEVELS);
    for i in 0..RECALL_LEVELS {
        let level = recall_level(i);
        let best = points
            .iter()
            .filter(|p| p.recall >= level)
            .map(|p| p.precision)
            .max_by(f64::total_cmp);
        match best {
            Some(precision) => out.push(RecallPoint::new(precision, level)),
            None => {
                out.extend((i..RECALL_LEVELS).map(|j| RecallPoint::new(0.0, recall_level(j))));
                break;
            }
        }
    }
    out
}

/// Mean of the precision values; 0.0 for an empty curve.
pub fn calculate_map(points: &[RecallPoint]) -> f64 {
    if points.is_empty() {
        return 0.0;
    }
    points.iter().map(|p| p.precision).sum::<f64>() / points.len() as f64
}

/// Elementwise mean precision over interpolated curves.
///
/// Every curve counts towards the mean; levels a curve lacks (an empty curve)
/// contribute 0.0. No curves at all gives an all-zero curve.
pub fn average_recall_curves(curves: &[Vec<RecallPoint>]) -> Vec<RecallPoint> {
    let mut sums = [0.0f64; RECALL_LEVELS];
    for curve in curves {
        for (sum, point) in sums.iter_mut().zip(curve) {
            *sum += point.precision;
        }
    }
    let n = curves.len().max(1) as f64;
    sums.iter()
        .enumerate()
        .map(|(i, sum)| RecallPoint::new(sum / n, recall_level(i)))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryEvaluation {
    /// Interpolated curve: 11 points, or none if nothing relevant was ranked.
    pub recall_points: Vec<RecallPoint>,
    pub precision_at_k: f64,
    pub map: f64,
}

/// Evaluate one ranking. MAP is the mean interpolated precision, leaving out
/// the recall 0.0 anchor.
pub fn evaluate_ranking(relevant: &BTreeSet<DocId>, ranked: &[DocId], k: usize) -> Result<QueryEvaluation> {
    let (points, precision_at_k) = recall_points_and_precision_at_k(relevant, ranked, k)?;
    let recall_points = interpolate_recall_points(&points);
    let map = calculate_map(recall_points.get(1..).unwrap_or_default());
    Ok(QueryEvaluation { recall_points, precision_at_k, map })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationSummary {
    pub queries: usize,
    pub mean_precision_at_k: f64,
    pub mean_map: f64,
    pub mean_seconds: f64,
    pub recall_points: Vec<RecallPoint>,
}

fn mean(values: impl ExactSizeIterator<Item = f64>) -> f64 {
    let n = values.len();
    if n == 0 {
        0.0
    } else {
        values.sum::<f64>() / n as f64
    }
}

/// Aggregate a batch: mean P@k, mean MAP, mean time per query (from
/// `seconds`, one entry per query) and the averaged interpolated curve.
pub fn summarize(evaluations: &[QueryEvaluation], seconds: &[f64]) -> EvaluationSummary {
    let curves: Vec<Vec<RecallPoint>> = evaluations.iter().map(|e| e.recall_points.clone()).collect();
    EvaluationSummary {
        queries: evaluations.len(),
        mean_precision_at_k: mean(evaluations.iter().map(|e| e.precision_at_k)),
        mean_map: mean(evaluations.iter().map(|e| e.map)),
        mean_seconds: mean(seconds.iter().copied()),
        recall_points: average_recall_curves(&curves),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn curve(pairs: &[(f64, f64)]) -> Vec<RecallPoint> {
        pairs.iter().map(|&(p, r)| RecallPoint::new(p, r)).collect()
    }

    fn relevant(ids: &[DocId]) -> BTreeSet<DocId> {
        ids.iter().copied().collect()
    }

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-9, "{a} != {b}");
    }

    #[test]
    fn interpolation_three_relevant() {
        let got = interpolate_recall_points(&curve(&[(0.33, 0.33), (0.25, 0.66), (0.2, 1.0)]));
        let expected = curve(&[
            (0.33, 0.0), (0.33, 0.1), (0.33, 0.2), (0.33, 0.3),
            (0.25, 0.4), (0.25, 0.5), (0.25, 0.6),
            (0.2, 0.7), (0.2, 0.8), (0.2, 0.9), (0.2, 1.0),
        ]);
        assert_eq!(got, expected);
    }

    #[test]
    fn interpolation_fills_tail_with_zero() {
        let got = interpolate_recall_points(&curve(&[(1.0, 0.1), (0.66, 0.2), (0.5, 0.3), (0.4, 0.4), (0.33, 0.5)]));
        let expected = curve(&[
            (1.0, 0.0), (1.0, 0.1), (0.66, 0.2), (0.5, 0.3), (0.4, 0.4), (0.33, 0.5),
            (0.0, 0.6), (0.0, 0.7), (0.0, 0.8), (0.0, 0.9), (0.0, 1.0),
        ]);
        assert_eq!(got, expected);
    }

    #[test]
    fn interpolation_of_empty_curve_is_empty() {
        assert!(interpolate_recall_points(&[]).is_empty());
    }

    #[test]
    fn interpolated_curve_is_non_increasing() {
        let got = interpolate_recall_points(&curve(&[(0.5, 0.25), (0.8, 0.5), (0.3, 0.75), (0.4, 1.0)]));
        assert_eq!(got.len(), RECALL_LEVELS);
        for (i, p) in got.iter().enumerate() {
            assert_eq!(p.recall, i as f64 / 10.0);
        }
        for pair in got.windows(2) {
            assert!(pair[0].precision >= pair[1].precision);
        }
    }

    #[test]
    fn map_of_empty_and_single() {
        assert_eq!(calculate_map(&[]), 0.0);
        assert_eq!(calculate_map(&curve(&[(0.7, 0.4)])), 0.7);
        assert_close(calculate_map(&curve(&[(1.0, 0.5), (0.5, 1.0)])), 0.75);
    }

    #[test]
    fn recall_points_only_at_relevant_hits() {
        let (points, p_at_k) = recall_points_and_precision_at_k(&relevant(&[2, 5, 9]), &[2, 3, 5, 7, 8], 4).unwrap();
        assert_eq!(points.len(), 2);
        assert_close(points[0].precision, 1.0);
        assert_close(points[0].recall, 1.0 / 3.0);
        assert_close(points[1].precision, 2.0 / 3.0);
        assert_close(points[1].recall, 2.0 / 3.0);
        assert_close(p_at_k, 0.5);
    }

    #[test]
    fn recall_reaches_one_when_all_relevant_ranked() {
        let (points, _) = recall_points_and_precision_at_k(&relevant(&[1, 4]), &[4, 2, 1], 10).unwrap();
        let recalls: Vec<f64> = points.iter().map(|p| p.recall).collect();
        assert_eq!(recalls, vec![0.5, 1.0]);
    }

    #[test]
    fn repeated_ids_count_once() {
        let (points, p_at_k) = recall_points_and_precision_at_k(&relevant(&[1]), &[1, 1], 10).unwrap();
        assert_eq!(points, vec![RecallPoint::new(1.0, 1.0)]);
        assert_close(p_at_k, 0.1);

        let (points, _) = recall_points_and_precision_at_k(&relevant(&[1, 2]), &[1, 1, 2, 2], 10).unwrap();
        let recalls: Vec<f64> = points.iter().map(|p| p.recall).collect();
        assert_eq!(recalls, vec![0.5, 1.0]);
        // the duplicate still occupies rank 2
        assert_close(points[1].precision, 2.0 / 3.0);
    }

    #[test]
    fn short_ranking_still_divides_by_k() {
        let (_, p_at_k) = recall_points_and_precision_at_k(&relevant(&[1, 2]), &[1, 2, 3], 10).unwrap();
        assert_close(p_at_k, 0.2);
        let (_, p_at_k) = recall_points_and_precision_at_k(&relevant(&[1]), &[], 10).unwrap();
        assert_eq!(p_at_k, 0.0);
    }

    #[test]
    fn empty_relevant_set_is_invalid() {
        let err = recall_points_and_precision_at_k(&BTreeSet::new(), &[1, 2], 10);
        assert!(matches!(err, Err(Error::InvalidQuery)));
    }

    #[test]
    fn averaging_two_curves() {
        let a = interpolate_recall_points(&curve(&[(0.33, 0.33), (0.25, 0.66), (0.2, 1.0)]));
        let b = interpolate_recall_points(&curve(&[(1.0, 0.1), (0.66, 0.2), (0.5, 0.3), (0.4, 0.4), (0.33, 0.5)]));
        let avg = average_recall_curves(&[a, b]);
        let expected = [0.665, 0.665, 0.495, 0.415, 0.325, 0.29, 0.125, 0.1, 0.1, 0.1, 0.1];
        assert_eq!(avg.len(), RECALL_LEVELS);
        for (i, (p, e)) in avg.iter().zip(expected).enumerate() {
            assert_close(p.precision, e);
            assert_eq!(p.recall, i as f64 / 10.0);
        }
    }

    #[test]
    fn empty_curve_counts_as_zero_in_average() {
        let full = vec![RecallPoint::new(1.0, 0.0); RECALL_LEVELS];
        let avg = average_recall_curves(&[full, Vec::new()]);
        assert!(avg.iter().all(|p| (p.precision - 0.5).abs() < 1e-12));
    }

    #[test]
    fn evaluate_skips_recall_zero_anchor() {
        // relevant at ranks 1 and 4 out of two relevant docs
        let eval = evaluate_ranking(&relevant(&[10, 40]), &[10, 20, 30, 40], 10).unwrap();
        assert_eq!(eval.recall_points.len(), RECALL_LEVELS);
        // levels 0.1..=0.5 take 1.0, levels 0.6..=1.0 take 0.5
        assert_close(eval.map, 0.75);
        assert_close(eval.precision_at_k, 0.2);
    }

    #[test]
    fn evaluate_without_hits() {
        let eval = evaluate_ranking(&relevant(&[99]), &[1, 2, 3], 10).unwrap();
        assert!(eval.recall_points.is_empty());
        assert_eq!(eval.map, 0.0);
        assert_eq!(eval.precision_at_k, 0.0);
    }

    #[test]
    fn summary_of_empty_batch() {
        let s = summarize(&[], &[]);
        assert_eq!(s.queries, 0);
        assert_eq!(s.mean_map, 0.0);
        assert_eq!(s.mean_seconds, 0.0);
        assert_eq!(s.recall_points.len(), RECALL_LEVELS);
    }

    #[test]
    fn summary_means() {
        let a = evaluate_ranking(&relevant(&[1]), &[1], 10).unwrap();
        let b = evaluate_ranking(&relevant(&[1]), &[2], 10).unwrap();
        let s = summarize(&[a, b], &[0.25, 0.75]);
        assert_eq!(s.queries, 2);
        assert_close(s.mean_precision_at_k, 0.05);
        assert_close(s.mean_map, 0.5);
        assert_close(s.mean_seconds, 0.5);
        assert_close(s.recall_points[10].precision, 0.5);
    }
}
