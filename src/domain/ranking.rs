// ============================================================
// Layer 3 — Retrieval Ranking
// ============================================================
// Standard re-ID retrieval metrics over a distance matrix:
//
//   CMC rank-k — fraction of queries whose first correct match
//                appears within the k nearest gallery images
//   mAP        — mean over queries of average precision
//
// Queries with no matching identity in the gallery are skipped,
// as they contribute no defined precision.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EvalReport {
    pub rank1: f64,
    pub rank5: f64,
    pub map:   f64,
    /// Queries that had at least one true match.
    pub valid_queries: usize,
}

/// `dist` is row-major `[query.len(), gallery.len()]`; smaller is closer.
pub fn rank_metrics(dist: &[f32], query_ids: &[usize], gallery_ids: &[usize]) -> EvalReport {
    let n_gallery = gallery_ids.len();
    debug_assert_eq!(dist.len(), query_ids.len() * n_gallery);

    let mut hits1 = 0usize;
    let mut hits5 = 0usize;
    let mut ap_sum = 0.0f64;
    let mut valid  = 0usize;

    for (q, &qid) in query_ids.iter().enumerate() {
        let row = &dist[q * n_gallery..(q + 1) * n_gallery];
        let mut order: Vec<usize> = (0..n_gallery).collect();
        order.sort_by(|&a, &b| row[a].total_cmp(&row[b]));

        let matches: Vec<bool> = order.iter().map(|&g| gallery_ids[g] == qid).collect();
        let n_matches = matches.iter().filter(|&&m| m).count();
        if n_matches == 0 {
            continue;
        }
        valid += 1;

        if let Some(first) = matches.iter().position(|&m| m) {
            if first < 1 { hits1 += 1; }
            if first < 5 { hits5 += 1; }
        }

        let mut found = 0usize;
        let mut precision_sum = 0.0f64;
        for (rank, &is_match) in matches.iter().enumerate() {
            if is_match {
                found += 1;
                precision_sum += found as f64 / (rank + 1) as f64;
            }
        }
        ap_sum += precision_sum / n_matches as f64;
    }

    if valid == 0 {
        return EvalReport::default();
    }
    EvalReport {
        rank1: hits1 as f64 / valid as f64,
        rank5: hits5 as f64 / valid as f64,
        map:   ap_sum / valid as f64,
        valid_queries: valid,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_perfect_retrieval() {
        // two queries, gallery ordered so the true match is nearest
        let dist = vec![
            0.1, 0.9, 0.8,
            0.9, 0.2, 0.1,
        ];
        let report = rank_metrics(&dist, &[0, 2], &[0, 1, 2]);
        assert_eq!(report.valid_queries, 2);
        assert!((report.rank1 - 1.0).abs() < 1e-9);
        assert!((report.map - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_average_precision_with_late_match() {
        // matches at ranks 1 and 3 → AP = (1/1 + 2/3) / 2
        let dist = vec![0.1, 0.2, 0.3];
        let report = rank_metrics(&dist, &[7], &[7, 1, 7]);
        assert!((report.rank1 - 1.0).abs() < 1e-9);
        assert!((report.map - (1.0 + 2.0 / 3.0) / 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_query_without_match_is_skipped() {
        let dist = vec![0.5, 0.1, 0.4, 0.3];
        let report = rank_metrics(&dist, &[3, 1], &[1, 2]);
        assert_eq!(report.valid_queries, 1);
        // query 1 finds its match at rank 2
        assert_eq!(report.rank1, 0.0);
        assert_eq!(report.rank5, 1.0);
        assert!((report.map - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_empty_gallery() {
        let report = rank_metrics(&[], &[0, 1], &[]);
        assert_eq!(report, EvalReport::default());
    }
}
