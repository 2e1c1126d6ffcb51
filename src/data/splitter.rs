// ============================================================
// Layer 4 — Query / Gallery Splitter
// ============================================================
// Retrieval evaluation needs two disjoint sets drawn from the
// same identities:
//   - query:   the images we search with
//   - gallery: the images we search in
//
// For every identity the first `query_per_id` crops become
// queries and the rest go to the gallery. Identities with only
// one crop go entirely to the gallery; a query with no true
// match in the gallery carries no signal.

use crate::data::dataset::ReidSample;

pub fn split_query_gallery(
    samples:      Vec<ReidSample>,
    query_per_id: usize,
) -> (Vec<ReidSample>, Vec<ReidSample>) {
    let mut counts: std::collections::HashMap<usize, usize> = Default::default();
    for s in &samples {
        *counts.entry(s.label).or_default() += 1;
    }

    let mut seen: std::collections::HashMap<usize, usize> = Default::default();
    let mut query   = Vec::new();
    let mut gallery = Vec::new();

    for s in samples {
        let total = counts[&s.label];
        let taken = seen.entry(s.label).or_default();
        // leave at least one crop of each identity in the gallery
        let quota = query_per_id.min(total.saturating_sub(1));
        if *taken < quota {
            *taken += 1;
            query.push(s);
        } else {
            gallery.push(s);
        }
    }

    tracing::debug!(
        "Evaluation split: {} query, {} gallery",
        query.len(),
        gallery.len()
    );

    (query, gallery)
}
