use crate::{DocId, Document, Index, TermFrequencies};
use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredDocument<'a> {
    pub score: f64,
    pub document: &'a Document,
}

/// Ordered so that the better candidate is the greater one: higher score,
/// then lower document id.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    score: f64,
    doc_id: DocId,
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .total_cmp(&other.score)
            .then_with(|| other.doc_id.cmp(&self.doc_id))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

/// Bounded min-heap keeping the `k` best (score, doc) pairs seen so far.
pub struct TopK {
    k: usize,
    heap: BinaryHeap<Reverse<Candidate>>,
}

impl TopK {
    pub fn new(k: usize) -> Self {
        Self { k, heap: BinaryHeap::with_capacity(k.saturating_add(1).min(1 << 16)) }
    }

    /// Returns true if the candidate is now among the best `k`.
    pub fn offer(&mut self, doc_id: DocId, score: f64) -> bool {
        let candidate = Candidate { score, doc_id };
        if self.heap.len() < self.k {
            self.heap.push(Reverse(candidate));
            return true;
        }
        let beats_worst = self.heap.peek().is_some_and(|Reverse(worst)| candidate > *worst);
        if !beats_worst {
            return false;
        }
        self.heap.pop();
        self.heap.push(Reverse(candidate));
        true
    }

    pub fn len(&self) -> usize { self.heap.len() }

    pub fn is_empty(&self) -> bool { self.heap.is_empty() }

    /// Best first.
    pub fn into_sorted_vec(mut self) -> Vec<(DocId, f64)> {
        let mut out = Vec::with_capacity(self.heap.len());
        while let Some(Reverse(c)) = self.heap.pop() {
            out.push((c.doc_id, c.score));
        }
        out.reverse();
        out
    }
}

/// Sum `weight * f * idf` per document over the query terms found in the index.
/// Terms missing from the index are logged and skipped.
pub fn accumulate(query: &TermFrequencies, index: &Index) -> HashMap<DocId, f64> {
    let mut terms: Vec<(&String, &u32)> = query.iter().collect();
    terms.sort_unstable();

    let mut accumulators: HashMap<DocId, f64> = HashMap::new();
    for (term, &freq) in terms {
        let Some(entry) = index.term(term) else {
            tracing::warn!(term = %term, "term not in index, ignoring");
            continue;
        };
        let query_weight = freq as f64 * entry.idf;
        for p in &entry.postings {
            *accumulators.entry(p.doc_id).or_insert(0.0) += p.weight * query_weight;
        }
    }
    accumulators
}

/// Rank documents against the query and return at most `k` of them, best first.
///
/// Scores are the accumulated dot product divided by the document norm; the
/// query norm is left out since it scales every candidate equally. Documents
/// whose norm is zero carry only zero weights and are never ranked. Equal
/// scores are ordered by ascending document id.
pub fn rank<'a>(query: &TermFrequencies, index: &'a Index, k: usize) -> Vec<ScoredDocument<'a>> {
    if k == 0 {
        return Vec::new();
    }
    let accumulators = accumulate(query, index);

    let mut top = TopK::new(k);
    for (doc_id, acc) in accumulators {
        match index.document(doc_id) {
            Some(doc) if doc.norm > 0.0 => {
                top.offer(doc_id, acc / doc.norm);
            }
            _ => {}
        }
    }

    top.into_sorted_vec()
        .into_iter()
        .filter_map(|(doc_id, score)| {
            let document = index.document(doc_id)?;
            Some(ScoredDocument { score, document })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build_index;

    fn freqs(pairs: &[(&str, u32)]) -> TermFrequencies {
        pairs.iter().map(|&(t, f)| (t.to_string(), f)).collect()
    }

    fn toy_index() -> Index {
        build_index(vec![
            Ok((Document::new(1, 74, "A", ""), freqs(&[("cat", 2)]))),
            Ok((Document::new(2, 74, "B", ""), freqs(&[("cat", 1), ("dog", 1)]))),
        ])
        .unwrap()
    }

    /// Small deterministic generator so the selection check covers many shapes.
    fn lcg(state: &mut u64) -> u64 {
        *state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        *state >> 33
    }

    #[test]
    fn dog_query_ranks_only_b() {
        let index = toy_index();
        let results = rank(&freqs(&[("dog", 1)]), &index, 10);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].document.id, 2);
        assert!(results[0].score > 0.0);
    }

    #[test]
    fn zero_norm_documents_are_never_ranked() {
        let index = toy_index();
        let results = rank(&freqs(&[("cat", 1), ("dog", 1)]), &index, 10);
        assert!(results.iter().all(|r| r.document.id != 1));
        assert!(results.iter().all(|r| r.score.is_finite()));
    }

    #[test]
    fn unknown_terms_are_skipped() {
        let index = toy_index();
        assert!(rank(&freqs(&[("zebra", 3)]), &index, 5).is_empty());
        let results = rank(&freqs(&[("zebra", 3), ("dog", 1)]), &index, 5);
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn zero_k_returns_nothing() {
        let index = toy_index();
        assert!(rank(&freqs(&[("dog", 1)]), &index, 0).is_empty());
    }

    #[test]
    fn ties_break_on_ascending_doc_id() {
        let mut top = TopK::new(3);
        for id in [9, 4, 7, 1, 5] {
            top.offer(id, 1.0);
        }
        let ids: Vec<DocId> = top.into_sorted_vec().into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![1, 4, 5]);
    }

    #[test]
    fn bounded_selection_matches_full_sort() {
        let mut state = 42u64;
        for round in 0..200 {
            let n = (lcg(&mut state) % 60) as usize;
            let k = 1 + (lcg(&mut state) % 25) as usize;
            let accumulators: HashMap<DocId, f64> = (0..n)
                .map(|i| (i as DocId * 3 + round, (lcg(&mut state) % 8) as f64 / 4.0))
                .collect();

            let mut top = TopK::new(k);
            for (&id, &score) in &accumulators {
                top.offer(id, score);
            }
            assert!(top.len() <= k);

            let mut sorted: Vec<(DocId, f64)> = accumulators.into_iter().collect();
            sorted.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
            sorted.truncate(k);

            assert_eq!(top.into_sorted_vec(), sorted);
        }
    }

    #[test]
    fn results_are_descending() {
        let records = (1..=30u32).map(|id| {
            let f = freqs(&[("alpha", id % 4 + 1), ("beta", u32::from(id % 3 == 0)), ("gamma", u32::from(id % 5 == 0) * 2)]);
            Ok((Document::new(id, 75, format!("d{id}"), ""), f))
        });
        let index = build_index(records).unwrap();
        let results = rank(&freqs(&[("beta", 1), ("gamma", 2)]), &index, 8);
        assert!(results.len() <= 8);
        for pair in results.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }
}
