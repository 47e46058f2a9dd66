use crate::{Error, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub type DocId = u32;

/// Term -> occurrence count, for one document or one query.
pub type TermFrequencies = HashMap<String, u32>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocId,
    pub year: u32,
    pub title: String,
    pub authors: String,
    /// Length of the document's tf-idf vector. Holds the running sum of
    /// squared weights while the norm pass is in progress.
    pub norm: f64,
}

impl Document {
    pub fn new(id: DocId, year: u32, title: impl Into<String>, authors: impl Into<String>) -> Self {
        Self { id, year, title: title.into(), authors: authors.into(), norm: 0.0 }
    }

    pub fn with_norm(self, norm: f64) -> Self {
        Self { norm, ..self }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Posting {
    pub doc_id: DocId,
    /// Raw term frequency until the weighting pass, tf-idf afterwards.
    pub weight: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TermEntry {
    pub idf: f64,
    pub postings: Vec<Posting>, // sorted by doc_id
}

impl TermEntry {
    pub fn document_frequency(&self) -> usize {
        self.postings.len()
    }
}

/// Document table plus inverted index. Built once by [`crate::IndexBuilder`]
/// or [`crate::persist::load`] and read-only afterwards.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Index {
    docs: HashMap<DocId, Document>,
    terms: HashMap<String, TermEntry>,
}

impl Index {
    pub fn new() -> Self { Self::default() }

    pub(crate) fn from_parts(docs: HashMap<DocId, Document>, terms: HashMap<String, TermEntry>) -> Self {
        Self { docs, terms }
    }

    pub fn num_docs(&self) -> usize { self.docs.len() }

    pub fn num_terms(&self) -> usize { self.terms.len() }

    pub fn document(&self, id: DocId) -> Option<&Document> {
        self.docs.get(&id)
    }

    pub fn term(&self, term: &str) -> Option<&TermEntry> {
        self.terms.get(term)
    }

    pub fn documents(&self) -> impl Iterator<Item = &Document> {
        self.docs.values()
    }

    pub fn terms(&self) -> impl Iterator<Item = (&str, &TermEntry)> {
        self.terms.iter().map(|(t, e)| (t.as_str(), e))
    }

    /// Replace raw frequencies with tf-idf weights, idf = log2(N / df).
    ///
    /// Expects every posting to still hold a raw frequency; running it twice
    /// compounds the idf factor.
    pub(crate) fn apply_tf_idf(&mut self) -> Result<()> {
        if self.docs.is_empty() {
            return Err(Error::EmptyCollection);
        }
        let n = self.docs.len() as f64;
        self.terms.par_iter_mut().for_each(|(_, entry)| {
            // df >= 1: a term entry only exists once a posting was appended
            let idf = (n / entry.postings.len() as f64).log2();
            entry.idf = idf;
            for posting in entry.postings.iter_mut() {
                posting.weight *= idf;
            }
        });
        Ok(())
    }

    /// Set every document's norm to the length of its weighted vector.
    /// Must run after [`Index::apply_tf_idf`] has finished for all terms.
    pub(crate) fn compute_norms(&mut self) {
        let sums: HashMap<DocId, f64> = self
            .terms
            .par_iter()
            .fold(HashMap::new, |mut acc: HashMap<DocId, f64>, (_, entry)| {
                for p in &entry.postings {
                    *acc.entry(p.doc_id).or_insert(0.0) += p.weight * p.weight;
                }
                acc
            })
            .reduce(HashMap::new, |mut a, b| {
                for (doc_id, s) in b {
                    *a.entry(doc_id).or_insert(0.0) += s;
                }
                a
            });

        for doc in self.docs.values_mut() {
            doc.norm = 0.0;
        }
        for (doc_id, s) in sums {
            if let Some(doc) = self.docs.get_mut(&doc_id) {
                doc.norm += s;
            }
        }
        self.docs.par_iter_mut().for_each(|(_, doc)| doc.norm = doc.norm.sqrt());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_index() -> Index {
        let mut docs = HashMap::new();
        for id in 1..=4 {
            docs.insert(id, Document::new(id, 74, format!("t{id}"), format!("a{id}")));
        }
        let entry = |postings: &[(DocId, f64)]| TermEntry {
            idf: 0.0,
            postings: postings.iter().map(|&(doc_id, weight)| Posting { doc_id, weight }).collect(),
        };
        let mut terms = HashMap::new();
        terms.insert("a".to_string(), entry(&[(1, 3.0), (2, 2.0), (3, 2.0)]));
        terms.insert("b".to_string(), entry(&[(1, 1.0), (4, 2.0)]));
        terms.insert("c".to_string(), entry(&[(2, 1.0)]));
        Index::from_parts(docs, terms)
    }

    #[test]
    fn weighting_uses_log2_idf() {
        let mut idx = raw_index();
        idx.apply_tf_idf().unwrap();
        let a = idx.term("a").unwrap();
        let expected = (4.0f64 / 3.0).log2();
        assert!((a.idf - expected).abs() < 1e-12);
        assert!((a.postings[0].weight - 3.0 * expected).abs() < 1e-12);
        let c = idx.term("c").unwrap();
        assert!((c.idf - 2.0).abs() < 1e-12);
        assert!((c.postings[0].weight - 2.0).abs() < 1e-12);
    }

    #[test]
    fn norms_sum_weighted_postings() {
        let mut idx = raw_index();
        idx.apply_tf_idf().unwrap();
        idx.compute_norms();
        let idf_a = (4.0f64 / 3.0).log2();
        // doc 2: a x2, c x1
        let expected = ((2.0 * idf_a).powi(2) + 2.0f64.powi(2)).sqrt();
        assert!((idx.document(2).unwrap().norm - expected).abs() < 1e-12);
        // doc 4: b x2, idf(b) = 1
        assert!((idx.document(4).unwrap().norm - 2.0).abs() < 1e-12);
    }

    #[test]
    fn document_without_postings_keeps_zero_norm() {
        let mut idx = raw_index();
        idx.docs.insert(9, Document::new(9, 80, "lonely", ""));
        idx.apply_tf_idf().unwrap();
        idx.compute_norms();
        assert_eq!(idx.document(9).unwrap().norm, 0.0);
    }

    #[test]
    fn empty_collection_cannot_be_weighted() {
        let mut idx = Index::new();
        assert!(matches!(idx.apply_tf_idf(), Err(Error::EmptyCollection)));
    }

    #[test]
    fn with_norm_only_changes_norm() {
        let doc = Document::new(3, 75, "title", "someone").with_norm(1.5);
        assert_eq!(doc.id, 3);
        assert_eq!(doc.title, "title");
        assert_eq!(doc.norm, 1.5);
    }
}
