use crate::index::TermEntry;
use crate::{DocId, Document, Error, Index, Posting, Result, TermFrequencies};
use parking_lot::Mutex;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

const SHARDS: usize = 16;

/// Collects raw postings from many ingestion threads, then weights them.
///
/// Terms are spread over independently locked shards so documents that share
/// vocabulary do not serialize on a single lock. Nothing is visible as an
/// [`Index`] until [`IndexBuilder::finish`] has run both weighting passes.
pub struct IndexBuilder {
    docs: Mutex<HashMap<DocId, Document>>,
    shards: Vec<Mutex<HashMap<String, Vec<Posting>>>>,
}

impl Default for IndexBuilder {
    fn default() -> Self { Self::new() }
}

impl IndexBuilder {
    pub fn new() -> Self {
        Self {
            docs: Mutex::new(HashMap::new()),
            shards: (0..SHARDS).map(|_| Mutex::new(HashMap::new())).collect(),
        }
    }

    fn shard(&self, term: &str) -> &Mutex<HashMap<String, Vec<Posting>>> {
        let mut hasher = DefaultHasher::new();
        term.hash(&mut hasher);
        &self.shards[hasher.finish() as usize % SHARDS]
    }

    /// Record a document and append one raw-frequency posting per term.
    pub fn add_document(&self, doc: Document, freqs: &TermFrequencies) -> Result<()> {
        let doc_id = doc.id;
        {
            let mut docs = self.docs.lock();
            if docs.contains_key(&doc_id) {
                return Err(Error::DuplicateDocument(doc_id));
            }
            docs.insert(doc_id, doc.with_norm(0.0));
        }
        for (term, &freq) in freqs {
            if freq == 0 {
                continue;
            }
            self.shard(term)
                .lock()
                .entry(term.clone())
                .or_default()
                .push(Posting { doc_id, weight: freq as f64 });
        }
        Ok(())
    }

    pub fn num_docs(&self) -> usize {
        self.docs.lock().len()
    }

    /// Merge the shards and run the idf pass followed by the norm pass.
    pub fn finish(self) -> Result<Index> {
        let docs = self.docs.into_inner();
        if docs.is_empty() {
            return Err(Error::EmptyCollection);
        }

        let mut terms = HashMap::new();
        for shard in self.shards {
            for (term, mut postings) in shard.into_inner() {
                postings.sort_unstable_by_key(|p| p.doc_id);
                terms.insert(term, TermEntry { idf: 0.0, postings });
            }
        }
        tracing::info!(num_docs = docs.len(), num_terms = terms.len(), "ingested documents");

        let mut index = Index::from_parts(docs, terms);
        index.apply_tf_idf()?;
        tracing::debug!("tf-idf weighting complete");
        index.compute_norms();
        tracing::info!("index weighting complete");
        Ok(index)
    }
}

/// Build an index from parsed records in a single pass. The first record
/// error aborts the build.
pub fn build_index<I>(records: I) -> Result<Index>
where
    I: IntoIterator<Item = Result<(Document, TermFrequencies)>>,
{
    let builder = IndexBuilder::new();
    for record in records {
        let (doc, freqs) = record?;
        builder.add_document(doc, &freqs)?;
    }
    builder.finish()
}
