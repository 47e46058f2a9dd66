//! Vector-space retrieval over a fixed document collection: tf-idf indexing,
//! accumulator ranking and precision/recall evaluation.

pub mod collection;
pub mod error;
pub mod eval;
pub mod index;
pub mod indexer;
pub mod persist;
pub mod rank;
pub mod tokenizer;

pub use error::{Error, Result};
pub use index::{DocId, Document, Index, Posting, TermEntry, TermFrequencies};
pub use indexer::{build_index, IndexBuilder};
pub use rank::{rank, ScoredDocument};
