use crate::{Error, Result, TermFrequencies};
use lazy_static::lazy_static;
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashSet;
use std::hash::{Hash, Hasher};
use std::fs;
use std::path::Path;
use unicode_normalization::UnicodeNormalization;

lazy_static! {
    static ref RE: Regex = Regex::new(r"[a-zA-Z']+").expect("valid regex");
    static ref STEMMER: Stemmer = Stemmer::create(Algorithm::English);
    static ref STOPWORDS: HashSet<&'static str> = {
        let words: &[&str] = &[
            "a","about","above","after","again","against","all","am","an","and","any","are","aren't","as","at",
            "be","because","been","before","being","below","between","both","but","by",
            "can","can't","cannot","could","couldn't",
            "did","didn't","do","does","doesn't","doing","don't","down","during",
            "each","few","for","from","further",
            "had","hadn't","has","hasn't","have","haven't","having","he","he'd","he'll","he's","her","here","here's","hers","herself","him","himself","his","how","how's",
            "i","i'd","i'll","i'm","i've","if","in","into","is","isn't","it","it's","its","itself",
            "let's","me","more","most","mustn't","my","myself",
            "no","nor","not","of","off","on","once","only","or","other","ought","our","ours","ourselves","out","over","own",
            "same","she","she'd","she'll","she's","should","shouldn't","so","some","such",
            "than","that","that's","the","their","theirs","them","themselves","then","there","there's","these","they","they'd","they'll","they're","they've","this","those","through","to","too",
            "under","until","up","very",
            "was","wasn't","we","we'd","we'll","we're","we've","were","weren't","what","what's","when","when's","where","where's","which","while","who","who's","whom","why","why's","with","won't","would","wouldn't",
            "you","you'd","you'll","you're","you've","your","yours","yourself","yourselves"
        ];
        words.iter().copied().collect()
    };
}

/// Splits text into lower-cased terms with stop words removed.
///
/// The same instance must serve indexing and querying, otherwise query terms
/// will not line up with the indexed vocabulary.
#[derive(Debug, Clone)]
pub struct Tokenizer {
    stopwords: HashSet<String>,
    stem: bool,
}

impl Default for Tokenizer {
    fn default() -> Self { Self::english() }
}

impl Tokenizer {
    /// Built-in English stop list, no stemming.
    pub fn english() -> Self {
        Self::with_stopwords(STOPWORDS.iter().map(|w| w.to_string()))
    }

    pub fn with_stopwords<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let stopwords = words.into_iter().map(|w| w.as_ref().to_lowercase()).collect();
        Self { stopwords, stem: false }
    }

    /// Stop words separated by any whitespace; case is ignored.
    pub fn from_stopword_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let tokenizer = Self::with_stopwords(text.split_whitespace());
        tracing::debug!(path = %path.display(), count = tokenizer.stopwords.len(), "loaded stop words");
        Ok(tokenizer)
    }

    pub fn stemming(mut self, on: bool) -> Self {
        self.stem = on;
        self
    }

    /// One-line description of everything that changes which terms come out:
    /// the stemming flag and a fingerprint of the stop list. Two tokenizers
    /// with equal settings produce the same terms.
    pub fn settings(&self) -> String {
        let mut words: Vec<&str> = self.stopwords.iter().map(String::as_str).collect();
        words.sort_unstable();
        let mut hasher = DefaultHasher::new();
        words.hash(&mut hasher);
        format!("stem={} stopwords={}:{:016x}", self.stem, words.len(), hasher.finish())
    }

    pub fn is_stopword(&self, token: &str) -> bool {
        self.stopwords.contains(token)
    }

    pub fn tokenize(&self, text: &str) -> Vec<String> {
        let normalized = text.nfkc().collect::<String>();
        let mut tokens = Vec::new();
        for mat in RE.find_iter(&normalized) {
            let token = mat.as_str().to_lowercase();
            if self.is_stopword(&token) { continue; }
            if self.stem {
                tokens.push(STEMMER.stem(&token).into_owned());
            } else {
                tokens.push(token);
            }
        }
        tokens
    }

    pub fn term_frequencies(&self, text: &str) -> TermFrequencies {
        let mut freqs = TermFrequencies::new();
        self.add_frequencies(&mut freqs, text);
        freqs
    }

    /// Add the terms of `text` to an existing frequency map.
    pub fn add_frequencies(&self, freqs: &mut TermFrequencies, text: &str) {
        for token in self.tokenize(text) {
            *freqs.entry(token).or_insert(0) += 1;
        }
    }
}
