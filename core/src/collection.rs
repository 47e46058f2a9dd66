//! Reader for the CFC (Cystic Fibrosis) test collection.
//!
//! Files hold records separated by blank lines. A line starting with a known
//! two-letter tag opens that field; any other line continues the field opened
//! last. Document files are named `cf74` .. `cf79`; queries live in `cfquery`.

use crate::tokenizer::Tokenizer;
use crate::{DocId, Document, Error, Result, TermFrequencies};
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::{BTreeSet, HashMap};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const DOCUMENT_TAGS: &[&str] = &["PN", "RN", "AN", "AU", "TI", "SO", "MJ", "MN", "AB", "EX", "RF", "CT"];
const QUERY_TAGS: &[&str] = &["QN", "QU", "NR", "RD"];
/// Fields whose text is indexed.
const INDEXED_TAGS: &[&str] = &["TI", "AB", "EX", "MJ", "MN"];

lazy_static! {
    static ref COLLECTION_FILE: Regex = Regex::new(r"^cf\d{2}$").expect("valid regex");
    static ref PAPER_NUMBER: Regex = Regex::new(r"^(\d{2})\d{3}").expect("valid regex");
    static ref RELEVANT_PAIR: Regex = Regex::new(r"(\d+)\s*(\d+)").expect("valid regex");
}

#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub id: u32,
    pub text: String,
    /// Ground truth; empty when the query is not evaluated.
    pub relevant: BTreeSet<DocId>,
}

struct Record {
    fields: HashMap<&'static str, String>,
    line: usize,
}

impl Record {
    fn get(&self, tag: &str) -> &str {
        self.fields.get(tag).map(String::as_str).unwrap_or("")
    }
}

fn read_records(path: &Path, tags: &'static [&'static str]) -> Result<Vec<Record>> {
    let file = File::open(path).map_err(|e| Error::io(path, e))?;
    let reader = BufReader::new(file);

    let mut records = Vec::new();
    let mut fields: HashMap<&'static str, String> = HashMap::new();
    let mut last: Option<&'static str> = None;
    let mut start = 0;

    for (i, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| Error::io(path, e))?;
        let line = line.trim();
        if line.is_empty() {
            if fields.values().any(|v| !v.is_empty()) {
                records.push(Record { fields: std::mem::take(&mut fields), line: start });
            }
            fields.clear();
            last = None;
            continue;
        }
        if fields.is_empty() && last.is_none() {
            start = i + 1;
        }

        let (head, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let content = match tags.iter().find(|t| **t == head) {
            Some(&tag) => {
                last = Some(tag);
                rest.trim()
            }
            None => line,
        };
        // stray control lines (e.g. a trailing ^Z) carry no text
        if !content.chars().any(|c| c.is_alphanumeric()) {
            continue;
        }
        if let Some(tag) = last {
            let field = fields.entry(tag).or_default();
            if !field.is_empty() {
                field.push(' ');
            }
            field.push_str(content);
        }
    }
    if fields.values().any(|v| !v.is_empty()) {
        records.push(Record { fields, line: start });
    }
    Ok(records)
}

fn parse_number<T: std::str::FromStr>(path: &Path, record: &Record, tag: &str) -> Result<T> {
    let raw = record.get(tag);
    raw.trim()
        .parse()
        .map_err(|_| Error::parse(path, record.line, format!("field {tag} is not a number: {raw:?}")))
}

/// Parse every document in a collection file together with the term
/// frequencies of its indexed fields.
pub fn parse_documents(path: &Path, tokenizer: &Tokenizer) -> Result<Vec<(Document, TermFrequencies)>> {
    tracing::debug!(path = %path.display(), "parsing collection file");
    let mut out = Vec::new();
    for record in read_records(path, DOCUMENT_TAGS)? {
        let id: DocId = parse_number(path, &record, "RN")?;
        let year: u32 = PAPER_NUMBER
            .captures(record.get("PN"))
            .and_then(|c| c[1].parse().ok())
            .ok_or_else(|| Error::parse(path, record.line, format!("malformed paper number {:?}", record.get("PN"))))?;

        let mut freqs = TermFrequencies::new();
        for tag in INDEXED_TAGS {
            tokenizer.add_frequencies(&mut freqs, record.get(tag));
        }
        out.push((Document::new(id, year, record.get("TI"), record.get("AU")), freqs));
    }
    Ok(out)
}

/// Parse a query file. Relevance judgements are `<doc id> <grades>` pairs;
/// only the document ids are kept.
pub fn parse_queries(path: &Path) -> Result<Vec<Query>> {
    let mut out = Vec::new();
    for record in read_records(path, QUERY_TAGS)? {
        let id: u32 = parse_number(path, &record, "QN")?;
        let relevant = RELEVANT_PAIR
            .captures_iter(record.get("RD"))
            .filter_map(|c| c[1].parse().ok())
            .collect();
        out.push(Query { id, text: record.get("QU").to_string(), relevant });
    }
    tracing::debug!(path = %path.display(), queries = out.len(), "parsed query file");
    Ok(out)
}

/// Collection files (`cf` followed by two digits) directly inside `dir`,
/// sorted by name.
pub fn collection_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(dir).to_path_buf();
            let source = e
                .into_io_error()
                .unwrap_or_else(|| std::io::Error::new(std::io::ErrorKind::Other, "directory walk failed"));
            Error::io(path, source)
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        if entry.file_name().to_str().is_some_and(|n| COLLECTION_FILE.is_match(n)) {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}
