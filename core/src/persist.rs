//! Plain-text index snapshot.
//!
//! ```text
//! # documents (built <timestamp>)
//! # id;year;title;authors;norm
//! 1;74;The distribution of ...;Hoiby-N.;3.5
//!
//! # inverted index
//! # term;idf;[(doc_id, weight), ...]
//! aeruginosa;2.3;[(1, 4.6), (7, 2.3)]
//! ```
//!
//! Lines starting with `#` are ignored on load and the first blank line ends
//! the document section. `\`, `;`, `#` and line breaks inside terms, titles
//! and authors are backslash-escaped. Numbers are written in shortest round-trip form, so
//! loading a saved index reproduces it exactly.

use crate::index::TermEntry;
use crate::{DocId, Document, Error, Index, Posting, Result};
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

const SETTINGS_PREFIX: &str = "# tokenizer: ";

lazy_static! {
    static ref POSTING: Regex = Regex::new(r"\(\s*(\d+)\s*,\s*([^()\s,]+)\s*\)").expect("valid regex");
}

pub fn save(index: &Index, path: &Path) -> Result<()> {
    save_with_settings(index, path, None)
}

/// Save, recording the tokenizer settings the index was built with so a
/// later reader can detect a mismatch (see [`load_with_settings`]).
pub fn save_with_settings(index: &Index, path: &Path, settings: Option<&str>) -> Result<()> {
    let file = File::create(path).map_err(|e| Error::io(path, e))?;
    let mut out = BufWriter::new(file);
    write_snapshot(index, settings, &mut out)
        .and_then(|_| out.flush())
        .map_err(|e| Error::io(path, e))?;
    tracing::info!(path = %path.display(), num_docs = index.num_docs(), num_terms = index.num_terms(), "saved index");
    Ok(())
}

fn write_snapshot<W: Write>(index: &Index, settings: Option<&str>, out: &mut W) -> io::Result<()> {
    let built = OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default();
    writeln!(out, "# documents (built {built})")?;
    if let Some(settings) = settings {
        writeln!(out, "{SETTINGS_PREFIX}{}", settings.replace(['\n', '\r'], " "))?;
    }
    writeln!(out, "# id;year;title;authors;norm")?;
    let mut docs: Vec<&Document> = index.documents().collect();
    docs.sort_unstable_by_key(|d| d.id);
    for d in docs {
        writeln!(out, "{};{};{};{};{}", d.id, d.year, escape(&d.title), escape(&d.authors), d.norm)?;
    }

    writeln!(out)?;
    writeln!(out, "# inverted index")?;
    writeln!(out, "# term;idf;[(doc_id, weight), ...]")?;
    let mut terms: Vec<(&str, &TermEntry)> = index.terms().collect();
    terms.sort_unstable_by_key(|(t, _)| *t);
    for (term, entry) in terms {
        write!(out, "{};{};[", escape(term), entry.idf)?;
        for (i, p) in entry.postings.iter().enumerate() {
            if i > 0 {
                write!(out, ", ")?;
            }
            write!(out, "({}, {})", p.doc_id, p.weight)?;
        }
        writeln!(out, "]")?;
    }
    Ok(())
}

pub fn load(path: &Path) -> Result<Index> {
    load_with_settings(path).map(|(index, _)| index)
}

/// Load an index along with the tokenizer settings recorded at save time,
/// if any.
pub fn load_with_settings(path: &Path) -> Result<(Index, Option<String>)> {
    let file = File::open(path).map_err(|e| Error::io(path, e))?;
    let reader = BufReader::new(file);

    let mut docs: HashMap<DocId, Document> = HashMap::new();
    let mut terms: HashMap<String, TermEntry> = HashMap::new();
    let mut settings = None;
    let mut in_documents = true;

    for (i, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| Error::io(path, e))?;
        let line = line.strip_suffix('\r').unwrap_or(&line);
        let lineno = i + 1;
        if line.trim().is_empty() {
            in_documents = false;
            continue;
        }
        // '#' inside data is always escaped, so an unescaped one starts a comment
        if line.starts_with('#') {
            if let Some(recorded) = line.strip_prefix(SETTINGS_PREFIX) {
                settings = Some(recorded.to_string());
            }
            continue;
        }

        if in_documents {
            let doc = parse_document(line).map_err(|m| Error::parse(path, lineno, m))?;
            if docs.contains_key(&doc.id) {
                return Err(Error::parse(path, lineno, format!("duplicate document {}", doc.id)));
            }
            docs.insert(doc.id, doc);
        } else {
            let (term, entry) = parse_term(line).map_err(|m| Error::parse(path, lineno, m))?;
            if let Some(p) = entry.postings.iter().find(|p| !docs.contains_key(&p.doc_id)) {
                return Err(Error::parse(path, lineno, format!("posting for unknown document {}", p.doc_id)));
            }
            terms.insert(term, entry);
        }
    }

    tracing::info!(path = %path.display(), num_docs = docs.len(), num_terms = terms.len(), "loaded index");
    Ok((Index::from_parts(docs, terms), settings))
}

fn parse_document(line: &str) -> std::result::Result<Document, String> {
    let fields = split_escaped(line);
    let [id, year, title, authors, norm]: [String; 5] = fields
        .try_into()
        .map_err(|f: Vec<String>| format!("expected 5 document fields, found {}", f.len()))?;
    let id = id.trim().parse().map_err(|_| format!("bad document id {id:?}"))?;
    let year = year.trim().parse().map_err(|_| format!("bad year {year:?}"))?;
    let norm: f64 = norm.trim().parse().map_err(|_| format!("bad norm {norm:?}"))?;
    Ok(Document { id, year, title, authors, norm })
}

fn parse_term(line: &str) -> std::result::Result<(String, TermEntry), String> {
    let fields = split_escaped(line);
    let [term, idf, list]: [String; 3] = fields
        .try_into()
        .map_err(|_| "expected term;idf;[postings]".to_string())?;
    let idf: f64 = idf.trim().parse().map_err(|_| format!("bad idf {idf:?}"))?;
    let list = list
        .trim()
        .strip_prefix('[')
        .and_then(|l| l.strip_suffix(']'))
        .ok_or_else(|| format!("postings for {term:?} are not a [...] list"))?;

    let mut postings = Vec::new();
    let mut end = 0;
    for caps in POSTING.captures_iter(list) {
        let whole = caps.get(0).map(|m| (m.start(), m.end())).unwrap_or_default();
        if !list[end..whole.0].chars().all(|c| c == ',' || c.is_whitespace()) {
            return Err(format!("unexpected text in postings: {:?}", &list[end..whole.0]));
        }
        end = whole.1;
        let doc_id = caps[1].parse().map_err(|_| format!("bad document id {:?}", &caps[1]))?;
        let weight = caps[2].parse().map_err(|_| format!("bad weight {:?}", &caps[2]))?;
        postings.push(Posting { doc_id, weight });
    }
    if !list[end..].trim().is_empty() {
        return Err(format!("unexpected text in postings: {:?}", &list[end..]));
    }
    if postings.is_empty() {
        return Err(format!("term {term:?} has no postings"));
    }
    Ok((term, TermEntry { idf, postings }))
}

fn escape(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    for c in field.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            ';' => out.push_str("\\;"),
            '#' => out.push_str("\\#"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out
}

/// Split on `;` that are not backslash-escaped, unescaping as we go.
fn split_escaped(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut cur = String::new();
    let mut chars = line.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some('n') => cur.push('\n'),
                Some('r') => cur.push('\r'),
                Some(other) => cur.push(other),
                None => cur.push('\\'),
            },
            ';' => fields.push(std::mem::take(&mut cur)),
            c => cur.push(c),
        }
    }
    fields.push(cur);
    fields
}
