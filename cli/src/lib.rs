//! Commands behind the `cfcsearch` binary.

use anyhow::{bail, Context, Result};
use rayon::prelude::*;
use search_core::collection::{collection_files, parse_documents, parse_queries, Query};
use search_core::eval::{evaluate_ranking, summarize, EvaluationSummary, QueryEvaluation};
use search_core::tokenizer::Tokenizer;
use search_core::{persist, rank, DocId, Error, Index, IndexBuilder};
use serde::Serialize;
use std::fs::File;
use std::io::{BufRead, BufWriter, Write};
use std::path::Path;
use std::time::Instant;

/// Parse every collection file under `input`, build the index and save it
/// to `index_path` together with the tokenizer settings.
pub fn build(input: &Path, index_path: &Path, tokenizer: &Tokenizer) -> Result<Index> {
    let files = collection_files(input)?;
    if files.is_empty() {
        bail!("no collection files (cfNN) in {}", input.display());
    }
    tracing::info!(dir = %input.display(), files = files.len(), "creating index");

    let builder = IndexBuilder::new();
    files.par_iter().try_for_each(|file| -> search_core::Result<()> {
        for (doc, freqs) in parse_documents(file, tokenizer)? {
            builder.add_document(doc, &freqs)?;
        }
        Ok(())
    })?;
    let index = builder.finish()?;
    persist::save_with_settings(&index, index_path, Some(&tokenizer.settings())).context("saving index")?;
    Ok(index)
}

/// Compare the settings recorded in a snapshot with the tokenizer about to
/// be used on it. Logs a warning and returns false when they differ; a
/// snapshot without recorded settings is accepted.
pub fn check_settings(recorded: Option<&str>, tokenizer: &Tokenizer) -> bool {
    let current = tokenizer.settings();
    match recorded {
        Some(recorded) if recorded != current => {
            tracing::warn!(
                index = recorded,
                current = %current,
                "index was built with different tokenizer settings; query terms may not match"
            );
            false
        }
        Some(_) => true,
        None => {
            tracing::debug!("index does not record tokenizer settings");
            true
        }
    }
}

pub fn load_index(path: &Path, tokenizer: &Tokenizer) -> Result<Index> {
    let start = Instant::now();
    let (index, recorded) = persist::load_with_settings(path)
        .with_context(|| format!("could not read the index; create it first with `cfcsearch build-index` ({})", path.display()))?;
    check_settings(recorded.as_deref(), tokenizer);
    tracing::info!(elapsed_s = start.elapsed().as_secs_f64(), "loaded index");
    Ok(index)
}

/// Prompt loop: rank each non-empty line read from `input` until end of input.
pub fn interactive<R: BufRead, W: Write>(index: &Index, tokenizer: &Tokenizer, k: usize, mut input: R, mut out: W) -> Result<()> {
    let mut query_id = 0u32;
    loop {
        write!(out, ">> ")?;
        out.flush()?;
        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            writeln!(out)?;
            break;
        }
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        query_id += 1;

        let start = Instant::now();
        let results = rank(&tokenizer.term_frequencies(text), index, k);
        let elapsed = start.elapsed().as_secs_f64();
        tracing::debug!(query_id, hits = results.len(), elapsed_s = elapsed, "ranked query");

        for r in &results {
            writeln!(out, "similarity: {:.5}. id: {}", r.score, r.document.id)?;
            writeln!(out, "\ttitle: {}", r.document.title)?;
            writeln!(out, "\tauthors: {}, year: {}\n", r.document.authors, r.document.year)?;
        }
        writeln!(out, "{} documents in {:.5} s", results.len(), elapsed)?;
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryReport {
    pub id: u32,
    pub relevant: usize,
    pub retrieved: usize,
    pub seconds: f64,
    #[serde(flatten)]
    pub evaluation: QueryEvaluation,
}

#[derive(Debug, Serialize)]
pub struct BatchReport {
    pub ranking_size: usize,
    pub cutoff: usize,
    #[serde(flatten)]
    pub summary: EvaluationSummary,
    pub per_query: Vec<QueryReport>,
}

/// Rank and evaluate one query. Queries without relevant documents are
/// logged and yield `None`.
pub fn evaluate_query(query: &Query, index: &Index, tokenizer: &Tokenizer, k: usize, cutoff: usize) -> search_core::Result<Option<QueryReport>> {
    let start = Instant::now();
    let results = rank(&tokenizer.term_frequencies(&query.text), index, k);
    let ids: Vec<DocId> = results.iter().map(|r| r.document.id).collect();
    let evaluation = match evaluate_ranking(&query.relevant, &ids, cutoff) {
        Ok(e) => e,
        Err(Error::InvalidQuery) => {
            tracing::warn!(query_id = query.id, "query has no relevant documents, not evaluated");
            return Ok(None);
        }
        Err(e) => return Err(e),
    };
    Ok(Some(QueryReport {
        id: query.id,
        relevant: query.relevant.len(),
        retrieved: ids.len(),
        seconds: start.elapsed().as_secs_f64(),
        evaluation,
    }))
}

/// Evaluate every query of `input` against `index` in parallel.
pub fn evaluate_queries(index: &Index, input: &Path, tokenizer: &Tokenizer, k: usize, cutoff: usize) -> Result<BatchReport> {
    let queries = parse_queries(input).context("could not read the query file")?;

    let per_query: Vec<QueryReport> = queries
        .par_iter()
        .map(|q| evaluate_query(q, index, tokenizer, k, cutoff))
        .collect::<search_core::Result<Vec<_>>>()?
        .into_iter()
        .flatten()
        .collect();

    let evaluations: Vec<QueryEvaluation> = per_query.iter().map(|r| r.evaluation.clone()).collect();
    let seconds: Vec<f64> = per_query.iter().map(|r| r.seconds).collect();
    let summary = summarize(&evaluations, &seconds);
    Ok(BatchReport { ranking_size: k, cutoff, summary, per_query })
}

/// Print the per-query table, the averages and the averaged curve.
pub fn write_table<W: Write>(batch: &BatchReport, mut out: W) -> Result<()> {
    let cutoff = batch.cutoff;
    let summary = &batch.summary;
    writeln!(out, "ranking size: {}", batch.ranking_size)?;
    writeln!(out, "query id ; P@{cutoff} ; interpolated MAP ; time (s)")?;
    for r in &batch.per_query {
        writeln!(out, "{:03} ; {:.5} ; {:.5} ; {:.5}", r.id, r.evaluation.precision_at_k, r.evaluation.map, r.seconds)?;
    }
    writeln!(out, "\nAverages over {} queries:", summary.queries)?;
    writeln!(out, "\tP@{cutoff}: {:.5}", summary.mean_precision_at_k)?;
    writeln!(out, "\tinterpolated MAP: {:.5}", summary.mean_map)?;
    writeln!(out, "\ttime: {:.5} s", summary.mean_seconds)?;
    writeln!(out, "\tinterpolated recall points (precision, recall):")?;
    for p in &summary.recall_points {
        writeln!(out, "\t({:.5}, {:.5}),", p.precision, p.recall)?;
    }
    Ok(())
}

pub fn write_report(batch: &BatchReport, path: &Path) -> Result<()> {
    let file = File::create(path).with_context(|| format!("creating report {}", path.display()))?;
    let mut out = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut out, batch).with_context(|| format!("writing report {}", path.display()))?;
    out.flush().with_context(|| format!("writing report {}", path.display()))?;
    tracing::info!(path = %path.display(), "wrote evaluation report");
    Ok(())
}

/// The `query-file` command: evaluate, print the table, optionally write the
/// JSON report.
pub fn query_file<W: Write>(
    index_path: &Path,
    input: &Path,
    tokenizer: &Tokenizer,
    k: usize,
    cutoff: usize,
    report: Option<&Path>,
    out: W,
) -> Result<BatchReport> {
    let index = load_index(index_path, tokenizer)?;
    let batch = evaluate_queries(&index, input, tokenizer, k, cutoff)?;
    write_table(&batch, out)?;
    if let Some(path) = report {
        write_report(&batch, path)?;
    }
    Ok(batch)
}
