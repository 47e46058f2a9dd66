use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use search_cli::{build, interactive, load_index, query_file};
use search_core::tokenizer::Tokenizer;
use std::io;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Instant;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "cfcsearch")]
#[command(about = "Vector-space search and evaluation over the CFC collection", long_about = None)]
struct Cli {
    /// Index snapshot file
    #[arg(long, env = "CFC_INDEX", default_value = "cfcIndex.txt", global = true)]
    index: PathBuf,
    /// Whitespace-separated stop word file; built-in English list if unset
    #[arg(long, env = "CFC_STOPWORDS", global = true)]
    stopwords: Option<PathBuf>,
    /// Stem terms. Recorded in the index; querying with a different setting warns
    #[arg(long, env = "CFC_STEM", global = true)]
    stem: bool,
    /// Worker threads for indexing and batch queries (default: all cores)
    #[arg(long, env = "CFC_THREADS", global = true)]
    threads: Option<usize>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the index from the cfNN files of a collection directory
    BuildIndex {
        /// Collection directory
        #[arg(long, short = 'i')]
        input: PathBuf,
    },
    /// Rank queries typed at the prompt
    Query {
        /// Documents returned per query
        #[arg(long, short = 'k', default_value = "20")]
        ranking_size: NonZeroUsize,
    },
    /// Rank and evaluate every query of a CFC query file
    QueryFile {
        /// Query file (e.g. cfquery)
        #[arg(long, short = 'i')]
        input: PathBuf,
        /// Documents returned per query
        #[arg(long, short = 'k', default_value = "20")]
        ranking_size: NonZeroUsize,
        /// Rank cutoff for precision-at-K
        #[arg(long, default_value = "10")]
        cutoff: NonZeroUsize,
        /// Write per-query and aggregate metrics as JSON
        #[arg(long)]
        report: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();
    let cli = Cli::parse();

    if let Some(n) = cli.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(n)
            .build_global()
            .context("configuring worker threads")?;
    }
    let tokenizer = match &cli.stopwords {
        Some(path) => Tokenizer::from_stopword_file(path)?,
        None => Tokenizer::english(),
    }
    .stemming(cli.stem);

    let start = Instant::now();
    match cli.command {
        Commands::BuildIndex { input } => {
            build(&input, &cli.index, &tokenizer)?;
            tracing::info!(elapsed_s = start.elapsed().as_secs_f64(), "created and saved index");
        }
        Commands::Query { ranking_size } => {
            let index = load_index(&cli.index, &tokenizer)?;
            interactive(&index, &tokenizer, ranking_size.get(), io::stdin().lock(), io::stdout().lock())?;
        }
        Commands::QueryFile { input, ranking_size, cutoff, report } => {
            let out = io::stdout().lock();
            query_file(&cli.index, &input, &tokenizer, ranking_size.get(), cutoff.get(), report.as_deref(), out)?;
            tracing::info!(elapsed_s = start.elapsed().as_secs_f64(), "processed query file");
        }
    }
    Ok(())
}
