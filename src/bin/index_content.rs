//! Administrative content-indexing command.
//!
//! Reads a content file, runs an indexing pass over the selected scope, and
//! prints the run report. An optional `--query` runs a retrieval smoke check
//! against the freshly built index.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::error;

use coursechat::config::ChatConfig;
use coursechat::embeddings::HashEmbedder;
use coursechat::indexing::{Indexer, JsonContentSource};
use coursechat::retriever::Retriever;
use coursechat::types::{IndexScope, SourceType};
use coursechat::vector::InMemoryVectorStore;
use coursechat::{embeddings::Embedder, telemetry};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ScopeArg {
    All,
    Courses,
    Lessons,
    Faqs,
    Announcements,
}

impl From<ScopeArg> for IndexScope {
    fn from(value: ScopeArg) -> Self {
        match value {
            ScopeArg::All => IndexScope::All,
            ScopeArg::Courses => IndexScope::Only(SourceType::Course),
            ScopeArg::Lessons => IndexScope::Only(SourceType::Lesson),
            ScopeArg::Faqs => IndexScope::Only(SourceType::Faq),
            ScopeArg::Announcements => IndexScope::Only(SourceType::Announcement),
        }
    }
}

/// Index published course content into the vector store.
#[derive(Debug, Parser)]
#[command(name = "index_content", version, about)]
struct Cli {
    /// Content file: JSON with courses/lessons/faqs/announcements arrays.
    #[arg(long)]
    content: PathBuf,

    /// Which content types to index.
    #[arg(long = "type", value_enum, default_value = "all")]
    scope: ScopeArg,

    /// Wipe the vector store before indexing.
    #[arg(long)]
    clear: bool,

    /// After indexing, run this query against the index and print the hits.
    #[arg(long)]
    query: Option<String>,

    /// Number of hits for the smoke-check query.
    #[arg(long, default_value_t = 5)]
    top_k: usize,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    telemetry::init();
    let cli = Cli::parse();

    let source = match JsonContentSource::from_path(&cli.content) {
        Ok(source) => Arc::new(source),
        Err(err) => {
            error!(path = %cli.content.display(), %err, "failed to load content file");
            return ExitCode::FAILURE;
        }
    };

    let config = ChatConfig::default();
    let embedder = Arc::new(HashEmbedder::default());
    let store = Arc::new(InMemoryVectorStore::new(
        embedder.dimension(),
        embedder.version(),
    ));
    let indexer = Indexer::new(source, embedder.clone(), store.clone(), &config);

    let report = match indexer.index_content(cli.scope.into(), cli.clear).await {
        Ok(report) => report,
        Err(err) => {
            error!(%err, "indexing run aborted");
            return ExitCode::FAILURE;
        }
    };
    print!("{report}");

    if let Some(query) = cli.query {
        let retriever = Retriever::new(embedder, store, &config);
        match retriever.retrieve(&query, cli.top_k).await {
            Ok(hits) if hits.is_empty() => println!("query \"{query}\": no hits"),
            Ok(hits) => {
                println!("query \"{query}\":");
                for hit in hits {
                    println!(
                        "  {:.3}  {}  {}",
                        hit.score,
                        hit.document.id,
                        preview(&hit.document.text)
                    );
                }
            }
            Err(err) => {
                error!(%err, "smoke-check query failed");
                return ExitCode::FAILURE;
            }
        }
    }

    if report.is_clean() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn preview(text: &str) -> String {
    const MAX: usize = 60;
    let flat: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= MAX {
        flat
    } else {
        let cut: String = flat.chars().take(MAX).collect();
        format!("{cut}…")
    }
}
