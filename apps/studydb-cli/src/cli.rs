use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "studydb", version, about = "Hybrid retrieval over study material")]
pub struct Cli {
    /// Overrides `storage.data_dir`.
    #[arg(long, global = true, env = "STUDYDB_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Use the hashing embedder instead of the configured model.
    #[arg(long, global = true)]
    pub fake_embeddings: bool,

    /// Increase log verbosity (-v, -vv).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Only print results.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ingest files or directories.
    Add {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        #[command(flatten)]
        meta: MetaArgs,
    },
    /// Ingest a piece of text.
    AddText {
        text: String,
        #[command(flatten)]
        meta: MetaArgs,
    },
    /// Semantic similarity search.
    Search(QueryArgs),
    /// Full-text keyword search.
    Keyword(QueryArgs),
    /// Weighted similarity + keyword search.
    Hybrid {
        #[command(flatten)]
        query: QueryArgs,
        /// Weight of the similarity score, within [0, 1].
        #[arg(long)]
        alpha: Option<f32>,
    },
    /// List ingested documents.
    Documents {
        #[arg(long)]
        subject: Option<String>,
    },
    /// List known subjects.
    Subjects,
    /// Show one chunk.
    Get { id: u64 },
    /// Embed chunks that have no vector yet.
    Reconcile,
    /// Chunk, vector and pending counts.
    Stats,
}

#[derive(Args, Debug)]
pub struct QueryArgs {
    pub query: String,
    /// Number of results.
    #[arg(short)]
    pub k: Option<usize>,
    #[arg(long)]
    pub subject: Option<String>,
}

#[derive(Args, Debug)]
pub struct MetaArgs {
    #[arg(long)]
    pub subject: Option<String>,
    #[arg(long)]
    pub title: Option<String>,
    /// Extra metadata as a JSON object.
    #[arg(long)]
    pub meta: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_hybrid_with_globals() {
        let cli = Cli::parse_from(["studydb", "hybrid", "cell division", "-k", "3", "--alpha", "0.7", "--subject", "Biology", "--fake-embeddings"]);
        assert!(cli.fake_embeddings);
        match cli.command {
            Commands::Hybrid { query, alpha } => {
                assert_eq!(query.query, "cell division");
                assert_eq!(query.k, Some(3));
                assert_eq!(query.subject.as_deref(), Some("Biology"));
                assert_eq!(alpha, Some(0.7));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
