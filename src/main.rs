//! Batch sentiment analysis of movie reviews stored in a relational database.
//!
//! Reviews are loaded from a table, classified as positive, neutral or
//! negative with a lexicon-based polarity model, and summarized into word and
//! phrase frequencies and a per-score sentiment distribution. Every result is
//! written back to the database, replacing the previous run's tables.

mod config;
mod distribution;
mod error;
mod pipeline;
mod progress;
mod sentiment;
mod stop_words;
mod store;
mod table;
mod top;

use crate::{config::Config, pipeline::Pipeline, progress::ProgressReport};
use anyhow::Context;
use clap::Parser;
use log::LevelFilter;
use std::{num::NonZeroUsize, path::PathBuf};

/// Classify movie reviews by sentiment and save summary statistics
///
/// Database connection settings can be given on the command line or through
/// DB_SERVER, DB_DATABASE, DB_USERNAME, DB_PASSWORD and DB_DRIVER environment
/// variables. Command line arguments take precedence.
#[derive(Parser, Debug)]
#[command(version, author)]
struct Args {
    /// Host of the database server
    ///
    /// SQL Server addresses may carry a port, as in "tcp:host,1433".
    #[arg(long, env = "DB_SERVER", default_value = "localhost")]
    server: Box<str>,

    /// Database to be analyzed
    ///
    /// With the SQLite driver, this is the path to the database file. With
    /// SQL Server, it is the database name.
    #[arg(short, long, env = "DB_DATABASE", default_value = "imdb.sqlite3")]
    database: Box<str>,

    /// Database user name
    #[arg(short, long, env = "DB_USERNAME")]
    username: Option<Box<str>>,

    /// Database password
    #[arg(long, env = "DB_PASSWORD", hide_env_values = true)]
    password: Option<Box<str>>,

    /// Database driver
    ///
    /// Either "sqlite", or "mssql" or an ODBC driver name mentioning SQL
    /// Server (like "ODBC Driver 18 for SQL Server") for SQL Server and Azure
    /// SQL databases, which require a user name and password.
    #[arg(long, env = "DB_DRIVER", default_value = "sqlite")]
    driver: Box<str>,

    /// Table that holds the reviews
    ///
    /// It must have a "review" text column, and may have a numerical "score"
    /// column, in which case the distribution of sentiments across scores is
    /// also computed.
    #[arg(short, long, default_value = "imdb_reviews")]
    reviews_table: Box<str>,

    /// Destination of the classified reviews
    #[arg(long, default_value = "IMDB_Sentiment_Results")]
    results_table: Box<str>,

    /// Destination of the most frequent words
    #[arg(long, default_value = "Top_Words")]
    words_table: Box<str>,

    /// Destination of the most frequent two-word phrases
    #[arg(long, default_value = "Top_Phrases")]
    phrases_table: Box<str>,

    /// Destination of the sentiment distribution by review score
    #[arg(long, default_value = "Sentiment_By_Score")]
    score_table: Box<str>,

    /// Number of words and phrases to be reported
    #[arg(short = 'n', long, default_value = "10")]
    top_n: NonZeroUsize,

    /// Number of rows written per INSERT statement
    #[arg(short, long, default_value = "500")]
    batch_size: NonZeroUsize,

    /// Tab-separated sentiment lexicon, in VADER format
    ///
    /// Each line holds a token and its mean valence, possibly followed by
    /// other fields which are ignored. By default, the most common entries
    /// of the English VADER lexicon, which are built into this program, are
    /// used.
    #[arg(short, long)]
    lexicon: Option<PathBuf>,
}
//
impl Args {
    /// Decode and validate CLI arguments
    pub fn parse_and_check() -> Result<Self> {
        Args::parse().check()
    }

    /// Check CLI arguments for basic sanity
    fn check(self) -> Result<Self> {
        anyhow::ensure!(
            !self.database.trim().is_empty(),
            "a database must be specified"
        );
        anyhow::ensure!(
            !self.reviews_table.trim().is_empty(),
            "a reviews table must be specified"
        );
        let outputs = [
            &self.results_table,
            &self.words_table,
            &self.phrases_table,
            &self.score_table,
        ];
        for (idx, output) in outputs.iter().enumerate() {
            anyhow::ensure!(
                !outputs[idx + 1..]
                    .iter()
                    .any(|other| other.eq_ignore_ascii_case(output)),
                "output table {output} is specified more than once"
            );
            anyhow::ensure!(
                !output.eq_ignore_ascii_case(&self.reviews_table),
                "output table {output} would overwrite the reviews"
            );
        }
        if let Some(lexicon) = &self.lexicon {
            anyhow::ensure!(
                lexicon.is_file(),
                "sentiment lexicon {} is not a file",
                lexicon.display()
            );
        }
        Ok(self)
    }
}
//
fn main() -> Result<()> {
    // Set up logging
    setup_logging().map_err(|e| anyhow::format_err!("{e}"))?;

    // Decode CLI arguments
    let args = Args::parse_and_check()?;
    let config = Config::new(args);
    log::info!("Analyzing reviews from {}", config.database.describe());

    // Set up progress reporting
    let report = ProgressReport::new();

    // Run the analysis
    let store = store::connect(&config.database, &report)
        .with_context(|| format!("connecting to {}", config.database.describe()))?;
    let summary = Pipeline::new(&config, &*store, report)
        .run()
        .context("analyzing reviews")?;
    println!("{summary}");
    Ok(())
}

/// Use anyhow for Result type erasure
pub use anyhow::Result;

/// Set up logging
fn setup_logging() -> syslog::Result<()> {
    syslog::init(
        syslog::Facility::LOG_USER,
        if cfg!(feature = "log-trace") {
            LevelFilter::Trace
        } else if cfg!(debug_assertions) {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        },
        None,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(args: &[&str]) -> Result<Args> {
        Args::try_parse_from(["review-sentiment"].iter().chain(args))?.check()
    }

    #[test]
    fn defaults_are_valid() {
        let args = check(&["--database", "reviews.sqlite3"]).unwrap();
        assert_eq!(&*args.reviews_table, "imdb_reviews");
        assert_eq!(args.top_n.get(), 10);
        assert_eq!(args.batch_size.get(), 500);
    }

    #[test]
    fn outputs_must_differ() {
        assert!(check(&["--words-table", "Results", "--phrases-table", "Results"]).is_err());
        assert!(check(&["--score-table", "top_words"]).is_err());
        assert!(check(&["--words-table", "Words", "--phrases-table", "Phrases"]).is_ok());
    }

    #[test]
    fn reviews_are_never_overwritten() {
        assert!(check(&["--results-table", "IMDB_REVIEWS"]).is_err());
        assert!(check(&["-r", "Top_Phrases"]).is_err());
        assert!(check(&["-r", "dbo.imdb_reviews"]).is_ok());
    }

    #[test]
    fn blank_names_are_rejected() {
        assert!(check(&["--database", " "]).is_err());
        assert!(check(&["--reviews-table", ""]).is_err());
    }

    #[test]
    fn lexicon_must_be_a_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let dir_path = dir.path().to_str().unwrap();
        assert!(check(&["--lexicon", dir_path]).is_err());
        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(check(&["--lexicon", file.path().to_str().unwrap()]).is_ok());
    }

    #[test]
    fn counts_must_be_positive() {
        assert!(check(&["--top-n", "0"]).is_err());
        assert!(check(&["--batch-size", "0"]).is_err());
    }
}
