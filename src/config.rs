//! Analysis run configuration

use crate::Args;
use std::{fmt, num::NonZeroUsize, path::PathBuf};

/// Final run configuration
///
/// This is the digested form of [`Args`], please refer to it to know more
/// about individual fields.
#[allow(missing_docs)]
#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    /// How to reach the relational store
    pub database: DbConfig,

    /// Names of the tables that the run writes
    pub outputs: OutputTables,

    // Other fields have the same meaning as in Args
    pub reviews_table: Box<str>,
    pub top_n: NonZeroUsize,
    pub batch_size: NonZeroUsize,
    pub lexicon: Option<PathBuf>,
}
//
impl Config {
    /// Determine run configuration from CLI arguments
    pub(crate) fn new(args: Args) -> Self {
        let Args {
            server,
            database,
            username,
            password,
            driver,
            reviews_table,
            results_table,
            words_table,
            phrases_table,
            score_table,
            top_n,
            batch_size,
            lexicon,
        } = args;
        Self {
            database: DbConfig {
                server,
                database,
                username,
                password: password.map(Password),
                driver,
            },
            outputs: OutputTables {
                results: results_table,
                words: words_table,
                phrases: phrases_table,
                score: score_table,
            },
            reviews_table,
            top_n,
            batch_size,
            lexicon,
        }
    }
}

/// Relational store connection descriptor
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct DbConfig {
    /// Host of the database server
    pub server: Box<str>,

    /// Database name, or database file path for file-based drivers
    pub database: Box<str>,

    /// User name, if the driver authenticates
    pub username: Option<Box<str>>,

    /// Password, if the driver authenticates
    pub password: Option<Password>,

    /// Database driver name
    pub driver: Box<str>,
}
//
impl DbConfig {
    /// Human-readable description, suitable for logs
    pub fn describe(&self) -> String {
        let mut description = format!(
            "{} database {} on {}",
            self.driver, self.database, self.server
        );
        if let Some(username) = &self.username {
            description.push_str(&format!(" as {username}"));
        }
        if self.password.is_some() {
            description.push_str(" (with password)");
        }
        description
    }
}

/// Database password, which never shows up in logs
#[derive(Clone, Eq, Hash, PartialEq)]
pub struct Password(pub Box<str>);
//
impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Password(<redacted>)")
    }
}

/// Destination tables of the analysis results
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct OutputTables {
    /// Classified reviews
    pub results: Box<str>,

    /// Most frequent words
    pub words: Box<str>,

    /// Most frequent two-word phrases
    pub phrases: Box<str>,

    /// Sentiment distribution by review score
    pub score: Box<str>,
}
//
impl Default for OutputTables {
    fn default() -> Self {
        Self {
            results: "IMDB_Sentiment_Results".into(),
            words: "Top_Words".into(),
            phrases: "Top_Phrases".into(),
            score: "Sentiment_By_Score".into(),
        }
    }
}
