//! Analysis run orchestration
//!
//! A run goes through the following stages, in order, and stops at the first
//! error:
//!
//! ```text
//! Idle → Loading → Classifying → Persisting(results)
//!      → Aggregating(words) → Persisting(words)
//!      → Aggregating(phrases) → Persisting(phrases)
//!      → Aggregating(score) → Persisting(score) → Done
//! ```
//!
//! The score stage is skipped when the reviews have no score column.

use crate::{
    config::Config,
    distribution,
    error::{Error, Result},
    progress::ProgressReport,
    sentiment::{self, Lexicon, Sentiment, SentimentAnalyzer, REVIEW_COLUMN, SENTIMENT_COLUMN},
    store::Store,
    table::Table,
    top,
};
use std::{fmt, num::NonZeroUsize};

/// Number of words in a phrase
const PHRASE_WIDTH: NonZeroUsize = match NonZeroUsize::new(2) {
    Some(width) => width,
    None => unreachable!(),
};

/// Stage of an analysis run
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Stage {
    Idle,
    Loading,
    Classifying,
    Aggregating(Aggregate),
    Persisting(Output),
    Done,
    Failed,
}
//
impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Loading => f.write_str("loading reviews"),
            Self::Classifying => f.write_str("classifying reviews"),
            Self::Aggregating(aggregate) => write!(f, "computing {aggregate}"),
            Self::Persisting(output) => write!(f, "saving {output}"),
            Self::Done => f.write_str("done"),
            Self::Failed => f.write_str("failed"),
        }
    }
}

/// Aggregate statistic computed from classified reviews
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Aggregate {
    Words,
    Phrases,
    Score,
}
//
impl fmt::Display for Aggregate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Words => "top words",
            Self::Phrases => "top phrases",
            Self::Score => "sentiment by score",
        })
    }
}

/// Table written by an analysis run
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Output {
    Results,
    Words,
    Phrases,
    Score,
}
//
impl fmt::Display for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Results => "classified reviews",
            Self::Words => "top words",
            Self::Phrases => "top phrases",
            Self::Score => "sentiment by score",
        })
    }
}

/// Outcome of a successful analysis run
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RunSummary {
    /// Number of classified reviews
    pub reviews: usize,

    /// Number of reviews with each sentiment, in [`Sentiment::ALL`] order
    pub sentiments: [usize; 3],

    /// Tables that were written, in order
    pub tables_written: Vec<Box<str>>,

    /// Truth that the sentiment by score step was skipped
    pub score_skipped: bool,
}
//
impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sentiments = (Sentiment::ALL.iter().zip(self.sentiments))
            .map(|(sentiment, count)| format!("{count} {sentiment}"))
            .collect::<Vec<_>>()
            .join(", ");
        write!(
            f,
            "Classified {} reviews ({sentiments}), wrote {} tables: {}",
            self.reviews,
            self.tables_written.len(),
            self.tables_written.join(", ")
        )?;
        if self.score_skipped {
            f.write_str(" (no score column, sentiment by score skipped)")?;
        }
        Ok(())
    }
}

/// Failed analysis run
#[derive(Debug, thiserror::Error)]
#[error("analysis failed while {stage}")]
pub struct PipelineFailure {
    /// Stage that failed
    pub stage: Stage,

    /// Reason of the failure
    #[source]
    pub source: Error,
}

/// Analysis run
pub struct Pipeline<'run> {
    /// Run configuration
    config: &'run Config,

    /// Where reviews come from and results go
    store: &'run dyn Store,

    /// Progress report for long-running stages
    report: ProgressReport,

    /// Current stage
    stage: Stage,
}
//
impl<'run> Pipeline<'run> {
    /// Prepare an analysis run
    pub fn new(config: &'run Config, store: &'run dyn Store, report: ProgressReport) -> Self {
        Self {
            config,
            store,
            report,
            stage: Stage::Idle,
        }
    }

    /// Go through every stage of the analysis
    pub fn run(mut self) -> std::result::Result<RunSummary, PipelineFailure> {
        let mut summary = RunSummary::default();
        match self.run_stages(&mut summary) {
            Ok(()) => {
                self.enter(Stage::Done);
                log::info!("{summary}");
                Ok(summary)
            }
            Err(source) => {
                let stage = self.stage;
                log::error!("Analysis failed while {stage}: {source}");
                self.enter(Stage::Failed);
                Err(PipelineFailure { stage, source })
            }
        }
    }

    /// Switch to a new stage
    fn enter(&mut self, stage: Stage) {
        log::debug!("Pipeline stage: {} -> {stage}", self.stage);
        self.stage = stage;
    }

    /// Stages from Loading to the last Persisting
    fn run_stages(&mut self, summary: &mut RunSummary) -> Result<()> {
        self.enter(Stage::Loading);
        let reviews = self.store.load(&self.config.reviews_table)?;

        self.enter(Stage::Classifying);
        let analyzer = self.analyzer()?;
        let classified = sentiment::classify_reviews(reviews, &analyzer, &self.report)?;
        summary.reviews = classified.num_rows();
        summary.sentiments = count_sentiments(&classified);
        log::info!(
            "Classified {} reviews: {:?} (negative, neutral, positive)",
            summary.reviews,
            summary.sentiments
        );
        self.persist(Output::Results, &classified, summary)?;

        for (aggregate, output, width, term_column) in [
            (Aggregate::Words, Output::Words, NonZeroUsize::MIN, "Word"),
            (Aggregate::Phrases, Output::Phrases, PHRASE_WIDTH, "Phrase"),
        ] {
            self.enter(Stage::Aggregating(aggregate));
            let review_idx = classified
                .column_index(REVIEW_COLUMN)
                .ok_or_else(|| Error::Schema {
                    column: REVIEW_COLUMN.into(),
                })?;
            let terms = top::pick_top_ngrams(classified.column(review_idx), width, self.config.top_n);
            let table = top::frequency_table(term_column, &terms);
            log::info!("Most frequent {aggregate}:\n{table}");
            self.persist(output, &table, summary)?;
        }

        self.enter(Stage::Aggregating(Aggregate::Score));
        match distribution::sentiment_by_score(&classified) {
            Ok(table) => {
                log::info!("Sentiment distribution by score:\n{table}");
                self.persist(Output::Score, &table, summary)?;
            }
            Err(Error::MissingOptionalColumn { column }) => {
                log::warn!("No '{column}' column found in the dataset, skipping sentiment by score");
                summary.score_skipped = true;
            }
            Err(e) => return Err(e),
        }
        Ok(())
    }

    /// Set up the sentiment analyzer
    fn analyzer(&self) -> Result<SentimentAnalyzer> {
        let lexicon = match &self.config.lexicon {
            Some(path) => Lexicon::from_path(path)?,
            None => Lexicon::embedded().clone(),
        };
        log::debug!("Sentiment lexicon has {} entries", lexicon.len());
        Ok(SentimentAnalyzer::new(lexicon))
    }

    /// Write a table to the store
    fn persist(&mut self, output: Output, table: &Table, summary: &mut RunSummary) -> Result<()> {
        self.enter(Stage::Persisting(output));
        let outputs = &self.config.outputs;
        let name = match output {
            Output::Results => &outputs.results,
            Output::Words => &outputs.words,
            Output::Phrases => &outputs.phrases,
            Output::Score => &outputs.score,
        };
        self.store.replace(name, table, self.config.batch_size)?;
        summary.tables_written.push(name.clone());
        Ok(())
    }
}

/// Count reviews of each sentiment, in [`Sentiment::ALL`] order
fn count_sentiments(classified: &Table) -> [usize; 3] {
    let mut counts = [0; 3];
    if let Some(idx) = classified.column_index(SENTIMENT_COLUMN) {
        for label in classified.column(idx).filter_map(|value| value.as_text()) {
            if let Some(pos) = (Sentiment::from_label(label))
                .and_then(|sentiment| Sentiment::ALL.iter().position(|&s| s == sentiment))
            {
                counts[pos] += 1;
            }
        }
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::OutputTables,
        store::{sqlite_config, SqliteStore},
        table::Value,
    };
    use std::cell::RefCell;
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
        config: Config,
        store: SqliteStore,
    }
    //
    impl Fixture {
        fn new(reviews: &Table) -> Self {
            let dir = TempDir::new().unwrap();
            let config = Config {
                database: sqlite_config(&dir.path().join("imdb.sqlite3")),
                outputs: OutputTables::default(),
                reviews_table: "imdb_reviews".into(),
                top_n: NonZeroUsize::new(10).unwrap(),
                batch_size: NonZeroUsize::new(2).unwrap(),
                lexicon: None,
            };
            let store = SqliteStore::new(&config.database, ProgressReport::hidden());
            store
                .replace("imdb_reviews", reviews, NonZeroUsize::new(500).unwrap())
                .unwrap();
            Self {
                dir,
                config,
                store,
            }
        }

        fn run(&self) -> std::result::Result<RunSummary, PipelineFailure> {
            Pipeline::new(&self.config, &self.store, ProgressReport::hidden()).run()
        }

        fn column(&self, table: &str, column: &str) -> Vec<Value> {
            let table = self.store.load(table).unwrap();
            let idx = table.column_index(column).unwrap();
            table.column(idx).cloned().collect()
        }
    }

    /// Store that fails to save one table, and records every save attempt
    struct FailingStore<'store> {
        inner: &'store SqliteStore,
        failing_table: &'static str,
        attempts: RefCell<Vec<String>>,
    }
    //
    impl Store for FailingStore<'_> {
        fn load(&self, table_name: &str) -> Result<Table> {
            self.inner.load(table_name)
        }

        fn replace(&self, table_name: &str, table: &Table, batch_size: NonZeroUsize) -> Result<()> {
            self.attempts.borrow_mut().push(table_name.into());
            if table_name == self.failing_table {
                return Err(Error::Write {
                    table: table_name.into(),
                    message: "disk full".into(),
                });
            }
            self.inner.replace(table_name, table, batch_size)
        }
    }

    fn reviews(with_score: bool) -> Table {
        let mut table = if with_score {
            Table::new(["id", "review", "score"])
        } else {
            Table::new(["id", "review"])
        };
        for (id, review, score) in [
            (1, Value::from("great film"), Value::Integer(9)),
            (2, Value::from("terrible waste of time"), Value::Integer(2)),
            (3, Value::from("it was a movie"), Value::Integer(5)),
            (4, Value::Null, Value::Null),
        ] {
            let mut row = vec![Value::Integer(id), review];
            if with_score {
                row.push(score);
            }
            table.push_row(row);
        }
        table
    }

    fn texts(values: &[Value]) -> Vec<&str> {
        values.iter().map(|v| v.as_text().unwrap()).collect()
    }

    #[test]
    fn full_run() {
        let fixture = Fixture::new(&reviews(true));
        let summary = fixture.run().unwrap();
        assert_eq!(summary.reviews, 4);
        assert_eq!(summary.sentiments, [1, 2, 1]);
        assert!(!summary.score_skipped);
        let tables = summary.tables_written.iter().map(|t| &**t).collect::<Vec<_>>();
        assert_eq!(
            tables,
            ["IMDB_Sentiment_Results", "Top_Words", "Top_Phrases", "Sentiment_By_Score"]
        );

        let sentiments = fixture.column("IMDB_Sentiment_Results", "Sentiment");
        assert_eq!(
            texts(&sentiments),
            ["Positive", "Negative", "Neutral", "Neutral"]
        );
        let ids = fixture.column("IMDB_Sentiment_Results", "id");
        assert_eq!(ids.len(), 4);

        let words = fixture.column("Top_Words", "Word");
        assert_eq!(
            texts(&words),
            ["film", "great", "movie", "terrible", "time", "waste"]
        );
        let phrases = fixture.column("Top_Phrases", "Phrase");
        assert_eq!(
            texts(&phrases),
            ["great film", "terrible waste", "waste time"]
        );
        let frequencies = fixture.column("Top_Phrases", "Frequency");
        assert!(frequencies.iter().all(|f| *f == Value::Integer(1)));

        let scores = fixture.column("Sentiment_By_Score", "score");
        assert_eq!(
            scores,
            [Value::Integer(2), Value::Integer(5), Value::Integer(9)]
        );
        let by_score = fixture.store.load("Sentiment_By_Score").unwrap();
        for row in by_score.rows() {
            let sum = row[1..].iter().filter_map(Value::as_number).sum::<f64>();
            assert!((sum - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn reruns_replace_outputs() {
        let fixture = Fixture::new(&reviews(true));
        fixture.run().unwrap();
        fixture.run().unwrap();
        assert_eq!(fixture.column("IMDB_Sentiment_Results", "id").len(), 4);
        assert_eq!(fixture.column("Top_Words", "Word").len(), 6);
    }

    #[test]
    fn missing_score_is_skipped() {
        let fixture = Fixture::new(&reviews(false));
        let summary = fixture.run().unwrap();
        assert!(summary.score_skipped);
        assert_eq!(summary.tables_written.len(), 3);
        assert!(matches!(
            fixture.store.load("Sentiment_By_Score"),
            Err(Error::Query { .. })
        ));
        assert!(summary.to_string().contains("skipped"));
    }

    #[test]
    fn missing_review_aborts_before_writing() {
        let mut table = Table::new(["id", "text"]);
        table.push_row([Value::Integer(1), Value::from("great film")]);
        let fixture = Fixture::new(&table);
        let failure = fixture.run().unwrap_err();
        assert_eq!(failure.stage, Stage::Classifying);
        assert!(matches!(failure.source, Error::Schema { .. }));
        assert!(matches!(
            fixture.store.load("IMDB_Sentiment_Results"),
            Err(Error::Query { .. })
        ));
    }

    #[test]
    fn write_failure_aborts_remaining_steps() {
        let fixture = Fixture::new(&reviews(true));
        let store = FailingStore {
            inner: &fixture.store,
            failing_table: "Top_Words",
            attempts: RefCell::default(),
        };
        let failure = Pipeline::new(&fixture.config, &store, ProgressReport::hidden())
            .run()
            .unwrap_err();
        assert_eq!(failure.stage, Stage::Persisting(Output::Words));
        assert!(matches!(&failure.source, Error::Write { table, .. } if table == "Top_Words"));
        assert_eq!(
            *store.attempts.borrow(),
            ["IMDB_Sentiment_Results", "Top_Words"]
        );
        assert_eq!(fixture.column("IMDB_Sentiment_Results", "id").len(), 4);
        for table in ["Top_Words", "Top_Phrases", "Sentiment_By_Score"] {
            assert!(matches!(
                fixture.store.load(table),
                Err(Error::Query { .. })
            ));
        }
    }

    #[test]
    fn missing_reviews_table() {
        let mut fixture = Fixture::new(&reviews(true));
        fixture.config.reviews_table = "dbo.imdb_reviews".into();
        let failure = fixture.run().unwrap_err();
        assert_eq!(failure.stage, Stage::Loading);
        assert!(matches!(failure.source, Error::Query { .. }));
    }

    #[test]
    fn unreadable_lexicon() {
        let mut fixture = Fixture::new(&reviews(true));
        fixture.config.lexicon = Some(fixture.dir.path().join("missing_lexicon.txt"));
        let failure = fixture.run().unwrap_err();
        assert_eq!(failure.stage, Stage::Classifying);
        assert!(matches!(failure.source, Error::Lexicon { .. }));
    }

    #[test]
    fn summary_display() {
        let summary = RunSummary {
            reviews: 4,
            sentiments: [1, 2, 1],
            tables_written: vec!["A".into(), "B".into()],
            score_skipped: false,
        };
        assert_eq!(
            summary.to_string(),
            "Classified 4 reviews (1 Negative, 2 Neutral, 1 Positive), wrote 2 tables: A, B"
        );
    }
}
