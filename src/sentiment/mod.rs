//! Review sentiment classification

pub mod lexicon;
pub mod vader;

use crate::{
    error::{Error, Result},
    progress::{ProgressConfig, ProgressReport, Work},
    table::{Table, Value},
};
use rayon::prelude::*;
use std::fmt;

pub use self::{lexicon::Lexicon, vader::SentimentAnalyzer};

/// Name of the column that holds review text
pub const REVIEW_COLUMN: &str = "review";

/// Name of the column that classification appends
pub const SENTIMENT_COLUMN: &str = "Sentiment";

/// Compound score at and above which a review is positive
pub const POSITIVE_THRESHOLD: f64 = 0.05;

/// Compound score at and below which a review is negative
pub const NEGATIVE_THRESHOLD: f64 = -0.05;

/// Overall sentiment of a review
///
/// Variants are ordered alphabetically, which is the column order of tables
/// that have one column per label.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Sentiment {
    Negative,
    Neutral,
    Positive,
}
//
impl Sentiment {
    /// All sentiments, in alphabetical order
    pub const ALL: [Self; 3] = [Self::Negative, Self::Neutral, Self::Positive];

    /// Classify a compound polarity score
    pub fn from_compound(compound: f64) -> Self {
        if compound >= POSITIVE_THRESHOLD {
            Self::Positive
        } else if compound <= NEGATIVE_THRESHOLD {
            Self::Negative
        } else {
            Self::Neutral
        }
    }

    /// Parse a label as stored in the sentiment column
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|sentiment| sentiment.label() == label)
    }

    /// Textual label, as stored in the sentiment column
    pub fn label(self) -> &'static str {
        match self {
            Self::Negative => "Negative",
            Self::Neutral => "Neutral",
            Self::Positive => "Positive",
        }
    }
}
//
impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Classify a single review cell
///
/// Anything that is not text (missing reviews, numbers...) is neutral.
pub fn classify(analyzer: &SentimentAnalyzer, review: &Value) -> Sentiment {
    match review.as_text() {
        Some(text) => Sentiment::from_compound(analyzer.polarity_scores(text).compound),
        None => Sentiment::Neutral,
    }
}

/// Append a sentiment column to a table of reviews
pub fn classify_reviews(
    table: Table,
    analyzer: &SentimentAnalyzer,
    report: &ProgressReport,
) -> Result<Table> {
    let Some(review_idx) = table.column_index(REVIEW_COLUMN) else {
        log::error!("'{REVIEW_COLUMN}' column is missing in the dataset");
        return Err(Error::Schema {
            column: REVIEW_COLUMN.into(),
        });
    };

    let progress = report.add(
        "Classifying reviews",
        ProgressConfig::new(Work::PercentSteps(table.num_rows())),
    );
    let sentiments = (table.rows().par_iter())
        .map(|row| {
            let sentiment = classify(analyzer, &row[review_idx]);
            log::trace!("Classified {:?} as {sentiment}", row[review_idx]);
            progress.make_progress(1);
            Value::from(sentiment.label())
        })
        .collect::<Vec<_>>();
    Ok(table.with_column(SENTIMENT_COLUMN, sentiments))
}
