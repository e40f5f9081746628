//! Sentiment distribution within each review score bucket

use crate::{
    error::{Error, Result},
    sentiment::{Sentiment, SENTIMENT_COLUMN},
    table::{Table, Value},
};
use std::{cmp::Ordering, collections::BTreeMap};

/// Name of the column that holds numerical review ratings
pub const SCORE_COLUMN: &str = "score";

/// Cross-tabulate review scores against sentiment labels
///
/// The output has one row per distinct score, in ascending order, with the
/// relative frequency of each sentiment label within that score bucket. Rows
/// whose score is missing or not numerical are left out.
pub fn sentiment_by_score(table: &Table) -> Result<Table> {
    let Some(score_idx) = table.column_index(SCORE_COLUMN) else {
        return Err(Error::MissingOptionalColumn {
            column: SCORE_COLUMN.into(),
        });
    };
    let Some(sentiment_idx) = table.column_index(SENTIMENT_COLUMN) else {
        log::error!("'{SENTIMENT_COLUMN}' column is missing, reviews must be classified first");
        return Err(Error::Schema {
            column: SENTIMENT_COLUMN.into(),
        });
    };

    // Count labels in each score bucket
    let mut buckets = BTreeMap::<Score, [u64; 3]>::new();
    let mut integral = true;
    let mut skipped = 0usize;
    for row in table.rows() {
        let score_cell = &row[score_idx];
        let Some(score) = score_cell.as_number() else {
            skipped += 1;
            continue;
        };
        integral &= is_integral(score_cell);
        let Some(sentiment) = row[sentiment_idx].as_text().and_then(Sentiment::from_label) else {
            skipped += 1;
            continue;
        };
        buckets.entry(Score(score)).or_default()[label_index(sentiment)] += 1;
    }
    if skipped > 0 {
        log::debug!("Left {skipped} rows without a usable score or label out of the distribution");
    }

    // Normalize counts into frequencies
    let mut output = Table::new(
        std::iter::once(SCORE_COLUMN).chain(Sentiment::ALL.into_iter().map(Sentiment::label)),
    );
    for (Score(score), counts) in buckets {
        let total = counts.iter().sum::<u64>() as f64;
        let score = if integral {
            Value::Integer(score as i64)
        } else {
            Value::Real(score)
        };
        let mut row = Vec::with_capacity(1 + counts.len());
        row.push(score);
        row.extend(counts.map(|count| Value::Real(count as f64 / total)));
        output.push_row(row);
    }
    Ok(output)
}

/// Position of a sentiment's column, after the score column
fn label_index(sentiment: Sentiment) -> usize {
    Sentiment::ALL
        .iter()
        .position(|&s| s == sentiment)
        .expect("every sentiment should be listed in Sentiment::ALL")
}

/// Truth that a numerical cell holds an integer rather than a real
fn is_integral(cell: &Value) -> bool {
    match cell {
        Value::Integer(_) => true,
        Value::Text(text) => text.trim().parse::<i64>().is_ok(),
        _ => false,
    }
}

/// Score bucket, totally ordered
#[derive(Clone, Copy, Debug)]
struct Score(f64);
//
impl PartialEq for Score {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
//
impl Eq for Score {}
//
impl PartialOrd for Score {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
//
impl Ord for Score {
    fn cmp(&self, other: &Self) -> Ordering {
        // -0.0 and 0.0 are the same bucket
        (self.0 + 0.0).total_cmp(&(other.0 + 0.0))
    }
}
