//! Select the most frequent words and phrases of the review corpus

use crate::{
    stop_words,
    table::{Table, Value},
};
use rayon::prelude::*;
use regex::Regex;
use std::{
    cmp::Reverse,
    collections::{hash_map, BinaryHeap, HashMap},
    num::NonZeroUsize,
    sync::OnceLock,
};

/// Term (word or phrase) and its number of occurences across the corpus
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct TermFrequency {
    /// Words of the term, separated by single spaces
    pub term: Box<str>,

    /// Number of occurences across all reviews
    pub count: u64,
}

/// Pick the `max_outputs` most frequent n-grams of a certain width
///
/// Only text cells are considered. Results are sorted by decreasing count,
/// terms with equal counts are sorted alphabetically.
pub fn pick_top_ngrams<'table>(
    reviews: impl Iterator<Item = &'table Value>,
    width: NonZeroUsize,
    max_outputs: NonZeroUsize,
) -> Vec<TermFrequency> {
    let texts = reviews.filter_map(Value::as_text).collect::<Vec<_>>();
    let counts = count_ngrams(&texts, width);
    log::debug!(
        "Found {} distinct {}-grams in {} reviews",
        counts.len(),
        width,
        texts.len()
    );
    top_terms(counts, max_outputs)
}

/// Format a frequency list as a two-column table
pub fn frequency_table(term_column: &str, terms: &[TermFrequency]) -> Table {
    let mut table = Table::new([term_column, "Frequency"]);
    for TermFrequency { term, count } in terms {
        let count = i64::try_from(*count).unwrap_or(i64::MAX);
        table.push_row([Value::Text(term.clone()), Value::Integer(count)]);
    }
    table
}

/// Count occurences of every n-gram across the corpus
fn count_ngrams(texts: &[&str], width: NonZeroUsize) -> HashMap<Box<str>, u64> {
    texts
        .par_iter()
        .fold(HashMap::new, |mut counts, text| {
            for ngram in ngrams(text, width) {
                *counts.entry(ngram).or_insert(0) += 1;
            }
            counts
        })
        .reduce(HashMap::new, |counts1, counts2| {
            let (mut dst, src) = if counts1.len() >= counts2.len() {
                (counts1, counts2)
            } else {
                (counts2, counts1)
            };
            for (ngram, count) in src {
                match dst.entry(ngram) {
                    hash_map::Entry::Occupied(o) => *o.into_mut() += count,
                    hash_map::Entry::Vacant(v) => {
                        v.insert(count);
                    }
                }
            }
            dst
        })
}

/// Select the most frequent terms, in order of decreasing frequency
fn top_terms(counts: HashMap<Box<str>, u64>, max_outputs: NonZeroUsize) -> Vec<TermFrequency> {
    let max_len = max_outputs.get();

    // Higher counts rank higher, then alphabetically earlier terms. Keep the
    // worst retained term at the top of a min-heap so it can be evicted.
    type Rank = Reverse<(u64, Reverse<Box<str>>)>;
    let top = counts
        .into_par_iter()
        .fold(
            || BinaryHeap::<Rank>::with_capacity(max_len + 1),
            |mut heap, (term, count)| {
                heap.push(Reverse((count, Reverse(term))));
                if heap.len() > max_len {
                    heap.pop();
                }
                heap
            },
        )
        .reduce(BinaryHeap::new, |heap1, heap2| {
            let (mut dst, mut src) = if heap1.len() >= heap2.len() {
                (heap1, heap2)
            } else {
                (heap2, heap1)
            };
            while let Some(elem) = src.pop() {
                dst.push(elem);
                if dst.len() > max_len {
                    dst.pop();
                }
            }
            dst
        });

    // Ascending order of Reverse<Rank> is descending order of rank
    top.into_sorted_vec()
        .into_iter()
        .map(|Reverse((count, Reverse(term)))| TermFrequency { term, count })
        .collect()
}

/// Split a review into lowercase word n-grams, ignoring stop words
fn ngrams(text: &str, width: NonZeroUsize) -> Vec<Box<str>> {
    let tokens = tokens(text).collect::<Vec<_>>();
    tokens
        .windows(width.get())
        .map(|window| window.join(" ").into_boxed_str())
        .collect()
}

/// Lowercase tokens of two or more word characters, minus stop words
fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    static TOKEN: OnceLock<Regex> = OnceLock::new();
    let token = TOKEN.get_or_init(|| {
        Regex::new(r"\b\w\w+\b").expect("the token pattern should be a valid regex")
    });
    token
        .find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .filter(|token| !stop_words::is_stop_word(token))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nz(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    fn reviews() -> Vec<Value> {
        vec![
            Value::from("Great film, great cast. A great film!"),
            Value::from("The plot was a waste of time"),
            Value::Null,
            Value::Integer(42),
            Value::from("Great film... but a waste of a cast"),
        ]
    }

    fn pairs(terms: &[TermFrequency]) -> Vec<(&str, u64)> {
        terms.iter().map(|t| (&*t.term, t.count)).collect()
    }

    #[test]
    fn tokenization() {
        let tokens = tokens("It's a GREAT film; 10/10, I'd watch x again").collect::<Vec<_>>();
        assert_eq!(tokens, ["great", "film", "10", "10", "watch"]);
    }

    #[test]
    fn top_words() {
        let reviews = reviews();
        let top = pick_top_ngrams(reviews.iter(), nz(1), nz(4));
        assert_eq!(
            pairs(&top),
            [("great", 4), ("film", 3), ("cast", 2), ("waste", 2)]
        );
    }

    #[test]
    fn top_phrases() {
        let reviews = reviews();
        let top = pick_top_ngrams(reviews.iter(), nz(2), nz(3));
        // Stop words are removed before phrases are formed
        assert_eq!(
            pairs(&top),
            [("great film", 3), ("cast great", 1), ("film great", 1)]
        );
    }

    #[test]
    fn ties_are_alphabetical() {
        let reviews = [Value::from("zebra apple mango"), Value::from("mango apple zebra")];
        let top = pick_top_ngrams(reviews.iter(), nz(1), nz(2));
        assert_eq!(pairs(&top), [("apple", 2), ("mango", 2)]);
    }

    #[test]
    fn output_is_bounded_and_sorted() {
        let reviews = (0..50)
            .map(|i| Value::from(&*format!("word{} word{} common", i % 7, i % 13)))
            .collect::<Vec<_>>();
        let top = pick_top_ngrams(reviews.iter(), nz(1), nz(10));
        assert_eq!(top.len(), 10);
        assert_eq!(&*top[0].term, "common");
        assert!(top.windows(2).all(|w| w[0].count > w[1].count
            || (w[0].count == w[1].count && w[0].term < w[1].term)));

        let top = pick_top_ngrams(reviews.iter(), nz(1), nz(1000));
        assert_eq!(top.len(), 1 + 13);
    }

    #[test]
    fn empty_corpus() {
        let reviews = [Value::Null];
        assert!(pick_top_ngrams(reviews.iter(), nz(2), nz(10)).is_empty());
    }

    #[test]
    fn table_layout() {
        let terms = [TermFrequency {
            term: "great film".into(),
            count: 3,
        }];
        let table = frequency_table("Phrase", &terms);
        let columns = table.columns().iter().map(|c| &**c).collect::<Vec<_>>();
        assert_eq!(columns, ["Phrase", "Frequency"]);
        assert_eq!(
            &*table.rows()[0],
            [Value::from("great film"), Value::Integer(3)]
        );
    }
}
