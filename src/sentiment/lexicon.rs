//! Sentiment lexicon: the valence of individual tokens
//!
//! Lexicons use the tab-separated layout of the VADER lexicon file, where each
//! line holds a token, its mean valence, and optionally the standard deviation
//! and raw human ratings that the mean was computed from.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::{collections::HashMap, io::Read, path::Path, sync::OnceLock};

/// Most common entries of the English VADER lexicon, bundled with the program
const EMBEDDED: &str = include_str!("lexicon.tsv");

/// Line of a lexicon file
#[derive(Clone, Debug, Deserialize, PartialEq)]
struct Entry {
    /// Token, lowercase unless case is significant (emoticons)
    token: Box<str>,

    /// Mean valence, roughly within [-4, 4]
    mean_valence: f64,

    // Remaining VADER columns are accepted but not used
    #[serde(default)]
    _std_dev: Option<f64>,
    #[serde(default)]
    _ratings: Option<Box<str>>,
}

/// Mapping from tokens to valence
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Lexicon(HashMap<Box<str>, f64>);
//
impl Lexicon {
    /// Lexicon that is bundled with the program
    pub fn embedded() -> &'static Self {
        static LAZY: OnceLock<Lexicon> = OnceLock::new();
        LAZY.get_or_init(|| {
            Self::from_reader(EMBEDDED.as_bytes())
                .expect("the embedded lexicon should be well-formed")
        })
    }

    /// Load a lexicon file in VADER format
    pub fn from_path(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path).map_err(|e| Error::Lexicon {
            path: path.into(),
            message: e.to_string(),
        })?;
        let lexicon = Self::from_reader(file).map_err(|e| Error::Lexicon {
            path: path.into(),
            message: e.to_string(),
        })?;
        log::debug!("Loaded {} lexicon entries from {path:?}", lexicon.len());
        Ok(lexicon)
    }

    /// Parse lexicon data
    fn from_reader(reader: impl Read) -> csv::Result<Self> {
        csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(false)
            .flexible(true)
            // Emoticons contain quote characters
            .quoting(false)
            .from_reader(reader)
            .into_deserialize::<Entry>()
            .map(|entry| entry.map(|entry| (entry.token, entry.mean_valence)))
            .collect::<csv::Result<HashMap<_, _>>>()
            .map(Self)
    }

    /// Valence of a token, if known
    pub fn valence(&self, token: &str) -> Option<f64> {
        self.0.get(token).copied()
    }

    /// Truth that a token is part of the lexicon
    pub fn contains(&self, token: &str) -> bool {
        self.0.contains_key(token)
    }

    /// Number of known tokens
    pub fn len(&self) -> usize {
        self.0.len()
    }
}
