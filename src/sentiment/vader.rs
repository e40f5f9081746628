//! Rule-based valence scoring in the style of VADER (Valence Aware Dictionary
//! and sEntiment Reasoner)
//!
//! Each token that appears in the lexicon contributes its valence, adjusted
//! by its neighbourhood: capitalization, booster words, negations, and a few
//! idioms. Contributions are then summed, amplified by trailing punctuation
//! and squashed into the [-1, 1] range.

use super::lexicon::Lexicon;

/// Empirically derived increment for booster words ("very", "extremely"...)
const B_INCR: f64 = 0.293;

/// Empirically derived decrement for dampener words ("barely", "slightly"...)
const B_DECR: f64 = -0.293;

/// Increment for ALL-CAPS words in mixed-case text
const C_INCR: f64 = 0.733;

/// Scaling factor applied to negated valences
const N_SCALAR: f64 = -0.74;

/// Normalization constant approximating the max expected sum of valences
const ALPHA: f64 = 15.0;

/// Words which negate the sentiment of what follows
const NEGATE: &[&str] = &[
    "aint", "arent", "cannot", "cant", "couldnt", "darent", "didnt", "doesnt", "ain't", "aren't",
    "can't", "couldn't", "daren't", "didn't", "doesn't", "dont", "hadnt", "hasnt", "havent",
    "isnt", "mightnt", "mustnt", "neither", "don't", "hadn't", "hasn't", "haven't", "isn't",
    "mightn't", "mustn't", "neednt", "needn't", "never", "none", "nope", "nor", "not", "nothing",
    "nowhere", "oughtnt", "shant", "shouldnt", "uhuh", "wasnt", "werent", "oughtn't", "shan't",
    "shouldn't", "uh-uh", "wasn't", "weren't", "without", "wont", "wouldnt", "won't", "wouldn't",
    "rarely", "seldom", "despite",
];

/// Words (and word pairs) which increase or decrease the intensity of the
/// sentiment that follows them
const BOOSTERS: &[(&str, f64)] = &[
    ("absolutely", B_INCR),
    ("amazingly", B_INCR),
    ("awfully", B_INCR),
    ("completely", B_INCR),
    ("considerable", B_INCR),
    ("considerably", B_INCR),
    ("decidedly", B_INCR),
    ("deeply", B_INCR),
    ("effing", B_INCR),
    ("enormous", B_INCR),
    ("enormously", B_INCR),
    ("entirely", B_INCR),
    ("especially", B_INCR),
    ("exceptional", B_INCR),
    ("exceptionally", B_INCR),
    ("extreme", B_INCR),
    ("extremely", B_INCR),
    ("fabulously", B_INCR),
    ("flipping", B_INCR),
    ("flippin", B_INCR),
    ("frackin", B_INCR),
    ("fracking", B_INCR),
    ("fricking", B_INCR),
    ("frickin", B_INCR),
    ("frigging", B_INCR),
    ("friggin", B_INCR),
    ("fully", B_INCR),
    ("fuckin", B_INCR),
    ("fucking", B_INCR),
    ("fuggin", B_INCR),
    ("fugging", B_INCR),
    ("greatly", B_INCR),
    ("hella", B_INCR),
    ("highly", B_INCR),
    ("hugely", B_INCR),
    ("incredible", B_INCR),
    ("incredibly", B_INCR),
    ("intensely", B_INCR),
    ("major", B_INCR),
    ("majorly", B_INCR),
    ("more", B_INCR),
    ("most", B_INCR),
    ("particularly", B_INCR),
    ("purely", B_INCR),
    ("quite", B_INCR),
    ("really", B_INCR),
    ("remarkably", B_INCR),
    ("so", B_INCR),
    ("substantially", B_INCR),
    ("thoroughly", B_INCR),
    ("total", B_INCR),
    ("totally", B_INCR),
    ("tremendous", B_INCR),
    ("tremendously", B_INCR),
    ("uber", B_INCR),
    ("unbelievably", B_INCR),
    ("unusually", B_INCR),
    ("utter", B_INCR),
    ("utterly", B_INCR),
    ("very", B_INCR),
    ("almost", B_DECR),
    ("barely", B_DECR),
    ("hardly", B_DECR),
    ("just enough", B_DECR),
    ("kind of", B_DECR),
    ("kinda", B_DECR),
    ("kindof", B_DECR),
    ("kind-of", B_DECR),
    ("less", B_DECR),
    ("little", B_DECR),
    ("marginal", B_DECR),
    ("marginally", B_DECR),
    ("occasional", B_DECR),
    ("occasionally", B_DECR),
    ("partly", B_DECR),
    ("scarce", B_DECR),
    ("scarcely", B_DECR),
    ("slight", B_DECR),
    ("slightly", B_DECR),
    ("somewhat", B_DECR),
    ("sort of", B_DECR),
    ("sorta", B_DECR),
    ("sortof", B_DECR),
    ("sort-of", B_DECR),
];

/// Multi-word expressions whose valence overrides that of their parts
const IDIOMS: &[(&str, f64)] = &[
    ("the shit", 3.0),
    ("the bomb", 3.0),
    ("bad ass", 1.5),
    ("badass", 1.5),
    ("bus stop", 0.0),
    ("yeah right", -2.0),
    ("kiss of life", 1.5),
    ("to die for", 3.0),
    ("beating heart", 3.1),
    ("broken heart", -2.9),
];

/// Sentiment scores of a piece of text
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SentimentScores {
    /// Proportion of the text that carries negative sentiment
    pub negative: f64,

    /// Proportion of the text that carries no sentiment
    pub neutral: f64,

    /// Proportion of the text that carries positive sentiment
    pub positive: f64,

    /// Normalized sum of all valences, in [-1, 1]
    pub compound: f64,
}

/// Lexicon-based sentiment analyzer
#[derive(Clone, Debug)]
pub struct SentimentAnalyzer {
    /// Valence of known tokens
    lexicon: Lexicon,
}
//
impl SentimentAnalyzer {
    /// Set up an analyzer that uses a certain lexicon
    pub fn new(lexicon: Lexicon) -> Self {
        Self { lexicon }
    }

    /// Score the sentiment of a piece of text
    pub fn polarity_scores(&self, text: &str) -> SentimentScores {
        let tokens = Tokens::new(text);
        let mut sentiments = Vec::with_capacity(tokens.len());
        for (i, token) in tokens.lower.iter().enumerate() {
            // Boosters and "kind of" only modulate their neighbours
            let is_modifier = booster(token).is_some()
                || (&**token == "kind" && tokens.lower.get(i + 1).is_some_and(|next| &**next == "of"));
            if is_modifier {
                sentiments.push(0.0);
                continue;
            }
            sentiments.push(self.valence(&tokens, i));
        }
        but_check(&tokens, &mut sentiments);
        score_valence(&sentiments, text)
    }

    /// Valence of the token at position `i`, taking its context into account
    fn valence(&self, tokens: &Tokens, i: usize) -> f64 {
        let words = &tokens.lower;
        let Some(base) = self.lexicon.valence(&words[i]) else {
            return 0.0;
        };
        let mut valence = base;

        // Shouting in otherwise mixed-case text intensifies the sentiment
        if tokens.is_cap_diff && is_upper(&tokens.raw[i]) {
            valence += C_INCR.copysign(valence_sign(valence));
        }

        // Look at the three preceding tokens for boosters, negations, idioms
        for start_i in 0..3 {
            if i <= start_i {
                break;
            }
            let prev = i - (start_i + 1);
            if self.lexicon.contains(&words[prev]) {
                continue;
            }
            let mut scalar = scalar_inc_dec(&tokens.raw[prev], &words[prev], valence, tokens.is_cap_diff);
            if start_i == 1 {
                scalar *= 0.95;
            } else if start_i == 2 {
                scalar *= 0.9;
            }
            valence += scalar;
            valence = negation_check(valence, words, start_i, i);
            if start_i == 2 {
                valence = idioms_check(valence, words, i);
            }
        }
        self.least_check(valence, words, i)
    }

    /// Flip sentiments qualified by "least", unless it reads "at least" or
    /// "very least"
    fn least_check(&self, valence: f64, words: &[Box<str>], i: usize) -> f64 {
        if i > 1 && !self.lexicon.contains(&words[i - 1]) && &*words[i - 1] == "least" {
            if !matches!(&*words[i - 2], "at" | "very") {
                return valence * N_SCALAR;
            }
        } else if i > 0 && !self.lexicon.contains(&words[i - 1]) && &*words[i - 1] == "least" {
            return valence * N_SCALAR;
        }
        valence
    }
}

/// Tokenized text
struct Tokens {
    /// Tokens as they appear in the text, minus surrounding punctuation
    raw: Vec<Box<str>>,

    /// Lowercase version of `raw`
    lower: Vec<Box<str>>,

    /// Truth that some, but not all, tokens are in ALL CAPS
    is_cap_diff: bool,
}
//
impl Tokens {
    /// Split text on whitespace, stripping punctuation around words but
    /// leaving emoticons alone
    fn new(text: &str) -> Self {
        let raw = text
            .split_whitespace()
            .map(|token| {
                let stripped = token.trim_matches(|c: char| c.is_ascii_punctuation());
                if stripped.chars().count() <= 2 {
                    token.into()
                } else {
                    stripped.into()
                }
            })
            .collect::<Vec<Box<str>>>();
        let lower = raw.iter().map(|token| token.to_lowercase().into()).collect();
        let num_caps = raw.iter().filter(|token| is_upper(token)).count();
        Self {
            is_cap_diff: num_caps > 0 && num_caps < raw.len(),
            raw,
            lower,
        }
    }

    /// Number of tokens
    fn len(&self) -> usize {
        self.raw.len()
    }
}

/// Truth that a token has cased characters and all of them are uppercase
fn is_upper(token: &str) -> bool {
    token.chars().any(char::is_uppercase) && !token.chars().any(char::is_lowercase)
}

/// Sign to be given to valence adjustments (zero counts as negative)
fn valence_sign(valence: f64) -> f64 {
    if valence > 0.0 {
        1.0
    } else {
        -1.0
    }
}

/// Booster/dampener intensity of a (lowercase) token, if any
fn booster(lower: &str) -> Option<f64> {
    BOOSTERS
        .iter()
        .find(|(word, _)| *word == lower)
        .map(|(_, scalar)| *scalar)
}

/// Truth that a (lowercase) token is a negation
fn negated(lower: &str) -> bool {
    NEGATE.contains(&lower) || lower.contains("n't")
}

/// Intensity change caused by a preceding booster word, if any
fn scalar_inc_dec(raw: &str, lower: &str, valence: f64, is_cap_diff: bool) -> f64 {
    let Some(mut scalar) = booster(lower) else {
        return 0.0;
    };
    if valence < 0.0 {
        scalar = -scalar;
    }
    if is_cap_diff && is_upper(raw) {
        scalar += C_INCR.copysign(valence_sign(valence));
    }
    scalar
}

/// Account for a negation `start_i + 1` tokens before token `i`
fn negation_check(valence: f64, words: &[Box<str>], start_i: usize, i: usize) -> f64 {
    fn so_or_this(word: &str) -> bool {
        matches!(word, "so" | "this")
    }
    match start_i {
        0 => {
            if negated(&words[i - 1]) {
                return valence * N_SCALAR;
            }
        }
        1 => {
            if &*words[i - 2] == "never" && so_or_this(&words[i - 1]) {
                return valence * 1.5;
            } else if negated(&words[i - 2]) {
                return valence * N_SCALAR;
            }
        }
        2 => {
            // A "so" or "this" right before the word intensifies it even
            // without a leading "never"
            if (&*words[i - 3] == "never" && so_or_this(&words[i - 2])) || so_or_this(&words[i - 1])
            {
                return valence * 1.25;
            } else if negated(&words[i - 3]) {
                return valence * N_SCALAR;
            }
        }
        _ => unreachable!("only the three preceding tokens are checked"),
    }
    valence
}

/// Account for idioms around token `i` (requires `i >= 3`)
fn idioms_check(mut valence: f64, words: &[Box<str>], i: usize) -> f64 {
    fn idiom(sequence: &str) -> Option<f64> {
        IDIOMS
            .iter()
            .find(|(idiom, _)| *idiom == sequence)
            .map(|(_, valence)| *valence)
    }
    let (w3, w2, w1, w0) = (&words[i - 3], &words[i - 2], &words[i - 1], &words[i]);
    let onezero = format!("{w1} {w0}");
    let twoonezero = format!("{w2} {w1} {w0}");
    let twoone = format!("{w2} {w1}");
    let threetwoone = format!("{w3} {w2} {w1}");
    let threetwo = format!("{w3} {w2}");
    if let Some(found) = [&onezero, &twoonezero, &twoone, &threetwoone, &threetwo]
        .into_iter()
        .find_map(|sequence| idiom(sequence))
    {
        valence = found;
    }
    if let Some(w_next) = words.get(i + 1) {
        if let Some(found) = idiom(&format!("{w0} {w_next}")) {
            valence = found;
        }
        if let Some(w_next2) = words.get(i + 2) {
            if let Some(found) = idiom(&format!("{w0} {w_next} {w_next2}")) {
                valence = found;
            }
        }
    }

    // Multi-word boosters such as "kind of" or "sort of"
    for sequence in [&threetwoone, &threetwo, &twoone] {
        if let Some(scalar) = booster(sequence) {
            valence += scalar;
        }
    }
    valence
}

/// Soften everything before a "but", and emphasize everything after it
fn but_check(tokens: &Tokens, sentiments: &mut [f64]) {
    let Some(but_idx) = tokens.lower.iter().position(|word| &**word == "but") else {
        return;
    };
    for (idx, sentiment) in sentiments.iter_mut().enumerate() {
        if idx < but_idx {
            *sentiment *= 0.5;
        } else if idx > but_idx {
            *sentiment *= 1.5;
        }
    }
}

/// Sentiment amplification from exclamation and question marks
fn punctuation_emphasis(text: &str) -> f64 {
    let exclamations = text.matches('!').count().min(4);
    let questions = text.matches('?').count();
    let question_amplifier = match questions {
        0 | 1 => 0.0,
        2..=3 => questions as f64 * 0.18,
        _ => 0.96,
    };
    exclamations as f64 * 0.292 + question_amplifier
}

/// Squash a valence sum into the [-1, 1] range
fn normalize(score: f64) -> f64 {
    (score / (score * score + ALPHA).sqrt()).clamp(-1.0, 1.0)
}

/// Round to a certain number of decimal places
fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}

/// Turn per-token valences into final sentiment scores
fn score_valence(sentiments: &[f64], text: &str) -> SentimentScores {
    if sentiments.is_empty() {
        return SentimentScores::default();
    }
    let amplifier = punctuation_emphasis(text);

    let mut sum: f64 = sentiments.iter().sum();
    if sum > 0.0 {
        sum += amplifier;
    } else if sum < 0.0 {
        sum -= amplifier;
    }
    let compound = normalize(sum);

    let (mut pos_sum, mut neg_sum, mut neu_count) = (0.0, 0.0, 0.0);
    for &sentiment in sentiments {
        if sentiment > 0.0 {
            pos_sum += sentiment + 1.0;
        } else if sentiment < 0.0 {
            neg_sum += sentiment - 1.0;
        } else {
            neu_count += 1.0;
        }
    }
    if pos_sum > neg_sum.abs() {
        pos_sum += amplifier;
    } else if pos_sum < neg_sum.abs() {
        neg_sum -= amplifier;
    }
    let total = pos_sum + neg_sum.abs() + neu_count;
    SentimentScores {
        negative: round_to((neg_sum / total).abs(), 3),
        neutral: round_to((neu_count / total).abs(), 3),
        positive: round_to((pos_sum / total).abs(), 3),
        compound: round_to(compound, 4),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyzer() -> SentimentAnalyzer {
        SentimentAnalyzer::new(Lexicon::embedded().clone())
    }

    fn compound(text: &str) -> f64 {
        analyzer().polarity_scores(text).compound
    }

    #[test]
    fn plain_lexicon_sum() {
        assert_eq!(compound("VADER is smart, handsome, and funny."), 0.8316);
    }

    #[test]
    fn exclamation_amplifies() {
        assert_eq!(compound("VADER is smart, handsome, and funny!"), 0.8439);
    }

    #[test]
    fn boosters_decay_with_distance() {
        assert_eq!(compound("VADER is very smart, handsome, and funny."), 0.8545);
    }

    #[test]
    fn shouting_intensifies() {
        assert_eq!(compound("VADER is VERY SMART, handsome, and FUNNY."), 0.9227);
    }

    #[test]
    fn negation_flips() {
        assert_eq!(compound("The book was not good."), -0.3412);
        assert!(compound("The book was good.") > 0.0);
    }

    #[test]
    fn no_is_an_ordinary_word() {
        assert_eq!(compound("no good"), 0.1779);
        assert_eq!(compound("no"), -0.296);
    }

    #[test]
    fn never_so_intensifies() {
        assert_eq!(compound("never so good"), 0.6474);
    }

    #[test]
    fn common_words_carry_valence() {
        assert_eq!(compound("murder"), -0.6908);
        assert!(compound("war") < -0.5);
        assert!(compound("a strong film about friends") > 0.5);
    }

    #[test]
    fn but_shifts_emphasis() {
        assert!(compound("The plot was good, but the dialog is not great.") < -0.05);
    }

    #[test]
    fn unknown_words_are_neutral() {
        let scores = analyzer().polarity_scores("it was a movie");
        assert_eq!(scores.compound, 0.0);
        assert_eq!(scores.neutral, 1.0);
        assert_eq!(analyzer().polarity_scores(""), SentimentScores::default());
    }

    #[test]
    fn proportions_add_up() {
        let scores = analyzer().polarity_scores("great acting, terrible script, some scenes");
        let total = scores.negative + scores.neutral + scores.positive;
        assert!((total - 1.0).abs() < 2e-3, "proportions sum to {total}");
    }

    #[test]
    fn emoticons_survive_tokenization() {
        let tokens = Tokens::new("loved it :)");
        assert_eq!(&*tokens.raw[2], ":)");
        let tokens = Tokens::new("(wonderful!)");
        assert_eq!(&*tokens.raw[0], "wonderful");
    }
}
