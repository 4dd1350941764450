//! Sort keys and collation for alphabetized browsing of lexicon entries.
//!
//! Pāḷi and Sanskrit have their own letter order. Other known languages
//! compare diacritic-folded and case-insensitive. Anything unresolvable
//! falls back to an invariant comparison.

use std::cmp::Ordering;
use std::collections::HashMap;

use lazy_static::lazy_static;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

use crate::db::{Repository, RepositoryId};
use crate::error::SortError;
use crate::models_lexicon::LexEntry;
use crate::multitext::MultiText;

/// Key used for entries which have nothing to show in the indexed field.
pub const MISSING_KEY: &str = "*";

/// Pāḷi letters in alphabetical order. A letter's sort key is its position.
static PALI_ALPHABET: &[&str] = &[
    "√", "a", "ā", "i", "ī", "u", "ū", "e", "o",
    "k", "kh", "g", "gh", "ṅ", "c", "ch", "j", "jh", "ñ",
    "ṭ", "ṭh", "ḍ", "ḍh", "ṇ", "t", "th", "d", "dh", "n",
    "p", "ph", "b", "bh", "m", "y", "r", "l", "v", "s", "h", "ḷ", "ṁ",
];

static SANSKRIT_ALPHABET: &[&str] = &[
    "√", "a", "ā", "i", "ī", "u", "ū", "ṛ", "ṝ", "ḷ", "ḹ", "e", "ai", "o", "au", "ḥ", "ṁ",
    "k", "kh", "g", "gh", "ṅ", "c", "ch", "j", "jh", "ñ",
    "ṭ", "ṭh", "ḍ", "ḍh", "ṇ", "t", "th", "d", "dh", "n",
    "p", "ph", "b", "bh", "m", "y", "r", "l", "v", "ś", "ṣ", "s", "h",
];

/// Replaces each letter of a word with its two-digit position in an alphabet.
struct LetterOrder {
    regex: Regex,
    rank: HashMap<&'static str, usize>,
}

impl LetterOrder {
    fn new(alphabet: &'static [&'static str]) -> Self {
        // Digraphs must match before their first letter.
        let mut by_length = alphabet.to_vec();
        by_length.sort_by_key(|letter| std::cmp::Reverse(letter.chars().count()));
        let pattern = by_length
            .iter()
            .map(|letter| regex::escape(letter))
            .collect::<Vec<_>>()
            .join("|");

        LetterOrder {
            regex: Regex::new(&pattern).unwrap(),
            rank: alphabet.iter().enumerate().map(|(n, letter)| (*letter, n)).collect(),
        }
    }

    fn sort_key(&self, word: &str) -> String {
        self.regex
            .replace_all(word, |caps: &Captures| {
                caps.get(0)
                    .and_then(|m| self.rank.get(m.as_str()))
                    .map(|n| format!("{:02}", n))
                    .unwrap_or_default()
            })
            .into_owned()
    }
}

lazy_static! {
    static ref PALI_ORDER: LetterOrder = LetterOrder::new(PALI_ALPHABET);
    static ref SANSKRIT_ORDER: LetterOrder = LetterOrder::new(SANSKRIT_ALPHABET);

    /// Well-formed BCP-47 shape: a 2-8 letter primary subtag followed by
    /// alphanumeric subtags.
    static ref LANGUAGE_TAG_REGEX: Regex =
        Regex::new(r"^(?i)([a-z]{2,8})(-[a-z0-9]{1,8})*$").unwrap();

    /// Locale identifiers with a known collation.
    static ref KNOWN_LOCALES: HashMap<&'static str, Collation> = {
        let mut map = HashMap::new();
        for id in ["pi", "pli"] {
            map.insert(id, Collation::Pali);
        }
        for id in ["sa", "san"] {
            map.insert(id, Collation::Sanskrit);
        }
        for id in [
            "en", "en-us", "en-gb", "en-au", "fr", "fr-fr", "fr-ca", "de", "de-de",
            "es", "es-es", "es-mx", "pt", "pt-br", "pt-pt", "it", "nl", "sv", "da",
            "nb", "nn", "no", "fi", "pl", "cs", "sk", "sl", "hr", "hu", "ro", "tr",
            "id", "ms", "vi", "sw", "tpi", "ha", "yo", "qu",
        ] {
            map.insert(id, Collation::Folded);
        }
        map
    };
}

/// A key for sorting in Pāḷi alphabetical order.
pub fn pali_sort_key(word: &str) -> String {
    PALI_ORDER.sort_key(word)
}

pub fn sanskrit_sort_key(word: &str) -> String {
    SANSKRIT_ORDER.sort_key(word)
}

/// Lowercases and removes combining marks after NFD decomposition.
///
/// Example: "Ānanda" → "ananda", "e\u{301}clair" → "eclair"
pub fn fold_diacritics(text: &str) -> String {
    text.nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase()
}

/// The letter tables hold precomposed letters.
fn composed_lowercase(text: &str) -> String {
    text.nfc().collect::<String>().to_lowercase()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Collation {
    Pali,
    Sanskrit,
    /// Diacritic-folded and case-insensitive, then by case, then ordinal.
    Folded,
    /// Case-insensitive ordinal, then ordinal.
    Invariant,
}

impl Collation {
    pub fn compare(&self, a: &str, b: &str) -> Ordering {
        let primary = match self {
            Collation::Pali => pali_sort_key(&composed_lowercase(a)).cmp(&pali_sort_key(&composed_lowercase(b))),
            Collation::Sanskrit => {
                sanskrit_sort_key(&composed_lowercase(a)).cmp(&sanskrit_sort_key(&composed_lowercase(b)))
            }
            Collation::Folded => fold_diacritics(a).cmp(&fold_diacritics(b)),
            Collation::Invariant => Ordering::Equal,
        };
        primary
            .then_with(|| a.to_lowercase().cmp(&b.to_lowercase()))
            .then_with(|| a.cmp(b))
    }
}

type CollationResolver = fn(&str) -> Option<Collation>;

/// Tried in order; the first hit wins.
const RESOLVERS: [CollationResolver; 2] = [collation_from_locale_id, collation_from_language_tag];

/// Looks the id up as a locale name, accepting `en_US` as well as `en-US`.
pub fn collation_from_locale_id(writing_system_id: &str) -> Option<Collation> {
    let normalized = writing_system_id.trim().replace('_', "-").to_lowercase();
    KNOWN_LOCALES.get(normalized.as_str()).copied()
}

/// Parses the id as a language tag and looks up its primary language subtag.
pub fn collation_from_language_tag(writing_system_id: &str) -> Option<Collation> {
    let caps = LANGUAGE_TAG_REGEX.captures(writing_system_id.trim())?;
    let primary = caps.get(1)?.as_str().to_lowercase();
    KNOWN_LOCALES.get(primary.as_str()).copied()
}

pub fn resolve_collation(writing_system_id: &str) -> Result<Collation, SortError> {
    if writing_system_id.trim().is_empty() {
        return Err(SortError::InvalidWritingSystem);
    }
    let collation = RESOLVERS
        .iter()
        .find_map(|resolve| resolve(writing_system_id))
        .unwrap_or_else(|| {
            tracing::debug!("No collation for writing system '{}', using invariant order", writing_system_id);
            Collation::Invariant
        });
    Ok(collation)
}

/// Compares sort keys the way the writing system orders them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyComparer {
    writing_system_id: String,
    collation: Collation,
}

impl KeyComparer {
    pub fn for_writing_system(writing_system_id: &str) -> Result<Self, SortError> {
        Ok(KeyComparer {
            writing_system_id: writing_system_id.to_string(),
            collation: resolve_collation(writing_system_id)?,
        })
    }

    pub fn writing_system_id(&self) -> &str {
        &self.writing_system_id
    }

    pub fn collation(&self) -> Collation {
        self.collation
    }

    pub fn compare(&self, a: &str, b: &str) -> Ordering {
        self.collation.compare(a, b)
    }
}

/// Splits the gloss text of exactly `writing_system_id` at semicolons.
/// Parts are trimmed; empty parts are dropped.
pub fn split_gloss_at_semicolon(gloss: &MultiText, writing_system_id: &str) -> Vec<String> {
    gloss
        .get_exact_alternative(writing_system_id)
        .split(';')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SortField {
    LexicalForm,
    Gloss,
}

/// Derives sort keys of one field and writing system from entries.
#[derive(Debug, Clone)]
pub struct LexEntrySortHelper {
    writing_system_id: String,
    field: SortField,
    comparer: KeyComparer,
}

impl LexEntrySortHelper {
    pub fn new(writing_system_id: &str, field: SortField) -> Result<Self, SortError> {
        Ok(LexEntrySortHelper {
            writing_system_id: writing_system_id.to_string(),
            field,
            comparer: KeyComparer::for_writing_system(writing_system_id)?,
        })
    }

    pub fn name(&self) -> String {
        format!("LexEntry sorted by {}", self.writing_system_id)
    }

    pub fn field(&self) -> SortField {
        self.field
    }

    pub fn key_comparer(&self) -> &KeyComparer {
        &self.comparer
    }

    /// One key for the lexical form; for glosses one key per gloss part of
    /// every sense. An entry with no text in the field gets a single
    /// [`MISSING_KEY`].
    pub fn get_keys(&self, entry: &LexEntry) -> Vec<String> {
        match self.field {
            SortField::LexicalForm => {
                let best = entry
                    .lexical_form
                    .get_best_alternative(&self.writing_system_id, MISSING_KEY);
                if best.is_empty() {
                    vec![MISSING_KEY.to_string()]
                } else {
                    vec![best]
                }
            }
            SortField::Gloss => {
                if entry.senses.is_empty() {
                    return vec![MISSING_KEY.to_string()];
                }
                let keys: Vec<String> = entry
                    .senses
                    .iter()
                    .flat_map(|sense| split_gloss_at_semicolon(&sense.gloss, &self.writing_system_id))
                    .collect();
                if keys.is_empty() {
                    vec![MISSING_KEY.to_string()]
                } else {
                    keys
                }
            }
        }
    }

    /// All (key, identity) pairs of the repository, unsorted.
    pub fn get_key_id_pairs(
        &self,
        repo: &dyn Repository<LexEntry>,
    ) -> Result<Vec<(String, RepositoryId)>, SortError> {
        let mut pairs = Vec::new();
        for id in repo.get_all_items()? {
            let entry = repo.get_item(id)?;
            pairs.extend(self.get_keys(entry).into_iter().map(|key| (key, id)));
        }
        Ok(pairs)
    }
}

/// An alphabetized list of (sort key, identity) pairs.
#[derive(Debug, Clone)]
pub struct SortedIndex {
    name: String,
    comparer: KeyComparer,
    pairs: Vec<(String, RepositoryId)>,
}

impl SortedIndex {
    /// Scans the repository. Equal keys keep identity (creation) order.
    pub fn build(repo: &dyn Repository<LexEntry>, helper: &LexEntrySortHelper) -> Result<Self, SortError> {
        let comparer = helper.key_comparer().clone();
        let mut pairs = helper.get_key_id_pairs(repo)?;
        pairs.sort_by(|a, b| comparer.compare(&a.0, &b.0).then(a.1.cmp(&b.1)));

        tracing::debug!("Built index '{}' with {} keys", helper.name(), pairs.len());

        Ok(SortedIndex {
            name: helper.name(),
            comparer,
            pairs,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn pairs(&self) -> &[(String, RepositoryId)] {
        &self.pairs
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.pairs.iter().map(|(key, _)| key.as_str())
    }

    /// Position of the first key not ordered before `key`, for jumping
    /// into the list while the user types.
    pub fn find_first_index(&self, key: &str) -> usize {
        self.pairs
            .partition_point(|(k, _)| self.comparer.compare(k, key) == Ordering::Less)
    }
}
