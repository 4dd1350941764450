//! Text values with one alternative per writing system.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// One writing-system alternative of a [`MultiText`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageForm {
    pub text: String,
    /// Flagged by the user for review.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub starred: bool,
}

/// An ordered mapping from writing system id to a text alternative.
///
/// Insertion order of the writing systems is kept, which is the order the
/// alternatives were first seen in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MultiText {
    forms: IndexMap<String, LanguageForm>,
}

impl MultiText {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut mt = MultiText::new();
        for (ws, text) in pairs {
            mt.set_alternative(ws, text);
        }
        mt
    }

    pub fn is_empty(&self) -> bool {
        self.forms.is_empty()
    }

    pub fn len(&self) -> usize {
        self.forms.len()
    }

    pub fn contains_alternative(&self, writing_system_id: &str) -> bool {
        self.forms.contains_key(writing_system_id)
    }

    pub fn form(&self, writing_system_id: &str) -> Option<&LanguageForm> {
        self.forms.get(writing_system_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &LanguageForm)> {
        self.forms.iter().map(|(ws, f)| (ws.as_str(), f))
    }

    pub fn writing_system_ids(&self) -> impl Iterator<Item = &str> {
        self.forms.keys().map(|ws| ws.as_str())
    }

    /// The text for exactly this writing system, or an empty string.
    pub fn get_exact_alternative(&self, writing_system_id: &str) -> &str {
        self.forms
            .get(writing_system_id)
            .map(|f| f.text.as_str())
            .unwrap_or("")
    }

    /// The text for `writing_system_id` when it has some. Otherwise the first
    /// non-empty alternative with `not_first_choice_suffix` appended, or an
    /// empty string when there is no text at all.
    pub fn get_best_alternative(&self, writing_system_id: &str, not_first_choice_suffix: &str) -> String {
        let exact = self.get_exact_alternative(writing_system_id);
        if !exact.is_empty() {
            return exact.to_string();
        }
        self.forms
            .values()
            .find(|f| !f.text.is_empty())
            .map(|f| format!("{}{}", f.text, not_first_choice_suffix))
            .unwrap_or_default()
    }

    /// Sets the text of an alternative. An empty text removes the
    /// alternative, unless it is starred.
    pub fn set_alternative(&mut self, writing_system_id: impl Into<String>, text: impl Into<String>) {
        let ws = writing_system_id.into();
        let text = text.into();

        if text.is_empty() {
            if let Some(f) = self.forms.get_mut(&ws) {
                if f.starred {
                    f.text.clear();
                } else {
                    self.forms.shift_remove(&ws);
                }
            }
            return;
        }

        self.forms.entry(ws).or_default().text = text;
    }

    /// Inserts `text` in front of the existing alternative, or sets it.
    pub fn prepend(&mut self, writing_system_id: &str, text: &str) {
        match self.forms.get_mut(writing_system_id) {
            Some(f) => f.text.insert_str(0, text),
            None => self.set_alternative(writing_system_id, text),
        }
    }

    /// Copies every alternative of `incoming`, replacing existing text.
    pub fn merge_in(&mut self, incoming: &MultiText) {
        for (ws, form) in &incoming.forms {
            self.set_alternative(ws.as_str(), form.text.as_str());
        }
    }

    /// Appends every alternative of `incoming` to the existing text of the
    /// same writing system, joined by `separator`. Writing systems only
    /// present in `incoming` are inserted as new alternatives.
    pub fn merge_in_with_append(&mut self, incoming: &MultiText, separator: &str) {
        for (ws, form) in &incoming.forms {
            match self.forms.get_mut(ws) {
                Some(existing) if !existing.text.is_empty() => {
                    existing.text.push_str(separator);
                    existing.text.push_str(&form.text);
                }
                _ => self.set_alternative(ws.as_str(), form.text.as_str()),
            }
        }
    }

    pub fn is_alternative_starred(&self, writing_system_id: &str) -> bool {
        self.forms.get(writing_system_id).is_some_and(|f| f.starred)
    }

    /// Sets the starred flag of an alternative. Starring a writing system
    /// without text creates an empty, starred alternative.
    pub fn set_annotation_of_alternative_is_starred(&mut self, writing_system_id: &str, starred: bool) {
        match self.forms.get_mut(writing_system_id) {
            Some(f) => {
                f.starred = starred;
                if !starred && f.text.is_empty() {
                    self.forms.shift_remove(writing_system_id);
                }
            }
            None if starred => {
                self.forms.insert(
                    writing_system_id.to_string(),
                    LanguageForm { text: String::new(), starred: true },
                );
            }
            None => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_in_with_append_same_writing_system() {
        let mut gloss = MultiText::from_pairs([("en", "feline")]);
        gloss.merge_in_with_append(&MultiText::from_pairs([("en", "cat")]), "; ");
        assert_eq!(gloss.get_exact_alternative("en"), "feline; cat");
    }

    #[test]
    fn test_merge_in_with_append_new_writing_system() {
        let mut gloss = MultiText::from_pairs([("en", "feline")]);
        gloss.merge_in_with_append(&MultiText::from_pairs([("fr", "chat")]), "; ");
        assert_eq!(gloss.get_exact_alternative("en"), "feline");
        assert_eq!(gloss.get_exact_alternative("fr"), "chat");
        assert_eq!(gloss.len(), 2);
    }

    #[test]
    fn test_merge_in_with_append_is_not_deduplicating() {
        let mut gloss = MultiText::from_pairs([("en", "cat")]);
        gloss.merge_in_with_append(&MultiText::from_pairs([("en", "cat")]), "; ");
        assert_eq!(gloss.get_exact_alternative("en"), "cat; cat");
    }

    #[test]
    fn test_merge_in_replaces() {
        let mut form = MultiText::from_pairs([("en", "old"), ("fr", "vieux")]);
        form.merge_in(&MultiText::from_pairs([("en", "new")]));
        assert_eq!(form.get_exact_alternative("en"), "new");
        assert_eq!(form.get_exact_alternative("fr"), "vieux");
    }

    #[test]
    fn test_prepend() {
        let mut note = MultiText::from_pairs([("en", "check this")]);
        note.prepend("en", "(grammar) ");
        note.prepend("fr", "(grammaire) ");
        assert_eq!(note.get_exact_alternative("en"), "(grammar) check this");
        assert_eq!(note.get_exact_alternative("fr"), "(grammaire) ");
    }

    #[test]
    fn test_starred_survives_append() {
        let mut gloss = MultiText::from_pairs([("en", "dog")]);
        gloss.set_annotation_of_alternative_is_starred("en", true);
        gloss.merge_in_with_append(&MultiText::from_pairs([("en", "hound")]), "; ");
        assert!(gloss.is_alternative_starred("en"));
        assert_eq!(gloss.get_exact_alternative("en"), "dog; hound");
    }

    #[test]
    fn test_starring_missing_alternative_creates_it() {
        let mut gloss = MultiText::new();
        gloss.set_annotation_of_alternative_is_starred("th", true);
        assert!(gloss.contains_alternative("th"));
        assert!(gloss.is_alternative_starred("th"));

        gloss.set_annotation_of_alternative_is_starred("th", false);
        assert!(gloss.is_empty());
    }

    #[test]
    fn test_best_alternative() {
        let mt = MultiText::from_pairs([("fr", "chien"), ("en", "dog")]);
        assert_eq!(mt.get_best_alternative("en", "*"), "dog");
        assert_eq!(mt.get_best_alternative("de", "*"), "chien*");
        assert_eq!(MultiText::new().get_best_alternative("en", "*"), "");
    }

    #[test]
    fn test_empty_text_removes_alternative() {
        let mut mt = MultiText::from_pairs([("en", "dog")]);
        mt.set_alternative("en", "");
        assert!(!mt.contains_alternative("en"));
    }
}
