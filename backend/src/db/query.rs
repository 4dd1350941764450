//! Queries over a repository and the record tokens they produce.

use std::cmp::Ordering;

use indexmap::IndexMap;

use crate::db::{Repository, RepositoryId};
use crate::error::RepositoryError;
use crate::lexicon_sort::{split_gloss_at_semicolon, MISSING_KEY};
use crate::models_lexicon::LexEntry;
use crate::properties::LexRelation;

/// A named projection of field values produced for one item.
pub type QueryRow = IndexMap<String, String>;

/// Produces zero or more result rows for an item.
pub trait Query<T> {
    fn results(&self, item: &T) -> Vec<QueryRow>;
}

impl<T, F> Query<T> for F
where
    F: Fn(&T) -> Vec<QueryRow>,
{
    fn results(&self, item: &T) -> Vec<QueryRow> {
        self(item)
    }
}

/// One result row together with the identity of the item it came from.
pub struct RecordToken<'r, T> {
    repository: &'r dyn Repository<T>,
    id: RepositoryId,
    row: QueryRow,
}

impl<'r, T> RecordToken<'r, T> {
    pub fn new(repository: &'r dyn Repository<T>, id: RepositoryId, row: QueryRow) -> Self {
        RecordToken { repository, id, row }
    }

    pub fn id(&self) -> RepositoryId {
        self.id
    }

    pub fn row(&self) -> &QueryRow {
        &self.row
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.row.get(field).map(|v| v.as_str())
    }

    /// Looks the record up in the repository the token came from.
    pub fn real_object(&self) -> Result<&'r T, RepositoryError> {
        self.repository.get_item(self.id)
    }
}

impl<T> Clone for RecordToken<'_, T> {
    fn clone(&self) -> Self {
        RecordToken {
            repository: self.repository,
            id: self.id,
            row: self.row.clone(),
        }
    }
}

pub struct ResultSet<'r, T> {
    tokens: Vec<RecordToken<'r, T>>,
}

impl<'r, T> ResultSet<'r, T> {
    pub fn new(tokens: Vec<RecordToken<'r, T>>) -> Self {
        ResultSet { tokens }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RecordToken<'r, T>> {
        self.tokens.iter()
    }

    /// Distinct identities in result order.
    pub fn ids(&self) -> Vec<RepositoryId> {
        let mut ids: Vec<RepositoryId> = Vec::with_capacity(self.tokens.len());
        for token in &self.tokens {
            if !ids.contains(&token.id) {
                ids.push(token.id);
            }
        }
        ids
    }

    /// Stable sort on one field; rows missing the field sort first.
    pub fn sort_by_field<C>(&mut self, field: &str, compare: C)
    where
        C: Fn(&str, &str) -> Ordering,
    {
        self.tokens
            .sort_by(|a, b| compare(a.get(field).unwrap_or(""), b.get(field).unwrap_or("")));
    }
}

impl<'r, T> IntoIterator for ResultSet<'r, T> {
    type Item = RecordToken<'r, T>;
    type IntoIter = std::vec::IntoIter<RecordToken<'r, T>>;

    fn into_iter(self) -> Self::IntoIter {
        self.tokens.into_iter()
    }
}

// === Lexicon queries ===

/// One row per entry: `form`, the best lexical form for the writing system.
pub struct LexicalFormQuery {
    pub writing_system_id: String,
}

impl Query<LexEntry> for LexicalFormQuery {
    fn results(&self, entry: &LexEntry) -> Vec<QueryRow> {
        let form = entry.lexical_form.get_best_alternative(&self.writing_system_id, MISSING_KEY);
        if form.is_empty() {
            return vec![row([("form", MISSING_KEY.to_string())])];
        }
        vec![row([("form", form)])]
    }
}

/// One row per gloss part of every sense: `gloss` and `sense_id`.
pub struct GlossQuery {
    pub writing_system_id: String,
}

impl Query<LexEntry> for GlossQuery {
    fn results(&self, entry: &LexEntry) -> Vec<QueryRow> {
        entry
            .senses
            .iter()
            .flat_map(|sense| {
                split_gloss_at_semicolon(&sense.gloss, &self.writing_system_id)
                    .into_iter()
                    .map(|gloss| row([("gloss", gloss), ("sense_id", sense.id.clone())]))
            })
            .collect()
    }
}

/// Matches the entry whose guid or interchange id equals `id`.
pub struct GuidQuery {
    pub id: String,
}

impl Query<LexEntry> for GuidQuery {
    fn results(&self, entry: &LexEntry) -> Vec<QueryRow> {
        if entry.guid() == Some(self.id.as_str()) || (!entry.id.is_empty() && entry.id == self.id) {
            vec![row([("guid", entry.guid().unwrap_or_default().to_string())])]
        } else {
            Vec::new()
        }
    }
}

/// An empty id matches nothing and is refused.
pub fn find_entry_by_guid(
    repo: &dyn Repository<LexEntry>,
    guid: &str,
) -> Result<Option<RepositoryId>, RepositoryError> {
    if guid.trim().is_empty() {
        return Err(RepositoryError::InvalidArgument("empty guid".to_string()));
    }
    let query = GuidQuery { id: guid.to_string() };
    Ok(repo.get_items_matching(&query)?.iter().next().map(|t| t.id()))
}

/// Resolves the target of a relation to the identity of a stored entry.
pub fn resolve_relation(
    repo: &dyn Repository<LexEntry>,
    relation: &LexRelation,
) -> Result<Option<RepositoryId>, RepositoryError> {
    if relation.target_id.is_empty() {
        return Ok(None);
    }
    find_entry_by_guid(repo, &relation.target_id)
}

fn row<const N: usize>(fields: [(&str, String); N]) -> QueryRow {
    fields
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect()
}
