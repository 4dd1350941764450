use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Serialize, Deserialize};

use crate::lexicon_sort::SortField;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LexiconSettings {
    /// Trait names merged as a single option value instead of a collection.
    pub expected_option_traits: Vec<String>,
    /// Trait names known to be collections. Others are collections too, but
    /// get a debug log line.
    pub expected_option_collection_traits: Vec<String>,
    pub multitext_separator: String,
    pub note_separator: String,
    pub merge_policy: MergePolicyName,
    pub sort_writing_system: String,
    pub sort_field: SortField,
}

impl Default for LexiconSettings {
    fn default() -> Self {
        LexiconSettings {
            expected_option_traits: vec!["morph-type".to_string()],
            expected_option_collection_traits: vec!["semantic-domain-ddp4".to_string()],
            multitext_separator: "; ".to_string(),
            note_separator: " || ".to_string(),
            merge_policy: MergePolicyName::AlwaysNew,
            sort_writing_system: "en".to_string(),
            sort_field: SortField::Gloss,
        }
    }
}

impl LexiconSettings {
    pub fn load(path: &Path) -> Result<LexiconSettings> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Can't read settings: {}", path.display()))?;
        let settings: LexiconSettings = serde_json::from_str(&text)
            .with_context(|| format!("Can't parse settings: {}", path.display()))?;
        Ok(settings)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(self)?;
        fs::write(path, text)
            .with_context(|| format!("Can't write settings: {}", path.display()))?;
        Ok(())
    }

    /// Defaults when no path is given or the file doesn't exist yet.
    pub fn load_or_default(path: Option<&Path>) -> Result<LexiconSettings> {
        match path {
            Some(p) if p.exists() => LexiconSettings::load(p),
            _ => Ok(LexiconSettings::default()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MergePolicyName {
    #[serde(rename = "always-new")]
    AlwaysNew,
    #[serde(rename = "reuse-by-id")]
    ReuseById,
}
