//! The extensible, typed field set each lexicon record carries.

use serde::{Deserialize, Serialize};

use crate::error::PropertyError;
use crate::multitext::MultiText;

/// A reference to one value of an option list, e.g. a part of speech.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionRef {
    pub value: String,
    #[serde(default)]
    pub starred: bool,
}

/// Keys of an option list, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionRefCollection {
    pub keys: Vec<String>,
}

impl OptionRefCollection {
    pub fn add(&mut self, key: impl Into<String>) {
        self.keys.push(key.into());
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.iter().any(|k| k == key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectKind {
    Entry,
    Sense,
    Example,
}

/// A typed link to another record. The target is kept as the external id
/// found in the source and resolved against a repository on demand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LexRelation {
    pub field_id: String,
    pub target_id: String,
    pub owner: ObjectKind,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LexRelationCollection {
    pub relations: Vec<LexRelation>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PictureRef {
    pub value: String,
    pub caption: Option<MultiText>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum PropertyValue {
    MultiText(MultiText),
    OptionRef(OptionRef),
    OptionRefs(OptionRefCollection),
    Relations(LexRelationCollection),
    Picture(PictureRef),
    Flag(bool),
}

impl PropertyValue {
    pub fn kind_name(&self) -> &'static str {
        match self {
            PropertyValue::MultiText(_) => MultiText::KIND,
            PropertyValue::OptionRef(_) => OptionRef::KIND,
            PropertyValue::OptionRefs(_) => OptionRefCollection::KIND,
            PropertyValue::Relations(_) => LexRelationCollection::KIND,
            PropertyValue::Picture(_) => PictureRef::KIND,
            PropertyValue::Flag(_) => "flag",
        }
    }
}

/// Value types that can live in a [`PropertyBag`].
pub trait PropertyKind: Default + Sized {
    const KIND: &'static str;

    fn from_value(value: &PropertyValue) -> Option<&Self>;
    fn from_value_mut(value: &mut PropertyValue) -> Option<&mut Self>;
    fn into_value(self) -> PropertyValue;
}

macro_rules! property_kind {
    ($ty:ty, $variant:ident, $kind:literal) => {
        impl PropertyKind for $ty {
            const KIND: &'static str = $kind;

            fn from_value(value: &PropertyValue) -> Option<&Self> {
                match value {
                    PropertyValue::$variant(x) => Some(x),
                    _ => None,
                }
            }

            fn from_value_mut(value: &mut PropertyValue) -> Option<&mut Self> {
                match value {
                    PropertyValue::$variant(x) => Some(x),
                    _ => None,
                }
            }

            fn into_value(self) -> PropertyValue {
                PropertyValue::$variant(self)
            }
        }
    };
}

property_kind!(MultiText, MultiText, "multitext");
property_kind!(OptionRef, OptionRef, "option");
property_kind!(OptionRefCollection, OptionRefs, "option collection");
property_kind!(LexRelationCollection, Relations, "relation collection");
property_kind!(PictureRef, Picture, "picture");

/// Named values in insertion order.
///
/// Names are not unique at this level (imported custom fields are appended
/// as they come), but the typed accessors treat the first value with a name
/// as the canonical one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PropertyBag {
    properties: Vec<(String, PropertyValue)>,
}

impl PropertyBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PropertyValue)> {
        self.properties.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<&PropertyValue> {
        self.position(name).map(|i| &self.properties[i].1)
    }

    /// Appends a value, even when the name is already in use.
    pub fn add(&mut self, name: impl Into<String>, value: PropertyValue) {
        self.properties.push((name.into(), value));
    }

    /// Removes every value stored under `name`, returning how many there were.
    pub fn remove(&mut self, name: &str) -> usize {
        let before = self.properties.len();
        self.properties.retain(|(n, _)| n != name);
        before - self.properties.len()
    }

    pub fn get_property<T: PropertyKind>(&self, name: &str) -> Result<Option<&T>, PropertyError> {
        match self.get(name) {
            None => Ok(None),
            Some(value) => T::from_value(value)
                .map(Some)
                .ok_or_else(|| mismatch::<T>(name, value)),
        }
    }

    /// Returns the value stored under `name`, inserting a default one first
    /// when the name is unused.
    pub fn get_or_create_property<T: PropertyKind>(&mut self, name: &str) -> Result<&mut T, PropertyError> {
        let i = match self.position(name) {
            Some(i) => i,
            None => {
                self.properties.push((name.to_string(), T::default().into_value()));
                self.properties.len() - 1
            }
        };

        let value = &mut self.properties[i].1;
        let found = value.kind_name();
        T::from_value_mut(value).ok_or_else(|| PropertyError {
            name: name.to_string(),
            expected: T::KIND,
            found,
        })
    }

    pub fn set_flag(&mut self, name: &str) -> Result<(), PropertyError> {
        self.set_flag_value(name, true)
    }

    pub fn clear_flag(&mut self, name: &str) -> Result<(), PropertyError> {
        self.set_flag_value(name, false)
    }

    pub fn get_flag(&self, name: &str) -> bool {
        matches!(self.get(name), Some(PropertyValue::Flag(true)))
    }

    fn set_flag_value(&mut self, name: &str, on: bool) -> Result<(), PropertyError> {
        match self.position(name) {
            Some(i) => match &mut self.properties[i].1 {
                PropertyValue::Flag(x) => {
                    *x = on;
                    Ok(())
                }
                other => Err(PropertyError {
                    name: name.to_string(),
                    expected: "flag",
                    found: other.kind_name(),
                }),
            },
            None => {
                self.properties.push((name.to_string(), PropertyValue::Flag(on)));
                Ok(())
            }
        }
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.properties.iter().position(|(n, _)| n == name)
    }
}

fn mismatch<T: PropertyKind>(name: &str, found: &PropertyValue) -> PropertyError {
    PropertyError {
        name: name.to_string(),
        expected: T::KIND,
        found: found.kind_name(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_or_create_inserts_default_once() {
        let mut bag = PropertyBag::new();
        bag.get_or_create_property::<OptionRef>("POS").unwrap().value = "noun".to_string();
        let pos = bag.get_or_create_property::<OptionRef>("POS").unwrap();
        assert_eq!(pos.value, "noun");
        assert_eq!(bag.len(), 1);
    }

    #[test]
    fn test_get_or_create_type_mismatch() {
        let mut bag = PropertyBag::new();
        bag.get_or_create_property::<MultiText>("note").unwrap();
        let err = bag.get_or_create_property::<OptionRef>("note").unwrap_err();
        assert_eq!(err.expected, "option");
        assert_eq!(err.found, "multitext");
    }

    #[test]
    fn test_first_match_is_canonical() {
        let mut bag = PropertyBag::new();
        bag.add("custom", PropertyValue::MultiText(MultiText::from_pairs([("en", "first")])));
        bag.add("custom", PropertyValue::MultiText(MultiText::from_pairs([("en", "second")])));
        assert_eq!(bag.len(), 2);

        let first = bag.get_property::<MultiText>("custom").unwrap().unwrap();
        assert_eq!(first.get_exact_alternative("en"), "first");
        assert_eq!(bag.remove("custom"), 2);
        assert!(bag.is_empty());
    }

    #[test]
    fn test_flags() {
        let mut bag = PropertyBag::new();
        assert!(!bag.get_flag("flag_obsolete"));
        bag.set_flag("flag_obsolete").unwrap();
        assert!(bag.get_flag("flag_obsolete"));
        bag.clear_flag("flag_obsolete").unwrap();
        assert!(!bag.get_flag("flag_obsolete"));
        assert_eq!(bag.len(), 1);
    }

    #[test]
    fn test_flag_over_other_kind_fails() {
        let mut bag = PropertyBag::new();
        bag.get_or_create_property::<OptionRefCollection>("flag_x").unwrap();
        assert!(bag.set_flag("flag_x").is_err());
    }
}
