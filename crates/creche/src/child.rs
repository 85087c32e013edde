//! Child profile records and registration input.
//!
//! [`ChildRecord`] is the stored profile. [`NewChild`] and [`ChildUpdate`]
//! carry raw caller input and know how to validate and clean it.

use std::collections::HashSet;
use std::sync::OnceLock;

use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::RegistrationConfig;
use crate::error::{Error, Result};
use crate::identity::{normalize_name, KEY_DELIMITER};
use crate::store::{Document, StoreResult};

/// Calendar date format used in keys and records.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// A stored child profile.
///
/// `id`, `parent_id` and `date_of_birth` never change after creation;
/// `name` and `allergies` may be edited by the owning parent or an admin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildRecord {
    /// Derived key, see [`crate::identity::derive_child_key`].
    pub id: String,
    /// Registering parent's user id.
    pub parent_id: String,
    /// Display name as entered.
    pub name: String,
    /// `YYYY-MM-DD`.
    pub date_of_birth: String,
    /// Known allergies, in the order entered.
    #[serde(default)]
    pub allergies: Vec<String>,
    /// Server-assigned creation time.
    pub created_at: DateTime<Utc>,
    /// Server-assigned time of the last write.
    pub updated_at: DateTime<Utc>,
}

/// Fields stored in the document body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ChildBody {
    pub parent_id: String,
    pub name: String,
    pub date_of_birth: String,
    #[serde(default)]
    pub allergies: Vec<String>,
}

impl ChildBody {
    pub(crate) fn to_value(&self) -> StoreResult<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

impl ChildRecord {
    /// Build a record from a stored document.
    ///
    /// # Errors
    ///
    /// Returns an error if the body is missing required fields.
    pub fn from_document(doc: &Document) -> StoreResult<Self> {
        let body: ChildBody = serde_json::from_value(doc.body.clone())?;
        Ok(Self {
            id: doc.key.clone(),
            parent_id: body.parent_id,
            name: body.name,
            date_of_birth: body.date_of_birth,
            allergies: body.allergies,
            created_at: doc.created_at,
            updated_at: doc.updated_at,
        })
    }

    /// Slug the identity key was derived from.
    #[must_use]
    pub fn normalized_name(&self) -> String {
        normalize_name(&self.name)
    }
}

/// Raw registration input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewChild {
    /// Registering parent's user id.
    pub parent_id: String,
    /// Display name as typed.
    pub name: String,
    /// Birth date, expected `YYYY-MM-DD`.
    pub date_of_birth: String,
    /// Allergies as typed.
    #[serde(default)]
    pub allergies: Vec<String>,
}

impl NewChild {
    /// Create registration input.
    #[must_use]
    pub fn new(
        parent_id: impl Into<String>,
        name: impl Into<String>,
        date_of_birth: impl Into<String>,
    ) -> Self {
        Self {
            parent_id: parent_id.into(),
            name: name.into(),
            date_of_birth: date_of_birth.into(),
            allergies: Vec::new(),
        }
    }

    /// Add allergies.
    #[must_use]
    pub fn with_allergies<I, S>(mut self, allergies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allergies = allergies.into_iter().map(Into::into).collect();
        self
    }

    /// Validate and return a cleaned copy.
    ///
    /// Cleaning trims the parent id and name and tidies the allergy list;
    /// the result derives the same key as the input would.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] naming the first offending field.
    pub fn validate(&self, rules: &RegistrationConfig, today: NaiveDate) -> Result<Self> {
        let parent_id = self.parent_id.trim();
        if parent_id.is_empty() {
            return Err(Error::validation("parentId", "must not be empty"));
        }
        if parent_id.contains(KEY_DELIMITER) {
            return Err(Error::validation(
                "parentId",
                format!("must not contain `{KEY_DELIMITER}`"),
            ));
        }

        let name = validate_name(&self.name, rules)?;

        let birth = parse_calendar_date("dateOfBirth", &self.date_of_birth)?;
        if birth > today && !rules.allow_future_birth_dates {
            return Err(Error::validation(
                "dateOfBirth",
                format!("{} is in the future", self.date_of_birth),
            ));
        }

        Ok(Self {
            parent_id: parent_id.to_string(),
            name,
            date_of_birth: self.date_of_birth.clone(),
            allergies: clean_allergies(&self.allergies, rules)?,
        })
    }
}

/// Editable profile fields. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChildUpdate {
    /// New display name. The record keeps its original id.
    pub name: Option<String>,
    /// Replacement allergy list.
    pub allergies: Option<Vec<String>>,
}

impl ChildUpdate {
    /// Whether the update changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.allergies.is_none()
    }

    /// Validate and turn into a merge patch for the stored body.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if a supplied field is invalid.
    pub fn to_patch(&self, rules: &RegistrationConfig) -> Result<Value> {
        let mut patch = Map::new();
        if let Some(name) = &self.name {
            patch.insert("name".to_string(), Value::from(validate_name(name, rules)?));
        }
        if let Some(allergies) = &self.allergies {
            patch.insert(
                "allergies".to_string(),
                Value::from(clean_allergies(allergies, rules)?),
            );
        }
        Ok(Value::Object(patch))
    }
}

/// Parse a strict `YYYY-MM-DD` calendar date.
///
/// # Errors
///
/// Returns [`Error::Validation`] for `field` if the shape is wrong or the date
/// does not exist.
///
/// # Panics
///
/// Panics only if the built-in date pattern fails to compile.
pub fn parse_calendar_date(field: &'static str, value: &str) -> Result<NaiveDate> {
    static DATE_SHAPE: OnceLock<Regex> = OnceLock::new();
    let shape = DATE_SHAPE.get_or_init(|| {
        Regex::new(r"^[0-9]{4}-[0-9]{2}-[0-9]{2}$").expect("Invalid regex pattern")
    });

    if !shape.is_match(value) {
        return Err(Error::validation(
            field,
            format!("`{value}` is not in YYYY-MM-DD form"),
        ));
    }
    NaiveDate::parse_from_str(value, DATE_FORMAT)
        .map_err(|_| Error::validation(field, format!("`{value}` is not a real calendar date")))
}

fn validate_name(name: &str, rules: &RegistrationConfig) -> Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(Error::validation("name", "must not be empty"));
    }
    if trimmed.chars().count() > rules.max_name_length {
        return Err(Error::validation(
            "name",
            format!("longer than {} characters", rules.max_name_length),
        ));
    }
    if normalize_name(trimmed).is_empty() {
        return Err(Error::validation(
            "name",
            "must contain at least one letter or digit",
        ));
    }
    Ok(trimmed.to_string())
}

/// Trim, drop blanks and case-insensitive repeats (first spelling wins).
fn clean_allergies(allergies: &[String], rules: &RegistrationConfig) -> Result<Vec<String>> {
    let mut seen = HashSet::new();
    let cleaned: Vec<String> = allergies
        .iter()
        .map(|a| a.trim())
        .filter(|a| !a.is_empty())
        .filter(|a| seen.insert(a.to_lowercase()))
        .map(str::to_string)
        .collect();

    if cleaned.len() > rules.max_allergies {
        return Err(Error::validation(
            "allergies",
            format!("at most {} entries allowed", rules.max_allergies),
        ));
    }
    Ok(cleaned)
}
