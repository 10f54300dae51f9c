//! Entity domain model.
//!
//! # Responsibility
//! - Define the record stored in named entity lists.
//! - Validate list names, entity ids and property names before persistence.
//!
//! # Invariants
//! - `id` is unique within one list; lists are the uniqueness scope.
//! - `version` starts at 1 and only grows on the server side.
//! - Property names are unique within one entity and never shadow the
//!   reserved `name`/`label` columns.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Maximum length for list names and entity ids.
pub const MAX_NAME_CHARS: usize = 255;

/// Query column addressing the entity id.
pub const ID_COLUMN: &str = "name";
/// Query column addressing the entity label.
pub const LABEL_COLUMN: &str = "label";
/// Query column addressing the entity version.
pub const VERSION_COLUMN: &str = "__version";

const RESERVED_PREFIX: &str = "__";

static LIST_NAME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_\-]*$").expect("valid list name regex"));
static PROPERTY_NAME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_\-.]*$").expect("valid property name regex"));

/// Sync state of one entity relative to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityState {
    /// Created or edited locally; the server has not confirmed it yet.
    Offline,
    /// Known to the server.
    Online,
}

impl EntityState {
    /// Stable string stored in the `entities.state` column.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Offline => "offline",
            Self::Online => "online",
        }
    }

    /// Parses a stored state value.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "offline" => Some(Self::Offline),
            "online" => Some(Self::Online),
            _ => None,
        }
    }
}

/// One record in an entity list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    /// Identifier, unique within its list.
    pub id: String,
    pub label: Option<String>,
    /// Server version, `>= 1`.
    pub version: i64,
    /// Ordered `(name, value)` pairs.
    pub properties: Vec<(String, String)>,
    pub state: EntityState,
    /// Server version this local copy was branched from.
    pub trunk_version: Option<i64>,
    /// Local edit branch; regenerated whenever a new local edit starts.
    pub branch_id: String,
}

impl Entity {
    /// Creates a local (offline) entity at version 1 with a fresh branch id.
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: Some(label.into()),
            version: 1,
            properties: Vec::new(),
            state: EntityState::Offline,
            trunk_version: None,
            branch_id: Uuid::new_v4().to_string(),
        }
    }

    /// Builder-style helper that appends or replaces one property.
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_property(name, value);
        self
    }

    /// Sets one property, keeping the original position when it already exists.
    pub fn set_property(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.properties.iter_mut().find(|(key, _)| *key == name) {
            Some(existing) => existing.1 = value,
            None => self.properties.push((name, value)),
        }
    }

    /// Returns the value of one property, if set.
    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Returns the string a query column resolves to for this entity.
    ///
    /// Absent labels and properties resolve to `""`.
    pub fn column_value(&self, column: &str) -> String {
        match column {
            ID_COLUMN => self.id.clone(),
            LABEL_COLUMN => self.label.clone().unwrap_or_default(),
            VERSION_COLUMN => self.version.to_string(),
            other => self.property(other).unwrap_or_default().to_string(),
        }
    }

    /// Marks this entity as confirmed by the server at its current version.
    pub fn into_online(mut self) -> Self {
        self.state = EntityState::Online;
        self.trunk_version = Some(self.version);
        self
    }

    pub fn is_offline(&self) -> bool {
        self.state == EntityState::Offline
    }

    /// Checks record-level invariants before persistence.
    pub fn validate(&self) -> Result<(), EntityValidationError> {
        if self.id.trim().is_empty() {
            return Err(EntityValidationError::BlankId);
        }
        if self.id.chars().count() > MAX_NAME_CHARS {
            return Err(EntityValidationError::IdTooLong(self.id.clone()));
        }
        if self.version < 1 {
            return Err(EntityValidationError::InvalidVersion {
                id: self.id.clone(),
                version: self.version,
            });
        }
        if let Some(trunk) = self.trunk_version {
            if trunk < 1 {
                return Err(EntityValidationError::InvalidVersion {
                    id: self.id.clone(),
                    version: trunk,
                });
            }
        }

        let mut seen = HashSet::new();
        for (name, _) in &self.properties {
            if !is_valid_property_name(name) {
                return Err(EntityValidationError::InvalidPropertyName {
                    id: self.id.clone(),
                    name: name.clone(),
                });
            }
            if !seen.insert(name.as_str()) {
                return Err(EntityValidationError::DuplicateProperty {
                    id: self.id.clone(),
                    name: name.clone(),
                });
            }
        }

        Ok(())
    }
}

/// Entity as read back from a list, with its ordinal position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedEntity {
    /// Zero-based position within the list's unfiltered ordering.
    pub index: usize,
    #[serde(flatten)]
    pub entity: Entity,
}

impl SavedEntity {
    pub fn id(&self) -> &str {
        &self.entity.id
    }
}

/// Reasons an entity is rejected before persistence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityValidationError {
    BlankId,
    IdTooLong(String),
    InvalidVersion { id: String, version: i64 },
    InvalidPropertyName { id: String, name: String },
    DuplicateProperty { id: String, name: String },
}

impl Display for EntityValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankId => write!(f, "entity id cannot be blank"),
            Self::IdTooLong(id) => write!(
                f,
                "entity id exceeds {MAX_NAME_CHARS} characters: {}...",
                id.chars().take(32).collect::<String>()
            ),
            Self::InvalidVersion { id, version } => {
                write!(f, "entity `{id}` has invalid version {version}; expected >= 1")
            }
            Self::InvalidPropertyName { id, name } => {
                write!(f, "entity `{id}` has invalid property name `{name}`")
            }
            Self::DuplicateProperty { id, name } => {
                write!(f, "entity `{id}` declares property `{name}` more than once")
            }
        }
    }
}

impl Error for EntityValidationError {}

/// Returns whether `list` is an acceptable list name.
pub fn is_valid_list_name(list: &str) -> bool {
    list.chars().count() <= MAX_NAME_CHARS && LIST_NAME_PATTERN.is_match(list)
}

/// Returns whether `name` can be used as a property name.
pub fn is_valid_property_name(name: &str) -> bool {
    name != ID_COLUMN
        && name != LABEL_COLUMN
        && !name.starts_with(RESERVED_PREFIX)
        && PROPERTY_NAME_PATTERN.is_match(name)
}
