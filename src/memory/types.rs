//! Core record type definitions.
//!
//! Defines [`ItemRecord`] (one knowledge item in the index), the closed
//! enumerations [`ItemType`], [`Status`] and [`Relation`], and [`Link`]
//! (a typed outgoing edge).

use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};

/// What kind of knowledge an item holds. Each type has its own recall threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    /// Reusable facts and how-to snippets.
    #[default]
    Knowledge,
    /// User preferences.
    Preference,
    /// Open tasks.
    Todo,
    /// Pointers to external material.
    Reference,
}

impl ItemType {
    pub const ALL: [ItemType; 4] = [
        Self::Knowledge,
        Self::Preference,
        Self::Todo,
        Self::Reference,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Knowledge => "knowledge",
            Self::Preference => "preference",
            Self::Todo => "todo",
            Self::Reference => "reference",
        }
    }

    /// Minimum blended score (0..=1) for semantic recall of this type.
    pub fn semantic_threshold(&self) -> f64 {
        match self {
            Self::Knowledge => 0.70,
            Self::Todo => 0.40,
            Self::Preference => 0.30,
            Self::Reference => 0.80,
        }
    }
}

impl std::fmt::Display for ItemType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ItemType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "knowledge" => Ok(Self::Knowledge),
            "preference" => Ok(Self::Preference),
            "todo" => Ok(Self::Todo),
            "reference" => Ok(Self::Reference),
            _ => Err(format!("unknown item type: {s}")),
        }
    }
}

/// Lifecycle status of an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    #[default]
    Active,
    /// Still recallable, but replaced or discouraged.
    Deprecated,
    /// Kept on disk, never recalled.
    Archived,
    Pending,
    Done,
}

impl Status {
    pub const ALL: [Status; 5] = [
        Self::Active,
        Self::Deprecated,
        Self::Archived,
        Self::Pending,
        Self::Done,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Deprecated => "deprecated",
            Self::Archived => "archived",
            Self::Pending => "pending",
            Self::Done => "done",
        }
    }

    /// Archived items are excluded from recall; everything else is eligible.
    pub fn is_recallable(&self) -> bool {
        !matches!(self, Self::Archived)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "deprecated" => Ok(Self::Deprecated),
            "archived" => Ok(Self::Archived),
            "pending" => Ok(Self::Pending),
            "done" => Ok(Self::Done),
            _ => Err(format!("unknown status: {s}")),
        }
    }
}

/// Edge label between two items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    #[default]
    Related,
    Supersedes,
    SupersededBy,
    Contradicts,
    Extends,
    /// Points at the code that implements the item.
    CodeRef,
}

impl Relation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Related => "related",
            Self::Supersedes => "supersedes",
            Self::SupersededBy => "superseded_by",
            Self::Contradicts => "contradicts",
            Self::Extends => "extends",
            Self::CodeRef => "code_ref",
        }
    }

    /// Relation written on the reverse edge of a bidirectional link.
    pub fn inverse(&self) -> Relation {
        match self {
            Self::Supersedes => Self::SupersededBy,
            Self::SupersededBy => Self::Supersedes,
            Self::Related => Self::Related,
            Self::Contradicts => Self::Contradicts,
            Self::Extends | Self::CodeRef => Self::Related,
        }
    }
}

impl std::fmt::Display for Relation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Relation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "related" => Ok(Self::Related),
            "supersedes" => Ok(Self::Supersedes),
            "superseded_by" => Ok(Self::SupersededBy),
            "contradicts" => Ok(Self::Contradicts),
            "extends" => Ok(Self::Extends),
            "code_ref" => Ok(Self::CodeRef),
            _ => Err(format!("unknown relation: {s}")),
        }
    }
}

/// A typed outgoing edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub target: String,
    pub relation: Relation,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub note: String,
}

/// What makes an item fire during keyword recall.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Triggers {
    /// Case-insensitive keywords, deduplicated, in insertion order.
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Regex patterns that passed validation when the item was saved.
    #[serde(default)]
    pub patterns: Vec<String>,
}

impl Triggers {
    /// Build from raw keywords, dropping blanks and case-insensitive repeats.
    pub fn with_keywords<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut triggers = Self::default();
        for keyword in keywords {
            triggers.push_keyword(keyword.as_ref());
        }
        triggers
    }

    pub fn push_keyword(&mut self, keyword: &str) {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            return;
        }
        let lowered = keyword.to_lowercase();
        if !self.keywords.iter().any(|k| k.to_lowercase() == lowered) {
            self.keywords.push(keyword.to_string());
        }
    }
}

/// Which skills an item applies to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemScope {
    /// Empty means global.
    #[serde(default)]
    pub skills: Vec<String>,
    /// Inject on every recall in scope, regardless of the query.
    #[serde(default)]
    pub always_inject: bool,
}

impl ItemScope {
    pub fn is_global(&self) -> bool {
        self.skills.is_empty()
    }

    /// Whether a caller in `caller_scope` may see this item.
    pub fn admits(&self, caller_scope: Option<&str>) -> bool {
        if self.is_global() {
            return true;
        }
        caller_scope.is_some_and(|scope| self.skills.iter().any(|s| s == scope))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemMetadata {
    /// Creation date, `YYYY-MM-DD` or RFC 3339.
    pub created: String,
    /// Free-text provenance.
    #[serde(default)]
    pub source: String,
    /// Estimated token count of the body.
    #[serde(default)]
    pub tokens: usize,
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub item_type: ItemType,
}

impl ItemMetadata {
    /// Parsed creation date, or `None` when the stored value is not a date.
    pub fn created_date(&self) -> Option<NaiveDate> {
        parse_date(&self.created)
    }
}

/// One knowledge item as recorded in the index. The body lives in `storage_path`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRecord {
    pub id: String,
    /// Path of the body, relative to the storage root.
    pub storage_path: String,
    #[serde(default)]
    pub triggers: Triggers,
    #[serde(default)]
    pub scope: ItemScope,
    pub metadata: ItemMetadata,
    #[serde(default)]
    pub links: Vec<Link>,
}

impl ItemRecord {
    pub fn link_to(&self, target: &str) -> Option<&Link> {
        self.links.iter().find(|l| l.target == target)
    }
}

/// Accept a plain date or a full RFC 3339 timestamp.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(value).ok().map(|dt| dt.date_naive()))
}

/// Rough token count for a body of text.
pub fn estimate_tokens(text: &str) -> usize {
    text.len() / 4
}
