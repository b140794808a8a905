//! Domain types for tracked items and their synchronization state.
//!
//! Everything here is plain data: serializable with serde (JSON for the
//! ledger and the daemon protocol, YAML where it ends up in config).

use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::InvalidItemId;

// ---------------------------------------------------------------------------
// Item kinds
// ---------------------------------------------------------------------------

/// The category of a tracked artifact.
///
/// Resolved once from the item ID: `skills/…`, `souls/…` and `memory/…`
/// prefixes select the document kinds, anything else is a DAG.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    #[default]
    Dag,
    Skill,
    Soul,
    Memory,
}

impl ItemKind {
    pub fn all() -> &'static [ItemKind] {
        &[ItemKind::Dag, ItemKind::Skill, ItemKind::Soul, ItemKind::Memory]
    }

    /// First path segment that marks an ID as this kind. DAGs have none.
    pub fn prefix(self) -> Option<&'static str> {
        match self {
            ItemKind::Dag => None,
            ItemKind::Skill => Some("skills"),
            ItemKind::Soul => Some("souls"),
            ItemKind::Memory => Some("memory"),
        }
    }

    /// File extension used both locally and in the remote repository.
    pub fn extension(self) -> &'static str {
        match self {
            ItemKind::Dag => "yaml",
            ItemKind::Skill | ItemKind::Soul | ItemKind::Memory => "md",
        }
    }

    /// Kind implied by a raw ID string.
    pub fn for_id(id: &str) -> ItemKind {
        let first = id.split('/').next().unwrap_or_default();
        let has_name = id.len() > first.len();
        ItemKind::all()
            .iter()
            .copied()
            .find(|kind| has_name && kind.prefix() == Some(first))
            .unwrap_or(ItemKind::Dag)
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemKind::Dag => write!(f, "dag"),
            ItemKind::Skill => write!(f, "skill"),
            ItemKind::Soul => write!(f, "soul"),
            ItemKind::Memory => write!(f, "memory"),
        }
    }
}

// ---------------------------------------------------------------------------
// Item IDs
// ---------------------------------------------------------------------------

/// A validated, relative item identifier such as `etl_daily` or
/// `memory/team/notes`.
///
/// Construction goes through [`ItemId::parse`], so an `ItemId` can always be
/// joined onto a directory without escaping it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ItemId(String);

impl ItemId {
    pub fn parse(raw: impl Into<String>) -> Result<Self, InvalidItemId> {
        let raw = raw.into();
        match check_item_id(&raw) {
            Ok(()) => Ok(Self(raw)),
            Err(reason) => Err(InvalidItemId {
                id: raw,
                reason: reason.to_string(),
            }),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn kind(&self) -> ItemKind {
        ItemKind::for_id(&self.0)
    }

    /// Relative file path for this item: `<id>.<ext>`.
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.0, self.kind().extension())
    }

    /// Inverse of [`ItemId::file_name`]. Returns `None` for paths that do
    /// not name a valid item of the kind their extension implies.
    pub fn from_file_name(relative: &str) -> Option<Self> {
        let (stem, ext) = relative.rsplit_once('.')?;
        let id = Self::parse(stem).ok()?;
        (id.kind().extension() == ext).then_some(id)
    }
}

fn check_item_id(raw: &str) -> Result<(), &'static str> {
    if raw.is_empty() {
        return Err("must not be empty");
    }
    if raw.contains('\\') {
        return Err("must not contain backslashes");
    }
    if raw.starts_with('/') {
        return Err("must be a relative path");
    }
    for segment in raw.split('/') {
        if segment.is_empty() {
            return Err("must not contain empty path segments");
        }
        if segment == "." || segment == ".." {
            return Err("must not contain '.' or '..' segments");
        }
        if segment.starts_with('.') {
            return Err("path segments must not start with '.'");
        }
        if !segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        {
            return Err("only ASCII letters, digits, '-', '_' and '.' are allowed");
        }
    }
    if ItemKind::for_id(raw) == ItemKind::Dag && raw.contains('/') {
        return Err("DAG ids must be a single path segment");
    }
    Ok(())
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for ItemId {
    type Err = InvalidItemId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ItemId {
    type Error = InvalidItemId;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(s)
    }
}

impl From<ItemId> for String {
    fn from(id: ItemId) -> Self {
        id.0
    }
}

impl AsRef<str> for ItemId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for ItemId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// Status enums
// ---------------------------------------------------------------------------

/// Per-item synchronization status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    #[default]
    Synced,
    Modified,
    Untracked,
    Conflict,
    Missing,
    Error,
}

impl SyncStatus {
    /// Statuses a batch publish picks up by default.
    pub fn is_publishable(self) -> bool {
        matches!(self, SyncStatus::Modified | SyncStatus::Untracked)
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncStatus::Synced => write!(f, "synced"),
            SyncStatus::Modified => write!(f, "modified"),
            SyncStatus::Untracked => write!(f, "untracked"),
            SyncStatus::Conflict => write!(f, "conflict"),
            SyncStatus::Missing => write!(f, "missing"),
            SyncStatus::Error => write!(f, "error"),
        }
    }
}

/// Aggregate status across all items. Variants are ordered by severity so
/// `max` picks the one to report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SummaryStatus {
    #[default]
    Synced,
    Missing,
    Pending,
    Conflict,
    Error,
}

impl From<SyncStatus> for SummaryStatus {
    fn from(status: SyncStatus) -> Self {
        match status {
            SyncStatus::Synced => SummaryStatus::Synced,
            SyncStatus::Modified | SyncStatus::Untracked => SummaryStatus::Pending,
            SyncStatus::Conflict => SummaryStatus::Conflict,
            SyncStatus::Missing => SummaryStatus::Missing,
            SyncStatus::Error => SummaryStatus::Error,
        }
    }
}

impl fmt::Display for SummaryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SummaryStatus::Synced => write!(f, "synced"),
            SummaryStatus::Missing => write!(f, "missing"),
            SummaryStatus::Pending => write!(f, "pending"),
            SummaryStatus::Conflict => write!(f, "conflict"),
            SummaryStatus::Error => write!(f, "error"),
        }
    }
}

/// Outcome of the most recent remote round-trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LastSyncStatus {
    Success,
    Error,
}

// ---------------------------------------------------------------------------
// Domain structs
// ---------------------------------------------------------------------------

/// One tracked artifact as recorded in the status ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncItem {
    pub item_id: ItemId,
    pub kind: ItemKind,
    pub status: SyncStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_status: Option<SyncStatus>,

    /// Remote commit last known to match the local content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_commit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_synced_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_synced_at: Option<DateTime<Utc>>,
    /// `None` iff the local file does not exist.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_commit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conflict_detected_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub missing_at: Option<DateTime<Utc>>,
}

impl SyncItem {
    /// A fresh entry with no baseline, as first observed locally.
    pub fn untracked(item_id: ItemId, local_hash: String, now: DateTime<Utc>) -> Self {
        Self {
            kind: item_id.kind(),
            item_id,
            status: SyncStatus::Untracked,
            previous_status: None,
            base_commit: None,
            last_synced_hash: None,
            last_synced_at: None,
            local_hash: Some(local_hash),
            modified_at: Some(now),
            remote_commit: None,
            remote_author: None,
            remote_message: None,
            conflict_detected_at: None,
            missing_at: None,
        }
    }

    /// A fresh entry whose local content matches `commit`.
    pub fn synced(item_id: ItemId, hash: String, commit: String, now: DateTime<Utc>) -> Self {
        Self {
            kind: item_id.kind(),
            item_id,
            status: SyncStatus::Synced,
            previous_status: None,
            base_commit: Some(commit),
            last_synced_hash: Some(hash.clone()),
            last_synced_at: Some(now),
            local_hash: Some(hash),
            modified_at: None,
            remote_commit: None,
            remote_author: None,
            remote_message: None,
            conflict_detected_at: None,
            missing_at: None,
        }
    }

    /// Whether this entry has a remote baseline.
    pub fn has_baseline(&self) -> bool {
        self.base_commit.is_some() && self.last_synced_hash.is_some()
    }
}

/// Per-status tallies for [`OverallStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct StatusCounts {
    pub synced: usize,
    pub modified: usize,
    pub untracked: usize,
    pub conflict: usize,
    pub missing: usize,
}

impl StatusCounts {
    pub fn tally<'a>(statuses: impl IntoIterator<Item = &'a SyncStatus>) -> Self {
        let mut counts = Self::default();
        for status in statuses {
            match status {
                SyncStatus::Synced => counts.synced += 1,
                SyncStatus::Modified => counts.modified += 1,
                SyncStatus::Untracked => counts.untracked += 1,
                SyncStatus::Conflict => counts.conflict += 1,
                SyncStatus::Missing => counts.missing += 1,
                SyncStatus::Error => {}
            }
        }
        counts
    }
}

/// A single failed item inside a batch operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemError {
    pub item_id: String,
    pub message: String,
}

/// Outcome of a pull or publish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResult {
    pub success: bool,
    pub message: String,
    #[serde(default)]
    pub synced: Vec<ItemId>,
    #[serde(default)]
    pub modified: Vec<ItemId>,
    #[serde(default)]
    pub conflicts: Vec<ItemId>,
    #[serde(default)]
    pub errors: Vec<ItemError>,
    pub timestamp: DateTime<Utc>,
}

impl SyncResult {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            synced: Vec::new(),
            modified: Vec::new(),
            conflicts: Vec::new(),
            errors: Vec::new(),
            timestamp: Utc::now(),
        }
    }
}

/// Snapshot of the whole engine for status views.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct OverallStatus {
    pub enabled: bool,
    pub repository: String,
    pub branch: String,
    pub summary: SummaryStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync_commit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync_status: Option<LastSyncStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default)]
    pub items: BTreeMap<ItemId, SyncItem>,
    pub counts: StatusCounts,
}

/// Result of a reachability check. Failures are data, not errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionResult {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
