//! Modification history records.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// What kind of action produced a history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModificationType {
    Autofix,
    Manual,
    BuilderPrompt,
    GitImport,
}

impl ModificationType {
    pub const ALL: [ModificationType; 4] = [
        ModificationType::Autofix,
        ModificationType::Manual,
        ModificationType::BuilderPrompt,
        ModificationType::GitImport,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Autofix => "autofix",
            Self::Manual => "manual",
            Self::BuilderPrompt => "builder_prompt",
            Self::GitImport => "git_import",
        }
    }

    pub fn from_db_value(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == value)
    }
}

impl std::fmt::Display for ModificationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModificationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db_value(s).ok_or_else(|| {
            format!(
                "unknown modification type '{s}' (expected one of: autofix, manual, builder_prompt, git_import)"
            )
        })
    }
}

/// Treat an explicit JSON `null` like a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Timestamps are written with a fixed microsecond precision so that the
/// backend's text ordering and chronological ordering agree.
mod timestamp_format {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Micros, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

/// One immutable row of the modification history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModificationEntry {
    pub id: Uuid,

    #[serde(with = "timestamp_format")]
    pub timestamp: DateTime<Utc>,

    #[serde(rename = "type")]
    pub kind: ModificationType,

    /// Business area the action touched (`stripe`, `jornadas`, `audit`, ...).
    pub module: String,

    pub description: String,

    /// Ordered, human-readable list of what changed.
    #[serde(default, deserialize_with = "null_as_default")]
    pub changes: Vec<String>,

    pub success: bool,

    #[serde(default, deserialize_with = "null_as_default")]
    pub context: Map<String, Value>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub metadata: Map<String, Value>,
}

/// A history entry before the recorder assigns its id and timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct NewModification {
    pub kind: ModificationType,
    pub module: String,
    pub description: String,
    pub changes: Vec<String>,
    pub success: bool,
    pub context: Map<String, Value>,
    pub metadata: Map<String, Value>,
}

impl NewModification {
    pub fn new(
        kind: ModificationType,
        module: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            module: module.into(),
            description: description.into(),
            changes: Vec::new(),
            success: true,
            context: Map::new(),
            metadata: Map::new(),
        }
    }

    pub fn with_changes(mut self, changes: Vec<String>) -> Self {
        self.changes = changes;
        self
    }

    pub fn with_success(mut self, success: bool) -> Self {
        self.success = success;
        self
    }

    pub fn with_context(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.context.insert(key.to_string(), value.into());
        self
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// Stamp the entry with a fresh id and the current time.
    pub fn into_entry(self) -> ModificationEntry {
        ModificationEntry {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            kind: self.kind,
            module: self.module,
            description: self.description,
            changes: self.changes,
            success: self.success,
            context: self.context,
            metadata: self.metadata,
        }
    }
}

/// Default page size for history reads.
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Filters for reading the history (newest first).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryQuery {
    pub limit: usize,
    pub offset: usize,
    pub module: Option<String>,
    pub kind: Option<ModificationType>,
}

impl Default for HistoryQuery {
    fn default() -> Self {
        Self {
            limit: DEFAULT_HISTORY_LIMIT,
            offset: 0,
            module: None,
            kind: None,
        }
    }
}

impl HistoryQuery {
    pub fn latest(limit: usize) -> Self {
        Self {
            limit,
            ..Self::default()
        }
    }

    pub fn module(mut self, module: impl Into<String>) -> Self {
        self.module = Some(module.into());
        self
    }

    pub fn kind(mut self, kind: ModificationType) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }
}

/// Aggregate counts over the whole history.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemStats {
    pub total_modifications: u64,
    pub successful: u64,
    pub failed: u64,
    pub by_type: BTreeMap<ModificationType, u64>,
    pub by_module: BTreeMap<String, u64>,
    pub last_modification: Option<DateTime<Utc>>,
}

impl SystemStats {
    /// Fold one entry into the aggregate.
    pub fn observe(
        &mut self,
        kind: ModificationType,
        module: &str,
        success: bool,
        at: DateTime<Utc>,
    ) {
        self.total_modifications += 1;
        if success {
            self.successful += 1;
        } else {
            self.failed += 1;
        }
        *self.by_type.entry(kind).or_insert(0) += 1;
        *self.by_module.entry(module.to_string()).or_insert(0) += 1;
        if self.last_modification.map_or(true, |last| at > last) {
            self.last_modification = Some(at);
        }
    }

    /// Share of successful entries, `None` on an empty history.
    pub fn success_rate(&self) -> Option<f64> {
        if self.total_modifications == 0 {
            None
        } else {
            Some(self.successful as f64 / self.total_modifications as f64)
        }
    }
}

/// A batch of commits pulled in from a git repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitImport {
    pub repository: String,
    pub branch: String,
    pub commits: Vec<String>,
    pub files_changed: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn modification_type_db_values_round_trip() {
        for kind in ModificationType::ALL {
            assert_eq!(ModificationType::from_db_value(kind.as_str()), Some(kind));
            assert_eq!(
                serde_json::to_value(kind).unwrap(),
                Value::String(kind.as_str().to_string())
            );
        }
        assert!("chat".parse::<ModificationType>().is_err());
    }

    #[test]
    fn entry_serializes_type_column_and_fixed_precision_timestamp() {
        let entry = NewModification::new(ModificationType::Autofix, "stripe", "seed")
            .with_changes(vec!["3 produtos criados".to_string()])
            .with_context("patch_code", "STRIPE_SEED")
            .into_entry();

        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["type"], "autofix");
        assert_eq!(value["context"]["patch_code"], "STRIPE_SEED");

        let ts = value["timestamp"].as_str().unwrap();
        assert!(ts.ends_with('Z'));
        // yyyy-mm-ddThh:mm:ss.uuuuuuZ
        assert_eq!(ts.len(), 27);
    }

    #[test]
    fn entry_accepts_backend_row_with_nulls_and_offset() {
        let row = json!({
            "id": "5f1f9a3e-2a7c-4d0b-9a55-2d9c3f1b7e10",
            "timestamp": "2024-05-02T13:45:10.123456+00:00",
            "type": "git_import",
            "module": "git",
            "description": "Imported 2 commits",
            "changes": null,
            "success": true,
            "context": null,
        });
        let entry: ModificationEntry = serde_json::from_value(row).unwrap();
        assert_eq!(entry.kind, ModificationType::GitImport);
        assert!(entry.changes.is_empty());
        assert!(entry.context.is_empty());
        assert!(entry.metadata.is_empty());
    }

    #[test]
    fn stats_track_latest_and_rates() {
        let mut stats = SystemStats::default();
        let early = "2024-01-01T00:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let late = "2024-06-01T00:00:00Z".parse::<DateTime<Utc>>().unwrap();

        stats.observe(ModificationType::Autofix, "stripe", true, late);
        stats.observe(ModificationType::Manual, "audit", false, early);

        assert_eq!(stats.total_modifications, 2);
        assert_eq!(stats.successful, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.by_type[&ModificationType::Autofix], 1);
        assert_eq!(stats.by_module["audit"], 1);
        assert_eq!(stats.last_modification, Some(late));
        assert_eq!(stats.success_rate(), Some(0.5));
        assert_eq!(SystemStats::default().success_rate(), None);
    }

    #[test]
    fn history_query_defaults() {
        let q = HistoryQuery::default();
        assert_eq!(q.limit, DEFAULT_HISTORY_LIMIT);
        assert_eq!(q.offset, 0);
        let q = HistoryQuery::latest(1).module("crm").kind(ModificationType::Manual);
        assert_eq!(q.limit, 1);
        assert_eq!(q.module.as_deref(), Some("crm"));
        assert_eq!(q.kind, Some(ModificationType::Manual));
    }
}
