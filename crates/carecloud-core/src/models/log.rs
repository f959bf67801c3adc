//! Activity and incident log models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::store::{
    collections, set_all, Document, FieldWrite, StoreError, StoreResult, WriteSet,
};

/// Incident severity.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Severity {
    Low,
    Medium,
    High,
}

/// What a log entry records.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum LogKind {
    /// A routine activity (e.g. "meal", "walk")
    Activity {
        #[serde(rename = "activityType")]
        activity_type: String,
    },
    /// An incident with a severity
    Incident {
        #[serde(rename = "incidentType")]
        incident_type: String,
        severity: Severity,
    },
}

impl LogKind {
    /// Collection the entry is written to.
    pub fn collection(&self) -> &'static str {
        match self {
            LogKind::Activity { .. } => collections::ACTIVITIES,
            LogKind::Incident { .. } => collections::INCIDENTS,
        }
    }

    pub fn is_incident(&self) -> bool {
        matches!(self, LogKind::Incident { .. })
    }
}

/// A stored log entry. Append-only: never edited or deleted through the
/// data-access layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    /// Store-generated id
    pub id: String,
    /// Resident this entry refers to (no cascade in either direction)
    pub resident_id: String,
    #[serde(flatten)]
    pub kind: LogKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Stamped by the store at write time
    pub timestamp: DateTime<Utc>,
}

/// Payload for a new log entry. The id and timestamp come from the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewLog {
    pub resident_id: String,
    #[serde(flatten)]
    pub kind: LogKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl NewLog {
    /// Activity entry.
    pub fn activity(
        resident_id: String,
        activity_type: String,
        description: Option<String>,
    ) -> Self {
        Self {
            resident_id,
            kind: LogKind::Activity { activity_type },
            description,
        }
    }

    /// Incident entry.
    pub fn incident(
        resident_id: String,
        incident_type: String,
        severity: Severity,
        description: Option<String>,
    ) -> Self {
        Self {
            resident_id,
            kind: LogKind::Incident {
                incident_type,
                severity,
            },
            description,
        }
    }

    /// Writes for the store's `add`, with a server-stamped `timestamp`.
    pub fn to_write_set(&self) -> StoreResult<WriteSet> {
        let mut writes = set_all(serde_json::to_value(self)?)?;
        writes.insert("timestamp".to_string(), FieldWrite::ServerTimestamp);
        Ok(writes)
    }
}

/// Log fields as stored. Which kind fields apply depends on the collection
/// the document was read from, not on which fields happen to be present.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredLog {
    resident_id: String,
    activity_type: Option<String>,
    incident_type: Option<String>,
    severity: Option<Severity>,
    description: Option<String>,
    timestamp: DateTime<Utc>,
}

impl LogEntry {
    /// Map a document read from `collection` to a log entry.
    pub fn from_document(doc: Document, collection: &str) -> StoreResult<Self> {
        let Document { id, data } = doc;
        let invalid =
            |message: String| StoreError::InvalidDocument(format!("log {}: {}", id, message));

        let stored: StoredLog =
            serde_json::from_value(Value::Object(data)).map_err(|e| invalid(e.to_string()))?;

        let kind = match collection {
            collections::ACTIVITIES => LogKind::Activity {
                activity_type: stored
                    .activity_type
                    .ok_or_else(|| invalid("missing field `activityType`".into()))?,
            },
            collections::INCIDENTS => LogKind::Incident {
                incident_type: stored
                    .incident_type
                    .ok_or_else(|| invalid("missing field `incidentType`".into()))?,
                severity: stored
                    .severity
                    .ok_or_else(|| invalid("missing field `severity`".into()))?,
            },
            other => return Err(invalid(format!("{:?} is not a log collection", other))),
        };

        Ok(LogEntry {
            id,
            resident_id: stored.resident_id,
            kind,
            description: stored.description,
            timestamp: stored.timestamp,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_activity_write_set() {
        let log = NewLog::activity("r-1".into(), "meal".into(), Some("lunch served".into()));
        let writes = log.to_write_set().unwrap();

        assert_eq!(writes.get("residentId"), Some(&FieldWrite::Set(json!("r-1"))));
        assert_eq!(writes.get("activityType"), Some(&FieldWrite::Set(json!("meal"))));
        assert_eq!(writes.get("timestamp"), Some(&FieldWrite::ServerTimestamp));
        assert!(!writes.contains_key("incidentType"));
        assert_eq!(log.kind.collection(), "activities");
    }

    #[test]
    fn test_incident_write_set() {
        let log = NewLog::incident("r-1".into(), "fall".into(), Severity::High, None);
        let writes = log.to_write_set().unwrap();

        assert_eq!(writes.get("incidentType"), Some(&FieldWrite::Set(json!("fall"))));
        assert_eq!(writes.get("severity"), Some(&FieldWrite::Set(json!("High"))));
        assert!(!writes.contains_key("description"));
        assert!(log.kind.is_incident());
        assert_eq!(log.kind.collection(), "incidents");
    }

    #[test]
    fn test_from_document() {
        let doc = Document {
            id: "l-1".into(),
            data: json!({
                "residentId": "r-1",
                "incidentType": "fall",
                "severity": "Medium",
                "description": "slipped in hallway",
                "timestamp": "2024-01-15T10:00:00+00:00"
            })
            .as_object()
            .cloned()
            .unwrap(),
        };

        let entry = LogEntry::from_document(doc, "incidents").unwrap();
        assert_eq!(entry.id, "l-1");
        assert_eq!(
            entry.kind,
            LogKind::Incident {
                incident_type: "fall".into(),
                severity: Severity::Medium
            }
        );
        assert_eq!(entry.description.as_deref(), Some("slipped in hallway"));
    }

    #[test]
    fn test_from_document_without_kind_fails() {
        let doc = Document {
            id: "l-2".into(),
            data: json!({"residentId": "r-1", "timestamp": "2024-01-15T10:00:00Z"})
                .as_object()
                .cloned()
                .unwrap(),
        };
        assert!(LogEntry::from_document(doc.clone(), "activities").is_err());
        assert!(LogEntry::from_document(doc, "incidents").is_err());
    }

    fn mixed_document() -> Document {
        Document {
            id: "l-3".into(),
            data: json!({
                "residentId": "r-1",
                "activityType": "walk",
                "incidentType": "fall",
                "severity": "High",
                "timestamp": "2024-01-15T10:00:00Z"
            })
            .as_object()
            .cloned()
            .unwrap(),
        }
    }

    #[test]
    fn test_kind_follows_collection() {
        let incident = LogEntry::from_document(mixed_document(), "incidents").unwrap();
        assert_eq!(
            incident.kind,
            LogKind::Incident {
                incident_type: "fall".into(),
                severity: Severity::High
            }
        );

        let activity = LogEntry::from_document(mixed_document(), "activities").unwrap();
        assert_eq!(
            activity.kind,
            LogKind::Activity {
                activity_type: "walk".into()
            }
        );
    }

    #[test]
    fn test_incident_without_severity_fails() {
        let mut doc = mixed_document();
        doc.data.remove("severity");
        assert!(matches!(
            LogEntry::from_document(doc, "incidents"),
            Err(StoreError::InvalidDocument(_))
        ));
    }

    #[test]
    fn test_unknown_collection_fails() {
        assert!(LogEntry::from_document(mixed_document(), "residents").is_err());
    }
}
