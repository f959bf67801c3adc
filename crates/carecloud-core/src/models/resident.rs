//! Resident models and their document mapping.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::store::{set_all, Document, StoreError, StoreResult, WriteSet};

/// A document attached to a resident record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResidentDocument {
    /// Display name
    pub name: String,
    /// Retrieval URL
    pub url: String,
    /// Upload timestamp
    pub uploaded_at: DateTime<Utc>,
}

/// A resident record.
///
/// `id` is assigned by the document store on creation and never changes
/// afterwards. A resident without an id is a pending creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Resident {
    /// Store-generated id, `None` until persisted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub full_name: String,
    pub phone: String,
    pub address: String,
    pub date_of_birth: NaiveDate,
    /// Primary care physician
    pub pcp: String,
    /// Photo retrieval URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emergency_contact_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emergency_contact_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emergency_contact_relationship: Option<String>,
    /// Do-not-resuscitate consent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dnc_consent: Option<bool>,
    /// Free-text health conditions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_conditions: Option<String>,
    /// Attached documents, in upload order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub documents: Vec<ResidentDocument>,
}

/// Payload for creating a resident. Carries no id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewResident {
    pub full_name: String,
    pub phone: String,
    pub address: String,
    pub date_of_birth: NaiveDate,
    pub pcp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emergency_contact_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emergency_contact_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emergency_contact_relationship: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dnc_consent: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_conditions: Option<String>,
}

/// Sparse resident update. Only `Some` fields are written.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResidentPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pcp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emergency_contact_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emergency_contact_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emergency_contact_relationship: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dnc_consent: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_conditions: Option<String>,
}

impl NewResident {
    /// Create a new resident payload with required fields.
    pub fn new(
        full_name: String,
        phone: String,
        address: String,
        date_of_birth: NaiveDate,
        pcp: String,
    ) -> Self {
        Self {
            full_name,
            phone,
            address,
            date_of_birth,
            pcp,
            photo: None,
            email: None,
            emergency_contact_name: None,
            emergency_contact_number: None,
            emergency_contact_relationship: None,
            dnc_consent: None,
            health_conditions: None,
        }
    }

    /// Writes for the store's `add`.
    pub fn to_write_set(&self) -> StoreResult<WriteSet> {
        set_all(serde_json::to_value(self)?)
    }

    /// The full entity once the store has assigned `id`.
    pub fn into_resident(self, id: String) -> Resident {
        Resident {
            id: Some(id),
            full_name: self.full_name,
            phone: self.phone,
            address: self.address,
            date_of_birth: self.date_of_birth,
            pcp: self.pcp,
            photo: self.photo,
            email: self.email,
            emergency_contact_name: self.emergency_contact_name,
            emergency_contact_number: self.emergency_contact_number,
            emergency_contact_relationship: self.emergency_contact_relationship,
            dnc_consent: self.dnc_consent,
            health_conditions: self.health_conditions,
            documents: Vec::new(),
        }
    }
}

impl Resident {
    /// Map a stored document to a resident, taking the id from the store.
    pub fn from_document(doc: Document) -> StoreResult<Self> {
        let id = doc.id.clone();
        serde_json::from_value(doc.into_value())
            .map_err(|e| StoreError::InvalidDocument(format!("resident {}: {}", id, e)))
    }

    /// Check if this resident exists in the store.
    pub fn is_persisted(&self) -> bool {
        self.id.is_some()
    }

    /// Merge a patch into this record.
    pub fn apply_patch(&mut self, patch: &ResidentPatch) {
        let patch = patch.clone();
        if let Some(v) = patch.full_name {
            self.full_name = v;
        }
        if let Some(v) = patch.phone {
            self.phone = v;
        }
        if let Some(v) = patch.address {
            self.address = v;
        }
        if let Some(v) = patch.date_of_birth {
            self.date_of_birth = v;
        }
        if let Some(v) = patch.pcp {
            self.pcp = v;
        }
        if patch.photo.is_some() {
            self.photo = patch.photo;
        }
        if patch.email.is_some() {
            self.email = patch.email;
        }
        if patch.emergency_contact_name.is_some() {
            self.emergency_contact_name = patch.emergency_contact_name;
        }
        if patch.emergency_contact_number.is_some() {
            self.emergency_contact_number = patch.emergency_contact_number;
        }
        if patch.emergency_contact_relationship.is_some() {
            self.emergency_contact_relationship = patch.emergency_contact_relationship;
        }
        if patch.dnc_consent.is_some() {
            self.dnc_consent = patch.dnc_consent;
        }
        if patch.health_conditions.is_some() {
            self.health_conditions = patch.health_conditions;
        }
    }
}

impl ResidentPatch {
    /// Check if the patch names no field.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Writes for the store's partial-merge `update`.
    pub fn to_write_set(&self) -> StoreResult<WriteSet> {
        set_all(serde_json::to_value(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn jane() -> NewResident {
        NewResident::new(
            "Jane Doe".into(),
            "555-0100".into(),
            "12 Elm St".into(),
            NaiveDate::from_ymd_opt(1945, 3, 2).unwrap(),
            "Dr. Lee".into(),
        )
    }

    #[test]
    fn test_write_set_uses_wire_names() {
        let writes = jane().to_write_set().unwrap();
        let fields: Vec<_> = writes.keys().cloned().collect();
        assert_eq!(
            fields,
            vec!["address", "dateOfBirth", "fullName", "pcp", "phone"]
        );
    }

    #[test]
    fn test_from_document_merges_id() {
        let doc = Document {
            id: "r-1".into(),
            data: json!({
                "fullName": "Jane Doe",
                "phone": "555-0100",
                "address": "12 Elm St",
                "dateOfBirth": "1945-03-02",
                "pcp": "Dr. Lee",
                "documents": [{
                    "name": "care plan",
                    "url": "https://blobs.test/care-plan",
                    "uploadedAt": "2024-01-15T10:00:00Z"
                }]
            })
            .as_object()
            .cloned()
            .unwrap(),
        };

        let resident = Resident::from_document(doc).unwrap();
        assert_eq!(resident.id.as_deref(), Some("r-1"));
        assert!(resident.is_persisted());
        assert_eq!(resident.full_name, "Jane Doe");
        assert_eq!(resident.documents.len(), 1);
        assert_eq!(resident.documents[0].name, "care plan");
    }

    #[test]
    fn test_from_document_rejects_missing_fields() {
        let doc = Document {
            id: "r-1".into(),
            data: json!({"fullName": "Jane Doe"}).as_object().cloned().unwrap(),
        };
        assert!(matches!(
            Resident::from_document(doc),
            Err(StoreError::InvalidDocument(_))
        ));
    }

    #[test]
    fn test_into_resident() {
        let resident = jane().into_resident("r-9".into());
        assert_eq!(resident.id.as_deref(), Some("r-9"));
        assert_eq!(resident.pcp, "Dr. Lee");
        assert!(resident.documents.is_empty());
    }

    #[test]
    fn test_patch_write_set_is_sparse() {
        let patch = ResidentPatch {
            health_conditions: Some("diabetes".into()),
            ..Default::default()
        };
        let writes = patch.to_write_set().unwrap();
        assert_eq!(writes.len(), 1);
        assert!(writes.contains_key("healthConditions"));

        assert!(ResidentPatch::default().is_empty());
        assert!(!patch.is_empty());
    }

    proptest! {
        #[test]
        fn prop_patch_touches_only_named_fields(
            phone in proptest::option::of("[0-9-]{1,12}"),
            email in proptest::option::of("[a-z]{1,8}@[a-z]{1,8}\\.org"),
            dnc in proptest::option::of(any::<bool>()),
        ) {
            let original = jane().into_resident("r-1".into());
            let patch = ResidentPatch {
                phone: phone.clone(),
                email: email.clone(),
                dnc_consent: dnc,
                ..Default::default()
            };

            let mut patched = original.clone();
            patched.apply_patch(&patch);

            prop_assert_eq!(&patched.phone, phone.as_ref().unwrap_or(&original.phone));
            prop_assert_eq!(&patched.email, if email.is_some() { &email } else { &original.email });
            prop_assert_eq!(patched.dnc_consent, dnc.or(original.dnc_consent));
            prop_assert_eq!(&patched.full_name, &original.full_name);
            prop_assert_eq!(&patched.address, &original.address);
            prop_assert_eq!(patched.date_of_birth, original.date_of_birth);
            prop_assert_eq!(&patched.id, &original.id);
        }
    }
}
