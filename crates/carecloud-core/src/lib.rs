//! CareCloud Core Library
//!
//! Resident record synchronization layer for the CareCloud facility dashboard.
//!
//! # Architecture
//!
//! ```text
//!   Presentation (lists, detail views, forms)
//!                     │
//!                     ▼
//!   ┌─────────────────────────────────────────┐
//!   │            ResidentService              │
//!   │  mirrors: residents / resident / logs   │
//!   │  mapping: document ⇄ Resident, LogEntry │
//!   │  uploads: blob → url → descriptor       │
//!   └───────────────┬───────────────┬─────────┘
//!                   │               │
//!                   ▼               ▼
//!            DocumentStore      BlobStore
//!       (residents, activities,  (residents/...)
//!             incidents)
//! ```
//!
//! # Core Principle
//!
//! **Mirrors follow the store.** A cached list or slot changes only after the
//! remote call it reflects has succeeded, and callers only ever get copies.
//!
//! # Modules
//!
//! - [`store`]: document and blob store seams with SQLite implementations
//! - [`models`]: domain types (Resident, ResidentPatch, LogEntry, etc.)
//! - [`service`]: the resident data-access layer and upload orchestration
//! - [`config`]: configuration from JSON files and the environment
//! - [`logging`]: `tracing` subscriber setup

pub mod config;
pub mod logging;
pub mod models;
pub mod service;
pub mod store;

// Re-export commonly used types
pub use config::CareCloudConfig;
pub use models::{
    LogEntry, LogKind, NewLog, NewResident, Resident, ResidentDocument, ResidentPatch, Severity,
};
pub use service::{AccessError, NoopObserver, ResidentService, UploadObserver, UploadPhase};
pub use store::{
    BlobStore, DocumentStore, SqliteBlobStore, SqliteDocumentStore, UploadFile,
};

// UniFFI setup - using proc macros
uniffi::setup_scaffolding!();

use std::sync::Arc;

use chrono::NaiveDate;

/// Service over the bundled SQLite stores.
pub type LocalService = ResidentService<SqliteDocumentStore, SqliteBlobStore>;

/// Build a [`LocalService`] from configuration.
pub fn open_local_service(config: &CareCloudConfig) -> Result<LocalService, CareCloudError> {
    config.validate()?;

    let (docs, blobs) = match &config.database_path {
        Some(path) => (
            SqliteDocumentStore::open(path)?,
            SqliteBlobStore::open(path, &config.blob_base_url)?,
        ),
        None => (
            SqliteDocumentStore::open_in_memory()?,
            SqliteBlobStore::open_in_memory(&config.blob_base_url)?,
        ),
    };
    let blobs = blobs.with_chunk_size(config.upload_chunk_size);

    Ok(ResidentService::new(Arc::new(docs), Arc::new(blobs)))
}

// =========================================================================
// FFI Error Type
// =========================================================================

#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum CareCloudError {
    #[error("Store error: {0}")]
    StoreError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("{0}")]
    OperationFailed(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Runtime error: {0}")]
    RuntimeError(String),
}

impl From<store::StoreError> for CareCloudError {
    fn from(e: store::StoreError) -> Self {
        CareCloudError::StoreError(e.to_string())
    }
}

impl From<store::BlobError> for CareCloudError {
    fn from(e: store::BlobError) -> Self {
        CareCloudError::StoreError(e.to_string())
    }
}

impl From<config::ConfigError> for CareCloudError {
    fn from(e: config::ConfigError) -> Self {
        CareCloudError::ConfigError(e.to_string())
    }
}

impl From<AccessError> for CareCloudError {
    fn from(e: AccessError) -> Self {
        match e {
            AccessError::ResidentNotFound(id) => CareCloudError::NotFound(id),
            other => CareCloudError::OperationFailed(other.to_string()),
        }
    }
}

impl From<std::io::Error> for CareCloudError {
    fn from(e: std::io::Error) -> Self {
        CareCloudError::RuntimeError(e.to_string())
    }
}

// =========================================================================
// Factory Functions (exported to FFI)
// =========================================================================

/// Open the service described by `config`, installing logging on first use.
#[uniffi::export]
pub fn open_service(config: FfiConfig) -> Result<Arc<CareCloudCore>, CareCloudError> {
    let config: CareCloudConfig = config.into();
    logging::init(&config.log_filter);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let service = open_local_service(&config)?;

    Ok(Arc::new(CareCloudCore { service, runtime }))
}

/// Open the service from `CARECLOUD_*` environment variables.
#[uniffi::export]
pub fn open_service_from_env() -> Result<Arc<CareCloudCore>, CareCloudError> {
    open_service(CareCloudConfig::from_env()?.into())
}

// =========================================================================
// Main API Object
// =========================================================================

/// Blocking facade over [`LocalService`] for native shells.
#[derive(uniffi::Object)]
pub struct CareCloudCore {
    service: LocalService,
    runtime: tokio::runtime::Runtime,
}

#[uniffi::export]
impl CareCloudCore {
    // =========================================================================
    // Resident Operations
    // =========================================================================

    /// Fetch all residents without touching the cached list.
    pub fn fetch_residents(&self) -> Result<Vec<FfiResident>, CareCloudError> {
        let residents = self.runtime.block_on(self.service.fetch_residents())?;
        Ok(residents.into_iter().map(Into::into).collect())
    }

    /// Fetch all residents and replace the cached list.
    pub fn refresh_residents(&self) -> Result<Vec<FfiResident>, CareCloudError> {
        let residents = self.runtime.block_on(self.service.refresh_residents())?;
        Ok(residents.into_iter().map(Into::into).collect())
    }

    /// Fetch one resident into the selected slot.
    pub fn fetch_resident(&self, resident_id: String) -> Result<FfiResident, CareCloudError> {
        let resident = self
            .runtime
            .block_on(self.service.fetch_resident(&resident_id))?;
        Ok(resident.into())
    }

    /// Create a resident; returns it with its new id.
    pub fn add_resident(&self, resident: FfiNewResident) -> Result<FfiResident, CareCloudError> {
        let resident = NewResident::try_from(resident)?;
        let added = self.runtime.block_on(self.service.add_resident(resident))?;
        Ok(added.into())
    }

    /// Update only the fields set in `patch`.
    pub fn update_resident(
        &self,
        resident_id: String,
        patch: FfiResidentPatch,
    ) -> Result<(), CareCloudError> {
        let patch = ResidentPatch::try_from(patch)?;
        self.runtime
            .block_on(self.service.update_resident(&resident_id, patch))?;
        Ok(())
    }

    /// Delete a resident.
    pub fn delete_resident(&self, resident_id: String) -> Result<(), CareCloudError> {
        self.runtime
            .block_on(self.service.delete_resident(&resident_id))?;
        Ok(())
    }

    /// Search the cached residents by name.
    pub fn search_residents(&self, query: String, limit: u32) -> Vec<FfiResident> {
        self.service
            .search_residents(&query, limit as usize)
            .into_iter()
            .map(Into::into)
            .collect()
    }

    // =========================================================================
    // Log Operations
    // =========================================================================

    /// Record an activity; returns the entry id.
    pub fn create_activity_log(
        &self,
        resident_id: String,
        activity_type: String,
        description: Option<String>,
    ) -> Result<String, CareCloudError> {
        let log = NewLog::activity(resident_id, activity_type, description);
        Ok(self
            .runtime
            .block_on(self.service.create_activity_log(log))?)
    }

    /// Record an incident; returns the entry id.
    pub fn create_incident_log(
        &self,
        resident_id: String,
        incident_type: String,
        severity: String,
        description: Option<String>,
    ) -> Result<String, CareCloudError> {
        let severity = parse_severity(&severity)?;
        let log = NewLog::incident(resident_id, incident_type, severity, description);
        Ok(self
            .runtime
            .block_on(self.service.create_incident_log(log))?)
    }

    /// Fetch every log entry into the log mirror.
    pub fn fetch_all_logs(&self) -> Result<Vec<FfiLogEntry>, CareCloudError> {
        let logs = self.runtime.block_on(self.service.fetch_all_logs())?;
        Ok(logs.into_iter().map(Into::into).collect())
    }

    /// Fetch one resident's log entries into the log mirror.
    pub fn fetch_resident_logs(
        &self,
        resident_id: String,
    ) -> Result<Vec<FfiLogEntry>, CareCloudError> {
        let logs = self
            .runtime
            .block_on(self.service.fetch_resident_logs(&resident_id))?;
        Ok(logs.into_iter().map(Into::into).collect())
    }

    // =========================================================================
    // Upload Operations
    // =========================================================================

    /// Upload a resident photo; returns its URL.
    pub fn upload_image_for_resident(
        &self,
        full_name: String,
        file: FfiUploadFile,
    ) -> Result<String, CareCloudError> {
        let file: UploadFile = file.into();
        Ok(self.runtime.block_on(self.service.upload_image_for_resident(
            &full_name,
            &file,
            &NoopObserver,
        ))?)
    }

    /// Upload a resident document and record it on the resident; returns its URL.
    pub fn upload_document_for_resident(
        &self,
        resident_id: String,
        file: FfiUploadFile,
        display_name: Option<String>,
    ) -> Result<String, CareCloudError> {
        let file: UploadFile = file.into();
        Ok(self
            .runtime
            .block_on(self.service.upload_document_for_resident(
                &resident_id,
                &file,
                display_name.as_deref(),
                &NoopObserver,
            ))?)
    }

    // =========================================================================
    // Mirror Views
    // =========================================================================

    /// Copy of the cached resident list.
    pub fn cached_residents(&self) -> Vec<FfiResident> {
        self.service.residents().into_iter().map(Into::into).collect()
    }

    /// Copy of the selected resident.
    pub fn cached_resident(&self) -> Option<FfiResident> {
        self.service.resident().map(Into::into)
    }

    /// Copy of the cached log list.
    pub fn cached_logs(&self) -> Vec<FfiLogEntry> {
        self.service.logs().into_iter().map(Into::into).collect()
    }

    /// Message of the last failed cached fetch.
    pub fn last_error(&self) -> Option<String> {
        self.service.error()
    }
}

fn parse_date(field: &str, value: &str) -> Result<NaiveDate, CareCloudError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|e| CareCloudError::InvalidInput(format!("{} {:?}: {}", field, value, e)))
}

fn parse_severity(value: &str) -> Result<Severity, CareCloudError> {
    match value.to_lowercase().as_str() {
        "low" => Ok(Severity::Low),
        "medium" => Ok(Severity::Medium),
        "high" => Ok(Severity::High),
        _ => Err(CareCloudError::InvalidInput(format!(
            "severity {:?}",
            value
        ))),
    }
}

// =========================================================================
// FFI Types
// =========================================================================

/// FFI-safe configuration.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiConfig {
    pub database_path: Option<String>,
    pub blob_base_url: String,
    pub upload_chunk_size: u64,
    pub log_filter: String,
}

impl From<FfiConfig> for CareCloudConfig {
    fn from(config: FfiConfig) -> Self {
        CareCloudConfig {
            database_path: config.database_path.map(Into::into),
            blob_base_url: config.blob_base_url,
            upload_chunk_size: config.upload_chunk_size as usize,
            log_filter: config.log_filter,
        }
    }
}

impl From<CareCloudConfig> for FfiConfig {
    fn from(config: CareCloudConfig) -> Self {
        Self {
            database_path: config
                .database_path
                .map(|p| p.to_string_lossy().into_owned()),
            blob_base_url: config.blob_base_url,
            upload_chunk_size: config.upload_chunk_size as u64,
            log_filter: config.log_filter,
        }
    }
}

/// FFI-safe attached document.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiResidentDocument {
    pub name: String,
    pub url: String,
    /// RFC 3339
    pub uploaded_at: String,
}

impl From<ResidentDocument> for FfiResidentDocument {
    fn from(doc: ResidentDocument) -> Self {
        Self {
            name: doc.name,
            url: doc.url,
            uploaded_at: doc.uploaded_at.to_rfc3339(),
        }
    }
}

/// FFI-safe resident.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiResident {
    pub id: Option<String>,
    pub full_name: String,
    pub phone: String,
    pub address: String,
    /// `YYYY-MM-DD`
    pub date_of_birth: String,
    pub pcp: String,
    pub photo: Option<String>,
    pub email: Option<String>,
    pub emergency_contact_name: Option<String>,
    pub emergency_contact_number: Option<String>,
    pub emergency_contact_relationship: Option<String>,
    pub dnc_consent: Option<bool>,
    pub health_conditions: Option<String>,
    pub documents: Vec<FfiResidentDocument>,
}

impl From<Resident> for FfiResident {
    fn from(resident: Resident) -> Self {
        Self {
            id: resident.id,
            full_name: resident.full_name,
            phone: resident.phone,
            address: resident.address,
            date_of_birth: resident.date_of_birth.format("%Y-%m-%d").to_string(),
            pcp: resident.pcp,
            photo: resident.photo,
            email: resident.email,
            emergency_contact_name: resident.emergency_contact_name,
            emergency_contact_number: resident.emergency_contact_number,
            emergency_contact_relationship: resident.emergency_contact_relationship,
            dnc_consent: resident.dnc_consent,
            health_conditions: resident.health_conditions,
            documents: resident.documents.into_iter().map(Into::into).collect(),
        }
    }
}

/// FFI-safe resident creation payload.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiNewResident {
    pub full_name: String,
    pub phone: String,
    pub address: String,
    /// `YYYY-MM-DD`
    pub date_of_birth: String,
    pub pcp: String,
    pub photo: Option<String>,
    pub email: Option<String>,
    pub emergency_contact_name: Option<String>,
    pub emergency_contact_number: Option<String>,
    pub emergency_contact_relationship: Option<String>,
    pub dnc_consent: Option<bool>,
    pub health_conditions: Option<String>,
}

impl TryFrom<FfiNewResident> for NewResident {
    type Error = CareCloudError;

    fn try_from(resident: FfiNewResident) -> Result<Self, Self::Error> {
        Ok(NewResident {
            date_of_birth: parse_date("date_of_birth", &resident.date_of_birth)?,
            full_name: resident.full_name,
            phone: resident.phone,
            address: resident.address,
            pcp: resident.pcp,
            photo: resident.photo,
            email: resident.email,
            emergency_contact_name: resident.emergency_contact_name,
            emergency_contact_number: resident.emergency_contact_number,
            emergency_contact_relationship: resident.emergency_contact_relationship,
            dnc_consent: resident.dnc_consent,
            health_conditions: resident.health_conditions,
        })
    }
}

/// FFI-safe sparse resident update.
#[derive(Debug, Clone, Default, uniffi::Record)]
pub struct FfiResidentPatch {
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    /// `YYYY-MM-DD`
    pub date_of_birth: Option<String>,
    pub pcp: Option<String>,
    pub photo: Option<String>,
    pub email: Option<String>,
    pub emergency_contact_name: Option<String>,
    pub emergency_contact_number: Option<String>,
    pub emergency_contact_relationship: Option<String>,
    pub dnc_consent: Option<bool>,
    pub health_conditions: Option<String>,
}

impl TryFrom<FfiResidentPatch> for ResidentPatch {
    type Error = CareCloudError;

    fn try_from(patch: FfiResidentPatch) -> Result<Self, Self::Error> {
        let date_of_birth = match patch.date_of_birth {
            Some(date) => Some(parse_date("date_of_birth", &date)?),
            None => None,
        };
        Ok(ResidentPatch {
            full_name: patch.full_name,
            phone: patch.phone,
            address: patch.address,
            date_of_birth,
            pcp: patch.pcp,
            photo: patch.photo,
            email: patch.email,
            emergency_contact_name: patch.emergency_contact_name,
            emergency_contact_number: patch.emergency_contact_number,
            emergency_contact_relationship: patch.emergency_contact_relationship,
            dnc_consent: patch.dnc_consent,
            health_conditions: patch.health_conditions,
        })
    }
}

/// FFI-safe log entry.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiLogEntry {
    pub id: String,
    pub resident_id: String,
    /// "activity" or "incident"
    pub kind: String,
    pub activity_type: Option<String>,
    pub incident_type: Option<String>,
    pub severity: Option<String>,
    pub description: Option<String>,
    /// RFC 3339, stamped by the store
    pub timestamp: String,
}

impl From<LogEntry> for FfiLogEntry {
    fn from(entry: LogEntry) -> Self {
        let (kind, activity_type, incident_type, severity) = match entry.kind {
            LogKind::Activity { activity_type } => ("activity", Some(activity_type), None, None),
            LogKind::Incident {
                incident_type,
                severity,
            } => (
                "incident",
                None,
                Some(incident_type),
                Some(format!("{:?}", severity)),
            ),
        };
        Self {
            id: entry.id,
            resident_id: entry.resident_id,
            kind: kind.to_string(),
            activity_type,
            incident_type,
            severity,
            description: entry.description,
            timestamp: entry.timestamp.to_rfc3339(),
        }
    }
}

/// FFI-safe file handed over for upload.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiUploadFile {
    pub name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl From<FfiUploadFile> for UploadFile {
    fn from(file: FfiUploadFile) -> Self {
        UploadFile {
            name: file.name,
            content_type: file.content_type,
            bytes: file.bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn core() -> Arc<CareCloudCore> {
        open_service(CareCloudConfig::default().into()).unwrap()
    }

    fn jane() -> FfiNewResident {
        FfiNewResident {
            full_name: "Jane Doe".into(),
            phone: "555-0100".into(),
            address: "12 Elm St".into(),
            date_of_birth: "1945-03-02".into(),
            pcp: "Dr. Lee".into(),
            photo: None,
            email: None,
            emergency_contact_name: None,
            emergency_contact_number: None,
            emergency_contact_relationship: None,
            dnc_consent: Some(true),
            health_conditions: None,
        }
    }

    #[test]
    fn test_ffi_resident_lifecycle() {
        let core = core();

        let added = core.add_resident(jane()).unwrap();
        let id = added.id.clone().unwrap();
        assert_eq!(added.date_of_birth, "1945-03-02");

        core.update_resident(
            id.clone(),
            FfiResidentPatch {
                health_conditions: Some("diabetes".into()),
                ..Default::default()
            },
        )
        .unwrap();
        let fetched = core.fetch_resident(id.clone()).unwrap();
        assert_eq!(fetched.health_conditions.as_deref(), Some("diabetes"));
        assert_eq!(fetched.dnc_consent, Some(true));

        core.delete_resident(id.clone()).unwrap();
        assert!(matches!(
            core.fetch_resident(id),
            Err(CareCloudError::NotFound(_))
        ));
        assert!(core.cached_residents().is_empty());
        assert_eq!(core.last_error().as_deref(), Some("Resident not found"));
    }

    #[test]
    fn test_ffi_rejects_bad_dates() {
        let core = core();
        let mut bad = jane();
        bad.date_of_birth = "03/02/1945".into();
        assert!(matches!(
            core.add_resident(bad),
            Err(CareCloudError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_ffi_logs() {
        let core = core();
        core.create_activity_log("r-1".into(), "meal".into(), Some("lunch served".into()))
            .unwrap();
        core.create_incident_log("r-1".into(), "fall".into(), "high".into(), None)
            .unwrap();
        assert!(matches!(
            core.create_incident_log("r-1".into(), "fall".into(), "severe".into(), None),
            Err(CareCloudError::InvalidInput(_))
        ));

        let logs = core.fetch_resident_logs("r-1".into()).unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].kind, "activity");
        assert_eq!(logs[1].severity.as_deref(), Some("High"));
        assert_eq!(core.cached_logs().len(), 2);
    }

    #[test]
    fn test_ffi_upload_document() {
        let core = core();
        let id = core.add_resident(jane()).unwrap().id.unwrap();

        let url = core
            .upload_document_for_resident(
                id.clone(),
                FfiUploadFile {
                    name: "plan.pdf".into(),
                    content_type: Some("application/pdf".into()),
                    bytes: b"plan".to_vec(),
                },
                Some("Care plan".into()),
            )
            .unwrap();

        let fetched = core.fetch_resident(id).unwrap();
        assert_eq!(fetched.documents.len(), 1);
        assert_eq!(fetched.documents[0].url, url);
    }

    #[test]
    fn test_open_service_rejects_invalid_config() {
        let mut config: FfiConfig = CareCloudConfig::default().into();
        config.upload_chunk_size = 0;
        assert!(matches!(
            open_service(config),
            Err(CareCloudError::ConfigError(_))
        ));
    }
}
