//! Resident data-access layer.
//!
//! [`ResidentService`] mediates every read and write of resident and log
//! records between callers and the two stores. It owns the in-memory mirrors
//! (resident list, selected resident, log list) and hands out copies only, so
//! callers route all mutations back through its operations.
//!
//! Every operation catches store-level failures, logs the cause, and returns a
//! coarse operation-named [`AccessError`]. Nothing is retried. A mirror is only
//! touched after the remote call has settled successfully.

mod search;
mod upload;

pub use search::*;
pub use upload::*;

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, info, instrument};

use crate::models::{LogEntry, NewLog, NewResident, Resident, ResidentPatch};
use crate::store::{collections, BlobStore, Document, DocumentStore, StoreResult};

/// Data-access errors. Causes are logged, not carried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AccessError {
    #[error("Failed to fetch residents")]
    FetchResidents,

    #[error("Failed to fetch resident")]
    FetchResident,

    #[error("Resident not found: {0}")]
    ResidentNotFound(String),

    #[error("Failed to add resident")]
    AddResident,

    #[error("Failed to update resident")]
    UpdateResident,

    #[error("Failed to delete resident")]
    DeleteResident,

    #[error("Failed to log activity")]
    LogActivity,

    #[error("Failed to log incident")]
    LogIncident,

    #[error("Failed to fetch logs")]
    FetchLogs,

    #[error("Failed to fetch resident logs")]
    FetchResidentLogs,

    #[error("Failed to upload image while {phase}")]
    UploadImage { phase: UploadPhase },

    #[error("Failed to upload document while {phase}")]
    UploadDocument { phase: UploadPhase },
}

pub type AccessResult<T> = Result<T, AccessError>;

/// Log `cause` and return the coarse error in its place.
fn failed(err: AccessError, cause: impl std::fmt::Display) -> AccessError {
    error!(error = %cause, "{}", err);
    err
}

/// In-memory mirrors of what was last loaded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mirror {
    pub residents: Vec<Resident>,
    pub resident: Option<Resident>,
    pub logs: Vec<LogEntry>,
    pub loading: bool,
    pub resident_loading: bool,
    pub logs_loading: bool,
    /// Message of the last failed cached fetch
    pub error: Option<String>,
}

/// Resident data-access service.
///
/// Built once at startup and passed by reference to whatever needs it.
pub struct ResidentService<D: DocumentStore, B: BlobStore> {
    docs: Arc<D>,
    blobs: Arc<B>,
    mirror: RwLock<Mirror>,
}

impl<D: DocumentStore, B: BlobStore> ResidentService<D, B> {
    /// Create a new service over the given stores.
    pub fn new(docs: Arc<D>, blobs: Arc<B>) -> Self {
        Self {
            docs,
            blobs,
            mirror: RwLock::new(Mirror::default()),
        }
    }

    pub fn document_store(&self) -> &Arc<D> {
        &self.docs
    }

    pub fn blob_store(&self) -> &Arc<B> {
        &self.blobs
    }

    // A panic elsewhere must not wedge the mirrors; their data stays valid.
    fn read(&self) -> RwLockReadGuard<'_, Mirror> {
        self.mirror.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Mirror> {
        self.mirror.write().unwrap_or_else(PoisonError::into_inner)
    }

    // =========================================================================
    // Mirror views (copies)
    // =========================================================================

    /// Copy of every mirror and flag.
    pub fn snapshot(&self) -> Mirror {
        self.read().clone()
    }

    pub fn residents(&self) -> Vec<Resident> {
        self.read().residents.clone()
    }

    pub fn resident(&self) -> Option<Resident> {
        self.read().resident.clone()
    }

    pub fn logs(&self) -> Vec<LogEntry> {
        self.read().logs.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.read().loading
    }

    pub fn error(&self) -> Option<String> {
        self.read().error.clone()
    }

    pub fn clear_error(&self) {
        self.write().error = None;
    }

    // =========================================================================
    // Residents
    // =========================================================================

    /// Fetch every resident, in store delivery order. Touches no mirror.
    #[instrument(skip(self))]
    pub async fn fetch_residents(&self) -> AccessResult<Vec<Resident>> {
        debug!("Fetching residents");

        let docs = self
            .docs
            .get_all(collections::RESIDENTS)
            .await
            .map_err(|e| failed(AccessError::FetchResidents, e))?;

        let residents = docs
            .into_iter()
            .map(Resident::from_document)
            .collect::<StoreResult<Vec<_>>>()
            .map_err(|e| failed(AccessError::FetchResidents, e))?;

        debug!("Fetched {} residents", residents.len());
        Ok(residents)
    }

    /// Fetch every resident and replace the cached list with the result.
    ///
    /// On failure the cached list is kept and the shared error is recorded.
    #[instrument(skip(self))]
    pub async fn refresh_residents(&self) -> AccessResult<Vec<Resident>> {
        self.write().loading = true;
        let result = self.fetch_residents().await;

        let mut mirror = self.write();
        mirror.loading = false;
        match &result {
            Ok(residents) => {
                mirror.residents = residents.clone();
                mirror.error = None;
            }
            Err(e) => mirror.error = Some(e.to_string()),
        }
        result
    }

    /// Fetch one resident into the selected-resident slot.
    ///
    /// A missing resident leaves the slot as it was. With concurrent calls the
    /// last one to settle owns the slot.
    #[instrument(skip(self, id), fields(resident_id = %id))]
    pub async fn fetch_resident(&self, id: &str) -> AccessResult<Resident> {
        debug!("Fetching resident");

        if id.trim().is_empty() {
            self.write().error = Some("Resident not found".to_string());
            return Err(AccessError::ResidentNotFound(id.to_string()));
        }

        self.write().resident_loading = true;
        let result = self.docs.get(collections::RESIDENTS, id).await;

        let mut mirror = self.write();
        mirror.resident_loading = false;
        let found = match result {
            Ok(Some(doc)) => Resident::from_document(doc),
            Ok(None) => {
                mirror.error = Some("Resident not found".to_string());
                return Err(AccessError::ResidentNotFound(id.to_string()));
            }
            Err(e) => Err(e),
        };

        match found {
            Ok(resident) => {
                mirror.resident = Some(resident.clone());
                mirror.error = None;
                Ok(resident)
            }
            Err(e) => {
                let err = failed(AccessError::FetchResident, e);
                mirror.error = Some(err.to_string());
                Err(err)
            }
        }
    }

    /// Persist a new resident and append it to the cached list.
    ///
    /// Field validation is left to the caller's form schema.
    #[instrument(skip(self, resident), fields(full_name = %resident.full_name))]
    pub async fn add_resident(&self, resident: NewResident) -> AccessResult<Resident> {
        info!("Adding resident");

        let writes = resident
            .to_write_set()
            .map_err(|e| failed(AccessError::AddResident, e))?;
        let id = self
            .docs
            .add(collections::RESIDENTS, writes)
            .await
            .map_err(|e| failed(AccessError::AddResident, e))?;

        let resident = resident.into_resident(id);
        self.write().residents.push(resident.clone());

        info!(resident_id = ?resident.id, "Resident added");
        Ok(resident)
    }

    /// Write only the fields named in `patch`, then merge them into the
    /// cached copies of that resident.
    #[instrument(skip(self, id, patch), fields(resident_id = %id))]
    pub async fn update_resident(&self, id: &str, patch: ResidentPatch) -> AccessResult<()> {
        info!("Updating resident");

        if id.trim().is_empty() {
            return Err(failed(AccessError::UpdateResident, "empty resident id"));
        }

        let writes = patch
            .to_write_set()
            .map_err(|e| failed(AccessError::UpdateResident, e))?;
        self.docs
            .update(collections::RESIDENTS, id, writes)
            .await
            .map_err(|e| failed(AccessError::UpdateResident, e))?;

        let mut mirror = self.write();
        for resident in mirror
            .residents
            .iter_mut()
            .filter(|r| r.id.as_deref() == Some(id))
        {
            resident.apply_patch(&patch);
        }
        if let Some(selected) = mirror
            .resident
            .as_mut()
            .filter(|r| r.id.as_deref() == Some(id))
        {
            selected.apply_patch(&patch);
        }
        Ok(())
    }

    /// Remove a resident from the store, then from the mirrors.
    ///
    /// Logs referring to the resident are left alone.
    #[instrument(skip(self, id), fields(resident_id = %id))]
    pub async fn delete_resident(&self, id: &str) -> AccessResult<()> {
        info!("Deleting resident");

        if id.trim().is_empty() {
            return Err(failed(AccessError::DeleteResident, "empty resident id"));
        }

        self.docs
            .delete(collections::RESIDENTS, id)
            .await
            .map_err(|e| failed(AccessError::DeleteResident, e))?;

        let mut mirror = self.write();
        mirror.residents.retain(|r| r.id.as_deref() != Some(id));
        if mirror.resident.as_ref().and_then(|r| r.id.as_deref()) == Some(id) {
            mirror.resident = None;
        }
        Ok(())
    }

    // =========================================================================
    // Logs
    // =========================================================================

    /// Append an activity entry. Returns the new entry's id.
    ///
    /// Created entries are not mirrored; refetch to see them.
    #[instrument(skip(self, log), fields(resident_id = %log.resident_id))]
    pub async fn create_activity_log(&self, log: NewLog) -> AccessResult<String> {
        if log.kind.is_incident() {
            return Err(failed(AccessError::LogActivity, "incident passed as activity"));
        }
        self.create_log(log, AccessError::LogActivity).await
    }

    /// Append an incident entry. Returns the new entry's id.
    #[instrument(skip(self, log), fields(resident_id = %log.resident_id))]
    pub async fn create_incident_log(&self, log: NewLog) -> AccessResult<String> {
        if !log.kind.is_incident() {
            return Err(failed(AccessError::LogIncident, "activity passed as incident"));
        }
        self.create_log(log, AccessError::LogIncident).await
    }

    async fn create_log(&self, log: NewLog, err: AccessError) -> AccessResult<String> {
        let writes = log.to_write_set().map_err(|e| failed(err.clone(), e))?;
        let id = self
            .docs
            .add(log.kind.collection(), writes)
            .await
            .map_err(|e| failed(err, e))?;

        info!(log_id = %id, collection = log.kind.collection(), "Log created");
        Ok(id)
    }

    /// Fetch every activity and incident entry into the log mirror.
    #[instrument(skip(self))]
    pub async fn fetch_all_logs(&self) -> AccessResult<Vec<LogEntry>> {
        debug!("Fetching all logs");

        self.write().logs_loading = true;
        let mut logs = Vec::new();
        let mut result = Ok(());
        for collection in [collections::ACTIVITIES, collections::INCIDENTS] {
            let found = self.docs.get_all(collection).await;
            if let Err(e) = map_logs(found, collection, &mut logs) {
                result = Err(e);
                break;
            }
        }

        self.settle_logs(result.map(|()| logs), AccessError::FetchLogs)
    }

    /// Fetch the entries referring to one resident into the log mirror.
    #[instrument(skip(self, resident_id), fields(resident_id = %resident_id))]
    pub async fn fetch_resident_logs(&self, resident_id: &str) -> AccessResult<Vec<LogEntry>> {
        debug!("Fetching resident logs");

        self.write().logs_loading = true;
        let value = Value::String(resident_id.to_string());
        let mut logs = Vec::new();
        let mut result = Ok(());
        for collection in [collections::ACTIVITIES, collections::INCIDENTS] {
            let found = self.docs.query_eq(collection, "residentId", &value).await;
            if let Err(e) = map_logs(found, collection, &mut logs) {
                result = Err(e);
                break;
            }
        }

        self.settle_logs(result.map(|()| logs), AccessError::FetchResidentLogs)
    }

    fn settle_logs(
        &self,
        logs: StoreResult<Vec<LogEntry>>,
        err: AccessError,
    ) -> AccessResult<Vec<LogEntry>> {
        let mut mirror = self.write();
        mirror.logs_loading = false;
        match logs {
            Ok(logs) => {
                debug!("Fetched {} logs", logs.len());
                mirror.logs = logs.clone();
                mirror.error = None;
                Ok(logs)
            }
            Err(e) => {
                let err = failed(err, e);
                mirror.error = Some(err.to_string());
                Err(err)
            }
        }
    }
}

/// Map documents read from `collection`, appending them to `logs`.
fn map_logs(
    found: StoreResult<Vec<Document>>,
    collection: &str,
    logs: &mut Vec<LogEntry>,
) -> StoreResult<()> {
    for doc in found? {
        logs.push(LogEntry::from_document(doc, collection)?);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Severity;
    use crate::store::{SqliteBlobStore, SqliteDocumentStore};
    use chrono::NaiveDate;

    type Service = ResidentService<SqliteDocumentStore, SqliteBlobStore>;

    fn setup_service() -> Service {
        let docs = SqliteDocumentStore::open_in_memory().unwrap();
        let blobs = SqliteBlobStore::open_in_memory("https://blobs.carecloud.test/o").unwrap();
        ResidentService::new(Arc::new(docs), Arc::new(blobs))
    }

    fn new_resident(name: &str) -> NewResident {
        NewResident::new(
            name.into(),
            "555-0100".into(),
            "12 Elm St".into(),
            NaiveDate::from_ymd_opt(1945, 3, 2).unwrap(),
            "Dr. Lee".into(),
        )
    }

    #[tokio::test]
    async fn test_add_appends_to_mirror() {
        let service = setup_service();

        let added = service.add_resident(new_resident("Jane Doe")).await.unwrap();
        assert!(added.is_persisted());
        assert_eq!(service.residents(), vec![added.clone()]);

        let fetched = service.fetch_resident(added.id.as_deref().unwrap()).await.unwrap();
        assert_eq!(fetched, added);
        assert_eq!(service.resident(), Some(added));
    }

    #[tokio::test]
    async fn test_fetch_residents_does_not_cache() {
        let service = setup_service();
        service
            .document_store()
            .add(
                collections::RESIDENTS,
                new_resident("Jane Doe").to_write_set().unwrap(),
            )
            .await
            .unwrap();

        let fetched = service.fetch_residents().await.unwrap();
        assert_eq!(fetched.len(), 1);
        assert!(service.residents().is_empty());

        let refreshed = service.refresh_residents().await.unwrap();
        assert_eq!(refreshed, fetched);
        assert_eq!(service.residents(), fetched);
        assert!(!service.is_loading());
    }

    #[tokio::test]
    async fn test_refresh_failure_keeps_list() {
        let service = setup_service();
        service.add_resident(new_resident("Jane Doe")).await.unwrap();

        // A document that cannot map to a resident
        service
            .document_store()
            .add(
                collections::RESIDENTS,
                crate::store::set_all(serde_json::json!({"fullName": "Broken"})).unwrap(),
            )
            .await
            .unwrap();

        let result = service.refresh_residents().await;
        assert_eq!(result, Err(AccessError::FetchResidents));
        assert_eq!(service.residents().len(), 1);
        assert_eq!(service.error().as_deref(), Some("Failed to fetch residents"));
        assert!(!service.is_loading());
    }

    #[tokio::test]
    async fn test_fetch_missing_resident_keeps_slot() {
        let service = setup_service();
        let jane = service.add_resident(new_resident("Jane Doe")).await.unwrap();
        service.fetch_resident(jane.id.as_deref().unwrap()).await.unwrap();

        let result = service.fetch_resident("nonexistent-id").await;
        assert_eq!(
            result,
            Err(AccessError::ResidentNotFound("nonexistent-id".into()))
        );
        assert_eq!(service.resident(), Some(jane));
        assert_eq!(service.error().as_deref(), Some("Resident not found"));

        assert!(matches!(
            service.fetch_resident("").await,
            Err(AccessError::ResidentNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_update_merges_into_mirrors() {
        let service = setup_service();
        let jane = service.add_resident(new_resident("Jane Doe")).await.unwrap();
        let id = jane.id.clone().unwrap();
        service.fetch_resident(&id).await.unwrap();

        let patch = ResidentPatch {
            health_conditions: Some("diabetes".into()),
            ..Default::default()
        };
        service.update_resident(&id, patch).await.unwrap();

        let cached = &service.residents()[0];
        assert_eq!(cached.health_conditions.as_deref(), Some("diabetes"));
        assert_eq!(cached.full_name, "Jane Doe");
        assert_eq!(
            service.resident().unwrap().health_conditions.as_deref(),
            Some("diabetes")
        );
    }

    #[tokio::test]
    async fn test_update_failure_leaves_mirror() {
        let service = setup_service();
        service.add_resident(new_resident("Jane Doe")).await.unwrap();
        let before = service.snapshot();

        let patch = ResidentPatch {
            phone: Some("555-0199".into()),
            ..Default::default()
        };
        let result = service.update_resident("missing", patch.clone()).await;
        assert_eq!(result, Err(AccessError::UpdateResident));
        assert_eq!(service.snapshot(), before);

        assert_eq!(
            service.update_resident("  ", patch).await,
            Err(AccessError::UpdateResident)
        );
    }

    #[tokio::test]
    async fn test_delete_prunes_mirrors() {
        let service = setup_service();
        let jane = service.add_resident(new_resident("Jane Doe")).await.unwrap();
        let abe = service.add_resident(new_resident("Abe Lin")).await.unwrap();
        let id = jane.id.clone().unwrap();
        service.fetch_resident(&id).await.unwrap();

        service.delete_resident(&id).await.unwrap();

        assert_eq!(service.residents(), vec![abe]);
        assert_eq!(service.resident(), None);
        assert!(matches!(
            service.fetch_resident(&id).await,
            Err(AccessError::ResidentNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_log_kind_must_match_operation() {
        let service = setup_service();
        let incident = NewLog::incident("r-1".into(), "fall".into(), Severity::Low, None);
        let activity = NewLog::activity("r-1".into(), "meal".into(), None);

        assert_eq!(
            service.create_activity_log(incident.clone()).await,
            Err(AccessError::LogActivity)
        );
        assert_eq!(
            service.create_incident_log(activity.clone()).await,
            Err(AccessError::LogIncident)
        );

        assert!(service.create_activity_log(activity).await.is_ok());
        assert!(service.create_incident_log(incident).await.is_ok());
    }

    #[tokio::test]
    async fn test_logs_not_mirrored_until_fetched() {
        let service = setup_service();
        service
            .create_activity_log(NewLog::activity("r-1".into(), "walk".into(), None))
            .await
            .unwrap();
        service
            .create_incident_log(NewLog::incident(
                "r-2".into(),
                "fall".into(),
                Severity::High,
                Some("hallway".into()),
            ))
            .await
            .unwrap();
        assert!(service.logs().is_empty());

        let all = service.fetch_all_logs().await.unwrap();
        assert_eq!(all.len(), 2);
        assert!(!all[0].kind.is_incident());
        assert!(all[1].kind.is_incident());
        assert_eq!(service.logs(), all);

        let mine = service.fetch_resident_logs("r-2").await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].resident_id, "r-2");
        assert_eq!(service.logs(), mine);
    }
}
