//! Upload orchestration: stream to the blob store, resolve the URL, and for
//! documents record a descriptor on the resident.
//!
//! ```text
//! Idle → Uploading → ResolvingUrl ─────────────────────────→ Complete
//!                                 └→ PersistingDescriptor ──→ Complete
//!            │             │                 │
//!            └─────────────┴─────────────────┴──→ Failed(at phase)
//! ```
//!
//! There is no retry transition and no rollback: a blob uploaded before a
//! later phase fails stays behind as an orphan.

use std::fmt;

use chrono::Utc;
use tracing::{info, instrument, warn};

use super::{failed, AccessError, AccessResult, ResidentService};
use crate::models::ResidentDocument;
use crate::store::{
    collections, BlobPath, BlobStore, DocumentStore, FieldWrite, UploadFile, UploadProgress,
    WriteSet,
};

/// Phase of an upload run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UploadPhase {
    Idle,
    Uploading,
    ResolvingUrl,
    PersistingDescriptor,
    Complete,
}

impl UploadPhase {
    /// Whether `next` is a legal successor of this phase.
    pub fn can_advance_to(self, next: UploadPhase) -> bool {
        use UploadPhase::*;
        matches!(
            (self, next),
            (Idle, Uploading)
                | (Uploading, ResolvingUrl)
                | (ResolvingUrl, PersistingDescriptor)
                | (ResolvingUrl, Complete)
                | (PersistingDescriptor, Complete)
        )
    }

    /// Whether a failure can happen in this phase.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            UploadPhase::Uploading | UploadPhase::ResolvingUrl | UploadPhase::PersistingDescriptor
        )
    }
}

impl fmt::Display for UploadPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UploadPhase::Idle => "idle",
            UploadPhase::Uploading => "uploading",
            UploadPhase::ResolvingUrl => "resolving url",
            UploadPhase::PersistingDescriptor => "persisting descriptor",
            UploadPhase::Complete => "complete",
        };
        f.write_str(name)
    }
}

/// Receives upload transitions and advisory progress.
pub trait UploadObserver: Send + Sync {
    fn on_phase(&self, _phase: UploadPhase) {}

    fn on_progress(&self, _progress: UploadProgress) {}

    fn on_failed(&self, _at: UploadPhase) {}
}

/// Observer that ignores everything.
pub struct NoopObserver;

impl UploadObserver for NoopObserver {}

/// Tracks one run through the state machine.
struct UploadRun<'a> {
    phase: UploadPhase,
    observer: &'a dyn UploadObserver,
}

impl<'a> UploadRun<'a> {
    fn start(observer: &'a dyn UploadObserver) -> Self {
        Self {
            phase: UploadPhase::Idle,
            observer,
        }
    }

    fn advance(&mut self, next: UploadPhase) {
        debug_assert!(
            self.phase.can_advance_to(next),
            "illegal upload transition {} -> {}",
            self.phase,
            next
        );
        self.phase = next;
        self.observer.on_phase(next);
    }

    /// Report failure in the current phase and return the phase.
    fn fail(&self) -> UploadPhase {
        debug_assert!(self.phase.is_active());
        self.observer.on_failed(self.phase);
        self.phase
    }
}

impl<D: DocumentStore, B: BlobStore> ResidentService<D, B> {
    /// Upload a resident photo and return its retrieval URL.
    ///
    /// The object path is keyed by `full_name`, so residents sharing a name
    /// share a photo folder.
    #[instrument(skip(self, full_name, file, observer), fields(file_name = %file.name))]
    pub async fn upload_image_for_resident(
        &self,
        full_name: &str,
        file: &UploadFile,
        observer: &dyn UploadObserver,
    ) -> AccessResult<String> {
        let mut run = UploadRun::start(observer);
        let image_failed = |run: &UploadRun<'_>, cause: &dyn fmt::Display| {
            failed(AccessError::UploadImage { phase: run.fail() }, cause)
        };

        run.advance(UploadPhase::Uploading);
        let path = BlobPath::resident_photo(full_name, &file.name)
            .map_err(|e| image_failed(&run, &e))?;
        let object = self
            .blobs
            .upload(&path, file, &|p| observer.on_progress(p))
            .await
            .map_err(|e| image_failed(&run, &e))?;

        run.advance(UploadPhase::ResolvingUrl);
        let url = self
            .blobs
            .resolve_url(&object)
            .await
            .map_err(|e| image_failed(&run, &e))?;

        run.advance(UploadPhase::Complete);
        info!(path = %path, "Photo uploaded");
        Ok(url)
    }

    /// Upload a document for a resident, record `{name, url, uploadedAt}` on
    /// the resident's `documents`, and return the URL.
    ///
    /// `display_name` defaults to the file name. The descriptor is appended
    /// with an array union; the existing list is never read or replaced.
    #[instrument(skip(self, file, display_name, observer), fields(file_name = %file.name))]
    pub async fn upload_document_for_resident(
        &self,
        resident_id: &str,
        file: &UploadFile,
        display_name: Option<&str>,
        observer: &dyn UploadObserver,
    ) -> AccessResult<String> {
        let mut run = UploadRun::start(observer);
        let document_failed = |run: &UploadRun<'_>, cause: &dyn fmt::Display| {
            failed(AccessError::UploadDocument { phase: run.fail() }, cause)
        };

        run.advance(UploadPhase::Uploading);
        let path = BlobPath::resident_document(resident_id, &file.name)
            .map_err(|e| document_failed(&run, &e))?;
        let object = self
            .blobs
            .upload(&path, file, &|p| observer.on_progress(p))
            .await
            .map_err(|e| document_failed(&run, &e))?;

        run.advance(UploadPhase::ResolvingUrl);
        let url = self
            .blobs
            .resolve_url(&object)
            .await
            .map_err(|e| document_failed(&run, &e))?;

        run.advance(UploadPhase::PersistingDescriptor);
        let descriptor = ResidentDocument {
            name: display_name.unwrap_or(&file.name).to_string(),
            url: url.clone(),
            uploaded_at: Utc::now(),
        };
        let element =
            serde_json::to_value(&descriptor).map_err(|e| document_failed(&run, &e))?;
        let mut writes = WriteSet::new();
        writes.insert("documents".to_string(), FieldWrite::ArrayUnion(vec![element]));

        if let Err(e) = self
            .docs
            .update(collections::RESIDENTS, resident_id, writes)
            .await
        {
            warn!(path = %path, "Uploaded blob left without a descriptor");
            return Err(document_failed(&run, &e));
        }

        {
            let mut guard = self.write();
            let mirror = &mut *guard;
            for resident in mirror
                .residents
                .iter_mut()
                .chain(mirror.resident.iter_mut())
                .filter(|r| r.id.as_deref() == Some(resident_id))
            {
                if !resident.documents.contains(&descriptor) {
                    resident.documents.push(descriptor.clone());
                }
            }
        }

        run.advance(UploadPhase::Complete);
        info!(path = %path, "Document uploaded");
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use chrono::NaiveDate;

    use crate::models::NewResident;
    use crate::store::{
        BlobError, BlobResult, SqliteBlobStore, SqliteDocumentStore, UploadedObject,
    };

    /// Records every phase and failure it sees.
    #[derive(Default)]
    struct Recorder {
        phases: Mutex<Vec<UploadPhase>>,
        failed_at: Mutex<Option<UploadPhase>>,
        progress: Mutex<Vec<u64>>,
    }

    impl UploadObserver for Recorder {
        fn on_phase(&self, phase: UploadPhase) {
            self.phases.lock().unwrap().push(phase);
        }

        fn on_progress(&self, progress: UploadProgress) {
            self.progress.lock().unwrap().push(progress.bytes_transferred);
        }

        fn on_failed(&self, at: UploadPhase) {
            *self.failed_at.lock().unwrap() = Some(at);
        }
    }

    /// Blob store whose URL resolution always fails.
    struct UnresolvableBlobs(SqliteBlobStore);

    #[async_trait]
    impl BlobStore for UnresolvableBlobs {
        async fn upload(
            &self,
            path: &BlobPath,
            file: &UploadFile,
            progress: &(dyn Fn(UploadProgress) + Send + Sync),
        ) -> BlobResult<UploadedObject> {
            self.0.upload(path, file, progress).await
        }

        async fn resolve_url(&self, object: &UploadedObject) -> BlobResult<String> {
            Err(BlobError::NotFound(object.path.to_string()))
        }
    }

    fn blobs() -> SqliteBlobStore {
        SqliteBlobStore::open_in_memory("https://blobs.carecloud.test/o")
            .unwrap()
            .with_chunk_size(2)
    }

    fn setup_service() -> ResidentService<SqliteDocumentStore, SqliteBlobStore> {
        let docs = SqliteDocumentStore::open_in_memory().unwrap();
        ResidentService::new(Arc::new(docs), Arc::new(blobs()))
    }

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
    fn test_transitions() {
        use UploadPhase::*;
        assert!(Idle.can_advance_to(Uploading));
        assert!(ResolvingUrl.can_advance_to(Complete));
        assert!(ResolvingUrl.can_advance_to(PersistingDescriptor));
        assert!(!Idle.can_advance_to(Complete));
        assert!(!Complete.can_advance_to(Idle));
        assert!(!Uploading.can_advance_to(Uploading));
        assert!(!Idle.is_active());
        assert!(PersistingDescriptor.is_active());
    }

    #[tokio::test]
    async fn test_image_upload_phases() {
        let service = setup_service();
        let recorder = Recorder::default();
        let file = UploadFile::new("jane.png", vec![1, 2, 3, 4, 5]);

        let url = service
            .upload_image_for_resident("Jane Doe", &file, &recorder)
            .await
            .unwrap();
        assert!(url.contains("residents%2FJane%20Doe%2Fjane.png"));

        assert_eq!(
            *recorder.phases.lock().unwrap(),
            vec![
                UploadPhase::Uploading,
                UploadPhase::ResolvingUrl,
                UploadPhase::Complete
            ]
        );
        assert_eq!(*recorder.progress.lock().unwrap(), vec![0, 2, 4, 5]);
        assert_eq!(*recorder.failed_at.lock().unwrap(), None);
    }

    #[tokio::test]
    async fn test_image_upload_rejects_blank_name() {
        let service = setup_service();
        let recorder = Recorder::default();
        let file = UploadFile::new("jane.png", vec![1]);

        let result = service
            .upload_image_for_resident(" ", &file, &recorder)
            .await;
        assert_eq!(
            result,
            Err(AccessError::UploadImage {
                phase: UploadPhase::Uploading
            })
        );
        assert_eq!(
            *recorder.failed_at.lock().unwrap(),
            Some(UploadPhase::Uploading)
        );
    }

    #[tokio::test]
    async fn test_resolve_failure_aborts_and_orphans_blob() {
        let docs = Arc::new(SqliteDocumentStore::open_in_memory().unwrap());
        let service = ResidentService::new(docs, Arc::new(UnresolvableBlobs(blobs())));
        let recorder = Recorder::default();
        let file = UploadFile::new("plan.pdf", vec![9; 3]);

        let result = service
            .upload_document_for_resident("r-1", &file, None, &recorder)
            .await;
        assert_eq!(
            result,
            Err(AccessError::UploadDocument {
                phase: UploadPhase::ResolvingUrl
            })
        );

        // The blob stays behind
        let path = BlobPath::resident_document("r-1", "plan.pdf").unwrap();
        assert_eq!(service.blob_store().0.generation_count(&path).unwrap(), 1);
        assert!(!recorder
            .phases
            .lock()
            .unwrap()
            .contains(&UploadPhase::PersistingDescriptor));
    }

    #[tokio::test]
    async fn test_document_upload_appends_descriptor() {
        let service = setup_service();
        let jane = service.add_resident(jane()).await.unwrap();
        let id = jane.id.clone().unwrap();

        let plan = UploadFile::new("plan.pdf", b"plan".to_vec());
        let consent = UploadFile::new("consent.pdf", b"consent".to_vec());
        let plan_url = service
            .upload_document_for_resident(&id, &plan, Some("Care plan"), &NoopObserver)
            .await
            .unwrap();
        service
            .upload_document_for_resident(&id, &consent, None, &NoopObserver)
            .await
            .unwrap();

        let stored = service.fetch_resident(&id).await.unwrap();
        assert_eq!(stored.documents.len(), 2);
        assert_eq!(stored.documents[0].name, "Care plan");
        assert_eq!(stored.documents[0].url, plan_url);
        assert_eq!(stored.documents[1].name, "consent.pdf");

        assert_eq!(service.residents()[0].documents.len(), 2);
    }

    #[tokio::test]
    async fn test_document_upload_for_missing_resident_fails_persisting() {
        let service = setup_service();
        let recorder = Recorder::default();
        let file = UploadFile::new("plan.pdf", b"plan".to_vec());

        let result = service
            .upload_document_for_resident("ghost", &file, None, &recorder)
            .await;
        assert_eq!(
            result,
            Err(AccessError::UploadDocument {
                phase: UploadPhase::PersistingDescriptor
            })
        );
        assert_eq!(
            *recorder.failed_at.lock().unwrap(),
            Some(UploadPhase::PersistingDescriptor)
        );
    }
}
