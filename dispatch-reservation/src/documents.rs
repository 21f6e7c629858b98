use chrono::{DateTime, Utc};
use dispatch_core::{RepoError, ValidationError, ValidationErrors};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use uuid::Uuid;

use crate::repository::DocumentRepository;

pub const REASON_MIN_CHARS: usize = 10;
pub const REASON_MAX_CHARS: usize = 500;

const REASON_TOO_SHORT: &str = "Reason must be at least 10 characters";
const REASON_TOO_LONG: &str = "Reason is too long (max 500 characters)";
const SUBMIT_FAILED: &str = "An error occurred, please try again";

/// Trims the reason and checks its length in characters.
pub fn validate_rejection_reason(reason: &str) -> Result<String, ValidationError> {
    let trimmed = reason.trim();
    let len = trimmed.chars().count();
    if len < REASON_MIN_CHARS {
        return Err(ValidationError::new("reason", REASON_TOO_SHORT));
    }
    if len > REASON_MAX_CHARS {
        return Err(ValidationError::new("reason", REASON_TOO_LONG));
    }
    Ok(trimmed.to_string())
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentRejection {
    pub document_id: Uuid,
    pub reason: String,
    pub rejected_by: Uuid,
    pub rejected_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error(transparent)]
    Validation(#[from] ValidationErrors),
    #[error("Repository error: {0}")]
    Repository(#[from] RepoError),
}

/// Admin review of uploaded driver documents
pub struct DocumentReviewService {
    repo: Arc<dyn DocumentRepository>,
}

impl DocumentReviewService {
    pub fn new(repo: Arc<dyn DocumentRepository>) -> Self {
        Self { repo }
    }

    pub async fn reject(
        &self,
        document_id: Uuid,
        reason: &str,
        admin_id: Uuid,
    ) -> Result<DocumentRejection, DocumentError> {
        let reason = validate_rejection_reason(reason).map_err(|e| ValidationErrors { errors: vec![e] })?;
        let rejection = DocumentRejection {
            document_id,
            reason,
            rejected_by: admin_id,
            rejected_at: Utc::now(),
        };
        self.repo.record_rejection(&rejection).await?;
        tracing::info!("Document {} rejected by {}", document_id, admin_id);
        Ok(rejection)
    }

    pub async fn history(&self, document_id: Uuid) -> Result<Vec<DocumentRejection>, DocumentError> {
        Ok(self.repo.rejections_for(document_id).await?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Reason failed validation; the callback was not invoked.
    Invalid,
    /// The callback failed; the dialog stays open with an error.
    Failed,
    Closed,
    /// Nothing to submit: the dialog is closed or already submitting.
    Ignored,
}

/// State of the reject-with-reason dialog shown to admins.
#[derive(Debug, Default)]
pub struct RejectionDialog {
    document_name: Option<String>,
    reason: String,
    error: Option<String>,
    submitting: bool,
}

impl RejectionDialog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&mut self, document_name: impl Into<String>) {
        self.document_name = Some(document_name.into());
        self.error = None;
    }

    pub fn is_open(&self) -> bool {
        self.document_name.is_some()
    }

    pub fn document_name(&self) -> Option<&str> {
        self.document_name.as_deref()
    }

    pub fn set_reason(&mut self, reason: impl Into<String>) {
        self.reason = reason.into();
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_submitting(&self) -> bool {
        self.submitting
    }

    pub fn can_submit(&self) -> bool {
        self.is_open() && !self.submitting
    }

    pub fn cancel(&mut self) {
        *self = Self::default();
    }

    /// Validate, then hand the trimmed reason to `on_confirm`. Success closes
    /// the dialog and clears the input.
    pub async fn submit<F, Fut, E>(&mut self, on_confirm: F) -> SubmitOutcome
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = Result<(), E>>,
        E: fmt::Display,
    {
        if !self.can_submit() {
            return SubmitOutcome::Ignored;
        }

        let reason = match validate_rejection_reason(&self.reason) {
            Ok(reason) => reason,
            Err(e) => {
                self.error = Some(e.message);
                return SubmitOutcome::Invalid;
            }
        };

        self.submitting = true;
        self.error = None;
        let result = on_confirm(reason).await;
        self.submitting = false;

        match result {
            Ok(()) => {
                self.cancel();
                SubmitOutcome::Closed
            }
            Err(e) => {
                tracing::warn!("Document rejection failed: {}", e);
                self.error = Some(SUBMIT_FAILED.to_string());
                SubmitOutcome::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryDocumentRepository;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_reason_bounds_after_trim() {
        assert_eq!(
            validate_rejection_reason("   too short   ").unwrap_err().message,
            REASON_TOO_SHORT
        );
        assert_eq!(validate_rejection_reason("  Blurry scan  ").unwrap(), "Blurry scan");
        assert!(validate_rejection_reason(&"x".repeat(500)).is_ok());
        assert_eq!(
            validate_rejection_reason(&"x".repeat(501)).unwrap_err().message,
            REASON_TOO_LONG
        );
        // Characters, not bytes.
        assert!(validate_rejection_reason(&"é".repeat(500)).is_ok());
    }

    #[tokio::test]
    async fn test_invalid_reason_keeps_dialog_open() {
        let calls = AtomicUsize::new(0);
        let mut dialog = RejectionDialog::new();
        dialog.open("permis_de_conduire.pdf");
        dialog.set_reason("flou");

        let outcome = dialog
            .submit(|_| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<(), String>(())
            })
            .await;

        assert_eq!(outcome, SubmitOutcome::Invalid);
        assert!(dialog.is_open());
        assert_eq!(dialog.error(), Some(REASON_TOO_SHORT));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failed_callback_keeps_input() {
        let mut dialog = RejectionDialog::new();
        dialog.open("carte_vtc.pdf");
        dialog.set_reason("Document expiré depuis mars");

        let outcome = dialog
            .submit(|_| async { Err::<(), _>("network down") })
            .await;

        assert_eq!(outcome, SubmitOutcome::Failed);
        assert!(dialog.is_open());
        assert_eq!(dialog.reason(), "Document expiré depuis mars");
        assert_eq!(dialog.error(), Some(SUBMIT_FAILED));
        assert!(!dialog.is_submitting());
    }

    #[tokio::test]
    async fn test_success_closes_and_clears() {
        let mut dialog = RejectionDialog::new();
        dialog.open("assurance.pdf");
        dialog.set_reason("   Informations manquantes   ");

        let mut received = None;
        let outcome = dialog
            .submit(|reason| {
                received = Some(reason);
                async { Ok::<(), String>(()) }
            })
            .await;

        assert_eq!(outcome, SubmitOutcome::Closed);
        assert_eq!(received.as_deref(), Some("Informations manquantes"));
        assert!(!dialog.is_open());
        assert_eq!(dialog.reason(), "");
    }

    #[test]
    fn test_cancel_clears_input() {
        let mut dialog = RejectionDialog::new();
        dialog.open("kbis.pdf");
        dialog.set_reason("Pas le bon document");
        dialog.cancel();
        assert!(!dialog.is_open());
        assert_eq!(dialog.reason(), "");
        assert!(!dialog.can_submit());
    }

    #[tokio::test]
    async fn test_service_records_trimmed_reason() {
        let service = DocumentReviewService::new(Arc::new(InMemoryDocumentRepository::new()));
        let document = Uuid::new_v4();
        let admin = Uuid::new_v4();

        let rejection = service.reject(document, "  Photo illisible  ", admin).await.unwrap();
        assert_eq!(rejection.reason, "Photo illisible");
        assert_eq!(service.history(document).await.unwrap(), vec![rejection]);

        assert!(matches!(
            service.reject(document, "short", admin).await,
            Err(DocumentError::Validation(_))
        ));
    }
}
