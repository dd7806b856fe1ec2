use std::sync::Arc;

use serde::Serialize;

use super::Page;
use crate::client::{ReportsApi, UploadError, UploadFile};

pub const UPLOAD_HEADING: &str = "Upload Defect Image";
pub const ACCEPTED_MEDIA: &str = "image/*,video/*";
pub const UPLOAD_SUCCEEDED: &str = "✅ File uploaded and processed successfully!";
pub const UPLOAD_FAILED: &str = "❌ Upload failed. Try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// No file was selected; nothing was sent.
    NothingSelected,
    Submitted,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadView {
    pub heading: &'static str,
    pub accept: &'static str,
    pub selected_file: Option<String>,
    pub traffic_density: Option<String>,
}

/// Form holding a single pending media file.
pub struct UploadPanel<C> {
    client: Arc<C>,
    selected: Option<UploadFile>,
    traffic_density: Option<String>,
}

impl<C: ReportsApi> UploadPanel<C> {
    pub fn new(client: Arc<C>) -> Self {
        Self {
            client,
            selected: None,
            traffic_density: None,
        }
    }

    /// Replaces the pending selection. Only image and video files are taken.
    pub fn select(&mut self, file: UploadFile) -> Result<(), UploadError> {
        if !crate::client::is_accepted_media_type(&file.content_type) {
            return Err(UploadError::UnsupportedMediaType(file.content_type));
        }
        tracing::debug!("selected {} for upload", file.file_name);
        self.selected = Some(file);
        Ok(())
    }

    pub fn clear(&mut self) {
        self.selected = None;
    }

    pub fn selected(&self) -> Option<&UploadFile> {
        self.selected.as_ref()
    }

    /// Overrides the backend's traffic estimate for the next upload.
    pub fn set_traffic_density(&mut self, density: Option<String>) {
        self.traffic_density = density.filter(|d| !d.trim().is_empty());
    }

    /// Sends the pending file. On success the selection is cleared and the
    /// page is told to reload; on failure the selection stays so the user
    /// can try again.
    pub async fn submit<P: Page + ?Sized>(&mut self, page: &P) -> SubmitOutcome {
        let Some(file) = self.selected.as_ref() else {
            return SubmitOutcome::NothingSelected;
        };

        let result = self
            .client
            .submit_report(file, self.traffic_density.as_deref())
            .await;
        match result {
            Ok(()) => {
                tracing::info!("upload of {} accepted", file.file_name);
                self.selected = None;
                page.alert(UPLOAD_SUCCEEDED);
                page.reload();
                SubmitOutcome::Submitted
            }
            Err(_) => {
                page.alert(UPLOAD_FAILED);
                SubmitOutcome::Failed
            }
        }
    }

    pub fn view(&self) -> UploadView {
        UploadView {
            heading: UPLOAD_HEADING,
            accept: ACCEPTED_MEDIA,
            selected_file: self.selected.as_ref().map(|f| f.file_name.clone()),
            traffic_density: self.traffic_density.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::panels::testing::{RecordingPage, StubApi};

    fn clip() -> UploadFile {
        UploadFile::new("crack.mp4", "video/mp4", vec![0, 0, 0, 24]).unwrap()
    }

    #[tokio::test]
    async fn test_submit_without_selection_is_a_no_op() {
        let stub = StubApi::with_reports(vec![]);
        let page = RecordingPage::default();
        let mut panel = UploadPanel::new(stub.clone());

        assert_eq!(panel.submit(&page).await, SubmitOutcome::NothingSelected);
        assert_eq!(stub.submissions(), 0);
        assert!(page.alerts().is_empty());
        assert_eq!(page.reloads(), 0);
    }

    #[tokio::test]
    async fn test_successful_submit_alerts_and_reloads() {
        let stub = StubApi::with_reports(vec![]);
        let page = RecordingPage::default();
        let mut panel = UploadPanel::new(stub.clone());
        panel.select(clip()).unwrap();

        assert_eq!(panel.submit(&page).await, SubmitOutcome::Submitted);
        assert_eq!(stub.submissions(), 1);
        assert_eq!(page.alerts(), vec![UPLOAD_SUCCEEDED.to_string()]);
        assert_eq!(page.reloads(), 1);

        // Nothing left to send a second time.
        assert!(panel.selected().is_none());
        assert_eq!(panel.submit(&page).await, SubmitOutcome::NothingSelected);
        assert_eq!(stub.submissions(), 1);
    }

    #[tokio::test]
    async fn test_failed_submit_alerts_and_keeps_selection() {
        let stub = StubApi::with_reports(vec![]);
        stub.fail_submit.store(true, Ordering::SeqCst);
        let page = RecordingPage::default();
        let mut panel = UploadPanel::new(stub.clone());
        panel.select(clip()).unwrap();

        assert_eq!(panel.submit(&page).await, SubmitOutcome::Failed);
        assert_eq!(page.alerts(), vec![UPLOAD_FAILED.to_string()]);
        assert_eq!(page.reloads(), 0);
        assert_eq!(panel.selected(), Some(&clip()));

        // The kept selection can be retried as is.
        stub.fail_submit.store(false, Ordering::SeqCst);
        assert_eq!(panel.submit(&page).await, SubmitOutcome::Submitted);
        assert_eq!(stub.submissions(), 2);
    }

    #[tokio::test]
    async fn test_traffic_density_travels_with_upload() {
        let stub = StubApi::with_reports(vec![]);
        let page = RecordingPage::default();
        let mut panel = UploadPanel::new(stub.clone());
        panel.select(clip()).unwrap();
        panel.set_traffic_density(Some("medium".to_string()));

        panel.submit(&page).await;
        let submitted = stub.submitted.lock().unwrap();
        assert_eq!(submitted[0].1.as_deref(), Some("medium"));
    }

    #[test]
    fn test_select_rejects_other_media() {
        let stub = StubApi::with_reports(vec![]);
        let mut panel = UploadPanel::new(stub);
        let doc = UploadFile {
            file_name: "notes.txt".to_string(),
            content_type: "text/plain".to_string(),
            bytes: vec![1],
        };
        assert!(panel.select(doc).is_err());
        assert!(panel.selected().is_none());
        assert_eq!(panel.view().selected_file, None);
    }
}
