//! Dashboard panels. Each panel owns its own copy of the fetched reports and
//! its own fetch lifecycle; nothing is shared between panels.

use std::{
    sync::{Arc, Weak},
    time::Duration,
};

use tokio::sync::watch;

use crate::{client::ReportsApi, model::Report};

pub mod map;
pub mod table;
pub mod upload;

pub use map::{MapPanel, MapView, Marker, Popup};
pub use table::{ReportsTablePanel, TableRow, TableView};
pub use upload::{SubmitOutcome, UploadPanel, UploadView};

/// The surface a panel is displayed on.
pub trait Page: Send + Sync {
    /// Shows a message the user has to acknowledge.
    fn alert(&self, message: &str);
    /// Reloads everything on the page.
    fn reload(&self);
}

/// What a panel currently shows.
#[derive(Debug, Clone)]
pub struct Snapshot<T> {
    pub items: Vec<T>,
    /// Fetches that completed (successfully or not) since mount.
    pub attempts: u64,
    pub last_error: Option<String>,
}

impl<T> Default for Snapshot<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            attempts: 0,
            last_error: None,
        }
    }
}

pub(crate) type Store<T> = Arc<watch::Sender<Snapshot<T>>>;

pub(crate) fn new_store<T>() -> Store<T> {
    Arc::new(watch::Sender::new(Snapshot::default()))
}

/// Starts one fetch that is never cancelled. The result lands in `target` if
/// the panel is still mounted when the fetch resolves, and is dropped
/// otherwise.
pub(crate) fn spawn_fetch<C, T, F>(client: Arc<C>, target: Weak<watch::Sender<Snapshot<T>>>, project: F)
where
    C: ReportsApi,
    T: Send + Sync + 'static,
    F: FnOnce(Vec<Report>) -> Vec<T> + Send + 'static,
{
    tokio::spawn(async move {
        let result = client.fetch_reports().await;
        let Some(store) = target.upgrade() else {
            tracing::debug!("panel unmounted before fetch resolved; discarding result");
            return;
        };
        store.send_modify(|snapshot| {
            snapshot.attempts += 1;
            match result {
                Ok(reports) => {
                    snapshot.items = project(reports);
                    snapshot.last_error = None;
                }
                Err(e) => {
                    // Already logged by the client; keep what is on screen.
                    snapshot.last_error = Some(e.to_string());
                }
            }
        });
    });
}

/// Waits until at least `attempts` fetches completed, or `timeout` elapsed.
/// Returns whether the target was reached.
pub(crate) async fn wait_for_attempts<T>(
    mut rx: watch::Receiver<Snapshot<T>>,
    attempts: u64,
    timeout: Duration,
) -> bool {
    tokio::time::timeout(timeout, rx.wait_for(|s| s.attempts >= attempts))
        .await
        .map(|res| res.is_ok())
        .unwrap_or(false)
}
