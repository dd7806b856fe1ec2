use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use serde::Serialize;

use crate::{
    client::{ReportsApi, UploadError, UploadFile},
    config::Config,
    panels::{
        MapPanel, MapView, Page, ReportsTablePanel, SubmitOutcome, TableView, UploadPanel,
        UploadView,
    },
};

pub const DASHBOARD_TITLE: &str = "Smart Pavers Dashboard";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardView {
    pub title: &'static str,
    pub map: MapView,
    pub upload: UploadView,
    pub table: TableView,
}

/// The dashboard page: map and upload form side by side, reports table below.
pub struct DashboardShell<C: ReportsApi> {
    client: Arc<C>,
    config: Config,
    map: MapPanel,
    table: ReportsTablePanel,
    upload: UploadPanel<C>,
}

impl<C: ReportsApi> DashboardShell<C> {
    /// Mounts every panel. Must be called from within a tokio runtime.
    pub fn mount(client: Arc<C>, config: Config) -> Self {
        let map = MapPanel::mount(
            client.clone(),
            config.map.clone(),
            config.map_refresh_interval,
        );
        let table = ReportsTablePanel::mount(client.clone(), config.timestamp_format.clone());
        let upload = UploadPanel::new(client.clone());
        tracing::info!("dashboard mounted against {}", config.api_url);
        Self {
            client,
            config,
            map,
            table,
            upload,
        }
    }

    /// Tears every panel down and mounts fresh ones, like a page reload.
    pub fn reload(&mut self) {
        tracing::info!("reloading dashboard");
        let fresh = Self::mount(self.client.clone(), self.config.clone());
        let stale = std::mem::replace(self, fresh);
        stale.unmount();
    }

    pub fn unmount(self) {
        self.map.unmount();
        self.table.unmount();
    }

    /// Waits for the mount fetch of both data panels.
    pub async fn settled(&self, timeout: Duration) -> bool {
        let (map, table) = tokio::join!(self.map.settled(timeout), self.table.settled(timeout));
        map && table
    }

    pub fn map(&self) -> &MapPanel {
        &self.map
    }

    pub fn table(&self) -> &ReportsTablePanel {
        &self.table
    }

    pub fn upload(&self) -> &UploadPanel<C> {
        &self.upload
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn select_upload(
        &mut self,
        file: UploadFile,
        traffic_density: Option<String>,
    ) -> Result<(), UploadError> {
        self.upload.select(file)?;
        self.upload.set_traffic_density(traffic_density);
        Ok(())
    }

    /// Drops any pending upload, including one kept after a failed submit.
    pub fn clear_upload(&mut self) {
        self.upload.clear();
        self.upload.set_traffic_density(None);
    }

    /// Submits the pending upload. A reload requested by the upload panel is
    /// applied to this shell first and then passed on to `page`.
    pub async fn submit_upload<P: Page + ?Sized>(&mut self, page: &P) -> SubmitOutcome {
        let latch = ReloadLatch {
            inner: page,
            requested: AtomicBool::new(false),
        };
        let outcome = self.upload.submit(&latch).await;
        if latch.requested.load(Ordering::SeqCst) {
            self.reload();
            page.reload();
        }
        outcome
    }

    pub fn view(&self) -> DashboardView {
        DashboardView {
            title: DASHBOARD_TITLE,
            map: self.map.view(),
            upload: self.upload.view(),
            table: self.table.view(),
        }
    }
}

/// Forwards alerts and holds back the reload until the shell has remounted.
struct ReloadLatch<'a, P: ?Sized> {
    inner: &'a P,
    requested: AtomicBool,
}

impl<P: Page + ?Sized> Page for ReloadLatch<'_, P> {
    fn alert(&self, message: &str) {
        self.inner.alert(message);
    }

    fn reload(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }
}
