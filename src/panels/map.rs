use std::{collections::HashSet, sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{interval, MissedTickBehavior},
};

use super::{new_store, spawn_fetch, wait_for_attempts, Snapshot, Store};
use crate::{
    client::ReportsApi,
    config::MapSettings,
    model::{Report, ReportId},
};

/// Popup text shown when a marker is clicked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Popup {
    pub title: String,
    pub severity: String,
    pub priority: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub traffic_density: Option<String>,
}

impl Popup {
    pub fn lines(&self) -> Vec<String> {
        let mut lines = vec![
            self.title.clone(),
            format!("Severity: {}", self.severity),
            format!("Priority: {}", self.priority),
        ];
        if let Some(density) = &self.traffic_density {
            lines.push(format!("Traffic: {}", density));
        }
        lines
    }
}

/// A pin on the map for one report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    /// Render key only; markers are never diffed.
    pub id: ReportId,
    pub latitude: f64,
    pub longitude: f64,
    pub popup: Popup,
}

impl From<&Report> for Marker {
    fn from(report: &Report) -> Self {
        Self {
            id: report.id.clone(),
            latitude: report.latitude,
            longitude: report.longitude,
            popup: Popup {
                title: report.kind_label().to_string(),
                severity: report.severity.to_string(),
                priority: report.priority.to_string(),
                traffic_density: report.traffic_density.clone(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapView {
    pub settings: MapSettings,
    pub refresh_interval_ms: u64,
    pub markers: Vec<Marker>,
}

/// One marker per report that can be placed on the map.
pub fn markers_from(reports: Vec<Report>) -> Vec<Marker> {
    let mut seen = HashSet::with_capacity(reports.len());
    reports
        .iter()
        .filter(|report| {
            if !seen.insert(report.id.clone()) {
                tracing::warn!("duplicate report id {} in fetch result", report.id);
            }
            if report.has_valid_coordinates() {
                true
            } else {
                tracing::warn!(
                    "report {} has out-of-range coordinates ({}, {}); not placed on the map",
                    report.id,
                    report.latitude,
                    report.longitude
                );
                false
            }
        })
        .map(Marker::from)
        .collect()
}

/// Map of all reports, re-fetched on a fixed interval while mounted.
pub struct MapPanel {
    store: Store<Marker>,
    settings: MapSettings,
    every: Duration,
    poller: JoinHandle<()>,
}

impl MapPanel {
    /// Fetches immediately, then every `every` until the panel is unmounted.
    /// Must be called from within a tokio runtime.
    pub fn mount<C: ReportsApi>(client: Arc<C>, settings: MapSettings, every: Duration) -> Self {
        let store = new_store();
        let target = Arc::downgrade(&store);

        let poller = tokio::spawn(async move {
            let mut ticker = interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                // The first tick completes immediately: that is the mount fetch.
                ticker.tick().await;
                if target.strong_count() == 0 {
                    break;
                }
                spawn_fetch(client.clone(), target.clone(), markers_from);
            }
        });
        tracing::debug!("map panel mounted; refreshing every {:?}", every);

        Self {
            store,
            settings,
            every,
            poller,
        }
    }

    /// Stops the refresh timer. Fetches already in flight resolve into nothing.
    pub fn unmount(self) {
        tracing::debug!("map panel unmounted");
        drop(self);
    }

    pub fn markers(&self) -> Vec<Marker> {
        self.store.borrow().items.clone()
    }

    pub fn snapshot(&self) -> Snapshot<Marker> {
        self.store.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Snapshot<Marker>> {
        self.store.subscribe()
    }

    pub fn refresh_interval(&self) -> Duration {
        self.every
    }

    /// Waits for the mount fetch to complete.
    pub async fn settled(&self, timeout: Duration) -> bool {
        wait_for_attempts(self.subscribe(), 1, timeout).await
    }

    pub fn view(&self) -> MapView {
        MapView {
            settings: self.settings.clone(),
            refresh_interval_ms: self.every.as_millis() as u64,
            markers: self.markers(),
        }
    }
}

impl Drop for MapPanel {
    fn drop(&mut self) {
        self.poller.abort();
    }
}
