use std::{sync::Arc, time::Duration};

use chrono::{Local, TimeZone};
use serde::Serialize;

use super::{new_store, spawn_fetch, wait_for_attempts, Snapshot, Store};
use crate::{
    client::ReportsApi,
    model::{Report, ReportId},
};

pub const TABLE_HEADING: &str = "Defect Reports";
pub const TABLE_COLUMNS: [&str; 5] = ["Type", "Severity", "Priority", "Location", "Timestamp"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableRow {
    pub id: ReportId,
    pub kind: String,
    pub severity: String,
    /// Rendered with emphasis.
    pub priority: String,
    pub location: String,
    pub timestamp: String,
}

impl TableRow {
    pub fn from_report<Tz>(report: &Report, tz: &Tz, timestamp_format: &str) -> Self
    where
        Tz: TimeZone,
        Tz::Offset: std::fmt::Display,
    {
        Self {
            id: report.id.clone(),
            kind: report.kind_label().to_string(),
            severity: report.severity.to_string(),
            priority: report.priority.to_string(),
            location: report.location_label(),
            timestamp: report.timestamp_label(tz, timestamp_format),
        }
    }

    pub fn cells(&self) -> [&str; 5] {
        [
            self.kind.as_str(),
            self.severity.as_str(),
            self.priority.as_str(),
            self.location.as_str(),
            self.timestamp.as_str(),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableView {
    pub heading: &'static str,
    pub columns: [&'static str; 5],
    pub rows: Vec<TableRow>,
}

/// Plain table of all reports, fetched once on mount.
pub struct ReportsTablePanel {
    store: Store<Report>,
    timestamp_format: String,
}

impl ReportsTablePanel {
    pub fn mount<C: ReportsApi>(client: Arc<C>, timestamp_format: impl Into<String>) -> Self {
        let store = new_store();
        spawn_fetch(client, Arc::downgrade(&store), |reports| reports);
        tracing::debug!("reports table mounted");
        Self {
            store,
            timestamp_format: timestamp_format.into(),
        }
    }

    pub fn unmount(self) {
        tracing::debug!("reports table unmounted");
    }

    pub fn reports(&self) -> Vec<Report> {
        self.store.borrow().items.clone()
    }

    pub fn snapshot(&self) -> Snapshot<Report> {
        self.store.borrow().clone()
    }

    pub async fn settled(&self, timeout: Duration) -> bool {
        wait_for_attempts(self.store.subscribe(), 1, timeout).await
    }

    /// Rows in fetch order, timestamps in `tz`.
    pub fn rows_in<Tz>(&self, tz: &Tz) -> Vec<TableRow>
    where
        Tz: TimeZone,
        Tz::Offset: std::fmt::Display,
    {
        self.store
            .borrow()
            .items
            .iter()
            .map(|report| TableRow::from_report(report, tz, &self.timestamp_format))
            .collect()
    }

    pub fn view(&self) -> TableView {
        TableView {
            heading: TABLE_HEADING,
            columns: TABLE_COLUMNS,
            rows: self.rows_in(&Local),
        }
    }
}
