//! Client dashboard for the Smart Pavers defect-report backend: a map of
//! report pins, a reports table and a media upload form.

pub mod client;
pub mod config;
pub mod model;
pub mod panels;
pub mod render;
pub mod server;
pub mod shell;

pub use client::{ClientError, ReportsApi, ReportsClient, UploadError, UploadFile};
pub use config::{Config, ConfigError, MapSettings};
pub use model::{Detection, Grade, Report, ReportId, SubmissionReceipt};
pub use shell::DashboardShell;
