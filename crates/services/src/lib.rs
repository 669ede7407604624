#![forbid(unsafe_code)]

pub mod app_services;
pub mod catalog_service;
pub mod error;
pub mod quiz_session;
pub mod reconcile;
pub mod sync;

pub use quiz_core::Clock;

pub use app_services::AppServices;
pub use catalog_service::{AssignmentOverview, CatalogService};
pub use error::{AppServicesError, CatalogServiceError, SessionError};
pub use quiz_session::{AssignmentSession, QuizSession};
pub use reconcile::{
    LocalRead, ReconcileReport, Reconciliation, ReconciliationEngine, RemoteRead, Winner,
    choose_winner,
};
pub use sync::{SYNC_DEBOUNCE_MS, SyncCoordinator, SyncSettings, SyncStatus};
