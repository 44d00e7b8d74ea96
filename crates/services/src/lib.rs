#![forbid(unsafe_code)]

pub mod api;
pub mod app_services;
pub mod catalog_service;
pub mod config;
pub mod error;
pub mod history_service;
pub mod identity;
pub mod launch_service;
pub mod result_service;
pub mod sessions;

pub use psy_core::Clock;

pub use api::{HttpPsychologyApi, PsychologyApi, ScriptedApi, Submission};
pub use app_services::AppServices;
pub use catalog_service::CatalogService;
pub use config::{ApiConfig, IdentityPolicy};
pub use error::{ApiError, HistoryError, IdentityError, ResultError, SessionError};
pub use history_service::HistoryService;
pub use identity::{
    DeviceRegistry, IdentityProvisioner, LocalCacheFirstProvisioner, ServerReconcilingProvisioner,
    provisioner_for,
};
pub use launch_service::LaunchService;
pub use result_service::ResultService;
pub use sessions::{
    FailureKind, SessionFailure, SessionProgress, SessionState, SessionStep, TestSession,
    TestSessionService,
};
