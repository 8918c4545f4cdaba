//! Image handling
//!
//! Provides:
//! - Upload validation and raw upload storage
//! - Session-named result storage with URL handles
//! - Periodic age-based cleanup of both directories

mod store;
pub mod sweep;
mod upload;

pub use store::{
    normalize_result_url, result_file_name, ImageRef, ResultStore, SessionStamp,
    RESULTS_URL_PREFIX,
};
pub use sweep::{purge_older_than, spawn_sweeper, PurgeReport};
pub use upload::{validate_upload, ImageKind, UploadStore};
