//! Error handling for Modelwatch.
//! One error enum per subsystem, `thiserror` only.

pub mod config_error;
pub mod datamart_error;
pub mod error_code;
pub mod frame_error;
pub mod query_error;
pub mod storage_error;

pub use config_error::ConfigError;
pub use datamart_error::{DatamartError, DatamartResult};
pub use error_code::ModelwatchErrorCode;
pub use frame_error::FrameError;
pub use query_error::QueryError;
pub use storage_error::StorageError;
