pub mod api;
pub mod backup;
pub mod config;
pub mod db;
pub mod error;
pub mod jobs;
pub mod store;
pub mod vendor;

pub use error::ImageBatchError;
