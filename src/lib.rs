#![forbid(unsafe_code)]

pub mod archive;
pub mod cli;
pub mod comic_info;
pub mod config;
pub mod error;
pub mod fetch;
pub mod logging;
pub mod reconcile;
pub mod retag;
pub mod slug;
pub mod source;
pub mod sync;

pub use error::SyncError;
