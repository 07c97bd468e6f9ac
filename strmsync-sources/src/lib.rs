//! Source adapters for strmsync
//!
//! A source adapter lists a directory tree on a named backend and constructs
//! download URLs for the files it reports. Two variants exist: the cloud
//! adapter speaking the AList listing API, and the local-filesystem adapter.

pub mod adapter;
pub mod alist;
pub mod cloud;
pub mod error;
pub mod local;
pub mod types;

pub use adapter::SourceAdapter;
pub use cloud::{CloudSourceAdapter, CloudSourceConfig};
pub use error::SourceError;
pub use local::LocalSourceAdapter;
pub use types::FileEntry;
