//! AList listing API client

mod client;
mod types;

pub use client::AlistClient;
pub use types::{AlistResp, FsEntry, FsListData};
