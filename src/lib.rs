//! Parcel: a resumable, deduplicating large-file upload client.
//!
//! The core protocol and algorithms live in sibling workspace crates
//! (`parcel-fingerprint`, `parcel-splitter`, `parcel-scheduler`,
//! `parcel-resilience`); this crate wires them together behind an
//! [`UploadController`](controller::UploadController) that drives a session
//! from `initiate` through `merge` over an HTTP [`TransportAdapter`](transport::TransportAdapter).

pub mod config;
pub mod controller;
pub mod error;
pub mod logging;
pub mod progress;
pub mod session;
pub mod transport;

pub use controller::UploadController;
pub use error::{ClientError, Result};
pub use session::UploadSession;
