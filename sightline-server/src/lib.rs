//! sightline-server: HTTP transport, remote collaborators and local record storage

pub mod http;
pub mod remote;
pub mod storage;

pub use http::{create_router, ApiState};
pub use storage::LocalStore;
