//! HTTP middleware for the admin API.

pub mod request_id;

pub use request_id::{request_id_layers, trace_layer, UuidRequestId, X_REQUEST_ID};
