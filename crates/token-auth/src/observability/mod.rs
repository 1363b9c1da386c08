//! Observability for token authentication.
//!
//! Only the `metrics` facade is used; installing an exporter is left to the
//! embedding service.

pub mod metrics;
