//! Observability for the project service.
//!
//! Provides metrics definitions and recording helpers.

pub mod metrics;
