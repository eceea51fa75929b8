//! Endpoint handlers mounted by the dispatcher.

pub mod healthcheck;
pub mod images;
