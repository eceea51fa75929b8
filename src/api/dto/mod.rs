//! Data Transfer Objects for the liveness endpoint and the RPC service.

pub mod health_dto;
pub mod image_dto;

pub use health_dto::*;
pub use image_dto::*;
