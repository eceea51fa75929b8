//! Service layer: the RPC collaborators behind the dispatcher.
//!
//! [`ImageService`] implements [`ImageManager`], the contract the RPC
//! handlers call through.

pub mod image_service;

pub use image_service::{ImageManager, ImageService};
