//! Image service: implementation behind the `images.Manage` RPC surface.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::api::dto::Image;
use crate::config::ImagesConfig;
use crate::error::TwirpError;

/// The `images.Manage` RPC contract.
#[async_trait]
pub trait ImageManager: fmt::Debug + Send + Sync {
    /// Looks up an image.
    ///
    /// # Errors
    ///
    /// Returns a [`TwirpError`] the transport sends to the caller as is.
    async fn fetch(&self, image: Image) -> Result<Image, TwirpError>;

    /// Stores an image.
    ///
    /// # Errors
    ///
    /// Returns a [`TwirpError`] the transport sends to the caller as is.
    async fn upload(&self, image: Image) -> Result<Image, TwirpError>;
}

/// Pass-through implementation: both calls return their input.
///
/// Storage and transformation belong to a collaborator that is not wired
/// in yet; until then the service only enforces its call deadline.
#[derive(Debug, Clone)]
pub struct ImageService {
    config: Arc<ImagesConfig>,
}

impl ImageService {
    /// Creates the service with its module configuration.
    #[must_use]
    pub const fn new(config: Arc<ImagesConfig>) -> Self {
        Self { config }
    }

    /// Deadline applied to every call.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.config.timeout
    }
}

#[async_trait]
impl ImageManager for ImageService {
    async fn fetch(&self, image: Image) -> Result<Image, TwirpError> {
        tracing::debug!(image_id = %image.id, "fetch");
        Ok(image)
    }

    async fn upload(&self, image: Image) -> Result<Image, TwirpError> {
        tracing::debug!(image_id = %image.id, "upload");
        Ok(image)
    }
}
