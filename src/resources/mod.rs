//! Client side of the external resource-availability service.

mod memory;
mod postgres;

pub use memory::InMemoryResources;
pub use postgres::PgResourceClient;

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{ResourceId, ResourceInfo};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    #[error("resource not found: {0}")]
    NotFound(String),
    #[error("resource service unavailable: {0}")]
    Unavailable(String),
    #[error("operation not supported by resource service")]
    Unsupported,
}

/// The resource service owns availability; the orchestrator only observes and
/// flips it. `try_reserve_*` flip only when the resource is still available and
/// report whether they did; services without that capability return
/// `Unsupported` and can only be driven with the blind flip.
#[async_trait]
pub trait ResourceService: Send + Sync {
    async fn get_workplace_by_id(&self, id: ResourceId) -> Result<ResourceInfo, RemoteError>;

    async fn get_parking_space_by_id(&self, id: ResourceId) -> Result<ResourceInfo, RemoteError>;

    async fn update_workplace(&self, id: ResourceId, is_available: bool) -> Result<(), RemoteError>;

    async fn update_parking_space(
        &self,
        id: ResourceId,
        is_available: bool,
    ) -> Result<(), RemoteError>;

    async fn get_workplace_by_unique_tag(&self, tag: &str) -> Result<ResourceInfo, RemoteError>;

    async fn try_reserve_workplace(&self, _id: ResourceId) -> Result<bool, RemoteError> {
        Err(RemoteError::Unsupported)
    }

    async fn try_reserve_parking_space(&self, _id: ResourceId) -> Result<bool, RemoteError> {
        Err(RemoteError::Unsupported)
    }
}
