use async_trait::async_trait;
use tokio_postgres::{Client, Row};

use crate::model::{ResourceId, ResourceInfo};

use super::{RemoteError, ResourceService};

const WORKPLACES: &str = "booking_service.workplaces";
const PARKING_SPACES: &str = "booking_service.parking_spaces";
const COLUMNS: &str = "id, is_available, address, zone, floor, number";

/// Resource service reached through its Postgres database. The conditional
/// flip is a single `UPDATE ... WHERE is_available`, so the row lock decides
/// the winner between concurrent reservations.
pub struct PgResourceClient {
    client: Client,
}

impl PgResourceClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub async fn connect(url: &str) -> Result<Self, RemoteError> {
        let client = crate::pg::connect(url).await.map_err(unavailable)?;
        Ok(Self::new(client))
    }

    async fn by_id(&self, table: &str, id: ResourceId) -> Result<ResourceInfo, RemoteError> {
        let sql = format!("SELECT {COLUMNS} FROM {table} WHERE id = $1");
        let row = self
            .client
            .query_opt(&sql, &[&id])
            .await
            .map_err(unavailable)?
            .ok_or_else(|| RemoteError::NotFound(format!("{table} {id}")))?;
        decode(&row)
    }

    async fn set_available(
        &self,
        table: &str,
        id: ResourceId,
        is_available: bool,
    ) -> Result<(), RemoteError> {
        let sql = format!("UPDATE {table} SET is_available = $1 WHERE id = $2");
        let n = self
            .client
            .execute(&sql, &[&is_available, &id])
            .await
            .map_err(unavailable)?;
        if n == 0 {
            return Err(RemoteError::NotFound(format!("{table} {id}")));
        }
        Ok(())
    }

    async fn try_reserve(&self, table: &str, id: ResourceId) -> Result<bool, RemoteError> {
        let sql = format!(
            "UPDATE {table} SET is_available = false WHERE id = $1 AND is_available RETURNING id"
        );
        let row = self
            .client
            .query_opt(&sql, &[&id])
            .await
            .map_err(unavailable)?;
        if row.is_some() {
            return Ok(true);
        }
        // Distinguish "taken" from "never existed".
        self.by_id(table, id).await?;
        Ok(false)
    }
}

fn unavailable(e: tokio_postgres::Error) -> RemoteError {
    RemoteError::Unavailable(e.to_string())
}

fn decode(row: &Row) -> Result<ResourceInfo, RemoteError> {
    let shape = |e: tokio_postgres::Error| RemoteError::Unavailable(format!("bad resource row: {e}"));
    Ok(ResourceInfo {
        id: row.try_get(0).map_err(shape)?,
        is_available: row.try_get(1).map_err(shape)?,
        address: row.try_get(2).map_err(shape)?,
        zone: row.try_get(3).map_err(shape)?,
        floor: row.try_get(4).map_err(shape)?,
        number: row.try_get(5).map_err(shape)?,
    })
}

#[async_trait]
impl ResourceService for PgResourceClient {
    async fn get_workplace_by_id(&self, id: ResourceId) -> Result<ResourceInfo, RemoteError> {
        self.by_id(WORKPLACES, id).await
    }

    async fn get_parking_space_by_id(&self, id: ResourceId) -> Result<ResourceInfo, RemoteError> {
        self.by_id(PARKING_SPACES, id).await
    }

    async fn update_workplace(&self, id: ResourceId, is_available: bool) -> Result<(), RemoteError> {
        self.set_available(WORKPLACES, id, is_available).await
    }

    async fn update_parking_space(
        &self,
        id: ResourceId,
        is_available: bool,
    ) -> Result<(), RemoteError> {
        self.set_available(PARKING_SPACES, id, is_available).await
    }

    async fn get_workplace_by_unique_tag(&self, tag: &str) -> Result<ResourceInfo, RemoteError> {
        let sql = format!("SELECT {COLUMNS} FROM {WORKPLACES} WHERE unique_tag = $1");
        let row = self
            .client
            .query_opt(&sql, &[&tag])
            .await
            .map_err(unavailable)?
            .ok_or_else(|| RemoteError::NotFound(format!("workplace tag {tag}")))?;
        decode(&row)
    }

    async fn try_reserve_workplace(&self, id: ResourceId) -> Result<bool, RemoteError> {
        self.try_reserve(WORKPLACES, id).await
    }

    async fn try_reserve_parking_space(&self, id: ResourceId) -> Result<bool, RemoteError> {
        self.try_reserve(PARKING_SPACES, id).await
    }
}
