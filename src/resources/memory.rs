use async_trait::async_trait;
use dashmap::DashMap;

use crate::model::{ResourceId, ResourceInfo};

use super::{RemoteError, ResourceService};

/// In-process resource service. Each resource kind lives in its own map;
/// `try_reserve_*` flips under the shard lock so concurrent callers observe
/// a single winner.
pub struct InMemoryResources {
    workplaces: DashMap<ResourceId, ResourceInfo>,
    parking_spaces: DashMap<ResourceId, ResourceInfo>,
    tags: DashMap<String, ResourceId>,
}

impl Default for InMemoryResources {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryResources {
    pub fn new() -> Self {
        Self {
            workplaces: DashMap::new(),
            parking_spaces: DashMap::new(),
            tags: DashMap::new(),
        }
    }

    // ── Seeding ──────────────────────────────────────────────

    pub fn add_workplace(&self, info: ResourceInfo, unique_tag: Option<&str>) {
        if let Some(tag) = unique_tag {
            self.tags.insert(tag.to_string(), info.id);
        }
        self.workplaces.insert(info.id, info);
    }

    pub fn add_parking_space(&self, info: ResourceInfo) {
        self.parking_spaces.insert(info.id, info);
    }

    pub fn workplace_available(&self, id: ResourceId) -> Option<bool> {
        self.workplaces.get(&id).map(|e| e.is_available)
    }

    pub fn parking_space_available(&self, id: ResourceId) -> Option<bool> {
        self.parking_spaces.get(&id).map(|e| e.is_available)
    }
}

fn lookup(
    map: &DashMap<ResourceId, ResourceInfo>,
    kind: &str,
    id: ResourceId,
) -> Result<ResourceInfo, RemoteError> {
    map.get(&id)
        .map(|e| e.value().clone())
        .ok_or_else(|| RemoteError::NotFound(format!("{kind} {id}")))
}

fn set_available(
    map: &DashMap<ResourceId, ResourceInfo>,
    kind: &str,
    id: ResourceId,
    is_available: bool,
) -> Result<(), RemoteError> {
    let mut entry = map
        .get_mut(&id)
        .ok_or_else(|| RemoteError::NotFound(format!("{kind} {id}")))?;
    entry.is_available = is_available;
    Ok(())
}

fn try_reserve(
    map: &DashMap<ResourceId, ResourceInfo>,
    kind: &str,
    id: ResourceId,
) -> Result<bool, RemoteError> {
    let mut entry = map
        .get_mut(&id)
        .ok_or_else(|| RemoteError::NotFound(format!("{kind} {id}")))?;
    if !entry.is_available {
        return Ok(false);
    }
    entry.is_available = false;
    Ok(true)
}

#[async_trait]
impl ResourceService for InMemoryResources {
    async fn get_workplace_by_id(&self, id: ResourceId) -> Result<ResourceInfo, RemoteError> {
        lookup(&self.workplaces, "workplace", id)
    }

    async fn get_parking_space_by_id(&self, id: ResourceId) -> Result<ResourceInfo, RemoteError> {
        lookup(&self.parking_spaces, "parking space", id)
    }

    async fn update_workplace(&self, id: ResourceId, is_available: bool) -> Result<(), RemoteError> {
        set_available(&self.workplaces, "workplace", id, is_available)
    }

    async fn update_parking_space(
        &self,
        id: ResourceId,
        is_available: bool,
    ) -> Result<(), RemoteError> {
        set_available(&self.parking_spaces, "parking space", id, is_available)
    }

    async fn get_workplace_by_unique_tag(&self, tag: &str) -> Result<ResourceInfo, RemoteError> {
        let id = self
            .tags
            .get(tag)
            .map(|e| *e.value())
            .ok_or_else(|| RemoteError::NotFound(format!("workplace tag {tag}")))?;
        lookup(&self.workplaces, "workplace", id)
    }

    async fn try_reserve_workplace(&self, id: ResourceId) -> Result<bool, RemoteError> {
        try_reserve(&self.workplaces, "workplace", id)
    }

    async fn try_reserve_parking_space(&self, id: ResourceId) -> Result<bool, RemoteError> {
        try_reserve(&self.parking_spaces, "parking space", id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desk(id: ResourceId) -> ResourceInfo {
        ResourceInfo {
            id,
            is_available: true,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn try_reserve_flips_once() {
        let svc = InMemoryResources::new();
        svc.add_workplace(desk(1), None);
        assert_eq!(svc.try_reserve_workplace(1).await, Ok(true));
        assert_eq!(svc.try_reserve_workplace(1).await, Ok(false));
        assert_eq!(svc.workplace_available(1), Some(false));
    }

    #[tokio::test]
    async fn unknown_resource_is_not_found() {
        let svc = InMemoryResources::new();
        assert!(matches!(
            svc.get_parking_space_by_id(9).await,
            Err(RemoteError::NotFound(_))
        ));
        assert!(matches!(
            svc.update_workplace(9, true).await,
            Err(RemoteError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn tag_lookup() {
        let svc = InMemoryResources::new();
        svc.add_workplace(desk(4), Some("A-4"));
        assert_eq!(svc.get_workplace_by_unique_tag("A-4").await.unwrap().id, 4);
        assert!(svc.get_workplace_by_unique_tag("B-1").await.is_err());
    }

    #[tokio::test]
    async fn kinds_are_separate() {
        let svc = InMemoryResources::new();
        svc.add_workplace(desk(1), None);
        svc.add_parking_space(desk(1));
        svc.update_parking_space(1, false).await.unwrap();
        assert_eq!(svc.workplace_available(1), Some(true));
        assert_eq!(svc.parking_space_available(1), Some(false));
    }
}
