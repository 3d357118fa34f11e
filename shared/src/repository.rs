//! Session-wide collections of points and areas.
//!
//! Every mutation rewrites the whole collection under its key. The in-memory
//! state only changes after the write succeeded.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::{ResourceError, StoreError, ValidationError};
use crate::policy::{can_edit, can_see, can_toggle, Actor, Assignable};
use crate::store::{ResourceStore, AREAS_KEY, POINTS_KEY};
use crate::types::{Area, Point, UpdateAreaRequest, UpdatePointRequest};

/// A map entity the repository can hold.
pub trait Resource: Assignable + Clone + Serialize + DeserializeOwned + Send + Sync {
    /// Resource Store key of the collection.
    const KEY: &'static str;
    const KIND: &'static str;
    /// Field overrides accepted by [`copy_with`](Resource::copy_with).
    type Update: DeserializeOwned + Default + Send;

    fn id(&self) -> &str;
    fn copy_with(&self, update: Self::Update) -> Self;
    fn is_ready(&self) -> bool;
    fn with_ready(&self, ready: bool) -> Self;
    fn pad_to_plans(&mut self, plans: usize) -> bool;
    fn validate(&self, plans: usize) -> Result<(), ValidationError>;
}

impl Resource for Point {
    const KEY: &'static str = POINTS_KEY;
    const KIND: &'static str = "point";
    type Update = UpdatePointRequest;

    fn id(&self) -> &str {
        &self.id
    }

    fn copy_with(&self, update: UpdatePointRequest) -> Self {
        Point::copy_with(self, update)
    }

    fn is_ready(&self) -> bool {
        self.is_ready
    }

    fn with_ready(&self, ready: bool) -> Self {
        Point::copy_with(self, UpdatePointRequest {
            is_ready: Some(ready),
            ..Default::default()
        })
    }

    fn pad_to_plans(&mut self, plans: usize) -> bool {
        Point::pad_to_plans(self, plans)
    }

    fn validate(&self, plans: usize) -> Result<(), ValidationError> {
        Point::validate(self, plans)
    }
}

impl Resource for Area {
    const KEY: &'static str = AREAS_KEY;
    const KIND: &'static str = "area";
    type Update = UpdateAreaRequest;

    fn id(&self) -> &str {
        &self.id
    }

    fn copy_with(&self, update: UpdateAreaRequest) -> Self {
        Area::copy_with(self, update)
    }

    fn is_ready(&self) -> bool {
        self.is_ready
    }

    fn with_ready(&self, ready: bool) -> Self {
        Area::copy_with(self, UpdateAreaRequest {
            is_ready: Some(ready),
            ..Default::default()
        })
    }

    fn pad_to_plans(&mut self, plans: usize) -> bool {
        Area::pad_to_plans(self, plans)
    }

    fn validate(&self, plans: usize) -> Result<(), ValidationError> {
        Area::validate(self, plans)
    }
}

/// Decode a stored collection. Entries that fail to parse are skipped and
/// logged; the rest are padded to `plans`.
pub fn decode_collection<R: Resource>(raw: &str, plans: usize) -> Vec<R> {
    let entries: Vec<Value> = match serde_json::from_str(raw) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!("Stored {} collection is not a JSON array, ignoring it: {}", R::KEY, e);
            return Vec::new();
        }
    };

    let mut items = Vec::with_capacity(entries.len());
    for (index, entry) in entries.into_iter().enumerate() {
        match serde_json::from_value::<R>(entry) {
            Ok(mut item) => {
                if item.pad_to_plans(plans) {
                    tracing::debug!("Padded {} {} to {} plans", R::KIND, item.id(), plans);
                }
                items.push(item);
            }
            Err(e) => {
                tracing::warn!("Skipping malformed {} at {}[{}]: {}", R::KIND, R::KEY, index, e);
            }
        }
    }
    items
}

pub struct ResourceRepository<R, S> {
    store: Arc<S>,
    plans: usize,
    items: Vec<R>,
}

impl<R: Resource, S: ResourceStore> ResourceRepository<R, S> {
    /// Empty repository; nothing is read until [`load`](Self::load).
    pub fn new(store: Arc<S>, plans: usize) -> Self {
        Self {
            store,
            plans,
            items: Vec::new(),
        }
    }

    /// Read the collection from the store, replacing what is in memory.
    pub async fn load(&mut self) -> Result<(), StoreError> {
        self.items = match self.store.get_string(R::KEY).await? {
            Some(raw) => decode_collection(&raw, self.plans),
            None => Vec::new(),
        };
        tracing::info!("Loaded {} {} entries", self.items.len(), R::KIND);
        Ok(())
    }

    pub fn all(&self) -> &[R] {
        &self.items
    }

    pub fn get(&self, id: &str) -> Option<&R> {
        self.items.iter().find(|item| item.id() == id)
    }

    pub fn visible_to<'a>(&'a self, actor: &'a Actor) -> impl Iterator<Item = &'a R> + 'a {
        self.items.iter().filter(move |item| can_see(actor, *item))
    }

    /// Write the whole collection, overwriting whatever the store held.
    pub async fn save(&self) -> Result<(), StoreError> {
        write_collection(self.store.as_ref(), &self.items).await
    }

    async fn commit(&mut self, items: Vec<R>) -> Result<(), StoreError> {
        write_collection(self.store.as_ref(), &items).await?;
        self.items = items;
        Ok(())
    }

    /// Replace the entity with the same id, or append it.
    pub async fn upsert(&mut self, actor: &Actor, resource: R) -> Result<(), ResourceError> {
        if !can_edit(actor.role) {
            tracing::warn!("{} ({:?}) may not edit {}s", actor.username, actor.role, R::KIND);
            return Err(ResourceError::Unauthorized {
                action: "edit map resources",
            });
        }
        resource.validate(self.plans)?;

        let mut items = self.items.clone();
        match items.iter_mut().find(|item| item.id() == resource.id()) {
            Some(existing) => *existing = resource.clone(),
            None => items.push(resource.clone()),
        }
        self.commit(items).await?;

        tracing::info!("{} upserted {} {}", actor.username, R::KIND, resource.id());
        Ok(())
    }

    /// Apply field overrides to an existing entity and write it back.
    pub async fn update(
        &mut self,
        actor: &Actor,
        id: &str,
        update: R::Update,
    ) -> Result<R, ResourceError> {
        let updated = self
            .get(id)
            .ok_or_else(|| ResourceError::NotFound(format!("{} {}", R::KIND, id)))?
            .copy_with(update);
        self.upsert(actor, updated.clone()).await?;
        Ok(updated)
    }

    pub async fn remove(&mut self, actor: &Actor, id: &str) -> Result<R, ResourceError> {
        if !can_edit(actor.role) {
            tracing::warn!("{} ({:?}) may not delete {}s", actor.username, actor.role, R::KIND);
            return Err(ResourceError::Unauthorized {
                action: "delete map resources",
            });
        }
        let removed = self
            .get(id)
            .cloned()
            .ok_or_else(|| ResourceError::NotFound(format!("{} {}", R::KIND, id)))?;

        let items = self
            .items
            .iter()
            .filter(|item| item.id() != id)
            .cloned()
            .collect();
        self.commit(items).await?;

        tracing::info!("{} removed {} {}", actor.username, R::KIND, id);
        Ok(removed)
    }

    /// Flip `isReady`. The only mutation open to an Ordner, and only on
    /// resources assigned to them.
    pub async fn toggle_ready(&mut self, actor: &Actor, id: &str) -> Result<R, ResourceError> {
        let current = self
            .get(id)
            .ok_or_else(|| ResourceError::NotFound(format!("{} {}", R::KIND, id)))?;
        if !can_toggle(actor, current) {
            tracing::warn!("{} ({:?}) may not toggle {} {}", actor.username, actor.role, R::KIND, id);
            return Err(ResourceError::Unauthorized {
                action: "toggle readiness",
            });
        }

        let toggled = current.with_ready(!current.is_ready());
        let items = self
            .items
            .iter()
            .map(|item| if item.id() == id { toggled.clone() } else { item.clone() })
            .collect();
        self.commit(items).await?;

        tracing::info!(
            "{} set {} {} ready={}",
            actor.username,
            R::KIND,
            id,
            toggled.is_ready()
        );
        Ok(toggled)
    }
}

async fn write_collection<R: Resource, S: ResourceStore>(
    store: &S,
    items: &[R],
) -> Result<(), StoreError> {
    let raw = serde_json::to_string(items)?;
    store.set_string(R::KEY, &raw).await
}

/// Points and areas of one session.
pub struct MapResources<S> {
    pub points: ResourceRepository<Point, S>,
    pub areas: ResourceRepository<Area, S>,
}

impl<S: ResourceStore> MapResources<S> {
    pub fn new(store: Arc<S>, plans: usize) -> Self {
        Self {
            points: ResourceRepository::new(Arc::clone(&store), plans),
            areas: ResourceRepository::new(store, plans),
        }
    }

    pub async fn load(store: Arc<S>, plans: usize) -> Result<Self, StoreError> {
        let mut resources = Self::new(store, plans);
        tokio::try_join!(resources.points.load(), resources.areas.load())?;
        Ok(resources)
    }
}
