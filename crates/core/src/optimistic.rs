//! Optimistic coordinator for UI-facing list state.
//!
//! Wraps repository writes around an in-memory list bound to a screen: the
//! list reflects every mutation immediately and reverts when the underlying
//! write fails. The list is always a projection of the store's effective
//! set; `refresh` re-projects it so no divergence survives a cache refresh.

use std::sync::Arc;

use chrono::Utc;
use log::debug;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::errors::Result;
use crate::repository::LocalFirstRepository;
use crate::store::EntityFilter;
use crate::sync::Syncable;

const TEMP_ID_PREFIX: &str = "tmp-";

pub struct OptimisticList<E: Syncable> {
    repository: Arc<LocalFirstRepository<E>>,
    owner_id: String,
    filter: EntityFilter,
    items: RwLock<Vec<E>>,
}

impl<E: Syncable> OptimisticList<E> {
    pub fn new(
        repository: Arc<LocalFirstRepository<E>>,
        owner_id: impl Into<String>,
        filter: EntityFilter,
    ) -> Self {
        Self {
            repository,
            owner_id: owner_id.into(),
            filter,
            items: RwLock::new(Vec::new()),
        }
    }

    /// Snapshot of the visible list.
    pub async fn items(&self) -> Vec<E> {
        self.items.read().await.clone()
    }

    /// Re-project the list from an effective read.
    pub async fn refresh(&self) -> Result<Vec<E>> {
        let fresh = self
            .repository
            .find_all(&self.owner_id, &self.filter)
            .await?;
        *self.items.write().await = fresh.clone();
        Ok(fresh)
    }

    /// Insert a synthesized entry immediately, then swap it (by its
    /// temporary id) for the confirmed entity once the repository create
    /// resolves. On failure the entry is removed and the error surfaced.
    pub async fn create(&self, draft: E::Draft) -> Result<E> {
        let temp_id = format!("{}{}", TEMP_ID_PREFIX, Uuid::new_v4());
        let placeholder = E::from_draft(temp_id.clone(), &self.owner_id, draft.clone(), Utc::now());
        self.items.write().await.push(placeholder);

        match self.repository.create(&self.owner_id, draft).await {
            Ok(confirmed) => {
                let mut items = self.items.write().await;
                match items.iter().position(|item| item.id() == temp_id) {
                    Some(index) => items[index] = confirmed.clone(),
                    None => items.push(confirmed.clone()),
                }
                Ok(confirmed)
            }
            Err(err) => {
                self.items
                    .write()
                    .await
                    .retain(|item| item.id() != temp_id);
                Err(err)
            }
        }
    }

    /// Apply a patch to the visible entry immediately; restore the saved
    /// entry if the repository write fails.
    pub async fn update(&self, id: &str, patch: E::Patch) -> Result<E> {
        let prior = {
            let mut items = self.items.write().await;
            match items.iter().position(|item| item.id() == id) {
                Some(index) => {
                    let prior = items[index].clone();
                    items[index].apply_patch(&patch);
                    Some((index, prior))
                }
                None => None,
            }
        };

        match self.repository.update(id, patch).await {
            Ok(confirmed) => {
                let mut items = self.items.write().await;
                if let Some(index) = items.iter().position(|item| item.id() == id) {
                    items[index] = confirmed.clone();
                }
                Ok(confirmed)
            }
            Err(err) => {
                match prior {
                    Some((index, prior)) => {
                        let mut items = self.items.write().await;
                        if let Some(entry) = items.iter_mut().find(|item| item.id() == id) {
                            *entry = prior;
                        } else {
                            let at = index.min(items.len());
                            items.insert(at, prior);
                        }
                    }
                    None => {
                        debug!("Update of {} failed with no visible entry to restore", id)
                    }
                }
                Err(err)
            }
        }
    }

    /// Remove the visible entry immediately; reinsert it at its old
    /// position if the repository delete fails.
    pub async fn delete(&self, id: &str) -> Result<()> {
        let removed = {
            let mut items = self.items.write().await;
            match items.iter().position(|item| item.id() == id) {
                Some(index) => Some((index, items.remove(index))),
                None => None,
            }
        };

        match self.repository.delete(id).await {
            Ok(()) => Ok(()),
            Err(err) => {
                if let Some((index, entry)) = removed {
                    let mut items = self.items.write().await;
                    let len = items.len();
                    items.insert(index.min(len), entry);
                }
                Err(err)
            }
        }
    }
}
