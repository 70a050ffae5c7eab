// Read-through / write-through access to users and posts
//
// Every lookup consults the object cache first and every mutation re-reads the
// canonical record from the store and overwrites all of its cache keys before
// reporting success.
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::cache::{self, CacheError, DynObjectCache};
use crate::db::models::{EdgeSet, Event, EventKind, Post, ProfileUpdate, User};
use crate::db::repository::{DynRecordStore, StoreError};
use crate::error::{AppError, AppResult};

#[derive(Clone)]
pub struct Records {
    store: DynRecordStore,
    cache: DynObjectCache,
}

impl Records {
    pub fn new(store: DynRecordStore, cache: DynObjectCache) -> Self {
        Self { store, cache }
    }

    pub fn store(&self) -> &DynRecordStore {
        &self.store
    }

    async fn cached<T: DeserializeOwned>(&self, key: &str) -> AppResult<Option<T>> {
        let bytes = self.cache.get(key).await.map_err(|e| {
            tracing::error!(key = %key, "Cache read failed: {}", e);
            e
        })?;

        match bytes {
            Some(bytes) => {
                let value = serde_json::from_slice(&bytes).map_err(|e| {
                    tracing::error!(key = %key, "Cached snapshot is undecodable: {}", e);
                    CacheError::from(e)
                })?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    async fn put_all<T: Serialize>(&self, keys: &[String], value: &T) -> Result<(), CacheError> {
        let bytes = serde_json::to_vec(value)?;
        for key in keys {
            self.cache.put(key, bytes.clone()).await.map_err(|e| {
                tracing::error!(key = %key, "Cache write failed: {}", e);
                e
            })?;
        }
        Ok(())
    }

    fn user_keys(user: &User) -> [String; 2] {
        [cache::user_id_key(&user.id), cache::user_handle_key(&user.handle)]
    }

    // --- Read path ---

    pub async fn find_user(&self, id: &str) -> AppResult<User> {
        if let Some(user) = self.cached(&cache::user_id_key(id)).await? {
            return Ok(user);
        }
        let user = self.store.user_by_id(id).await?;
        self.put_all(&Self::user_keys(&user), &user).await?;
        Ok(user)
    }

    pub async fn find_user_by_handle(&self, handle: &str) -> AppResult<User> {
        if let Some(user) = self.cached(&cache::user_handle_key(handle)).await? {
            return Ok(user);
        }
        let user = self.store.user_by_handle(handle).await?;
        self.put_all(&Self::user_keys(&user), &user).await?;
        Ok(user)
    }

    pub async fn find_post(&self, id: &str) -> AppResult<Post> {
        let key = cache::post_key(id);
        if let Some(post) = self.cached(&key).await? {
            return Ok(post);
        }
        let post = self.store.post_by_id(id).await?;
        self.put_all(&[key], &post).await?;
        Ok(post)
    }

    /// One lookup per id, in order. Ids that no longer resolve are skipped.
    pub async fn find_users(&self, ids: &[String]) -> AppResult<Vec<User>> {
        let mut users = Vec::with_capacity(ids.len());
        for id in ids {
            match self.find_user(id).await {
                Ok(user) => users.push(user),
                Err(AppError::NotFound) => tracing::debug!("Skipping dangling user id {}", id),
                Err(e) => return Err(e),
            }
        }
        Ok(users)
    }

    pub async fn find_posts(&self, ids: &[String]) -> AppResult<Vec<Post>> {
        let mut posts = Vec::with_capacity(ids.len());
        for id in ids {
            match self.find_post(id).await {
                Ok(post) => posts.push(post),
                Err(AppError::NotFound) => tracing::debug!("Skipping dangling post id {}", id),
                Err(e) => return Err(e),
            }
        }
        Ok(posts)
    }

    /// Users whose handle or display name starts with `prefix`.
    pub async fn search_users(&self, prefix: &str, limit: usize) -> AppResult<Vec<User>> {
        let ids = self.store.search_users(prefix, limit).await?;
        self.find_users(&ids).await
    }

    pub async fn recent_posts(&self, limit: usize) -> AppResult<Vec<Post>> {
        let ids = self.store.recent_post_ids(limit).await?;
        self.find_posts(&ids).await
    }

    // --- Write path ---

    /// Re-read a user from the store and overwrite both of its cache keys.
    pub async fn refresh_user(&self, id: &str) -> AppResult<User> {
        let stale = |source: Box<dyn std::error::Error + Send + Sync>| AppError::StaleCache {
            key: cache::user_id_key(id),
            source,
        };

        let user = self.store.user_by_id(id).await.map_err(|e| stale(e.into()))?;
        self.put_all(&Self::user_keys(&user), &user)
            .await
            .map_err(|e| stale(e.into()))?;
        Ok(user)
    }

    pub async fn refresh_post(&self, id: &str) -> AppResult<Post> {
        let key = cache::post_key(id);
        let stale = |source: Box<dyn std::error::Error + Send + Sync>| AppError::StaleCache {
            key: key.clone(),
            source,
        };

        let post = self.store.post_by_id(id).await.map_err(|e| stale(e.into()))?;
        self.put_all(std::slice::from_ref(&key), &post)
            .await
            .map_err(|e| stale(e.into()))?;
        Ok(post)
    }

    pub async fn create_user(&self, user: &User) -> AppResult<User> {
        self.store.insert_user(user).await?;
        tracing::info!("Created user {} ({})", user.handle, user.id);
        self.refresh_user(&user.id).await
    }

    pub async fn update_profile(&self, id: &str, update: &ProfileUpdate) -> AppResult<User> {
        if update.is_empty() {
            return Err(AppError::ParamsRequired);
        }
        self.store.update_profile(id, update).await?;
        self.refresh_user(id).await
    }

    /// Append a post id to its author's post list.
    pub async fn append_post(&self, user_id: &str, post_id: &str) -> AppResult<User> {
        self.store.append_post(user_id, post_id).await?;
        self.refresh_user(user_id).await
    }

    pub async fn insert_post(&self, post: &Post) -> AppResult<Post> {
        self.store.insert_post(post).await?;
        self.refresh_post(&post.id).await
    }

    pub async fn like(&self, user_id: &str, post_id: &str) -> AppResult<Post> {
        self.store.add_like(post_id, user_id).await?;
        let post = self.refresh_post(post_id).await?;
        if post.author_id != user_id {
            self.record_event(&Event::new(
                EventKind::Like,
                user_id,
                &post.author_id,
                Some(post_id),
            ))
            .await;
        }
        Ok(post)
    }

    pub async fn unlike(&self, user_id: &str, post_id: &str) -> AppResult<Post> {
        self.store.remove_like(post_id, user_id).await?;
        let post = self.refresh_post(post_id).await?;
        if post.author_id != user_id {
            self.record_event(&Event::new(
                EventKind::Unlike,
                user_id,
                &post.author_id,
                Some(post_id),
            ))
            .await;
        }
        Ok(post)
    }

    /// Delete an account and every reference to it.
    ///
    /// The store removes the user, their posts, likes and edges in one
    /// transaction. Afterwards the user's and their posts' keys are removed and
    /// every neighbour and every post they liked is refreshed.
    pub async fn delete_user(&self, id: &str) -> AppResult<()> {
        let user = self.store.user_by_id(id).await?;
        let liked = self.store.posts_liked_by(id).await?;

        // Everyone holding this id in either edge set, mirrored or not
        let mut neighbours = self.store.users_with_member(EdgeSet::Following, id).await?;
        neighbours.extend(self.store.users_with_member(EdgeSet::Followers, id).await?);
        neighbours.sort();
        neighbours.dedup();

        self.store.delete_user(id).await?;
        tracing::info!("Deleted user {} ({})", user.handle, user.id);

        let mut stale: Option<AppError> = None;

        let mut removed: Vec<String> = Self::user_keys(&user).into();
        removed.extend(user.posts.iter().map(|post_id| cache::post_key(post_id)));
        for key in removed {
            if let Err(e) = self.cache.remove(&key).await {
                tracing::error!(key = %key, "Cache invalidation failed: {}", e);
                stale.get_or_insert(AppError::StaleCache {
                    key,
                    source: e.into(),
                });
            }
        }

        for neighbour in &neighbours {
            match self.refresh_user(neighbour).await {
                Ok(_) => {}
                Err(AppError::StaleCache {
                    source, ..
                }) if is_not_found(&*source) => {
                    tracing::debug!("Neighbour {} already gone", neighbour);
                }
                Err(e) => {
                    stale.get_or_insert(e);
                }
            }
        }

        for post_id in liked.iter().filter(|p| !user.posts.contains(p)) {
            match self.refresh_post(post_id).await {
                Ok(_) => {}
                Err(AppError::StaleCache {
                    source, ..
                }) if is_not_found(&*source) => {}
                Err(e) => {
                    stale.get_or_insert(e);
                }
            }
        }

        match stale {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    // --- Events ---

    /// Notifications are secondary to the action that caused them; a failed
    /// write is logged and the action still succeeds.
    pub async fn record_event(&self, event: &Event) {
        if let Err(e) = self.store.insert_event(event).await {
            tracing::warn!(
                kind = event.kind.as_str(),
                to = %event.to_user_id,
                "Failed to record event: {}",
                e
            );
        }
    }

    pub async fn events_for(&self, user_id: &str, limit: usize) -> AppResult<Vec<Event>> {
        Ok(self.store.events_for(user_id, limit).await?)
    }
}

fn is_not_found(err: &(dyn std::error::Error + Send + Sync + 'static)) -> bool {
    matches!(err.downcast_ref::<StoreError>(), Some(StoreError::NotFound(_)))
}
