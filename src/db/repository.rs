// Record store - the authoritative persistence for users, posts and events
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::Arc;
use thiserror::Error;

use crate::db::models::{EdgeSet, Entities, Event, EventKind, Post, ProfileUpdate, User};
use crate::state::DbPool;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("SQL error: {0}")]
    Sql(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Duplicate: {0}")]
    Duplicate(String),
}

/// Store trait - every operation the core needs from persistence.
///
/// Set operations are idempotent (`$addToSet` / `$pull` semantics) and report
/// `NotFound` when the owning record does not exist.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn insert_user(&self, user: &User) -> Result<(), StoreError>;

    async fn user_by_id(&self, id: &str) -> Result<User, StoreError>;

    async fn user_by_handle(&self, handle: &str) -> Result<User, StoreError>;

    /// Ids of users whose `set` contains `member`.
    async fn users_with_member(&self, set: EdgeSet, member: &str)
        -> Result<Vec<String>, StoreError>;

    /// Ids of up to `limit` users whose handle or display name starts with
    /// `prefix`, case-insensitively, ordered by handle.
    async fn search_users(&self, prefix: &str, limit: usize) -> Result<Vec<String>, StoreError>;

    async fn update_profile(&self, id: &str, update: &ProfileUpdate) -> Result<(), StoreError>;

    async fn add_to_set(&self, id: &str, set: EdgeSet, member: &str) -> Result<(), StoreError>;

    async fn remove_from_set(&self, id: &str, set: EdgeSet, member: &str)
        -> Result<(), StoreError>;

    async fn append_post(&self, user_id: &str, post_id: &str) -> Result<(), StoreError>;

    /// Delete a user, their posts, their likes and their edges in other users' sets.
    async fn delete_user(&self, id: &str) -> Result<(), StoreError>;

    async fn insert_post(&self, post: &Post) -> Result<(), StoreError>;

    async fn post_by_id(&self, id: &str) -> Result<Post, StoreError>;

    /// Newest first.
    async fn recent_post_ids(&self, limit: usize) -> Result<Vec<String>, StoreError>;

    async fn add_like(&self, post_id: &str, user_id: &str) -> Result<(), StoreError>;

    async fn remove_like(&self, post_id: &str, user_id: &str) -> Result<(), StoreError>;

    async fn posts_liked_by(&self, user_id: &str) -> Result<Vec<String>, StoreError>;

    async fn insert_event(&self, event: &Event) -> Result<(), StoreError>;

    /// Newest first.
    async fn events_for(&self, user_id: &str, limit: usize) -> Result<Vec<Event>, StoreError>;
}

pub type DynRecordStore = Arc<dyn RecordStore>;

/// SQLite implementation
pub struct SqliteRecordStore {
    pool: DbPool,
}

impl SqliteRecordStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn map_write_err(err: rusqlite::Error, what: &str) -> StoreError {
    if let rusqlite::Error::SqliteFailure(ref failure, _) = err {
        match failure.extended_code {
            rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE | rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY => {
                return StoreError::Duplicate(what.to_string())
            }
            rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY => {
                return StoreError::NotFound(what.to_string())
            }
            _ => {}
        }
    }
    err.into()
}

/// Bump `updated_at`, failing with `NotFound` when the user is missing.
fn touch_user(conn: &Connection, id: &str) -> Result<(), StoreError> {
    let rows = conn.execute(
        "UPDATE users SET updated_at = ?2 WHERE id = ?1",
        params![id, Utc::now()],
    )?;
    if rows == 0 {
        return Err(StoreError::NotFound(format!("user {}", id)));
    }
    Ok(())
}

/// A negative LIMIT means no limit to SQLite.
fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

/// Match `%`, `_` and `\` literally inside a LIKE pattern.
fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn post_exists(conn: &Connection, id: &str) -> Result<(), StoreError> {
    let exists: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM posts WHERE id = ?1",
        params![id],
        |row| row.get(0),
    )?;
    if !exists {
        return Err(StoreError::NotFound(format!("post {}", id)));
    }
    Ok(())
}

fn string_column(conn: &Connection, sql: &str, key: &str) -> Result<Vec<String>, StoreError> {
    let mut stmt = conn.prepare(sql)?;
    let values = stmt
        .query_map(params![key], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(values)
}

fn edge_set(conn: &Connection, id: &str, set: EdgeSet) -> Result<Vec<String>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT member_id FROM user_edges WHERE user_id = ?1 AND kind = ?2 ORDER BY seq",
    )?;
    let members = stmt
        .query_map(params![id, set.as_str()], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(members)
}

fn load_user(conn: &Connection, column: &str, key: &str) -> Result<User, StoreError> {
    let sql = format!(
        "SELECT id, handle, email, display_name, password_hash, bio, location, avatar_url,
                website_url, suspended, official, is_admin, created_at, updated_at
         FROM users WHERE {} = ?1",
        column
    );
    let user = conn
        .query_row(&sql, params![key], |row| {
            Ok(User {
                id: row.get(0)?,
                handle: row.get(1)?,
                email: row.get(2)?,
                display_name: row.get(3)?,
                password_hash: row.get(4)?,
                bio: row.get(5)?,
                location: row.get(6)?,
                avatar_url: row.get(7)?,
                website_url: row.get(8)?,
                suspended: row.get(9)?,
                official: row.get(10)?,
                is_admin: row.get(11)?,
                following: Vec::new(),
                followers: Vec::new(),
                posts: Vec::new(),
                created_at: row.get(12)?,
                updated_at: row.get(13)?,
            })
        })
        .optional()?;

    let mut user = user.ok_or_else(|| StoreError::NotFound(format!("user {}", key)))?;
    user.following = edge_set(conn, &user.id, EdgeSet::Following)?;
    user.followers = edge_set(conn, &user.id, EdgeSet::Followers)?;
    user.posts = string_column(
        conn,
        "SELECT post_id FROM user_posts WHERE user_id = ?1 ORDER BY seq",
        &user.id,
    )?;
    Ok(user)
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        let conn = self.pool.get()?;

        conn.execute(
            "INSERT INTO users (id, handle, email, display_name, password_hash, bio, location,
                                avatar_url, website_url, suspended, official, is_admin,
                                created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                user.id,
                user.handle,
                user.email,
                user.display_name,
                user.password_hash,
                user.bio,
                user.location,
                user.avatar_url,
                user.website_url,
                user.suspended,
                user.official,
                user.is_admin,
                user.created_at,
                user.updated_at,
            ],
        )
        .map_err(|e| map_write_err(e, &format!("user {}", user.handle)))?;

        Ok(())
    }

    async fn user_by_id(&self, id: &str) -> Result<User, StoreError> {
        let conn = self.pool.get()?;
        load_user(&conn, "id", id)
    }

    async fn user_by_handle(&self, handle: &str) -> Result<User, StoreError> {
        let conn = self.pool.get()?;
        load_user(&conn, "handle", handle)
    }

    async fn users_with_member(
        &self,
        set: EdgeSet,
        member: &str,
    ) -> Result<Vec<String>, StoreError> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT user_id FROM user_edges WHERE kind = ?1 AND member_id = ?2 ORDER BY seq",
        )?;
        let ids = stmt
            .query_map(params![set.as_str(), member], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(ids)
    }

    async fn search_users(&self, prefix: &str, limit: usize) -> Result<Vec<String>, StoreError> {
        let conn = self.pool.get()?;
        let pattern = format!("{}%", escape_like(prefix));
        let mut stmt = conn.prepare(
            "SELECT id FROM users
             WHERE handle LIKE ?1 ESCAPE '\\' OR display_name LIKE ?1 ESCAPE '\\'
             ORDER BY handle LIMIT ?2",
        )?;
        let ids = stmt
            .query_map(params![pattern, sql_limit(limit)], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(ids)
    }

    async fn update_profile(&self, id: &str, update: &ProfileUpdate) -> Result<(), StoreError> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;

        touch_user(&tx, id)?;
        let fields = [
            ("display_name", &update.display_name),
            ("bio", &update.bio),
            ("location", &update.location),
            ("website_url", &update.website_url),
            ("avatar_url", &update.avatar_url),
        ];
        for (column, value) in fields {
            if let Some(value) = value {
                // Column names come from the fixed list above, never from input
                tx.execute(
                    &format!("UPDATE users SET {} = ?2 WHERE id = ?1", column),
                    params![id, value],
                )?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    async fn add_to_set(&self, id: &str, set: EdgeSet, member: &str) -> Result<(), StoreError> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;

        touch_user(&tx, id)?;
        tx.execute(
            "INSERT OR IGNORE INTO user_edges (user_id, kind, member_id) VALUES (?1, ?2, ?3)",
            params![id, set.as_str(), member],
        )?;

        tx.commit()?;
        Ok(())
    }

    async fn remove_from_set(
        &self,
        id: &str,
        set: EdgeSet,
        member: &str,
    ) -> Result<(), StoreError> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;

        touch_user(&tx, id)?;
        tx.execute(
            "DELETE FROM user_edges WHERE user_id = ?1 AND kind = ?2 AND member_id = ?3",
            params![id, set.as_str(), member],
        )?;

        tx.commit()?;
        Ok(())
    }

    async fn append_post(&self, user_id: &str, post_id: &str) -> Result<(), StoreError> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;

        touch_user(&tx, user_id)?;
        tx.execute(
            "INSERT INTO user_posts (user_id, post_id) VALUES (?1, ?2)",
            params![user_id, post_id],
        )?;

        tx.commit()?;
        Ok(())
    }

    async fn delete_user(&self, id: &str) -> Result<(), StoreError> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;

        // Soft references held by other records
        tx.execute("DELETE FROM user_edges WHERE member_id = ?1", params![id])?;
        tx.execute("DELETE FROM post_likes WHERE user_id = ?1", params![id])?;
        tx.execute(
            "DELETE FROM events WHERE from_user_id = ?1 OR to_user_id = ?1",
            params![id],
        )?;

        // Own edges, posts and post list go with the row (ON DELETE CASCADE)
        let rows = tx.execute("DELETE FROM users WHERE id = ?1", params![id])?;
        if rows == 0 {
            return Err(StoreError::NotFound(format!("user {}", id)));
        }

        tx.commit()?;
        Ok(())
    }

    async fn insert_post(&self, post: &Post) -> Result<(), StoreError> {
        let conn = self.pool.get()?;

        conn.execute(
            "INSERT INTO posts (id, author_id, text, in_reply_to_status_id, in_reply_to_user_id,
                                urls, hashtags, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                post.id,
                post.author_id,
                post.text,
                post.in_reply_to_status_id,
                post.in_reply_to_user_id,
                serde_json::to_string(&post.entities.urls)?,
                serde_json::to_string(&post.entities.hashtags)?,
                post.created_at,
            ],
        )
        .map_err(|e| map_write_err(e, &format!("post {}", post.id)))?;

        Ok(())
    }

    async fn post_by_id(&self, id: &str) -> Result<Post, StoreError> {
        let conn = self.pool.get()?;

        let row = conn
            .query_row(
                "SELECT id, author_id, text, in_reply_to_status_id, in_reply_to_user_id,
                        urls, hashtags, created_at
                 FROM posts WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, Option<String>>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, String>(6)?,
                        row.get::<_, DateTime<Utc>>(7)?,
                    ))
                },
            )
            .optional()?;

        let (id, author_id, text, reply_status, reply_user, urls, hashtags, created_at) =
            row.ok_or_else(|| StoreError::NotFound(format!("post {}", id)))?;

        let liked_by = string_column(
            &conn,
            "SELECT user_id FROM post_likes WHERE post_id = ?1 ORDER BY seq",
            &id,
        )?;

        Ok(Post {
            id,
            author_id,
            text,
            in_reply_to_status_id: reply_status,
            in_reply_to_user_id: reply_user,
            liked_by,
            entities: Entities {
                urls: serde_json::from_str(&urls)?,
                hashtags: serde_json::from_str(&hashtags)?,
            },
            created_at,
        })
    }

    async fn recent_post_ids(&self, limit: usize) -> Result<Vec<String>, StoreError> {
        let conn = self.pool.get()?;
        let mut stmt =
            conn.prepare("SELECT id FROM posts ORDER BY created_at DESC, id DESC LIMIT ?1")?;
        let ids = stmt
            .query_map(params![sql_limit(limit)], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(ids)
    }

    async fn add_like(&self, post_id: &str, user_id: &str) -> Result<(), StoreError> {
        let conn = self.pool.get()?;
        post_exists(&conn, post_id)?;
        conn.execute(
            "INSERT OR IGNORE INTO post_likes (post_id, user_id) VALUES (?1, ?2)",
            params![post_id, user_id],
        )?;
        Ok(())
    }

    async fn remove_like(&self, post_id: &str, user_id: &str) -> Result<(), StoreError> {
        let conn = self.pool.get()?;
        post_exists(&conn, post_id)?;
        conn.execute(
            "DELETE FROM post_likes WHERE post_id = ?1 AND user_id = ?2",
            params![post_id, user_id],
        )?;
        Ok(())
    }

    async fn posts_liked_by(&self, user_id: &str) -> Result<Vec<String>, StoreError> {
        let conn = self.pool.get()?;
        string_column(
            &conn,
            "SELECT post_id FROM post_likes WHERE user_id = ?1 ORDER BY seq",
            user_id,
        )
    }

    async fn insert_event(&self, event: &Event) -> Result<(), StoreError> {
        let conn = self.pool.get()?;

        conn.execute(
            "INSERT INTO events (id, kind, from_user_id, to_user_id, post_id, already_read, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                event.id,
                event.kind.as_str(),
                event.from_user_id,
                event.to_user_id,
                event.post_id,
                event.already_read,
                event.created_at,
            ],
        )
        .map_err(|e| map_write_err(e, &format!("event {}", event.id)))?;

        Ok(())
    }

    async fn events_for(&self, user_id: &str, limit: usize) -> Result<Vec<Event>, StoreError> {
        let conn = self.pool.get()?;

        let mut stmt = conn.prepare(
            "SELECT id, kind, from_user_id, to_user_id, post_id, already_read, created_at
             FROM events WHERE to_user_id = ?1
             ORDER BY created_at DESC, id DESC LIMIT ?2",
        )?;

        let rows = stmt
            .query_map(params![user_id, sql_limit(limit)], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, bool>(5)?,
                    row.get::<_, DateTime<Utc>>(6)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let events = rows
            .into_iter()
            .filter_map(
                |(id, kind, from_user_id, to_user_id, post_id, already_read, created_at)| {
                    let Some(kind) = EventKind::parse(&kind) else {
                        tracing::warn!("Skipping event {} with unknown kind {}", id, kind);
                        return None;
                    };
                    Some(Event {
                        id,
                        kind,
                        from_user_id,
                        to_user_id,
                        post_id,
                        already_read,
                        created_at,
                    })
                },
            )
            .collect();

        Ok(events)
    }
}
