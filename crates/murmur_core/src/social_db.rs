/*
 * SPDX-FileCopyrightText: 2026 Murmur Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use anyhow::{Context, Result};
use rand::{rngs::OsRng, RngCore};
use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Clone)]
pub struct SocialDb {
    path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub full_name: Option<String>,
    pub bio: Option<String>,
    pub location: Option<String>,
    pub website: Option<String>,
    pub profile_picture: Option<String>,
    pub cover_photo: Option<String>,
    pub is_private: bool,
    pub is_verified: bool,
    pub is_active: bool,
    pub is_admin: bool,
    pub created_at_ms: i64,
    pub last_seen_ms: i64,
}

impl UserRow {
    pub fn check_password(&self, candidate: &str) -> bool {
        verify_password(&self.password_hash, candidate)
    }

    pub fn avatar_url(&self) -> String {
        match &self.profile_picture {
            Some(name) if name != "default-avatar.png" => {
                format!("/static/uploads/profiles/{name}")
            }
            _ => "/static/images/default-avatar.png".to_string(),
        }
    }

    pub fn cover_url(&self) -> Option<String> {
        self.cover_photo
            .as_ref()
            .map(|name| format!("/static/uploads/profiles/{name}"))
    }
}

#[derive(Debug, Clone)]
pub struct PostRow {
    pub id: i64,
    pub user_id: i64,
    pub content: String,
    pub image_name: Option<String>,
    pub video_name: Option<String>,
    pub tags: Option<String>,
    pub location: Option<String>,
    pub likes_count: i64,
    pub comments_count: i64,
    pub shares_count: i64,
    pub views_count: i64,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

impl PostRow {
    /// Tags are persisted comma-joined; blank entries are dropped on read.
    pub fn tags_list(&self) -> Vec<String> {
        match &self.tags {
            Some(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect(),
            None => Vec::new(),
        }
    }

    pub fn image_url(&self) -> Option<String> {
        self.image_name
            .as_ref()
            .map(|name| format!("/static/uploads/posts/{name}"))
    }

    pub fn video_url(&self) -> Option<String> {
        self.video_name
            .as_ref()
            .map(|name| format!("/static/uploads/posts/{name}"))
    }
}

#[derive(Debug, Clone)]
pub struct CommentRow {
    pub id: i64,
    pub post_id: i64,
    pub user_id: i64,
    pub parent_id: Option<i64>,
    pub content: String,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

impl CommentRow {
    pub fn is_reply(&self) -> bool {
        self.parent_id.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct NotificationRow {
    pub id: i64,
    pub sender_id: i64,
    pub sender_username: String,
    pub recipient_id: i64,
    pub kind: String,
    pub message: String,
    pub post_id: Option<i64>,
    pub comment_id: Option<i64>,
    pub is_read: bool,
    pub created_at_ms: i64,
}

impl NotificationRow {
    pub fn url(&self) -> String {
        if let Some(post_id) = self.post_id {
            format!("/post/{post_id}")
        } else if self.kind == "follow" {
            format!("/user/{}", self.sender_username)
        } else {
            "/".to_string()
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct CollectionPage<T> {
    pub total: u64,
    pub items: Vec<T>,
    pub next: Option<String>,
}

impl<T> CollectionPage<T> {
    pub fn empty() -> Self {
        Self {
            total: 0,
            items: Vec::new(),
            next: None,
        }
    }
}

/// Fields applied by a profile edit. Text fields always overwrite; the
/// media references only replace the stored ones when a new upload landed.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub full_name: Option<String>,
    pub bio: Option<String>,
    pub location: Option<String>,
    pub website: Option<String>,
    pub is_private: bool,
    pub profile_picture: Option<String>,
    pub cover_photo: Option<String>,
}

const USER_COLS: &str = "id, username, email, password_hash, full_name, bio, location, website, \
     profile_picture, cover_photo, is_private, is_verified, is_active, is_admin, \
     created_at_ms, last_seen_ms";

const POST_COLS: &str = "id, user_id, content, image_name, video_name, tags, location, \
     likes_count, comments_count, shares_count, views_count, created_at_ms, updated_at_ms";

const COMMENT_COLS: &str = "id, post_id, user_id, parent_id, content, created_at_ms, updated_at_ms";

impl SocialDb {
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let path = db_path.as_ref().to_path_buf();
        let conn = Connection::open(&path).with_context(|| format!("open db: {}", path.display()))?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            CREATE TABLE IF NOT EXISTS users (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              username TEXT NOT NULL UNIQUE,
              email TEXT NOT NULL UNIQUE,
              password_hash TEXT NOT NULL,
              full_name TEXT NULL,
              bio TEXT NULL,
              location TEXT NULL,
              website TEXT NULL,
              profile_picture TEXT NULL,
              is_private INTEGER NOT NULL DEFAULT 0,
              is_verified INTEGER NOT NULL DEFAULT 0,
              is_active INTEGER NOT NULL DEFAULT 1,
              created_at_ms INTEGER NOT NULL,
              last_seen_ms INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS follows (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              follower_id INTEGER NOT NULL,
              followed_id INTEGER NOT NULL,
              created_at_ms INTEGER NOT NULL,
              UNIQUE(follower_id, followed_id)
            );
            CREATE INDEX IF NOT EXISTS idx_follows_followed ON follows(followed_id);

            CREATE TABLE IF NOT EXISTS posts (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              user_id INTEGER NOT NULL,
              content TEXT NOT NULL,
              image_name TEXT NULL,
              video_name TEXT NULL,
              tags TEXT NULL,
              location TEXT NULL,
              likes_count INTEGER NOT NULL DEFAULT 0,
              comments_count INTEGER NOT NULL DEFAULT 0,
              views_count INTEGER NOT NULL DEFAULT 0,
              created_at_ms INTEGER NOT NULL,
              updated_at_ms INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_posts_created ON posts(created_at_ms DESC);
            CREATE INDEX IF NOT EXISTS idx_posts_user_created ON posts(user_id, created_at_ms DESC);

            CREATE TABLE IF NOT EXISTS likes (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              user_id INTEGER NOT NULL,
              post_id INTEGER NOT NULL,
              created_at_ms INTEGER NOT NULL,
              UNIQUE(user_id, post_id)
            );
            CREATE INDEX IF NOT EXISTS idx_likes_post ON likes(post_id);

            CREATE TABLE IF NOT EXISTS comments (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              post_id INTEGER NOT NULL,
              user_id INTEGER NOT NULL,
              parent_id INTEGER NULL,
              content TEXT NOT NULL,
              created_at_ms INTEGER NOT NULL,
              updated_at_ms INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_comments_post_created ON comments(post_id, created_at_ms DESC);
            CREATE INDEX IF NOT EXISTS idx_comments_parent ON comments(parent_id);

            CREATE TABLE IF NOT EXISTS notifications (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              sender_id INTEGER NOT NULL,
              recipient_id INTEGER NOT NULL,
              kind TEXT NOT NULL,
              message TEXT NOT NULL,
              post_id INTEGER NULL,
              comment_id INTEGER NULL,
              is_read INTEGER NOT NULL DEFAULT 0,
              created_at_ms INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_notifications_recipient_created
              ON notifications(recipient_id, created_at_ms DESC);
            "#,
        )?;
        ensure_columns(&conn, "users", &[
            ("cover_photo", "TEXT NULL"),
            ("is_admin", "INTEGER NOT NULL DEFAULT 0"),
        ])?;
        ensure_columns(&conn, "posts", &[
            ("shares_count", "INTEGER NOT NULL DEFAULT 0"),
        ])?;
        Ok(Self { path })
    }

    pub fn health_check(&self) -> Result<()> {
        let conn = Connection::open(&self.path)?;
        conn.query_row("SELECT 1", [], |_| Ok(()))?;
        Ok(())
    }

    // ---- users ----

    pub fn create_user(&self, username: &str, email: &str, password: &str) -> Result<i64> {
        let username = username.trim();
        let email = email.trim();
        if username.is_empty() || email.is_empty() {
            anyhow::bail!("username and email are required");
        }
        let conn = Connection::open(&self.path)?;
        let now = now_ms();
        conn.execute(
            r#"
            INSERT INTO users(username, email, password_hash, profile_picture, created_at_ms, last_seen_ms)
            VALUES (?1, ?2, ?3, 'default-avatar.png', ?4, ?4)
            "#,
            params![username, email, hash_password(password), now],
        )
        .with_context(|| format!("create user {username}"))?;
        Ok(conn.last_insert_rowid())
    }

    pub fn get_user(&self, user_id: i64) -> Result<Option<UserRow>> {
        let conn = Connection::open(&self.path)?;
        conn.query_row(
            &format!("SELECT {USER_COLS} FROM users WHERE id=?1"),
            params![user_id],
            user_from_row,
        )
        .optional()
        .map_err(Into::into)
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        let conn = Connection::open(&self.path)?;
        conn.query_row(
            &format!("SELECT {USER_COLS} FROM users WHERE username=?1"),
            params![username],
            user_from_row,
        )
        .optional()
        .map_err(Into::into)
    }

    pub fn set_password(&self, user_id: i64, password: &str) -> Result<()> {
        let conn = Connection::open(&self.path)?;
        conn.execute(
            "UPDATE users SET password_hash=?2 WHERE id=?1",
            params![user_id, hash_password(password)],
        )?;
        Ok(())
    }

    pub fn update_profile(&self, user_id: i64, update: &ProfileUpdate) -> Result<()> {
        let conn = Connection::open(&self.path)?;
        conn.execute(
            r#"
            UPDATE users SET
              full_name=?2,
              bio=?3,
              location=?4,
              website=?5,
              is_private=?6,
              profile_picture=COALESCE(?7, profile_picture),
              cover_photo=COALESCE(?8, cover_photo)
            WHERE id=?1
            "#,
            params![
                user_id,
                update.full_name,
                update.bio,
                update.location,
                update.website,
                if update.is_private { 1 } else { 0 },
                update.profile_picture,
                update.cover_photo,
            ],
        )?;
        Ok(())
    }

    pub fn touch_last_seen(&self, user_id: i64) -> Result<()> {
        let conn = Connection::open(&self.path)?;
        conn.execute(
            "UPDATE users SET last_seen_ms=?2 WHERE id=?1",
            params![user_id, now_ms()],
        )?;
        Ok(())
    }

    pub fn posts_count(&self, user_id: i64) -> Result<u64> {
        let conn = Connection::open(&self.path)?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM posts WHERE user_id=?1",
            params![user_id],
            |r| r.get(0),
        )?;
        Ok(count as u64)
    }

    /// Case-insensitive substring search over username and display name.
    pub fn search_users(&self, q: &str, limit: u32) -> Result<Vec<UserRow>> {
        let q = q.trim().to_lowercase();
        if q.is_empty() {
            return Ok(Vec::new());
        }
        let conn = Connection::open(&self.path)?;
        let q_like = format!("%{}%", escape_like(&q));
        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT {USER_COLS} FROM users
            WHERE (lower(username) LIKE ?1 ESCAPE '\' OR lower(COALESCE(full_name, '')) LIKE ?1 ESCAPE '\')
            ORDER BY username ASC
            LIMIT ?2
            "#
        ))?;
        let rows = stmt
            .query_map(params![q_like, limit.max(1).min(200)], user_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Active accounts the viewer does not follow yet, excluding the viewer.
    pub fn suggested_users(&self, viewer_id: i64, limit: u32) -> Result<Vec<UserRow>> {
        let conn = Connection::open(&self.path)?;
        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT {USER_COLS} FROM users
            WHERE id != ?1
              AND is_active=1
              AND id NOT IN (SELECT followed_id FROM follows WHERE follower_id=?1)
            ORDER BY created_at_ms DESC
            LIMIT ?2
            "#
        ))?;
        let rows = stmt
            .query_map(params![viewer_id, limit.max(1).min(50)], user_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// A private account's posts are visible to itself and its followers.
    /// Everyone can see a public account.
    pub fn can_view_profile(&self, viewer_id: Option<i64>, owner: &UserRow) -> Result<bool> {
        if !owner.is_private {
            return Ok(true);
        }
        match viewer_id {
            None => Ok(false),
            Some(v) if v == owner.id => Ok(true),
            Some(v) => self.is_following(v, owner.id),
        }
    }

    /// Deleting an account takes everything it owns with it: posts (with
    /// their comments and likes), engagement left on other posts (with a
    /// counter recount), follow edges and notifications in both directions.
    pub fn delete_user(&self, user_id: i64) -> Result<bool> {
        let mut conn = Connection::open(&self.path)?;
        let tx = conn.transaction()?;

        let own_posts = collect_ids(&tx, "SELECT id FROM posts WHERE user_id=?1", user_id)?;
        for post_id in &own_posts {
            delete_post_children(&tx, *post_id)?;
        }
        tx.execute("DELETE FROM posts WHERE user_id=?1", params![user_id])?;

        let liked_posts = collect_ids(&tx, "SELECT DISTINCT post_id FROM likes WHERE user_id=?1", user_id)?;
        tx.execute("DELETE FROM likes WHERE user_id=?1", params![user_id])?;

        let commented_posts =
            collect_ids(&tx, "SELECT DISTINCT post_id FROM comments WHERE user_id=?1", user_id)?;
        // Replies from other users lose their parent, not their post.
        tx.execute(
            "UPDATE comments SET parent_id=NULL WHERE parent_id IN (SELECT id FROM comments WHERE user_id=?1)",
            params![user_id],
        )?;
        tx.execute(
            "UPDATE notifications SET comment_id=NULL WHERE comment_id IN (SELECT id FROM comments WHERE user_id=?1)",
            params![user_id],
        )?;
        tx.execute("DELETE FROM comments WHERE user_id=?1", params![user_id])?;

        for post_id in liked_posts.iter().chain(commented_posts.iter()) {
            recount_post_counters(&tx, *post_id)?;
        }

        tx.execute(
            "DELETE FROM follows WHERE follower_id=?1 OR followed_id=?1",
            params![user_id],
        )?;
        tx.execute(
            "DELETE FROM notifications WHERE sender_id=?1 OR recipient_id=?1",
            params![user_id],
        )?;
        let deleted = tx.execute("DELETE FROM users WHERE id=?1", params![user_id])?;
        tx.commit()?;
        Ok(deleted > 0)
    }

    // ---- social graph ----

    /// Inserts the follow edge, or does nothing when following yourself or
    /// when the edge already exists. `INSERT OR IGNORE` lets the storage
    /// uniqueness constraint absorb a concurrent double-submission.
    pub fn follow(&self, follower_id: i64, followed_id: i64) -> Result<Option<i64>> {
        if follower_id == followed_id {
            return Ok(None);
        }
        let conn = Connection::open(&self.path)?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO follows(follower_id, followed_id, created_at_ms) VALUES (?1, ?2, ?3)",
            params![follower_id, followed_id, now_ms()],
        )?;
        if inserted == 0 {
            return Ok(None);
        }
        Ok(Some(conn.last_insert_rowid()))
    }

    pub fn unfollow(&self, follower_id: i64, followed_id: i64) -> Result<bool> {
        let conn = Connection::open(&self.path)?;
        let deleted = conn.execute(
            "DELETE FROM follows WHERE follower_id=?1 AND followed_id=?2",
            params![follower_id, followed_id],
        )?;
        Ok(deleted > 0)
    }

    pub fn is_following(&self, follower_id: i64, followed_id: i64) -> Result<bool> {
        let conn = Connection::open(&self.path)?;
        let row: Option<i64> = conn
            .query_row(
                "SELECT id FROM follows WHERE follower_id=?1 AND followed_id=?2",
                params![follower_id, followed_id],
                |r| r.get(0),
            )
            .optional()?;
        Ok(row.is_some())
    }

    pub fn followers_count(&self, user_id: i64) -> Result<u64> {
        let conn = Connection::open(&self.path)?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM follows WHERE followed_id=?1",
            params![user_id],
            |r| r.get(0),
        )?;
        Ok(count as u64)
    }

    pub fn following_count(&self, user_id: i64) -> Result<u64> {
        let conn = Connection::open(&self.path)?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM follows WHERE follower_id=?1",
            params![user_id],
            |r| r.get(0),
        )?;
        Ok(count as u64)
    }

    pub fn list_followers(&self, user_id: i64, limit: u32, cursor_ms: Option<i64>) -> Result<CollectionPage<UserRow>> {
        self.list_follow_edge_users(user_id, "followed_id", "follower_id", limit, cursor_ms)
    }

    pub fn list_following(&self, user_id: i64, limit: u32, cursor_ms: Option<i64>) -> Result<CollectionPage<UserRow>> {
        self.list_follow_edge_users(user_id, "follower_id", "followed_id", limit, cursor_ms)
    }

    fn list_follow_edge_users(
        &self,
        user_id: i64,
        where_col: &str,
        join_col: &str,
        limit: u32,
        cursor_ms: Option<i64>,
    ) -> Result<CollectionPage<UserRow>> {
        let conn = Connection::open(&self.path)?;
        let limit = limit.max(1).min(200) as i64;
        let before = cursor_ms.unwrap_or(i64::MAX);
        let total: u64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM follows WHERE {where_col}=?1"),
            params![user_id],
            |r| r.get::<_, i64>(0).map(|v| v as u64),
        )?;
        let user_cols = qualify_cols(USER_COLS, "u");
        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT {user_cols}, f.created_at_ms AS edge_ms
            FROM users u JOIN follows f ON f.{join_col} = u.id
            WHERE f.{where_col}=?1 AND f.created_at_ms < ?2
            ORDER BY f.created_at_ms DESC
            LIMIT ?3
            "#
        ))?;
        let mut rows = stmt.query(params![user_id, before, limit])?;
        let mut items = Vec::new();
        let mut last_edge_ms = None;
        while let Some(row) = rows.next()? {
            let user = user_from_row(row)?;
            last_edge_ms = Some(row.get::<_, i64>(16)?);
            items.push(user);
        }
        let next = if items.len() as i64 == limit {
            last_edge_ms.map(|v: i64| v.to_string())
        } else {
            None
        };
        Ok(CollectionPage { total, items, next })
    }

    // ---- content store ----

    pub fn create_post(
        &self,
        user_id: i64,
        content: &str,
        tags: &[String],
        location: Option<&str>,
        image_name: Option<&str>,
        video_name: Option<&str>,
    ) -> Result<i64> {
        let conn = Connection::open(&self.path)?;
        let now = now_ms();
        conn.execute(
            r#"
            INSERT INTO posts(user_id, content, image_name, video_name, tags, location, created_at_ms, updated_at_ms)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
            "#,
            params![user_id, content, image_name, video_name, join_tags(tags), location, now],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn get_post(&self, post_id: i64) -> Result<Option<PostRow>> {
        let conn = Connection::open(&self.path)?;
        conn.query_row(
            &format!("SELECT {POST_COLS} FROM posts WHERE id=?1"),
            params![post_id],
            post_from_row,
        )
        .optional()
        .map_err(Into::into)
    }

    /// Deletes the post and its children. Comments and likes go with the
    /// post; notifications only lose their reference. The inbox is history
    /// and is marked read at most, never pruned.
    pub fn delete_post(&self, post_id: i64) -> Result<bool> {
        let mut conn = Connection::open(&self.path)?;
        let tx = conn.transaction()?;
        delete_post_children(&tx, post_id)?;
        let deleted = tx.execute("DELETE FROM posts WHERE id=?1", params![post_id])?;
        tx.commit()?;
        Ok(deleted > 0)
    }

    /// Atomic at the storage layer: concurrent viewers must not lose bumps
    /// to a read-modify-write race.
    pub fn increment_views(&self, post_id: i64) -> Result<()> {
        let conn = Connection::open(&self.path)?;
        conn.execute(
            "UPDATE posts SET views_count = views_count + 1 WHERE id=?1",
            params![post_id],
        )?;
        Ok(())
    }

    pub fn update_likes_count(&self, post_id: i64) -> Result<i64> {
        let conn = Connection::open(&self.path)?;
        conn.execute(
            "UPDATE posts SET likes_count = (SELECT COUNT(*) FROM likes WHERE post_id=?1) WHERE id=?1",
            params![post_id],
        )?;
        let count: i64 = conn.query_row(
            "SELECT likes_count FROM posts WHERE id=?1",
            params![post_id],
            |r| r.get(0),
        )?;
        Ok(count)
    }

    pub fn update_comments_count(&self, post_id: i64) -> Result<i64> {
        let conn = Connection::open(&self.path)?;
        conn.execute(
            "UPDATE posts SET comments_count = (SELECT COUNT(*) FROM comments WHERE post_id=?1) WHERE id=?1",
            params![post_id],
        )?;
        let count: i64 = conn.query_row(
            "SELECT comments_count FROM posts WHERE id=?1",
            params![post_id],
            |r| r.get(0),
        )?;
        Ok(count)
    }

    pub fn list_user_posts(&self, user_id: i64, limit: u32, cursor_ms: Option<i64>) -> Result<CollectionPage<PostRow>> {
        let conn = Connection::open(&self.path)?;
        let limit = limit.max(1).min(200) as i64;
        let before = cursor_ms.unwrap_or(i64::MAX);
        let total: u64 = conn.query_row(
            "SELECT COUNT(*) FROM posts WHERE user_id=?1",
            params![user_id],
            |r| r.get::<_, i64>(0).map(|v| v as u64),
        )?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {POST_COLS} FROM posts WHERE user_id=?1 AND created_at_ms < ?2 ORDER BY created_at_ms DESC LIMIT ?3"
        ))?;
        let items = stmt
            .query_map(params![user_id, before, limit], post_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(page_from_posts(total, items, limit))
    }

    /// Home timeline. An authenticated viewer sees their own posts plus
    /// posts from accounts they follow; anonymous viewers get everything,
    /// newest first.
    pub fn list_home_feed(&self, viewer_id: Option<i64>, limit: u32, cursor_ms: Option<i64>) -> Result<CollectionPage<PostRow>> {
        let conn = Connection::open(&self.path)?;
        let limit = limit.max(1).min(200) as i64;
        let before = cursor_ms.unwrap_or(i64::MAX);
        match viewer_id {
            Some(viewer) => {
                let total: u64 = conn.query_row(
                    r#"
                    SELECT COUNT(*) FROM posts
                    WHERE user_id=?1 OR user_id IN (SELECT followed_id FROM follows WHERE follower_id=?1)
                    "#,
                    params![viewer],
                    |r| r.get::<_, i64>(0).map(|v| v as u64),
                )?;
                let mut stmt = conn.prepare(&format!(
                    r#"
                    SELECT {POST_COLS} FROM posts
                    WHERE (user_id=?1 OR user_id IN (SELECT followed_id FROM follows WHERE follower_id=?1))
                      AND created_at_ms < ?2
                    ORDER BY created_at_ms DESC
                    LIMIT ?3
                    "#
                ))?;
                let items = stmt
                    .query_map(params![viewer, before, limit], post_from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(page_from_posts(total, items, limit))
            }
            None => {
                let total: u64 =
                    conn.query_row("SELECT COUNT(*) FROM posts", [], |r| r.get::<_, i64>(0).map(|v| v as u64))?;
                let mut stmt = conn.prepare(&format!(
                    "SELECT {POST_COLS} FROM posts WHERE created_at_ms < ?1 ORDER BY created_at_ms DESC LIMIT ?2"
                ))?;
                let items = stmt
                    .query_map(params![before, limit], post_from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(page_from_posts(total, items, limit))
            }
        }
    }

    /// Explore ordering: every post by total engagement, unwindowed.
    pub fn list_explore_feed(&self, limit: u32, offset: u32) -> Result<CollectionPage<PostRow>> {
        let conn = Connection::open(&self.path)?;
        let limit = limit.max(1).min(200) as i64;
        let offset = offset.min(100_000) as i64;
        let total: u64 =
            conn.query_row("SELECT COUNT(*) FROM posts", [], |r| r.get::<_, i64>(0).map(|v| v as u64))?;
        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT {POST_COLS} FROM posts
            ORDER BY (likes_count + comments_count) DESC, created_at_ms DESC
            LIMIT ?1 OFFSET ?2
            "#
        ))?;
        let items = stmt
            .query_map(params![limit, offset], post_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        let next = if items.len() as i64 == limit {
            Some((offset + limit).to_string())
        } else {
            None
        };
        Ok(CollectionPage { total, items, next })
    }

    /// Trending: recent window only, ranked by aggregate engagement, newest
    /// first between equals.
    pub fn trending_posts(&self, limit: u32, window_ms: i64) -> Result<Vec<PostRow>> {
        let conn = Connection::open(&self.path)?;
        let cutoff = now_ms().saturating_sub(window_ms.max(0));
        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT {POST_COLS} FROM posts
            WHERE created_at_ms >= ?1
            ORDER BY (likes_count + comments_count) DESC, created_at_ms DESC
            LIMIT ?2
            "#
        ))?;
        let rows = stmt
            .query_map(params![cutoff, limit.max(1).min(200)], post_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Tag frequency over the recent window. Tags are lower-cased for
    /// aggregation only; storage keeps the author's casing. Ties break
    /// lexically.
    pub fn trending_tags(&self, limit: u32, window_ms: i64) -> Result<Vec<(String, u64)>> {
        let conn = Connection::open(&self.path)?;
        let cutoff = now_ms().saturating_sub(window_ms.max(0));
        let mut stmt = conn.prepare(
            "SELECT tags FROM posts WHERE created_at_ms >= ?1 AND tags IS NOT NULL",
        )?;
        let mut rows = stmt.query(params![cutoff])?;
        let mut counts: HashMap<String, u64> = HashMap::new();
        while let Some(row) = rows.next()? {
            let raw: String = row.get(0)?;
            for tag in raw.split(',').map(str::trim).filter(|t| !t.is_empty()) {
                *counts.entry(tag.to_lowercase()).or_insert(0) += 1;
            }
        }
        let mut out: Vec<(String, u64)> = counts.into_iter().collect();
        out.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        out.truncate(limit.max(1) as usize);
        Ok(out)
    }

    pub fn posts_by_tag(&self, tag: &str, limit: u32, cursor_ms: Option<i64>) -> Result<CollectionPage<PostRow>> {
        let tag = tag.trim().trim_start_matches('#').to_lowercase();
        if tag.is_empty() {
            return Ok(CollectionPage::empty());
        }
        let conn = Connection::open(&self.path)?;
        let limit = limit.max(1).min(200) as i64;
        let before = cursor_ms.unwrap_or(i64::MAX);
        let tag_like = format!("%{}%", escape_like(&tag));
        let total: u64 = conn.query_row(
            r#"SELECT COUNT(*) FROM posts WHERE lower(COALESCE(tags, '')) LIKE ?1 ESCAPE '\'"#,
            params![tag_like],
            |r| r.get::<_, i64>(0).map(|v| v as u64),
        )?;
        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT {POST_COLS} FROM posts
            WHERE lower(COALESCE(tags, '')) LIKE ?1 ESCAPE '\' AND created_at_ms < ?2
            ORDER BY created_at_ms DESC
            LIMIT ?3
            "#
        ))?;
        let items = stmt
            .query_map(params![tag_like, before, limit], post_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(page_from_posts(total, items, limit))
    }

    pub fn search_posts(&self, q: &str, limit: u32, cursor_ms: Option<i64>) -> Result<CollectionPage<PostRow>> {
        let q = q.trim().to_lowercase();
        if q.is_empty() {
            return Ok(CollectionPage::empty());
        }
        let conn = Connection::open(&self.path)?;
        let limit = limit.max(1).min(200) as i64;
        let before = cursor_ms.unwrap_or(i64::MAX);
        let q_like = format!("%{}%", escape_like(&q));
        let total: u64 = conn.query_row(
            r#"
            SELECT COUNT(*) FROM posts
            WHERE lower(content) LIKE ?1 ESCAPE '\' OR lower(COALESCE(tags, '')) LIKE ?1 ESCAPE '\'
            "#,
            params![q_like],
            |r| r.get::<_, i64>(0).map(|v| v as u64),
        )?;
        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT {POST_COLS} FROM posts
            WHERE (lower(content) LIKE ?1 ESCAPE '\' OR lower(COALESCE(tags, '')) LIKE ?1 ESCAPE '\')
              AND created_at_ms < ?2
            ORDER BY created_at_ms DESC
            LIMIT ?3
            "#
        ))?;
        let items = stmt
            .query_map(params![q_like, before, limit], post_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(page_from_posts(total, items, limit))
    }

    // ---- engagement ----

    /// Like toggle as one transaction: delete-or-insert the row, then bring
    /// the denormalized counter back to the true row count before commit.
    /// Returns `(liked, likes_count)`.
    pub fn toggle_like(&self, user_id: i64, post_id: i64) -> Result<(bool, i64)> {
        let mut conn = Connection::open(&self.path)?;
        let tx = conn.transaction()?;
        let existing: Option<i64> = tx
            .query_row(
                "SELECT id FROM likes WHERE user_id=?1 AND post_id=?2",
                params![user_id, post_id],
                |r| r.get(0),
            )
            .optional()?;
        let liked = match existing {
            Some(like_id) => {
                tx.execute("DELETE FROM likes WHERE id=?1", params![like_id])?;
                false
            }
            None => {
                tx.execute(
                    "INSERT OR IGNORE INTO likes(user_id, post_id, created_at_ms) VALUES (?1, ?2, ?3)",
                    params![user_id, post_id, now_ms()],
                )?;
                true
            }
        };
        tx.execute(
            "UPDATE posts SET likes_count = (SELECT COUNT(*) FROM likes WHERE post_id=?1) WHERE id=?1",
            params![post_id],
        )?;
        let count: i64 = tx.query_row(
            "SELECT likes_count FROM posts WHERE id=?1",
            params![post_id],
            |r| r.get(0),
        )?;
        tx.commit()?;
        Ok((liked, count))
    }

    pub fn is_liked_by(&self, user_id: i64, post_id: i64) -> Result<bool> {
        let conn = Connection::open(&self.path)?;
        let row: Option<i64> = conn
            .query_row(
                "SELECT id FROM likes WHERE user_id=?1 AND post_id=?2",
                params![user_id, post_id],
                |r| r.get(0),
            )
            .optional()?;
        Ok(row.is_some())
    }

    pub fn count_likes(&self, post_id: i64) -> Result<u64> {
        let conn = Connection::open(&self.path)?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM likes WHERE post_id=?1",
            params![post_id],
            |r| r.get(0),
        )?;
        Ok(count as u64)
    }

    /// Insert plus a +1 counter bump in the same transaction. A reply just
    /// carries `parent_id`; cross-post parents are the caller's problem to
    /// reject before getting here.
    pub fn insert_comment(
        &self,
        post_id: i64,
        user_id: i64,
        content: &str,
        parent_id: Option<i64>,
    ) -> Result<(CommentRow, i64)> {
        let mut conn = Connection::open(&self.path)?;
        let tx = conn.transaction()?;
        let now = now_ms();
        tx.execute(
            r#"
            INSERT INTO comments(post_id, user_id, parent_id, content, created_at_ms, updated_at_ms)
            VALUES (?1, ?2, ?3, ?4, ?5, ?5)
            "#,
            params![post_id, user_id, parent_id, content, now],
        )?;
        let comment_id = tx.last_insert_rowid();
        tx.execute(
            "UPDATE posts SET comments_count = comments_count + 1 WHERE id=?1",
            params![post_id],
        )?;
        let count: i64 = tx.query_row(
            "SELECT comments_count FROM posts WHERE id=?1",
            params![post_id],
            |r| r.get(0),
        )?;
        tx.commit()?;
        let comment = CommentRow {
            id: comment_id,
            post_id,
            user_id,
            parent_id,
            content: content.to_string(),
            created_at_ms: now,
            updated_at_ms: now,
        };
        Ok((comment, count))
    }

    pub fn get_comment(&self, comment_id: i64) -> Result<Option<CommentRow>> {
        let conn = Connection::open(&self.path)?;
        conn.query_row(
            &format!("SELECT {COMMENT_COLS} FROM comments WHERE id=?1"),
            params![comment_id],
            comment_from_row,
        )
        .optional()
        .map_err(Into::into)
    }

    /// Top-level comments only, newest first. Replies hang off their parent
    /// via `list_replies`.
    pub fn list_comments(&self, post_id: i64, limit: u32, cursor_ms: Option<i64>) -> Result<CollectionPage<CommentRow>> {
        let conn = Connection::open(&self.path)?;
        let limit = limit.max(1).min(200) as i64;
        let before = cursor_ms.unwrap_or(i64::MAX);
        let total: u64 = conn.query_row(
            "SELECT COUNT(*) FROM comments WHERE post_id=?1 AND parent_id IS NULL",
            params![post_id],
            |r| r.get::<_, i64>(0).map(|v| v as u64),
        )?;
        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT {COMMENT_COLS} FROM comments
            WHERE post_id=?1 AND parent_id IS NULL AND created_at_ms < ?2
            ORDER BY created_at_ms DESC
            LIMIT ?3
            "#
        ))?;
        let mut rows = stmt.query(params![post_id, before, limit])?;
        let mut items = Vec::new();
        let mut last_created = None;
        while let Some(row) = rows.next()? {
            let comment = comment_from_row(row)?;
            last_created = Some(comment.created_at_ms);
            items.push(comment);
        }
        let next = if items.len() as i64 == limit {
            last_created.map(|v: i64| v.to_string())
        } else {
            None
        };
        Ok(CollectionPage { total, items, next })
    }

    pub fn list_replies(&self, parent_id: i64, limit: u32) -> Result<Vec<CommentRow>> {
        let conn = Connection::open(&self.path)?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {COMMENT_COLS} FROM comments WHERE parent_id=?1 ORDER BY created_at_ms ASC LIMIT ?2"
        ))?;
        let rows = stmt
            .query_map(params![parent_id, limit.max(1).min(500)], comment_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Derived, never stored.
    pub fn replies_count(&self, comment_id: i64) -> Result<u64> {
        let conn = Connection::open(&self.path)?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM comments WHERE parent_id=?1",
            params![comment_id],
            |r| r.get(0),
        )?;
        Ok(count as u64)
    }

    // ---- notifications ----

    /// Writes the inbox entry for someone else's action. A user's own
    /// actions never notify themselves.
    pub fn create_notification(
        &self,
        sender: &UserRow,
        recipient_id: i64,
        kind: &str,
        post_id: Option<i64>,
        comment_id: Option<i64>,
    ) -> Result<Option<i64>> {
        if sender.id == recipient_id {
            tracing::debug!(kind, "notification suppressed: sender is recipient");
            return Ok(None);
        }
        let message = format!("{} {}", sender.username, kind_template(kind));
        let conn = Connection::open(&self.path)?;
        conn.execute(
            r#"
            INSERT INTO notifications(sender_id, recipient_id, kind, message, post_id, comment_id, is_read, created_at_ms)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7)
            "#,
            params![sender.id, recipient_id, kind, message, post_id, comment_id, now_ms()],
        )?;
        Ok(Some(conn.last_insert_rowid()))
    }

    pub fn list_notifications(
        &self,
        recipient_id: i64,
        limit: u32,
        cursor_ms: Option<i64>,
    ) -> Result<CollectionPage<NotificationRow>> {
        let conn = Connection::open(&self.path)?;
        let limit = limit.max(1).min(200) as i64;
        let before = cursor_ms.unwrap_or(i64::MAX);
        let total: u64 = conn.query_row(
            "SELECT COUNT(*) FROM notifications WHERE recipient_id=?1",
            params![recipient_id],
            |r| r.get::<_, i64>(0).map(|v| v as u64),
        )?;
        let mut stmt = conn.prepare(
            r#"
            SELECT n.id, n.sender_id, u.username, n.recipient_id, n.kind, n.message,
                   n.post_id, n.comment_id, n.is_read, n.created_at_ms
            FROM notifications n JOIN users u ON u.id = n.sender_id
            WHERE n.recipient_id=?1 AND n.created_at_ms < ?2
            ORDER BY n.created_at_ms DESC
            LIMIT ?3
            "#,
        )?;
        let mut rows = stmt.query(params![recipient_id, before, limit])?;
        let mut items = Vec::new();
        let mut last_created = None;
        while let Some(row) = rows.next()? {
            let item = NotificationRow {
                id: row.get(0)?,
                sender_id: row.get(1)?,
                sender_username: row.get(2)?,
                recipient_id: row.get(3)?,
                kind: row.get(4)?,
                message: row.get(5)?,
                post_id: row.get(6)?,
                comment_id: row.get(7)?,
                is_read: row.get::<_, i64>(8)? != 0,
                created_at_ms: row.get(9)?,
            };
            last_created = Some(item.created_at_ms);
            items.push(item);
        }
        let next = if items.len() as i64 == limit {
            last_created.map(|v: i64| v.to_string())
        } else {
            None
        };
        Ok(CollectionPage { total, items, next })
    }

    pub fn mark_notification_read(&self, notification_id: i64) -> Result<bool> {
        let conn = Connection::open(&self.path)?;
        let updated = conn.execute(
            "UPDATE notifications SET is_read=1 WHERE id=?1",
            params![notification_id],
        )?;
        Ok(updated > 0)
    }

    pub fn mark_all_notifications_read(&self, recipient_id: i64) -> Result<u64> {
        let conn = Connection::open(&self.path)?;
        let updated = conn.execute(
            "UPDATE notifications SET is_read=1 WHERE recipient_id=?1 AND is_read=0",
            params![recipient_id],
        )?;
        Ok(updated as u64)
    }

    pub fn unread_notifications_count(&self, recipient_id: i64) -> Result<u64> {
        let conn = Connection::open(&self.path)?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM notifications WHERE recipient_id=?1 AND is_read=0",
            params![recipient_id],
            |r| r.get(0),
        )?;
        Ok(count as u64)
    }

    #[cfg(test)]
    fn backdate_post(&self, post_id: i64, created_at_ms: i64) -> Result<()> {
        let conn = Connection::open(&self.path)?;
        conn.execute(
            "UPDATE posts SET created_at_ms=?2 WHERE id=?1",
            params![post_id, created_at_ms],
        )?;
        Ok(())
    }
}

fn kind_template(kind: &str) -> &'static str {
    match kind {
        "like" => "liked your post",
        "comment" => "commented on your post",
        "follow" => "started following you",
        "mention" => "mentioned you in a post",
        _ => "interacted with you",
    }
}

fn user_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: r.get(0)?,
        username: r.get(1)?,
        email: r.get(2)?,
        password_hash: r.get(3)?,
        full_name: r.get(4)?,
        bio: r.get(5)?,
        location: r.get(6)?,
        website: r.get(7)?,
        profile_picture: r.get(8)?,
        cover_photo: r.get(9)?,
        is_private: r.get::<_, i64>(10)? != 0,
        is_verified: r.get::<_, i64>(11)? != 0,
        is_active: r.get::<_, i64>(12)? != 0,
        is_admin: r.get::<_, i64>(13)? != 0,
        created_at_ms: r.get(14)?,
        last_seen_ms: r.get(15)?,
    })
}

fn post_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<PostRow> {
    Ok(PostRow {
        id: r.get(0)?,
        user_id: r.get(1)?,
        content: r.get(2)?,
        image_name: r.get(3)?,
        video_name: r.get(4)?,
        tags: r.get(5)?,
        location: r.get(6)?,
        likes_count: r.get(7)?,
        comments_count: r.get(8)?,
        shares_count: r.get(9)?,
        views_count: r.get(10)?,
        created_at_ms: r.get(11)?,
        updated_at_ms: r.get(12)?,
    })
}

fn comment_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<CommentRow> {
    Ok(CommentRow {
        id: r.get(0)?,
        post_id: r.get(1)?,
        user_id: r.get(2)?,
        parent_id: r.get(3)?,
        content: r.get(4)?,
        created_at_ms: r.get(5)?,
        updated_at_ms: r.get(6)?,
    })
}

fn qualify_cols(cols: &str, alias: &str) -> String {
    cols.split(',')
        .map(|c| format!("{alias}.{}", c.trim()))
        .collect::<Vec<_>>()
        .join(", ")
}

fn page_from_posts(total: u64, items: Vec<PostRow>, limit: i64) -> CollectionPage<PostRow> {
    let next = if items.len() as i64 == limit {
        items.last().map(|p| p.created_at_ms.to_string())
    } else {
        None
    };
    CollectionPage { total, items, next }
}

/// `None` when the list is empty so "no tags" never stores as `""`.
fn join_tags(tags: &[String]) -> Option<String> {
    let cleaned: Vec<&str> = tags
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .collect();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned.join(", "))
    }
}

/// Additive schema migration: adds each missing `(name, type)` column to
/// `table`. Already-present columns are left alone, so reopening an
/// up-to-date database is a no-op.
fn ensure_columns(conn: &Connection, table: &str, cols: &[(&str, &str)]) -> Result<()> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(1))?;
    let mut existing = std::collections::HashSet::new();
    for name in rows {
        existing.insert(name?);
    }
    for (name, ty) in cols {
        if !existing.contains(*name) {
            conn.execute(&format!("ALTER TABLE {table} ADD COLUMN {name} {ty}"), [])?;
        }
    }
    Ok(())
}

fn collect_ids(conn: &Connection, sql: &str, param: i64) -> Result<Vec<i64>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params![param], |r| r.get::<_, i64>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Shared by post and user deletion: children go, notification references
/// are detached so the inbox rows survive.
fn delete_post_children(conn: &Connection, post_id: i64) -> Result<()> {
    conn.execute(
        "UPDATE notifications SET comment_id=NULL WHERE comment_id IN (SELECT id FROM comments WHERE post_id=?1)",
        params![post_id],
    )?;
    conn.execute("DELETE FROM comments WHERE post_id=?1", params![post_id])?;
    conn.execute("DELETE FROM likes WHERE post_id=?1", params![post_id])?;
    conn.execute(
        "UPDATE notifications SET post_id=NULL WHERE post_id=?1",
        params![post_id],
    )?;
    Ok(())
}

fn recount_post_counters(conn: &Connection, post_id: i64) -> Result<()> {
    conn.execute(
        r#"
        UPDATE posts SET
          likes_count = (SELECT COUNT(*) FROM likes WHERE post_id=?1),
          comments_count = (SELECT COUNT(*) FROM comments WHERE post_id=?1)
        WHERE id=?1
        "#,
        params![post_id],
    )?;
    Ok(())
}

pub fn hash_password(password: &str) -> String {
    let mut salt = [0u8; 16];
    OsRng.fill_bytes(&mut salt);
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(password.as_bytes());
    format!("{}${}", hex::encode(salt), hex::encode(hasher.finalize()))
}

pub fn verify_password(stored: &str, candidate: &str) -> bool {
    let Some((salt_hex, digest_hex)) = stored.split_once('$') else {
        return false;
    };
    let Ok(salt) = hex::decode(salt_hex) else {
        return false;
    };
    let mut hasher = Sha256::new();
    hasher.update(&salt);
    hasher.update(candidate.as_bytes());
    hex::encode(hasher.finalize()) == digest_hex
}

fn escape_like(input: &str) -> String {
    input.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> (tempfile::TempDir, SocialDb) {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = SocialDb::open(dir.path().join("murmur.db")).expect("open db");
        (dir, db)
    }

    fn user(db: &SocialDb, name: &str) -> i64 {
        db.create_user(name, &format!("{name}@example.com"), "hunter22")
            .expect("create user")
    }

    #[test]
    fn reopen_adds_migrated_columns_to_old_schema() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("murmur.db");
        // A database from before cover_photo/is_admin/shares_count existed.
        {
            let conn = Connection::open(&path).expect("open raw");
            conn.execute_batch(
                r#"
                CREATE TABLE users (
                  id INTEGER PRIMARY KEY AUTOINCREMENT,
                  username TEXT NOT NULL UNIQUE,
                  email TEXT NOT NULL UNIQUE,
                  password_hash TEXT NOT NULL,
                  full_name TEXT NULL,
                  bio TEXT NULL,
                  location TEXT NULL,
                  website TEXT NULL,
                  profile_picture TEXT NULL,
                  is_private INTEGER NOT NULL DEFAULT 0,
                  is_verified INTEGER NOT NULL DEFAULT 0,
                  is_active INTEGER NOT NULL DEFAULT 1,
                  created_at_ms INTEGER NOT NULL,
                  last_seen_ms INTEGER NOT NULL
                );
                CREATE TABLE posts (
                  id INTEGER PRIMARY KEY AUTOINCREMENT,
                  user_id INTEGER NOT NULL,
                  content TEXT NOT NULL,
                  image_name TEXT NULL,
                  video_name TEXT NULL,
                  tags TEXT NULL,
                  location TEXT NULL,
                  likes_count INTEGER NOT NULL DEFAULT 0,
                  comments_count INTEGER NOT NULL DEFAULT 0,
                  views_count INTEGER NOT NULL DEFAULT 0,
                  created_at_ms INTEGER NOT NULL,
                  updated_at_ms INTEGER NOT NULL
                );
                INSERT INTO users(username, email, password_hash, created_at_ms, last_seen_ms)
                  VALUES ('vintage', 'vintage@example.com', 'x$y', 1, 1);
                INSERT INTO posts(user_id, content, created_at_ms, updated_at_ms)
                  VALUES (1, 'old post', 1, 1);
                "#,
            )
            .expect("seed old schema");
        }

        let db = SocialDb::open(&path).expect("reopen migrates");
        let user = db.get_user(1).expect("get").expect("exists");
        assert_eq!(user.cover_photo, None);
        assert!(!user.is_admin);
        let post = db.get_post(1).expect("get").expect("exists");
        assert_eq!(post.shares_count, 0);
        // A second open must not trip over the already-added columns.
        let db = SocialDb::open(&path).expect("reopen again");
        db.health_check().expect("health");
    }

    #[test]
    fn password_round_trip() {
        let (_dir, db) = test_db();
        let id = user(&db, "alice");
        let alice = db.get_user(id).expect("get").expect("exists");
        assert!(alice.check_password("hunter22"));
        assert!(!alice.check_password("wrong"));
        assert!(!alice.password_hash.contains("hunter22"));
    }

    #[test]
    fn follow_is_idempotent_and_rejects_self() {
        let (_dir, db) = test_db();
        let a = user(&db, "alice");
        let b = user(&db, "bob");

        assert!(db.follow(a, b).expect("follow").is_some());
        assert_eq!(db.followers_count(b).expect("count"), 1);
        // Second edge for the same ordered pair is a no-op.
        assert!(db.follow(a, b).expect("follow again").is_none());
        assert_eq!(db.followers_count(b).expect("count"), 1);
        // Self-follow never creates an edge.
        assert!(db.follow(a, a).expect("self follow").is_none());
        assert_eq!(db.following_count(a).expect("count"), 1);

        assert!(db.unfollow(a, b).expect("unfollow"));
        assert!(!db.unfollow(a, b).expect("unfollow again"));
        assert_eq!(db.followers_count(b).expect("count"), 0);
    }

    #[test]
    fn like_toggle_pairs_return_to_baseline() {
        let (_dir, db) = test_db();
        let a = user(&db, "alice");
        let b = user(&db, "bob");
        let post = db.create_post(b, "hello", &[], None, None, None).expect("post");

        let (liked, count) = db.toggle_like(a, post).expect("toggle");
        assert!(liked);
        assert_eq!(count, 1);
        let (liked, count) = db.toggle_like(a, post).expect("toggle");
        assert!(!liked);
        assert_eq!(count, 0);
        assert!(!db.is_liked_by(a, post).expect("liked"));
    }

    #[test]
    fn likes_counter_matches_row_count_after_any_sequence() {
        let (_dir, db) = test_db();
        let ids: Vec<i64> = ["u1", "u2", "u3"].iter().map(|n| user(&db, n)).collect();
        let post = db.create_post(ids[0], "post", &[], None, None, None).expect("post");

        for round in 0..3 {
            for u in &ids {
                db.toggle_like(*u, post).expect("toggle");
            }
            let row = db.get_post(post).expect("get").expect("exists");
            assert_eq!(row.likes_count as u64, db.count_likes(post).expect("rows"), "round {round}");
        }
    }

    #[test]
    fn comment_insert_bumps_counter_consistently() {
        let (_dir, db) = test_db();
        let a = user(&db, "alice");
        let post = db.create_post(a, "post", &[], None, None, None).expect("post");

        let (c1, count) = db.insert_comment(post, a, "first", None).expect("comment");
        assert_eq!(count, 1);
        assert!(!c1.is_reply());
        let (c2, count) = db.insert_comment(post, a, "reply", Some(c1.id)).expect("reply");
        assert_eq!(count, 2);
        assert!(c2.is_reply());

        // The incremental bump agrees with a full recount.
        assert_eq!(db.update_comments_count(post).expect("recount"), 2);
        assert_eq!(db.replies_count(c1.id).expect("replies"), 1);

        let top = db.list_comments(post, 20, None).expect("list");
        assert_eq!(top.items.len(), 1);
        assert_eq!(top.items[0].id, c1.id);
        let replies = db.list_replies(c1.id, 20).expect("replies");
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].id, c2.id);
    }

    #[test]
    fn tags_round_trip_preserves_case_and_drops_blanks() {
        let (_dir, db) = test_db();
        let a = user(&db, "alice");
        let tags: Vec<String> = ["Food", "Travel", " ", "food"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let post = db.create_post(a, "post", &tags, None, None, None).expect("post");
        let row = db.get_post(post).expect("get").expect("exists");
        assert_eq!(row.tags_list(), vec!["Food", "Travel", "food"]);

        let empty = db
            .create_post(a, "no tags", &[" ".to_string()], None, None, None)
            .expect("post");
        let row = db.get_post(empty).expect("get").expect("exists");
        assert_eq!(row.tags, None);
        assert!(row.tags_list().is_empty());
    }

    #[test]
    fn trending_window_excludes_old_posts() {
        let (_dir, db) = test_db();
        let a = user(&db, "alice");
        let b = user(&db, "bob");
        let week_ms = 7 * 24 * 3600 * 1000;

        let fresh = db.create_post(a, "fresh", &[], None, None, None).expect("post");
        let stale = db.create_post(a, "stale", &[], None, None, None).expect("post");
        db.backdate_post(stale, now_ms() - 8 * 24 * 3600 * 1000).expect("backdate");
        // Identical engagement on both.
        db.toggle_like(b, fresh).expect("like");
        db.toggle_like(b, stale).expect("like");

        let trending = db.trending_posts(10, week_ms).expect("trending");
        let ids: Vec<i64> = trending.iter().map(|p| p.id).collect();
        assert!(ids.contains(&fresh));
        assert!(!ids.contains(&stale));
    }

    #[test]
    fn trending_tags_lowercase_and_break_ties_lexically() {
        let (_dir, db) = test_db();
        let a = user(&db, "alice");
        let week_ms = 7 * 24 * 3600 * 1000;
        let mk = |tags: &[&str]| {
            let tags: Vec<String> = tags.iter().map(|s| s.to_string()).collect();
            db.create_post(a, "p", &tags, None, None, None).expect("post")
        };
        mk(&["Food", "Travel"]);
        mk(&["food"]);
        mk(&["travel"]);

        let tags = db.trending_tags(10, week_ms).expect("tags");
        assert_eq!(tags[0], ("food".to_string(), 2));
        assert_eq!(tags[1], ("travel".to_string(), 2));
    }

    #[test]
    fn home_feed_covers_followed_and_own_posts() {
        let (_dir, db) = test_db();
        let a = user(&db, "alice");
        let b = user(&db, "bob");
        let c = user(&db, "carol");
        let pa = db.create_post(a, "from alice", &[], None, None, None).expect("post");
        let pb = db.create_post(b, "from bob", &[], None, None, None).expect("post");
        let pc = db.create_post(c, "from carol", &[], None, None, None).expect("post");

        db.follow(b, a).expect("follow");
        let feed = db.list_home_feed(Some(b), 20, None).expect("feed");
        let ids: Vec<i64> = feed.items.iter().map(|p| p.id).collect();
        assert!(ids.contains(&pa), "followed account's post");
        assert!(ids.contains(&pb), "own post");
        assert!(!ids.contains(&pc), "unfollowed account's post");

        // Anonymous viewers get everything, newest first.
        let all = db.list_home_feed(None, 20, None).expect("feed");
        assert_eq!(all.items.len(), 3);
        assert!(all.items.windows(2).all(|w| w[0].created_at_ms >= w[1].created_at_ms));
    }

    #[test]
    fn private_profile_gated_by_follow_edge() {
        let (_dir, db) = test_db();
        let a = user(&db, "alice");
        let c = user(&db, "carol");
        db.update_profile(
            a,
            &ProfileUpdate {
                is_private: true,
                ..Default::default()
            },
        )
        .expect("update");
        let alice = db.get_user(a).expect("get").expect("exists");
        assert!(alice.is_private);

        assert!(!db.can_view_profile(Some(c), &alice).expect("view"));
        assert!(!db.can_view_profile(None, &alice).expect("view"));
        assert!(db.can_view_profile(Some(a), &alice).expect("view"));
        db.follow(c, a).expect("follow");
        assert!(db.can_view_profile(Some(c), &alice).expect("view"));
    }

    #[test]
    fn notifications_suppress_self_and_mark_read() {
        let (_dir, db) = test_db();
        let a = user(&db, "alice");
        let b = user(&db, "bob");
        let alice = db.get_user(a).expect("get").expect("exists");
        let post = db.create_post(a, "post", &[], None, None, None).expect("post");

        for kind in ["like", "comment", "follow", "mention"] {
            assert!(
                db.create_notification(&alice, a, kind, Some(post), None)
                    .expect("notify")
                    .is_none(),
                "self-notification must be suppressed for {kind}"
            );
        }
        assert_eq!(db.unread_notifications_count(a).expect("count"), 0);

        db.create_notification(&alice, b, "like", Some(post), None).expect("notify");
        db.create_notification(&alice, b, "follow", None, None).expect("notify");
        assert_eq!(db.unread_notifications_count(b).expect("count"), 2);

        let page = db.list_notifications(b, 20, None).expect("list");
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0].message, "alice started following you");
        assert_eq!(page.items[0].url(), "/user/alice");
        assert_eq!(page.items[1].url(), format!("/post/{post}"));

        assert_eq!(db.mark_all_notifications_read(b).expect("mark"), 2);
        assert_eq!(db.unread_notifications_count(b).expect("count"), 0);
    }

    #[test]
    fn unknown_notification_kind_gets_generic_message() {
        let (_dir, db) = test_db();
        let a = user(&db, "alice");
        let b = user(&db, "bob");
        let alice = db.get_user(a).expect("get").expect("exists");
        db.create_notification(&alice, b, "poke", None, None).expect("notify");
        let page = db.list_notifications(b, 20, None).expect("list");
        assert_eq!(page.items[0].message, "alice interacted with you");
        assert_eq!(page.items[0].url(), "/");
    }

    #[test]
    fn delete_post_cascades_children_and_detaches_notifications() {
        let (_dir, db) = test_db();
        let a = user(&db, "alice");
        let b = user(&db, "bob");
        let bob = db.get_user(b).expect("get").expect("exists");
        let post = db.create_post(a, "post", &[], None, None, None).expect("post");
        let (comment, _) = db.insert_comment(post, b, "nice", None).expect("comment");
        db.toggle_like(b, post).expect("like");
        db.create_notification(&bob, a, "comment", Some(post), Some(comment.id))
            .expect("notify");

        assert!(db.delete_post(post).expect("delete"));
        assert!(db.get_post(post).expect("get").is_none());
        assert!(db.get_comment(comment.id).expect("get").is_none());
        assert_eq!(db.count_likes(post).expect("likes"), 0);
        // Inbox entry survives with its references detached.
        let page = db.list_notifications(a, 20, None).expect("list");
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].post_id, None);
        assert_eq!(page.items[0].comment_id, None);
        assert_eq!(page.items[0].url(), "/");
    }

    #[test]
    fn delete_user_recounts_touched_posts() {
        let (_dir, db) = test_db();
        let a = user(&db, "alice");
        let b = user(&db, "bob");
        let post = db.create_post(a, "post", &[], None, None, None).expect("post");
        db.toggle_like(b, post).expect("like");
        db.insert_comment(post, b, "hi", None).expect("comment");
        db.follow(b, a).expect("follow");

        assert!(db.delete_user(b).expect("delete"));
        assert!(db.get_user(b).expect("get").is_none());
        let row = db.get_post(post).expect("get").expect("exists");
        assert_eq!(row.likes_count, 0);
        assert_eq!(row.comments_count, 0);
        assert_eq!(db.followers_count(a).expect("count"), 0);
    }

    #[test]
    fn views_increment_is_storage_side() {
        let (_dir, db) = test_db();
        let a = user(&db, "alice");
        let post = db.create_post(a, "post", &[], None, None, None).expect("post");
        for _ in 0..3 {
            db.increment_views(post).expect("views");
        }
        let row = db.get_post(post).expect("get").expect("exists");
        assert_eq!(row.views_count, 3);
    }

    #[test]
    fn search_matches_content_tags_and_users() {
        let (_dir, db) = test_db();
        let a = user(&db, "alice");
        db.update_profile(
            a,
            &ProfileUpdate {
                full_name: Some("Alice Waters".to_string()),
                ..Default::default()
            },
        )
        .expect("update");
        let tagged = db
            .create_post(a, "dinner", &["Cooking".to_string()], None, None, None)
            .expect("post");
        let plain = db.create_post(a, "about cooking pasta", &[], None, None, None).expect("post");

        let hits = db.search_posts("COOKING", 20, None).expect("search");
        let ids: Vec<i64> = hits.items.iter().map(|p| p.id).collect();
        assert!(ids.contains(&tagged));
        assert!(ids.contains(&plain));

        let users = db.search_users("waters", 10).expect("users");
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].username, "alice");

        // LIKE metacharacters in queries are literal.
        assert!(db.search_posts("100%", 20, None).expect("search").items.is_empty());
    }

    #[test]
    fn suggested_users_excludes_self_and_followed() {
        let (_dir, db) = test_db();
        let a = user(&db, "alice");
        let b = user(&db, "bob");
        let c = user(&db, "carol");
        db.follow(a, b).expect("follow");

        let suggestions = db.suggested_users(a, 5).expect("suggest");
        let names: Vec<&str> = suggestions.iter().map(|u| u.username.as_str()).collect();
        assert!(names.contains(&"carol"));
        assert!(!names.contains(&"alice"));
        assert!(!names.contains(&"bob"));
        let _ = c;
    }

    #[test]
    fn follower_lists_paginate_by_edge_time() {
        let (_dir, db) = test_db();
        let a = user(&db, "alice");
        let others: Vec<i64> = (0..3).map(|i| user(&db, &format!("fan{i}"))).collect();
        for u in &others {
            db.follow(*u, a).expect("follow");
        }
        let page = db.list_followers(a, 2, None).expect("list");
        assert_eq!(page.total, 3);
        assert_eq!(page.items.len(), 2);
        assert!(page.next.is_some());
        let following = db.list_following(others[0], 10, None).expect("list");
        assert_eq!(following.items.len(), 1);
        assert_eq!(following.items[0].username, "alice");
    }
}
