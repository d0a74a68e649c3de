/*
 * SPDX-FileCopyrightText: 2026 Murmur Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Request-facing service layer. Each method is one user action or read
//! model; the transport wrapper decides whether the result ships as a
//! rendered page or JSON. Actor identity arrives from the session layer
//! and is trusted here.

use crate::config::AppConfig;
use crate::media_store::MediaStore;
use crate::social_db::{
    CollectionPage, CommentRow, NotificationRow, PostRow, ProfileUpdate, SocialDb, UserRow,
};
use crate::text;

#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Forbidden(String),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl ActionError {
    /// HTTP status the transport layer should answer with. Conflicts map
    /// to 400 because that is what the original action contracts promise
    /// for "already in that state".
    pub fn status(&self) -> u16 {
        match self {
            ActionError::Validation(_) | ActionError::Conflict(_) => 400,
            ActionError::NotFound(_) => 404,
            ActionError::Forbidden(_) => 403,
            ActionError::Storage(_) => 500,
        }
    }

    /// `{success: false, message}` body for the JSON contracts.
    pub fn to_body(&self) -> serde_json::Value {
        serde_json::json!({ "success": false, "message": self.to_string() })
    }
}

pub type ActionResult<T> = Result<T, ActionError>;

#[derive(Debug, Clone, serde::Serialize)]
pub struct LikeToggled {
    pub success: bool,
    pub liked: bool,
    pub likes_count: i64,
    pub message: String,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct CommentView {
    pub id: i64,
    pub content: String,
    pub author: String,
    pub author_avatar: String,
    pub time_ago: String,
    pub is_reply: bool,
    pub replies_count: u64,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct CommentAdded {
    pub success: bool,
    pub message: String,
    pub comment: CommentView,
    pub comments_count: i64,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct FollowChanged {
    pub success: bool,
    pub message: String,
    pub followers_count: u64,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct UserSummary {
    pub id: i64,
    pub username: String,
    pub full_name: Option<String>,
    pub avatar: String,
    pub is_following: bool,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct PostView {
    pub id: i64,
    pub author: String,
    pub author_avatar: String,
    pub content: String,
    pub image_url: Option<String>,
    pub video_url: Option<String>,
    pub tags: Vec<String>,
    pub location: Option<String>,
    pub likes_count: i64,
    pub comments_count: i64,
    pub views_count: i64,
    pub liked: bool,
    pub time_ago: String,
    pub created_at_ms: i64,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct PostDetail {
    pub post: PostView,
    pub comments: CollectionPage<CommentView>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ProfilePage {
    pub username: String,
    pub full_name: Option<String>,
    pub bio: Option<String>,
    pub location: Option<String>,
    pub website: Option<String>,
    pub avatar: String,
    pub cover_url: Option<String>,
    pub is_private: bool,
    pub is_verified: bool,
    pub posts_count: u64,
    pub followers_count: u64,
    pub following_count: u64,
    pub is_following: bool,
    /// False means access-denied, not missing: the page still renders the
    /// summary, only the timeline is withheld.
    pub can_view: bool,
    pub posts: CollectionPage<PostView>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ExplorePage {
    pub posts: CollectionPage<PostView>,
    pub trending_tags: Vec<(String, u64)>,
    pub suggested_users: Vec<UserSummary>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct SearchPage {
    pub query: String,
    pub posts: CollectionPage<PostView>,
    pub users: Vec<UserSummary>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct TrendingPost {
    pub id: i64,
    pub content: String,
    pub author: String,
    pub likes_count: i64,
    pub comments_count: i64,
    pub time_ago: String,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct NotificationView {
    pub id: i64,
    pub kind: String,
    pub message: String,
    pub sender: String,
    pub url: String,
    pub time_ago: String,
    pub is_read: bool,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct UserStats {
    pub posts_count: u64,
    pub followers_count: u64,
    pub following_count: u64,
    pub notifications_count: u64,
}

#[derive(Debug, Clone)]
pub struct MediaUpload {
    pub filename: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Default)]
pub struct NewPost {
    pub content: String,
    /// Raw comma-separated tag input, split and trimmed here.
    pub tags: String,
    pub location: String,
    pub image: Option<MediaUpload>,
    pub video: Option<MediaUpload>,
}

#[derive(Debug, Clone, Default)]
pub struct ProfileEdit {
    pub full_name: String,
    pub bio: String,
    pub location: String,
    pub website: String,
    pub is_private: bool,
    pub profile_picture: Option<MediaUpload>,
    pub cover_photo: Option<MediaUpload>,
}

pub struct App {
    db: SocialDb,
    cfg: AppConfig,
    media: MediaStore,
}

impl App {
    pub fn new(db: SocialDb, cfg: AppConfig) -> Self {
        let media = MediaStore::new(cfg.upload_dir.clone());
        Self { db, cfg, media }
    }

    pub fn db(&self) -> &SocialDb {
        &self.db
    }

    // ---- engagement ----

    pub fn toggle_like(&self, actor_id: i64, post_id: i64) -> ActionResult<LikeToggled> {
        let post = self.require_post(post_id)?;
        let (liked, likes_count) = self.db.toggle_like(actor_id, post_id)?;
        if liked {
            let actor = self.require_user(actor_id)?;
            self.db
                .create_notification(&actor, post.user_id, "like", Some(post.id), None)?;
        }
        Ok(LikeToggled {
            success: true,
            liked,
            likes_count,
            message: if liked { "Post liked" } else { "Post unliked" }.to_string(),
        })
    }

    pub fn add_comment(
        &self,
        actor_id: i64,
        post_id: i64,
        content: &str,
        parent_id: Option<i64>,
    ) -> ActionResult<CommentAdded> {
        let post = self.require_post(post_id)?;
        let content = content.trim();
        if content.is_empty() {
            return Err(ActionError::Validation("Comment cannot be empty".to_string()));
        }
        // Comments are plain text: no markup survives.
        let content = text::sanitize(content, &[]);
        if let Some(pid) = parent_id {
            let parent = self
                .db
                .get_comment(pid)?
                .ok_or_else(|| ActionError::NotFound("Parent comment not found".to_string()))?;
            if parent.post_id != post_id {
                return Err(ActionError::Validation(
                    "Parent comment belongs to a different post".to_string(),
                ));
            }
        }
        let actor = self.require_user(actor_id)?;
        let (comment, comments_count) = self.db.insert_comment(post_id, actor_id, &content, parent_id)?;
        self.db
            .create_notification(&actor, post.user_id, "comment", Some(post.id), Some(comment.id))?;
        Ok(CommentAdded {
            success: true,
            message: "Comment added successfully".to_string(),
            comment: self.comment_view(&comment)?,
            comments_count,
        })
    }

    // ---- social graph ----

    pub fn follow_user(&self, actor_id: i64, username: &str) -> ActionResult<FollowChanged> {
        let target = self.require_user_by_name(username)?;
        if target.id == actor_id {
            return Err(ActionError::Validation("You cannot follow yourself".to_string()));
        }
        if self.db.is_following(actor_id, target.id)? {
            return Err(ActionError::Conflict("Already following this user".to_string()));
        }
        // A lost race against a duplicate submission lands here as None;
        // that is "already performed", not an error.
        if self.db.follow(actor_id, target.id)?.is_some() {
            let actor = self.require_user(actor_id)?;
            self.db.create_notification(&actor, target.id, "follow", None, None)?;
        }
        Ok(FollowChanged {
            success: true,
            message: format!("You are now following {username}"),
            followers_count: self.db.followers_count(target.id)?,
        })
    }

    pub fn unfollow_user(&self, actor_id: i64, username: &str) -> ActionResult<FollowChanged> {
        let target = self.require_user_by_name(username)?;
        if target.id == actor_id {
            return Err(ActionError::Validation("You cannot unfollow yourself".to_string()));
        }
        if !self.db.unfollow(actor_id, target.id)? {
            return Err(ActionError::Conflict("You are not following this user".to_string()));
        }
        Ok(FollowChanged {
            success: true,
            message: format!("You unfollowed {username}"),
            followers_count: self.db.followers_count(target.id)?,
        })
    }

    pub fn followers(
        &self,
        viewer_id: Option<i64>,
        username: &str,
        cursor_ms: Option<i64>,
    ) -> ActionResult<CollectionPage<UserSummary>> {
        let user = self.require_user_by_name(username)?;
        let page = self.db.list_followers(user.id, self.cfg.users_per_page, cursor_ms)?;
        self.map_page(page, |u| self.user_summary(viewer_id, &u))
    }

    pub fn following(
        &self,
        viewer_id: Option<i64>,
        username: &str,
        cursor_ms: Option<i64>,
    ) -> ActionResult<CollectionPage<UserSummary>> {
        let user = self.require_user_by_name(username)?;
        let page = self.db.list_following(user.id, self.cfg.users_per_page, cursor_ms)?;
        self.map_page(page, |u| self.user_summary(viewer_id, &u))
    }

    // ---- content ----

    pub fn create_post(&self, actor_id: i64, new: NewPost) -> ActionResult<i64> {
        let actor = self.require_user(actor_id)?;
        let content = new.content.trim();
        if content.is_empty() {
            return Err(ActionError::Validation("Post content cannot be empty".to_string()));
        }
        let content = text::sanitize(content, text::POST_ALLOWED_TAGS);
        let tags: Vec<String> = new
            .tags
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect();
        let location = new.location.trim();
        let location = (!location.is_empty()).then_some(location);

        let image_name = match &new.image {
            Some(upload) => Some(self.store_upload(upload, "posts", &format!("post_{actor_id}"))?),
            None => None,
        };
        let video_name = match &new.video {
            Some(upload) => Some(self.store_upload(upload, "posts", &format!("video_{actor_id}"))?),
            None => None,
        };

        let post_id = self.db.create_post(
            actor_id,
            &content,
            &tags,
            location,
            image_name.as_deref(),
            video_name.as_deref(),
        )?;

        // Mention fan-out: every resolvable @name gets an inbox entry.
        for handle in text::extract_mentions(&content) {
            if let Some(mentioned) = self.db.get_user_by_username(&handle)? {
                self.db
                    .create_notification(&actor, mentioned.id, "mention", Some(post_id), None)?;
            }
        }
        Ok(post_id)
    }

    /// Author-only. Media file removal is best-effort: a file already gone
    /// from storage never blocks deleting the record.
    pub fn delete_post(&self, actor_id: i64, post_id: i64) -> ActionResult<()> {
        let post = self.require_post(post_id)?;
        if post.user_id != actor_id {
            return Err(ActionError::Forbidden(
                "You can only delete your own posts".to_string(),
            ));
        }
        if let Some(name) = &post.image_name {
            self.media.remove("posts", name);
        }
        if let Some(name) = &post.video_name {
            self.media.remove("posts", name);
        }
        self.db.delete_post(post_id)?;
        Ok(())
    }

    /// Post page read model: bumps the view counter, then returns the post
    /// with its top-level comment page.
    pub fn view_post(
        &self,
        viewer_id: Option<i64>,
        post_id: i64,
        cursor_ms: Option<i64>,
    ) -> ActionResult<PostDetail> {
        self.require_post(post_id)?;
        self.db.increment_views(post_id)?;
        let post = self.require_post(post_id)?;
        let comments = self.db.list_comments(post_id, self.cfg.comments_per_page, cursor_ms)?;
        Ok(PostDetail {
            post: self.post_view(viewer_id, &post)?,
            comments: self.map_page(comments, |c| self.comment_view(&c))?,
        })
    }

    // ---- read models ----

    pub fn profile(
        &self,
        viewer_id: Option<i64>,
        username: &str,
        cursor_ms: Option<i64>,
    ) -> ActionResult<ProfilePage> {
        let user = self.require_user_by_name(username)?;
        let can_view = self.db.can_view_profile(viewer_id, &user)?;
        let posts = if can_view {
            let page = self.db.list_user_posts(user.id, self.cfg.posts_per_page, cursor_ms)?;
            self.map_page(page, |p| self.post_view(viewer_id, &p))?
        } else {
            CollectionPage::empty()
        };
        let is_following = match viewer_id {
            Some(v) => self.db.is_following(v, user.id)?,
            None => false,
        };
        Ok(ProfilePage {
            username: user.username.clone(),
            full_name: user.full_name.clone(),
            bio: user.bio.clone(),
            location: user.location.clone(),
            website: user.website.clone(),
            avatar: user.avatar_url(),
            cover_url: user.cover_url(),
            is_private: user.is_private,
            is_verified: user.is_verified,
            posts_count: self.db.posts_count(user.id)?,
            followers_count: self.db.followers_count(user.id)?,
            following_count: self.db.following_count(user.id)?,
            is_following,
            can_view,
            posts,
        })
    }

    pub fn edit_profile(&self, actor_id: i64, edit: ProfileEdit) -> ActionResult<()> {
        self.require_user(actor_id)?;
        let profile_picture = match &edit.profile_picture {
            Some(upload) => Some(self.store_upload(upload, "profiles", &format!("user_{actor_id}"))?),
            None => None,
        };
        let cover_photo = match &edit.cover_photo {
            Some(upload) => Some(self.store_upload(upload, "profiles", &format!("user_{actor_id}_cover"))?),
            None => None,
        };
        let opt = |s: &str| {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        };
        self.db.update_profile(
            actor_id,
            &ProfileUpdate {
                full_name: opt(&edit.full_name),
                bio: opt(&edit.bio),
                location: opt(&edit.location),
                website: opt(&edit.website),
                is_private: edit.is_private,
                profile_picture,
                cover_photo,
            },
        )?;
        Ok(())
    }

    pub fn touch_last_seen(&self, actor_id: i64) -> ActionResult<()> {
        self.db.touch_last_seen(actor_id)?;
        Ok(())
    }

    pub fn home_feed(
        &self,
        viewer_id: Option<i64>,
        cursor_ms: Option<i64>,
    ) -> ActionResult<CollectionPage<PostView>> {
        let page = self.db.list_home_feed(viewer_id, self.cfg.posts_per_page, cursor_ms)?;
        self.map_page(page, |p| self.post_view(viewer_id, &p))
    }

    pub fn explore(&self, viewer_id: Option<i64>, offset: u32) -> ActionResult<ExplorePage> {
        let page = self.db.list_explore_feed(self.cfg.posts_per_page, offset)?;
        let posts = self.map_page(page, |p| self.post_view(viewer_id, &p))?;
        let trending_tags = self.db.trending_tags(10, self.cfg.trending_window_ms())?;
        let suggested_users = match viewer_id {
            Some(viewer) => {
                let users = self.db.suggested_users(viewer, self.cfg.suggested_users)?;
                users
                    .iter()
                    .map(|u| self.user_summary(viewer_id, u))
                    .collect::<ActionResult<Vec<_>>>()?
            }
            None => Vec::new(),
        };
        Ok(ExplorePage {
            posts,
            trending_tags,
            suggested_users,
        })
    }

    pub fn search(
        &self,
        viewer_id: Option<i64>,
        q: &str,
        cursor_ms: Option<i64>,
    ) -> ActionResult<SearchPage> {
        let posts = self.db.search_posts(q, self.cfg.posts_per_page, cursor_ms)?;
        let users = self.db.search_users(q, self.cfg.search_users_cap)?;
        Ok(SearchPage {
            query: q.to_string(),
            posts: self.map_page(posts, |p| self.post_view(viewer_id, &p))?,
            users: users
                .iter()
                .map(|u| self.user_summary(viewer_id, u))
                .collect::<ActionResult<Vec<_>>>()?,
        })
    }

    pub fn trending_posts(&self) -> ActionResult<Vec<TrendingPost>> {
        let now = now_ms();
        let posts = self.db.trending_posts(10, self.cfg.trending_window_ms())?;
        posts
            .iter()
            .map(|p| {
                let author = self.require_user(p.user_id)?;
                Ok(TrendingPost {
                    id: p.id,
                    content: text::truncate_text(&p.content, 100),
                    author: author.username,
                    likes_count: p.likes_count,
                    comments_count: p.comments_count,
                    time_ago: text::time_ago(p.created_at_ms, now),
                    image_url: p.image_url(),
                })
            })
            .collect()
    }

    pub fn posts_by_tag(
        &self,
        viewer_id: Option<i64>,
        tag: &str,
        cursor_ms: Option<i64>,
    ) -> ActionResult<CollectionPage<PostView>> {
        let page = self.db.posts_by_tag(tag, self.cfg.posts_per_page, cursor_ms)?;
        self.map_page(page, |p| self.post_view(viewer_id, &p))
    }

    // ---- notifications ----

    /// Inbox view. Opening it marks everything read, but the returned
    /// entries keep the flags they had when the page was fetched so the
    /// renderer can still highlight what was new.
    pub fn notifications(
        &self,
        actor_id: i64,
        cursor_ms: Option<i64>,
    ) -> ActionResult<CollectionPage<NotificationView>> {
        let now = now_ms();
        let page = self
            .db
            .list_notifications(actor_id, self.cfg.notifications_per_page, cursor_ms)?;
        let views = self.map_page(page, |n: NotificationRow| {
            Ok(NotificationView {
                id: n.id,
                kind: n.kind.clone(),
                message: n.message.clone(),
                sender: n.sender_username.clone(),
                url: n.url(),
                time_ago: text::time_ago(n.created_at_ms, now),
                is_read: n.is_read,
            })
        })?;
        self.db.mark_all_notifications_read(actor_id)?;
        Ok(views)
    }

    pub fn unread_notifications(&self, actor_id: i64) -> ActionResult<u64> {
        Ok(self.db.unread_notifications_count(actor_id)?)
    }

    pub fn user_stats(&self, actor_id: i64) -> ActionResult<UserStats> {
        self.require_user(actor_id)?;
        Ok(UserStats {
            posts_count: self.db.posts_count(actor_id)?,
            followers_count: self.db.followers_count(actor_id)?,
            following_count: self.db.following_count(actor_id)?,
            notifications_count: self.db.unread_notifications_count(actor_id)?,
        })
    }

    // ---- internals ----

    fn store_upload(&self, upload: &MediaUpload, folder: &str, prefix: &str) -> ActionResult<String> {
        if !MediaStore::allowed_file(&upload.filename, &self.cfg.allowed_extensions) {
            return Err(ActionError::Validation("File type not allowed".to_string()));
        }
        let name = MediaStore::stored_name(prefix, &upload.filename);
        Ok(self.media.save(folder, &name, &upload.bytes)?)
    }

    fn require_user(&self, user_id: i64) -> ActionResult<UserRow> {
        self.db
            .get_user(user_id)?
            .ok_or_else(|| ActionError::NotFound("User not found".to_string()))
    }

    fn require_user_by_name(&self, username: &str) -> ActionResult<UserRow> {
        self.db
            .get_user_by_username(username)?
            .ok_or_else(|| ActionError::NotFound("User not found".to_string()))
    }

    fn require_post(&self, post_id: i64) -> ActionResult<PostRow> {
        self.db
            .get_post(post_id)?
            .ok_or_else(|| ActionError::NotFound("Post not found".to_string()))
    }

    fn post_view(&self, viewer_id: Option<i64>, post: &PostRow) -> ActionResult<PostView> {
        let author = self.require_user(post.user_id)?;
        let liked = match viewer_id {
            Some(v) => self.db.is_liked_by(v, post.id)?,
            None => false,
        };
        Ok(PostView {
            id: post.id,
            author_avatar: author.avatar_url(),
            author: author.username,
            content: post.content.clone(),
            image_url: post.image_url(),
            video_url: post.video_url(),
            tags: post.tags_list(),
            location: post.location.clone(),
            likes_count: post.likes_count,
            comments_count: post.comments_count,
            views_count: post.views_count,
            liked,
            time_ago: text::time_ago(post.created_at_ms, now_ms()),
            created_at_ms: post.created_at_ms,
        })
    }

    fn comment_view(&self, comment: &CommentRow) -> ActionResult<CommentView> {
        let author = self.require_user(comment.user_id)?;
        Ok(CommentView {
            id: comment.id,
            content: comment.content.clone(),
            author: author.username.clone(),
            author_avatar: author.avatar_url(),
            time_ago: text::time_ago(comment.created_at_ms, now_ms()),
            is_reply: comment.is_reply(),
            replies_count: self.db.replies_count(comment.id)?,
        })
    }

    fn user_summary(&self, viewer_id: Option<i64>, user: &UserRow) -> ActionResult<UserSummary> {
        let is_following = match viewer_id {
            Some(v) => self.db.is_following(v, user.id)?,
            None => false,
        };
        Ok(UserSummary {
            id: user.id,
            username: user.username.clone(),
            full_name: user.full_name.clone(),
            avatar: user.avatar_url(),
            is_following,
        })
    }

    fn map_page<T, U>(
        &self,
        page: CollectionPage<T>,
        f: impl Fn(T) -> ActionResult<U>,
    ) -> ActionResult<CollectionPage<U>> {
        let CollectionPage { total, items, next } = page;
        let items = items.into_iter().map(f).collect::<ActionResult<Vec<_>>>()?;
        Ok(CollectionPage { total, items, next })
    }
}

fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
