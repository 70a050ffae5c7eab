use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Authoritative user record. This is also the shape of a cached snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub handle: String,
    pub email: String,
    pub display_name: String,
    pub password_hash: String,
    pub bio: String,
    pub location: String,
    pub avatar_url: String,
    pub website_url: String,
    pub suspended: bool,
    pub official: bool,
    pub is_admin: bool,
    pub following: Vec<String>,
    pub followers: Vec<String>,
    pub posts: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// A freshly signed-up account with empty edge sets.
    pub fn new(handle: &str, email: &str, password_hash: String) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            handle: handle.to_string(),
            email: email.to_string(),
            display_name: handle.to_string(),
            password_hash,
            bio: String::new(),
            location: String::new(),
            avatar_url: String::new(),
            website_url: String::new(),
            suspended: false,
            official: false,
            is_admin: false,
            following: Vec::new(),
            followers: Vec::new(),
            posts: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entities {
    pub urls: Vec<String>,
    pub hashtags: Vec<String>,
}

impl Entities {
    /// Pull links and hashtags out of a post body.
    pub fn extract(text: &str) -> Self {
        let trim = |token: &str| {
            token
                .trim_end_matches(|c: char| matches!(c, '.' | ',' | '!' | '?' | ')' | ':' | ';'))
                .to_string()
        };

        let mut entities = Entities::default();
        for token in text.split_whitespace() {
            if token.starts_with("http://") || token.starts_with("https://") {
                entities.urls.push(trim(token));
            } else if let Some(tag) = token.strip_prefix('#') {
                let tag = trim(tag);
                if !tag.is_empty() && !entities.hashtags.contains(&tag) {
                    entities.hashtags.push(tag);
                }
            }
        }
        entities
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub author_id: String,
    pub text: String,
    pub in_reply_to_status_id: Option<String>,
    pub in_reply_to_user_id: Option<String>,
    pub liked_by: Vec<String>,
    pub entities: Entities,
    pub created_at: DateTime<Utc>,
}

impl Post {
    pub fn new(author_id: &str, text: &str) -> Self {
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            author_id: author_id.to_string(),
            text: text.to_string(),
            in_reply_to_status_id: None,
            in_reply_to_user_id: None,
            liked_by: Vec::new(),
            entities: Entities::extract(text),
            created_at: Utc::now(),
        }
    }
}

/// Which of a user's two edge sets an operation touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeSet {
    Following,
    Followers,
}

impl EdgeSet {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeSet::Following => "following",
            EdgeSet::Followers => "followers",
        }
    }
}

/// Partial `$set`-style update of a user's display attributes.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileUpdate {
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub location: Option<String>,
    pub website_url: Option<String>,
    pub avatar_url: Option<String>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.display_name.is_none()
            && self.bio.is_none()
            && self.location.is_none()
            && self.website_url.is_none()
            && self.avatar_url.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Follow,
    Unfollow,
    Like,
    Unlike,
    Reply,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Follow => "follow",
            EventKind::Unfollow => "unfollow",
            EventKind::Like => "like",
            EventKind::Unlike => "unlike",
            EventKind::Reply => "reply",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "follow" => Some(EventKind::Follow),
            "unfollow" => Some(EventKind::Unfollow),
            "like" => Some(EventKind::Like),
            "unlike" => Some(EventKind::Unlike),
            "reply" => Some(EventKind::Reply),
            _ => None,
        }
    }
}

/// Notification addressed to `to_user_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub kind: EventKind,
    pub from_user_id: String,
    pub to_user_id: String,
    pub post_id: Option<String>,
    pub already_read: bool,
    pub created_at: DateTime<Utc>,
}

impl Event {
    pub fn new(kind: EventKind, from: &str, to: &str, post_id: Option<&str>) -> Self {
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            kind,
            from_user_id: from.to_string(),
            to_user_id: to.to_string(),
            post_id: post_id.map(str::to_string),
            already_read: false,
            created_at: Utc::now(),
        }
    }
}

// --- Client-facing views ---

/// Public profile. Never carries the password hash or email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub screen_name: String,
    pub name: String,
    pub description: String,
    pub location: String,
    pub url: String,
    pub profile_image_url: String,
    pub followers_count: usize,
    pub following_count: usize,
    pub statuses_count: usize,
    pub official: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            screen_name: user.handle.clone(),
            name: user.display_name.clone(),
            description: user.bio.clone(),
            location: user.location.clone(),
            url: user.website_url.clone(),
            profile_image_url: user.avatar_url.clone(),
            followers_count: user.followers.len(),
            following_count: user.following.len(),
            statuses_count: user.posts.len(),
            official: user.official,
            created_at: user.created_at,
        }
    }
}

/// A post joined with its author's public profile; the fan-out payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostView {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub text: String,
    pub author: UserProfile,
    pub in_reply_to_status_id: Option<String>,
    pub in_reply_to_user_id: Option<String>,
    pub favorite_count: usize,
    pub favorited_ids: Vec<String>,
    pub entities: Entities,
}

impl PostView {
    pub fn new(post: &Post, author: &User) -> Self {
        Self {
            id: post.id.clone(),
            created_at: post.created_at,
            text: post.text.clone(),
            author: UserProfile::from(author),
            in_reply_to_status_id: post.in_reply_to_status_id.clone(),
            in_reply_to_user_id: post.in_reply_to_user_id.clone(),
            favorite_count: post.liked_by.len(),
            favorited_ids: post.liked_by.clone(),
            entities: post.entities.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_finds_urls_and_hashtags() {
        let entities = Entities::extract("see https://example.com/a, #rust and #rust! #tokio");
        assert_eq!(entities.urls, vec!["https://example.com/a"]);
        assert_eq!(entities.hashtags, vec!["rust", "tokio"]);
    }

    #[test]
    fn extract_ignores_lone_hash() {
        let entities = Entities::extract("# not a tag");
        assert!(entities.hashtags.is_empty());
        assert!(entities.urls.is_empty());
    }

    #[test]
    fn profile_hides_credentials() {
        let user = User::new("alice", "alice@example.com", "secret-hash".into());
        let json = serde_json::to_string(&UserProfile::from(&user)).unwrap();
        assert!(!json.contains("secret-hash"));
        assert!(!json.contains("alice@example.com"));
        assert!(json.contains("\"screen_name\":\"alice\""));
    }

    #[test]
    fn post_view_counts_likes() {
        let author = User::new("alice", "alice@example.com", "h".into());
        let mut post = Post::new(&author.id, "hello");
        post.liked_by = vec!["u1".into(), "u2".into()];
        let view = PostView::new(&post, &author);
        assert_eq!(view.favorite_count, 2);
        assert_eq!(view.author.screen_name, "alice");
    }

    #[test]
    fn event_kind_round_trips_through_str() {
        for kind in [
            EventKind::Follow,
            EventKind::Unfollow,
            EventKind::Like,
            EventKind::Unlike,
            EventKind::Reply,
        ] {
            assert_eq!(EventKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(EventKind::parse("poke"), None);
    }
}
