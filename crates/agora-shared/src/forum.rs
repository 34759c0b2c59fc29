//! Forum data transfer objects.
//!
//! Unlike the chat payloads, the forum endpoints use snake_case keys, so
//! these structs serialize as-is.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::UserId;

/// A forum category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub category_id: i64,
    pub name: String,
    pub description: String,
}

/// One post as returned by the post listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub post_id: i64,
    pub user_id: UserId,
    pub title: String,
    pub content: String,
    /// Empty when the post carries no image.
    #[serde(default)]
    pub image_url: String,
    /// Creation time in the backend's own storage format, passed through
    /// verbatim.
    pub created_at: String,
    pub username: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    /// Comma-joined category names.
    #[serde(default)]
    pub categories: String,
    #[serde(default)]
    pub like_count: i64,
    #[serde(default)]
    pub comment_count: i64,
}

/// Payload for creating a post. Categories are referenced by id.
#[derive(Debug, Clone)]
pub struct NewPost {
    pub title: String,
    pub content: String,
    pub categories: Vec<i64>,
}

/// Filters accepted by the post listing.
#[derive(Debug, Clone, Default)]
pub struct PostFilter {
    /// Restrict to posts in the category with this name.
    pub category: Option<String>,
    /// Only posts authored by the current user.
    pub mine_only: bool,
    /// Only posts the current user liked.
    pub liked_only: bool,
}

/// A comment on a post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub comment_id: i64,
    pub post_id: i64,
    pub user_id: UserId,
    pub content: String,
    pub created_at: DateTime<Utc>,
    /// Username of the comment author.
    pub author: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub likes: i64,
    #[serde(default)]
    pub dislikes: i64,
    /// The requesting user's own reaction: "like", "dislike", or empty.
    #[serde(default)]
    pub user_reaction: String,
}

/// A like or dislike on a post or comment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReactionKind {
    Like,
    Dislike,
}

impl ReactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Like => "like",
            Self::Dislike => "dislike",
        }
    }
}

/// Updated tallies returned after toggling a reaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReactionTally {
    pub success: bool,
    pub likes: i64,
    pub dislikes: i64,
    /// The caller's reaction after the toggle, empty when it was cleared.
    #[serde(rename = "userReaction", default)]
    pub user_reaction: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_post_tolerates_sparse_rows() {
        let json = serde_json::json!({
            "post_id": 3,
            "user_id": 2,
            "title": "Welcome",
            "content": "First post",
            "created_at": "2025-05-30 09:12:44",
            "username": "admin"
        });

        let post: Post = serde_json::from_value(json).unwrap();
        assert_eq!(post.post_id, 3);
        assert_eq!(post.image_url, "");
        assert_eq!(post.categories, "");
        assert_eq!(post.like_count, 0);
    }

    #[test]
    fn test_reaction_tally_key_names() {
        let json = serde_json::json!({
            "success": true,
            "likes": 4,
            "dislikes": 1,
            "userReaction": "like"
        });

        let tally: ReactionTally = serde_json::from_value(json).unwrap();
        assert_eq!(tally.likes, 4);
        assert_eq!(tally.user_reaction, "like");
    }
}
