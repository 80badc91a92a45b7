use spin_sdk::http::{Request, Response};
use spin_sdk::key_value::Store;
use uuid::Uuid;
use regex::Regex;
use html_escape::encode_double_quoted_attribute;
use ammonia::Builder;
use std::sync::OnceLock;
use crate::models::models::{Post, Comment, Reply};
use crate::config::{post_key, POSTS_LIST_KEY, MAX_CAPTION_LENGTH};
use crate::core::helpers::{store, now_iso, validate_uuid, sanitize_text};
use crate::core::errors::ApiError;
use crate::auth::authenticate;
use crate::users::load_user_json;

fn url_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"https?://[^\s]+").expect("Regex should compile")
    })
}

fn filter_caption(caption: &str) -> String {
    // Sanitize HTML to remove dangerous scripts and event handlers
    let clean = Builder::default()
        .link_rel(Some("noopener noreferrer"))
        .clean(caption)
        .to_string();

    // Convert HTTP/HTTPS URLs into clickable links with proper escaping
    url_regex().replace_all(&clean, |caps: &regex::Captures| {
        let url = &caps[0];
        let escaped_url = encode_double_quoted_attribute(url);
        format!(r#"<a href="{}" target="_blank">{}</a>"#, escaped_url, url)
    }).to_string()
}

/// Toggle `user_id` in the post's like set. Returns the new count and
/// whether the user now likes the post.
pub fn toggle_like(post: &mut Post, user_id: &str) -> (usize, bool) {
    let liked = post.likes.iter().any(|id| id == user_id);

    if liked {
        post.likes.retain(|id| id != user_id);
    } else {
        post.likes.push(user_id.to_string());
    }

    (post.likes.len(), !liked)
}

/// Append a comment with a server-assigned id and timestamp.
/// Returns `None` when the text is empty after trimming.
pub fn append_comment(post: &mut Post, user_id: &str, text: &str) -> Option<Comment> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    let comment = Comment {
        id: Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        text: sanitize_text(trimmed),
        created_at: now_iso(),
        replies: Vec::new(),
    };
    post.comments.push(comment.clone());
    Some(comment)
}

/// Append a reply under an existing comment, same id/timestamp rules.
pub fn append_reply(comment: &mut Comment, user_id: &str, text: &str) -> Option<Reply> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    let reply = Reply {
        id: Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        text: sanitize_text(trimmed),
        created_at: now_iso(),
    };
    comment.replies.push(reply.clone());
    Some(reply)
}

fn load_post(store: &Store, post_id: &str) -> anyhow::Result<Option<Post>> {
    if post_id.is_empty() || !validate_uuid(post_id) {
        return Ok(None);
    }
    store.get_json::<Post>(&post_key(post_id))
}

/// GET /create-post
pub fn create_post_page(req: Request) -> anyhow::Result<Response> {
    let user_id = match authenticate(&req) {
        Some(uid) => uid,
        None => return Ok(crate::core::helpers::redirect("/signin")),
    };
    crate::templates::render_create_post(&user_id)
}

/// POST /create-post
pub fn create_post(req: Request) -> anyhow::Result<Response> {
    let user_id = match authenticate(&req) {
        Some(uid) => uid,
        None => return Ok(ApiError::Unauthorized.into()),
    };

    let store = store();
    let value: serde_json::Value = serde_json::from_slice(req.body())?;
    let caption = value["caption"].as_str().unwrap_or_default().trim();
    let image = value["image"].as_str().unwrap_or_default().trim();

    if caption.is_empty() && image.is_empty() {
        return Ok(ApiError::BadRequest("Post must have caption or image".to_string()).into());
    }
    if caption.len() > MAX_CAPTION_LENGTH {
        return Ok(ApiError::BadRequest("Caption too long".to_string()).into());
    }

    let id = Uuid::new_v4().to_string();
    let post = Post {
        id: id.clone(),
        user_id,
        caption: filter_caption(caption),
        image: if image.is_empty() { None } else { Some(image.to_string()) },
        likes: Vec::new(),
        comments: Vec::new(),
        created_at: now_iso(),
    };

    store.set_json(&post_key(&id), &post)?;

    let mut posts: Vec<String> = store.get_json(POSTS_LIST_KEY)?.unwrap_or_default();
    posts.insert(0, id); // prepend newest
    store.set_json(POSTS_LIST_KEY, &posts)?;

    Ok(Response::builder()
        .status(200)
        .header("Content-Type", "application/json")
        .body(serde_json::to_vec(&serde_json::json!({"success": true}))?)
        .build())
}

/// POST /posts/:id/like
pub fn handle_like(req: Request, post_id: &str) -> anyhow::Result<Response> {
    let user_id = match authenticate(&req) {
        Some(uid) => uid,
        None => return Ok(ApiError::Unauthorized.into()),
    };

    let store = store();
    let mut post = match load_post(&store, post_id)? {
        Some(p) => p,
        None => return Ok(ApiError::NotFound("Post not found".to_string()).into()),
    };

    let (likes, liked) = toggle_like(&mut post, &user_id);
    store.set_json(&post_key(&post.id), &post)?;

    Ok(Response::builder()
        .status(200)
        .header("Content-Type", "application/json")
        .body(serde_json::to_vec(&serde_json::json!({
            "success": true,
            "likes": likes,
            "liked": liked
        }))?)
        .build())
}

/// GET /posts/:id/likes
pub fn get_likes(req: Request, post_id: &str) -> anyhow::Result<Response> {
    if authenticate(&req).is_none() {
        return Ok(ApiError::Unauthorized.into());
    }

    let store = store();
    let post = match load_post(&store, post_id)? {
        Some(p) => p,
        None => return Ok(ApiError::NotFound("Post not found".to_string()).into()),
    };

    let mut users = Vec::new();
    for id in &post.likes {
        if let Some(u) = load_user_json(&store, id)? {
            users.push(u);
        }
    }

    Ok(Response::builder()
        .status(200)
        .header("Content-Type", "application/json")
        .body(serde_json::to_vec(&serde_json::json!({
            "success": true,
            "users": users
        }))?)
        .build())
}

fn comment_json(store: &Store, comment: &Comment) -> anyhow::Result<serde_json::Value> {
    let mut replies = Vec::new();
    for reply in &comment.replies {
        replies.push(serde_json::json!({
            "id": reply.id,
            "text": reply.text,
            "user": load_user_json(store, &reply.user_id)?,
            "createdAt": reply.created_at,
        }));
    }

    Ok(serde_json::json!({
        "id": comment.id,
        "text": comment.text,
        "user": load_user_json(store, &comment.user_id)?,
        "createdAt": comment.created_at,
        "replies": replies,
    }))
}

/// GET /posts/:id/comments
pub fn get_comments(req: Request, post_id: &str) -> anyhow::Result<Response> {
    if authenticate(&req).is_none() {
        return Ok(ApiError::Unauthorized.into());
    }

    let store = store();
    let post = match load_post(&store, post_id)? {
        Some(p) => p,
        None => return Ok(ApiError::NotFound("Post not found".to_string()).into()),
    };

    let mut comments = Vec::new();
    for comment in &post.comments {
        comments.push(comment_json(&store, comment)?);
    }

    Ok(Response::builder()
        .status(200)
        .header("Content-Type", "application/json")
        .body(serde_json::to_vec(&serde_json::json!({
            "success": true,
            "comments": comments
        }))?)
        .build())
}

/// POST /posts/:id/comment
pub fn add_comment(req: Request, post_id: &str) -> anyhow::Result<Response> {
    let user_id = match authenticate(&req) {
        Some(uid) => uid,
        None => return Ok(ApiError::Unauthorized.into()),
    };

    let store = store();
    let value: serde_json::Value = serde_json::from_slice(req.body())?;
    let text = value["text"].as_str().unwrap_or_default();

    let mut post = match load_post(&store, post_id)? {
        Some(p) => p,
        None => return Ok(ApiError::NotFound("Post not found".to_string()).into()),
    };

    let comment = match append_comment(&mut post, &user_id, text) {
        Some(c) => c,
        None => return Ok(ApiError::BadRequest("Comment text is required".to_string()).into()),
    };
    store.set_json(&post_key(&post.id), &post)?;

    Ok(Response::builder()
        .status(200)
        .header("Content-Type", "application/json")
        .body(serde_json::to_vec(&serde_json::json!({
            "success": true,
            "comment": {
                "id": comment.id,
                "text": comment.text,
                "user": load_user_json(&store, &comment.user_id)?,
                "createdAt": comment.created_at,
            },
            "totalComments": post.comments.len()
        }))?)
        .build())
}

/// POST /posts/:postId/comments/:commentId/reply
pub fn add_reply(req: Request, post_id: &str, comment_id: &str) -> anyhow::Result<Response> {
    let user_id = match authenticate(&req) {
        Some(uid) => uid,
        None => return Ok(ApiError::Unauthorized.into()),
    };

    let store = store();
    let value: serde_json::Value = serde_json::from_slice(req.body())?;
    let text = value["text"].as_str().unwrap_or_default();

    let mut post = match load_post(&store, post_id)? {
        Some(p) => p,
        None => return Ok(ApiError::NotFound("Post not found".to_string()).into()),
    };

    let comment = match post.comments.iter_mut().find(|c| c.id == comment_id) {
        Some(c) => c,
        None => return Ok(ApiError::NotFound("Comment not found".to_string()).into()),
    };

    let reply = match append_reply(comment, &user_id, text) {
        Some(r) => r,
        None => return Ok(ApiError::BadRequest("Reply text is required".to_string()).into()),
    };
    store.set_json(&post_key(&post.id), &post)?;

    Ok(Response::builder()
        .status(200)
        .header("Content-Type", "application/json")
        .body(serde_json::to_vec(&serde_json::json!({
            "success": true,
            "reply": {
                "id": reply.id,
                "text": reply.text,
                "user": load_user_json(&store, &reply.user_id)?,
                "createdAt": reply.created_at,
            }
        }))?)
        .build())
}
