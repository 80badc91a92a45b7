use spin_sdk::http::{Request, Response};
use spin_sdk::key_value::Store;
use regex::RegexBuilder;
use crate::models::models::User;
use crate::config::{user_key, USERS_LIST_KEY, MAX_BIO_LENGTH, SEARCH_LIMIT};
use crate::core::helpers::{store, sanitize_text, validate_uuid, redirect};
use crate::core::query_params::{parse_query_params, get_string};
use crate::core::errors::ApiError;
use crate::auth::authenticate;

pub fn build_user_json(user: &User) -> serde_json::Value {
    serde_json::json!({
        "id": user.id,
        "name": user.name,
        "username": user.username,
        "avatar": user.avatar,
    })
}

pub fn load_user_json(store: &Store, user_id: &str) -> anyhow::Result<Option<serde_json::Value>> {
    Ok(store
        .get_json::<User>(&user_key(user_id))?
        .map(|u| build_user_json(&u)))
}

pub fn find_by_username(store: &Store, username: &str) -> anyhow::Result<Option<User>> {
    let users: Vec<String> = store.get_json(USERS_LIST_KEY)?.unwrap_or_default();
    for id in users {
        if let Some(u) = store.get_json::<User>(&user_key(&id))? {
            if u.username == username {
                return Ok(Some(u));
            }
        }
    }
    Ok(None)
}

/// GET /profile
pub fn profile_page(req: Request) -> anyhow::Result<Response> {
    let user_id = match authenticate(&req) {
        Some(uid) => uid,
        None => return Ok(redirect("/signin")),
    };
    crate::templates::render_profile(&user_id)
}

/// POST /profile/update
pub fn update_profile(req: Request) -> anyhow::Result<Response> {
    let user_id = match authenticate(&req) {
        Some(uid) => uid,
        None => return Ok(ApiError::Unauthorized.into()),
    };

    let store = store();
    let mut user = match store.get_json::<User>(&user_key(&user_id))? {
        Some(u) => u,
        None => return Ok(ApiError::NotFound("User not found".to_string()).into()),
    };

    let value: serde_json::Value = serde_json::from_slice(req.body())?;

    if let Some(name) = value["name"].as_str() {
        let sanitized = sanitize_text(name.trim());
        if sanitized.is_empty() {
            return Ok(ApiError::BadRequest("Name is required".to_string()).into());
        }
        user.name = sanitized;
    }

    if let Some(bio) = value["bio"].as_str() {
        if bio.len() > MAX_BIO_LENGTH {
            return Ok(ApiError::BadRequest("Bio too long (max 500 chars)".to_string()).into());
        }
        user.bio = sanitize_text(bio);
    }

    if let Some(location) = value["location"].as_str() {
        // The location widget prefixes its value with a pin marker
        user.location = sanitize_text(location.trim_start_matches("📍 "));
    }

    store.set_json(&user_key(&user_id), &user)?;

    Ok(Response::builder()
        .status(200)
        .header("Content-Type", "application/json")
        .body(serde_json::to_vec(&serde_json::json!({"success": true}))?)
        .build())
}

/// POST /profile/avatar
pub fn update_avatar(req: Request) -> anyhow::Result<Response> {
    set_avatar(req, |value| {
        let avatar = value["avatar"].as_str().unwrap_or_default().trim();
        if avatar.is_empty() {
            None
        } else {
            Some(avatar.to_string())
        }
    })
}

/// POST /profile/avatar/remove
pub fn remove_avatar(req: Request) -> anyhow::Result<Response> {
    set_avatar(req, |_| None)
}

fn set_avatar(
    req: Request,
    pick: impl Fn(&serde_json::Value) -> Option<String>,
) -> anyhow::Result<Response> {
    let user_id = match authenticate(&req) {
        Some(uid) => uid,
        None => return Ok(ApiError::Unauthorized.into()),
    };

    let store = store();
    let mut user = match store.get_json::<User>(&user_key(&user_id))? {
        Some(u) => u,
        None => return Ok(ApiError::NotFound("User not found".to_string()).into()),
    };

    let value: serde_json::Value = if req.body().is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(req.body())?
    };
    user.avatar = pick(&value);
    store.set_json(&user_key(&user_id), &user)?;

    Ok(Response::builder()
        .status(200)
        .header("Content-Type", "application/json")
        .body(serde_json::to_vec(&serde_json::json!({"success": true}))?)
        .build())
}

/// GET /users/:userId/:type where type is "followers" or "following".
/// Public, no session required.
pub fn list_connections(user_id: &str, kind: &str) -> anyhow::Result<Response> {
    if user_id.is_empty() || !validate_uuid(user_id) {
        return Ok(ApiError::BadRequest("Invalid user ID".to_string()).into());
    }
    if kind != "followers" && kind != "following" {
        return Ok(ApiError::BadRequest("Invalid type".to_string()).into());
    }

    let store = store();
    let user = match store.get_json::<User>(&user_key(user_id))? {
        Some(u) => u,
        None => return Ok(ApiError::NotFound("User not found".to_string()).into()),
    };

    let ids = if kind == "followers" { &user.followers } else { &user.following };
    let mut users = Vec::new();
    for id in ids {
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

/// GET /api/search?q=
pub fn search(req: Request) -> anyhow::Result<Response> {
    let user_id = match authenticate(&req) {
        Some(uid) => uid,
        None => return Ok(ApiError::Unauthorized.into()),
    };

    let params = parse_query_params(req.uri());
    let query = get_string(&params, "q", Some(""))
        .unwrap_or_default()
        .trim()
        .to_string();

    if query.is_empty() {
        return Ok(Response::builder()
            .status(200)
            .header("Content-Type", "application/json")
            .body(serde_json::to_vec(&serde_json::json!({"users": []}))?)
            .build());
    }

    let matcher = RegexBuilder::new(&regex::escape(&query))
        .case_insensitive(true)
        .build()?;

    let store = store();
    let ids: Vec<String> = store.get_json(USERS_LIST_KEY)?.unwrap_or_default();
    let mut users = Vec::new();

    for id in ids {
        if id == user_id {
            continue;
        }
        if let Some(u) = store.get_json::<User>(&user_key(&id))? {
            if matcher.is_match(&u.username) || matcher.is_match(&u.name) {
                users.push(serde_json::json!({
                    "id": u.id,
                    "username": u.username,
                    "name": u.name,
                    "avatar": u.avatar,
                    "bio": u.bio,
                }));
                if users.len() == SEARCH_LIMIT {
                    break;
                }
            }
        }
    }

    Ok(Response::builder()
        .status(200)
        .header("Content-Type", "application/json")
        .body(serde_json::to_vec(&serde_json::json!({"users": users}))?)
        .build())
}

/// GET /user/:username
pub fn user_profile_page(req: Request, username: &str) -> anyhow::Result<Response> {
    let viewer_id = match authenticate(&req) {
        Some(uid) => uid,
        None => return Ok(redirect("/signin")),
    };
    crate::templates::render_user_profile(&viewer_id, username)
}
