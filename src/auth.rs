use spin_sdk::http::{Request, Response};
use spin_sdk::key_value::Store;
use uuid::Uuid;
use crate::models::models::{User, SessionData};
use crate::config::{
    user_key, session_key, session_expiration_days, SESSION_COOKIE, USERS_LIST_KEY,
    DEFAULT_AVATAR_URL, MIN_USERNAME_LENGTH, MAX_USERNAME_LENGTH, MIN_PASSWORD_LENGTH,
};
use crate::core::helpers::{store, hash_password, verify_password, now_iso, sanitize_text, redirect};
use crate::core::errors::ApiError;

fn parse_cookie(header: &str, name: &str) -> Option<String> {
    header.split(';').find_map(|pair| {
        let (k, v) = pair.trim().split_once('=')?;
        if k == name && !v.is_empty() {
            Some(v.to_string())
        } else {
            None
        }
    })
}

fn session_id(req: &Request) -> Option<String> {
    let cookies = req.header("Cookie")?.as_str()?;
    parse_cookie(cookies, SESSION_COOKIE)
}

fn session_cookie(sid: &str) -> String {
    let max_age = session_expiration_days() * 24 * 60 * 60;
    format!("{}={}; Path=/; HttpOnly; Max-Age={}", SESSION_COOKIE, sid, max_age)
}

fn expired_cookie() -> String {
    format!("{}=; Path=/; HttpOnly; Max-Age=0", SESSION_COOKIE)
}

fn create_session(store: &Store, user_id: &str) -> anyhow::Result<String> {
    let sid = Uuid::new_v4().to_string();
    let data = SessionData {
        user_id: user_id.to_string(),
        created_at: now_iso(),
    };
    store.set_json(&session_key(&sid), &data)?;
    Ok(sid)
}

/// Resolve the request's session cookie to a user id.
///
/// A session whose user no longer resolves is discarded, so callers can
/// treat `None` uniformly as "not signed in".
pub fn authenticate(req: &Request) -> Option<String> {
    let store = store();
    let sid = session_id(req)?;
    let key = session_key(&sid);
    let data = store.get_json::<SessionData>(&key).ok()??;

    if let Ok(created) = chrono::DateTime::parse_from_rfc3339(&data.created_at) {
        let now = chrono::Utc::now();
        let age_days = (now - created.with_timezone(&chrono::Utc)).num_days();
        if age_days >= session_expiration_days() {
            return None;
        }
    }

    if store.get_json::<User>(&user_key(&data.user_id)).ok()?.is_none() {
        let _ = store.delete(&key);
        return None;
    }

    Some(data.user_id)
}

pub fn sign_up(req: Request) -> anyhow::Result<Response> {
    let store = store();
    let value: serde_json::Value = serde_json::from_slice(req.body())?;

    let name = value["name"].as_str().unwrap_or("").trim();
    let email = value["email"].as_str().unwrap_or("").trim();
    let password = value["password"].as_str().unwrap_or("");
    let username = value["username"].as_str().unwrap_or("").trim();

    if name.is_empty() {
        return Ok(ApiError::BadRequest("Name is required".to_string()).into());
    }
    if email.is_empty() {
        return Ok(ApiError::BadRequest("Email is required".to_string()).into());
    }
    if username.len() < MIN_USERNAME_LENGTH || username.len() > MAX_USERNAME_LENGTH {
        return Ok(ApiError::BadRequest("Username must be 3-50 characters".to_string()).into());
    }
    if password.len() < MIN_PASSWORD_LENGTH {
        return Ok(ApiError::BadRequest("Password must be at least 3 characters".to_string()).into());
    }

    let sanitized_name = sanitize_text(name);
    let sanitized_username = sanitize_text(username);

    // Check duplicate email and username
    let existing_users: Vec<String> = store.get_json(USERS_LIST_KEY)?.unwrap_or_default();
    for id in &existing_users {
        if let Some(u) = store.get_json::<User>(&user_key(id))? {
            if u.email == email {
                return Ok(ApiError::BadRequest("Email already exists".to_string()).into());
            }
            if u.username == sanitized_username {
                return Ok(ApiError::BadRequest("Username already taken".to_string()).into());
            }
        }
    }

    let id = Uuid::new_v4().to_string();
    let user = User {
        id: id.clone(),
        name: sanitized_name,
        email: email.to_string(),
        password: hash_password(password)?,
        username: sanitized_username,
        bio: String::new(),
        location: String::new(),
        avatar: Some(DEFAULT_AVATAR_URL.to_string()),
        followers: Vec::new(),
        following: Vec::new(),
        created_at: now_iso(),
    };

    store.set_json(&user_key(&id), &user)?;

    let mut users = existing_users;
    users.push(id.clone());
    store.set_json(USERS_LIST_KEY, &users)?;

    // Signing up signs the user in
    let sid = create_session(&store, &id)?;

    let resp = serde_json::json!({"success": true, "redirect": "/"});
    Ok(Response::builder()
        .status(200)
        .header("Content-Type", "application/json")
        .header("Set-Cookie", session_cookie(&sid))
        .body(serde_json::to_vec(&resp)?)
        .build())
}

pub fn sign_in(req: Request) -> anyhow::Result<Response> {
    let store = store();
    let creds: serde_json::Value = serde_json::from_slice(req.body())?;
    let email = creds["email"].as_str().unwrap_or_default();
    let password = creds["password"].as_str().unwrap_or_default();

    let users: Vec<String> = store.get_json(USERS_LIST_KEY)?.unwrap_or_default();

    for id in users {
        if let Some(u) = store.get_json::<User>(&user_key(&id))? {
            if u.email != email {
                continue;
            }
            if !verify_password(password, &u.password) {
                break; // Same error as unknown email, nothing leaked
            }

            let sid = create_session(&store, &u.id)?;
            let resp = serde_json::json!({"success": true, "redirect": "/"});
            return Ok(Response::builder()
                .status(200)
                .header("Content-Type", "application/json")
                .header("Set-Cookie", session_cookie(&sid))
                .body(serde_json::to_vec(&resp)?)
                .build());
        }
    }

    Ok(ApiError::BadRequest("Invalid credentials".to_string()).into())
}

pub fn sign_out(req: Request) -> anyhow::Result<Response> {
    let store = store();

    if let Some(sid) = session_id(&req) {
        if store.delete(&session_key(&sid)).is_err() {
            // Best-effort destruction: the cookie may outlive the session doc
            return Ok(ApiError::InternalError("Could not sign out".to_string()).into());
        }
    }

    let resp = serde_json::json!({"success": true, "redirect": "/signin"});
    Ok(Response::builder()
        .status(200)
        .header("Content-Type", "application/json")
        .header("Set-Cookie", expired_cookie())
        .body(serde_json::to_vec(&resp)?)
        .build())
}

/// GET /signin. Already-authenticated users go straight home.
pub fn signin_page(req: Request) -> anyhow::Result<Response> {
    if authenticate(&req).is_some() {
        return Ok(redirect("/"));
    }
    crate::templates::render_signin()
}

#[cfg(test)]
mod tests {
    use super::parse_cookie;

    #[test]
    fn finds_cookie_among_many() {
        assert_eq!(
            parse_cookie("theme=dark; sid=abc-123; lang=en", "sid"),
            Some("abc-123".to_string())
        );
    }

    #[test]
    fn missing_or_empty_cookie_is_none() {
        assert_eq!(parse_cookie("theme=dark", "sid"), None);
        assert_eq!(parse_cookie("sid=", "sid"), None);
        assert_eq!(parse_cookie("", "sid"), None);
    }

    #[test]
    fn name_must_match_exactly() {
        assert_eq!(parse_cookie("xsid=evil", "sid"), None);
        assert_eq!(parse_cookie("sidx=evil", "sid"), None);
    }
}
