use spin_sdk::http::{Request, Response};
use crate::models::models::User;
use crate::config::user_key;
use crate::core::helpers::{store, validate_uuid};
use crate::core::errors::ApiError;
use crate::auth::authenticate;

/// Toggle the follow edge between `current` and `target`, keeping the
/// back-reference in sync. Returns the new "following" state.
///
/// Callers must reject self-follow before getting here; both documents
/// still have to be written back.
pub fn toggle_follow(current: &mut User, target: &mut User) -> bool {
    let is_following = current.following.iter().any(|id| *id == target.id);

    if is_following {
        current.following.retain(|id| *id != target.id);
        target.followers.retain(|id| *id != current.id);
    } else {
        current.following.push(target.id.clone());
        if !target.followers.iter().any(|id| *id == current.id) {
            target.followers.push(current.id.clone());
        }
    }

    !is_following
}

/// POST /users/:id/follow
pub fn handle_follow(req: Request, target_id: &str) -> anyhow::Result<Response> {
    let user_id = match authenticate(&req) {
        Some(uid) => uid,
        None => return Ok(ApiError::Unauthorized.into()),
    };

    if target_id.is_empty() || !validate_uuid(target_id) {
        return Ok(ApiError::BadRequest("Invalid user ID".to_string()).into());
    }
    if target_id == user_id {
        return Ok(ApiError::BadRequest("Cannot follow yourself".to_string()).into());
    }

    let store = store();

    let mut current = match store.get_json::<User>(&user_key(&user_id))? {
        Some(u) => u,
        None => return Ok(ApiError::Unauthorized.into()),
    };
    let mut target = match store.get_json::<User>(&user_key(target_id))? {
        Some(u) => u,
        None => return Ok(ApiError::NotFound("User not found".to_string()).into()),
    };

    let following = toggle_follow(&mut current, &mut target);

    // Two documents, two writes; a failure between them leaves the graph
    // asymmetric and nothing reconciles it later.
    store.set_json(&user_key(&current.id), &current)?;
    store.set_json(&user_key(&target.id), &target)?;

    Ok(Response::builder()
        .status(200)
        .header("Content-Type", "application/json")
        .body(serde_json::to_vec(&serde_json::json!({
            "success": true,
            "following": following
        }))?)
        .build())
}
