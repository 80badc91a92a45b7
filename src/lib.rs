pub mod config;
pub mod models;
pub mod core;
pub mod auth;
pub mod users;
pub mod follow;
pub mod posts;
pub mod feed;
pub mod templates;
pub mod static_server;

use spin_sdk::http::{Request, Response};
use crate::core::errors::ApiError;

/// Route a request to its handler. Shared by the spin component entrypoint
/// and the native adapter binary.
///
/// Expected failures come back as typed responses from the handlers;
/// anything that escapes via `?` is logged here and turned into a generic
/// 500 so one bad request never leaks internals or affects another.
pub fn route(req: Request) -> Response {
    if config::seed_demo_data() {
        if let Err(err) = core::db::init_demo_data(&core::helpers::store()) {
            tracing::error!(error = %err, "demo seed failed");
        }
    }

    let method = req.method().to_string();
    let path = req.path().to_string();

    match dispatch(req, &method, &path) {
        Ok(resp) => resp,
        Err(err) => {
            tracing::error!(%method, %path, error = %err, "request failed");
            ApiError::InternalError("Server error".to_string()).into()
        }
    }
}

fn dispatch(req: Request, method: &str, path: &str) -> anyhow::Result<Response> {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    match (method, segments.as_slice()) {
        ("GET", []) => feed::handle_home(req),

        ("GET", ["signin"]) => auth::signin_page(req),
        ("POST", ["signin"]) => auth::sign_in(req),
        ("POST", ["signup"]) => auth::sign_up(req),
        ("POST", ["signout"]) => auth::sign_out(req),

        ("GET", ["profile"]) => users::profile_page(req),
        ("POST", ["profile", "update"]) => users::update_profile(req),
        ("POST", ["profile", "avatar"]) => users::update_avatar(req),
        ("POST", ["profile", "avatar", "remove"]) => users::remove_avatar(req),

        ("GET", ["create-post"]) => posts::create_post_page(req),
        ("POST", ["create-post"]) => posts::create_post(req),

        ("POST", ["posts", id, "like"]) => posts::handle_like(req, id),
        ("GET", ["posts", id, "likes"]) => posts::get_likes(req, id),
        ("GET", ["posts", id, "comments"]) => posts::get_comments(req, id),
        ("POST", ["posts", id, "comment"]) => posts::add_comment(req, id),
        ("POST", ["posts", post_id, "comments", comment_id, "reply"]) => {
            posts::add_reply(req, post_id, comment_id)
        }

        ("POST", ["users", id, "follow"]) => follow::handle_follow(req, id),
        ("GET", ["users", user_id, kind]) => users::list_connections(user_id, kind),
        ("GET", ["user", username]) => users::user_profile_page(req, username),

        ("GET", ["api", "search"]) => users::search(req),

        ("GET", _) => static_server::serve_static(path),
        _ => Ok(ApiError::NotFound("Page not found".to_string()).into()),
    }
}

#[cfg(target_arch = "wasm32")]
mod component {
    use spin_sdk::http::{IntoResponse, Request};
    use spin_sdk::http_component;

    #[http_component]
    fn handle(req: Request) -> anyhow::Result<impl IntoResponse> {
        Ok(crate::route(req))
    }
}
