pub const MIN_USERNAME_LENGTH: usize = 3;
pub const MAX_USERNAME_LENGTH: usize = 50;
pub const MIN_PASSWORD_LENGTH: usize = 3;
pub const MAX_BIO_LENGTH: usize = 500;
pub const MAX_CAPTION_LENGTH: usize = 2000;

pub const FEED_LIMIT: usize = 20;
pub const SUGGESTION_LIMIT: usize = 8;
pub const SEARCH_LIMIT: usize = 10;

pub const USERS_LIST_KEY: &str = "users_list";
pub const POSTS_LIST_KEY: &str = "posts_list";

pub const SESSION_COOKIE: &str = "sid";

pub const DEFAULT_AVATAR_URL: &str =
    "https://images.unsplash.com/photo-1494790108755-2616c9ca8a66?w=150&h=150&fit=crop&crop=face";

pub fn user_key(id: &str) -> String {
    format!("user:{}", id)
}

pub fn post_key(id: &str) -> String {
    format!("post:{}", id)
}

pub fn session_key(sid: &str) -> String {
    format!("session:{}", sid)
}

pub fn session_expiration_days() -> i64 {
    std::env::var("RIPPLE_SESSION_EXPIRATION_DAYS")
        .ok()
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(7)
}

pub fn seed_demo_data() -> bool {
    std::env::var("RIPPLE_SEED_DEMO")
        .map(|v| v == "true" || v == "1")
        .unwrap_or(false)
}
