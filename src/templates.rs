use spin_sdk::http::Response;
use rust_embed::RustEmbed;
use chrono::Utc;
use crate::models::models::{User, Post};
use crate::config::user_key;
use crate::core::helpers::{store, relative_age};
use crate::core::errors::ApiError;
use crate::feed::{FeedEntry, Suggestion};
use crate::users::find_by_username;

#[derive(RustEmbed)]
#[folder = "static"]
struct Assets;

fn load_template(name: &str) -> anyhow::Result<String> {
    let raw = Assets::get(name)
        .ok_or_else(|| anyhow::anyhow!("Template {} not found", name))?
        .data
        .to_vec();
    Ok(String::from_utf8(raw)?)
}

fn html_response(html: String) -> Response {
    Response::builder()
        .status(200)
        .header("Content-Type", "text/html; charset=utf-8")
        .body(html.into_bytes())
        .build()
}

fn esc(text: &str) -> String {
    html_escape::encode_text(text).to_string()
}

fn avatar_img(avatar: &Option<String>, class: &str) -> String {
    match avatar {
        Some(url) if !url.is_empty() => format!(
            r#"<img class="{}" src="{}" alt="avatar">"#,
            class,
            html_escape::encode_double_quoted_attribute(url)
        ),
        _ => format!(r#"<div class="{} avatar-empty"></div>"#, class),
    }
}

fn feed_post_html(entry: &FeedEntry) -> String {
    let image = entry
        .image
        .as_ref()
        .map(|url| format!(
            r#"<img class="post-image" src="{}" alt="">"#,
            html_escape::encode_double_quoted_attribute(url)
        ))
        .unwrap_or_default();

    format!(
        r#"<article class="post" data-post-id="{id}">
  <header class="post-header">
    {avatar}
    <div>
      <div class="post-author">{name}</div>
      <a class="post-username" href="/user/{username}">@{username}</a>
    </div>
    <span class="post-age">{age}</span>
  </header>
  <div class="post-caption">{caption}</div>
  {image}
  <footer class="post-actions">
    <button class="like-button{liked_class}" data-post-id="{id}">&#9825; <span class="like-count">{likes}</span></button>
    <button class="comment-button" data-post-id="{id}">&#128172; <span class="comment-count">{comments}</span></button>
  </footer>
</article>"#,
        id = esc(&entry.post_id),
        avatar = avatar_img(&entry.author_avatar, "avatar-small"),
        name = esc(&entry.author_name),
        username = esc(&entry.author_username),
        age = esc(&entry.age),
        // captions are sanitized when the post is created
        caption = entry.caption,
        image = image,
        liked_class = if entry.liked { " liked" } else { "" },
        likes = entry.likes_count,
        comments = entry.comments_count,
    )
}

fn suggestion_html(suggestion: &Suggestion) -> String {
    format!(
        r#"<li class="suggestion" data-user-id="{id}">
  {avatar}
  <div class="suggestion-body">
    <a class="suggestion-username" href="/user/{username}">@{username}</a>
    <span class="suggestion-reason">{reason}</span>
  </div>
  <button class="follow-button" data-user-id="{id}">Follow</button>
</li>"#,
        id = esc(&suggestion.user_id),
        avatar = avatar_img(&suggestion.avatar, "avatar-small"),
        username = esc(&suggestion.username),
        reason = esc(suggestion.reason),
    )
}

fn profile_post_html(post: &Post, age: &str, liked: bool) -> String {
    let image = post
        .image
        .as_ref()
        .map(|url| format!(
            r#"<img class="post-image" src="{}" alt="">"#,
            html_escape::encode_double_quoted_attribute(url)
        ))
        .unwrap_or_default();

    format!(
        r#"<article class="post" data-post-id="{id}">
  <span class="post-age">{age}</span>
  <div class="post-caption">{caption}</div>
  {image}
  <footer class="post-actions">
    <button class="like-button{liked_class}" data-post-id="{id}">&#9825; <span class="like-count">{likes}</span></button>
    <button class="comment-button" data-post-id="{id}">&#128172; <span class="comment-count">{comments}</span></button>
  </footer>
</article>"#,
        id = esc(&post.id),
        age = esc(age),
        caption = post.caption,
        image = image,
        liked_class = if liked { " liked" } else { "" },
        likes = post.likes.len(),
        comments = post.comments.len(),
    )
}

pub fn render_signin() -> anyhow::Result<Response> {
    Ok(html_response(load_template("signin.html")?))
}

pub fn render_index(
    viewer: &User,
    feed: &[FeedEntry],
    suggestions: &[Suggestion],
) -> anyhow::Result<Response> {
    let mut html = load_template("index.html")?;

    let feed_html = if feed.is_empty() {
        r#"<p class="feed-empty">Nothing here yet. Follow people to fill your feed.</p>"#.to_string()
    } else {
        feed.iter().map(feed_post_html).collect::<Vec<_>>().join("\n")
    };
    let suggestions_html = suggestions
        .iter()
        .map(suggestion_html)
        .collect::<Vec<_>>()
        .join("\n");

    html = html.replace("USER_NAME", &esc(&viewer.name));
    html = html.replace("USER_USERNAME", &esc(&viewer.username));
    html = html.replace("USER_AVATAR", &avatar_img(&viewer.avatar, "avatar-large"));
    html = html.replace("FEED_POSTS", &feed_html);
    html = html.replace("SUGGESTIONS", &suggestions_html);

    Ok(html_response(html))
}

pub fn render_profile(user_id: &str) -> anyhow::Result<Response> {
    let store = store();
    let user = match store.get_json::<User>(&user_key(user_id))? {
        Some(u) => u,
        None => return Ok(ApiError::NotFound("User not found".to_string()).into()),
    };

    let now = Utc::now();
    let posts_html = own_posts(&store, &user.id)?
        .iter()
        .map(|p| profile_post_html(p, &relative_age(&p.created_at, now), p.likes.iter().any(|id| *id == user.id)))
        .collect::<Vec<_>>()
        .join("\n");

    let mut html = load_template("profile.html")?;
    html = html.replace("PROFILE_NAME", &esc(&user.name));
    html = html.replace("PROFILE_USERNAME", &esc(&user.username));
    html = html.replace("PROFILE_AVATAR", &avatar_img(&user.avatar, "avatar-large"));
    html = html.replace("PROFILE_BIO", &esc(&user.bio));
    html = html.replace("PROFILE_LOCATION", &esc(&user.location));
    html = html.replace("PROFILE_FOLLOWERS", &user.followers.len().to_string());
    html = html.replace("PROFILE_FOLLOWING", &user.following.len().to_string());
    html = html.replace("PROFILE_POSTS", &posts_html);

    Ok(html_response(html))
}

pub fn render_user_profile(viewer_id: &str, username: &str) -> anyhow::Result<Response> {
    let store = store();
    let user = match find_by_username(&store, username)? {
        Some(u) => u,
        None => return Ok(ApiError::NotFound("User not found".to_string()).into()),
    };

    let viewer = match store.get_json::<User>(&user_key(viewer_id))? {
        Some(u) => u,
        None => return Ok(ApiError::Unauthorized.into()),
    };
    let is_following = viewer.following.iter().any(|id| *id == user.id);

    let now = Utc::now();
    let posts_html = own_posts(&store, &user.id)?
        .iter()
        .map(|p| profile_post_html(p, &relative_age(&p.created_at, now), p.likes.iter().any(|id| *id == viewer.id)))
        .collect::<Vec<_>>()
        .join("\n");

    let mut html = load_template("user-profile.html")?;
    html = html.replace("PROFILE_USER_ID", &esc(&user.id));
    html = html.replace("PROFILE_NAME", &esc(&user.name));
    html = html.replace("PROFILE_USERNAME", &esc(&user.username));
    html = html.replace("PROFILE_AVATAR", &avatar_img(&user.avatar, "avatar-large"));
    html = html.replace("PROFILE_BIO", &esc(&user.bio));
    html = html.replace("PROFILE_LOCATION", &esc(&user.location));
    html = html.replace("PROFILE_FOLLOWERS", &user.followers.len().to_string());
    html = html.replace("PROFILE_FOLLOWING", &user.following.len().to_string());
    html = html.replace("FOLLOW_LABEL", if is_following { "Unfollow" } else { "Follow" });
    html = html.replace("PROFILE_POSTS", &posts_html);

    Ok(html_response(html))
}

pub fn render_create_post(user_id: &str) -> anyhow::Result<Response> {
    let store = store();
    let user = match store.get_json::<User>(&user_key(user_id))? {
        Some(u) => u,
        None => return Ok(ApiError::NotFound("User not found".to_string()).into()),
    };

    let mut html = load_template("create-post.html")?;
    html = html.replace("USER_NAME", &esc(&user.name));
    html = html.replace("USER_AVATAR", &avatar_img(&user.avatar, "avatar-large"));

    Ok(html_response(html))
}

fn own_posts(store: &spin_sdk::key_value::Store, user_id: &str) -> anyhow::Result<Vec<Post>> {
    let mut posts: Vec<Post> = crate::feed::load_all_posts(store)?
        .into_iter()
        .filter(|p| p.user_id == user_id)
        .collect();
    posts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(posts)
}
