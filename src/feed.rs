use spin_sdk::http::{Request, Response};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use crate::models::models::{User, Post};
use crate::config::{user_key, post_key, USERS_LIST_KEY, POSTS_LIST_KEY, FEED_LIMIT, SUGGESTION_LIMIT};
use crate::core::helpers::{store, relative_age, redirect};
use crate::auth::authenticate;

/// A post prepared for the home feed: viewer-relative state plus the
/// author's display data.
pub struct FeedEntry {
    pub post_id: String,
    pub author_name: String,
    pub author_username: String,
    pub author_avatar: Option<String>,
    pub caption: String,
    pub image: Option<String>,
    pub likes_count: usize,
    pub comments_count: usize,
    pub liked: bool,
    pub age: String,
}

/// A candidate user to follow, with the reason it was picked.
pub struct Suggestion {
    pub user_id: String,
    pub username: String,
    pub name: String,
    pub avatar: Option<String>,
    pub reason: &'static str,
}

/// Select and annotate the viewer's home feed: posts authored by followed
/// users, newest first, capped at FEED_LIMIT.
///
/// A viewer who follows nobody gets an empty feed; there is no fallback to
/// global posts. Posts whose author document is missing are skipped.
pub fn compose_feed(
    viewer: &User,
    posts: &[Post],
    users: &[User],
    now: DateTime<Utc>,
) -> Vec<FeedEntry> {
    let by_id: HashMap<&str, &User> = users.iter().map(|u| (u.id.as_str(), u)).collect();
    let following: HashSet<&str> = viewer.following.iter().map(|id| id.as_str()).collect();

    let mut visible: Vec<&Post> = posts
        .iter()
        .filter(|p| following.contains(p.user_id.as_str()))
        .collect();

    // RFC 3339 UTC strings sort chronologically
    visible.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    visible
        .into_iter()
        .take(FEED_LIMIT)
        .filter_map(|post| {
            let author = by_id.get(post.user_id.as_str())?;
            Some(FeedEntry {
                post_id: post.id.clone(),
                author_name: author.name.clone(),
                author_username: author.username.clone(),
                author_avatar: author.avatar.clone(),
                caption: post.caption.clone(),
                image: post.image.clone(),
                likes_count: post.likes.len(),
                comments_count: post.comments.len(),
                liked: post.likes.iter().any(|id| *id == viewer.id),
                age: relative_age(&post.created_at, now),
            })
        })
        .collect()
}

/// Propose up to SUGGESTION_LIMIT users to follow.
///
/// Sources in priority order, deduplicated as they are unioned (the
/// first-seen justification wins), always excluding the viewer and anyone
/// already followed:
/// 1. users who follow the viewer and are not followed back ("Follows you"),
/// 2. users followed by someone the viewer follows, who do not already
///    follow the viewer ("Suggested for you"),
/// 3. users who follow someone the viewer follows ("Suggested for you").
///
/// A viewer who follows nobody gets no suggestions; the popularity
/// fallback of earlier revisions is intentionally gone.
pub fn suggest_users(viewer: &User, users: &[User]) -> Vec<Suggestion> {
    if viewer.following.is_empty() {
        return Vec::new();
    }

    let by_id: HashMap<&str, &User> = users.iter().map(|u| (u.id.as_str(), u)).collect();
    let mut seen: HashSet<String> = viewer.following.iter().cloned().collect();
    seen.insert(viewer.id.clone());

    let mut picked: Vec<Suggestion> = Vec::new();

    // 1. followers the viewer has not followed back
    for id in &viewer.followers {
        pick(&by_id, &mut seen, &mut picked, id, "Follows you");
    }

    // 2. second-degree: followed by someone the viewer follows, and not
    //    already following the viewer
    for followed_id in &viewer.following {
        if let Some(followed) = by_id.get(followed_id.as_str()) {
            for candidate_id in &followed.following {
                if viewer.followers.iter().any(|id| id == candidate_id) {
                    continue;
                }
                pick(&by_id, &mut seen, &mut picked, candidate_id, "Suggested for you");
            }
        }
    }

    // 3. shared interest: follows someone the viewer follows
    for candidate in users {
        let shares = candidate
            .following
            .iter()
            .any(|id| viewer.following.iter().any(|f| f == id));
        if shares {
            pick(&by_id, &mut seen, &mut picked, &candidate.id, "Suggested for you");
        }
    }

    picked.truncate(SUGGESTION_LIMIT);
    picked
}

fn pick(
    by_id: &HashMap<&str, &User>,
    seen: &mut HashSet<String>,
    picked: &mut Vec<Suggestion>,
    candidate_id: &str,
    reason: &'static str,
) {
    if let Some(candidate) = by_id.get(candidate_id) {
        if seen.insert(candidate.id.clone()) {
            picked.push(Suggestion {
                user_id: candidate.id.clone(),
                username: candidate.username.clone(),
                name: candidate.name.clone(),
                avatar: candidate.avatar.clone(),
                reason,
            });
        }
    }
}

pub(crate) fn load_all_users(store: &spin_sdk::key_value::Store) -> anyhow::Result<Vec<User>> {
    let ids: Vec<String> = store.get_json(USERS_LIST_KEY)?.unwrap_or_default();
    let mut users = Vec::new();
    for id in ids {
        if let Some(u) = store.get_json::<User>(&user_key(&id))? {
            users.push(u);
        }
    }
    Ok(users)
}

pub(crate) fn load_all_posts(store: &spin_sdk::key_value::Store) -> anyhow::Result<Vec<Post>> {
    let ids: Vec<String> = store.get_json(POSTS_LIST_KEY)?.unwrap_or_default();
    let mut posts = Vec::new();
    for id in ids {
        if let Some(p) = store.get_json::<Post>(&post_key(&id))? {
            posts.push(p);
        }
    }
    Ok(posts)
}

/// GET /, the home feed with suggestions.
pub fn handle_home(req: Request) -> anyhow::Result<Response> {
    let user_id = match authenticate(&req) {
        Some(uid) => uid,
        None => return Ok(redirect("/signin")),
    };

    let store = store();
    let viewer = match store.get_json::<User>(&user_key(&user_id))? {
        // Session pointing at a vanished user is an auth failure, not a feed error
        Some(u) => u,
        None => return Ok(redirect("/signin")),
    };

    let users = load_all_users(&store)?;
    let posts = load_all_posts(&store)?;

    let feed = compose_feed(&viewer, &posts, &users, Utc::now());
    let suggestions = suggest_users(&viewer, &users);

    crate::templates::render_index(&viewer, &feed, &suggestions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn user(id: &str) -> User {
        User {
            id: id.to_string(),
            name: format!("User {}", id),
            email: format!("{}@example.com", id),
            password: String::new(),
            username: id.to_string(),
            bio: String::new(),
            location: String::new(),
            avatar: None,
            followers: Vec::new(),
            following: Vec::new(),
            created_at: String::new(),
        }
    }

    fn follow(a: &mut User, b: &mut User) {
        a.following.push(b.id.clone());
        b.followers.push(a.id.clone());
    }

    fn post(id: &str, author: &str, minutes_ago: i64, now: DateTime<Utc>) -> Post {
        Post {
            id: id.to_string(),
            user_id: author.to_string(),
            caption: format!("post {}", id),
            image: None,
            likes: Vec::new(),
            comments: Vec::new(),
            created_at: (now - Duration::minutes(minutes_ago)).to_rfc3339(),
        }
    }

    #[test]
    fn feed_is_empty_when_following_nobody() {
        let now = Utc::now();
        let viewer = user("v");
        let author = user("a");
        let posts = vec![post("p1", "a", 5, now)];

        let feed = compose_feed(&viewer, &posts, &[viewer.clone(), author], now);
        assert!(feed.is_empty());
    }

    #[test]
    fn feed_shows_only_followed_authors_newest_first() {
        let now = Utc::now();
        let mut viewer = user("v");
        let mut a = user("a");
        let b = user("b");
        follow(&mut viewer, &mut a);

        let posts = vec![
            post("old", "a", 120, now),
            post("other", "b", 1, now),
            post("fresh", "a", 3, now),
            post("mine", "v", 2, now),
        ];

        let feed = compose_feed(&viewer, &posts, &[viewer.clone(), a, b], now);
        let ids: Vec<&str> = feed.iter().map(|e| e.post_id.as_str()).collect();
        assert_eq!(ids, vec!["fresh", "old"]);
        assert_eq!(feed[0].age, "3m");
        assert_eq!(feed[1].age, "2h");
    }

    #[test]
    fn feed_is_capped_at_twenty() {
        let now = Utc::now();
        let mut viewer = user("v");
        let mut a = user("a");
        follow(&mut viewer, &mut a);

        let posts: Vec<Post> = (0..30)
            .map(|i| post(&format!("p{}", i), "a", i, now))
            .collect();

        let feed = compose_feed(&viewer, &posts, &[viewer.clone(), a], now);
        assert_eq!(feed.len(), 20);
        // newest of the batch comes first
        assert_eq!(feed[0].post_id, "p0");
    }

    #[test]
    fn feed_annotates_viewer_relative_state() {
        let now = Utc::now();
        let mut viewer = user("v");
        let mut a = user("a");
        follow(&mut viewer, &mut a);

        let mut p = post("p1", "a", 5, now);
        p.likes = vec!["v".to_string(), "x".to_string()];
        p.comments.push(crate::models::models::Comment {
            id: "c1".to_string(),
            user_id: "x".to_string(),
            text: "hi".to_string(),
            created_at: now.to_rfc3339(),
            replies: Vec::new(),
        });

        let feed = compose_feed(&viewer, &[p], &[viewer.clone(), a], now);
        assert_eq!(feed.len(), 1);
        assert!(feed[0].liked);
        assert_eq!(feed[0].likes_count, 2);
        assert_eq!(feed[0].comments_count, 1);
        assert_eq!(feed[0].author_username, "a");
    }

    #[test]
    fn no_suggestions_when_following_nobody() {
        let mut viewer = user("v");
        let mut fan = user("fan");
        follow(&mut fan, &mut viewer); // fan follows viewer

        let out = suggest_users(&viewer, &[viewer.clone(), fan]);
        assert!(out.is_empty());
    }

    #[test]
    fn suggestions_exclude_self_and_already_followed() {
        let mut viewer = user("v");
        let mut a = user("a");
        let mut b = user("b");
        follow(&mut viewer, &mut a);
        follow(&mut a, &mut b); // b is a second-degree candidate

        let users = vec![viewer.clone(), a, b];
        let out = suggest_users(&viewer, &users);

        assert!(out.iter().all(|s| s.user_id != "v"));
        assert!(out.iter().all(|s| s.user_id != "a"));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].user_id, "b");
        assert_eq!(out[0].reason, "Suggested for you");
    }

    #[test]
    fn followers_come_first_with_their_own_reason() {
        let mut viewer = user("v");
        let mut a = user("a");
        let mut fan = user("fan");
        let mut second = user("second");
        follow(&mut viewer, &mut a);
        follow(&mut fan, &mut viewer);
        follow(&mut a, &mut second);

        let users = vec![viewer.clone(), a, fan, second];
        let out = suggest_users(&viewer, &users);

        assert_eq!(out[0].user_id, "fan");
        assert_eq!(out[0].reason, "Follows you");
        assert_eq!(out[1].user_id, "second");
        assert_eq!(out[1].reason, "Suggested for you");
    }

    #[test]
    fn first_seen_justification_wins() {
        // fan follows the viewer AND someone the viewer follows, so it
        // qualifies for sources 1 and 3; it must appear once, as source 1.
        let mut viewer = user("v");
        let mut a = user("a");
        let mut fan = user("fan");
        follow(&mut viewer, &mut a);
        follow(&mut fan, &mut viewer);
        follow(&mut fan, &mut a);

        let users = vec![viewer.clone(), a, fan];
        let out = suggest_users(&viewer, &users);

        let fan_entries: Vec<_> = out.iter().filter(|s| s.user_id == "fan").collect();
        assert_eq!(fan_entries.len(), 1);
        assert_eq!(fan_entries[0].reason, "Follows you");
    }

    #[test]
    fn second_degree_skips_users_who_already_follow_viewer() {
        // "a" is followed by the viewer; "fan" is followed by "a" but also
        // follows the viewer, so source 2 must not claim it. It still
        // arrives via source 1.
        let mut viewer = user("v");
        let mut a = user("a");
        let mut fan = user("fan");
        follow(&mut viewer, &mut a);
        follow(&mut fan, &mut viewer);
        follow(&mut a, &mut fan);

        let users = vec![viewer.clone(), a, fan];
        let out = suggest_users(&viewer, &users);

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].user_id, "fan");
        assert_eq!(out[0].reason, "Follows you");
    }

    #[test]
    fn shared_interest_source_fills_in_peers() {
        // peer follows "a" just like the viewer does; nobody follows peer
        let mut viewer = user("v");
        let mut a = user("a");
        let mut peer = user("peer");
        follow(&mut viewer, &mut a);
        follow(&mut peer, &mut a);

        let users = vec![viewer.clone(), a, peer];
        let out = suggest_users(&viewer, &users);

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].user_id, "peer");
        assert_eq!(out[0].reason, "Suggested for you");
    }

    #[test]
    fn suggestions_are_capped_at_eight() {
        let mut viewer = user("v");
        let mut hub = user("hub");
        follow(&mut viewer, &mut hub);

        let mut users = vec![viewer.clone()];
        // a dozen fans of the hub, all shared-interest candidates
        let mut hub_followers = Vec::new();
        for i in 0..12 {
            let mut fan = user(&format!("fan{}", i));
            follow(&mut fan, &mut hub);
            hub_followers.push(fan);
        }
        users.push(hub);
        users.extend(hub_followers);

        let out = suggest_users(&viewer, &users);
        assert_eq!(out.len(), 8);
    }
}
