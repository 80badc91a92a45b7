use spin_sdk::key_value::Store;
use uuid::Uuid;
use crate::config::{user_key, post_key, USERS_LIST_KEY, POSTS_LIST_KEY, DEFAULT_AVATAR_URL};
use crate::models::models::{User, Post, Comment};
use crate::core::helpers::{hash_password, now_iso};

fn demo_user(name: &str, email: &str, username: &str, bio: &str) -> anyhow::Result<User> {
    Ok(User {
        id: Uuid::new_v4().to_string(),
        name: name.to_string(),
        email: email.to_string(),
        password: hash_password(username)?,
        username: username.to_string(),
        bio: bio.to_string(),
        location: String::new(),
        avatar: Some(DEFAULT_AVATAR_URL.to_string()),
        followers: Vec::new(),
        following: Vec::new(),
        created_at: now_iso(),
    })
}

fn demo_post(user_id: &str, caption: &str) -> Post {
    Post {
        id: Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        caption: caption.to_string(),
        image: None,
        likes: Vec::new(),
        comments: Vec::new(),
        created_at: now_iso(),
    }
}

/// Seed a small demo graph: three users, a few posts, one follow edge,
/// one like and one comment. Safe to call on every request.
pub fn init_demo_data(store: &Store) -> anyhow::Result<()> {
    let user_ids: Vec<String> = store.get_json(USERS_LIST_KEY)?.unwrap_or_default();
    for id in &user_ids {
        if let Some(u) = store.get_json::<User>(&user_key(id))? {
            if u.username == "alice" {
                return Ok(()); // Already seeded
            }
        }
    }

    let mut alice = demo_user("Alice Hart", "alice@example.com", "alice", "Hello, I'm Alice!")?;
    let mut bob = demo_user("Bob Reyes", "bob@example.com", "bob", "Bob's corner of the internet")?;
    let carol = demo_user("Carol Nym", "carol@example.com", "carol", "Mostly pictures of bread")?;

    // alice follows bob
    alice.following.push(bob.id.clone());
    bob.followers.push(alice.id.clone());

    let mut bob_post = demo_post(&bob.id, "First post here, hello everyone!");
    bob_post.likes.push(alice.id.clone());
    bob_post.comments.push(Comment {
        id: Uuid::new_v4().to_string(),
        user_id: alice.id.clone(),
        text: "Welcome!".to_string(),
        created_at: now_iso(),
        replies: Vec::new(),
    });
    let carol_post = demo_post(&carol.id, "Sourdough number forty-two.");

    let mut user_ids = user_ids;
    for u in [&alice, &bob, &carol] {
        store.set_json(&user_key(&u.id), u)?;
        user_ids.push(u.id.clone());
    }
    store.set_json(USERS_LIST_KEY, &user_ids)?;

    let mut post_ids: Vec<String> = store.get_json(POSTS_LIST_KEY)?.unwrap_or_default();
    for p in [&bob_post, &carol_post] {
        store.set_json(&post_key(&p.id), p)?;
        post_ids.insert(0, p.id.clone());
    }
    store.set_json(POSTS_LIST_KEY, &post_ids)?;

    Ok(())
}
