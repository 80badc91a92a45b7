//! End-to-end flows against a running server (`spin up` or the native
//! binary) on BASE_URL. Ignored by default, run with `cargo test -- --ignored`.

use serde_json::json;
use std::sync::Mutex;

const BASE_URL: &str = "http://127.0.0.1:3000";
static TEST_LOCK: Mutex<()> = Mutex::new(());

fn lock_test() -> std::sync::MutexGuard<'static, ()> {
    TEST_LOCK.lock().unwrap()
}

fn sid_from(resp: &reqwest::Response) -> String {
    let cookie = resp
        .headers()
        .get("set-cookie")
        .expect("Set-Cookie missing")
        .to_str()
        .unwrap();
    cookie
        .split(';')
        .next()
        .unwrap()
        .to_string()
}

struct TestUser {
    cookie: String,
    username: String,
}

async fn sign_up(client: &reqwest::Client, tag: &str) -> TestUser {
    let username = format!("{}_{}", tag, &uuid::Uuid::new_v4().to_string()[0..8]);
    let resp = client
        .post(format!("{}/signup", BASE_URL))
        .json(&json!({
            "name": format!("Test {}", tag),
            "email": format!("{}@example.com", username),
            "password": "password",
            "username": username,
        }))
        .send()
        .await
        .expect("Failed to sign up");

    assert_eq!(resp.status(), 200);
    let cookie = sid_from(&resp);
    let body = resp.json::<serde_json::Value>().await.unwrap();
    assert_eq!(body["success"], true);

    TestUser { cookie, username }
}

async fn user_id_of(client: &reqwest::Client, viewer: &TestUser, username: &str) -> String {
    let resp = client
        .get(format!("{}/api/search?q={}", BASE_URL, username))
        .header("Cookie", &viewer.cookie)
        .send()
        .await
        .expect("Failed to search");
    assert_eq!(resp.status(), 200);

    let body = resp.json::<serde_json::Value>().await.unwrap();
    body["users"]
        .as_array()
        .unwrap()
        .iter()
        .find(|u| u["username"] == username)
        .expect("User not found in search results")["id"]
        .as_str()
        .unwrap()
        .to_string()
}

#[ignore]
#[tokio::test]
async fn test_follow_feed_like_comment_flow() {
    let _lock = lock_test();
    let client = reqwest::Client::new();

    let author = sign_up(&client, "author").await;
    let reader = sign_up(&client, "reader").await;

    // Author posts
    let caption = format!("integration caption {}", uuid::Uuid::new_v4());
    let resp = client
        .post(format!("{}/create-post", BASE_URL))
        .header("Cookie", &author.cookie)
        .json(&json!({"caption": caption}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    // Reader's feed is empty before following anyone
    let home = client
        .get(format!("{}/", BASE_URL))
        .header("Cookie", &reader.cookie)
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(!home.contains(&caption));

    // Reader follows author
    let author_id = user_id_of(&client, &reader, &author.username).await;
    let resp = client
        .post(format!("{}/users/{}/follow", BASE_URL, author_id))
        .header("Cookie", &reader.cookie)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body = resp.json::<serde_json::Value>().await.unwrap();
    assert_eq!(body["following"], true);

    // Follower listing shows the new edge
    let resp = client
        .get(format!("{}/users/{}/followers", BASE_URL, author_id))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body = resp.json::<serde_json::Value>().await.unwrap();
    assert!(body["users"]
        .as_array()
        .unwrap()
        .iter()
        .any(|u| u["username"] == reader.username));

    // Now the post shows up in the reader's feed
    let home = client
        .get(format!("{}/", BASE_URL))
        .header("Cookie", &reader.cookie)
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(home.contains(&caption), "feed should contain the followed author's post");

    // Find the post id through the author's profile page markup
    let post_id = home
        .split("data-post-id=\"")
        .nth(1)
        .and_then(|rest| rest.split('"').next())
        .expect("post id missing from feed markup")
        .to_string();

    // Like toggles on, then off
    for (expected_liked, expected_likes) in [(true, 1), (false, 0)] {
        let resp = client
            .post(format!("{}/posts/{}/like", BASE_URL, post_id))
            .header("Cookie", &reader.cookie)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let body = resp.json::<serde_json::Value>().await.unwrap();
        assert_eq!(body["liked"], expected_liked);
        assert_eq!(body["likes"], expected_likes);
    }

    // Comment, then reply to it
    let resp = client
        .post(format!("{}/posts/{}/comment", BASE_URL, post_id))
        .header("Cookie", &reader.cookie)
        .json(&json!({"text": "great shot"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body = resp.json::<serde_json::Value>().await.unwrap();
    assert_eq!(body["totalComments"], 1);
    let comment_id = body["comment"]["id"].as_str().unwrap().to_string();

    let resp = client
        .post(format!("{}/posts/{}/comments/{}/reply", BASE_URL, post_id, comment_id))
        .header("Cookie", &author.cookie)
        .json(&json!({"text": "thanks!"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body = resp.json::<serde_json::Value>().await.unwrap();
    assert_eq!(body["reply"]["text"], "thanks!");

    // Comments listing returns both, in order
    let resp = client
        .get(format!("{}/posts/{}/comments", BASE_URL, post_id))
        .header("Cookie", &reader.cookie)
        .send()
        .await
        .unwrap();
    let body = resp.json::<serde_json::Value>().await.unwrap();
    let comments = body["comments"].as_array().unwrap();
    assert_eq!(comments.len(), 1);
    assert_eq!(comments[0]["replies"][0]["text"], "thanks!");
}

#[ignore]
#[tokio::test]
async fn test_duplicate_signup_is_rejected() {
    let _lock = lock_test();
    let client = reqwest::Client::new();

    let user = sign_up(&client, "dup").await;

    // Same email again
    let resp = client
        .post(format!("{}/signup", BASE_URL))
        .json(&json!({
            "name": "Someone Else",
            "email": format!("{}@example.com", user.username),
            "password": "password",
            "username": format!("other_{}", &uuid::Uuid::new_v4().to_string()[0..8]),
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body = resp.json::<serde_json::Value>().await.unwrap();
    assert_eq!(body["error"], "Email already exists");

    // Same username, different email
    let resp = client
        .post(format!("{}/signup", BASE_URL))
        .json(&json!({
            "name": "Someone Else",
            "email": format!("{}@elsewhere.example.com", uuid::Uuid::new_v4()),
            "password": "password",
            "username": user.username,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body = resp.json::<serde_json::Value>().await.unwrap();
    assert_eq!(body["error"], "Username already taken");
}

#[ignore]
#[tokio::test]
async fn test_self_follow_is_rejected() {
    let _lock = lock_test();
    let client = reqwest::Client::new();

    let user = sign_up(&client, "selfie").await;
    let helper = sign_up(&client, "helper").await;
    let user_id = user_id_of(&client, &helper, &user.username).await;

    let resp = client
        .post(format!("{}/users/{}/follow", BASE_URL, user_id))
        .header("Cookie", &user.cookie)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body = resp.json::<serde_json::Value>().await.unwrap();
    assert_eq!(body["error"], "Cannot follow yourself");
}

#[ignore]
#[tokio::test]
async fn test_blank_comment_and_post_are_rejected() {
    let _lock = lock_test();
    let client = reqwest::Client::new();

    let user = sign_up(&client, "blank").await;

    let resp = client
        .post(format!("{}/create-post", BASE_URL))
        .header("Cookie", &user.cookie)
        .json(&json!({"caption": "", "image": ""}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body = resp.json::<serde_json::Value>().await.unwrap();
    assert_eq!(body["error"], "Post must have caption or image");

    // A post to hang the comment attempt off
    let resp = client
        .post(format!("{}/create-post", BASE_URL))
        .header("Cookie", &user.cookie)
        .json(&json!({"caption": "has content"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let profile = client
        .get(format!("{}/profile", BASE_URL))
        .header("Cookie", &user.cookie)
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    let post_id = profile
        .split("data-post-id=\"")
        .nth(1)
        .and_then(|rest| rest.split('"').next())
        .expect("post id missing from profile markup")
        .to_string();

    let resp = client
        .post(format!("{}/posts/{}/comment", BASE_URL, post_id))
        .header("Cookie", &user.cookie)
        .json(&json!({"text": "   "}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body = resp.json::<serde_json::Value>().await.unwrap();
    assert_eq!(body["error"], "Comment text is required");
}

#[ignore]
#[tokio::test]
async fn test_unauthenticated_requests_are_turned_away() {
    let _lock = lock_test();
    let client = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap();

    // Browser route redirects to sign-in
    let resp = client.get(format!("{}/", BASE_URL)).send().await.unwrap();
    assert_eq!(resp.status(), 302);
    assert_eq!(resp.headers().get("location").unwrap(), "/signin");

    // API route answers with an auth error
    let resp = client
        .post(format!("{}/create-post", BASE_URL))
        .json(&json!({"caption": "nope"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
}
