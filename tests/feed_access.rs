//! Integration tests for the feed endpoint's access control and for the
//! ownership rules of feed management.

use pretty_assertions::assert_eq;
use reqwest::StatusCode;
use serde_json::json;
use vk2rss::app::{App, FeedForm, ManageError, ValidationError, RSS_CONTENT_TYPE};
use vk2rss::config::Config;
use vk2rss::storage::{Database, User};
use wiremock::matchers::path;
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn setup() -> (MockServer, App) {
    let server = MockServer::start().await;
    Mock::given(path("/groups.getById"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "response": [{ "id": 1, "name": "Team", "screen_name": "team" }]
        })))
        .mount(&server)
        .await;
    Mock::given(path("/wall.get"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "response": {
                "count": 1,
                "items": [{ "id": 10, "owner_id": -1, "date": 1_700_000_000, "text": "news" }]
            }
        })))
        .mount(&server)
        .await;

    let mut config = Config::default();
    config.vk_api_base_url = server.uri();
    config.translation.enabled = false;

    let db = Database::open(":memory:").await.unwrap();
    let app = App::with_http_client(config, db, reqwest::Client::new());
    (server, app)
}

async fn user(app: &App, name: &str) -> User {
    app.db().ensure_user(name).await.unwrap()
}

fn form(title: &str, is_public: bool) -> FeedForm {
    FeedForm {
        title: title.to_string(),
        source_id: "-1".to_string(),
        is_public,
        ..Default::default()
    }
}

// ============================================================================
// Feed endpoint
// ============================================================================

#[tokio::test]
async fn test_private_feed_requires_exact_token() {
    let (_server, app) = setup().await;
    let alice = user(&app, "alice").await;
    let feed = app.add_feed(&alice, &form("Team news", false)).await.unwrap();

    let ok = app.serve_feed(feed.id, Some(&feed.access_token)).await;
    assert_eq!(ok.status, StatusCode::OK);
    assert_eq!(ok.content_type, RSS_CONTENT_TYPE);
    assert!(ok.body.contains("<guid isPermaLink=\"false\">vk-post--1_10</guid>"));

    let mut wrong = feed.access_token.clone();
    wrong.pop();
    wrong.push('x');
    for token in [Some(wrong.as_str()), Some(""), None] {
        let denied = app.serve_feed(feed.id, token).await;
        assert_eq!(denied.status, StatusCode::FORBIDDEN);
        assert_eq!(denied.body, "");
    }
}

#[tokio::test]
async fn test_unknown_feed_is_not_found() {
    let (_server, app) = setup().await;
    let response = app.serve_feed(404, Some("anything")).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.body, "");
}

#[tokio::test]
async fn test_public_feed_served_without_token() {
    let (_server, app) = setup().await;
    let alice = user(&app, "alice").await;
    let feed = app.add_feed(&alice, &form("Open", true)).await.unwrap();

    let response = app.serve_feed(feed.id, None).await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body.starts_with("<?xml"));
}

#[tokio::test]
async fn test_tokens_are_unique_per_feed() {
    let (_server, app) = setup().await;
    let alice = user(&app, "alice").await;
    let a = app.add_feed(&alice, &form("A", false)).await.unwrap();
    let b = app.add_feed(&alice, &form("B", false)).await.unwrap();

    assert_ne!(a.access_token, b.access_token);
    assert_eq!(a.access_token.len(), 32);

    let crossed = app.serve_feed(a.id, Some(&b.access_token)).await;
    assert_eq!(crossed.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_feed_url_carries_token() {
    let (_server, app) = setup().await;
    let alice = user(&app, "alice").await;
    let feed = app.add_feed(&alice, &form("A", false)).await.unwrap();

    assert_eq!(
        app.feed_url(&feed),
        format!(
            "http://localhost:5000/feeds/{}.rss?token={}",
            feed.id, feed.access_token
        )
    );
}

// ============================================================================
// Management
// ============================================================================

#[tokio::test]
async fn test_other_users_cannot_touch_feed() {
    let (_server, app) = setup().await;
    let alice = user(&app, "alice").await;
    let mallory = user(&app, "mallory").await;
    let feed = app.add_feed(&alice, &form("Mine", false)).await.unwrap();

    let edit = app.edit_feed(&mallory, feed.id, &form("Hijacked", true)).await;
    assert!(matches!(edit, Err(ManageError::Forbidden(id)) if id == feed.id));

    let delete = app.delete_feed(&mallory, feed.id).await;
    assert!(matches!(delete, Err(ManageError::Forbidden(_))));

    let preview = app.preview_feed(&mallory, feed.id).await;
    assert!(matches!(preview, Err(ManageError::Forbidden(_))));

    assert!(app.list_feeds(&mallory).await.unwrap().is_empty());
    let stored = app.db().get_feed(feed.id).await.unwrap().unwrap();
    assert_eq!(stored.title, "Mine");
    assert!(!stored.is_public);
}

#[tokio::test]
async fn test_edit_keeps_token_and_drops_cached_document() {
    let (_server, app) = setup().await;
    let alice = user(&app, "alice").await;
    let feed = app.add_feed(&alice, &form("Before", false)).await.unwrap();

    let first = app.serve_feed(feed.id, Some(&feed.access_token)).await;
    assert!(first.body.contains("<title>Before</title>"));
    assert!(app.db().get_cached_feed(feed.id).await.unwrap().is_some());

    let edited = app.edit_feed(&alice, feed.id, &form("After", false)).await.unwrap();
    assert_eq!(edited.access_token, feed.access_token);
    assert_eq!(edited.title, "After");
    assert!(app.db().get_cached_feed(feed.id).await.unwrap().is_none());

    let second = app.serve_feed(feed.id, Some(&feed.access_token)).await;
    assert!(second.body.contains("<title>After</title>"));
}

#[tokio::test]
async fn test_delete_removes_feed_and_cache() {
    let (_server, app) = setup().await;
    let alice = user(&app, "alice").await;
    let feed = app.add_feed(&alice, &form("Gone soon", true)).await.unwrap();
    app.serve_feed(feed.id, None).await;

    app.delete_feed(&alice, feed.id).await.unwrap();

    assert!(app.db().get_feed(feed.id).await.unwrap().is_none());
    assert!(app.db().get_cached_feed(feed.id).await.unwrap().is_none());
    assert_eq!(app.serve_feed(feed.id, None).await.status, StatusCode::NOT_FOUND);
    assert!(matches!(
        app.delete_feed(&alice, feed.id).await,
        Err(ManageError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_add_rejects_invalid_forms() {
    let (_server, app) = setup().await;
    let alice = user(&app, "alice").await;

    let mut bad = form("Bad", false);
    bad.source_id = "https://example.com/wall".to_string();
    assert!(matches!(
        app.add_feed(&alice, &bad).await,
        Err(ManageError::Validation(ValidationError::InvalidIdentifier(_)))
    ));

    let mut bad = form("Bad", false);
    bad.items_count = 0;
    assert!(matches!(
        app.add_feed(&alice, &bad).await,
        Err(ManageError::Validation(ValidationError::ItemsCountOutOfRange(0)))
    ));

    assert!(app.list_feeds(&alice).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_check_source_describes_without_saving() {
    let (_server, app) = setup().await;

    let meta = app.check_source("group", "https://vk.com/club1").await.unwrap();
    assert_eq!(meta.title, "Team");
    assert_eq!(meta.link, "https://vk.com/team");

    assert!(matches!(
        app.check_source("", "club1").await,
        Err(ValidationError::MissingField(_))
    ));
    assert!(matches!(
        app.check_source("album", "club1").await,
        Err(ValidationError::UnknownSourceType(_))
    ));
}
