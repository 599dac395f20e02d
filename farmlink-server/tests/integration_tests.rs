//! HTTP-level tests of the chat API over the in-memory backend.

use std::sync::Arc;

use axum::http::{StatusCode, header};
use axum_test::TestServer;
use serde_json::{Value, json};
use server::{
    app_state::AppState,
    directory::MemoryDirectory,
    server::{create_app_router, metrics_handle},
};
use shared::{
    config::server::{Config, Profile},
    models::{
        ConversationDetail, ConversationSummary, Message, PartyProfile,
        ResolveConversationResponse, TopicId, TopicSummary,
    },
};

async fn test_server() -> TestServer {
    let mut config = Config::default_for_profile(Profile::Test);
    for party in ["u1", "u2", "u3"] {
        config
            .auth
            .static_tokens
            .insert(format!("token-{party}"), party.to_string());
    }

    let directory = Arc::new(MemoryDirectory::new());
    directory
        .upsert_profile(PartyProfile {
            party_id: "u1".into(),
            display_name: "Sunny Side Orchard".into(),
            avatar_url: None,
        })
        .await;
    directory
        .upsert_topic(TopicSummary {
            id: TopicId::new("p42"),
            title: "Honeycrisp apples, 5kg".into(),
            image_url: None,
        })
        .await;

    let state = Arc::new(AppState::in_memory(Arc::new(config), directory));
    TestServer::new(create_app_router(state, metrics_handle())).expect("test server")
}

fn bearer(party: &str) -> String {
    format!("Bearer token-{party}")
}

async fn resolve(server: &TestServer, caller: &str, other: &str) -> (StatusCode, ResolveConversationResponse) {
    let response = server
        .post("/api/conversations/resolve")
        .add_header(header::AUTHORIZATION, bearer(caller))
        .json(&json!({ "other_party": other, "topic_id": "p42" }))
        .await;
    (response.status_code(), response.json())
}

#[tokio::test]
async fn contact_seller_end_to_end() {
    let server = test_server().await;

    let (status, created) = resolve(&server, "u2", "u1").await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(created.created);

    let (status, again) = resolve(&server, "u1", "u2").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(again.conversation_id, created.conversation_id);

    let messages_path = format!("/api/conversations/{}/messages", created.conversation_id);
    let sent = server
        .post(&messages_path)
        .add_header(header::AUTHORIZATION, bearer("u2"))
        .json(&json!({ "body": "  Still have the apples?  " }))
        .await;
    assert_eq!(sent.status_code(), StatusCode::CREATED);
    let sent: Message = sent.json();
    assert_eq!(sent.body, "Still have the apples?");

    let history: Vec<Message> = server
        .get(&messages_path)
        .add_header(header::AUTHORIZATION, bearer("u1"))
        .await
        .json();
    assert_eq!(history, vec![sent.clone()]);

    let listed: Vec<ConversationSummary> = server
        .get("/api/conversations")
        .add_header(header::AUTHORIZATION, bearer("u2"))
        .await
        .json();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].other_party.as_str(), "u1");
    assert_eq!(
        listed[0].other_profile.as_ref().map(|p| p.display_name.as_str()),
        Some("Sunny Side Orchard")
    );
    assert_eq!(
        listed[0].topic.as_ref().map(|t| t.title.as_str()),
        Some("Honeycrisp apples, 5kg")
    );
    assert_eq!(listed[0].preview_text.as_deref(), Some("Still have the apples?"));

    let detail: ConversationDetail = server
        .get(&format!("/api/conversations/{}", created.conversation_id))
        .add_header(header::AUTHORIZATION, bearer("u1"))
        .await
        .json();
    assert_eq!(detail.other_party.as_str(), "u2");
    assert_eq!(detail.messages, vec![sent]);
}

#[tokio::test]
async fn missing_or_unknown_credentials_are_rejected() {
    let server = test_server().await;

    let response = server.get("/api/conversations").await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/problem+json"
    );
    let problem: Value = response.json();
    assert_eq!(problem["code"], "unauthenticated");

    let response = server
        .get("/api/conversations")
        .add_header(header::AUTHORIZATION, "Bearer token-nobody")
        .await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn session_cookie_is_accepted() {
    let server = test_server().await;
    let response = server
        .get("/api/conversations")
        .add_header(header::COOKIE, "FARMLINK_SESSION=token-u3")
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let listed: Vec<ConversationSummary> = response.json();
    assert!(listed.is_empty());
}

#[tokio::test]
async fn outsiders_cannot_read_or_write() {
    let server = test_server().await;
    let (_, created) = resolve(&server, "u1", "u2").await;
    let messages_path = format!("/api/conversations/{}/messages", created.conversation_id);

    let response = server
        .post(&messages_path)
        .add_header(header::AUTHORIZATION, bearer("u3"))
        .json(&json!({ "body": "hello" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::FORBIDDEN);
    let problem: Value = response.json();
    assert_eq!(problem["code"], "not_participant");

    let response = server
        .get(&messages_path)
        .add_header(header::AUTHORIZATION, bearer("u3"))
        .await;
    assert_eq!(response.status_code(), StatusCode::FORBIDDEN);

    let history: Vec<Message> = server
        .get(&messages_path)
        .add_header(header::AUTHORIZATION, bearer("u1"))
        .await
        .json();
    assert!(history.is_empty());
}

#[tokio::test]
async fn validation_errors_are_unprocessable() {
    let server = test_server().await;

    let response = server
        .post("/api/conversations/resolve")
        .add_header(header::AUTHORIZATION, bearer("u1"))
        .json(&json!({ "other_party": "u1", "topic_id": "p42" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
    let problem: Value = response.json();
    assert_eq!(problem["code"], "self_conversation");

    let (_, created) = resolve(&server, "u1", "u2").await;
    let response = server
        .post(&format!("/api/conversations/{}/messages", created.conversation_id))
        .add_header(header::AUTHORIZATION, bearer("u1"))
        .json(&json!({ "body": "   " }))
        .await;
    assert_eq!(response.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
    let problem: Value = response.json();
    assert_eq!(problem["code"], "empty_message");
}

#[tokio::test]
async fn spoofed_sender_is_unauthenticated() {
    let server = test_server().await;
    let (_, created) = resolve(&server, "u1", "u2").await;

    let response = server
        .post(&format!("/api/conversations/{}/messages", created.conversation_id))
        .add_header(header::AUTHORIZATION, bearer("u1"))
        .json(&json!({ "body": "from u2, honest", "sender_id": "u2" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn unknown_conversation_is_not_found() {
    let server = test_server().await;
    let response = server
        .get(&format!("/api/conversations/{}", uuid::Uuid::new_v4()))
        .add_header(header::AUTHORIZATION, bearer("u1"))
        .await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
    let problem: Value = response.json();
    assert_eq!(problem["code"], "conversation_not_found");
}

#[tokio::test]
async fn stream_requires_membership() {
    let server = test_server().await;
    let (_, created) = resolve(&server, "u1", "u2").await;

    let response = server
        .get(&format!("/api/conversations/{}/stream", created.conversation_id))
        .add_header(header::AUTHORIZATION, bearer("u3"))
        .await;
    assert_eq!(response.status_code(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn health_endpoints_are_public() {
    let server = test_server().await;
    assert_eq!(server.get("/healthz").await.status_code(), StatusCode::OK);
    assert_eq!(server.get("/readyz").await.status_code(), StatusCode::OK);
    assert_eq!(server.get("/metrics").await.status_code(), StatusCode::OK);
}
