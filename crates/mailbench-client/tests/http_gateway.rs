//! HTTP gateway tests against a mock mail service

use std::time::Duration;

use chrono::Utc;
use mailbench_client::HttpMailGateway;
use mailbench_core::{
    CoreError, ListRequest, Mail, MailKind, MailOperationGateway, MailRequest, SearchRequest,
    ThreadId, UserId,
};
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn sample_request() -> MailRequest {
    MailRequest {
        from: UserId::new(),
        to: vec![UserId::new()],
        cc: vec![],
        bcc: vec![],
        subject: "Project Status".to_string(),
        content: "This is regarding the Project Status project.".to_string(),
        reply_to: None,
    }
}

fn sample_mail(owner: UserId) -> Mail {
    Mail::copy_for(
        &sample_request(),
        owner,
        MailKind::Received,
        ThreadId::new(),
        Utc::now(),
    )
}

async fn gateway_for(server: &MockServer) -> HttpMailGateway {
    HttpMailGateway::new(format!("{}/", server.uri()), Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn test_create_accepts_created_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/mails"))
        .and(body_partial_json(json!({ "subject": "Project Status" })))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = gateway_for(&server).await;
    gateway.create_mail(&sample_request()).await.unwrap();
}

#[tokio::test]
async fn test_error_status_maps_to_remote_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/mails"))
        .respond_with(ResponseTemplate::new(500).set_body_string("database down"))
        .mount(&server)
        .await;

    let gateway = gateway_for(&server).await;
    let err = gateway.create_mail(&sample_request()).await.unwrap_err();

    match err {
        CoreError::Remote { status, body } => {
            assert_eq!(status, 500);
            assert_eq!(body, "database down");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_list_and_search_decode_mail_arrays() {
    let server = MockServer::start().await;
    let owner = UserId::new();
    let mails = vec![sample_mail(owner), sample_mail(owner)];

    Mock::given(method("POST"))
        .and(path("/api/mails/list"))
        .and(body_partial_json(json!({ "limit": 20, "offset": 5 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(&mails))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/mails/search"))
        .and(body_partial_json(json!({ "searchTerm": "Project Status" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(&mails[..1]))
        .mount(&server)
        .await;

    let gateway = gateway_for(&server).await;

    let listed = gateway
        .list_mails(&ListRequest {
            user_id: owner,
            limit: 20,
            offset: 5,
        })
        .await
        .unwrap();
    assert_eq!(listed, mails);

    let found = gateway
        .search_mails(&SearchRequest {
            user_id: owner,
            search_term: "Project Status".to_string(),
            limit: 50,
        })
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
}

#[tokio::test]
async fn test_malformed_body_is_deserialization_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/mails/list"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let gateway = gateway_for(&server).await;
    let err = gateway
        .list_mails(&ListRequest {
            user_id: UserId::new(),
            limit: 20,
            offset: 0,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::DeserializationError(_)));
}

#[tokio::test]
async fn test_unreachable_service_is_transport_error() {
    let gateway = HttpMailGateway::new("http://127.0.0.1:9", Duration::from_millis(500)).unwrap();
    let err = gateway.create_mail(&sample_request()).await.unwrap_err();
    assert!(matches!(err, CoreError::TransportError(_)));
}
