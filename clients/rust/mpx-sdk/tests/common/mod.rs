//! Shared fixtures for the wiremock-backed tests

#![allow(dead_code)]

use mpx_sdk::{
    AuthenticatedClient, DataObjectFactory, StaticResolver, User, UserSession, MEDIA_DATA_SERVICE,
};
use serde_json::{json, Value};
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const USERNAME: &str = "mpx/test@example.com";
pub const PASSWORD: &str = "hunter2";

pub const SIGN_IN_PATH: &str = "/idm/web/Authentication/signIn";
pub const SIGN_OUT_PATH: &str = "/idm/web/Authentication/signOut";
pub const MEDIA_PATH: &str = "/media/data/Media";

/// Sign-in body for a one hour token with a half hour idle timeout
pub fn sign_in_body(token: &str) -> Value {
    json!({
        "signInResponse": {
            "token": token,
            "duration": 3_600_000,
            "idleTimeout": 1_800_000,
            "userName": USERNAME
        }
    })
}

pub fn exception_body(code: u16, title: &str) -> Value {
    json!({
        "isException": true,
        "responseCode": code,
        "title": title,
        "description": "rejected by test server",
        "correlationId": "corr-1"
    })
}

/// Serve tokens in order, one sign-in each
pub async fn mount_sign_ins(server: &MockServer, tokens: &[&str]) {
    for token in tokens {
        Mock::given(method("GET"))
            .and(path(SIGN_IN_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(sign_in_body(token)))
            .up_to_n_times(1)
            .mount(server)
            .await;
    }
}

pub async fn mount_sign_out(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(SIGN_OUT_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"signOutResponse": {}})))
        .mount(server)
        .await;
}

pub fn session(server: &MockServer) -> UserSession {
    UserSession::new(User::new(USERNAME, PASSWORD), reqwest::Client::new()).with_identity_url(server.uri())
}

pub fn client(server: &MockServer) -> AuthenticatedClient {
    AuthenticatedClient::new(reqwest::Client::new(), Arc::new(session(server)))
}

pub fn resolver(server: &MockServer) -> Arc<StaticResolver> {
    Arc::new(
        StaticResolver::new()
            .with_service(MEDIA_DATA_SERVICE.name, &format!("{}/media", server.uri()))
            .unwrap(),
    )
}

pub fn media_factory(server: &MockServer) -> DataObjectFactory<Value> {
    DataObjectFactory::new(MEDIA_DATA_SERVICE, client(server), resolver(server))
}

pub fn media(id: u32, title: &str) -> Value {
    json!({
        "id": format!("http://data.media.theplatform.com/media/data/Media/{}", id),
        "title": title
    })
}

pub fn page(start: u32, per_page: u32, entries: Vec<Value>, total: u32) -> Value {
    json!({
        "startIndex": start,
        "itemsPerPage": per_page,
        "entryCount": entries.len(),
        "totalResults": total,
        "entries": entries
    })
}
