//! End-to-end scenarios against the live mock directory service.
//!
//! # Design
//! Starts the mock server on a random port and drives every client
//! operation over real HTTP through `ReqwestTransport`, validating request
//! building, token exchange and response handling against the actual server.

use directory_client::{
    parse_users, parse_zip_codes, ApiClient, ClientConfig, Credentials, FailurePolicy, User, UserUpdate,
};
use mock_server::{Db, CLIENT_ID, CLIENT_SECRET, READ_SCOPE, WRITE_SCOPE};

async fn start_server() -> (String, Db) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let db = Db::default();
    let state = db.clone();
    tokio::spawn(async move { mock_server::run_with_state(listener, state).await });
    (format!("http://{addr}"), db)
}

fn client(base_url: &str, policy: FailurePolicy) -> ApiClient {
    let config = ClientConfig::new(Credentials::new(base_url, CLIENT_ID, CLIENT_SECRET)).with_failure_policy(policy);
    ApiClient::new(config).unwrap()
}

#[tokio::test]
async fn user_lifecycle() {
    let (base_url, db) = start_server().await;
    let client = client(&base_url, FailurePolicy::Passthrough);

    // Step 1: make a zip code available.
    let response = client.expand_zip_codes(WRITE_SCOPE, &["oz".to_string()]).await.unwrap();
    assert_eq!(response.status, 201);

    // Step 2: create a user on it.
    let user = User::new("u", "FEMALE").with_zip_code("oz");
    let response = client.create_user(WRITE_SCOPE, Some(&user)).await.unwrap();
    assert_eq!(response.status, 201);

    // Step 3: the user is listed and the zip code is taken.
    let response = client.get_users(READ_SCOPE, &[]).await.unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(parse_users(&response).unwrap(), vec![user]);
    let codes = parse_zip_codes(&client.get_zip_codes(READ_SCOPE).await.unwrap()).unwrap();
    assert!(codes.is_empty());

    // Step 4: delete by required fields only.
    let response = client.delete_user(WRITE_SCOPE, Some(&User::new("u", "FEMALE"))).await.unwrap();
    assert_eq!(response.status, 204);

    // Step 5: gone, and the zip code is back.
    let response = client.get_users(READ_SCOPE, &[]).await.unwrap();
    assert!(!response.body.contains("\"u\""));
    let codes = parse_zip_codes(&client.get_zip_codes(READ_SCOPE).await.unwrap()).unwrap();
    assert_eq!(codes, vec!["oz"]);

    // One exchange per scope for the whole session.
    assert_eq!(db.read().await.token_requests, 2);
}

#[tokio::test]
async fn filters_and_updates() {
    let (base_url, _db) = start_server().await;
    let client = client(&base_url, FailurePolicy::Passthrough);

    client
        .expand_zip_codes(WRITE_SCOPE, &["oz1".to_string(), "oz12".to_string()])
        .await
        .unwrap();
    let users = [
        User::new("young", "FEMALE").with_age(5),
        User::new("mid", "MALE").with_age(30).with_zip_code("oz1"),
        User::new("old", "MALE").with_age(50),
    ];
    for response in client.create_users(WRITE_SCOPE, &users).await.unwrap() {
        assert_eq!(response.status, 201);
    }

    let response = client
        .get_users(READ_SCOPE, &[("olderThan", "6"), ("sex", "MALE")])
        .await
        .unwrap();
    let names: Vec<String> = parse_users(&response).unwrap().into_iter().filter_map(|u| u.name).collect();
    assert_eq!(names, vec!["mid", "old"]);

    let update = UserUpdate {
        user_to_change: users[1].clone(),
        user_new_values: User::new("New1", "MALE").with_age(20).with_zip_code("oz12"),
    };
    let response = client.update_user(WRITE_SCOPE, Some(&update), false).await.unwrap();
    assert_eq!(response.status, 200);

    let response = client.get_users(READ_SCOPE, &[("youngerThan", "25")]).await.unwrap();
    let names: Vec<String> = parse_users(&response).unwrap().into_iter().filter_map(|u| u.name).collect();
    assert_eq!(names, vec!["young", "New1"]);
}

#[tokio::test]
async fn failed_writes_under_each_policy() {
    let (base_url, _db) = start_server().await;

    let passthrough = client(&base_url, FailurePolicy::Passthrough);
    let user = User::new("u2", "FEMALE").with_zip_code("oz222");
    let response = passthrough.create_user(WRITE_SCOPE, Some(&user)).await.unwrap();
    assert_eq!(response.status, 424);

    let legacy = client(&base_url, FailurePolicy::Synthesize);
    let response = legacy.create_user(WRITE_SCOPE, Some(&user)).await.unwrap();
    assert_eq!(response.status, 200);
    assert!(response.body.starts_with("Request failed with status code FailedDependency."));

    let response = legacy
        .delete_user(WRITE_SCOPE, Some(&User::new("nobody", "MALE")))
        .await
        .unwrap();
    assert!(response.body.starts_with("Request failed with status code NotFound."));
}

#[tokio::test]
async fn users_missing_sex_are_rejected_by_the_server() {
    let (base_url, db) = start_server().await;
    let passthrough = client(&base_url, FailurePolicy::Passthrough);

    let without_sex = User {
        name: Some("u3".to_string()),
        age: Some(0),
        ..Default::default()
    };
    let response = passthrough.delete_user(WRITE_SCOPE, Some(&without_sex)).await.unwrap();
    assert_eq!(response.status, 409);

    let update = UserUpdate {
        user_to_change: User::new("u", "FEMALE"),
        user_new_values: without_sex.clone(),
    };
    let response = passthrough.update_user(WRITE_SCOPE, Some(&update), true).await.unwrap();
    assert_eq!(response.status, 409);

    let legacy = client(&base_url, FailurePolicy::Synthesize);
    let response = legacy.delete_user(WRITE_SCOPE, Some(&without_sex)).await.unwrap();
    assert_eq!(response.status, 200);
    assert!(response.body.starts_with("Request failed with status code Conflict."));

    assert!(db.read().await.users.is_empty());
}

#[tokio::test]
async fn wrong_scope_is_visible_to_callers_of_reads() {
    let (base_url, _db) = start_server().await;
    let client = client(&base_url, FailurePolicy::Passthrough);

    let response = client.get_users(WRITE_SCOPE, &[]).await.unwrap();
    assert_eq!(response.status, 403);
}
