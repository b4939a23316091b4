//! In-memory directory service for exercising the client over real HTTP.
//!
//! Implements the token endpoint and the zip-code / user resources with the
//! business rules the client's callers observe:
//! - creating or updating a user consumes an available zip code (424 if the
//!   code is not available), deleting or moving a user returns it;
//! - users missing `name` or `sex` in an update or delete are a 409;
//! - a second user with the same name and sex is a 400.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    routing::{get, post},
    Form, Json, Router,
};
use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};
use tokio::{net::TcpListener, sync::RwLock};
use uuid::Uuid;

pub const CLIENT_ID: &str = "client";
pub const CLIENT_SECRET: &str = "secret";
pub const READ_SCOPE: &str = "read";
pub const WRITE_SCOPE: &str = "write";

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub name: String,
    pub sex: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zip_code: Option<String>,
}

/// A user as submitted in update and delete bodies, where required fields
/// may be missing.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInput {
    pub name: Option<String>,
    pub sex: Option<String>,
    pub age: Option<i32>,
    pub zip_code: Option<String>,
}

impl UserInput {
    fn into_user(self) -> Result<User, StatusCode> {
        match (self.name, self.sex) {
            (Some(name), Some(sex)) => Ok(User {
                name,
                sex,
                age: self.age,
                zip_code: self.zip_code,
            }),
            _ => Err(StatusCode::CONFLICT),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserUpdate {
    pub user_to_change: UserInput,
    pub user_new_values: UserInput,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserFilter {
    pub older_than: Option<i32>,
    pub younger_than: Option<i32>,
    pub sex: Option<String>,
}

#[derive(Deserialize)]
pub struct TokenForm {
    pub grant_type: String,
    #[serde(default)]
    pub scope: String,
}

#[derive(Serialize)]
pub struct TokenResponse {
    pub token_type: String,
    pub access_token: String,
}

#[derive(Debug, Default)]
pub struct Directory {
    pub zip_codes: Vec<String>,
    pub users: Vec<User>,
    /// access token -> granted scope
    pub tokens: HashMap<String, String>,
    pub token_requests: usize,
}

pub type Db = Arc<RwLock<Directory>>;

pub fn app() -> Router {
    app_with_state(Db::default())
}

/// Build the router over shared state so tests can inspect it.
pub fn app_with_state(db: Db) -> Router {
    Router::new()
        .route("/oauth/token", post(issue_token))
        .route("/zip-codes", get(list_zip_codes))
        .route("/zip-codes/expand", post(expand_zip_codes))
        .route(
            "/users",
            get(list_users)
                .post(create_user)
                .patch(update_user)
                .put(update_user)
                .delete(delete_user),
        )
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

pub async fn run_with_state(listener: TcpListener, db: Db) -> Result<(), std::io::Error> {
    axum::serve(listener, app_with_state(db)).await
}

fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let encoded = value.strip_prefix("Basic ")?;
    let decoded = general_purpose::STANDARD.decode(encoded).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (id, secret) = decoded.split_once(':')?;
    Some((id.to_string(), secret.to_string()))
}

fn authorize(directory: &Directory, headers: &HeaderMap, scope: &str) -> Result<(), StatusCode> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(StatusCode::UNAUTHORIZED)?;
    match directory.tokens.get(token) {
        None => Err(StatusCode::UNAUTHORIZED),
        Some(granted) if granted == scope => Ok(()),
        Some(_) => Err(StatusCode::FORBIDDEN),
    }
}

async fn issue_token(
    State(db): State<Db>,
    headers: HeaderMap,
    Form(form): Form<TokenForm>,
) -> Result<Json<TokenResponse>, (StatusCode, String)> {
    let mut directory = db.write().await;
    directory.token_requests += 1;

    match basic_credentials(&headers) {
        Some((id, secret)) if id == CLIENT_ID && secret == CLIENT_SECRET => {}
        _ => return Err((StatusCode::UNAUTHORIZED, "invalid_client".to_string())),
    }
    if form.grant_type != "client_credentials" {
        return Err((StatusCode::BAD_REQUEST, "unsupported_grant_type".to_string()));
    }
    if form.scope != READ_SCOPE && form.scope != WRITE_SCOPE {
        return Err((StatusCode::BAD_REQUEST, "invalid_scope".to_string()));
    }

    let access_token = Uuid::new_v4().to_string();
    tracing::debug!(scope = %form.scope, "issued access token");
    directory.tokens.insert(access_token.clone(), form.scope);
    Ok(Json(TokenResponse {
        token_type: "bearer".to_string(),
        access_token,
    }))
}

async fn list_zip_codes(State(db): State<Db>, headers: HeaderMap) -> Result<Json<Vec<String>>, StatusCode> {
    let directory = db.read().await;
    authorize(&directory, &headers, READ_SCOPE)?;
    Ok(Json(directory.zip_codes.clone()))
}

async fn expand_zip_codes(
    State(db): State<Db>,
    headers: HeaderMap,
    Json(codes): Json<Vec<String>>,
) -> Result<(StatusCode, Json<Vec<String>>), StatusCode> {
    let mut directory = db.write().await;
    authorize(&directory, &headers, WRITE_SCOPE)?;
    for code in codes {
        if !directory.zip_codes.contains(&code) {
            directory.zip_codes.push(code);
        }
    }
    Ok((StatusCode::CREATED, Json(directory.zip_codes.clone())))
}

async fn list_users(
    State(db): State<Db>,
    headers: HeaderMap,
    Query(filter): Query<UserFilter>,
) -> Result<Json<Vec<User>>, StatusCode> {
    let directory = db.read().await;
    authorize(&directory, &headers, READ_SCOPE)?;
    let users = directory
        .users
        .iter()
        .filter(|u| filter.older_than.map_or(true, |age| u.age.is_some_and(|a| a > age)))
        .filter(|u| filter.younger_than.map_or(true, |age| u.age.is_some_and(|a| a < age)))
        .filter(|u| filter.sex.as_ref().map_or(true, |sex| &u.sex == sex))
        .cloned()
        .collect();
    Ok(Json(users))
}

fn take_zip_code(directory: &mut Directory, zip_code: Option<&String>) -> Result<(), StatusCode> {
    let Some(code) = zip_code else {
        return Ok(());
    };
    let pos = directory
        .zip_codes
        .iter()
        .position(|c| c == code)
        .ok_or(StatusCode::FAILED_DEPENDENCY)?;
    directory.zip_codes.remove(pos);
    Ok(())
}

fn release_zip_code(directory: &mut Directory, zip_code: Option<String>) {
    if let Some(code) = zip_code {
        if !directory.zip_codes.contains(&code) {
            directory.zip_codes.push(code);
        }
    }
}

fn same_identity(a: &User, b: &User) -> bool {
    a.name == b.name && a.sex == b.sex
}

/// Required fields must match; optional ones only when the key sets them.
fn matches_key(user: &User, key: &User) -> bool {
    same_identity(user, key)
        && key.age.map_or(true, |age| user.age == Some(age))
        && key.zip_code.as_ref().map_or(true, |zip| user.zip_code.as_ref() == Some(zip))
}

async fn create_user(
    State(db): State<Db>,
    headers: HeaderMap,
    Json(user): Json<User>,
) -> Result<(StatusCode, Json<User>), StatusCode> {
    let mut directory = db.write().await;
    authorize(&directory, &headers, WRITE_SCOPE)?;
    if directory.users.iter().any(|u| same_identity(u, &user)) {
        return Err(StatusCode::BAD_REQUEST);
    }
    take_zip_code(&mut directory, user.zip_code.as_ref())?;
    directory.users.push(user.clone());
    Ok((StatusCode::CREATED, Json(user)))
}

async fn update_user(
    State(db): State<Db>,
    headers: HeaderMap,
    Json(update): Json<UserUpdate>,
) -> Result<Json<User>, StatusCode> {
    let mut directory = db.write().await;
    authorize(&directory, &headers, WRITE_SCOPE)?;
    let key = update.user_to_change.into_user()?;
    let new_values = update.user_new_values.into_user()?;

    let index = directory
        .users
        .iter()
        .position(|u| matches_key(u, &key))
        .ok_or(StatusCode::NOT_FOUND)?;
    let old_zip = directory.users[index].zip_code.clone();
    if new_values.zip_code != old_zip {
        take_zip_code(&mut directory, new_values.zip_code.as_ref())?;
        release_zip_code(&mut directory, old_zip);
    }
    directory.users[index] = new_values.clone();
    Ok(Json(new_values))
}

async fn delete_user(
    State(db): State<Db>,
    headers: HeaderMap,
    Json(input): Json<UserInput>,
) -> Result<StatusCode, StatusCode> {
    let mut directory = db.write().await;
    authorize(&directory, &headers, WRITE_SCOPE)?;
    let key = input.into_user()?;
    let index = directory
        .users
        .iter()
        .position(|u| matches_key(u, &key))
        .ok_or(StatusCode::NOT_FOUND)?;
    let removed = directory.users.remove(index);
    release_zip_code(&mut directory, removed.zip_code);
    Ok(StatusCode::NO_CONTENT)
}
