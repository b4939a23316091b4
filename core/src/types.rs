//! Resource payloads for the directory API.
//!
//! # Design
//! These types mirror the mock-server's schema but are defined independently.
//! Integration tests catch any schema drift between the two crates. Every
//! field is optional on the wire and omitted when unset: a `User` used as a
//! delete match key only constrains the fields the caller filled in, and a
//! user missing a field the service requires is still sent so the service
//! can reject it.

use serde::{Deserialize, Serialize};

/// Zip codes travel as bare strings.
pub type ZipCode = String;

/// A user record. The service requires `name` and `sex`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sex: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zip_code: Option<ZipCode>,
}

impl User {
    pub fn new(name: impl Into<String>, sex: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            sex: Some(sex.into()),
            age: None,
            zip_code: None,
        }
    }

    pub fn with_age(mut self, age: i32) -> Self {
        self.age = Some(age);
        self
    }

    pub fn with_zip_code(mut self, zip_code: impl Into<ZipCode>) -> Self {
        self.zip_code = Some(zip_code.into());
        self
    }
}

/// Request payload for `PATCH /users` and `PUT /users`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserUpdate {
    pub user_to_change: User,
    pub user_new_values: User,
}
