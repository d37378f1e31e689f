//! User Types
//!
//! Cached user profile and the partial updates applied to it.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Account role.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Educator,
    Admin,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Student => f.write_str("student"),
            Role::Educator => f.write_str("educator"),
            Role::Admin => f.write_str("admin"),
        }
    }
}

/// Cached profile snapshot of the signed-in user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    /// Backend user id (`_id` is accepted for Mongo-style payloads).
    #[serde(alias = "_id")]
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl UserProfile {
    /// Apply a patch field by field, leaving unset fields untouched.
    pub fn apply(&mut self, patch: &ProfilePatch) {
        if let Some(name) = &patch.name {
            self.name = name.clone();
        }
        if let Some(avatar_url) = &patch.avatar_url {
            self.avatar_url = Some(avatar_url.clone());
        }
        if let Some(description) = &patch.description {
            self.description = Some(description.clone());
        }
    }
}

/// Profile fields a user may change.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfilePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ProfilePatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn avatar_url(mut self, avatar_url: impl Into<String>) -> Self {
        self.avatar_url = Some(avatar_url.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.avatar_url.is_none() && self.description.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_user() -> UserProfile {
        UserProfile {
            id: "u1".to_string(),
            name: "Ada".to_string(),
            email: "ada@example.com".to_string(),
            role: Role::Educator,
            avatar_url: None,
            description: Some("old bio".to_string()),
        }
    }

    #[test]
    fn test_apply_patch_only_touches_set_fields() {
        let mut user = sample_user();
        user.apply(&ProfilePatch::new().description("new bio"));

        assert_eq!(user.description.as_deref(), Some("new bio"));
        assert_eq!(user.name, "Ada");
        assert_eq!(user.email, "ada@example.com");
        assert_eq!(user.role, Role::Educator);
    }

    #[test]
    fn test_deserialize_camel_case_and_mongo_id() {
        let user: UserProfile = serde_json::from_str(
            r#"{"_id":"abc","name":"Lin","email":"lin@example.com","role":"student","avatarUrl":"https://cdn/x.png"}"#,
        )
        .unwrap();

        assert_eq!(user.id, "abc");
        assert_eq!(user.role, Role::Student);
        assert_eq!(user.avatar_url.as_deref(), Some("https://cdn/x.png"));
        assert!(user.description.is_none());
    }

    #[test]
    fn test_unknown_role_is_rejected() {
        let result: Result<UserProfile, _> = serde_json::from_str(
            r#"{"id":"1","name":"x","email":"x@y.z","role":"superuser"}"#,
        );
        assert!(result.is_err());
    }
}
