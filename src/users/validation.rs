//! Shape and format checks for inbound payloads. Nothing here touches the
//! store; uniqueness is decided later.

use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

use crate::users::{
    dto::{CreateUserRequest, UpdateUserRequest},
    repo_types::{AccountStatus, UserPatch},
};

pub const USERNAME_MIN: usize = 3;
pub const USERNAME_MAX: usize = 50;
pub const PASSWORD_MIN: usize = 6;
pub const PASSWORD_MAX: usize = 128;
pub const FULL_NAME_MAX: usize = 100;
pub const EMAIL_MAX: usize = 255;

const UPDATABLE_FIELDS: [&str; 4] = ["email", "full_name", "is_active", "is_superuser"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// Every offending field of one payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors(pub Vec<FieldError>);

impl ValidationErrors {
    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut errors = Self::default();
        errors.push(field, message);
        errors
    }

    pub fn push(&mut self, field: &str, message: impl Into<String>) {
        self.0.push(FieldError {
            field: field.to_string(),
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn fields(&self) -> Vec<&str> {
        self.0.iter().map(|e| e.field.as_str()).collect()
    }

    fn into_result<T>(self, value: T) -> Result<T, ValidationErrors> {
        if self.is_empty() {
            Ok(value)
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|e| format!("{}: {}", e.field, e.message))
            .collect();
        f.write_str(&parts.join("; "))
    }
}

lazy_static! {
    static ref USERNAME_RE: Regex = Regex::new(r"^[A-Za-z0-9_]+$").unwrap();
    static ref EMAIL_RE: Regex =
        Regex::new(r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@[A-Za-z0-9](?:[A-Za-z0-9-]*[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]*[A-Za-z0-9])?)+$").unwrap();
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    email.chars().count() <= EMAIL_MAX
        && EMAIL_RE.is_match(email)
        && !email.split('@').next().is_some_and(|local| {
            local.starts_with('.') || local.ends_with('.') || local.contains("..")
        })
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Create payload after validation; the password is still plaintext.
#[derive(Debug, Clone)]
pub struct ValidCreate {
    pub username: String,
    pub email: String,
    pub password: String,
    pub full_name: Option<String>,
    pub status: AccountStatus,
    pub is_superuser: bool,
}

fn check_username(errors: &mut ValidationErrors, username: &str) {
    let len = username.chars().count();
    if !(USERNAME_MIN..=USERNAME_MAX).contains(&len) {
        errors.push(
            "username",
            format!("must be between {USERNAME_MIN} and {USERNAME_MAX} characters"),
        );
    } else if !USERNAME_RE.is_match(username) {
        errors.push("username", "may only contain letters, digits and underscores");
    }
}

fn check_email(errors: &mut ValidationErrors, email: &str) {
    if !is_valid_email(email) {
        errors.push("email", "is not a valid email address");
    }
}

fn check_full_name(errors: &mut ValidationErrors, full_name: &str) {
    if full_name.chars().count() > FULL_NAME_MAX {
        errors.push("full_name", format!("must be at most {FULL_NAME_MAX} characters"));
    } else if full_name.chars().any(char::is_control) {
        errors.push("full_name", "may not contain control characters");
    }
}

pub fn validate_create(req: CreateUserRequest) -> Result<ValidCreate, ValidationErrors> {
    let mut errors = ValidationErrors::default();

    let username = match req.username {
        Some(u) => {
            check_username(&mut errors, &u);
            u
        }
        None => {
            errors.push("username", "is required");
            String::new()
        }
    };

    let email = match req.email {
        Some(e) => {
            let e = normalize_email(&e);
            check_email(&mut errors, &e);
            e
        }
        None => {
            errors.push("email", "is required");
            String::new()
        }
    };

    let password = match req.password {
        Some(p) => {
            let len = p.chars().count();
            if !(PASSWORD_MIN..=PASSWORD_MAX).contains(&len) {
                errors.push(
                    "password",
                    format!("must be between {PASSWORD_MIN} and {PASSWORD_MAX} characters"),
                );
            }
            p
        }
        None => {
            errors.push("password", "is required");
            String::new()
        }
    };

    if let Some(name) = req.full_name.as_deref() {
        check_full_name(&mut errors, name);
    }

    errors.into_result(ValidCreate {
        username,
        email,
        password,
        full_name: req.full_name,
        status: AccountStatus::from_active(req.is_active.unwrap_or(true)),
        is_superuser: req.is_superuser.unwrap_or(false),
    })
}

pub fn validate_update(req: UpdateUserRequest) -> Result<UserPatch, ValidationErrors> {
    let mut errors = ValidationErrors::default();
    let mut patch = UserPatch::default();

    for key in req.other.keys() {
        if matches!(key.as_str(), "username" | "password") {
            errors.push(key, "cannot be changed through this endpoint");
        } else {
            errors.push(
                key,
                format!("unknown field, expected one of {}", UPDATABLE_FIELDS.join(", ")),
            );
        }
    }

    match req.email {
        Some(Some(e)) => {
            let e = normalize_email(&e);
            check_email(&mut errors, &e);
            patch.email = Some(e);
        }
        Some(None) => errors.push("email", "may not be null"),
        None => {}
    }

    if let Some(full_name) = req.full_name {
        if let Some(name) = full_name.as_deref() {
            check_full_name(&mut errors, name);
        }
        patch.full_name = Some(full_name);
    }

    match req.is_active {
        Some(Some(active)) => patch.status = Some(AccountStatus::from_active(active)),
        Some(None) => errors.push("is_active", "may not be null"),
        None => {}
    }

    match req.is_superuser {
        Some(Some(flag)) => patch.is_superuser = Some(flag),
        Some(None) => errors.push("is_superuser", "may not be null"),
        None => {}
    }

    errors.into_result(patch)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create(username: &str, email: &str, password: &str) -> CreateUserRequest {
        CreateUserRequest {
            username: Some(username.into()),
            email: Some(email.into()),
            password: Some(password.into()),
            ..Default::default()
        }
    }

    #[test]
    fn accepts_a_minimal_payload_with_defaults() {
        let valid = validate_create(create("alice", "a@x.com", "secret1")).unwrap();
        assert_eq!(valid.username, "alice");
        assert_eq!(valid.status, AccountStatus::Active);
        assert!(!valid.is_superuser);
        assert!(valid.full_name.is_none());
    }

    #[test]
    fn honours_explicit_flags() {
        let mut req = create("alice", "a@x.com", "secret1");
        req.is_active = Some(false);
        req.is_superuser = Some(true);
        let valid = validate_create(req).unwrap();
        assert_eq!(valid.status, AccountStatus::Deactivated);
        assert!(valid.is_superuser);
    }

    #[test]
    fn email_is_trimmed_and_lowercased() {
        let valid = validate_create(create("alice", "  Alice@Example.COM ", "secret1")).unwrap();
        assert_eq!(valid.email, "alice@example.com");
    }

    #[test]
    fn reports_every_missing_field() {
        let errors = validate_create(CreateUserRequest::default()).unwrap_err();
        assert_eq!(errors.fields(), vec!["username", "email", "password"]);
    }

    #[test]
    fn reports_every_invalid_field() {
        let mut req = create("a!", "not-an-email", "123");
        req.full_name = Some("x".repeat(FULL_NAME_MAX + 1));
        let errors = validate_create(req).unwrap_err();
        assert_eq!(errors.fields(), vec!["username", "email", "password", "full_name"]);
    }

    #[test]
    fn full_name_rejects_control_characters() {
        for bad in ["a\u{0}b", "line\nbreak", "tab\there", "bell\u{7}"] {
            let mut req = create("alice", "a@x.com", "secret1");
            req.full_name = Some(bad.to_string());
            let errors = validate_create(req).unwrap_err();
            assert_eq!(errors.fields(), vec!["full_name"], "{bad:?}");
        }

        let mut req = create("alice", "a@x.com", "secret1");
        req.full_name = Some("Zoë O'Brien-Smith".to_string());
        assert!(validate_create(req).is_ok());

        let update: UpdateUserRequest =
            serde_json::from_value(serde_json::json!({ "full_name": "a\u{0}b" })).unwrap();
        assert_eq!(validate_update(update).unwrap_err().fields(), vec!["full_name"]);
    }

    #[test]
    fn username_bounds_and_charset() {
        assert!(validate_create(create("abc", "a@x.com", "secret1")).is_ok());
        assert!(validate_create(create(&"a".repeat(50), "a@x.com", "secret1")).is_ok());
        assert!(validate_create(create("ab", "a@x.com", "secret1")).is_err());
        assert!(validate_create(create(&"a".repeat(51), "a@x.com", "secret1")).is_err());
        assert!(validate_create(create("john_doe_42", "a@x.com", "secret1")).is_ok());
        assert!(validate_create(create("john-doe", "a@x.com", "secret1")).is_err());
        assert!(validate_create(create("jöhn", "a@x.com", "secret1")).is_err());
    }

    #[test]
    fn password_bounds() {
        assert!(validate_create(create("alice", "a@x.com", "12345")).is_err());
        assert!(validate_create(create("alice", "a@x.com", "123456")).is_ok());
        assert!(validate_create(create("alice", "a@x.com", &"p".repeat(128))).is_ok());
        assert!(validate_create(create("alice", "a@x.com", &"p".repeat(129))).is_err());
    }

    #[test]
    fn email_shapes() {
        for ok in ["a@x.com", "first.last+tag@sub.example.org", "x_y@a-b.io"] {
            assert!(is_valid_email(ok), "{ok} should be valid");
        }
        for bad in ["", "a@", "@x.com", "a@x", "a b@x.com", "a@@x.com", ".a@x.com", "a..b@x.com", "a@-x.com"] {
            assert!(!is_valid_email(bad), "{bad} should be invalid");
        }
    }

    #[test]
    fn update_applies_only_present_fields() {
        let req = UpdateUserRequest {
            full_name: Some(Some("Jane Smith".into())),
            ..Default::default()
        };
        let patch = validate_update(req).unwrap();
        assert_eq!(
            patch,
            UserPatch {
                full_name: Some(Some("Jane Smith".into())),
                ..Default::default()
            }
        );
    }

    #[test]
    fn update_maps_flags_and_normalizes_email() {
        let req = UpdateUserRequest {
            email: Some(Some("New@X.com".into())),
            is_active: Some(Some(false)),
            is_superuser: Some(Some(true)),
            ..Default::default()
        };
        let patch = validate_update(req).unwrap();
        assert_eq!(patch.email.as_deref(), Some("new@x.com"));
        assert_eq!(patch.status, Some(AccountStatus::Deactivated));
        assert_eq!(patch.is_superuser, Some(true));
    }

    #[test]
    fn update_rejects_immutable_unknown_and_null_fields_together() {
        let mut req = UpdateUserRequest {
            email: Some(None),
            is_active: Some(None),
            ..Default::default()
        };
        req.other.insert("username".into(), serde_json::json!("mallory"));
        req.other.insert("nickname".into(), serde_json::json!("m"));
        let errors = validate_update(req).unwrap_err();
        assert_eq!(errors.fields(), vec!["nickname", "username", "email", "is_active"]);
    }

    #[test]
    fn update_can_clear_full_name() {
        let req = UpdateUserRequest {
            full_name: Some(None),
            ..Default::default()
        };
        assert_eq!(validate_update(req).unwrap().full_name, Some(None));
    }

    #[test]
    fn display_joins_field_messages() {
        let mut errors = ValidationErrors::single("email", "is required");
        errors.push("password", "is required");
        assert_eq!(errors.to_string(), "email: is required; password: is required");
    }
}
