//! Signup, login and account-update validation.

use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use utoipa::ToSchema;

use crate::{
    api::passwords::{UserAttributes, check_password_strength},
    app_error::{FieldErrors, NON_FIELD_ERRORS},
    domain::role::Role,
};

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid email regex"));

static PHONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+?1?\d{9,15}$").expect("valid phone regex"));

pub const DUPLICATE_EMAIL: &str = "An account with this email already exists.";
pub const INVALID_CREDENTIALS: &str = "Invalid email or password.";

#[derive(Deserialize, ToSchema, Debug, Default)]
pub struct SignupForm {
    pub email: Option<String>,
    pub password: Option<String>,
    pub confirm_password: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub role: Option<Role>,
}

/// A signup that passed validation. `confirm_password` is gone by now.
#[derive(Debug)]
pub struct NewAccount {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub role: Role,
}

#[derive(Deserialize, ToSchema, Debug, Default)]
pub struct LoginForm {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Deserialize, ToSchema, Debug, Default)]
pub struct UpdateAccountForm {
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Default, PartialEq)]
pub struct AccountChanges {
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub password: Option<String>,
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

fn check_email(email: &str, email_taken: bool, errors: &mut FieldErrors) {
    if !is_valid_email(email) {
        errors.add("email", "Enter a valid email address.");
    } else if email_taken {
        errors.add("email", DUPLICATE_EMAIL);
    }
}

fn check_phone(phone: &str, errors: &mut FieldErrors) {
    if !PHONE_RE.is_match(phone) {
        errors.add("phone", "Phone number must be in format: +1234567890");
    }
}

/// Validates a signup. `email_taken` is whether the lower-cased email already has an account.
pub fn validate_signup(form: SignupForm, email_taken: bool) -> Result<NewAccount, FieldErrors> {
    let mut errors = FieldErrors::new();

    let email = non_blank(form.email).map(|e| normalize_email(&e));
    let first_name = non_blank(form.first_name);
    let last_name = non_blank(form.last_name);
    let phone = non_blank(form.phone);
    let password = form.password.filter(|p| !p.is_empty());
    let confirm_password = form.confirm_password.filter(|p| !p.is_empty());

    match &email {
        Some(email) => check_email(email, email_taken, &mut errors),
        None => errors.add("email", "Email is required."),
    }
    if first_name.is_none() {
        errors.add("first_name", "First name is required.");
    }
    if last_name.is_none() {
        errors.add("last_name", "Last name is required.");
    }

    match &password {
        Some(password) => {
            let attributes = UserAttributes {
                email: email.as_deref(),
                first_name: first_name.as_deref(),
                last_name: last_name.as_deref(),
            };
            for violation in check_password_strength(password, &attributes) {
                errors.add("password", violation);
            }
        }
        None => errors.add("password", "Password is required."),
    }

    match (&password, &confirm_password) {
        (_, None) => errors.add("confirm_password", "Please confirm your password."),
        (Some(p), Some(c)) if p != c => errors.add("password", "Passwords do not match."),
        _ => {}
    }

    if let Some(phone) = &phone {
        check_phone(phone, &mut errors);
    }

    match (email, password, first_name, last_name) {
        (Some(email), Some(password), Some(first_name), Some(last_name)) if errors.is_empty() => {
            Ok(NewAccount {
                email,
                password,
                first_name,
                last_name,
                phone,
                role: form.role.unwrap_or_default(),
            })
        }
        _ => Err(errors),
    }
}

/// Returns the lower-cased email and password, or the login error to report.
pub fn validate_login(form: LoginForm) -> Result<(String, String), FieldErrors> {
    match (non_blank(form.email), form.password.filter(|p| !p.is_empty())) {
        (Some(email), Some(password)) => Ok((normalize_email(&email), password)),
        _ => Err(FieldErrors::single(
            NON_FIELD_ERRORS,
            "Please provide both email and password.",
        )),
    }
}

/// Validates a partial account update. Only supplied fields are changed.
pub fn validate_account_update(
    form: UpdateAccountForm,
    email_taken: bool,
    current: &UserAttributes<'_>,
) -> Result<AccountChanges, FieldErrors> {
    let mut errors = FieldErrors::new();
    let mut changes = AccountChanges::default();

    if let Some(email) = form.email {
        let email = normalize_email(&email);
        check_email(&email, email_taken, &mut errors);
        changes.email = Some(email);
    }

    for (field, value, slot) in [
        ("first_name", form.first_name, &mut changes.first_name),
        ("last_name", form.last_name, &mut changes.last_name),
    ] {
        if let Some(value) = value {
            match non_blank(Some(value)) {
                Some(value) => *slot = Some(value),
                None => errors.add(field, "This field may not be blank."),
            }
        }
    }

    if let Some(phone) = non_blank(form.phone) {
        check_phone(&phone, &mut errors);
        changes.phone = Some(phone);
    }

    if let Some(password) = form.password.filter(|p| !p.is_empty()) {
        let attributes = UserAttributes {
            email: changes.email.as_deref().or(current.email),
            first_name: changes.first_name.as_deref().or(current.first_name),
            last_name: changes.last_name.as_deref().or(current.last_name),
        };
        for violation in check_password_strength(&password, &attributes) {
            errors.add("password", violation);
        }
        changes.password = Some(password);
    }

    if errors.is_empty() {
        Ok(changes)
    } else {
        Err(errors)
    }
}
