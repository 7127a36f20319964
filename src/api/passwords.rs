//! Password hashing and the password strength policy.

use anyhow::{Result, anyhow};
use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};

pub const MIN_PASSWORD_LENGTH: usize = 8;

const COMMON_PASSWORDS: &[&str] = &[
    "123456", "123456789", "12345678", "password", "qwerty", "qwerty123", "1234567",
    "111111", "1234567890", "123123", "abc123", "password1", "password123", "iloveyou",
    "1q2w3e4r", "000000", "qwertyuiop", "monkey", "dragon", "letmein", "sunshine",
    "princess", "football", "baseball", "welcome", "welcome1", "admin", "admin123",
    "passw0rd", "master", "shadow", "superman", "trustno1", "starwars", "whatever",
    "qazwsx", "michael", "zaq12wsx", "computer", "freedom", "hello123", "charlie",
    "asdfghjkl", "1qaz2wsx", "changeme", "secret", "login", "access", "flower",
];

/// User attributes a password must not resemble.
#[derive(Debug, Default)]
pub struct UserAttributes<'a> {
    pub email: Option<&'a str>,
    pub first_name: Option<&'a str>,
    pub last_name: Option<&'a str>,
}

/// Checks a plaintext password and returns every violated rule.
pub fn check_password_strength(password: &str, attributes: &UserAttributes<'_>) -> Vec<String> {
    let mut violations = Vec::new();

    if let Some(attribute) = similar_attribute(password, attributes) {
        violations.push(format!("The password is too similar to the {attribute}."));
    }

    if password.chars().count() < MIN_PASSWORD_LENGTH {
        violations.push(format!(
            "This password is too short. It must contain at least {MIN_PASSWORD_LENGTH} characters."
        ));
    }

    let lowered = password.trim().to_lowercase();
    if COMMON_PASSWORDS.contains(&lowered.as_str()) {
        violations.push("This password is too common.".to_string());
    }

    if !password.is_empty() && password.chars().all(|c| c.is_ascii_digit()) {
        violations.push("This password is entirely numeric.".to_string());
    }

    violations
}

fn similar_attribute(password: &str, attributes: &UserAttributes<'_>) -> Option<&'static str> {
    let password = password.to_lowercase();
    let candidates = [
        ("email address", attributes.email),
        ("first name", attributes.first_name),
        ("last name", attributes.last_name),
    ];

    candidates.into_iter().find_map(|(label, value)| {
        let value = value?.to_lowercase();
        let similar = value
            .split(|c: char| !c.is_alphanumeric())
            .chain(std::iter::once(value.as_str()))
            .filter(|part| part.chars().count() >= 3)
            .any(|part| password.contains(part) && part.len() * 10 >= password.len() * 7);
        similar.then_some(label)
    })
}

/// Hashes a password with Argon2id and a random salt.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| anyhow!("Failed to hash password: {err}"))
}

/// Returns whether `password` matches the stored hash. Malformed hashes never match.
pub fn verify_password(password: &str, hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        return false;
    };

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}
