use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Deserializer};
use utoipa::ToSchema;

use crate::{app_error::FieldErrors, domain::identity::is_valid_email};

pub const PROFILE_EXISTS: &str = "Profile already exists for this user";

/// Keeps an explicit `null` apart from an absent key: absent is `None`,
/// `null` is `Some(None)`.
fn explicit<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Customer profile body. On update, absent keys leave the stored value alone.
#[derive(Deserialize, ToSchema, Debug, Default, Clone)]
pub struct CustomerProfileForm {
    #[serde(default, deserialize_with = "explicit")]
    #[schema(value_type = Option<NaiveDate>)]
    pub date_of_birth: Option<Option<NaiveDate>>,
    pub bio: Option<String>,
    #[serde(default, deserialize_with = "explicit")]
    #[schema(value_type = Option<i32>)]
    pub default_address_id: Option<Option<i32>>,
}

#[derive(Deserialize, ToSchema, Debug, Default, Clone)]
pub struct ShopkeeperProfileForm {
    pub store_name: Option<String>,
    pub store_description: Option<String>,
    pub business_registration_number: Option<String>,
    pub store_address_id: Option<i32>,
    pub business_phone: Option<String>,
    pub business_email: Option<String>,
    pub tax_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidShopkeeperProfile {
    pub store_name: String,
    pub store_description: String,
    pub business_registration_number: String,
    pub store_address_id: Option<i32>,
    pub business_phone: String,
    pub business_email: String,
    pub tax_id: String,
}

fn bounded(field: &str, value: Option<&str>, max_len: usize, errors: &mut FieldErrors) -> String {
    let value = value.map(str::trim).unwrap_or_default();
    if value.chars().count() > max_len {
        errors.add(
            field,
            format!("Ensure this field has no more than {max_len} characters."),
        );
    }
    value.to_string()
}

pub fn validate_customer_profile(
    form: &CustomerProfileForm,
    today: NaiveDate,
) -> Result<(), FieldErrors> {
    let mut errors = FieldErrors::new();

    bounded("bio", form.bio.as_deref(), 500, &mut errors);
    if form.date_of_birth.flatten().is_some_and(|dob| dob > today) {
        errors.add("date_of_birth", "Date of birth cannot be in the future.");
    }

    errors.is_empty().then_some(()).ok_or(errors)
}

pub fn validate_shopkeeper_profile(
    form: &ShopkeeperProfileForm,
) -> Result<ValidShopkeeperProfile, FieldErrors> {
    let mut errors = FieldErrors::new();

    let store_name = bounded("store_name", form.store_name.as_deref(), 255, &mut errors);
    if store_name.is_empty() {
        errors.add("store_name", "This field is required.");
    }

    let business_email = bounded(
        "business_email",
        form.business_email.as_deref(),
        254,
        &mut errors,
    );
    if !business_email.is_empty() && !is_valid_email(&business_email) {
        errors.add("business_email", "Enter a valid email address.");
    }

    let profile = ValidShopkeeperProfile {
        store_name,
        store_description: bounded(
            "store_description",
            form.store_description.as_deref(),
            1000,
            &mut errors,
        ),
        business_registration_number: bounded(
            "business_registration_number",
            form.business_registration_number.as_deref(),
            100,
            &mut errors,
        ),
        store_address_id: form.store_address_id,
        business_phone: bounded(
            "business_phone",
            form.business_phone.as_deref(),
            20,
            &mut errors,
        ),
        business_email: business_email.to_lowercase(),
        tax_id: bounded("tax_id", form.tax_id.as_deref(), 50, &mut errors),
    };

    if errors.is_empty() {
        Ok(profile)
    } else {
        Err(errors)
    }
}

pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}
