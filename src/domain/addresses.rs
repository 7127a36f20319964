use serde::Deserialize;
use utoipa::ToSchema;

use crate::app_error::FieldErrors;

#[derive(Deserialize, ToSchema, Debug, Default, Clone)]
pub struct AddressForm {
    pub street_address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    #[serde(default)]
    pub is_default: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidAddress {
    pub street_address: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub is_default: bool,
}

fn required_text(
    field: &str,
    value: Option<&str>,
    max_len: usize,
    errors: &mut FieldErrors,
) -> String {
    let value = value.map(str::trim).unwrap_or_default();
    if value.is_empty() {
        errors.add(field, "This field is required.");
    } else if value.chars().count() > max_len {
        errors.add(
            field,
            format!("Ensure this field has no more than {max_len} characters."),
        );
    }
    value.to_string()
}

pub fn validate_address(form: &AddressForm) -> Result<ValidAddress, FieldErrors> {
    let mut errors = FieldErrors::new();

    let address = ValidAddress {
        street_address: required_text(
            "street_address",
            form.street_address.as_deref(),
            255,
            &mut errors,
        ),
        city: required_text("city", form.city.as_deref(), 100, &mut errors),
        state: required_text("state", form.state.as_deref(), 100, &mut errors),
        postal_code: required_text("postal_code", form.postal_code.as_deref(), 20, &mut errors),
        is_default: form.is_default,
    };

    if errors.is_empty() {
        Ok(address)
    } else {
        Err(errors)
    }
}

/// Single-line form of an address, used to pre-fill an order's shipping address.
pub fn format_shipping_address(street: &str, city: &str, state: &str, postal_code: &str) -> String {
    format!("{street}, {city}, {state} {postal_code}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_are_all_reported() {
        let errors = validate_address(&AddressForm {
            street_address: Some("12 MG Road".to_string()),
            ..Default::default()
        })
        .unwrap_err();

        assert!(!errors.contains("street_address"));
        for field in ["city", "state", "postal_code"] {
            assert!(errors.contains(field));
        }
    }

    #[test]
    fn postal_code_length_is_bounded() {
        let errors = validate_address(&AddressForm {
            street_address: Some("12 MG Road".to_string()),
            city: Some("Pune".to_string()),
            state: Some("MH".to_string()),
            postal_code: Some("1".repeat(21)),
            is_default: false,
        })
        .unwrap_err();

        assert_eq!(
            errors.get("postal_code").unwrap()[0],
            "Ensure this field has no more than 20 characters."
        );
    }

    #[test]
    fn formats_shipping_line() {
        assert_eq!(
            format_shipping_address("12 MG Road", "Pune", "MH", "411001"),
            "12 MG Road, Pune, MH 411001"
        );
    }
}
