use rust_decimal::Decimal;
use serde::Deserialize;
use utoipa::ToSchema;

use crate::app_error::FieldErrors;

pub const DEFAULT_QUANTITY: i32 = 1;
/// Upper bound for a single cart line, also after adds are merged.
pub const MAX_QUANTITY: i32 = 10_000;

#[derive(Deserialize, ToSchema, Debug, Default)]
pub struct AddToCartForm {
    pub product_id: Option<i32>,
    pub quantity: Option<i32>,
}

#[derive(Deserialize, ToSchema, Debug, Default)]
pub struct UpdateCartItemForm {
    pub quantity: Option<i32>,
}

/// Live price of a cart line. Never cached.
pub fn line_total(quantity: i32, unit_price: Decimal) -> Decimal {
    Decimal::from(quantity) * unit_price
}

/// Sum of `(quantity, unit_price)` lines; zero for an empty cart.
pub fn cart_total(lines: impl IntoIterator<Item = (i32, Decimal)>) -> Decimal {
    lines
        .into_iter()
        .map(|(quantity, unit_price)| line_total(quantity, unit_price))
        .sum()
}

fn quantity_too_large() -> String {
    format!("Ensure this value is less than or equal to {MAX_QUANTITY}.")
}

fn check_quantity(quantity: i32, errors: &mut FieldErrors) {
    if quantity < 1 {
        errors.add("quantity", "Quantity must be at least 1.");
    } else if quantity > MAX_QUANTITY {
        errors.add("quantity", quantity_too_large());
    }
}

/// Quantity of a line after `added` more units land on an existing `current` quantity.
pub fn merged_quantity(current: i32, added: i32) -> Result<i32, FieldErrors> {
    current
        .checked_add(added)
        .filter(|merged| *merged <= MAX_QUANTITY)
        .ok_or_else(|| FieldErrors::single("quantity", quantity_too_large()))
}

/// Returns `(product_id, quantity)` for an add-to-cart request.
pub fn validate_add(form: &AddToCartForm) -> Result<(i32, i32), FieldErrors> {
    let mut errors = FieldErrors::new();

    let quantity = form.quantity.unwrap_or(DEFAULT_QUANTITY);
    check_quantity(quantity, &mut errors);

    match form.product_id {
        Some(product_id) if errors.is_empty() => Ok((product_id, quantity)),
        Some(_) => Err(errors),
        None => {
            errors.add("product_id", "Product ID is required.");
            Err(errors)
        }
    }
}

pub fn validate_update(form: &UpdateCartItemForm) -> Result<i32, FieldErrors> {
    let Some(quantity) = form.quantity else {
        return Err(FieldErrors::single("quantity", "Quantity is required."));
    };

    let mut errors = FieldErrors::new();
    check_quantity(quantity, &mut errors);
    if errors.is_empty() {
        Ok(quantity)
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn merged_line_prices_at_current_price() {
        // Two adds of 2 and 3 land on one line of 5.
        assert_eq!(line_total(2 + 3, dec!(10.00)), dec!(50.00));
    }

    #[test]
    fn empty_cart_totals_zero() {
        assert_eq!(cart_total(Vec::<(i32, Decimal)>::new()), Decimal::ZERO);
        assert_eq!(
            cart_total(vec![(2, dec!(10.00)), (1, dec!(4.50))]),
            dec!(24.50)
        );
    }

    #[test]
    fn add_defaults_quantity_to_one() {
        let form = AddToCartForm {
            product_id: Some(3),
            quantity: None,
        };
        assert_eq!(validate_add(&form).unwrap(), (3, 1));
    }

    #[test]
    fn add_requires_product_and_positive_quantity() {
        let errors = validate_add(&AddToCartForm {
            product_id: None,
            quantity: Some(0),
        })
        .unwrap_err();

        assert!(errors.contains("product_id"));
        assert!(errors.contains("quantity"));
    }

    #[rstest]
    #[case(Some(MAX_QUANTITY), true)]
    #[case(Some(MAX_QUANTITY + 1), false)]
    #[case(Some(i32::MAX), false)]
    fn add_caps_quantity(#[case] quantity: Option<i32>, #[case] accepted: bool) {
        let result = validate_add(&AddToCartForm {
            product_id: Some(1),
            quantity,
        });
        assert_eq!(result.is_ok(), accepted);

        let result = validate_update(&UpdateCartItemForm { quantity });
        assert_eq!(result.is_ok(), accepted);
    }

    #[test]
    fn merging_stops_at_the_cap() {
        assert_eq!(merged_quantity(2, 3).unwrap(), 5);
        assert_eq!(merged_quantity(MAX_QUANTITY - 1, 1).unwrap(), MAX_QUANTITY);

        let errors = merged_quantity(MAX_QUANTITY, 1).unwrap_err();
        assert_eq!(
            errors.get("quantity").unwrap()[0],
            "Ensure this value is less than or equal to 10000."
        );
        assert!(merged_quantity(i32::MAX, 1).is_err());
    }

    #[test]
    fn update_requires_quantity() {
        let errors = validate_update(&UpdateCartItemForm { quantity: None }).unwrap_err();
        assert_eq!(
            errors.get("quantity"),
            Some(&["Quantity is required.".to_string()][..])
        );

        assert!(validate_update(&UpdateCartItemForm { quantity: Some(-2) }).is_err());
        assert_eq!(
            validate_update(&UpdateCartItemForm { quantity: Some(4) }).unwrap(),
            4
        );
    }
}
