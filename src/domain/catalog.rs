//! Product taxonomy and product field rules.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::app_error::FieldErrors;

const REQUIRED: &str = "This field is required.";
const MAX_NAME_LEN: usize = 255;

/// Largest amount that fits `NUMERIC(10, 2)`.
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(1_410_065_407, 2, 0, false, 2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum Category {
    Dairy,
    Grocery,
}

impl Category {
    pub const ALL: [Category; 2] = [Category::Dairy, Category::Grocery];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Dairy => "Dairy",
            Category::Grocery => "Grocery",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == value)
    }

    pub fn subcategories(&self) -> &'static [&'static str] {
        match self {
            Category::Dairy => &["Milk", "Cheese", "Butter", "Yogurt", "Paneer", "Cream"],
            Category::Grocery => &["Rice", "Pulses", "Flour", "Oil", "Spices", "Sugar", "Salt"],
        }
    }

    pub fn allows(&self, subcategory: &str) -> bool {
        self.subcategories().contains(&subcategory)
    }
}

#[derive(Deserialize, ToSchema, Debug, Default, Clone)]
pub struct ProductForm {
    pub name: Option<String>,
    pub description: Option<String>,
    #[schema(value_type = Option<String>, example = "10.00")]
    pub price: Option<Decimal>,
    pub category: Option<String>,
    pub subcategory: Option<String>,
    pub stock: Option<i32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidProduct {
    pub name: String,
    pub description: String,
    pub price: Decimal,
    pub category: Category,
    pub subcategory: String,
    pub stock: i32,
}

/// Checks every product field and reports all problems at once.
pub fn validate_product(form: ProductForm) -> Result<ValidProduct, FieldErrors> {
    let mut errors = FieldErrors::new();

    let name = match form.name.as_deref().map(str::trim) {
        None => {
            errors.add("name", REQUIRED);
            None
        }
        Some("") => {
            errors.add("name", "Name cannot be empty.");
            None
        }
        Some(name) if name.chars().count() > MAX_NAME_LEN => {
            errors.add(
                "name",
                format!("Ensure this field has no more than {MAX_NAME_LEN} characters."),
            );
            None
        }
        Some(name) => Some(name.to_string()),
    };

    let price = match form.price {
        None => {
            errors.add("price", REQUIRED);
            None
        }
        Some(price) if price <= Decimal::ZERO => {
            errors.add("price", "Price must be greater than zero.");
            None
        }
        Some(price) if price.normalize().scale() > 2 => {
            errors.add("price", "Ensure that there are no more than 2 decimal places.");
            None
        }
        Some(price) if price > MAX_AMOUNT => {
            errors.add("price", "Ensure that there are no more than 10 digits in total.");
            None
        }
        Some(price) => Some(price.round_dp(2)),
    };

    let stock = form.stock.unwrap_or(0);
    if stock < 0 {
        errors.add("stock", "Stock cannot be negative.");
    }

    let category = match form.category.as_deref() {
        None => {
            errors.add("category", REQUIRED);
            None
        }
        Some(raw) => {
            let parsed = Category::parse(raw);
            if parsed.is_none() {
                let choices: Vec<&str> = Category::ALL.iter().map(Category::as_str).collect();
                errors.add(
                    "category",
                    format!("Invalid category. Choose from {}", choices.join(", ")),
                );
            }
            parsed
        }
    };

    let subcategory = match (form.subcategory, category) {
        (None, _) => {
            errors.add("subcategory", REQUIRED);
            None
        }
        (Some(_), None) => {
            errors.add("subcategory", "Please select a category first.");
            None
        }
        (Some(sub), Some(category)) if !category.allows(&sub) => {
            errors.add(
                "subcategory",
                format!(
                    "Invalid subcategory for {}. Choose from {}",
                    category.as_str(),
                    category.subcategories().join(", ")
                ),
            );
            None
        }
        (Some(sub), Some(_)) => Some(sub),
    };

    match (name, price, category, subcategory) {
        (Some(name), Some(price), Some(category), Some(subcategory)) if errors.is_empty() => {
            Ok(ValidProduct {
                name,
                description: form.description.unwrap_or_default(),
                price,
                category,
                subcategory,
                stock,
            })
        }
        _ => Err(errors),
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use rust_decimal_macros::dec;

    use super::*;

    fn form() -> ProductForm {
        ProductForm {
            name: Some("Toned Milk".to_string()),
            description: Some("1L pouch".to_string()),
            price: Some(dec!(10.00)),
            category: Some("Dairy".to_string()),
            subcategory: Some("Milk".to_string()),
            stock: Some(25),
        }
    }

    #[test]
    fn valid_product_passes() {
        let product = validate_product(form()).unwrap();

        assert_eq!(product.category, Category::Dairy);
        assert_eq!(product.price, dec!(10.00));
        assert_eq!(product.stock, 25);
    }

    #[test]
    fn subcategory_must_belong_to_category() {
        let errors = validate_product(ProductForm {
            subcategory: Some("Rice".to_string()),
            ..form()
        })
        .unwrap_err();

        let messages = errors.get("subcategory").unwrap();
        assert!(messages[0].starts_with("Invalid subcategory for Dairy."));
    }

    #[test]
    fn unknown_category_asks_for_category_first() {
        let errors = validate_product(ProductForm {
            category: Some("Bakery".to_string()),
            ..form()
        })
        .unwrap_err();

        assert_eq!(
            errors.get("category").unwrap()[0],
            "Invalid category. Choose from Dairy, Grocery"
        );
        assert_eq!(
            errors.get("subcategory").unwrap()[0],
            "Please select a category first."
        );
    }

    #[rstest]
    #[case(dec!(0), "Price must be greater than zero.")]
    #[case(dec!(-1.50), "Price must be greater than zero.")]
    #[case(dec!(1.005), "Ensure that there are no more than 2 decimal places.")]
    #[case(dec!(100000000.00), "Ensure that there are no more than 10 digits in total.")]
    fn price_rules(#[case] price: Decimal, #[case] message: &str) {
        let errors = validate_product(ProductForm {
            price: Some(price),
            ..form()
        })
        .unwrap_err();
        assert_eq!(errors.get("price").unwrap()[0], message);
    }

    #[test]
    fn negative_stock_and_blank_name_are_reported_together() {
        let errors = validate_product(ProductForm {
            name: Some("   ".to_string()),
            stock: Some(-1),
            ..form()
        })
        .unwrap_err();

        assert_eq!(errors.get("name").unwrap()[0], "Name cannot be empty.");
        assert_eq!(errors.get("stock").unwrap()[0], "Stock cannot be negative.");
    }

    #[rstest]
    #[case(255, true)]
    #[case(256, false)]
    #[case(300, false)]
    fn name_fits_the_column(#[case] len: usize, #[case] accepted: bool) {
        let result = validate_product(ProductForm {
            name: Some("n".repeat(len)),
            ..form()
        });

        match result {
            Ok(product) => {
                assert!(accepted);
                assert_eq!(product.name.len(), len);
            }
            Err(errors) => {
                assert!(!accepted);
                assert_eq!(
                    errors.get("name").unwrap()[0],
                    "Ensure this field has no more than 255 characters."
                );
            }
        }
    }

    #[test]
    fn max_amount_is_the_numeric_10_2_ceiling() {
        assert_eq!(MAX_AMOUNT, dec!(99999999.99));
    }

    #[test]
    fn grocery_taxonomy() {
        assert!(Category::Grocery.allows("Salt"));
        assert!(!Category::Grocery.allows("Paneer"));
        assert_eq!(Category::parse("Grocery"), Some(Category::Grocery));
        assert_eq!(Category::parse("grocery"), None);
    }
}
