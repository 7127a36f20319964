//! Cart-to-order conversion.
//!
//! An order is a frozen snapshot of the cart at placement time: each item keeps the
//! product name and unit price it had then, and the order total is the sum of those
//! captured lines. Later catalog edits never flow back into existing orders.

use std::{fmt, io::Write};

use diesel::{
    deserialize::{self, FromSql, FromSqlRow},
    expression::AsExpression,
    pg::{Pg, PgValue},
    serialize::{self, IsNull, Output, ToSql},
    sql_types::Text,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::{
    app_error::{AppError, FieldErrors, NON_FIELD_ERRORS},
    domain::{cart::line_total, catalog::MAX_AMOUNT},
};

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    ToSchema,
    AsExpression,
    FromSqlRow,
)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    #[default]
    Created,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Created => "CREATED",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ToSql<Text, Pg> for OrderStatus {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        out.write_all(self.as_str().as_bytes())?;
        Ok(IsNull::No)
    }
}

impl FromSql<Text, Pg> for OrderStatus {
    fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
        match <String as FromSql<Text, Pg>>::from_sql(bytes)?.as_str() {
            "CREATED" => Ok(OrderStatus::Created),
            other => Err(format!("unknown order status: {other}").into()),
        }
    }
}

/// A locked cart line joined with the current state of its product.
#[derive(Debug, Clone)]
pub struct CheckoutLine {
    pub cart_item_id: i32,
    pub product_id: i32,
    pub product_name: String,
    pub unit_price: Decimal,
    pub stock: i32,
    pub quantity: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotItem {
    pub product_id: i32,
    pub product_name: String,
    pub price: Decimal,
    pub quantity: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderSnapshot {
    pub total_amount: Decimal,
    pub items: Vec<SnapshotItem>,
}

#[derive(Debug, Error, PartialEq)]
pub enum CheckoutError {
    #[error("Cart is empty")]
    EmptyCart,

    #[error("Not enough stock")]
    InsufficientStock(Vec<String>),

    #[error("Order total is too large")]
    TotalTooLarge(Decimal),
}

impl From<CheckoutError> for AppError {
    fn from(err: CheckoutError) -> Self {
        match err {
            CheckoutError::EmptyCart => {
                AppError::Validation(FieldErrors::single(NON_FIELD_ERRORS, "Cart is empty"))
            }
            CheckoutError::InsufficientStock(messages) => {
                let mut errors = FieldErrors::new();
                for message in messages {
                    errors.add("items", message);
                }
                AppError::Validation(errors)
            }
            CheckoutError::TotalTooLarge(total) => AppError::Validation(FieldErrors::single(
                "items",
                format!("Order total {total} exceeds the maximum of {MAX_AMOUNT}."),
            )),
        }
    }
}

/// Captures prices and names from the cart as they are right now.
pub fn snapshot_cart(lines: &[CheckoutLine]) -> Result<OrderSnapshot, CheckoutError> {
    if lines.is_empty() {
        return Err(CheckoutError::EmptyCart);
    }

    let shortages: Vec<String> = lines
        .iter()
        .filter(|line| line.quantity > line.stock)
        .map(|line| {
            format!(
                "Only {} of {} left in stock, {} requested.",
                line.stock, line.product_name, line.quantity
            )
        })
        .collect();
    if !shortages.is_empty() {
        return Err(CheckoutError::InsufficientStock(shortages));
    }

    let items: Vec<SnapshotItem> = lines
        .iter()
        .map(|line| SnapshotItem {
            product_id: line.product_id,
            product_name: line.product_name.clone(),
            price: line.unit_price,
            quantity: line.quantity,
        })
        .collect();

    let total_amount: Decimal = items
        .iter()
        .map(|item| line_total(item.quantity, item.price))
        .sum();
    if total_amount > MAX_AMOUNT {
        return Err(CheckoutError::TotalTooLarge(total_amount));
    }

    Ok(OrderSnapshot {
        total_amount,
        items,
    })
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    fn line(product_id: i32, name: &str, price: Decimal, quantity: i32) -> CheckoutLine {
        CheckoutLine {
            cart_item_id: product_id * 10,
            product_id,
            product_name: name.to_string(),
            unit_price: price,
            stock: 100,
            quantity,
        }
    }

    #[test]
    fn empty_cart_cannot_be_ordered() {
        assert_eq!(snapshot_cart(&[]), Err(CheckoutError::EmptyCart));
    }

    #[test]
    fn snapshot_captures_price_name_and_total() {
        let lines = vec![line(1, "Toned Milk", dec!(10.00), 5)];
        let snapshot = snapshot_cart(&lines).unwrap();

        assert_eq!(snapshot.total_amount, dec!(50.00));
        assert_eq!(
            snapshot.items,
            vec![SnapshotItem {
                product_id: 1,
                product_name: "Toned Milk".to_string(),
                price: dec!(10.00),
                quantity: 5,
            }]
        );
    }

    #[test]
    fn snapshot_does_not_follow_later_price_changes() {
        let mut lines = vec![
            line(1, "Toned Milk", dec!(10.00), 2),
            line(2, "Basmati Rice", dec!(7.25), 4),
        ];
        let snapshot = snapshot_cart(&lines).unwrap();

        lines[0].unit_price = dec!(12.00);
        lines[0].product_name = "Full Cream Milk".to_string();

        assert_eq!(snapshot.total_amount, dec!(49.00));
        assert_eq!(snapshot.items[0].price, dec!(10.00));
        assert_eq!(snapshot.items[0].product_name, "Toned Milk");
    }

    #[test]
    fn shortages_are_reported_per_line() {
        let mut short = line(1, "Paneer", dec!(3.00), 6);
        short.stock = 2;
        let lines = vec![short, line(2, "Salt", dec!(1.00), 1)];

        match snapshot_cart(&lines) {
            Err(CheckoutError::InsufficientStock(messages)) => {
                assert_eq!(messages.len(), 1);
                assert!(messages[0].contains("Paneer"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn total_must_fit_the_order_column() {
        let mut lines = vec![line(1, "Saffron", dec!(99999999.99), 2)];
        lines[0].stock = 5;

        assert_eq!(
            snapshot_cart(&lines),
            Err(CheckoutError::TotalTooLarge(dec!(199999999.98)))
        );

        let err: AppError = CheckoutError::TotalTooLarge(dec!(199999999.98)).into();
        match err {
            AppError::Validation(errors) => assert_eq!(
                errors.get("items").unwrap()[0],
                "Order total 199999999.98 exceeds the maximum of 99999999.99."
            ),
            other => panic!("unexpected error: {other:?}"),
        }

        lines[0].quantity = 1;
        assert_eq!(snapshot_cart(&lines).unwrap().total_amount, dec!(99999999.99));
    }

    #[test]
    fn empty_cart_maps_to_validation_error() {
        let err: AppError = CheckoutError::EmptyCart.into();
        match err {
            AppError::Validation(errors) => assert_eq!(
                errors.get(NON_FIELD_ERRORS),
                Some(&["Cart is empty".to_string()][..])
            ),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
