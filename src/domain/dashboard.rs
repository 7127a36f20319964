use rust_decimal::Decimal;

pub const RECENT_ORDERS_LIMIT: i64 = 5;

#[derive(Debug, PartialEq)]
pub struct OrderTotals {
    pub total_amount: Decimal,
    pub count: i64,
}

impl OrderTotals {
    /// From `SUM(total_amount), COUNT(*)`. `SUM` over no rows is NULL and totals zero.
    pub fn from_aggregate(sum: Option<Decimal>, count: i64) -> Self {
        Self {
            total_amount: sum.unwrap_or(Decimal::ZERO),
            count,
        }
    }
}
