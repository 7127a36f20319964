//! Business rules that do not touch the database.

pub mod addresses;
pub mod cart;
pub mod catalog;
pub mod dashboard;
pub mod identity;
pub mod orders;
pub mod profiles;
pub mod role;
