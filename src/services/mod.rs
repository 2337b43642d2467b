pub mod addresses;
pub mod audit;
pub mod carts;
pub mod catalog;
pub mod inventory;
pub mod order_status;
pub mod orders;
pub mod payments;
pub mod pricing;
