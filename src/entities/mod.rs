pub mod address;
pub mod audit_log;
pub mod cart;
pub mod cart_item;
pub mod category;
pub mod order;
pub mod order_item;
pub mod payment;
pub mod price_history;
pub mod product;

pub use address::Entity as Address;
pub use audit_log::Entity as AuditLog;
pub use cart::Entity as Cart;
pub use cart_item::Entity as CartItem;
pub use category::Entity as Category;
pub use order::Entity as Order;
pub use order_item::Entity as OrderItem;
pub use payment::Entity as Payment;
pub use price_history::Entity as PriceHistory;
pub use product::Entity as Product;
