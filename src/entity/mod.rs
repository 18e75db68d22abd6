pub mod addresses;
pub mod cart_items;
pub mod enums;
pub mod order_items;
pub mod order_status_history;
pub mod orders;
pub mod payments;
pub mod product_variants;
pub mod products;

pub use addresses::Entity as Addresses;
pub use cart_items::Entity as CartItems;
pub use order_items::Entity as OrderItems;
pub use order_status_history::Entity as OrderStatusHistory;
pub use orders::Entity as Orders;
pub use payments::Entity as Payments;
pub use product_variants::Entity as ProductVariants;
pub use products::Entity as Products;
