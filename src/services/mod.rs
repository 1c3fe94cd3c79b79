pub mod carts;
pub mod line_items;
pub mod order_status;
pub mod orders;
pub mod products;
pub mod reservations;
pub mod schedule;
pub mod stock;
pub mod tables;
