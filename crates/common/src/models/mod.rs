//! Warehouse row models

mod product;

pub use product::ProductRow;
