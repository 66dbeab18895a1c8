mod handler;
pub mod model;

pub use handler::{
    business_products, create_product, delete_product, list_my_products, update_product,
};
