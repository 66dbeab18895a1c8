mod handler;
pub mod model;

pub use handler::{
    list_businesses, my_business, register_business, show_business, update_my_business,
};
