mod handler;
pub mod model;

pub use handler::{active_adverts, create_advert, delete_advert, list_my_adverts};
