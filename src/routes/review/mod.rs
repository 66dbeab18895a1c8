mod handler;
pub mod model;

pub use handler::{business_reviews, create_review, reply_to_review};
