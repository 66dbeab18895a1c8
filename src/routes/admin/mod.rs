mod handler;
pub mod model;

pub use handler::{
    activate_user, approve_business, approve_review, list_businesses, list_reviews, list_users,
    reject_business, reject_review, suspend_user,
};
