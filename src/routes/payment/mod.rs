mod handler;
pub mod model;

pub use handler::{cancel_payment, list_my_payments, payfast_notify, show_payment};
