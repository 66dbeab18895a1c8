mod handler;
pub mod model;

pub use handler::{
    cancel_downgrade, downgrade_package, list_packages, renew_package, upgrade_package,
};
