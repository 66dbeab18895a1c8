mod handler;
pub mod model;

pub use handler::{
    change_password, list_sessions, login, logout, logout_others, me, register, revoke_session,
};
