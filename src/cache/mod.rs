// Redis-backed state: login sessions and login lockout counters

pub mod login_attempts;
pub mod session;

pub use login_attempts::{LoginAttempts, LoginThrottle};
pub use session::{CachedSession, SessionCacheOperations};
