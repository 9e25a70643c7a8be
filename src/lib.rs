//! Client core for the admin panel API: envelope normalization, a retrying
//! transport with single-flight token refresh, typed result helpers, a local
//! TTL cache and the auth / admin services built on top.

pub mod api;
pub mod client;
pub mod config;
pub mod envelope;
pub mod error;
pub mod session;
pub mod storage;
pub mod telemetry;

pub use api::{AuthService, PermissionService, RoleService, UserService};
pub use client::{ApiClient, ApiClientBuilder, NoticeLevel, Notifier, RequestConfig, SessionEvent};
pub use config::ClientConfig;
pub use envelope::{normalize, CanonicalResult};
pub use error::{ApiError, ApiResult};
pub use session::{Session, TransportMode};

// Test-only printing helper: expands to eprintln! in debug and test builds.
#[cfg(any(test, debug_assertions))]
#[macro_export]
macro_rules! tprintln {
    ($($arg:tt)*) => ( eprintln!($($arg)*) );
}

// In release builds tprintln! only type-checks its arguments.
#[cfg(not(any(test, debug_assertions)))]
#[macro_export]
macro_rules! tprintln {
    ($($arg:tt)*) => ({
        if false { let _ = format!($($arg)*); }
    });
}
