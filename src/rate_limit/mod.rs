//! Request admission control
//!
//! A tiered, fixed-window rate limiter protecting API endpoints:
//!
//! - **Policy table**: limits per caller tier and endpoint category, plus a
//!   stricter fixed policy for administrative paths
//! - **Identity resolution**: user id, API key suffix, or anonymized address
//! - **Window counter**: check-and-increment over an injectable store, with a
//!   conditional refund keyed on the window's reset time
//! - **Reclaimer**: background eviction of stale window records
//! - **Middleware**: `X-RateLimit-*` headers on every counted response and a
//!   structured 429 on rejection
//!
//! # Example
//!
//! ```rust,no_run
//! use admission::config::RateLimitingConfig;
//! use admission::rate_limit::{Admission, AdmissionController, RequestIdentity};
//!
//! #[tokio::main]
//! async fn main() {
//!     let controller = AdmissionController::new(&RateLimitingConfig::default());
//!     let _sweeper = controller.reclaimer().spawn();
//!
//!     let identity = RequestIdentity {
//!         source_ip: Some("10.0.0.7".parse().unwrap()),
//!         ..Default::default()
//!     };
//!
//!     if let Admission::Decided(ticket) = controller.admit(&identity, "/api/slides/generate") {
//!         println!("allowed={} remaining={}", ticket.allowed(), ticket.decision.remaining);
//!     }
//! }
//! ```

pub mod clock;
pub mod counter;
pub mod identity;
pub mod middleware;
pub mod policy;
pub mod reclaimer;
pub mod service;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use clock::{Clock, ManualClock, SystemClock};
pub use counter::WindowCounter;
pub use identity::{resolve_tier, AuthenticatedCaller, IdentityResolver, RequestIdentity};
pub use middleware::{
    add_rate_limit_headers, admission_middleware, rate_limited_response, BypassAdmission,
};
pub use policy::{AdminPolicy, PolicyTable};
pub use reclaimer::Reclaimer;
pub use service::{Admission, AdmissionController, AdmissionTicket, PolicyScope};
pub use store::{InMemoryWindowStore, StoreKey, WindowStore};
pub use types::{ClientKey, Decision, EndpointCategory, PolicyEntry, Tier, WindowRecord};
