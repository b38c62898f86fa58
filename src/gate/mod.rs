//! Admission gate for outbound calls to rate-limited remote services.
//!
//! A [`RateGate`] bounds how many calls per key may start inside a trailing
//! window. Callers over the limit either wait for the window to slide
//! ([`GateMode::Block`]) or are refused ([`GateMode::Reject`]).
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use crawlrelay::gate::{GatePolicy, RateGate};
//!
//! # async fn run() -> crawlrelay::Result<()> {
//! let gate = RateGate::new(GatePolicy::new(3, Duration::from_secs(60))?);
//! let body = gate
//!     .guard("scrape", || async { Ok::<_, crawlrelay::RelayError>("page") })
//!     .await?;
//! assert_eq!(body, "page");
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod limiter;

pub use clock::{Clock, ManualClock, TokioClock};
pub use limiter::{GateMode, GatePolicy, RateGate};

/// Gate key for calls to the scrape service.
pub const SCRAPE_KEY: &str = "scrape";
/// Gate key for calls to the completion service.
pub const COMPLETION_KEY: &str = "completion";
