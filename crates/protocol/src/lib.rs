//! Wire types for codecap.
//!
//! Two wire formats live here:
//!
//! - [`capture`]: the JSON accepted and produced by the capture HTTP endpoint
//! - [`cdp`]: the Chrome DevTools Protocol envelopes exchanged with the
//!   remote headless browser
//!
//! Types in this crate are pure data. Behavior is built on top of them in
//! `codecap-runtime` and `codecap-core`.

pub mod capture;
pub mod cdp;
pub mod types;

pub use capture::*;
pub use cdp::*;
pub use types::*;
