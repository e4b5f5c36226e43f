//! # warden-tower
//!
//! A [`tower`](https://docs.rs/tower) `Layer`/`Service` adapter for
//! [`warden-core`]: wrap any service in a [`WardenLayer`] and every call runs
//! through `warden-core`'s flow control, circuit breaking, hot-parameter
//! control and origin authority checks before `call` reaches the inner
//! service.
//!
//! Admission runs inside `Service::call`'s returned future rather than
//! `poll_ready`, because the caller's origin and any hot-parameter values
//! come from the request itself, which `poll_ready` never sees. See
//! [`WardenLayer`]'s doc comment for the reasoning.
//!
//! ## Feature Flags
//!
//! - `axum`: enables `IntoResponse` for [`WardenError`], converting
//!   rejections to HTTP status codes (429, 403, 503).

mod error;
mod layer;
mod service;

#[cfg(test)]
mod tests;

pub use error::WardenError;
pub use layer::WardenLayer;
pub use service::WardenService;
