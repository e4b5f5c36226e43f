//! # warden-core
//!
//! In-process traffic governance: flow control, circuit breaking,
//! hot-parameter throttling and origin authority, all evaluated against a
//! shared sliding-window metric substrate before a protected call runs.
//!
//! A resource is entered through a [`Registry`]'s [`SlotChain`], which
//! resolves the resource's nodes, runs the check pipeline, and returns an
//! admission outcome instead of throwing — see [`SlotChain::entry`] and
//! [`Admission`]. The calling convention (one `entry`/`exit` pair per
//! logical call) is carried by a thread-local [`Context`] stack; see the
//! `context` module for notes on the explicit-context alternative an
//! async adapter built on this crate needs.
//!
//! ## Example
//!
//! ```rust
//! use warden_core::context::with_context;
//! use warden_core::context::Context;
//! use warden_core::error::EntryType;
//! use warden_core::param_metric::ParamValue;
//! use warden_core::rules::FlowRule;
//! use warden_core::rules::Grade;
//! use warden_core::slots::system::SystemSample;
//! use warden_core::Registry;
//! use warden_core::TimeSource;
//!
//! let registry = Registry::new();
//! registry.flow_rules.set("checkout", vec![FlowRule::new("checkout", Grade::Qps, 100.0)]);
//! let chain = registry.slot_chain_for("checkout");
//! let clock = TimeSource::new();
//! let entrance = registry.entrance_node_for("default");
//! let ctx = Context::new("default", "default", entrance);
//!
//! with_context(ctx, |ctx| {
//!     let now = clock.now_millis();
//!     match chain.entry(ctx, EntryType::In, 1, now, &[] as &[ParamValue], SystemSample::default()) {
//!         Ok(_wait) => {
//!             // do the protected work, then:
//!             let _ = chain.exit(ctx, 5, true, clock.now_millis());
//!         }
//!         Err(_blocked) => {}
//!     }
//! });
//! ```

pub mod chain;
pub mod cluster;
pub mod context;
pub mod degrade_checker;
pub mod error;
pub mod metrics;
pub mod node;
pub mod param_metric;
pub mod registry;
pub mod rules;
pub mod shapers;
pub mod slots;
pub mod time;

pub use chain::SlotChain;
pub use context::Context;
pub use context::Entry;
pub use error::BlockError;
pub use error::EntryType;
pub use error::ErrorEntryFreeError;
pub use error::ResourceType;
pub use registry::Registry;
pub use shapers::Admission;
pub use time::TimeSource;
