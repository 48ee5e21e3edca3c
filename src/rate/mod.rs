// SPDX-License-Identifier: MIT
//! Sliding-window rate limiting.
//!
//! Approvals are the highest-impact action the service takes (they arm
//! auto-merge), so they are throttled per author, organization and
//! repository. Each [`throttler::SlidingWindowThrottler`] derives a key from
//! the PR identity, resolves a [`config::Limit`] from a hot-reloadable
//! [`config::LimiterConfig`], and checks a per-key [`window::SlidingWindow`]
//! backed by a shared [`window::CountingStore`] so multiple service instances
//! coordinate. [`facade::ThrottleFacade`] runs the throttlers in order and
//! short-circuits on the first one that throttles.

pub mod config;
pub mod facade;
pub mod registry;
pub mod throttler;
pub mod window;

pub use config::{Limit, LimiterConfig};
pub use facade::ThrottleFacade;
pub use registry::Registry;
pub use throttler::{Keyer, SlidingWindowThrottler, Throttle};
pub use window::{CountingStore, InMemoryCounters, LimitOutcome, SlidingWindow};
