#![warn(clippy::all)]
#![warn(rust_2018_idioms)]
#![deny(rustdoc::broken_intra_doc_links)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! `wtlfu` is a thread-safe, bounded, in-process cache implementing
//! W-TinyLFU admission over a segmented LRU, with TTL expiration driven by
//! a hierarchical timing wheel.
//!
//! A fork of [Micro Moka][micro-moka-git]'s single-threaded design, rebuilt
//! around a sharded index, lock-free-ish event buffers, and a dedicated
//! maintenance thread so the cache can be shared across threads without
//! contending on policy state on every access.
//!
//! [micro-moka-git]: https://github.com/moka-rs/mini-moka
//! [moka-git]: https://github.com/moka-rs/moka
//! [caffeine-git]: https://github.com/ben-manes/caffeine
//!
//! # Features
//!
//! - A cache bounded by a configurable cost budget (entries default to
//!   cost 1; see [`sync::Cache::insert_with_weight`]).
//! - Admission controlled by a count-min-sketch frequency estimate
//!   ([Caffeine][caffeine-git]'s W-TinyLFU), with a Bloom-filter
//!   doorkeeper in front to suppress one-hit wonders.
//! - Optional per-entry time-to-live, expired opportunistically by a
//!   hierarchical timing wheel rather than a timer per entry.
//! - Reads and writes never block on policy-state updates: those are
//!   applied asynchronously by a single maintenance thread draining
//!   buffered events.
//!
//! # Examples
//!
//! ```
//! use std::time::Duration;
//! use wtlfu::sync::Cache;
//!
//! let cache: Cache<String, String> = Cache::new(10_000);
//! cache.insert("k".to_string(), "v".to_string());
//! cache.insert_with_ttl("expires".to_string(), "soon".to_string(), Duration::from_secs(60));
//! cache.run_pending_tasks();
//! assert_eq!(cache.get(&"k".to_string()).map(|v| (*v).clone()), Some("v".to_string()));
//! ```
//!
//! # Minimum Supported Rust Versions
//!
//! This crate's minimum supported Rust versions (MSRV) are the followings:
//!
//! | Feature          | MSRV                       |
//! |:-----------------|:--------------------------:|
//! | default features | Rust 1.76.0 (Feb 8, 2024) |
//!
//! If only the default features are enabled, MSRV will be updated conservatively.
//! When using other features, MSRV might be updated more frequently, up to the
//! latest stable. In both cases, increasing MSRV is _not_ considered a
//! semver-breaking change.

pub(crate) mod admission;
pub(crate) mod buffer;
pub(crate) mod clock;
pub(crate) mod common;
pub(crate) mod entry;
mod error;
pub(crate) mod housekeeper;
pub(crate) mod list;
mod policy;
pub(crate) mod shard;
pub mod sync;
pub(crate) mod wheel;

pub use error::CacheError;
pub use policy::Policy;

#[cfg(doctest)]
mod doctests {
    // https://doc.rust-lang.org/rustdoc/write-documentation/documentation-tests.html#include-items-only-when-collecting-doctests
    #[doc = include_str!("../README.md")]
    struct ReadMeDoctests;
}
