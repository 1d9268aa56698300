//! # relay-hub
//!
//! The stateful heart of the relay subsystem.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `connection` | Per-connection state: auth, token, role and feature bits |
//! | `registry` | Live-connection table + aggregate feature bitmask |
//! | `broadcast` | Publish filter and group-send delegation |
//! | `provider` | Feature data provider contract + notifier composition |
//! | `locator` | Feature → provider resolution, authorization, boot init |
//! | `bus` | Typed feature event bus decoupling write paths from fan-out |
//! | `providers` | Built-in providers (counter, app config, user config) |
//!
//! ## Data flow
//!
//! Write path → `FeatureBus` → listener → `FeatureNotifier` →
//! `Broadcaster` (aggregate-bitmask filter) → `GroupSender` (transport).

#![deny(unsafe_code)]

pub mod broadcast;
pub mod bus;
pub mod connection;
pub mod error;
pub mod locator;
pub mod provider;
pub mod providers;
pub mod registry;

pub use broadcast::{BroadcastTarget, Broadcaster, GroupSender};
pub use bus::{FeatureAction, FeatureBus, FeatureEvent, run_feature_listener};
pub use connection::{ClientConnection, ConnectionSnapshot, HeaderSnapshot};
pub use error::FeatureError;
pub use locator::FeatureLocator;
pub use provider::{FeatureDataProvider, FeatureNotifier};
pub use registry::{ActiveFeatures, BASELINE_FEATURES, ConnectionRegistry};
