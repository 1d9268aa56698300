//! Built-in feature data providers.
//!
//! `app_config` and `user_config` are in-memory stand-ins for the persistent
//! configuration stores of the embedding application; `counter` is the demo
//! topic used to exercise global fan-out end to end.

pub mod app_config;
pub mod counter;
pub mod user_config;

pub use app_config::AppConfigProvider;
pub use counter::CounterProvider;
pub use user_config::UserConfigProvider;
