//! Converge await – readiness predicates per kind, the condition poller and
//! retry loop they run on, and the kind → awaiter registry.

#![forbid(unsafe_code)]

pub mod context;
pub mod events;
pub mod kinds;
pub mod mock;
pub mod quantity;
pub mod registry;
pub mod retry;
pub mod settings;
pub mod watch;

pub use context::{CreateContext, DeleteContext, UpdateContext};
pub use events::{recent_warnings, render_warnings, with_warnings};
pub use kinds::{Capabilities, KindAwaiter, NoAwait};
pub use registry::AwaitRegistry;
pub use retry::lookup_check;
pub use settings::{AwaitSettings, Backoff, RetryPolicy};
pub use watch::ObjectWatch;
