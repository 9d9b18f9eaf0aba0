//! Asynchronous tile rendering
//!
//! Two dispatchers run side by side: the primary one serves viewport tiles
//! and is cancelled on every pass, the secondary one serves background
//! thumbnail preloads. Both report on one shared event channel.

mod dispatcher;
mod request;
mod worker;

pub use self::dispatcher::RenderDispatcher;
pub use self::request::{DispatcherKind, RenderEvent, RenderRequest, RequestKey};
