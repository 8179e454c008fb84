//! Lifecycle orchestration.
//!
//! `LifecycleOrchestrator::handle_request` takes one `(actor, action, unit)`
//! request through authorizing, resolving, dispatching and confirming, and
//! always ends in a user-visible [`Outcome`]. Progress goes to the flow's
//! [`StatusSink`]: `Accepted` once the request is about to touch the
//! runtime, `Finished` at the end.

pub mod delay;
mod lifecycle;
mod locks;
pub mod outcome;
pub mod status;


pub use delay::{Delay, TokioDelay};
pub use lifecycle::{FlowContext, FlowState, LifecycleOrchestrator};
pub use outcome::{DispatchStage, Outcome};
pub use status::{NullSink, StatusSink, StatusUpdate};
