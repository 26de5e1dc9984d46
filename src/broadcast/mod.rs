//! Live job status fan-out
//!
//! The execution queue publishes a [`JobStatusEvent`] at every lifecycle step;
//! the [`StatusBroadcaster`] forwards each one to every connected WebSocket
//! observer. There is no per-job filtering: every observer sees every event.

mod event;
mod hub;

pub use event::{JobStatus, JobStatusEvent};
pub use hub::{DEFAULT_CONNECTION_BUFFER, DEFAULT_EVENT_CAPACITY, StatusBroadcaster};
