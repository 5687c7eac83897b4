//! Conversation core: the single-flight controller, the call-mode state
//! machine and runtime counters.

pub mod call_mode;
pub mod controller;
pub mod metrics;

pub use call_mode::{transition, CallEvent, CallModeCoordinator, CallStatus};
pub use controller::{ConversationController, Rejected, SendOutcome, TRANSMISSION_ERROR};
pub use metrics::{Metrics, MetricsSnapshot};
