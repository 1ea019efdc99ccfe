//! Streaming broker that runs one answer session per port.
//!
//! A [`Port`] is the persistent channel to the UI. The [`Broker`] hands every
//! new port to a fresh [`ConnectionSession`], which selects a provider,
//! relays its events onto the port in order, and tears the invocation down
//! when the port disconnects.

pub mod broker;
pub mod cleanup;
pub mod message;
pub mod port;
pub mod session;

#[cfg(test)]
mod testing;

pub use broker::{Broker, BrokerClient, BrokerHandle, Collaborators};
pub use cleanup::CleanupSlot;
pub use message::{FeedbackSink, OptionsLauncher, QuestionMessage, RuntimeMessage};
pub use port::{Port, PortMessage, PortSender, RemotePort};
pub use session::{ConnectionSession, SessionState};
