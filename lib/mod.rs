// osc-session: console engine for driving OSC peers
//
// Text in, datagrams out: lines are tokenized, typed through the tag
// registry and sent to the selected peer; inbound messages are routed to
// subscribers or printed. Queries and timed effects are built on top.

// Re-export the codec and transport so front ends need only this crate
pub use osc_core::*;
pub use osc_transport::*;

pub mod commands;
pub mod config;
pub mod effects;
pub mod error;
pub mod link;
pub mod output;
pub mod query;
pub mod registry;
pub mod scheduler;
pub mod session;
pub mod subscriptions;
pub mod tokenize;

pub use commands::{CommandDispatcher, CommandFn};
pub use config::SessionConfig;
pub use effects::{FadeSpec, Waveform};
pub use error::{Result, SessionError};
pub use link::{Link, Peer};
pub use output::{MemoryOutput, Output};
pub use query::{query, QueryOptions};
pub use registry::{FormatOptions, TypeRegistry};
pub use scheduler::{CancelHandle, Scheduler};
pub use session::{Lifecycle, PeerState, Session};
pub use subscriptions::{SubscriptionId, SubscriptionRegistry};
pub use tokenize::tokenize;
