pub mod audit;
pub mod bootstrap;
pub mod client;
pub mod local;
pub mod policy_adapter;
pub mod report;
pub mod runtime;
pub mod scheduler;
pub mod state;

pub use client::{ChannelError, Connector, WsConnector};
pub use local::TableConnector;
pub use runtime::{Harness, HarnessError, HarnessOutcome, StopReason};

use anyhow as _;
use observability as _;
