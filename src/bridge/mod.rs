//! Мост между локальной шиной и удалённым брокером по WebSocket.

pub mod correlator;
pub mod expiring;
pub mod frame;
pub mod layout;
pub mod remote;
pub mod state;

pub use correlator::{Correlator, PendingRequest, Resolution, Responder};
use dashbus_error::BridgeError;
pub use expiring::ExpiringSubscription;
pub use frame::{Command, Inbound, Reply, Verb};
pub use layout::{LayoutStore, LAYOUT_PREFIX};
pub use remote::{BridgeOptions, PendingReply, RemoteBridge, DEFAULT_LINK_TOPIC};
pub use state::{LinkState, LinkStatus};

pub type BridgeResult<T> = Result<T, BridgeError>;
