pub mod assistant;
pub mod command;
pub mod entry;
pub mod item;
pub mod mcp;
pub mod protocol;
pub mod snapshot;
pub mod turn;

pub use entry::*;
pub use protocol::{InboundEvent, ProtocolError, ProtocolEvent, RawEnvelope, ReasoningTarget, parse_envelope_line};
pub use snapshot::{SnapshotError, SnapshotTurn, ThreadSnapshot};
pub use turn::{PENDING_TURN_ID, Turn, TurnStatus};

#[cfg(any(test, feature = "testing"))]
pub mod testing;
