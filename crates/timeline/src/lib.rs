pub mod collapse;
pub mod delta;
pub mod merge;
pub mod refresh;
pub mod router;
pub mod segment;
pub mod snapshot;
pub mod store;
pub mod timeline;
pub mod views;

pub use collapse::CollapseState;
pub use refresh::{RefreshDecision, RefreshGate};
pub use router::{RouteSource, TurnRouter};
pub use segment::{Exploration, ExplorationStatus, SegmentedItem, WorkingItem};
pub use store::TurnStore;
pub use timeline::{ThreadTimeline, TimelineState};
pub use views::{TurnView, build_turn_views};
