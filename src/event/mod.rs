mod bus;
mod canonical;
mod events;

pub use bus::{EventBus, EventHandler, EventPublisher};
pub use canonical::{CanonicalOrderEventPublisher, canonical_order};
pub use events::{Event, EventKind};
