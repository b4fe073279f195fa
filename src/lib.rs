pub mod error;
pub mod event;
pub mod filter;
pub mod options;
pub mod order;
pub mod pickle;
pub mod plugin;
pub mod result;
pub mod runtime;

pub use error::{ConfigError, RunError, ScenarioError};
pub use event::{Event, EventBus, EventKind, EventPublisher};
pub use options::RuntimeOptions;
pub use order::PickleOrder;
pub use pickle::{Feature, Pickle, PickleStep};
pub use plugin::{ConcurrentEventListener, EventListener, Plugin};
pub use result::{Status, TestResult};
pub use runtime::{Runtime, RuntimeBuilder};
