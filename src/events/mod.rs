mod bus;
mod types;

pub use bus::{connect_broker, EventBus};
pub use types::{EventType, VideoEvent};
