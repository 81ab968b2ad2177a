pub mod envelope;
pub mod listener_index;
pub mod publisher;
pub mod registry;
pub mod subscriber;
pub mod topic;

pub use envelope::{Envelope, Frame, Targets};
pub use listener_index::ListenerIndex;
pub use publisher::Publisher;
pub use registry::TopicRegistry;
pub use subscriber::{ListenOutcome, Subscriber};
pub use topic::{ConnectionId, Topic};
