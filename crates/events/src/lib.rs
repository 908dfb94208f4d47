//! Domain & integration events: envelopes, the bus abstraction, command/event
//! sum-type traits, projections, sagas, and tenant scoping.

pub mod bus;
pub mod command;
pub mod envelope;
pub mod event;
pub mod handler;
pub mod in_memory_bus;
pub mod projection;
pub mod runner;
pub mod saga;
pub mod tenant;

pub use bus::{EventBus, Subscription};
pub use command::Command;
pub use envelope::{EventEnvelope, EventMetadata, TraceContext};
pub use event::Event;
pub use handler::{execute, CommandHandler};
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
pub use projection::Projection;
pub use runner::{ProjectionCursor, ProjectionError, ProjectionRunner};
pub use saga::{Saga, SagaAction};
pub use tenant::TenantScoped;

/// Domain events emitted from business operations (re-exported per-aggregate
/// from each business crate; this module is a documentation anchor only).
pub mod domain {}

/// Integration events meant for external consumers / message brokers.
pub mod integration {}
