//! Building blocks shared by the saga services: message types, the topic
//! router, the bus clients, and the compensation queue.

pub mod bus;
pub mod cache;
pub mod compensation;
pub mod error;
pub mod messages;
pub mod router;
pub mod runtime;
pub mod saga;
pub mod shutdown;

pub use compensation::Compensator;
pub use error::ServiceError;
pub use messages::*;
pub use saga::{topics, PaymentStatus, Service, Stage};
