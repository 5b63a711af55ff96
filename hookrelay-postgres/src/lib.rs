pub mod store;

pub use store::{PostgresDeadLetterStore, PostgresDeliveryStore, PostgresEndpointStore};
