//! Ticketing platform connectors.

pub mod mock;
pub mod zendesk;

pub use mock::{MockObjectStore, MockRecord, MockTicketSource};
pub use zendesk::{ZendeskConfig, ZendeskConnector};
