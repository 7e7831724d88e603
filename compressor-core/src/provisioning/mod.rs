//! Services hosted on the provisioning network.
//!
//! [`http`] serves the configuration page, the scan table, and the credential
//! form; [`dhcp`] hands out addresses to the phone or laptop doing the setup.

pub mod dhcp;
pub mod http;

pub use dhcp::{DhcpServer, DhcpServerConfig};
pub use http::{HttpError, HttpExchange, handle_request};
