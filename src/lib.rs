//! # bercon
//!
//! Async client for the BattlEye RCON (Remote Console) protocol used to
//! administer Arma / DayZ style game servers.
//!
//! The protocol runs over UDP: the client authenticates with a password,
//! submits console commands correlated by an 8-bit sequence number, and
//! receives unsolicited console broadcasts which it must acknowledge.
//! Command replies may be split across several datagrams and are reassembled
//! transparently. Because the server drops clients that stay silent for more
//! than 45 seconds, the client keeps the association alive with empty
//! command packets.
//!
//! ## Example
//!
//! ```no_run
//! use bercon::{Client, Config};
//!
//! # async fn run() -> bercon::Result<()> {
//! let client = Client::connect("192.168.1.10:2301", "password", Config::default()).await?;
//! let players = client.exec("players").await?;
//! println!("{players}");
//! client.close().await?;
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_const_for_fn)] // Many functions can't be const due to trait bounds
#![allow(clippy::return_self_not_must_use)] // Builder methods don't need must_use

pub mod client;
pub mod config;
pub mod error;
pub mod protocol;

pub use client::Client;
pub use config::Config;
pub use error::{Error, Result};

use std::time::Duration;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Size of the read buffer for a single datagram, bounded by the MTU.
pub const MAX_MTU: usize = 1500;

/// Smallest possible packet: 6-byte header, end-of-header marker, payload
/// type and at least one body byte.
pub const MIN_PACKET_SIZE: usize = 9;

/// Inactivity window after which the server considers a client disconnected.
/// Command exchanges are retried up to this long before giving up.
pub const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(45);

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::client::Client;
    pub use crate::config::Config;
    pub use crate::error::{Error, Result};
    pub use crate::protocol::{Packet, Response};
}
