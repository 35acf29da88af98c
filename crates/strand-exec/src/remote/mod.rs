//! Remote workers reached over TCP.
//!
//! [`RemoteConnector`] attaches a runner to a [`WorkerServer`] running in another
//! process. Frames are newline-delimited JSON; see [`protocol`].
mod client;
pub mod protocol;
mod server;

pub use client::{RemoteConnector, RemoteSession, TCP_SCHEME};
pub use server::WorkerServer;
