//! Substrate identifiers shared by connectors and metrics labels.

/// Ephemeral local cluster owned by the runner.
pub const SUBSTRATE_LOCAL: &str = "local";

/// Named in-process cluster shared by several runners.
pub const SUBSTRATE_INPROC: &str = "inproc";

/// Worker process reached over TCP.
pub const SUBSTRATE_REMOTE: &str = "remote";
