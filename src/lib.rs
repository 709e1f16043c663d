//! TCP upload client for lottery agency betting records: fixed-layout binary
//! frames, batch-at-a-time delivery, and a winners query at end of stream.

pub mod cli;
pub mod config;
pub mod protocol;
pub mod shutdown;
pub mod source;
pub mod transport;
pub mod uplink;
