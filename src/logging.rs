//! Frame-level logging helpers
//!
//! Hex dumps of raw ADUs, shared by the client transport (gated by its
//! `packet_logging` flag) and the server receive/send paths.

use std::fmt;

use tracing::debug;

use crate::utils::to_hex_string;

/// Direction of a logged frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Send,
    Receive,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Send => write!(f, "send"),
            Direction::Receive => write!(f, "receive"),
        }
    }
}

/// Log a raw ADU with its direction and peer
pub fn log_frame(direction: Direction, peer: impl fmt::Display, data: &[u8]) {
    debug!("[MODBUS-TCP] {} peer:{} {}", direction, peer, to_hex_string(data));
}
