//! Fresh-connection request helper.
//!
//! The cluster holds no long-lived connections between processes: every
//! probe, registration, submission, or report dials a new TCP connection,
//! writes one message, reads one reply, and hangs up. Each exchange runs
//! under a caller-supplied deadline; a timeout reads the same as an
//! unreachable peer.

use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::error::{CinderError, Result};
use crate::protocol::{self, Message};

/// Send one message to `addr` and wait for the single reply.
pub async fn request(addr: &str, message: &Message, limit: Duration) -> Result<Message> {
    timeout(limit, exchange(addr, message))
        .await
        .map_err(|_| CinderError::Timeout(addr.to_string()))?
}

async fn exchange(addr: &str, message: &Message) -> Result<Message> {
    let mut stream = TcpStream::connect(addr).await?;
    protocol::write_message(&mut stream, message).await?;
    protocol::read_message(&mut stream).await
}
