use std::{net::SocketAddr, sync::Arc};

use bytes::BytesMut;
use parking_lot::Mutex;

use crate::{Error, allocation::Allocation};

/// Demultiplexes a TCP byte stream into complete ChannelData or STUN
/// message frames.
///
/// UDP never needs this: each `recv` already returns one complete
/// datagram. TCP has no such boundary, so bytes accumulate here until a
/// full frame (per its own length field) has arrived.
#[derive(Default)]
pub struct FrameReader {
    buf: BytesMut,
}

impl FrameReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Pull the next complete frame out of the buffer, if one has fully
    /// arrived. Channel numbers occupy `[0x4000, 0x7FFF]`; anything below
    /// that is a STUN message and is sized from its own length field.
    pub fn next_frame(&mut self) -> Option<Vec<u8>> {
        if self.buf.len() < 4 {
            return None;
        }

        let size = codec::Decoder::message_size(&self.buf, true).ok()?;

        if self.buf.len() < size {
            return None;
        }

        Some(self.buf.split_to(size).to_vec())
    }
}

/// Wraps an [`Allocation`] with the transport-recovery behavior specific
/// to its underlying connection: UDP allocations ride out packet loss via
/// the STUN retransmission schedule alone, while a TCP (or TLS) allocation
/// additionally has to survive the server tearing down the connection out
/// from under it.
///
/// TLS termination and any HTTP CONNECT / SOCKS tunneling needed to reach
/// the server are the caller's responsibility; this type only reacts to
/// the resulting byte stream.
pub struct Client {
    pub allocation: Arc<Allocation>,
    reconnect_attempts: Mutex<u32>,
}

impl Client {
    pub fn new(allocation: Arc<Allocation>) -> Self {
        Self {
            allocation,
            reconnect_attempts: Mutex::new(0),
        }
    }

    /// Handle a 437 Allocation-Mismatch surfaced after a TCP reconnect: the
    /// server no longer recognizes the allocation bound to the old
    /// connection. `rebind` tears down and re-establishes the transport;
    /// on success the allocation is re-created from scratch. Gives up after
    /// three attempts, matching the bounded retry the rest of the pool uses
    /// for long-term-auth challenges.
    pub async fn recover_from_mismatch(
        &self,
        rebind: impl Fn() -> std::io::Result<()>,
    ) -> Result<(SocketAddr, SocketAddr), Error> {
        {
            let mut attempts = self.reconnect_attempts.lock();
            if *attempts >= 3 {
                return Err(Error::Mismatch);
            }
            *attempts += 1;
        }

        rebind().map_err(|_| Error::Protocol)?;
        self.allocation.clear_reflexive_address();
        let result = self.allocation.allocate().await;

        if result.is_ok() {
            *self.reconnect_attempts.lock() = 0;
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL_BINDING_REQUEST: [u8; 20] = [
        0x00, 0x01, 0x00, 0x00, 0x21, 0x12, 0xa4, 0x42, 0x72, 0x6d, 0x49, 0x42, 0x72, 0x52, 0x64,
        0x48, 0x57, 0x62, 0x4b, 0x2b,
    ];

    #[test]
    fn next_frame_waits_for_the_full_message() {
        let mut reader = FrameReader::new();
        reader.feed(&MINIMAL_BINDING_REQUEST[..10]);
        assert!(reader.next_frame().is_none());

        reader.feed(&MINIMAL_BINDING_REQUEST[10..]);
        let frame = reader.next_frame().unwrap();
        assert_eq!(frame, MINIMAL_BINDING_REQUEST);
    }

    #[test]
    fn next_frame_splits_back_to_back_messages() {
        let mut reader = FrameReader::new();
        reader.feed(&MINIMAL_BINDING_REQUEST);
        reader.feed(&MINIMAL_BINDING_REQUEST);

        assert_eq!(reader.next_frame().unwrap(), MINIMAL_BINDING_REQUEST);
        assert_eq!(reader.next_frame().unwrap(), MINIMAL_BINDING_REQUEST);
        assert!(reader.next_frame().is_none());
    }
}
