//! Latency Envelope Module
//!
//! Encodes a monotonic send timestamp into the first 8 bytes of a benchmark
//! payload so the receiving side can compute end-to-end delivery latency.
//! Both ends of a run live in the same process and share one clock origin.

use std::sync::OnceLock;
use std::time::Instant;
use thiserror::Error;

/// Number of leading payload bytes occupied by the timestamp
pub const HEADER_LEN: usize = 8;

const FILLER: u8 = b'#';

static ORIGIN: OnceLock<Instant> = OnceLock::new();

/// Envelope error types
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnvelopeError {
    #[error("payload of {0} bytes is shorter than the {HEADER_LEN}-byte envelope")]
    TooShort(usize),

    #[error("payload size {0} cannot hold the {HEADER_LEN}-byte envelope")]
    PayloadTooSmall(usize),
}

/// Nanoseconds elapsed since the process-wide clock origin.
///
/// The origin is fixed by the first call, so callers that need non-zero
/// timestamps should call this once at startup.
pub fn monotonic_nanos() -> u64 {
    let origin = ORIGIN.get_or_init(Instant::now);
    origin.elapsed().as_nanos() as u64
}

/// Build a payload of exactly `size` bytes stamped with the current time
pub fn encode(size: usize) -> Result<Vec<u8>, EnvelopeError> {
    encode_at(size, monotonic_nanos())
}

/// Build a payload of exactly `size` bytes stamped with `timestamp`
pub fn encode_at(size: usize, timestamp: u64) -> Result<Vec<u8>, EnvelopeError> {
    if size < HEADER_LEN {
        return Err(EnvelopeError::PayloadTooSmall(size));
    }
    let mut data = vec![FILLER; size];
    data[..HEADER_LEN].copy_from_slice(&timestamp.to_be_bytes());
    Ok(data)
}

/// Read the send timestamp from the front of a payload
pub fn decode(payload: &[u8]) -> Result<u64, EnvelopeError> {
    let header: [u8; HEADER_LEN] = payload
        .get(..HEADER_LEN)
        .and_then(|h| h.try_into().ok())
        .ok_or(EnvelopeError::TooShort(payload.len()))?;
    Ok(u64::from_be_bytes(header))
}
