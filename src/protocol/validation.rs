//! Pre-parse validation of untrusted frame headers.
//!
//! This runs on the raw header fields before any payload buffer is
//! allocated, so a hostile declared length can never size an allocation.

use crate::config::Limits;
use crate::error::{Error, Result};

/// Validator for incoming client frames.
#[derive(Debug, Clone)]
pub struct FrameValidator {
    limits: Limits,
    accept_unmasked_frames: bool,
}

impl FrameValidator {
    /// Create a validator bounded by `limits`.
    #[must_use]
    pub fn new(limits: Limits) -> Self {
        Self {
            limits,
            accept_unmasked_frames: false,
        }
    }

    /// Accept unmasked client frames (non-compliant, testing only).
    #[must_use]
    pub fn with_accept_unmasked(mut self, accept: bool) -> Self {
        self.accept_unmasked_frames = accept;
        self
    }

    /// Validate the header fields of an incoming frame.
    ///
    /// # Errors
    ///
    /// - `Error::UnmaskedFrame`: client frame without the MASK bit
    /// - `Error::ReservedBitsSet`: RSV bits set (no extensions here)
    /// - `Error::FrameTooLarge`: declared length over the limit
    pub fn validate_incoming(&self, masked: bool, rsv: u8, payload_len: usize) -> Result<()> {
        if !masked && !self.accept_unmasked_frames {
            return Err(Error::UnmaskedFrame);
        }
        if rsv != 0 {
            return Err(Error::ReservedBitsSet);
        }
        self.limits.check_frame_size(payload_len)
    }
}
