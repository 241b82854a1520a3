//! Interception of outbound requests for recording and playback

mod http;

pub use http::ReplayTransport;

use crate::config::Mode;

impl Mode {
    /// Whether recordings on disk are consulted before the network
    #[must_use]
    pub fn reads_store(&self) -> bool {
        !matches!(self, Mode::RecordOnly)
    }

    /// Whether the real transport may be used
    #[must_use]
    pub fn may_record(&self) -> bool {
        !matches!(self, Mode::PlaybackOnly)
    }
}
