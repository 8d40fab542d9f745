//! Audio provenance and the intake seam used by network legs.
//!
//! Each call has two independent legs: the telephony leg (RTP towards the
//! PSTN/SIP side) and the realtime leg (browser media). Each leg carries audio
//! in both directions, so a frame is tagged with one of four sources, or
//! [`AudioSource::Mixed`] once directions have been combined.

use std::fmt;
use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

/// Which leg and direction produced a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AudioSource {
    /// Audio received from the telephony leg.
    TelephonyIn,
    /// Audio sent out on the telephony leg.
    TelephonyOut,
    /// Audio received from the realtime-media leg.
    RealtimeIn,
    /// Audio sent out on the realtime-media leg.
    RealtimeOut,
    /// Output of the mixer.
    Mixed,
}

impl AudioSource {
    /// All sources a network leg can produce.
    pub const LEGS: [AudioSource; 4] = [
        Self::TelephonyIn,
        Self::TelephonyOut,
        Self::RealtimeIn,
        Self::RealtimeOut,
    ];

    /// The opposite direction on the same leg.
    ///
    /// `Mixed` has no counterpart.
    pub fn counterpart(self) -> Option<AudioSource> {
        match self {
            Self::TelephonyIn => Some(Self::TelephonyOut),
            Self::TelephonyOut => Some(Self::TelephonyIn),
            Self::RealtimeIn => Some(Self::RealtimeOut),
            Self::RealtimeOut => Some(Self::RealtimeIn),
            Self::Mixed => None,
        }
    }

    /// Returns `true` for the inbound direction of either leg.
    pub fn is_inbound(self) -> bool {
        matches!(self, Self::TelephonyIn | Self::RealtimeIn)
    }

    /// Short stable name for logs and stats keys.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TelephonyIn => "telephony-in",
            Self::TelephonyOut => "telephony-out",
            Self::RealtimeIn => "realtime-in",
            Self::RealtimeOut => "realtime-out",
            Self::Mixed => "mixed",
        }
    }
}

impl fmt::Display for AudioSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Media type of a network packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaKind {
    /// Audio payload.
    Audio,
    /// Video payload, ignored by this crate.
    Video,
    /// Anything else (data channels, RTCP, ...).
    Other,
}

/// Entry point for raw packets delivered by a network leg.
///
/// Legs call this from their own receive thread; implementations must not
/// block beyond a short critical section.
pub trait NetworkAudioIntake: Send + Sync {
    /// Offers one packet payload. Returns `true` if it was accepted.
    fn on_network_audio(
        &self,
        remote: SocketAddr,
        kind: MediaKind,
        payload: &[u8],
        source: AudioSource,
    ) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counterpart_is_symmetric() {
        for source in AudioSource::LEGS {
            let other = source.counterpart().unwrap();
            assert_eq!(other.counterpart(), Some(source));
            assert_ne!(other, source);
        }
        assert_eq!(AudioSource::Mixed.counterpart(), None);
    }

    #[test]
    fn test_source_display() {
        assert_eq!(AudioSource::TelephonyIn.to_string(), "telephony-in");
        assert_eq!(format!("{}", AudioSource::Mixed), "mixed");
    }

    #[test]
    fn test_inbound_directions() {
        assert!(AudioSource::TelephonyIn.is_inbound());
        assert!(AudioSource::RealtimeIn.is_inbound());
        assert!(!AudioSource::TelephonyOut.is_inbound());
        assert!(!AudioSource::Mixed.is_inbound());
    }
}
