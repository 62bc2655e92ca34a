use std::time::Duration;

use crate::error::FrameError;

/// The `heart-beat` header: how often this side sends, and how often it
/// wants to hear from the peer. Zero disables either direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeartBeat {
    pub outgoing: Duration,
    pub incoming: Duration,
}

impl HeartBeat {
    pub fn from_millis(outgoing: u64, incoming: u64) -> Self {
        Self {
            outgoing: Duration::from_millis(outgoing),
            incoming: Duration::from_millis(incoming),
        }
    }

    pub fn parse(raw: &str) -> Result<Self, FrameError> {
        let invalid = || FrameError::InvalidHeartBeat(raw.to_string());
        let (outgoing, incoming) = raw.split_once(',').ok_or_else(invalid)?;
        let outgoing = outgoing.trim().parse::<u64>().map_err(|_| invalid())?;
        let incoming = incoming.trim().parse::<u64>().map_err(|_| invalid())?;
        Ok(Self::from_millis(outgoing, incoming))
    }

    pub fn to_header(&self) -> String {
        format!(
            "{},{}",
            self.outgoing.as_millis(),
            self.incoming.as_millis()
        )
    }

    /// Interval at which we must send heart-beats, given what the peer advertised.
    pub fn negotiate_outgoing(&self, peer: &HeartBeat) -> Option<Duration> {
        if self.outgoing.is_zero() || peer.incoming.is_zero() {
            return None;
        }
        Some(self.outgoing.max(peer.incoming))
    }

    pub fn negotiate_incoming(&self, peer: &HeartBeat) -> Option<Duration> {
        if self.incoming.is_zero() || peer.outgoing.is_zero() {
            return None;
        }
        Some(self.incoming.max(peer.outgoing))
    }
}
