//! DG-Lab waveform frame encoding.
//!
//! A frame covers 100 ms and carries four frequency bytes and four
//! strength bytes (one per 25 ms slot). On the wire a frame is the
//! 16-character upper-case hex string of those eight bytes, and frames are
//! sent to the app as `pulse-A:["0A0A0A0A00140000",...]`.
//!
//! A pulse is rendered as `repeat_count` identical frames with a single
//! strength spike in the second slot, preceded by a `clear-<n>` message so
//! it starts immediately instead of queueing behind earlier waveforms.

use std::fmt::Write as _;

use crate::error::ValidationError;
use crate::pulse::{Channel, EffectivePulse};

/// Frames the app accepts in a single `pulse-` message.
pub const MAX_FRAMES_PER_MESSAGE: usize = 100;

/// Longest message body the app accepts.
pub const MAX_MESSAGE_LEN: usize = 1950;

/// One 100 ms waveform frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaveformFrame {
    pub frequency: [u8; 4],
    pub strength: [u8; 4],
}

impl WaveformFrame {
    /// Frame with constant frequency and one strength spike.
    pub fn spike(frequency: u8, amplitude: u8) -> Self {
        Self {
            frequency: [frequency; 4],
            strength: [0, amplitude, 0, 0],
        }
    }

    /// Upper-case hex encoding of the eight frame bytes.
    pub fn to_hex(&self) -> String {
        let mut out = String::with_capacity(16);
        for byte in self.frequency.iter().chain(self.strength.iter()) {
            // Writing to a String cannot fail.
            let _ = write!(out, "{byte:02X}");
        }
        out
    }
}

/// Frames for a validated pulse.
pub fn frames_for(pulse: &EffectivePulse) -> Vec<WaveformFrame> {
    vec![WaveformFrame::spike(pulse.frequency, pulse.amplitude); usize::from(pulse.repeat_count)]
}

/// Message that drops any waveform still queued on `channel`.
pub fn clear_message(channel: Channel) -> String {
    format!("clear-{}", channel.number())
}

/// Splits `frames` into `pulse-` messages that respect the app limits.
///
/// # Errors
///
/// `ValidationError::PulseTooLong` if a message would exceed
/// [`MAX_MESSAGE_LEN`].
pub fn pulse_messages(
    channel: Channel,
    frames: &[WaveformFrame],
) -> Result<Vec<String>, ValidationError> {
    frames
        .chunks(MAX_FRAMES_PER_MESSAGE)
        .map(|chunk| {
            let body = chunk
                .iter()
                .map(|frame| format!("\"{}\"", frame.to_hex()))
                .collect::<Vec<_>>()
                .join(",");
            let message = format!("pulse-{channel}:[{body}]");
            if message.len() > MAX_MESSAGE_LEN {
                return Err(ValidationError::PulseTooLong {
                    len: message.len(),
                    max: MAX_MESSAGE_LEN,
                });
            }
            Ok(message)
        })
        .collect()
}

/// Full message sequence for a pulse: clear first, then the frames.
pub fn encode(pulse: &EffectivePulse) -> Result<Vec<String>, ValidationError> {
    let mut messages = vec![clear_message(pulse.channel)];
    messages.extend(pulse_messages(pulse.channel, &frames_for(pulse))?);
    Ok(messages)
}
