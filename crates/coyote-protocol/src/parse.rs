//! Parsing chat-style shock commands.
//!
//! Command-line and chat callers write pulses as
//! `<channel> <amp> [freq] [copies]`, for example `A 25 20 5`. This parser
//! is stricter than the daemon: it rejects malformed numbers and negative
//! frequencies up front so the user gets a readable message, and it clamps
//! frequencies above the cap with a note instead of failing.

use coyote_core::limits::{
    AMPLITUDE_MAX, COPIES_MAX, COPIES_MIN, DEFAULT_COPIES, DEFAULT_FREQUENCY, FREQUENCY_MAX,
};
use coyote_core::{Channel, PulseRequest};
use thiserror::Error;

/// A parsed shock command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShockArgs {
    pub request: PulseRequest,
    pub notes: Vec<ParseNote>,
}

/// Adjustments the parser made to the user's input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseNote {
    /// Frequency above the cap was lowered to it.
    ClampedFrequency { from: i64, to: i64 },
}

impl std::fmt::Display for ParseNote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ClampedFrequency { from, to } => {
                write!(f, "Requested freq {from} > {to}, clamped to {to}.")
            }
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ArgsError {
    #[error("Missing arguments.")]
    Missing,

    #[error("Channel must be A or B.")]
    Channel,

    #[error("amp must be an integer 0..100.")]
    Amplitude,

    #[error("freq must be an integer 0..200.")]
    Frequency,

    #[error("copies must be an integer 1..100.")]
    Copies,
}

/// Parses `<channel> <amp> [freq] [copies]`.
pub fn parse_shock_args<S: AsRef<str>>(args: &[S]) -> Result<ShockArgs, ArgsError> {
    let mut iter = args.iter().map(AsRef::as_ref);
    let mut notes = Vec::new();

    let (channel, amp) = match (iter.next(), iter.next()) {
        (Some(channel), Some(amp)) => (channel, amp),
        _ => return Err(ArgsError::Missing),
    };

    let channel: Channel = channel.parse().map_err(|_| ArgsError::Channel)?;

    let amp: i64 = amp
        .parse()
        .ok()
        .filter(|a| (0..=i64::from(AMPLITUDE_MAX)).contains(a))
        .ok_or(ArgsError::Amplitude)?;

    let mut freq = DEFAULT_FREQUENCY;
    if let Some(raw) = iter.next() {
        freq = raw.parse().map_err(|_| ArgsError::Frequency)?;
        if freq < 0 {
            return Err(ArgsError::Frequency);
        }
        let cap = i64::from(FREQUENCY_MAX);
        if freq > cap {
            notes.push(ParseNote::ClampedFrequency { from: freq, to: cap });
            freq = cap;
        }
    }

    let mut copies = DEFAULT_COPIES;
    if let Some(raw) = iter.next() {
        copies = raw
            .parse()
            .ok()
            .filter(|c| (i64::from(COPIES_MIN)..=i64::from(COPIES_MAX)).contains(c))
            .ok_or(ArgsError::Copies)?;
    }

    Ok(ShockArgs {
        request: PulseRequest::new(channel.as_str(), amp, freq, copies),
        notes,
    })
}

/// Usage text shown for `--help` and parse errors.
pub fn usage() -> String {
    format!(
        "Usage:\n  \
         shock <channel> <amp> [freq 0..{FREQUENCY_MAX}] [copies {COPIES_MIN}..{COPIES_MAX}]\n\
         Examples:\n  \
         shock A 25 20 5       -> pulse A, 25% @20Hz, 5x100ms (~0.5s)\n  \
         shock B 30            -> default freq={DEFAULT_FREQUENCY}, copies={DEFAULT_COPIES}\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_command() {
        let args = parse_shock_args(&["a", "25", "30", "7"]).unwrap();
        assert_eq!(args.request, PulseRequest::new("A", 25, 30, 7));
        assert!(args.notes.is_empty());
    }

    #[test]
    fn test_defaults() {
        let args = parse_shock_args(&["B", "30"]).unwrap();
        assert_eq!(args.request, PulseRequest::new("B", 30, 20, 5));
    }

    #[test]
    fn test_missing() {
        assert_eq!(parse_shock_args(&["A"]), Err(ArgsError::Missing));
        assert_eq!(parse_shock_args::<&str>(&[]), Err(ArgsError::Missing));
    }

    #[test]
    fn test_bad_channel_and_amp() {
        assert_eq!(parse_shock_args(&["C", "20"]), Err(ArgsError::Channel));
        assert_eq!(parse_shock_args(&["A", "x"]), Err(ArgsError::Amplitude));
        assert_eq!(parse_shock_args(&["A", "101"]), Err(ArgsError::Amplitude));
    }

    #[test]
    fn test_frequency_clamped_with_note() {
        let args = parse_shock_args(&["A", "20", "300"]).unwrap();
        assert_eq!(args.request.frequency, 200);
        assert_eq!(
            args.notes,
            vec![ParseNote::ClampedFrequency { from: 300, to: 200 }]
        );
        assert_eq!(
            args.notes[0].to_string(),
            "Requested freq 300 > 200, clamped to 200."
        );
    }

    #[test]
    fn test_negative_frequency_rejected() {
        assert_eq!(parse_shock_args(&["A", "20", "-1"]), Err(ArgsError::Frequency));
    }

    #[test]
    fn test_copies_out_of_range() {
        assert_eq!(parse_shock_args(&["A", "20", "20", "0"]), Err(ArgsError::Copies));
        assert_eq!(parse_shock_args(&["A", "20", "20", "101"]), Err(ArgsError::Copies));
    }

    #[test]
    fn test_usage_mentions_format() {
        assert!(usage().contains("shock <channel> <amp>"));
    }
}
