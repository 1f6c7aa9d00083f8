//! MIDI byte message decoding
//!
//! Raw port bytes become `/midi/{device}/{kind}` messages carrying
//! `[status, data1, data2, blob(raw)]`. Missing data bytes read as 0.

use contracts::{Message, OscArg, RelayError};

/// Channel/system message kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiKind {
    NoteOff,
    NoteOn,
    PolyAftertouch,
    ControlChange,
    ProgramChange,
    ChannelAftertouch,
    PitchBend,
    System,
}

impl MidiKind {
    /// Address segment for this kind
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NoteOff => "note_off",
            Self::NoteOn => "note_on",
            Self::PolyAftertouch => "poly_aftertouch",
            Self::ControlChange => "control_change",
            Self::ProgramChange => "program_change",
            Self::ChannelAftertouch => "channel_aftertouch",
            Self::PitchBend => "pitch_bend",
            Self::System => "system",
        }
    }

    fn from_status(status: u8) -> Self {
        match status & 0xF0 {
            0x80 => Self::NoteOff,
            0x90 => Self::NoteOn,
            0xA0 => Self::PolyAftertouch,
            0xB0 => Self::ControlChange,
            0xC0 => Self::ProgramChange,
            0xD0 => Self::ChannelAftertouch,
            0xE0 => Self::PitchBend,
            _ => Self::System,
        }
    }
}

/// Decode one raw MIDI message from `device`
///
/// # Errors
/// `MalformedMessage` for an empty message or a missing status byte
/// (running status is not tracked across callbacks).
pub fn decode_midi(device: &str, raw: &[u8]) -> Result<Message, RelayError> {
    let Some(&status) = raw.first() else {
        return Err(RelayError::malformed("empty MIDI message"));
    };
    if status < 0x80 {
        return Err(RelayError::malformed(format!(
            "MIDI message starts with data byte 0x{status:02X}"
        )));
    }

    let data1 = raw.get(1).copied().unwrap_or(0);
    let data2 = raw.get(2).copied().unwrap_or(0);

    let mut kind = MidiKind::from_status(status);
    // Many controllers send note-on with velocity 0 instead of note-off
    if kind == MidiKind::NoteOn && data2 == 0 {
        kind = MidiKind::NoteOff;
    }

    Ok(Message::new(
        format!("/midi/{device}/{}", kind.as_str()),
        vec![
            OscArg::Int(i32::from(status)),
            OscArg::Int(i32::from(data1)),
            OscArg::Int(i32::from(data2)),
            OscArg::Blob(raw.to_vec()),
        ],
    ))
}

/// Check an outbound MIDI message: non-empty and led by a status byte
///
/// # Errors
/// `MalformedMessage` otherwise.
pub fn check_midi_out(bytes: &[u8]) -> Result<(), RelayError> {
    match bytes.first() {
        None => Err(RelayError::malformed("empty MIDI message")),
        Some(&status) if status < 0x80 => Err(RelayError::malformed(format!(
            "MIDI message starts with data byte 0x{status:02X}"
        ))),
        Some(_) => Ok(()),
    }
}

/// Parse a hex MIDI string such as `"90 3C 7F"` or `"903c7f"`
///
/// # Errors
/// `MalformedMessage` for odd length or non-hex characters.
pub fn parse_midi_hex(text: &str) -> Result<Vec<u8>, RelayError> {
    let digits: Vec<char> = text.chars().filter(|c| !c.is_whitespace()).collect();
    if digits.len() % 2 != 0 {
        return Err(RelayError::malformed("hex MIDI data has an odd number of digits"));
    }
    digits
        .chunks(2)
        .map(|pair| {
            let byte: String = pair.iter().collect();
            u8::from_str_radix(&byte, 16)
                .map_err(|_| RelayError::malformed(format!("invalid hex byte '{byte}'")))
        })
        .collect()
}
