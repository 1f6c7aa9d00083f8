//! Wire codecs
//!
//! OSC datagrams and raw MIDI messages both decode into `Message`.

mod midi;
mod osc;

pub use midi::{check_midi_out, decode_midi, parse_midi_hex, MidiKind};
pub use osc::{decode_packet, encode_message};
