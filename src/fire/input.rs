//! Decoding of the Fire's input stream into typed [`Event`]s.

use super::{Button, Rotary};
use crate::MidiStreamDecoder;

/// Note number of pad 0; the 64 pads occupy a contiguous note range
const FIRST_PAD_NOTE: u8 = 0x36;
const LAST_PAD_NOTE: u8 = FIRST_PAD_NOTE + 63;

/// Which way a rotary encoder was turned.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Direction {
    Increment,
    Decrement,
}

/// A decoded input event from the device.
#[derive(Debug, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Event {
    /// A pad was hit. `index` is 0..=63, row-major from the top-left;
    /// `velocity` is 1..=127.
    PadPressed { index: u8, velocity: u8 },
    PadReleased { index: u8 },
    ButtonPressed { button: Button },
    ButtonReleased { button: Button },
    /// A rotary was turned. `velocity` is the raw relative magnitude and
    /// grows with turn speed; the slowest increment tick can carry 0.
    RotaryTurned {
        rotary: Rotary,
        direction: Direction,
        velocity: u8,
    },
    /// A touch-sensitive rotary was touched (`pressed: true`) or let go of.
    RotaryTouched { rotary: Rotary, pressed: bool },
    /// A complete SysEx message from the device, including the framing bytes.
    Sysex(Vec<u8>),
}

#[derive(Default)]
enum DecoderState {
    #[default]
    Idle,
    /// Inside a channel voice message; `status` stays current for running
    /// status until the next status byte arrives
    Channel { status: u8, data: [u8; 2], len: usize },
    /// Between 0xF0 and 0xF7, collecting the body
    Sysex(Vec<u8>),
}

/// The Fire's stream decoder.
///
/// The transport delivers bytes in arbitrary chunks, so this is a state
/// machine: a SysEx body or a half-received channel message survives across
/// [`feed`](MidiStreamDecoder::feed) calls. Unrecognized but well-formed
/// messages are dropped; a SysEx truncated by a new status byte is logged
/// and discarded without losing the message that interrupted it.
#[derive(Default)]
pub struct EventDecoder {
    state: DecoderState,
}

impl MidiStreamDecoder for EventDecoder {
    type Message = Event;

    fn feed(&mut self, bytes: &[u8], emit: &mut dyn FnMut(Event)) {
        for &byte in bytes {
            // System real-time may be interleaved anywhere and never
            // disturbs the surrounding message
            if byte >= 0xF8 {
                continue;
            }

            if byte >= 0x80 {
                self.handle_status(byte, emit);
            } else {
                self.handle_data(byte, emit);
            }
        }
    }
}

impl EventDecoder {
    fn handle_status(&mut self, byte: u8, emit: &mut dyn FnMut(Event)) {
        if let DecoderState::Sysex(body) = &mut self.state {
            if byte == 0xF7 {
                let mut message = std::mem::take(body);
                message.push(0xF7);
                self.state = DecoderState::Idle;
                emit(Event::Sysex(message));
                return;
            }
            log::warn!(
                "SysEx truncated by status byte {:#04X} after {} bytes, dropping it",
                byte,
                body.len()
            );
            self.state = DecoderState::Idle;
        }

        match byte {
            0xF0 => self.state = DecoderState::Sysex(vec![0xF0]),
            0x80..=0xBF => {
                self.state = DecoderState::Channel {
                    status: byte,
                    data: [0; 2],
                    len: 0,
                };
            }
            other => {
                log::debug!("Ignoring unsupported status byte {:#04X}", other);
                self.state = DecoderState::Idle;
            }
        }
    }

    fn handle_data(&mut self, byte: u8, emit: &mut dyn FnMut(Event)) {
        match &mut self.state {
            DecoderState::Sysex(body) => body.push(byte),
            DecoderState::Channel { status, data, len } => {
                data[*len] = byte;
                *len += 1;
                if *len == 2 {
                    let event = decode_channel_message(*status, data[0], data[1]);
                    // keep the status byte for running status
                    *len = 0;
                    if let Some(event) = event {
                        emit(event);
                    }
                }
            }
            DecoderState::Idle => {
                log::debug!("Ignoring stray data byte {:#04X}", byte);
            }
        }
    }
}

fn decode_channel_message(status: u8, data1: u8, data2: u8) -> Option<Event> {
    match status & 0xF0 {
        // note on with velocity 0 is a release by MIDI convention
        0x90 if data2 > 0 => decode_key_down(data1, data2),
        0x90 | 0x80 => decode_key_up(data1),
        0xB0 => decode_controller_change(data1, data2),
        _ => {
            log::debug!("Ignoring unsupported message type {:#04X}", status);
            None
        }
    }
}

fn decode_key_down(note: u8, velocity: u8) -> Option<Event> {
    if (FIRST_PAD_NOTE..=LAST_PAD_NOTE).contains(&note) {
        return Some(Event::PadPressed {
            index: note - FIRST_PAD_NOTE,
            velocity,
        });
    }
    if let Some(button) = Button::from_id(note) {
        return Some(Event::ButtonPressed { button });
    }
    if let Some(rotary) = Rotary::from_id(note) {
        return Some(Event::RotaryTouched {
            rotary,
            pressed: true,
        });
    }
    log::debug!("Ignoring note on for unknown note {:#04X}", note);
    None
}

fn decode_key_up(note: u8) -> Option<Event> {
    if (FIRST_PAD_NOTE..=LAST_PAD_NOTE).contains(&note) {
        return Some(Event::PadReleased {
            index: note - FIRST_PAD_NOTE,
        });
    }
    if let Some(button) = Button::from_id(note) {
        return Some(Event::ButtonReleased { button });
    }
    if let Some(rotary) = Rotary::from_id(note) {
        return Some(Event::RotaryTouched {
            rotary,
            pressed: false,
        });
    }
    log::debug!("Ignoring note off for unknown note {:#04X}", note);
    None
}

fn decode_controller_change(cc: u8, value: u8) -> Option<Event> {
    let rotary = match Rotary::from_id(cc) {
        Some(rotary) => rotary,
        None => {
            log::debug!("Ignoring controller change for unknown CC {:#04X}", cc);
            return None;
        }
    };

    // Two's-complement-style relative encoding: small values are clockwise
    // detents, values above 0x40 count down from 0x80
    match value {
        0x00..=0x3F => Some(Event::RotaryTurned {
            rotary,
            direction: Direction::Increment,
            velocity: value,
        }),
        0x41..=0x7F => Some(Event::RotaryTurned {
            rotary,
            direction: Direction::Decrement,
            velocity: 0x80 - value,
        }),
        _ => None,
    }
}

/// Low-level access to the Fire's input stream. See [`InputDevice`] for the
/// connection methods, and [`Fire`](super::Fire) for callback dispatch on
/// top of this.
///
/// ```no_run
/// use fiery::{Event, InputDevice as _};
///
/// let input = fiery::fire::Input::guess(|event| match event {
///     Event::PadPressed { index, velocity } => {
///         println!("pad {} hit at velocity {}", index, velocity)
///     }
///     other => println!("{:?}", other),
/// })?;
/// # Ok::<(), fiery::Error>(())
/// ```
///
/// [`InputDevice`]: crate::InputDevice
pub struct Input;

impl crate::InputDevice for Input {
    const MIDI_CONNECTION_NAME: &'static str = "fiery input";
    const MIDI_DEVICE_KEYWORD: &'static str = super::MIDI_DEVICE_KEYWORD;
    type Decoder = EventDecoder;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(chunks: &[&[u8]]) -> Vec<Event> {
        let mut decoder = EventDecoder::default();
        let mut events = Vec::new();
        for chunk in chunks {
            decoder.feed(chunk, &mut |event| events.push(event));
        }
        events
    }

    #[test]
    fn pad_press_and_release() {
        assert_eq!(
            decode(&[&[0x90, 0x36, 0x64]]),
            vec![Event::PadPressed {
                index: 0,
                velocity: 0x64
            }]
        );
        assert_eq!(
            decode(&[&[0x80, 0x75, 0x00]]),
            vec![Event::PadReleased { index: 63 }]
        );
        // note on with velocity 0 counts as a release
        assert_eq!(
            decode(&[&[0x90, 0x40, 0x00]]),
            vec![Event::PadReleased { index: 10 }]
        );
    }

    #[test]
    fn button_press_and_release() {
        assert_eq!(
            decode(&[&[0x90, 0x33, 0x7F], &[0x80, 0x33, 0x00]]),
            vec![
                Event::ButtonPressed {
                    button: Button::Play
                },
                Event::ButtonReleased {
                    button: Button::Play
                },
            ]
        );
    }

    #[test]
    fn rotary_turns_decode_the_relative_encoding() {
        assert_eq!(
            decode(&[&[0xB0, 0x10, 0x01]]),
            vec![Event::RotaryTurned {
                rotary: Rotary::Volume,
                direction: Direction::Increment,
                velocity: 1
            }]
        );
        assert_eq!(
            decode(&[&[0xB0, 0x13, 0x7F]]),
            vec![Event::RotaryTurned {
                rotary: Rotary::Resonance,
                direction: Direction::Decrement,
                velocity: 1
            }]
        );
        assert_eq!(
            decode(&[&[0xB0, 0x11, 0x05]]),
            vec![Event::RotaryTurned {
                rotary: Rotary::Pan,
                direction: Direction::Increment,
                velocity: 5
            }]
        );
        // value 0 is still an increment tick, just with velocity 0
        assert_eq!(
            decode(&[&[0xB0, 0x10, 0x00]]),
            vec![Event::RotaryTurned {
                rotary: Rotary::Volume,
                direction: Direction::Increment,
                velocity: 0
            }]
        );
        // 0x40 is "no movement" and produces nothing
        assert_eq!(decode(&[&[0xB0, 0x10, 0x40]]), vec![]);
    }

    #[test]
    fn rotary_touch() {
        assert_eq!(
            decode(&[&[0x90, 0x76, 0x7F], &[0x80, 0x76, 0x00]]),
            vec![
                Event::RotaryTouched {
                    rotary: Rotary::Select,
                    pressed: true
                },
                Event::RotaryTouched {
                    rotary: Rotary::Select,
                    pressed: false
                },
            ]
        );
    }

    #[test]
    fn sysex_survives_arbitrary_chunk_boundaries() {
        let events = decode(&[&[0xF0, 0x47], &[0x7F], &[0x43, 0x01], &[0xF7]]);
        assert_eq!(
            events,
            vec![Event::Sysex(vec![0xF0, 0x47, 0x7F, 0x43, 0x01, 0xF7])]
        );
    }

    #[test]
    fn truncated_sysex_does_not_eat_the_next_message() {
        // SysEx interrupted by a pad press: the partial body is dropped, the
        // interrupting message still decodes
        let events = decode(&[&[0xF0, 0x47, 0x7F], &[0x90, 0x36, 0x30]]);
        assert_eq!(
            events,
            vec![Event::PadPressed {
                index: 0,
                velocity: 0x30
            }]
        );
    }

    #[test]
    fn channel_message_split_across_chunks() {
        assert_eq!(
            decode(&[&[0x90], &[0x36], &[0x42]]),
            vec![Event::PadPressed {
                index: 0,
                velocity: 0x42
            }]
        );
    }

    #[test]
    fn running_status() {
        let events = decode(&[&[0xB0, 0x10, 0x01, 0x10, 0x7F]]);
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[1],
            Event::RotaryTurned {
                rotary: Rotary::Volume,
                direction: Direction::Decrement,
                velocity: 1
            }
        );
    }

    #[test]
    fn real_time_bytes_are_transparent() {
        // MIDI clock in the middle of a message must not corrupt it
        assert_eq!(
            decode(&[&[0x90, 0xF8, 0x36, 0xF8, 0x50]]),
            vec![Event::PadPressed {
                index: 0,
                velocity: 0x50
            }]
        );
    }

    #[test]
    fn unknown_messages_are_dropped() {
        assert_eq!(decode(&[&[0x90, 0x00, 0x7F]]), vec![]); // unknown note
        assert_eq!(decode(&[&[0xB0, 0x00, 0x01]]), vec![]); // unknown CC
        assert_eq!(decode(&[&[0xE0, 0x00, 0x40]]), vec![]); // pitch bend
        assert_eq!(decode(&[&[0x12, 0x34]]), vec![]); // stray data bytes
    }
}
