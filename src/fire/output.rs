//! Encoding of lighting state into the Fire's output messages.
//!
//! The `encode_*` functions are pure; [`Output`] pairs them with a MIDI
//! connection. All validation happens here, before anything touches the
//! wire.

use super::{Button, ControlBankLeds, Led, PadColor, TrackLed, NUM_PADS};
use crate::screen::{oled_sysex, Screen};
use crate::{Error, OutputDevice};

const SYSEX_HEADER: [u8; 4] = [0xF0, 0x47, 0x7F, 0x43]; // Akai, all-call, Fire
const PAD_COLOR_COMMAND: u8 = 0x65;

const TRACK_LED_FIRST_CC: u8 = 0x28;
const CONTROL_BANK_CC: u8 = 0x1B;

/// The pad hardware renders four intensity steps per channel. Colors are
/// quantized onto these wire values so that a readback of the wire level
/// maps onto the full 0..=127 scale again.
const WIRE_LEVELS: [u8; 4] = [0x00, 0x2A, 0x55, 0x7F];

/// Most pads fit one message; stay under the 14-bit payload length field
const MAX_PADS_PER_MESSAGE: usize = 0x3FFF / 4;

fn quantize(channel: u8) -> u8 {
    WIRE_LEVELS[(channel / 32).min(3) as usize]
}

fn check_pad_index(index: u8) -> Result<(), Error> {
    if index >= NUM_PADS {
        return Err(Error::InvalidParameter {
            what: "pad index",
            value: index as i64,
        });
    }
    Ok(())
}

/// Encode a single pad lighting message.
pub fn encode_pad_color(index: u8, color: PadColor) -> Result<Vec<u8>, Error> {
    let messages = encode_pad_colors(&[(index, color)])?;
    // one pad always fits one message
    Ok(messages.into_iter().next().unwrap_or_default())
}

/// Encode a batched pad lighting update, four payload bytes per pad, split
/// into multiple messages only if the batch exceeds the payload length
/// field. Pad order is preserved; later entries for the same pad win.
pub fn encode_pad_colors(pads: &[(u8, PadColor)]) -> Result<Vec<Vec<u8>>, Error> {
    for &(index, _) in pads {
        check_pad_index(index)?;
    }

    let mut messages = Vec::new();
    for chunk in pads.chunks(MAX_PADS_PER_MESSAGE) {
        let payload_len = (chunk.len() * 4) as u16;

        let mut message = Vec::with_capacity(8 + chunk.len() * 4);
        message.extend(SYSEX_HEADER);
        message.push(PAD_COLOR_COMMAND);
        message.push((payload_len >> 7) as u8);
        message.push((payload_len & 0x7F) as u8);
        for &(index, color) in chunk {
            message.extend([
                index & 0x3F,
                quantize(color.red()),
                quantize(color.green()),
                quantize(color.blue()),
            ]);
        }
        message.push(0xF7);

        messages.push(message);
    }

    Ok(messages)
}

/// Encode a button LED change.
pub fn encode_button_led(button: Button, led: Led) -> [u8; 3] {
    [0xB0, button.id(), led as u8]
}

/// Encode a track LED change. `track` is 1-based (1..=4, top to bottom).
pub fn encode_track_led(track: u8, value: TrackLed) -> Result<[u8; 3], Error> {
    if !(1..=4).contains(&track) {
        return Err(Error::InvalidParameter {
            what: "track number",
            value: track as i64,
        });
    }
    Ok([0xB0, TRACK_LED_FIRST_CC + track - 1, value as u8])
}

/// Encode a control bank indicator change.
pub fn encode_control_bank(leds: ControlBankLeds) -> [u8; 3] {
    [0xB0, CONTROL_BANK_CC, leds.bits()]
}

/// Low-level access to the Fire's output stream. Each method encodes and
/// sends exactly the messages for one lighting change; nothing is buffered.
///
/// ```no_run
/// use fiery::{OutputDevice as _, PadColor};
///
/// let mut output = fiery::fire::Output::guess()?;
/// output.set_pad_color(0, PadColor::new(127, 40, 0))?;
/// # Ok::<(), fiery::Error>(())
/// ```
pub struct Output {
    connection: midir::MidiOutputConnection,
}

impl OutputDevice for Output {
    const MIDI_CONNECTION_NAME: &'static str = "fiery output";
    const MIDI_DEVICE_KEYWORD: &'static str = super::MIDI_DEVICE_KEYWORD;

    fn from_connection(connection: midir::MidiOutputConnection) -> Result<Self, Error> {
        Ok(Self { connection })
    }

    fn send(&mut self, bytes: &[u8]) -> Result<(), Error> {
        self.connection.send(bytes)?;
        Ok(())
    }
}

impl Output {
    pub fn set_pad_color(&mut self, index: u8, color: PadColor) -> Result<(), Error> {
        let message = encode_pad_color(index, color)?;
        self.send(&message)
    }

    pub fn set_pad_colors(&mut self, pads: &[(u8, PadColor)]) -> Result<(), Error> {
        for message in encode_pad_colors(pads)? {
            self.send(&message)?;
        }
        Ok(())
    }

    pub fn set_button_led(&mut self, button: Button, led: Led) -> Result<(), Error> {
        self.send(&encode_button_led(button, led))
    }

    /// Turn off the LEDs of all buttons, one message per button.
    pub fn clear_button_leds(&mut self) -> Result<(), Error> {
        for button in Button::ALL {
            self.set_button_led(button, Led::Off)?;
        }
        Ok(())
    }

    pub fn set_track_led(&mut self, track: u8, value: TrackLed) -> Result<(), Error> {
        let message = encode_track_led(track, value)?;
        self.send(&message)
    }

    pub fn set_control_bank_leds(&mut self, leds: ControlBankLeds) -> Result<(), Error> {
        self.send(&encode_control_bank(leds))
    }

    /// Serialize a screen and upload it to the OLED.
    pub fn send_screen(&mut self, screen: &Screen) -> Result<(), Error> {
        self.send(&oled_sysex(screen))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_pad_message_layout() {
        let message = encode_pad_color(5, PadColor::new(127, 0, 64)).unwrap();
        assert_eq!(
            message,
            vec![0xF0, 0x47, 0x7F, 0x43, 0x65, 0x00, 0x04, 5, 0x7F, 0x00, 0x55, 0xF7]
        );
    }

    #[test]
    fn quantization_boundaries() {
        assert_eq!(quantize(0), 0x00);
        assert_eq!(quantize(31), 0x00);
        assert_eq!(quantize(32), 0x2A);
        assert_eq!(quantize(63), 0x2A);
        assert_eq!(quantize(64), 0x55);
        assert_eq!(quantize(95), 0x55);
        assert_eq!(quantize(96), 0x7F);
        assert_eq!(quantize(127), 0x7F);
    }

    #[test]
    fn out_of_range_pad_index_is_rejected() {
        assert!(matches!(
            encode_pad_color(64, PadColor::RED),
            Err(Error::InvalidParameter {
                what: "pad index",
                value: 64
            })
        ));
        // a bad index anywhere in a batch rejects the whole batch
        assert!(encode_pad_colors(&[(0, PadColor::RED), (200, PadColor::RED)]).is_err());
    }

    #[test]
    fn full_grid_fits_one_message() {
        let pads: Vec<(u8, PadColor)> = (0..64).map(|i| (i, PadColor::GREEN)).collect();
        let messages = encode_pad_colors(&pads).unwrap();

        assert_eq!(messages.len(), 1);
        let message = &messages[0];
        assert_eq!(message.len(), 8 + 64 * 4);
        // 64 * 4 = 256 payload bytes = 0x100, split over two 7-bit bytes
        assert_eq!(message[5], 0x02);
        assert_eq!(message[6], 0x00);
        assert_eq!(*message.last().unwrap(), 0xF7);
        assert!(message[1..message.len() - 1].iter().all(|&b| b < 0x80));
    }

    #[test]
    fn empty_batch_produces_no_messages() {
        assert_eq!(encode_pad_colors(&[]).unwrap(), Vec::<Vec<u8>>::new());
    }

    #[test]
    fn pad_order_is_preserved() {
        let messages =
            encode_pad_colors(&[(3, PadColor::RED), (1, PadColor::BLUE), (3, PadColor::BLACK)])
                .unwrap();
        let payload = &messages[0][7..messages[0].len() - 1];
        assert_eq!(payload[0], 3);
        assert_eq!(payload[4], 1);
        assert_eq!(payload[8], 3);
        // the later entry for pad 3 comes last, so it wins on the device
        assert_eq!(&payload[9..12], &[0x00, 0x00, 0x00]);
    }

    #[test]
    fn button_led_message() {
        assert_eq!(encode_button_led(Button::Play, Led::High), [0xB0, 0x33, 0x02]);
        assert_eq!(encode_button_led(Button::Bank, Led::Off), [0xB0, 0x1A, 0x00]);
        assert_eq!(
            encode_button_led(Button::Record, Led::HighAlternate),
            [0xB0, 0x35, 0x04]
        );
    }

    #[test]
    fn track_led_message() {
        assert_eq!(
            encode_track_led(1, TrackLed::HighRed).unwrap(),
            [0xB0, 0x28, 0x03]
        );
        assert_eq!(
            encode_track_led(4, TrackLed::DullGreen).unwrap(),
            [0xB0, 0x2B, 0x02]
        );
        assert!(encode_track_led(0, TrackLed::Off).is_err());
        assert!(encode_track_led(5, TrackLed::Off).is_err());
    }

    #[test]
    fn control_bank_message() {
        assert_eq!(
            encode_control_bank(ControlBankLeds::none()),
            [0xB0, 0x1B, 0x10]
        );
        assert_eq!(
            encode_control_bank(ControlBankLeds::all()),
            [0xB0, 0x1B, 0x1F]
        );
    }
}
