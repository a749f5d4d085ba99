/*!
# Akai Fire device API

The low-level [`Input`]/[`Output`] pair gives one-MIDI-message-per-call
access to the protocol; the high-level [`Fire`] session composes them with
an event dispatcher and a session-owned [`Screen`](crate::Screen).
*/

mod input;
pub use input::*;

mod output;
pub use output::*;

mod dispatch;
pub use dispatch::*;

use std::sync::{Arc, Mutex, PoisonError};

use crate::screen::{oled_sysex, Screen};
use crate::{Error, InputDevice as _, InputDeviceHandler, OutputDevice as _};

/// Port name fragment the Fire registers under
pub const MIDI_DEVICE_KEYWORD: &str = "FL STUDIO FIRE";

/// Number of velocity-sensitive RGB pads on the 4x16 grid
pub const NUM_PADS: u8 = 64;

/// One of the Fire's labeled buttons.
///
/// Using a closed enum (rather than raw controller numbers) means an invalid
/// button ID can never reach the codec.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Button {
    Step,
    Note,
    Drum,
    Perform,
    Shift,
    Alt,
    Pattern,
    Play,
    Stop,
    Record,
    Bank,
    Browser,
    Solo1,
    Solo2,
    Solo3,
    Solo4,
    PatternUp,
    PatternDown,
    GridLeft,
    GridRight,
}

impl Button {
    pub const ALL: [Button; 20] = [
        Button::Step,
        Button::Note,
        Button::Drum,
        Button::Perform,
        Button::Shift,
        Button::Alt,
        Button::Pattern,
        Button::Play,
        Button::Stop,
        Button::Record,
        Button::Bank,
        Button::Browser,
        Button::Solo1,
        Button::Solo2,
        Button::Solo3,
        Button::Solo4,
        Button::PatternUp,
        Button::PatternDown,
        Button::GridLeft,
        Button::GridRight,
    ];

    /// The note/controller number this button uses on the wire
    pub(crate) fn id(self) -> u8 {
        match self {
            Button::Step => 0x2C,
            Button::Note => 0x2D,
            Button::Drum => 0x2E,
            Button::Perform => 0x2F,
            Button::Shift => 0x30,
            Button::Alt => 0x31,
            Button::Pattern => 0x32,
            Button::Play => 0x33,
            Button::Stop => 0x34,
            Button::Record => 0x35,
            Button::Bank => 0x1A,
            Button::Browser => 0x21,
            Button::Solo1 => 0x24,
            Button::Solo2 => 0x25,
            Button::Solo3 => 0x26,
            Button::Solo4 => 0x27,
            Button::PatternUp => 0x1F,
            Button::PatternDown => 0x20,
            Button::GridLeft => 0x22,
            Button::GridRight => 0x23,
        }
    }

    pub(crate) fn from_id(id: u8) -> Option<Button> {
        match id {
            0x2C => Some(Button::Step),
            0x2D => Some(Button::Note),
            0x2E => Some(Button::Drum),
            0x2F => Some(Button::Perform),
            0x30 => Some(Button::Shift),
            0x31 => Some(Button::Alt),
            0x32 => Some(Button::Pattern),
            0x33 => Some(Button::Play),
            0x34 => Some(Button::Stop),
            0x35 => Some(Button::Record),
            0x1A => Some(Button::Bank),
            0x21 => Some(Button::Browser),
            0x24 => Some(Button::Solo1),
            0x25 => Some(Button::Solo2),
            0x26 => Some(Button::Solo3),
            0x27 => Some(Button::Solo4),
            0x1F => Some(Button::PatternUp),
            0x20 => Some(Button::PatternDown),
            0x22 => Some(Button::GridLeft),
            0x23 => Some(Button::GridRight),
            _ => None,
        }
    }
}

/// One of the endless rotary encoders.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Rotary {
    Volume,
    Pan,
    Filter,
    Resonance,
    /// The push-click select wheel next to the display
    Select,
}

impl Rotary {
    pub const ALL: [Rotary; 5] = [
        Rotary::Volume,
        Rotary::Pan,
        Rotary::Filter,
        Rotary::Resonance,
        Rotary::Select,
    ];

    /// The controller/note number this rotary uses on the wire
    pub(crate) fn id(self) -> u8 {
        match self {
            Rotary::Volume => 0x10,
            Rotary::Pan => 0x11,
            Rotary::Filter => 0x12,
            Rotary::Resonance => 0x13,
            Rotary::Select => 0x76,
        }
    }

    pub(crate) fn from_id(id: u8) -> Option<Rotary> {
        match id {
            0x10 => Some(Rotary::Volume),
            0x11 => Some(Rotary::Pan),
            0x12 => Some(Rotary::Filter),
            0x13 => Some(Rotary::Resonance),
            0x76 => Some(Rotary::Select),
            _ => None,
        }
    }
}

/// Brightness of a button LED.
///
/// Every button has a primary color; the dual-color buttons (Play, Record,
/// the mode buttons) additionally accept the `*Alternate` variants for their
/// second color. On single-color buttons the alternate variants fall back to
/// the primary color.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum Led {
    Off = 0x00,
    Dull = 0x01,
    High = 0x02,
    DullAlternate = 0x03,
    HighAlternate = 0x04,
}

/// State of one of the four track (mute/solo rectangle) LEDs.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum TrackLed {
    Off = 0x00,
    DullRed = 0x01,
    DullGreen = 0x02,
    HighRed = 0x03,
    HighGreen = 0x04,
}

/// The control bank indicator LEDs, toggled as one bitmask message.
///
/// The device requires the base flag in every control bank message; all
/// constructors carry it, so an invalid mask cannot be built.
///
/// ```
/// # use fiery::ControlBankLeds;
/// let leds = ControlBankLeds::none().channel(true).user1(true);
/// ```
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ControlBankLeds(u8);

const CONTROL_BANK_BASE: u8 = 0x10;

impl ControlBankLeds {
    /// All indicator LEDs off (only the mandatory base flag set)
    pub fn none() -> Self {
        Self(CONTROL_BANK_BASE)
    }

    /// All four indicator LEDs on
    pub fn all() -> Self {
        Self(CONTROL_BANK_BASE | 0x0F)
    }

    pub fn channel(self, on: bool) -> Self {
        self.toggle(0x01, on)
    }

    pub fn mixer(self, on: bool) -> Self {
        self.toggle(0x02, on)
    }

    pub fn user1(self, on: bool) -> Self {
        self.toggle(0x04, on)
    }

    pub fn user2(self, on: bool) -> Self {
        self.toggle(0x08, on)
    }

    fn toggle(self, flag: u8, on: bool) -> Self {
        if on {
            Self(self.0 | flag)
        } else {
            Self(self.0 & !flag)
        }
    }

    /// The raw mask as sent to the device
    pub fn bits(self) -> u8 {
        self.0
    }
}

impl Default for ControlBankLeds {
    fn default() -> Self {
        Self::none()
    }
}

/// Maximum value of a [`PadColor`] channel
pub const MAX_PAD_CHANNEL: u8 = 127;

/// An RGB pad color. Each component may only go up to 127; the codec
/// quantizes components down to the pad hardware's native intensity steps
/// (see [`encode_pad_color`]).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PadColor {
    r: u8,
    g: u8,
    b: u8,
}

impl PadColor {
    pub const BLACK: PadColor = PadColor { r: 0, g: 0, b: 0 };
    pub const WHITE: PadColor = PadColor { r: 127, g: 127, b: 127 };
    pub const RED: PadColor = PadColor { r: 127, g: 0, b: 0 };
    pub const GREEN: PadColor = PadColor { r: 0, g: 127, b: 0 };
    pub const BLUE: PadColor = PadColor { r: 0, g: 0, b: 127 };
    pub const YELLOW: PadColor = PadColor { r: 127, g: 127, b: 0 };
    pub const CYAN: PadColor = PadColor { r: 0, g: 127, b: 127 };
    pub const MAGENTA: PadColor = PadColor { r: 127, g: 0, b: 127 };

    /// Create a new PadColor from the individual component values
    pub fn new(r: u8, g: u8, b: u8) -> Self {
        let self_ = Self { r, g, b };
        assert!(self_.is_valid());
        self_
    }

    /// Check whether the color is valid - each component may only go up to
    /// [`MAX_PAD_CHANNEL`]
    pub fn is_valid(&self) -> bool {
        self.r <= MAX_PAD_CHANNEL && self.g <= MAX_PAD_CHANNEL && self.b <= MAX_PAD_CHANNEL
    }

    pub fn red(&self) -> u8 {
        self.r
    }
    pub fn green(&self) -> u8 {
        self.g
    }
    pub fn blue(&self) -> u8 {
        self.b
    }
}

/// Which 1-based row of the 4x16 grid a pad index lies in
pub fn pad_row(index: u8) -> u8 {
    index / 16 + 1
}

/// The high-level Fire session: a connected input + output pair, an event
/// dispatcher, and a session-owned drawing [`Screen`].
///
/// # Threading contract
///
/// Listener callbacks run synchronously on the MIDI reader thread, one event
/// at a time. They must not block for long - decoding stalls while they run.
/// Hand longer work off to another thread (e.g. through a channel).
///
/// Writes are synchronous and unbuffered: each `set_*` call encodes and
/// blocks on the transport until the message is handed off. There is no
/// internal queue and no retry; pace high-frequency updates (animations)
/// yourself.
///
/// Dropping the session closes both MIDI connections on every exit path.
/// Use [`Fire::close`] if the hardware should also go dark.
///
/// ```no_run
/// use fiery::{Event, Fire, PadColor};
///
/// let mut fire = Fire::guess()?;
///
/// fire.add_global_listener(|event| {
///     if let Event::PadPressed { index, velocity } = *event {
///         println!("pad {} hit at velocity {}", index, velocity);
///     }
/// });
///
/// fire.set_pad_color(0, PadColor::RED)?;
/// fire.screen_mut().draw_text("Hello Fire", 20, 28, true);
/// fire.render_screen()?;
/// # Ok::<(), fiery::Error>(())
/// ```
pub struct Fire {
    output: Output,
    // never read, but it keeps the input connection (and reader thread) alive
    #[allow(dead_code)]
    input: InputDeviceHandler,
    dispatcher: Arc<Mutex<Dispatcher>>,
    // Last written color per pad. Purely a retransmission filter for
    // set_multiple_pad_colors - the device holds the real state.
    pad_shadow: [Option<PadColor>; 64],
    screen: Screen,
}

impl Fire {
    /// Connect to the first MIDI ports matching the Fire's default port name.
    pub fn guess() -> Result<Self, Error> {
        Self::with_device_keyword(MIDI_DEVICE_KEYWORD)
    }

    /// Connect to the first MIDI ports whose names contain `keyword`.
    /// Fails with [`Error::DeviceNotFound`] if no such port exists.
    pub fn with_device_keyword(keyword: &str) -> Result<Self, Error> {
        let dispatcher = Arc::new(Mutex::new(Dispatcher::new()));

        let reader_dispatcher = Arc::clone(&dispatcher);
        let input = Input::with_device_keyword(keyword, move |event| {
            dispatch(&reader_dispatcher, &event);
        })?;
        let output = Output::with_device_keyword(keyword)?;

        Ok(Self {
            output,
            input,
            dispatcher,
            pad_shadow: [None; 64],
            screen: Screen::new(),
        })
    }

    // --- pads ---

    /// Light a single pad. `index` must be below [`NUM_PADS`].
    pub fn set_pad_color(&mut self, index: u8, color: PadColor) -> Result<(), Error> {
        self.output.set_pad_color(index, color)?;
        self.pad_shadow[index as usize] = Some(color);
        Ok(())
    }

    /// Light multiple pads in one batched message, retransmitting only the
    /// pads whose color actually changed since they were last written.
    pub fn set_multiple_pad_colors(&mut self, pads: &[(u8, PadColor)]) -> Result<(), Error> {
        let changed = diff_pad_batch(&self.pad_shadow, pads);
        if changed.is_empty() {
            return Ok(());
        }

        self.output.set_pad_colors(&changed)?;
        for &(index, color) in &changed {
            self.pad_shadow[index as usize] = Some(color);
        }
        Ok(())
    }

    /// Turn all 64 pads off with a single batched message.
    pub fn clear_pads(&mut self) -> Result<(), Error> {
        self.reset_pads(PadColor::BLACK)
    }

    /// Set all 64 pads to the same color with a single batched message,
    /// bypassing the shadow diff.
    pub fn reset_pads(&mut self, color: PadColor) -> Result<(), Error> {
        let pads: Vec<(u8, PadColor)> = (0..NUM_PADS).map(|index| (index, color)).collect();
        self.output.set_pad_colors(&pads)?;
        self.pad_shadow = [Some(color); 64];
        Ok(())
    }

    // --- LEDs ---

    pub fn set_button_led(&mut self, button: Button, led: Led) -> Result<(), Error> {
        self.output.set_button_led(button, led)
    }

    /// Turn off the LEDs of all buttons
    pub fn clear_button_leds(&mut self) -> Result<(), Error> {
        self.output.clear_button_leds()
    }

    /// Set one of the four track LEDs. `track` is 1-based (1..=4).
    pub fn set_track_led(&mut self, track: u8, value: TrackLed) -> Result<(), Error> {
        self.output.set_track_led(track, value)
    }

    pub fn set_control_bank_leds(&mut self, leds: ControlBankLeds) -> Result<(), Error> {
        self.output.set_control_bank_leds(leds)
    }

    // --- screen ---

    /// The session-owned drawing screen. Drawing here changes nothing on the
    /// hardware until [`Fire::render_screen`] is called.
    pub fn screen(&self) -> &Screen {
        &self.screen
    }

    pub fn screen_mut(&mut self) -> &mut Screen {
        &mut self.screen
    }

    /// Serialize the session screen and upload it to the OLED.
    pub fn render_screen(&mut self) -> Result<(), Error> {
        self.output.send(&oled_sysex(&self.screen))
    }

    // --- listeners ---

    /// Register a listener for every decoded event. Global listeners run
    /// before any per-key listeners, in registration order.
    pub fn add_global_listener(
        &self,
        callback: impl FnMut(&Event) + Send + 'static,
    ) -> ListenerHandle {
        self.lock_dispatcher().add(EventKey::Global, callback)
    }

    /// Register a listener for press/release events of a single pad.
    pub fn add_pad_listener(
        &self,
        index: u8,
        callback: impl FnMut(&Event) + Send + 'static,
    ) -> Result<ListenerHandle, Error> {
        if index >= NUM_PADS {
            return Err(Error::InvalidParameter {
                what: "pad index",
                value: index as i64,
            });
        }
        Ok(self.lock_dispatcher().add(EventKey::Pad(index), callback))
    }

    /// Register one listener for several pads at once. Returns one handle
    /// per pad index, in the given order.
    pub fn add_pads_listener(
        &self,
        indices: &[u8],
        callback: impl FnMut(&Event) + Send + 'static,
    ) -> Result<Vec<ListenerHandle>, Error> {
        if let Some(&bad) = indices.iter().find(|&&index| index >= NUM_PADS) {
            return Err(Error::InvalidParameter {
                what: "pad index",
                value: bad as i64,
            });
        }

        let callback = shared_callback(callback);
        let mut dispatcher = self.lock_dispatcher();
        Ok(indices
            .iter()
            .map(|&index| dispatcher.add_shared(EventKey::Pad(index), Arc::clone(&callback)))
            .collect())
    }

    /// Register a listener for press/release events of a button.
    pub fn add_button_listener(
        &self,
        button: Button,
        callback: impl FnMut(&Event) + Send + 'static,
    ) -> ListenerHandle {
        self.lock_dispatcher().add(EventKey::Button(button), callback)
    }

    /// Register a listener for turn events of a rotary encoder.
    pub fn add_rotary_listener(
        &self,
        rotary: Rotary,
        callback: impl FnMut(&Event) + Send + 'static,
    ) -> ListenerHandle {
        self.lock_dispatcher()
            .add(EventKey::RotaryTurn(rotary), callback)
    }

    /// Register a listener for touch/release events of a rotary encoder.
    pub fn add_rotary_touch_listener(
        &self,
        rotary: Rotary,
        callback: impl FnMut(&Event) + Send + 'static,
    ) -> ListenerHandle {
        self.lock_dispatcher()
            .add(EventKey::RotaryTouch(rotary), callback)
    }

    /// Remove a previously registered listener. Returns whether the handle
    /// was still registered. Safe to call from within a listener; an
    /// in-flight dispatch is not affected.
    pub fn remove_listener(&self, handle: ListenerHandle) -> bool {
        self.lock_dispatcher().remove(handle)
    }

    // --- teardown ---

    /// Blank the pads, button LEDs, track LEDs, control bank and display,
    /// then drop the connections. Dropping a `Fire` without calling this
    /// closes the MIDI ports but leaves the hardware lit as-is.
    pub fn close(mut self) -> Result<(), Error> {
        self.clear_pads()?;
        self.clear_button_leds()?;
        for track in 1..=4 {
            self.set_track_led(track, TrackLed::Off)?;
        }
        self.set_control_bank_leds(ControlBankLeds::none())?;
        self.screen.clear();
        self.render_screen()
    }

    fn lock_dispatcher(&self) -> std::sync::MutexGuard<'_, Dispatcher> {
        // a panicking listener must not take the registry down with it
        self.dispatcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// The retransmission filter behind [`Fire::set_multiple_pad_colors`].
///
/// Each entry is compared against the state the pad will be in once the
/// preceding entries of the same batch have been sent, not against the
/// pre-batch shadow - otherwise a batch like `[(3, BLUE), (3, RED)]` over a
/// RED shadow would drop the final RED write and leave the device BLUE.
fn diff_pad_batch(
    shadow: &[Option<PadColor>; 64],
    pads: &[(u8, PadColor)],
) -> Vec<(u8, PadColor)> {
    let mut pending = *shadow;
    let mut changed = Vec::new();
    for &(index, color) in pads {
        match pending.get_mut(index as usize) {
            Some(slot) if *slot == Some(color) => {}
            Some(slot) => {
                *slot = Some(color);
                changed.push((index, color));
            }
            // out-of-range indices pass through so validation still fires
            None => changed.push((index, color)),
        }
    }
    changed
}
