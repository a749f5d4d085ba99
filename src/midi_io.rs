use crate::ok_or_continue;
use crate::Error;
use midir::{MidiInput, MidiInputConnection, MidiInputPort, MidiOutput, MidiOutputConnection};

fn guess_port<T: midir::MidiIO>(midi_io: &T, keyword: &str) -> Option<T::Port> {
    for port in midi_io.ports() {
        let name = ok_or_continue!(midi_io.port_name(&port));

        if name.contains(keyword) {
            return Some(port);
        }
    }

    None
}

/// A stateful decoder that turns the raw MIDI byte stream into typed messages.
///
/// The transport hands bytes over in arbitrary chunks; implementations must
/// keep whatever state they need (e.g. a partially collected SysEx body)
/// across calls to [`feed`](MidiStreamDecoder::feed).
pub trait MidiStreamDecoder: Default + Send + 'static {
    type Message: Send + 'static;

    /// Consume a chunk of bytes, invoking `emit` once per decoded message.
    fn feed(&mut self, bytes: &[u8], emit: &mut dyn FnMut(Self::Message));
}

pub trait OutputDevice
where
    Self: Sized,
{
    const MIDI_CONNECTION_NAME: &'static str;
    const MIDI_DEVICE_KEYWORD: &'static str;

    /// Initiate from an existing midir connection.
    fn from_connection(connection: MidiOutputConnection) -> Result<Self, Error>;

    fn send(&mut self, bytes: &[u8]) -> Result<(), Error>;

    /// Search the MIDI devices and connect to the first one matching
    /// [`Self::MIDI_DEVICE_KEYWORD`].
    fn guess() -> Result<Self, Error> {
        Self::with_device_keyword(Self::MIDI_DEVICE_KEYWORD)
    }

    /// Like [`OutputDevice::guess`], but searching for a caller-supplied port
    /// name fragment instead of the default keyword.
    fn with_device_keyword(keyword: &str) -> Result<Self, Error> {
        let midi_output = MidiOutput::new(crate::APPLICATION_NAME)?;

        let port = guess_port(&midi_output, keyword).ok_or_else(|| Error::DeviceNotFound {
            keyword: keyword.to_owned(),
        })?;

        let connection = midi_output.connect(&port, Self::MIDI_CONNECTION_NAME)?;

        Self::from_connection(connection)
    }
}

pub struct InputDeviceHandler {
    // never read, but it keeps the connection alive
    #[allow(dead_code)]
    connection: MidiInputConnection<()>,
}

pub struct InputDeviceHandlerPolling<Message> {
    #[allow(dead_code)]
    connection: MidiInputConnection<()>,
    receiver: std::sync::mpsc::Receiver<Message>,
}

impl<Message> InputDeviceHandlerPolling<Message> {
    /// Wait for a message to arrive, and return that. For a non-blocking
    /// variant, see `try_recv()`.
    pub fn recv(&self) -> Message {
        self.receiver
            .recv()
            .expect("Message sender has hung up - please report a bug")
    }

    /// If there is a pending message, return that. Otherwise, return `None`.
    ///
    /// This function does not block.
    pub fn try_recv(&self) -> Option<Message> {
        use std::sync::mpsc::TryRecvError;
        match self.receiver.try_recv() {
            Ok(msg) => Some(msg),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                panic!("Message sender has hung up - please report a bug")
            }
        }
    }

    /// Receives a single message. If no message arrives within the timespan
    /// specified by `timeout`, `None` is returned.
    pub fn recv_timeout(&self, timeout: std::time::Duration) -> Option<Message> {
        use std::sync::mpsc::RecvTimeoutError;
        match self.receiver.recv_timeout(timeout) {
            Ok(msg) => Some(msg),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => {
                panic!("Message sender has hung up - please report a bug")
            }
        }
    }

    /// Returns an iterator over all arriving messages. The iterator will only
    /// return when the MIDI connection has been dropped.
    ///
    /// For an iteration method that doesn't block, but returns immediately
    /// when there are no more pending messages, see `iter_pending`.
    pub fn iter(&self) -> impl Iterator<Item = Message> + '_ {
        self.receiver.iter()
    }

    /// Returns an iterator over the currently pending messages. As soon as
    /// all pending messages have been iterated over, the iterator will return.
    ///
    /// For an iteration method that will block, waiting for new messages to
    /// arrive, see `iter()`.
    pub fn iter_pending(&self) -> impl Iterator<Item = Message> + '_ {
        self.receiver.try_iter()
    }

    /// Drain any pending messages. The Fire queues up button input while
    /// nothing is connected to it and releases the stale events as soon as
    /// someone connects; call `drain()` right after establishing the
    /// connection if you don't want to deal with those.
    ///
    /// This function returns the number of messages that were discarded.
    pub fn drain(&self) -> usize {
        self.iter_pending().count()
    }
}

pub trait InputDevice {
    const MIDI_CONNECTION_NAME: &'static str;
    const MIDI_DEVICE_KEYWORD: &'static str;
    type Decoder: MidiStreamDecoder;

    #[must_use = "If not saved, the connection will be immediately dropped"]
    fn from_port<F>(
        midi_input: MidiInput,
        port: &MidiInputPort,
        mut user_callback: F,
    ) -> Result<InputDeviceHandler, Error>
    where
        F: FnMut(<Self::Decoder as MidiStreamDecoder>::Message) + Send + 'static,
    {
        let mut decoder = Self::Decoder::default();
        let midir_callback = move |_timestamp: u64, data: &[u8], _: &mut ()| {
            decoder.feed(data, &mut |msg| (user_callback)(msg));
        };

        let connection = midi_input.connect(port, Self::MIDI_CONNECTION_NAME, midir_callback, ())?;

        Ok(InputDeviceHandler { connection })
    }

    #[must_use = "If not saved, the connection will be immediately dropped"]
    fn from_port_polling(
        midi_input: MidiInput,
        port: &MidiInputPort,
    ) -> Result<InputDeviceHandlerPolling<<Self::Decoder as MidiStreamDecoder>::Message>, Error>
    {
        let (sender, receiver) = std::sync::mpsc::channel();

        let mut decoder = Self::Decoder::default();
        let midir_callback = move |_timestamp: u64, data: &[u8], _: &mut ()| {
            decoder.feed(data, &mut |msg| {
                // The following statement can only panic when the receiver was dropped but the
                // connection is still alive. This can't happen by accident I think, because the
                // user would have to destructure the input device handler in order to get the
                // connection and the receiver seperately, in order to drop one but not the other -
                // but if he does that it's his fault that he gets a panic /shrug
                sender
                    .send(msg)
                    .expect("Message receiver has hung up (this shouldn't happen)");
            });
        };

        let connection = midi_input.connect(port, Self::MIDI_CONNECTION_NAME, midir_callback, ())?;

        Ok(InputDeviceHandlerPolling {
            connection,
            receiver,
        })
    }

    /// Search the MIDI devices and choose the first one matching
    /// [`Self::MIDI_DEVICE_KEYWORD`].
    #[must_use = "If not saved, the connection will be immediately dropped"]
    fn guess<F>(user_callback: F) -> Result<InputDeviceHandler, Error>
    where
        F: FnMut(<Self::Decoder as MidiStreamDecoder>::Message) + Send + 'static,
    {
        Self::with_device_keyword(Self::MIDI_DEVICE_KEYWORD, user_callback)
    }

    /// Like [`InputDevice::guess`], but searching for a caller-supplied port
    /// name fragment instead of the default keyword.
    #[must_use = "If not saved, the connection will be immediately dropped"]
    fn with_device_keyword<F>(keyword: &str, user_callback: F) -> Result<InputDeviceHandler, Error>
    where
        F: FnMut(<Self::Decoder as MidiStreamDecoder>::Message) + Send + 'static,
    {
        let midi_input = MidiInput::new(crate::APPLICATION_NAME)?;

        let port = guess_port(&midi_input, keyword).ok_or_else(|| Error::DeviceNotFound {
            keyword: keyword.to_owned(),
        })?;

        Self::from_port(midi_input, &port, user_callback)
    }

    /// Search the MIDI devices and choose the first one matching
    /// [`Self::MIDI_DEVICE_KEYWORD`], returning a polling-style handler.
    #[must_use = "If not saved, the connection will be immediately dropped"]
    fn guess_polling(
    ) -> Result<InputDeviceHandlerPolling<<Self::Decoder as MidiStreamDecoder>::Message>, Error>
    {
        let midi_input = MidiInput::new(crate::APPLICATION_NAME)?;

        let port =
            guess_port(&midi_input, Self::MIDI_DEVICE_KEYWORD).ok_or_else(|| {
                Error::DeviceNotFound {
                    keyword: Self::MIDI_DEVICE_KEYWORD.to_owned(),
                }
            })?;

        Self::from_port_polling(midi_input, &port)
    }
}
