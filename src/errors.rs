#[derive(Debug)]
pub enum Error {
    /// No MIDI port matching the requested device keyword was present
    DeviceNotFound {
        // The keyword that was searched for
        keyword: String,
    },
    InputConnectError(midir::ConnectError<midir::MidiInput>),
    OutputConnectError(midir::ConnectError<midir::MidiOutput>),
    InitError(midir::InitError),
    PortInfoError(midir::PortInfoError),
    SendError(midir::SendError),
    /// A caller-supplied value is outside the range the device protocol can
    /// express
    InvalidParameter {
        what: &'static str,
        value: i64,
    },
    /// The verification image decoder was handed bytes that aren't the BMP
    /// layout this library writes
    MalformedImage {
        reason: &'static str,
    },
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DeviceNotFound { keyword } => {
                write!(f, "couldn't find a MIDI port for {:?}", keyword)
            }
            Self::InputConnectError(_) => f.write_str("connecting to MIDI input port failed"),
            Self::OutputConnectError(_) => f.write_str("connecting to MIDI output port failed"),
            Self::InitError(_) => f.write_str("MIDI context initialization failed"),
            Self::PortInfoError(_) => f.write_str("MIDI port retrieval failed"),
            Self::SendError(_) => f.write_str("sending MIDI message failed"),
            Self::InvalidParameter { what, value } => write!(f, "invalid {}: {}", what, value),
            Self::MalformedImage { reason } => write!(f, "malformed bitmap image: {}", reason),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::DeviceNotFound { .. } => None,
            Self::InputConnectError(e) => Some(e),
            Self::OutputConnectError(e) => Some(e),
            Self::InitError(e) => Some(e),
            Self::PortInfoError(e) => Some(e),
            Self::SendError(e) => Some(e),
            Self::InvalidParameter { .. } => None,
            Self::MalformedImage { .. } => None,
        }
    }
}

impl From<midir::ConnectError<midir::MidiInput>> for Error {
    fn from(e: midir::ConnectError<midir::MidiInput>) -> Self {
        Self::InputConnectError(e)
    }
}

impl From<midir::ConnectError<midir::MidiOutput>> for Error {
    fn from(e: midir::ConnectError<midir::MidiOutput>) -> Self {
        Self::OutputConnectError(e)
    }
}

impl From<midir::InitError> for Error {
    fn from(e: midir::InitError) -> Self {
        Self::InitError(e)
    }
}

impl From<midir::PortInfoError> for Error {
    fn from(e: midir::PortInfoError) -> Self {
        Self::PortInfoError(e)
    }
}

impl From<midir::SendError> for Error {
    fn from(e: midir::SendError) -> Self {
        Self::SendError(e)
    }
}
