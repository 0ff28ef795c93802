use std::fmt::Display;
use std::path::PathBuf;
use std::error::Error;

use super::constants::*;

/*
    Aggregate decoding errors. Any of these mean the buffer is corrupt and is abandoned.
 */
#[derive(Debug, Clone, PartialEq)]
pub enum DecodeError {
    MisalignedBuffer(usize),
    BadBoardMagic(u32),
    BadBoardSize(u32, usize),
    BadGroupHeader(u8, u32),
    BadGroupFormat(u8, u32),
    BadGroupSize(u8, u32, usize),
    InexactSlotDivision(u8, usize, usize),
    BoardSizeMismatch(usize, usize),
    LayoutMismatch(u16, bool, bool)
}

impl Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::MisalignedBuffer(len) => write!(f, "Aggregate buffer length {} is not a whole number of words!", len),
            DecodeError::BadBoardMagic(word) => write!(f, "Board aggregate has bad magic! Found header word: {:#010x} Expected marker: {:#x}", word, BOARD_AGGREGATE_MAGIC),
            DecodeError::BadBoardSize(size, left) => write!(f, "Board aggregate size {} words is invalid with {} words left in buffer!", size, left),
            DecodeError::BadGroupHeader(group, word) => write!(f, "Group {} aggregate has bad header word: {:#010x}", group, word),
            DecodeError::BadGroupFormat(group, word) => write!(f, "Group {} aggregate has bad format marker bits: {:#010x}", group, word),
            DecodeError::BadGroupSize(group, size, left) => write!(f, "Group {} aggregate size {} words overruns board aggregate with {} words left!", group, size, left),
            DecodeError::InexactSlotDivision(group, payload, slot) => write!(f, "Group {} payload of {} words is not a multiple of slot size {}!", group, payload, slot),
            DecodeError::BoardSizeMismatch(used, size) => write!(f, "Group aggregates used {} words of a {} word board aggregate!", used, size),
            DecodeError::LayoutMismatch(kind, extras, waveform) => write!(f, "Element type {} does not match the group layout! Extras: {} Waveform: {}", kind, extras, waveform)
        }
    }
}

impl Error for DecodeError {

}

/*
    Inbound frame errors. The frame is dropped and the receiver continues.
 */
#[derive(Debug)]
pub enum ProtocolError {
    TooSmall(usize),
    UnsupportedVersion(u16),
    UnsupportedElementType(u16),
    TruncatedPayload(u16, usize),
    MixedElementTypes(u32, u16, u16),
    IOError(std::io::Error)
}

impl From<std::io::Error> for ProtocolError {
    fn from(value: std::io::Error) -> Self {
        ProtocolError::IOError(value)
    }
}

impl Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProtocolError::TooSmall(size) => write!(f, "Received frame of {} bytes which is smaller than a header ({} bytes)!", size, HEADER_SIZE),
            ProtocolError::UnsupportedVersion(v) => write!(f, "Received frame with unsupported version {:#06x}! Expected: {:#06x}", v, FORMAT_VERSION),
            ProtocolError::UnsupportedElementType(t) => write!(f, "Received frame with unsupported element type {}!", t),
            ProtocolError::TruncatedPayload(n, size) => write!(f, "Frame claims {} elements but payload of {} bytes is too short!", n, size),
            ProtocolError::MixedElementTypes(id, pending, found) => write!(f, "Digitizer {} generation holds element type {} but frame carries type {}!", id, pending, found),
            ProtocolError::IOError(e) => write!(f, "Frame parsing recieved an io error: {}", e)
        }
    }
}

impl Error for ProtocolError {

}

/*
    Outbound frame buffer errors
 */
#[derive(Debug)]
pub enum FrameError {
    CapacityExceeded(usize, usize),
    IOError(std::io::Error)
}

impl From<std::io::Error> for FrameError {
    fn from(value: std::io::Error) -> Self {
        FrameError::IOError(value)
    }
}

impl Display for FrameError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FrameError::CapacityExceeded(needed, left) => write!(f, "Frame buffer capacity exceeded! Element needs {} bytes, {} bytes left", needed, left),
            FrameError::IOError(e) => write!(f, "Frame buffer recieved an io error: {}", e)
        }
    }
}

impl Error for FrameError {

}

/*
    Sender errors
 */
#[derive(Debug)]
pub enum SenderError {
    Transport(std::io::Error),
    ElementTooLarge(usize, usize),
    BadFrame(FrameError)
}

impl From<std::io::Error> for SenderError {
    fn from(value: std::io::Error) -> Self {
        SenderError::Transport(value)
    }
}

impl From<FrameError> for SenderError {
    fn from(value: FrameError) -> Self {
        SenderError::BadFrame(value)
    }
}

impl Display for SenderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SenderError::Transport(e) => write!(f, "Sender recieved a transport error: {}", e),
            SenderError::ElementTooLarge(size, cap) => write!(f, "Element of {} bytes can never fit a frame of {} bytes!", size, cap),
            SenderError::BadFrame(e) => write!(f, "Sender recieved a frame error: {}", e)
        }
    }
}

impl Error for SenderError {

}

/*
    Sink errors
 */
#[derive(Debug)]
pub enum SinkError {
    IOError(std::io::Error),
    HDF5Error(hdf5::Error),
    SendError(SenderError),
    BadOutputPath(PathBuf),
    BadConfig(ConfigError),
    ElementTypeMismatch(u32, u16, u16)
}

impl From<ConfigError> for SinkError {
    fn from(value: ConfigError) -> Self {
        SinkError::BadConfig(value)
    }
}

impl From<std::io::Error> for SinkError {
    fn from(value: std::io::Error) -> Self {
        SinkError::IOError(value)
    }
}

impl From<hdf5::Error> for SinkError {
    fn from(value: hdf5::Error) -> Self {
        SinkError::HDF5Error(value)
    }
}

impl From<SenderError> for SinkError {
    fn from(value: SenderError) -> Self {
        SinkError::SendError(value)
    }
}

impl Display for SinkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SinkError::IOError(e) => write!(f, "Sink recieved an io error: {}", e),
            SinkError::HDF5Error(e) => write!(f, "Sink recieved an HDF5 error: {}", e),
            SinkError::SendError(e) => write!(f, "Sink recieved a send error: {}", e),
            SinkError::BadOutputPath(path) => write!(f, "Sink output directory {} does not exist!", path.display()),
            SinkError::BadConfig(e) => write!(f, "Sink recieved a config error: {}", e),
            SinkError::ElementTypeMismatch(id, stored, given) => write!(f, "Digitizer {} stores element type {} but was given type {}!", id, stored, given)
        }
    }
}

impl Error for SinkError {

}

/*
    Receiver errors. These are fatal to the receive loop.
 */
#[derive(Debug)]
pub enum ReceiverError {
    Transport(std::io::Error),
    BadAddress(String)
}

impl From<std::io::Error> for ReceiverError {
    fn from(value: std::io::Error) -> Self {
        ReceiverError::Transport(value)
    }
}

impl Display for ReceiverError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReceiverError::Transport(e) => write!(f, "Receiver recieved a transport error: {}", e),
            ReceiverError::BadAddress(addr) => write!(f, "Receiver could not resolve address {}!", addr)
        }
    }
}

impl Error for ReceiverError {

}

/*
    Digitizer board errors
 */
#[derive(Debug)]
pub enum BoardError {
    NotOpen(u32),
    RegisterAccess(u32, String),
    Readout(String)
}

impl Display for BoardError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BoardError::NotOpen(id) => write!(f, "Digitizer {} has no open handle!", id),
            BoardError::RegisterAccess(addr, msg) => write!(f, "Register {:#06x} access failed: {}", addr, msg),
            BoardError::Readout(msg) => write!(f, "Digitizer readout failed: {}", msg)
        }
    }
}

impl Error for BoardError {

}

/*
    Config errors
 */
#[derive(Debug)]
pub enum ConfigError {
    BadFilePath(PathBuf),
    BadAddress(String),
    IOError(std::io::Error),
    ParsingError(serde_yaml::Error)
}

impl From<std::io::Error> for ConfigError {
    fn from(value: std::io::Error) -> Self {
        ConfigError::IOError(value)
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(value: serde_yaml::Error) -> Self {
        ConfigError::ParsingError(value)
    }
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BadFilePath(path) => write!(f, "File {} given to Config does not exist!", path.display()),
            Self::BadAddress(addr) => write!(f, "Config address {} could not be resolved!", addr),
            Self::IOError(e) => write!(f, "Config received an io error: {}", e),
            Self::ParsingError(e) => write!(f, "Config received a parsing error: {}", e)
        }
    }
}

impl Error for ConfigError {

}
