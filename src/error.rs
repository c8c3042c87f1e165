use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Failure while loading message definitions and building the schema.
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("could not read definition file {}: {source}", path.display())]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },
    #[error("malformed XML: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("invalid type {typ:?} on field {field:?}")]
    InvalidType { typ: String, field: String },
    #[error("missing required attribute {attribute:?} on <{element}>")]
    MissingAttribute {
        element: &'static str,
        attribute: &'static str,
    },
    #[error("invalid value {value:?} for attribute {attribute:?} on <{element}>")]
    InvalidAttribute {
        element: &'static str,
        attribute: &'static str,
        value: String,
    },
    #[error("duplicate message id {id} ({existing} and {duplicate})")]
    DuplicateMessageId {
        id: u32,
        existing: String,
        duplicate: String,
    },
    #[error("duplicate message name {0}")]
    DuplicateMessageName(String),
    #[error("message id {id} of {message} exceeds the 24-bit id space")]
    MessageIdOutOfRange { id: u32, message: String },
    #[error("payload of {message} is {size} bytes, the maximum is 255")]
    PayloadTooLarge { message: String, size: usize },
}

/// Reason a received frame was discarded by the reader. Frame errors are
/// local: the reader logs them and resynchronises.
#[derive(Error, Debug)]
pub enum FrameError {
    #[error("CRC mismatch: expected {expected:#06x}, found {found:#06x}")]
    BadCrc { expected: u16, found: u16 },
    #[error("unknown message id {id}")]
    UnknownMessageId { id: u32 },
}

/// Failure while turning a payload into field values.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("value {value} of field {field:?} has no entry in enum {enumtype}")]
    NoEnumEntry {
        enumtype: String,
        field: String,
        value: u64,
    },
    #[error("field {field:?} references unknown enum {enumtype}")]
    UnknownEnum { enumtype: String, field: String },
}

/// Failure while turning caller-supplied values into a payload.
#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("unknown message {0:?}")]
    UnknownMessage(String),
    #[error("message {message} takes {expected} values, {found} were given")]
    Arity {
        message: String,
        expected: usize,
        found: usize,
    },
    #[error("unknown field {field:?} of {message}")]
    UnknownField { message: String, field: String },
    #[error("missing field {field:?} of {message}")]
    MissingField { message: String, field: String },
    #[error("{symbol:?} is not an entry of enum {enumtype}")]
    UnknownEnumEntry { enumtype: String, symbol: String },
    #[error("value {value} does not fit field {field:?} ({typ})")]
    ValueOutOfRange {
        field: String,
        typ: String,
        value: String,
    },
    #[error("field {field:?} expects {expected}, got {found}")]
    ValueType {
        field: String,
        expected: &'static str,
        found: &'static str,
    },
    #[error("string {value:?} exceeds the {capacity}-byte capacity of field {field:?}")]
    StringTooLong {
        field: String,
        capacity: usize,
        value: String,
    },
    #[error("array field {field:?} takes {expected} elements, {found} were given")]
    ArrayLength {
        field: String,
        expected: usize,
        found: usize,
    },
    #[error("message id {id} of {message} cannot be sent as MAVLink 1")]
    NotV1Compatible { message: String, id: u32 },
}

/// Error while reading and parsing a frame from the transport.
#[derive(Error, Debug)]
pub enum MessageReadError {
    #[error("failed to read message: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to decode message: {0}")]
    Decode(#[from] DecodeError),
}

impl MessageReadError {
    pub fn eof() -> Self {
        Self::Io(std::io::ErrorKind::UnexpectedEof.into())
    }
}

/// Error while writing a frame to the transport.
#[derive(Error, Debug)]
pub enum MessageWriteError {
    #[error("failed to write message: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode message: {0}")]
    Encode(#[from] EncodeError),
}

/// Top-level error surfaced by the connection API.
#[derive(Error, Debug)]
pub enum Error {
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),
    #[error("connection closed: {0}")]
    Closed(String),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error("timed out after {timeout:?} waiting for {message}")]
    Timeout { message: String, timeout: Duration },
    #[error("failed to get parameter {0:?}")]
    FailedToGetParam(String),
    #[error("failed to set parameter {0:?}")]
    FailedToSetParam(String),
    #[error("command {command} failed with result {result}")]
    Command { command: String, result: String },
}

impl From<MessageWriteError> for Error {
    fn from(e: MessageWriteError) -> Self {
        match e {
            MessageWriteError::Io(e) => Self::Transport(e),
            MessageWriteError::Encode(e) => Self::Encode(e),
        }
    }
}

impl From<MessageReadError> for Error {
    fn from(e: MessageReadError) -> Self {
        match e {
            MessageReadError::Io(e) => Self::Transport(e),
            MessageReadError::Decode(e) => Self::Decode(e),
        }
    }
}

pub type Result<T> = core::result::Result<T, Error>;
