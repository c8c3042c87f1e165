//! Serial-port transport adapter.
//!
//! Opens a port in the 8N1 configuration MAVLink links use, discards any
//! stale input, and hands the two cloned halves to [`MavConnection::open`].
//! The short read timeout keeps the reader thread responsive to
//! [`MavConnection::close`].

use std::io;
use std::sync::Arc;
use std::time::Duration;

use serialport::{ClearBuffer, DataBits, FlowControl, Parity, StopBits};

use crate::connection::{ConnectionSettings, MavConnection};
use crate::error::{Error, Result};
use crate::schema::MavSchema;

const READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Connects to a vehicle on a serial port, e.g.
/// `open("/dev/ttyUSB0", 57600, schema, ConnectionSettings::default())`.
pub fn open(
    port_name: &str,
    baud_rate: u32,
    schema: Arc<MavSchema>,
    settings: ConnectionSettings,
) -> Result<MavConnection> {
    let port = serialport::new(port_name, baud_rate)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .flow_control(FlowControl::None)
        .timeout(READ_TIMEOUT)
        .open()
        .map_err(|e| Error::Transport(io::Error::from(e)))?;

    port.clear(ClearBuffer::Input)
        .map_err(|e| Error::Transport(io::Error::from(e)))?;

    let reader = port
        .try_clone()
        .map_err(|e| Error::Transport(io::Error::from(e)))?;

    MavConnection::open(reader, port, schema, settings)
}
