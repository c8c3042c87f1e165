//! Threaded vehicle connection.
//!
//! A [`MavConnection`] owns the write half of a byte transport; a dedicated
//! reader thread owns the read half and runs the resynchronising frame
//! reader. Every decoded packet is dispatched, atomically under one lock,
//! into three structures callers consume:
//!
//! * the **recv pool**: last packet per message name;
//! * the **keep pool**: append-ordered history, only for names explicitly
//!   enabled with [`MavConnection::keep_all`];
//! * the **wait registry**: callers blocked until a packet of a given name
//!   arrives whose fields match an equality predicate.
//!
//! All request/response traffic (parameters, commands, stream intervals)
//! registers its waiter before sending and then blocks with a timeout, so a
//! reply can never be lost between the send and the wait.

use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::codec::{self, MavPacket};
use crate::error::{EncodeError, Error, MessageReadError, Result};
use crate::peek_reader::PeekReader;
use crate::schema::MavSchema;
use crate::value::{MavArgs, MavContent, MavValue};
use crate::{read_frame, write_frame, MavHeader, MavlinkVersion};

#[cfg(feature = "direct-serial")]
pub mod direct_serial;

const PARAM_VALUE: &str = "PARAM_VALUE";

/// Per-connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    /// Protocol version used for outgoing frames. Incoming frames of either
    /// version are always accepted.
    pub version: MavlinkVersion,
    pub system_id: u8,
    pub component_id: u8,
    /// Identity of the vehicle addressed by targeted requests.
    pub target_system: u8,
    pub target_component: u8,
    /// Timeout applied to every blocking wait.
    pub wait_timeout: Duration,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            version: MavlinkVersion::V2,
            system_id: 1,
            component_id: 1,
            target_system: 1,
            target_component: 1,
            wait_timeout: Duration::from_secs(10),
        }
    }
}

struct WaitSlot {
    id: u64,
    message: String,
    predicate: MavContent,
    result: Option<MavPacket>,
}

#[derive(Default)]
struct DispatchState {
    recv_pool: BTreeMap<String, MavPacket>,
    keep_names: BTreeSet<String>,
    keep_pool: BTreeMap<String, Vec<MavPacket>>,
    param_types: BTreeMap<String, MavValue>,
    waiters: Vec<WaitSlot>,
    closed: Option<String>,
}

/// The lock/condvar pair shared between the reader thread and all callers.
struct Dispatch {
    state: Mutex<DispatchState>,
    arrived: Condvar,
}

impl Dispatch {
    fn new() -> Self {
        Self {
            state: Mutex::new(DispatchState::default()),
            arrived: Condvar::new(),
        }
    }

    /// Runs the four dispatch steps for one packet atomically.
    fn dispatch(&self, packet: MavPacket) {
        let mut state = self.state.lock().unwrap();
        let name = packet.message.name.clone();

        if state.keep_names.contains(&name) {
            state
                .keep_pool
                .entry(name.clone())
                .or_default()
                .push(packet.clone());
        }

        if name == PARAM_VALUE {
            if let (Some(MavValue::Text(id)), Some(typ)) =
                (packet.get("param_id"), packet.get("param_type"))
            {
                state.param_types.insert(id.clone(), typ.clone());
            }
        }

        for slot in &mut state.waiters {
            if slot.result.is_none()
                && slot.message == name
                && predicate_matches(&slot.predicate, &packet.content)
            {
                slot.result = Some(packet.clone());
            }
        }

        state.recv_pool.insert(name, packet);
        self.arrived.notify_all();
    }

    /// Marks the connection dead and wakes every waiter.
    fn close(&self, reason: &str) {
        let mut state = self.state.lock().unwrap();
        if state.closed.is_none() {
            state.closed = Some(reason.to_string());
        }
        self.arrived.notify_all();
    }

    fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed.is_some()
    }
}

/// Field-wise equality of the predicate against the packet content. An empty
/// predicate matches any packet of the right name.
fn predicate_matches(predicate: &MavContent, content: &MavContent) -> bool {
    predicate.iter().all(|(field, expected)| {
        content
            .get(field)
            .is_some_and(|value| values_equal(expected, value))
    })
}

/// Equality that tolerates variant differences between caller-built values
/// and decoded ones (`Int(5)` vs `UInt(5)`, integers vs floats).
fn values_equal(a: &MavValue, b: &MavValue) -> bool {
    if a == b {
        return true;
    }
    if let (Some(x), Some(y)) = (a.as_u64(), b.as_u64()) {
        return x == y;
    }
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        return x == y;
    }
    if let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) {
        return x == y;
    }
    false
}

/// A live connection to a single vehicle.
pub struct MavConnection {
    schema: Arc<MavSchema>,
    settings: ConnectionSettings,
    writer: Mutex<Box<dyn Write + Send>>,
    sequence: Mutex<u8>,
    dispatch: Arc<Dispatch>,
    next_wait: AtomicU64,
    reader: Option<JoinHandle<()>>,
}

impl MavConnection {
    /// Starts a connection over the two halves of a byte transport and
    /// spawns the reader thread.
    ///
    /// The reader half should return `TimedOut` periodically when idle (as a
    /// serial port with a read timeout does) so the thread can notice
    /// [`MavConnection::close`]; a reader that blocks forever only stops at
    /// EOF or transport error.
    pub fn open<R, W>(
        reader: R,
        writer: W,
        schema: Arc<MavSchema>,
        settings: ConnectionSettings,
    ) -> Result<Self>
    where
        R: Read + Send + 'static,
        W: Write + Send + 'static,
    {
        let dispatch = Arc::new(Dispatch::new());
        let thread_dispatch = Arc::clone(&dispatch);
        let thread_schema = Arc::clone(&schema);
        let handle = std::thread::Builder::new()
            .name("mavkit-reader".to_string())
            .spawn(move || reader_loop(reader, thread_schema, thread_dispatch))
            .map_err(Error::Transport)?;

        Ok(Self {
            schema,
            settings,
            writer: Mutex::new(Box::new(writer)),
            sequence: Mutex::new(0),
            dispatch,
            next_wait: AtomicU64::new(0),
            reader: Some(handle),
        })
    }

    pub fn schema(&self) -> &Arc<MavSchema> {
        &self.schema
    }

    pub fn settings(&self) -> &ConnectionSettings {
        &self.settings
    }

    /// Shuts the connection down: all pending and future waits fail
    /// immediately. The reader thread exits at its next read timeout, EOF or
    /// error.
    pub fn close(&self) {
        self.dispatch.close("closed by caller");
    }

    pub fn is_closed(&self) -> bool {
        self.dispatch.is_closed()
    }

    // --- sending ---------------------------------------------------------

    /// Encodes and writes one message with the next sequence number.
    pub fn send(&self, message: &str, args: impl Into<MavArgs>) -> Result<()> {
        let message = self
            .schema
            .message(message)
            .ok_or_else(|| EncodeError::UnknownMessage(message.to_string()))?
            .clone();
        let payload =
            codec::encode_payload(&self.schema, &message, self.settings.version, &args.into())?;

        let mut writer = self.writer.lock().unwrap();
        let header = {
            let mut sequence = self.sequence.lock().unwrap();
            let header = MavHeader {
                system_id: self.settings.system_id,
                component_id: self.settings.component_id,
                sequence: *sequence,
            };
            *sequence = sequence.wrapping_add(1);
            header
        };
        write_frame(
            &mut *writer,
            self.settings.version,
            header,
            &message,
            &payload,
        )?;
        writer.flush().map_err(Error::Transport)?;
        Ok(())
    }

    /// Registers a waiter for `wait`, clears its recv-pool slot, sends
    /// `out`, and blocks until a matching packet arrives or the wait times
    /// out.
    pub fn send_and_wait(
        &self,
        out: &str,
        args: impl Into<MavArgs>,
        wait: &str,
        predicate: MavContent,
    ) -> Result<MavPacket> {
        let id = self.register(wait, predicate);
        self.clear_recv(wait);
        if let Err(e) = self.send(out, args) {
            self.cancel(id);
            return Err(e);
        }
        self.await_slot(id, wait, self.settings.wait_timeout)
    }

    // --- waiting ---------------------------------------------------------

    /// Blocks until a packet named `message` arrives whose fields equal
    /// every `(field, value)` pair of `predicate`.
    pub fn wait_for(&self, message: &str, predicate: MavContent) -> Result<MavPacket> {
        let id = self.register(message, predicate);
        self.await_slot(id, message, self.settings.wait_timeout)
    }

    fn register(&self, message: &str, predicate: MavContent) -> u64 {
        let id = self.next_wait.fetch_add(1, Ordering::Relaxed);
        let mut state = self.dispatch.state.lock().unwrap();
        state.waiters.push(WaitSlot {
            id,
            message: message.to_string(),
            predicate,
            result: None,
        });
        id
    }

    fn cancel(&self, id: u64) {
        let mut state = self.dispatch.state.lock().unwrap();
        state.waiters.retain(|slot| slot.id != id);
    }

    fn await_slot(&self, id: u64, what: &str, timeout: Duration) -> Result<MavPacket> {
        let deadline = Instant::now() + timeout;
        let mut state = self.dispatch.state.lock().unwrap();
        loop {
            let pos = state.waiters.iter().position(|slot| slot.id == id);
            let Some(pos) = pos else {
                // cancel() raced us
                return Err(Error::Closed("wait cancelled".to_string()));
            };
            if let Some(packet) = state.waiters[pos].result.take() {
                state.waiters.swap_remove(pos);
                return Ok(packet);
            }
            if let Some(reason) = state.closed.clone() {
                state.waiters.swap_remove(pos);
                return Err(Error::Closed(reason));
            }
            let now = Instant::now();
            if now >= deadline {
                state.waiters.swap_remove(pos);
                return Err(Error::Timeout {
                    message: what.to_string(),
                    timeout,
                });
            }
            let (guard, _) = self
                .dispatch
                .arrived
                .wait_timeout(state, deadline - now)
                .unwrap();
            state = guard;
        }
    }

    // --- pools -----------------------------------------------------------

    /// Most recent packet of the given name, if any arrived.
    pub fn last_packet(&self, message: &str) -> Option<MavPacket> {
        self.dispatch
            .state
            .lock()
            .unwrap()
            .recv_pool
            .get(message)
            .cloned()
    }

    /// Forgets the most recent packet of the given name.
    pub fn clear_recv(&self, message: &str) {
        self.dispatch
            .state
            .lock()
            .unwrap()
            .recv_pool
            .remove(message);
    }

    /// Enables or disables history accumulation for a message name.
    /// Enabling starts a fresh history; disabling drops it.
    pub fn keep_all(&self, message: &str, enabled: bool) {
        let mut state = self.dispatch.state.lock().unwrap();
        if enabled {
            state.keep_names.insert(message.to_string());
            state.keep_pool.remove(message);
        } else {
            state.keep_names.remove(message);
            state.keep_pool.remove(message);
        }
    }

    /// History of a keep-all enabled message, in arrival order.
    pub fn kept(&self, message: &str) -> Vec<MavPacket> {
        self.dispatch
            .state
            .lock()
            .unwrap()
            .keep_pool
            .get(message)
            .cloned()
            .unwrap_or_default()
    }

    /// Parameter type learned from the most recent PARAM_VALUE carrying this
    /// parameter.
    pub fn cached_param_type(&self, name: &str) -> Option<MavValue> {
        self.dispatch
            .state
            .lock()
            .unwrap()
            .param_types
            .get(name)
            .cloned()
    }

    // --- parameter protocol ----------------------------------------------

    /// Reads one named parameter from the vehicle.
    pub fn param_value(&self, name: &str) -> Result<MavValue> {
        let mut args = self.target_args();
        args.insert("param_id".to_string(), name.into());
        args.insert("param_index".to_string(), MavValue::Int(-1));
        let mut predicate = MavContent::new();
        predicate.insert("param_id".to_string(), name.into());

        match self.send_and_wait("PARAM_REQUEST_READ", args, PARAM_VALUE, predicate) {
            Ok(packet) => packet
                .get("param_value")
                .cloned()
                .ok_or_else(|| Error::FailedToGetParam(name.to_string())),
            Err(Error::Timeout { .. }) => Err(Error::FailedToGetParam(name.to_string())),
            Err(e) => Err(e),
        }
    }

    /// Writes one named parameter and returns the value the vehicle reports
    /// back, which may differ from the requested one by rounding.
    pub fn set_param(&self, name: &str, value: impl Into<MavValue>) -> Result<MavValue> {
        let param_type = match self.cached_param_type(name) {
            Some(typ) => typ,
            None => {
                // learn the type from a read first; PARAM_VALUE dispatch
                // fills the cache
                self.param_value(name).map_err(|e| match e {
                    Error::FailedToGetParam(n) => Error::FailedToSetParam(n),
                    e => e,
                })?;
                self.cached_param_type(name)
                    .ok_or_else(|| Error::FailedToSetParam(name.to_string()))?
            }
        };

        let mut args = self.target_args();
        args.insert("param_id".to_string(), name.into());
        args.insert("param_value".to_string(), value.into());
        args.insert("param_type".to_string(), param_type);
        let mut predicate = MavContent::new();
        predicate.insert("param_id".to_string(), name.into());

        match self.send_and_wait("PARAM_SET", args, PARAM_VALUE, predicate) {
            Ok(packet) => packet
                .get("param_value")
                .cloned()
                .ok_or_else(|| Error::FailedToSetParam(name.to_string())),
            Err(Error::Timeout { .. }) => Err(Error::FailedToSetParam(name.to_string())),
            Err(e) => Err(e),
        }
    }

    /// Downloads the whole parameter set.
    ///
    /// Keep-all is enabled on PARAM_VALUE for the duration of the download
    /// and disabled (dropping the history) on every exit path.
    pub fn request_params(&self) -> Result<BTreeMap<String, MavValue>> {
        self.keep_all(PARAM_VALUE, true);
        let result = self.collect_params();
        self.keep_all(PARAM_VALUE, false);
        result
    }

    fn collect_params(&self) -> Result<BTreeMap<String, MavValue>> {
        let first = self.send_and_wait(
            "PARAM_REQUEST_LIST",
            self.target_args(),
            PARAM_VALUE,
            MavContent::new(),
        )?;
        let total = first.get("param_count").and_then(MavValue::as_u64).unwrap_or(0);

        // watch the keep pool grow; any new packet refreshes the deadline,
        // so only a stalled download times out
        let mut deadline = Instant::now() + self.settings.wait_timeout;
        let mut seen = 0usize;
        let mut state = self.dispatch.state.lock().unwrap();
        loop {
            let kept = state.keep_pool.get(PARAM_VALUE);
            let mut params = BTreeMap::new();
            for packet in kept.into_iter().flatten() {
                if let (Some(MavValue::Text(id)), Some(value)) =
                    (packet.get("param_id"), packet.get("param_value"))
                {
                    params.insert(id.clone(), value.clone());
                }
            }
            if params.len() as u64 >= total {
                return Ok(params);
            }

            let count = state.keep_pool.get(PARAM_VALUE).map_or(0, Vec::len);
            if count > seen {
                seen = count;
                deadline = Instant::now() + self.settings.wait_timeout;
            }
            if let Some(reason) = state.closed.clone() {
                return Err(Error::Closed(reason));
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(Error::Timeout {
                    message: PARAM_VALUE.to_string(),
                    timeout: self.settings.wait_timeout,
                });
            }
            let (guard, _) = self
                .dispatch
                .arrived
                .wait_timeout(state, deadline - now)
                .unwrap();
            state = guard;
        }
    }

    // --- commands --------------------------------------------------------

    /// Issues a COMMAND_LONG and waits for its COMMAND_ACK. `command` is the
    /// MAV_CMD entry name; up to seven parameters are zero-padded.
    pub fn command_long(&self, command: &str, params: &[f64]) -> Result<MavPacket> {
        if params.len() > 7 {
            return Err(EncodeError::Arity {
                message: "COMMAND_LONG".to_string(),
                expected: 7,
                found: params.len(),
            }
            .into());
        }

        let mut args = self.target_args();
        args.insert("command".to_string(), MavValue::Enum(command.to_string()));
        args.insert("confirmation".to_string(), MavValue::UInt(0));
        for i in 0..7 {
            args.insert(
                format!("param{}", i + 1),
                MavValue::Float(params.get(i).copied().unwrap_or(0.0)),
            );
        }
        let mut predicate = MavContent::new();
        predicate.insert("command".to_string(), MavValue::Enum(command.to_string()));

        let ack = self.send_and_wait("COMMAND_LONG", args, "COMMAND_ACK", predicate)?;
        let accepted = match ack.get("result") {
            Some(MavValue::Enum(result)) => result == "MAV_RESULT_ACCEPTED",
            Some(value) => value.as_u64() == Some(0),
            None => false,
        };
        if !accepted {
            let result = match ack.get("result") {
                Some(MavValue::Enum(result)) => result.clone(),
                Some(value) => format!("{value:?}"),
                None => "<missing>".to_string(),
            };
            return Err(Error::Command {
                command: command.to_string(),
                result,
            });
        }
        Ok(ack)
    }

    /// Asks the vehicle to emit `message` every `period_s` seconds; zero or
    /// negative disables the stream.
    pub fn set_message_interval(&self, message: &str, period_s: f64) -> Result<()> {
        let id = self
            .schema
            .message(message)
            .ok_or_else(|| EncodeError::UnknownMessage(message.to_string()))?
            .id;
        let interval_us = if period_s > 0.0 { period_s * 1e6 } else { -1.0 };
        self.command_long("MAV_CMD_SET_MESSAGE_INTERVAL", &[id.into(), interval_us])?;
        Ok(())
    }

    /// Reads the configured emission interval of `message` in seconds;
    /// negative means the stream is disabled.
    pub fn message_interval(&self, message: &str) -> Result<f64> {
        let id = self
            .schema
            .message(message)
            .ok_or_else(|| EncodeError::UnknownMessage(message.to_string()))?
            .id;

        let mut predicate = MavContent::new();
        predicate.insert("message_id".to_string(), MavValue::UInt(id.into()));
        let slot = self.register("MESSAGE_INTERVAL", predicate);
        if let Err(e) = self.command_long("MAV_CMD_GET_MESSAGE_INTERVAL", &[id.into()]) {
            self.cancel(slot);
            return Err(e);
        }
        let packet = self.await_slot(slot, "MESSAGE_INTERVAL", self.settings.wait_timeout)?;
        let interval_us = packet
            .get("interval_us")
            .and_then(MavValue::as_f64)
            .unwrap_or(-1.0);
        Ok(interval_us / 1e6)
    }

    // --- convenience -----------------------------------------------------

    /// Announces this GCS to the vehicle.
    pub fn heartbeat(&self) -> Result<()> {
        let mut args = MavContent::new();
        args.insert("type".to_string(), MavValue::Enum("MAV_TYPE_GCS".to_string()));
        args.insert(
            "autopilot".to_string(),
            MavValue::Enum("MAV_AUTOPILOT_INVALID".to_string()),
        );
        args.insert("base_mode".to_string(), MavValue::UInt(0));
        args.insert("custom_mode".to_string(), MavValue::UInt(0));
        args.insert(
            "system_status".to_string(),
            MavValue::Enum("MAV_STATE_ACTIVE".to_string()),
        );
        args.insert("mavlink_version".to_string(), MavValue::UInt(3));
        self.send("HEARTBEAT", args)
    }

    /// Blocks until any HEARTBEAT arrives.
    pub fn wait_heartbeat(&self) -> Result<MavPacket> {
        self.wait_for("HEARTBEAT", MavContent::new())
    }

    fn target_args(&self) -> MavContent {
        let mut args = MavContent::new();
        args.insert(
            "target_system".to_string(),
            MavValue::UInt(self.settings.target_system.into()),
        );
        args.insert(
            "target_component".to_string(),
            MavValue::UInt(self.settings.target_component.into()),
        );
        args
    }
}

impl Drop for MavConnection {
    fn drop(&mut self) {
        self.dispatch.close("connection dropped");
        // the reader thread exits on its own at the next timeout or EOF
        self.reader.take();
    }
}

fn reader_loop<R: Read>(reader: R, schema: Arc<MavSchema>, dispatch: Arc<Dispatch>) {
    let mut reader = PeekReader::new(reader);
    loop {
        if dispatch.is_closed() {
            return;
        }
        match read_frame(&mut reader, &schema) {
            Ok((frame, message)) => {
                match codec::decode_payload(&schema, &message, frame.payload()) {
                    Ok(content) => dispatch.dispatch(MavPacket {
                        header: frame.header(),
                        message,
                        content,
                    }),
                    // a packet that fails to decode costs its consumer a
                    // timeout, never the connection
                    Err(err) => warn!("dropping undecodable frame: {err}"),
                }
            }
            Err(MessageReadError::Io(e)) if is_transient(&e) => continue,
            Err(e) => {
                debug!("reader thread stopping: {e}");
                dispatch.close(&format!("reader stopped: {e}"));
                return;
            }
        }
    }
}

fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}
