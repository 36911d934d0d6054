//! Line protocol encoding and decoding.
//!
//! The client and server exchange newline-terminated ASCII lines. Commands
//! flow from client to server; responses, status deltas, and handshake lines
//! flow from server to client.
//!
//! # Line formats
//!
//! ```text
//! Command:   C<seq>|<command_text>
//! Response:  R<seq>|<hex_result_code>|<response_data>
//! Status:    S<change_seq>|<object> [<target>] <key>=<value> ...
//! Message:   M<seq>|<text>
//! Version:   V<major>.<minor>.<patch>
//! Handle:    H<hex_handle>
//! ```
//!
//! Status lines carry a peer-assigned change sequence number used for
//! duplicate suppression. The control keys `removed=1`, `clear=1` and
//! `active=1` turn a status line into a removal, a collection reset, or a
//! selection confirmation respectively.
//!
//! Values are percent-escaped (`%`, space, CR, LF) so names containing
//! spaces survive whitespace tokenization.
//!
//! All encoding/decoding in this module is pure parsing -- no I/O is performed.

use std::fmt;

use crate::error::{Error, Result};
use crate::id::{wire_id, Id};
use crate::types::{
    Balance, CallProgress, EntityKind, HeadsetPreset, LeaveReason, MicMode,
};

// ---------------------------------------------------------------------------
// Value escaping
// ---------------------------------------------------------------------------

/// Escape a value for inclusion in a whitespace-separated line.
pub fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '%' => out.push_str("%25"),
            ' ' => out.push_str("%20"),
            '\r' => out.push_str("%0D"),
            '\n' => out.push_str("%0A"),
            _ => out.push(c),
        }
    }
    out
}

/// Reverse [`escape`]. Unknown or truncated escapes are kept verbatim.
pub fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(pos) = rest.find('%') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        let decoded = match tail.get(1..3) {
            Some("25") => Some('%'),
            Some("20") => Some(' '),
            Some("0D") => Some('\r'),
            Some("0A") => Some('\n'),
            _ => None,
        };
        match decoded {
            Some(c) => {
                out.push(c);
                rest = &tail[3..];
            }
            None => {
                out.push('%');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

// ---------------------------------------------------------------------------
// Typed setting values
// ---------------------------------------------------------------------------

/// A live-radio-control setting value with its type tag.
///
/// On the wire the value is prefixed with `s:`, `i:` or `f:`.
#[derive(Debug, Clone, PartialEq)]
pub enum SettingValue {
    /// String setting (e.g. modulation mode).
    Str(String),
    /// Integer setting (e.g. frequency in Hz).
    Int(i64),
    /// Floating-point setting (e.g. squelch level).
    Float(f32),
}

impl SettingValue {
    /// Parse a tagged wire value such as `i:30000000`.
    pub fn parse_tagged(s: &str) -> Result<Self> {
        let (tag, body) = s
            .split_once(':')
            .ok_or_else(|| Error::Protocol(format!("setting value missing type tag: {s}")))?;
        match tag {
            "s" => Ok(SettingValue::Str(body.to_string())),
            "i" => body
                .parse::<i64>()
                .map(SettingValue::Int)
                .map_err(|_| Error::Protocol(format!("invalid integer setting: {body}"))),
            "f" => match body.parse::<f32>() {
                Ok(v) if v.is_finite() => Ok(SettingValue::Float(v)),
                _ => Err(Error::Protocol(format!("invalid float setting: {body}"))),
            },
            _ => Err(Error::Protocol(format!("unknown setting type tag: {tag}"))),
        }
    }
}

impl fmt::Display for SettingValue {
    /// Formats the tagged wire form (`s:AM`, `i:42`, `f:1.5`).
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingValue::Str(s) => write!(f, "s:{s}"),
            SettingValue::Int(i) => write!(f, "i:{i}"),
            SettingValue::Float(v) => write!(f, "f:{v}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Command encoding
// ---------------------------------------------------------------------------

/// Encode a command line with the given sequence number.
///
/// Format: `C<seq>|<command>` (the transport appends the newline).
pub fn encode_command(seq: u32, command: &str) -> String {
    format!("C{seq}|{command}")
}

// ---------------------------------------------------------------------------
// Command builders
//
// Each builder returns the command string WITHOUT the `C<seq>|` prefix.
// The prefix is added by the correlator when it assigns a sequence number.
// ---------------------------------------------------------------------------

/// Build a generic `set` command for an object.
///
/// Example output: `"radio <id> set volume=50 rx=1"`
pub fn cmd_set(object: &str, target: Option<&str>, params: &[(&str, String)]) -> String {
    let mut cmd = String::from(object);
    if let Some(target) = target {
        cmd.push(' ');
        cmd.push_str(&escape(target));
    }
    cmd.push_str(" set");
    for (key, value) in params {
        cmd.push(' ');
        cmd.push_str(key);
        cmd.push('=');
        cmd.push_str(&escape(value));
    }
    cmd
}

/// Register the client program name.
///
/// Example output: `"client program vrclib"`
pub fn cmd_client_program(name: &str) -> String {
    format!("client program {}", escape(name))
}

/// Set the published client name.
pub fn cmd_client_name(name: &str) -> String {
    cmd_set("client", None, &[("name", name.to_string())])
}

/// Connect to a server by address.
///
/// Example output: `"network connect 10.0.0.5"`
pub fn cmd_network_connect(target_ip: &str) -> String {
    format!("network connect {}", escape(target_ip))
}

/// Disconnect from the current server.
pub fn cmd_network_disconnect() -> String {
    "network disconnect".to_string()
}

/// Connect through a server cloud.
pub fn cmd_cloud_connect(cloud: &Id) -> String {
    format!("cloud connect {cloud}")
}

/// Request a role.
///
/// Example output: `"role set <id>"`
pub fn cmd_role_set(role: &Id) -> String {
    format!("role set {role}")
}

/// Request an entity state (vehicle).
pub fn cmd_entity_state_set(entity_state: &Id) -> String {
    format!("entity_state set {entity_state}")
}

/// Tune a radio to a net, or power it off with `None`.
///
/// Example output: `"radio <id> set net=none"`
pub fn cmd_radio_set_net(radio: &Id, net: Option<&Id>) -> String {
    cmd_set("radio", Some(radio.as_str()), &[("net", wire_id(net).to_string())])
}

/// Override attributes of a net as assigned to one radio.
///
/// Example output: `"radio <rid> net <nid> set rx_freq=30000000"`
pub fn cmd_radio_net_override(radio: &Id, net: &Id, params: &[(&str, String)]) -> String {
    cmd_set(&format!("radio {radio} net"), Some(net.as_str()), params)
}

/// Set the net of a jammer.
pub fn cmd_jammer_set_net(jammer: &Id, net: &Id) -> String {
    cmd_set("jammer", Some(jammer.as_str()), &[("net", net.to_string())])
}

/// Start recording on a jammer.
///
/// Example output: `"jammer <id> record start duration=10"`
pub fn cmd_jammer_record_start(jammer: &Id, duration_secs: u32) -> String {
    format!("jammer {jammer} record start duration={duration_secs}")
}

/// Stop recording on a jammer.
pub fn cmd_jammer_record_stop(jammer: &Id) -> String {
    format!("jammer {jammer} record stop")
}

/// Start replaying recorded audio on a jammer.
pub fn cmd_jammer_replay_start(jammer: &Id, looped: bool) -> String {
    format!("jammer {jammer} replay start loop={}", u8::from(looped))
}

/// Stop replaying on a jammer.
pub fn cmd_jammer_replay_stop(jammer: &Id) -> String {
    format!("jammer {jammer} replay stop")
}

/// Apply a headset preset.
///
/// Example output: `"headset preset plantronics"`
pub fn cmd_headset_preset(preset: HeadsetPreset) -> String {
    format!("headset preset {preset}")
}

/// Set the microphone mode.
pub fn cmd_headset_mic_mode(mode: MicMode) -> String {
    cmd_set("headset", None, &[("mic_mode", mode.to_string())])
}

/// Set a radio's balance.
pub fn cmd_radio_balance(radio: &Id, balance: Balance) -> String {
    cmd_set("radio", Some(radio.as_str()), &[("balance", balance.to_string())])
}

/// Set the software PTT state for a PTT index.
///
/// Example output: `"ptt 0 set pressed=1"`
pub fn cmd_ptt(index: u32, pressed: bool) -> String {
    format!("ptt {index} set pressed={}", u8::from(pressed))
}

/// Create a new call and join it.
pub fn cmd_call_create() -> String {
    "call create".to_string()
}

/// Invite an endpoint to a call, optionally asking it to dial a number.
///
/// Example output: `"call <cid> invite <eid> dial=5551234"`
pub fn cmd_call_invite(call: &Id, endpoint: &Id, dial_number: Option<&str>) -> String {
    match dial_number {
        Some(number) => format!("call {call} invite {endpoint} dial={}", escape(number)),
        None => format!("call {call} invite {endpoint}"),
    }
}

/// Invite the whole crew to a call.
pub fn cmd_call_invite_crew() -> String {
    "call invite_crew".to_string()
}

/// Report this client's own progress on a call.
pub fn cmd_call_progress(call: &Id, state: CallProgress) -> String {
    format!("call {call} progress state={state}")
}

/// Leave a call.
pub fn cmd_call_leave(call: &Id, reason: LeaveReason) -> String {
    format!("call {call} leave reason={reason}")
}

/// Send key presses (DTMF) on a call.
pub fn cmd_call_press_key(call: &Id, keys: &str) -> String {
    format!("call {call} press_key keys={}", escape(keys))
}

/// Ask a signaling endpoint to leave a call.
pub fn cmd_call_leave_request(call: &Id, endpoint: &Id) -> String {
    format!("call {call} leave_request {endpoint}")
}

/// Request a license of the given type.
///
/// Example output: `"license request type=jammer"`
pub fn cmd_license_request(license_type: &str) -> String {
    format!("license request type={}", escape(license_type))
}

/// Release a license by server handle.
pub fn cmd_license_release(handle: &str) -> String {
    format!("license release {}", escape(handle))
}

/// Ask the server to refresh a live radio's settings.
pub fn cmd_radctrl_poll(name: &str) -> String {
    format!("radctrl {} poll", escape(name))
}

/// Change a live radio setting.
///
/// Example output: `"radctrl R2 set freq=i:30000000"`
pub fn cmd_radctrl_set(name: &str, setting: &str, value: &SettingValue) -> String {
    format!(
        "radctrl {} set {}={}",
        escape(name),
        escape(setting),
        escape(&value.to_string())
    )
}

// ---------------------------------------------------------------------------
// Inbound frame types
// ---------------------------------------------------------------------------

/// A decoded handshake version line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// A decoded response to a previously-sent command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Sequence number correlating this response to its command.
    pub sequence: u32,
    /// Result code. `0` means success.
    pub code: u32,
    /// Response data (may be empty). For `call create` this is the call id.
    pub data: String,
}

impl Response {
    /// Whether the server accepted the command.
    pub fn is_ok(&self) -> bool {
        self.code == 0
    }

    /// Convert into the response data, or [`Error::Rejected`].
    pub fn into_result(self) -> Result<String> {
        if self.is_ok() {
            Ok(self.data)
        } else {
            Err(Error::Rejected {
                code: self.code,
                message: self.data,
            })
        }
    }
}

/// What a status line asks the receiver to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    /// Create the target or update its fields.
    Upsert,
    /// Remove the target.
    Remove,
    /// Confirm the target as the active selection (no target: deselect).
    Select,
    /// Remove every member of the collection.
    Clear,
}

/// Control keys that select a [`Change`] and are not entity fields.
const CONTROL_KEYS: &[&str] = &["removed", "clear", "active"];

/// A decoded status (delta) line.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusLine {
    /// Peer-assigned change sequence number.
    pub sequence: u64,
    /// The object the delta applies to.
    pub kind: EntityKind,
    /// Target identifier or name (absent for singletons and selections).
    pub target: Option<String>,
    /// Key-value pairs, already unescaped.
    pub params: Vec<(String, String)>,
}

impl StatusLine {
    /// Look up a parameter value.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Whether a control flag is set (`key=1`).
    pub fn flag(&self, key: &str) -> bool {
        self.param(key) == Some("1")
    }

    /// The change this line requests.
    pub fn change(&self) -> Change {
        if self.flag("removed") {
            Change::Remove
        } else if self.flag("clear") {
            Change::Clear
        } else if self.flag("active") {
            Change::Select
        } else {
            Change::Upsert
        }
    }

    /// Entity fields, excluding control keys.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.params
            .iter()
            .filter(|(k, _)| !CONTROL_KEYS.contains(&k.as_str()))
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// The target parsed as an entity identifier.
    pub fn target_id(&self) -> Result<Id> {
        match &self.target {
            Some(t) => Id::parse(t),
            None => Err(Error::Protocol(format!(
                "{} status missing target identifier",
                self.kind
            ))),
        }
    }
}

/// Types of lines received from the server.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Handshake version line: `V1.2.0`
    Version(ProtocolVersion),
    /// Handshake client handle: `H12345678`
    Handle(u32),
    /// Response to a command: `R<seq>|<code>|<data>`
    Response(Response),
    /// Status delta: `S<seq>|<object> ...`
    Status(StatusLine),
    /// Informational message: `M<seq>|<text>`
    Message(String),
    /// An unrecognised line.
    Unknown(String),
}

// ---------------------------------------------------------------------------
// Line parsing
// ---------------------------------------------------------------------------

/// Parse a single line received from the server.
///
/// The line should NOT include the trailing `\n`. Leading/trailing whitespace
/// is stripped for robustness.
pub fn parse_line(line: &str) -> Result<Frame> {
    let line = line.trim();
    if line.is_empty() {
        return Err(Error::Protocol("empty line".into()));
    }

    match line.as_bytes()[0] {
        b'V' => parse_version(line),
        b'H' => parse_handle(line),
        b'R' => parse_response(line),
        b'S' => parse_status(line),
        b'M' => parse_message(line),
        _ => Ok(Frame::Unknown(line.to_string())),
    }
}

/// Parse a version line: `V<major>.<minor>.<patch>`
fn parse_version(line: &str) -> Result<Frame> {
    let parts: Vec<&str> = line[1..].split('.').collect();
    if parts.len() != 3 {
        return Err(Error::Protocol(format!("invalid version format: {line}")));
    }

    let parse_u32 = |s: &str| -> Result<u32> {
        s.parse::<u32>()
            .map_err(|_| Error::Protocol(format!("invalid version number: {s}")))
    };

    Ok(Frame::Version(ProtocolVersion {
        major: parse_u32(parts[0])?,
        minor: parse_u32(parts[1])?,
        patch: parse_u32(parts[2])?,
    }))
}

/// Parse a handle line: `H<hex_digits>`
fn parse_handle(line: &str) -> Result<Frame> {
    let body = &line[1..];
    let handle = u32::from_str_radix(body, 16)
        .map_err(|_| Error::Protocol(format!("invalid hex handle: {body}")))?;
    Ok(Frame::Handle(handle))
}

/// Parse a response line: `R<seq>|<hex_code>|<data>`
fn parse_response(line: &str) -> Result<Frame> {
    let parts: Vec<&str> = line[1..].splitn(3, '|').collect();
    if parts.len() < 2 {
        return Err(Error::Protocol(format!(
            "malformed response (need at least seq|code): {line}"
        )));
    }

    let sequence = parts[0]
        .parse::<u32>()
        .map_err(|_| Error::Protocol(format!("invalid response sequence: {}", parts[0])))?;
    let code = u32::from_str_radix(parts[1], 16)
        .map_err(|_| Error::Protocol(format!("invalid response code: {}", parts[1])))?;
    let data = parts.get(2).map(|d| unescape(d)).unwrap_or_default();

    Ok(Frame::Response(Response {
        sequence,
        code,
        data,
    }))
}

/// Parse a status line: `S<seq>|<object> [<target>] [<key>=<value> ...]`
fn parse_status(line: &str) -> Result<Frame> {
    let body = &line[1..];
    let (seq_str, payload) = body
        .split_once('|')
        .ok_or_else(|| Error::Protocol(format!("malformed status (no pipe): {line}")))?;

    let sequence = seq_str
        .parse::<u64>()
        .map_err(|_| Error::Protocol(format!("invalid status sequence: {seq_str}")))?;

    let mut tokens = payload.split_whitespace().peekable();
    let kind_token = tokens
        .next()
        .ok_or_else(|| Error::Protocol(format!("status line without object: {line}")))?;
    let kind = kind_token
        .parse::<EntityKind>()
        .map_err(|e| Error::Protocol(e.to_string()))?;

    let target = match tokens.peek() {
        Some(token) if !token.contains('=') => {
            let t = unescape(token);
            tokens.next();
            Some(t)
        }
        _ => None,
    };

    let mut params = Vec::new();
    for token in tokens {
        if let Some((key, value)) = token.split_once('=') {
            params.push((key.to_string(), unescape(value)));
        }
        // Bare tokens after the target carry no meaning and are skipped.
    }

    Ok(Frame::Status(StatusLine {
        sequence,
        kind,
        target,
        params,
    }))
}

/// Parse a message line: `M<seq>|<text>`
fn parse_message(line: &str) -> Result<Frame> {
    let (_, text) = line[1..]
        .split_once('|')
        .ok_or_else(|| Error::Protocol(format!("malformed message (no pipe): {line}")))?;
    Ok(Frame::Message(unescape(text)))
}

// ---------------------------------------------------------------------------
// Field value helpers
//
// Shared by every entity's field parser so that malformed values fail the
// whole delta with a consistent error.
// ---------------------------------------------------------------------------

/// Parse a `0`/`1` boolean field.
pub fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value {
        "1" | "true" => Ok(true),
        "0" | "false" => Ok(false),
        _ => Err(Error::Protocol(format!("invalid boolean for {key}: {value}"))),
    }
}

/// Parse a numeric field.
pub fn parse_num<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse::<T>()
        .map_err(|_| Error::Protocol(format!("invalid number for {key}: {value}")))
}

/// Parse a float field. Non-finite values are rejected.
pub fn parse_float(key: &str, value: &str) -> Result<f32> {
    match value.parse::<f32>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(Error::Protocol(format!("invalid float for {key}: {value}"))),
    }
}

/// Parse a wire enum field.
pub fn parse_enum<T>(key: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr<Err = crate::types::ParseEnumError>,
{
    value
        .parse::<T>()
        .map_err(|e| Error::Protocol(format!("{key}: {e}")))
}

/// Parse a comma-separated list of identifiers (empty string = empty list).
pub fn parse_id_list(key: &str, value: &str) -> Result<Vec<Id>> {
    if value.is_empty() || value == "none" {
        return Ok(Vec::new());
    }
    value
        .split(',')
        .map(|s| Id::parse(s).map_err(|e| Error::Protocol(format!("{key}: {e}"))))
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
