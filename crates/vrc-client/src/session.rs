//! Singleton records: the session, the headset, and the phone.
//!
//! Each is published by the server as a status line without a target
//! (`S<seq>|session state=connected ...`) and stored in a
//! [`Singleton`](crate::collection::Singleton).

use vrc_core::error::{Error, Result};
use vrc_core::protocol::{parse_bool, parse_enum, parse_float, parse_num};
use vrc_core::{ConnectState, ConnectionMode, ConnectionStatus, Id, MicMode};

use crate::collection::Fields;

/// Connection and server information.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub connection_status: ConnectionStatus,
    pub connect_state: ConnectState,
    pub connection_mode: ConnectionMode,
    /// This client's operator entry on the server.
    pub operator_id: Option<Id>,
    pub target_ip: String,
    pub client_ip: String,
    pub client_name: String,
    pub server_build_version: String,
    pub server_msg_version: String,
    pub server_msg_date: String,
    /// Hardware PTT inputs currently pressed, one bit per PTT index.
    pub hw_ptt: u32,
    /// Result code of the last failed server-side operation, 0 if none.
    pub last_error: u32,
    pub master_volume: f32,
    pub sidetone_volume: f32,
}

impl Default for Session {
    fn default() -> Self {
        Session {
            connection_status: ConnectionStatus::Disconnected,
            connect_state: ConnectState::Idle,
            connection_mode: ConnectionMode::Server,
            operator_id: None,
            target_ip: String::new(),
            client_ip: String::new(),
            client_name: String::new(),
            server_build_version: String::new(),
            server_msg_version: String::new(),
            server_msg_date: String::new(),
            hw_ptt: 0,
            last_error: 0,
            master_volume: 0.0,
            sidetone_volume: 0.0,
        }
    }
}

impl Session {
    /// Whether the hardware PTT input `index` is pressed.
    pub fn hw_ptt_pressed(&self, index: u32) -> bool {
        index < u32::BITS && self.hw_ptt & (1 << index) != 0
    }
}

impl Fields for Session {
    fn apply_field(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "status" => self.connection_status = parse_enum(key, value)?,
            "state" => self.connect_state = parse_enum(key, value)?,
            "mode" => self.connection_mode = parse_enum(key, value)?,
            "operator" => self.operator_id = Id::parse_optional(value)?,
            "target_ip" => self.target_ip = value.to_string(),
            "client_ip" => self.client_ip = value.to_string(),
            "client_name" => self.client_name = value.to_string(),
            "build" => self.server_build_version = value.to_string(),
            "msg_version" => self.server_msg_version = value.to_string(),
            "msg_date" => self.server_msg_date = value.to_string(),
            "hw_ptt" => {
                self.hw_ptt = u32::from_str_radix(value, 16).map_err(|_| {
                    Error::Protocol(format!("invalid hex for {key}: {value}"))
                })?
            }
            "error" => self.last_error = parse_num(key, value)?,
            "master_volume" => self.master_volume = parse_float(key, value)?,
            "sidetone_volume" => self.sidetone_volume = parse_float(key, value)?,
            _ => tracing::trace!(key, "ignoring unknown session field"),
        }
        Ok(())
    }
}

/// Headset configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Headset {
    pub vox_threshold: f32,
    pub mic_mode: MicMode,
    pub earphone_volume: f32,
    pub mic_volume: f32,
    pub sidetone_volume: f32,
    pub has_sidetone: bool,
    pub device_configured: bool,
    /// Microphone muted toward calls (radios unaffected).
    pub call_mic_mute: bool,
}

impl Default for Headset {
    fn default() -> Self {
        Headset {
            vox_threshold: 0.0,
            mic_mode: MicMode::Ptt,
            earphone_volume: 0.0,
            mic_volume: 0.0,
            sidetone_volume: 0.0,
            has_sidetone: false,
            device_configured: false,
            call_mic_mute: false,
        }
    }
}

impl Fields for Headset {
    fn apply_field(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "vox" => self.vox_threshold = parse_float(key, value)?,
            "mic_mode" => self.mic_mode = parse_enum(key, value)?,
            "earphone_volume" => self.earphone_volume = parse_float(key, value)?,
            "mic_volume" => self.mic_volume = parse_float(key, value)?,
            "sidetone_volume" => self.sidetone_volume = parse_float(key, value)?,
            "has_sidetone" => self.has_sidetone = parse_bool(key, value)?,
            "configured" => self.device_configured = parse_bool(key, value)?,
            "call_mic_mute" => self.call_mic_mute = parse_bool(key, value)?,
            _ => tracing::trace!(key, "ignoring unknown headset field"),
        }
        Ok(())
    }
}

/// The station's phone line.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Phone {
    pub present: bool,
    /// Call the phone is attached to.
    pub active_call: Option<Id>,
    pub volume: f32,
}

impl Fields for Phone {
    fn apply_field(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "present" => self.present = parse_bool(key, value)?,
            "call" => self.active_call = Id::parse_optional(value)?,
            "volume" => self.volume = parse_float(key, value)?,
            _ => tracing::trace!(key, "ignoring unknown phone field"),
        }
        Ok(())
    }
}
