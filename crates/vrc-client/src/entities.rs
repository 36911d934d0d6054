//! Cached entity records.
//!
//! Each record mirrors one server-owned object and is updated only from
//! status deltas. Field keys match the server's status lines; keys a record
//! does not know are ignored so newer servers can add fields.

use std::collections::BTreeMap;

use vrc_core::error::Result;
use vrc_core::protocol::{parse_bool, parse_enum, parse_float, parse_id_list, parse_num};
use vrc_core::{Balance, EntityKind, Id, RecordReplayState};

use crate::collection::{Entity, Fields};

// ---------------------------------------------------------------------------
// Role
// ---------------------------------------------------------------------------

/// An operator profile defining permissions and radio/PTT mappings.
#[derive(Debug, Clone, PartialEq)]
pub struct Role {
    pub id: Id,
    pub name: String,
    /// Radios may be auto-tuned by the server.
    pub autotune: bool,
    /// Live radio control is permitted.
    pub radio_control: bool,
    /// Placing and receiving calls is permitted.
    pub calling: bool,
    /// Calls are keyed with PTT rather than open microphone.
    pub call_ptt: bool,
    /// Text chat is permitted.
    pub chat: bool,
    /// Display slot for each radio channel, indexed by channel.
    pub channel_display_map: Vec<i32>,
}

impl Entity for Role {
    const KIND: EntityKind = EntityKind::Role;

    fn new(id: Id) -> Self {
        Role {
            id,
            name: String::new(),
            autotune: false,
            radio_control: false,
            calling: false,
            call_ptt: false,
            chat: false,
            channel_display_map: Vec::new(),
        }
    }

    fn id(&self) -> &Id {
        &self.id
    }
}

impl Fields for Role {
    fn apply_field(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "name" => self.name = value.to_string(),
            "autotune" => self.autotune = parse_bool(key, value)?,
            "radctrl" => self.radio_control = parse_bool(key, value)?,
            "calling" => self.calling = parse_bool(key, value)?,
            "call_ptt" => self.call_ptt = parse_bool(key, value)?,
            "chat" => self.chat = parse_bool(key, value)?,
            "channel_map" => {
                self.channel_display_map = if value.is_empty() {
                    Vec::new()
                } else {
                    value
                        .split(',')
                        .map(|v| parse_num(key, v))
                        .collect::<Result<_>>()?
                };
            }
            _ => tracing::trace!(key, "ignoring unknown role field"),
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Entity state
// ---------------------------------------------------------------------------

/// A selectable vehicle context.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityState {
    pub id: Id,
    pub name: String,
}

impl Entity for EntityState {
    const KIND: EntityKind = EntityKind::EntityState;

    fn new(id: Id) -> Self {
        EntityState {
            id,
            name: String::new(),
        }
    }

    fn id(&self) -> &Id {
        &self.id
    }
}

impl Fields for EntityState {
    fn apply_field(&mut self, key: &str, value: &str) -> Result<()> {
        if key == "name" {
            self.name = value.to_string();
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Net
// ---------------------------------------------------------------------------

/// A tunable channel.
#[derive(Debug, Clone, PartialEq)]
pub struct Net {
    pub id: Id,
    pub name: String,
    /// Frequency in Hz.
    pub frequency: u64,
    /// Waveform (mode), e.g. `AM`, `FM`.
    pub waveform: String,
    pub crypto_system: i32,
    pub crypto_key: i32,
    pub crypto_enabled: bool,
    /// Net id for frequency-hopping nets.
    pub freq_hop_net_id: i32,
    pub satcom_channel: i32,
    /// AM/FM = 1, Intercom = 2, HAVEQUICK = 4, SINCGARS = 5.
    pub tuning_method: i32,
}

impl Entity for Net {
    const KIND: EntityKind = EntityKind::Net;

    fn new(id: Id) -> Self {
        Net {
            id,
            name: String::new(),
            frequency: 0,
            waveform: String::new(),
            crypto_system: 0,
            crypto_key: 0,
            crypto_enabled: false,
            freq_hop_net_id: 0,
            satcom_channel: 0,
            tuning_method: 0,
        }
    }

    fn id(&self) -> &Id {
        &self.id
    }
}

impl Fields for Net {
    fn apply_field(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "name" => self.name = value.to_string(),
            "freq" => self.frequency = parse_num(key, value)?,
            "waveform" => self.waveform = value.to_string(),
            "crypto_system" => self.crypto_system = parse_num(key, value)?,
            "crypto_key" => self.crypto_key = parse_num(key, value)?,
            "crypto" => self.crypto_enabled = parse_bool(key, value)?,
            "fh_net" => self.freq_hop_net_id = parse_num(key, value)?,
            "satcom_channel" => self.satcom_channel = parse_num(key, value)?,
            "tuning" => self.tuning_method = parse_num(key, value)?,
            _ => tracing::trace!(key, "ignoring unknown net field"),
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Radio
// ---------------------------------------------------------------------------

/// Per-radio overrides of the active net's attributes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NetOverride {
    pub rx_frequency: Option<u64>,
    pub tx_frequency: Option<u64>,
    pub crypto_system: Option<i32>,
    pub crypto_key: Option<i32>,
}

/// A radio available to the current role.
#[derive(Debug, Clone, PartialEq)]
pub struct Radio {
    pub id: Id,
    pub name: String,
    /// Radio type, e.g. `URC-200`. Empty for a generic radio.
    pub radio_type: String,
    /// Nets this radio may tune, in display order.
    pub nets: Vec<Id>,
    /// Server-confirmed tuned net (`None` = powered off).
    pub net: Option<Id>,
    /// Overrides applied to the tuned net.
    pub net_override: NetOverride,
    pub rx_enabled: bool,
    pub tx_enabled: bool,
    pub receiving: bool,
    pub transmitting: bool,
    /// Shared radios are reached through an entity state.
    pub shared: bool,
    pub crypto_enabled: bool,
    pub volume: f32,
    pub volume_left: f32,
    pub volume_right: f32,
    pub balance: Balance,
    pub balance_locked: bool,
    pub net_locked: bool,
    pub rx_mode_locked: bool,
    pub tx_mode_locked: bool,
    /// Index of the PTT that keys this radio.
    pub ptt: i32,
    pub radio_effects: Option<Id>,
    pub radio_effects_locked: bool,
    /// Name of the live radio control bound to this radio.
    pub radio_control: Option<String>,
    pub audio_level: f32,
    pub audio_level_enabled: bool,
    pub playsound: Option<Id>,
    pub playsound_locked: bool,
}

impl Entity for Radio {
    const KIND: EntityKind = EntityKind::Radio;

    fn new(id: Id) -> Self {
        Radio {
            id,
            name: String::new(),
            radio_type: String::new(),
            nets: Vec::new(),
            net: None,
            net_override: NetOverride::default(),
            rx_enabled: false,
            tx_enabled: false,
            receiving: false,
            transmitting: false,
            shared: false,
            crypto_enabled: false,
            volume: 0.0,
            volume_left: 0.0,
            volume_right: 0.0,
            balance: Balance::Center,
            balance_locked: false,
            net_locked: false,
            rx_mode_locked: false,
            tx_mode_locked: false,
            ptt: 0,
            radio_effects: None,
            radio_effects_locked: false,
            radio_control: None,
            audio_level: 0.0,
            audio_level_enabled: false,
            playsound: None,
            playsound_locked: false,
        }
    }

    fn id(&self) -> &Id {
        &self.id
    }
}

/// Parse an optional override value (`none` clears it).
fn parse_override<T: std::str::FromStr>(key: &str, value: &str) -> Result<Option<T>> {
    if value.is_empty() || value == "none" {
        Ok(None)
    } else {
        parse_num(key, value).map(Some)
    }
}

impl Fields for Radio {
    // A net change resets the overrides, so it must not undo overrides
    // sent alongside it.
    const LEADING: &'static [&'static str] = &["net"];

    fn apply_field(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "name" => self.name = value.to_string(),
            "type" => self.radio_type = value.to_string(),
            "nets" => self.nets = parse_id_list(key, value)?,
            "net" => {
                let net = Id::parse_optional(value)?;
                if net != self.net {
                    // Overrides belong to the previously tuned net.
                    self.net_override = NetOverride::default();
                }
                self.net = net;
            }
            "rx_freq" => self.net_override.rx_frequency = parse_override(key, value)?,
            "tx_freq" => self.net_override.tx_frequency = parse_override(key, value)?,
            "crypto_system" => self.net_override.crypto_system = parse_override(key, value)?,
            "crypto_key" => self.net_override.crypto_key = parse_override(key, value)?,
            "rx" => self.rx_enabled = parse_bool(key, value)?,
            "tx" => self.tx_enabled = parse_bool(key, value)?,
            "receiving" => self.receiving = parse_bool(key, value)?,
            "transmitting" => self.transmitting = parse_bool(key, value)?,
            "shared" => self.shared = parse_bool(key, value)?,
            "crypto" => self.crypto_enabled = parse_bool(key, value)?,
            "volume" => self.volume = parse_float(key, value)?,
            "volume_left" => self.volume_left = parse_float(key, value)?,
            "volume_right" => self.volume_right = parse_float(key, value)?,
            "balance" => self.balance = parse_enum(key, value)?,
            "balance_locked" => self.balance_locked = parse_bool(key, value)?,
            "net_locked" => self.net_locked = parse_bool(key, value)?,
            "rx_mode_locked" => self.rx_mode_locked = parse_bool(key, value)?,
            "tx_mode_locked" => self.tx_mode_locked = parse_bool(key, value)?,
            "ptt" => self.ptt = parse_num(key, value)?,
            "effects" => self.radio_effects = Id::parse_optional(value)?,
            "effects_locked" => self.radio_effects_locked = parse_bool(key, value)?,
            "radctrl" => {
                self.radio_control = match value {
                    "" | "none" => None,
                    name => Some(name.to_string()),
                }
            }
            "audio_level" => self.audio_level = parse_float(key, value)?,
            "audio_level_enabled" => self.audio_level_enabled = parse_bool(key, value)?,
            "playsound" => self.playsound = Id::parse_optional(value)?,
            "playsound_locked" => self.playsound_locked = parse_bool(key, value)?,
            _ => tracing::trace!(key, "ignoring unknown radio field"),
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Jammer
// ---------------------------------------------------------------------------

/// A jammer transmitter with record/replay.
#[derive(Debug, Clone, PartialEq)]
pub struct Jammer {
    pub id: Id,
    pub name: String,
    pub nets: Vec<Id>,
    pub net: Option<Id>,
    pub enabled: bool,
    pub transmitting: bool,
    pub record_replay: RecordReplayState,
    /// Progress through the current record/replay, in percent.
    pub progress: i32,
    /// Length of the recording in milliseconds.
    pub duration_ms: i32,
}

impl Entity for Jammer {
    const KIND: EntityKind = EntityKind::Jammer;

    fn new(id: Id) -> Self {
        Jammer {
            id,
            name: String::new(),
            nets: Vec::new(),
            net: None,
            enabled: false,
            transmitting: false,
            record_replay: RecordReplayState::Idle,
            progress: 0,
            duration_ms: 0,
        }
    }

    fn id(&self) -> &Id {
        &self.id
    }
}

impl Fields for Jammer {
    fn apply_field(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "name" => self.name = value.to_string(),
            "nets" => self.nets = parse_id_list(key, value)?,
            "net" => self.net = Id::parse_optional(value)?,
            "enabled" => self.enabled = parse_bool(key, value)?,
            "transmitting" => self.transmitting = parse_bool(key, value)?,
            "record_replay" => self.record_replay = parse_enum(key, value)?,
            "progress" => self.progress = parse_num(key, value)?,
            "duration_ms" => self.duration_ms = parse_num(key, value)?,
            _ => tracing::trace!(key, "ignoring unknown jammer field"),
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Small named records
// ---------------------------------------------------------------------------

/// A radio effects profile.
#[derive(Debug, Clone, PartialEq)]
pub struct RadioEffect {
    pub id: Id,
    pub name: String,
}

impl Entity for RadioEffect {
    const KIND: EntityKind = EntityKind::RadioEffect;

    fn new(id: Id) -> Self {
        RadioEffect {
            id,
            name: String::new(),
        }
    }

    fn id(&self) -> &Id {
        &self.id
    }
}

impl Fields for RadioEffect {
    fn apply_field(&mut self, key: &str, value: &str) -> Result<()> {
        if key == "name" {
            self.name = value.to_string();
        }
        Ok(())
    }
}

/// A background playsound.
#[derive(Debug, Clone, PartialEq)]
pub struct Playsound {
    pub id: Id,
    pub name: String,
}

impl Entity for Playsound {
    const KIND: EntityKind = EntityKind::Playsound;

    fn new(id: Id) -> Self {
        Playsound {
            id,
            name: String::new(),
        }
    }

    fn id(&self) -> &Id {
        &self.id
    }
}

impl Fields for Playsound {
    fn apply_field(&mut self, key: &str, value: &str) -> Result<()> {
        if key == "name" {
            self.name = value.to_string();
        }
        Ok(())
    }
}

/// A joystick attached to the client station.
#[derive(Debug, Clone, PartialEq)]
pub struct Joystick {
    pub id: Id,
    pub name: String,
    pub button_count: u32,
}

impl Entity for Joystick {
    const KIND: EntityKind = EntityKind::Joystick;

    fn new(id: Id) -> Self {
        Joystick {
            id,
            name: String::new(),
            button_count: 0,
        }
    }

    fn id(&self) -> &Id {
        &self.id
    }
}

impl Fields for Joystick {
    fn apply_field(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "name" => self.name = value.to_string(),
            "buttons" => self.button_count = parse_num(key, value)?,
            _ => {}
        }
        Ok(())
    }
}

/// A discoverable server cloud.
#[derive(Debug, Clone, PartialEq)]
pub struct Cloud {
    pub id: Id,
    pub name: String,
    /// Servers currently in the cloud.
    pub server_count: u32,
}

impl Entity for Cloud {
    const KIND: EntityKind = EntityKind::Cloud;

    fn new(id: Id) -> Self {
        Cloud {
            id,
            name: String::new(),
            server_count: 0,
        }
    }

    fn id(&self) -> &Id {
        &self.id
    }
}

impl Fields for Cloud {
    fn apply_field(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "name" => self.name = value.to_string(),
            "servers" => self.server_count = parse_num(key, value)?,
            _ => {}
        }
        Ok(())
    }
}

/// Another operator visible on the server.
///
/// Operators publish an open-ended set of fields (`name`, `role`,
/// `callactive`, ...) so they are kept as a generic map.
#[derive(Debug, Clone, PartialEq)]
pub struct Operator {
    pub id: Id,
    pub fields: BTreeMap<String, String>,
}

impl Entity for Operator {
    const KIND: EntityKind = EntityKind::Operator;

    fn new(id: Id) -> Self {
        Operator {
            id,
            fields: BTreeMap::new(),
        }
    }

    fn id(&self) -> &Id {
        &self.id
    }
}

impl Operator {
    /// Look up a published field.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

impl Fields for Operator {
    fn apply_field(&mut self, key: &str, value: &str) -> Result<()> {
        self.fields.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::apply_all;

    const NET_A: &str = "NETA0000000000000000000000000001";
    const NET_B: &str = "NETB0000000000000000000000000002";

    fn id(s: &str) -> Id {
        Id::parse(s).unwrap()
    }

    #[test]
    fn new_sets_id() {
        let r = Radio::new(id(NET_A));
        assert_eq!(r.id(), &id(NET_A));
        assert_eq!(r.balance, Balance::Center);
    }

    #[test]
    fn role_capabilities_and_channel_map() {
        let mut role = Role::new(id(NET_A));
        apply_all(
            &mut role,
            [("name", "Pilot"), ("calling", "1"), ("channel_map", "2,0,1")],
        )
        .unwrap();
        assert_eq!(role.name, "Pilot");
        assert!(role.calling);
        assert!(!role.chat);
        assert_eq!(role.channel_display_map, vec![2, 0, 1]);
    }

    #[test]
    fn radio_fields() {
        let list = format!("{NET_A},{NET_B}");
        let mut radio = Radio::new(id(NET_A));
        apply_all(
            &mut radio,
            [
                ("name", "UHF 1"),
                ("nets", list.as_str()),
                ("net", NET_B),
                ("volume", "0.75"),
                ("balance", "left"),
                ("effects", "none"),
                ("radctrl", "R2"),
            ],
        )
        .unwrap();
        assert_eq!(radio.nets.len(), 2);
        assert_eq!(radio.net, Some(id(NET_B)));
        assert_eq!(radio.volume, 0.75);
        assert_eq!(radio.balance, Balance::Left);
        assert_eq!(radio.radio_effects, None);
        assert_eq!(radio.radio_control.as_deref(), Some("R2"));
    }

    #[test]
    fn retuning_clears_overrides() {
        let mut radio = Radio::new(id(NET_A));
        apply_all(&mut radio, [("net", NET_A), ("rx_freq", "30000000")]).unwrap();
        assert_eq!(radio.net_override.rx_frequency, Some(30_000_000));

        apply_all(&mut radio, [("net", NET_B)]).unwrap();
        assert_eq!(radio.net_override, NetOverride::default());

        apply_all(&mut radio, [("net", "none")]).unwrap();
        assert_eq!(radio.net, None);
    }

    #[test]
    fn retune_keeps_overrides_sent_with_it() {
        let mut radio = Radio::new(id(NET_A));
        apply_all(&mut radio, [("net", NET_A)]).unwrap();
        apply_all(
            &mut radio,
            [("rx_freq", "30000000"), ("net", NET_B), ("crypto_key", "7")],
        )
        .unwrap();
        assert_eq!(radio.net, Some(id(NET_B)));
        assert_eq!(radio.net_override.rx_frequency, Some(30_000_000));
        assert_eq!(radio.net_override.crypto_key, Some(7));
    }

    #[test]
    fn identical_volume_delta_is_not_a_change() {
        let mut radio = Radio::new(id(NET_A));
        assert!(apply_all(&mut radio, [("volume", "0.5")]).unwrap());
        assert!(!apply_all(&mut radio, [("volume", "0.5")]).unwrap());
        assert!(apply_all(&mut radio, [("volume", "NaN")]).is_err());
        assert_eq!(radio.volume, 0.5);
    }

    #[test]
    fn radio_rejects_bad_values() {
        let mut radio = Radio::new(id(NET_A));
        assert!(apply_all(&mut radio, [("balance", "up")]).is_err());
        assert!(apply_all(&mut radio, [("rx", "maybe")]).is_err());
        assert!(apply_all(&mut radio, [("net", "short")]).is_err());
    }

    #[test]
    fn jammer_fields() {
        let mut jammer = Jammer::new(id(NET_A));
        apply_all(
            &mut jammer,
            [
                ("record_replay", "recording"),
                ("progress", "40"),
                ("duration_ms", "10000"),
            ],
        )
        .unwrap();
        assert_eq!(jammer.record_replay, RecordReplayState::Recording);
        assert_eq!(jammer.progress, 40);
    }

    #[test]
    fn net_fields() {
        let mut net = Net::new(id(NET_A));
        apply_all(
            &mut net,
            [("freq", "243000000"), ("waveform", "AM"), ("tuning", "1")],
        )
        .unwrap();
        assert_eq!(net.frequency, 243_000_000);
        assert_eq!(net.waveform, "AM");
        assert_eq!(net.tuning_method, 1);
    }

    #[test]
    fn operator_keeps_all_fields() {
        let mut op = Operator::new(id(NET_A));
        apply_all(&mut op, [("name", "Bob"), ("callactive", "true")]).unwrap();
        assert_eq!(op.field("callactive"), Some("true"));
        assert_eq!(op.field("missing"), None);
    }
}
