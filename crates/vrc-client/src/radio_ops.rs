//! Radio and jammer operations.
//!
//! Radios and jammers are addressed by their dense index in the mirrored
//! collection. Reads at an out-of-range index return `None`; writes are
//! ignored.

use vrc_core::protocol;
use vrc_core::{Balance, Id};

use crate::client::VrcClient;
use crate::correlator::PendingKind;
use crate::entities::{Jammer, Net, Radio};
use crate::triad::SelectionTarget;

/// Shortest jammer recording, in seconds.
const MIN_RECORD_SECS: u32 = 1;
/// Longest jammer recording, in seconds.
const MAX_RECORD_SECS: u32 = 30;

impl VrcClient {
    // -----------------------------------------------------------------------
    // Radio reads
    // -----------------------------------------------------------------------

    pub fn radio_at(&self, radio: usize) -> Option<&Radio> {
        self.cache.radios.at(radio)
    }

    /// Number of nets the radio can be tuned to.
    pub fn radio_net_count(&self, radio: usize) -> usize {
        self.radio_at(radio).map_or(0, |r| r.nets.len())
    }

    /// Id of entry `net` in the radio's net list.
    pub fn radio_net_id_at(&self, radio: usize, net: usize) -> Option<&Id> {
        self.radio_at(radio)?.nets.get(net)
    }

    /// Record of entry `net` in the radio's net list.
    pub fn radio_net_at(&self, radio: usize, net: usize) -> Option<&Net> {
        let id = self.radio_net_id_at(radio, net)?;
        self.cache.nets.get(id.as_str())
    }

    fn radio_net_triad_value(&self, radio: usize, active: bool) -> Option<&Id> {
        let record = self.radio_at(radio)?;
        match self
            .selections
            .get(&SelectionTarget::RadioNet(record.id.clone()))
        {
            Some(triad) if active => triad.active_value().as_ref(),
            Some(triad) => triad.set_value().as_ref(),
            None => record.net.as_ref(),
        }
    }

    /// The net most recently requested for the radio.
    pub fn radio_net_set(&self, radio: usize) -> Option<&Id> {
        self.radio_net_triad_value(radio, false)
    }

    /// The net the server reports the radio tuned to.
    pub fn radio_net_active(&self, radio: usize) -> Option<&Id> {
        self.radio_net_triad_value(radio, true)
    }

    /// Record of the radio's active net.
    pub fn radio_active_net(&self, radio: usize) -> Option<&Net> {
        let id = self.radio_net_active(radio)?;
        self.cache.nets.get(id.as_str())
    }

    /// Receive frequency in Hz: the radio's override, else the net's.
    pub fn radio_rx_frequency(&self, radio: usize) -> Option<u64> {
        let net = self.radio_active_net(radio)?;
        let overrides = &self.radio_at(radio)?.net_override;
        Some(overrides.rx_frequency.unwrap_or(net.frequency))
    }

    /// Transmit frequency in Hz: the radio's override, else the net's.
    pub fn radio_tx_frequency(&self, radio: usize) -> Option<u64> {
        let net = self.radio_active_net(radio)?;
        let overrides = &self.radio_at(radio)?.net_override;
        Some(overrides.tx_frequency.unwrap_or(net.frequency))
    }

    pub fn radio_crypto_system(&self, radio: usize) -> Option<i32> {
        let net = self.radio_active_net(radio)?;
        let overrides = &self.radio_at(radio)?.net_override;
        Some(overrides.crypto_system.unwrap_or(net.crypto_system))
    }

    pub fn radio_crypto_key(&self, radio: usize) -> Option<i32> {
        let net = self.radio_active_net(radio)?;
        let overrides = &self.radio_at(radio)?.net_override;
        Some(overrides.crypto_key.unwrap_or(net.crypto_key))
    }

    // -----------------------------------------------------------------------
    // Radio net selection
    // -----------------------------------------------------------------------

    /// Tune a radio to entry `net` of its net list, or power it off with
    /// `None`.
    pub async fn set_radio_net(&mut self, radio: usize, net: Option<usize>) {
        let Some(record) = self.radio_at(radio) else {
            return;
        };
        let net = match net {
            Some(index) => match record.nets.get(index) {
                Some(id) => Some(id.clone()),
                None => {
                    tracing::debug!(radio, net = index, "set_radio_net: net index out of range");
                    return;
                }
            },
            None => None,
        };
        self.tune_radio(radio, net).await;
    }

    /// Tune a radio by net id. Nets outside the radio's list are ignored.
    pub async fn set_radio_net_id(&mut self, radio: usize, net: Option<&str>) {
        let Some(record) = self.radio_at(radio) else {
            return;
        };
        let net = match net {
            Some(net) => match record.nets.iter().find(|id| id.as_str() == net) {
                Some(id) => Some(id.clone()),
                None => {
                    tracing::debug!(radio, net, "set_radio_net_id: net not available to radio");
                    return;
                }
            },
            None => None,
        };
        self.tune_radio(radio, net).await;
    }

    async fn tune_radio(&mut self, radio: usize, net: Option<Id>) {
        let Some(record) = self.radio_at(radio) else {
            return;
        };
        let radio_id = record.id.clone();
        let current = record.net.clone();
        let target = SelectionTarget::RadioNet(radio_id.clone());
        if self.selections.get(&target).is_none() {
            self.selections.entry(&target).confirm(current);
        }
        let command = protocol::cmd_radio_set_net(&radio_id, net.as_ref());
        self.request_selection(target, net, &command).await;
    }

    // -----------------------------------------------------------------------
    // Radio setters
    // -----------------------------------------------------------------------

    async fn set_radio(&mut self, radio: usize, params: &[(&str, String)]) {
        let Some(id) = self.radio_at(radio).map(|r| r.id.clone()) else {
            tracing::debug!(radio, "radio index out of range");
            return;
        };
        let command = protocol::cmd_set("radio", Some(id.as_str()), params);
        self.fire(&command, PendingKind::Plain).await;
    }

    /// Override attributes of the radio's active net. Ignored while the
    /// radio has no net.
    async fn override_net(&mut self, radio: usize, params: &[(&str, String)]) {
        let Some(record) = self.radio_at(radio) else {
            return;
        };
        let Some(net) = record.net.clone() else {
            tracing::debug!(radio, "net override without an active net");
            return;
        };
        let command = protocol::cmd_radio_net_override(&record.id, &net, params);
        self.fire(&command, PendingKind::Plain).await;
    }

    pub async fn set_radio_rx_frequency(&mut self, radio: usize, hz: u64) {
        self.override_net(radio, &[("rx_freq", hz.to_string())]).await;
    }

    pub async fn set_radio_tx_frequency(&mut self, radio: usize, hz: u64) {
        self.override_net(radio, &[("tx_freq", hz.to_string())]).await;
    }

    /// Override the crypto system and key of the radio's active net.
    pub async fn set_radio_crypto(&mut self, radio: usize, system: i32, key: i32) {
        self.override_net(
            radio,
            &[
                ("crypto_system", system.to_string()),
                ("crypto_key", key.to_string()),
            ],
        )
        .await;
    }

    pub async fn set_radio_rx_enabled(&mut self, radio: usize, enabled: bool) {
        self.set_radio(radio, &[("rx", flag(enabled))]).await;
    }

    pub async fn set_radio_tx_enabled(&mut self, radio: usize, enabled: bool) {
        self.set_radio(radio, &[("tx", flag(enabled))]).await;
    }

    pub async fn set_radio_crypto_enabled(&mut self, radio: usize, enabled: bool) {
        self.set_radio(radio, &[("crypto", flag(enabled))]).await;
    }

    pub async fn set_radio_volume(&mut self, radio: usize, volume: f32) {
        self.set_radio(radio, &[("volume", volume.to_string())]).await;
    }

    pub async fn set_radio_stereo_volume(&mut self, radio: usize, left: f32, right: f32) {
        self.set_radio(
            radio,
            &[
                ("volume_left", left.to_string()),
                ("volume_right", right.to_string()),
            ],
        )
        .await;
    }

    pub async fn set_radio_balance(&mut self, radio: usize, balance: Balance) {
        let Some(id) = self.radio_at(radio).map(|r| r.id.clone()) else {
            return;
        };
        self.fire(&protocol::cmd_radio_balance(&id, balance), PendingKind::Plain)
            .await;
    }

    pub async fn set_radio_audio_level_enabled(&mut self, radio: usize, enabled: bool) {
        self.set_radio(radio, &[("audio_level_enabled", flag(enabled))])
            .await;
    }

    /// Map the radio to PTT `index`.
    pub async fn set_radio_ptt(&mut self, radio: usize, index: i32) {
        self.set_radio(radio, &[("ptt", index.to_string())]).await;
    }

    /// Bind a radio effect, or clear it with `None`.
    pub async fn set_radio_effects(&mut self, radio: usize, effect: Option<&str>) {
        if let Some(effect) = effect {
            if !self.cache.radio_effects.contains(effect) {
                tracing::debug!(radio, effect, "unknown radio effect");
                return;
            }
        }
        self.set_radio(radio, &[("effects", effect.unwrap_or("none").to_string())])
            .await;
    }

    /// Bind a playsound, or clear it with `None`.
    pub async fn set_radio_playsound(&mut self, radio: usize, playsound: Option<&str>) {
        if let Some(playsound) = playsound {
            if !self.cache.playsounds.contains(playsound) {
                tracing::debug!(radio, playsound, "unknown playsound");
                return;
            }
        }
        self.set_radio(
            radio,
            &[("playsound", playsound.unwrap_or("none").to_string())],
        )
        .await;
    }

    // -----------------------------------------------------------------------
    // Jammers
    // -----------------------------------------------------------------------

    pub fn jammer_at(&self, jammer: usize) -> Option<&Jammer> {
        self.cache.jammers.at(jammer)
    }

    pub fn jammer_net_count(&self, jammer: usize) -> usize {
        self.jammer_at(jammer).map_or(0, |j| j.nets.len())
    }

    pub fn jammer_net_at(&self, jammer: usize, net: usize) -> Option<&Net> {
        let id = self.jammer_at(jammer)?.nets.get(net)?;
        self.cache.nets.get(id.as_str())
    }

    pub fn jammer_active_net(&self, jammer: usize) -> Option<&Net> {
        let id = self.jammer_at(jammer)?.net.as_ref()?;
        self.cache.nets.get(id.as_str())
    }

    fn jammer_id(&self, jammer: usize) -> Option<Id> {
        let id = self.jammer_at(jammer).map(|j| j.id.clone());
        if id.is_none() {
            tracing::debug!(jammer, "jammer index out of range");
        }
        id
    }

    /// Set the jammer's net. Nets outside the jammer's list are ignored.
    pub async fn set_jammer_net(&mut self, jammer: usize, net: &str) {
        let Some(record) = self.jammer_at(jammer) else {
            return;
        };
        let Some(net) = record.nets.iter().find(|id| id.as_str() == net).cloned() else {
            tracing::debug!(jammer, net, "net not available to jammer");
            return;
        };
        let command = protocol::cmd_jammer_set_net(&record.id, &net);
        self.fire(&command, PendingKind::Plain).await;
    }

    pub async fn set_jammer_enabled(&mut self, jammer: usize, enabled: bool) {
        let Some(id) = self.jammer_id(jammer) else {
            return;
        };
        let command = protocol::cmd_set("jammer", Some(id.as_str()), &[("enabled", flag(enabled))]);
        self.fire(&command, PendingKind::Plain).await;
    }

    /// Start recording; the duration is clamped to 1..=30 seconds.
    pub async fn jammer_start_recording(&mut self, jammer: usize, duration_secs: u32) {
        let Some(id) = self.jammer_id(jammer) else {
            return;
        };
        let duration = duration_secs.clamp(MIN_RECORD_SECS, MAX_RECORD_SECS);
        self.fire(
            &protocol::cmd_jammer_record_start(&id, duration),
            PendingKind::Plain,
        )
        .await;
    }

    pub async fn jammer_stop_recording(&mut self, jammer: usize) {
        let Some(id) = self.jammer_id(jammer) else {
            return;
        };
        self.fire(&protocol::cmd_jammer_record_stop(&id), PendingKind::Plain)
            .await;
    }

    pub async fn jammer_start_replay(&mut self, jammer: usize, looped: bool) {
        let Some(id) = self.jammer_id(jammer) else {
            return;
        };
        self.fire(
            &protocol::cmd_jammer_replay_start(&id, looped),
            PendingKind::Plain,
        )
        .await;
    }

    pub async fn jammer_stop_replay(&mut self, jammer: usize) {
        let Some(id) = self.jammer_id(jammer) else {
            return;
        };
        self.fire(&protocol::cmd_jammer_replay_stop(&id), PendingKind::Plain)
            .await;
    }
}

fn flag(value: bool) -> String {
    u8::from(value).to_string()
}

#[cfg(test)]
mod tests {
    use vrc_core::{ClientEvent, EntityKind};

    use super::*;
    use crate::test_support::{with_radios, NET1, NET2, RADIO1, RADIO2};

    const JAMMER1: &str = "JAM10000000000000000000000000001";

    #[tokio::test]
    async fn dense_and_cursor_views_agree() {
        let (client, _server) = with_radios().await;
        let radios = client.radios();
        assert_eq!(radios.count(), 2);

        let mut cursor = radios.first().cloned();
        let mut index = 0;
        while let Some(id) = cursor {
            assert_eq!(radios.id_at(index), Some(&id));
            cursor = radios.next(id.as_str()).cloned();
            index += 1;
        }
        assert_eq!(index, 2);
        assert!(client.radio_at(2).is_none());
        assert_eq!(client.radio_net_count(2), 0);
    }

    #[tokio::test]
    async fn derived_net_attributes() {
        let (client, _server) = with_radios().await;
        assert_eq!(client.radio_net_count(0), 2);
        assert_eq!(client.radio_net_at(0, 1).unwrap().name, "Tower");
        assert!(client.radio_net_at(0, 2).is_none());

        assert_eq!(client.radio_active_net(0).unwrap().name, "Guard");
        assert_eq!(client.radio_rx_frequency(0), Some(243_000_000));
        assert_eq!(client.radio_crypto_system(0), Some(1));
        assert_eq!(client.radio_crypto_key(0), Some(4));

        // Radio 2 is off.
        assert!(client.radio_active_net(1).is_none());
        assert_eq!(client.radio_rx_frequency(1), None);
    }

    #[tokio::test]
    async fn override_wins_over_net_value() {
        let (mut client, server) = with_radios().await;
        server.push_line(format!("S3|radio {RADIO1} rx_freq=243500000 crypto_key=9"));
        client.update().await;
        assert_eq!(client.radio_rx_frequency(0), Some(243_500_000));
        assert_eq!(client.radio_tx_frequency(0), Some(243_000_000));
        assert_eq!(client.radio_crypto_key(0), Some(9));

        // Retuning drops overrides tied to the old net.
        server.push_line(format!("S4|radio {RADIO1} net={NET2}"));
        client.update().await;
        assert_eq!(client.radio_rx_frequency(0), Some(124_500_000));
    }

    #[tokio::test]
    async fn tune_radio_by_index_and_id() {
        let (mut client, server) = with_radios().await;
        client.set_radio_net(0, Some(1)).await;
        assert_eq!(
            server.last_command().unwrap(),
            format!("radio {RADIO1} set net={NET2}")
        );
        assert_eq!(client.radio_net_set(0).map(Id::as_str), Some(NET2));
        assert_eq!(client.radio_net_active(0).map(Id::as_str), Some(NET1));

        server.push_line(format!("S3|radio {RADIO1} net={NET2}"));
        client.update().await;
        assert_eq!(client.radio_net_active(0).map(Id::as_str), Some(NET2));
        assert!(!client
            .selections()
            .get(&SelectionTarget::RadioNet(Id::parse(RADIO1).unwrap()))
            .unwrap()
            .is_pending());

        client.set_radio_net_id(1, Some(NET2)).await;
        assert_eq!(
            server.last_command().unwrap(),
            format!("radio {RADIO2} set net={NET2}")
        );
        client.set_radio_net(1, None).await;
        assert_eq!(
            server.last_command().unwrap(),
            format!("radio {RADIO2} set net=none")
        );
    }

    #[tokio::test]
    async fn rejected_tune_reverts() {
        let (mut client, server) = with_radios().await;
        let mut events = client.subscribe();
        server.respond("radio", &["R{seq}|50000010|net locked"]);
        client.set_radio_net(0, Some(1)).await;
        client.update().await;

        assert_eq!(client.radio_net_set(0).map(Id::as_str), Some(NET1));
        assert_eq!(
            events.try_recv().unwrap(),
            ClientEvent::SelectionReverted {
                kind: EntityKind::Radio,
                owner: Some(Id::parse(RADIO1).unwrap()),
            }
        );
    }

    #[tokio::test]
    async fn invalid_radio_writes_are_ignored() {
        let (mut client, server) = with_radios().await;
        client.set_radio_volume(5, 0.5).await;
        client.set_radio_net(0, Some(7)).await;
        client.set_radio_net_id(1, Some(NET1)).await;
        client.set_radio_rx_frequency(1, 30_000_000).await;
        client.set_radio_effects(0, Some(JAMMER1)).await;
        assert!(server.sent_commands().is_empty());
    }

    #[tokio::test]
    async fn radio_setter_commands() {
        let (mut client, server) = with_radios().await;
        client.set_radio_rx_enabled(0, false).await;
        client.set_radio_stereo_volume(0, 0.25, 0.75).await;
        client.set_radio_balance(0, Balance::Left).await;
        client.set_radio_ptt(0, 2).await;
        client.set_radio_rx_frequency(0, 243_500_000).await;
        client.set_radio_crypto(0, 2, 7).await;
        client.set_radio_effects(0, None).await;
        assert_eq!(
            server.sent_commands(),
            vec![
                format!("radio {RADIO1} set rx=0"),
                format!("radio {RADIO1} set volume_left=0.25 volume_right=0.75"),
                format!("radio {RADIO1} set balance=left"),
                format!("radio {RADIO1} set ptt=2"),
                format!("radio {RADIO1} net {NET1} set rx_freq=243500000"),
                format!("radio {RADIO1} net {NET1} set crypto_system=2 crypto_key=7"),
                format!("radio {RADIO1} set effects=none"),
            ]
        );
        // The mirror only moves when the server reports it.
        assert!(client.radio_at(0).unwrap().rx_enabled);
    }

    #[tokio::test]
    async fn jammer_operations() {
        let (mut client, server) = with_radios().await;
        server.push_line(format!(
            "S1|jammer {JAMMER1} name=J1 nets={NET1},{NET2} net={NET1} record_replay=idle"
        ));
        client.update().await;
        assert_eq!(client.jammer_net_count(0), 2);
        assert_eq!(client.jammer_net_at(0, 1).unwrap().name, "Tower");
        assert_eq!(client.jammer_active_net(0).unwrap().name, "Guard");

        client.set_jammer_net(0, NET2).await;
        client.set_jammer_net(0, "NOTANET").await;
        client.set_jammer_enabled(0, true).await;
        client.jammer_start_recording(0, 0).await;
        client.jammer_start_recording(0, 45).await;
        client.jammer_stop_recording(0).await;
        client.jammer_start_replay(0, true).await;
        client.jammer_stop_replay(0).await;
        client.jammer_stop_replay(3).await;
        assert_eq!(
            server.sent_commands(),
            vec![
                format!("jammer {JAMMER1} set net={NET2}"),
                format!("jammer {JAMMER1} set enabled=1"),
                format!("jammer {JAMMER1} record start duration=1"),
                format!("jammer {JAMMER1} record start duration=30"),
                format!("jammer {JAMMER1} record stop"),
                format!("jammer {JAMMER1} replay start loop=1"),
                format!("jammer {JAMMER1} replay stop"),
            ]
        );
    }
}
