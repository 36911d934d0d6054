//! Session, selection, headset, PTT, license and live radio control
//! operations.

use vrc_core::error::{Error, Result};
use vrc_core::protocol::{self, SettingValue};
use vrc_core::{HeadsetPreset, Id, LicenseStatus, MicMode};

use crate::client::VrcClient;
use crate::correlator::PendingKind;
use crate::entities::{Cloud, EntityState, Role};
use crate::triad::SelectionTarget;

impl VrcClient {
    // -----------------------------------------------------------------------
    // Server connection
    // -----------------------------------------------------------------------

    /// Ask the server to connect to another server by address (blocking).
    pub async fn connect_server(&mut self, target_ip: &str) -> Result<()> {
        self.round_trip(&protocol::cmd_network_connect(target_ip), PendingKind::Plain)
            .await?
            .into_result()
            .map(drop)
    }

    /// Ask the server to disconnect from its current server (blocking).
    pub async fn disconnect_server(&mut self) -> Result<()> {
        self.round_trip(&protocol::cmd_network_disconnect(), PendingKind::Plain)
            .await?
            .into_result()
            .map(drop)
    }

    /// Connect through a cloud (blocking).
    ///
    /// The cloud selection is requested optimistically and reverts if the
    /// server rejects it.
    pub async fn connect_cloud(&mut self, cloud: &str) -> Result<()> {
        let id = self
            .cache
            .clouds
            .get(cloud)
            .map(|c| c.id.clone())
            .ok_or_else(|| Error::InvalidParameter(format!("unknown cloud {cloud}")))?;

        let target = SelectionTarget::Cloud;
        let command = protocol::cmd_cloud_connect(&id);
        self.selections.entry(&target).request(Some(id));
        let seq = match self
            .send_blocking(&command, PendingKind::Selection(target.clone()))
            .await
        {
            Ok(seq) => seq,
            Err(e) => {
                self.revert_selection(&target);
                return Err(e);
            }
        };
        self.selections.entry(&target).attach(seq);

        // A rejection reverts the selection as the response is applied.
        self.await_response(seq).await?.into_result().map(drop)
    }

    /// Publish a new client name.
    pub async fn set_client_name(&mut self, name: &str) {
        self.fire(&protocol::cmd_client_name(name), PendingKind::Plain)
            .await;
    }

    /// Set the server master volume.
    pub async fn set_master_volume(&mut self, volume: f32) {
        let command = protocol::cmd_set("session", None, &[("master_volume", volume.to_string())]);
        self.fire(&command, PendingKind::Plain).await;
    }

    /// Set the server sidetone volume.
    pub async fn set_sidetone_volume(&mut self, volume: f32) {
        let command =
            protocol::cmd_set("session", None, &[("sidetone_volume", volume.to_string())]);
        self.fire(&command, PendingKind::Plain).await;
    }

    // -----------------------------------------------------------------------
    // Role / entity state / cloud selections
    // -----------------------------------------------------------------------

    /// Request a role. Unknown role ids are ignored.
    pub async fn set_role(&mut self, role: &str) {
        let Some(id) = self.cache.roles.get(role).map(|r| r.id.clone()) else {
            tracing::debug!(role, "set_role: unknown role");
            return;
        };
        let command = protocol::cmd_role_set(&id);
        self.request_selection(SelectionTarget::Role, Some(id), &command)
            .await;
    }

    /// Request an entity state. Unknown ids are ignored.
    pub async fn set_entity_state(&mut self, entity_state: &str) {
        let Some(id) = self
            .cache
            .entity_states
            .get(entity_state)
            .map(|e| e.id.clone())
        else {
            tracing::debug!(entity_state, "set_entity_state: unknown entity state");
            return;
        };
        let command = protocol::cmd_entity_state_set(&id);
        self.request_selection(SelectionTarget::EntityState, Some(id), &command)
            .await;
    }

    fn selection_set(&self, target: &SelectionTarget) -> Option<&Id> {
        self.selections.get(target)?.set_value().as_ref()
    }

    fn selection_active(&self, target: &SelectionTarget) -> Option<&Id> {
        self.selections.get(target)?.active_value().as_ref()
    }

    /// The most recently requested role.
    pub fn role_set(&self) -> Option<&Id> {
        self.selection_set(&SelectionTarget::Role)
    }

    /// The role confirmed by the server.
    pub fn role_active(&self) -> Option<&Id> {
        self.selection_active(&SelectionTarget::Role)
    }

    pub fn role_name_set(&self) -> Option<&str> {
        let id = self.role_set()?;
        self.cache.roles.get(id.as_str()).map(|r| r.name.as_str())
    }

    pub fn role_name_active(&self) -> Option<&str> {
        self.active_role().map(|r| r.name.as_str())
    }

    /// The active role's record.
    pub fn active_role(&self) -> Option<&Role> {
        let id = self.role_active()?;
        self.cache.roles.get(id.as_str())
    }

    /// Display slot of a radio channel in a role's channel map.
    pub fn role_channel_display(&self, role: &str, channel: usize) -> Option<i32> {
        self.cache
            .roles
            .get(role)?
            .channel_display_map
            .get(channel)
            .copied()
    }

    pub fn entity_state_set(&self) -> Option<&Id> {
        self.selection_set(&SelectionTarget::EntityState)
    }

    pub fn entity_state_active(&self) -> Option<&Id> {
        self.selection_active(&SelectionTarget::EntityState)
    }

    pub fn active_entity_state(&self) -> Option<&EntityState> {
        let id = self.entity_state_active()?;
        self.cache.entity_states.get(id.as_str())
    }

    pub fn cloud_set(&self) -> Option<&Id> {
        self.selection_set(&SelectionTarget::Cloud)
    }

    pub fn cloud_active(&self) -> Option<&Id> {
        self.selection_active(&SelectionTarget::Cloud)
    }

    pub fn active_cloud(&self) -> Option<&Cloud> {
        let id = self.cloud_active()?;
        self.cache.clouds.get(id.as_str())
    }

    // -----------------------------------------------------------------------
    // Headset
    // -----------------------------------------------------------------------

    async fn set_headset(&mut self, key: &str, value: String) {
        let command = protocol::cmd_set("headset", None, &[(key, value)]);
        self.fire(&command, PendingKind::Plain).await;
    }

    pub async fn set_headset_vox_threshold(&mut self, threshold: f32) {
        self.set_headset("vox", threshold.to_string()).await;
    }

    pub async fn set_headset_mic_mode(&mut self, mode: MicMode) {
        self.fire(&protocol::cmd_headset_mic_mode(mode), PendingKind::Plain)
            .await;
    }

    pub async fn set_headset_earphone_volume(&mut self, volume: f32) {
        self.set_headset("earphone_volume", volume.to_string()).await;
    }

    pub async fn set_headset_mic_volume(&mut self, volume: f32) {
        self.set_headset("mic_volume", volume.to_string()).await;
    }

    pub async fn set_headset_sidetone_volume(&mut self, volume: f32) {
        self.set_headset("sidetone_volume", volume.to_string()).await;
    }

    /// Mute the microphone toward calls only.
    pub async fn set_call_mic_mute(&mut self, muted: bool) {
        self.set_headset("call_mic_mute", u8::from(muted).to_string())
            .await;
    }

    /// Apply a predefined headset configuration (blocking).
    pub async fn apply_headset_preset(&mut self, preset: HeadsetPreset) -> Result<()> {
        self.round_trip(&protocol::cmd_headset_preset(preset), PendingKind::Plain)
            .await?
            .into_result()
            .map(drop)
    }

    // -----------------------------------------------------------------------
    // PTT
    // -----------------------------------------------------------------------

    /// Press or release software PTT `index`.
    ///
    /// The local state changes immediately; the server keys the radios
    /// mapped to that PTT.
    pub async fn set_ptt(&mut self, index: u32, pressed: bool) {
        if pressed {
            self.software_ptt.insert(index);
        } else {
            self.software_ptt.remove(&index);
        }
        self.fire(&protocol::cmd_ptt(index, pressed), PendingKind::Plain)
            .await;
    }

    /// Whether software PTT `index` is pressed.
    pub fn ptt_pressed(&self, index: u32) -> bool {
        self.software_ptt.contains(&index)
    }

    /// Whether hardware PTT input `index` is pressed.
    pub fn hw_ptt_pressed(&self, index: u32) -> bool {
        self.session.get().hw_ptt_pressed(index)
    }

    // -----------------------------------------------------------------------
    // Licenses
    // -----------------------------------------------------------------------

    /// Request a license (blocking). Returns the process-local request id.
    pub async fn request_license(&mut self, license_type: &str) -> Result<i32> {
        let command = protocol::cmd_license_request(license_type);
        let response = self
            .round_trip(&command, PendingKind::LicenseRequest(license_type.to_string()))
            .await?;
        let handle = response.into_result()?;
        self.licenses
            .find_by_handle(&handle)
            .ok_or_else(|| Error::Protocol("license request returned no handle".into()))
    }

    /// Release a license. Unknown request ids are ignored.
    ///
    /// The status moves to `Released` once the server confirms.
    pub async fn release_license(&mut self, request_id: i32) {
        let Some(handle) = self.licenses.handle(request_id).map(str::to_string) else {
            tracing::debug!(request_id, "release_license: unknown request id");
            return;
        };
        self.fire(&protocol::cmd_license_release(&handle), PendingKind::Plain)
            .await;
    }

    pub fn license_status(&self, request_id: i32) -> Option<LicenseStatus> {
        self.licenses.status(request_id)
    }

    // -----------------------------------------------------------------------
    // Live radio control
    // -----------------------------------------------------------------------

    /// Ask the server to refresh a live radio's settings.
    pub async fn radctrl_poll(&mut self, name: &str) {
        self.fire(&protocol::cmd_radctrl_poll(name), PendingKind::Plain)
            .await;
    }

    /// Change a live radio setting (blocking).
    ///
    /// The stored value changes only when the server publishes it. A
    /// rejection is returned and also recorded in the error channel
    /// ([`radctrl_last_error`](Self::radctrl_last_error),
    /// [`radctrl_error_version`](Self::radctrl_error_version)).
    pub async fn radctrl_set(
        &mut self,
        name: &str,
        setting: &str,
        value: SettingValue,
    ) -> Result<()> {
        let command = protocol::cmd_radctrl_set(name, setting, &value);
        self.round_trip(&command, PendingKind::RadioControlSet)
            .await?
            .into_result()
            .map(drop)
    }

    pub fn radctrl_value(&self, name: &str, setting: &str) -> Option<&SettingValue> {
        self.radio_controls.value(name, setting)
    }

    pub fn radctrl_value_str(&self, name: &str, setting: &str) -> Option<&str> {
        self.radio_controls.value_str(name, setting)
    }

    pub fn radctrl_value_int(&self, name: &str, setting: &str) -> Option<i64> {
        self.radio_controls.value_int(name, setting)
    }

    pub fn radctrl_value_float(&self, name: &str, setting: &str) -> Option<f32> {
        self.radio_controls.value_float(name, setting)
    }

    pub fn radctrl_options(&self, name: &str, setting: &str) -> &[String] {
        self.radio_controls.options(name, setting)
    }

    pub fn radctrl_last_error(&self) -> &str {
        self.radio_controls.last_error()
    }

    pub fn radctrl_error_version(&self) -> u32 {
        self.radio_controls.error_version()
    }
}
