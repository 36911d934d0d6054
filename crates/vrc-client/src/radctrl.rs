//! Live radio control settings.
//!
//! Each controllable live radio is named (not identified by an [`Id`]) and
//! carries a map of typed settings. The server publishes them as
//!
//! ```text
//! S<seq>|radctrl <name> value.<setting>=<tagged> options.<setting>=<a,b,...>
//! ```
//!
//! where `<tagged>` is a [`SettingValue`] in its `s:`/`i:`/`f:` form. Set
//! requests are answered by a response line only; failures land in one
//! client-wide error channel (`last_error`, `error_version`) and never change
//! the stored values.

use std::collections::BTreeMap;

use vrc_core::error::{Error, Result};
use vrc_core::protocol::{Change, StatusLine};
use vrc_core::SettingValue;

/// One setting of a live radio.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Setting {
    /// Current value, once the server has published one.
    pub value: Option<SettingValue>,
    /// Allowed values, when the setting is an enumeration.
    pub options: Vec<String>,
}

/// A controllable live radio.
#[derive(Debug, Clone, PartialEq)]
pub struct RadioControl {
    pub name: String,
    pub settings: BTreeMap<String, Setting>,
}

/// All live radios plus the shared error channel.
#[derive(Debug, Clone, Default)]
pub struct RadioControlTable {
    controls: Vec<RadioControl>,
    version: u32,
    last_error: String,
    error_version: u32,
}

impl RadioControlTable {
    /// Change counter for the settings of every live radio.
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Number of live radios.
    pub fn count(&self) -> usize {
        self.controls.len()
    }

    /// Dense access.
    pub fn at(&self, index: usize) -> Option<&RadioControl> {
        self.controls.get(index)
    }

    /// Look up a live radio by name.
    pub fn get(&self, name: &str) -> Option<&RadioControl> {
        self.controls.iter().find(|c| c.name == name)
    }

    /// Iterate live radios.
    pub fn iter(&self) -> std::slice::Iter<'_, RadioControl> {
        self.controls.iter()
    }

    /// The stored value of a setting.
    pub fn value(&self, name: &str, setting: &str) -> Option<&SettingValue> {
        self.get(name)?.settings.get(setting)?.value.as_ref()
    }

    /// A string setting. Other types return `None`.
    pub fn value_str(&self, name: &str, setting: &str) -> Option<&str> {
        match self.value(name, setting)? {
            SettingValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// An integer setting. Other types return `None`.
    pub fn value_int(&self, name: &str, setting: &str) -> Option<i64> {
        match self.value(name, setting)? {
            SettingValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// A float setting. Integers widen; strings return `None`.
    pub fn value_float(&self, name: &str, setting: &str) -> Option<f32> {
        match self.value(name, setting)? {
            SettingValue::Float(f) => Some(*f),
            SettingValue::Int(i) => Some(*i as f32),
            SettingValue::Str(_) => None,
        }
    }

    /// Allowed values of a setting (empty when unconstrained or unknown).
    pub fn options(&self, name: &str, setting: &str) -> &[String] {
        self.get(name)
            .and_then(|c| c.settings.get(setting))
            .map(|s| s.options.as_slice())
            .unwrap_or(&[])
    }

    /// The error text of the last failed set, or empty.
    pub fn last_error(&self) -> &str {
        &self.last_error
    }

    /// Bumped after every answered set request.
    pub fn error_version(&self) -> u32 {
        self.error_version
    }

    /// Record the outcome of a set request.
    pub(crate) fn record_result(&mut self, error: String) -> u32 {
        self.last_error = error;
        self.error_version = self.error_version.wrapping_add(1);
        self.error_version
    }

    /// Apply a `radctrl` status line. Returns whether anything changed.
    pub(crate) fn apply(&mut self, status: &StatusLine) -> Result<bool> {
        let changed = match status.change() {
            Change::Clear => {
                let had = !self.controls.is_empty();
                self.controls.clear();
                had
            }
            Change::Remove => {
                let name = target(status)?;
                let before = self.controls.len();
                self.controls.retain(|c| c.name != name);
                before != self.controls.len()
            }
            Change::Select => {
                return Err(Error::Protocol("radctrl does not support selection".into()));
            }
            Change::Upsert => self.upsert(target(status)?, status)?,
        };
        if changed {
            self.version = self.version.wrapping_add(1);
        }
        Ok(changed)
    }

    fn upsert(&mut self, name: &str, status: &StatusLine) -> Result<bool> {
        let existing = self.controls.iter().position(|c| c.name == name);
        let mut updated = match existing {
            Some(i) => self.controls[i].settings.clone(),
            None => BTreeMap::new(),
        };

        for (key, value) in status.fields() {
            if let Some(setting) = key.strip_prefix("value.") {
                updated.entry(setting.to_string()).or_default().value =
                    Some(SettingValue::parse_tagged(value)?);
            } else if let Some(setting) = key.strip_prefix("options.") {
                updated.entry(setting.to_string()).or_default().options = value
                    .split(',')
                    .filter(|o| !o.is_empty())
                    .map(str::to_string)
                    .collect();
            }
        }

        match existing {
            Some(i) if self.controls[i].settings == updated => Ok(false),
            Some(i) => {
                self.controls[i].settings = updated;
                Ok(true)
            }
            None => {
                self.controls.push(RadioControl {
                    name: name.to_string(),
                    settings: updated,
                });
                Ok(true)
            }
        }
    }

    pub(crate) fn reset(&mut self) -> bool {
        if self.controls.is_empty() {
            return false;
        }
        self.controls.clear();
        self.version = self.version.wrapping_add(1);
        true
    }
}

fn target(status: &StatusLine) -> Result<&str> {
    status
        .target
        .as_deref()
        .ok_or_else(|| Error::Protocol("radctrl status missing radio name".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use vrc_core::protocol::{parse_line, Frame};

    fn status(line: &str) -> StatusLine {
        match parse_line(line).unwrap() {
            Frame::Status(s) => s,
            other => panic!("not a status line: {other:?}"),
        }
    }

    fn populated() -> RadioControlTable {
        let mut table = RadioControlTable::default();
        table
            .apply(&status(
                "S1|radctrl R2 value.freq=i:30000000 value.mode=s:FM value.squelch=f:0.25 options.mode=AM,FM",
            ))
            .unwrap();
        table
    }

    #[test]
    fn typed_getters() {
        let table = populated();
        assert_eq!(table.value_int("R2", "freq"), Some(30_000_000));
        assert_eq!(table.value_str("R2", "mode"), Some("FM"));
        assert_eq!(table.value_float("R2", "squelch"), Some(0.25));
        assert_eq!(table.value_float("R2", "freq"), Some(30_000_000.0));
        assert_eq!(table.value_int("R2", "mode"), None);
        assert_eq!(table.options("R2", "mode"), ["AM", "FM"]);
        assert!(table.options("R2", "freq").is_empty());
        assert_eq!(table.value_int("R9", "freq"), None);
    }

    #[test]
    fn update_bumps_once_and_only_on_change() {
        let mut table = populated();
        assert_eq!(table.version(), 1);
        assert!(!table
            .apply(&status("S2|radctrl R2 value.freq=i:30000000"))
            .unwrap());
        assert!(table
            .apply(&status("S3|radctrl R2 value.freq=i:31000000 value.mode=s:AM"))
            .unwrap());
        assert_eq!(table.version(), 2);
        assert_eq!(table.value_int("R2", "freq"), Some(31_000_000));
    }

    #[test]
    fn malformed_value_is_all_or_nothing() {
        let mut table = populated();
        assert!(table
            .apply(&status("S2|radctrl R2 value.mode=s:AM value.freq=30"))
            .is_err());
        assert_eq!(table.value_str("R2", "mode"), Some("FM"));
        assert_eq!(table.version(), 1);
    }

    #[test]
    fn remove_and_clear() {
        let mut table = populated();
        table.apply(&status("S2|radctrl R3 value.freq=i:1")).unwrap();
        table.apply(&status("S3|radctrl R2 removed=1")).unwrap();
        assert_eq!(table.count(), 1);
        assert_eq!(table.at(0).unwrap().name, "R3");
        table.apply(&status("S4|radctrl clear=1")).unwrap();
        assert_eq!(table.count(), 0);
        assert!(table.at(0).is_none());
    }

    #[test]
    fn error_channel_is_independent_of_values() {
        let mut table = populated();
        let v = table.record_result("frequency out of range".into());
        assert_eq!(v, 1);
        assert_eq!(table.last_error(), "frequency out of range");
        assert_eq!(table.value_int("R2", "freq"), Some(30_000_000));
        table.record_result(String::new());
        assert_eq!(table.error_version(), 2);
        assert_eq!(table.last_error(), "");
    }
}
