//! Licenses requested by this client.
//!
//! A license is known locally by a process-local request id handed out when
//! the request is made. The server names it by an opaque handle returned in
//! the request's response, and reports status changes as
//!
//! ```text
//! S<seq>|license <handle> status=<pending|granted|released|lost>
//! ```
//!
//! Status lines may arrive before the response that names their handle.
//! Those are held until the request is registered.

use vrc_core::error::{Error, Result};
use vrc_core::protocol::{parse_enum, StatusLine};
use vrc_core::LicenseStatus;

/// Most early statuses held for handles not yet registered.
const MAX_EARLY: usize = 64;

/// A license request and its server-reported status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct License {
    /// Process-local request id.
    pub request_id: i32,
    pub license_type: String,
    /// Server handle from the request's response.
    pub handle: Option<String>,
    pub status: LicenseStatus,
}

/// All license requests made on this connection.
#[derive(Debug, Clone)]
pub struct LicenseTable {
    licenses: Vec<License>,
    /// Statuses seen for handles whose request response has not arrived.
    early: Vec<(String, LicenseStatus)>,
    next_id: i32,
    version: u32,
}

impl Default for LicenseTable {
    fn default() -> Self {
        LicenseTable {
            licenses: Vec::new(),
            early: Vec::new(),
            next_id: 1,
            version: 0,
        }
    }
}

impl LicenseTable {
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Look up a license by request id.
    pub fn get(&self, request_id: i32) -> Option<&License> {
        self.licenses.iter().find(|l| l.request_id == request_id)
    }

    /// Status of a license by request id.
    pub fn status(&self, request_id: i32) -> Option<LicenseStatus> {
        self.get(request_id).map(|l| l.status)
    }

    /// Iterate licenses in request order.
    pub fn iter(&self) -> std::slice::Iter<'_, License> {
        self.licenses.iter()
    }

    /// Record a request the server accepted, returning its request id.
    ///
    /// A status already reported for `handle` is taken over; otherwise the
    /// license starts out pending.
    pub(crate) fn register(&mut self, license_type: &str, handle: String) -> i32 {
        let request_id = self.next_id;
        self.next_id = self.next_id.checked_add(1).unwrap_or(1);
        let status = match self.early.iter().position(|(h, _)| *h == handle) {
            Some(pos) => self.early.remove(pos).1,
            None => LicenseStatus::Pending,
        };
        self.licenses.push(License {
            request_id,
            license_type: license_type.to_string(),
            handle: (!handle.is_empty()).then_some(handle),
            status,
        });
        self.bump();
        request_id
    }

    /// Apply a `license` status line.
    ///
    /// Returns the request id and new status when a known license changed.
    /// Statuses for unregistered handles are held for [`register`](Self::register).
    pub(crate) fn apply(&mut self, status: &StatusLine) -> Result<Option<(i32, LicenseStatus)>> {
        let handle = status
            .target
            .as_deref()
            .ok_or_else(|| Error::Protocol("license status missing handle".into()))?;
        let value = status
            .param("status")
            .ok_or_else(|| Error::Protocol(format!("license {handle} missing status")))?;
        let new_status: LicenseStatus = parse_enum("status", value)?;

        let Some(license) = self
            .licenses
            .iter_mut()
            .find(|l| l.handle.as_deref() == Some(handle))
        else {
            tracing::trace!(handle, "holding status for unregistered license");
            self.hold_early(handle, new_status);
            return Ok(None);
        };
        if license.status == new_status {
            return Ok(None);
        }
        license.status = new_status;
        let request_id = license.request_id;
        self.bump();
        Ok(Some((request_id, new_status)))
    }

    fn hold_early(&mut self, handle: &str, status: LicenseStatus) {
        if let Some(entry) = self.early.iter_mut().find(|(h, _)| h == handle) {
            entry.1 = status;
            return;
        }
        if self.early.len() >= MAX_EARLY {
            self.early.remove(0);
        }
        self.early.push((handle.to_string(), status));
    }

    /// Server handle for a request id.
    pub(crate) fn handle(&self, request_id: i32) -> Option<&str> {
        self.get(request_id)?.handle.as_deref()
    }

    /// Most recent request id registered under a server handle.
    pub(crate) fn find_by_handle(&self, handle: &str) -> Option<i32> {
        self.licenses
            .iter()
            .rev()
            .find(|l| l.handle.as_deref() == Some(handle))
            .map(|l| l.request_id)
    }

    /// Mark every held license lost (connection lost).
    pub(crate) fn lose_all(&mut self) -> Vec<i32> {
        self.early.clear();
        let mut lost = Vec::new();
        for license in &mut self.licenses {
            if matches!(license.status, LicenseStatus::Pending | LicenseStatus::Granted) {
                license.status = LicenseStatus::Lost;
                lost.push(license.request_id);
            }
        }
        if !lost.is_empty() {
            self.bump();
        }
        lost
    }

    fn bump(&mut self) {
        self.version = self.version.wrapping_add(1);
    }
}
