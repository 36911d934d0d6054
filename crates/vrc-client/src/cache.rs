//! The entity cache: one versioned collection per cached entity type.
//!
//! [`EntityCache::apply`] ingests one status delta. Deltas whose change
//! sequence number is not newer than the last applied one for the same type
//! are dropped by the [`SequenceFilter`] before they get here, which makes
//! duplicate delivery harmless.

use std::collections::HashMap;

use vrc_core::error::{Error, Result};
use vrc_core::protocol::{Change, StatusLine};
use vrc_core::{EntityKind, Id};

use crate::collection::{Collection, Entity};
use crate::entities::{
    Cloud, EntityState, Jammer, Joystick, Net, Operator, Playsound, Radio, RadioEffect, Role,
};

/// Per-type change-sequence watermark.
#[derive(Debug, Clone, Default)]
pub struct SequenceFilter {
    last: HashMap<EntityKind, u64>,
}

impl SequenceFilter {
    /// Whether a delta with this sequence number was already applied.
    pub fn is_stale(&self, kind: EntityKind, seq: u64) -> bool {
        self.last.get(&kind).is_some_and(|&last| seq <= last)
    }

    /// Record a successfully applied delta.
    pub fn record(&mut self, kind: EntityKind, seq: u64) {
        self.last.insert(kind, seq);
    }

    /// Forget all watermarks (the server restarted its numbering).
    pub fn reset(&mut self) {
        self.last.clear();
    }
}

/// What applying a delta did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Applied {
    /// Whether the collection changed (and its version was bumped).
    pub changed: bool,
    /// For selection deltas, the confirmed selection.
    pub selected: Option<Option<Id>>,
}

impl Applied {
    fn changed(changed: bool) -> Self {
        Applied {
            changed,
            selected: None,
        }
    }
}

/// Cached server-owned entities.
#[derive(Debug, Clone, Default)]
pub struct EntityCache {
    pub(crate) roles: Collection<Role>,
    pub(crate) entity_states: Collection<EntityState>,
    pub(crate) radios: Collection<Radio>,
    pub(crate) nets: Collection<Net>,
    pub(crate) jammers: Collection<Jammer>,
    pub(crate) radio_effects: Collection<RadioEffect>,
    pub(crate) clouds: Collection<Cloud>,
    pub(crate) operators: Collection<Operator>,
    pub(crate) playsounds: Collection<Playsound>,
    pub(crate) joysticks: Collection<Joystick>,
}

/// Apply a non-selectable delta to one collection.
fn apply_to<T: Entity>(collection: &mut Collection<T>, status: &StatusLine) -> Result<Applied> {
    let changed = match status.change() {
        Change::Upsert => collection.upsert(status.target_id()?, status.fields())?,
        Change::Remove => collection.remove(status.target_id()?.as_str()),
        Change::Clear => collection.clear(),
        Change::Select => {
            return Err(Error::Protocol(format!(
                "{} does not support selection",
                T::KIND
            )))
        }
    };
    Ok(Applied::changed(changed))
}

/// Apply a delta to a collection whose members can be selected.
///
/// A selection line may also carry fields for its target, which are applied
/// first. A bare selection of an id the server never announced leaves the
/// collection alone; readers resolve it as not found. The triad update is
/// left to the caller.
fn apply_selectable<T: Entity>(
    collection: &mut Collection<T>,
    status: &StatusLine,
) -> Result<Applied> {
    if status.change() != Change::Select {
        return apply_to(collection, status);
    }

    let selected = status
        .target
        .as_deref()
        .map(Id::parse_optional)
        .transpose()?
        .flatten();

    let changed = match &selected {
        Some(id) if status.fields().next().is_some() => {
            collection.upsert(id.clone(), status.fields())?
        }
        _ => false,
    };

    Ok(Applied {
        changed,
        selected: Some(selected),
    })
}

impl EntityCache {
    /// Apply one delta for a cached entity type.
    ///
    /// Kinds handled elsewhere (calls, licenses, singletons, radio controls)
    /// return a protocol error.
    pub fn apply(&mut self, status: &StatusLine) -> Result<Applied> {
        match status.kind {
            EntityKind::Role => apply_selectable(&mut self.roles, status),
            EntityKind::EntityState => apply_selectable(&mut self.entity_states, status),
            EntityKind::Cloud => apply_selectable(&mut self.clouds, status),
            EntityKind::Radio => apply_to(&mut self.radios, status),
            EntityKind::Net => apply_to(&mut self.nets, status),
            EntityKind::Jammer => apply_to(&mut self.jammers, status),
            EntityKind::RadioEffect => apply_to(&mut self.radio_effects, status),
            EntityKind::Operator => apply_to(&mut self.operators, status),
            EntityKind::Playsound => apply_to(&mut self.playsounds, status),
            EntityKind::Joystick => apply_to(&mut self.joysticks, status),
            other => Err(Error::Protocol(format!("{other} is not a cached collection"))),
        }
    }

    /// Version of a cached collection.
    pub fn version(&self, kind: EntityKind) -> Option<u32> {
        let v = match kind {
            EntityKind::Role => self.roles.version(),
            EntityKind::EntityState => self.entity_states.version(),
            EntityKind::Cloud => self.clouds.version(),
            EntityKind::Radio => self.radios.version(),
            EntityKind::Net => self.nets.version(),
            EntityKind::Jammer => self.jammers.version(),
            EntityKind::RadioEffect => self.radio_effects.version(),
            EntityKind::Operator => self.operators.version(),
            EntityKind::Playsound => self.playsounds.version(),
            EntityKind::Joystick => self.joysticks.version(),
            _ => return None,
        };
        Some(v)
    }

    /// Empty every collection, returning the kinds that changed.
    pub(crate) fn reset(&mut self) -> Vec<EntityKind> {
        let cleared = [
            (EntityKind::Role, self.roles.clear()),
            (EntityKind::EntityState, self.entity_states.clear()),
            (EntityKind::Cloud, self.clouds.clear()),
            (EntityKind::Radio, self.radios.clear()),
            (EntityKind::Net, self.nets.clear()),
            (EntityKind::Jammer, self.jammers.clear()),
            (EntityKind::RadioEffect, self.radio_effects.clear()),
            (EntityKind::Operator, self.operators.clear()),
            (EntityKind::Playsound, self.playsounds.clear()),
            (EntityKind::Joystick, self.joysticks.clear()),
        ];
        cleared
            .into_iter()
            .filter_map(|(kind, changed)| changed.then_some(kind))
            .collect()
    }

    /// Bump a collection's version for a change not visible in its records.
    pub(crate) fn touch(&mut self, kind: EntityKind) {
        match kind {
            EntityKind::Role => self.roles.touch(),
            EntityKind::EntityState => self.entity_states.touch(),
            EntityKind::Cloud => self.clouds.touch(),
            EntityKind::Radio => self.radios.touch(),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vrc_core::protocol::{parse_line, Frame};

    const R1: &str = "R1000000000000000000000000000001";
    const R2: &str = "R2000000000000000000000000000002";

    fn status(line: &str) -> StatusLine {
        match parse_line(line).unwrap() {
            Frame::Status(s) => s,
            other => panic!("not a status line: {other:?}"),
        }
    }

    #[test]
    fn sequence_filter_drops_duplicates() {
        let mut f = SequenceFilter::default();
        assert!(!f.is_stale(EntityKind::Role, 0));
        f.record(EntityKind::Role, 5);
        assert!(f.is_stale(EntityKind::Role, 5));
        assert!(f.is_stale(EntityKind::Role, 4));
        assert!(!f.is_stale(EntityKind::Role, 6));
        assert!(!f.is_stale(EntityKind::Radio, 1));
        f.reset();
        assert!(!f.is_stale(EntityKind::Role, 1));
    }

    #[test]
    fn upsert_remove_clear() {
        let mut cache = EntityCache::default();
        let a = cache.apply(&status(&format!("S1|radio {R1} name=A"))).unwrap();
        assert!(a.changed);
        cache.apply(&status(&format!("S2|radio {R2} name=B"))).unwrap();
        assert_eq!(cache.radios.count(), 2);

        cache.apply(&status(&format!("S3|radio {R1} removed=1"))).unwrap();
        assert_eq!(cache.radios.id_at(0).map(Id::as_str), Some(R2));

        cache.apply(&status("S4|radio clear=1")).unwrap();
        assert!(cache.radios.is_empty());
        assert_eq!(cache.version(EntityKind::Radio), Some(4));
    }

    #[test]
    fn selection_reports_target_without_bumping() {
        let mut cache = EntityCache::default();
        cache.apply(&status(&format!("S1|role {R1} name=Pilot"))).unwrap();
        let v = cache.version(EntityKind::Role).unwrap();

        let applied = cache.apply(&status(&format!("S2|role {R1} active=1"))).unwrap();
        assert!(!applied.changed);
        assert_eq!(applied.selected, Some(Some(Id::parse(R1).unwrap())));
        assert_eq!(cache.version(EntityKind::Role), Some(v));

        let none = cache.apply(&status("S3|role active=1")).unwrap();
        assert_eq!(none.selected, Some(None));
    }

    #[test]
    fn selection_of_unknown_target() {
        let mut cache = EntityCache::default();
        let applied = cache
            .apply(&status(&format!("S1|cloud {R2} active=1 name=East")))
            .unwrap();
        assert!(applied.changed);
        assert_eq!(cache.clouds.get(R2).unwrap().name, "East");

        // Without fields there is nothing to create.
        let bare = cache.apply(&status(&format!("S2|role {R1} active=1"))).unwrap();
        assert!(!bare.changed);
        assert_eq!(bare.selected, Some(Some(Id::parse(R1).unwrap())));
        assert!(cache.roles.is_empty());
        assert_eq!(cache.version(EntityKind::Role), Some(0));
    }

    #[test]
    fn selection_on_plain_collection_is_malformed() {
        let mut cache = EntityCache::default();
        assert!(cache.apply(&status(&format!("S1|net {R1} active=1"))).is_err());
    }

    #[test]
    fn non_cached_kinds_are_rejected() {
        let mut cache = EntityCache::default();
        assert!(cache.apply(&status("S1|headset vox=1")).is_err());
        assert_eq!(cache.version(EntityKind::Call), None);
    }

    #[test]
    fn malformed_delta_leaves_cache_untouched() {
        let mut cache = EntityCache::default();
        cache.apply(&status(&format!("S1|radio {R1} volume=0.5"))).unwrap();
        let v = cache.version(EntityKind::Radio);

        assert!(cache
            .apply(&status(&format!("S2|radio {R1} name=X volume=loud")))
            .is_err());
        assert!(cache.apply(&status("S3|radio short name=X")).is_err());

        assert_eq!(cache.radios.get(R1).unwrap().name, "");
        assert_eq!(cache.version(EntityKind::Radio), v);
    }

    #[test]
    fn reset_reports_only_populated_kinds() {
        let mut cache = EntityCache::default();
        cache.apply(&status(&format!("S1|radio {R1} name=A"))).unwrap();
        cache.apply(&status(&format!("S1|role {R2} name=Pilot"))).unwrap();

        let cleared = cache.reset();
        assert_eq!(cleared, vec![EntityKind::Role, EntityKind::Radio]);
        assert!(cache.radios.is_empty());
        assert_eq!(cache.version(EntityKind::Radio), Some(2));
        assert!(cache.reset().is_empty());
    }
}
