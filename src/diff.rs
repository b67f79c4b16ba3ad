//! Change detection between consecutive snapshots
//!
//! Each [`DiffEngine`] keeps, per channel kind, the snapshot it compared last
//! and the instant every channel was last reported. A channel is reported when
//! its value differs from the prior snapshot, or when it has been silent for
//! longer than the renew interval so consumers see a periodic heartbeat. A
//! channel that was never reported counts as silent, so the first comparison
//! that sees it with a value on both sides reports it.
//!
//! Engines are cheap and independent; every subscriber owns its own so one
//! consumer polling never hides changes from another.

use serde::ser::{Serialize, SerializeTuple, Serializer};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::trace;

use crate::buffer::FrameSnapshot;
use crate::materialize::{AnalogueEntry, ChannelEntry, DigitalEntry, Materializer, Snapshot};
use crate::types::ChannelKind;

/// Default heartbeat interval for unchanged channels.
pub const DEFAULT_RENEW: Duration = Duration::from_secs(300);

/// One reported channel, serialized as `[node, index, new, old]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelChange<V> {
    pub node: u8,
    pub index: u8,
    pub new: V,
    pub old: V,
}

impl<V: Serialize> Serialize for ChannelChange<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut tuple = serializer.serialize_tuple(4)?;
        tuple.serialize_element(&self.node)?;
        tuple.serialize_element(&self.index)?;
        tuple.serialize_element(&self.new)?;
        tuple.serialize_element(&self.old)?;
        tuple.end()
    }
}

/// Changes of either kind.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(untagged)]
pub enum Changes {
    Analogue(Vec<ChannelChange<f64>>),
    Digital(Vec<ChannelChange<bool>>),
}

impl Changes {
    pub fn kind(&self) -> ChannelKind {
        match self {
            Changes::Analogue(_) => ChannelKind::Analogue,
            Changes::Digital(_) => ChannelKind::Digital,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Changes::Analogue(c) => c.len(),
            Changes::Digital(c) => c.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Per-kind comparison state.
#[derive(Debug)]
struct DiffState<E: ChannelEntry> {
    prior: Option<Snapshot<E>>,
    emitted: HashMap<(u8, u8), Instant>,
}

impl<E: ChannelEntry> Default for DiffState<E> {
    fn default() -> Self {
        Self { prior: None, emitted: HashMap::new() }
    }
}

impl<E: ChannelEntry> DiffState<E> {
    fn compare(
        &mut self,
        current: Snapshot<E>,
        renew: Duration,
        now: Instant,
    ) -> Vec<ChannelChange<E::Value>> {
        let Some(prior) = self.prior.take() else {
            trace!(kind = %E::KIND, "Stored diff baseline");
            self.prior = Some(current);
            return Vec::new();
        };

        let mut changes = Vec::new();
        for (node, channels) in &current {
            for (index, entry) in channels {
                let Some(new) = entry.value() else {
                    continue;
                };
                let Some(old) = prior.get(node).and_then(|c| c.get(index)).and_then(E::value)
                else {
                    continue;
                };

                // A channel never reported before is due right away
                let key = (*node, *index);
                let due = match self.emitted.get(&key) {
                    Some(last) => now.saturating_duration_since(*last) > renew,
                    None => true,
                };

                if new != old || due {
                    changes.push(ChannelChange {
                        node: *node,
                        index: *index,
                        new: new.clone(),
                        old: old.clone(),
                    });
                    self.emitted.insert(key, now);
                }
            }
        }

        self.prior = Some(current);
        changes
    }

    fn reset(&mut self) {
        self.prior = None;
        self.emitted.clear();
    }
}

/// Stateful change detector for one consumer.
#[derive(Debug)]
pub struct DiffEngine {
    renew: Duration,
    analogue: DiffState<AnalogueEntry>,
    digital: DiffState<DigitalEntry>,
}

impl Default for DiffEngine {
    fn default() -> Self {
        Self::new(DEFAULT_RENEW)
    }
}

impl DiffEngine {
    pub fn new(renew: Duration) -> Self {
        Self { renew, analogue: DiffState::default(), digital: DiffState::default() }
    }

    pub fn renew(&self) -> Duration {
        self.renew
    }

    /// Materialize `frames` and compare against the previous call for `kind`.
    ///
    /// The first call per kind only stores a baseline and returns no changes.
    pub fn diff(
        &mut self,
        kind: ChannelKind,
        materializer: &Materializer,
        frames: &FrameSnapshot,
    ) -> Changes {
        self.diff_at(kind, materializer, frames, Instant::now())
    }

    /// [`diff`](Self::diff) with an explicit clock.
    pub fn diff_at(
        &mut self,
        kind: ChannelKind,
        materializer: &Materializer,
        frames: &FrameSnapshot,
        now: Instant,
    ) -> Changes {
        match kind {
            ChannelKind::Analogue => {
                Changes::Analogue(self.compare_analogue(materializer.analogue(frames), now))
            }
            ChannelKind::Digital => {
                Changes::Digital(self.compare_digital(materializer.digital(frames), now))
            }
        }
    }

    /// Compare an already materialized analogue snapshot.
    pub fn compare_analogue(
        &mut self,
        current: Snapshot<AnalogueEntry>,
        now: Instant,
    ) -> Vec<ChannelChange<f64>> {
        self.analogue.compare(current, self.renew, now)
    }

    /// Compare an already materialized digital snapshot.
    pub fn compare_digital(
        &mut self,
        current: Snapshot<DigitalEntry>,
        now: Instant,
    ) -> Vec<ChannelChange<bool>> {
        self.digital.compare(current, self.renew, now)
    }

    pub fn has_baseline(&self, kind: ChannelKind) -> bool {
        match kind {
            ChannelKind::Analogue => self.analogue.prior.is_some(),
            ChannelKind::Digital => self.digital.prior.is_some(),
        }
    }

    /// Forget baselines and heartbeat history of both kinds.
    pub fn reset_baseline(&mut self) {
        self.analogue.reset();
        self.digital.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{AnalogueChannel, ChannelSchema, DigitalChannel, NodeMap};
    use crate::types::{ChannelValue, Frame};
    use std::sync::Arc;

    fn materializer() -> Materializer {
        let mut analogue = NodeMap::new();
        let node = analogue.entry(31).or_insert_with(Default::default);
        node.insert(9, AnalogueChannel { name: "a".into(), decimals: 1, unit: "°C".into() });
        node.insert(10, AnalogueChannel { name: "b".into(), decimals: 1, unit: "°C".into() });

        let mut digital = NodeMap::new();
        digital
            .entry(21)
            .or_insert_with(Default::default)
            .insert(21, DigitalChannel { name: "pump".into() });

        Materializer::new(Arc::new(ChannelSchema::new(analogue, digital)))
    }

    fn analogue(values: &[(u8, f64)]) -> FrameSnapshot {
        let mut frame = Frame::outbound();
        for (index, value) in values {
            frame.set_channel_value(31, *index, ChannelValue::Analogue(*value), 1).unwrap();
        }
        FrameSnapshot::from(vec![Frame::decode(frame.as_bytes()).unwrap()])
    }

    fn digital(on: bool) -> FrameSnapshot {
        let mut frame = Frame::outbound();
        frame.set_channel_value(21, 21, ChannelValue::Digital(on), 0).unwrap();
        FrameSnapshot::from(vec![Frame::decode(frame.as_bytes()).unwrap()])
    }

    #[test]
    fn first_call_only_stores_baseline() {
        let mut engine = DiffEngine::new(Duration::from_secs(10));
        let m = materializer();

        assert!(!engine.has_baseline(ChannelKind::Analogue));
        let changes = engine.diff(ChannelKind::Analogue, &m, &analogue(&[(9, 1.0)]));
        assert!(changes.is_empty());
        assert!(engine.has_baseline(ChannelKind::Analogue));
        assert!(!engine.has_baseline(ChannelKind::Digital));
    }

    #[test]
    fn changed_values_are_reported_with_old_value() {
        let mut engine = DiffEngine::new(Duration::from_secs(10));
        let m = materializer();
        let t0 = Instant::now();

        let kind = ChannelKind::Analogue;
        engine.diff_at(kind, &m, &analogue(&[(9, 1.0), (10, 2.0)]), t0);
        engine.diff_at(kind, &m, &analogue(&[(9, 1.0), (10, 2.0)]), t0);
        let changes = engine.diff_at(kind, &m, &analogue(&[(9, 1.5), (10, 2.0)]), t0);

        assert_eq!(
            changes,
            Changes::Analogue(vec![ChannelChange { node: 31, index: 9, new: 1.5, old: 1.0 }])
        );
    }

    #[test]
    fn channels_never_reported_are_due_immediately() {
        let mut engine = DiffEngine::new(DEFAULT_RENEW);
        let m = materializer();
        let frames = digital(true);
        let t0 = Instant::now();

        assert!(engine.diff_at(ChannelKind::Digital, &m, &frames, t0).is_empty());

        let first = engine.diff_at(ChannelKind::Digital, &m, &frames, t0 + Duration::from_secs(1));
        assert_eq!(
            first,
            Changes::Digital(vec![ChannelChange { node: 21, index: 21, new: true, old: true }])
        );

        let second = engine.diff_at(ChannelKind::Digital, &m, &frames, t0 + Duration::from_secs(2));
        assert!(second.is_empty());
    }

    #[test]
    fn unchanged_values_renew_after_interval() {
        let renew = Duration::from_secs(10);
        let mut engine = DiffEngine::new(renew);
        let m = materializer();
        let frames = digital(true);
        let t0 = Instant::now();
        let at = |secs: u64| t0 + Duration::from_secs(secs);

        assert!(engine.diff_at(ChannelKind::Digital, &m, &frames, t0).is_empty());
        assert_eq!(engine.diff_at(ChannelKind::Digital, &m, &frames, t0).len(), 1);
        assert!(engine.diff_at(ChannelKind::Digital, &m, &frames, at(1)).is_empty());
        // Exactly at the interval is not yet stale
        assert!(engine.diff_at(ChannelKind::Digital, &m, &frames, t0 + renew).is_empty());

        let renewed = engine.diff_at(ChannelKind::Digital, &m, &frames, at(11));
        assert_eq!(
            renewed,
            Changes::Digital(vec![ChannelChange { node: 21, index: 21, new: true, old: true }])
        );

        assert!(engine.diff_at(ChannelKind::Digital, &m, &frames, at(12)).is_empty());
    }

    #[test]
    fn reported_changes_restart_the_heartbeat() {
        let renew = Duration::from_secs(10);
        let mut engine = DiffEngine::new(renew);
        let m = materializer();
        let t0 = Instant::now();
        let at = |secs: u64| t0 + Duration::from_secs(secs);

        engine.diff_at(ChannelKind::Digital, &m, &digital(false), t0);
        assert_eq!(engine.diff_at(ChannelKind::Digital, &m, &digital(true), at(8)).len(), 1);
        // 12s after the baseline but only 4s after the change
        assert!(engine.diff_at(ChannelKind::Digital, &m, &digital(true), at(12)).is_empty());
        assert_eq!(engine.diff_at(ChannelKind::Digital, &m, &digital(true), at(19)).len(), 1);
    }

    #[test]
    fn channels_without_values_are_skipped_until_seen_twice() {
        let mut engine = DiffEngine::new(DEFAULT_RENEW);
        let m = materializer();
        let frames = analogue(&[(9, 3.0)]);
        let t0 = Instant::now();

        engine.diff_at(ChannelKind::Analogue, &m, &FrameSnapshot::default(), t0);
        let skipped = engine.diff_at(ChannelKind::Analogue, &m, &frames, t0);
        assert!(skipped.is_empty());

        // Index 10 shares the frame and decodes as zero
        let reported = engine.diff_at(ChannelKind::Analogue, &m, &frames, t0);
        assert_eq!(
            reported,
            Changes::Analogue(vec![
                ChannelChange { node: 31, index: 9, new: 3.0, old: 3.0 },
                ChannelChange { node: 31, index: 10, new: 0.0, old: 0.0 },
            ])
        );
    }

    #[test]
    fn kinds_keep_separate_state() {
        let mut engine = DiffEngine::new(Duration::from_secs(10));
        let m = materializer();

        engine.diff(ChannelKind::Digital, &m, &digital(false));
        assert!(engine.diff(ChannelKind::Analogue, &m, &analogue(&[(9, 1.0)])).is_empty());

        let changes = engine.diff(ChannelKind::Digital, &m, &digital(true));
        assert_eq!(changes.kind(), ChannelKind::Digital);
        assert_eq!(changes.len(), 1);
    }

    #[test]
    fn reset_restarts_from_baseline() {
        let mut engine = DiffEngine::new(Duration::from_secs(10));
        let m = materializer();

        engine.diff(ChannelKind::Digital, &m, &digital(false));
        engine.reset_baseline();
        assert!(!engine.has_baseline(ChannelKind::Digital));
        assert!(engine.diff(ChannelKind::Digital, &m, &digital(true)).is_empty());
    }

    #[test]
    fn independent_engines_do_not_interfere() {
        let m = materializer();
        let mut first = DiffEngine::default();
        let mut second = DiffEngine::default();

        first.diff(ChannelKind::Digital, &m, &digital(false));
        second.diff(ChannelKind::Digital, &m, &digital(false));
        assert_eq!(first.diff(ChannelKind::Digital, &m, &digital(true)).len(), 1);
        assert_eq!(second.diff(ChannelKind::Digital, &m, &digital(true)).len(), 1);
    }

    #[test]
    fn changes_serialize_as_tuples() {
        let change = ChannelChange { node: 31, index: 9, new: 1.5, old: 1.0 };
        let changes = Changes::Analogue(vec![change]);
        assert_eq!(serde_json::to_string(&changes).unwrap(), "[[31,9,1.5,1.0]]");
    }
}
