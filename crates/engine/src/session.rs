//! Simulation driver
//!
//! A [`Session`] owns the registry, the state root, the tic counter and the
//! snapshot ring. Each [`Session::step`] runs one tic to completion and then
//! records the resulting frame, so no snapshot ever sees a half-run tic.
//!
//! The session owns its state graph. Tables of a root it replaces on rewind,
//! or holds when dropped, are emptied so cyclic state does not outlive it;
//! clones of an old root taken through [`Session::root`] see empty tables.

use crate::config::{RewindConfig, RewindPolicy};
use crate::core::{release_graph, Registry, SnapshotResult, Value};
use crate::error::{RewindError, RewindResult};
use crate::snapshot::{Snapshot, SnapshotRing};
use crate::types::Tic;

pub struct Session {
    config: RewindConfig,
    registry: Registry,
    root: Value,
    tic: Tic,
    ring: SnapshotRing,
}

impl Session {
    /// Start at tic 0 and record the initial frame.
    pub fn new(config: RewindConfig, registry: Registry, root: Value) -> SnapshotResult<Self> {
        let mut session = Self {
            ring: SnapshotRing::new(config.snapshot_slots),
            config,
            registry,
            root,
            tic: 0,
        };
        session.ring.record(0, &session.root, &session.registry)?;
        tracing::info!(
            slots = session.ring.capacity(),
            policy = ?session.config.policy,
            "rewind session started"
        );
        Ok(session)
    }

    pub fn config(&self) -> &RewindConfig {
        &self.config
    }

    pub fn tic(&self) -> Tic {
        self.tic
    }

    pub fn root(&self) -> &Value {
        &self.root
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    pub fn ring(&self) -> &SnapshotRing {
        &self.ring
    }

    /// Run one tic and record the frame it produced.
    ///
    /// If recording fails the tic still counts; the frame is simply not
    /// retained.
    pub fn step<F, R>(&mut self, f: F) -> SnapshotResult<R>
    where
        F: FnOnce(&mut Registry, &Value) -> R,
    {
        let out = f(&mut self.registry, &self.root);
        self.tic += 1;
        self.ring.record(self.tic, &self.root, &self.registry)?;
        Ok(out)
    }

    /// The tic `rewind(tic)` would land on, if any.
    pub fn resolve(&self, tic: Tic) -> Option<Tic> {
        if self.ring.restore(tic).is_some() {
            return Some(tic);
        }
        match self.config.policy {
            RewindPolicy::Exact => None,
            RewindPolicy::NearestEarlier => self
                .ring
                .retained_tics()
                .into_iter()
                .filter(|t| *t < tic)
                .max(),
        }
    }

    /// Restore the frame for `tic` (or, under `NearestEarlier`, the newest
    /// retained one before it). Returns the tic actually restored.
    ///
    /// Frames after the restored tic are dropped; stepping again records a
    /// new future from there.
    pub fn rewind(&mut self, tic: Tic) -> RewindResult<Tic> {
        let Some(target) = self.resolve(tic) else {
            tracing::warn!(requested = tic, retained = ?self.ring.retained_tics(), "rewind miss");
            return Err(RewindError::NotRetained { tic });
        };
        let snapshot = self
            .ring
            .restore(target)
            .ok_or(RewindError::NotRetained { tic: target })?;
        let rebuilt = snapshot.rebuild(&mut self.registry)?;
        let old = std::mem::replace(&mut self.root, rebuilt);
        let released = release_graph(&old);
        self.tic = target;
        self.ring.discard_after(target);
        if target != tic {
            tracing::info!(requested = tic, restored = target, "rewound to nearest earlier frame");
        } else {
            tracing::debug!(tic, released, "rewound");
        }
        Ok(target)
    }

    /// Tics that can currently be restored, ascending.
    pub fn retained_tics(&self) -> Vec<Tic> {
        self.ring.retained_tics()
    }

    /// The frame recorded for the current tic.
    pub fn current_frame(&self) -> Option<&Snapshot> {
        self.ring.restore(self.tic)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        release_graph(&self.root);
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("tic", &self.tic)
            .field("retained", &self.ring.retained_tics())
            .field("registry", &self.registry)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    use crate::core::{Random, Table};
    use crate::game;

    fn counter_session(policy: RewindPolicy, slots: usize) -> Session {
        let mut registry = Registry::with_builtin_types();
        let rng = registry.create(Random::new(4));
        let mut state = Table::new();
        state.set_str("n", Value::Int(0));
        state.set_str("rng", rng.into());
        let config = RewindConfig {
            snapshot_slots: slots,
            policy,
            seed: 4,
        };
        Session::new(config, registry, Value::table(state)).unwrap()
    }

    fn count(_: &mut Registry, root: &Value) {
        let table = root.as_table().unwrap();
        let n = table.borrow().get_str("n").as_int().unwrap();
        table.borrow_mut().set_str("n", Value::Int(n + 1));
    }

    fn n(session: &Session) -> i64 {
        session.root().as_table().unwrap().borrow().get_str("n").as_int().unwrap()
    }

    #[test]
    fn test_step_records_each_tic() {
        let mut session = counter_session(RewindPolicy::Exact, 4);
        for _ in 0..3 {
            session.step(count).unwrap();
        }
        assert_eq!(session.tic(), 3);
        assert_eq!(session.retained_tics(), vec![0, 1, 2, 3]);
        assert_eq!(session.current_frame().map(Snapshot::tic), Some(3));
    }

    #[test]
    fn test_rewind_restores_state_and_tic() {
        let mut session = counter_session(RewindPolicy::Exact, 4);
        for _ in 0..3 {
            session.step(count).unwrap();
        }
        assert_eq!(session.rewind(1).unwrap(), 1);
        assert_eq!(session.tic(), 1);
        assert_eq!(n(&session), 1);
        assert_eq!(session.retained_tics(), vec![0, 1]);
    }

    #[test]
    fn test_exact_policy_misses() {
        let mut session = counter_session(RewindPolicy::Exact, 2);
        for _ in 0..5 {
            session.step(count).unwrap();
        }
        let err = session.rewind(1).unwrap_err();
        assert!(matches!(err, RewindError::NotRetained { tic: 1 }));
        assert_eq!(session.tic(), 5);
        assert_eq!(n(&session), 5);
    }

    #[test]
    fn test_nearest_policy_falls_back() {
        let mut session = counter_session(RewindPolicy::NearestEarlier, 4);
        for _ in 0..6 {
            session.step(count).unwrap();
        }
        // Retained: 3, 4, 5, 6. Nothing before 2 is left.
        assert!(session.rewind(2).is_err());
        session.rewind(4).unwrap();
        for _ in 0..2 {
            session.step(count).unwrap();
        }
        // Retained: 3, 4, 5, 6 again; tic 7 never existed in this timeline.
        assert_eq!(session.resolve(7), Some(6));
        assert_eq!(session.rewind(7).unwrap(), 6);
        assert_eq!(n(&session), 6);
    }

    #[test]
    fn test_replay_after_rewind_is_identical() {
        let mut registry = Registry::with_builtin_types();
        let root = game::install(&mut registry, 21);
        let mut session = Session::new(RewindConfig::default(), registry, root).unwrap();

        for _ in 0..40 {
            session.step(|r, root| game::tick(r, root).unwrap()).unwrap();
        }
        let original = session.current_frame().unwrap().bytes().to_vec();

        session.rewind(37).unwrap();
        for _ in 0..3 {
            session.step(|r, root| game::tick(r, root).unwrap()).unwrap();
        }
        assert_eq!(session.tic(), 40);
        assert_eq!(session.current_frame().unwrap().bytes(), original.as_slice());
    }

    fn game_session() -> Session {
        let mut registry = Registry::with_builtin_types();
        let root = game::install(&mut registry, 9);
        Session::new(RewindConfig::default(), registry, root).unwrap()
    }

    #[test]
    fn test_rewind_frees_replaced_state() {
        let mut session = game_session();
        for _ in 0..3 {
            session.step(|r, root| game::tick(r, root).unwrap()).unwrap();
        }
        let old = Rc::downgrade(session.root().as_table().unwrap());
        session.rewind(2).unwrap();
        assert!(old.upgrade().is_none());

        // The rebuilt state is still cyclic and usable.
        let root = session.root().as_table().unwrap().clone();
        assert!(Rc::ptr_eq(root.borrow().get_str("self").as_table().unwrap(), &root));
    }

    #[test]
    fn test_drop_frees_state() {
        let session = game_session();
        let root = Rc::downgrade(session.root().as_table().unwrap());
        drop(session);
        assert!(root.upgrade().is_none());
    }
}
