//! Build-once values bound to the key they were built for.
//!
//! Each slot moves `Unbuilt → Building(key) → Bound { key, value }`. The
//! transitions only happen while the caller holds the [`ExclusiveGate`]; the
//! bound value is published behind an `RwLock`, so readers on any worker
//! thread see either nothing or the complete value and never need the gate.
//!
//! If the build fails, or the building future is dropped half-way, the slot
//! falls back to `Unbuilt` and the next caller retries.

use std::{
    fmt,
    future::Future,
    sync::{Arc, PoisonError, RwLock},
};

use tracing::{debug, info};

use crate::gate::ExclusiveGate;

enum SlotState<K, V> {
    Unbuilt,
    Building(K),
    Bound { key: K, value: Arc<V> },
}

/// Observable phase of a slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotPhase {
    Unbuilt,
    Building,
    Bound,
}

/// Why a slot could not hand out its value.
#[derive(Debug)]
pub enum SlotError<K, E> {
    /// The slot is bound to a different key; the bound value is untouched.
    Mismatch { bound: K, requested: K },
    /// The build procedure failed; the slot is back to `Unbuilt`.
    Build(E),
}

pub struct BoundSlot<K, V> {
    name: &'static str,
    state: RwLock<SlotState<K, V>>,
}

impl<K, V> fmt::Debug for BoundSlot<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundSlot")
            .field("name", &self.name)
            .field("phase", &self.phase())
            .finish()
    }
}

impl<K, V> BoundSlot<K, V> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            state: RwLock::new(SlotState::Unbuilt),
        }
    }

    pub fn phase(&self) -> SlotPhase {
        match *self.state.read().unwrap_or_else(PoisonError::into_inner) {
            SlotState::Unbuilt => SlotPhase::Unbuilt,
            SlotState::Building(_) => SlotPhase::Building,
            SlotState::Bound { .. } => SlotPhase::Bound,
        }
    }

    fn set(&self, next: SlotState<K, V>) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = next;
    }
}

impl<K: Clone + PartialEq, V> BoundSlot<K, V> {
    /// The bound key and value, if the slot has been built.
    pub fn bound(&self) -> Option<(K, Arc<V>)> {
        match &*self.state.read().unwrap_or_else(PoisonError::into_inner) {
            SlotState::Bound { key, value } => Some((key.clone(), value.clone())),
            _ => None,
        }
    }

    pub fn bound_key(&self) -> Option<K> {
        self.bound().map(|(key, _)| key)
    }

    /// Return the value bound to `requested`, building it under `gate` if the
    /// slot is still empty.
    ///
    /// The empty check is repeated inside the gate, so racing first callers
    /// build at most once. The key comparison runs on every call, including
    /// for the caller that lost the race with a different key.
    pub async fn resolve<F, Fut, E>(
        &self,
        gate: &ExclusiveGate,
        requested: &K,
        build: F,
    ) -> Result<Arc<V>, SlotError<K, E>>
    where
        F: FnOnce(K) -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let (bound, value) = match self.bound() {
            Some(bound) => bound,
            None => gate
                .run_exclusive(|| self.build_exclusive(requested, build))
                .await
                .map_err(SlotError::Build)?,
        };

        if bound != *requested {
            return Err(SlotError::Mismatch {
                bound,
                requested: requested.clone(),
            });
        }
        Ok(value)
    }

    async fn build_exclusive<F, Fut, E>(&self, requested: &K, build: F) -> Result<(K, Arc<V>), E>
    where
        F: FnOnce(K) -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(bound) = self.bound() {
            debug!(slot = self.name, "already built by a concurrent caller");
            return Ok(bound);
        }

        self.set(SlotState::Building(requested.clone()));
        let reset = ResetOnDrop { slot: self, armed: true };

        info!(slot = self.name, "building");
        let value = Arc::new(build(requested.clone()).await?);

        reset.disarm();
        self.set(SlotState::Bound {
            key: requested.clone(),
            value: value.clone(),
        });
        info!(slot = self.name, "bound");
        Ok((requested.clone(), value))
    }
}

struct ResetOnDrop<'a, K, V> {
    slot: &'a BoundSlot<K, V>,
    armed: bool,
}

impl<K, V> ResetOnDrop<'_, K, V> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl<K, V> Drop for ResetOnDrop<'_, K, V> {
    fn drop(&mut self) {
        if self.armed {
            debug!(slot = self.slot.name, "build did not finish, resetting");
            self.slot.set(SlotState::Unbuilt);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    async fn slow_build(builds: &AtomicUsize, key: String) -> Result<String, String> {
        builds.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(10)).await;
        Ok(format!("built-for-{key}"))
    }

    #[tokio::test]
    async fn test_concurrent_resolves_build_once() {
        let gate = ExclusiveGate::new();
        let slot: BoundSlot<String, String> = BoundSlot::new("test");
        let builds = AtomicUsize::new(0);
        let key = "k1".to_string();

        let (a, b, c) = tokio::join!(
            slot.resolve(&gate, &key, |k| slow_build(&builds, k)),
            slot.resolve(&gate, &key, |k| slow_build(&builds, k)),
            slot.resolve(&gate, &key, |k| slow_build(&builds, k)),
        );

        let (a, b, c) = (a.unwrap(), b.unwrap(), c.unwrap());
        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&a, &b));
        assert!(Arc::ptr_eq(&b, &c));
        assert_eq!(*a, "built-for-k1");
        assert_eq!(slot.phase(), SlotPhase::Bound);
    }

    #[tokio::test]
    async fn test_mismatch_leaves_binding_untouched() {
        let gate = ExclusiveGate::new();
        let slot: BoundSlot<String, String> = BoundSlot::new("test");
        let builds = AtomicUsize::new(0);

        let first = slot
            .resolve(&gate, &"k1".to_string(), |k| slow_build(&builds, k))
            .await
            .unwrap();

        let err = slot
            .resolve(&gate, &"k2".to_string(), |k| slow_build(&builds, k))
            .await
            .unwrap_err();
        match err {
            SlotError::Mismatch { bound, requested } => {
                assert_eq!(bound, "k1");
                assert_eq!(requested, "k2");
            }
            SlotError::Build(e) => panic!("unexpected build error {e}"),
        }

        let (key, value) = slot.bound().unwrap();
        assert_eq!(key, "k1");
        assert!(Arc::ptr_eq(&value, &first));
        assert_eq!(builds.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_racing_first_callers_with_different_keys() {
        let gate = ExclusiveGate::new();
        let slot: BoundSlot<String, String> = BoundSlot::new("test");
        let builds = AtomicUsize::new(0);
        let (k1, k2) = ("k1".to_string(), "k2".to_string());

        let (a, b) = tokio::join!(
            slot.resolve(&gate, &k1, |k| slow_build(&builds, k)),
            slot.resolve(&gate, &k2, |k| slow_build(&builds, k)),
        );

        // The first future polled wins the gate.
        assert_eq!(*a.unwrap(), "built-for-k1");
        assert!(matches!(b, Err(SlotError::Mismatch { .. })));
        assert_eq!(builds.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_build_resets_to_unbuilt() {
        let gate = ExclusiveGate::new();
        let slot: BoundSlot<String, String> = BoundSlot::new("test");

        let err = slot
            .resolve(&gate, &"k1".to_string(), |_| async { Err::<String, _>("offline") })
            .await
            .unwrap_err();
        assert!(matches!(err, SlotError::Build("offline")));
        assert_eq!(slot.phase(), SlotPhase::Unbuilt);
        assert!(!gate.is_held());

        let value = slot
            .resolve(&gate, &"k2".to_string(), |k| async move { Ok::<_, &str>(k) })
            .await
            .unwrap();
        assert_eq!(*value, "k2");
    }

    #[tokio::test]
    async fn test_dropped_build_resets_to_unbuilt() {
        let gate = ExclusiveGate::new();
        let slot: BoundSlot<String, String> = BoundSlot::new("test");
        let key = "k1".to_string();

        let timed_out = tokio::time::timeout(
            Duration::from_millis(5),
            slot.resolve(&gate, &key, |_| std::future::pending::<Result<String, ()>>()),
        )
        .await;
        assert!(timed_out.is_err());
        assert_eq!(slot.phase(), SlotPhase::Unbuilt);
        assert!(!gate.is_held());
    }
}
