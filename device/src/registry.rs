//! Sharded registry of live device connections
//!
//! The registry maps each logical [`Id`] to the set of connections currently
//! claiming it. Identities are spread over a fixed number of shards, each behind
//! its own read/write lock, so connects, disconnects and visits for unrelated
//! devices rarely contend.
//!
//! Several connections may share one `Id`. Within an `Id` the set is keyed by
//! the device [`Key`], so only re-adding the very same connection is rejected.
//!
//! Visitors run while the shard's read lock is held. They must be quick and
//! must not call back into the registry.

use std::collections::hash_map::{Entry, HashMap, RandomState};
use std::hash::BuildHasher;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::device::{Device, Key};
use crate::error::RegistryError;
use crate::id::Id;

/// One partition of the identity space
type Shard = HashMap<Id, HashMap<Key, Arc<Device>>>;

/// Thread-safe, sharded multi-map from identity to live devices
pub struct Registry {
    shards: Box<[RwLock<Shard>]>,
    hasher: RandomState,
}

impl Registry {
    /// Create a registry with `shard_hint` independently locked shards.
    ///
    /// The hint sizes the registry for the expected churn; it is not a
    /// capacity limit. A hint of zero yields a single shard.
    pub fn new(shard_hint: usize) -> Self {
        let shards = (0..shard_hint.max(1))
            .map(|_| RwLock::new(HashMap::new()))
            .collect();

        Self {
            shards,
            hasher: RandomState::new(),
        }
    }

    /// Number of shards, fixed at construction
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Insert a device under its identity.
    ///
    /// The device is visible to visits as soon as this returns.
    ///
    /// # Errors
    ///
    /// [`RegistryError::DuplicateDevice`] if this exact device is already
    /// registered. Other devices with the same `Id` are not duplicates.
    pub fn add(&self, device: Arc<Device>) -> Result<(), RegistryError> {
        let mut shard = self.shard(device.id()).write();
        let devices = shard.entry(device.id().clone()).or_default();

        match devices.entry(device.key()) {
            Entry::Occupied(_) => Err(RegistryError::DuplicateDevice {
                id: device.id().clone(),
                key: device.key(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(device);
                Ok(())
            }
        }
    }

    /// Call `visitor` for every device registered under `id`.
    ///
    /// Returns the number of devices visited.
    pub fn visit_id<F>(&self, id: &Id, mut visitor: F) -> usize
    where
        F: FnMut(&Arc<Device>),
    {
        let shard = self.shard(id).read();
        match shard.get(id) {
            Some(devices) => {
                devices.values().for_each(&mut visitor);
                devices.len()
            }
            None => 0,
        }
    }

    /// Call `visitor` for every device whose identity matches `predicate`.
    ///
    /// Shards are visited one after another, so the result is consistent per
    /// shard but not a single snapshot of the whole registry. Returns the
    /// number of devices visited.
    pub fn visit_if<P, F>(&self, mut predicate: P, mut visitor: F) -> usize
    where
        P: FnMut(&Id) -> bool,
        F: FnMut(&Arc<Device>),
    {
        let mut visited = 0;
        for shard in self.shards.iter() {
            let shard = shard.read();
            for (id, devices) in shard.iter() {
                if predicate(id) {
                    devices.values().for_each(&mut visitor);
                    visited += devices.len();
                }
            }
        }

        visited
    }

    /// Call `visitor` for every registered device
    pub fn visit_all<F>(&self, visitor: F) -> usize
    where
        F: FnMut(&Arc<Device>),
    {
        self.visit_if(|_| true, visitor)
    }

    /// Remove one specific device.
    ///
    /// Other devices sharing its identity stay registered. Returns whether the
    /// device was present.
    pub fn remove(&self, device: &Device) -> bool {
        let mut shard = self.shard(device.id()).write();
        let Some(devices) = shard.get_mut(device.id()) else {
            return false;
        };

        let removed = devices.remove(&device.key()).is_some();
        if devices.is_empty() {
            shard.remove(device.id());
        }

        removed
    }

    /// Remove and return every device registered under `id`
    pub fn remove_all(&self, id: &Id) -> Vec<Arc<Device>> {
        let removed: Vec<_> = self
            .shard(id)
            .write()
            .remove(id)
            .map(|devices| devices.into_values().collect())
            .unwrap_or_default();

        if !removed.is_empty() {
            tracing::debug!("Removed {} device(s) for {}", removed.len(), id);
        }

        removed
    }

    /// Remove and return every device whose identity matches `predicate`
    pub fn remove_if<P>(&self, mut predicate: P) -> Vec<Arc<Device>>
    where
        P: FnMut(&Id) -> bool,
    {
        let mut removed = Vec::new();
        for shard in self.shards.iter() {
            shard.write().retain(|id, devices| {
                if predicate(id) {
                    removed.extend(devices.drain().map(|(_, device)| device));
                    false
                } else {
                    true
                }
            });
        }

        if !removed.is_empty() {
            tracing::debug!("Removed {} device(s) by predicate", removed.len());
        }

        removed
    }

    /// Total number of registered devices
    pub fn len(&self) -> usize {
        self.shards
            .iter()
            .map(|shard| shard.read().values().map(HashMap::len).sum::<usize>())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(|shard| shard.read().is_empty())
    }

    fn shard(&self, id: &Id) -> &RwLock<Shard> {
        let index = self.hasher.hash_one(id) % self.shards.len() as u64;
        &self.shards[index as usize]
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("shards", &self.shards.len())
            .field("devices", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::collections::HashSet;

    struct Fixture {
        registry: Registry,
        nosuch: Arc<Device>,
        single: Arc<Device>,
        double: Vec<Arc<Device>>,
        many: Vec<Arc<Device>>,
    }

    fn device(id: &str) -> Arc<Device> {
        Device::new(Id::new(id), 1).0
    }

    fn keys<'a>(devices: impl IntoIterator<Item = &'a Arc<Device>>) -> HashSet<Key> {
        devices.into_iter().map(|d| d.key()).collect()
    }

    fn fixture(shard_hint: usize) -> Fixture {
        let fixture = Fixture {
            registry: Registry::new(shard_hint),
            nosuch: device("nosuch ID"),
            single: device("single"),
            double: (0..2).map(|_| device("double")).collect(),
            many: (0..5).map(|_| device("many")).collect(),
        };

        fixture.registry.add(Arc::clone(&fixture.single)).unwrap();
        for d in fixture.double.iter().chain(fixture.many.iter()) {
            fixture.registry.add(Arc::clone(d)).unwrap();
        }

        fixture
    }

    impl Fixture {
        fn all(&self) -> HashSet<Key> {
            keys(std::iter::once(&self.single).chain(&self.double).chain(&self.many))
        }

        fn visit_id(&self, id: &str) -> (usize, HashSet<Key>) {
            let mut visited = HashSet::new();
            let count = self.registry.visit_id(&Id::new(id), |d| {
                visited.insert(d.key());
            });
            (count, visited)
        }

        fn visit_all(&self) -> (usize, HashSet<Key>) {
            let mut visited = HashSet::new();
            let count = self.registry.visit_all(|d| {
                visited.insert(d.key());
            });
            (count, visited)
        }
    }

    #[test]
    fn test_duplicate_device() {
        let f = fixture(1000);
        let duplicate = device("duplicate device");

        assert!(f.registry.add(Arc::clone(&duplicate)).is_ok());
        assert_eq!(
            f.registry.add(Arc::clone(&duplicate)),
            Err(RegistryError::DuplicateDevice {
                id: duplicate.id().clone(),
                key: duplicate.key(),
            })
        );
        assert_eq!(f.registry.visit_id(duplicate.id(), |_| {}), 1);
    }

    #[rstest]
    #[case(1)]
    #[case(7)]
    #[case(1000)]
    fn test_visit_id(#[case] shard_hint: usize) {
        let f = fixture(shard_hint);

        assert_eq!(f.visit_id("nosuch ID"), (0, HashSet::new()));
        assert_eq!(f.visit_id("single"), (1, keys([&f.single])));
        assert_eq!(f.visit_id("double"), (2, keys(&f.double)));
        assert_eq!(f.visit_id("many"), (5, keys(&f.many)));
    }

    #[rstest]
    #[case(1)]
    #[case(7)]
    #[case(1000)]
    fn test_visit_if(#[case] shard_hint: usize) {
        let f = fixture(shard_hint);

        let cases: Vec<(Box<dyn Fn(&Id) -> bool>, HashSet<Key>)> = vec![
            (Box::new(|_: &Id| false), HashSet::new()),
            (Box::new(|id: &Id| id.as_str() == "single"), keys([&f.single])),
            (Box::new(|id: &Id| id.as_str() == "double"), keys(&f.double)),
            (Box::new(|id: &Id| id.as_str() == "many"), keys(&f.many)),
            (
                Box::new(|id: &Id| id.as_str() != "many"),
                keys(std::iter::once(&f.single).chain(&f.double)),
            ),
        ];

        for (predicate, expected) in cases {
            let mut visited = HashSet::new();
            let count = f.registry.visit_if(predicate, |d| {
                visited.insert(d.key());
            });
            assert_eq!(count, expected.len());
            assert_eq!(visited, expected);
        }
    }

    #[rstest]
    #[case(1)]
    #[case(7)]
    #[case(1000)]
    fn test_visit_all(#[case] shard_hint: usize) {
        let f = fixture(shard_hint);
        assert_eq!(f.visit_all(), (8, f.all()));
        assert_eq!(f.registry.len(), 8);
    }

    #[test]
    fn test_remove_one() {
        let f = fixture(1000);
        assert!(!f.registry.remove(&f.nosuch));
        assert_eq!(f.visit_all().1, f.all());

        let f = fixture(1000);
        assert!(f.registry.remove(&f.single));
        assert!(!f.registry.remove(&f.single));
        assert_eq!(f.visit_id("single"), (0, HashSet::new()));
        assert_eq!(f.registry.len(), 7);

        let f = fixture(1000);
        assert!(f.registry.remove(&f.double[0]));
        assert_eq!(f.visit_id("double"), (1, keys([&f.double[1]])));

        let f = fixture(1000);
        assert!(f.registry.remove(&f.many[3]));
        let mut expected = keys(&f.many);
        expected.remove(&f.many[3].key());
        assert_eq!(f.visit_id("many").1, expected);
        let mut expected = f.all();
        expected.remove(&f.many[3].key());
        assert_eq!(f.visit_all().1, expected);
    }

    #[test]
    fn test_remove_all() {
        let f = fixture(1000);
        assert!(f.registry.remove_all(&Id::new("nosuch ID")).is_empty());
        assert_eq!(f.visit_all().0, 8);

        for id in ["single", "double", "many"] {
            let f = fixture(1000);
            let expected = match id {
                "single" => keys([&f.single]),
                "double" => keys(&f.double),
                _ => keys(&f.many),
            };

            let removed = f.registry.remove_all(&Id::new(id));
            assert_eq!(keys(&removed), expected);
            assert_eq!(f.visit_id(id), (0, HashSet::new()));

            let remaining: HashSet<Key> = f.all().difference(&expected).copied().collect();
            assert_eq!(f.visit_all().1, remaining);
        }
    }

    #[test]
    fn test_remove_if() {
        let f = fixture(16);
        let removed = f.registry.remove_if(|id| id.as_str() != "single");
        assert_eq!(removed.len(), 7);
        assert_eq!(f.visit_all(), (1, keys([&f.single])));
        assert!(!f.registry.is_empty());

        assert_eq!(f.registry.remove_if(|_| true).len(), 1);
        assert!(f.registry.is_empty());
    }

    #[test]
    fn test_readd_after_remove() {
        let f = fixture(4);
        assert!(f.registry.remove(&f.single));
        assert!(f.registry.add(Arc::clone(&f.single)).is_ok());
        assert_eq!(f.visit_id("single").0, 1);
    }

    #[test]
    fn test_zero_shard_hint() {
        let registry = Registry::new(0);
        assert_eq!(registry.shard_count(), 1);
        assert!(registry.add(device("single")).is_ok());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_registry_holds_references() {
        let registry = Registry::new(8);
        let d = device("single");
        registry.add(Arc::clone(&d)).unwrap();
        assert_eq!(Arc::strong_count(&d), 2);

        let removed = registry.remove_all(d.id());
        assert!(Arc::ptr_eq(&removed[0], &d));
        drop(removed);
        assert_eq!(Arc::strong_count(&d), 1);
    }
}
