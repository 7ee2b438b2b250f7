//! Size-bounded cache of decoded sound buffers.
//!
//! Entries are created lazily from catalog records and keep their metadata for the lifetime
//! of the cache; only the decoded data is loaded and evicted. An entry nobody uses sits in
//! the unused queue, oldest release at the front, and is the first to go when the resident
//! size crosses the maximum.

use crate::asset::{AssetId, SoundCatalog, SoundMetadata};
use crate::decoder::{DecodedSound, DecoderProvider, decode_all};
use crate::device::{AudioDevice, BufferHandle};
use crate::error::{Result, SonorityError};
use std::collections::{HashMap, VecDeque};

/// Index of an entry in a [`BufferCache`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(usize);

/// Which unused entries are evicted first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EvictionPolicy {
    /// Oldest release first. Entries never used since loading count as released at load.
    #[default]
    ReleaseOrder,
}

#[derive(Debug, Clone)]
pub struct BufferEntry {
    id: AssetId,
    resource_name: String,
    metadata: SoundMetadata,
    handle: Option<BufferHandle>,
    use_count: u32,
    byte_size: usize,
}

impl BufferEntry {
    pub fn id(&self) -> &AssetId {
        &self.id
    }

    pub fn resource_name(&self) -> &str {
        &self.resource_name
    }

    pub fn volume(&self) -> f32 {
        self.metadata.volume
    }

    pub fn min_distance(&self) -> f32 {
        self.metadata.min_distance
    }

    pub fn max_distance(&self) -> f32 {
        self.metadata.max_distance
    }

    pub fn handle(&self) -> Option<BufferHandle> {
        self.handle
    }

    pub fn use_count(&self) -> u32 {
        self.use_count
    }

    pub fn byte_size(&self) -> usize {
        self.byte_size
    }

    pub fn is_resident(&self) -> bool {
        self.handle.is_some()
    }
}

pub struct BufferCache {
    entries: Vec<BufferEntry>,
    index: HashMap<AssetId, BufferId>,
    unused: VecDeque<BufferId>,
    resident_bytes: usize,
    min_bytes: usize,
    max_bytes: usize,
    policy: EvictionPolicy,
    populated: bool,
    overflow: Option<SonorityError>,
}

impl BufferCache {
    pub fn new(min_bytes: usize, max_bytes: usize) -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
            unused: VecDeque::new(),
            resident_bytes: 0,
            min_bytes,
            max_bytes,
            policy: EvictionPolicy::default(),
            populated: false,
            overflow: None,
        }
    }

    pub fn policy(&self) -> EvictionPolicy {
        self.policy
    }

    pub fn resident_bytes(&self) -> usize {
        self.resident_bytes
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry(&self, buffer: BufferId) -> &BufferEntry {
        &self.entries[buffer.0]
    }

    pub fn lookup(&self, id: &AssetId) -> Option<BufferId> {
        self.index.get(id).copied()
    }

    pub fn is_resident(&self, buffer: BufferId) -> bool {
        self.entry(buffer).is_resident()
    }

    /// Entries currently waiting for eviction, oldest release first.
    pub fn unused(&self) -> impl Iterator<Item = BufferId> + '_ {
        self.unused.iter().copied()
    }

    fn insert(&mut self, id: AssetId, resource_name: String, metadata: SoundMetadata) -> BufferId {
        let buffer = BufferId(self.entries.len());
        self.entries.push(BufferEntry {
            id: id.clone(),
            resource_name,
            metadata,
            handle: None,
            use_count: 0,
            byte_size: 0,
        });
        self.index.insert(id, buffer);
        buffer
    }

    fn populate(&mut self, catalog: &dyn SoundCatalog) {
        let scale = catalog.distance_scale();
        let mut records = catalog.sounds();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        for record in records {
            if !self.index.contains_key(&record.id) {
                let metadata = record.metadata(&scale);
                self.insert(record.id, record.resource_name, metadata);
            }
        }
        self.populated = true;
        log::debug!("Buffer cache indexed {} sounds", self.entries.len());
    }

    /// Finds or creates the entry for `id`. Returns `None` for ids the catalog does not know.
    pub fn resolve(&mut self, id: &AssetId, catalog: &dyn SoundCatalog) -> Option<BufferId> {
        if !self.populated {
            self.populate(catalog);
        }
        if let Some(buffer) = self.lookup(id) {
            return Some(buffer);
        }

        let record = catalog.sound(id)?;
        let metadata = record.metadata(&catalog.distance_scale());
        Some(self.insert(record.id, record.resource_name, metadata))
    }

    /// Uploads already decoded audio for `buffer` unless it is resident.
    ///
    /// After the upload the cache evicts as needed, then parks the entry in the unused queue
    /// if nobody holds it, so a fresh load is never its own eviction victim.
    pub fn install(
        &mut self,
        buffer: BufferId,
        device: &mut dyn AudioDevice,
        sound: &DecodedSound,
    ) -> Result<BufferHandle> {
        if let Some(handle) = self.entry(buffer).handle {
            return Ok(handle);
        }

        let (handle, size) = device.load_sound(sound)?;
        let entry = &mut self.entries[buffer.0];
        entry.handle = Some(handle);
        entry.byte_size = size;
        self.resident_bytes += size;

        self.evict(device);

        if self.entries[buffer.0].use_count == 0 {
            self.unused.push_back(buffer);
        }
        Ok(handle)
    }

    /// Decodes and uploads `buffer` synchronously unless it is resident.
    pub fn ensure_loaded(
        &mut self,
        buffer: BufferId,
        device: &mut dyn AudioDevice,
        provider: &dyn DecoderProvider,
    ) -> Result<BufferHandle> {
        if let Some(handle) = self.entry(buffer).handle {
            return Ok(handle);
        }
        let sound = decode_all(provider, self.entry(buffer).resource_name())?;
        self.install(buffer, device, &sound)
    }

    fn evict(&mut self, device: &mut dyn AudioDevice) {
        if self.resident_bytes <= self.max_bytes {
            return;
        }

        while self.resident_bytes > self.min_bytes {
            let Some(victim) = self.unused.pop_front() else {
                break;
            };
            self.unload_entry(victim, device);
        }

        if self.resident_bytes > self.max_bytes {
            let overflow = SonorityError::CacheOverflow {
                resident: self.resident_bytes,
                max: self.max_bytes,
            };
            log::warn!("{}; no unused buffers left to evict", overflow);
            self.overflow = Some(overflow);
        }
    }

    fn unload_entry(&mut self, buffer: BufferId, device: &mut dyn AudioDevice) {
        let entry = &mut self.entries[buffer.0];
        if let Some(handle) = entry.handle.take() {
            device.unload_sound(handle);
            self.resident_bytes = self.resident_bytes.saturating_sub(entry.byte_size);
            log::debug!("Evicted {} ({} bytes)", entry.id, entry.byte_size);
            entry.byte_size = 0;
        }
    }

    /// Takes the most recent over-budget condition, if any occurred since the last call.
    pub fn take_overflow(&mut self) -> Option<SonorityError> {
        self.overflow.take()
    }

    /// Marks one more session as bound to `buffer`.
    pub fn acquire(&mut self, buffer: BufferId) {
        let entry = &mut self.entries[buffer.0];
        entry.use_count += 1;
        if entry.use_count == 1 {
            self.unused.retain(|queued| *queued != buffer);
        }
    }

    /// Drops one session's hold on `buffer`; at zero it joins the back of the unused queue.
    pub fn release(&mut self, buffer: BufferId) {
        let entry = &mut self.entries[buffer.0];
        if entry.use_count == 0 {
            log::warn!("Released {} more often than it was acquired", entry.id);
            return;
        }
        entry.use_count -= 1;
        if entry.use_count == 0 && entry.handle.is_some() {
            self.unused.push_back(buffer);
        }
    }

    /// Frees the decoded data of an unused entry. Metadata stays cached.
    pub fn unload(&mut self, buffer: BufferId, device: &mut dyn AudioDevice) -> bool {
        if self.entry(buffer).use_count > 0 {
            return false;
        }
        self.unused.retain(|queued| *queued != buffer);
        self.unload_entry(buffer, device);
        true
    }

    /// Unloads everything, regardless of use counts.
    pub fn clear(&mut self, device: &mut dyn AudioDevice) {
        for index in 0..self.entries.len() {
            self.unload_entry(BufferId(index), device);
            self.entries[index].use_count = 0;
        }
        self.unused.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::{SoundRecord, StaticCatalog};
    use crate::testing::{MemoryProvider, RecordingDevice};

    fn catalog() -> StaticCatalog {
        StaticCatalog::new()
            .with_sound(SoundRecord::new("a", "a.wav"))
            .with_sound(SoundRecord::new("b", "b.wav"))
            .with_sound(SoundRecord::new("c", "c.wav"))
            .with_sound(SoundRecord::new("d", "d.wav"))
    }

    fn provider() -> MemoryProvider {
        MemoryProvider::new()
            .with_sized("a.wav", 500)
            .with_sized("b.wav", 500)
            .with_sized("c.wav", 500)
            .with_sized("d.wav", 200)
    }

    #[test]
    fn resolve_indexes_catalog_once() {
        let mut cache = BufferCache::new(400, 1000);
        let catalog = catalog();
        let a = cache.resolve(&"A".into(), &catalog).unwrap();
        assert_eq!(cache.len(), 4);
        assert_eq!(cache.resolve(&"a".into(), &catalog), Some(a));
        assert_eq!(cache.entry(a).resource_name(), "a.wav");
        assert!(!cache.is_resident(a));
        assert!(cache.resolve(&"missing".into(), &catalog).is_none());
    }

    #[test]
    fn evicts_oldest_release_to_make_room() {
        let mut cache = BufferCache::new(400, 1000);
        let mut device = RecordingDevice::new();
        let (catalog, provider) = (catalog(), provider());

        let a = cache.resolve(&"a".into(), &catalog).unwrap();
        let b = cache.resolve(&"b".into(), &catalog).unwrap();
        let c = cache.resolve(&"c".into(), &catalog).unwrap();

        cache.ensure_loaded(a, &mut device, &provider).unwrap();
        cache.acquire(a);
        cache.ensure_loaded(b, &mut device, &provider).unwrap();
        cache.acquire(b);
        assert_eq!(cache.resident_bytes(), 1000);
        assert!(cache.take_overflow().is_none());

        cache.release(a);
        cache.ensure_loaded(c, &mut device, &provider).unwrap();

        assert!(!cache.is_resident(a));
        assert!(cache.is_resident(b));
        assert!(cache.is_resident(c));
        assert_eq!(cache.resident_bytes(), 1000);
        assert_eq!(device.log().resident_bytes(), 1000);
        assert!(cache.take_overflow().is_none());
        assert_eq!(cache.unused().collect::<Vec<_>>(), vec![c]);
    }

    #[test]
    fn buffers_in_use_past_the_budget_report_overflow() {
        let mut cache = BufferCache::new(400, 1000);
        let mut device = RecordingDevice::new();
        let (catalog, provider) = (catalog(), provider());

        for name in ["a", "b", "c"] {
            let id = cache.resolve(&name.into(), &catalog).unwrap();
            cache.ensure_loaded(id, &mut device, &provider).unwrap();
            cache.acquire(id);
        }

        assert_eq!(cache.resident_bytes(), 1500);
        assert!(matches!(
            cache.take_overflow(),
            Some(SonorityError::CacheOverflow {
                resident: 1500,
                max: 1000
            })
        ));
        assert!(cache.take_overflow().is_none());
    }

    #[test]
    fn eviction_stops_at_minimum() {
        let mut cache = BufferCache::new(400, 1000);
        let mut device = RecordingDevice::new();
        let (catalog, provider) = (catalog(), provider());
        let ids: Vec<BufferId> = ["a", "b", "d", "c"]
            .iter()
            .map(|name| cache.resolve(&(*name).into(), &catalog).unwrap())
            .collect();

        for id in &ids[..3] {
            cache.ensure_loaded(*id, &mut device, &provider).unwrap();
        }
        assert!(!cache.is_resident(ids[0]));
        assert!(!cache.is_resident(ids[1]));
        assert!(cache.is_resident(ids[2]));
        assert_eq!(cache.resident_bytes(), 200);
        assert!(cache.take_overflow().is_none());

        cache.ensure_loaded(ids[3], &mut device, &provider).unwrap();
        assert_eq!(cache.resident_bytes(), 700);
    }

    #[test]
    fn use_counts_never_go_negative() {
        let mut cache = BufferCache::new(0, 10_000);
        let mut device = RecordingDevice::new();
        let (catalog, provider) = (catalog(), provider());
        let a = cache.resolve(&"a".into(), &catalog).unwrap();
        cache.ensure_loaded(a, &mut device, &provider).unwrap();

        cache.acquire(a);
        cache.acquire(a);
        assert_eq!(cache.entry(a).use_count(), 2);
        assert_eq!(cache.unused().count(), 0);

        cache.release(a);
        cache.release(a);
        cache.release(a);
        assert_eq!(cache.entry(a).use_count(), 0);
        assert_eq!(cache.unused().collect::<Vec<_>>(), vec![a]);
    }

    #[test]
    fn failed_decode_leaves_entry_unresident() {
        let mut cache = BufferCache::new(0, 10_000);
        let mut device = RecordingDevice::new();
        let catalog = catalog();
        let provider = MemoryProvider::new().with_failure("a.wav");
        let a = cache.resolve(&"a".into(), &catalog).unwrap();

        assert!(cache.ensure_loaded(a, &mut device, &provider).is_err());
        assert!(!cache.is_resident(a));
        assert_eq!(cache.resident_bytes(), 0);
    }

    #[test]
    fn unload_skips_entries_in_use() {
        let mut cache = BufferCache::new(0, 10_000);
        let mut device = RecordingDevice::new();
        let (catalog, provider) = (catalog(), provider());
        let a = cache.resolve(&"a".into(), &catalog).unwrap();
        cache.ensure_loaded(a, &mut device, &provider).unwrap();
        cache.acquire(a);

        assert!(!cache.unload(a, &mut device));
        cache.release(a);
        assert!(cache.unload(a, &mut device));
        assert!(!cache.is_resident(a));
        assert_eq!(cache.unused().count(), 0);

        cache.ensure_loaded(a, &mut device, &provider).unwrap();
        cache.clear(&mut device);
        assert_eq!(cache.resident_bytes(), 0);
        assert!(device.log().loaded.is_empty());
    }
}
