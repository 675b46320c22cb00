//! Last-record store for duplicate suppression.
//!
//! Sensors retransmit each reading until the bridge acknowledges it, so the
//! gateway sees the same record several times. The store keeps the last
//! accepted record per (channel, device) and lets a record through only when
//! it differs from that entry.

use hivegate_packet::{RawRecord, RECORD_SIZE};

/// Identifies one device's slot in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DedupKey {
    /// Inbound channel id.
    pub channel_id: u8,
    /// Device id within the channel.
    pub device_id: u8,
}

impl DedupKey {
    /// Key for a channel and device.
    pub const fn new(channel_id: u8, device_id: u8) -> Self {
        DedupKey { channel_id, device_id }
    }
}

/// Fixed-size table of the last accepted record per device.
///
/// Entries start zero-filled. An all-zero record from a device that has not
/// reported yet therefore compares equal and is suppressed.
#[derive(Debug, Clone)]
pub struct DedupStore {
    max_channels: u8,
    max_devices: u8,
    entries: Vec<RawRecord>,
}

impl DedupStore {
    /// Create a store for `max_channels` x `max_devices` devices.
    pub fn new(max_channels: u8, max_devices: u8) -> Self {
        let len = max_channels as usize * max_devices as usize;
        DedupStore {
            max_channels,
            max_devices,
            entries: vec![[0u8; RECORD_SIZE]; len],
        }
    }

    /// Number of device slots.
    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    fn index(&self, key: DedupKey) -> usize {
        // Keys come from validated packets; anything else is a caller bug.
        assert!(
            key.channel_id < self.max_channels && key.device_id < self.max_devices,
            "dedup key {:?} outside {}x{} store",
            key,
            self.max_channels,
            self.max_devices
        );
        key.channel_id as usize * self.max_devices as usize + key.device_id as usize
    }

    /// Returns true and stores `record` if it differs from the entry for
    /// `(channel_id, device_id)`; returns false and leaves the entry alone
    /// otherwise.
    ///
    /// # Panics
    ///
    /// If the key is outside the store's bounds.
    pub fn is_new_and_commit(&mut self, channel_id: u8, device_id: u8, record: &RawRecord) -> bool {
        let index = self.index(DedupKey::new(channel_id, device_id));
        let entry = &mut self.entries[index];
        if entry == record {
            return false;
        }
        entry.copy_from_slice(record);
        true
    }

    /// Last accepted record for a device.
    pub fn entry(&self, channel_id: u8, device_id: u8) -> &RawRecord {
        &self.entries[self.index(DedupKey::new(channel_id, device_id))]
    }
}
