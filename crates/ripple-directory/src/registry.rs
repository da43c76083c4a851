// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Publisher registry owned by the directory server.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::transport::Endpoint;

/// Publisher identifier assigned by the registry.
pub type PublisherId = u32;

/// Information about a registered publisher.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublisherRecord {
    /// Assigned on registration, absent before
    #[serde(default)]
    pub id: Option<PublisherId>,

    /// Transport URL of the publisher's broadcast endpoint
    #[serde(default)]
    pub address: String,

    /// Human readable label (not unique)
    #[serde(default)]
    pub name: String,

    /// Topics this publisher emits
    #[serde(default)]
    pub topics: Vec<String>,
}

impl PublisherRecord {
    /// Create an unregistered record.
    pub fn new(address: impl Into<String>, name: impl Into<String>, topics: Vec<String>) -> Self {
        Self {
            id: None,
            address: address.into(),
            name: name.into(),
            topics,
        }
    }

    /// Check whether this publisher declares `topic`.
    pub fn has_topic(&self, topic: &str) -> bool {
        self.topics.iter().any(|t| t == topic)
    }
}

/// Immutable copy of the registry at one point in time.
///
/// Snapshots always replace the previous one wholesale. `generation` grows with
/// every successful mutation so receivers can discard stale copies.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectorySnapshot {
    pub generation: u64,
    pub publishers: BTreeMap<PublisherId, PublisherRecord>,
}

impl DirectorySnapshot {
    /// Get a publisher by id.
    pub fn get(&self, id: PublisherId) -> Option<&PublisherRecord> {
        self.publishers.get(&id)
    }

    /// Check whether `id` is present.
    pub fn contains(&self, id: PublisherId) -> bool {
        self.publishers.contains_key(&id)
    }

    /// Number of publishers.
    pub fn len(&self) -> usize {
        self.publishers.len()
    }

    /// True when no publisher is registered.
    pub fn is_empty(&self) -> bool {
        self.publishers.is_empty()
    }

    /// Publishers declaring `topic`.
    pub fn publishers_for_topic<'a>(
        &'a self,
        topic: &'a str,
    ) -> impl Iterator<Item = &'a PublisherRecord> + 'a {
        self.publishers.values().filter(move |r| r.has_topic(topic))
    }
}

/// Registry errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("address already registered: {0}")]
    AddressAlreadyRegistered(String),

    #[error("invalid publisher address: {0}")]
    AddressParseError(String),

    #[error("publisher {0} not found")]
    IdNotFound(PublisherId),

    #[error("update of publisher {0} failed")]
    UpdateFailed(PublisherId),

    #[error("publisher id space exhausted")]
    IdSpaceExhausted,
}

/// Directory of registered publishers.
///
/// Ids are never reused for the lifetime of the registry; `id` and `address`
/// are pairwise distinct among the stored records.
#[derive(Debug, Default)]
pub struct Registry {
    records: BTreeMap<PublisherId, PublisherRecord>,
    next_id: PublisherId,
    generation: u64,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a publisher and return its new id.
    pub fn register(
        &mut self,
        mut candidate: PublisherRecord,
    ) -> Result<PublisherId, RegistryError> {
        candidate
            .address
            .parse::<Endpoint>()
            .map_err(|_| RegistryError::AddressParseError(candidate.address.clone()))?;

        if self.find_by_address(&candidate.address).is_some() {
            return Err(RegistryError::AddressAlreadyRegistered(candidate.address));
        }

        let id = self.next_id;
        self.next_id = id.checked_add(1).ok_or(RegistryError::IdSpaceExhausted)?;

        candidate.id = Some(id);
        self.records.insert(id, candidate);
        self.generation += 1;
        Ok(id)
    }

    /// Remove a publisher.
    pub fn deregister(&mut self, id: PublisherId) -> Result<PublisherRecord, RegistryError> {
        let record = self
            .records
            .remove(&id)
            .ok_or(RegistryError::IdNotFound(id))?;
        self.generation += 1;
        Ok(record)
    }

    /// Replace the topic list of a publisher.
    pub fn update_topics(
        &mut self,
        id: PublisherId,
        topics: Vec<String>,
    ) -> Result<(), RegistryError> {
        let record = self
            .records
            .get_mut(&id)
            .ok_or(RegistryError::UpdateFailed(id))?;
        record.topics = topics;
        self.generation += 1;
        Ok(())
    }

    /// Copy the current state.
    pub fn snapshot(&self) -> DirectorySnapshot {
        DirectorySnapshot {
            generation: self.generation,
            publishers: self.records.clone(),
        }
    }

    /// Get a publisher by id.
    pub fn get(&self, id: PublisherId) -> Option<&PublisherRecord> {
        self.records.get(&id)
    }

    /// Find the publisher bound to `address`.
    pub fn find_by_address(&self, address: &str) -> Option<&PublisherRecord> {
        self.records.values().find(|r| r.address == address)
    }

    /// Current mutation generation.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Number of registered publishers.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(port: u16, topics: &[&str]) -> PublisherRecord {
        PublisherRecord::new(
            format!("tcp://host:{}", port),
            "sensor",
            topics.iter().map(|t| t.to_string()).collect(),
        )
    }

    #[test]
    fn test_registry_new() {
        let reg = Registry::new();
        assert!(reg.is_empty());
        assert_eq!(reg.generation(), 0);
        assert!(reg.snapshot().is_empty());
    }

    #[test]
    fn test_register_assigns_id() {
        let mut reg = Registry::new();
        let id = reg.register(record(9000, &["temp"])).unwrap();

        let stored = reg.get(id).unwrap();
        assert_eq!(stored.id, Some(id));
        assert_eq!(stored.topics, vec!["temp".to_string()]);
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.generation(), 1);
    }

    #[test]
    fn test_register_duplicate_address() {
        let mut reg = Registry::new();
        assert!(reg.register(record(9000, &[])).is_ok());

        let err = reg.register(record(9000, &["other"])).unwrap_err();
        assert_eq!(
            err,
            RegistryError::AddressAlreadyRegistered("tcp://host:9000".into())
        );

        let matching = reg
            .snapshot()
            .publishers
            .values()
            .filter(|r| r.address == "tcp://host:9000")
            .count();
        assert_eq!(matching, 1);
        assert_eq!(reg.generation(), 1);
    }

    #[test]
    fn test_register_invalid_address() {
        let mut reg = Registry::new();
        for bad in ["", "host:9000", "tcp://host", "tcp://:9000", "udp://host:1", "tcp://h:99999"] {
            let err = reg
                .register(PublisherRecord::new(bad, "bad", vec![]))
                .unwrap_err();
            assert!(matches!(err, RegistryError::AddressParseError(_)), "{}", bad);
        }
        assert!(reg.is_empty());
    }

    #[test]
    fn test_ids_monotonic_across_deregistration() {
        let mut reg = Registry::new();
        let mut last = None;
        for port in 9000..9010 {
            let id = reg.register(record(port, &[])).unwrap();
            if let Some(prev) = last {
                assert!(id > prev);
            }
            reg.deregister(id).unwrap();
            last = Some(id);
        }

        // same address again after deregistration gets a fresh id
        let id = reg.register(record(9000, &[])).unwrap();
        assert!(id > last.unwrap());
    }

    #[test]
    fn test_uniqueness_over_mixed_sequence() {
        let mut reg = Registry::new();
        for port in [1, 2, 3, 2, 1, 4, 3, 5] {
            let _ = reg.register(record(port, &[]));
        }
        let snap = reg.snapshot();
        assert_eq!(snap.len(), 5);

        let mut addresses: Vec<_> = snap.publishers.values().map(|r| &r.address).collect();
        addresses.sort();
        addresses.dedup();
        assert_eq!(addresses.len(), 5);
        for (id, r) in &snap.publishers {
            assert_eq!(r.id, Some(*id));
        }
    }

    #[test]
    fn test_deregister() {
        let mut reg = Registry::new();
        let id = reg.register(record(9000, &[])).unwrap();

        let removed = reg.deregister(id).unwrap();
        assert_eq!(removed.address, "tcp://host:9000");
        assert!(!reg.snapshot().contains(id));

        assert_eq!(reg.deregister(id), Err(RegistryError::IdNotFound(id)));
        assert_eq!(reg.generation(), 2);
    }

    #[test]
    fn test_update_topics() {
        let mut reg = Registry::new();
        let id = reg.register(record(9000, &["temp"])).unwrap();

        reg.update_topics(id, vec!["pressure".into(), "humidity".into()])
            .unwrap();
        assert_eq!(
            reg.get(id).unwrap().topics,
            vec!["pressure".to_string(), "humidity".to_string()]
        );

        reg.update_topics(id, vec![]).unwrap();
        assert!(reg.get(id).unwrap().topics.is_empty());

        assert_eq!(
            reg.update_topics(42, vec![]),
            Err(RegistryError::UpdateFailed(42))
        );
    }

    #[test]
    fn test_snapshot_is_a_copy() {
        let mut reg = Registry::new();
        let id = reg.register(record(9000, &["temp"])).unwrap();

        let first = reg.snapshot();
        assert_eq!(first, reg.snapshot());

        reg.update_topics(id, vec!["other".into()]).unwrap();
        assert_eq!(first.get(id).unwrap().topics, vec!["temp".to_string()]);
        assert!(reg.snapshot().generation > first.generation);
    }

    #[test]
    fn test_publishers_for_topic() {
        let mut reg = Registry::new();
        reg.register(record(1, &["temp", "pressure"])).unwrap();
        reg.register(record(2, &["temp"])).unwrap();
        reg.register(record(3, &["ecg"])).unwrap();

        let snap = reg.snapshot();
        assert_eq!(snap.publishers_for_topic("temp").count(), 2);
        assert_eq!(snap.publishers_for_topic("ecg").count(), 1);
        assert_eq!(snap.publishers_for_topic("missing").count(), 0);
    }

    #[test]
    fn test_find_by_address() {
        let mut reg = Registry::new();
        let id = reg.register(record(7, &[])).unwrap();
        assert_eq!(reg.find_by_address("tcp://host:7").unwrap().id, Some(id));
        assert!(reg.find_by_address("tcp://host:8").is_none());
    }
}
