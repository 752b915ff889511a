use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;

use crate::error::StoreError;
use crate::models::delivery::Delivery;
use crate::models::rider::Rider;

/// A record kept in a [`Repository`], versioned for optimistic concurrency.
pub trait Entity: Clone {
    const KIND: &'static str;

    fn id(&self) -> &str;
    fn version(&self) -> u64;
    fn set_version(&mut self, version: u64);
}

impl Entity for Delivery {
    const KIND: &'static str = "delivery";

    fn id(&self) -> &str {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn set_version(&mut self, version: u64) {
        self.version = version;
    }
}

impl Entity for Rider {
    const KIND: &'static str = "rider";

    fn id(&self) -> &str {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn set_version(&mut self, version: u64) {
        self.version = version;
    }
}

pub struct Repository<T> {
    records: DashMap<String, T>,
}

impl<T: Entity> Repository<T> {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
        }
    }

    pub fn insert(&self, entity: T) -> Result<T, StoreError> {
        match self.records.entry(entity.id().to_string()) {
            Entry::Occupied(_) => Err(StoreError::AlreadyExists(format!(
                "{} {}",
                T::KIND,
                entity.id()
            ))),
            Entry::Vacant(slot) => {
                slot.insert(entity.clone());
                Ok(entity)
            }
        }
    }

    pub fn get(&self, id: &str) -> Result<T, StoreError> {
        self.records
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| StoreError::NotFound(format!("{} {id}", T::KIND)))
    }

    pub fn list(&self) -> Vec<T> {
        let mut all: Vec<T> = self
            .records
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        all.sort_by(|a, b| a.id().cmp(b.id()));
        all
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Compare-and-swap write. Succeeds only if the stored version still
    /// matches `entity.version()`; the stored copy gets the next version.
    pub fn save(&self, mut entity: T) -> Result<T, StoreError> {
        let mut stored = self
            .records
            .get_mut(entity.id())
            .ok_or_else(|| StoreError::NotFound(format!("{} {}", T::KIND, entity.id())))?;

        let found = stored.version();
        if found != entity.version() {
            return Err(StoreError::ConcurrentModification {
                id: entity.id().to_string(),
                expected: entity.version(),
                found,
            });
        }

        entity.set_version(found + 1);
        *stored = entity.clone();
        Ok(entity)
    }

    /// Read-modify-write with up to `retries` extra attempts when another
    /// writer gets in first. `change` runs against each fresh snapshot and
    /// may veto the write by returning an error.
    pub fn update<F, E>(&self, id: &str, retries: u32, mut change: F) -> Result<T, E>
    where
        F: FnMut(&mut T) -> Result<(), E>,
        E: From<StoreError>,
    {
        let mut attempt = 0;

        loop {
            let mut entity = self.get(id)?;
            change(&mut entity)?;

            match self.save(entity) {
                Ok(saved) => return Ok(saved),
                Err(StoreError::ConcurrentModification { .. }) if attempt < retries => {
                    attempt += 1;
                    debug!(kind = T::KIND, id, attempt, "concurrent write; retrying");
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}

impl<T: Entity> Default for Repository<T> {
    fn default() -> Self {
        Self::new()
    }
}
