use shared::types::{ServiceIdentity, ServiceRecord};

/// Currently known services in first-seen order.
///
/// Identities are unique. Replacing a record keeps its position so a rendered
/// list does not jump around while services re-announce.
#[derive(Debug, Default)]
pub struct ServiceRegistry {
    entries: Vec<ServiceRecord>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record, or replace the one with the same identity in place.
    pub fn upsert(&mut self, record: ServiceRecord) {
        match self.position(&record.identity) {
            Some(idx) => self.entries[idx] = record,
            None => self.entries.push(record),
        }
    }

    /// Remove the entry for `identity`. Returns false if it was not present.
    pub fn remove_by_identity(&mut self, identity: &ServiceIdentity) -> bool {
        match self.position(identity) {
            Some(idx) => {
                self.entries.remove(idx);
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Records in display order
    pub fn snapshot(&self) -> Vec<ServiceRecord> {
        self.entries.clone()
    }

    #[cfg(test)]
    pub fn get(&self, identity: &ServiceIdentity) -> Option<&ServiceRecord> {
        self.position(identity).map(|idx| &self.entries[idx])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, identity: &ServiceIdentity) -> Option<usize> {
        self.entries.iter().position(|entry| &entry.identity == identity)
    }
}
