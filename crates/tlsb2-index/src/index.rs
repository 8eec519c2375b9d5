use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tlsb2_types::{FileInfo, Kind, Namespace, ObjectId};

/// Identity-to-object-id mappings for both namespaces.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataIndex {
    #[serde(default)]
    pub domains: BTreeMap<String, ObjectId>,
    #[serde(default)]
    pub users: BTreeMap<String, ObjectId>,
}

impl MetadataIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn map(&self, kind: Kind) -> &BTreeMap<String, ObjectId> {
        match kind {
            Kind::Domain => &self.domains,
            Kind::User => &self.users,
        }
    }

    fn map_mut(&mut self, kind: Kind) -> &mut BTreeMap<String, ObjectId> {
        match kind {
            Kind::Domain => &mut self.domains,
            Kind::User => &mut self.users,
        }
    }

    pub fn get(&self, kind: Kind, identity: &str) -> Option<&ObjectId> {
        self.map(kind).get(identity)
    }

    /// Record `id` as the current object for `identity`, returning the previous id.
    pub fn insert(&mut self, kind: Kind, identity: &str, id: ObjectId) -> Option<ObjectId> {
        self.map_mut(kind).insert(identity.to_string(), id)
    }

    pub fn remove(&mut self, kind: Kind, identity: &str) -> Option<ObjectId> {
        self.map_mut(kind).remove(identity)
    }

    /// Identities of one kind, sorted.
    pub fn identities(&self, kind: Kind) -> impl Iterator<Item = &str> {
        self.map(kind).keys().map(String::as_str)
    }

    /// Total number of entries across both namespaces.
    pub fn len(&self) -> usize {
        self.domains.len() + self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.domains.is_empty() && self.users.is_empty()
    }

    /// Build an index from a listing of current object versions.
    ///
    /// Objects outside the domain and user namespaces are ignored. When a
    /// name appears more than once the most recently uploaded version wins.
    pub fn from_listing(namespace: &Namespace, files: &[FileInfo]) -> Self {
        let mut index = Self::new();
        let mut seen: BTreeMap<(Kind, String), &FileInfo> = BTreeMap::new();
        for file in files {
            for kind in [Kind::Domain, Kind::User] {
                if let Ok(identity) = namespace.identity_of(kind, &file.name) {
                    let slot = seen.entry((kind, identity.to_string())).or_insert(file);
                    if file.uploaded_at > slot.uploaded_at {
                        *slot = file;
                    }
                }
            }
        }
        for ((kind, identity), file) in seen {
            index.insert(kind, &identity, file.id.clone());
        }
        index
    }
}
