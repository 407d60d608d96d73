//! Collection to endpoint mapping.
//!
//! Local collections are named after the client's stores (`clinicalNotes`,
//! `labOrders`); the REST API names some of them differently. The map is
//! consulted when building remote calls. Unknown collections map to
//! themselves.

use crate::{error::Result, CollectionName, Error};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Mapping from collection name to REST endpoint segment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionMap {
    endpoints: BTreeMap<CollectionName, String>,
}

impl CollectionMap {
    /// Create an empty map (every collection maps to itself).
    pub fn new() -> Self {
        Self::default()
    }

    /// The endpoints used by the hospital record API.
    pub fn hospital_defaults() -> Self {
        Self::new()
            .with_endpoint("patients", "patients")
            .with_endpoint("appointments", "appointments")
            .with_endpoint("clinicalNotes", "notes")
            .with_endpoint("labOrders", "lab-orders")
            .with_endpoint("billing", "billing")
    }

    /// Builder-style insert.
    pub fn with_endpoint(
        mut self,
        collection: impl Into<CollectionName>,
        endpoint: impl Into<String>,
    ) -> Self {
        self.insert(collection, endpoint);
        self
    }

    pub fn insert(&mut self, collection: impl Into<CollectionName>, endpoint: impl Into<String>) {
        self.endpoints.insert(collection.into(), endpoint.into());
    }

    /// Endpoint segment for a collection.
    pub fn endpoint_for<'a>(&'a self, collection: &'a str) -> &'a str {
        self.endpoints
            .get(collection)
            .map(String::as_str)
            .unwrap_or(collection)
    }

    /// Parse `collection=endpoint` pairs separated by commas, on top of
    /// `self`. Blank entries are skipped.
    pub fn merge_spec(mut self, spec: &str) -> Result<Self> {
        for entry in spec.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let Some((collection, endpoint)) = entry.split_once('=') else {
                return Err(Error::InvalidCollectionMap(entry.to_string()));
            };
            let (collection, endpoint) = (collection.trim(), endpoint.trim().trim_matches('/'));
            if collection.is_empty() || endpoint.is_empty() {
                return Err(Error::InvalidCollectionMap(entry.to_string()));
            }
            self.insert(collection, endpoint);
        }
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}
