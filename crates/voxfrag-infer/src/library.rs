//! Fragment fingerprint library.
//!
//! Loaded once from a `fingerprints.json`-style object mapping fragment
//! SMILES to embedding vectors, then shared read-only across runs. Entry
//! order is the document order and is the tie-break order when ranking.

use std::collections::HashMap;
use std::fmt;
use std::io::Read;
use std::path::Path;

use candle_core::{Device, Tensor};
use serde::de::{Deserializer, MapAccess, Visitor};
use serde::Deserialize;
use tracing::info;

use crate::{InferError, Result};

/// JSON object entries in document order.
struct OrderedEntries(Vec<(String, Vec<f32>)>);

impl<'de> Deserialize<'de> for OrderedEntries {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct EntriesVisitor;

        impl<'de> Visitor<'de> for EntriesVisitor {
            type Value = OrderedEntries;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an object mapping SMILES strings to numeric arrays")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<OrderedEntries, A::Error> {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((smiles, fingerprint)) = map.next_entry::<String, Vec<f32>>()? {
                    entries.push((smiles, fingerprint));
                }
                Ok(OrderedEntries(entries))
            }
        }

        deserializer.deserialize_map(EntriesVisitor)
    }
}

/// Read-only SMILES → fingerprint mapping backed by one dense `[n, d]` tensor.
pub struct FingerprintLibrary {
    smiles: Vec<String>,
    index: HashMap<String, usize>,
    matrix: Tensor,
    dimension: usize,
}

impl fmt::Debug for FingerprintLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FingerprintLibrary")
            .field("fragments", &self.smiles.len())
            .field("dimension", &self.dimension)
            .finish()
    }
}

impl FingerprintLibrary {
    /// Build from ordered `(smiles, fingerprint)` pairs.
    pub fn from_entries(entries: Vec<(String, Vec<f32>)>, device: &Device) -> Result<Self> {
        let Some((_, first)) = entries.first() else {
            return Err(InferError::Library("library is empty".to_string()));
        };
        let dimension = first.len();
        if dimension == 0 {
            return Err(InferError::Library("fingerprints must not be empty".to_string()));
        }

        let mut smiles = Vec::with_capacity(entries.len());
        let mut index = HashMap::with_capacity(entries.len());
        let mut flat = Vec::with_capacity(entries.len() * dimension);

        for (key, fingerprint) in entries {
            if fingerprint.len() != dimension {
                return Err(InferError::Library(format!(
                    "fingerprint for {key} has length {}, expected {dimension}",
                    fingerprint.len()
                )));
            }
            if fingerprint.iter().any(|v| !v.is_finite()) {
                return Err(InferError::Library(format!("fingerprint for {key} has non-finite values")));
            }
            if index.insert(key.clone(), smiles.len()).is_some() {
                return Err(InferError::Library(format!("duplicate fragment {key}")));
            }
            smiles.push(key);
            flat.extend(fingerprint);
        }

        let matrix = Tensor::from_vec(flat, (smiles.len(), dimension), device)?;
        info!(fragments = smiles.len(), dimension, "Fingerprint library loaded");
        Ok(Self { smiles, index, matrix, dimension })
    }

    pub fn from_json_str(content: &str, device: &Device) -> Result<Self> {
        let OrderedEntries(entries) = serde_json::from_str(content)?;
        Self::from_entries(entries, device)
    }

    pub fn from_json_reader<R: Read>(reader: R, device: &Device) -> Result<Self> {
        let OrderedEntries(entries) = serde_json::from_reader(reader)?;
        Self::from_entries(entries, device)
    }

    /// Load from a JSON file on disk.
    pub fn load(path: impl AsRef<Path>, device: &Device) -> Result<Self> {
        let file = std::fs::File::open(path.as_ref())?;
        Self::from_json_reader(std::io::BufReader::new(file), device)
    }

    pub fn len(&self) -> usize {
        self.smiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.smiles.is_empty()
    }

    /// Fingerprint length.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Fragment SMILES in library order.
    pub fn smiles(&self) -> &[String] {
        &self.smiles
    }

    /// The `[n, d]` fingerprint matrix, rows in library order.
    pub fn matrix(&self) -> &Tensor {
        &self.matrix
    }

    pub fn contains(&self, smiles: &str) -> bool {
        self.index.contains_key(smiles)
    }

    /// Fingerprint for one fragment.
    pub fn get(&self, smiles: &str) -> Result<Option<Vec<f32>>> {
        match self.index.get(smiles) {
            Some(&row) => Ok(Some(self.matrix.get(row)?.to_vec1::<f32>()?)),
            None => Ok(None),
        }
    }
}
