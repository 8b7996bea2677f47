//! Model bundle schema and the durable store capability.
//!
//! One logical schema (topology descriptor, per-layer weight specs, raw
//! little-endian f32 weight bytes, metadata) backs both persistence paths:
//! the durable key-value slot (bincode) and the portable export format
//! (length-prefixed JSON header followed by the weight blob).

use crate::error::AgentError;
use crate::net::{Mlp, ValueModel};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ModelTopology {
    Mlp { dims: Vec<usize>, learning_rate: f32 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightSpec {
    pub name: String,
    pub shape: Vec<usize>,
    pub dtype: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BundleMeta {
    #[serde(default)]
    pub epsilon: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelBundle {
    pub topology: ModelTopology,
    pub weight_specs: Vec<WeightSpec>,
    pub weight_data: Vec<u8>,
    pub meta: BundleMeta,
}

/// JSON part of the portable format; the weight blob follows it verbatim.
#[derive(Serialize, Deserialize)]
struct BundleHeader {
    topology: ModelTopology,
    weight_specs: Vec<WeightSpec>,
    #[serde(default)]
    meta: BundleMeta,
}

pub fn encode_portable(bundle: &ModelBundle) -> Vec<u8> {
    let header = serde_json::to_vec(&BundleHeader {
        topology: bundle.topology.clone(),
        weight_specs: bundle.weight_specs.clone(),
        meta: bundle.meta,
    })
    .expect("bundle header serialization cannot fail");

    let mut out = Vec::with_capacity(4 + header.len() + bundle.weight_data.len());
    out.extend_from_slice(&(header.len() as u32).to_le_bytes());
    out.extend_from_slice(&header);
    out.extend_from_slice(&bundle.weight_data);
    out
}

pub fn decode_portable(bytes: &[u8]) -> Result<ModelBundle, AgentError> {
    if bytes.len() < 4 {
        return Err(AgentError::Deserialize("bundle shorter than its length prefix".into()));
    }
    let header_len = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
    let body = &bytes[4..];
    if body.len() < header_len {
        return Err(AgentError::Deserialize("bundle truncated inside the header".into()));
    }

    let header: BundleHeader = serde_json::from_slice(&body[..header_len])
        .map_err(|e| AgentError::Deserialize(e.to_string()))?;

    Ok(ModelBundle {
        topology: header.topology,
        weight_specs: header.weight_specs,
        weight_data: body[header_len..].to_vec(),
        meta: header.meta,
    })
}

pub fn encode_durable(bundle: &ModelBundle) -> Vec<u8> {
    bincode::serialize(bundle).expect("bundle serialization cannot fail")
}

pub fn decode_durable(bytes: &[u8]) -> Result<ModelBundle, AgentError> {
    bincode::deserialize(bytes).map_err(|e| AgentError::Deserialize(e.to_string()))
}

/// Instantiate the backend a bundle describes.
pub fn model_from_bundle(bundle: &ModelBundle) -> Result<Box<dyn ValueModel>, AgentError> {
    match &bundle.topology {
        ModelTopology::Mlp { .. } => Ok(Box::new(Mlp::from_bundle(bundle)?)),
    }
}

/// Durable key-value store for model slots. The backing medium is an
/// implementation choice; the agent only ever gets and puts named blobs.
pub trait ModelStore {
    fn get(&self, name: &str) -> io::Result<Option<Vec<u8>>>;
    fn put(&mut self, name: &str, bytes: &[u8]) -> io::Result<()>;
}

/// One file per slot under a root directory.
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ModelStore for FileStore {
    fn get(&self, name: &str) -> io::Result<Option<Vec<u8>>> {
        match std::fs::read(self.root.join(name)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn put(&mut self, name: &str, bytes: &[u8]) -> io::Result<()> {
        std::fs::create_dir_all(&self.root)?;
        std::fs::write(self.root.join(name), bytes)
    }
}

/// In-memory store for tests and throwaway sessions.
#[derive(Default)]
pub struct MemoryStore {
    slots: HashMap<String, Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ModelStore for MemoryStore {
    fn get(&self, name: &str) -> io::Result<Option<Vec<u8>>> {
        Ok(self.slots.get(name).cloned())
    }

    fn put(&mut self, name: &str, bytes: &[u8]) -> io::Result<()> {
        self.slots.insert(name.to_string(), bytes.to_vec());
        Ok(())
    }
}
