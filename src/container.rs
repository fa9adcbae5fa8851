// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use log::debug;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::feature::{Feature, FeatureIndex, FeatureSource};
use crate::geometry::Rect;
use crate::mapping::{NodeSegments, SegmentMap};
use crate::search::{PathOracle, TileGraph};

/// File extension of the geometry half of a partition container.
pub const DATA_EXTENSION: &str = ".tile";

/// File extension of the routing half of a partition container,
/// appended after [DATA_EXTENSION].
pub const ROUTING_EXTENSION: &str = ".routing";

/// Error conditions of partition data access.
#[derive(Debug, thiserror::Error)]
pub enum DataError {
    #[error("io: {0}")]
    Io(#[from] io::Error),

    #[error("decode: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    #[error("encode: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("unknown partition: {0}")]
    UnknownPartition(String),

    #[error("feature {1} not present in partition {0}")]
    UnknownFeature(String, u32),

    /// The mapping or graph contradicts itself, e.g. a traversed node without
    /// segments or a span pointing outside its feature's geometry.
    #[error("inconsistent routing data: {0}")]
    Inconsistent(&'static str),
}

/// Capability to load a partition's routing data.
pub trait RoutingSource {
    /// The graph-search backend this source yields.
    type Oracle: PathOracle;

    /// Loads the segment-to-node mapping of a partition.
    fn load_mapping(&self, partition: &str) -> Result<SegmentMap, DataError>;

    /// Loads the shortest-path backend of a partition.
    ///
    /// This pulls in the dense graph data; the router only calls it once
    /// both endpoints have matching candidates.
    fn load_oracle(&self, partition: &str) -> Result<Self::Oracle, DataError>;
}

/// Geometry half of a partition container.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TileData {
    pub features: Vec<Feature>,
}

/// Routing half of a partition container.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoutingData {
    /// Decomposition of every graph node into feature polyline spans.
    pub nodes: Vec<NodeSegments>,

    /// The precomputed weighted search graph.
    pub graph: TileGraph,
}

impl TileData {
    /// Serializes into `writer`: bincode, gzip-compressed.
    pub fn write_to<W: Write>(&self, writer: W) -> Result<(), DataError> {
        write_container(self, writer)
    }

    /// Reads data previously written with [TileData::write_to].
    pub fn read_from<R: Read>(reader: R) -> Result<Self, DataError> {
        read_container(reader)
    }
}

impl RoutingData {
    /// Serializes into `writer`: bincode, gzip-compressed.
    pub fn write_to<W: Write>(&self, writer: W) -> Result<(), DataError> {
        write_container(self, writer)
    }

    /// Reads data previously written with [RoutingData::write_to].
    pub fn read_from<R: Read>(reader: R) -> Result<Self, DataError> {
        read_container(reader)
    }
}

fn write_container<T: Serialize, W: Write>(value: &T, writer: W) -> Result<(), DataError> {
    let encoded = bincode::serde::encode_to_vec(value, bincode::config::standard())?;
    let mut encoder = flate2::write::GzEncoder::new(writer, flate2::Compression::default());
    encoder.write_all(&encoded)?;
    encoder.finish()?;
    Ok(())
}

fn read_container<T: DeserializeOwned, R: Read>(reader: R) -> Result<T, DataError> {
    let mut decoder = flate2::read::MultiGzDecoder::new(reader);
    let mut decoded = vec![];
    decoder.read_to_end(&mut decoded)?;

    let (value, _) = bincode::serde::decode_from_slice(&decoded, bincode::config::standard())?;
    Ok(value)
}

/// Partition containers stored as files in a single directory:
/// `<name>.tile` with the geometry and `<name>.tile.routing` with the
/// routing data.
///
/// The routing engine works within one partition at a time, so a single-slot
/// feature index cache is kept behind a [RefCell]; the store is meant to be
/// used from one thread, like the engine itself.
#[derive(Debug)]
pub struct DirectoryStore {
    dir: PathBuf,
    cached: RefCell<Option<(String, FeatureIndex)>>,
}

impl DirectoryStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            cached: RefCell::new(None),
        }
    }

    /// Path of the geometry file of a partition.
    pub fn tile_path(&self, partition: &str) -> PathBuf {
        self.dir.join(format!("{partition}{DATA_EXTENSION}"))
    }

    /// Path of the routing file of a partition.
    pub fn routing_path(&self, partition: &str) -> PathBuf {
        self.dir
            .join(format!("{partition}{DATA_EXTENSION}{ROUTING_EXTENSION}"))
    }

    /// Writes both halves of a partition container, replacing existing files.
    pub fn write_partition(
        &self,
        partition: &str,
        tile: &TileData,
        routing: &RoutingData,
    ) -> Result<(), DataError> {
        tile.write_to(File::create(self.tile_path(partition))?)?;
        routing.write_to(File::create(self.routing_path(partition))?)?;
        Ok(())
    }

    fn open(&self, path: &Path, partition: &str) -> Result<File, DataError> {
        match File::open(path) {
            Ok(f) => Ok(f),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(DataError::UnknownPartition(partition.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn with_index<T>(
        &self,
        partition: &str,
        f: impl FnOnce(&FeatureIndex) -> T,
    ) -> Result<T, DataError> {
        let mut cached = self.cached.borrow_mut();

        if cached.as_ref().map(|(name, _)| name.as_str()) != Some(partition) {
            let tile = TileData::read_from(self.open(&self.tile_path(partition), partition)?)?;
            debug!(
                "loaded {} features of partition {:?}",
                tile.features.len(),
                partition
            );
            *cached = Some((partition.to_string(), FeatureIndex::new(tile.features)));
        }

        let (_, index) = cached.as_ref().expect("feature cache populated above");
        Ok(f(index))
    }

    fn read_routing(&self, partition: &str) -> Result<RoutingData, DataError> {
        RoutingData::read_from(self.open(&self.routing_path(partition), partition)?)
    }
}

impl FeatureSource for DirectoryStore {
    fn for_each_in_rect<F: FnMut(&Feature)>(
        &self,
        partition: &str,
        rect: &Rect,
        visitor: F,
    ) -> Result<(), DataError> {
        self.with_index(partition, |index| index.for_each_in_rect(rect, visitor))
    }

    fn feature(&self, partition: &str, id: u32) -> Result<Feature, DataError> {
        self.with_index(partition, |index| index.get(id).cloned())?
            .ok_or_else(|| DataError::UnknownFeature(partition.to_string(), id))
    }
}

impl RoutingSource for DirectoryStore {
    type Oracle = TileGraph;

    fn load_mapping(&self, partition: &str) -> Result<SegmentMap, DataError> {
        Ok(SegmentMap::from_node_segments(
            self.read_routing(partition)?.nodes,
        ))
    }

    fn load_oracle(&self, partition: &str) -> Result<TileGraph, DataError> {
        Ok(self.read_routing(partition)?.graph)
    }
}

/// In-memory partition store, for tests and small generated data sets.
#[derive(Debug, Default)]
pub struct MemoryStore {
    partitions: HashMap<String, (FeatureIndex, RoutingData)>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a partition.
    pub fn insert(&mut self, partition: &str, tile: TileData, routing: RoutingData) {
        self.partitions.insert(
            partition.to_string(),
            (FeatureIndex::new(tile.features), routing),
        );
    }

    fn partition(&self, partition: &str) -> Result<&(FeatureIndex, RoutingData), DataError> {
        self.partitions
            .get(partition)
            .ok_or_else(|| DataError::UnknownPartition(partition.to_string()))
    }
}

impl FeatureSource for MemoryStore {
    fn for_each_in_rect<F: FnMut(&Feature)>(
        &self,
        partition: &str,
        rect: &Rect,
        visitor: F,
    ) -> Result<(), DataError> {
        let (index, _) = self.partition(partition)?;
        index.for_each_in_rect(rect, visitor);
        Ok(())
    }

    fn feature(&self, partition: &str, id: u32) -> Result<Feature, DataError> {
        let (index, _) = self.partition(partition)?;
        index
            .get(id)
            .cloned()
            .ok_or_else(|| DataError::UnknownFeature(partition.to_string(), id))
    }
}

impl RoutingSource for MemoryStore {
    type Oracle = TileGraph;

    fn load_mapping(&self, partition: &str) -> Result<SegmentMap, DataError> {
        let (_, routing) = self.partition(partition)?;
        Ok(SegmentMap::from_node_segments(routing.nodes.clone()))
    }

    fn load_oracle(&self, partition: &str) -> Result<TileGraph, DataError> {
        let (_, routing) = self.partition(partition)?;
        Ok(routing.graph.clone())
    }
}
