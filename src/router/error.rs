// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use crate::container::DataError;

/// Outcomes of a route computation other than a usable route.
///
/// Exactly one of these (or a complete [Route](crate::Route)) accompanies
/// every computation; nothing propagates past the engine boundary as a panic.
#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    /// No road feature close enough to the requested start point, or none of
    /// the nearby segments is present in the routing graph.
    #[error("no road near the start point")]
    StartNotFound,

    /// No road feature close enough to the destination, or none of the
    /// nearby segments is present in the routing graph.
    #[error("no road near the destination point")]
    EndNotFound,

    /// The start and destination resolve to different partitions;
    /// routing never spans partitions.
    #[error("start and destination are in different partitions")]
    CrossPartition,

    /// Every candidate endpoint pair was tried and none of them is connected
    /// in the graph.
    #[error("no path between the given points")]
    NoPath,

    /// Partition data could not be loaded, or is corrupted.
    #[error("routing data: {0}")]
    Data(#[from] DataError),
}
