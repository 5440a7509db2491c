//! meshmon_node: the reporting side of meshmon. Tracks a node's status,
//! neighbour traffic and load, and pushes it to the monitor over UDP.

pub mod clock;
pub mod error;
pub mod history;
pub mod node;
pub mod reporter;
pub mod sampler;
