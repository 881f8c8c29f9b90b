//! airtrans-core — descriptor, partitioning, integrity, framing, and config.
//! All other AirTrans crates depend on this one.

pub mod config;
pub mod descriptor;
pub mod framing;
pub mod integrity;

pub use descriptor::{part_spans, PartSpan, TransferDescriptor, MAX_PARTS, PROTOCOL_VERSION};
pub use framing::Preamble;
pub use integrity::HashAlgorithm;
