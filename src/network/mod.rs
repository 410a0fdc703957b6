pub mod assembler;
pub mod blocks;
pub mod filters;
pub mod graph;
pub mod network;

pub use assembler::NetworkAssembler;
pub use blocks::{contracting_path, expansive_path, ContractingPath, SkipConnection};
pub use filters::FilterSchedule;
pub use graph::{Graph, GraphBuilder, NodeId, Op, Trace};
pub use network::{argmax_mask, Network};
