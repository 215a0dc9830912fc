pub mod checksum;
pub mod cipher;
pub mod configuration;
pub mod container;
pub mod decoder;
pub mod descriptor;
pub mod diff;
pub mod module_parser;
pub mod objects;

pub use configuration::{Configuration, ExternalProcessing};
pub use container::{ContainerTree, LeafContent, Node, NodeId, ProgressFn, StorageRole};
pub use diff::compare;
pub use module_parser::{parse_module, Module, Unit, UnitKind};
