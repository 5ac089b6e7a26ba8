/// Data model shared by the scanner, the snapshot store and the analysis
/// engines: the owned folder tree, its flat row form, and snapshots.
pub mod flat_tree;
pub mod folder_node;
pub mod size;
pub mod snapshot;

pub use flat_tree::{flatten, reconstruct, FlatFolderNode};
pub use folder_node::FolderNode;
pub use snapshot::{Snapshot, SnapshotMetadata};
