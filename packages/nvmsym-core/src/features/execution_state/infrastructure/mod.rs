pub mod address_space;
pub mod constraint_manager;
pub mod ptree;

pub use address_space::AddressSpace;
pub use constraint_manager::ConstraintManager;
pub use ptree::{PTree, PTreeNode, PTreeNodeId, StateId};
