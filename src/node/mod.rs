pub mod node;

pub use node::{reduce_tree, NodeId, NodeView, ParseNode, ParseTree};
pub(crate) use node::Draft;
