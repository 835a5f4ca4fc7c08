//! Hierarchical state composition.
//!
//! A state gains children by *holding* a child machine, not by subtyping:
//! [`HierarchicalState`] decorates a plain behavior with a single embedded
//! machine, [`CompositeState`] with a set of parallel regions, and
//! [`StateHierarchy`] validates an intended nesting before it is wired into
//! live machines.

mod composite;
mod hierarchical;
mod tree;

pub use composite::CompositeState;
pub use hierarchical::HierarchicalState;
pub use tree::{HierarchyError, StateHierarchy};
