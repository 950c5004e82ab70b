//! Form metadata: field descriptors per resource, option lists and display formats.

pub mod definition;
pub mod descriptor;
pub mod labeling;

pub use definition::ResourceDefinition;
pub use descriptor::{FieldDescriptor, FieldOverride};
pub use labeling::{formats, labeling};
