//! Model metadata
//!
//! - `definition`: attribute and model definitions, table lookup
//! - `normalize`: encoding incoming records for storage

pub mod definition;
pub mod normalize;

pub use definition::{AttributeDefinition, AttributeType, ModelDefinition, ModelLookup};
pub use normalize::{check_required, normalize_values};
