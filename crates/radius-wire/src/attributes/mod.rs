mod attribute;
mod container;
mod types;

pub use attribute::Attribute;
pub use container::Attributes;
pub use types::AttributeType;
