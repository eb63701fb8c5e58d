pub mod attachment;
pub mod field;
pub mod form;

pub use attachment::{SlotKind, SlotPolicy, SlotSpec};
pub use field::{Constraint, FieldSpec, FieldType, TextFormat};
pub use form::{FormPresentation, FormSpec, SpecError};
