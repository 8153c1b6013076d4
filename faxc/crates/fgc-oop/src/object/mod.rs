//! Object Module - Header Representation and Access
//!
//! Everything that reads or writes the fixed prefix of a heap object:
//! - `mark_word` - the mutable metadata word (lock, hash, age, forwarding)
//! - `header` - header layout and the [`ObjectRef`] handle
//! - `type_pointer` - full and compressed type pointer / reference encodings
//! - `descriptor` / `layout` - the type information the header points at
//! - `size` - the size oracle
//! - `field` - typed field access
//! - `hash` - identity hash
//! - `lock` - displaced mark records

pub mod descriptor;
pub mod field;
pub mod hash;
pub mod header;
pub mod layout;
pub mod lock;
pub mod mark_word;
pub mod size;
pub mod type_pointer;

pub use descriptor::{
    ArraySizing, InstanceSizing, ObjectSizing, TypeDefinition, TypeDescriptor, TypeKind, TypeRef,
};
pub use field::FieldValue;
pub use hash::HashStrategy;
pub use header::{HeaderLayout, ObjectHeader, ObjectRef, HEADER_SIZE};
pub use layout::{ElementKind, LayoutHelper};
pub use lock::{enter_monitor, lock_object, unlock_object, DisplacedMarkRecord};
pub use mark_word::{Forwardee, LockKind, MarkState, MarkWord};
pub use size::{size_given_type, size_of, CopyRacePolicy, NeverTolerate};
pub use type_pointer::{NarrowCodec, ReferenceCodec, TypePointerCodec};
