//! # FGC OOP - Object Header Layer
//!
//! The per-object metadata every heap object carries in front of its fields,
//! and the operations the allocator, the collector and the synchronization
//! subsystem build on.
//!
//! ## Overview
//!
//! - **Mark Word**: one mutable word encoding lock state, identity hash,
//!   generational age, or (during collection) a forwarding pointer
//! - **Type Pointer**: the object's type descriptor, full width or
//!   compressed to 32 bits
//! - **Size Oracle**: object size from the type's layout helper, matching
//!   the virtual computation exactly
//! - **Forwarding Protocol**: CAS-installed relocation pointers with a
//!   single winner
//! - **Field Access**: typed loads and stores with an explicit memory order
//! - **Identity Hash**: lazily installed, stable across locking and
//!   relocation
//!
//! ## Quick Start
//!
//! ```rust
//! use fgc_oop::{heap::Arena, HeaderConfig, MemOrder, ObjectRef, TypeDefinition};
//!
//! fn main() -> Result<(), fgc_oop::HeaderError> {
//!     let model = fgc_oop::init_with_config(HeaderConfig::default())?;
//!     let point = model.define_type(TypeDefinition::instance("Point", 16))?;
//!
//!     let arena = Arena::new(1024 * 1024, model.config().object_alignment)?;
//!     let mem = arena.allocate(model.instance_size_bytes(16))?;
//!     let obj = unsafe { ObjectRef::initialize_instance(mem, point) };
//!
//!     obj.write::<i64>(16, 42, MemOrder::Release);
//!     assert_eq!(obj.read::<i64>(16, MemOrder::Acquire), 42);
//!     assert_eq!(obj.size(), 4);
//!
//!     let hash = obj.identity_hash();
//!     assert_eq!(obj.identity_hash(), hash);
//!     Ok(())
//! }
//! ```
//!
//! ## Header Layout
//!
//! ```text
//! 64-bit, compressed type pointers:
//! ┌──────────────────────────┬─────────────┬─────────────┐
//! │ mark word (8)            │ narrow type │ gap/length  │
//! └──────────────────────────┴─────────────┴─────────────┘
//!
//! 64-bit, full type pointers:
//! ┌──────────────────────────┬───────────────────────────┐ ┌─────────────┐
//! │ mark word (8)            │ type pointer (8)          │ │ length (4)  │ arrays only
//! └──────────────────────────┴───────────────────────────┘ └─────────────┘
//! ```
//!
//! ## Safety
//!
//! An [`ObjectRef`] is a plain address. The crate trusts its callers on:
//!
//! 1. **Liveness**: no header operation after the object is reclaimed
//! 2. **Stamping**: memory passed to `initialize_*` is exclusively owned and
//!    large enough
//! 3. **Records**: a displaced mark record outlives every observer of the
//!    locked mark
//!
//! Broken header invariants (null type on an initialized object, a
//! non-positive size, a forwarding pointer that does not round-trip) are
//! logged and then panic.
//!
//! ### Thread Safety
//!
//! - Every header word is accessed atomically with a caller-chosen order
//! - The type pointer's release store / acquire load is the publication
//!   point of a new object
//! - CAS on the mark word is the only contended mutation
//!
//! ## Modules
//!
//! - [`config`]: header configuration and validation
//! - [`error`]: setup error types and fatal invariant macros
//! - [`heap`]: type space and a bump arena
//! - [`logging`]: structured header events
//! - [`model`]: the installed, process-wide object model
//! - [`object`]: mark word, header, types, sizes, fields, hash, locks
//! - [`relocate`]: forwarding protocol and object copying
//! - [`util`]: alignment, memory orders, formatting

pub mod config;
pub mod error;

pub mod heap;
pub mod model;
pub mod object;
pub mod relocate;

pub mod logging;
pub mod util;

#[doc(hidden)]
pub use log as __log;

// Re-export main types for convenience
pub use config::{ConfigError, HeaderConfig};
pub use error::{HeaderError, Result};
pub use model::ObjectModel;
pub use object::{
    CopyRacePolicy, DisplacedMarkRecord, ElementKind, HashStrategy, LayoutHelper, LockKind,
    MarkState, MarkWord, ObjectRef, ObjectSizing, TypeDefinition, TypeDescriptor, TypeKind,
    TypeRef,
};
pub use relocate::{ForwardResult, ObjectCopier};
pub use util::MemOrder;

/// Crate version string from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Install the object model configured from the environment
///
/// See [`HeaderConfig::from_env`] for the variables read.
///
/// # Examples
///
/// ```rust
/// let model = fgc_oop::init()?;
/// assert!(fgc_oop::ObjectModel::is_initialized());
/// assert!(model.config().validate().is_ok());
/// # Ok::<(), fgc_oop::HeaderError>(())
/// ```
pub fn init() -> Result<&'static ObjectModel> {
    init_with_config(HeaderConfig::from_env())
}

/// Install the object model with a custom configuration
///
/// Fails if the configuration is invalid or a model is already installed.
///
/// # Examples
///
/// ```rust
/// use fgc_oop::HeaderConfig;
///
/// let config = HeaderConfig {
///     compressed_type_pointers: false,
///     object_alignment: 16,
///     ..Default::default()
/// };
///
/// let model = fgc_oop::init_with_config(config)?;
/// assert_eq!(model.layout().array_header_bytes(), 24);
/// assert!(fgc_oop::init_with_config(HeaderConfig::default()).is_err());
/// # Ok::<(), fgc_oop::HeaderError>(())
/// ```
pub fn init_with_config(config: HeaderConfig) -> Result<&'static ObjectModel> {
    ObjectModel::install(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_once() {
        let model = init_with_config(HeaderConfig::default()).expect("first init");
        assert!(ObjectModel::is_initialized());
        assert!(std::ptr::eq(model, ObjectModel::global()));

        assert!(matches!(
            init_with_config(HeaderConfig::default()),
            Err(HeaderError::AlreadyInitialized)
        ));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = HeaderConfig {
            object_alignment: 3,
            ..Default::default()
        };
        assert!(matches!(
            init_with_config(config),
            Err(HeaderError::Configuration(_))
        ));
    }

    #[test]
    fn test_version_not_empty() {
        assert!(!VERSION.is_empty());
    }
}
