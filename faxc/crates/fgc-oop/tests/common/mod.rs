//! Common Test Utilities for Object Header Testing
//!
//! This module provides reusable fixtures and assertion helpers for header
//! tests.
//!
//! ============================================================================
//! CRITICAL: These utilities are designed to FIND BUGS, not hide them
//! ============================================================================
//!
//! The object model is process-wide and can be installed once, so every
//! test binary picks ONE header mode through [`OopFixture::get`] and all of
//! its tests share the fixture. Tests run in parallel against the same
//! arena; helpers never reset it.

#![allow(dead_code)]

use fgc_oop::heap::Arena;
use fgc_oop::object::HEADER_SIZE;
use fgc_oop::util::Alignment;
use fgc_oop::{
    CopyRacePolicy, ElementKind, HeaderConfig, MemOrder, ObjectModel, ObjectRef,
    TypeDefinition, TypeDescriptor, TypeRef,
};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;

// ============================================================================
// CONSTANTS
// ============================================================================

/// Backing heap for every test object of a binary
pub const ARENA_SIZE: usize = 64 * 1024 * 1024;

/// Field bytes of the `Point` test type (two longs)
pub const POINT_FIELDS: usize = 16;

/// Field bytes of the `Node` test type (value long + two reference slots)
pub const NODE_FIELDS: usize = 24;

/// Offset of `Node.value`
pub const NODE_VALUE: usize = HEADER_SIZE;

/// Offset of `Node.next`
pub const NODE_NEXT: usize = HEADER_SIZE + 8;

/// Offset of `Node.prev`
pub const NODE_PREV: usize = HEADER_SIZE + 16;

/// Offset of the word count an irregular `Blob` stores about itself
pub const BLOB_WORDS: usize = HEADER_SIZE;

/// Iterations for race loops
pub const RACE_ITERATIONS: usize = 200;

// ============================================================================
// HEADER MODES
// ============================================================================

/// Header configuration a test binary runs under
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderMode {
    /// 32-bit type pointers and 32-bit references
    Compressed,
    /// Full-width type pointers and references, 16-byte alignment
    Uncompressed,
}

impl HeaderMode {
    fn config(self, arena: &Arena) -> HeaderConfig {
        match self {
            HeaderMode::Compressed => HeaderConfig {
                compressed_type_pointers: true,
                compressed_references: true,
                heap_base: arena.base(),
                heap_size: arena.size(),
                object_alignment: 8,
                verify_sizes: true,
                ..Default::default()
            },
            HeaderMode::Uncompressed => HeaderConfig {
                compressed_type_pointers: false,
                compressed_references: false,
                object_alignment: 16,
                verify_sizes: true,
                ..Default::default()
            },
        }
    }

    fn alignment(self) -> usize {
        match self {
            HeaderMode::Compressed => 8,
            HeaderMode::Uncompressed => 16,
        }
    }
}

// ============================================================================
// TEST TYPES
// ============================================================================

/// Types every fixture defines
pub struct TestTypes {
    /// Root of the instance hierarchy, no fields
    pub object: TypeRef,
    /// `Point extends Object`, two longs
    pub point: TypeRef,
    /// `Point3 extends Point`, one more long
    pub point3: TypeRef,
    /// `Node extends Object`, a long and two references
    pub node: TypeRef,
    /// Instance sized through its descriptor only
    pub slow_instance: TypeRef,
    /// Size stored in the object itself
    pub blob: TypeRef,
    pub byte_array: TypeRef,
    pub char_array: TypeRef,
    pub int_array: TypeRef,
    pub long_array: TypeRef,
    pub object_array: TypeRef,
    /// Array whose descriptor deliberately disagrees with its length
    pub racy_array: TypeRef,
}

impl TestTypes {
    fn define(model: &ObjectModel) -> Self {
        let define = |definition: TypeDefinition| {
            model
                .define_type(definition)
                .expect("Test type definition should succeed")
        };

        let object = define(TypeDefinition::instance("Object", 0));
        let point = define(TypeDefinition::instance("Point", POINT_FIELDS).with_super(object));
        let point3 = define(TypeDefinition::instance("Point3", POINT_FIELDS + 8).with_super(point));
        let node = define(TypeDefinition::instance("Node", NODE_FIELDS).with_super(object));

        let slow_words = model.instance_size_bytes(40) / 8;
        let slow_instance = define(
            TypeDefinition::instance("SlowInstance", 40)
                .with_super(object)
                .with_sizing(move |_: ObjectRef, _: &TypeDescriptor| slow_words),
        );

        let blob = define(
            TypeDefinition::irregular("Blob", |obj: ObjectRef, _: &TypeDescriptor| {
                obj.read::<u64>(BLOB_WORDS, MemOrder::Plain) as usize
            })
            .with_super(object),
        );

        let byte_array = define(TypeDefinition::array("byte[]", ElementKind::Byte).with_super(object));
        let char_array = define(TypeDefinition::array("char[]", ElementKind::Char).with_super(object));
        let int_array = define(TypeDefinition::array("int[]", ElementKind::Int).with_super(object));
        let long_array = define(TypeDefinition::array("long[]", ElementKind::Long).with_super(object));
        let object_array =
            define(TypeDefinition::array("Object[]", ElementKind::Object).with_super(object));

        let racy_array = define(
            TypeDefinition::array("racy[]", ElementKind::Int)
                .with_super(object)
                .with_sizing(|_: ObjectRef, ty: &TypeDescriptor| {
                    // Sized as if a copy already shrank the array to nothing.
                    let alignment = ObjectModel::global().config().object_alignment;
                    Alignment::align_up(ty.layout_helper().array_header_bytes(), alignment) / 8
                }),
        );

        TestTypes {
            object,
            point,
            point3,
            node,
            slow_instance,
            blob,
            byte_array,
            char_array,
            int_array,
            long_array,
            object_array,
            racy_array,
        }
    }
}

// ============================================================================
// RACE POLICY
// ============================================================================

/// Tolerates length races only for addresses a test registered
///
/// Installed once per binary, so tests never replace each other's policy.
#[derive(Default)]
pub struct RegisteredRaces {
    addresses: Mutex<HashSet<usize>>,
}

impl RegisteredRaces {
    pub fn register(&self, obj: ObjectRef) {
        self.addresses.lock().insert(obj.address());
    }
}

impl CopyRacePolicy for RegisteredRaces {
    fn may_mutate_length(&self, obj: ObjectRef) -> bool {
        self.addresses.lock().contains(&obj.address())
    }
}

// ============================================================================
// OOP FIXTURE
// ============================================================================

static FIXTURE: OnceCell<OopFixture> = OnceCell::new();

/// Installed model, backing arena and test types
pub struct OopFixture {
    pub mode: HeaderMode,
    pub model: &'static ObjectModel,
    pub arena: Arena,
    pub types: TestTypes,
    pub races: Arc<RegisteredRaces>,
}

impl OopFixture {
    /// The binary's fixture, installing the model on first use
    ///
    /// **Bug this finds:** Model installation that depends on test order,
    /// heap bases the reference codec cannot encode
    pub fn get(mode: HeaderMode) -> &'static OopFixture {
        let fixture = FIXTURE.get_or_init(|| Self::install(mode));
        assert_eq!(
            fixture.mode, mode,
            "A test binary must use a single header mode"
        );
        fixture
    }

    fn install(mode: HeaderMode) -> OopFixture {
        let arena =
            Arena::new(ARENA_SIZE, mode.alignment()).expect("Arena reservation should succeed");
        let model = fgc_oop::init_with_config(mode.config(&arena))
            .expect("Object model installation should succeed");
        let races = Arc::new(RegisteredRaces::default());
        model
            .install_race_policy(Arc::clone(&races) as Arc<dyn CopyRacePolicy>)
            .expect("Race policy installation should succeed");
        let types = TestTypes::define(model);

        OopFixture {
            mode,
            model,
            arena,
            types,
            races,
        }
    }

    /// Zeroed memory for `bytes`
    pub fn alloc_raw(&self, bytes: usize) -> usize {
        self.arena
            .allocate(bytes)
            .expect("Arena should not be exhausted by tests")
    }

    /// Stamp a fresh instance of `ty`
    pub fn new_instance(&self, ty: TypeRef) -> ObjectRef {
        let bytes = ty.layout_helper().instance_size_bytes();
        assert!(bytes > 0, "{} is not a fixed-size instance type", ty.name());
        let mem = self.alloc_raw(bytes);
        unsafe { ObjectRef::initialize_instance(mem, ty) }
    }

    /// Stamp a fresh array of `ty` with `length` elements
    pub fn new_array(&self, ty: TypeRef, length: u32) -> ObjectRef {
        let mem = self.alloc_raw(self.model.array_size_bytes(ty, length));
        unsafe { ObjectRef::initialize_array(mem, ty, length) }
    }

    /// Stamp a `Blob` spanning `words` words (header included)
    pub fn new_blob(&self, words: usize) -> ObjectRef {
        assert!(words * 8 >= HEADER_SIZE + 8, "Blob must hold its own size");
        let mem = self.alloc_raw(words * 8);
        let obj = unsafe { ObjectRef::initialize_instance(mem, self.types.blob) };
        obj.write::<u64>(BLOB_WORDS, words as u64, MemOrder::Plain);
        obj
    }

    /// Evacuation allocator backed by the fixture arena
    pub fn allocate_copy(&self, bytes: usize) -> fgc_oop::Result<usize> {
        self.arena.allocate(bytes)
    }

    pub fn alignment(&self) -> usize {
        self.model.config().object_alignment
    }
}

// ============================================================================
// ASSERTION HELPERS
// ============================================================================

/// Assert a size in words respects the minimum object alignment
///
/// **Bug this finds:** Size oracle rounding to words instead of the
/// configured alignment
pub fn assert_aligned_size(fixture: &OopFixture, obj: ObjectRef) {
    let words = obj.size();
    assert!(words > 0, "Size of {:?} must be positive", obj);
    assert_eq!(
        (words * 8) % fixture.alignment(),
        0,
        "Size {} words of {:?} is not a multiple of {} bytes",
        words,
        obj,
        fixture.alignment()
    );
}

/// Assert the fast size path agrees with the descriptor's sizing
///
/// **Bug this finds:** Layout helper encodings that drift from the virtual
/// size computation
pub fn assert_size_matches_descriptor(obj: ObjectRef) {
    let ty = obj.type_ref();
    assert_eq!(
        obj.size(),
        ty.sizing().size_in_words(obj, &ty),
        "Fast and virtual size disagree for {:?} of type {}",
        obj,
        ty.name()
    );
}

/// Assert every address is distinct
pub fn assert_all_unique(addresses: &[usize]) {
    let unique: HashSet<_> = addresses.iter().copied().collect();
    assert_eq!(
        unique.len(),
        addresses.len(),
        "Duplicate addresses among {} objects",
        addresses.len()
    );
}
