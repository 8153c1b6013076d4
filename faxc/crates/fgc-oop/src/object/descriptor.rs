//! Type Descriptors
//!
//! The header layer needs very little from a type: its layout helper, a way
//! to size irregular objects, a subtype check and the mark word new objects
//! start with. Class loading and everything else about a type belongs to the
//! embedder.
//!
//! Descriptors are defined into the [`TypeSpace`](crate::heap::TypeSpace)
//! through [`ObjectModel::define_type`](crate::ObjectModel::define_type) and
//! live for the rest of the process, which is what makes [`TypeRef`] a plain
//! `Copy` handle.

use crate::object::header::ObjectRef;
use crate::object::layout::{ElementKind, LayoutHelper};
use crate::object::mark_word::MarkWord;
use crate::util::Alignment;
use std::fmt;
use std::ops::Deref;
use std::ptr::NonNull;

/// Virtual size computation
///
/// The size oracle falls back to this for irregular shapes and slow-path
/// instances, and uses it to cross-check array sizes when verification is
/// on. Implementations must return a positive multiple of the minimum object
/// alignment, in words.
pub trait ObjectSizing: Send + Sync {
    fn size_in_words(&self, obj: ObjectRef, ty: &TypeDescriptor) -> usize;
}

impl<F> ObjectSizing for F
where
    F: Fn(ObjectRef, &TypeDescriptor) -> usize + Send + Sync,
{
    fn size_in_words(&self, obj: ObjectRef, ty: &TypeDescriptor) -> usize {
        self(obj, ty)
    }
}

/// Fixed-size instances
#[derive(Debug, Clone, Copy)]
pub struct InstanceSizing {
    size_bytes: usize,
}

impl InstanceSizing {
    pub fn new(size_bytes: usize) -> Self {
        Self { size_bytes }
    }
}

impl ObjectSizing for InstanceSizing {
    fn size_in_words(&self, _obj: ObjectRef, _ty: &TypeDescriptor) -> usize {
        self.size_bytes / Alignment::WORD
    }
}

/// Arrays sized from the element kind and the current length
///
/// Works from the installed model's header layout rather than the layout
/// helper, so it is an independent check of the fast path.
#[derive(Debug, Clone, Copy)]
pub struct ArraySizing {
    element: ElementKind,
}

impl ArraySizing {
    pub fn new(element: ElementKind) -> Self {
        Self { element }
    }
}

impl ObjectSizing for ArraySizing {
    fn size_in_words(&self, obj: ObjectRef, _ty: &TypeDescriptor) -> usize {
        let model = crate::ObjectModel::global();
        let element_bytes = 1usize << self.element.log2_size(model.reference_bytes());
        let bytes = model.layout().array_header_bytes() + obj.array_length() as usize * element_bytes;
        Alignment::align_up(bytes, model.config().object_alignment) / Alignment::WORD
    }
}

/// Shape of a type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    Instance,
    ObjectArray,
    PrimitiveArray(ElementKind),
    /// Sized only through [`ObjectSizing`]
    Irregular,
}

impl TypeKind {
    pub fn is_array(self) -> bool {
        matches!(self, TypeKind::ObjectArray | TypeKind::PrimitiveArray(_))
    }

    pub fn element_kind(self) -> Option<ElementKind> {
        match self {
            TypeKind::ObjectArray => Some(ElementKind::Object),
            TypeKind::PrimitiveArray(kind) => Some(kind),
            _ => None,
        }
    }
}

/// Type descriptor
pub struct TypeDescriptor {
    name: String,
    kind: TypeKind,
    layout: LayoutHelper,
    prototype: MarkWord,
    super_type: Option<TypeRef>,
    sizing: Box<dyn ObjectSizing>,
}

impl TypeDescriptor {
    pub(crate) fn new(
        name: String,
        kind: TypeKind,
        layout: LayoutHelper,
        super_type: Option<TypeRef>,
        sizing: Box<dyn ObjectSizing>,
    ) -> Self {
        Self {
            name,
            kind,
            layout,
            prototype: MarkWord::prototype(),
            super_type,
            sizing,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> TypeKind {
        self.kind
    }

    #[inline]
    pub fn layout_helper(&self) -> LayoutHelper {
        self.layout
    }

    /// Mark word every new instance starts with
    #[inline]
    pub fn prototype_mark(&self) -> MarkWord {
        self.prototype
    }

    pub fn super_type(&self) -> Option<TypeRef> {
        self.super_type
    }

    pub fn sizing(&self) -> &dyn ObjectSizing {
        self.sizing.as_ref()
    }

    pub fn is_array(&self) -> bool {
        self.kind.is_array()
    }

    /// `self` is `other` or inherits from it
    pub fn is_subtype_of(&self, other: TypeRef) -> bool {
        let target = other.address();
        if self as *const TypeDescriptor as usize == target {
            return true;
        }
        let mut current = self.super_type;
        while let Some(ty) = current {
            if ty.address() == target {
                return true;
            }
            current = ty.super_type;
        }
        false
    }
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("layout", &self.layout)
            .field("super_type", &self.super_type.map(|t| t.name().to_string()))
            .finish()
    }
}

/// Handle to a defined type descriptor
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeRef(NonNull<TypeDescriptor>);

// Descriptors are immutable once defined and never freed.
unsafe impl Send for TypeRef {}
unsafe impl Sync for TypeRef {}

impl TypeRef {
    /// Wrap a descriptor address
    ///
    /// # Safety
    /// `addr` must be null or point at a descriptor that stays alive for
    /// every use of the returned handle.
    #[inline]
    pub unsafe fn from_address(addr: usize) -> Option<TypeRef> {
        NonNull::new(addr as *mut TypeDescriptor).map(TypeRef)
    }

    #[inline]
    pub fn address(self) -> usize {
        self.0.as_ptr() as usize
    }
}

impl Deref for TypeRef {
    type Target = TypeDescriptor;

    #[inline]
    fn deref(&self) -> &TypeDescriptor {
        // SAFETY: handles are only made for descriptors that outlive them.
        unsafe { self.0.as_ref() }
    }
}

impl fmt::Debug for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeRef({} @ {:#x})", self.name(), self.address())
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum Shape {
    Instance { field_bytes: usize },
    Array(ElementKind),
    Irregular,
}

/// Request to define a type
///
/// # Examples
///
/// ```rust,no_run
/// use fgc_oop::{ElementKind, ObjectModel, TypeDefinition};
///
/// let model = fgc_oop::init().unwrap();
/// let object = model.define_type(TypeDefinition::instance("Object", 0)).unwrap();
/// let point = model
///     .define_type(TypeDefinition::instance("Point", 16).with_super(object))
///     .unwrap();
/// let bytes = model
///     .define_type(TypeDefinition::array("byte[]", ElementKind::Byte))
///     .unwrap();
/// assert!(point.is_subtype_of(object));
/// assert!(bytes.is_array());
/// ```
pub struct TypeDefinition {
    pub(crate) name: String,
    pub(crate) shape: Shape,
    pub(crate) super_type: Option<TypeRef>,
    pub(crate) sizing: Option<Box<dyn ObjectSizing>>,
}

impl TypeDefinition {
    /// Fixed-size instance with `field_bytes` of fields after the header
    pub fn instance(name: impl Into<String>, field_bytes: usize) -> Self {
        Self {
            name: name.into(),
            shape: Shape::Instance { field_bytes },
            super_type: None,
            sizing: None,
        }
    }

    /// Array of `element`
    pub fn array(name: impl Into<String>, element: ElementKind) -> Self {
        Self {
            name: name.into(),
            shape: Shape::Array(element),
            super_type: None,
            sizing: None,
        }
    }

    /// Shape only `sizing` can measure
    pub fn irregular(name: impl Into<String>, sizing: impl ObjectSizing + 'static) -> Self {
        Self {
            name: name.into(),
            shape: Shape::Irregular,
            super_type: None,
            sizing: Some(Box::new(sizing)),
        }
    }

    pub fn with_super(mut self, super_type: TypeRef) -> Self {
        self.super_type = Some(super_type);
        self
    }

    /// Replace the default sizing; instances then take the slow path
    pub fn with_sizing(mut self, sizing: impl ObjectSizing + 'static) -> Self {
        self.sizing = Some(Box::new(sizing));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leak(descriptor: TypeDescriptor) -> TypeRef {
        let ptr = Box::leak(Box::new(descriptor)) as *mut TypeDescriptor;
        unsafe { TypeRef::from_address(ptr as usize) }.expect("non-null")
    }

    fn instance(name: &str, super_type: Option<TypeRef>) -> TypeRef {
        leak(TypeDescriptor::new(
            name.to_string(),
            TypeKind::Instance,
            LayoutHelper::instance(16, false),
            super_type,
            Box::new(InstanceSizing::new(16)),
        ))
    }

    #[test]
    fn test_subtype_chain() {
        let object = instance("Object", None);
        let animal = instance("Animal", Some(object));
        let dog = instance("Dog", Some(animal));
        let rock = instance("Rock", Some(object));

        assert!(dog.is_subtype_of(dog));
        assert!(dog.is_subtype_of(animal));
        assert!(dog.is_subtype_of(object));
        assert!(!animal.is_subtype_of(dog));
        assert!(!rock.is_subtype_of(animal));
    }

    #[test]
    fn test_prototype_is_unlocked() {
        let ty = instance("Object", None);
        assert!(ty.prototype_mark().is_unlocked());
        assert!(!ty.prototype_mark().has_hash());
        assert_eq!(MarkWord::prototype_for(&ty), ty.prototype_mark());
    }

    #[test]
    fn test_kind_queries() {
        assert!(TypeKind::ObjectArray.is_array());
        assert_eq!(
            TypeKind::PrimitiveArray(ElementKind::Long).element_kind(),
            Some(ElementKind::Long)
        );
        assert_eq!(TypeKind::Irregular.element_kind(), None);
        assert!(!TypeKind::Instance.is_array());
    }
}
