//! Object Model - process-wide header parameters
//!
//! Header encodings depend on choices fixed at startup: whether type
//! pointers and references are compressed, against which bases, and the
//! minimum object alignment. [`ObjectModel`] holds those choices together
//! with the type space, is installed exactly once, and is read without
//! locking afterwards.
//!
//! Startup sequence:
//! 1. Reserve the heap (e.g. [`Arena`](crate::heap::Arena)) if references
//!    are compressed, and put its base into the config.
//! 2. [`crate::init_with_config`] validates the config, reserves the type
//!    space and publishes the model.
//! 3. Define types, stamp objects.

use crate::config::HeaderConfig;
use crate::error::{HeaderError, Result};
use crate::heap::TypeSpace;
use crate::logging::{configure_logger, log_event, HeaderEvent, HeaderLoggerConfig, LogLevel};
use crate::object::descriptor::{
    ArraySizing, InstanceSizing, ObjectSizing, Shape, TypeDefinition, TypeDescriptor, TypeKind,
    TypeRef,
};
use crate::object::header::{HeaderLayout, HEADER_SIZE};
use crate::object::layout::{ElementKind, LayoutHelper};
use crate::object::size::{CopyRacePolicy, NeverTolerate};
use crate::object::type_pointer::{NarrowCodec, ReferenceCodec, TypePointerCodec};
use crate::util::Alignment;
use once_cell::sync::OnceCell;
use std::sync::Arc;

static MODEL: OnceCell<ObjectModel> = OnceCell::new();

static NEVER_TOLERATE: NeverTolerate = NeverTolerate;

/// Installed header parameters
pub struct ObjectModel {
    config: HeaderConfig,
    layout: HeaderLayout,
    type_codec: TypePointerCodec,
    reference_codec: ReferenceCodec,
    type_space: TypeSpace,
    race_policy: OnceCell<Arc<dyn CopyRacePolicy>>,
}

impl ObjectModel {
    fn new(config: HeaderConfig) -> Result<Self> {
        let type_space =
            TypeSpace::reserve(config.type_space_size, 1 << config.type_pointer_shift)?;

        let type_codec = if config.compressed_type_pointers {
            TypePointerCodec::Compressed(NarrowCodec::for_region(
                type_space.base(),
                config.type_pointer_shift,
            )?)
        } else {
            TypePointerCodec::Full
        };

        let reference_codec = if config.compressed_references {
            ReferenceCodec::Compressed(NarrowCodec::for_region(
                config.heap_base,
                config.reference_shift,
            )?)
        } else {
            ReferenceCodec::Full
        };

        Ok(Self {
            layout: HeaderLayout::new(config.compressed_type_pointers),
            type_codec,
            reference_codec,
            type_space,
            race_policy: OnceCell::new(),
            config,
        })
    }

    /// Validate `config` and publish the model
    ///
    /// Fails with [`HeaderError::AlreadyInitialized`] on every call after the
    /// first successful one.
    pub fn install(config: HeaderConfig) -> Result<&'static ObjectModel> {
        config.validate()?;

        let mut created = false;
        let model = MODEL.get_or_try_init(|| {
            created = true;
            Self::new(config)
        })?;
        if !created {
            return Err(HeaderError::AlreadyInitialized);
        }

        if model.config.verbose {
            configure_logger(HeaderLoggerConfig {
                level: LogLevel::Trace,
                console: true,
                ..Default::default()
            });
        }

        log::info!(
            "object model initialized: compressed types={}, compressed refs={}, alignment={}",
            model.config.compressed_type_pointers,
            model.config.compressed_references,
            model.config.object_alignment
        );
        log_event(HeaderEvent::ModelInitialized {
            compressed_type_pointers: model.config.compressed_type_pointers,
            compressed_references: model.config.compressed_references,
            object_alignment: model.config.object_alignment,
        });

        Ok(model)
    }

    /// The installed model; fatal before [`crate::init_with_config`]
    #[inline]
    pub fn global() -> &'static ObjectModel {
        match MODEL.get() {
            Some(model) => model,
            None => crate::fatal!("object model used before initialization"),
        }
    }

    pub fn try_global() -> Result<&'static ObjectModel> {
        MODEL.get().ok_or(HeaderError::NotInitialized)
    }

    pub fn is_initialized() -> bool {
        MODEL.get().is_some()
    }

    #[inline]
    pub fn config(&self) -> &HeaderConfig {
        &self.config
    }

    #[inline]
    pub fn layout(&self) -> HeaderLayout {
        self.layout
    }

    #[inline]
    pub fn type_codec(&self) -> TypePointerCodec {
        self.type_codec
    }

    #[inline]
    pub fn reference_codec(&self) -> ReferenceCodec {
        self.reference_codec
    }

    /// Width of a reference slot in bytes
    #[inline]
    pub fn reference_bytes(&self) -> usize {
        self.reference_codec.slot_bytes()
    }

    pub fn type_space(&self) -> &TypeSpace {
        &self.type_space
    }

    // === Types ===

    /// Define a type into the type space
    pub fn define_type(&self, definition: TypeDefinition) -> Result<TypeRef> {
        let TypeDefinition {
            name,
            shape,
            super_type,
            sizing,
        } = definition;

        let (kind, layout, default_sizing): (TypeKind, LayoutHelper, Option<Box<dyn ObjectSizing>>) =
            match shape {
                Shape::Instance { field_bytes } => {
                    let size = self.instance_size_bytes(field_bytes);
                    if size > i32::MAX as usize {
                        return Err(HeaderError::InvalidArgument(format!(
                            "instance of {} bytes is too large",
                            size
                        )));
                    }
                    (
                        TypeKind::Instance,
                        LayoutHelper::instance(size, sizing.is_some()),
                        Some(Box::new(InstanceSizing::new(size)) as Box<dyn ObjectSizing>),
                    )
                },
                Shape::Array(element) => {
                    let kind = match element {
                        ElementKind::Object => TypeKind::ObjectArray,
                        primitive => TypeKind::PrimitiveArray(primitive),
                    };
                    (
                        kind,
                        LayoutHelper::array(
                            element,
                            element.log2_size(self.reference_bytes()),
                            self.layout.array_header_bytes(),
                        ),
                        Some(Box::new(ArraySizing::new(element)) as Box<dyn ObjectSizing>),
                    )
                },
                Shape::Irregular => (TypeKind::Irregular, LayoutHelper::NEUTRAL, None),
            };

        let sizing = match sizing.or(default_sizing) {
            Some(sizing) => sizing,
            None => {
                return Err(HeaderError::InvalidArgument(format!(
                    "type {} needs an explicit sizing",
                    name
                )))
            },
        };

        let ty = self
            .type_space
            .define(TypeDescriptor::new(name, kind, layout, super_type, sizing))?;

        if let TypePointerCodec::Compressed(codec) = self.type_codec {
            codec.try_encode(ty.address())?;
        }

        log::debug!("defined type {} at {:#x}: {:?}", ty.name(), ty.address(), layout);
        log_event(HeaderEvent::TypeDefined {
            name: ty.name().to_string(),
            address: ty.address(),
            layout_helper: layout.raw(),
        });

        Ok(ty)
    }

    /// Bytes an instance with `field_bytes` of fields occupies
    pub fn instance_size_bytes(&self, field_bytes: usize) -> usize {
        Alignment::align_up(HEADER_SIZE + field_bytes, self.config.object_alignment)
    }

    /// Bytes an array of `length` elements of `ty` occupies
    pub fn array_size_bytes(&self, ty: TypeRef, length: u32) -> usize {
        let layout = ty.layout_helper();
        crate::assert_context!(layout.is_array(), "{} is not an array type", ty.name());
        Alignment::align_up(
            layout.array_header_bytes() + ((length as usize) << layout.log2_element_size()),
            self.config.object_alignment,
        )
    }

    // === Collector Hooks ===

    /// Install the policy consulted on array size mismatches
    ///
    /// Set once, by the collector at startup; a second call fails.
    pub fn install_race_policy(&self, policy: Arc<dyn CopyRacePolicy>) -> Result<()> {
        self.race_policy.set(policy).map_err(|_| {
            HeaderError::InvalidArgument("copy race policy already installed".to_string())
        })
    }

    /// The installed policy, or [`NeverTolerate`] before installation
    #[inline]
    pub fn race_policy(&self) -> &dyn CopyRacePolicy {
        match self.race_policy.get() {
            Some(policy) => policy.as_ref(),
            None => &NEVER_TOLERATE,
        }
    }
}

impl std::fmt::Debug for ObjectModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectModel")
            .field("layout", &self.layout)
            .field("type_codec", &self.type_codec)
            .field("reference_codec", &self.reference_codec)
            .field("types", &self.type_space.len())
            .finish()
    }
}
