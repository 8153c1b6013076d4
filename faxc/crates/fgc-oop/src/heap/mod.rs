//! Heap Module - Backing Regions
//!
//! Two reserved regions back the header layer:
//! - [`TypeSpace`] hosts type descriptors and provides the stable base for
//!   compressed type pointers.
//! - [`Arena`] is a bump region standing in for the heap collaborator. It
//!   supplies the heap base for compressed references and object storage for
//!   tests, benches and embedders without a heap of their own.
//!
//! Both are anonymous mappings created through `memmap2`, sized in whole
//! pages.

pub mod arena;
pub mod type_space;

pub use arena::Arena;
pub use type_space::TypeSpace;

/// System page size
pub fn page_size() -> usize {
    page_size::get()
}

/// Round `size` up to a whole number of pages
pub fn align_to_page(size: usize) -> usize {
    crate::util::Alignment::align_up(size.max(1), page_size())
}
