//! Relocate Module - Collector-Side Relocation Support
//!
//! - `forwarding` - the Forwarding Protocol on the mark word
//! - `copy` - evacuation of one object through that protocol
//!
//! Choosing what to move, where, and when belongs to the collector.

pub mod copy;
pub mod forwarding;

pub use copy::{CopyStats, ObjectCopier};
pub use forwarding::ForwardResult;
