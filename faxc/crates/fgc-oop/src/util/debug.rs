//! Debug Utilities
//!
//! Formatting helpers used by fatal messages and log records.

use crate::object::{MarkState, MarkWord};

/// Debug formatter for memory addresses
pub fn format_address(address: usize) -> String {
    format!("0x{:016X}", address)
}

/// One-line description of a mark word snapshot
pub fn describe_mark(mark: MarkWord) -> String {
    match mark.decode() {
        MarkState::Unhashed { age } => format!("unlocked(age={})", age),
        MarkState::Hashed { hash, age } => format!("unlocked(hash={:#x}, age={})", hash, age),
        MarkState::Locked { record, kind } => {
            format!("locked({:?}, record={})", kind, format_address(record))
        },
        MarkState::Forwarded(target) => format!("forwarded({:?})", target),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_address() {
        assert_eq!(format_address(0x1000), "0x0000000000001000");
    }

    #[test]
    fn test_describe_mark() {
        assert_eq!(describe_mark(MarkWord::prototype()), "unlocked(age=0)");
        let hashed = MarkWord::prototype().with_hash(0x2a);
        assert!(describe_mark(hashed).contains("hash=0x2a"));
    }
}
