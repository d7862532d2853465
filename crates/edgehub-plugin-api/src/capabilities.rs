//! Capability negotiation.
//!
//! A plugin advertises optional API surfaces through the `options` bit field
//! of its descriptor. Each bit is independently set; the host must never
//! invoke an operation gated by a bit the plugin did not claim. Bits the
//! host does not recognize are reserved for future capabilities and are
//! preserved but never interpreted.

use bitflags::bitflags;

bitflags! {
    /// Bit flags for plugin capabilities.
    ///
    /// The bit positions are part of the ABI and must not change.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
    pub struct Capabilities: u32 {
        /// Plugin exposes the common (generic table) storage operations.
        const COMMON = 0x0001;
        /// Plugin exposes the readings storage operations.
        const READINGS = 0x0002;
    }
}

impl Capabilities {
    /// Interpret a raw `options` bit field, keeping reserved bits.
    pub const fn from_options(options: u32) -> Self {
        Self::from_bits_retain(options)
    }

    /// Pure bit test: does this mask claim the given capability?
    pub const fn supports(&self, capability: Capabilities) -> bool {
        self.contains(capability)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bit_layout() {
        assert_eq!(Capabilities::COMMON.bits(), 0x0001);
        assert_eq!(Capabilities::READINGS.bits(), 0x0002);
    }

    #[test]
    fn test_supports_is_independent_of_other_bits() {
        for options in [0u32, 0x0001, 0x0002, 0x0003, 0x8001, 0xFFF0, 0xFFFF] {
            let caps = Capabilities::from_options(options);
            assert_eq!(caps.supports(Capabilities::COMMON), options & 0x0001 != 0);
            assert_eq!(caps.supports(Capabilities::READINGS), options & 0x0002 != 0);
        }
    }

    #[test]
    fn test_reserved_bits_are_preserved() {
        let caps = Capabilities::from_options(0x8003);
        assert_eq!(caps.bits(), 0x8003);
        assert!(caps.supports(Capabilities::COMMON));
        assert!(caps.supports(Capabilities::READINGS));
    }
}
