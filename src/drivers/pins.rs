//! Host-facing pin names.
//!
//! The host sends a pin name packed little-endian into a `u32`, e.g. `"D13"`
//! as `b"D13\0"`. Digital pins `D0..D67` map straight to logical ids, the
//! analog header `A0..A11` aliases `D54..D65`.

use crate::config::board::NUM_PINS;
use crate::rtos::action::PinId;

/// First digital pin of the analog header
const ANALOG_BASE: PinId = 54;
const NUM_ANALOG: u8 = 12;

/// Resolve a packed pin name. Case-insensitive; `None` for anything that is
/// not a wired logical pin.
pub fn pin_from_name(packed: u32) -> Option<PinId> {
    let bytes = packed.to_le_bytes();
    let len = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    let (prefix, digits) = bytes[..len].split_first()?;
    let number = parse_number(digits)?;

    match prefix.to_ascii_uppercase() {
        b'D' if (number as usize) < NUM_PINS => Some(number),
        b'A' if number < NUM_ANALOG => Some(ANALOG_BASE + number),
        _ => None,
    }
}

/// Pack a name the way the host does. Names longer than four bytes are cut.
pub fn pack_name(name: &str) -> u32 {
    let mut bytes = [0u8; 4];
    for (dst, src) in bytes.iter_mut().zip(name.bytes()) {
        *dst = src;
    }
    u32::from_le_bytes(bytes)
}

fn parse_number(digits: &[u8]) -> Option<u8> {
    if digits.is_empty() || digits.len() > 2 {
        return None;
    }
    digits.iter().try_fold(0u8, |acc, &d| {
        d.is_ascii_digit().then(|| acc * 10 + (d - b'0'))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(name: &str) -> Option<PinId> {
        pin_from_name(pack_name(name))
    }

    #[test]
    fn digital_pins() {
        assert_eq!(id("D0"), Some(0));
        assert_eq!(id("D13"), Some(13));
        assert_eq!(id("d67"), Some(67));
        assert_eq!(id("D68"), None);
    }

    #[test]
    fn analog_pins_alias_the_high_digital_range() {
        assert_eq!(id("A0"), Some(54));
        assert_eq!(id("a3"), Some(57));
        assert_eq!(id("A11"), Some(65));
        assert_eq!(id("A12"), None);
    }

    #[test]
    fn malformed_names() {
        for name in ["", "D", "X1", "D1x", "D123", "13"] {
            assert_eq!(id(name), None, "{name}");
        }
    }

    #[test]
    fn packing_matches_the_wire() {
        assert_eq!(pack_name("D13"), u32::from_le_bytes(*b"D13\0"));
    }
}
