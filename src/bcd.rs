// This library is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This library is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this library.  If not, see <http://www.gnu.org/licenses/>.
//! Binary-coded decimal helpers for RTC registers.

/// Pack a value in 0..=99 as two BCD nibbles.
#[inline]
#[must_use]
pub const fn encode(value: u8) -> u8 {
    ((value / 10) << 4) | (value % 10)
}

/// Unpack two BCD nibbles.  Callers mask off any flag bits first.
#[inline]
#[must_use]
pub const fn decode(bcd: u8) -> u8 {
    ((bcd & 0b1111_0000) >> 4) * 10 + (bcd & 0b0000_1111)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_digits_into_nibbles() {
        assert_eq!(encode(0), 0x00);
        assert_eq!(encode(9), 0x09);
        assert_eq!(encode(10), 0x10);
        assert_eq!(encode(59), 0x59);
        assert_eq!(encode(99), 0x99);
    }

    #[test]
    fn decodes_every_two_digit_value() {
        for v in 0..=99 {
            assert_eq!(decode(encode(v)), v);
        }
    }
}
