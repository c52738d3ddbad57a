//! Sensirion CRC-8 used to protect every 16-bit word in a sensor frame.
//!
//! Polynomial `0x31` (x^8 + x^5 + x^4 + 1), initial value `0xFF`, MSB first,
//! no final XOR.

const CRC8_POLYNOMIAL: u8 = 0x31;
const CRC8_INIT: u8 = 0xFF;

/// Compute the CRC-8 over `data`.
///
/// Sensor frames only ever feed a single 2-byte word through this, but the
/// algorithm itself is defined for any length.
pub const fn crc8(data: &[u8]) -> u8 {
    let mut crc = CRC8_INIT;
    let mut i = 0;
    while i < data.len() {
        crc ^= data[i];
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x80 != 0 {
                (crc << 1) ^ CRC8_POLYNOMIAL
            } else {
                crc << 1
            };
            bit += 1;
        }
        i += 1;
    }
    crc
}

/// CRC of a big-endian 16-bit word, as it appears on the wire.
#[inline]
pub const fn word_crc(word: u16) -> u8 {
    crc8(&word.to_be_bytes())
}
