//! Seed set content hash

/// Jenkins one-at-a-time hash over a seed buffer
pub fn seed_hash(seeds: &[u8]) -> u32 {
    let mut value: u32 = 0;
    for &byte in seeds {
        value = value.wrapping_add(u32::from(byte));
        value = value.wrapping_add(value << 10);
        value ^= value >> 6;
    }
    value = value.wrapping_add(value << 3);
    value ^= value >> 11;
    value.wrapping_add(value << 15)
}
