//! Deterministic pod colors

use klogs_types::DisplayColor;

/// Seed for the identity hash; changing it reshuffles every pod's color
const COLOR_SEED: u32 = 1337;

/// Lowest channel value, keeps colors readable on dark terminals
const CHANNEL_BASE: u32 = 192;

/// Number of distinct values per channel
const CHANNEL_SPAN: u32 = 64;

/// Pick the display color for a pod uid.
///
/// Same uid, same color. Every channel lands in `192..=255`.
pub fn color_for(uid: &str) -> DisplayColor {
    let hash = murmur2(uid.as_bytes(), COLOR_SEED);
    let channel = |divisor: u32| (CHANNEL_BASE + (hash / divisor) % CHANNEL_SPAN) as u8;

    DisplayColor::new(
        channel(1),
        channel(CHANNEL_SPAN),
        channel(CHANNEL_SPAN * CHANNEL_SPAN),
    )
}

/// 32-bit MurmurHash2
fn murmur2(data: &[u8], seed: u32) -> u32 {
    const M: u32 = 0x5bd1_e995;
    const R: u32 = 24;

    let mut h = seed ^ data.len() as u32;

    let mut chunks = data.chunks_exact(4);
    for chunk in &mut chunks {
        let mut k = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        k = k.wrapping_mul(M);
        k ^= k >> R;
        k = k.wrapping_mul(M);

        h = h.wrapping_mul(M);
        h ^= k;
    }

    let tail = chunks.remainder();
    if !tail.is_empty() {
        for (i, byte) in tail.iter().enumerate() {
            h ^= u32::from(*byte) << (8 * i);
        }
        h = h.wrapping_mul(M);
    }

    h ^= h >> 13;
    h = h.wrapping_mul(M);
    h ^= h >> 15;
    h
}

#[cfg(test)]
mod tests {
    use super::*;

    fn in_range(color: DisplayColor) -> bool {
        [color.red, color.green, color.blue]
            .iter()
            .all(|c| (192..=255).contains(c))
    }

    #[test]
    fn test_murmur2_reference_values() {
        assert_eq!(murmur2(b"", 0), 0);
        assert_eq!(murmur2(b"", 1), 0x5bd1_5e36);
        assert_eq!(murmur2(b"hello", 0), 0xe561_29cb);
        assert_eq!(murmur2(b"abc123", COLOR_SEED), 0xd4d3_094b);
    }

    #[test]
    fn test_color_is_deterministic() {
        let uid = "5f6e2b0c-9a1d-4c36-8d1b-2f0c8e7a9b10";
        assert_eq!(color_for(uid), color_for(uid));
        assert_eq!(color_for("abc123"), DisplayColor::new(203, 229, 240));
    }

    #[test]
    fn test_channels_are_pastel() {
        for uid in ["", "a", "abc123", "0123456789abcdef", "ü-multibyte-ü"] {
            assert!(in_range(color_for(uid)), "{uid} out of range");
        }
    }

    #[test]
    fn test_channels_derive_from_one_hash() {
        let hash = murmur2(b"abc123", COLOR_SEED);
        let color = color_for("abc123");
        assert_eq!(u32::from(color.red), 192 + hash % 64);
        assert_eq!(u32::from(color.green), 192 + (hash / 64) % 64);
        assert_eq!(u32::from(color.blue), 192 + (hash / 4096) % 64);
    }

    #[test]
    fn test_different_pods_usually_differ() {
        let a = color_for("pod-a-uid");
        let b = color_for("pod-b-uid");
        let c = color_for("pod-c-uid");
        assert!(a != b || b != c);
    }
}
