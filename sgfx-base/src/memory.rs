//! Alignment helpers. D3D11 constant buffers must be sized in multiples of 16 bytes, D3D12 constant
//! buffer views in multiples of 256, and texture upload rows are padded to a pitch alignment.

pub fn round_size_up_to_alignment_u32(
    size: u32,
    required_alignment: u32,
) -> u32 {
    assert!(required_alignment > 0, "alignment must be non-zero");
    let remainder = size % required_alignment;
    if remainder == 0 {
        size
    } else {
        size + (required_alignment - remainder)
    }
}

pub fn round_size_up_to_alignment_u64(
    size: u64,
    required_alignment: u64,
) -> u64 {
    assert!(required_alignment > 0, "alignment must be non-zero");
    let remainder = size % required_alignment;
    if remainder == 0 {
        size
    } else {
        size + (required_alignment - remainder)
    }
}

/// Byte pitch of one row of `width` texels, padded to `row_alignment`
pub fn aligned_row_pitch(
    width: u32,
    bytes_per_texel: u32,
    row_alignment: u32,
) -> u32 {
    round_size_up_to_alignment_u32(width * bytes_per_texel, row_alignment)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_up() {
        assert_eq!(round_size_up_to_alignment_u32(0, 16), 0);
        assert_eq!(round_size_up_to_alignment_u32(1, 16), 16);
        assert_eq!(round_size_up_to_alignment_u32(16, 16), 16);
        assert_eq!(round_size_up_to_alignment_u32(100, 16), 112);
        assert_eq!(round_size_up_to_alignment_u64(257, 256), 512);
        assert_eq!(round_size_up_to_alignment_u32(7, 3), 9);
    }

    #[test]
    fn test_row_pitch() {
        assert_eq!(aligned_row_pitch(3, 4, 256), 256);
        assert_eq!(aligned_row_pitch(64, 4, 256), 256);
        assert_eq!(aligned_row_pitch(65, 4, 256), 512);
    }

    #[test]
    #[should_panic(expected = "alignment must be non-zero")]
    fn test_zero_alignment() {
        round_size_up_to_alignment_u32(4, 0);
    }
}
