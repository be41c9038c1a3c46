//! Segment padding.
//!
//! Data is zero-padded up to a whole number of stripes. The last four bytes
//! of the padding hold its own length (big-endian), so the padding is never
//! empty.

/// Bytes used to store the padding length.
pub const PADDING_LEN_SIZE: usize = 4;

/// Padding to append after `data_len` bytes for stripes of `stripe_size`.
#[must_use]
pub fn make_padding(data_len: u64, stripe_size: usize) -> Vec<u8> {
    let stripe = stripe_size as u64;
    let amount = data_len + PADDING_LEN_SIZE as u64;
    let mut len = PADDING_LEN_SIZE as u64;
    let rem = amount % stripe;
    if rem > 0 {
        len += stripe - rem;
    }
    // Bounded by stripe_size + 4.
    let len = len as usize;
    let mut padding = vec![0u8; len];
    padding[len - PADDING_LEN_SIZE..].copy_from_slice(&(len as u32).to_be_bytes());
    padding
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pads_to_stripe_boundary() {
        for data_len in 0..200u64 {
            let padding = make_padding(data_len, 48);
            let total = data_len as usize + padding.len();
            assert_eq!(total % 48, 0, "data_len {data_len}");
            assert!(padding.len() >= PADDING_LEN_SIZE);
            assert!(padding.len() < 48 + PADDING_LEN_SIZE);
        }
    }

    #[test]
    fn trailer_holds_padding_length() {
        for data_len in [0u64, 11, 12, 13, 37] {
            let padding = make_padding(data_len, 16);
            let trailer: [u8; PADDING_LEN_SIZE] =
                padding[padding.len() - PADDING_LEN_SIZE..].try_into().unwrap();
            assert_eq!(u32::from_be_bytes(trailer) as usize, padding.len());
        }
    }
}
