//! Common utility helpers shared across models

/// Size of one sector in bytes. Extent geometry is always expressed in sectors.
pub const SECTOR_SIZE: u64 = 512;

/// Round `value` up to the next multiple of `alignment`.
///
/// An alignment of zero leaves the value untouched.
pub fn align_up(value: u64, alignment: u64) -> u64 {
    if alignment == 0 {
        return value;
    }
    value.div_ceil(alignment).saturating_mul(alignment)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Render a byte count as megabytes with two decimals, falling back to
/// kilobytes when the megabyte value rounds to zero.
///
/// `157286400` renders as `150MB`, `12288` as `12KB`.
pub fn bytes_to_pretty(bytes: u64) -> String {
    let mb = round2(bytes as f64 / 1024.0 / 1024.0);
    if mb == 0.0 {
        let kb = round2(bytes as f64 / 1024.0);
        format!("{kb}KB")
    } else {
        format!("{mb}MB")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn align_up_rounds_to_boundary() {
        assert_eq!(align_up(0, 4096), 0);
        assert_eq!(align_up(1, 4096), 4096);
        assert_eq!(align_up(4096, 4096), 4096);
        assert_eq!(align_up(4097, 4096), 8192);
        assert_eq!(align_up(17, 0), 17);
    }

    #[test]
    fn pretty_prefers_megabytes() {
        assert_eq!(bytes_to_pretty(150 * 1024 * 1024), "150MB");
        assert_eq!(bytes_to_pretty(1024 * 1024 + 512 * 1024), "1.5MB");
    }

    #[test]
    fn pretty_falls_back_to_kilobytes() {
        assert_eq!(bytes_to_pretty(12 * 1024), "12KB");
        assert_eq!(bytes_to_pretty(0), "0KB");
    }
}
