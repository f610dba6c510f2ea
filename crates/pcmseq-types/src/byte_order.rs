//! Byte-order codec for stored 16-bit and 32-bit fields.
//!
//! PCM_SEQ2 stores every integer little-endian. Instead of compiling two
//! code paths, a handle resolves one [`ByteOrderPolicy`] up front and routes
//! each field and sample through it. Conversion is an involution: applying
//! it twice yields the original value.

/// Order of bytes within a multi-byte integer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ByteOrder {
    #[default]
    Little,
    Big,
}

impl ByteOrder {
    /// Byte order of the host this binary was built for.
    pub const NATIVE: Self = if cfg!(target_endian = "big") {
        Self::Big
    } else {
        Self::Little
    };
}

/// Conversion policy between stored byte order and host order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ByteOrderPolicy {
    stored: ByteOrder,
}

impl Default for ByteOrderPolicy {
    fn default() -> Self {
        Self::PCM_SEQ2
    }
}

impl ByteOrderPolicy {
    /// The order every PCM_SEQ2 producer writes.
    pub const PCM_SEQ2: Self = Self {
        stored: ByteOrder::Little,
    };

    /// Policy for an arbitrary stored order. Files are always read and
    /// written with [`Self::PCM_SEQ2`].
    #[cfg(test)]
    const fn new(stored: ByteOrder) -> Self {
        Self { stored }
    }

    #[must_use]
    pub const fn stored(self) -> ByteOrder {
        self.stored
    }

    /// Whether stored values must be byte-swapped on this host.
    #[must_use]
    pub const fn needs_swap(self) -> bool {
        !matches!(
            (self.stored, ByteOrder::NATIVE),
            (ByteOrder::Little, ByteOrder::Little) | (ByteOrder::Big, ByteOrder::Big)
        )
    }

    #[inline]
    #[must_use]
    pub const fn convert_u16(self, value: u16) -> u16 {
        if self.needs_swap() {
            value.swap_bytes()
        } else {
            value
        }
    }

    #[inline]
    #[must_use]
    pub const fn convert_u32(self, value: u32) -> u32 {
        if self.needs_swap() {
            value.swap_bytes()
        } else {
            value
        }
    }

    /// Convert a run of samples in place.
    pub fn convert_i16_slice(self, samples: &mut [i16]) {
        if self.needs_swap() {
            for sample in samples.iter_mut() {
                *sample = sample.swap_bytes();
            }
        }
    }

    #[inline]
    #[must_use]
    pub fn read_u16(self, src: &[u8]) -> Option<u16> {
        let raw = u16::from_ne_bytes(src.get(..2)?.try_into().ok()?);
        Some(self.convert_u16(raw))
    }

    #[inline]
    #[must_use]
    pub fn read_u32(self, src: &[u8]) -> Option<u32> {
        let raw = u32::from_ne_bytes(src.get(..4)?.try_into().ok()?);
        Some(self.convert_u32(raw))
    }

    #[inline]
    #[must_use]
    pub fn read_i32(self, src: &[u8]) -> Option<i32> {
        self.read_u32(src).map(|value| value as i32)
    }

    /// Decode stored sample bytes into `dst`.
    ///
    /// Decodes `min(src.len() / 2, dst.len())` samples and returns that count.
    pub fn decode_samples(self, src: &[u8], dst: &mut [i16]) -> usize {
        let count = (src.len() / 2).min(dst.len());
        for (sample, pair) in dst.iter_mut().zip(src.chunks_exact(2)).take(count) {
            *sample = i16::from_ne_bytes([pair[0], pair[1]]);
        }
        self.convert_i16_slice(&mut dst[..count]);
        count
    }

    /// Append the stored encoding of `samples` to `out`.
    pub fn encode_samples(self, samples: &[i16], out: &mut Vec<u8>) {
        out.reserve(samples.len() * 2);
        for &sample in samples {
            let stored = self.convert_u16(sample as u16);
            out.extend_from_slice(&stored.to_ne_bytes());
        }
    }
}
