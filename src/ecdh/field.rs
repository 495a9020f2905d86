//! GF(2^233) binary-field arithmetic.
//!
//! Field elements are binary polynomials held in a fixed array of 32-bit
//! words, least-significant word first, with a few guard bits above degree
//! 233 for intermediate results during reduction. All operations borrow
//! their inputs and return new values; nothing mutates in place.

/// Degree of the field extension (NIST K-233).
pub const CURVE_DEGREE: usize = 233;

/// Guard bits above the field degree for intermediate products.
const MARGIN: usize = 3;

/// 32-bit words per element.
pub(crate) const NUM_WORDS: usize = (CURVE_DEGREE + MARGIN + 31) / 32;

/// Serialized element size in bytes.
pub const ELEMENT_SIZE: usize = NUM_WORDS * 4;

/// Reduction polynomial for K-233: x^233 + x^74 + 1.
const POLYNOMIAL: BitVector = BitVector::from_words([
    0x0000_0001,
    0x0000_0000,
    0x0000_0400,
    0x0000_0000,
    0x0000_0000,
    0x0000_0000,
    0x0000_0000,
    0x0000_0200,
]);

/// An element of GF(2^233).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BitVector([u32; NUM_WORDS]);

impl BitVector {
    pub const ZERO: Self = Self([0; NUM_WORDS]);
    pub const ONE: Self = Self([1, 0, 0, 0, 0, 0, 0, 0]);

    pub(crate) const fn from_words(words: [u32; NUM_WORDS]) -> Self {
        Self(words)
    }

    /// Value of the bit at `idx` (0 or 1).
    pub fn bit(&self, idx: usize) -> u32 {
        (self.0[idx / 32] >> (idx & 31)) & 1
    }

    pub fn clear_bit(&mut self, idx: usize) {
        self.0[idx / 32] &= !(1 << (idx & 31));
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&w| w == 0)
    }

    pub fn is_one(&self) -> bool {
        self.0[0] == 1 && self.0[1..].iter().all(|&w| w == 0)
    }

    /// Index of the highest set bit plus one; zero for the zero element.
    pub fn degree(&self) -> usize {
        for (i, &word) in self.0.iter().enumerate().rev() {
            if word != 0 {
                return i * 32 + (32 - word.leading_zeros() as usize);
            }
        }
        0
    }

    /// Left shift by `nbits`; bits shifted past the top word are dropped.
    pub fn shl(&self, nbits: usize) -> Self {
        let nwords = nbits / 32;
        let mut out = [0u32; NUM_WORDS];
        for i in nwords..NUM_WORDS {
            out[i] = self.0[i - nwords];
        }
        let rem = nbits & 31;
        if rem != 0 {
            for i in (1..NUM_WORDS).rev() {
                out[i] = (out[i] << rem) | (out[i - 1] >> (32 - rem));
            }
            out[0] <<= rem;
        }
        Self(out)
    }

    /// Field addition is carry-less, so XOR.
    pub fn add(&self, other: &Self) -> Self {
        let mut out = [0u32; NUM_WORDS];
        for (i, word) in out.iter_mut().enumerate() {
            *word = self.0[i] ^ other.0[i];
        }
        Self(out)
    }

    /// Field multiplication: shift-and-add, reducing by the K-233 trinomial
    /// whenever the running partial product reaches degree 233.
    pub fn mul(&self, other: &Self) -> Self {
        let mut shifted = *self;
        let mut out = if other.bit(0) != 0 { *self } else { Self::ZERO };

        for i in 1..CURVE_DEGREE {
            shifted = shifted.shl(1);
            if shifted.bit(CURVE_DEGREE) == 1 {
                shifted = shifted.add(&POLYNOMIAL);
            }
            if other.bit(i) == 1 {
                out = out.add(&shifted);
            }
        }
        out
    }

    /// Multiplicative inverse via the binary extended Euclidean algorithm.
    ///
    /// The zero element has no inverse; callers guard against it.
    pub fn invert(&self) -> Self {
        debug_assert!(!self.is_zero());

        let mut u = *self;
        let mut v = POLYNOMIAL;
        let mut g = Self::ZERO;
        let mut z = Self::ONE;

        while !u.is_one() {
            let mut diff = u.degree() as isize - v.degree() as isize;
            if diff < 0 {
                std::mem::swap(&mut u, &mut v);
                std::mem::swap(&mut z, &mut g);
                diff = -diff;
            }
            let shift = diff as usize;
            u = u.add(&v.shl(shift));
            z = z.add(&g.shl(shift));
        }
        z
    }

    /// Deserialize from per-word little-endian bytes.
    pub fn from_bytes(bytes: &[u8; ELEMENT_SIZE]) -> Self {
        let mut words = [0u32; NUM_WORDS];
        for (i, word) in words.iter_mut().enumerate() {
            let offset = i * 4;
            *word = u32::from_le_bytes([
                bytes[offset],
                bytes[offset + 1],
                bytes[offset + 2],
                bytes[offset + 3],
            ]);
        }
        Self(words)
    }

    /// Serialize to per-word little-endian bytes.
    pub fn to_bytes(&self) -> [u8; ELEMENT_SIZE] {
        let mut out = [0u8; ELEMENT_SIZE];
        for (i, word) in self.0.iter().enumerate() {
            out[i * 4..i * 4 + 4].copy_from_slice(&word.to_le_bytes());
        }
        out
    }
}
