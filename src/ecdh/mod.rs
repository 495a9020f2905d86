//! Elliptic-Curve Diffie-Hellman over the NIST K-233 Koblitz curve.
//!
//! Crypto over curves defined on the finite binary field GF(2^m), m prime.
//! The anomalous binary (Koblitz) curves yield compact arithmetic; K-233 /
//! sect233k1 gives roughly 112-bit strength. The field and point routines
//! are derived from the public-domain tiny-ECDH-c implementation, and the
//! recorded vectors in the test module pin the serialization bit-for-bit so
//! both ends of a handshake agree on the byte form of every coordinate.

pub mod field;
pub mod point;

use field::BitVector;
use point::Point;

/// Private scalar size in bytes.
pub const PRIVATE_KEY_SIZE: usize = 32;

/// Serialized public-point size: two field coordinates.
pub const PUBLIC_KEY_SIZE: usize = 2 * PRIVATE_KEY_SIZE;

/// K-233 base point, x coordinate.
const BASE_X: BitVector = BitVector::from_words([
    0xefad_6126,
    0x0a4c_9d6e,
    0x19c2_6bf5,
    0x1495_63a4,
    0x29f2_2ff4,
    0x7e73_1af1,
    0x32ba_853a,
    0x0000_0172,
]);

/// K-233 base point, y coordinate.
const BASE_Y: BitVector = BitVector::from_words([
    0x56fa_e6a3,
    0x56e0_c110,
    0xf18a_eb9b,
    0x27a8_cd9b,
    0x555a_67c4,
    0x19b7_f70f,
    0x537d_ece8,
    0x0000_01db,
]);

/// Order of the base-point group.
const BASE_ORDER: BitVector = BitVector::from_words([
    0xf173_abdf,
    0x6efb_1ad5,
    0xb915_bcd4,
    0x0006_9d5b,
    0x0000_0000,
    0x0000_0000,
    0x0000_0000,
    0x0000_0080,
]);

/// The generator point G.
pub(crate) fn base_point() -> Point {
    Point::new(BASE_X, BASE_Y)
}

/// An ECDH key pair: the clamped private scalar and the serialized public
/// point (x coordinate followed by y, each 32 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyPair {
    pub private: [u8; PRIVATE_KEY_SIZE],
    pub public: [u8; PUBLIC_KEY_SIZE],
}

/// Serialized coordinates of the shared point `private * PeerPublic`.
pub type SharedSecret = [u8; PUBLIC_KEY_SIZE];

fn serialize_point(point: &Point) -> [u8; PUBLIC_KEY_SIZE] {
    let mut out = [0u8; PUBLIC_KEY_SIZE];
    out[..PRIVATE_KEY_SIZE].copy_from_slice(&point.x.to_bytes());
    out[PRIVATE_KEY_SIZE..].copy_from_slice(&point.y.to_bytes());
    out
}

/// Build a key pair from caller-supplied entropy.
///
/// The first 32 bytes of `seed` become the private scalar, clamped below the
/// base-point order. Returns `None` when the entropy is degenerate (scalar
/// degree under half the curve degree, or a public point at infinity); the
/// caller retries with fresh entropy.
pub fn generate_keypair(seed: &[u8]) -> Option<KeyPair> {
    let mut private = [0u8; PRIVATE_KEY_SIZE];
    let take = seed.len().min(PRIVATE_KEY_SIZE);
    private[..take].copy_from_slice(&seed[..take]);

    let mut scalar = BitVector::from_bytes(&private);
    if scalar.degree() < field::CURVE_DEGREE / 2 {
        return None;
    }

    // Constrain 1 <= scalar < n by clearing every bit from the order's top
    // bit upward.
    for idx in (BASE_ORDER.degree() - 1)..(field::ELEMENT_SIZE * 8) {
        scalar.clear_bit(idx);
    }

    let public = base_point().mul(&scalar);
    if public.is_infinity() {
        return None;
    }

    Some(KeyPair {
        private: scalar.to_bytes(),
        public: serialize_point(&public),
    })
}

/// Compute the shared secret `private * PeerPublic`.
///
/// The peer point is validated (non-zero and on the curve) before the
/// multiplication; `None` means the peer key is unusable. Both sides of an
/// exchange derive identical bytes.
pub fn shared_secret(
    private: &[u8; PRIVATE_KEY_SIZE],
    peer_public: &[u8; PUBLIC_KEY_SIZE],
) -> Option<SharedSecret> {
    let mut x = [0u8; field::ELEMENT_SIZE];
    let mut y = [0u8; field::ELEMENT_SIZE];
    x.copy_from_slice(&peer_public[..PRIVATE_KEY_SIZE]);
    y.copy_from_slice(&peer_public[PRIVATE_KEY_SIZE..]);

    let peer = Point::new(BitVector::from_bytes(&x), BitVector::from_bytes(&y));
    if peer.is_infinity() || !peer.is_on_curve() {
        return None;
    }

    let scalar = BitVector::from_bytes(private);
    Some(serialize_point(&peer.mul(&scalar)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PRIVATE_ONES: [u8; PRIVATE_KEY_SIZE] = [
        0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01,
        0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01,
        0x01, 0x00, 0x00, 0x00,
    ];

    const PUBLIC_ONES: [u8; PUBLIC_KEY_SIZE] = [
        0xF5, 0xDD, 0xD2, 0xC7, 0x04, 0x92, 0xE0, 0xD6, 0xF2, 0x1F, 0x8D, 0xEC, 0xE0, 0x2D,
        0x0A, 0xAF, 0x75, 0x64, 0x78, 0xE1, 0x02, 0x09, 0x72, 0x75, 0x19, 0x5A, 0xFB, 0x9B,
        0xB8, 0x01, 0x00, 0x00, 0xB3, 0x29, 0x00, 0x02, 0x9A, 0xB4, 0xD6, 0x84, 0x1C, 0xC5,
        0x2B, 0x51, 0x72, 0xEE, 0x2F, 0x3C, 0x5A, 0x66, 0xBC, 0x6F, 0x03, 0x25, 0x3A, 0x92,
        0x43, 0x9E, 0x14, 0x2F, 0x82, 0x00, 0x00, 0x00,
    ];

    const PUBLIC_TWOS: [u8; PUBLIC_KEY_SIZE] = [
        0x0E, 0x4B, 0xDF, 0x93, 0x45, 0xCA, 0x7E, 0x6B, 0x4F, 0x68, 0x18, 0x81, 0x6E, 0x7E,
        0x83, 0xD3, 0xE0, 0x72, 0x30, 0x2E, 0xAF, 0x01, 0x1D, 0xA3, 0xD8, 0xE9, 0x4F, 0xBC,
        0x28, 0x01, 0x00, 0x00, 0x6A, 0x98, 0x6A, 0x39, 0xE6, 0xC9, 0x75, 0x4D, 0x35, 0xB0,
        0x88, 0xF5, 0x4D, 0x8B, 0xE8, 0x02, 0x2F, 0xD1, 0xBD, 0xBD, 0x41, 0x47, 0x69, 0x32,
        0x95, 0x81, 0x0D, 0x9A, 0xAD, 0x00, 0x00, 0x00,
    ];

    const SHARED: [u8; PUBLIC_KEY_SIZE] = [
        0x57, 0x57, 0x3A, 0x81, 0xE2, 0x7E, 0x48, 0x26, 0xFA, 0x8E, 0x18, 0x70, 0xCD, 0x6B,
        0x66, 0x40, 0xF3, 0x90, 0x5D, 0x98, 0x40, 0xF4, 0x12, 0xFA, 0xAE, 0x74, 0x0B, 0x12,
        0xE0, 0x01, 0x00, 0x00, 0xC4, 0xD8, 0x27, 0xA9, 0x37, 0x49, 0xEE, 0x44, 0xEA, 0x1B,
        0xAC, 0x1C, 0x18, 0x8C, 0x03, 0xAA, 0x6B, 0x02, 0xDA, 0x1C, 0x68, 0xE9, 0xE8, 0xE6,
        0xCA, 0xB9, 0xD1, 0xED, 0x91, 0x01, 0x00, 0x00,
    ];

    #[test]
    fn keypair_from_fixed_seed() {
        let pair = generate_keypair(&[0x01; 32]).expect("keypair");
        // Clamping clears everything from the order's top bit upward.
        assert_eq!(pair.private, PRIVATE_ONES);
        assert_eq!(pair.public, PUBLIC_ONES);

        let pair2 = generate_keypair(&[0x02; 32]).expect("keypair");
        assert_eq!(pair2.public, PUBLIC_TWOS);
    }

    #[test]
    fn degenerate_seed_is_rejected() {
        // Scalar degree below half the curve degree.
        let mut seed = [0u8; 32];
        seed[0] = 0x01;
        assert!(generate_keypair(&seed).is_none());
        assert!(generate_keypair(&[0u8; 32]).is_none());
    }

    #[test]
    fn shared_secret_commutes_and_matches_vector() {
        let alice = generate_keypair(&[0x01; 32]).expect("keypair");
        let bob = generate_keypair(&[0x02; 32]).expect("keypair");

        let from_alice = shared_secret(&alice.private, &bob.public).expect("shared");
        let from_bob = shared_secret(&bob.private, &alice.public).expect("shared");
        assert_eq!(from_alice, from_bob);
        assert_eq!(from_alice, SHARED);
    }

    #[test]
    fn shared_secret_commutes_for_other_seeds() {
        let alice = generate_keypair(&[0x5A; 32]).expect("keypair");
        let bob = generate_keypair(&[0x33; 32]).expect("keypair");

        let from_alice = shared_secret(&alice.private, &bob.public).expect("shared");
        let from_bob = shared_secret(&bob.private, &alice.public).expect("shared");
        assert_eq!(from_alice, from_bob);
    }

    #[test]
    fn invalid_peer_point_is_rejected() {
        let alice = generate_keypair(&[0x01; 32]).expect("keypair");

        // All-zero peer is the point at infinity.
        assert!(shared_secret(&alice.private, &[0u8; PUBLIC_KEY_SIZE]).is_none());

        // A corrupted coordinate falls off the curve.
        let mut off_curve = PUBLIC_TWOS;
        off_curve[0] ^= 0x01;
        assert!(shared_secret(&alice.private, &off_curve).is_none());
    }

    #[test]
    fn generated_public_keys_are_on_the_curve() {
        use super::field::BitVector;
        use super::point::Point;

        let pair = generate_keypair(&[0x07; 32]).expect("keypair");
        let mut x = [0u8; field::ELEMENT_SIZE];
        let mut y = [0u8; field::ELEMENT_SIZE];
        x.copy_from_slice(&pair.public[..PRIVATE_KEY_SIZE]);
        y.copy_from_slice(&pair.public[PRIVATE_KEY_SIZE..]);
        let point = Point::new(BitVector::from_bytes(&x), BitVector::from_bytes(&y));
        assert!(point.is_on_curve());
    }
}
