//! Symmetric primitives of the handshake: session-key derivation, the
//! auth-payload cipher, and the CMAC codes proving possession of the
//! provisioning secret.

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use aes::Aes128;
use cmac::{Cmac, Mac};
use std::sync::OnceLock;

use crate::ecdh::SharedSecret;

/// AES-128 key size; every derived key is one block.
pub const SESSION_KEY_SIZE: usize = 16;

/// Direction of an auth payload, selecting the keystream flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Uplink,
    Downlink,
}

/// The symmetric keys derived from one ECDH exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionKeys {
    /// Application root key handed to the joining device.
    pub app_key: [u8; SESSION_KEY_SIZE],
    /// Network root key handed to the joining device.
    pub nwk_key: [u8; SESSION_KEY_SIZE],
    /// Provisioning key protecting the Auth exchange itself.
    pub prov_key: [u8; SESSION_KEY_SIZE],
}

/// Derive the AppKey / NwkKey / ProvKey for a session.
///
/// Each key is one AES-ECB block used as a PRF: the plaintext block is
/// filled with a per-key tag byte with the device EUI copied over the front
/// (`r_dev_eui` followed by eight tag bytes), and the AES key is carved out
/// of the shared-secret coordinates.
pub fn derive_session_keys(shared: &SharedSecret, r_dev_eui: &[u8; 8]) -> SessionKeys {
    let mut prov_aes_key = [0u8; SESSION_KEY_SIZE];
    prov_aes_key[..8].copy_from_slice(&shared[16..24]);
    prov_aes_key[8..].copy_from_slice(&shared[48..56]);

    SessionKeys {
        app_key: derive_one(&shared[0..16], 0x01, r_dev_eui),
        nwk_key: derive_one(&shared[32..48], 0x02, r_dev_eui),
        prov_key: derive_one(&prov_aes_key, 0x03, r_dev_eui),
    }
}

fn derive_one(aes_key: &[u8], tag: u8, r_dev_eui: &[u8; 8]) -> [u8; SESSION_KEY_SIZE] {
    let cipher = Aes128::new(GenericArray::from_slice(aes_key));

    let mut block = [tag; SESSION_KEY_SIZE];
    block[..8].copy_from_slice(r_dev_eui);

    let mut ga = GenericArray::clone_from_slice(&block);
    cipher.encrypt_block(&mut ga);
    block.copy_from_slice(&ga);
    block
}

/// Encrypt or decrypt an auth payload.
///
/// AES counter construction: block `i` (1-based) of the payload is XORed
/// with `AES(prov_key, [0x02, 0,0,0,0, dir, r_dev_eui(8), 0, i])`, where
/// `dir` is 0 for uplink and 1 for downlink; a short final block truncates
/// the keystream. Applying it twice with the same key, EUI and direction
/// restores the input.
pub fn encrypt_auth_payload(
    payload: &[u8],
    prov_key: &[u8; SESSION_KEY_SIZE],
    r_dev_eui: &[u8; 8],
    direction: Direction,
) -> Vec<u8> {
    let cipher = Aes128::new(GenericArray::from_slice(prov_key));

    let mut counter_block = [0u8; 16];
    counter_block[0] = 0x02;
    counter_block[5] = match direction {
        Direction::Uplink => 0,
        Direction::Downlink => 1,
    };
    counter_block[6..14].copy_from_slice(r_dev_eui);

    let mut out = payload.to_vec();
    for (index, chunk) in out.chunks_mut(16).enumerate() {
        counter_block[15] = (index + 1) as u8;

        let mut keystream = GenericArray::clone_from_slice(&counter_block);
        cipher.encrypt_block(&mut keystream);

        for (byte, key) in chunk.iter_mut().zip(keystream.iter()) {
            *byte ^= key;
        }
    }
    out
}

// The CMAC key below ships inside the binary, AES-wrapped with a second
// compiled-in constant and unwrapped once per process. This keeps the raw
// key bytes out of a strings dump and nothing more: it is obfuscation of a
// shipped constant, not a security boundary.
const WRAPPED_CMAC_KEY: [u8; 16] = [
    0x8f, 0x1d, 0x62, 0xb7, 0x0c, 0xe9, 0x44, 0x21, 0xd3, 0x5a, 0x97, 0x6e, 0xba, 0x08, 0x4d,
    0xf0,
];
const KEY_WRAPPING_KEY: [u8; 16] = [
    0x27, 0xc4, 0x9b, 0x58, 0xe1, 0x3f, 0x76, 0xaa, 0x12, 0x85, 0xd0, 0x4b, 0x6c, 0xf9, 0x3e,
    0x91,
];

fn fixed_key() -> &'static [u8; 16] {
    static KEY: OnceLock<[u8; 16]> = OnceLock::new();
    KEY.get_or_init(|| {
        let cipher = Aes128::new(GenericArray::from_slice(&KEY_WRAPPING_KEY));
        let mut block = GenericArray::clone_from_slice(&WRAPPED_CMAC_KEY);
        cipher.decrypt_block(&mut block);
        let mut key = [0u8; 16];
        key.copy_from_slice(&block);
        key
    })
}

/// Verification code over a provisioning identity and a 4-byte nonce:
/// CMAC-AES128 of `provision_id || nonce` under the fixed key.
pub fn verify_code(provision_id: &str, nonce: &[u8; 4]) -> [u8; 16] {
    let mut mac = <Cmac<Aes128> as Mac>::new(GenericArray::from_slice(fixed_key()));
    mac.update(provision_id.as_bytes());
    mac.update(nonce);

    let tag = mac.finalize().into_bytes();
    let mut out = [0u8; 16];
    out.copy_from_slice(&tag);
    out
}

/// Four-byte MIC attached to outbound proprietary frames: the leading bytes
/// of CMAC-AES128 over `0xE0 || mac_payload` under the fixed key.
pub fn proprietary_mic(mac_payload: &[u8]) -> [u8; 4] {
    let mut mac = <Cmac<Aes128> as Mac>::new(GenericArray::from_slice(fixed_key()));
    mac.update(&[0xe0]);
    mac.update(mac_payload);

    let tag = mac.finalize().into_bytes();
    let mut out = [0u8; 4];
    out.copy_from_slice(&tag[..4]);
    out
}
