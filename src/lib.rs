//! LoRaWAN device-provisioning handshake engine.
//!
//! Factory-fresh devices bootstrap onto the network through a two-step
//! challenge-response protocol carried in proprietary LoRaWAN frames:
//!
//! 1. **Hello**: the device presents its public key; the server answers
//!    with its own key and a nonce, and both sides agree on a shared secret
//!    over the K-233 binary Koblitz curve ([`ecdh`]).
//! 2. **Auth**: the device proves possession of its provisioning secret
//!    with a CMAC verify code inside an AES-counter-encrypted payload; the
//!    server answers with the device's assigned identity and root keys
//!    ([`provision`]).
//!
//! In-progress handshakes live in a bounded, TTL'd session store swept by a
//! background task. The gateway transport and the network-server dispatch
//! are external collaborators reached through narrow interfaces
//! ([`provision::DownlinkDispatcher`],
//! [`provision::directory::DeviceDirectory`]).

pub mod config;
pub mod ecdh;
pub mod error;
pub mod provision;
