//! Device-session state and the bounded, time-limited session store.

use chrono::{DateTime, Duration, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use crate::ecdh::{self, KeyPair, SharedSecret, PRIVATE_KEY_SIZE, PUBLIC_KEY_SIZE};
use crate::error::ProvisionError;
use crate::provision::crypto::{derive_session_keys, SessionKeys};

/// Default ceiling on concurrent handshakes.
pub const DEFAULT_CAPACITY: usize = 5000;

/// Default session lifetime in seconds.
pub const DEFAULT_TTL_SECS: i64 = 5 * 60;

/// Default interval of the expiry sweeper in seconds.
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 10;

/// Entropy drawn per session: 32 bytes of private-scalar seed plus the
/// 4-byte server nonce.
pub const SESSION_SEED_SIZE: usize = PRIVATE_KEY_SIZE + 4;

/// Session identifier: the raw device EUI as a big-endian integer.
pub fn session_id(r_dev_eui: &[u8; 8]) -> u64 {
    u64::from_be_bytes(*r_dev_eui)
}

/// In-progress handshake state for one device.
///
/// The ECDH material is fixed at creation. `dev_nonce` and the derived keys
/// are filled in exactly once when the Auth step runs; nothing else mutates.
#[derive(Debug, Clone)]
pub struct DeviceSession {
    pub r_dev_eui: [u8; 8],
    pub device_public_key: [u8; PUBLIC_KEY_SIZE],
    pub server_keypair: KeyPair,
    pub server_nonce: [u8; 4],
    /// Zero until the device presents its nonce during Auth.
    pub dev_nonce: [u8; 4],
    pub shared_secret: SharedSecret,
    /// Derived lazily on the first Auth frame.
    pub keys: Option<SessionKeys>,
    pub expires_at: DateTime<Utc>,
}

impl DeviceSession {
    pub fn server_public_key(&self) -> &[u8; PUBLIC_KEY_SIZE] {
        &self.server_keypair.public
    }
}

type SeedSource = Box<dyn Fn() -> [u8; SESSION_SEED_SIZE] + Send + Sync>;

fn os_seed() -> [u8; SESSION_SEED_SIZE] {
    let mut seed = [0u8; SESSION_SEED_SIZE];
    OsRng.fill_bytes(&mut seed);
    seed
}

/// Bounded, TTL'd cache of in-progress handshakes, keyed by session id.
///
/// Lookups do not check expiry: a session that has outlived its TTL keeps
/// working until the sweeper removes it, giving retransmissions a grace
/// period instead of a hard cutoff.
pub struct SessionStore {
    sessions: Mutex<HashMap<u64, DeviceSession>>,
    capacity: usize,
    ttl: Duration,
    seed_source: SeedSource,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, Duration::seconds(DEFAULT_TTL_SECS))
    }
}

impl SessionStore {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self::with_seed_source(capacity, ttl, Box::new(os_seed))
    }

    /// Store with an injected entropy source; tests use this to pin the
    /// server key material.
    pub fn with_seed_source(capacity: usize, ttl: Duration, seed_source: SeedSource) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            capacity,
            ttl,
            seed_source,
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<u64, DeviceSession>> {
        self.sessions.lock().expect("session store lock poisoned")
    }

    /// Create a session for a new handshake.
    ///
    /// Fails with `CapacityExceeded` when the store is full (checked first,
    /// no side effects) and with `KeyAgreement` when the entropy draw is
    /// degenerate or the device public key is not a valid curve point; in
    /// every failure case the map is left untouched.
    pub fn create(
        &self,
        id: u64,
        r_dev_eui: [u8; 8],
        device_public_key: [u8; PUBLIC_KEY_SIZE],
        now: DateTime<Utc>,
    ) -> Result<DeviceSession, ProvisionError> {
        let mut sessions = self.lock();

        if sessions.len() >= self.capacity {
            warn!(
                "Maximum number ({}) of device provisioning sessions reached. Request dropped.",
                self.capacity
            );
            return Err(ProvisionError::CapacityExceeded);
        }

        let seed = (self.seed_source)();
        let server_keypair = ecdh::generate_keypair(&seed[..PRIVATE_KEY_SIZE])
            .ok_or(ProvisionError::KeyAgreement("degenerate server key entropy"))?;
        let shared_secret = ecdh::shared_secret(&server_keypair.private, &device_public_key)
            .ok_or(ProvisionError::KeyAgreement(
                "device public key is not a valid curve point",
            ))?;

        let mut server_nonce = [0u8; 4];
        server_nonce.copy_from_slice(&seed[PRIVATE_KEY_SIZE..]);

        let session = DeviceSession {
            r_dev_eui,
            device_public_key,
            server_keypair,
            server_nonce,
            dev_nonce: [0u8; 4],
            shared_secret,
            keys: None,
            expires_at: now + self.ttl,
        };
        sessions.insert(id, session.clone());
        debug!("Created device session {:016X}", id);

        Ok(session)
    }

    /// Look up a session. Logical expiry is not checked here; only the
    /// sweeper removes entries.
    pub fn get(&self, id: u64) -> Option<DeviceSession> {
        self.lock().get(&id).cloned()
    }

    /// Derive and cache the session keys if they are not set yet, returning
    /// the up-to-date session.
    pub fn ensure_keys(&self, id: u64) -> Option<DeviceSession> {
        let mut sessions = self.lock();
        let session = sessions.get_mut(&id)?;
        if session.keys.is_none() {
            session.keys = Some(derive_session_keys(&session.shared_secret, &session.r_dev_eui));
        }
        Some(session.clone())
    }

    /// Record the device nonce once the Auth step verifies. The keys are
    /// derived here as well if an Auth somehow raced past `ensure_keys`.
    pub fn authorize(&self, id: u64, dev_nonce: [u8; 4]) -> Option<DeviceSession> {
        let mut sessions = self.lock();
        let session = sessions.get_mut(&id)?;
        if session.keys.is_none() {
            session.keys = Some(derive_session_keys(&session.shared_secret, &session.r_dev_eui));
        }
        session.dev_nonce = dev_nonce;
        Some(session.clone())
    }

    /// Drop every session whose deadline has passed.
    pub fn sweep(&self, now: DateTime<Utc>) {
        let mut sessions = self.lock();
        let before = sessions.len();
        sessions.retain(|_, session| session.expires_at >= now);

        let removed = before - sessions.len();
        if removed > 0 {
            debug!("Removed {} expired device provisioning session(s)", removed);
        }
    }

    /// Spawn the background sweeper; it runs for the life of the process.
    pub fn spawn_sweeper(self: Arc<Self>, interval: std::time::Duration) {
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                self.sweep(Utc::now());
            }
        });
    }
}
