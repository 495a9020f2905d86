//! The device-provisioning handshake.
//!
//! Devices bootstrap over two proprietary LoRaWAN exchanges: a Hello that
//! establishes an ECDH session with the server, and an Auth that proves
//! possession of the provisioning secret and hands the device its assigned
//! identity. The handler here parses inbound proprietary frames, drives
//! that state machine against the session store, and emits delayed
//! downlink requests toward the network server.

pub mod crypto;
pub mod directory;
pub mod frames;
pub mod session;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::ProvisionError;
use crypto::{encrypt_auth_payload, proprietary_mic, verify_code, Direction};
use directory::DeviceDirectory;
use frames::{
    build_auth_accept, build_auth_reject, build_hello_response, AuthRequest, DownlinkRequest,
    HelloRequest, Message, RxMetadata, UplinkFrame, ACCEPT_PAYLOAD_SIZE, DOWNLINK_DATARATE,
    DOWNLINK_DELAY,
};
use session::{session_id, SessionStore};

/// Delivery of a downlink request to the network server. Fire-and-forget:
/// the engine never retries a failed send.
#[async_trait]
pub trait DownlinkDispatcher: Send + Sync {
    async fn send_downlink(&self, request: DownlinkRequest) -> anyhow::Result<()>;
}

/// What to do when the Auth verify code does not match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMismatchPolicy {
    /// Answer with the Auth-reject frame.
    #[default]
    Reject,
    /// Drop the frame without a response.
    Drop,
}

/// Drives the Hello/Auth handshake. One instance serves every device; the
/// surrounding uplink layer may call [`handle_uplink`](Self::handle_uplink)
/// concurrently.
pub struct ProvisionHandler {
    store: Arc<SessionStore>,
    directory: Arc<dyn DeviceDirectory>,
    dispatcher: Arc<dyn DownlinkDispatcher>,
    mismatch_policy: AuthMismatchPolicy,
}

impl ProvisionHandler {
    pub fn new(
        store: Arc<SessionStore>,
        directory: Arc<dyn DeviceDirectory>,
        dispatcher: Arc<dyn DownlinkDispatcher>,
    ) -> Self {
        Self {
            store,
            directory,
            dispatcher,
            mismatch_policy: AuthMismatchPolicy::default(),
        }
    }

    pub fn with_mismatch_policy(mut self, policy: AuthMismatchPolicy) -> Self {
        self.mismatch_policy = policy;
        self
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// Handle one proprietary uplink.
    ///
    /// Returns whether the frame was consumed. Frames that are not
    /// provisioning messages come back `Ok(false)` untouched so other
    /// proprietary-channel consumers can claim them.
    pub async fn handle_uplink(&self, uplink: &UplinkFrame) -> Result<bool, ProvisionError> {
        let gateway = select_gateway(&uplink.rx_info)?;
        debug!(
            "Proprietary uplink via gateway {} (rssi {}), mic {}",
            hex::encode(gateway.gateway_id),
            gateway.rssi,
            hex::encode(uplink.mic)
        );

        let message = match Message::parse(&uplink.mac_payload) {
            Some(message) => message,
            None => {
                debug!("Unknown proprietary message, leaving frame unprocessed");
                return Ok(false);
            }
        };
        debug!("{}", message);

        match message {
            Message::Hello(hello) => match self.handle_hello(&hello, uplink, gateway).await {
                // A full store drops the Hello but reports it processed so
                // the uplink path does not amplify retransmission storms.
                Err(ProvisionError::CapacityExceeded) => Ok(true),
                Err(err) => Err(err),
                Ok(()) => Ok(true),
            },
            Message::Auth(auth) => self.handle_auth(&auth, uplink, gateway).await,
        }
    }

    /// Hello: find or create the ECDH session and answer with the server
    /// public key and nonce. Retransmissions hit the stored session and get
    /// a byte-identical response.
    async fn handle_hello(
        &self,
        hello: &HelloRequest,
        uplink: &UplinkFrame,
        gateway: &RxMetadata,
    ) -> Result<(), ProvisionError> {
        let id = session_id(&hello.r_dev_eui);

        let session = match self.store.get(id) {
            Some(existing) => existing,
            None => {
                debug!("Creating session {:016X}", id);
                self.store
                    .create(id, hello.r_dev_eui, hello.device_public_key, Utc::now())?
            }
        };

        let mac_payload = build_hello_response(
            &session.r_dev_eui,
            session.server_public_key(),
            &session.server_nonce,
        );
        self.dispatch(mac_payload, uplink, gateway).await
    }

    /// Auth: decrypt the payload, check the verify code against the
    /// provisioning directory, and answer with accept or reject.
    async fn handle_auth(
        &self,
        auth: &AuthRequest,
        uplink: &UplinkFrame,
        gateway: &RxMetadata,
    ) -> Result<bool, ProvisionError> {
        let id = session_id(&auth.r_dev_eui);

        // The device must Hello first; without a session the frame stays
        // unprocessed.
        let Some(session) = self.store.ensure_keys(id) else {
            debug!("Auth message without an active session, frame left unprocessed");
            return Ok(false);
        };
        let Some(keys) = session.keys else {
            return Ok(false);
        };

        let plain = encrypt_auth_payload(
            &auth.encrypted_payload,
            &keys.prov_key,
            &auth.r_dev_eui,
            Direction::Uplink,
        );
        let mut provision_id_hash = [0u8; 32];
        provision_id_hash.copy_from_slice(&plain[0..32]);
        let mut presented_code = [0u8; 16];
        presented_code.copy_from_slice(&plain[32..48]);
        let mut dev_nonce = [0u8; 4];
        dev_nonce.copy_from_slice(&plain[48..52]);

        let record = self
            .directory
            .find_by_id_hash(&provision_id_hash)
            .await
            .map_err(ProvisionError::Directory)?
            .ok_or_else(|| ProvisionError::UnknownDevice(hex::encode(provision_id_hash)))?;

        let mut accepted = true;
        if record.disabled {
            warn!("Device {} is disabled, auth refused", record.provision_id);
            accepted = false;
        } else if !record.server.is_empty() {
            warn!(
                "Device {} already registered to {}, provisioning not allowed",
                record.provision_id, record.server
            );
            accepted = false;
        }

        if accepted {
            let expected = verify_code(&record.provision_id, &session.server_nonce);
            if expected != presented_code {
                warn!("Incorrect verify code from device {}", record.provision_id);
                match self.mismatch_policy {
                    AuthMismatchPolicy::Drop => return Ok(true),
                    AuthMismatchPolicy::Reject => accepted = false,
                }
            }
        }

        let mac_payload = if accepted {
            let Some(session) = self.store.authorize(id, dev_nonce) else {
                // Swept while we were verifying; the device will retry.
                return Ok(false);
            };
            info!("Device {} authenticated", record.provision_id);

            let mut accept_payload = [0u8; ACCEPT_PAYLOAD_SIZE];
            accept_payload[..8].copy_from_slice(&record.dev_eui);
            accept_payload[8..16].copy_from_slice(&record.app_eui);
            accept_payload[16..]
                .copy_from_slice(&verify_code(&record.provision_id, &session.dev_nonce));

            let encrypted = encrypt_auth_payload(
                &accept_payload,
                &keys.prov_key,
                &auth.r_dev_eui,
                Direction::Downlink,
            );
            let mut fixed = [0u8; ACCEPT_PAYLOAD_SIZE];
            fixed.copy_from_slice(&encrypted);
            build_auth_accept(&auth.r_dev_eui, &fixed)
        } else {
            build_auth_reject(&auth.r_dev_eui)
        };

        self.dispatch(mac_payload, uplink, gateway).await?;
        Ok(true)
    }

    /// Wrap a response payload into a downlink request aimed at the chosen
    /// gateway and hand it to the dispatcher.
    async fn dispatch(
        &self,
        mac_payload: Vec<u8>,
        uplink: &UplinkFrame,
        gateway: &RxMetadata,
    ) -> Result<(), ProvisionError> {
        let mic = proprietary_mic(&mac_payload);
        let request = DownlinkRequest {
            mac_payload,
            gateway_id: gateway.gateway_id,
            frequency: uplink.frequency,
            datarate: DOWNLINK_DATARATE,
            delay: DOWNLINK_DELAY,
            context: gateway.context.clone(),
            mic,
            polarization_inversion: true,
        };

        info!(
            "Sending proprietary downlink to gateway {}",
            hex::encode(request.gateway_id)
        );
        self.dispatcher
            .send_downlink(request)
            .await
            .map_err(ProvisionError::Dispatch)
    }
}

/// Pick the gateway with the numerically highest RSSI; ties go to the first
/// occurrence. No RX records means there is nothing to respond through.
fn select_gateway(rx_info: &[RxMetadata]) -> Result<&RxMetadata, ProvisionError> {
    let mut best: Option<&RxMetadata> = None;
    for rx in rx_info {
        match best {
            Some(current) if rx.rssi <= current.rssi => {}
            _ => best = Some(rx),
        }
    }
    best.ok_or(ProvisionError::MissingGatewayContext)
}
