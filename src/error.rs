//! Failure modes of the provisioning engine.

use thiserror::Error;

/// Everything that can go wrong while handling a provisioning frame.
///
/// Frames that are merely not provisioning messages are not errors: the
/// handler reports them unprocessed so other proprietary-channel consumers
/// can claim them.
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// The session store is at capacity. The triggering Hello is dropped
    /// but reported processed, so the uplink path does not amplify
    /// retransmission storms.
    #[error("maximum number of device provisioning sessions reached")]
    CapacityExceeded,

    /// Key-pair generation or shared-secret computation failed. The frame
    /// is abandoned; the next retransmission retries with fresh entropy.
    #[error("key agreement failed: {0}")]
    KeyAgreement(&'static str),

    /// The uplink carried no RX records, leaving no gateway to respond
    /// through.
    #[error("no gateway heard the uplink")]
    MissingGatewayContext,

    /// The provisioning directory has no device for the presented hash.
    #[error("no device with provision id hash {0}")]
    UnknownDevice(String),

    /// The directory lookup itself failed.
    #[error("device directory lookup failed")]
    Directory(#[source] anyhow::Error),

    /// Handing the downlink to the network server failed. The engine does
    /// not retry; the session stays intact for the next retransmission.
    #[error("downlink dispatch failed")]
    Dispatch(#[source] anyhow::Error),
}
