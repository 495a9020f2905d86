//! Codec for the proprietary provisioning frames.
//!
//! Frame layouts (sizes are exact, multi-byte fields big-endian):
//!
//! | Frame          | Type | Size | Layout                                          |
//! |----------------|------|------|-------------------------------------------------|
//! | Hello request  | 0x01 | 74   | type(1) eui(8) device_pubkey(64) version(1)     |
//! | Hello response | 0x81 | 77   | type(1) eui(8) server_pubkey(64) nonce(4)       |
//! | Auth request   | 0x11 | 61   | type(1) eui(8) encrypted(52)                    |
//! | Auth accept    | 0x91 | 41   | type(1) eui(8) encrypted(32)                    |
//! | Auth reject    | 0x92 | 9    | type(1) eui(8)                                  |

use bytes::{BufMut, BytesMut};
use std::fmt;
use std::time::Duration;

use crate::ecdh::PUBLIC_KEY_SIZE;

pub const UP_HELLO: u8 = 0x01;
pub const UP_AUTH: u8 = 0x11;
pub const DOWN_HELLO_RESP: u8 = 0x81;
pub const DOWN_AUTH_ACCEPT: u8 = 0x91;
pub const DOWN_AUTH_REJECT: u8 = 0x92;

pub const HELLO_REQUEST_SIZE: usize = 74;
pub const AUTH_REQUEST_SIZE: usize = 61;

/// Encrypted portion of the Auth request:
/// provision_id_hash(32) | verify_code(16) | dev_nonce(4).
pub const AUTH_PAYLOAD_SIZE: usize = 52;

/// Encrypted portion of the Auth accept:
/// dev_eui(8) | app_eui(8) | verify_code(16).
pub const ACCEPT_PAYLOAD_SIZE: usize = 32;

/// Every provisioning downlink is delivered after a fixed 5-second delay.
pub const DOWNLINK_DELAY: Duration = Duration::from_secs(5);

/// Datarate index used for provisioning downlinks.
pub const DOWNLINK_DATARATE: u8 = 3;

/// RX metadata for one gateway that heard an uplink.
#[derive(Debug, Clone)]
pub struct RxMetadata {
    pub gateway_id: [u8; 8],
    pub rssi: i32,
    /// Opaque gateway context, echoed back on the downlink.
    pub context: Vec<u8>,
}

/// A proprietary uplink as delivered by the gateway bridge. The LoRaWAN
/// frame MIC has already been validated upstream.
#[derive(Debug, Clone)]
pub struct UplinkFrame {
    pub mac_payload: Vec<u8>,
    pub mic: [u8; 4],
    pub rx_info: Vec<RxMetadata>,
    /// Uplink frequency in Hz.
    pub frequency: u32,
}

/// A delayed proprietary downlink handed to the network-server dispatcher.
#[derive(Debug, Clone)]
pub struct DownlinkRequest {
    pub mac_payload: Vec<u8>,
    pub gateway_id: [u8; 8],
    /// Mirrors the uplink frequency.
    pub frequency: u32,
    pub datarate: u8,
    pub delay: Duration,
    /// Context of the RX record the response is aimed at.
    pub context: Vec<u8>,
    pub mic: [u8; 4],
    /// Always true for provisioning downlinks.
    pub polarization_inversion: bool,
}

/// Hello request fields.
#[derive(Debug, Clone)]
pub struct HelloRequest {
    pub r_dev_eui: [u8; 8],
    pub device_public_key: [u8; PUBLIC_KEY_SIZE],
    pub frame_version: u8,
}

/// Auth request fields; the payload is still encrypted at parse time.
#[derive(Debug, Clone)]
pub struct AuthRequest {
    pub r_dev_eui: [u8; 8],
    pub encrypted_payload: [u8; AUTH_PAYLOAD_SIZE],
}

/// A recognized provisioning message.
#[derive(Debug, Clone)]
pub enum Message {
    Hello(HelloRequest),
    Auth(AuthRequest),
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Message::Hello(hello) => write!(
                f,
                "Hello rDevEui={} version={}",
                hex::encode(hello.r_dev_eui),
                hello.frame_version
            ),
            Message::Auth(auth) => {
                write!(f, "Auth rDevEui={}", hex::encode(auth.r_dev_eui))
            }
        }
    }
}

impl Message {
    /// Parse a proprietary mac payload.
    ///
    /// Returns `None` for every type/size combination that is not a
    /// provisioning message, so other proprietary-channel consumers (for
    /// example the gateway ping) can claim the frame.
    pub fn parse(mac_payload: &[u8]) -> Option<Self> {
        match (*mac_payload.first()?, mac_payload.len()) {
            (UP_HELLO, HELLO_REQUEST_SIZE) => {
                let mut r_dev_eui = [0u8; 8];
                r_dev_eui.copy_from_slice(&mac_payload[1..9]);
                let mut device_public_key = [0u8; PUBLIC_KEY_SIZE];
                device_public_key.copy_from_slice(&mac_payload[9..9 + PUBLIC_KEY_SIZE]);

                Some(Message::Hello(HelloRequest {
                    r_dev_eui,
                    device_public_key,
                    frame_version: mac_payload[HELLO_REQUEST_SIZE - 1],
                }))
            }
            (UP_AUTH, AUTH_REQUEST_SIZE) => {
                let mut r_dev_eui = [0u8; 8];
                r_dev_eui.copy_from_slice(&mac_payload[1..9]);
                let mut encrypted_payload = [0u8; AUTH_PAYLOAD_SIZE];
                encrypted_payload.copy_from_slice(&mac_payload[9..9 + AUTH_PAYLOAD_SIZE]);

                Some(Message::Auth(AuthRequest {
                    r_dev_eui,
                    encrypted_payload,
                }))
            }
            _ => None,
        }
    }
}

/// 77-byte Hello response: echoes the EUI, carries the server public key
/// and nonce.
pub fn build_hello_response(
    r_dev_eui: &[u8; 8],
    server_public_key: &[u8; PUBLIC_KEY_SIZE],
    server_nonce: &[u8; 4],
) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(1 + 8 + PUBLIC_KEY_SIZE + 4);
    buf.put_u8(DOWN_HELLO_RESP);
    buf.put_slice(r_dev_eui);
    buf.put_slice(server_public_key);
    buf.put_slice(server_nonce);
    buf.to_vec()
}

/// 41-byte Auth accept carrying the encrypted key material.
pub fn build_auth_accept(
    r_dev_eui: &[u8; 8],
    encrypted_payload: &[u8; ACCEPT_PAYLOAD_SIZE],
) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(1 + 8 + ACCEPT_PAYLOAD_SIZE);
    buf.put_u8(DOWN_AUTH_ACCEPT);
    buf.put_slice(r_dev_eui);
    buf.put_slice(encrypted_payload);
    buf.to_vec()
}

/// 9-byte Auth reject.
pub fn build_auth_reject(r_dev_eui: &[u8; 8]) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(1 + 8);
    buf.put_u8(DOWN_AUTH_REJECT);
    buf.put_slice(r_dev_eui);
    buf.to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    const R_DEV_EUI: [u8; 8] = [0x81, 0x82, 0x83, 0xff, 0xfe, 0x84, 0x85, 0x86];

    fn hello_payload() -> Vec<u8> {
        // type(1) | eui(8) | pubkey(64) | version(1) = 74
        let mut payload = vec![UP_HELLO];
        payload.extend_from_slice(&R_DEV_EUI);
        payload.extend_from_slice(&[0xAB; 64]);
        payload.push(0x01);
        payload
    }

    #[test]
    fn parses_hello_request() {
        let payload = hello_payload();
        assert_eq!(payload.len(), HELLO_REQUEST_SIZE);

        match Message::parse(&payload) {
            Some(Message::Hello(hello)) => {
                assert_eq!(hello.r_dev_eui, R_DEV_EUI);
                assert_eq!(hello.device_public_key, [0xAB; 64]);
                assert_eq!(hello.frame_version, 0x01);
            }
            other => panic!("expected Hello, got {:?}", other),
        }
    }

    #[test]
    fn parses_auth_request() {
        // type(1) | eui(8) | encrypted(52) = 61
        let mut payload = vec![UP_AUTH];
        payload.extend_from_slice(&R_DEV_EUI);
        payload.extend_from_slice(&[0xCD; AUTH_PAYLOAD_SIZE]);
        assert_eq!(payload.len(), AUTH_REQUEST_SIZE);

        match Message::parse(&payload) {
            Some(Message::Auth(auth)) => {
                assert_eq!(auth.r_dev_eui, R_DEV_EUI);
                assert_eq!(auth.encrypted_payload, [0xCD; AUTH_PAYLOAD_SIZE]);
            }
            other => panic!("expected Auth, got {:?}", other),
        }
    }

    #[test]
    fn wrong_sizes_are_not_recognized() {
        let mut short = hello_payload();
        short.pop();
        assert!(Message::parse(&short).is_none());

        let mut long = hello_payload();
        long.push(0x00);
        assert!(Message::parse(&long).is_none());

        // Auth type with Hello size and vice versa.
        let mut wrong_type = hello_payload();
        wrong_type[0] = UP_AUTH;
        assert!(Message::parse(&wrong_type).is_none());
    }

    #[test]
    fn unknown_types_are_not_recognized() {
        assert!(Message::parse(&[]).is_none());
        assert!(Message::parse(&[0x00, 0x02, 0x03, 0x04]).is_none());
        assert!(Message::parse(&[0xFF; HELLO_REQUEST_SIZE]).is_none());
    }

    #[test]
    fn hello_response_layout() {
        let frame = build_hello_response(&R_DEV_EUI, &[0x11; 64], &[1, 2, 3, 4]);

        assert_eq!(frame.len(), 77);
        assert_eq!(frame[0], DOWN_HELLO_RESP);
        assert_eq!(&frame[1..9], &R_DEV_EUI);
        assert_eq!(&frame[9..73], &[0x11; 64]);
        assert_eq!(&frame[73..], &[1, 2, 3, 4]);
    }

    #[test]
    fn auth_response_layouts() {
        let accept = build_auth_accept(&R_DEV_EUI, &[0x22; ACCEPT_PAYLOAD_SIZE]);
        assert_eq!(accept.len(), 41);
        assert_eq!(accept[0], DOWN_AUTH_ACCEPT);
        assert_eq!(&accept[1..9], &R_DEV_EUI);

        let reject = build_auth_reject(&R_DEV_EUI);
        assert_eq!(reject.len(), 9);
        assert_eq!(reject[0], DOWN_AUTH_REJECT);
        assert_eq!(&reject[1..], &R_DEV_EUI);
    }
}
