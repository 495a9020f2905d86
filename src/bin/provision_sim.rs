//! Provisioning Handshake Simulator
//!
//! Plays the device side of the Hello/Auth handshake against an in-process
//! engine: no radio, no network server, just the protocol. Useful for
//! checking the full exchange (ECDH, key derivation, payload cipher,
//! verify codes) without hardware.
//!
//! Usage: cargo run --bin provision-sim -- [options]

use clap::Parser;
use rand::rngs::OsRng;
use rand::RngCore;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::info;
use tracing_subscriber::EnvFilter;

use lora_provision::config::Config;
use lora_provision::ecdh;
use lora_provision::provision::crypto::{
    derive_session_keys, encrypt_auth_payload, verify_code, Direction, SessionKeys,
};
use lora_provision::provision::directory::{DeviceRecord, InMemoryDirectory};
use lora_provision::provision::frames::{
    DownlinkRequest, RxMetadata, UplinkFrame, ACCEPT_PAYLOAD_SIZE, AUTH_PAYLOAD_SIZE,
    DOWN_AUTH_ACCEPT, DOWN_AUTH_REJECT, DOWN_HELLO_RESP, UP_AUTH, UP_HELLO,
};
use lora_provision::provision::session::SessionStore;
use lora_provision::provision::{DownlinkDispatcher, ProvisionHandler};

#[derive(Parser)]
#[command(name = "provision-sim")]
#[command(about = "Simulates a device running the provisioning handshake")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Device EUI (16 hex chars)
    #[arg(long, default_value = "818283fffe848586")]
    dev_eui: String,

    /// Provisioning identity of the simulated device
    #[arg(long, default_value = "SIMDEVICE00000000001")]
    provision_id: String,

    /// Send a garbage verify code to exercise the reject path
    #[arg(long)]
    bad_code: bool,
}

/// Captures downlinks in place of a network-server connection, so the
/// simulated device can read them back.
#[derive(Default)]
struct LoopbackDispatcher {
    last: Mutex<Option<DownlinkRequest>>,
}

impl LoopbackDispatcher {
    fn take(&self) -> Option<DownlinkRequest> {
        self.last.lock().unwrap().take()
    }
}

#[async_trait::async_trait]
impl DownlinkDispatcher for LoopbackDispatcher {
    async fn send_downlink(&self, request: DownlinkRequest) -> anyhow::Result<()> {
        info!(
            "Downlink for gateway {}: {} bytes after {:?}",
            hex::encode(request.gateway_id),
            request.mac_payload.len(),
            request.delay
        );
        *self.last.lock().unwrap() = Some(request);
        Ok(())
    }
}

fn parse_eui(input: &str) -> anyhow::Result<[u8; 8]> {
    let bytes = hex::decode(input)?;
    let mut eui = [0u8; 8];
    if bytes.len() != eui.len() {
        anyhow::bail!("Device EUI must be 8 bytes, got {}", bytes.len());
    }
    eui.copy_from_slice(&bytes);
    Ok(eui)
}

/// Generate the device key pair, retrying until the entropy is usable.
fn device_keypair() -> ecdh::KeyPair {
    loop {
        let mut seed = [0u8; 32];
        OsRng.fill_bytes(&mut seed);
        if let Some(pair) = ecdh::generate_keypair(&seed) {
            return pair;
        }
    }
}

fn rx_metadata() -> Vec<RxMetadata> {
    // Two gateways heard the uplink; the stronger one gets the response.
    vec![
        RxMetadata {
            gateway_id: [0xAA, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01],
            rssi: -95,
            context: vec![0x00; 6],
        },
        RxMetadata {
            gateway_id: [0xBB, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x02],
            rssi: -48,
            context: vec![0x01; 6],
        },
    ]
}

fn uplink(mac_payload: Vec<u8>) -> UplinkFrame {
    UplinkFrame {
        mac_payload,
        mic: [0u8; 4],
        rx_info: rx_metadata(),
        frequency: 868_100_000,
    }
}

fn build_hello(r_dev_eui: &[u8; 8], public_key: &[u8; 64]) -> Vec<u8> {
    let mut payload = vec![UP_HELLO];
    payload.extend_from_slice(r_dev_eui);
    payload.extend_from_slice(public_key);
    payload.push(0x01); // frame version
    payload
}

fn build_auth(
    r_dev_eui: &[u8; 8],
    keys: &SessionKeys,
    id_hash: &[u8; 32],
    code: &[u8; 16],
    dev_nonce: &[u8; 4],
) -> Vec<u8> {
    let mut plain = [0u8; AUTH_PAYLOAD_SIZE];
    plain[..32].copy_from_slice(id_hash);
    plain[32..48].copy_from_slice(code);
    plain[48..].copy_from_slice(dev_nonce);
    let encrypted = encrypt_auth_payload(&plain, &keys.prov_key, r_dev_eui, Direction::Uplink);

    let mut payload = vec![UP_AUTH];
    payload.extend_from_slice(r_dev_eui);
    payload.extend_from_slice(&encrypted);
    payload
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Config::load(&cli.config).unwrap_or_else(|e| {
        eprintln!("Warning: Failed to load config from {:?}: {}", cli.config, e);
        eprintln!("Using default configuration");
        Config::default()
    });

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .init();

    let r_dev_eui = parse_eui(&cli.dev_eui)?;

    println!("📡 Provisioning Handshake Simulator");
    println!("══════════════════════════════════════════");
    println!("  Device EUI:   {}", hex::encode(r_dev_eui));
    println!("  Provision ID: {}", cli.provision_id);
    println!("══════════════════════════════════════════");
    println!();

    // The directory issues the device an opaque identity hash alongside the
    // provision id; the simulator invents one for both sides.
    let mut id_hash = [0u8; 32];
    OsRng.fill_bytes(&mut id_hash);

    let directory = InMemoryDirectory::new([DeviceRecord {
        provision_id: cli.provision_id.clone(),
        provision_id_hash: id_hash,
        dev_eui: [0x24, 0x62, 0xab, 0xff, 0xfe, 0x00, 0x10, 0x01],
        app_eui: [0u8; 8],
        disabled: false,
        server: String::new(),
    }]);

    let store = Arc::new(SessionStore::new(
        config.provision.max_sessions,
        chrono::Duration::seconds(config.provision.session_ttl_secs),
    ));
    store.clone().spawn_sweeper(std::time::Duration::from_secs(
        config.provision.sweep_interval_secs,
    ));

    let dispatcher = Arc::new(LoopbackDispatcher::default());
    let handler = ProvisionHandler::new(store, Arc::new(directory), dispatcher.clone())
        .with_mismatch_policy(config.provision.on_auth_mismatch);

    // ── Hello ────────────────────────────────────────────────────────
    let device_keys = device_keypair();
    let hello = build_hello(&r_dev_eui, &device_keys.public);
    println!("➡️  Hello ({} bytes)", hello.len());

    let processed = handler.handle_uplink(&uplink(hello)).await?;
    anyhow::ensure!(processed, "Hello frame was not processed");

    let response = dispatcher
        .take()
        .ok_or_else(|| anyhow::anyhow!("No Hello response captured"))?;
    let payload = &response.mac_payload;
    anyhow::ensure!(
        payload.len() == 77 && payload[0] == DOWN_HELLO_RESP,
        "Unexpected Hello response"
    );

    let mut server_public = [0u8; 64];
    server_public.copy_from_slice(&payload[9..73]);
    let mut server_nonce = [0u8; 4];
    server_nonce.copy_from_slice(&payload[73..]);

    println!("⬅️  Hello response via gateway {}", hex::encode(response.gateway_id));
    println!("    server nonce: {}", hex::encode(server_nonce));

    // The device derives the same keys from its side of the exchange.
    let shared = ecdh::shared_secret(&device_keys.private, &server_public)
        .ok_or_else(|| anyhow::anyhow!("Server public key rejected"))?;
    let session_keys = derive_session_keys(&shared, &r_dev_eui);
    println!("    appKey:  {}", hex::encode(session_keys.app_key));
    println!("    nwkKey:  {}", hex::encode(session_keys.nwk_key));
    println!();

    // ── Auth ─────────────────────────────────────────────────────────
    let code = if cli.bad_code {
        [0xFF; 16]
    } else {
        verify_code(&cli.provision_id, &server_nonce)
    };
    let mut dev_nonce = [0u8; 4];
    OsRng.fill_bytes(&mut dev_nonce);

    let auth = build_auth(&r_dev_eui, &session_keys, &id_hash, &code, &dev_nonce);
    println!("➡️  Auth ({} bytes)", auth.len());

    let processed = handler.handle_uplink(&uplink(auth)).await?;
    anyhow::ensure!(processed, "Auth frame was not processed");

    match dispatcher.take() {
        Some(response) if response.mac_payload[0] == DOWN_AUTH_ACCEPT => {
            let mut encrypted = [0u8; ACCEPT_PAYLOAD_SIZE];
            encrypted.copy_from_slice(&response.mac_payload[9..]);
            let plain = encrypt_auth_payload(
                &encrypted,
                &session_keys.prov_key,
                &r_dev_eui,
                Direction::Downlink,
            );

            let expected = verify_code(&cli.provision_id, &dev_nonce);
            anyhow::ensure!(plain[16..] == expected, "Server verify code mismatch");

            println!("⬅️  Auth accept");
            println!("    assigned DevEUI: {}", hex::encode(&plain[..8]));
            println!("    assigned AppEUI: {}", hex::encode(&plain[8..16]));
            println!();
            println!("✅ Handshake complete");
        }
        Some(response) if response.mac_payload[0] == DOWN_AUTH_REJECT => {
            println!("⬅️  Auth reject");
        }
        Some(_) => anyhow::bail!("Unexpected Auth response frame"),
        None => println!("(no Auth response, frame dropped)"),
    }

    Ok(())
}
