//! Directory of provisionable devices.
//!
//! The canonical directory lives in the provisioning service; the handshake
//! only needs hash resolution, expressed here as a narrow async interface so
//! a remote client and the in-memory test double are interchangeable.

use async_trait::async_trait;
use std::collections::HashMap;

/// What the handshake needs to know about a provisionable device.
#[derive(Debug, Clone)]
pub struct DeviceRecord {
    /// Human-assigned provisioning identity; input to the verify code.
    pub provision_id: String,
    /// Identity hash the device presents during Auth. Opaque key material
    /// issued together with the provision id.
    pub provision_id_hash: [u8; 32],
    /// DevEUI assigned to the device on acceptance.
    pub dev_eui: [u8; 8],
    /// AppEUI assigned to the device on acceptance.
    pub app_eui: [u8; 8],
    /// Disabled devices are refused before the verify-code check.
    pub disabled: bool,
    /// Non-empty when the device is already registered to another server;
    /// provisioning is then refused.
    pub server: String,
}

impl DeviceRecord {
    /// Whether this device may be provisioned right now.
    pub fn provisionable(&self) -> bool {
        !self.disabled && self.server.is_empty()
    }
}

/// Resolves a provision-ID hash to a device record.
#[async_trait]
pub trait DeviceDirectory: Send + Sync {
    async fn find_by_id_hash(&self, hash: &[u8; 32]) -> anyhow::Result<Option<DeviceRecord>>;
}

/// Directory backed by a fixed in-memory list; used by the simulator and the
/// test-suite.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    devices: HashMap<[u8; 32], DeviceRecord>,
}

impl InMemoryDirectory {
    pub fn new(records: impl IntoIterator<Item = DeviceRecord>) -> Self {
        Self {
            devices: records
                .into_iter()
                .map(|record| (record.provision_id_hash, record))
                .collect(),
        }
    }
}

#[async_trait]
impl DeviceDirectory for InMemoryDirectory {
    async fn find_by_id_hash(&self, hash: &[u8; 32]) -> anyhow::Result<Option<DeviceRecord>> {
        Ok(self.devices.get(hash).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(hash_byte: u8) -> DeviceRecord {
        DeviceRecord {
            provision_id: "TESTPID0000000000001".to_string(),
            provision_id_hash: [hash_byte; 32],
            dev_eui: [0x24, 0x62, 0xab, 0xff, 0xfe, 0xdd, 0xc7, 0x10],
            app_eui: [0u8; 8],
            disabled: false,
            server: String::new(),
        }
    }

    #[tokio::test]
    async fn lookup_by_hash() {
        let directory = InMemoryDirectory::new([record(0x11), record(0x22)]);

        let found = directory
            .find_by_id_hash(&[0x11; 32])
            .await
            .expect("lookup")
            .expect("record exists");
        assert_eq!(found.provision_id_hash, [0x11; 32]);

        assert!(directory
            .find_by_id_hash(&[0x33; 32])
            .await
            .expect("lookup")
            .is_none());
    }

    #[test]
    fn provisionable_rules() {
        let mut device = record(0x11);
        assert!(device.provisionable());

        device.disabled = true;
        assert!(!device.provisionable());

        device.disabled = false;
        device.server = "sn-dev.local".to_string();
        assert!(!device.provisionable());
    }
}
