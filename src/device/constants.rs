use uuid::Uuid;

/**
 * Advertised local name of the peripheral to connect to.
 */
pub const TARGET_DEVICE_NAME: &str = "ESP32-CAM-Data";

/**
 * The UUID of the GATT service exposing the vitals characteristic.
 */
pub const VITALS_SERVICE: Uuid = Uuid::from_u128(0x4fafc201_1fb5_459e_8fcc_c5c9c331914b);

/**
 * The UUID of the characteristic that notifies "<temperature>,<heartRate>" strings.
 */
pub const VITALS_DATA_CHARACTERISTIC: Uuid = Uuid::from_u128(0xbeb5483e_36e1_4688_b7f5_ea07361b26a8);

/**
 * Client Characteristic Configuration Descriptor (0x2902 on the Bluetooth base UUID).
 */
pub const CLIENT_CHARACTERISTIC_CONFIGURATION: Uuid = Uuid::from_u128(0x00002902_0000_1000_8000_00805f9b34fb);

pub const ENABLE_NOTIFICATION_VALUE: [u8; 2] = [0x01, 0x00];

/**
 * How long (seconds) discovery runs before it is reported as finished.
 */
pub const DEFAULT_SCAN_TIMEOUT: u64 = 40;

/**
 * How long (milliseconds) a disconnect request may take.
 */
pub const DISCONNECT_DEADLINE: u64 = 2000;

/**
 * Capacity of the channels between the transport, the session and the gui.
 */
pub const EVENT_CHANNEL_SIZE: usize = 64;

/// The fixed identity of the peripheral this application talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetIdentity {
    pub device_name: &'static str,
    pub service: Uuid,
    pub characteristic: Uuid,
}

pub const TARGET: TargetIdentity = TargetIdentity {
    device_name: TARGET_DEVICE_NAME,
    service: VITALS_SERVICE,
    characteristic: VITALS_DATA_CHARACTERISTIC,
};
