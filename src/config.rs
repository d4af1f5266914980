use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// The default port to listen for clients on.
pub const DEFAULT_PORT: u16 = 41000;

/// Parity checking on the serial line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Parity {
    /// No parity bit.
    None,
    /// Odd parity.
    Odd,
    /// Even parity.
    Even,
}

/// Flow control on the serial line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowControl {
    /// No flow control.
    None,
    /// XON/XOFF.
    Software,
    /// RTS/CTS.
    Hardware,
}

/// How to open the shared serial device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// The path to the device.
    /// Likely "/dev/ttyACMx" or "COMx".
    pub path: PathBuf,

    /// Symbols per second.
    pub baud: u32,

    /// Number of data bits per character, 5 to 8.
    pub data_bits: u8,

    /// Number of stop bits, 1 or 2.
    pub stop_bits: u8,

    /// See [`Parity`].
    pub parity: Parity,

    /// See [`FlowControl`].
    pub flow_control: FlowControl,

    /// The smallest read the driver should hand back.
    ///
    /// Not applied to the port: reads are framed into lines whatever their size.
    /// It is only logged when the port opens.
    pub min_read_size: usize,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/dev/valvecan"),
            baud: 9600,
            data_bits: 8,
            stop_bits: 1,
            parity: Parity::None,
            flow_control: FlowControl::None,
            min_read_size: 4,
        }
    }
}

/// Where to accept client connections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenConfig {
    /// The address to bind.
    pub address: IpAddr,

    /// The port to bind.
    /// Zero means any free port.
    pub port: u16,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
        }
    }
}

impl ListenConfig {
    /// The socket address to bind.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }
}

/// The configuration used for running the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// The shared device.
    pub device: DeviceConfig,

    /// The listening endpoint.
    pub listen: ListenConfig,

    /// How many device lines may wait for a single client
    /// before it counts as stalled.
    pub outbox_capacity: usize,

    /// How long to wait on a full client outbox
    /// before dropping the line and disconnecting that client.
    pub grace_period_ms: u64,

    /// How many client lines may wait to be written to the device.
    pub device_write_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device: DeviceConfig::default(),
            listen: ListenConfig::default(),
            outbox_capacity: 64,
            grace_period_ms: 500,
            device_write_capacity: 256,
        }
    }
}

impl Config {
    fn ron() -> ron::Options {
        ron::Options::default()
            .with_default_extension(ron::extensions::Extensions::IMPLICIT_SOME)
            .with_default_extension(ron::extensions::Extensions::UNWRAP_NEWTYPES)
    }

    /// Deserialize a .ron file's contents.
    pub fn deserialize(input: &str) -> Result<Self, Error> {
        Ok(Self::ron().from_str::<Config>(input)?)
    }

    /// An example configuration with some fields filled in.
    pub fn example() -> Self {
        Self {
            device: DeviceConfig {
                path: PathBuf::from("/dev/ttyACM0"),
                baud: 115_200,
                ..Default::default()
            },
            listen: ListenConfig {
                address: IpAddr::V4(Ipv4Addr::LOCALHOST),
                port: DEFAULT_PORT,
            },
            ..Default::default()
        }
    }

    /// Serialize the configuration in a "pretty" (i.e. non-compact) fashion.
    pub fn serialize_pretty(&self) -> String {
        Self::ron()
            .to_string_pretty(self, ron::ser::PrettyConfig::default())
            .expect("Config only holds plain data")
    }

    /// Setup a new configuration from a RON file.
    pub fn new_from_path<P: AsRef<Path>>(p: P) -> Result<Self, Error> {
        let s = std::fs::read_to_string(p).map_err(Error::ConfigIo)?;

        Self::deserialize(&s)
    }

    /// How long the pump waits on a full outbox.
    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    fn check_device(&self) -> Result<(), Error> {
        let device = &self.device;

        if device.path.as_os_str().is_empty() {
            return Err(Error::BadConfig("The device path is empty".into()));
        }

        if device.baud == 0 {
            return Err(Error::BadConfig("The baud rate must be above zero".into()));
        }

        if !(5..=8).contains(&device.data_bits) {
            return Err(Error::BadConfig(format!(
                "Data bits must be between 5 and 8, got {}",
                device.data_bits
            )));
        }

        if !matches!(device.stop_bits, 1 | 2) {
            return Err(Error::BadConfig(format!(
                "Stop bits must be 1 or 2, got {}",
                device.stop_bits
            )));
        }

        Ok(())
    }

    fn check_queues(&self) -> Result<(), Error> {
        if self.outbox_capacity == 0 {
            return Err(Error::BadConfig(
                "The outbox capacity must be above zero, otherwise no client could receive anything"
                    .into(),
            ));
        }

        if self.device_write_capacity == 0 {
            return Err(Error::BadConfig(
                "The device write capacity must be above zero".into(),
            ));
        }

        if self.grace_period_ms == 0 {
            return Err(Error::BadConfig(
                "The grace period must be above zero".into(),
            ));
        }

        Ok(())
    }

    /// Check that the configuration can be run with.
    pub fn validate(&self) -> Result<(), Error> {
        self.check_device()?;
        self.check_queues()?;

        Ok(())
    }
}
