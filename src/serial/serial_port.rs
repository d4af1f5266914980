use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::info;

use crate::{
    config::{DeviceConfig, FlowControl, Parity},
    error::Error,
};

fn data_bits(bits: u8) -> tokio_serial::DataBits {
    match bits {
        5 => tokio_serial::DataBits::Five,
        6 => tokio_serial::DataBits::Six,
        7 => tokio_serial::DataBits::Seven,
        _ => tokio_serial::DataBits::Eight,
    }
}

fn stop_bits(bits: u8) -> tokio_serial::StopBits {
    match bits {
        2 => tokio_serial::StopBits::Two,
        _ => tokio_serial::StopBits::One,
    }
}

impl From<Parity> for tokio_serial::Parity {
    fn from(parity: Parity) -> Self {
        match parity {
            Parity::None => Self::None,
            Parity::Odd => Self::Odd,
            Parity::Even => Self::Even,
        }
    }
}

impl From<FlowControl> for tokio_serial::FlowControl {
    fn from(flow_control: FlowControl) -> Self {
        match flow_control {
            FlowControl::None => Self::None,
            FlowControl::Software => Self::Software,
            FlowControl::Hardware => Self::Hardware,
        }
    }
}

/// Open the serial port described by the config.
///
/// Must be called from within a tokio runtime,
/// since the port is registered with the reactor.
pub fn open(config: &DeviceConfig) -> Result<SerialStream, Error> {
    let path = config.path.to_string_lossy().into_owned();

    info!(
        %path,
        baud = config.baud,
        parity = ?config.parity,
        min_read_size = config.min_read_size,
        "Opening serial port"
    );

    tokio_serial::new(&path, config.baud)
        .data_bits(data_bits(config.data_bits))
        .parity(config.parity.into())
        .stop_bits(stop_bits(config.stop_bits))
        .flow_control(config.flow_control.into())
        .open_native_async()
        .map_err(|e| Error::DeviceOpen {
            path,
            problem: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[tokio::test]
    async fn missing_port_is_an_open_error() {
        let config = DeviceConfig {
            path: PathBuf::from("/dev/this-port-does-not-exist"),
            ..Default::default()
        };

        let Err(err) = open(&config) else {
            panic!("Opening a missing port should fail");
        };

        assert!(matches!(err, Error::DeviceOpen { ref path, .. } if path.contains("does-not-exist")));
    }
}
