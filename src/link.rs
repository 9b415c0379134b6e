//! Serial transport to the sensor head.
//!
//! The port is opened and closed around every read. That costs ~1 s of setup
//! per cycle but means a wedged port never survives past one sample.

use std::io::{Read, Write};
use std::time::Duration;

use log::trace;

use crate::error::TransportError;
use crate::protocol::SensorModel;

const BAUD_RATE: u32 = 9600;
const READ_TIMEOUT: Duration = Duration::from_secs(1);
// The head needs a beat between request and response.
const SETTLE_DELAY: Duration = Duration::from_secs(1);
const RESPONSE_WINDOW: usize = 256;

pub struct SensorLink {
    port_path: String,
    model: SensorModel,
}

impl SensorLink {
    pub fn new(port_path: impl Into<String>, model: SensorModel) -> Self {
        Self {
            port_path: port_path.into(),
            model,
        }
    }

    /// Sends one request frame and reads up to the bounded response window.
    ///
    /// Blocking; callers on the async runtime wrap this in `spawn_blocking`.
    pub fn read(&self) -> Result<Vec<u8>, TransportError> {
        let mut port = serialport::new(&self.port_path, BAUD_RATE)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .timeout(READ_TIMEOUT)
            .open()
            .map_err(|source| TransportError::PortOpen {
                port: self.port_path.clone(),
                source,
            })?;

        let request = self.model.encode_request();
        trace!("sending {} byte request to {}", request.len(), self.port_path);
        port.write_all(&request)
            .map_err(|source| TransportError::Write {
                port: self.port_path.clone(),
                source,
            })?;

        std::thread::sleep(SETTLE_DELAY);

        let mut buffer = vec![0u8; RESPONSE_WINDOW];
        match port.read(&mut buffer) {
            Ok(0) => Err(self.timeout_error()),
            Ok(n) => {
                buffer.truncate(n);
                Ok(buffer)
            }
            Err(err) if err.kind() == std::io::ErrorKind::TimedOut => Err(self.timeout_error()),
            Err(source) => Err(TransportError::Read {
                port: self.port_path.clone(),
                source,
            }),
        }
    }

    fn timeout_error(&self) -> TransportError {
        TransportError::ReadTimeout {
            port: self.port_path.clone(),
            timeout_ms: READ_TIMEOUT.as_millis() as u64,
        }
    }
}
