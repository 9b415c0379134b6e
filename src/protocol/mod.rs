//! Sensor wire protocol: request framing and response decoding.
//!
//! The codec is pure and stateless. Byte offsets and fixed-point scalings are
//! carried in a per-model decode table so a different sensor head can be
//! supported by adding a profile instead of editing the decode logic.

use serde::{Deserialize, Serialize};

use crate::error::DecodeError;

/// One decoded sample, in physical units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurements {
    /// °C
    pub temperature: f64,
    /// %RH
    pub humidity: f64,
    /// hPa
    pub pressure: f64,
    /// m/s
    pub wind_speed: f64,
    /// degrees from north
    pub wind_direction: f64,
    /// mm
    pub rain: f64,
    /// W/m²
    pub solar_radiation: f64,
}

/// Location and scaling of one big-endian u16 field in the response frame.
///
/// Physical value = raw / divisor + bias, rounded to two decimals.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub offset: usize,
    pub divisor: f64,
    pub bias: f64,
}

/// Wire layout for one sensor model.
///
/// Invariant: `min_frame_len` covers `offset + 2` for every field.
#[derive(Debug)]
pub struct ProtocolProfile {
    /// Request frame before the CRC trailer.
    pub header: &'static [u8],
    pub min_frame_len: usize,
    /// Temperature, humidity, pressure, wind speed, wind direction, rain,
    /// solar radiation, in that order.
    pub fields: [FieldSpec; 7],
}

static WS7_PROFILE: ProtocolProfile = ProtocolProfile {
    header: &[0xFF, 0x03, 0x00, 0x09, 0x00, 0x07],
    min_frame_len: 17,
    fields: [
        FieldSpec { offset: 3, divisor: 100.0, bias: -40.0 },
        FieldSpec { offset: 5, divisor: 100.0, bias: 0.0 },
        FieldSpec { offset: 7, divisor: 10.0, bias: 0.0 },
        FieldSpec { offset: 9, divisor: 100.0, bias: 0.0 },
        FieldSpec { offset: 11, divisor: 10.0, bias: 0.0 },
        FieldSpec { offset: 13, divisor: 10.0, bias: 0.0 },
        FieldSpec { offset: 15, divisor: 1.0, bias: 0.0 },
    ],
};

/// Supported sensor heads, selected in the device configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorModel {
    /// Seven-register Modbus weather head (temp/hum/press/wind/rain/solar).
    #[default]
    Ws7,
}

impl SensorModel {
    pub fn profile(&self) -> &'static ProtocolProfile {
        match self {
            SensorModel::Ws7 => &WS7_PROFILE,
        }
    }

    /// Builds the fixed request frame: header plus Modbus CRC16 trailer,
    /// low byte first. Deterministic and side-effect free.
    pub fn encode_request(&self) -> Vec<u8> {
        let mut frame = self.profile().header.to_vec();
        let crc = crc16_modbus(&frame);
        frame.push((crc & 0xFF) as u8);
        frame.push((crc >> 8) as u8);
        frame
    }

    /// Decodes a response frame into physical values.
    ///
    /// The response CRC is deliberately not validated: the reference station
    /// tolerates a noisy line and a short or garbled frame already fails the
    /// length check or produces out-of-range values the operator can see.
    pub fn decode_response(&self, frame: &[u8]) -> Result<Measurements, DecodeError> {
        let profile = self.profile();
        if frame.len() < profile.min_frame_len {
            return Err(DecodeError::FrameTooShort {
                got: frame.len(),
                want: profile.min_frame_len,
            });
        }

        let field = |spec: &FieldSpec| -> f64 {
            let raw = u16::from_be_bytes([frame[spec.offset], frame[spec.offset + 1]]);
            round2(f64::from(raw) / spec.divisor + spec.bias)
        };

        let [temp, hum, press, wspeed, wdir, rain, srad] = &profile.fields;
        Ok(Measurements {
            temperature: field(temp),
            humidity: field(hum),
            pressure: field(press),
            wind_speed: field(wspeed),
            wind_direction: field(wdir),
            rain: field(rain),
            solar_radiation: field(srad),
        })
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn crc16_modbus(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &byte in data {
        crc ^= u16::from(byte);
        for _ in 0..8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ 0xA001;
            } else {
                crc >>= 1;
            }
        }
    }
    crc
}
