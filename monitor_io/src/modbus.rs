//! Minimal Modbus TCP holding-register reader, feature-gated behind
//! `modbus`. Deliberately thin: it maps one holding register per zone to a
//! temperature and one to a setpoint, nothing more. Field-controller-specific
//! protocol logic (coil layouts, write sequences, vendor quirks) is out of
//! scope here and lives, if anywhere, in a caller-supplied register map.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::Utc;
use monitor_traits::clock::Clock;
use monitor_traits::{Sample, SampleSource, SourceError, Zone};
use rmodbus::client::ModbusRequest;
use rmodbus::ModbusProto;

use crate::error::{IoError, Result};

/// Register addresses for one zone's sensor and setpoint, both read as a
/// single 16-bit holding register scaled by `scale` to a Fahrenheit reading.
#[derive(Debug, Clone, Copy)]
pub struct ZoneRegisterMap {
    pub zone: Zone,
    pub unit_id: u8,
    pub temperature_reg: u16,
    pub setpoint_reg: u16,
}

pub struct ModbusSampleSource {
    stream: Mutex<TcpStream>,
    zones: Vec<ZoneRegisterMap>,
    scale: f64,
    start: Instant,
    clock: Arc<dyn Clock>,
}

impl ModbusSampleSource {
    pub fn connect(
        addr: &str,
        timeout: Duration,
        zones: Vec<ZoneRegisterMap>,
        scale: f64,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let stream = TcpStream::connect(addr).map_err(IoError::Io)?;
        stream.set_read_timeout(Some(timeout)).map_err(IoError::Io)?;
        stream.set_write_timeout(Some(timeout)).map_err(IoError::Io)?;
        Ok(Self {
            stream: Mutex::new(stream),
            zones,
            scale,
            start: Instant::now(),
            clock,
        })
    }

    fn read_holding_register(&self, unit_id: u8, reg: u16) -> Result<u16> {
        let mut mreq = ModbusRequest::new(unit_id, ModbusProto::TcpUdp);
        let mut request = Vec::new();
        mreq.generate_get_holdings(reg, 1, &mut request)
            .map_err(|e| IoError::Protocol(format!("{e:?}")))?;

        let mut stream = self.stream.lock().unwrap();
        stream.write_all(&request).map_err(IoError::Io)?;

        let mut buf = [0u8; 256];
        let n = stream.read(&mut buf).map_err(IoError::Io)?;
        mreq.parse_ok(&buf[..n])
            .map_err(|e| IoError::Protocol(format!("{e:?}")))?;

        let mut values = Vec::new();
        mreq.parse_u16(&buf[..n], &mut values)
            .map_err(|e| IoError::Protocol(format!("{e:?}")))?;
        values
            .first()
            .copied()
            .ok_or_else(|| IoError::Protocol("empty register response".into()))
    }
}

impl SampleSource for ModbusSampleSource {
    fn get_latest(&self, zone: Zone) -> std::result::Result<Sample, SourceError> {
        let map = self
            .zones
            .iter()
            .find(|m| m.zone == zone)
            .ok_or_else(|| SourceError::Io(format!("no modbus register map for zone {zone}")))?;

        let raw_temp = self
            .read_holding_register(map.unit_id, map.temperature_reg)
            .map_err(|e| SourceError::Io(e.to_string()))?;
        let raw_sp = self
            .read_holding_register(map.unit_id, map.setpoint_reg)
            .map_err(|e| SourceError::Io(e.to_string()))?;

        Ok(Sample {
            zone,
            t_monotonic_ms: self.clock.ms_since(self.start),
            t_wall: Utc::now(),
            temperature_f: raw_temp as f64 * self.scale,
            setpoint_f: raw_sp as f64 * self.scale,
            valid: true,
        })
    }
}
