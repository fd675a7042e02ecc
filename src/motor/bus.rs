//! Motor bus: batched register access over one serial line.
//!
//! One `MotorBus` owns one transport and a fixed roster of motors. All
//! register traffic goes through named registers; group reads and writes
//! are single wire transactions regardless of motor count. Calibration,
//! once installed, is applied and reverted transparently for position
//! registers, so callers above this layer only ever see degrees.

use super::calibration::CalibrationEntry;
use super::packet::{self, ParseOutcome, StatusPacket};
use super::tables::{Family, Register};
use crate::error::{CommStatus, Error, Result};
use crate::transport::{SerialTransport, Transport};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// One motor on the bus
#[derive(Debug, Clone, Copy)]
pub struct MotorDescriptor {
    /// Bus id (1..=253)
    pub id: u8,
    /// Servo family of this motor
    pub family: Family,
    /// Encoder counts per revolution
    pub resolution: u32,
}

impl MotorDescriptor {
    /// Descriptor with the family's standard encoder resolution
    pub fn new(id: u8, family: Family) -> Self {
        MotorDescriptor {
            id,
            family,
            resolution: family.resolution(),
        }
    }
}

/// Servo bus with batched sync read/write
pub struct MotorBus {
    port: String,
    baud: u32,
    /// Protocol family the bus speaks
    family: Family,
    transport: Option<Box<dyn Transport>>,
    motors: BTreeMap<String, MotorDescriptor>,
    calibration: Option<BTreeMap<String, CalibrationEntry>>,
}

impl MotorBus {
    /// Create a bus for the given port. `motors` maps unique names to
    /// descriptors; the roster is fixed for the life of the bus.
    pub fn new(port: &str, baud: u32, family: Family, motors: BTreeMap<String, MotorDescriptor>) -> Self {
        MotorBus {
            port: port.to_string(),
            baud,
            family,
            transport: None,
            motors,
            calibration: None,
        }
    }

    /// Create a bus over an injected transport, already open. Test seam.
    pub fn with_transport(
        transport: Box<dyn Transport>,
        family: Family,
        motors: BTreeMap<String, MotorDescriptor>,
    ) -> Self {
        MotorBus {
            port: String::from("mock"),
            baud: 0,
            family,
            transport: Some(transport),
            motors,
            calibration: None,
        }
    }

    /// Open the serial port. Fails with `Error::Connection` if the port
    /// cannot be opened or configured.
    pub fn open(&mut self) -> Result<()> {
        if self.transport.is_some() {
            return Ok(());
        }
        let transport = SerialTransport::open(&self.port, self.baud)?;
        self.transport = Some(Box::new(transport));
        log::info!(
            "Motor bus open on {} ({} motors, {:?})",
            self.port,
            self.motors.len(),
            self.family
        );
        Ok(())
    }

    /// Release the serial port. Always succeeds; safe to call twice.
    pub fn close(&mut self) {
        if self.transport.take().is_some() {
            log::info!("Motor bus on {} closed", self.port);
        }
    }

    /// Whether the transport is currently open
    pub fn is_open(&self) -> bool {
        self.transport.is_some()
    }

    /// Motor names on this bus, in roster order
    pub fn motor_names(&self) -> Vec<String> {
        self.motors.keys().cloned().collect()
    }

    /// Install calibration entries. Motors without an entry pass through raw.
    pub fn set_calibration(&mut self, entries: BTreeMap<String, CalibrationEntry>) {
        self.calibration = Some(entries);
    }

    /// Whether calibration has been installed
    pub fn has_calibration(&self) -> bool {
        self.calibration.is_some()
    }

    /// Encoder resolution of the named motor
    pub fn motor_resolution(&self, name: &str) -> Option<u32> {
        self.motors.get(name).map(|d| d.resolution)
    }

    /// Group read of one register across the named motors.
    ///
    /// Returns a map of motor name to value: degrees for calibrated
    /// position registers, raw counts otherwise. Motors whose family does
    /// not match the bus are skipped with a warning. Motors that never
    /// answer are absent from the result; the call only fails if no motor
    /// answered after all retries.
    pub fn sync_read(&mut self, register: Register, names: &[&str]) -> Result<BTreeMap<String, f64>> {
        let entry = self.resolve(register)?;
        let participants = self.participants(register, names)?;
        let ids: Vec<u8> = participants.iter().map(|(_, d)| d.id).collect();

        let request = match self.family {
            Family::FeetechSts => {
                packet::feetech::sync_read(entry.address as u8, entry.width, &ids)
            }
            Family::DynamixelX => {
                packet::dynamixel::sync_read(entry.address, u16::from(entry.width), &ids)
            }
        };

        let retries = self.family.retry_policy().read;
        let mut last_status = CommStatus::RxTimeout;
        for attempt in 0..retries {
            if let Err(e) = self.send(&request) {
                log::debug!("sync_read tx failed (attempt {}): {}", attempt + 1, e);
                last_status = CommStatus::TxFail;
                continue;
            }
            let (statuses, status) = self.collect_statuses(&ids);
            last_status = status;
            if statuses.len() == ids.len() || (!statuses.is_empty() && attempt + 1 == retries) {
                return self.decode_statuses(register, entry, &participants, statuses);
            }
            if !statuses.is_empty() {
                // Partial reply; retry the whole group for the stragglers
                log::debug!(
                    "sync_read {} got {}/{} replies, retrying",
                    register.name(),
                    statuses.len(),
                    ids.len()
                );
            }
        }
        Err(Error::Communication {
            register: register.name(),
            status: last_status,
        })
    }

    /// Group write of one register across the given motors.
    ///
    /// Values are degrees for calibrated position registers, raw counts
    /// otherwise. Broadcast, so no per-motor acknowledgement.
    pub fn sync_write(&mut self, register: Register, values: &BTreeMap<String, f64>) -> Result<()> {
        let entry = self.resolve(register)?;
        let names: Vec<&str> = values.keys().map(String::as_str).collect();
        let participants = self.participants(register, &names)?;

        let mut entries = Vec::with_capacity(participants.len());
        for (name, descriptor) in &participants {
            let value = values[*name];
            let raw = if entry.needs_calibration {
                self.revert_value(name, value, descriptor.resolution)
            } else {
                value.round() as i32
            };
            entries.push((descriptor.id, entry.split_into_bytes(entry.encode(raw))));
        }

        let request = match self.family {
            Family::FeetechSts => {
                packet::feetech::sync_write(entry.address as u8, entry.width, &entries)
            }
            Family::DynamixelX => {
                packet::dynamixel::sync_write(entry.address, u16::from(entry.width), &entries)
            }
        };

        let retries = self.family.retry_policy().write;
        let mut last_err = None;
        for _ in 0..retries {
            match self.send(&request) {
                Ok(()) => return Ok(()),
                Err(e) => {
                    log::debug!("sync_write tx failed: {}", e);
                    last_err = Some(e);
                }
            }
        }
        match last_err {
            Some(Error::Connection(msg)) => Err(Error::Connection(msg)),
            _ => Err(Error::Communication {
                register: register.name(),
                status: CommStatus::TxFail,
            }),
        }
    }

    /// Read one register from one motor
    pub fn read(&mut self, register: Register, name: &str) -> Result<f64> {
        let entry = self.resolve(register)?;
        let descriptor = self.descriptor(name)?;
        let request = match self.family {
            Family::FeetechSts => {
                packet::feetech::read(descriptor.id, entry.address as u8, entry.width)
            }
            Family::DynamixelX => {
                packet::dynamixel::read(descriptor.id, entry.address, u16::from(entry.width))
            }
        };

        let retries = self.family.retry_policy().read;
        let mut last_status = CommStatus::RxTimeout;
        for _ in 0..retries {
            if self.send(&request).is_err() {
                last_status = CommStatus::TxFail;
                continue;
            }
            let (mut statuses, status) = self.collect_statuses(&[descriptor.id]);
            last_status = status;
            if let Some(packet) = statuses.remove(&descriptor.id) {
                if packet.error != 0 {
                    return Err(Error::Communication {
                        register: register.name(),
                        status: CommStatus::ServoError(packet.error),
                    });
                }
                let raw = entry.decode(entry.assemble_from_bytes(&packet.params)?);
                return Ok(if entry.needs_calibration {
                    self.apply_value(name, raw, descriptor.resolution)
                } else {
                    f64::from(raw)
                });
            }
        }
        Err(Error::Communication {
            register: register.name(),
            status: last_status,
        })
    }

    /// Write one register on one motor
    pub fn write(&mut self, register: Register, name: &str, value: f64) -> Result<()> {
        let entry = self.resolve(register)?;
        let descriptor = self.descriptor(name)?;
        let raw = if entry.needs_calibration {
            self.revert_value(name, value, descriptor.resolution)
        } else {
            value.round() as i32
        };
        let data = entry.split_into_bytes(entry.encode(raw));
        let request = match self.family {
            Family::FeetechSts => packet::feetech::write(descriptor.id, entry.address as u8, &data),
            Family::DynamixelX => packet::dynamixel::write(descriptor.id, entry.address, &data),
        };

        let retries = self.family.retry_policy().write;
        let mut last_status = CommStatus::TxFail;
        for _ in 0..retries {
            if self.send(&request).is_err() {
                last_status = CommStatus::TxFail;
                continue;
            }
            let (mut statuses, status) = self.collect_statuses(&[descriptor.id]);
            last_status = status;
            if let Some(packet) = statuses.remove(&descriptor.id) {
                if packet.error != 0 {
                    return Err(Error::Communication {
                        register: register.name(),
                        status: CommStatus::ServoError(packet.error),
                    });
                }
                return Ok(());
            }
        }
        Err(Error::Communication {
            register: register.name(),
            status: last_status,
        })
    }

    /// Enable torque on the named motors (all motors if empty)
    pub fn torque_enable(&mut self, names: &[&str]) -> Result<()> {
        self.set_torque(names, 1.0)
    }

    /// Disable torque on the named motors (all motors if empty)
    pub fn torque_disable(&mut self, names: &[&str]) -> Result<()> {
        self.set_torque(names, 0.0)
    }

    fn set_torque(&mut self, names: &[&str], value: f64) -> Result<()> {
        let all: Vec<String>;
        let targets: Vec<&str> = if names.is_empty() {
            all = self.motor_names();
            all.iter().map(String::as_str).collect()
        } else {
            names.to_vec()
        };
        let values: BTreeMap<String, f64> =
            targets.iter().map(|n| (n.to_string(), value)).collect();
        self.sync_write(Register::TorqueEnable, &values)
    }

    fn resolve(&self, register: Register) -> Result<super::control_table::RegisterEntry> {
        self.family.lookup(register).ok_or_else(|| {
            Error::InvalidParameter(format!(
                "register {} not present on {:?}",
                register.name(),
                self.family
            ))
        })
    }

    fn descriptor(&self, name: &str) -> Result<MotorDescriptor> {
        self.motors
            .get(name)
            .copied()
            .ok_or_else(|| Error::InvalidParameter(format!("unknown motor '{}'", name)))
    }

    /// Resolve names to descriptors, skipping family mismatches with a warning
    fn participants<'a>(
        &self,
        register: Register,
        names: &[&'a str],
    ) -> Result<Vec<(&'a str, MotorDescriptor)>> {
        let mut out = Vec::with_capacity(names.len());
        for &name in names {
            let descriptor = self.descriptor(name)?;
            if descriptor.family != self.family {
                log::warn!(
                    "Skipping motor '{}' in {} group: family {:?} does not match bus {:?}",
                    name,
                    register.name(),
                    descriptor.family,
                    self.family
                );
                continue;
            }
            out.push((name, descriptor));
        }
        Ok(out)
    }

    fn apply_value(&self, name: &str, raw: i32, resolution: u32) -> f64 {
        match self.calibration.as_ref().and_then(|c| c.get(name)) {
            Some(entry) => entry.apply(raw, resolution),
            None => f64::from(raw),
        }
    }

    fn revert_value(&self, name: &str, value: f64, resolution: u32) -> i32 {
        match self.calibration.as_ref().and_then(|c| c.get(name)) {
            Some(entry) => entry.revert(value, resolution),
            None => value.round() as i32,
        }
    }

    fn send(&mut self, request: &[u8]) -> Result<()> {
        let transport = self
            .transport
            .as_mut()
            .ok_or_else(|| Error::Connection("bus not open".to_string()))?;
        transport.write(request)?;
        transport.flush()
    }

    /// Read status packets until all expected ids answered or the receive
    /// window closes. Returns what arrived and the last transport status.
    fn collect_statuses(&mut self, expected: &[u8]) -> (BTreeMap<u8, StatusPacket>, CommStatus) {
        let family = self.family;
        let transport = match self.transport.as_mut() {
            Some(t) => t,
            None => return (BTreeMap::new(), CommStatus::TxFail),
        };

        let mut collected: BTreeMap<u8, StatusPacket> = BTreeMap::new();
        let mut buf: Vec<u8> = Vec::with_capacity(256);
        let mut status = CommStatus::RxTimeout;
        // Receive window sized for the group at 1 Mbaud plus servo latency
        let deadline = Instant::now() + Duration::from_millis(4 + 2 * expected.len() as u64);
        let mut chunk = [0u8; 128];

        loop {
            loop {
                let outcome = match family {
                    Family::FeetechSts => packet::feetech::parse_status(&buf),
                    Family::DynamixelX => packet::dynamixel::parse_status(&buf),
                };
                match outcome {
                    ParseOutcome::Complete { packet, consumed } => {
                        buf.drain(..consumed);
                        if expected.contains(&packet.id) {
                            collected.insert(packet.id, packet);
                        } else {
                            log::debug!("Dropping status from unexpected id {}", packet.id);
                        }
                    }
                    ParseOutcome::NeedMore { consumed } => {
                        buf.drain(..consumed);
                        break;
                    }
                    ParseOutcome::Corrupt { consumed } => {
                        buf.drain(..consumed);
                        status = CommStatus::RxCorrupt;
                    }
                }
            }
            if collected.len() == expected.len() {
                return (collected, status);
            }
            match transport.read(&mut chunk) {
                Ok(0) => {
                    if Instant::now() >= deadline {
                        return (collected, status);
                    }
                }
                Ok(n) => buf.extend_from_slice(&chunk[..n]),
                Err(e) => {
                    log::debug!("transport read error: {}", e);
                    return (collected, status);
                }
            }
        }
    }

    fn decode_statuses(
        &self,
        register: Register,
        entry: super::control_table::RegisterEntry,
        participants: &[(&str, MotorDescriptor)],
        mut statuses: BTreeMap<u8, StatusPacket>,
    ) -> Result<BTreeMap<String, f64>> {
        let mut out = BTreeMap::new();
        for (name, descriptor) in participants {
            let Some(packet) = statuses.remove(&descriptor.id) else {
                log::warn!(
                    "Motor '{}' (id {}) did not answer {} group read",
                    name,
                    descriptor.id,
                    register.name()
                );
                continue;
            };
            if packet.error != 0 {
                log::warn!(
                    "Motor '{}' reports hardware error {:#04x} on {}",
                    name,
                    packet.error,
                    register.name()
                );
            }
            let raw = entry.decode(entry.assemble_from_bytes(&packet.params)?);
            let value = if entry.needs_calibration {
                self.apply_value(name, raw, descriptor.resolution)
            } else {
                f64::from(raw)
            };
            out.insert((*name).to_string(), value);
        }
        Ok(out)
    }
}
