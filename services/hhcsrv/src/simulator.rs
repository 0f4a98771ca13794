//! In-memory register simulator
//!
//! Implements [`RegisterTransport`] over a shared register bank so the engine can be
//! driven without hardware. Clones share state: keep one handle to preload registers,
//! inject failures and inspect traffic while the engine owns another.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use errors::{HeatError, HeatResult};
use parking_lot::Mutex;
use tracing::debug;

use crate::transport::RegisterTransport;

/// A write observed by the simulator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteRecord {
    Multiple {
        unit_id: u8,
        address: u16,
        values: Vec<u16>,
    },
    Single {
        unit_id: u8,
        address: u16,
        value: u16,
    },
}

/// One completed request/response exchange, in completion order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireEvent {
    Read { unit_id: u8, address: u16, count: u16 },
    Write { unit_id: u8, address: u16 },
}

/// Traffic counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimulatorCounters {
    pub connects: usize,
    pub closes: usize,
    /// Read requests, including failed ones
    pub reads: usize,
}

#[derive(Debug, Default)]
struct SimulatorState {
    /// Holding registers per `(unit, address)`; unset registers read as 0
    registers: HashMap<(u8, u16), u16>,
    connected: bool,
    refuse_connect: bool,
    /// Any read touching one of these addresses fails with a transport error
    failing_addresses: HashSet<u16>,
    /// Any read touching one of these addresses fails with a Modbus exception
    exception_addresses: HashSet<u16>,
    fail_writes: bool,
    read_delay: Option<Duration>,
    connect_delay: Option<Duration>,
    /// Total connects accepted before every further attempt is refused
    connect_limit: Option<usize>,
    counters: SimulatorCounters,
    traffic: Vec<WireEvent>,
    writes: Vec<WriteRecord>,
    read_log: Vec<(u8, u16, u16)>,
}

#[derive(Debug, Clone)]
pub struct RegisterSimulator {
    state: Arc<Mutex<SimulatorState>>,
    endpoint: String,
}

impl Default for RegisterSimulator {
    fn default() -> Self {
        Self::new()
    }
}

impl RegisterSimulator {
    pub fn new() -> Self {
        Self {
            state: Arc::default(),
            endpoint: "simulator:502".to_string(),
        }
    }

    pub fn set_register(&self, unit_id: u8, address: u16, value: u16) {
        self.state.lock().registers.insert((unit_id, address), value);
    }

    pub fn set_registers(&self, unit_id: u8, start: u16, values: &[u16]) {
        let mut state = self.state.lock();
        for (offset, value) in values.iter().enumerate() {
            state
                .registers
                .insert((unit_id, start.wrapping_add(offset as u16)), *value);
        }
    }

    pub fn register(&self, unit_id: u8, address: u16) -> u16 {
        self.state
            .lock()
            .registers
            .get(&(unit_id, address))
            .copied()
            .unwrap_or(0)
    }

    /// Reject every connect attempt while `refuse` is set
    pub fn refuse_connections(&self, refuse: bool) {
        let mut state = self.state.lock();
        state.refuse_connect = refuse;
        if refuse {
            state.connected = false;
        }
    }

    pub fn fail_address(&self, address: u16) {
        self.state.lock().failing_addresses.insert(address);
    }

    pub fn raise_exception_at(&self, address: u16) {
        self.state.lock().exception_addresses.insert(address);
    }

    pub fn clear_failures(&self) {
        let mut state = self.state.lock();
        state.failing_addresses.clear();
        state.exception_addresses.clear();
        state.fail_writes = false;
    }

    pub fn fail_writes(&self, fail: bool) {
        self.state.lock().fail_writes = fail;
    }

    /// Delay every read response by `delay`
    pub fn set_read_delay(&self, delay: Option<Duration>) {
        self.state.lock().read_delay = delay;
    }

    /// Accept only the first `limit` connects; the live link is left alone
    pub fn limit_connects(&self, limit: Option<usize>) {
        self.state.lock().connect_limit = limit;
    }

    /// Delay every connect attempt by `delay`
    pub fn set_connect_delay(&self, delay: Option<Duration>) {
        self.state.lock().connect_delay = delay;
    }

    pub fn counters(&self) -> SimulatorCounters {
        self.state.lock().counters.clone()
    }

    pub fn writes(&self) -> Vec<WriteRecord> {
        self.state.lock().writes.clone()
    }

    /// Reads and writes that reached the register bank, in completion order
    pub fn traffic(&self) -> Vec<WireEvent> {
        self.state.lock().traffic.clone()
    }

    /// `(unit, address, count)` of every read request in arrival order
    pub fn read_log(&self) -> Vec<(u8, u16, u16)> {
        self.state.lock().read_log.clone()
    }

    pub fn is_link_up(&self) -> bool {
        self.state.lock().connected
    }

    fn check_link(&self) -> HeatResult<()> {
        if self.state.lock().connected {
            Ok(())
        } else {
            Err(HeatError::NotConnected)
        }
    }
}

#[async_trait]
impl RegisterTransport for RegisterSimulator {
    async fn connect(&mut self) -> HeatResult<()> {
        let delay = {
            let mut state = self.state.lock();
            state.counters.connects += 1;
            state.connect_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock();
        let over_limit = state
            .connect_limit
            .is_some_and(|limit| state.counters.connects > limit);
        if state.refuse_connect || over_limit {
            state.connected = false;
            return Err(HeatError::ConnectionFailed {
                endpoint: self.endpoint.clone(),
                reason: "connection refused".to_string(),
            });
        }
        state.connected = true;
        Ok(())
    }

    async fn close(&mut self) -> HeatResult<()> {
        let mut state = self.state.lock();
        state.counters.closes += 1;
        state.connected = false;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    fn endpoint(&self) -> String {
        self.endpoint.clone()
    }

    async fn read_holding_registers(
        &mut self,
        unit_id: u8,
        address: u16,
        count: u16,
    ) -> HeatResult<Vec<u16>> {
        let delay = {
            let mut state = self.state.lock();
            state.counters.reads += 1;
            state.read_log.push((unit_id, address, count));
            state.read_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.check_link()?;

        let mut state = self.state.lock();
        state.traffic.push(WireEvent::Read {
            unit_id,
            address,
            count,
        });
        let range = u32::from(address)..u32::from(address) + u32::from(count);
        let touches = |set: &HashSet<u16>| set.iter().any(|a| range.contains(&u32::from(*a)));
        if touches(&state.failing_addresses) {
            debug!("Simulated transport failure at {}+{}", address, count);
            return Err(HeatError::Transport(format!(
                "simulated failure reading {address}+{count}"
            )));
        }
        if touches(&state.exception_addresses) {
            return Err(HeatError::ModbusException {
                function: "read_holding_registers".to_string(),
                code: "IllegalDataAddress".to_string(),
            });
        }

        Ok(range
            .map(|a| {
                state
                    .registers
                    .get(&(unit_id, a as u16))
                    .copied()
                    .unwrap_or(0)
            })
            .collect())
    }

    async fn write_multiple_registers(
        &mut self,
        unit_id: u8,
        address: u16,
        values: &[u16],
    ) -> HeatResult<()> {
        self.check_link()?;
        let mut state = self.state.lock();
        if state.fail_writes {
            return Err(HeatError::Transport("simulated write failure".to_string()));
        }
        for (offset, value) in values.iter().enumerate() {
            state
                .registers
                .insert((unit_id, address.wrapping_add(offset as u16)), *value);
        }
        state.traffic.push(WireEvent::Write { unit_id, address });
        state.writes.push(WriteRecord::Multiple {
            unit_id,
            address,
            values: values.to_vec(),
        });
        Ok(())
    }

    async fn write_single_register(
        &mut self,
        unit_id: u8,
        address: u16,
        value: u16,
    ) -> HeatResult<()> {
        self.check_link()?;
        let mut state = self.state.lock();
        if state.fail_writes {
            return Err(HeatError::Transport("simulated write failure".to_string()));
        }
        state.registers.insert((unit_id, address), value);
        state.traffic.push(WireEvent::Write { unit_id, address });
        state.writes.push(WriteRecord::Single {
            unit_id,
            address,
            value,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_back_preloaded_registers() {
        let sim = RegisterSimulator::new();
        sim.set_registers(1, 40, &[5, 2, 4]);
        let mut transport = sim.clone();
        transport.connect().await.unwrap();

        let words = transport.read_holding_registers(1, 39, 5).await.unwrap();
        assert_eq!(words, vec![0, 5, 2, 4, 0]);
        assert_eq!(sim.counters().reads, 1);
        assert_eq!(sim.read_log(), vec![(1, 39, 5)]);
    }

    #[tokio::test]
    async fn test_requires_connection() {
        let mut sim = RegisterSimulator::new();
        let err = sim.read_holding_registers(0, 0, 1).await.unwrap_err();
        assert!(matches!(err, HeatError::NotConnected));
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let sim = RegisterSimulator::new();
        let mut transport = sim.clone();
        transport.connect().await.unwrap();

        sim.fail_address(22);
        sim.raise_exception_at(30);
        assert!(matches!(
            transport.read_holding_registers(0, 20, 4).await,
            Err(HeatError::Transport(_))
        ));
        assert!(matches!(
            transport.read_holding_registers(0, 30, 1).await,
            Err(HeatError::ModbusException { .. })
        ));
        assert!(transport.read_holding_registers(0, 23, 7).await.is_ok());

        sim.refuse_connections(true);
        assert!(transport.connect().await.is_err());
        assert_eq!(sim.counters().connects, 2);
    }

    #[tokio::test]
    async fn test_writes_are_recorded() {
        let sim = RegisterSimulator::new();
        let mut transport = sim.clone();
        transport.connect().await.unwrap();

        transport.write_multiple_registers(0, 30, &[1]).await.unwrap();
        transport.write_single_register(0, 31, 7).await.unwrap();
        assert_eq!(sim.register(0, 30), 1);
        assert_eq!(
            sim.writes(),
            vec![
                WriteRecord::Multiple {
                    unit_id: 0,
                    address: 30,
                    values: vec![1]
                },
                WriteRecord::Single {
                    unit_id: 0,
                    address: 31,
                    value: 7
                },
            ]
        );

        sim.fail_writes(true);
        assert!(transport.write_single_register(0, 31, 8).await.is_err());
        assert_eq!(sim.register(0, 31), 7);
    }

    #[tokio::test]
    async fn test_traffic_in_completion_order() {
        let sim = RegisterSimulator::new();
        let mut transport = sim.clone();
        transport.connect().await.unwrap();

        transport.read_holding_registers(1, 40, 3).await.unwrap();
        transport.write_multiple_registers(0, 30, &[1]).await.unwrap();
        sim.fail_address(20);
        assert!(transport.read_holding_registers(0, 20, 1).await.is_err());
        assert_eq!(
            sim.traffic(),
            vec![
                WireEvent::Read {
                    unit_id: 1,
                    address: 40,
                    count: 3
                },
                WireEvent::Write {
                    unit_id: 0,
                    address: 30
                },
                WireEvent::Read {
                    unit_id: 0,
                    address: 20,
                    count: 1
                },
            ]
        );
    }
}
