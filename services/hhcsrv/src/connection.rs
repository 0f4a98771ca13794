//! Connection manager
//!
//! Owns the transport and its lifecycle. Every register request, connect and close
//! holds one async mutex for the whole exchange, so poll reads and host writes never
//! interleave on the wire. Reconnection is lazy: a request that finds the link down
//! reconnects first; nothing retries in the background.

use std::time::Duration;

use errors::{HeatError, HeatResult};
use parking_lot::RwLock;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::constants::MODBUS_MAX_WRITE_REGISTERS;
use crate::transport::RegisterTransport;

/// Connection state enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
}

pub struct ConnectionManager {
    transport: Mutex<Box<dyn RegisterTransport>>,
    /// Mirror of the link state, readable without waiting for in-flight I/O
    state: RwLock<ConnectionState>,
    endpoint: String,
    connect_timeout: Duration,
}

impl ConnectionManager {
    pub fn new(transport: Box<dyn RegisterTransport>, connect_timeout: Duration) -> Self {
        let endpoint = transport.endpoint();
        Self {
            transport: Mutex::new(transport),
            state: RwLock::new(ConnectionState::Disconnected),
            endpoint,
            connect_timeout,
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Open a fresh link, replacing any existing one.
    pub async fn connect(&self) -> HeatResult<()> {
        let mut transport = self.transport.lock().await;
        self.open(transport.as_mut()).await
    }

    /// Connect only if the link is currently down.
    pub async fn ensure_connected(&self) -> HeatResult<()> {
        let mut transport = self.transport.lock().await;
        self.ensure(transport.as_mut()).await
    }

    pub async fn close(&self) -> HeatResult<()> {
        let mut transport = self.transport.lock().await;
        let result = transport.close().await;
        *self.state.write() = ConnectionState::Disconnected;
        info!("Connection to {} closed", self.endpoint);
        result
    }

    pub async fn read_holding_registers(
        &self,
        unit_id: u8,
        address: u16,
        count: u16,
    ) -> HeatResult<Vec<u16>> {
        let mut transport = self.transport.lock().await;
        self.ensure(transport.as_mut()).await?;
        debug!("Read unit {} addr {} count {}", unit_id, address, count);
        match transport.read_holding_registers(unit_id, address, count).await {
            Ok(words) => Ok(words),
            Err(e) => Err(self.on_failure(transport.as_mut(), e).await),
        }
    }

    /// Write `values` to consecutive registers starting at `address`
    pub async fn write_registers(&self, unit_id: u8, address: u16, values: &[u16]) -> HeatResult<()> {
        if values.is_empty() || values.len() > MODBUS_MAX_WRITE_REGISTERS {
            return Err(HeatError::Internal(format!(
                "cannot write {} registers in one request",
                values.len()
            )));
        }
        let mut transport = self.transport.lock().await;
        self.ensure(transport.as_mut()).await?;
        debug!("Write unit {} addr {} values {:?}", unit_id, address, values);
        match transport.write_multiple_registers(unit_id, address, values).await {
            Ok(()) => Ok(()),
            Err(e) => Err(self.on_failure(transport.as_mut(), e).await),
        }
    }

    pub async fn write_register(&self, unit_id: u8, address: u16, value: u16) -> HeatResult<()> {
        let mut transport = self.transport.lock().await;
        self.ensure(transport.as_mut()).await?;
        debug!("Write unit {} addr {} value {}", unit_id, address, value);
        match transport.write_single_register(unit_id, address, value).await {
            Ok(()) => Ok(()),
            Err(e) => Err(self.on_failure(transport.as_mut(), e).await),
        }
    }

    async fn ensure(&self, transport: &mut dyn RegisterTransport) -> HeatResult<()> {
        if self.is_connected() && transport.is_connected() {
            return Ok(());
        }
        self.open(transport).await
    }

    async fn open(&self, transport: &mut dyn RegisterTransport) -> HeatResult<()> {
        // Every way a connect can fail surfaces as ConnectionFailed
        let result = match timeout(self.connect_timeout, transport.connect()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e @ HeatError::ConnectionFailed { .. })) => Err(e),
            Ok(Err(e)) => Err(HeatError::ConnectionFailed {
                endpoint: self.endpoint.clone(),
                reason: e.to_string(),
            }),
            Err(_) => Err(HeatError::ConnectionFailed {
                endpoint: self.endpoint.clone(),
                reason: format!("connect timed out after {:?}", self.connect_timeout),
            }),
        };
        match result {
            Ok(()) => {
                *self.state.write() = ConnectionState::Connected;
                info!("Connected to {}", self.endpoint);
                Ok(())
            },
            Err(e) => {
                *self.state.write() = ConnectionState::Disconnected;
                warn!("Connect to {} failed: {}", self.endpoint, e);
                Err(e)
            },
        }
    }

    /// Drop the link after a transport-level failure; exceptions keep it up.
    async fn on_failure(&self, transport: &mut dyn RegisterTransport, error: HeatError) -> HeatError {
        if error.is_link_failure() {
            if let Err(e) = transport.close().await {
                debug!("Close after failure on {}: {}", self.endpoint, e);
            }
            *self.state.write() = ConnectionState::Disconnected;
            warn!("Link to {} marked down: {}", self.endpoint, error);
        }
        error
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("endpoint", &self.endpoint)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulator::RegisterSimulator;

    fn manager(sim: &RegisterSimulator) -> ConnectionManager {
        ConnectionManager::new(Box::new(sim.clone()), Duration::from_secs(3))
    }

    #[tokio::test]
    async fn test_lazy_connect_on_first_read() {
        let sim = RegisterSimulator::new();
        sim.set_register(1, 40, 5);
        let conn = manager(&sim);
        assert_eq!(conn.state(), ConnectionState::Disconnected);

        let words = conn.read_holding_registers(1, 40, 1).await.unwrap();
        assert_eq!(words, vec![5]);
        assert!(conn.is_connected());
        assert_eq!(sim.counters().connects, 1);

        conn.read_holding_registers(1, 40, 1).await.unwrap();
        assert_eq!(sim.counters().connects, 1);
    }

    #[tokio::test]
    async fn test_transport_failure_drops_link() {
        let sim = RegisterSimulator::new();
        let conn = manager(&sim);
        conn.connect().await.unwrap();

        sim.fail_address(20);
        assert!(conn.read_holding_registers(0, 20, 1).await.is_err());
        assert_eq!(conn.state(), ConnectionState::Disconnected);

        // Next request reconnects
        sim.clear_failures();
        conn.read_holding_registers(0, 20, 1).await.unwrap();
        assert_eq!(sim.counters().connects, 2);
    }

    #[tokio::test]
    async fn test_exception_keeps_link() {
        let sim = RegisterSimulator::new();
        let conn = manager(&sim);
        sim.raise_exception_at(7);
        let err = conn.read_holding_registers(0, 7, 1).await.unwrap_err();
        assert!(matches!(err, HeatError::ModbusException { .. }));
        assert!(conn.is_connected());
    }

    #[tokio::test]
    async fn test_connect_failure_reported() {
        let sim = RegisterSimulator::new();
        sim.refuse_connections(true);
        let conn = manager(&sim);
        let err = conn.write_register(0, 30, 1).await.unwrap_err();
        assert!(matches!(err, HeatError::ConnectionFailed { .. }));
        assert!(sim.writes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_timeout_is_connect_failure() {
        let sim = RegisterSimulator::new();
        sim.set_connect_delay(Some(Duration::from_secs(30)));
        let conn = manager(&sim);
        let err = conn.read_holding_registers(0, 20, 1).await.unwrap_err();
        assert!(err.is_connect_failure(), "{err:?}");
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert_eq!(sim.counters().reads, 0);
    }

    #[tokio::test]
    async fn test_write_size_limits() {
        let sim = RegisterSimulator::new();
        let conn = manager(&sim);
        assert!(conn.write_registers(0, 30, &[]).await.is_err());
        assert!(conn.write_registers(0, 30, &[0; 124]).await.is_err());
        // Rejected before touching the link
        assert_eq!(sim.counters().connects, 0);
        conn.write_registers(0, 30, &[0; 123]).await.unwrap();
    }

    #[tokio::test]
    async fn test_close() {
        let sim = RegisterSimulator::new();
        let conn = manager(&sim);
        conn.write_registers(0, 30, &[1]).await.unwrap();
        conn.close().await.unwrap();
        assert!(!conn.is_connected());
        assert_eq!(sim.counters().closes, 1);
    }
}
