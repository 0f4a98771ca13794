//! Register transport
//!
//! The only wire operations the engine needs: holding-register reads and single or
//! multiple register writes against one Modbus endpoint. [`TcpTransport`] talks
//! Modbus TCP through `tokio-modbus`; the in-memory simulator implements the same
//! trait for tests and dry runs.

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use errors::{HeatError, HeatResult};
use tokio::net::lookup_host;
use tokio::time::{error::Elapsed, timeout};
use tokio_modbus::client::{tcp, Context};
use tokio_modbus::prelude::*;
use tracing::{debug, info, warn};

/// Modbus register I/O primitives.
///
/// Implementations are not required to be safe for concurrent use; the connection
/// manager serializes every call.
#[async_trait]
pub trait RegisterTransport: Send {
    /// Open a fresh link, replacing any existing one
    async fn connect(&mut self) -> HeatResult<()>;

    async fn close(&mut self) -> HeatResult<()>;

    fn is_connected(&self) -> bool;

    /// `host:port` description used in logs and errors
    fn endpoint(&self) -> String;

    /// Read `count` holding registers starting at `address`.
    ///
    /// A response with a different register count is a `MalformedResponse`.
    async fn read_holding_registers(
        &mut self,
        unit_id: u8,
        address: u16,
        count: u16,
    ) -> HeatResult<Vec<u16>>;

    async fn write_multiple_registers(
        &mut self,
        unit_id: u8,
        address: u16,
        values: &[u16],
    ) -> HeatResult<()>;

    async fn write_single_register(&mut self, unit_id: u8, address: u16, value: u16)
        -> HeatResult<()>;
}

/// Resolve `host:port` to the first socket address within `limit`.
///
/// Takes owned arguments: the transport itself is not `Sync`, so no borrow of it may
/// live across this await.
async fn resolve(host: String, port: u16, limit: Duration) -> HeatResult<SocketAddr> {
    let endpoint = format!("{host}:{port}");
    let mut addrs = match timeout(limit, lookup_host((host.as_str(), port))).await {
        Ok(Ok(addrs)) => addrs,
        Ok(Err(e)) => {
            return Err(HeatError::ConnectionFailed {
                endpoint,
                reason: format!("address resolution failed: {e}"),
            })
        },
        Err(_) => {
            return Err(HeatError::ConnectionFailed {
                endpoint,
                reason: format!("address resolution timed out after {limit:?}"),
            })
        },
    };
    addrs.next().ok_or_else(|| HeatError::ConnectionFailed {
        endpoint,
        reason: "host resolved to no address".to_string(),
    })
}

/// Modbus TCP client transport
pub struct TcpTransport {
    host: String,
    port: u16,
    /// Applied to the handshake and to every request
    timeout: Duration,
    ctx: Option<Context>,
}

impl TcpTransport {
    pub fn new(host: impl Into<String>, port: u16, timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            timeout,
            ctx: None,
        }
    }

    fn context(&mut self, unit_id: u8) -> HeatResult<&mut Context> {
        let ctx = self.ctx.as_mut().ok_or(HeatError::NotConnected)?;
        ctx.set_slave(Slave(unit_id));
        Ok(ctx)
    }

    /// Flatten `timeout(tokio-modbus request)` into a `HeatResult`
    fn flatten<T>(
        &self,
        function: &str,
        response: Result<tokio_modbus::Result<T>, Elapsed>,
    ) -> HeatResult<T> {
        match response {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(code))) => Err(HeatError::ModbusException {
                function: function.to_string(),
                code: format!("{code:?}"),
            }),
            Ok(Err(e)) => Err(HeatError::Transport(format!("{function}: {e}"))),
            Err(_) => Err(HeatError::Timeout(self.endpoint())),
        }
    }
}

#[async_trait]
impl RegisterTransport for TcpTransport {
    async fn connect(&mut self) -> HeatResult<()> {
        self.close().await?;

        let limit = self.timeout;
        let socket_addr = resolve(self.host.clone(), self.port, limit).await?;
        debug!("Connecting to Modbus TCP server at {}", socket_addr);

        match timeout(limit, tcp::connect(socket_addr)).await {
            Ok(Ok(ctx)) => {
                self.ctx = Some(ctx);
                info!("Connected to Modbus TCP server at {}", socket_addr);
                Ok(())
            },
            Ok(Err(e)) => Err(HeatError::ConnectionFailed {
                endpoint: self.endpoint(),
                reason: e.to_string(),
            }),
            Err(_) => Err(HeatError::ConnectionFailed {
                endpoint: self.endpoint(),
                reason: format!("connect timed out after {limit:?}"),
            }),
        }
    }

    async fn close(&mut self) -> HeatResult<()> {
        if let Some(mut ctx) = self.ctx.take() {
            if let Err(e) = ctx.disconnect().await {
                // Peer may already be gone; the socket is dropped either way
                warn!("Disconnect from {} failed: {}", self.endpoint(), e);
            }
            debug!("Disconnected from Modbus TCP server {}", self.endpoint());
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.ctx.is_some()
    }

    fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    async fn read_holding_registers(
        &mut self,
        unit_id: u8,
        address: u16,
        count: u16,
    ) -> HeatResult<Vec<u16>> {
        let limit = self.timeout;
        let ctx = self.context(unit_id)?;
        let response = timeout(limit, ctx.read_holding_registers(address, count)).await;
        let words = self.flatten("read_holding_registers", response)?;
        if words.len() != usize::from(count) {
            return Err(HeatError::MalformedResponse {
                expected: usize::from(count),
                actual: words.len(),
            });
        }
        Ok(words)
    }

    async fn write_multiple_registers(
        &mut self,
        unit_id: u8,
        address: u16,
        values: &[u16],
    ) -> HeatResult<()> {
        let limit = self.timeout;
        let ctx = self.context(unit_id)?;
        let response = timeout(limit, ctx.write_multiple_registers(address, values)).await;
        self.flatten("write_multiple_registers", response)
    }

    async fn write_single_register(
        &mut self,
        unit_id: u8,
        address: u16,
        value: u16,
    ) -> HeatResult<()> {
        let limit = self.timeout;
        let ctx = self.context(unit_id)?;
        let response = timeout(limit, ctx.write_single_register(address, value)).await;
        self.flatten("write_single_register", response)
    }
}
