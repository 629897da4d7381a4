//! Connection management.

use crate::error::ClientError;
use bytes::Bytes;
use carpc_protocol::{ClientEndpoint, DispatchError, Frame, FrameDecoder};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Mutex};

/// Default read buffer size (8 KiB).
pub const DEFAULT_READ_BUFFER_SIZE: usize = 8 * 1024;

/// Minimum read buffer size (1 KiB).
pub const MIN_READ_BUFFER_SIZE: usize = 1024;

/// Maximum read buffer size (1 MiB).
pub const MAX_READ_BUFFER_SIZE: usize = 1024 * 1024;

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Server address.
    pub addr: SocketAddr,
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// Per-call timeout, measured from send to reply.
    pub request_timeout: Duration,
    /// Client name, used in logs and for the blocking endpoint's thread names.
    pub client_name: Option<String>,
    /// Read buffer size for socket reads.
    pub read_buffer_size: usize,
}

impl ConnectionConfig {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            client_name: None,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }

    pub fn with_client_name(mut self, name: impl Into<String>) -> Self {
        self.client_name = Some(name.into());
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size.clamp(MIN_READ_BUFFER_SIZE, MAX_READ_BUFFER_SIZE);
        self
    }
}

/// An async connection to a carpc role server.
///
/// Calls may be issued concurrently; replies are matched to callers by
/// `call_id` in [`read_loop`](Self::read_loop), which must be running in a
/// background task for any call to complete.
pub struct Connection {
    config: ConnectionConfig,
    /// Write half of the stream (for sending calls).
    writer: Mutex<Option<OwnedWriteHalf>>,
    /// Read half of the stream, taken by the read loop.
    reader: Mutex<Option<OwnedReadHalf>>,
    /// Calls waiting for their reply.
    pending: Mutex<HashMap<u64, oneshot::Sender<Frame>>>,
    /// Next call ID.
    next_id: AtomicU64,
    /// Is the connection established?
    connected: AtomicBool,
}

impl Connection {
    /// Creates a new connection (not yet connected).
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            writer: Mutex::new(None),
            reader: Mutex::new(None),
            pending: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            connected: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Connects to the server.
    pub async fn connect(&self) -> Result<(), ClientError> {
        tracing::debug!("Connecting to {}...", self.config.addr);

        let tcp_stream = tokio::time::timeout(
            self.config.connect_timeout,
            TcpStream::connect(self.config.addr),
        )
        .await
        .map_err(|_| {
            tracing::debug!("Connection timeout");
            ClientError::Timeout
        })?
        .map_err(|e| {
            tracing::debug!("Connection failed: {}", e);
            ClientError::Io(e)
        })?;

        tcp_stream.set_nodelay(true).ok();

        let (read_half, write_half) = tcp_stream.into_split();
        *self.writer.lock().await = Some(write_half);
        *self.reader.lock().await = Some(read_half);
        self.connected.store(true, Ordering::SeqCst);

        tracing::info!(
            client = self.config.client_name.as_deref().unwrap_or("-"),
            "Connected to {}",
            self.config.addr
        );
        Ok(())
    }

    /// Sends one call and waits for its reply.
    ///
    /// An error reply from the server is returned as
    /// `ClientError::Dispatch(DispatchError::Remote(_))`.
    pub async fn call(&self, method: &str, body: Vec<u8>) -> Result<Bytes, ClientError> {
        if !self.connected.load(Ordering::SeqCst) {
            tracing::debug!("call() made but not connected");
            return Err(ClientError::NotConnected);
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        tracing::debug!("Sending call id={} method={}", id, method);
        let encoded = Frame::call(id, method, body).encode()?;

        let (tx, rx) = oneshot::channel();
        {
            // `read_loop` and `close` clear `connected` before draining
            // `pending`, so a call registered under this lock is either
            // refused here or failed by the drain.
            let mut pending = self.pending.lock().await;
            if !self.connected.load(Ordering::SeqCst) {
                return Err(ClientError::ConnectionClosed);
            }
            pending.insert(id, tx);
        }

        let sent = {
            let mut writer_guard = self.writer.lock().await;
            match writer_guard.as_mut() {
                Some(writer) => writer.write_all(&encoded).await.map_err(ClientError::Io),
                None => Err(ClientError::NotConnected),
            }
        };
        if let Err(e) = sent {
            self.pending.lock().await.remove(&id);
            return Err(e);
        }
        tracing::debug!("Call id={} sent ({} bytes)", id, encoded.len());

        let reply = match tokio::time::timeout(self.config.request_timeout, rx).await {
            Ok(Ok(frame)) => frame,
            Ok(Err(_)) => {
                tracing::debug!("Call id={} channel closed", id);
                return Err(ClientError::ConnectionClosed);
            }
            Err(_) => {
                tracing::debug!("Call id={} timed out", id);
                self.pending.lock().await.remove(&id);
                return Err(ClientError::Timeout);
            }
        };

        match reply.into_outcome()? {
            Ok(body) => Ok(body),
            Err(remote) => Err(ClientError::Dispatch(DispatchError::Remote(remote))),
        }
    }

    /// Reads and dispatches replies (call this in a background task).
    ///
    /// Returns when the connection closes; every call still waiting at that
    /// point fails with `ConnectionClosed`.
    pub async fn read_loop(&self) -> Result<(), ClientError> {
        let mut reader = self
            .reader
            .lock()
            .await
            .take()
            .ok_or(ClientError::NotConnected)?;
        let result = self.pump(&mut reader).await;

        self.connected.store(false, Ordering::SeqCst);
        let mut pending = self.pending.lock().await;
        if !pending.is_empty() {
            tracing::debug!("read_loop: failing {} pending calls", pending.len());
        }
        pending.clear();
        result
    }

    async fn pump(&self, reader: &mut OwnedReadHalf) -> Result<(), ClientError> {
        let mut decoder = FrameDecoder::with_capacity(self.config.read_buffer_size);
        let mut buf = vec![0u8; self.config.read_buffer_size];

        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                tracing::debug!("read_loop: connection closed");
                return Err(ClientError::ConnectionClosed);
            }
            decoder.extend(&buf[..n]);

            while let Some(frame) = decoder.next_frame()? {
                if !frame.flags.is_reply() {
                    tracing::warn!("read_loop: ignoring non-reply frame {}", frame.method);
                    continue;
                }
                let id = frame.call_id;
                match self.pending.lock().await.remove(&id) {
                    Some(tx) => {
                        let _ = tx.send(frame);
                    }
                    None => tracing::debug!("read_loop: no pending call for id={}", id),
                }
            }
        }
    }

    /// Returns whether the connection is established.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Closes the connection.
    pub async fn close(&self) -> Result<(), ClientError> {
        tracing::debug!("Closing connection...");
        self.connected.store(false, Ordering::SeqCst);

        if let Some(mut writer) = self.writer.lock().await.take() {
            let _ = writer.shutdown().await;
        }
        let _ = self.reader.lock().await.take();

        let mut pending = self.pending.lock().await;
        tracing::debug!("Clearing {} pending calls", pending.len());
        pending.clear();
        Ok(())
    }

    /// Returns the number of pending calls.
    pub fn pending_count(&self) -> usize {
        self.pending.try_lock().map(|p| p.len()).unwrap_or(0)
    }
}

/// A blocking [`ClientEndpoint`] over a TCP [`Connection`].
///
/// Owns a small tokio runtime that drives the connection and its read loop,
/// so it can be used from synchronous code. It must not be used (or
/// dropped) from inside another tokio runtime.
pub struct TcpClientEndpoint {
    conn: Arc<Connection>,
    runtime: tokio::runtime::Runtime,
}

impl TcpClientEndpoint {
    /// Connects to `config.addr` and starts the read loop.
    pub fn connect(config: ConnectionConfig) -> Result<Self, ClientError> {
        let thread_name = match config.client_name {
            Some(ref name) => format!("carpc-{name}"),
            None => "carpc-client".to_string(),
        };
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name(thread_name)
            .enable_all()
            .build()?;

        let conn = Arc::new(Connection::new(config));
        runtime.block_on(conn.connect())?;

        let reader = conn.clone();
        runtime.spawn(async move {
            if let Err(e) = reader.read_loop().await {
                tracing::debug!("Read loop ended: {}", e);
            }
        });

        Ok(Self { conn, runtime })
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_connected()
    }

    pub fn connection(&self) -> Arc<Connection> {
        self.conn.clone()
    }

    /// Closes the connection. Later calls fail with `NotConnected`.
    pub fn close(&self) -> Result<(), ClientError> {
        self.runtime.block_on(self.conn.close())
    }
}

impl ClientEndpoint for TcpClientEndpoint {
    fn dispatch_sync(&self, method: &str, payload: Vec<u8>) -> Result<Vec<u8>, DispatchError> {
        match self.runtime.block_on(self.conn.call(method, payload)) {
            Ok(body) => Ok(body.to_vec()),
            Err(ClientError::Dispatch(e)) => Err(e),
            Err(e) => Err(DispatchError::transport(e)),
        }
    }
}
