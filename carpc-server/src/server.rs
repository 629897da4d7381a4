//! TCP server implementation.
//!
//! Each connection gets a reader loop and a writer task. Calls are handed to
//! the blocking thread pool as they arrive, so replies go out in completion
//! order and carry the caller's `call_id` for correlation.

use crate::config::{Config, NetworkConfig};
use crate::error::ServerError;
use crate::metrics::{run_metrics_server, Metrics};
use carpc_protocol::{
    ErrorCode, Frame, FrameDecoder, Handler, ProtocolError, RpcError, ServerEndpoint,
};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};

/// Replies queued per connection before handlers wait on the writer.
const REPLY_QUEUE_DEPTH: usize = 256;

/// Server configuration.
#[derive(Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Idle connection timeout.
    pub idle_timeout: Duration,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Metrics instance (if metrics are enabled).
    pub metrics: Option<Arc<Metrics>>,
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("bind_addr", &self.bind_addr)
            .field("idle_timeout", &self.idle_timeout)
            .field("max_connections", &self.max_connections)
            .field("metrics_enabled", &self.metrics.is_some())
            .finish()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from_network(&NetworkConfig::default())
    }
}

impl ServerConfig {
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            ..Default::default()
        }
    }

    /// Builds the listener settings from the `network` config section.
    pub fn from_network(network: &NetworkConfig) -> Self {
        Self {
            bind_addr: network.bind_addr,
            idle_timeout: network.idle_timeout(),
            max_connections: network.max_connections,
            metrics: None,
        }
    }

    /// Sets the idle timeout.
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Sets the metrics instance.
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Returns whether metrics are enabled.
    pub fn metrics_enabled(&self) -> bool {
        self.metrics.is_some()
    }
}

/// Server statistics.
#[derive(Debug, Default)]
pub struct ServerStats {
    pub connections_total: AtomicU64,
    pub connections_active: AtomicU64,
    pub calls_total: AtomicU64,
    pub errors_total: AtomicU64,
}

/// TCP transport for carpc role servers.
///
/// Adapters register their handlers through [`ServerEndpoint`] before
/// [`run`](Self::run) is called; handlers registered later are picked up by
/// the next call that names them.
pub struct RpcServer {
    config: ServerConfig,
    handlers: Arc<DashMap<String, Handler>>,
    stats: Arc<ServerStats>,
    shutdown: broadcast::Sender<()>,
    running: AtomicBool,
}

impl ServerEndpoint for RpcServer {
    fn handle(&self, method: &str, handler: Handler) -> Result<(), ProtocolError> {
        match self.handlers.entry(method.to_string()) {
            Entry::Occupied(_) => Err(ProtocolError::DuplicateHandler(method.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(handler);
                Ok(())
            }
        }
    }
}

impl RpcServer {
    /// Creates a new server.
    pub fn new(config: ServerConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config,
            handlers: Arc::new(DashMap::new()),
            stats: Arc::new(ServerStats::default()),
            shutdown: shutdown_tx,
            running: AtomicBool::new(false),
        }
    }

    /// Returns the registered operation names, sorted.
    pub fn methods(&self) -> Vec<String> {
        let mut methods: Vec<_> = self.handlers.iter().map(|e| e.key().clone()).collect();
        methods.sort();
        methods
    }

    /// Binds the configured address and runs the server.
    pub async fn run(&self) -> Result<(), ServerError> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.run_with_listener(listener).await
    }

    /// Runs the server on an already bound listener.
    pub async fn run_with_listener(&self, listener: TcpListener) -> Result<(), ServerError> {
        self.running.store(true, Ordering::SeqCst);
        tracing::info!(
            "Server listening on {} ({} operations)",
            listener.local_addr()?,
            self.handlers.len()
        );

        let mut shutdown_rx = self.shutdown.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((tcp_stream, addr)) => {
                            if self.stats.connections_active.load(Ordering::Relaxed)
                                >= self.config.max_connections as u64
                            {
                                tracing::warn!("Connection limit reached, rejecting {}", addr);
                                continue;
                            }

                            self.stats.connections_total.fetch_add(1, Ordering::Relaxed);
                            self.stats.connections_active.fetch_add(1, Ordering::Relaxed);
                            if let Some(ref metrics) = self.config.metrics {
                                metrics.connections_total.inc();
                                metrics.connections_active.inc();
                            }

                            let handlers = self.handlers.clone();
                            let stats = self.stats.clone();
                            let config = self.config.clone();
                            let mut conn_shutdown = self.shutdown.subscribe();

                            tokio::spawn(async move {
                                let result = Self::handle_connection(
                                    tcp_stream,
                                    addr,
                                    handlers,
                                    stats.clone(),
                                    config.clone(),
                                    &mut conn_shutdown,
                                )
                                .await;

                                if let Err(e) = result {
                                    tracing::debug!("Connection {} error: {}", addr, e);
                                    stats.errors_total.fetch_add(1, Ordering::Relaxed);
                                }

                                stats.connections_active.fetch_sub(1, Ordering::Relaxed);
                                if let Some(ref metrics) = config.metrics {
                                    metrics.connections_active.dec();
                                }

                                tracing::info!("Client disconnected: {}", addr);
                            });
                        }
                        Err(e) => {
                            tracing::error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    tracing::info!("Server shutting down");
                    break;
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Handles a single connection.
    async fn handle_connection(
        stream: TcpStream,
        addr: SocketAddr,
        handlers: Arc<DashMap<String, Handler>>,
        stats: Arc<ServerStats>,
        config: ServerConfig,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> Result<(), ServerError> {
        tracing::info!("Client connected: {}", addr);
        stream.set_nodelay(true)?;

        let (mut reader, writer) = stream.into_split();
        let (reply_tx, reply_rx) = mpsc::channel::<Frame>(REPLY_QUEUE_DEPTH);
        let writer_task = tokio::spawn(Self::write_replies(writer, reply_rx, addr));

        let in_flight = Arc::new(AtomicUsize::new(0));
        let mut decoder = FrameDecoder::new();
        let mut buf = [0u8; 8192];
        let mut last_activity = Instant::now();

        let result = loop {
            tokio::select! {
                result = reader.read(&mut buf) => {
                    match result {
                        Ok(0) => {
                            tracing::debug!("[{}] Connection closed by client", addr);
                            break Ok(());
                        }
                        Ok(n) => {
                            tracing::trace!("[{}] Received {} bytes", addr, n);
                            last_activity = Instant::now();
                            decoder.extend(&buf[..n]);
                        }
                        Err(e) => {
                            tracing::debug!("[{}] Read error: {}", addr, e);
                            break Err(ServerError::Io(e));
                        }
                    }
                }

                _ = tokio::time::sleep(config.idle_timeout) => {
                    if in_flight.load(Ordering::SeqCst) == 0
                        && last_activity.elapsed() >= config.idle_timeout
                    {
                        tracing::debug!("[{}] Idle timeout", addr);
                        break Ok(());
                    }
                    continue;
                }

                _ = shutdown.recv() => {
                    tracing::debug!("[{}] Shutdown signal received", addr);
                    writer_task.abort();
                    return Err(ServerError::ShuttingDown);
                }
            }

            // A framing error leaves the stream unsynchronised, so it ends
            // the connection.
            let mut failed = None;
            loop {
                match decoder.next_frame() {
                    Ok(Some(frame)) => Self::dispatch(
                        frame,
                        addr,
                        &handlers,
                        &stats,
                        &config,
                        &in_flight,
                        &reply_tx,
                    ),
                    Ok(None) => break,
                    Err(e) => {
                        tracing::warn!("[{}] Dropping connection: {}", addr, e);
                        failed = Some(e);
                        break;
                    }
                }
            }
            if let Some(e) = failed {
                break Err(ServerError::Protocol(e));
            }
        };

        // In-flight handlers hold their own senders; the writer drains them
        // and exits once the last one is dropped.
        drop(reply_tx);
        if result.is_ok() {
            let _ = writer_task.await;
        }
        result
    }

    /// Routes one incoming frame to its handler.
    fn dispatch(
        frame: Frame,
        addr: SocketAddr,
        handlers: &DashMap<String, Handler>,
        stats: &Arc<ServerStats>,
        config: &ServerConfig,
        in_flight: &Arc<AtomicUsize>,
        reply_tx: &mpsc::Sender<Frame>,
    ) {
        if frame.flags.is_reply() {
            tracing::warn!(
                "[{}] Ignoring reply frame for {} (id={})",
                addr,
                frame.method,
                frame.call_id
            );
            return;
        }

        stats.calls_total.fetch_add(1, Ordering::Relaxed);
        tracing::debug!("[{}] Call: {} (id={})", addr, frame.method, frame.call_id);

        let handler = handlers.get(&frame.method).map(|h| h.value().clone());
        let Some(handler) = handler else {
            tracing::warn!("[{}] Unknown operation: {}", addr, frame.method);
            stats.errors_total.fetch_add(1, Ordering::Relaxed);
            let error = RpcError::unknown_operation(&frame.method);
            if let Some(ref metrics) = config.metrics {
                metrics
                    .errors_total
                    .with_label_values(&[error.code.to_string().as_str()])
                    .inc();
            }
            let reply_tx = reply_tx.clone();
            tokio::spawn(Self::queue_reply(reply_tx, frame.call_id, frame.method, Err(error)));
            return;
        };

        in_flight.fetch_add(1, Ordering::SeqCst);
        let in_flight = in_flight.clone();
        let stats = stats.clone();
        let reply_tx = reply_tx.clone();
        tokio::spawn(async move {
            let Frame {
                call_id,
                method,
                body,
                ..
            } = frame;
            let outcome = tokio::task::spawn_blocking(move || handler(&body[..]))
                .await
                .unwrap_or_else(|e| {
                    Err(RpcError::new(
                        ErrorCode::InternalError,
                        format!("handler panicked: {e}"),
                    ))
                });
            if outcome.is_err() {
                stats.errors_total.fetch_add(1, Ordering::Relaxed);
            }
            Self::queue_reply(reply_tx, call_id, method, outcome).await;
            in_flight.fetch_sub(1, Ordering::SeqCst);
        });
    }

    async fn queue_reply(
        reply_tx: mpsc::Sender<Frame>,
        call_id: u64,
        method: String,
        outcome: Result<Vec<u8>, RpcError>,
    ) {
        let frame = match outcome {
            Ok(body) => Ok(Frame::reply(call_id, method, body)),
            Err(error) => Frame::error_reply(call_id, method, &error),
        };
        match frame {
            Ok(frame) => {
                if reply_tx.send(frame).await.is_err() {
                    tracing::debug!("Connection gone before reply {} was sent", call_id);
                }
            }
            Err(e) => tracing::error!("Failed to build reply {}: {}", call_id, e),
        }
    }

    /// Writes queued replies until every sender is dropped or the peer goes away.
    async fn write_replies(
        mut writer: OwnedWriteHalf,
        mut replies: mpsc::Receiver<Frame>,
        addr: SocketAddr,
    ) {
        while let Some(frame) = replies.recv().await {
            let bytes = match frame.encode() {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::error!("[{}] Failed to encode reply {}: {}", addr, frame.call_id, e);
                    let error = RpcError::new(ErrorCode::EncodeFailed, e.to_string());
                    match Frame::error_reply(frame.call_id, frame.method, &error)
                        .and_then(|f| f.encode())
                    {
                        Ok(bytes) => bytes,
                        Err(_) => continue,
                    }
                }
            };
            tracing::trace!("[{}] Writing {} bytes", addr, bytes.len());
            if let Err(e) = writer.write_all(&bytes).await {
                tracing::debug!("[{}] Write error: {}", addr, e);
                return;
            }
        }
        let _ = writer.shutdown().await;
    }

    /// Initiates server shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(());
    }

    /// Returns a receiver that fires when shutdown is initiated.
    pub fn subscribe_shutdown(&self) -> broadcast::Receiver<()> {
        self.shutdown.subscribe()
    }

    /// Returns whether the server is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Returns server statistics.
    pub fn stats(&self) -> &ServerStats {
        &self.stats
    }
}

/// Runs `server` with the process-level pieces around it: the metrics HTTP
/// server when enabled, and shutdown on Ctrl-C.
///
/// Handlers must already be bound.
pub async fn serve(
    config: &Config,
    server: Arc<RpcServer>,
    metrics: Option<Arc<Metrics>>,
) -> Result<(), ServerError> {
    if let Some(role) = config.role {
        let missing: Vec<_> = role
            .operations()
            .iter()
            .map(|spec| spec.method.as_str())
            .filter(|name| !server.handlers.contains_key(*name))
            .collect();
        if !missing.is_empty() {
            tracing::warn!("{} handlers not bound: {}", role, missing.join(", "));
        }
    }

    let metrics_handle = match (config.metrics.enabled, metrics) {
        (true, Some(metrics)) => {
            let listener = TcpListener::bind(config.metrics.bind_addr).await?;
            let shutdown = server.subscribe_shutdown();
            Some(tokio::spawn(async move {
                if let Err(e) = run_metrics_server(listener, metrics, shutdown).await {
                    tracing::error!("Metrics server error: {}", e);
                }
            }))
        }
        (true, None) => {
            tracing::warn!("Metrics enabled but no registry supplied");
            None
        }
        _ => None,
    };

    let signal_server = server.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Received shutdown signal, stopping server...");
        signal_server.shutdown();
    });

    server.run().await?;

    if let Some(handle) = metrics_handle {
        let _ = handle.await;
    }
    tracing::info!("Server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;
    use std::sync::Barrier;

    async fn start(server: RpcServer) -> (Arc<RpcServer>, SocketAddr) {
        let server = Arc::new(server);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let running = server.clone();
        tokio::spawn(async move { running.run_with_listener(listener).await });
        (server, addr)
    }

    fn echo_server() -> RpcServer {
        let server = RpcServer::new(ServerConfig::new("127.0.0.1:0".parse().unwrap()));
        server
            .handle("Echo", Arc::new(|body: &[u8]| Ok(body.to_vec())))
            .unwrap();
        server
    }

    async fn send(stream: &mut TcpStream, frame: Frame) {
        stream
            .write_all(&frame.encode().unwrap())
            .await
            .unwrap();
    }

    async fn recv(stream: &mut TcpStream, decoder: &mut FrameDecoder) -> Option<Frame> {
        let mut buf = [0u8; 4096];
        loop {
            if let Some(frame) = decoder.next_frame().unwrap() {
                return Some(frame);
            }
            let n = stream.read(&mut buf).await.unwrap();
            if n == 0 {
                return None;
            }
            decoder.extend(&buf[..n]);
        }
    }

    #[test]
    fn test_duplicate_handler() {
        let server = echo_server();
        let err = server
            .handle("Echo", Arc::new(|_: &[u8]| Ok(Vec::new())))
            .unwrap_err();
        assert!(matches!(err, ProtocolError::DuplicateHandler(_)));
        assert_eq!(server.methods(), vec!["Echo"]);
    }

    #[test]
    fn test_config_from_network() {
        let network = NetworkConfig {
            idle_timeout_secs: 5,
            max_connections: 2,
            ..NetworkConfig::default()
        };
        let config = ServerConfig::from_network(&network);
        assert_eq!(config.idle_timeout, Duration::from_secs(5));
        assert_eq!(config.max_connections, 2);
        assert!(!config.metrics_enabled());
    }

    #[tokio::test]
    async fn test_call_and_reply() {
        let (server, addr) = start(echo_server()).await;
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let mut decoder = FrameDecoder::new();

        send(&mut stream, Frame::call(7, "Echo", &b"ping"[..])).await;
        let reply = recv(&mut stream, &mut decoder).await.unwrap();
        assert!(reply.flags.is_reply());
        assert_eq!(reply.call_id, 7);
        assert_eq!(reply.into_outcome().unwrap().unwrap().as_ref(), b"ping");

        assert!(server.is_running());
        assert_eq!(server.stats().calls_total.load(Ordering::Relaxed), 1);
        server.shutdown();
    }

    #[tokio::test]
    async fn test_unknown_operation() {
        let (server, addr) = start(echo_server()).await;
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let mut decoder = FrameDecoder::new();

        send(&mut stream, Frame::call(1, "Nope", Vec::new())).await;
        let reply = recv(&mut stream, &mut decoder).await.unwrap();
        let err = reply.into_outcome().unwrap().unwrap_err();
        assert_eq!(err.code, ErrorCode::UnknownOperation);
        assert_eq!(err.message, "unknown operation: Nope");
        server.shutdown();
    }

    #[tokio::test]
    async fn test_handler_error_is_forwarded() {
        let server = RpcServer::new(ServerConfig::default());
        server
            .handle(
                "Fail",
                Arc::new(|_: &[u8]| Err(RpcError::new(ErrorCode::NotFound, "serial 00"))),
            )
            .unwrap();
        let (server, addr) = start(server).await;
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let mut decoder = FrameDecoder::new();

        send(&mut stream, Frame::call(3, "Fail", Vec::new())).await;
        let reply = recv(&mut stream, &mut decoder).await.unwrap();
        assert!(reply.flags.is_error());
        let err = reply.into_outcome().unwrap().unwrap_err();
        assert_eq!(err, RpcError::new(ErrorCode::NotFound, "serial 00"));
        server.shutdown();
    }

    #[tokio::test]
    async fn test_replies_complete_out_of_order() {
        let gate = Arc::new(Barrier::new(2));
        let server = RpcServer::new(ServerConfig::default());
        let slow_gate = gate.clone();
        server
            .handle(
                "Slow",
                Arc::new(move |_: &[u8]| {
                    slow_gate.wait();
                    Ok(b"slow".to_vec())
                }),
            )
            .unwrap();
        let fast_gate = gate.clone();
        server
            .handle(
                "Fast",
                Arc::new(move |_: &[u8]| {
                    // Released only after this reply is queued.
                    let gate = fast_gate.clone();
                    std::thread::spawn(move || {
                        std::thread::sleep(Duration::from_millis(50));
                        gate.wait();
                    });
                    Ok(b"fast".to_vec())
                }),
            )
            .unwrap();
        let (server, addr) = start(server).await;
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let mut decoder = FrameDecoder::new();

        send(&mut stream, Frame::call(1, "Slow", Vec::new())).await;
        send(&mut stream, Frame::call(2, "Fast", Vec::new())).await;

        let first = recv(&mut stream, &mut decoder).await.unwrap();
        let second = recv(&mut stream, &mut decoder).await.unwrap();
        assert_eq!(first.call_id, 2);
        assert_eq!(second.call_id, 1);
        server.shutdown();
    }

    #[tokio::test]
    async fn test_corrupt_frame_closes_connection() {
        let (server, addr) = start(echo_server()).await;
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let mut decoder = FrameDecoder::new();

        let mut bytes = Frame::call(1, "Echo", &b"x"[..]).encode().unwrap();
        bytes[0] = b'X';
        stream.write_all(&bytes).await.unwrap();

        assert!(recv(&mut stream, &mut decoder).await.is_none());
        server.shutdown();
    }

    #[tokio::test]
    async fn test_idle_timeout() {
        let config = ServerConfig::default().with_idle_timeout(Duration::from_millis(100));
        let server = RpcServer::new(config);
        let (server, addr) = start(server).await;
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let mut decoder = FrameDecoder::new();

        let closed = tokio::time::timeout(
            Duration::from_secs(5),
            recv(&mut stream, &mut decoder),
        )
        .await
        .unwrap();
        assert!(closed.is_none());
        server.shutdown();
    }

    #[tokio::test]
    async fn test_pipelined_calls_in_one_write() {
        let (server, addr) = start(echo_server()).await;
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let mut decoder = FrameDecoder::new();

        let mut bytes = BytesMut::new();
        for id in 0..5u64 {
            bytes.extend_from_slice(&Frame::call(id, "Echo", vec![id as u8]).encode().unwrap());
        }
        stream.write_all(&bytes).await.unwrap();

        let mut seen = Vec::new();
        for _ in 0..5 {
            let frame = recv(&mut stream, &mut decoder).await.unwrap();
            assert_eq!(frame.body.as_ref(), &[frame.call_id as u8]);
            seen.push(frame.call_id);
        }
        seen.sort();
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
        server.shutdown();
    }

    #[tokio::test]
    async fn test_shutdown_stops_run() {
        let server = Arc::new(echo_server());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let running = server.clone();
        let handle = tokio::spawn(async move { running.run_with_listener(listener).await });

        while !server.is_running() {
            tokio::task::yield_now().await;
        }
        server.shutdown();
        handle.await.unwrap().unwrap();
        assert!(!server.is_running());
    }
}
