use crate::frame::FrameDecoder;
use loghive_core::config::IngestionConfig;
use loghive_core::{ConnectionGauge, IngestionError, Record, RecordHandler};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Limits applied to every accepted connection
#[derive(Debug, Clone, Copy)]
pub struct ConnectionSettings {
    pub max_frame_size: usize,
    /// Zero disables the timeout
    pub partial_frame_timeout: Duration,
    pub read_buffer_size: usize,
}

impl From<&IngestionConfig> for ConnectionSettings {
    fn from(config: &IngestionConfig) -> Self {
        Self {
            max_frame_size: config.max_frame_size,
            partial_frame_timeout: config.partial_frame_timeout(),
            read_buffer_size: config.read_buffer_size.max(1024),
        }
    }
}

/// TCP listener accepting framed records from forwarders
pub struct TcpIngestion {
    config: IngestionConfig,
    handler: Arc<dyn RecordHandler>,
    gauge: ConnectionGauge,
}

impl TcpIngestion {
    /// Create a new TCP ingestion listener
    pub fn new(
        config: IngestionConfig,
        handler: Arc<dyn RecordHandler>,
        gauge: ConnectionGauge,
    ) -> Self {
        Self {
            config,
            handler,
            gauge,
        }
    }

    /// Get the full bind address (ip:port)
    pub fn bind_addr(&self) -> String {
        self.config.bind_addr()
    }

    /// Handle onto the live connection counters
    pub fn gauge(&self) -> &ConnectionGauge {
        &self.gauge
    }

    /// Bind the configured address and accept connections until the task is dropped
    pub async fn run(self) -> Result<(), IngestionError> {
        let addr = self.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| IngestionError::Bind {
                address: addr.clone(),
                source: e,
            })?;

        info!(address = %addr, "TCP listener started");
        self.serve(listener).await
    }

    /// Accept connections on an already bound listener
    pub async fn serve(self, listener: TcpListener) -> Result<(), IngestionError> {
        let settings = ConnectionSettings::from(&self.config);
        let max_connections = self.config.max_connections;

        loop {
            match listener.accept().await {
                Ok((stream, peer_addr)) => {
                    if max_connections > 0 && self.gauge.active() >= max_connections {
                        warn!(
                            peer = %peer_addr,
                            max = max_connections,
                            "Max connections reached, rejecting"
                        );
                        drop(stream);
                        continue;
                    }

                    let guard = self.gauge.open();
                    let handler = Arc::clone(&self.handler);
                    let peer_str = peer_addr.to_string();

                    info!(peer = %peer_addr, active = self.gauge.active(), "New TCP connection");

                    tokio::spawn(async move {
                        let _guard = guard;
                        match handle_tcp_connection(stream, &peer_str, handler, settings).await {
                            Ok(records) => {
                                debug!(peer = %peer_str, records, "Connection closed")
                            }
                            Err(e) => warn!(peer = %peer_str, error = %e, "Connection error"),
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }
}

/// Handle a single TCP connection
///
/// Returns the number of records stored once the peer disconnects. Bytes of
/// an unfinished frame are discarded with the connection.
async fn handle_tcp_connection(
    mut stream: TcpStream,
    peer_addr: &str,
    handler: Arc<dyn RecordHandler>,
    settings: ConnectionSettings,
) -> Result<u64, IngestionError> {
    let mut decoder = FrameDecoder::new(settings.max_frame_size);
    let mut count = 0;
    // Set while a partial frame is buffered; the frame must be complete by then
    let mut deadline: Option<Instant> = None;

    loop {
        decoder.buffer_mut().reserve(settings.read_buffer_size);

        let read = match deadline {
            Some(deadline) => {
                tokio::time::timeout_at(deadline, stream.read_buf(decoder.buffer_mut()))
                    .await
                    .map_err(|_| {
                        IngestionError::PartialFrameTimeout(settings.partial_frame_timeout)
                    })??
            }
            None => stream.read_buf(decoder.buffer_mut()).await?,
        };

        if read == 0 {
            if decoder.has_partial() {
                debug!(
                    peer = %peer_addr,
                    discarded = decoder.buffered(),
                    "Peer closed mid-frame"
                );
            }
            return Ok(count);
        }

        let mut batch = Vec::new();
        let mut fatal = None;
        let mut completed = 0;
        for result in decoder.frames() {
            completed += 1;
            match result {
                Ok(record) => batch.push(record),
                Err(e) if e.is_fatal() => {
                    fatal = Some(e);
                    break;
                }
                Err(e) => {
                    warn!(peer = %peer_addr, error = %e, "Dropping malformed frame");
                }
            }
        }

        if !batch.is_empty() {
            count += dispatch(&handler, batch, peer_addr).await?;
        }

        if let Some(e) = fatal {
            return Err(e.into());
        }

        deadline = if !decoder.has_partial() || settings.partial_frame_timeout.is_zero() {
            None
        } else if completed > 0 || deadline.is_none() {
            Some(Instant::now() + settings.partial_frame_timeout)
        } else {
            deadline
        };
    }
}

/// Run the handler over a batch on the blocking pool, preserving order
async fn dispatch(
    handler: &Arc<dyn RecordHandler>,
    records: Vec<Record>,
    peer_addr: &str,
) -> Result<u64, IngestionError> {
    let handler = Arc::clone(handler);
    let peer = peer_addr.to_string();

    tokio::task::spawn_blocking(move || {
        let mut stored = 0;
        for record in records {
            debug!(peer = %peer, sequence = record.sequence, "Received record via TCP");
            match handler.handle(record) {
                Ok(()) => stored += 1,
                Err(e) => {
                    warn!(peer = %peer, handler = handler.name(), error = %e, "Failed to store record")
                }
            }
        }
        stored
    })
    .await
    .map_err(|e| IngestionError::Handler(e.to_string()))
}
