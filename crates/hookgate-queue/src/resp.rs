//! Minimal RESP2 transport for Redis-compatible queue backends.
//!
//! Only what liveness needs: connect, `AUTH`, `SELECT`, and `PING`. The
//! queue payloads themselves are produced and consumed by the execution
//! collaborators, not by this crate.

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufStream};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::time::timeout;
use tracing::debug;

use crate::error::{TransportError, TransportErrorKind};
use crate::transport::{QueueSession, QueueTransport};

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(5);
const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(3);

/// Longest reply line accepted, CRLF excluded. Handshake replies are short.
const MAX_LINE_LEN: usize = 4 * 1024;
/// Largest bulk payload accepted.
const MAX_BULK_LEN: usize = 4 * 1024;

/// Where the backend lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Topology {
    Single { host: String, port: u16 },
    /// Nodes are tried in order; the first that answers is used.
    Cluster { nodes: Vec<(String, u16)> },
}

/// Connection settings for [`RespTransport`].
#[derive(Debug, Clone)]
pub struct RedisSettings {
    pub topology: Topology,
    /// Database index, only honored on single-node topology.
    pub db: u32,
    pub username: Option<String>,
    pub password: Option<String>,
    pub connect_timeout: Duration,
    pub keepalive_interval: Duration,
    pub reply_timeout: Duration,
}

impl RedisSettings {
    pub fn single(host: impl Into<String>, port: u16) -> Self {
        Self::with_topology(Topology::Single {
            host: host.into(),
            port,
        })
    }

    pub fn cluster(nodes: Vec<(String, u16)>) -> Self {
        Self::with_topology(Topology::Cluster { nodes })
    }

    fn with_topology(topology: Topology) -> Self {
        Self {
            topology,
            db: 0,
            username: None,
            password: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            keepalive_interval: DEFAULT_KEEPALIVE_INTERVAL,
            reply_timeout: DEFAULT_REPLY_TIMEOUT,
        }
    }

    pub fn with_db(mut self, db: u32) -> Self {
        self.db = db;
        self
    }

    pub fn with_credentials(mut self, username: Option<String>, password: Option<String>) -> Self {
        self.username = username.filter(|u| !u.is_empty());
        self.password = password.filter(|p| !p.is_empty());
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_keepalive_interval(mut self, interval: Duration) -> Self {
        self.keepalive_interval = interval;
        self
    }
}

/// RESP2 client transport.
#[derive(Debug, Clone)]
pub struct RespTransport {
    settings: RedisSettings,
}

impl RespTransport {
    pub fn new(settings: RedisSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &RedisSettings {
        &self.settings
    }

    async fn connect_node(&self, host: &str, port: u16, select_db: bool) -> Result<QueueSession, TransportError> {
        let node = format!("{}:{}", host, port);
        let settings = &self.settings;

        let stream = timeout(settings.connect_timeout, TcpStream::connect((host, port)))
            .await
            .map_err(|_| TransportError::new(TransportErrorKind::Timeout, &node, "connect timed out"))?
            .map_err(|e| TransportError::from_io(&node, &e))?;
        let _ = stream.set_nodelay(true);

        let mut conn = RespConnection::new(stream, node.clone(), settings.reply_timeout);

        if let Some(password) = &settings.password {
            let reply = match &settings.username {
                Some(user) => conn.command(&["AUTH", user, password]).await?,
                None => conn.command(&["AUTH", password]).await?,
            };
            match reply {
                Reply::Simple(ok) if ok == "OK" => {}
                Reply::Error(msg) => {
                    return Err(TransportError::new(TransportErrorKind::Auth, &node, msg));
                }
                other => return Err(conn.unexpected("AUTH", &other)),
            }
        }

        if select_db && settings.db != 0 {
            let db = settings.db.to_string();
            match conn.command(&["SELECT", &db]).await? {
                Reply::Simple(ok) if ok == "OK" => {}
                other => return Err(conn.unexpected("SELECT", &other)),
            }
        }

        conn.ping().await?;
        debug!(node = %node, "queue backend handshake complete");

        let (tx, rx) = oneshot::channel();
        let interval = settings.keepalive_interval;
        let task = tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                if let Err(err) = conn.ping().await {
                    let _ = tx.send(err);
                    return;
                }
            }
        });

        Ok(QueueSession::new(node, rx).with_task(task))
    }
}

#[async_trait]
impl QueueTransport for RespTransport {
    fn describe(&self) -> String {
        match &self.settings.topology {
            Topology::Single { host, port } => format!("redis://{}:{}/{}", host, port, self.settings.db),
            Topology::Cluster { nodes } => format!("redis cluster ({} nodes)", nodes.len()),
        }
    }

    async fn connect(&self) -> Result<QueueSession, TransportError> {
        match &self.settings.topology {
            Topology::Single { host, port } => self.connect_node(host, *port, true).await,
            Topology::Cluster { nodes } => {
                let mut last_error = TransportError::new(
                    TransportErrorKind::Io,
                    "cluster",
                    "no cluster nodes configured",
                );
                for (host, port) in nodes {
                    match self.connect_node(host, *port, false).await {
                        Ok(session) => return Ok(session),
                        Err(err) => {
                            debug!(node = %err.node, error = %err, "cluster node unavailable");
                            last_error = err;
                        }
                    }
                }
                Err(last_error)
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Wire format
// ─────────────────────────────────────────────────────────────────────────────

/// A decoded RESP2 reply (arrays are not needed by any command we send).
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Reply {
    Simple(String),
    Error(String),
    Integer(i64),
    Bulk(Option<Vec<u8>>),
}

/// Encode a command as a RESP array of bulk strings.
pub(crate) fn encode_command(args: &[&str]) -> Vec<u8> {
    let mut out = format!("*{}\r\n", args.len()).into_bytes();
    for arg in args {
        out.extend_from_slice(format!("${}\r\n", arg.len()).as_bytes());
        out.extend_from_slice(arg.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    out
}

pub(crate) struct RespConnection<S> {
    stream: BufStream<S>,
    node: String,
    reply_timeout: Duration,
}

impl<S: AsyncRead + AsyncWrite + Unpin> RespConnection<S> {
    pub(crate) fn new(stream: S, node: String, reply_timeout: Duration) -> Self {
        Self {
            stream: BufStream::new(stream),
            node,
            reply_timeout,
        }
    }

    pub(crate) async fn command(&mut self, args: &[&str]) -> Result<Reply, TransportError> {
        let request = encode_command(args);
        let node = self.node.clone();
        timeout(self.reply_timeout, async {
            self.stream
                .write_all(&request)
                .await
                .map_err(|e| TransportError::from_io(&node, &e))?;
            self.stream
                .flush()
                .await
                .map_err(|e| TransportError::from_io(&node, &e))?;
            self.read_reply().await
        })
        .await
        .map_err(|_| {
            TransportError::new(
                TransportErrorKind::Timeout,
                &node,
                format!("no reply to {} within {:?}", args[0], self.reply_timeout),
            )
        })?
    }

    pub(crate) async fn ping(&mut self) -> Result<(), TransportError> {
        match self.command(&["PING"]).await? {
            Reply::Simple(pong) if pong == "PONG" => Ok(()),
            Reply::Error(msg) if msg.starts_with("NOAUTH") => {
                Err(TransportError::new(TransportErrorKind::Auth, &self.node, msg))
            }
            other => Err(self.unexpected("PING", &other)),
        }
    }

    fn unexpected(&self, command: &str, reply: &Reply) -> TransportError {
        let kind = match reply {
            Reply::Error(msg) if msg.starts_with("NOAUTH") || msg.starts_with("WRONGPASS") => {
                TransportErrorKind::Auth
            }
            _ => TransportErrorKind::Protocol,
        };
        TransportError::new(kind, &self.node, format!("unexpected reply to {}: {:?}", command, reply))
    }

    async fn read_line(&mut self) -> Result<String, TransportError> {
        let mut buf = Vec::new();
        let n = (&mut self.stream)
            .take(MAX_LINE_LEN as u64 + 2)
            .read_until(b'\n', &mut buf)
            .await
            .map_err(|e| TransportError::from_io(&self.node, &e))?;
        if n == 0 {
            return Err(TransportError::new(
                TransportErrorKind::Closed,
                &self.node,
                "connection closed by peer",
            ));
        }
        if !buf.ends_with(b"\n") && buf.len() > MAX_LINE_LEN {
            return Err(self.protocol("reply line too long"));
        }
        if !buf.ends_with(b"\r\n") {
            return Err(self.protocol("reply line not terminated by CRLF"));
        }
        buf.truncate(buf.len() - 2);
        String::from_utf8(buf).map_err(|_| self.protocol("reply line is not UTF-8"))
    }

    async fn read_reply(&mut self) -> Result<Reply, TransportError> {
        let line = self.read_line().await?;
        let Some(prefix) = line.get(..1) else {
            return Err(self.protocol("empty reply line"));
        };
        let rest = &line[1..];
        match prefix {
            "+" => Ok(Reply::Simple(rest.to_string())),
            "-" => Ok(Reply::Error(rest.to_string())),
            ":" => rest
                .parse()
                .map(Reply::Integer)
                .map_err(|_| self.protocol("invalid integer reply")),
            "$" => {
                let len: i64 = rest.parse().map_err(|_| self.protocol("invalid bulk length"))?;
                if len < 0 {
                    return Ok(Reply::Bulk(None));
                }
                let len = usize::try_from(len)
                    .ok()
                    .filter(|len| *len <= MAX_BULK_LEN)
                    .ok_or_else(|| self.protocol("bulk reply too large"))?;
                let mut data = vec![0u8; len + 2];
                self.stream
                    .read_exact(&mut data)
                    .await
                    .map_err(|e| TransportError::from_io(&self.node, &e))?;
                if !data.ends_with(b"\r\n") {
                    return Err(self.protocol("bulk reply not terminated by CRLF"));
                }
                data.truncate(len);
                Ok(Reply::Bulk(Some(data)))
            }
            _ => Err(self.protocol(&format!("unsupported reply type '{}'", prefix))),
        }
    }

    fn protocol(&self, message: &str) -> TransportError {
        TransportError::new(TransportErrorKind::Protocol, &self.node, message)
    }
}
