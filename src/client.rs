//! A datagram query client for the server under test.
//!
//! The client sends one question per request over a fresh connectionless
//! socket and waits for a matching reply within an explicit timeout,
//! retrying a bounded number of times. Timeout and retry budgets are per
//! call so tests can tune their patience per scenario.

#![warn(missing_docs)]

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::time::{timeout, Duration, Instant};
use tracing::trace;

use crate::wire::{build_query, Qtype, Rcode, ResponseHeader};

//------------ Configuration Constants ---------------------------------------

/// Configuration limits for the read timeout.
const READ_TIMEOUT: DefMinMax<Duration> = DefMinMax::new(
    Duration::from_secs(5),
    Duration::from_millis(1),
    Duration::from_secs(60),
);

/// Configuration limits for the maximum number of tries.
const MAX_TRIES: DefMinMax<u8> = DefMinMax::new(3, 1, 100);

/// Receive buffer size. Large enough for any answer we care about.
const RECV_SIZE: usize = 2000;

//------------ Config --------------------------------------------------------

/// Configuration for a datagram query client.
#[derive(Clone, Debug)]
pub struct Config {
    /// Read timeout per try.
    read_timeout: Duration,

    /// Maximum number of tries.
    max_tries: u8,
}

impl Config {
    /// Creates a new config with default values.
    pub fn new() -> Self {
        Default::default()
    }

    /// Returns the read timeout.
    ///
    /// The read timeout is the maximum amount of time to wait for a
    /// response to a single transmission of the request.
    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    /// Sets the read timeout.
    ///
    /// If this value is too small or too large, it will be capped.
    pub fn set_read_timeout(&mut self, value: Duration) {
        self.read_timeout = READ_TIMEOUT.limit(value)
    }

    /// Returns the number of times a request is sent before giving up.
    pub fn max_tries(&self) -> u8 {
        self.max_tries
    }

    /// Sets the maximum number of tries.
    ///
    /// If this value is too small or too large, it will be capped.
    pub fn set_max_tries(&mut self, value: u8) {
        self.max_tries = MAX_TRIES.limit(value)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            read_timeout: READ_TIMEOUT.default(),
            max_tries: MAX_TRIES.default(),
        }
    }
}

//------------ Response ------------------------------------------------------

/// A response to a query.
///
/// Only the header is decoded; the raw message stays available for
/// diagnostics.
#[derive(Clone, Debug)]
pub struct Response {
    /// The decoded header.
    header: ResponseHeader,

    /// The raw message octets.
    payload: Bytes,
}

impl Response {
    /// Returns the response code.
    pub fn rcode(&self) -> Rcode {
        self.header.rcode()
    }

    /// Returns the number of answer records.
    pub fn answer_count(&self) -> u16 {
        self.header.ancount()
    }

    /// Returns the number of authority records.
    pub fn authority_count(&self) -> u16 {
        self.header.nscount()
    }

    /// Returns the number of additional records.
    pub fn additional_count(&self) -> u16 {
        self.header.arcount()
    }

    /// Returns the raw message octets.
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }
}

//------------ DgramClient ---------------------------------------------------

/// A query client talking to one server over a connectionless transport.
#[derive(Clone, Debug)]
pub struct DgramClient {
    /// The address of the server under test.
    server: SocketAddr,

    /// User configuration variables.
    config: Config,
}

impl DgramClient {
    /// Creates a client with default configuration.
    pub fn new(server: SocketAddr) -> Self {
        Self::with_config(server, Config::default())
    }

    /// Creates a client with the given configuration.
    pub fn with_config(server: SocketAddr, config: Config) -> Self {
        DgramClient { server, config }
    }

    /// Returns the address of the server under test.
    pub fn server(&self) -> SocketAddr {
        self.server
    }

    /// Sends a query using the configured timeout and try budget.
    pub async fn query(
        &self,
        qname: &str,
        qtype: Qtype,
    ) -> Result<Response, QueryError> {
        self.query_with(
            qname,
            qtype,
            self.config.read_timeout,
            self.config.max_tries,
        )
        .await
    }

    /// Sends a query with an explicit timeout and try budget.
    ///
    /// The request is transmitted up to `tries` times. After each
    /// transmission the client waits at most `read_timeout` for a reply
    /// carrying the request's id; garbage and mismatched replies are
    /// ignored. A try budget of zero is treated as one.
    pub async fn query_with(
        &self,
        qname: &str,
        qtype: Qtype,
        read_timeout: Duration,
        tries: u8,
    ) -> Result<Response, QueryError> {
        let id = rand::random::<u16>();
        let request = build_query(id, qname, qtype)
            .map_err(QueryError::ComposeError)?;
        let tries = tries.max(1);

        for attempt in 0..tries {
            trace!(
                "query {} {} to {}, attempt {}",
                qname,
                qtype,
                self.server,
                attempt
            );
            let sock = connect(self.server).await?;
            let sent = sock
                .send(&request)
                .await
                .map_err(|e| QueryError::UdpSend(Arc::new(e)))?;
            if sent != request.len() {
                return Err(QueryError::UdpShortSend);
            }

            let start = Instant::now();
            loop {
                let elapsed = start.elapsed();
                if elapsed > read_timeout {
                    // Out of patience for this try, transmit again.
                    break;
                }
                let remain = read_timeout - elapsed;

                let mut buf = vec![0; RECV_SIZE];
                let len = match timeout(remain, sock.recv(&mut buf)).await {
                    Ok(res) => {
                        res.map_err(|e| QueryError::UdpReceive(Arc::new(e)))?
                    }
                    Err(_) => break,
                };
                buf.truncate(len);

                // Garbage gets ignored, the timer limits the damage.
                let header = match ResponseHeader::parse(&buf) {
                    Ok(header) => header,
                    Err(_) => continue,
                };
                if !header.is_response() || header.id() != id {
                    continue;
                }
                return Ok(Response {
                    header,
                    payload: Bytes::from(buf),
                });
            }
        }
        Err(QueryError::TimeoutNoResponse)
    }
}

//------------ send_raw ------------------------------------------------------

/// Transmits raw octets over a connected socket without awaiting a reply.
pub async fn send_raw(
    sock: &UdpSocket,
    payload: &[u8],
) -> Result<(), QueryError> {
    let sent = sock
        .send(payload)
        .await
        .map_err(|e| QueryError::UdpSend(Arc::new(e)))?;
    if sent != payload.len() {
        return Err(QueryError::UdpShortSend);
    }
    Ok(())
}

//------------ connect -------------------------------------------------------

/// Binds an ephemeral socket of the server's address family and connects
/// it to the server.
pub(crate) async fn connect(
    server: SocketAddr,
) -> Result<UdpSocket, QueryError> {
    let local: SocketAddr = if server.is_ipv4() {
        ([0, 0, 0, 0], 0).into()
    } else {
        ([0u16, 0, 0, 0, 0, 0, 0, 0], 0).into()
    };
    let sock = UdpSocket::bind(local)
        .await
        .map_err(|e| QueryError::UdpBind(Arc::new(e)))?;
    sock.connect(server)
        .await
        .map_err(|e| QueryError::UdpConnect(Arc::new(e)))?;
    Ok(sock)
}

//------------ QueryError ----------------------------------------------------

/// An error transmitting a request or receiving a response.
#[derive(Clone, Debug)]
pub enum QueryError {
    /// The request could not be composed.
    ComposeError(crate::wire::WireError),

    /// Binding a UDP socket gave an error.
    UdpBind(Arc<io::Error>),

    /// Connecting a UDP socket gave an error.
    UdpConnect(Arc<io::Error>),

    /// Sending over a UDP socket gave an error.
    UdpSend(Arc<io::Error>),

    /// Sending over a UDP socket gave a partial result.
    UdpShortSend,

    /// Receiving from a UDP socket gave an error.
    UdpReceive(Arc<io::Error>),

    /// No matching response within the timeout and try budget.
    TimeoutNoResponse,
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryError::ComposeError(err) => {
                write!(f, "cannot compose request: {}", err)
            }
            QueryError::UdpBind(_) => write!(f, "binding UDP socket failed"),
            QueryError::UdpConnect(_) => {
                write!(f, "connecting UDP socket failed")
            }
            QueryError::UdpSend(_) => {
                write!(f, "sending over UDP socket failed")
            }
            QueryError::UdpShortSend => {
                write!(f, "sending over UDP socket gave a partial result")
            }
            QueryError::UdpReceive(_) => {
                write!(f, "receiving from UDP socket failed")
            }
            QueryError::TimeoutNoResponse => {
                write!(f, "timeout waiting for response")
            }
        }
    }
}

impl std::error::Error for QueryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            QueryError::ComposeError(err) => Some(err),
            QueryError::UdpBind(err)
            | QueryError::UdpConnect(err)
            | QueryError::UdpSend(err)
            | QueryError::UdpReceive(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

//------------ DefMinMax -----------------------------------------------------

/// The default, minimum, and maximum values for a config variable.
#[derive(Clone, Copy)]
pub(crate) struct DefMinMax<T> {
    /// The default value,
    def: T,

    /// The minimum value,
    min: T,

    /// The maximum value,
    max: T,
}

impl<T> DefMinMax<T> {
    /// Creates a new value.
    pub(crate) const fn new(def: T, min: T, max: T) -> Self {
        Self { def, min, max }
    }

    /// Returns the default value.
    pub(crate) fn default(self) -> T {
        self.def
    }

    /// Trims the given value to fit into the minimum/maximum range.
    pub(crate) fn limit(self, value: T) -> T
    where
        T: Ord,
    {
        std::cmp::max(self.min, std::cmp::min(self.max, value))
    }
}

//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn config_limits() {
        let mut config = Config::new();
        config.set_read_timeout(Duration::ZERO);
        assert_eq!(config.read_timeout(), Duration::from_millis(1));
        config.set_read_timeout(Duration::from_secs(3600));
        assert_eq!(config.read_timeout(), Duration::from_secs(60));
        config.set_max_tries(0);
        assert_eq!(config.max_tries(), 1);
        config.set_max_tries(200);
        assert_eq!(config.max_tries(), 100);
    }

    #[test]
    fn compose_error_is_fatal() {
        tokio_test::block_on(async {
            let client =
                DgramClient::new(([127, 0, 0, 1], 53).into());
            let err = client
                .query_with(
                    "bad..name",
                    Qtype::SOA,
                    Duration::from_millis(10),
                    1,
                )
                .await
                .unwrap_err();
            assert!(matches!(err, QueryError::ComposeError(_)));
        });
    }

    #[test]
    fn timeout_when_nobody_answers() {
        tokio_test::block_on(async {
            // A socket that is bound but never serviced.
            let silent = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
            let client = DgramClient::new(silent.local_addr().unwrap());
            let err = client
                .query_with(
                    "example.com",
                    Qtype::SOA,
                    Duration::from_millis(20),
                    2,
                )
                .await
                .unwrap_err();
            assert!(matches!(err, QueryError::TimeoutNoResponse));
        });
    }
}
