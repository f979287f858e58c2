//! Probing the server's message framing boundary.
//!
//! A name server must survive datagrams that are too short to be legal
//! messages. The probe transmits every length from one octet up to just
//! below the minimal message size and then checks that a well-formed
//! query still gets answered. Whether the server responds to the
//! malformed datagrams is irrelevant; only the final liveness check
//! matters.

use std::fmt;

use tokio::time::Duration;
use tracing::{debug, trace};

use crate::client::{connect, send_raw, DgramClient, QueryError};
use crate::wire::{Qtype, Rcode, MIN_MESSAGE_LEN};

//------------ BoundaryProbe -------------------------------------------------

/// A probe of the framing boundary of one server.
#[derive(Clone, Debug)]
pub struct BoundaryProbe {
    /// The client addressing the server under test.
    client: DgramClient,

    /// The octet each probe datagram is filled with.
    fill_byte: u8,

    /// Probes cover the lengths `1..max_len`.
    max_len: usize,
}

impl BoundaryProbe {
    /// Creates a probe covering every length below the minimal message.
    pub fn new(client: DgramClient) -> Self {
        BoundaryProbe {
            client,
            fill_byte: 0,
            max_len: MIN_MESSAGE_LEN,
        }
    }

    /// Sets the fill octet for the probe datagrams.
    pub fn set_fill_byte(&mut self, value: u8) {
        self.fill_byte = value;
    }

    /// Sets the exclusive upper bound of the probed lengths.
    ///
    /// Values below two are capped so at least the one octet probe is
    /// sent.
    pub fn set_max_len(&mut self, value: usize) {
        self.max_len = value.max(2);
    }

    /// Transmits the probe sequence.
    ///
    /// All probes go out over a single connectionless socket. Responses
    /// are drained and discarded; the server is free to answer the
    /// malformed input or to stay silent.
    pub async fn run(&self) -> Result<(), QueryError> {
        let sock = connect(self.client.server()).await?;
        let data = vec![self.fill_byte; self.max_len];
        let mut scratch = [0u8; 512];
        for len in 1..self.max_len {
            trace!("sending {} octet probe", len);
            send_raw(&sock, &data[..len]).await?;
            while sock.try_recv(&mut scratch).is_ok() {}
        }
        debug!(
            "sent {} boundary probes to {}",
            self.max_len - 1,
            self.client.server()
        );
        Ok(())
    }

    /// Checks that the server still answers a well-formed query.
    ///
    /// Issues one SOA query for `qname` with the given patience.
    /// Liveness holds iff a successful response arrives within the try
    /// budget.
    pub async fn check_alive(
        &self,
        qname: &str,
        read_timeout: Duration,
        tries: u8,
    ) -> Result<(), LivenessFailure> {
        match self
            .client
            .query_with(qname, Qtype::SOA, read_timeout, tries)
            .await
        {
            Ok(response) if response.rcode() == Rcode::NOERROR => {
                debug!("{} alive after probing", self.client.server());
                Ok(())
            }
            Ok(response) => {
                Err(LivenessFailure::BadStatus(response.rcode()))
            }
            Err(err) => Err(LivenessFailure::NoResponse(err)),
        }
    }
}

//------------ LivenessFailure -----------------------------------------------

/// The server did not prove liveness after probing.
///
/// This is deliberately a separate type from a verdict mismatch: a server
/// that stops answering after malformed input has presumably crashed or
/// hung, which is fatal for the whole run.
#[derive(Clone, Debug)]
pub enum LivenessFailure {
    /// No response arrived within the timeout and try budget.
    NoResponse(QueryError),

    /// A response arrived but did not carry success status.
    BadStatus(Rcode),
}

impl fmt::Display for LivenessFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LivenessFailure::NoResponse(err) => {
                write!(f, "server did not answer after probing: {}", err)
            }
            LivenessFailure::BadStatus(rcode) => {
                write!(
                    f,
                    "server answered with {} after probing",
                    rcode
                )
            }
        }
    }
}

impl std::error::Error for LivenessFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LivenessFailure::NoResponse(err) => Some(err),
            LivenessFailure::BadStatus(_) => None,
        }
    }
}

//============ Testing =======================================================
