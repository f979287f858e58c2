//! A scripted mock name server for transport level tests.
//!
//! The mock answers real datagrams on a loopback socket according to a
//! handler closure, so the client, probe, and harness can be exercised
//! without a real name server process.

#![allow(dead_code)]

use std::net::SocketAddr;

use tokio::net::UdpSocket;
use tokio::task::JoinHandle;

/// What the mock received.
pub enum MockRequest {
    /// A datagram too short or too mangled to carry a question.
    Malformed(usize),

    /// A query for the given name.
    Query(String),
}

/// What the mock should do about it.
pub enum MockReply {
    /// Answer with the given rcode.
    Status(u8),

    /// Do not answer at all.
    Silent,
}

/// A mock server bound to a loopback socket.
pub struct MockServer {
    /// The address the mock listens on.
    pub addr: SocketAddr,

    /// The serving task.
    handle: JoinHandle<()>,
}

impl MockServer {
    /// Spawns a mock serving according to `handler`.
    pub async fn spawn<F>(mut handler: F) -> Self
    where
        F: FnMut(MockRequest) -> MockReply + Send + 'static,
    {
        zoneprobe::logging::init_logging();
        let sock = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = sock.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let mut buf = [0u8; 512];
            loop {
                let Ok((len, peer)) = sock.recv_from(&mut buf).await else {
                    break;
                };
                let msg = &buf[..len];
                let request = match parse_qname(msg) {
                    Some(name) => MockRequest::Query(name),
                    None => MockRequest::Malformed(len),
                };
                let rcode = match handler(request) {
                    MockReply::Status(rcode) => rcode,
                    MockReply::Silent => continue,
                };
                if len < 12 {
                    // Not even an id to echo.
                    continue;
                }
                let mut reply = Vec::with_capacity(len);
                reply.extend_from_slice(&msg[..2]);
                reply.push(0x80 | (msg[2] & 0x01));
                reply.push(rcode & 0x0F);
                reply.extend_from_slice(&msg[4..6]);
                reply.extend_from_slice(&[0, 0, 0, 0, 0, 0]);
                reply.extend_from_slice(&msg[12..]);
                let _ = sock.send_to(&reply, peer).await;
            }
        });
        MockServer { addr, handle }
    }

    /// Stops the serving task.
    pub fn shutdown(&self) {
        self.handle.abort();
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Reads the query name out of a message, if there is one.
fn parse_qname(msg: &[u8]) -> Option<String> {
    if msg.len() < 17 {
        return None;
    }
    let mut pos = 12;
    let mut name = String::new();
    loop {
        let len = *msg.get(pos)? as usize;
        if len == 0 {
            break;
        }
        if len > 63 {
            return None;
        }
        pos += 1;
        let label = msg.get(pos..pos + len)?;
        if !name.is_empty() {
            name.push('.');
        }
        name.push_str(std::str::from_utf8(label).ok()?);
        pos += len;
    }
    // The qtype and qclass must still follow.
    if msg.len() < pos + 5 {
        return None;
    }
    Some(name)
}
