//! Minimal wire plumbing: a query encoder and a response header decoder.
//!
//! This is deliberately not a message parser. The crate only ever needs
//! to put a single well-formed question on the wire and to read the
//! status and section counts out of whatever comes back. Record data is
//! never interpreted.

use std::fmt;

//------------ Message Size Constants ----------------------------------------

/// The length of the fixed message header.
pub const HEADER_LEN: usize = 12;

/// The length of the smallest possible question section.
///
/// A question for the root name: one length octet, then qtype and qclass.
pub const MIN_QUESTION_LEN: usize = 5;

/// The length of the smallest legal message.
pub const MIN_MESSAGE_LEN: usize = HEADER_LEN + MIN_QUESTION_LEN;

/// The qclass for Internet data.
const CLASS_IN: u16 = 1;

//------------ Rcode ---------------------------------------------------------

/// A response code.
///
/// Only the four bit header field is modeled; extended response codes do
/// not occur in the exchanges this crate performs.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Rcode(u8);

impl Rcode {
    /// No error condition.
    pub const NOERROR: Rcode = Rcode(0);

    /// The server was unable to interpret the query.
    pub const FORMERR: Rcode = Rcode(1);

    /// The server was unable to process the query.
    pub const SERVFAIL: Rcode = Rcode(2);

    /// The queried name does not exist.
    pub const NXDOMAIN: Rcode = Rcode(3);

    /// The requested kind of query is not supported.
    pub const NOTIMP: Rcode = Rcode(4);

    /// The server refuses to answer for policy reasons.
    pub const REFUSED: Rcode = Rcode(5);

    /// Creates an rcode from the raw header field value.
    pub fn from_int(value: u8) -> Self {
        Rcode(value & 0x0F)
    }

    /// Returns the raw value.
    pub fn to_int(self) -> u8 {
        self.0
    }
}

impl fmt::Display for Rcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            0 => f.write_str("NOERROR"),
            1 => f.write_str("FORMERR"),
            2 => f.write_str("SERVFAIL"),
            3 => f.write_str("NXDOMAIN"),
            4 => f.write_str("NOTIMP"),
            5 => f.write_str("REFUSED"),
            value => write!(f, "RCODE{}", value),
        }
    }
}

//------------ Qtype ---------------------------------------------------------

/// A query type.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Qtype(u16);

impl Qtype {
    /// An IPv4 host address.
    pub const A: Qtype = Qtype(1);

    /// An authoritative name server.
    pub const NS: Qtype = Qtype(2);

    /// The start of a zone of authority.
    pub const SOA: Qtype = Qtype(6);

    /// An IPv6 host address.
    pub const AAAA: Qtype = Qtype(28);

    /// A DNSSEC public key.
    pub const DNSKEY: Qtype = Qtype(48);

    /// Creates a query type from its registry number.
    pub fn from_int(value: u16) -> Self {
        Qtype(value)
    }

    /// Returns the registry number.
    pub fn to_int(self) -> u16 {
        self.0
    }
}

impl fmt::Display for Qtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            1 => f.write_str("A"),
            2 => f.write_str("NS"),
            6 => f.write_str("SOA"),
            28 => f.write_str("AAAA"),
            48 => f.write_str("DNSKEY"),
            value => write!(f, "TYPE{}", value),
        }
    }
}

//------------ build_query ---------------------------------------------------

/// Encodes a query for one question.
///
/// The message carries the given id, the standard query opcode with the
/// recursion desired bit set, and a single question for `qname` with the
/// given type in class IN.
pub fn build_query(
    id: u16,
    qname: &str,
    qtype: Qtype,
) -> Result<Vec<u8>, WireError> {
    let mut buf = Vec::with_capacity(HEADER_LEN + qname.len() + 6);
    buf.extend_from_slice(&id.to_be_bytes());
    buf.extend_from_slice(&[
        0x01, 0x00, // flags: RD
        0x00, 0x01, // qdcount
        0x00, 0x00, // ancount
        0x00, 0x00, // nscount
        0x00, 0x00, // arcount
    ]);
    push_name(&mut buf, qname)?;
    buf.extend_from_slice(&qtype.to_int().to_be_bytes());
    buf.extend_from_slice(&CLASS_IN.to_be_bytes());
    Ok(buf)
}

/// Appends a domain name in wire encoding.
fn push_name(buf: &mut Vec<u8>, name: &str) -> Result<(), WireError> {
    if name.is_empty() {
        return Err(WireError::EmptyName);
    }
    let relative = name.strip_suffix('.').unwrap_or(name);
    let mut encoded_len = 1; // the root label
    if !relative.is_empty() {
        for label in relative.split('.') {
            if label.is_empty() {
                return Err(WireError::EmptyLabel);
            }
            if label.len() > 63 {
                return Err(WireError::LongLabel);
            }
            encoded_len += label.len() + 1;
            if encoded_len > 255 {
                return Err(WireError::LongName);
            }
            buf.push(label.len() as u8);
            buf.extend_from_slice(label.as_bytes());
        }
    }
    buf.push(0);
    Ok(())
}

//------------ ResponseHeader ------------------------------------------------

/// The decoded fixed header of a response.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ResponseHeader {
    /// The message id.
    id: u16,

    /// The QR bit: set on responses.
    qr: bool,

    /// The TC bit: set on truncated responses.
    tc: bool,

    /// The response code.
    rcode: Rcode,

    /// The number of questions.
    qdcount: u16,

    /// The number of answer records.
    ancount: u16,

    /// The number of authority records.
    nscount: u16,

    /// The number of additional records.
    arcount: u16,
}

impl ResponseHeader {
    /// Decodes the fixed header from the start of a message.
    pub fn parse(buf: &[u8]) -> Result<Self, WireError> {
        if buf.len() < HEADER_LEN {
            return Err(WireError::ShortMessage);
        }
        Ok(ResponseHeader {
            id: u16::from_be_bytes([buf[0], buf[1]]),
            qr: buf[2] & 0x80 != 0,
            tc: buf[2] & 0x02 != 0,
            rcode: Rcode::from_int(buf[3]),
            qdcount: u16::from_be_bytes([buf[4], buf[5]]),
            ancount: u16::from_be_bytes([buf[6], buf[7]]),
            nscount: u16::from_be_bytes([buf[8], buf[9]]),
            arcount: u16::from_be_bytes([buf[10], buf[11]]),
        })
    }

    /// Returns the message id.
    pub fn id(&self) -> u16 {
        self.id
    }

    /// Returns whether the message is a response.
    pub fn is_response(&self) -> bool {
        self.qr
    }

    /// Returns whether the response was truncated.
    pub fn is_truncated(&self) -> bool {
        self.tc
    }

    /// Returns the response code.
    pub fn rcode(&self) -> Rcode {
        self.rcode
    }

    /// Returns the number of questions.
    pub fn qdcount(&self) -> u16 {
        self.qdcount
    }

    /// Returns the number of answer records.
    pub fn ancount(&self) -> u16 {
        self.ancount
    }

    /// Returns the number of authority records.
    pub fn nscount(&self) -> u16 {
        self.nscount
    }

    /// Returns the number of additional records.
    pub fn arcount(&self) -> u16 {
        self.arcount
    }
}

//------------ WireError -----------------------------------------------------

/// A message could not be encoded or decoded.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum WireError {
    /// The octet sequence is too short to carry a header.
    ShortMessage,

    /// The query name was empty.
    EmptyName,

    /// The query name contained an empty label.
    EmptyLabel,

    /// A label of the query name exceeded 63 octets.
    LongLabel,

    /// The encoded query name exceeded 255 octets.
    LongName,
}

impl fmt::Display for WireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireError::ShortMessage => {
                write!(f, "octet sequence too short to be a valid message")
            }
            WireError::EmptyName => write!(f, "empty query name"),
            WireError::EmptyLabel => {
                write!(f, "query name contains an empty label")
            }
            WireError::LongLabel => {
                write!(f, "query name label exceeds 63 octets")
            }
            WireError::LongName => {
                write!(f, "encoded query name exceeds 255 octets")
            }
        }
    }
}

impl std::error::Error for WireError {}

//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn query_layout() {
        let buf = build_query(0x1234, "example.com", Qtype::SOA).unwrap();
        assert_eq!(buf.len(), HEADER_LEN + 13 + 4);
        assert_eq!(&buf[..2], &[0x12, 0x34]);
        assert_eq!(buf[2], 0x01); // RD
        assert_eq!(&buf[4..6], &[0x00, 0x01]); // one question
        assert_eq!(
            &buf[HEADER_LEN..HEADER_LEN + 13],
            b"\x07example\x03com\x00"
        );
        assert_eq!(&buf[HEADER_LEN + 13..], &[0, 6, 0, 1]);
    }

    #[test]
    fn trailing_dot_is_equivalent() {
        let absolute = build_query(1, "example.com.", Qtype::A).unwrap();
        let relative = build_query(1, "example.com", Qtype::A).unwrap();
        assert_eq!(absolute, relative);
    }

    #[test]
    fn root_question_is_minimal() {
        let buf = build_query(1, ".", Qtype::A).unwrap();
        assert_eq!(buf.len(), MIN_MESSAGE_LEN);
    }

    #[test]
    fn bad_names_rejected() {
        assert_eq!(build_query(1, "", Qtype::A), Err(WireError::EmptyName));
        assert_eq!(
            build_query(1, "a..b", Qtype::A),
            Err(WireError::EmptyLabel)
        );
        let label = "a".repeat(64);
        assert_eq!(
            build_query(1, &label, Qtype::A),
            Err(WireError::LongLabel)
        );
        let name = vec!["a".repeat(63); 5].join(".");
        assert_eq!(build_query(1, &name, Qtype::A), Err(WireError::LongName));
    }

    #[test]
    fn header_decoding() {
        let mut buf = vec![
            0xab, 0xcd, // id
            0x84, 0x02, // QR AA, rcode 2
            0x00, 0x01, // qdcount
            0x00, 0x02, // ancount
            0x00, 0x03, // nscount
            0x00, 0x04, // arcount
        ];
        let header = ResponseHeader::parse(&buf).unwrap();
        assert_eq!(header.id(), 0xabcd);
        assert!(header.is_response());
        assert!(!header.is_truncated());
        assert_eq!(header.rcode(), Rcode::SERVFAIL);
        assert_eq!(header.qdcount(), 1);
        assert_eq!(header.ancount(), 2);
        assert_eq!(header.nscount(), 3);
        assert_eq!(header.arcount(), 4);

        buf.truncate(11);
        assert_eq!(
            ResponseHeader::parse(&buf),
            Err(WireError::ShortMessage)
        );
    }

    #[test]
    fn rcode_field_is_four_bits() {
        assert_eq!(Rcode::from_int(0x42), Rcode::SERVFAIL);
        assert_eq!(Rcode::NXDOMAIN.to_string(), "NXDOMAIN");
        assert_eq!(Rcode::from_int(11).to_string(), "RCODE11");
    }
}
