use std::io::{self, BufReader, ErrorKind, Read, Write};

use bincode::{
    Decode, Encode,
    config::{BigEndian, Configuration, Fixint, LittleEndian, Varint},
    decode_from_std_read, encode_to_vec,
    error::DecodeError,
};
use thiserror::Error;

use super::{Request, Response};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to encode message: {0}")]
    Serialize(#[from] bincode::error::EncodeError),
    #[error("failed to decode message: {0}")]
    Deserialize(#[from] bincode::error::DecodeError),
    #[error("Transport IO Error: {0}")]
    Io(#[from] io::Error),
}

impl TransportError {
    /// Whether the error only means the peer went away.
    pub fn is_disconnect(&self) -> bool {
        match self {
            TransportError::Deserialize(DecodeError::UnexpectedEnd { .. }) => true,
            TransportError::Deserialize(DecodeError::Io { inner, .. })
            | TransportError::Io(inner) => matches!(
                inner.kind(),
                ErrorKind::UnexpectedEof
                    | ErrorKind::ConnectionReset
                    | ErrorKind::ConnectionAborted
                    | ErrorKind::BrokenPipe
                    | ErrorKind::NotConnected
            ),
            _ => false,
        }
    }
}

/// Binary layout used for messages on the wire.
///
/// Both ends of a connection must use the same encoding.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum WireEncoding {
    /// Big-endian, fixed-width integers.
    #[default]
    Fixed,
    /// Little-endian, variable-length integers.
    Compact,
}

fn fixed_config() -> Configuration<BigEndian, Fixint> {
    bincode::config::standard()
        .with_big_endian()
        .with_fixed_int_encoding()
}

fn compact_config() -> Configuration<LittleEndian, Varint> {
    bincode::config::standard()
}

/// Message codec over a byte stream.
///
/// Reads are buffered; every message is written with a single write followed by a
/// flush.
#[derive(Debug)]
pub struct ProtocolTransport<T: Read + Write> {
    stream: BufReader<T>,
    encoding: WireEncoding,
}

impl<T: Read + Write> ProtocolTransport<T> {
    pub fn new(stream: T, encoding: WireEncoding) -> Self {
        Self {
            stream: BufReader::new(stream),
            encoding,
        }
    }

    pub fn get_ref(&self) -> &T {
        self.stream.get_ref()
    }

    pub fn write_request(&mut self, req: Request) -> Result<(), TransportError> {
        self.write_message(req)
    }

    pub fn write_response(&mut self, resp: Response) -> Result<(), TransportError> {
        self.write_message(resp)
    }

    pub fn read_response(&mut self) -> Result<Response, TransportError> {
        self.read_message()
    }

    pub fn read_request(&mut self) -> Result<Request, TransportError> {
        self.read_message()
    }

    fn write_message<E: Encode>(&mut self, message: E) -> Result<(), TransportError> {
        let bytes = match self.encoding {
            WireEncoding::Fixed => encode_to_vec(message, fixed_config())?,
            WireEncoding::Compact => encode_to_vec(message, compact_config())?,
        };

        let stream = self.stream.get_mut();
        stream.write_all(&bytes)?;
        stream.flush()?;
        Ok(())
    }

    fn read_message<D: Decode<()>>(&mut self) -> Result<D, TransportError> {
        let message = match self.encoding {
            WireEncoding::Fixed => decode_from_std_read(&mut self.stream, fixed_config())?,
            WireEncoding::Compact => decode_from_std_read(&mut self.stream, compact_config())?,
        };
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Seek, SeekFrom};

    use super::*;

    fn rewind(transport: &mut ProtocolTransport<Cursor<Vec<u8>>>) {
        transport.stream.seek(SeekFrom::Start(0)).unwrap();
    }

    #[test]
    fn read_write_request() {
        let stream = Cursor::new(Vec::new());
        let mut transport = ProtocolTransport::new(stream, WireEncoding::Fixed);

        let req = Request::Divide {
            dividend: 4,
            divisor: 2,
        };
        transport.write_request(req).unwrap();
        rewind(&mut transport);
        assert_eq!(transport.read_request().unwrap(), req);
    }

    #[test]
    fn read_write_response() {
        let stream = Cursor::new(Vec::new());
        let mut transport = ProtocolTransport::new(stream, WireEncoding::Compact);

        transport.write_response(Response::Value(-6)).unwrap();
        transport.write_response(Response::DivisionByZero).unwrap();
        rewind(&mut transport);
        assert_eq!(transport.read_response().unwrap(), Response::Value(-6));
        assert_eq!(transport.read_response().unwrap(), Response::DivisionByZero);
    }

    #[test]
    fn fixed_encoding_is_big_endian() {
        let stream = Cursor::new(Vec::new());
        let mut transport = ProtocolTransport::new(stream, WireEncoding::Fixed);

        transport.write_response(Response::Value(1)).unwrap();
        let bytes = transport.get_ref().get_ref();
        assert_eq!(bytes, &vec![0, 0, 0, 0, 0, 0, 0, 1]);
    }

    #[test]
    fn compact_encoding_is_smaller() {
        let mut fixed = ProtocolTransport::new(Cursor::new(Vec::new()), WireEncoding::Fixed);
        let mut compact = ProtocolTransport::new(Cursor::new(Vec::new()), WireEncoding::Compact);

        let req = Request::Add {
            first: 1,
            second: 2,
        };
        fixed.write_request(req).unwrap();
        compact.write_request(req).unwrap();

        assert!(compact.get_ref().get_ref().len() < fixed.get_ref().get_ref().len());
    }

    #[test]
    fn empty_stream_is_disconnect() {
        let mut transport = ProtocolTransport::new(Cursor::new(Vec::new()), WireEncoding::Fixed);

        let err = transport.read_request().unwrap_err();
        assert!(err.is_disconnect(), "unexpected error: {err:?}");
    }

    #[test]
    fn unknown_variant_is_not_disconnect() {
        let stream = Cursor::new(vec![0, 0, 0, 42]);
        let mut transport = ProtocolTransport::new(stream, WireEncoding::Fixed);

        let err = transport.read_request().unwrap_err();
        assert!(!err.is_disconnect(), "unexpected error: {err:?}");
    }
}
