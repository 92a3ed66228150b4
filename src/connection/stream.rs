use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::{err_protocol, Error, Result, ServerError};
use crate::io::{BufExt, BufStream, ProtocolDecode, ProtocolEncode};
use crate::protocol::statement::{ComStmtClose, PrepareOk};
use crate::protocol::text::ColumnDefinition;
use crate::protocol::{Capabilities, DecodeContext, Packet};
use crate::query_result::QueryResult;
use crate::value::ValueFormat;

/// Largest envelope payload; a payload of exactly this size continues in
/// the next envelope.
pub(crate) const MAX_ENVELOPE_PAYLOAD: usize = 0xFF_FF_FF;

/// The max-packet-size we advertise in the handshake response.
pub(crate) const MAX_PACKET_SIZE: u32 = 16_777_216;

/// One fully decoded (or, for rows, discriminated) server message.
///
/// Rows stay undecoded here: their parse needs the column types, which
/// belong to the flow above. Everything else is owned and fragment-free.
pub(crate) enum ServerMessage {
    /// An OK, or a terminating EOF folded to the same shape: the end of
    /// one result window.
    Ok(QueryResult),

    /// A command-phase ERR. The exchange is over; the connection is idle.
    Err(ServerError),

    /// The head of a result set.
    ColumnCount(u64),

    /// One column definition within a metadata run.
    ColumnDefinition(ColumnDefinition),

    /// The EOF closing a metadata run (absent under `DEPRECATE_EOF`).
    Eof,

    /// A text-protocol row; decode with the window's column count.
    TextRow(Packet),

    /// A binary-protocol row; decode with the window's column types.
    BinaryRow(Packet),

    /// The response to `COM_STMT_PREPARE`.
    PreparedOk(PrepareOk),
}

/// The framed, sequence-checked transport under a connection.
///
/// Owns the envelope codec (join on read, slice on write), the per-exchange
/// sequence id, the active [`DecodeContext`], and the drain discipline that
/// lets a new exchange start only after the previous one's responses are
/// fully consumed.
pub(crate) struct PacketStream<S> {
    stream: BufStream<S>,

    pub(crate) capabilities: Capabilities,

    /// The sequence id the next envelope (either direction) must carry.
    pub(crate) sequence_id: u8,

    pub(crate) context: DecodeContext,

    /// Whether result rows of the active exchange use the binary
    /// protocol; set when the command is sent.
    pub(crate) result_format: ValueFormat,

    /// Statement ids owed a fire-and-forget `COM_STMT_CLOSE`, queued when
    /// an exchange was abandoned mid-flight and flushed once the stream
    /// is idle again.
    pub(crate) pending_close: Vec<u32>,

    /// Set once an envelope-level fault (sequence, transport) has made
    /// the stream unusable.
    poisoned: bool,
}

impl<S> PacketStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub(crate) fn new(stream: S) -> Self {
        Self {
            stream: BufStream::new(stream),
            capabilities: Capabilities::empty(),
            sequence_id: 0,
            context: DecodeContext::Connection,
            result_format: ValueFormat::Text,
            pending_close: Vec::new(),
            poisoned: false,
        }
    }

    #[cfg(feature = "tls")]
    pub(crate) fn stream_mut(&mut self) -> &mut S {
        &mut self.stream.stream
    }

    /// Encodes `payload` and slices it into envelopes in the write
    /// buffer. Payloads of any size stream out in 0xFFFFFF-byte windows;
    /// a payload that fills its last window exactly is closed by an empty
    /// terminal envelope.
    pub(crate) fn write_packet<T, C>(&mut self, payload: T, context: C) -> Result<()>
    where
        T: ProtocolEncode<C>,
    {
        use bytes::BufMut;

        let mut encoded = Vec::new();
        payload.encode_with(&mut encoded, context)?;

        let mut rest = &encoded[..];

        loop {
            let take = rest.len().min(MAX_ENVELOPE_PAYLOAD);

            self.stream.wbuf.put_uint_le(take as u64, 3);
            self.stream.wbuf.put_u8(self.sequence_id);
            self.sequence_id = self.sequence_id.wrapping_add(1);
            self.stream.wbuf.extend_from_slice(&rest[..take]);

            rest = &rest[take..];

            // a full window demands a (possibly empty) continuation
            if take < MAX_ENVELOPE_PAYLOAD {
                break;
            }
        }

        Ok(())
    }

    /// Writes and flushes one message. `reset_sequence` marks an exchange
    /// boundary: the first envelope out carries sequence id 0.
    pub(crate) async fn send_packet<T, C>(
        &mut self,
        payload: T,
        context: C,
        reset_sequence: bool,
    ) -> Result<()>
    where
        T: ProtocolEncode<C>,
    {
        if reset_sequence {
            self.sequence_id = 0;
        }

        self.write_packet(payload, context)?;
        self.flush().await
    }

    pub(crate) async fn flush(&mut self) -> Result<()> {
        self.stream.flush().await
    }

    pub(crate) async fn shutdown(&mut self) -> Result<()> {
        Ok(self.stream.shutdown().await?)
    }

    /// Reads one logical message: verifies each envelope's sequence id,
    /// reassembling continuations (payload length 0xFFFFFF) until a short
    /// envelope terminates the message.
    pub(crate) async fn recv_packet(&mut self) -> Result<Packet> {
        if self.poisoned {
            return Err(Error::Closed);
        }

        let mut accumulated: Option<BytesMut> = None;

        loop {
            let mut header = self.stream.read_exact(4).await.map_err(|err| {
                self.poisoned = true;
                err
            })?;

            let len = header.get_uint_le(3) as usize;
            let sequence_id = header.get_u8();

            if sequence_id != self.sequence_id {
                self.poisoned = true;

                return Err(Error::SequenceMismatch {
                    expected: self.sequence_id,
                    received: sequence_id,
                });
            }

            self.sequence_id = sequence_id.wrapping_add(1);

            let payload = self.stream.read_exact(len).await.map_err(|err| {
                self.poisoned = true;
                err
            })?;

            match accumulated.as_mut() {
                // the common case: one envelope, zero copies
                None if len < MAX_ENVELOPE_PAYLOAD => {
                    return Ok(Packet(payload));
                }

                None => {
                    let mut buf = BytesMut::with_capacity(len + 1024);
                    buf.extend_from_slice(&payload);
                    accumulated = Some(buf);
                }

                Some(buf) => {
                    buf.extend_from_slice(&payload);

                    if len < MAX_ENVELOPE_PAYLOAD {
                        let joined = accumulated.take().expect("accumulator is present");

                        return Ok(Packet(joined.freeze()));
                    }
                }
            }
        }
    }

    /// Reads and classifies the next server message under the active
    /// decode context, advancing the context as a side effect.
    pub(crate) async fn recv_message(&mut self) -> Result<ServerMessage> {
        let packet = self.recv_packet().await?;

        self.classify(packet)
    }

    fn classify(&mut self, packet: Packet) -> Result<ServerMessage> {
        let capabilities = self.capabilities;
        let header = packet.header()?;

        match self.context {
            DecodeContext::Connection | DecodeContext::Idle => {
                self.poisoned = true;

                Err(err_protocol!(
                    "received an unsolicited message (0x{:02X}) outside an exchange",
                    header
                ))
            }

            DecodeContext::Command => match header {
                0xFF => {
                    self.context = DecodeContext::Idle;

                    Ok(ServerMessage::Err(packet.err(capabilities)?))
                }

                0x00 => {
                    let result = QueryResult::from_ok(packet.ok(capabilities)?);
                    self.advance_after_window(&result);

                    Ok(ServerMessage::Ok(result))
                }

                0xFB => Err(err_protocol!(
                    "server requested LOCAL INFILE, which this driver does not support"
                )),

                0xFE if packet.is_terminator(capabilities) => {
                    let result = self.window_end(packet)?;
                    self.advance_after_window(&result);

                    Ok(ServerMessage::Ok(result))
                }

                _ => {
                    let mut buf = packet.0;
                    let count = buf
                        .get_uint_lenenc()?
                        .ok_or_else(|| err_protocol!("NULL is not a valid column count"))?;

                    if count == 0 {
                        return Err(err_protocol!("result set announced zero columns"));
                    }

                    self.context = DecodeContext::ResultMetadata {
                        remaining: count,
                        binary: self.result_format == ValueFormat::Binary,
                    };

                    Ok(ServerMessage::ColumnCount(count))
                }
            },

            DecodeContext::WaitPrepare => match header {
                0xFF => {
                    self.context = DecodeContext::Idle;

                    Ok(ServerMessage::Err(packet.err(capabilities)?))
                }

                0x00 if packet.len() == PrepareOk::LEN => {
                    let ok = PrepareOk::decode_with(packet.0, ())?;

                    self.context = if ok.params > 0 || ok.columns > 0 {
                        DecodeContext::PrepareMetadata {
                            params: ok.params,
                            columns: ok.columns,
                        }
                    } else {
                        DecodeContext::Idle
                    };

                    Ok(ServerMessage::PreparedOk(ok))
                }

                0x00 => {
                    let result = QueryResult::from_ok(packet.ok(capabilities)?);
                    self.context = DecodeContext::Idle;

                    Ok(ServerMessage::Ok(result))
                }

                0xFE if packet.is_terminator(capabilities) => {
                    let result = self.window_end(packet)?;
                    self.context = DecodeContext::Idle;

                    Ok(ServerMessage::Ok(result))
                }

                _ => {
                    self.poisoned = true;

                    Err(err_protocol!(
                        "unexpected message (0x{:02X}) while awaiting a prepare response",
                        header
                    ))
                }
            },

            DecodeContext::PrepareMetadata { params, columns } => {
                if header == 0xFF {
                    self.context = DecodeContext::Idle;

                    return Ok(ServerMessage::Err(packet.err(capabilities)?));
                }

                let deprecate_eof = capabilities.contains(Capabilities::DEPRECATE_EOF);

                if header == 0xFE && packet.is_terminator(capabilities) && !deprecate_eof {
                    // the EOF between the parameter and column sections,
                    // or the one closing the metadata
                    let _eof = packet.eof(capabilities)?;

                    if params == 0 && columns == 0 {
                        self.context = DecodeContext::Idle;
                    }

                    return Ok(ServerMessage::Eof);
                }

                let def = ColumnDefinition::decode_with(packet.0, ())?;

                let (params, columns) = if params > 0 {
                    (params - 1, columns)
                } else if columns > 0 {
                    (params, columns - 1)
                } else {
                    self.poisoned = true;

                    return Err(err_protocol!(
                        "received more metadata than the prepare response announced"
                    ));
                };

                self.context = if params == 0 && columns == 0 && deprecate_eof {
                    DecodeContext::Idle
                } else {
                    DecodeContext::PrepareMetadata { params, columns }
                };

                Ok(ServerMessage::ColumnDefinition(def))
            }

            DecodeContext::ResultMetadata { remaining, binary } => {
                if header == 0xFF {
                    self.context = DecodeContext::Idle;

                    return Ok(ServerMessage::Err(packet.err(capabilities)?));
                }

                let deprecate_eof = capabilities.contains(Capabilities::DEPRECATE_EOF);

                if remaining == 0 {
                    // only the closing EOF is admissible here
                    let _eof = packet.eof(capabilities)?;

                    self.context = DecodeContext::ResultRows {
                        columns: 0,
                        binary,
                    };

                    return Ok(ServerMessage::Eof);
                }

                let def = ColumnDefinition::decode_with(packet.0, ())?;
                let remaining = remaining - 1;

                self.context = if remaining == 0 && deprecate_eof {
                    DecodeContext::ResultRows { columns: 0, binary }
                } else {
                    DecodeContext::ResultMetadata { remaining, binary }
                };

                Ok(ServerMessage::ColumnDefinition(def))
            }

            DecodeContext::ResultRows { binary, .. } => {
                if header == 0xFF {
                    self.context = DecodeContext::Idle;

                    return Ok(ServerMessage::Err(packet.err(capabilities)?));
                }

                if packet.is_terminator(capabilities) {
                    let result = self.window_end(packet)?;
                    self.advance_after_window(&result);

                    return Ok(ServerMessage::Ok(result));
                }

                Ok(if binary {
                    ServerMessage::BinaryRow(packet)
                } else {
                    ServerMessage::TextRow(packet)
                })
            }
        }
    }

    // A run of column definitions finished counting down; record the
    // column count for the row phase.
    pub(crate) fn enter_rows(&mut self, columns: u64) {
        if let DecodeContext::ResultRows { binary, .. } = self.context {
            self.context = DecodeContext::ResultRows { columns, binary };
        }
    }

    // parse the message that closed a result window: an EOF before
    // DEPRECATE_EOF, an OK after
    fn window_end(&mut self, packet: Packet) -> Result<QueryResult> {
        if self.capabilities.contains(Capabilities::DEPRECATE_EOF) {
            Ok(QueryResult::from_ok(packet.ok(self.capabilities)?))
        } else {
            Ok(QueryResult::from_eof(packet.eof(self.capabilities)?))
        }
    }

    fn advance_after_window(&mut self, result: &QueryResult) {
        self.context = if result.more_results() {
            DecodeContext::Command
        } else {
            DecodeContext::Idle
        };
    }

    /// Drains every message still owed to an abandoned exchange,
    /// discarding them while keeping sequence invariants, then emits any
    /// queued fire-and-forget statement closes. Must run before a new
    /// exchange sends its first byte.
    pub(crate) async fn wait_until_ready(&mut self) -> Result<()> {
        if self.poisoned {
            return Err(Error::Closed);
        }

        if !self.stream.wbuf.is_empty() {
            self.flush().await?;
        }

        while !self.context.is_idle() {
            // decoded for sequence and context bookkeeping; contents are
            // discarded (including server errors: the exchange that they
            // belong to is gone)
            let _ = self.recv_message().await?;
        }

        if !self.pending_close.is_empty() {
            for statement_id in std::mem::take(&mut self.pending_close) {
                self.sequence_id = 0;
                self.write_packet(ComStmtClose { statement_id }, ())?;
            }

            self.flush().await?;
        }

        Ok(())
    }

}

// the TLS question only makes sense for the transport the connection
// actually uses
impl PacketStream<crate::net::MaybeTlsStream> {
    pub(crate) fn transport_is_tls(&self) -> bool {
        self.stream.stream.is_tls()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};

    async fn pair() -> (PacketStream<DuplexStream>, DuplexStream) {
        let (client, server) = duplex(1 << 20);

        (PacketStream::new(client), server)
    }

    async fn read_envelope(server: &mut DuplexStream) -> (usize, u8, Vec<u8>) {
        let mut header = [0u8; 4];
        server.read_exact(&mut header).await.unwrap();

        let len = usize::from(header[0]) | usize::from(header[1]) << 8 | usize::from(header[2]) << 16;
        let mut payload = vec![0u8; len];
        server.read_exact(&mut payload).await.unwrap();

        (len, header[3], payload)
    }

    async fn write_envelope(server: &mut DuplexStream, sequence_id: u8, payload: &[u8]) {
        let len = payload.len();
        let header = [len as u8, (len >> 8) as u8, (len >> 16) as u8, sequence_id];

        server.write_all(&header).await.unwrap();
        server.write_all(payload).await.unwrap();
    }

    #[tokio::test]
    async fn write_splits_an_oversized_payload_into_envelopes() {
        let (mut stream, mut server) = pair().await;

        let payload = vec![0xA5u8; MAX_ENVELOPE_PAYLOAD + 5];
        stream.sequence_id = 0;
        stream.write_packet(&payload[..], ()).unwrap();
        stream.flush().await.unwrap();

        let (len, seq, first) = read_envelope(&mut server).await;
        assert_eq!(len, MAX_ENVELOPE_PAYLOAD);
        assert_eq!(seq, 0);
        assert!(first.iter().all(|&b| b == 0xA5));

        let (len, seq, rest) = read_envelope(&mut server).await;
        assert_eq!(len, 5);
        assert_eq!(seq, 1);
        assert_eq!(rest, [0xA5; 5]);
    }

    #[tokio::test]
    async fn an_exact_multiple_of_the_window_ends_with_an_empty_envelope() {
        let (mut stream, mut server) = pair().await;

        let payload = vec![1u8; MAX_ENVELOPE_PAYLOAD];
        stream.write_packet(&payload[..], ()).unwrap();
        stream.flush().await.unwrap();

        let (len, _, _) = read_envelope(&mut server).await;
        assert_eq!(len, MAX_ENVELOPE_PAYLOAD);

        let (len, seq, _) = read_envelope(&mut server).await;
        assert_eq!(len, 0);
        assert_eq!(seq, 1);
    }

    #[tokio::test]
    async fn an_empty_payload_is_one_empty_envelope() {
        let (mut stream, mut server) = pair().await;

        stream.write_packet(&[][..], ()).unwrap();
        stream.flush().await.unwrap();

        let (len, seq, _) = read_envelope(&mut server).await;
        assert_eq!(len, 0);
        assert_eq!(seq, 0);
    }

    #[tokio::test]
    async fn recv_joins_continuation_envelopes() {
        let (mut stream, mut server) = pair().await;

        let first = vec![7u8; MAX_ENVELOPE_PAYLOAD];
        let second = b"tail".to_vec();

        tokio::spawn(async move {
            write_envelope(&mut server, 0, &first).await;
            write_envelope(&mut server, 1, &second).await;
        });

        let packet = stream.recv_packet().await.unwrap();

        assert_eq!(packet.len(), MAX_ENVELOPE_PAYLOAD + 4);
        assert_eq!(&packet[MAX_ENVELOPE_PAYLOAD..], b"tail");
    }

    #[tokio::test]
    async fn a_sequence_gap_is_fatal() {
        let (mut stream, mut server) = pair().await;

        tokio::spawn(async move {
            // an envelope was lost: the server's next id is 2
            write_envelope(&mut server, 2, b"\x00").await;
            let _ = server;
        });

        let err = stream.recv_packet().await.unwrap_err();
        assert!(matches!(
            err,
            Error::SequenceMismatch {
                expected: 0,
                received: 2
            }
        ));

        // the stream is poisoned from here on
        assert!(matches!(
            stream.wait_until_ready().await.unwrap_err(),
            Error::Closed
        ));
    }

    #[tokio::test]
    async fn a_closed_transport_fails_all_reads() {
        let (mut stream, server) = pair().await;
        drop(server);

        assert!(matches!(
            stream.recv_packet().await.unwrap_err(),
            Error::Closed
        ));
    }

    // the same 9-byte 0xFE payload is an OK under DEPRECATE_EOF and an
    // EOF without it
    #[tokio::test]
    async fn command_fe_discrimination_follows_deprecate_eof() {
        let payload: &[u8] = &[0xFE, 1, 2, 3, 4, 5, 6, 7, 8];

        let (mut stream, _server) = pair().await;
        stream.capabilities = Capabilities::PROTOCOL_41 | Capabilities::DEPRECATE_EOF;
        stream.context = DecodeContext::Command;

        match stream.classify(Packet(Bytes::copy_from_slice(payload))).unwrap() {
            ServerMessage::Ok(result) => {
                // lenenc affected_rows = 1, last_insert_id = 2
                assert_eq!(result.rows_affected(), 1);
                assert_eq!(result.last_insert_id(), 2);
            }
            _ => panic!("expected an OK under DEPRECATE_EOF"),
        }

        let (mut stream, _server) = pair().await;
        stream.capabilities = Capabilities::PROTOCOL_41;
        stream.context = DecodeContext::Command;

        match stream.classify(Packet(Bytes::copy_from_slice(payload))).unwrap() {
            ServerMessage::Ok(result) => {
                // EOF shape: warnings u16 then status u16
                assert_eq!(result.rows_affected(), 0);
                assert_eq!(result.warnings(), 0x0201);
            }
            _ => panic!("expected an EOF without DEPRECATE_EOF"),
        }
    }

    #[tokio::test]
    async fn a_lone_null_marker_in_a_row_run_is_a_row_not_a_terminator() {
        let (mut stream, _server) = pair().await;
        stream.capabilities = Capabilities::PROTOCOL_41;
        stream.context = DecodeContext::ResultRows {
            columns: 1,
            binary: false,
        };

        match stream.classify(Packet(Bytes::from_static(b"\xfb"))).unwrap() {
            ServerMessage::TextRow(packet) => {
                let row = crate::protocol::text::TextRow::decode(packet.0, 1).unwrap();
                assert_eq!(row.0.get(0), None);
            }
            _ => panic!("expected a one-field NULL row"),
        }

        // and the EOF-shaped message that follows terminates the run
        let (mut stream, _server) = pair().await;
        stream.capabilities = Capabilities::PROTOCOL_41;
        stream.context = DecodeContext::ResultRows {
            columns: 1,
            binary: false,
        };

        match stream
            .classify(Packet(Bytes::from_static(b"\xfe\x00\x00\x02\x00")))
            .unwrap()
        {
            ServerMessage::Ok(_) => {}
            _ => panic!("expected the run terminator"),
        }

        assert!(stream.context.is_idle());
    }

    #[tokio::test]
    async fn a_command_err_returns_the_stream_to_idle() {
        let (mut stream, _server) = pair().await;
        stream.capabilities = Capabilities::PROTOCOL_41;
        stream.context = DecodeContext::Command;

        let payload = b"\xff\x19\x04#42000Unknown database 'unknown'";

        match stream.classify(Packet(Bytes::from_static(payload))).unwrap() {
            ServerMessage::Err(err) => {
                assert_eq!(err.code, 1049);
                assert_eq!(err.sql_state.as_deref(), Some("42000"));
            }
            _ => panic!("expected a server error"),
        }

        assert!(stream.context.is_idle());
    }
}
