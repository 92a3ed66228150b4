//! End-to-end exchanges against a scripted server over an in-memory
//! duplex stream: the connection phase, the text and prepared pipelines,
//! cancellation, and sequence discipline, all byte-checked on both sides.

use anyhow::Result;
use sha1::{Digest, Sha1};
use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};

use myrtle::{Bindings, Capabilities, ConnectOptions, Connection, Either, Error};

const SCRAMBLE: [u8; 20] = [
    1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20,
];

// server capability halves: everything in the low half except SSL, plus
// PLUGIN_AUTH / CONNECT_ATTRS / PLUGIN_AUTH_LENENC_CLIENT_DATA up high
const CAPS_LO: u16 = 0xF7FF;
const CAPS_HI_BASE: u16 = 0x0038;
const CAPS_HI_MULTI: u16 = CAPS_HI_BASE | 0x0001;

async fn send(server: &mut DuplexStream, sequence_id: u8, payload: &[u8]) {
    let len = payload.len();
    let header = [len as u8, (len >> 8) as u8, (len >> 16) as u8, sequence_id];

    server.write_all(&header).await.unwrap();
    server.write_all(payload).await.unwrap();
}

async fn recv(server: &mut DuplexStream) -> (u8, Vec<u8>) {
    let mut header = [0u8; 4];
    server.read_exact(&mut header).await.unwrap();

    let len = usize::from(header[0]) | usize::from(header[1]) << 8 | usize::from(header[2]) << 16;
    let mut payload = vec![0u8; len];
    server.read_exact(&mut payload).await.unwrap();

    (header[3], payload)
}

// every client command opens a fresh exchange: sequence id 0
async fn recv_command(server: &mut DuplexStream) -> Vec<u8> {
    let (sequence_id, payload) = recv(server).await;
    assert_eq!(sequence_id, 0, "commands must reset the sequence id");

    payload
}

fn handshake_payload(plugin: &str, caps_hi: u16) -> Vec<u8> {
    let mut p = vec![10];
    p.extend_from_slice(b"8.0.32\0");
    p.extend_from_slice(&10u32.to_le_bytes());
    p.extend_from_slice(&SCRAMBLE[..8]);
    p.push(0);
    p.extend_from_slice(&CAPS_LO.to_le_bytes());
    p.push(33);
    p.extend_from_slice(&2u16.to_le_bytes());
    p.extend_from_slice(&caps_hi.to_le_bytes());
    p.push(21);
    p.extend_from_slice(&[0u8; 10]);
    p.extend_from_slice(&SCRAMBLE[8..]);
    p.push(0);
    p.extend_from_slice(plugin.as_bytes());
    p.push(0);
    p
}

fn lenenc(value: u64) -> Vec<u8> {
    match value {
        0..=250 => vec![value as u8],
        251..=0xFF_FF => {
            let mut v = vec![0xFC];
            v.extend_from_slice(&(value as u16).to_le_bytes());
            v
        }
        _ => {
            let mut v = vec![0xFE];
            v.extend_from_slice(&value.to_le_bytes());
            v
        }
    }
}

fn ok_payload(affected: u64, last_insert_id: u64, status: u16) -> Vec<u8> {
    let mut p = vec![0x00];
    p.extend(lenenc(affected));
    p.extend(lenenc(last_insert_id));
    p.extend_from_slice(&status.to_le_bytes());
    p.extend_from_slice(&0u16.to_le_bytes());
    p
}

fn eof_payload(status: u16) -> Vec<u8> {
    let mut p = vec![0xFE];
    p.extend_from_slice(&0u16.to_le_bytes());
    p.extend_from_slice(&status.to_le_bytes());
    p
}

fn err_payload(code: u16, sql_state: &str, message: &str) -> Vec<u8> {
    let mut p = vec![0xFF];
    p.extend_from_slice(&code.to_le_bytes());
    p.push(b'#');
    p.extend_from_slice(sql_state.as_bytes());
    p.extend_from_slice(message.as_bytes());
    p
}

fn column_def_payload(name: &str, type_id: u8) -> Vec<u8> {
    let mut p = Vec::new();

    for field in ["def", "", "", "", name, name] {
        p.extend(lenenc(field.len() as u64));
        p.extend_from_slice(field.as_bytes());
    }

    p.extend(lenenc(0x0C));
    p.extend_from_slice(&63u16.to_le_bytes());
    p.extend_from_slice(&11u32.to_le_bytes());
    p.push(type_id);
    p.extend_from_slice(&0u16.to_le_bytes());
    p.push(0);
    p.extend_from_slice(&0u16.to_le_bytes());
    p
}

fn native_scramble(password: &str, scramble: &[u8]) -> Vec<u8> {
    let pw: [u8; 20] = Sha1::digest(password.as_bytes()).into();
    let pw2: [u8; 20] = Sha1::digest(pw).into();

    let mut ctx = Sha1::new();
    ctx.update(scramble);
    ctx.update(pw2);
    let salted: [u8; 20] = ctx.finalize().into();

    pw.iter().zip(salted.iter()).map(|(a, b)| a ^ b).collect()
}

// serve the connection phase with mysql_native_password, returning the
// client's handshake response for inspection
async fn serve_connect(server: &mut DuplexStream, caps_hi: u16) -> Vec<u8> {
    send(server, 0, &handshake_payload("mysql_native_password", caps_hi)).await;

    let (sequence_id, response) = recv(server).await;
    assert_eq!(sequence_id, 1);

    send(server, 2, &ok_payload(0, 0, 0x0002)).await;

    response
}

fn options() -> ConnectOptions {
    ConnectOptions::new().username("root").password("root")
}

async fn connect(caps_hi: u16, options: ConnectOptions) -> (Connection, DuplexStream) {
    let (client, mut server) = duplex(1 << 20);

    let server_task = tokio::spawn(async move {
        serve_connect(&mut server, caps_hi).await;
        server
    });

    let conn = Connection::connect_over(client, &options).await.unwrap();
    let server = server_task.await.unwrap();

    (conn, server)
}

#[tokio::test]
async fn handshake_to_idle_with_native_password() -> Result<()> {
    let (client, mut server) = duplex(1 << 20);

    let server_task = tokio::spawn(async move {
        let response = serve_connect(&mut server, CAPS_HI_BASE).await;

        // negotiated capabilities: the intersection of what we advertised
        // with what the driver wants (no database, so no CONNECT_WITH_DB)
        let expected = Capabilities::PROTOCOL_41
            | Capabilities::SECURE_CONNECTION
            | Capabilities::TRANSACTIONS
            | Capabilities::PLUGIN_AUTH
            | Capabilities::PLUGIN_AUTH_LENENC_CLIENT_DATA
            | Capabilities::CONNECT_ATTRS;

        assert_eq!(&response[..4], &expected.bits().to_le_bytes());

        // max packet size, collation, 23 reserved bytes
        assert_eq!(&response[4..8], &16_777_216u32.to_le_bytes());
        assert_eq!(response[8], 224);
        assert!(response[9..32].iter().all(|&b| b == 0));

        // username, then the length-encoded native-password scramble
        assert_eq!(&response[32..37], b"root\0");
        assert_eq!(response[37], 20);
        assert_eq!(&response[38..58], &native_scramble("root", &SCRAMBLE)[..]);

        // client plugin name, then an empty connect-attrs block
        assert_eq!(&response[58..80], b"mysql_native_password\0");
        assert_eq!(&response[80..], &[0]);
    });

    let conn = Connection::connect_over(client, &options()).await?;
    server_task.await?;

    assert_eq!(conn.connection_id(), 10);
    assert_eq!(conn.server_version(), "8.0.32");
    assert!(conn.capabilities().contains(Capabilities::PROTOCOL_41));
    assert!(!conn.capabilities().contains(Capabilities::SSL));
    assert!(!conn.is_tls());

    Ok(())
}

#[tokio::test]
async fn auth_switch_replays_the_fast_phase_with_the_new_scramble() -> Result<()> {
    let (client, mut server) = duplex(1 << 20);

    let server_task = tokio::spawn(async move {
        send(
            &mut server,
            0,
            &handshake_payload("caching_sha2_password", CAPS_HI_BASE),
        )
        .await;

        let (sequence_id, _response) = recv(&mut server).await;
        assert_eq!(sequence_id, 1);

        // demand mysql_native_password under a fresh scramble
        let new_scramble = [9u8; 20];
        let mut switch = vec![0xFE];
        switch.extend_from_slice(b"mysql_native_password\0");
        switch.extend_from_slice(&new_scramble);
        switch.push(0);
        send(&mut server, 2, &switch).await;

        let (sequence_id, reply) = recv(&mut server).await;
        assert_eq!(sequence_id, 3);
        assert_eq!(reply, native_scramble("root", &new_scramble));

        send(&mut server, 4, &ok_payload(0, 0, 0x0002)).await;
    });

    let conn = Connection::connect_over(client, &options()).await?;
    server_task.await?;

    assert_eq!(conn.server_version(), "8.0.32");

    Ok(())
}

#[tokio::test]
async fn caching_sha2_fast_path_completes_on_more_data() -> Result<()> {
    let (client, mut server) = duplex(1 << 20);

    let server_task = tokio::spawn(async move {
        send(
            &mut server,
            0,
            &handshake_payload("caching_sha2_password", CAPS_HI_BASE),
        )
        .await;

        let (_, response) = recv(&mut server).await;

        // a 32-byte scramble went out
        assert_eq!(response[37], 32);

        // fast-auth success marker, then the OK
        send(&mut server, 2, &[0x01, 0x03]).await;
        send(&mut server, 3, &ok_payload(0, 0, 0x0002)).await;
    });

    Connection::connect_over(client, &options()).await?;
    server_task.await?;

    Ok(())
}

#[tokio::test]
async fn connection_phase_err_is_an_auth_failure() {
    let (client, mut server) = duplex(1 << 20);

    tokio::spawn(async move {
        send(&mut server, 0, &handshake_payload("mysql_native_password", CAPS_HI_BASE)).await;

        let _ = recv(&mut server).await;

        send(
            &mut server,
            2,
            &err_payload(1045, "28000", "Access denied for user 'root'"),
        )
        .await;
    });

    let err = Connection::connect_over(client, &options()).await.unwrap_err();

    assert!(matches!(err, Error::Auth(_)));
    assert!(err.to_string().contains("Access denied"));
}

#[tokio::test]
async fn simple_select_yields_one_row_and_one_window() -> Result<()> {
    let (mut conn, mut server) = connect(CAPS_HI_BASE, options()).await;

    let server_task = tokio::spawn(async move {
        let command = recv_command(&mut server).await;
        assert_eq!(command, b"\x03SELECT 1");

        send(&mut server, 1, &[0x01]).await;
        send(&mut server, 2, &column_def_payload("1", 0x08)).await;
        send(&mut server, 3, &eof_payload(0x0002)).await;
        send(&mut server, 4, &[0x01, b'1']).await;
        send(&mut server, 5, &eof_payload(0x0002)).await;
    });

    let mut results = conn.query("SELECT 1").await?;

    let row = match results.next().await? {
        Some(Either::Right(row)) => row,
        other => panic!("expected a row, got {:?}", other.is_some()),
    };

    assert_eq!(row.try_get_i64(0)?, Some(1));
    assert_eq!(row.try_get_str("1")?.as_deref(), Some("1"));

    let window = match results.next().await? {
        Some(Either::Left(window)) => window,
        _ => panic!("expected the window summary"),
    };

    assert_eq!(window.rows_affected(), 0);
    assert!(results.next().await?.is_none());

    server_task.await?;

    Ok(())
}

#[tokio::test]
async fn prepared_batch_resends_types_when_a_slot_goes_null() -> Result<()> {
    let (mut conn, mut server) = connect(CAPS_HI_BASE, options()).await;

    let server_task = tokio::spawn(async move {
        let command = recv_command(&mut server).await;
        assert_eq!(command, b"\x16INSERT INTO t(a,b) VALUES(?,?)");

        // prepared-ok: statement 7, no result columns, two parameters
        let mut prepare_ok = vec![0x00];
        prepare_ok.extend_from_slice(&7u32.to_le_bytes());
        prepare_ok.extend_from_slice(&0u16.to_le_bytes());
        prepare_ok.extend_from_slice(&2u16.to_le_bytes());
        prepare_ok.push(0);
        prepare_ok.extend_from_slice(&0u16.to_le_bytes());
        send(&mut server, 1, &prepare_ok).await;

        send(&mut server, 2, &column_def_payload("?", 0xFD)).await;
        send(&mut server, 3, &column_def_payload("?", 0xFD)).await;
        send(&mut server, 4, &eof_payload(0x0002)).await;

        // first execution: both slots bound, types sent
        let execute = recv_command(&mut server).await;
        let mut expected = vec![0x17];
        expected.extend_from_slice(&7u32.to_le_bytes());
        expected.push(0x00);
        expected.extend_from_slice(&1u32.to_le_bytes());
        expected.push(0x00); // null bitmap
        expected.push(0x01); // new-params-bound
        expected.extend_from_slice(&[0x08, 0x00, 0xFD, 0x00]);
        expected.extend_from_slice(&42u64.to_le_bytes());
        expected.extend_from_slice(&[0x02, b'h', b'i']);
        assert_eq!(execute, expected);

        send(&mut server, 1, &ok_payload(1, 1, 0x0002)).await;

        // second execution: the first slot went NULL, so the type vector
        // changed and must be re-sent
        let execute = recv_command(&mut server).await;
        let mut expected = vec![0x17];
        expected.extend_from_slice(&7u32.to_le_bytes());
        expected.push(0x00);
        expected.extend_from_slice(&1u32.to_le_bytes());
        expected.push(0x01); // null bitmap: first parameter is NULL
        expected.push(0x01); // new-params-bound again
        expected.extend_from_slice(&[0x06, 0x00, 0xFD, 0x00]);
        expected.extend_from_slice(&[0x01, b'y']);
        assert_eq!(execute, expected);

        send(&mut server, 1, &ok_payload(1, 2, 0x0002)).await;

        // the batch closes its statement, fire-and-forget
        let close = recv_command(&mut server).await;
        assert_eq!(close, [0x19, 7, 0, 0, 0]);
    });

    let mut first = Bindings::new(2);
    first.bind(0, 42i64)?.bind(1, "hi")?;

    let mut second = Bindings::new(2);
    second.bind_null(0)?.bind(1, "y")?;

    let results = conn
        .execute_prepared_batch("INSERT INTO t(a,b) VALUES(?,?)", &[first, second])
        .await?;

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].rows_affected(), 1);
    assert_eq!(results[0].last_insert_id(), 1);
    assert_eq!(results[1].last_insert_id(), 2);

    server_task.await?;

    Ok(())
}

#[tokio::test]
async fn cancelling_mid_result_drains_before_the_next_exchange() -> Result<()> {
    let (mut conn, mut server) = connect(CAPS_HI_BASE, options()).await;

    let server_task = tokio::spawn(async move {
        let command = recv_command(&mut server).await;
        assert_eq!(command, b"\x03SELECT n FROM seq");

        send(&mut server, 1, &[0x01]).await;
        send(&mut server, 2, &column_def_payload("n", 0x08)).await;
        send(&mut server, 3, &eof_payload(0x0002)).await;
        send(&mut server, 4, &[0x01, b'1']).await;
        send(&mut server, 5, &[0x01, b'2']).await;
        send(&mut server, 6, &[0x01, b'3']).await;
        send(&mut server, 7, &eof_payload(0x0002)).await;

        // the abandoned rows must be drained before this arrives
        let command = recv_command(&mut server).await;
        assert_eq!(command, [0x0E]);

        send(&mut server, 1, &ok_payload(0, 0, 0x0002)).await;
    });

    let mut results = conn.query("SELECT n FROM seq").await?;

    match results.next().await? {
        Some(Either::Right(row)) => assert_eq!(row.try_get_i64(0)?, Some(1)),
        _ => panic!("expected the first row"),
    }

    // cancel with two rows and the terminator still in flight
    drop(results);

    conn.ping().await?;

    server_task.await?;

    Ok(())
}

#[tokio::test]
async fn each_exchange_restarts_the_sequence() -> Result<()> {
    let (mut conn, mut server) = connect(CAPS_HI_BASE, options()).await;

    let server_task = tokio::spawn(async move {
        for _ in 0..2 {
            // recv_command asserts the client reset to sequence id 0
            let command = recv_command(&mut server).await;
            assert_eq!(command, b"\x03DO 1");

            send(&mut server, 1, &ok_payload(0, 0, 0x0002)).await;
        }
    });

    conn.execute("DO 1").await?;
    conn.execute("DO 1").await?;

    server_task.await?;

    Ok(())
}

#[tokio::test]
async fn a_server_error_fails_the_exchange_but_not_the_connection() -> Result<()> {
    let (mut conn, mut server) = connect(CAPS_HI_BASE, options()).await;

    let server_task = tokio::spawn(async move {
        let _query = recv_command(&mut server).await;
        send(
            &mut server,
            1,
            &err_payload(1146, "42S02", "Table 'test.missing' doesn't exist"),
        )
        .await;

        let ping = recv_command(&mut server).await;
        assert_eq!(ping, [0x0E]);
        send(&mut server, 1, &ok_payload(0, 0, 0x0002)).await;
    });

    let err = conn.execute("SELECT * FROM missing").await.unwrap_err();

    match &err {
        Error::Server(server_error) => {
            assert_eq!(server_error.code, 1146);
            assert_eq!(server_error.sql_state.as_deref(), Some("42S02"));
        }
        other => panic!("expected a server error, got {other:?}"),
    }

    conn.ping().await?;

    server_task.await?;

    Ok(())
}

#[tokio::test]
async fn multi_statement_batches_group_into_windows() -> Result<()> {
    let (mut conn, mut server) = connect(
        CAPS_HI_MULTI,
        options().multi_statements(true),
    )
    .await;

    let server_task = tokio::spawn(async move {
        let command = recv_command(&mut server).await;
        assert_eq!(command, b"\x03UPDATE t SET a = 0; SELECT 1");

        // first window: an UPDATE with more results to follow
        send(&mut server, 1, &ok_payload(3, 0, 0x000A)).await;

        // second window: a one-row result set
        send(&mut server, 2, &[0x01]).await;
        send(&mut server, 3, &column_def_payload("1", 0x08)).await;
        send(&mut server, 4, &eof_payload(0x0002)).await;
        send(&mut server, 5, &[0x01, b'1']).await;
        send(&mut server, 6, &eof_payload(0x0002)).await;
    });

    let windows = conn
        .execute_batch("UPDATE t SET a = 0; SELECT 1")
        .await?;

    assert_eq!(windows.len(), 2);
    assert_eq!(windows[0].rows_affected(), 3);
    assert_eq!(windows[1].rows_affected(), 0);

    server_task.await?;

    Ok(())
}

#[tokio::test]
async fn deprecate_eof_skips_metadata_terminators() -> Result<()> {
    // high half with DEPRECATE_EOF advertised
    let (mut conn, mut server) = connect(CAPS_HI_BASE | 0x0100, options()).await;

    let server_task = tokio::spawn(async move {
        let _query = recv_command(&mut server).await;

        send(&mut server, 1, &[0x01]).await;
        send(&mut server, 2, &column_def_payload("1", 0x08)).await;
        // no EOF: rows follow the metadata directly, and an OK with the
        // 0xFE header terminates them
        send(&mut server, 3, &[0x01, b'1']).await;

        let mut terminator = ok_payload(0, 0, 0x0002);
        terminator[0] = 0xFE;
        send(&mut server, 4, &terminator).await;
    });

    let rows = conn.fetch_all("SELECT 1").await?;

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].try_get_i64(0)?, Some(1));

    server_task.await?;

    Ok(())
}

#[tokio::test]
async fn quit_is_fire_and_forget() -> Result<()> {
    let (conn, mut server) = connect(CAPS_HI_BASE, options()).await;

    let server_task = tokio::spawn(async move {
        let command = recv_command(&mut server).await;
        assert_eq!(command, [0x01]);
    });

    conn.close().await?;
    server_task.await?;

    Ok(())
}
