use std::collections::HashMap;

use log::debug;

use crate::connection::stream::MAX_PACKET_SIZE;
use crate::connection::{Connection, PacketStream, Session};
use crate::error::{err_protocol, Error, Result};
use crate::io::ProtocolDecode;
use crate::net::{MaybeTlsStream, Socket};
use crate::options::{ConnectOptions, SslMode};
use crate::protocol::auth::{
    AuthPlugin, AUTH_FAST_OK, AUTH_FULL_REQUIRED, AUTH_REQUEST_RSA_KEY,
};
use crate::protocol::connect::{AuthResponse, AuthSwitchRequest, Handshake, HandshakeResponse};
use crate::protocol::{Capabilities, DecodeContext};

impl Connection {
    /// Drives the connection phase: handshake, capability negotiation,
    /// the optional TLS upgrade, and the authentication exchange, ending
    /// with the stream idle in the command phase.
    pub(crate) async fn establish(
        socket: Box<dyn Socket>,
        options: &ConnectOptions,
    ) -> Result<Self> {
        // collation id 0 is reserved; it would leave the session without
        // a character set
        if options.collation == 0 {
            return Err(Error::misuse("collation id 0 is not a valid session collation"));
        }

        let mut stream = PacketStream::new(MaybeTlsStream::Raw(socket));

        // the server opens the conversation
        let packet = stream.recv_packet().await?;

        if packet.header()? == 0xFF {
            // the server refused before the handshake proper (too many
            // connections, host blocked, ...)
            return Err(Error::auth(packet.err(Capabilities::empty())?));
        }

        let handshake = Handshake::decode_with(packet.0, ())?;

        stream.capabilities = negotiate(options, handshake.server_capabilities)?;

        debug!(
            "handshake from {} (connection id {}, capabilities {:#x})",
            handshake.server_version,
            handshake.connection_id,
            handshake.server_capabilities.bits(),
        );

        maybe_upgrade_tls(&mut stream, options, handshake.server_capabilities).await?;

        let mut plugin = handshake
            .auth_plugin
            .unwrap_or(AuthPlugin::MySqlNativePassword);
        let mut scramble = handshake.scramble;
        let password = options.password.as_deref().unwrap_or("");

        let is_tls = stream.transport_is_tls();

        if plugin.requires_secure_channel() && !is_tls {
            return Err(Error::auth(format_args!(
                "{} requires a TLS connection",
                plugin.name()
            )));
        }

        let auth_response = plugin.fast_phase(password, &scramble, is_tls);

        stream
            .send_packet(
                HandshakeResponse {
                    max_packet_size: MAX_PACKET_SIZE,
                    collation: options.collation,
                    username: &options.username,
                    database: options.database.as_deref(),
                    auth_plugin: Some(plugin),
                    auth_response: &auth_response,
                    attrs: &options.connect_attrs,
                },
                stream.capabilities,
                false,
            )
            .await?;

        // authentication exchange: the server ends it with OK or ERR;
        // anything in between is plugin negotiation
        let ok = loop {
            let packet = stream.recv_packet().await?;

            match packet.header()? {
                0x00 => break packet.ok(stream.capabilities)?,

                0xFF => return Err(Error::auth(packet.err(stream.capabilities)?)),

                // switch plugin, restart the fast phase under a new scramble
                0xFE => {
                    let switch = AuthSwitchRequest::decode_with(packet.0, ())?;

                    plugin = switch.plugin;
                    scramble = switch.scramble;

                    if plugin.requires_secure_channel() && !is_tls {
                        return Err(Error::auth(format_args!(
                            "{} requires a TLS connection",
                            plugin.name()
                        )));
                    }

                    let response = plugin.fast_phase(password, &scramble, is_tls);
                    stream.send_packet(AuthResponse(&response), (), false).await?;
                }

                // more data: the sha2 family's fast/full negotiation
                0x01 => {
                    let data = &packet.0[1..];

                    match plugin {
                        AuthPlugin::CachingSha2Password => match data {
                            [AUTH_FAST_OK] => {
                                // cache hit; the OK follows
                            }

                            [AUTH_FULL_REQUIRED] => {
                                if is_tls {
                                    // the channel is encrypted; the
                                    // password itself is the proof
                                    let mut response =
                                        Vec::with_capacity(password.len() + 1);
                                    response.extend_from_slice(password.as_bytes());
                                    response.push(0);

                                    stream
                                        .send_packet(AuthResponse(&response), (), false)
                                        .await?;
                                } else {
                                    stream
                                        .send_packet(
                                            AuthResponse(&[AUTH_REQUEST_RSA_KEY]),
                                            (),
                                            false,
                                        )
                                        .await?;
                                }
                            }

                            public_key => {
                                let encrypted =
                                    plugin.full_phase(password, &scramble, public_key)?;

                                stream
                                    .send_packet(AuthResponse(&encrypted), (), false)
                                    .await?;
                            }
                        },

                        AuthPlugin::Sha256Password => {
                            let encrypted = plugin.full_phase(password, &scramble, data)?;

                            stream.send_packet(AuthResponse(&encrypted), (), false).await?;
                        }

                        _ => {
                            return Err(err_protocol!(
                                "unexpected extra auth data for {}",
                                plugin.name()
                            ));
                        }
                    }
                }

                header => {
                    return Err(err_protocol!(
                        "unexpected message (0x{:02X}) during authentication",
                        header
                    ));
                }
            }
        };

        // the scramble and plugin are spent; credentials never left the
        // caller's options
        scramble.clear();
        stream.context = DecodeContext::Idle;

        debug!(
            "connected to MySQL {} as {:?} (connection id {})",
            handshake.server_version, options.username, handshake.connection_id,
        );

        Ok(Connection {
            stream,
            session: Session {
                connection_id: handshake.connection_id,
                server_version: handshake.server_version,
                server_capabilities: handshake.server_capabilities,
                collation: options.collation,
                status: ok.status,
            },
            last_statement_types: HashMap::new(),
            zero_date: options.zero_date,
        })
    }
}

/// The client capability set: what this driver wants, intersected with
/// what the server offers. `PROTOCOL_41` is not negotiable.
fn negotiate(options: &ConnectOptions, server: Capabilities) -> Result<Capabilities> {
    if !server.contains(Capabilities::PROTOCOL_41) {
        return Err(err_protocol!(
            "server does not support the 4.1 protocol; its capabilities are {:#x}",
            server.bits()
        ));
    }

    let mut requested = Capabilities::PROTOCOL_41
        | Capabilities::SECURE_CONNECTION
        | Capabilities::TRANSACTIONS
        | Capabilities::PLUGIN_AUTH
        | Capabilities::PLUGIN_AUTH_LENENC_CLIENT_DATA
        | Capabilities::CONNECT_ATTRS
        | Capabilities::DEPRECATE_EOF;

    if options.database.is_some() {
        requested |= Capabilities::CONNECT_WITH_DB;
    }

    if options.multi_statements {
        requested |= Capabilities::MULTI_STATEMENTS | Capabilities::MULTI_RESULTS;
    }

    Ok(requested & server)
}

async fn maybe_upgrade_tls(
    stream: &mut PacketStream<MaybeTlsStream>,
    options: &ConnectOptions,
    server: Capabilities,
) -> Result<()> {
    let required = matches!(
        options.ssl_mode,
        SslMode::Required | SslMode::VerifyCa | SslMode::VerifyIdentity
    );

    if matches!(options.ssl_mode, SslMode::Disabled) {
        return Ok(());
    }

    #[cfg(feature = "tls")]
    if server.contains(Capabilities::SSL) {
        use crate::protocol::connect::SslRequest;

        stream.capabilities |= Capabilities::SSL;

        stream
            .send_packet(
                SslRequest {
                    max_packet_size: MAX_PACKET_SIZE,
                    collation: options.collation,
                },
                stream.capabilities,
                false,
            )
            .await?;

        let raw = std::mem::replace(stream.stream_mut(), MaybeTlsStream::Upgrading);
        *stream.stream_mut() = crate::net::tls::upgrade(raw, options).await?;
    }

    let _ = server;

    if required && !stream.transport_is_tls() {
        return Err(Error::Tls(
            if cfg!(feature = "tls") {
                "server does not support TLS"
            } else {
                "TLS was required but this build has no `tls` feature"
            }
            .into(),
        ));
    }

    Ok(())
}
