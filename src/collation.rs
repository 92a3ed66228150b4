//! Collation identifiers.
//!
//! A collation id names both a character set and its comparison order;
//! the id travels in the handshake response and governs how the server
//! interprets every text field the client sends.

/// `utf8mb4_unicode_ci`, the default for new connections.
pub const UTF8MB4_UNICODE_CI: u8 = 224;

/// `utf8mb4_general_ci`.
pub const UTF8MB4_GENERAL_CI: u8 = 45;

/// `utf8_general_ci` (the pre-utf8mb4 three-byte encoding).
pub const UTF8_GENERAL_CI: u8 = 33;

/// `latin1_swedish_ci`, the historical server default.
pub const LATIN1_SWEDISH_CI: u8 = 8;

/// `binary`: no character set, byte-wise comparison.
pub const BINARY: u8 = 63;
