/// What the next server message can be.
///
/// The same leading byte decodes differently depending on where the active
/// exchange stands; this tag is carried by the packet stream and advanced
/// by the command flows. The drain path uses it to discard responses owed
/// to a cancelled exchange while keeping sequence invariants intact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DecodeContext {
    /// Connection phase: OK, ERR, auth-switch, or auth-more-data.
    Connection,

    /// No exchange in flight; the next message (if any) is unsolicited
    /// and therefore a protocol violation.
    Idle,

    /// A command was sent: OK, ERR, local-infile, or a column count.
    Command,

    /// `COM_STMT_PREPARE` was sent: prepared-ok or ERR.
    WaitPrepare,

    /// Consuming prepared-statement metadata: first the parameter
    /// definitions, then the column definitions, each run closed by an
    /// EOF unless `DEPRECATE_EOF` was negotiated.
    PrepareMetadata { params: u16, columns: u16 },

    /// Consuming result-set column definitions.
    ResultMetadata { remaining: u64, binary: bool },

    /// Consuming result rows until the terminating OK/EOF.
    ResultRows { columns: u64, binary: bool },
}

impl DecodeContext {
    pub(crate) fn is_idle(self) -> bool {
        matches!(self, DecodeContext::Idle)
    }
}
