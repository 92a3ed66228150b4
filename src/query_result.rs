use crate::protocol::response::{EofPacket, OkPacket};
use crate::protocol::Status;

/// The summary of one result window: what an `OK` (or terminating `EOF`)
/// said about the statement that produced it.
#[derive(Debug, Clone)]
pub struct QueryResult {
    pub(crate) rows_affected: u64,
    pub(crate) last_insert_id: u64,
    pub(crate) warnings: u16,
    pub(crate) status: Status,
}

impl Default for QueryResult {
    fn default() -> Self {
        Self {
            rows_affected: 0,
            last_insert_id: 0,
            warnings: 0,
            status: Status::empty(),
        }
    }
}

impl QueryResult {
    /// Number of rows changed by the statement; 0 for pure reads.
    pub fn rows_affected(&self) -> u64 {
        self.rows_affected
    }

    /// The first id generated by an auto-increment insert, or 0.
    pub fn last_insert_id(&self) -> u64 {
        self.last_insert_id
    }

    pub fn warnings(&self) -> u16 {
        self.warnings
    }

    pub(crate) fn more_results(&self) -> bool {
        self.status.contains(Status::SERVER_MORE_RESULTS_EXISTS)
    }

    pub(crate) fn from_ok(ok: OkPacket) -> Self {
        Self {
            rows_affected: ok.affected_rows,
            last_insert_id: ok.last_insert_id,
            warnings: ok.warnings,
            status: ok.status,
        }
    }

    pub(crate) fn from_eof(eof: EofPacket) -> Self {
        Self {
            rows_affected: 0,
            last_insert_id: 0,
            warnings: eof.warnings,
            status: eof.status,
        }
    }
}
