use std::sync::Arc;

use either::Either;
use log::debug;

use crate::bindings::Bindings;
use crate::column::{Column, ResultColumns};
use crate::connection::stream::ServerMessage;
use crate::connection::Connection;
use crate::error::{err_protocol, Error, Result};
use crate::protocol::statement::{
    BinaryRow, ComStmtClose, ComStmtExecute, ComStmtPrepare, ComStmtReset,
};
use crate::protocol::text::{ColumnType, ComInitDb, ComPing, ComQuery, TextRow};
use crate::protocol::{Capabilities, DecodeContext};
use crate::query_result::QueryResult;
use crate::row::Row;
use crate::statement::Statement;
use crate::value::ValueFormat;

impl Connection {
    /// Checks that the server is alive and the stream is in order.
    pub async fn ping(&mut self) -> Result<()> {
        self.stream.wait_until_ready().await?;
        self.stream.send_packet(ComPing, (), true).await?;
        self.stream.context = DecodeContext::Command;

        self.recv_ok().await.map(|_| ())
    }

    /// Switches the default schema (`COM_INIT_DB`).
    pub async fn use_database(&mut self, database: &str) -> Result<()> {
        self.stream.wait_until_ready().await?;
        self.stream.send_packet(ComInitDb(database), (), true).await?;
        self.stream.context = DecodeContext::Command;

        self.recv_ok().await.map(|_| ())
    }

    /// Sends a text-protocol query and returns the pull-driven stream of
    /// its results. Dropping the stream cancels the exchange: whatever
    /// the server still sends for it is drained and discarded before the
    /// next exchange starts.
    pub async fn query<'c>(&'c mut self, sql: &str) -> Result<QueryStream<'c>> {
        self.stream.wait_until_ready().await?;

        debug!("executing query ({} bytes)", sql.len());

        self.stream.result_format = ValueFormat::Text;
        self.stream.send_packet(ComQuery(sql), (), true).await?;
        self.stream.context = DecodeContext::Command;

        Ok(QueryStream::new(self, ValueFormat::Text, None))
    }

    /// Runs a statement (or a semicolon-joined batch) to completion and
    /// reports the last result window.
    pub async fn execute(&mut self, sql: &str) -> Result<QueryResult> {
        self.query(sql).await?.finish().await
    }

    /// Runs a semicolon-joined batch and reports one result window per
    /// statement, in order. Requires
    /// [`multi_statements`][crate::ConnectOptions::multi_statements].
    pub async fn execute_batch(&mut self, sql: &str) -> Result<Vec<QueryResult>> {
        let mut stream = self.query(sql).await?;
        let mut windows = Vec::new();

        while let Some(event) = stream.next().await? {
            if let Either::Left(result) = event {
                windows.push(result);
            }
        }

        Ok(windows)
    }

    /// Collects every row the query produces, across all result windows.
    pub async fn fetch_all(&mut self, sql: &str) -> Result<Vec<Row>> {
        self.query(sql).await?.all_rows().await
    }

    /// The first row, if any. The rest of the exchange is cancelled.
    pub async fn fetch_optional(&mut self, sql: &str) -> Result<Option<Row>> {
        self.query(sql).await?.first_row().await
    }

    /// Exactly one row, or [`RowNotFound`][Error::RowNotFound].
    pub async fn fetch_one(&mut self, sql: &str) -> Result<Row> {
        self.fetch_optional(sql).await?.ok_or(Error::RowNotFound)
    }

    /// Prepares a statement (`COM_STMT_PREPARE`) and consumes its
    /// metadata, returning the reusable handle.
    pub async fn prepare(&mut self, sql: &str) -> Result<Statement> {
        self.stream.wait_until_ready().await?;

        debug!("preparing statement ({} bytes)", sql.len());

        self.stream.send_packet(ComStmtPrepare(sql), (), true).await?;
        self.stream.context = DecodeContext::WaitPrepare;

        let ok = match self.stream.recv_message().await? {
            ServerMessage::PreparedOk(ok) => ok,
            ServerMessage::Err(err) => return Err(err.into()),

            _ => {
                return Err(err_protocol!(
                    "expected a prepare response or an error"
                ));
            }
        };

        debug!(
            "prepared statement {} ({} params, {} columns, {} warnings)",
            ok.statement_id, ok.params, ok.columns, ok.warnings,
        );

        // parameter definitions first (their types are placeholders and
        // not retained), then the result column definitions
        let mut seen_params = 0u16;
        let mut columns = Vec::with_capacity(ok.columns as usize);

        while !self.stream.context.is_idle() {
            match self.stream.recv_message().await? {
                ServerMessage::ColumnDefinition(def) => {
                    if seen_params < ok.params {
                        seen_params += 1;
                    } else {
                        columns.push(Column::from_definition(&def));
                    }
                }

                ServerMessage::Eof => {}

                ServerMessage::Err(err) => return Err(err.into()),

                _ => {
                    return Err(err_protocol!(
                        "unexpected message inside prepared-statement metadata"
                    ));
                }
            }
        }

        Ok(Statement {
            id: ok.statement_id,
            params: ok.params,
            columns,
        })
    }

    /// Executes a prepared statement and streams its (binary-protocol)
    /// results.
    pub async fn fetch_prepared<'c>(
        &'c mut self,
        statement: &Statement,
        bindings: &Bindings,
    ) -> Result<QueryStream<'c>> {
        self.start_execute(statement, bindings).await?;

        Ok(QueryStream::new(self, ValueFormat::Binary, None))
    }

    /// Executes a prepared statement to completion.
    pub async fn execute_prepared(
        &mut self,
        statement: &Statement,
        bindings: &Bindings,
    ) -> Result<QueryResult> {
        self.start_execute(statement, bindings).await?;

        QueryStream::new(self, ValueFormat::Binary, None)
            .finish()
            .await
    }

    /// The whole prepared flow in one call: prepare, execute every
    /// binding set in order, close. The statement is closed on every
    /// path, including errors and cancellation mid-result.
    pub async fn execute_prepared_batch(
        &mut self,
        sql: &str,
        batches: &[Bindings],
    ) -> Result<Vec<QueryResult>> {
        let statement = self.prepare(sql).await?;

        let mut results = Vec::with_capacity(batches.len());

        for bindings in batches {
            match self.start_execute(&statement, bindings).await {
                Ok(()) => {}
                Err(err) => {
                    self.close_statement_quietly(statement.id).await;
                    return Err(err);
                }
            }

            // mark the stream so cancellation mid-result still emits the
            // statement close once the exchange is drained
            match QueryStream::new(self, ValueFormat::Binary, Some(statement.id))
                .finish()
                .await
            {
                Ok(result) => results.push(result),
                Err(err) => {
                    self.close_statement_quietly(statement.id).await;
                    return Err(err);
                }
            }
        }

        self.close_statement(statement).await?;

        Ok(results)
    }

    /// Releases a prepared statement (`COM_STMT_CLOSE`, fire-and-forget).
    pub async fn close_statement(&mut self, statement: Statement) -> Result<()> {
        self.last_statement_types.remove(&statement.id);
        self.stream.pending_close.retain(|&id| id != statement.id);
        self.stream.wait_until_ready().await?;

        self.stream
            .send_packet(
                ComStmtClose {
                    statement_id: statement.id,
                },
                (),
                true,
            )
            .await
    }

    /// Clears a prepared statement's accumulated state on the server
    /// (`COM_STMT_RESET`); unlike close, the server acknowledges.
    pub async fn reset_statement(&mut self, statement: &Statement) -> Result<()> {
        self.stream.wait_until_ready().await?;

        self.stream
            .send_packet(
                ComStmtReset {
                    statement_id: statement.id,
                },
                (),
                true,
            )
            .await?;
        self.stream.context = DecodeContext::Command;

        self.recv_ok().await.map(|_| ())
    }

    async fn start_execute(&mut self, statement: &Statement, bindings: &Bindings) -> Result<()> {
        if bindings.len() != statement.param_count() {
            return Err(Error::misuse(format_args!(
                "statement expects {} parameters but {} were bound",
                statement.param_count(),
                bindings.len()
            )));
        }

        // encodes, and rejects incomplete binding sets before any bytes
        // are written
        let wire = bindings.encode()?;

        self.stream.wait_until_ready().await?;

        let send_types = self.last_statement_types.get(&statement.id) != Some(&wire.types);

        debug!(
            "executing statement {} ({} parameters, send_types: {})",
            statement.id,
            bindings.len(),
            send_types,
        );

        self.stream.result_format = ValueFormat::Binary;
        self.stream
            .send_packet(
                ComStmtExecute {
                    statement_id: statement.id,
                    bindings: &wire,
                    send_types,
                },
                (),
                true,
            )
            .await?;
        self.stream.context = DecodeContext::Command;

        self.last_statement_types.insert(statement.id, wire.types);

        Ok(())
    }

    async fn close_statement_quietly(&mut self, statement_id: u32) {
        self.last_statement_types.remove(&statement_id);
        self.stream.pending_close.retain(|&id| id != statement_id);

        if self.stream.wait_until_ready().await.is_ok() {
            let _ = self
                .stream
                .send_packet(ComStmtClose { statement_id }, (), true)
                .await;
        }
    }

    async fn recv_ok(&mut self) -> Result<QueryResult> {
        match self.stream.recv_message().await? {
            ServerMessage::Ok(result) => {
                self.session.status = result.status;

                Ok(result)
            }

            ServerMessage::Err(err) => Err(err.into()),

            _ => Err(err_protocol!("expected OK or an error")),
        }
    }
}

enum StreamState {
    /// Expecting the head of a result window: OK, ERR, or a column count.
    AwaitWindow,

    /// Inside a row run.
    Rows,

    /// The exchange is complete (or failed); nothing more will be
    /// yielded.
    Done,
}

/// The demand-driven result stream of one exchange.
///
/// Each call to [`next`][Self::next] pulls exactly as much as it needs
/// from the socket. Yields [`Either::Right`] for each row and
/// [`Either::Left`] for each window summary (one per statement in a
/// multi-statement batch). Dropping the stream mid-way cancels the
/// remainder; the connection discards the leftovers before its next
/// exchange.
pub struct QueryStream<'c> {
    conn: &'c mut Connection,
    format: ValueFormat,
    columns: Arc<ResultColumns>,
    types: Vec<ColumnType>,
    state: StreamState,

    // a statement owed a fire-and-forget close if this stream is
    // abandoned before completion (the one-shot prepared flow)
    close_statement_on_drop: Option<u32>,
}

impl<'c> QueryStream<'c> {
    pub(crate) fn new(
        conn: &'c mut Connection,
        format: ValueFormat,
        close_statement_on_drop: Option<u32>,
    ) -> Self {
        let zero_date = conn.zero_date;

        Self {
            conn,
            format,
            columns: ResultColumns::new(Vec::new(), zero_date),
            types: Vec::new(),
            state: StreamState::AwaitWindow,
            close_statement_on_drop,
        }
    }

    /// The columns of the current result window; empty before the first
    /// row-bearing window and for windows without rows.
    pub fn columns(&self) -> &[Column] {
        &self.columns.columns
    }

    /// The next event: a row, a window summary, or `None` once the
    /// exchange is complete.
    pub async fn next(&mut self) -> Result<Option<Either<QueryResult, Row>>> {
        loop {
            match self.state {
                StreamState::Done => return Ok(None),

                StreamState::AwaitWindow => match self.conn.stream.recv_message().await? {
                    ServerMessage::Ok(result) => {
                        return Ok(Some(Either::Left(self.window_done(result))));
                    }

                    ServerMessage::Err(err) => {
                        self.state = StreamState::Done;

                        return Err(err.into());
                    }

                    ServerMessage::ColumnCount(count) => {
                        self.read_metadata(count).await?;
                        self.state = StreamState::Rows;
                    }

                    _ => {
                        self.state = StreamState::Done;

                        return Err(err_protocol!(
                            "unexpected message at the head of a result window"
                        ));
                    }
                },

                StreamState::Rows => match self.conn.stream.recv_message().await? {
                    ServerMessage::TextRow(packet) => {
                        let row = TextRow::decode(packet.0, self.types.len()).map_err(|err| {
                            self.state = StreamState::Done;
                            err
                        })?;

                        return Ok(Some(Either::Right(self.row(row.0))));
                    }

                    ServerMessage::BinaryRow(packet) => {
                        let row = BinaryRow::decode(packet.0, &self.types).map_err(|err| {
                            self.state = StreamState::Done;
                            err
                        })?;

                        return Ok(Some(Either::Right(self.row(row.0))));
                    }

                    ServerMessage::Ok(result) => {
                        return Ok(Some(Either::Left(self.window_done(result))));
                    }

                    ServerMessage::Err(err) => {
                        self.state = StreamState::Done;

                        return Err(err.into());
                    }

                    _ => {
                        self.state = StreamState::Done;

                        return Err(err_protocol!("unexpected message inside a row run"));
                    }
                },
            }
        }
    }

    /// Consumes the remaining events and reports the last window.
    pub async fn finish(mut self) -> Result<QueryResult> {
        let mut last = QueryResult::default();

        while let Some(event) = self.next().await? {
            if let Either::Left(result) = event {
                last = result;
            }
        }

        Ok(last)
    }

    /// Collects every remaining row, across windows.
    pub async fn all_rows(mut self) -> Result<Vec<Row>> {
        let mut rows = Vec::new();

        while let Some(event) = self.next().await? {
            if let Either::Right(row) = event {
                rows.push(row);
            }
        }

        Ok(rows)
    }

    /// The first remaining row; the rest of the exchange is cancelled.
    pub async fn first_row(mut self) -> Result<Option<Row>> {
        while let Some(event) = self.next().await? {
            if let Either::Right(row) = event {
                return Ok(Some(row));
            }
        }

        Ok(None)
    }

    async fn read_metadata(&mut self, count: u64) -> Result<()> {
        let deprecate_eof = self
            .conn
            .stream
            .capabilities
            .contains(Capabilities::DEPRECATE_EOF);

        let mut definitions = Vec::with_capacity(count as usize);

        loop {
            match self.conn.stream.recv_message().await? {
                ServerMessage::ColumnDefinition(def) => {
                    definitions.push(def);

                    if definitions.len() as u64 == count && deprecate_eof {
                        break;
                    }
                }

                ServerMessage::Eof => break,

                ServerMessage::Err(err) => {
                    self.state = StreamState::Done;

                    return Err(err.into());
                }

                _ => {
                    self.state = StreamState::Done;

                    return Err(err_protocol!(
                        "unexpected message inside result-set metadata"
                    ));
                }
            }
        }

        if definitions.len() as u64 != count {
            self.state = StreamState::Done;

            return Err(err_protocol!(
                "result set announced {} columns but described {}",
                count,
                definitions.len()
            ));
        }

        self.types = definitions.iter().map(|def| def.type_id()).collect();
        self.columns = ResultColumns::new(
            definitions.iter().map(Column::from_definition).collect(),
            self.conn.zero_date,
        );

        self.conn.stream.enter_rows(count);

        Ok(())
    }

    fn window_done(&mut self, result: QueryResult) -> QueryResult {
        self.conn.session.status = result.status;

        self.state = if result.more_results() {
            StreamState::AwaitWindow
        } else {
            StreamState::Done
        };

        result
    }

    fn row(&self, data: crate::protocol::RowData) -> Row {
        Row {
            data,
            format: self.format,
            columns: Arc::clone(&self.columns),
        }
    }
}

impl Drop for QueryStream<'_> {
    fn drop(&mut self) {
        // an abandoned one-shot prepared exchange still owes the server a
        // statement close; it goes out once the connection has drained
        // the leftovers of this exchange
        if !matches!(self.state, StreamState::Done) {
            if let Some(statement_id) = self.close_statement_on_drop {
                self.conn.stream.pending_close.push(statement_id);
                self.conn.last_statement_types.remove(&statement_id);
            }
        }
    }
}
