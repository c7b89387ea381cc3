//! Price history handler.

use super::history::PriceHistory;
use super::parser::{self, Record, RECORD_LEN};
use crate::runtime::{Buffer, BufferError, Outbox, ProcessResult};
use tracing::trace;

/// Apply every complete record; a trailing partial record is left buffered.
pub fn process(
    history: &mut PriceHistory,
    input: &mut Buffer,
    out: &mut Outbox<'_>,
) -> Result<ProcessResult, BufferError> {
    let mut messages = 0;

    while let Some(record) = parser::parse(input.as_slice()) {
        match record {
            Record::Insert { timestamp, price } => {
                history.insert(timestamp, price);
                trace!(conn_id = out.id(), samples = history.len(), "Stored price");
            }
            Record::Query { min_time, max_time } => {
                out.send(&parser::encode_mean(history.mean(min_time, max_time)))?;
            }
            Record::Unknown(kind) => {
                trace!(conn_id = out.id(), kind, "Skipping unknown record");
            }
        }
        input.consume(RECORD_LEN);
        messages += 1;
    }

    Ok(ProcessResult::consumed(messages))
}
