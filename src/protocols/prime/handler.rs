//! Prime query handler.

use super::parser::{self, MALFORMED_RESPONSE};
use crate::protocols::next_line;
use crate::runtime::{Buffer, BufferError, Outbox, ProcessResult};
use tracing::debug;

/// Answer every complete request line; stop at the first malformed one.
pub fn process(input: &mut Buffer, out: &mut Outbox<'_>) -> Result<ProcessResult, BufferError> {
    let mut messages = 0;

    while let Some((line, used)) = next_line(input.as_slice()) {
        messages += 1;

        let Some(number) = parser::parse(line) else {
            debug!(conn_id = out.id(), "Malformed prime request");
            out.send(MALFORMED_RESPONSE)?;
            input.clear();
            return Ok(ProcessResult::close(messages));
        };

        out.send(&parser::response(parser::number_is_prime(&number)))?;
        input.consume(used);
    }

    Ok(ProcessResult::consumed(messages))
}

#[cfg(test)]
mod tests {
    use crate::runtime::protocol::tests::Harness;
    use crate::runtime::Protocol;

    #[test]
    fn test_multiple_requests_one_delivery() {
        let mut harness = Harness::new(Protocol::Prime, 1);

        let result = harness.feed(
            0,
            b"{\"method\":\"isPrime\",\"number\":2}\n{\"method\":\"isPrime\",\"number\":4}\r\n",
        );
        assert_eq!(result.messages, 2);
        assert!(!result.close);
        assert_eq!(
            harness.take_output(0),
            b"{\"method\":\"isPrime\",\"prime\":true}\n{\"method\":\"isPrime\",\"prime\":false}\n"
        );
    }

    #[test]
    fn test_request_split_across_deliveries() {
        let mut harness = Harness::new(Protocol::Prime, 1);

        let result = harness.feed(0, b"{\"method\":\"isPr");
        assert_eq!(result.messages, 0);
        assert!(harness.take_output(0).is_empty());
        assert_eq!(harness.inbound(0), b"{\"method\":\"isPr");

        let result = harness.feed(0, b"ime\",\"number\":97}\n{\"meth");
        assert_eq!(result.messages, 1);
        assert_eq!(
            harness.take_output(0),
            b"{\"method\":\"isPrime\",\"prime\":true}\n"
        );
        assert_eq!(harness.inbound(0), b"{\"meth");
    }

    #[test]
    fn test_malformed_stops_processing() {
        let mut harness = Harness::new(Protocol::Prime, 1);

        let result = harness.feed(
            0,
            b"{\"method\":\"isPrime\",\"number\":3}\nnot json\n{\"method\":\"isPrime\",\"number\":5}\n",
        );
        assert_eq!(result.messages, 2);
        assert!(result.close);
        assert_eq!(
            harness.take_output(0),
            b"{\"method\":\"isPrime\",\"prime\":true}\n{}\n"
        );
        assert!(harness.inbound(0).is_empty());
    }
}
