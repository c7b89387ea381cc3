//! Echo protocol handler.

use crate::runtime::{Buffer, BufferError, Outbox, ProcessResult};

/// Queue everything buffered back to the sender.
pub fn process(input: &mut Buffer, out: &mut Outbox<'_>) -> Result<ProcessResult, BufferError> {
    if input.is_empty() {
        return Ok(ProcessResult::default());
    }

    out.send(input.as_slice())?;
    input.clear();
    Ok(ProcessResult::consumed(1))
}

#[cfg(test)]
mod tests {
    use crate::runtime::protocol::tests::Harness;
    use crate::runtime::Protocol;

    #[test]
    fn test_echo_without_newline() {
        let mut harness = Harness::new(Protocol::Echo, 1);

        let result = harness.feed(0, b"abc");
        assert_eq!(result.messages, 1);
        assert!(!result.close);
        assert_eq!(harness.take_output(0), b"abc");
        assert!(harness.inbound(0).is_empty());
    }

    #[test]
    fn test_echo_empty_input() {
        let mut harness = Harness::new(Protocol::Echo, 1);

        let result = harness.feed(0, b"");
        assert_eq!(result.messages, 0);
        assert!(harness.take_output(0).is_empty());
    }

    #[test]
    fn test_echo_binary_passthrough() {
        let mut harness = Harness::new(Protocol::Echo, 1);
        let payload: Vec<u8> = (0..=255u8).cycle().take(10_000).collect();

        harness.feed(0, &payload[..3000]);
        harness.feed(0, &payload[3000..]);
        assert_eq!(harness.take_output(0), payload);
    }
}
