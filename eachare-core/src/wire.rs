//! Framing: one message per line, space-separated fields, `\n` terminated.
//!
//! `<origin> <clock> <TYPE> [arg ...]`

use crate::protocol::{Message, MessageType};

/// Upper bound on a single line. FILE lines carry a base64 chunk, so this caps the chunk size too.
pub const MAX_LINE_LEN: usize = 64 * 1024 * 1024; // 64 MiB

/// Encode a message as a single line, including the terminating `\n`.
pub fn encode(msg: &Message) -> String {
    let mut line = msg.to_string();
    line.push('\n');
    line
}

/// Decode one line. Accepts the terminating `\n` and any trailing control characters
/// (`\r`, NUL, tabs) or spaces a peer may leave behind.
pub fn decode(line: &str) -> Result<Message, WireError> {
    let line = line.strip_suffix('\n').unwrap_or(line);
    let line = line.trim_end_matches(|c: char| c.is_ascii_control() || c == ' ');
    let mut fields = line.split_ascii_whitespace();

    let origin = fields.next().ok_or(WireError::Empty)?;
    let clock = fields.next().ok_or(WireError::MissingField("clock"))?;
    let clock: u64 = clock
        .parse()
        .map_err(|_| WireError::BadClock(clock.to_string()))?;
    let kind: MessageType = fields
        .next()
        .ok_or(WireError::MissingField("type"))?
        .parse()?;

    Ok(Message {
        origin: origin.to_string(),
        clock,
        kind,
        args: fields.map(str::to_string).collect(),
    })
}

/// Error decoding a line or interpreting a message's arguments.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("empty message")]
    Empty,
    #[error("missing {0} field")]
    MissingField(&'static str),
    #[error("invalid clock value {0:?}")]
    BadClock(String),
    #[error("unknown message type {0:?}")]
    UnknownType(String),
    #[error("expected {expected} message, got {got}")]
    UnexpectedType {
        expected: MessageType,
        got: MessageType,
    },
    #[error("invalid {kind} arguments: {reason}")]
    BadArguments { kind: MessageType, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(kind: MessageType, args: &[&str]) -> Message {
        let mut m = Message::with_args(
            "127.0.0.1:9001",
            kind,
            args.iter().map(|s| s.to_string()).collect(),
        );
        m.clock = 42;
        m
    }

    #[test]
    fn encode_layout() {
        assert_eq!(
            encode(&msg(MessageType::Hello, &[])),
            "127.0.0.1:9001 42 HELLO\n"
        );
        assert_eq!(
            encode(&msg(MessageType::Dl, &["a.txt", "256", "3"])),
            "127.0.0.1:9001 42 DL a.txt 256 3\n"
        );
    }

    #[test]
    fn roundtrip_every_type() {
        let cases = [
            msg(MessageType::Hello, &[]),
            msg(MessageType::GetPeers, &[]),
            msg(MessageType::PeersList, &["1", "127.0.0.1:9002:ONLINE:3"]),
            msg(MessageType::Ls, &[]),
            msg(MessageType::LsList, &["2", "a.txt:10", "b.bin:2048"]),
            msg(MessageType::Dl, &["a.txt", "256", "0"]),
            msg(MessageType::File, &["a.txt", "0", "0", "aGVsbG8="]),
            msg(MessageType::Bye, &[]),
        ];
        for m in cases {
            assert_eq!(decode(&encode(&m)).unwrap(), m);
        }
    }

    #[test]
    fn tolerates_trailing_control_chars() {
        let m = decode("127.0.0.1:9001 5 BYE\r\n").unwrap();
        assert_eq!(m.kind, MessageType::Bye);
        assert!(m.args.is_empty());

        let m = decode("127.0.0.1:9001 5 GET_PEERS\0\0\t \n").unwrap();
        assert_eq!(m.kind, MessageType::GetPeers);

        // A line missing its newline is still one message.
        let m = decode("127.0.0.1:9001 5 HELLO").unwrap();
        assert_eq!(m.clock, 5);
    }

    #[test]
    fn rejects_malformed_lines() {
        assert_eq!(decode("\n"), Err(WireError::Empty));
        assert_eq!(
            decode("127.0.0.1:9001\n"),
            Err(WireError::MissingField("clock"))
        );
        assert_eq!(
            decode("127.0.0.1:9001 x HELLO\n"),
            Err(WireError::BadClock("x".into()))
        );
        assert_eq!(
            decode("127.0.0.1:9001 1\n"),
            Err(WireError::MissingField("type"))
        );
        assert_eq!(
            decode("127.0.0.1:9001 1 PING\n"),
            Err(WireError::UnknownType("PING".into()))
        );
    }
}
