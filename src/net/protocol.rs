//! Wire protocol message definitions
//! These are the frame types exchanged between game client and server

use thiserror::Error;

/// Message kinds, tagged on the wire by their ordinal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageKind {
    // Client -> server
    /// Claim a nickname (payload: nickname, 2-10 chars)
    SetNickname = 0,
    /// Enter the matchmaking queue (empty payload)
    JoinQueue = 1,
    /// Position update (payload: `top,score,isJumping`)
    PlayerPosition = 2,
    /// Player died (payload: final score)
    PlayerDied = 3,
    /// Re-enter the queue after a match (empty payload)
    RequestRematch = 4,

    // Server -> client
    /// Nickname claim succeeded
    NicknameAccepted = 5,
    /// Nickname already in use by a connected player
    NicknameDuplicate = 6,
    /// Queued, waiting for an opponent
    WaitingForMatch = 7,
    /// Opponent found, game about to start
    MatchFound = 8,
    /// Game starting (payload: serialized obstacle map)
    GameStart = 9,
    /// Opponent position update (same grammar as PlayerPosition)
    OpponentPosition = 10,
    /// Opponent died (payload: opponent's final score)
    OpponentDied = 11,
    /// Human-readable error / validation failure
    ConnectionError = 12,
}

impl MessageKind {
    /// Ordinal tag as written on the wire
    pub fn tag(self) -> u8 {
        self as u8
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        Some(match tag {
            0 => Self::SetNickname,
            1 => Self::JoinQueue,
            2 => Self::PlayerPosition,
            3 => Self::PlayerDied,
            4 => Self::RequestRematch,
            5 => Self::NicknameAccepted,
            6 => Self::NicknameDuplicate,
            7 => Self::WaitingForMatch,
            8 => Self::MatchFound,
            9 => Self::GameStart,
            10 => Self::OpponentPosition,
            11 => Self::OpponentDied,
            12 => Self::ConnectionError,
            _ => return None,
        })
    }
}

/// One protocol message: a kind plus its kind-specific payload text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub kind: MessageKind,
    pub payload: String,
}

impl Message {
    pub fn new(kind: MessageKind, payload: impl Into<String>) -> Self {
        Self {
            kind,
            payload: payload.into(),
        }
    }

    /// Message with an empty payload
    pub fn empty(kind: MessageKind) -> Self {
        Self::new(kind, "")
    }

    /// Encode the message body as `tag|payload`
    ///
    /// Framing (the length prefix) is applied separately; see [`crate::net::frame`].
    pub fn encode(&self) -> Vec<u8> {
        let mut body = Vec::with_capacity(3 + self.payload.len());
        body.extend_from_slice(self.kind.tag().to_string().as_bytes());
        body.push(b'|');
        body.extend_from_slice(self.payload.as_bytes());
        body
    }

    /// Decode a message body produced by [`Message::encode`]
    ///
    /// The payload keeps everything after the first `|`, so payloads may
    /// themselves contain the separator. A body with no separator is read as
    /// a bare kind with an empty payload.
    pub fn decode(body: &[u8]) -> Result<Self, DecodeError> {
        if body.is_empty() {
            return Err(DecodeError::Empty);
        }

        let text = std::str::from_utf8(body).map_err(|_| DecodeError::InvalidUtf8)?;
        let (tag_text, payload) = match text.split_once('|') {
            Some((tag, payload)) => (tag, payload),
            None => (text, ""),
        };

        let tag: u8 = tag_text
            .parse()
            .map_err(|_| DecodeError::InvalidTag(tag_text.to_string()))?;
        let kind = MessageKind::from_tag(tag).ok_or(DecodeError::UnknownTag(tag))?;

        Ok(Self::new(kind, payload))
    }
}

/// Errors decoding a message body
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("empty message body")]
    Empty,

    #[error("message body is not valid UTF-8")]
    InvalidUtf8,

    #[error("kind tag is not a number: {0:?}")]
    InvalidTag(String),

    #[error("unknown kind tag: {0}")]
    UnknownTag(u8),
}

/// Errors parsing a kind-specific payload grammar
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PayloadError {
    #[error("expected {expected} fields, got {got}")]
    TooFewFields { expected: usize, got: usize },

    #[error("invalid field {0:?}")]
    InvalidField(String),
}

/// Parsed `PlayerPosition` / `OpponentPosition` payload
///
/// The relay forwards position payloads verbatim; this type exists for the
/// server-side score tracking and for clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerPositionData {
    pub top: i32,
    pub score: i64,
    pub is_jumping: bool,
}

impl PlayerPositionData {
    pub fn serialize(&self) -> String {
        format!("{},{},{}", self.top, self.score, self.is_jumping)
    }

    pub fn parse(payload: &str) -> Result<Self, PayloadError> {
        let fields: Vec<&str> = payload.split(',').collect();
        if fields.len() < 3 {
            return Err(PayloadError::TooFewFields {
                expected: 3,
                got: fields.len(),
            });
        }

        Ok(Self {
            top: parse_field(fields[0])?,
            score: parse_field(fields[1])?,
            is_jumping: parse_field(fields[2])?,
        })
    }
}

fn parse_field<T: std::str::FromStr>(field: &str) -> Result<T, PayloadError> {
    field
        .trim()
        .parse()
        .map_err(|_| PayloadError::InvalidField(field.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_all_kinds() {
        let cases = [
            Message::new(MessageKind::SetNickname, "Rex"),
            Message::empty(MessageKind::JoinQueue),
            Message::new(MessageKind::PlayerPosition, "200,15,false"),
            Message::new(MessageKind::PlayerDied, "42"),
            Message::empty(MessageKind::RequestRematch),
            Message::new(MessageKind::NicknameAccepted, "Nickname accepted."),
            Message::empty(MessageKind::NicknameDuplicate),
            Message::new(MessageKind::WaitingForMatch, "Searching for an opponent..."),
            Message::new(MessageKind::MatchFound, "Opponent found!"),
            Message::new(MessageKind::GameStart, "1200,512,0;1200,677,1;1200,703,2"),
            Message::new(MessageKind::OpponentPosition, "180,20,true"),
            Message::new(MessageKind::OpponentDied, "42"),
            Message::new(MessageKind::ConnectionError, "Opponent disconnected."),
        ];

        for msg in cases {
            let decoded = Message::decode(&msg.encode()).unwrap();
            assert_eq!(decoded, msg);
        }
    }

    #[test]
    fn payload_may_contain_separator() {
        let msg = Message::new(MessageKind::ConnectionError, "bad|worse|worst");
        let decoded = Message::decode(&msg.encode()).unwrap();
        assert_eq!(decoded.payload, "bad|worse|worst");
    }

    #[test]
    fn decode_empty_body_fails() {
        assert_eq!(Message::decode(b""), Err(DecodeError::Empty));
    }

    #[test]
    fn decode_unknown_tag_fails() {
        assert_eq!(Message::decode(b"99|hello"), Err(DecodeError::UnknownTag(99)));
    }

    #[test]
    fn decode_non_numeric_tag_fails() {
        assert!(matches!(
            Message::decode(b"nope|hello"),
            Err(DecodeError::InvalidTag(_))
        ));
    }

    #[test]
    fn bare_tag_decodes_with_empty_payload() {
        let decoded = Message::decode(b"1").unwrap();
        assert_eq!(decoded, Message::empty(MessageKind::JoinQueue));
    }

    #[test]
    fn position_payload_round_trip() {
        let pos = PlayerPositionData {
            top: 200,
            score: 15,
            is_jumping: false,
        };
        assert_eq!(pos.serialize(), "200,15,false");
        assert_eq!(PlayerPositionData::parse("200,15,false").unwrap(), pos);
    }

    #[test]
    fn position_payload_too_few_fields() {
        assert_eq!(
            PlayerPositionData::parse("200,15"),
            Err(PayloadError::TooFewFields {
                expected: 3,
                got: 2
            })
        );
    }
}
