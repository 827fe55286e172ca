// src/protocol/frame.rs
//! Response framing.
//!
//! The tool service answers every POST with a single server-sent event:
//!
//! ```text
//! event: message
//! data: {"jsonrpc":"2.0","id":"1","result":{...}}
//! ```
//!
//! After trimming, the body must be exactly those two lines. Anything else is
//! a hard [`ProtocolError`]; the checks run in a fixed order so the first
//! violation is the one reported.

use serde_json::Value;

use crate::error::ProtocolError;

const EVENT_LINE: &str = "event: message";
const DATA_PREFIX: &str = "data: ";

pub fn parse_frame(body: &str) -> Result<Value, ProtocolError> {
    let lines: Vec<&str> = body.trim().split('\n').collect();

    if lines[0] != EVENT_LINE {
        return Err(ProtocolError::UnexpectedEvent(lines[0].to_string()));
    }
    if lines.len() != 2 {
        return Err(ProtocolError::LineCount(lines.len()));
    }
    let data = lines[1]
        .strip_prefix(DATA_PREFIX)
        .ok_or_else(|| ProtocolError::MissingDataPrefix(lines[1].to_string()))?;

    serde_json::from_str(data.trim()).map_err(ProtocolError::InvalidJson)
}

/// Render `payload` the way the tool service frames it.
pub fn encode_frame(payload: &Value) -> String {
    format!("{EVENT_LINE}\n{DATA_PREFIX}{payload}\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accepts_a_well_formed_frame() {
        let body = "event: message\ndata: {\"result\":{\"content\":[{\"text\":\"18C, sunny\"}]}}\n\n";
        assert_eq!(
            parse_frame(body).unwrap(),
            json!({"result": {"content": [{"text": "18C, sunny"}]}})
        );
    }

    #[test]
    fn surrounding_whitespace_is_ignored() {
        let body = "\n  event: message\ndata:   {\"a\": 1}  \r\n";
        assert_eq!(parse_frame(body).unwrap(), json!({"a": 1}));
    }

    #[test]
    fn rejects_crlf_line_endings() {
        let err = parse_frame("event: message\r\ndata: {\"a\":1}").unwrap_err();
        assert!(matches!(err, ProtocolError::UnexpectedEvent(ref e) if e == "event: message\r"));
    }

    #[test]
    fn rejects_the_wrong_event() {
        let err = parse_frame("event: ping\ndata: {}").unwrap_err();
        assert!(matches!(err, ProtocolError::UnexpectedEvent(ref e) if e == "event: ping"));
    }

    #[test]
    fn rejects_a_plain_json_body() {
        let err = parse_frame("{\"result\": {}}").unwrap_err();
        assert!(matches!(err, ProtocolError::UnexpectedEvent(_)));
    }

    #[test]
    fn rejects_wrong_line_counts() {
        assert!(matches!(
            parse_frame("event: message").unwrap_err(),
            ProtocolError::LineCount(1)
        ));
        assert!(matches!(
            parse_frame("event: message\ndata: {}\ndata: {}").unwrap_err(),
            ProtocolError::LineCount(3)
        ));
    }

    #[test]
    fn rejects_a_missing_data_prefix() {
        let err = parse_frame("event: message\n{\"result\": {}}").unwrap_err();
        assert!(matches!(err, ProtocolError::MissingDataPrefix(_)));

        let err = parse_frame("event: message\ndata:{}").unwrap_err();
        assert!(matches!(err, ProtocolError::MissingDataPrefix(_)));
    }

    #[test]
    fn rejects_invalid_json() {
        let err = parse_frame("event: message\ndata: {not json").unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidJson(_)));
    }

    #[test]
    fn encoded_frames_parse_back() {
        let payload = json!({"id": "3", "result": {"tools": []}});
        assert_eq!(parse_frame(&encode_frame(&payload)).unwrap(), payload);
    }
}
