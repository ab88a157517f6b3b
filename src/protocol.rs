//! Wire formats for both relay directions.
//!
//! Frames (client -> server), three or four parts:
//! - part 0: decimal text of the sequence id
//! - part 1: compressed left-eye image
//! - part 2: compressed right-eye image
//! - part 3 (optional): decimal text of the sender's session id
//!
//! Senders without a session produce the three-part form; sequence restarts from such
//! senders cannot be told apart from loss.
//!
//! Results (server -> consumer), one JSON part:
//! `{"info0": [[cx,cy],[major,minor],angle] | null, "info1": ..., "attent_id": <id>}`

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::detect::{DetectionMessage, Ellipse};
use crate::frame::{Eye, EyePair, SequenceId, SessionId};
use crate::transport::Multipart;

const FRAME_PARTS: usize = 3;
const SESSION_FRAME_PARTS: usize = 4;

/// Decoded frame message with the image payloads still compressed.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameMessage {
    pub sequence_id: SequenceId,
    pub session: Option<SessionId>,
    pub payloads: EyePair<Vec<u8>>,
}

pub fn encode_frame_message(sequence_id: SequenceId, left: Vec<u8>, right: Vec<u8>) -> Multipart {
    vec![sequence_id.to_string().into_bytes(), left, right]
}

/// Four-part frame message tagged with the sender's session.
pub fn encode_session_frame_message(
    session: SessionId,
    sequence_id: SequenceId,
    left: Vec<u8>,
    right: Vec<u8>,
) -> Multipart {
    let mut parts = encode_frame_message(sequence_id, left, right);
    parts.push(session.to_string().into_bytes());
    parts
}

pub fn decode_frame_message(parts: Multipart) -> Result<FrameMessage> {
    if parts.len() != FRAME_PARTS && parts.len() != SESSION_FRAME_PARTS {
        return Err(anyhow!(
            "frame message has {} parts, expected {} or {}",
            parts.len(),
            FRAME_PARTS,
            SESSION_FRAME_PARTS
        ));
    }
    let mut parts = parts.into_iter();
    let id_part = parts.next().unwrap_or_default();
    let left = parts.next().unwrap_or_default();
    let right = parts.next().unwrap_or_default();
    let session = parts
        .next()
        .map(|raw| parse_decimal(&raw, "session id"))
        .transpose()?;

    let sequence_id = parse_decimal(&id_part, "sequence id")?;
    Ok(FrameMessage {
        sequence_id,
        session,
        payloads: EyePair::new(left, right),
    })
}

fn parse_decimal(raw: &[u8], what: &str) -> Result<u64> {
    let text = std::str::from_utf8(raw).with_context(|| format!("{} is not utf-8", what))?;
    text.trim()
        .parse::<u64>()
        .map_err(|e| anyhow!("invalid {} '{}': {}", what, text, e))
}

#[derive(Debug, Serialize, Deserialize)]
struct ResultWire {
    info0: Option<Ellipse>,
    info1: Option<Ellipse>,
    attent_id: SequenceId,
}

pub fn encode_result_message(message: &DetectionMessage) -> Result<Multipart> {
    let wire = ResultWire {
        info0: message.eyes[Eye::Left],
        info1: message.eyes[Eye::Right],
        attent_id: message.sequence_id,
    };
    let json = serde_json::to_vec(&wire).context("serialize result message")?;
    Ok(vec![json])
}

pub fn decode_result_message(parts: &Multipart) -> Result<DetectionMessage> {
    let payload = parts
        .first()
        .ok_or_else(|| anyhow!("result message has no parts"))?;
    let wire: ResultWire =
        serde_json::from_slice(payload).map_err(|e| anyhow!("parse error: {}", e))?;
    Ok(DetectionMessage::new(
        wire.attent_id,
        EyePair::new(wire.info0, wire.info1),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_message_layout() {
        let parts = encode_frame_message(42, vec![1, 2, 3], vec![4]);
        assert_eq!(parts[0], b"42");
        let decoded = decode_frame_message(parts).unwrap();
        assert_eq!(decoded.sequence_id, 42);
        assert_eq!(decoded.payloads[Eye::Left], vec![1, 2, 3]);
        assert_eq!(decoded.payloads[Eye::Right], vec![4]);
        assert_eq!(decoded.session, None);
    }

    #[test]
    fn session_travels_as_trailing_part() {
        let parts = encode_session_frame_message(77, 5, vec![1], vec![2]);
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0], b"5");
        assert_eq!(parts[3], b"77");
        let decoded = decode_frame_message(parts).unwrap();
        assert_eq!(decoded.sequence_id, 5);
        assert_eq!(decoded.session, Some(77));
    }

    #[test]
    fn frame_message_rejects_bad_session() {
        let parts = vec![b"1".to_vec(), vec![], vec![], b"later".to_vec()];
        assert!(decode_frame_message(parts).is_err());
    }

    #[test]
    fn frame_message_rejects_bad_id() {
        let parts = vec![b"-3".to_vec(), vec![], vec![]];
        assert!(decode_frame_message(parts).is_err());
        let parts = vec![b"abc".to_vec(), vec![], vec![]];
        assert!(decode_frame_message(parts).is_err());
    }

    #[test]
    fn frame_message_rejects_wrong_part_count() {
        assert!(decode_frame_message(vec![b"1".to_vec(), vec![]]).is_err());
        assert!(decode_frame_message(vec![b"1".to_vec(); 5]).is_err());
    }

    #[test]
    fn result_message_uses_legacy_field_names() {
        let message = DetectionMessage::new(
            9,
            EyePair::new(Some(Ellipse::new((1.0, 2.0), (3.0, 4.0), 5.0)), None),
        );
        let parts = encode_result_message(&message).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&parts[0]).unwrap();
        assert_eq!(value["attent_id"], 9);
        assert!(value["info1"].is_null());
        assert_eq!(value["info0"][1][0], 3.0);
    }

    #[test]
    fn result_message_parses_producer_payload() {
        let payload = br#"{"info0": null, "info1": [[160.5, 120.0], [30.0, 24.0], 12.5], "attent_id": 3}"#;
        let message = decode_result_message(&vec![payload.to_vec()]).unwrap();
        assert_eq!(message.sequence_id, 3);
        assert!(message.eyes[Eye::Left].is_none());
        assert_eq!(
            message.eyes[Eye::Right],
            Some(Ellipse::new((160.5, 120.0), (30.0, 24.0), 12.5))
        );
    }

    #[test]
    fn result_message_rejects_garbage() {
        assert!(decode_result_message(&vec![b"{".to_vec()]).is_err());
        assert!(decode_result_message(&Vec::new()).is_err());
    }
}
