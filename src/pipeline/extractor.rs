//! Stage turning HTTP content objects back into raw payload.

use super::stage::{Forward, Handler, HandlerRole, PipelineMessage};
use crate::message::HttpObject;

/// Splits HTTP content objects into raw payload for byte-oriented handlers.
///
/// Content chunks are replaced by their payload. A last-content chunk is
/// replaced by its payload followed by an empty last-content marker so
/// downstream stages still see the message boundary. Header messages pass
/// through untouched.
#[derive(Clone, Copy, Debug, Default)]
pub struct HttpExtractor;

impl Handler for HttpExtractor {
    fn role(&self) -> HandlerRole { HandlerRole::Extractor }

    fn read(&mut self, message: PipelineMessage, out: &mut Forward) {
        match message {
            PipelineMessage::Http(HttpObject::Content(payload)) => {
                out.push(PipelineMessage::Bytes(payload));
            }
            PipelineMessage::Http(HttpObject::LastContent(payload)) => {
                out.push(PipelineMessage::Bytes(payload));
                out.push(PipelineMessage::Http(HttpObject::empty_last()));
            }
            // TODO: split full messages into head, payload and last marker once
            // consumers relying on the single-object shape have migrated.
            other => out.push(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use http::{StatusCode, Version};

    use super::*;
    use crate::{
        message::{MessageHead, ResponseHead},
        payload::Payload,
    };

    fn run(message: HttpObject) -> Vec<PipelineMessage> {
        let mut out = Forward::default();
        HttpExtractor.read(PipelineMessage::Http(message), &mut out);
        out.into_messages()
    }

    fn head() -> MessageHead { ResponseHead::new(StatusCode::OK, Version::HTTP_11).into() }

    #[test]
    fn content_becomes_raw_payload() {
        let out = run(HttpObject::Content(Payload::from("abc")));
        assert!(matches!(out.as_slice(), [PipelineMessage::Bytes(p)] if p.as_slice() == b"abc"));
    }

    #[test]
    fn last_content_keeps_message_boundary() {
        let out = run(HttpObject::LastContent(Payload::from("end")));
        assert!(matches!(
            out.as_slice(),
            [
                PipelineMessage::Bytes(p),
                PipelineMessage::Http(HttpObject::LastContent(last)),
            ] if p.as_slice() == b"end" && last.is_empty()
        ));
    }

    #[test]
    fn heads_pass_through() {
        let out = run(HttpObject::Head(head()));
        assert!(matches!(out.as_slice(), [PipelineMessage::Http(HttpObject::Head(_))]));
    }

    #[test]
    fn full_messages_are_not_split() {
        let out = run(HttpObject::Full(head(), Payload::from("body")));
        assert!(matches!(
            out.as_slice(),
            [PipelineMessage::Http(HttpObject::Full(_, body))] if body.as_slice() == b"body"
        ));
    }
}
