//! Unit tests for exchange send paths.

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use futures::stream;
use http::{
    HeaderValue,
    StatusCode,
    Version,
    header::{CONTENT_LENGTH, TRANSFER_ENCODING},
};
use rstest::{fixture, rstest};
use tokio::sync::mpsc;

use super::*;
use crate::{
    connection::ChannelConnection,
    error::HookError,
    message::ResponseHead,
    payload::ReleaseProbe,
};

struct Harness {
    connection: Arc<ChannelConnection>,
    rx: mpsc::Receiver<HttpObject>,
}

impl Harness {
    fn exchange(&self) -> Exchange<ChannelConnection> {
        Exchange::new(Arc::clone(&self.connection), ok_head())
    }

    fn drain(&mut self) -> Vec<HttpObject> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.rx.try_recv() {
            frames.push(frame);
        }
        frames
    }
}

fn ok_head() -> ResponseHead { ResponseHead::new(StatusCode::OK, Version::HTTP_11) }

#[fixture]
fn harness() -> Harness {
    let (connection, rx) = ChannelConnection::new(32);
    Harness {
        connection: Arc::new(connection),
        rx,
    }
}

fn set_length(exchange: &Exchange<ChannelConnection>, value: &'static str) {
    exchange
        .with_headers(|head| {
            head.headers_mut()
                .insert(CONTENT_LENGTH, HeaderValue::from_static(value));
        })
        .expect("headers still mutable");
}

#[rstest]
fn exchange_ids_count_per_connection(harness: Harness) {
    let short = harness.connection.id().short_text();
    assert_eq!(harness.exchange().id().request_id(), format!("{short}-1"));
    assert_eq!(harness.exchange().id().to_string(), format!("{short}-2"));
}

#[rstest]
#[tokio::test]
async fn full_body_sets_content_length(mut harness: Harness) {
    let exchange = harness.exchange();
    exchange
        .with_headers(|head| {
            head.headers_mut()
                .insert(TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        })
        .expect("ready");

    exchange.send_full(Payload::from("hello")).await.expect("send");

    let frames = harness.drain();
    assert_eq!(frames.len(), 1);
    let HttpObject::Full(head, payload) = &frames[0] else {
        panic!("expected full message, got {frames:?}");
    };
    assert_eq!(head.headers()[CONTENT_LENGTH], "5");
    assert!(!head.headers().contains_key(TRANSFER_ENCODING));
    assert_eq!(payload.as_slice(), b"hello");
    assert_eq!(exchange.state(), SendState::BodySent);
}

#[rstest]
#[tokio::test]
async fn zero_content_length_discards_full_body(mut harness: Harness) {
    let exchange = harness.exchange();
    set_length(&exchange, "0");
    let probe = ReleaseProbe::new();

    exchange
        .send_full(Payload::tracked("ignored", &probe))
        .await
        .expect("send");

    assert_eq!(probe.released(), 1);
    let frames = harness.drain();
    assert!(matches!(&frames[..], [HttpObject::Full(_, p)] if p.is_empty()));
}

#[rstest]
#[tokio::test]
async fn headers_are_frozen_after_send(harness: Harness) {
    let exchange = harness.exchange();
    exchange.send_empty().await.expect("send");
    assert!(exchange.has_sent_headers());
    assert!(matches!(exchange.with_headers(|_| ()), Err(SendError::HeadersSent)));
}

#[rstest]
#[tokio::test]
async fn hook_failure_disposes_payload_and_writes_nothing(mut harness: Harness) {
    let hooks = ExchangeHooks {
        before_headers: Some(Box::new(|_: &mut MessageHead| -> Result<(), HookError> {
            Err("rejected".into())
        })),
        on_headers_sent: None,
    };
    let exchange = Exchange::with_hooks(Arc::clone(&harness.connection), ok_head(), hooks);
    let probe = ReleaseProbe::new();

    let err = exchange
        .send_full(Payload::tracked("body", &probe))
        .await
        .expect_err("hook fails");

    assert!(matches!(err, SendError::HeaderHook(_)));
    assert_eq!(probe.released(), 1);
    assert!(harness.drain().is_empty());
    assert_eq!(exchange.state(), SendState::BodySent);
}

struct CountingProtocol(AtomicUsize);

impl ExchangeProtocol for CountingProtocol {
    fn on_headers_sent(&self, _id: &ExchangeId) { self.0.fetch_add(1, Ordering::SeqCst); }
}

#[rstest]
#[tokio::test]
async fn headers_sent_hook_runs_once(harness: Harness) {
    let protocol = Arc::new(CountingProtocol(AtomicUsize::new(0)));
    let exchange = Exchange::with_hooks(
        Arc::clone(&harness.connection),
        ok_head(),
        ExchangeHooks::from_protocol(&protocol),
    );

    exchange.send_headers().await.expect("headers");
    exchange.send_headers().await.expect("no-op");
    exchange.finish().await.expect("finish");

    assert_eq!(protocol.0.load(Ordering::SeqCst), 1);
}

#[rstest]
#[tokio::test]
async fn late_full_body_becomes_content(mut harness: Harness) {
    let exchange = harness.exchange();
    exchange.send_headers().await.expect("headers");
    exchange.send_full(Payload::from("tail")).await.expect("content");
    exchange.finish().await.expect("finish");

    let frames = harness.drain();
    assert!(matches!(&frames[0], HttpObject::Head(h) if h.headers()[TRANSFER_ENCODING] == "chunked"));
    assert!(matches!(&frames[1], HttpObject::Content(p) if p.as_slice() == b"tail"));
    assert!(matches!(&frames[2], HttpObject::LastContent(p) if p.is_empty()));
}

#[rstest]
#[tokio::test]
async fn full_body_after_completion_is_refused(harness: Harness) {
    let exchange = harness.exchange();
    exchange.send_empty().await.expect("send");
    let probe = ReleaseProbe::new();

    let err = exchange
        .send_full(Payload::tracked("late", &probe))
        .await
        .expect_err("already sent");

    assert!(matches!(err, SendError::AlreadySent));
    assert_eq!(probe.released(), 1);
}

#[rstest]
#[tokio::test]
async fn empty_send_keeps_declared_length(mut harness: Harness) {
    let exchange = harness.exchange();
    set_length(&exchange, "42");
    exchange.send_empty().await.expect("send");

    let frames = harness.drain();
    let Some(HttpObject::Full(head, _)) = frames.first() else {
        panic!("expected full message");
    };
    assert_eq!(head.headers()[CONTENT_LENGTH], "42");
}

#[rstest]
#[tokio::test]
async fn zero_length_headers_complete_the_message(mut harness: Harness) {
    let exchange = harness.exchange();
    set_length(&exchange, "0");
    exchange.send_headers().await.expect("headers");

    assert_eq!(exchange.state(), SendState::BodySent);
    assert!(matches!(&harness.drain()[..], [HttpObject::Full(..)]));
}

#[rstest]
#[tokio::test]
async fn inactive_connection_aborts_and_disposes(mut harness: Harness) {
    let exchange = harness.exchange();
    harness.connection.close();
    let probe = ReleaseProbe::new();

    let err = exchange
        .send(Body::Full(Payload::tracked("x", &probe)))
        .await
        .expect_err("aborted");

    assert!(matches!(err, SendError::AbortedBeforeSend));
    assert_eq!(probe.released(), 1);
    assert_eq!(exchange.state(), SendState::Ready);
    assert!(harness.drain().is_empty());
}

#[rstest]
#[tokio::test]
async fn terminating_the_exchange_stops_the_stream(harness: Harness) {
    let exchange = harness.exchange();
    exchange.terminate();

    let err = exchange
        .send(Body::stream(stream::pending()))
        .await
        .expect_err("terminated");

    assert!(matches!(err, SendError::Write(_)));
    assert_eq!(exchange.state(), SendState::HeadersSent);
}

#[rstest]
#[tokio::test]
async fn body_errors_surface_to_the_caller(harness: Harness) {
    let exchange = harness.exchange();
    let chunks = stream::iter([
        Ok(Payload::from("a")),
        Err(BodyError::other("source broke")),
    ]);

    let err = exchange.send(Body::stream(chunks)).await.expect_err("body error");

    assert!(matches!(err, SendError::Body(BodyError::Source(_))));
}
