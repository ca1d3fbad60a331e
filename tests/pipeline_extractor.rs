#![cfg(not(loom))]
//! Tests for extractor installation ahead of late-added decoders.

mod common;

use std::sync::{Arc, Mutex};

use common::TestResult;
use httpframe::{
    Connection,
    HttpObject,
    Payload,
    pipeline::{
        Forward,
        Handler,
        HandlerRole,
        PipelineMessage,
        Position,
        SharedPipeline,
        StageKey,
        auto_add_extractor,
        install,
    },
};
use httpframe_testing::{Wire, response_exchange};
use rstest::rstest;
use tokio_util::sync::CancellationToken;

/// Decoder that records the raw bytes reaching it.
#[derive(Clone, Default)]
struct ByteSink(Arc<Mutex<Vec<u8>>>);

impl ByteSink {
    fn seen(&self) -> Vec<u8> { self.0.lock().expect("lock").clone() }
}

impl Handler for ByteSink {
    fn role(&self) -> HandlerRole { HandlerRole::Decoder }

    fn read(&mut self, message: PipelineMessage, out: &mut Forward) {
        if let PipelineMessage::Bytes(payload) = &message {
            self.0.lock().expect("lock").extend_from_slice(payload.as_slice());
        }
        out.push(message);
    }
}

struct Passive;

impl Handler for Passive {}

async fn settle(pipeline: &SharedPipeline) {
    pipeline.tasks().close();
    pipeline.tasks().wait().await;
    pipeline.tasks().reopen();
}

/// Run removal tasks until only `live` of them are still waiting.
async fn settle_until(pipeline: &SharedPipeline, live: usize) {
    while pipeline.tasks().len() > live {
        tokio::task::yield_now().await;
    }
}

#[test]
fn extractor_is_installed_once() -> TestResult {
    let pipeline = SharedPipeline::new();

    assert!(install(&pipeline, Position::Last, "decoder", Box::new(ByteSink::default()), None)?);
    assert!(!auto_add_extractor(&pipeline, "decoder", HandlerRole::Decoder, None));
    assert!(!install(&pipeline, Position::First, "decoder", Box::new(ByteSink::default()), None)?);

    let chain = pipeline.lock();
    assert_eq!(chain.count_role(HandlerRole::Extractor), 1);
    assert_eq!(
        chain.keys(),
        [StageKey::extractor_for("decoder"), StageKey::named("decoder")]
    );
    Ok(())
}

#[rstest]
#[case::inbound(HandlerRole::Inbound)]
#[case::outbound(HandlerRole::Outbound)]
#[case::tls(HandlerRole::Tls)]
fn non_decoding_roles_get_no_extractor(#[case] role: HandlerRole) {
    let pipeline = SharedPipeline::new();
    pipeline
        .lock()
        .add_last(StageKey::named("stage"), Box::new(Passive))
        .expect("stage added");

    assert!(!auto_add_extractor(&pipeline, "stage", role, None));
    assert_eq!(pipeline.lock().len(), 1);
}

#[test]
fn missing_stage_gets_no_extractor() {
    let pipeline = SharedPipeline::new();
    assert!(!auto_add_extractor(&pipeline, "absent", HandlerRole::Codec, None));
    assert!(pipeline.lock().is_empty());
}

#[test]
fn extractor_feeds_raw_bytes_to_decoder() -> TestResult {
    let pipeline = SharedPipeline::new();
    let sink = ByteSink::default();
    install(&pipeline, Position::First, "decoder", Box::new(sink.clone()), None)?;

    let mut chain = pipeline.lock();
    chain.fire_read(PipelineMessage::Http(HttpObject::Content(Payload::from("ab"))));
    let out = chain.fire_read(PipelineMessage::Http(HttpObject::LastContent(Payload::from("c"))));

    assert_eq!(sink.seen(), b"abc");
    assert!(matches!(
        out.last(),
        Some(PipelineMessage::Http(HttpObject::LastContent(p))) if p.is_empty()
    ));
    Ok(())
}

#[tokio::test]
async fn termination_removes_handler_and_extractor() -> TestResult {
    let pipeline = SharedPipeline::new();
    pipeline.lock().add_last(StageKey::named("tail"), Box::new(Passive))?;
    let token = CancellationToken::new();

    install(&pipeline, Position::First, "codec", Box::new(ByteSink::default()), Some(&token))?;
    assert_eq!(pipeline.lock().len(), 3);

    token.cancel();
    settle(&pipeline).await;

    assert_eq!(pipeline.lock().keys(), [StageKey::named("tail")]);
    Ok(())
}

#[tokio::test]
async fn reinstall_after_termination_replaces_the_stale_stage() -> TestResult {
    let pipeline = SharedPipeline::new();
    let first = CancellationToken::new();
    let second = CancellationToken::new();

    install(&pipeline, Position::Last, "codec", Box::new(ByteSink::default()), Some(&first))?;
    first.cancel();
    assert!(install(&pipeline, Position::Last, "codec", Box::new(ByteSink::default()), Some(&second))?);
    settle_until(&pipeline, 2).await;

    assert_eq!(
        pipeline.lock().keys(),
        [StageKey::extractor_for("codec"), StageKey::named("codec")]
    );
    second.cancel();
    settle(&pipeline).await;
    assert!(pipeline.lock().is_empty());
    Ok(())
}

#[tokio::test]
async fn adding_a_handler_twice_through_an_exchange_is_a_no_op() -> TestResult {
    let wire = Wire::new();
    let exchange = response_exchange(&wire);

    assert!(exchange.add_handler_last("codec", ByteSink::default())?);
    assert!(!exchange.add_handler_last("codec", ByteSink::default())?);

    assert_eq!(wire.connection().pipeline().lock().count_role(HandlerRole::Decoder), 1);
    assert_eq!(wire.connection().pipeline().lock().len(), 2);
    Ok(())
}

#[tokio::test]
async fn next_exchange_keeps_the_handler_it_re_added() -> TestResult {
    let wire = Wire::new();
    let pipeline = wire.connection().pipeline().clone();
    let first = response_exchange(&wire);
    first.add_handler_last("decoder", ByteSink::default())?;

    first.terminate();
    let second = response_exchange(&wire);
    assert!(second.add_handler_last("decoder", ByteSink::default())?);
    settle_until(&pipeline, 2).await;

    assert_eq!(
        pipeline.lock().keys(),
        [StageKey::extractor_for("decoder"), StageKey::named("decoder")]
    );
    Ok(())
}

#[tokio::test]
async fn persistent_connection_scopes_handlers_to_the_exchange() -> TestResult {
    let wire = Wire::new();
    let exchange = response_exchange(&wire);
    let pipeline = wire.connection().pipeline().clone();

    assert!(exchange.add_handler_last("decoder", ByteSink::default())?);
    exchange.terminate();
    settle(&pipeline).await;

    assert!(pipeline.lock().is_empty());
    assert!(wire.connection().is_active());
    Ok(())
}

#[tokio::test]
async fn single_use_connection_keeps_handlers_until_close() -> TestResult {
    let wire = Wire::non_persistent();
    let exchange = response_exchange(&wire);
    let pipeline = wire.connection().pipeline().clone();

    assert!(exchange.add_handler_first("decoder", ByteSink::default())?);
    exchange.terminate();
    tokio::task::yield_now().await;
    assert_eq!(pipeline.lock().len(), 2);

    wire.connection().close();
    settle(&pipeline).await;
    assert!(pipeline.lock().is_empty());
    Ok(())
}
