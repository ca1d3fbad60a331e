//! Unit tests for inbound frame handling on a bridged stream.

use std::{
    net::SocketAddr,
    sync::{Arc, Mutex},
};

use http::{Method, Uri, Version, header::CONTENT_LENGTH};
use rstest::{fixture, rstest};
use tokio::sync::mpsc;

use super::*;
use crate::{
    config::StreamConfig,
    error::DecodeFailure,
    exchange::Exchange,
    message::{MessageHead, RequestHead},
    observer::ConnectionState,
    payload::Payload,
};

#[derive(Default)]
struct Recorder(Mutex<Vec<LifecycleEvent<StreamChannel>>>);

impl Recorder {
    fn states(&self) -> Vec<ConnectionState> {
        self.0.lock().expect("lock").iter().map(LifecycleEvent::state).collect()
    }

    fn last_exchange(&self) -> Option<Arc<Exchange<StreamChannel>>> {
        self.0.lock().expect("lock").iter().rev().find_map(|event| match event {
            LifecycleEvent::Configured(exchange) => Some(Arc::clone(exchange)),
            _ => None,
        })
    }
}

impl ConnectionObserver<StreamChannel> for Recorder {
    fn on_state_change(&self, event: LifecycleEvent<StreamChannel>) {
        self.0.lock().expect("lock").push(event);
    }
}

struct Setup {
    bridge: StreamBridge<Recorder>,
    observer: Arc<Recorder>,
    outbound: mpsc::Receiver<HttpObject>,
}

#[fixture]
fn setup() -> Setup {
    let parent = Arc::new(ParentConnection::new(SocketAddr::from(([127, 0, 0, 1], 443))));
    let (stream, outbound) = StreamChannel::new(&parent, StreamId::new(1), &StreamConfig::default());
    let observer = Arc::new(Recorder::default());
    let bridge = StreamBridge::new(stream, Arc::clone(&observer));
    Setup {
        bridge,
        observer,
        outbound,
    }
}

fn request() -> HttpObject {
    let head = RequestHead::new(Method::GET, Uri::from_static("/"), Version::HTTP_2);
    HttpObject::Head(head.into())
}

#[rstest]
#[tokio::test]
async fn request_creates_exchange(setup: Setup) {
    let stream = Arc::clone(setup.bridge.stream());
    assert!(stream.demand().is_armed());

    let forwarded = setup.bridge.handle_inbound(request()).await;

    assert!(forwarded.is_some());
    assert!(stream.is_pending());
    assert_eq!(setup.observer.states(), [ConnectionState::Configured]);
    let exchange = setup.observer.last_exchange().expect("exchange");
    assert_eq!(exchange.connection_info().map(ConnectionInfo::scheme), Some("http"));
}

#[rstest]
#[tokio::test]
async fn second_request_while_pending_is_dropped(setup: Setup) {
    let stream = Arc::clone(setup.bridge.stream());
    setup.bridge.handle_inbound(request()).await;
    stream.demand().acquire().await;

    assert!(setup.bridge.handle_inbound(request()).await.is_none());

    assert_eq!(setup.observer.states().len(), 1);
    assert!(!stream.demand().is_armed());
}

#[rstest]
#[tokio::test]
async fn content_after_completion_is_dropped_and_rearms(mut setup: Setup) {
    let stream = Arc::clone(setup.bridge.stream());
    setup.bridge.handle_inbound(request()).await;
    let exchange = setup.observer.last_exchange().expect("exchange");
    exchange.send_empty().await.expect("respond");
    assert!(matches!(setup.outbound.recv().await, Some(HttpObject::Full(..))));
    stream.demand().acquire().await;

    let late = setup
        .bridge
        .handle_inbound(HttpObject::Content(Payload::from("late")))
        .await;

    assert!(late.is_none());
    assert!(stream.demand().is_armed());
}

#[rstest]
#[tokio::test]
async fn content_while_pending_is_forwarded(setup: Setup) {
    setup.bridge.handle_inbound(request()).await;
    let body = setup
        .bridge
        .handle_inbound(HttpObject::Content(Payload::from("body")))
        .await;
    assert!(matches!(body, Some(HttpObject::Content(p)) if p.as_slice() == b"body"));
}

#[rstest]
#[tokio::test]
async fn decoding_failure_is_answered(mut setup: Setup) {
    let head = RequestHead::new(Method::GET, Uri::from_static("/"), Version::HTTP_2)
        .with_decode_failure(DecodeFailure::TooLongHeaders);

    let forwarded = setup.bridge.handle_inbound(HttpObject::Head(head.into())).await;

    assert!(forwarded.is_none());
    assert!(!setup.bridge.stream().is_pending());
    assert_eq!(setup.observer.states(), [ConnectionState::RequestDecodingFailed]);
    let Some(HttpObject::Full(MessageHead::Response(head), body)) = setup.outbound.recv().await else {
        panic!("expected a full response");
    };
    assert_eq!(head.status, http::StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE);
    assert_eq!(head.headers[CONTENT_LENGTH], "0");
    assert!(body.is_empty());
}

#[tokio::test]
async fn bridge_runs_without_a_listener() {
    let parent = Arc::new(ParentConnection::new(SocketAddr::from(([127, 0, 0, 1], 443))));
    let (stream, _outbound) = StreamChannel::new(&parent, StreamId::new(9), &StreamConfig::default());
    let bridge = StreamBridge::new(stream, crate::observer::empty_observer());

    assert!(bridge.handle_inbound(request()).await.is_some());
    assert!(bridge.stream().is_pending());
}
