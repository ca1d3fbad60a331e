#![cfg(all(feature = "advanced-tests", loom))]
//! Concurrency tests for the exchange send state using loom.
//!
//! `loom` explores every interleaving of racing senders to check that exactly
//! one of them claims the headers and that the state never moves backwards.

use httpframe::exchange::{SendState, SendStateCell};
use loom::{model, sync::Arc, thread};

#[test]
fn exactly_one_sender_claims_the_headers() {
    model(|| {
        let cell = Arc::new(SendStateCell::new());
        let full = {
            let cell = Arc::clone(&cell);
            thread::spawn(move || cell.transition(SendState::Ready, SendState::BodySent))
        };
        let streamed = {
            let cell = Arc::clone(&cell);
            thread::spawn(move || cell.transition(SendState::Ready, SendState::HeadersSent))
        };
        let full = full.join().expect("full sender panicked");
        let streamed = streamed.join().expect("streamed sender panicked");

        assert!(full ^ streamed);
        let expected = if full { SendState::BodySent } else { SendState::HeadersSent };
        assert_eq!(cell.load(), expected);
    });
}

#[test]
fn completion_races_never_regress() {
    model(|| {
        let cell = Arc::new(SendStateCell::new());
        assert!(cell.transition(SendState::Ready, SendState::HeadersSent));
        let finisher = {
            let cell = Arc::clone(&cell);
            thread::spawn(move || cell.transition(SendState::HeadersSent, SendState::BodySent))
        };
        let late = {
            let cell = Arc::clone(&cell);
            thread::spawn(move || {
                let seen = cell.load();
                let claimed = cell.transition(SendState::Ready, SendState::HeadersSent);
                (seen, claimed)
            })
        };
        let finished = finisher.join().expect("finisher panicked");
        let (seen, claimed) = late.join().expect("late sender panicked");

        assert!(finished);
        assert!(!claimed);
        assert_ne!(seen, SendState::Ready);
        assert_eq!(cell.load(), SendState::BodySent);
    });
}
