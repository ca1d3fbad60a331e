#![cfg(all(feature = "advanced-tests", not(loom)))]
//! Property tests for the exchange send state.
//!
//! Arbitrary sequences of attempted transitions are applied to a fresh cell;
//! whatever succeeds, the observed state must never move backwards.

use httpframe::exchange::{SendState, SendStateCell};
use proptest::prelude::*;

fn state() -> impl Strategy<Value = SendState> {
    prop_oneof![
        Just(SendState::Ready),
        Just(SendState::HeadersSent),
        Just(SendState::BodySent),
    ]
}

proptest! {
    #[test]
    fn transitions_are_monotonic(moves in proptest::collection::vec((state(), state()), 0..24)) {
        let cell = SendStateCell::new();
        let mut previous = cell.load();
        for (from, to) in moves {
            let moved = cell.transition(from, to);
            let current = cell.load();
            prop_assert!(current >= previous);
            if moved {
                prop_assert_eq!(previous, from);
                prop_assert_eq!(current, to);
            } else {
                prop_assert_eq!(current, previous);
            }
            previous = current;
        }
    }

    #[test]
    fn only_forward_moves_succeed(from in state(), to in state()) {
        let cell = SendStateCell::new();
        if from != SendState::Ready {
            prop_assume!(cell.transition(SendState::Ready, from));
        }
        prop_assert_eq!(cell.transition(from, to), from < to);
    }
}
