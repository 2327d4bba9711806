//! Property-based tests for the credit window.
//!
//! A simulated sender sends whenever the window allows and a simulated
//! receiver acknowledges frames in arbitrary batches. At every point the
//! number of unacknowledged frames must stay within the window.

use std::num::NonZeroU32;

use framelink_transport::window::CreditWindow;
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Event {
    /// Sender tries to send one frame.
    Send,
    /// Receiver acknowledges up to this many delivered frames in one read.
    Ack(usize),
}

fn event() -> impl Strategy<Value = Event> {
    prop_oneof![
        3 => Just(Event::Send),
        1 => (1usize..16).prop_map(Event::Ack),
    ]
}

proptest! {
    #[test]
    fn in_flight_never_exceeds_window(
        w in 1u32..32,
        events in prop::collection::vec(event(), 0..400),
    ) {
        let mut win = CreditWindow::new(NonZeroU32::new(w).unwrap());
        let mut delivered_unacked = 0usize;

        for ev in events {
            match ev {
                Event::Send => {
                    if win.can_send() {
                        win.on_sent();
                        delivered_unacked += 1;
                    }
                }
                Event::Ack(n) => {
                    let n = n.min(delivered_unacked);
                    delivered_unacked -= n;
                    win.on_acks(n);
                }
            }
            prop_assert!(win.sent() - win.confirmed() <= u64::from(w));
            prop_assert_eq!(win.in_flight() + win.credits(), u64::from(w));
        }
    }

    #[test]
    fn sends_stall_exactly_at_window(w in 1u32..64) {
        let mut win = CreditWindow::new(NonZeroU32::new(w).unwrap());
        let mut sent = 0u32;
        while win.can_send() {
            win.on_sent();
            sent += 1;
        }
        prop_assert_eq!(sent, w);
        win.on_acks(1);
        prop_assert!(win.can_send());
    }
}
