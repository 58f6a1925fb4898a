//! Bounded-mailbox crowding behavior across real threads.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tidings::{
    owner_tid, receive, receive_only, send, send_priority, set_max_mailbox_size, spawn,
    test_utils::init_test_logging, ErrorKind, Handlers, OnCrowding,
};

/// Marker releasing the consumer; priority, so it lands even in a full
/// mailbox.
struct Go;

/// Five sends through a capacity-2 mailbox under Block policy: the
/// producer stalls after two, resumes as the consumer drains, and every
/// message arrives in order.
#[test]
fn block_policy_stalls_producer_until_consumption() {
    init_test_logging();
    tidings::test_phase!("block_policy_stalls_producer_until_consumption");

    let consumer = spawn(|| {
        let owner = owner_tid().expect("owner");
        // Hold off consuming until told; arriving ints stay buffered.
        receive(Handlers::new().on(|_: Go| {})).expect("go marker");
        for _ in 0..5 {
            receive(Handlers::new().on(|n: i32| {
                let _ = send(&owner, n);
            }))
            .expect("consume");
        }
    });
    set_max_mailbox_size(&consumer, 2, OnCrowding::Block);

    let progress = Arc::new(AtomicUsize::new(0));
    {
        let consumer = consumer.clone();
        let progress = Arc::clone(&progress);
        spawn(move || {
            for n in 0..5_i32 {
                send(&consumer, n).expect("producer send");
                progress.fetch_add(1, Ordering::SeqCst);
            }
        });
    }

    // The producer gets exactly two messages in, then blocks.
    while progress.load(Ordering::SeqCst) < 2 {
        std::thread::yield_now();
    }
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(
        progress.load(Ordering::SeqCst),
        2,
        "third send must block while the mailbox is at capacity"
    );

    // Release the consumer; everything drains in order.
    send_priority(&consumer, Go).expect("go");
    for expected in 0..5_i32 {
        assert_eq!(receive_only::<i32>().expect("relayed"), expected);
    }
    assert_eq!(progress.load(Ordering::SeqCst), 5);
    tidings::test_complete!("block_policy_stalls_producer_until_consumption");
}

/// Fail policy surfaces MailboxFull to the sender instead of blocking.
#[test]
fn fail_policy_reports_full_to_sender() {
    init_test_logging();

    let consumer = spawn(|| {
        // Wait for permission to exit; buffered ints are left untouched.
        receive(Handlers::new().on(|_: Go| {})).expect("go marker");
    });
    set_max_mailbox_size(&consumer, 1, OnCrowding::Fail);

    send(&consumer, 1_i32).expect("first send fits");
    let err = send(&consumer, 2_i32).expect_err("second send overflows");
    assert_eq!(err.kind(), ErrorKind::MailboxFull);
    assert_eq!(err.tid(), Some(&consumer));

    send_priority(&consumer, Go).expect("release consumer");
}

/// Drop policy discards overflow without disturbing the sender.
#[test]
fn drop_policy_discards_overflow() {
    init_test_logging();

    let consumer = spawn(|| {
        let owner = owner_tid().expect("owner");
        receive(Handlers::new().on(|_: Go| {})).expect("go marker");
        let mut seen = Vec::new();
        for _ in 0..2 {
            receive(Handlers::new().on(|n: i32| seen.push(n))).expect("consume survivor");
        }
        let _ = send(&owner, seen);
    });
    set_max_mailbox_size(&consumer, 2, OnCrowding::Drop);

    for n in 0..4_i32 {
        send(&consumer, n).expect("drop policy never fails the sender");
    }
    send_priority(&consumer, Go).expect("go");

    // Only the first two survived; the consumer then drains exactly those.
    assert_eq!(receive_only::<Vec<i32>>().expect("survivors"), vec![0, 1]);
}

/// The custom predicate decides per-send between blocking and dropping.
#[test]
fn custom_policy_consults_predicate() {
    init_test_logging();

    let asked = Arc::new(AtomicUsize::new(0));
    let consumer = spawn(|| {
        receive(Handlers::new().on(|_: Go| {})).expect("go marker");
    });
    {
        let asked = Arc::clone(&asked);
        set_max_mailbox_size(
            &consumer,
            1,
            OnCrowding::Custom(Arc::new(move |_tid| {
                asked.fetch_add(1, Ordering::SeqCst);
                false // drop
            })),
        );
    }

    send(&consumer, 1_i32).expect("fits");
    send(&consumer, 2_i32).expect("dropped by predicate");
    send(&consumer, 3_i32).expect("dropped by predicate");
    assert_eq!(asked.load(Ordering::SeqCst), 2, "predicate asked per overflow");

    send_priority(&consumer, Go).expect("release");
}
