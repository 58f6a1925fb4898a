//! Round-trip messaging scenarios between spawned logical threads.

use tidings::{
    owner_tid, receive, receive_only, send, send_priority, spawn, test_utils::init_test_logging,
    Handlers,
};

/// Parent sends an int and a string; the child dispatches each through a
/// typed handler and echoes a transformed reply to its owner.
#[test]
fn echo_typed_handlers() {
    init_test_logging();
    tidings::test_phase!("echo_typed_handlers");

    let child = spawn(|| {
        let owner = owner_tid().expect("spawned thread has an owner");
        for _ in 0..2 {
            receive(
                Handlers::new()
                    .on(|n: i32| {
                        let _ = send(&owner, n * 2);
                    })
                    .on(|s: String| {
                        let _ = send(&owner, format!("{s}{s}"));
                    }),
            )
            .expect("child receive");
        }
    });

    send(&child, 42_i32).expect("send int");
    send(&child, String::from("hi")).expect("send string");

    assert_eq!(receive_only::<i32>().expect("doubled int"), 84);
    assert_eq!(receive_only::<String>().expect("doubled string"), "hihi");
    tidings::test_complete!("echo_typed_handlers");
}

/// A mismatched `receive_only` consumes the message and reports an error
/// whose text names both types; the child relays that exact text back.
#[test]
fn receive_only_mismatch_text_relays_across_threads() {
    init_test_logging();
    tidings::test_phase!("receive_only_mismatch_text_relays_across_threads");

    let child = spawn(|| {
        let owner = owner_tid().expect("owner");
        let err = receive_only::<String>().expect_err("an int is not a string");
        let _ = send(&owner, err.to_string());
    });
    send(&child, 1_i32).expect("send");

    let relayed = receive_only::<String>().expect("relayed error text");
    assert_eq!(
        relayed,
        "Unexpected message type: expected 'alloc::string::String', got 'i32'"
    );
    tidings::test_complete!("receive_only_mismatch_text_relays_across_threads");
}

/// A priority message overtakes buffered standard messages: the child's
/// first match is the int even though two strings were sent first; the
/// strings then arrive in their original order.
#[test]
fn priority_message_overtakes_standard_lane() {
    init_test_logging();
    tidings::test_phase!("priority_message_overtakes_standard_lane");

    let child = spawn(|| {
        let owner = owner_tid().expect("owner");
        // First receive accepts only the int; the strings stay queued.
        receive(Handlers::new().on(|n: i32| {
            let _ = send(&owner, n);
        }))
        .expect("int receive");
        for _ in 0..2 {
            receive(Handlers::new().on(|s: String| {
                let _ = send(&owner, s);
            }))
            .expect("string receive");
        }
    });

    send(&child, String::from("a")).expect("send a");
    send(&child, String::from("b")).expect("send b");
    send_priority(&child, 99_i32).expect("priority send");

    assert_eq!(receive_only::<i32>().expect("int first"), 99);
    assert_eq!(receive_only::<String>().expect("first string"), "a");
    assert_eq!(receive_only::<String>().expect("second string"), "b");
    tidings::test_complete!("priority_message_overtakes_standard_lane");
}

/// Handles travel inside messages: a ring of three threads forwards a
/// counter back to the origin.
#[test]
fn handles_pass_through_messages() {
    init_test_logging();

    let origin = tidings::this_tid();
    let hop2 = spawn(|| {
        let (target, n) = receive_only::<(tidings::Tid, i32)>().expect("hop2");
        let _ = send(&target, n + 1);
    });
    let hop1 = spawn(move || {
        let (target, n) = receive_only::<(tidings::Tid, i32)>().expect("hop1");
        let _ = send(&hop2, (target, n + 1));
    });

    send(&hop1, (origin, 40_i32)).expect("kick off");
    assert_eq!(receive_only::<i32>().expect("completed ring"), 42);
}
