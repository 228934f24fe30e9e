mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use pmocast::cast::wire;
use pmocast::{
    CastError, LoadRequest, QueueLoadOutcome, SessionController, SessionEvent, SessionState,
    build_queue_entries,
};
use rust_cast::channels::media::{Metadata, QueueType};

use common::{Call, FakeReceiver, MEDIA_SESSION_ID, device, next_load_result, test_config, track, wait_for_state};

fn active_controller(receiver: &FakeReceiver) -> (SessionController, crossbeam_channel::Receiver<SessionEvent>) {
    let controller = SessionController::spawn(test_config(), receiver.connector()).unwrap();
    let events = controller.subscribe();
    controller.connect(device("a"), None).unwrap();
    wait_for_state(&events, SessionState::Active);
    (controller, events)
}

#[test]
fn test_three_tracks_from_the_second() {
    let receiver = FakeReceiver::new();
    let (controller, events) = active_controller(&receiver);

    let tracks = vec![track("A"), track("B"), track("C")];
    let load_id = controller
        .dispatcher()
        .load_queue(build_queue_entries(&tracks), 1)
        .unwrap();

    let Call::Load(LoadRequest::Queue(request)) =
        receiver.expect_call(|c| matches!(c, Call::Load(_)))
    else {
        panic!("expected a queue load");
    };
    let content_ids: Vec<&str> = request
        .items
        .iter()
        .map(|item| item.media.content_id.as_str())
        .collect();
    assert_eq!(
        content_ids,
        vec![
            "http://audio.example/A.m4a",
            "http://audio.example/B.m4a",
            "http://audio.example/C.m4a"
        ]
    );
    assert_eq!(request.start_index, 1);
    assert!(request.items.iter().all(|item| item.autoplay));

    // Ce qui est remis à rust_cast pour le QUEUE_LOAD.
    let queue = wire::media_queue(&request).unwrap();
    assert_eq!(queue.start_index, 1);
    assert_eq!(queue.queue_type, QueueType::Playlist);
    assert_eq!(queue.items.len(), 3);
    let Some(Metadata::MusicTrack(first)) = &queue.items[0].media.metadata else {
        panic!("expected music track metadata");
    };
    assert_eq!(first.title.as_deref(), Some("Track A"));
    assert_eq!(first.images[0].url, "http://img.example/A/600x600bb.jpg");

    assert_eq!(
        next_load_result(&events),
        (
            load_id,
            QueueLoadOutcome::Loaded {
                media_session_id: Some(MEDIA_SESSION_ID)
            }
        )
    );
    assert_eq!(
        receiver
            .drain_calls()
            .iter()
            .filter(|c| matches!(c, Call::Load(_)))
            .count(),
        0
    );
}

#[test]
fn test_load_is_a_no_op_when_not_active() {
    let receiver = FakeReceiver::new();
    let controller = SessionController::spawn(test_config(), receiver.connector()).unwrap();

    let err = controller
        .dispatcher()
        .load_queue(build_queue_entries(&[track("A")]), 0)
        .unwrap_err();
    assert!(matches!(err, CastError::NoActiveSession));

    std::thread::sleep(Duration::from_millis(100));
    assert!(receiver.drain_calls().is_empty());
}

#[test]
fn test_precondition_failures_make_no_receiver_call() {
    let receiver = FakeReceiver::new();
    let (controller, _events) = active_controller(&receiver);
    receiver.drain_calls();
    let dispatcher = controller.dispatcher();

    let err = dispatcher
        .load_queue(build_queue_entries(&[track("A"), track("B"), track("C")]), 3)
        .unwrap_err();
    assert!(matches!(err, CastError::StartIndexOutOfRange { index: 3, len: 3 }));

    let err = dispatcher.load_queue(Vec::new(), 0).unwrap_err();
    assert!(matches!(err, CastError::EmptyQueue));

    std::thread::sleep(Duration::from_millis(100));
    assert!(receiver.drain_calls().is_empty());
    assert_eq!(controller.state(), SessionState::Active);
}

#[test]
fn test_new_load_supersedes_pending_one() {
    let receiver = FakeReceiver::new();
    let (controller, events) = active_controller(&receiver);
    let gate = receiver.behaviour().load_gate.close();
    let dispatcher = controller.dispatcher();

    let first = dispatcher
        .load_queue(build_queue_entries(&[track("A"), track("B")]), 0)
        .unwrap();
    receiver.expect_call(|c| matches!(c, Call::Load(_)));

    let second = dispatcher
        .load_queue(build_queue_entries(&[track("C")]), 0)
        .unwrap();
    assert_eq!(next_load_result(&events), (first, QueueLoadOutcome::Superseded));

    drop(gate);
    assert_eq!(
        next_load_result(&events),
        (
            second,
            QueueLoadOutcome::Loaded {
                media_session_id: Some(MEDIA_SESSION_ID)
            }
        )
    );

    // La réponse tardive du premier chargement est ignorée.
    let late = events
        .recv_timeout(Duration::from_millis(200))
        .ok()
        .filter(|event| matches!(event, SessionEvent::QueueLoadResult { .. }));
    assert!(late.is_none());
}

#[test]
fn test_disconnect_cancels_pending_load() {
    let receiver = FakeReceiver::new();
    let (controller, events) = active_controller(&receiver);
    let _gate = receiver.behaviour().load_gate.close();

    let load_id = controller
        .dispatcher()
        .load_queue(build_queue_entries(&[track("A")]), 0)
        .unwrap();
    receiver.expect_call(|c| matches!(c, Call::Load(_)));

    controller.disconnect().unwrap();
    assert_eq!(next_load_result(&events), (load_id, QueueLoadOutcome::Cancelled));
    wait_for_state(&events, SessionState::Idle);
}

#[test]
fn test_receiver_rejection_keeps_session() {
    let receiver = FakeReceiver::new();
    let (controller, events) = active_controller(&receiver);
    receiver
        .behaviour()
        .load_rejected
        .store(true, Ordering::SeqCst);

    let load_id = controller
        .dispatcher()
        .load_queue(build_queue_entries(&[track("A")]), 0)
        .unwrap();
    let (id, outcome) = next_load_result(&events);
    assert_eq!(id, load_id);
    assert!(matches!(outcome, QueueLoadOutcome::Failed(_)));

    assert!(events.recv_timeout(Duration::from_millis(200)).is_err());
    assert_eq!(controller.state(), SessionState::Active);
}

#[test]
fn test_transport_error_during_load_ends_session() {
    let receiver = FakeReceiver::new();
    let (controller, events) = active_controller(&receiver);
    receiver
        .behaviour()
        .load_transport_error
        .store(true, Ordering::SeqCst);

    let load_id = controller
        .dispatcher()
        .load_queue(build_queue_entries(&[track("A")]), 0)
        .unwrap();
    let (id, outcome) = next_load_result(&events);
    assert_eq!(id, load_id);
    assert!(matches!(outcome, QueueLoadOutcome::Failed(_)));

    assert_eq!(
        wait_for_state(&events, SessionState::Disconnected),
        vec![SessionState::Disconnected]
    );
    receiver.expect_call(|c| *c == Call::Close);

    let err = controller
        .dispatcher()
        .load_queue(build_queue_entries(&[track("A")]), 0)
        .unwrap_err();
    assert!(matches!(err, CastError::NoActiveSession));
}

#[test]
fn test_oversized_queue_fails_without_ending_session() {
    let receiver = FakeReceiver::new();
    let (controller, events) = active_controller(&receiver);
    receiver.drain_calls();
    let dispatcher = controller.dispatcher();

    let tracks: Vec<_> = (0..300).map(|i| track(&format!("T{:03}", i))).collect();
    let load_id = dispatcher.load_queue(build_queue_entries(&tracks), 0).unwrap();

    let (id, outcome) = next_load_result(&events);
    assert_eq!(id, load_id);
    match outcome {
        QueueLoadOutcome::Failed(message) => assert!(message.contains("message limit"), "{}", message),
        other => panic!("expected Failed, got {:?}", other),
    }

    // No transition, no teardown.
    assert!(events.recv_timeout(Duration::from_millis(200)).is_err());
    assert_eq!(controller.state(), SessionState::Active);
    assert!(
        !receiver
            .drain_calls()
            .iter()
            .any(|c| matches!(c, Call::Close | Call::Stop(_)))
    );

    // A queue that fits still goes through on the same session.
    let next = dispatcher
        .load_queue(build_queue_entries(&tracks[..10]), 0)
        .unwrap();
    assert_eq!(
        next_load_result(&events),
        (
            next,
            QueueLoadOutcome::Loaded {
                media_session_id: Some(MEDIA_SESSION_ID)
            }
        )
    );
}
