
use coop_types::{RoomError, RoomStatus, RunStatus, ServerMessage};
use test_helpers::*;

/// Bring a two-player room to its finished state, ready for a rematch.
async fn finished_room(
    setup: &TestRoomSetup,
) -> (String, coop_types::UserProfile, coop_types::UserProfile) {
    let (room_id, alice, bob) = setup.playing_room().await;
    setup.store.abandon(&room_id, alice.id).await.unwrap();
    (room_id, alice, bob)
}

#[tokio::test]
async fn test_request_goes_to_the_partner_only() {
    let setup = TestRoomSetup::with_words(&["crane"]);
    let (room_id, alice, bob) = finished_room(&setup).await;

    let report = setup.store.request_rematch(&room_id, alice.id).await.unwrap();

    let targeted = user_events(&report.events);
    assert_eq!(targeted.len(), 1);
    let (addressee, message) = targeted[0];
    assert_eq!(addressee, bob.id);
    match message {
        ServerMessage::RematchRequest {
            requester_id,
            requester_name,
            ..
        } => {
            assert_eq!(*requester_id, alice.id);
            assert_eq!(requester_name, "Alice");
        }
        other => panic!("Expected RematchRequest, got {:?}", other),
    }
    assert!(room_events(&report.events).is_empty());
}

#[tokio::test]
async fn test_request_without_a_partner_is_silent() {
    let setup = TestRoomSetup::with_words(&["crane"]);
    let alice = create_test_user("Alice");
    let room = setup.store.create_room(&alice).await.unwrap();

    let report = setup
        .store
        .request_rematch(&room.room_id, alice.id)
        .await
        .unwrap();
    assert!(report.events.is_empty());
}

#[tokio::test]
async fn test_decline_answers_the_requester() {
    let setup = TestRoomSetup::with_words(&["crane"]);
    let (room_id, alice, bob) = finished_room(&setup).await;

    setup.store.request_rematch(&room_id, alice.id).await.unwrap();
    let report = setup
        .store
        .respond_rematch(&room_id, bob.id, false)
        .await
        .unwrap();

    assert!(report.new_room_id.is_none());
    let targeted = user_events(&report.events);
    assert_eq!(targeted.len(), 1);
    assert_eq!(targeted[0].0, alice.id);
    assert!(matches!(
        targeted[0].1,
        ServerMessage::RematchResponse {
            accepted: false,
            new_room_id: None,
            ..
        }
    ));
}

#[tokio::test]
async fn test_accept_spawns_a_fresh_playing_room_for_both() {
    let setup = TestRoomSetup::with_words(&["crane", "bright"]);
    let (room_id, alice, bob) = finished_room(&setup).await;

    setup.store.request_rematch(&room_id, alice.id).await.unwrap();
    let report = setup
        .store
        .respond_rematch(&room_id, bob.id, true)
        .await
        .unwrap();

    let new_room_id = report.new_room_id.clone().unwrap();
    assert_ne!(new_room_id, room_id);

    // both sides learn the new room, whichever of them accepted last
    let targeted = user_events(&report.events);
    assert_eq!(targeted.len(), 2);
    for (_, message) in &targeted {
        assert!(matches!(
            message,
            ServerMessage::RematchResponse {
                accepted: true,
                new_room_id: Some(id),
                ..
            } if *id == new_room_id
        ));
    }
    let mut addressees: Vec<_> = targeted.iter().map(|(id, _)| *id).collect();
    addressees.sort();
    let mut expected = vec![alice.id, bob.id];
    expected.sort();
    assert_eq!(addressees, expected);

    // the new room is live immediately: same pair, requester opens
    let room = setup.store.room_status(&new_room_id).await.unwrap();
    assert_eq!(room.status, RoomStatus::Playing);
    assert_eq!(room.creator_id, alice.id);
    assert_eq!(room.games_played, 1); // carried over from the finished round

    let view = setup.store.find_room_for_user(bob.id).await.unwrap();
    assert_eq!(view.room.room_id, new_room_id);
    let run = view.run.unwrap();
    assert_eq!(run.status, RunStatus::Active);
    assert_eq!(run.current_turn_player_id, Some(alice.id));
}

#[tokio::test]
async fn test_response_without_an_offer_is_a_stale_view() {
    let setup = TestRoomSetup::with_words(&["crane"]);
    let (room_id, _alice, bob) = finished_room(&setup).await;

    assert_eq!(
        setup.store.respond_rematch(&room_id, bob.id, true).await.err(),
        Some(RoomError::RoomNotActive)
    );
}

#[tokio::test]
async fn test_leave_cancels_a_pending_offer() {
    let setup = TestRoomSetup::with_words(&["crane"]);
    let (room_id, alice, bob) = finished_room(&setup).await;

    setup.store.request_rematch(&room_id, alice.id).await.unwrap();
    setup.store.leave_room(&room_id, alice.id).await.unwrap();

    // the offer died with the departure; accepting finds nothing
    assert_eq!(
        setup.store.respond_rematch(&room_id, bob.id, true).await.err(),
        Some(RoomError::RoomNotActive)
    );
}

#[tokio::test]
async fn test_rematch_needs_a_remaining_word_supply() {
    // the single word was consumed by the first room
    let setup = TestRoomSetup::with_words(&["crane"]);
    let (room_id, alice, bob) = finished_room(&setup).await;

    setup.store.request_rematch(&room_id, alice.id).await.unwrap();
    assert_eq!(
        setup.store.respond_rematch(&room_id, bob.id, true).await.err(),
        Some(RoomError::EvaluatorUnavailable)
    );
}
