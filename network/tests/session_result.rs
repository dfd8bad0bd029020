// SPDX-License-Identifier: MIT OR Apache-2.0

//! Winner and draw decisions across rooms hosted by a lobby

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{wait_for, EVENT_TIMEOUT};
use parley_core::{GameResult, PlayerDied, SessionState, TypeTag};
use parley_network::{Lobby, LobbyEvent, MemoryNetwork, RoomEvent, RoomHandle, RoomOptions};
use tokio::sync::broadcast;

/// Wait until the host's connection has seeded its players
async fn started(room: &str, events: &mut broadcast::Receiver<RoomEvent>) {
    let players = wait_for(events, |event| match event {
        RoomEvent::GameStarted { players, .. } => Some(players),
        _ => None,
    })
    .await;
    assert!(players > 0, "no players seeded in {}", room);
}

fn die(lobby: &Lobby, player: &RoomHandle) {
    let host = lobby.host_peer(player.room());
    player
        .send(
            &host,
            &PlayerDied {
                player: player.local().clone(),
            },
        )
        .unwrap();
}

async fn result_of(lobby: &Lobby) -> GameResult {
    tokio::time::timeout(EVENT_TIMEOUT, lobby.session().wait_for_result())
        .await
        .expect("no session result in time")
        .unwrap()
}

#[tokio::test]
async fn last_team_standing_wins_and_everyone_hears() {
    let network = Arc::new(MemoryNetwork::new());
    let lobby = Lobby::new("host", network.clone(), RoomOptions::default());
    let mut lobby_events = lobby.subscribe();

    lobby.create_room("red").await.unwrap();
    lobby.create_room("blue").await.unwrap();
    let alice = lobby.join_room("alice", "red", RoomOptions::default()).await.unwrap();
    let bob = lobby.join_room("bob", "blue", RoomOptions::default()).await.unwrap();
    let mut red = lobby.room_events("red").await.unwrap();
    let mut blue = lobby.room_events("blue").await.unwrap();
    let mut bob_events = bob.subscribe();

    lobby.start_session().await.unwrap();
    started("red", &mut red).await;
    started("blue", &mut blue).await;

    die(&lobby, &alice);
    let eliminated = wait_for(&mut red, |event| match event {
        RoomEvent::TeamEliminated { room } => Some(room),
        _ => None,
    })
    .await;
    assert_eq!(eliminated, "red");

    let winner = GameResult::Winner {
        room: "blue".into(),
    };
    assert_eq!(result_of(&lobby).await, winner);
    assert_eq!(lobby.session().state(), SessionState::Won("blue".into()));

    // the host's connections know the result, players learn how to show it
    let over = |event: RoomEvent| match event {
        RoomEvent::GameOver(result) => Some(result),
        _ => None,
    };
    assert_eq!(wait_for(&mut blue, over).await, winner);
    assert_eq!(wait_for(&mut red, over).await, winner);
    assert_eq!(wait_for(&mut bob_events, over).await, winner);

    // one result per roster member: two rooms of two
    let results = network
        .traffic()
        .iter()
        .filter(|d| d.tag == TypeTag::of::<GameResult>())
        .count();
    assert_eq!(results, 4);

    let mut saw_session = false;
    while let Ok(event) = lobby_events.try_recv() {
        if let LobbyEvent::SessionStarted { rooms, .. } = event {
            assert_eq!(rooms.len(), 2);
            saw_session = true;
        }
    }
    assert!(saw_session);

    lobby.close().await.unwrap();
}

#[tokio::test]
async fn lone_team_falling_is_a_draw() {
    let network = Arc::new(MemoryNetwork::new());
    let lobby = Lobby::new("host", network, RoomOptions::default());

    lobby.create_room("solo").await.unwrap();
    let carol = lobby.join_room("carol", "solo", RoomOptions::default()).await.unwrap();
    let dave = lobby.join_room("dave", "solo", RoomOptions::default()).await.unwrap();
    let mut solo = lobby.room_events("solo").await.unwrap();

    lobby.start_session().await.unwrap();
    started("solo", &mut solo).await;

    die(&lobby, &carol);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(lobby.session().state(), SessionState::Active(1));

    die(&lobby, &dave);
    assert_eq!(result_of(&lobby).await, GameResult::Draw);

    let over = wait_for(&mut solo, |event| match event {
        RoomEvent::GameOver(result) => Some(result),
        _ => None,
    })
    .await;
    assert_eq!(over, GameResult::Draw);
}

#[tokio::test]
async fn repeated_death_after_result_changes_nothing() {
    let network = Arc::new(MemoryNetwork::new());
    let lobby = Lobby::new("host", network.clone(), RoomOptions::default());

    lobby.create_room("red").await.unwrap();
    lobby.create_room("blue").await.unwrap();
    let alice = lobby.join_room("alice", "red", RoomOptions::default()).await.unwrap();
    let _bob = lobby.join_room("bob", "blue", RoomOptions::default()).await.unwrap();
    let mut red = lobby.room_events("red").await.unwrap();

    lobby.start_session().await.unwrap();
    started("red", &mut red).await;

    die(&lobby, &alice);
    let first = result_of(&lobby).await;

    // the room reports its elimination again, the session stays decided
    die(&lobby, &alice);
    wait_for(&mut red, |event| match event {
        RoomEvent::TeamEliminated { .. } => Some(()),
        _ => None,
    })
    .await;
    wait_for(&mut red, |event| match event {
        RoomEvent::TeamEliminated { .. } => Some(()),
        _ => None,
    })
    .await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(lobby.session().state().result(), Some(first));
    let results = network
        .traffic()
        .iter()
        .filter(|d| d.tag == TypeTag::of::<GameResult>())
        .count();
    assert_eq!(results, 4);
}
