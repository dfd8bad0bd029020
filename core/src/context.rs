// SPDX-License-Identifier: MIT OR Apache-2.0

//! Callbacks a command may use while handling an envelope

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;

use crate::cbor;
use crate::envelope::{Envelope, Message, PeerRef};
use crate::error::{CommunicationError, DispatchError};
use crate::messages::{GameResult, MapData};
use crate::status::Status;

/// Environment of one room connection, as seen by commands
pub trait RoomContext {
    /// Address of this room connection
    fn local_peer(&self) -> &PeerRef;

    /// Name of the room
    fn room_name(&self) -> &str {
        self.local_peer().room()
    }

    /// Send an envelope to one peer
    fn send(&mut self, to: &PeerRef, envelope: Envelope) -> Result<(), CommunicationError>;

    fn display_text(&mut self, from: &PeerRef, text: &str);

    fn display_map(&mut self, from: &PeerRef, map: &MapData);

    /// Surface a received status report
    fn report_status(&mut self, status: &Status);

    /// Seed the player statuses from the current roster
    fn start_game(&mut self, session: &str);

    /// Mark a player dead and check whether the team survives
    fn record_death(&mut self, player: &PeerRef) -> Result<(), DispatchError>;

    fn announce_result(&mut self, result: &GameResult);

    /// Small per-room key-value entries, such as the session id and result
    fn entries(&mut self) -> &mut Entries;
}

/// Build an envelope from this connection and send it
pub fn send_message<C, M>(ctx: &mut C, to: &PeerRef, message: &M) -> Result<(), DispatchError>
where
    C: RoomContext + ?Sized,
    M: Message,
{
    let envelope = Envelope::new(ctx.local_peer().clone(), message)?;
    ctx.send(to, envelope)?;
    Ok(())
}

/// Tell the sender of `cause` that handling it failed
///
/// Statuses are never answered with statuses. Delivery failures are logged.
pub fn report_failure<C>(ctx: &mut C, cause: Envelope, err: &DispatchError)
where
    C: RoomContext + ?Sized,
{
    tracing::warn!(kind = cause.kind(), from = %cause.sender(), "Dispatch failed: {}", err);
    if cause.is::<Status>() {
        return;
    }
    let to = cause.sender().clone();
    let status = Status::from_error(cause, err);
    if let Err(err) = send_message(ctx, &to, &status) {
        tracing::warn!(%to, "Status report not delivered: {}", err);
    }
}

/// Typed key-value entries kept per room
#[derive(Debug, Default, Clone)]
pub struct Entries {
    values: HashMap<String, Vec<u8>>,
}

impl Entries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put<T: Serialize>(&mut self, key: &str, value: &T) -> Result<(), DispatchError> {
        let bytes = cbor::to_cbor(key, value)?;
        self.values.insert(key.to_string(), bytes);
        Ok(())
    }

    /// Typed read; `None` when absent
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, DispatchError> {
        match self.values.get(key) {
            Some(bytes) => cbor::from_cbor(key, bytes).map(Some),
            None => Ok(None),
        }
    }

    /// Encoded bytes of an entry
    pub fn raw(&self, key: &str) -> Option<&[u8]> {
        self.values.get(key).map(Vec::as_slice)
    }

    pub fn remove(&mut self, key: &str) -> bool {
        self.values.remove(key).is_some()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
pub(crate) mod recording {
    //! Context that records every effect, for dispatcher tests

    use super::*;
    use crate::consensus::PlayerStatusMap;

    #[derive(Debug, Default)]
    pub struct RecordingContext {
        pub local: Option<PeerRef>,
        pub roster: Vec<PeerRef>,
        pub sent: Vec<(PeerRef, Envelope)>,
        pub texts: Vec<(PeerRef, String)>,
        pub maps: Vec<(PeerRef, MapData)>,
        pub statuses: Vec<Status>,
        pub results: Vec<GameResult>,
        pub players: Option<PlayerStatusMap>,
        pub eliminations: usize,
        pub unreachable: Vec<PeerRef>,
        pub entries: Entries,
    }

    impl RecordingContext {
        pub fn new(local: PeerRef) -> Self {
            Self {
                local: Some(local),
                ..Self::default()
            }
        }

        /// Envelopes of type `M` sent so far
        pub fn sent_of<M: Message>(&self) -> Vec<(PeerRef, M)> {
            self.sent
                .iter()
                .filter(|(_, env)| env.is::<M>())
                .map(|(to, env)| (to.clone(), env.decode::<M>().unwrap()))
                .collect()
        }
    }

    impl RoomContext for RecordingContext {
        fn local_peer(&self) -> &PeerRef {
            self.local.as_ref().expect("recording context without local peer")
        }

        fn send(&mut self, to: &PeerRef, envelope: Envelope) -> Result<(), CommunicationError> {
            if self.unreachable.contains(to) {
                return Err(CommunicationError::Unreachable(to.clone()));
            }
            self.sent.push((to.clone(), envelope));
            Ok(())
        }

        fn display_text(&mut self, from: &PeerRef, text: &str) {
            self.texts.push((from.clone(), text.to_string()));
        }

        fn display_map(&mut self, from: &PeerRef, map: &MapData) {
            self.maps.push((from.clone(), map.clone()));
        }

        fn report_status(&mut self, status: &Status) {
            self.statuses.push(status.clone());
        }

        fn start_game(&mut self, _session: &str) {
            let local = self.local_peer().clone();
            self.players = Some(PlayerStatusMap::seed(self.roster.clone(), &local));
        }

        fn record_death(&mut self, player: &PeerRef) -> Result<(), DispatchError> {
            let room = self.room_name().to_string();
            let players = self
                .players
                .as_mut()
                .ok_or_else(|| DispatchError::Processing("game has not started".into()))?;
            players.mark_dead(player);
            if players.check_team_survival(&room).is_some() {
                self.eliminations += 1;
            }
            Ok(())
        }

        fn announce_result(&mut self, result: &GameResult) {
            self.results.push(result.clone());
        }

        fn entries(&mut self) -> &mut Entries {
            &mut self.entries
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entries_typed_round_trip() {
        let mut entries = Entries::new();
        entries.put("score", &42u32).unwrap();
        entries.put("name", &"red".to_string()).unwrap();

        assert_eq!(entries.get::<u32>("score").unwrap(), Some(42));
        assert_eq!(entries.get::<String>("name").unwrap().as_deref(), Some("red"));
        assert_eq!(entries.get::<u32>("missing").unwrap(), None);
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn test_entries_wrong_type_is_decode_error() {
        let mut entries = Entries::new();
        entries.put("name", &"red".to_string()).unwrap();
        assert!(entries.get::<u32>("name").is_err());
        assert!(entries.remove("name"));
        assert!(entries.is_empty());
    }
}
