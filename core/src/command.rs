// SPDX-License-Identifier: MIT OR Apache-2.0

//! Handlers as a closed set of data-only commands
//!
//! A handler travels between peers as a [`Command`] value and is interpreted
//! by the receiving peer. No executable code crosses the wire.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::context::RoomContext;
use crate::dispatcher::Dispatcher;
use crate::envelope::{Envelope, Message};
use crate::error::DispatchError;
use crate::messages::{
    Batch, CmdData, CmdRequest, GameResult, MapData, PlayerDied, StartGame, TextMessage,
};
use crate::status::{Status, StatusKind};
use crate::tag::TypeTag;

/// Entry holding the id of the running session
pub const SESSION_ENTRY: &str = "session";

/// Entry holding the decided [`GameResult`]
pub const RESULT_ENTRY: &str = "result";

/// Processing logic for exactly one message kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    /// Answer a [`CmdRequest`] with the local handler, or reject it
    ServeCommand,
    /// Install the handler carried by a [`CmdData`]
    InstallCommand,
    /// Surface a [`Status`] report
    Status,
    /// Re-dispatch every element of a [`Batch`] in order
    Batch,
    DisplayText,
    DisplayMap,
    /// Seed player statuses when a [`StartGame`] arrives
    StartGame,
    /// Record a [`PlayerDied`] notification
    RecordDeath,
    AnnounceResult,
}

impl Command {
    /// Commands every dispatcher starts with
    pub const PROTOCOL: [Command; 4] = [
        Command::ServeCommand,
        Command::InstallCommand,
        Command::Status,
        Command::Batch,
    ];

    /// Commands for the shipped application messages
    pub const APPLICATION: [Command; 5] = [
        Command::DisplayText,
        Command::DisplayMap,
        Command::StartGame,
        Command::RecordDeath,
        Command::AnnounceResult,
    ];

    /// Logical name of the message kind this command interprets
    pub fn message_kind(&self) -> &'static str {
        match self {
            Command::ServeCommand => CmdRequest::KIND,
            Command::InstallCommand => CmdData::KIND,
            Command::Status => Status::KIND,
            Command::Batch => Batch::KIND,
            Command::DisplayText => TextMessage::KIND,
            Command::DisplayMap => MapData::KIND,
            Command::StartGame => StartGame::KIND,
            Command::RecordDeath => PlayerDied::KIND,
            Command::AnnounceResult => GameResult::KIND,
        }
    }

    /// Tag this command is registered under
    pub fn tag(&self) -> TypeTag {
        TypeTag::for_kind(self.message_kind())
    }

    pub fn is_protocol(&self) -> bool {
        Self::PROTOCOL.contains(self)
    }

    /// Interpret the command against one envelope
    pub fn apply<C>(
        &self,
        dispatcher: &mut Dispatcher,
        envelope: Envelope,
        ctx: &mut C,
    ) -> Result<(), DispatchError>
    where
        C: RoomContext + ?Sized,
    {
        match self {
            Command::ServeCommand => {
                let request: CmdRequest = envelope.decode()?;
                dispatcher.serve_request(request.tag, envelope, ctx)
            }
            Command::InstallCommand => {
                let data: CmdData = envelope.decode()?;
                dispatcher.install(data.tag, data.command, ctx)
            }
            Command::Status => {
                let status: Status = envelope.decode()?;
                tracing::warn!(
                    kind = %status.kind,
                    from = %envelope.sender(),
                    cause = status.cause.kind(),
                    "Status received: {}",
                    status.message
                );
                if status.kind == StatusKind::Reject && status.cause.is::<CmdRequest>() {
                    let request: CmdRequest = status.cause.decode()?;
                    dispatcher.abandon(request.tag);
                }
                ctx.report_status(&status);
                Ok(())
            }
            Command::Batch => {
                let batch: Batch = envelope.decode()?;
                tracing::debug!(len = batch.len(), from = %envelope.sender(), "Unpacking batch");
                for item in batch.envelopes {
                    dispatcher.dispatch(item, ctx)?;
                }
                Ok(())
            }
            Command::DisplayText => {
                let message: TextMessage = envelope.decode()?;
                ctx.display_text(envelope.sender(), &message.text);
                Ok(())
            }
            Command::DisplayMap => {
                let map: MapData = envelope.decode()?;
                if !map.is_well_formed() {
                    return Err(DispatchError::Processing(format!(
                        "map {} has {} tiles for a {}x{} grid",
                        map.name,
                        map.tiles.len(),
                        map.width,
                        map.height
                    )));
                }
                ctx.display_map(envelope.sender(), &map);
                Ok(())
            }
            Command::StartGame => {
                let start: StartGame = envelope.decode()?;
                ctx.entries().put(SESSION_ENTRY, &start.session)?;
                ctx.start_game(&start.session);
                Ok(())
            }
            Command::RecordDeath => {
                let death: PlayerDied = envelope.decode()?;
                ctx.record_death(&death.player)
            }
            Command::AnnounceResult => {
                let result: GameResult = envelope.decode()?;
                ctx.entries().put(RESULT_ENTRY, &result)?;
                ctx.announce_result(&result);
                Ok(())
            }
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}
