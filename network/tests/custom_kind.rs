// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message kinds outside the shipped command catalogue

mod common;

use common::{wait_for, TestNet};
use parley_core::{Envelope, Message, StatusKind, TypeTag};
use parley_network::{RoomEvent, RoomOptions};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Ping {
    seq: u32,
}

impl Message for Ping {
    const KIND: &'static str = "demo.ping";
}

#[tokio::test]
async fn kind_without_command_is_rejected_by_its_sender() -> anyhow::Result<()> {
    let net = TestNet::new();
    let a = net.join("a", "lab", RoomOptions::application());
    let b = net.join("b", "lab", RoomOptions::application());
    let mut events = b.subscribe();

    let envelope = Envelope::new(a.local().clone(), &Ping { seq: 1 })?;
    assert_eq!(envelope.tag(), TypeTag::of::<Ping>());
    a.send_envelope(b.local(), envelope)?;

    let status = wait_for(&mut events, |event| match event {
        RoomEvent::Status(status) => Some(status),
        _ => None,
    })
    .await;
    assert_eq!(status.kind, StatusKind::Reject);

    let report = b.inspect(TypeTag::of::<Ping>()).await?;
    assert_eq!(report.cached, 1);
    Ok(())
}
