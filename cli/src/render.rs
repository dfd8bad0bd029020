// SPDX-License-Identifier: MIT OR Apache-2.0

//! ASCII rendering of maps and room events for the CLI.

use parley_core::{MapData, Tile};
use parley_network::RoomEvent;

/// Render a map as ASCII art with column and row labels
pub fn render_map(map: &MapData) -> String {
    let mut output = format!("{} ({}x{})\n", map.name, map.width, map.height);

    output.push_str("   ");
    for col in 0..map.width {
        output.push_str(&format!(" {}", column_label(col)));
    }
    output.push('\n');

    for row in 0..map.height {
        output.push_str(&format!("{:2} ", row + 1));
        for col in 0..map.width {
            let symbol = match map.tile(col, row) {
                Some(tile) => tile_symbol(tile),
                None => '?',
            };
            output.push_str(&format!(" {}", symbol));
        }
        output.push('\n');
    }

    output
}

/// One line describing a room event
pub fn describe_event(event: &RoomEvent) -> String {
    match event {
        RoomEvent::Text { from, text } => format!("<{}> {}", from, text),
        RoomEvent::Map { from, map } => format!("map {} from {}", map.name, from),
        RoomEvent::Status(status) => format!(
            "{} about {}: {}",
            status.kind,
            status.cause.kind(),
            status.message
        ),
        RoomEvent::RosterChanged { members } => format!("roster now has {} members", members.len()),
        RoomEvent::GameStarted { session, players } => {
            format!("{} started with {} players", session, players)
        }
        RoomEvent::PlayerDied { player } => format!("{} is out", player),
        RoomEvent::TeamEliminated { room } => format!("team {} eliminated", room),
        RoomEvent::GameOver(result) => format!("game over: {}", result),
        RoomEvent::DeadLettered { tag, count } => {
            format!("gave up on {} ({} envelopes dropped)", tag, count)
        }
    }
}

fn tile_symbol(tile: Tile) -> char {
    match tile {
        Tile::Floor => '.',
        Tile::Wall => '#',
        Tile::Water => '~',
        Tile::Spawn => 'S',
    }
}

/// Column labels A-Z, then wrapping
fn column_label(col: u16) -> char {
    (b'A' + (col % 26) as u8) as char
}
