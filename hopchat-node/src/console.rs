//! Line-oriented console: parses commands from stdin and renders chat and neighbor updates.

use chrono::{Local, TimeZone};
use hopchat_core::neighbors::Channel;
use hopchat_core::{ChatPacket, DeliveryReport, DeliveryRoute, NeighborSnapshot, NeighborTable};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use crate::runtime::NodeEvent;

pub const HELP: &str = "\
commands:
  /connect <host:port>   open a link to a neighbor
  /msg <peer-id> <text>  send a chat message
  /nick <name>           change display name
  /neighbors             list neighbors
  /id                    show this node's id
  /quit                  exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Connect(String),
    Send { dst: String, text: String },
    Nick(String),
    Neighbors,
    Id,
    Help,
    Quit,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("usage: {0}")]
    Usage(&'static str),
    #[error("unknown command {0:?} (try /help)")]
    Unknown(String),
}

/// Parse one input line. Blank lines yield `None`.
pub fn parse_command(line: &str) -> Result<Option<ConsoleCommand>, CommandError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((w, r)) => (w, r.trim()),
        None => (line, ""),
    };
    let cmd = match word {
        "/connect" if !rest.is_empty() => ConsoleCommand::Connect(rest.to_string()),
        "/connect" => return Err(CommandError::Usage("/connect <host:port>")),
        "/msg" => match rest.split_once(char::is_whitespace) {
            Some((dst, text)) if !text.trim().is_empty() => ConsoleCommand::Send {
                dst: dst.to_string(),
                text: text.trim().to_string(),
            },
            _ => return Err(CommandError::Usage("/msg <peer-id> <text>")),
        },
        "/nick" if !rest.is_empty() => ConsoleCommand::Nick(rest.to_string()),
        "/nick" => return Err(CommandError::Usage("/nick <name>")),
        "/neighbors" => ConsoleCommand::Neighbors,
        "/id" => ConsoleCommand::Id,
        "/help" => ConsoleCommand::Help,
        "/quit" | "/exit" => ConsoleCommand::Quit,
        other => return Err(CommandError::Unknown(other.to_string())),
    };
    Ok(Some(cmd))
}

/// Read stdin line by line and queue parsed commands. Parse errors are printed in place.
pub async fn run_console(events: mpsc::UnboundedSender<NodeEvent>) -> std::io::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match parse_command(&line) {
            Ok(Some(cmd)) => {
                if events.send(NodeEvent::Command(cmd)).is_err() {
                    break;
                }
            }
            Ok(None) => {}
            Err(e) => println!("{e}"),
        }
    }
    let _ = events.send(NodeEvent::Command(ConsoleCommand::Quit));
    Ok(())
}

fn local_time(millis: i64) -> String {
    match Local.timestamp_millis_opt(millis).single() {
        Some(t) => t.format("%H:%M:%S").to_string(),
        None => "--:--:--".to_string(),
    }
}

/// `a → b → c`, each hop by display name when known.
pub fn render_via<C: Channel>(packet: &ChatPacket, table: &NeighborTable<C>) -> String {
    packet
        .via
        .iter()
        .map(|id| table.label(id))
        .collect::<Vec<_>>()
        .join(" → ")
}

pub fn render_delivered<C: Channel>(packet: &ChatPacket, table: &NeighborTable<C>) -> String {
    let nick = if packet.src_nick.is_empty() {
        packet.src_id.short()
    } else {
        packet.src_nick.as_str()
    };
    format!(
        "[{nick} → me] {}\n  ({}) via: {}",
        packet.payload,
        local_time(packet.created_at),
        render_via(packet, table)
    )
}

pub fn render_sent<C: Channel>(report: &DeliveryReport, table: &NeighborTable<C>) -> String {
    let packet = &report.packet;
    let route = match &report.route {
        DeliveryRoute::Direct(_) => "direct".to_string(),
        DeliveryRoute::Flood { fanout: 0 } => "no live neighbors".to_string(),
        DeliveryRoute::Flood { fanout } => format!("flooded to {fanout}"),
    };
    format!(
        "[{} → {}] {}\n  ({}) {route}",
        packet.src_nick,
        table.label(&packet.dst_id),
        packet.payload,
        local_time(packet.created_at),
    )
}

pub fn render_neighbors(snapshot: &[NeighborSnapshot]) -> String {
    if snapshot.is_empty() {
        return "no neighbors".to_string();
    }
    snapshot
        .iter()
        .map(|n| {
            let dot = if n.online { "●" } else { "○" };
            let name = n.display_name.as_deref().unwrap_or_else(|| n.id.short());
            format!("{dot} {name} ({})", n.id)
        })
        .collect::<Vec<_>>()
        .join("\n")
}
