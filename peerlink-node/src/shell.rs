//! Interactive line shell over a running [`Node`].

use std::net::IpAddr;
use std::path::PathBuf;

use peerlink_core::identity::short_id;
use peerlink_node::events::format_size;
use peerlink_node::{Node, TransferDirection};
use tokio::sync::mpsc;

const HELP: &str = "\
Commands:
  /connect <ip> <port>      connect to a peer
  /peers                    list connected peers
  /send <peer> <message>    message one peer (nickname or ID prefix)
  /sendall <message>        message every connected peer
  /file <peer> <path>       send a file
  /disconnect <peer>        disconnect and block a peer for this session
  /discover                 list peers seen through discovery
  /transfers                list active transfers
  /whoami                   show this node's identity
  /help                     show this help
  /quit                     exit
Text without a leading '/' is sent to every connected peer.";

#[derive(Debug, PartialEq)]
pub enum Command {
    Connect { ip: IpAddr, port: u16 },
    Peers,
    Send { peer: String, text: String },
    SendAll(String),
    File { peer: String, path: PathBuf },
    Disconnect(String),
    Discover,
    Transfers,
    WhoAmI,
    Help,
    Quit,
}

/// Parse one input line. `Ok(None)` for a blank line, `Err` carries a usage message.
pub fn parse(line: &str) -> Result<Option<Command>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    if !line.starts_with('/') {
        return Ok(Some(Command::SendAll(line.to_string())));
    }
    let (cmd, rest) = match line.split_once(char::is_whitespace) {
        Some((c, r)) => (c, r.trim()),
        None => (line, ""),
    };
    let cmd = match cmd.to_lowercase().as_str() {
        "/connect" => {
            let mut parts = rest.split_whitespace();
            let (Some(ip), Some(port), None) = (parts.next(), parts.next(), parts.next()) else {
                return Err("usage: /connect <ip> <port>".into());
            };
            let ip = ip.parse().map_err(|_| format!("invalid IP address: {}", ip))?;
            let port = port.parse().map_err(|_| format!("invalid port: {}", port))?;
            Command::Connect { ip, port }
        }
        "/peers" => Command::Peers,
        "/send" => {
            let (peer, text) = two_args(rest).ok_or("usage: /send <peer> <message>")?;
            Command::Send { peer, text }
        }
        "/sendall" if !rest.is_empty() => Command::SendAll(rest.to_string()),
        "/sendall" => return Err("usage: /sendall <message>".into()),
        "/file" => {
            let (peer, path) = two_args(rest).ok_or("usage: /file <peer> <path>")?;
            Command::File {
                peer,
                path: PathBuf::from(path),
            }
        }
        "/disconnect" if !rest.is_empty() => Command::Disconnect(rest.to_string()),
        "/disconnect" => return Err("usage: /disconnect <peer>".into()),
        "/discover" => Command::Discover,
        "/transfers" => Command::Transfers,
        "/whoami" => Command::WhoAmI,
        "/help" => Command::Help,
        "/quit" | "/exit" => Command::Quit,
        other => return Err(format!("unknown command {}; type /help", other)),
    };
    Ok(Some(cmd))
}

/// First word, then the remainder verbatim (messages and paths may contain spaces).
fn two_args(rest: &str) -> Option<(String, String)> {
    let (first, second) = rest.split_once(char::is_whitespace)?;
    let second = second.trim();
    if second.is_empty() {
        return None;
    }
    Some((first.to_string(), second.to_string()))
}

/// Read commands from stdin until `/quit` or end of input.
///
/// Stdin is read on a plain thread so a pending read never holds up runtime shutdown.
pub async fn run(node: &Node) {
    let (tx, mut lines) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        use std::io::BufRead;
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    while let Some(line) = lines.recv().await {
        match parse(&line) {
            Ok(None) => {}
            Ok(Some(Command::Quit)) => break,
            Ok(Some(cmd)) => execute(node, cmd).await,
            Err(usage) => println!("{}", usage),
        }
    }
}

async fn execute(node: &Node, cmd: Command) {
    match cmd {
        Command::Connect { ip, port } => match node.connect(ip, port).await {
            Ok(p) => println!("connected to {} ({}) at {}", p.nickname, short_id(&p.peer_id), p.addr),
            Err(e) => println!("{}", e),
        },
        Command::Peers => {
            let peers = node.list_peers().await;
            if peers.is_empty() {
                println!("no peers connected");
            }
            for (id, p) in peers {
                println!("  {} ({})  {}:{}  {}", p.nickname, id, p.ip, p.port, p.status);
            }
        }
        Command::Send { peer, text } => {
            if let Err(e) = node.send_to(&peer, &text).await {
                println!("{}", e);
            }
        }
        Command::SendAll(text) => {
            let results = node.broadcast(&text).await;
            if results.is_empty() {
                println!("not connected to any peers; use /connect or wait for discovery");
            } else {
                let ok = results.values().filter(|ok| **ok).count();
                println!("sent to {} of {} peer(s)", ok, results.len());
            }
        }
        Command::File { peer, path } => {
            println!("sending {} to {}...", path.display(), peer);
            match node.send_file(&peer, &path).await {
                Ok(r) => println!(
                    "sent '{}' ({}, {} chunks), waiting for verification",
                    r.file_name,
                    format_size(r.file_size),
                    r.chunks
                ),
                Err(e) => println!("{}", e),
            }
        }
        Command::Disconnect(peer) => match node.disconnect(&peer).await {
            Ok(p) => println!("disconnected from {}; {} is blocked for this session", p.nickname, p.addr),
            Err(e) => println!("{}", e),
        },
        Command::Discover => {
            let seen = node.list_discovered().await;
            if seen.is_empty() {
                println!("no peers discovered yet");
            }
            for p in seen {
                println!(
                    "  {} ({})  {}:{}{}",
                    p.nickname,
                    short_id(&p.peer_id),
                    p.ip,
                    p.port,
                    if p.relayed { "  via gossip" } else { "" }
                );
            }
        }
        Command::Transfers => {
            let active = node.transfers().await;
            if active.is_empty() {
                println!("no active transfers");
            }
            for t in active {
                let arrow = match t.direction {
                    TransferDirection::Send => "->",
                    TransferDirection::Receive => "<-",
                };
                println!(
                    "  {} {} {} '{}' {}/{}",
                    t.transfer_id,
                    arrow,
                    short_id(&t.peer_id),
                    t.file_name,
                    format_size(t.bytes_transferred),
                    format_size(t.file_size)
                );
            }
        }
        Command::WhoAmI => {
            let me = node.identity();
            println!("{} ({}) listening on {}:{}", me.nickname, me.peer_id, me.ip, me.port);
        }
        Command::Help => println!("{}", HELP),
        Command::Quit => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_broadcast() {
        assert_eq!(
            parse("hello there").unwrap(),
            Some(Command::SendAll("hello there".into()))
        );
        assert_eq!(parse("   ").unwrap(), None);
    }

    #[test]
    fn connect_needs_ip_and_port() {
        assert_eq!(
            parse("/connect 192.168.1.5 5000").unwrap(),
            Some(Command::Connect {
                ip: "192.168.1.5".parse().unwrap(),
                port: 5000
            })
        );
        assert!(parse("/connect 192.168.1.5").is_err());
        assert!(parse("/connect host 5000").is_err());
        assert!(parse("/connect 10.0.0.1 99999").is_err());
    }

    #[test]
    fn message_and_path_keep_spaces() {
        assert_eq!(
            parse("/send bob see you  soon").unwrap(),
            Some(Command::Send {
                peer: "bob".into(),
                text: "see you  soon".into()
            })
        );
        assert_eq!(
            parse("/file bob ~/My Documents/a.txt").unwrap(),
            Some(Command::File {
                peer: "bob".into(),
                path: PathBuf::from("~/My Documents/a.txt")
            })
        );
        assert!(parse("/send bob").is_err());
    }

    #[test]
    fn commands_are_case_insensitive() {
        assert_eq!(parse("/PEERS").unwrap(), Some(Command::Peers));
        assert_eq!(parse("/exit").unwrap(), Some(Command::Quit));
        assert!(parse("/frobnicate").is_err());
    }
}
