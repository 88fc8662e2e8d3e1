//! Command-line interface and REPL

use anyhow::Result;
use colored::*;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::collections::HashMap;
use tokio::runtime::Handle;

use crate::session::{InstanceStatus, SessionController};

/// One parsed REPL line
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// `send <path> [arguments...]`
    Send { path: String, arguments: String },
    /// `action <id> [key=value...] <value>`
    Action {
        id: String,
        params: HashMap<String, String>,
        value: String,
    },
    /// `get <path>`
    Get { path: String },
    Status,
    /// `vars [prefix]`
    Vars { prefix: Option<String> },
    Help,
    Quit,
    Empty,
}

pub fn parse_command(line: &str) -> std::result::Result<Command, String> {
    let line = line.trim();
    let (head, rest) = match line.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (line, ""),
    };

    match head {
        "" => Ok(Command::Empty),
        "send" => {
            let (path, arguments) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
            if path.is_empty() {
                return Err("usage: send <path> [arguments...]".into());
            }
            Ok(Command::Send {
                path: path.to_string(),
                arguments: arguments.trim().to_string(),
            })
        },
        "action" => {
            let mut tokens = rest.split_whitespace();
            let id = tokens
                .next()
                .ok_or("usage: action <id> [key=value...] <value>")?
                .to_string();
            let mut params = HashMap::new();
            let mut value = Vec::new();
            for token in tokens {
                match token.split_once('=') {
                    Some((key, v)) if value.is_empty() => {
                        params.insert(key.to_string(), v.to_string());
                    },
                    _ => value.push(token),
                }
            }
            Ok(Command::Action {
                id,
                params,
                value: value.join(" "),
            })
        },
        "get" if !rest.is_empty() => Ok(Command::Get {
            path: rest.to_string(),
        }),
        "get" => Err("usage: get <path>".into()),
        "status" => Ok(Command::Status),
        "vars" => Ok(Command::Vars {
            prefix: (!rest.is_empty()).then(|| rest.to_string()),
        }),
        "help" | "?" => Ok(Command::Help),
        "quit" | "exit" => Ok(Command::Quit),
        other => Err(format!("unknown command '{}', try 'help'", other)),
    }
}

/// Interactive console; blocks the calling task until `quit` or EOF
pub async fn run_repl(controller: SessionController) -> Result<()> {
    let handle = Handle::current();
    tokio::task::spawn_blocking(move || repl_loop(&controller, &handle)).await?
}

fn repl_loop(controller: &SessionController, handle: &Handle) -> Result<()> {
    let mut rl = DefaultEditor::new()?;
    println!("{}", "OSC console gateway - type 'help' for commands".bold().cyan());

    loop {
        let line = match rl.readline("osc> ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        };
        if !line.trim().is_empty() {
            let _ = rl.add_history_entry(line.as_str());
        }

        match parse_command(&line) {
            Ok(Command::Quit) => break,
            Ok(command) => handle.block_on(execute(controller, command)),
            Err(e) => println!("{}", e.red()),
        }
    }

    Ok(())
}

async fn execute(controller: &SessionController, command: Command) {
    match command {
        Command::Send { path, arguments } => match controller.send_text(&path, &arguments).await {
            Ok(()) => println!("{} {} {}", "→".green(), path, arguments),
            Err(e) => println!("{}", e.to_string().red()),
        },
        Command::Action { id, params, value } => {
            match controller.execute_action(&id, &params, &value).await {
                Ok(sent) => {
                    for message in sent {
                        println!("{} {}", "→".green(), message);
                    }
                },
                Err(e) => println!("{}", e.to_string().red()),
            }
        },
        Command::Get { path } => match controller.lookup(&path) {
            Some(args) => {
                let text: Vec<String> = args.iter().map(|a| a.to_string()).collect();
                println!("{} {}", path.cyan(), text.join(" "));
            },
            None => println!("{}", "(nothing received)".dimmed()),
        },
        Command::Status => {
            let status = controller.status();
            let label = match &status {
                InstanceStatus::Ok => status.to_string().green(),
                InstanceStatus::Connecting => status.to_string().yellow(),
                _ => status.to_string().red(),
            };
            println!("  Status:  {}", label);
            if let Some(conn) = controller.connection_config() {
                println!("  Host:    {}:{} ({})", conn.host, conn.target_port, conn.protocol);
            }
            if let Some(target) = controller.target() {
                println!("  Target:  {}", target);
            }
            if let Some(state) = controller.connection_state() {
                println!("  Link:    {}", state);
            }
            println!("  Sockets: {}", controller.live_sockets());
            println!("  Cached:  {} path(s)", controller.cache().len());
        },
        Command::Vars { prefix } => {
            let snapshot = controller.variables().snapshot();
            let mut shown = 0;
            for (id, value) in snapshot
                .iter()
                .filter(|(id, _)| prefix.as_deref().map_or(true, |p| id.starts_with(p)))
            {
                println!("  {} = {}", id.yellow(), value);
                shown += 1;
            }
            if shown == 0 {
                println!("{}", "(no variables)".dimmed());
            }
        },
        Command::Help => print_help(),
        Command::Quit | Command::Empty => {},
    }
}

fn print_help() {
    println!("\n{}", "Commands:".bold());
    println!("  {} <path> [args...]            send one OSC message", "send".cyan());
    println!("  {} <id> [key=value...] <value>  run a table action", "action".cyan());
    println!("  {} <path>                       last arguments received", "get".cyan());
    println!("  {}                             session status", "status".cyan());
    println!("  {} [prefix]                      channel variables", "vars".cyan());
    println!("  {}                               leave", "quit".cyan());
    println!();
}
