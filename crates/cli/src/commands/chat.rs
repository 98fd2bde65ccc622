//! `keepsake chat` — Interactive or single-message chat mode.

use keepsake_agent::Coordinator;
use keepsake_config::AppConfig;
use keepsake_core::agent::Reply;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;

use super::memory::{print_snapshot, print_stats};
use super::teach::print_procedure;

/// What a line typed at the prompt asks for.
#[derive(Debug, PartialEq, Eq)]
enum Input<'a> {
    Empty,
    Exit,
    Help,
    Memory,
    Stats,
    Recall(&'a str),
    Message(&'a str),
}

fn classify(line: &str) -> Input<'_> {
    let line = line.trim();
    match line.to_ascii_lowercase().as_str() {
        "" => Input::Empty,
        "exit" | "quit" | "bye" => Input::Exit,
        "help" => Input::Help,
        "memory" => Input::Memory,
        "stats" => Input::Stats,
        _ => match line.split_once(char::is_whitespace) {
            Some((cmd, name)) if cmd.eq_ignore_ascii_case("recall") && !name.trim().is_empty() => {
                Input::Recall(name.trim())
            }
            _ => Input::Message(line),
        },
    }
}

pub async fn run(config: &AppConfig, message: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let (mut coordinator, generator) = super::open_session(config).await?;

    if !generator.health_check().await.unwrap_or(false) {
        warn!(backend = generator.name(), host = %config.backend.host(), "Backend is not reachable");
        eprintln!(
            "  [Warning] {} backend not reachable at {}. Replies will fail until it is running.",
            generator.name(),
            config.backend.host()
        );
    }

    if let Some(msg) = message {
        answer_once(coordinator, &msg).await?;
        return Ok(());
    }

    let name = coordinator.persona().name.clone();
    println!();
    println!("  keepsake — {name}");
    println!("  Backend:  {} ({})", generator.name(), config.backend.host());
    println!("  Memory:   {}", config.memory.db_path().display());
    println!();
    println!("  Type 'help' for commands, 'exit' to quit.");
    println!();
    println!("  {name} > {}", coordinator.greeting().await);
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };

        match classify(&line) {
            Input::Empty => continue,
            Input::Exit => break,
            Input::Help => print_help(),
            Input::Memory => print_snapshot(&coordinator.export_memory().await?)?,
            Input::Stats => print_stats(&coordinator.stats().await),
            Input::Recall(proc_name) => match coordinator.recall_procedure(proc_name).await? {
                Some(recall) => print_procedure(&recall),
                None => println!("  I don't know how to {proc_name} yet."),
            },
            Input::Message(text) => {
                eprint!("  ...");
                let outcome = coordinator.chat(text).await;
                eprint!("\r     \r");
                match outcome {
                    Ok(reply) => print_reply(&coordinator, &reply),
                    Err(e) => eprintln!("  [Error] {e}"),
                }
            }
        }
        println!();
    }

    println!();
    println!("  Bye! See you next time.");
    println!();
    coordinator.shutdown().await;
    Ok(())
}

/// Answer a single message, then shut down whether or not the turn succeeded.
async fn answer_once(mut coordinator: Coordinator, message: &str) -> keepsake_core::Result<Reply> {
    let outcome = coordinator.chat(message).await;
    if let Ok(reply) = &outcome {
        print_reply(&coordinator, reply);
    }
    coordinator.shutdown().await;
    outcome
}

fn print_reply(coordinator: &Coordinator, reply: &Reply) {
    let name = &coordinator.persona().name;
    for line in reply.text.lines() {
        println!("  {name} > {line}");
    }
}

fn print_help() {
    println!("  Commands:");
    println!("    memory         show everything I remember (JSON)");
    println!("    stats          show memory counters");
    println!("    recall <name>  show the steps of a procedure");
    println!("    help           show this help");
    println!("    exit           quit (also: quit, bye)");
}
