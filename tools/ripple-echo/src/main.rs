// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! ripple-echo - Watch the directory or echo a topic in real-time
//!
//! Without a topic, prints every directory snapshot. With a topic, follows the
//! directory and subscribes to every publisher declaring it.

use chrono::Local;
use clap::Parser;
use colored::*;
use ripple_directory::{
    ClientConfig, DirectorySnapshot, Observer, PublisherId, PublisherRecord, Subscriber,
};
use std::collections::HashMap;
use std::io::{self, IsTerminal, Write};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Watch the Ripple directory or echo one topic
#[derive(Parser, Debug)]
#[command(name = "ripple-echo")]
#[command(version = "0.1.0")]
#[command(about = "Print directory snapshots, or echo the messages of a topic")]
struct Args {
    /// Topic to echo (omit to print directory snapshots)
    topic: Option<String>,

    /// Directory server host
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Directory command port
    #[arg(short = 'p', long, default_value = "5555")]
    command_port: u16,

    /// Directory broadcast port
    #[arg(long, default_value = "5556")]
    broadcast_port: u16,

    /// Output one JSON object per line
    #[arg(long)]
    json: bool,

    /// Maximum number of messages or snapshots to print (0 = unlimited)
    #[arg(short = 'n', long, default_value = "0")]
    count: u64,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Quiet mode - only output data, no headers
    #[arg(short = 'q', long)]
    quiet: bool,
}

/// One data-plane message.
struct Echo {
    publisher: String,
    topic: String,
    message: String,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Handle color preference
    if args.no_color || !io::stdout().is_terminal() {
        colored::control::set_override(false);
    }

    let config = ClientConfig {
        command_port: args.command_port,
        broadcast_port: args.broadcast_port,
        ..ClientConfig::new(args.host.clone())
    };

    if let Err(e) = run(&args, config).await {
        eprintln!("{}: {}", "Error".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run(args: &Args, config: ClientConfig) -> Result<(), Box<dyn std::error::Error>> {
    if !args.quiet {
        print_header(args);
    }

    let (snapshot_tx, mut snapshots) = mpsc::unbounded_channel();
    let mut observer = Observer::new(config.clone(), move |s: &DirectorySnapshot| {
        let _ = snapshot_tx.send(s.clone());
    });
    observer.connect().await?;

    let (echo_tx, mut echoes) = mpsc::unbounded_channel();
    let mut subscriptions: HashMap<PublisherId, JoinHandle<()>> = HashMap::new();
    let mut printed = 0u64;

    loop {
        if args.count > 0 && printed >= args.count {
            break;
        }

        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            Some(snapshot) = snapshots.recv() => match &args.topic {
                None => {
                    printed += 1;
                    print_snapshot(&snapshot, args.json);
                }
                Some(topic) => {
                    follow(&snapshot, topic, &config, &echo_tx, &mut subscriptions, args.quiet);
                }
            },
            Some(echo) = echoes.recv() => {
                printed += 1;
                print_echo(&echo, args.json, printed);
            }
        }
        let _ = io::stdout().flush();
    }

    for (_, task) in subscriptions.drain() {
        task.abort();
    }
    observer.disconnect().await?;

    if !args.quiet {
        let what = if args.topic.is_some() { "message" } else { "snapshot" };
        eprintln!("\n{} Printed {} {}(s)", "---".dimmed(), printed, what);
    }
    Ok(())
}

/// Keep one subscription per publisher currently declaring `topic`.
fn follow(
    snapshot: &DirectorySnapshot,
    topic: &str,
    config: &ClientConfig,
    echo_tx: &mpsc::UnboundedSender<Echo>,
    subscriptions: &mut HashMap<PublisherId, JoinHandle<()>>,
    quiet: bool,
) {
    subscriptions.retain(|id, task| {
        let keep = snapshot.get(*id).is_some_and(|r| r.has_topic(topic)) && !task.is_finished();
        if !keep {
            task.abort();
        }
        keep
    });

    for record in snapshot.publishers_for_topic(topic) {
        let Some(id) = record.id else { continue };
        if subscriptions.contains_key(&id) {
            continue;
        }
        if !quiet {
            eprintln!(
                "{} {} '{}' at {}",
                "+++".green(),
                "Following".bold(),
                record.name.cyan(),
                record.address
            );
        }
        let task = tokio::spawn(echo_publisher(
            config.clone(),
            record.clone(),
            topic.to_string(),
            echo_tx.clone(),
        ));
        subscriptions.insert(id, task);
    }
}

async fn echo_publisher(
    config: ClientConfig,
    record: PublisherRecord,
    topic: String,
    echo_tx: mpsc::UnboundedSender<Echo>,
) {
    let mut subscriber = match Subscriber::connect(&config, &record, &[topic]).await {
        Ok(subscriber) => subscriber,
        Err(e) => {
            eprintln!("{}: {} ({})", "Warning".yellow(), e, record.address);
            return;
        }
    };

    while let Ok((topic, message)) = subscriber.recv().await {
        let echo = Echo {
            publisher: record.name.clone(),
            topic,
            message,
        };
        if echo_tx.send(echo).is_err() {
            break;
        }
    }
}

fn print_header(args: &Args) {
    let target = match &args.topic {
        Some(topic) => format!("topic {}", topic.cyan()),
        None => "directory".cyan().to_string(),
    };
    eprintln!(
        "{} {} {} (directory={}:{})",
        ">>>".green().bold(),
        "Watching".bold(),
        target,
        args.host,
        args.command_port
    );
    eprintln!("{}", "Press Ctrl+C to stop".dimmed());
    eprintln!();
}

fn timestamp() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S%.3f").to_string()
}

fn print_snapshot(snapshot: &DirectorySnapshot, json: bool) {
    if json {
        match serde_json::to_string(snapshot) {
            Ok(line) => println!("{}", line),
            Err(e) => eprintln!("{}: {}", "Warning".yellow(), e),
        }
        return;
    }

    println!(
        "{} {} ({} publishers)",
        format!("[{}]", timestamp()).dimmed(),
        format!("generation {}", snapshot.generation).yellow(),
        snapshot.len()
    );
    if snapshot.is_empty() {
        println!("  {}", "(empty)".dimmed());
    }
    for (id, record) in &snapshot.publishers {
        println!(
            "  {:>4}  {:<20} {:<28} {}",
            id.to_string().cyan(),
            record.name,
            record.address,
            record.topics.join(", ").green()
        );
    }
    println!();
}

fn print_echo(echo: &Echo, json: bool, seq: u64) {
    if json {
        let line = serde_json::json!({
            "seq": seq,
            "publisher": echo.publisher,
            "topic": echo.topic,
            "message": echo.message,
        });
        println!("{}", line);
        return;
    }

    println!(
        "{} {} {}/{}: {}",
        format!("[{}]", timestamp()).dimmed(),
        format!("#{}", seq).yellow(),
        echo.publisher.cyan(),
        echo.topic,
        echo.message.green()
    );
}
