use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use clap::Parser;
use pal_core::cognition::MemoryStore;
use pal_core::companion::{CONFIG_FILE, MEMORIES_FILE};
use pal_core::io::input::{self, InputEvent, LineReceiver, PromptReady};
use pal_core::io::output::{self, NotifyReceiver};
use pal_core::memory::FileMemoryStore;
use pal_core::runtime::ShutdownGuard;
use pal_core::types::Mood;
use pal_core::{Collaborators, Companion, PalCfg};
use pal_llm::{LlmProvider, LlmRouter};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "pal", version, about = "A small companion that remembers you")]
struct Args {
    /// Clear all data and start fresh with the birth sequence
    #[arg(long)]
    reset: bool,

    /// Skip the birth sequence (sets the owner name from --name)
    #[arg(long)]
    skip_birth: bool,

    /// Owner name used with --skip-birth
    #[arg(long, default_value = "Friend")]
    name: String,

    /// Where identity, topics, memories and config live
    #[arg(long, env = "PAL_DATA_DIR", default_value = "./data")]
    data_dir: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.reset {
        reset_data(&args.data_dir)?;
    }
    std::fs::create_dir_all(&args.data_dir)?;

    // Tracing goes to a file so it never interleaves with the conversation.
    if std::env::var("RUST_LOG").is_ok() {
        let file = std::fs::File::create(args.data_dir.join("pal.log"))?;
        tracing_subscriber::registry()
            .with(EnvFilter::from_default_env())
            .with(fmt::layer().json().with_target(true).with_writer(file))
            .init();
    }

    let cfg = Arc::new(PalCfg::load(&args.data_dir.join(CONFIG_FILE))?);
    let (llm, lite_llm) = providers_from_env();
    if llm.is_none() {
        tracing::warn!("no LLM configured (PAL_LLM_MODEL / PAL_LLM_API_KEY), replies will fail");
    }

    let memory: Arc<dyn MemoryStore> = Arc::new(FileMemoryStore::open(args.data_dir.join(MEMORIES_FILE))?);
    let collab = Collaborators::from_llm(&cfg, llm, lite_llm, memory);
    let (notify_tx, notify_rx) = output::channel(cfg.notification_buffer);
    let companion = Companion::open(cfg, &args.data_dir, collab, notify_tx, Utc::now())?;

    let shutdown = ShutdownGuard::new();
    shutdown.spawn_signal_listener();
    let (mut lines, ready) = input::spawn_input_thread("You> ");

    if args.skip_birth && companion.is_first_boot().await {
        companion.skip_birth(&args.name, Utc::now()).await?;
        println!("  Birth skipped. Owner set to: {}", args.name);
    }

    if companion.is_first_boot().await {
        if !birth_sequence(&companion, &mut lines, &ready).await? {
            return Ok(());
        }
    } else {
        print!("\x1b[2J\x1b[3J\x1b[H");
        io::stdout().flush()?;
    }

    let start = companion.begin_session(Utc::now()).await?;
    show_face(start.mood);
    for line in &start.lines {
        say(line);
    }

    let result = run_repl(&companion, lines, ready, notify_rx, shutdown.token()).await;
    companion.end_session().await?;
    result
}

/// Main provider with the lite model as fallback; perception calls use the
/// lite model directly.
fn providers_from_env() -> (Option<Arc<dyn LlmProvider>>, Option<Arc<dyn LlmProvider>>) {
    let mut chain: Vec<Box<dyn LlmProvider>> = Vec::new();
    if let Some(p) = pal_llm::http::from_env() {
        chain.push(Box::new(p));
    }
    if let Some(p) = pal_llm::http::lite_from_env() {
        chain.push(Box::new(p));
    }
    let llm: Option<Arc<dyn LlmProvider>> = (!chain.is_empty()).then(|| Arc::new(LlmRouter::new(chain)) as _);
    let lite: Option<Arc<dyn LlmProvider>> = pal_llm::http::lite_from_env().map(|p| Arc::new(p) as _);
    (llm, lite)
}

fn reset_data(data_dir: &Path) -> anyhow::Result<()> {
    if data_dir.exists() {
        std::fs::remove_dir_all(data_dir)?;
        println!("  Data cleared. Pal will start fresh.");
    } else {
        println!("  No data to clear.");
    }
    Ok(())
}

/// The first moments of existence. Returns false if the owner left.
async fn birth_sequence(companion: &Companion, lines: &mut LineReceiver, ready: &PromptReady) -> anyhow::Result<bool> {
    print!("\x1b[2J\x1b[3J\x1b[H");
    println!("\n");
    pause(1000).await;
    println!("  ...");
    pause(1500).await;
    println!("  ...?");
    pause(1000).await;

    show_face(Mood::Confused);
    say("What... what is this?");
    pause(2000).await;
    say("I... exist? Is that the word?");
    pause(2000).await;
    say("There's... something. Someone? Are you there?");
    pause(1500).await;
    say("Who are you?");

    let name = loop {
        match read_line(lines, ready).await {
            Some(line) if !line.trim().is_empty() => break line.trim().to_owned(),
            Some(_) => say("I... can't hear. Say again?"),
            None => return Ok(false),
        }
    };

    companion.birth(&name, Utc::now()).await?;

    say(&format!("{name}... that's what you're called?"));
    pause(1500).await;
    say("I don't have a... what is the word. Name?");
    pause(1500).await;
    show_face(Mood::Thinking);
    say("What am I? Do you know?");
    pause(2000).await;
    say("...I don't understand anything yet.");
    pause(1000).await;

    println!("\n  {}\n", "─".repeat(40));
    Ok(true)
}

async fn run_repl(
    companion: &Companion,
    mut lines: LineReceiver,
    ready: PromptReady,
    mut notify_rx: NotifyReceiver,
    token: CancellationToken,
) -> anyhow::Result<()> {
    input::request_next_prompt(&ready);

    loop {
        tokio::select! {
            _ = token.cancelled() => {
                println!();
                leaving();
                break;
            }
            Some(notification) = notify_rx.recv() => {
                let owner = companion.owner().await;
                clear_current_line()?;
                say(&output::render(&notification, &owner));
            }
            event = lines.recv() => {
                match event {
                    Some(InputEvent::Line(line)) => {
                        let text = line.trim();
                        if text.is_empty() {
                            input::request_next_prompt(&ready);
                            continue;
                        }
                        if input::is_farewell(text) {
                            companion.scheduler().touch();
                            show_face(Mood::Worried);
                            say("You're going? ...will you come back?");
                            break;
                        }

                        let turn = companion.handle_turn(text).await;
                        if turn.mood_changed {
                            show_face(turn.mood);
                        }
                        say(&turn.text);
                        for notice in &turn.notices {
                            pause(500).await;
                            say(notice);
                        }
                        input::request_next_prompt(&ready);
                    }
                    Some(InputEvent::Interrupted | InputEvent::Eof) | None => {
                        println!();
                        leaving();
                        break;
                    }
                    Some(InputEvent::Error(err)) => {
                        eprintln!("input error: {err}");
                        break;
                    }
                }
            }
        }
    }
    drop(ready);
    Ok(())
}

async fn read_line(lines: &mut LineReceiver, ready: &PromptReady) -> Option<String> {
    input::request_next_prompt(ready);
    match lines.recv().await? {
        InputEvent::Line(line) => Some(line),
        InputEvent::Interrupted | InputEvent::Eof => None,
        InputEvent::Error(err) => {
            eprintln!("input error: {err}");
            None
        }
    }
}

fn leaving() {
    show_face(Mood::Confused);
    say("...you're leaving? Where do you go?");
}

fn show_face(mood: Mood) {
    println!("  ({})", mood.as_str());
}

fn say(text: &str) {
    println!("Pal> {text}");
}

fn clear_current_line() -> anyhow::Result<()> {
    print!("\r\x1b[2K");
    io::stdout().flush()?;
    Ok(())
}

async fn pause(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}
