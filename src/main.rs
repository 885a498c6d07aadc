//! Command-line front-end for live voice-bridge translation sessions.

use std::path::PathBuf;
use std::sync::mpsc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;

use voicebridge::languages::{all_languages, language_name};
use voicebridge::{load_config, Role, SessionOptions, Status, VoiceSession};

#[derive(Parser)]
#[command(name = "voicebridge", about = "Live voice translation over the Gemini Live API")]
struct Cli {
    /// Source language code (ISO 639-1), e.g. "en"
    #[arg(short, long)]
    source: Option<String>,

    /// Target language code (ISO 639-1), e.g. "es"
    #[arg(short, long)]
    target: Option<String>,

    /// Synthesized voice for the translation
    #[arg(long)]
    voice: Option<String>,

    /// Record model audio to a WAV file in this directory
    #[arg(long)]
    record: Option<PathBuf>,

    /// List supported language codes and exit
    #[arg(long)]
    list_languages: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.list_languages {
        for (code, name) in all_languages() {
            println!("{}  {}", code, name);
        }
        return Ok(());
    }

    let config = load_config();
    let mut options = SessionOptions::from_config(&config);
    if let Some(source) = cli.source {
        options.source_lang = source;
    }
    if let Some(target) = cli.target {
        options.target_lang = target;
    }
    if let Some(voice) = cli.voice {
        options.voice_name = voice;
    }
    options.record_dir = cli.record;

    let source_name = language_name(&options.source_lang).ok_or_else(|| {
        anyhow::anyhow!(
            "Unknown language code '{}' (see --list-languages)",
            options.source_lang
        )
    })?;
    let target_name = language_name(&options.target_lang).ok_or_else(|| {
        anyhow::anyhow!(
            "Unknown language code '{}' (see --list-languages)",
            options.target_lang
        )
    })?;

    println!("[VoiceBridge] Translating {} -> {}", source_name, target_name);

    let mut session = VoiceSession::new(options);
    session.start()?;
    println!("[VoiceBridge] Session live. Speak into the microphone; press Enter to stop.");

    // Enter on stdin signals stop without blocking the poll loop.
    let (stdin_tx, stdin_rx) = mpsc::channel();
    std::thread::spawn(move || {
        let mut line = String::new();
        let _ = std::io::stdin().read_line(&mut line);
        let _ = stdin_tx.send(());
    });

    let mut printed_turns = 0;
    let mut last_status = Status::Idle;
    loop {
        if stdin_rx.try_recv().is_ok() {
            break;
        }
        if !session.is_running() {
            break;
        }

        let status = session.status();
        if status != last_status {
            println!("[Status] {:?}", status);
            last_status = status;
        }

        let transcript = session.transcript();
        for turn in &transcript[printed_turns.min(transcript.len())..] {
            match turn.role {
                Role::User => println!("You:   {}", turn.text),
                Role::Model => println!("Model: {}", turn.text),
            }
        }
        printed_turns = transcript.len();

        std::thread::sleep(Duration::from_millis(200));
    }

    session.stop();
    if let Some(error) = session.take_error() {
        anyhow::bail!(error);
    }
    println!("[VoiceBridge] Session ended.");
    Ok(())
}
