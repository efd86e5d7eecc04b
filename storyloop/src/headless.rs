//! Headless mode: the story over a line-oriented text protocol.
//!
//! The session runs inside a worker task; this module only turns input
//! lines into worker requests and prints the views that come back.

use std::io::{self, Write};
use storyloop_core::transcript::render_lines;
use storyloop_core::{
    spawn_session, EntryKind, Phase, SessionView, StorySession, WorkerRequest, WorkerResponse,
    INSULT_CHOICE,
};
use tokio::io::{AsyncBufReadExt, BufReader};

/// What one input line asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Input {
    Request(WorkerRequest),
    Stats,
    Export(Option<String>),
    Help,
    Quit,
    Invalid(String),
}

/// Interpret a line against the choices currently on offer.
///
/// A number picks that choice, `#` starts a command, and anything else is
/// sent as a free-form choice.
fn parse_input(line: &str, choices: &[String]) -> Input {
    if let Some(command) = line.strip_prefix('#') {
        let mut parts = command.split_whitespace();
        return match parts.next() {
            Some("begin") => Input::Request(WorkerRequest::Begin),
            Some("retry") => Input::Request(WorkerRequest::Retry),
            Some("resume") => Input::Request(WorkerRequest::Resume),
            Some("insult") => Input::Request(WorkerRequest::Pick(INSULT_CHOICE.to_string())),
            Some("clear") => Input::Request(WorkerRequest::ClearSaved),
            Some("stats") => Input::Stats,
            Some("export") => Input::Export(parts.next().map(str::to_string)),
            Some("help") => Input::Help,
            Some("quit") | Some("exit") => Input::Quit,
            _ => Input::Invalid("Unknown command. Type #help for help.".to_string()),
        };
    }

    match line.parse::<usize>() {
        Ok(n) if (1..=choices.len()).contains(&n) => {
            Input::Request(WorkerRequest::Pick(choices[n - 1].clone()))
        }
        Ok(n) => Input::Invalid(format!("No choice number {n}.")),
        Err(_) => Input::Request(WorkerRequest::Pick(line.to_string())),
    }
}

/// Prints transcript entries as they appear.
#[derive(Default)]
struct Printer {
    first_id: Option<u64>,
    printed: usize,
}

impl Printer {
    fn reset(&mut self) {
        self.first_id = None;
        self.printed = 0;
    }

    fn show(&mut self, view: &SessionView) {
        // A restart replaces the transcript; print it from the top.
        let first_id = view.transcript.first().map(|entry| entry.id);
        if first_id != self.first_id || view.transcript.len() < self.printed {
            if self.printed > 0 {
                println!("[NEW STORY]");
            }
            self.first_id = first_id;
            self.printed = 0;
        }
        for entry in &view.transcript[self.printed..] {
            match entry.kind {
                EntryKind::Narration => {
                    println!("[NARRATOR]");
                    println!("{}", entry.text);
                    println!();
                }
                EntryKind::Choice => println!("> {}", entry.text),
            }
        }
        self.printed = view.transcript.len();

        match view.phase {
            Phase::Ready => {
                println!("[CHOICES]");
                for (i, choice) in view.choices.iter().enumerate() {
                    println!("  {}. {choice}", i + 1);
                }
            }
            Phase::Failed => {
                let message = view.last_error.as_deref().unwrap_or("The story stopped.");
                println!("[ERROR] {message}");
                println!("Type #retry to start again or #resume to return to the last save.");
            }
            Phase::Start => println!("Type #begin to start a story."),
            Phase::Working => {}
        }
    }
}

fn print_help() {
    println!("[HELP]");
    println!("  <number>        - Pick that choice");
    println!("  <text>          - Do something else entirely");
    println!("  #begin          - Start a new story");
    println!("  #retry          - Try again after an error");
    println!("  #resume         - Return to the saved session");
    println!("  #insult         - Tell the narrator what you think of them");
    println!("  #clear          - Delete the saved session");
    println!("  #stats          - Count narration and choices");
    println!("  #export [path]  - Print the transcript or write it to a file");
    println!("  #quit           - Exit");
}

/// Run a session over stdin/stdout until `#quit` or end of input.
pub async fn run_headless(session: StorySession, offline: bool) -> anyhow::Result<()> {
    let preview = session.saved_preview().cloned();
    let mut handle = spawn_session(session);
    let mut printer = Printer::default();

    println!("=== Storyloop ===");
    if offline {
        println!("No API key configured: the offline narrator is telling this one.");
    }
    if let Some(saved) = &preview {
        let stats = storyloop_core::Transcript::from_entries(saved.transcript.clone()).stats();
        println!(
            "[SAVED] {} narration, {} choices, saved {}. Type #resume to continue.",
            stats.narration,
            stats.choices,
            saved.saved_at.format("%Y-%m-%d %H:%M UTC")
        );
    }
    println!("Type #begin to start a story, #help for commands.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let view = handle.view();
        let request = match parse_input(line, &view.choices) {
            Input::Request(request) => request,
            Input::Stats => {
                println!(
                    "[STATS] {} narration, {} choices, {} entries",
                    view.stats.narration,
                    view.stats.choices,
                    view.stats.total()
                );
                continue;
            }
            Input::Export(None) => {
                println!("{}", render_lines(&view.transcript));
                continue;
            }
            Input::Export(Some(path)) => {
                match tokio::fs::write(&path, render_lines(&view.transcript)).await {
                    Ok(()) => println!("[EXPORTED] Transcript written to {path}"),
                    Err(e) => println!("[ERROR] Export failed: {e}"),
                }
                continue;
            }
            Input::Help => {
                print_help();
                continue;
            }
            Input::Quit => {
                println!("Goodbye!");
                break;
            }
            Input::Invalid(message) => {
                println!("[ERROR] {message}");
                continue;
            }
        };

        let resuming = request == WorkerRequest::Resume;
        let clearing = request == WorkerRequest::ClearSaved;
        print!("[WORKING]");
        io::stdout().flush().ok();

        let Some(response) = handle.request(request).await else {
            break;
        };
        print!("\r         \r");
        io::stdout().flush().ok();

        match response {
            WorkerResponse::Settled(_) if clearing => println!("[CLEARED] Saved session deleted."),
            WorkerResponse::Settled(view) => {
                if resuming {
                    printer.reset();
                    println!("[RESUMED]");
                }
                printer.show(&view);
            }
            WorkerResponse::NothingToResume(_) => println!("[ERROR] There is no saved session."),
            WorkerResponse::Rejected(reason) => println!("[ERROR] {reason}"),
        }
    }

    handle.shutdown().await;
    Ok(())
}
