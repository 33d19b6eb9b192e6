//! Terminal chat loop.

use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::models::Role;
use crate::pipeline::RagPipeline;
use crate::session::ChatSession;

const SCREEN_WIDTH: usize = 80;
/// Bubbles take at most this share of the screen, like the web page.
const BUBBLE_WIDTH: usize = SCREEN_WIDTH * 65 / 100;

const USER_STYLE: &str = "\x1b[30;104m";
const ASSISTANT_STYLE: &str = "\x1b[30;47m";
const RESET: &str = "\x1b[0m";

/// Render one message as a wrapped bubble: user messages flush right,
/// assistant messages flush left.
pub fn render_bubble(role: Role, text: &str, styled: bool) -> String {
    let inner = BUBBLE_WIDTH - 2;
    let lines: Vec<String> = text
        .lines()
        .flat_map(|line| {
            if line.trim().is_empty() {
                vec![String::new()]
            } else {
                textwrap::wrap(line, inner)
                    .into_iter()
                    .map(|l| l.into_owned())
                    .collect()
            }
        })
        .collect();
    let width = lines
        .iter()
        .map(|l| l.chars().count())
        .max()
        .unwrap_or(0);

    let (indent, style) = match role {
        Role::User => (SCREEN_WIDTH.saturating_sub(width + 2), USER_STYLE),
        Role::Assistant => (0, ASSISTANT_STYLE),
    };

    let mut out = String::new();
    for line in &lines {
        let padded = format!(" {line:<width$} ");
        out.push_str(&" ".repeat(indent));
        if styled {
            out.push_str(style);
            out.push_str(&padded);
            out.push_str(RESET);
        } else {
            out.push_str(&padded);
        }
        out.push('\n');
    }
    out
}

/// Read questions from stdin until EOF or `/quit`.
pub async fn run_interactive(pipeline: RagPipeline) -> anyhow::Result<()> {
    let mut session = ChatSession::new(pipeline.settings().history_turns);
    let mut stdout = std::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("RAG Chat Demo. Type /history to see the context window, /quit to leave.\n");

    loop {
        print!("\x1b[1;34mYour question:\x1b[0m ");
        stdout.flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        match input {
            "/quit" | "/exit" | "/q" => break,
            "/history" => {
                let history = session.history();
                println!("Context window: {}/{} turns", history.len(), history.capacity());
                if history.is_empty() {
                    println!("(no turns yet)\n");
                }
                for (i, turn) in history.iter().enumerate() {
                    println!("{}. Q: {}\n   A: {}\n", i + 1, turn.question, turn.answer);
                }
                continue;
            }
            _ => {}
        }

        print!("{}", render_bubble(Role::User, input, true));
        println!("Generating answer...");
        let outcome = session.ask(&pipeline, input).await;
        print!("{}", render_bubble(Role::Assistant, &outcome.answer, true));
        if !outcome.chunks.is_empty() {
            let titles: Vec<String> = outcome
                .chunks
                .iter()
                .map(|c| format!("{} ({})", c.title, c.confidence))
                .collect();
            println!("  sources: {}", titles.join(", "));
        }
        println!();
    }

    println!("Goodbye!");
    Ok(())
}
