//! The interactive REPL loop: prompt, read a line, parse it against the
//! command tree, act on the outcome.

use std::time::Instant;

use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use crate::command::{parse, tokenize, CommandTable, Outcome};

/// The root prompt and the prefix used for nested contexts.
pub struct ReplConfig {
    pub root_prompt: String,
    pub context_prefix: String,
}

impl Default for ReplConfig {
    fn default() -> Self {
        Self {
            root_prompt: "radmin> ".to_string(),
            context_prefix: "... ".to_string(),
        }
    }
}

fn prompt_for(config: &ReplConfig, path: &[String]) -> String {
    match path.last() {
        None => config.root_prompt.clone(),
        Some(last) => format!("{}{}> ", config.context_prefix, last),
    }
}

/// Run the REPL to completion. Returns once the operator exits from the
/// root context or input is closed (EOF / Ctrl-D).
pub fn run_repl(table: &CommandTable, config: &ReplConfig) -> rustyline::Result<()> {
    let start = Instant::now();
    let mut editor = DefaultEditor::new()?;
    // stack[0] is always the root context ([]); entering a partial pushes
    // a new frame, `exit` pops back to whatever was there before -- even
    // when the partial descended several levels in a single line.
    let mut stack: Vec<Vec<String>> = vec![Vec::new()];

    loop {
        let current = stack.last().expect("root frame is never popped").clone();
        let prompt = prompt_for(config, &current);
        let line = match editor.readline(&prompt) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => return Ok(()),
            Err(e) => return Err(e),
        };

        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let _ = editor.add_history_entry(trimmed);

        let tokens = tokenize(trimmed);
        match tokens[0].as_str() {
            "exit" => {
                if stack.len() > 1 {
                    stack.pop();
                } else {
                    return Ok(());
                }
                continue;
            }
            "uptime" => {
                println!("{}s", start.elapsed().as_secs());
                continue;
            }
            "help" => {
                print_help(table, &current, &tokens[1..]);
                continue;
            }
            _ => {}
        }

        match parse(table, &current, &tokens) {
            Some(Outcome::Runnable { output }) => println!("{output}"),
            Some(Outcome::Partial { path }) => stack.push(path),
            Some(Outcome::ParseError(msg)) => eprintln!("error: {msg}"),
            None => eprintln!("error: current context no longer exists"),
        }
    }
}

fn print_help(table: &CommandTable, current: &[String], args: &[String]) {
    let path: Vec<String> = current.iter().chain(args.iter()).cloned().collect();
    match table.table_at(&path) {
        Some(node) => {
            for (name, help) in node.listing() {
                if help.is_empty() {
                    println!("{name}");
                } else {
                    println!("{name} - {help}");
                }
            }
        }
        None => eprintln!("error: no such context"),
    }
}
