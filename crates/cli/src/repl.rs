//! Interactive session
//!
//! Every line is read and evaluated against one long-lived root, so the
//! arena fills up over a session; `:stats` shows how far, `:reset` starts
//! over with a fresh root. A line that leaves a bracket or string open
//! keeps reading on the next line; nothing is read into the arena until the
//! entry is balanced.

use plisp_runtime::reader::MSG_END_OF_INPUT;
use plisp_runtime::{LispError, Root, RuntimeConfig, stdout_output};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::path::PathBuf;
use tracing::debug;

const PROMPT: &str = "plisp> ";
const CONTINUE_PROMPT: &str = "  ...> ";

/// True while `text` has an unclosed bracket or string
fn is_incomplete(text: &str) -> bool {
    let mut depth = 0i64;
    let mut in_string = false;
    for b in text.bytes() {
        match (in_string, b) {
            (true, b'"') => in_string = false,
            (true, _) => {}
            (false, b'"') => in_string = true,
            (false, b'(' | b'{') => depth += 1,
            (false, b')' | b'}') => depth -= 1,
            _ => {}
        }
    }
    in_string || depth > 0
}

fn history_file() -> Option<PathBuf> {
    home::home_dir().map(|d| d.join(".local/share/plisp_history"))
}

fn new_root(config: &RuntimeConfig) -> Result<Root, String> {
    Root::with_config(config.clone(), stdout_output()).map_err(|e| e.to_string())
}

pub fn run(config: RuntimeConfig, print_frame: bool) -> Result<(), String> {
    let mut rl =
        DefaultEditor::new().map_err(|e| format!("Error initializing readline: {}", e))?;
    let history = history_file();
    if let Some(ref path) = history {
        let _ = rl.load_history(path);
    }

    let mut root = new_root(&config)?;
    println!(
        "plisp {}. Type :help for commands, :quit to exit.",
        env!("CARGO_PKG_VERSION")
    );

    let mut pending = String::new();
    loop {
        let prompt = if pending.is_empty() {
            PROMPT
        } else {
            CONTINUE_PROMPT
        };
        match rl.readline(prompt) {
            Ok(line) => {
                if pending.is_empty() {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    let _ = rl.add_history_entry(trimmed);
                    match trimmed {
                        ":quit" | ":q" => break,
                        ":help" => {
                            print_help();
                            continue;
                        }
                        ":stats" => {
                            let stats = root.stats();
                            println!(
                                "cells: {} live, {} free, {} capacity (high water {})",
                                stats.live, stats.free, stats.capacity, stats.high_water
                            );
                            continue;
                        }
                        ":frame" => {
                            println!("{}", root.print(root.frame()));
                            continue;
                        }
                        ":reset" => {
                            root = new_root(&config)?;
                            println!("Root reset.");
                            continue;
                        }
                        _ => {}
                    }
                } else {
                    let _ = rl.add_history_entry(line.trim());
                }

                pending.push_str(&line);
                pending.push('\n');
                if is_incomplete(&pending) {
                    continue;
                }
                match root.run(&pending) {
                    Ok(value) => {
                        println!("{}", root.print(value));
                        if print_frame {
                            println!("{}", root.print(root.frame()));
                        }
                    }
                    Err(LispError::Parse { ref message, .. }) if message == MSG_END_OF_INPUT => {
                        continue;
                    }
                    Err(e) => {
                        eprintln!("Error: {}", e);
                        if let Some(value) = e.error_value() {
                            debug!(error = %root.print(value), "error value");
                        }
                    }
                }
                pending.clear();
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                pending.clear();
            }
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                eprintln!("Error: {:?}", err);
                break;
            }
        }
    }

    if let Some(ref path) = history {
        let _ = rl.save_history(path);
    }
    let stats = root.free();
    debug!(live = stats.live, high_water = stats.high_water, "session ended");
    Ok(())
}

fn print_help() {
    println!(
        r#"
Enter terms to evaluate them, e.g. (println (add 1 2))

Commands:
  :stats   arena usage
  :frame   print the root frame
  :reset   start over with a fresh root
  :help    this message
  :quit    exit (also :q or Ctrl-D)
"#
    );
}
