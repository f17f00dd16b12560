use std::io::Write;

use pagekv::storage::kv_store::KvStore;
use rustyline::{DefaultEditor, error::ReadlineError};
use tracing::error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_DB_PATH: &str = "pagekv.db";
const HISTORY_FILE: &str = ".pagekv_history";

fn read_multiline_command(rl: &mut DefaultEditor) -> rustyline::Result<String> {
    let mut input = String::new();
    let mut prompt = "pagekv> ".to_string();

    loop {
        let line = rl.readline(&prompt)?;
        let trimmed_line = line.trim_end();

        // Trailing backslash continues the command on the next line
        if let Some(continued) = trimmed_line.strip_suffix('\\') {
            input.push_str(continued);
            input.push(' ');
            prompt = "     -> ".to_string();
        } else {
            input.push_str(trimmed_line);
            break;
        }
    }

    Ok(input)
}

fn print_help() {
    println!(
        r#"
Available commands:
  put <key> <value>  - Insert a key or replace its value
  get <key>          - Look up a key
  stats              - Verify the tree and show its shape
  info               - Show file and commit information
  help, h            - Show this help message
  clear              - Clear the screen
  exit, quit, q      - Exit

Use '\' at the end of a line for multiline input.
Use Up/Down arrows to navigate command history.
"#
    );
}

/// Runs one command, returns false when the REPL should stop.
fn process_command(store: &mut KvStore, command: &str) -> bool {
    let cmd = command.trim();
    let (name, args) = match cmd.split_once(char::is_whitespace) {
        Some((name, args)) => (name, args.trim()),
        None => (cmd, ""),
    };

    match name.to_lowercase().as_str() {
        "exit" | "quit" | "q" => {
            println!("Goodbye!");
            return false;
        }
        "help" | "h" => print_help(),
        "clear" => {
            print!("\x1B[2J\x1B[1;1H");
            let _ = std::io::stdout().flush();
        }
        "" => {}
        "put" => match args.split_once(char::is_whitespace) {
            Some((key, value)) => match store.put(key.as_bytes(), value.trim_start().as_bytes()) {
                Ok(()) => println!("OK"),
                Err(err) => println!("Error: {}", err),
            },
            None => println!("Usage: put <key> <value>"),
        },
        "get" if !args.is_empty() => match store.get(args.as_bytes()) {
            Ok(Some(value)) => println!("{}", String::from_utf8_lossy(&value)),
            Ok(None) => println!("(not found)"),
            Err(err) => println!("Error: {}", err),
        },
        "get" => println!("Usage: get <key>"),
        "stats" => match store.stats() {
            Ok(stats) => println!(
                "height: {}\ninternal pages: {}\nleaf pages: {}\nentries: {}",
                stats.height, stats.internal_pages, stats.leaf_pages, stats.entries
            ),
            Err(err) => println!("Error: {}", err),
        },
        "info" => {
            let info = store.info();
            println!("path: {}", info.path.display());
            println!("root page: {}", info.root_page_id);
            println!("pages: {} ({} free)", info.page_count, info.free_page_count);
            match info.committed_at {
                Some(at) => println!("last commit: {}", at.to_rfc3339()),
                None => println!("last commit: never"),
            }
        }
        _ => println!("Unknown command '{}'. Type 'help' for a list of commands.", name),
    }

    true
}

fn main() -> rustyline::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pagekv=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_DB_PATH.to_string());
    let mut store = match KvStore::open(&path) {
        Ok(store) => store,
        Err(err) => {
            error!(path = %path, error = %err, "failed to open database");
            std::process::exit(1);
        }
    };

    println!("pagekv {} ({})", env!("CARGO_PKG_VERSION"), path);
    println!("Type 'help' for a list of commands.");

    let mut rl = DefaultEditor::new()?;
    let _ = rl.load_history(HISTORY_FILE);

    loop {
        match read_multiline_command(&mut rl) {
            Ok(input) => {
                let command = input.trim().to_string();
                if !command.is_empty() {
                    rl.add_history_entry(&command)?;
                    if !process_command(&mut store, &command) {
                        break;
                    }
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(err) => {
                error!(error = %err, "readline failed");
                break;
            }
        }
    }

    let _ = rl.save_history(HISTORY_FILE);
    Ok(())
}
