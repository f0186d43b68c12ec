use clap::{Parser, Subcommand};
use std::io::{self, Write};
use std::path::PathBuf;

use lib::backend::{Backend, HttpBackend};
use lib::controller::ChatController;
use lib::directory::SessionListEntry;
use lib::postprocess;
use lib::provider::Provider;
use lib::surface::{Placeholder, Surface};
use lib::transcript::{AttachmentRef, Sender, Turn};
use lib::uploads::StagedFile;

#[derive(Parser)]
#[command(name = "dochi")]
#[command(about = "Dochi CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Chat interactively against the configured backend.
    Chat {
        /// Config file path (default: DOCHI_CONFIG_PATH or ~/.dochi/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Open an existing session on start.
        #[arg(long, value_name = "ID")]
        session: Option<i64>,
    },

    /// List sessions for a persona.
    Sessions {
        /// Config file path (default: DOCHI_CONFIG_PATH or ~/.dochi/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Persona role key (default from config).
        #[arg(long, value_name = "KEY")]
        persona: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("dochi {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Chat { config, session }) => {
            if let Err(e) = run_chat(config, session).await {
                log::error!("chat failed: {}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Sessions { config, persona }) => {
            if let Err(e) = run_sessions(config, persona).await {
                log::error!("sessions failed: {}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

/// Renders the chat surface to stdout.
#[derive(Default)]
struct TermSurface;

impl Surface for TermSurface {
    fn render_turn(&mut self, turn: &Turn) {
        match turn.sender {
            Sender::User => println!("[{}] {}", turn.username, turn.text),
            Sender::Assistant => println!("<{}> {}", turn.username, turn.text),
            Sender::System => println!("!! {}", turn.text),
        }
        match &turn.attachment {
            Some(AttachmentRef::Staged { name, .. }) => println!("   (attached: {})", name),
            Some(AttachmentRef::ServerImage { path }) => println!("   (image: {})", path),
            _ => {}
        }
    }

    fn show_placeholder(&mut self, placeholder: Placeholder) {
        match placeholder {
            Placeholder::Uploading { count } => {
                println!("... uploading and analyzing {} file(s)", count)
            }
            Placeholder::Thinking => println!("... thinking"),
        }
    }

    fn clear_placeholder(&mut self) {}

    fn clear_transcript(&mut self) {
        println!("----------------------------------------");
    }

    fn set_input_editable(&mut self, editable: bool, owner: Option<&str>) {
        if !editable {
            println!(
                "(read-only: this conversation belongs to {})",
                owner.unwrap_or("another user")
            );
        }
    }

    fn render_directory(&mut self, entries: &[SessionListEntry]) {
        // The REPL lists entries on demand (/sessions); a refresh is silent.
        log::debug!("session directory updated ({} visible)", entries.len());
    }

    fn open_code_viewer(&mut self, content: &str, lang: &str) {
        println!("--- {} ---", postprocess::viewer_filename(lang));
        println!("{}", content);
        println!("---");
    }

    fn close_code_viewer(&mut self) {}

    fn clear_staged_previews(&mut self) {}

    fn render_provider_availability(
        &mut self,
        availability: &[(Provider, bool)],
        current: Provider,
    ) {
        let selectable: Vec<&str> = availability
            .iter()
            .filter(|(_, restricted)| !restricted)
            .map(|(p, _)| p.key())
            .collect();
        log::debug!(
            "provider {} selected (selectable: {})",
            current.key(),
            selectable.join(", ")
        );
    }
}

async fn run_chat(config_path: Option<PathBuf>, session: Option<i64>) -> anyhow::Result<()> {
    let (config, _) = lib::config::load_config(config_path)?;
    let backend = HttpBackend::new(Some(config.backend.base_url.clone()));
    let mut controller = ChatController::new(backend, TermSurface::default(), &config);

    controller.start().await;
    if let Some(id) = session {
        controller.load_session(id).await;
    }
    println!("(type /help for commands, /exit to quit)");

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    loop {
        write!(stdout, "> ")?;
        stdout.flush()?;
        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            break;
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input.eq_ignore_ascii_case("/exit") || input.eq_ignore_ascii_case("/quit") {
            break;
        }
        if let Some(rest) = input.strip_prefix('/') {
            handle_command(&mut controller, rest).await;
            continue;
        }
        controller.submit(input).await;
    }

    Ok(())
}

async fn handle_command(
    controller: &mut ChatController<HttpBackend, TermSurface>,
    input: &str,
) {
    let mut parts = input.splitn(2, ' ');
    let command = parts.next().unwrap_or("");
    let rest = parts.next().unwrap_or("").trim();

    match command {
        "help" => print_help(),
        "new" => controller.new_chat().await,
        "sessions" => print_directory(controller),
        "open" => match rest.parse::<i64>() {
            Ok(id) => controller.load_session(id).await,
            Err(_) => println!("usage: /open <session-id>"),
        },
        "attach" => attach_file(controller, rest).await,
        "persona" => {
            if rest.is_empty() {
                print_personas(controller);
            } else {
                controller.select_persona(rest).await;
                println!("persona: {}", controller.active_persona());
            }
        }
        "provider" => match Provider::from_key(rest) {
            Some(p) => {
                controller.select_provider(p).await;
                println!("provider: {}", controller.provider_state().current().key());
            }
            None => println!("usage: /provider <google|anthropic|openai>"),
        },
        "search" => {
            controller.set_search(rest);
            print_directory(controller);
        }
        "mine" => {
            let on = controller.toggle_mine_only();
            println!("mine-only filter {}", if on { "on" } else { "off" });
            print_directory(controller);
        }
        "rename" => rename_session(controller, rest).await,
        "delete" => delete_session(controller, rest).await,
        other => println!("unknown command: /{} (try /help)", other),
    }
}

fn print_help() {
    println!("  /new                      start a new conversation");
    println!("  /sessions                 list visible sessions");
    println!("  /open <id>                load a session");
    println!("  /attach <path>            stage a file for the next message");
    println!("  /persona [key]            list personas or switch to one");
    println!("  /provider <key>           pick google, anthropic, or openai");
    println!("  /search <text>            filter the session list by title");
    println!("  /mine                     toggle the mine-only filter");
    println!("  /rename <id> <title>      rename a session");
    println!("  /delete <id>              delete a session");
    println!("  /exit                     quit");
}

fn print_directory(controller: &ChatController<HttpBackend, TermSurface>) {
    let entries = controller.visible_directory();
    if entries.is_empty() {
        println!("(no sessions)");
        return;
    }
    for e in &entries {
        let marker = if e.is_owner { ' ' } else { '*' };
        println!("{} {:>6}  {}  ({})", marker, e.id, e.title, e.username);
    }
}

fn print_personas(controller: &ChatController<HttpBackend, TermSurface>) {
    if controller.personas().is_empty() {
        println!("persona: {}", controller.active_persona());
        return;
    }
    for p in controller.personas() {
        let marker = if p.role_key == controller.active_persona() {
            '>'
        } else {
            ' '
        };
        println!("{} {}  {}", marker, p.role_key, p.role_name);
    }
}

async fn attach_file(controller: &mut ChatController<HttpBackend, TermSurface>, rest: &str) {
    if rest.is_empty() {
        println!("usage: /attach <path>");
        return;
    }
    let path = PathBuf::from(rest);
    match StagedFile::from_path(&path).await {
        Ok(file) => {
            let name = file.name.clone();
            controller.stage_file(file);
            println!(
                "staged {} ({} file(s) pending)",
                name,
                controller.staged_files().len()
            );
        }
        Err(e) => println!("cannot read {}: {}", path.display(), e),
    }
}

async fn rename_session(
    controller: &mut ChatController<HttpBackend, TermSurface>,
    rest: &str,
) {
    let mut parts = rest.splitn(2, ' ');
    let id = parts.next().unwrap_or("").parse::<i64>();
    let title = parts.next().unwrap_or("").trim();
    match id {
        Ok(id) if !title.is_empty() => {
            let current = controller
                .visible_directory()
                .into_iter()
                .find(|e| e.id == id)
                .map(|e| e.title)
                .unwrap_or_default();
            controller.rename_session(id, &current, title).await;
        }
        _ => println!("usage: /rename <session-id> <new title>"),
    }
}

async fn delete_session(
    controller: &mut ChatController<HttpBackend, TermSurface>,
    rest: &str,
) {
    let Ok(id) = rest.parse::<i64>() else {
        println!("usage: /delete <session-id>");
        return;
    };
    print!("delete session {}? This cannot be undone. [y/N] ", id);
    let _ = io::stdout().flush();
    let mut answer = String::new();
    if io::stdin().read_line(&mut answer).is_err() {
        return;
    }
    if answer.trim().eq_ignore_ascii_case("y") {
        controller.delete_session(id).await;
    }
}

async fn run_sessions(
    config_path: Option<PathBuf>,
    persona: Option<String>,
) -> anyhow::Result<()> {
    let (config, _) = lib::config::load_config(config_path)?;
    let backend = HttpBackend::new(Some(config.backend.base_url.clone()));
    let role_key = persona.unwrap_or(config.chat.default_persona);

    let entries = backend.chat_history(&role_key).await?;
    if entries.is_empty() {
        println!("(no sessions for {})", role_key);
        return Ok(());
    }
    for e in entries {
        let marker = if e.username == config.user.username {
            ' '
        } else {
            '*'
        };
        println!("{} {:>6}  {}  ({})", marker, e.id, e.title, e.username);
    }
    Ok(())
}
