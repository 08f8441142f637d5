//! lettermatch - head-to-head letters and conundrum duels over TCP
//!
//! `serve` runs the authoritative match server; `play` opens the terminal
//! client; `leaderboard` and `stats` read the match history.

mod app;
mod game;
mod lobby;
mod network;
mod stats;
mod storage;
mod tui;

use anyhow::{bail, Context, Result};
use app::{App, ConnectionState};
use clap::{Args, Parser, Subcommand};
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use game::conundrum::DictionaryConundrums;
use game::dictionary::WordListDictionary;
use game::engine::{MatchRules, MatchTimings, MissingSubmissionPolicy};
use game::letters::LetterGenerator;
use game::validation::WordValidator;
use lobby::auth::{Authenticator, DenyAll, StaticTokens};
use lobby::timers::unix_now_ms;
use lobby::Lobby;
use network::protocol::SessionIdentity;
use network::{Client, ClientMessage, Server, DEFAULT_PORT};
use stats::PlayerStats;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use storage::settings::Settings;
use storage::{MatchHistoryStore, MemoryHistoryStore, SqliteHistoryStore};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};
use tui::Tui;

const LOG_TARGET: &str = "lettermatch::main";
const DEFAULT_LOG_FILTER: &str = "lettermatch=info";
const RECONNECT_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Parser)]
#[command(name = "lettermatch", version)]
#[command(about = "Two-player letters and conundrum duels", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the match server
    Serve(ServeArgs),
    /// Play in the terminal
    Play(PlayArgs),
    /// Show the top players
    Leaderboard(LeaderboardArgs),
    /// Show one player's lifetime stats
    Stats(StatsArgs),
}

#[derive(Debug, Args)]
struct ServeArgs {
    /// First port to try; the next free one up to 47500 is used if taken
    #[arg(long, env = "LETTERMATCH_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// SQLite history database (defaults to the user data directory)
    #[arg(long, env = "LETTERMATCH_DB")]
    db: Option<PathBuf>,

    /// Keep history in memory only
    #[arg(long, conflicts_with = "db")]
    in_memory: bool,

    /// Word list file, one word per line (defaults to the built-in list)
    #[arg(long, env = "LETTERMATCH_DICTIONARY")]
    dictionary: Option<PathBuf>,

    /// Seed for matchmaking and match RNGs
    #[arg(long, env = "LETTERMATCH_SEED")]
    seed: Option<u64>,

    #[arg(long, default_value_t = 30)]
    letters_seconds: u64,

    #[arg(long, default_value_t = 30)]
    conundrum_seconds: u64,

    /// How long a round result stays up before the next round
    #[arg(long, default_value_t = 5)]
    result_seconds: u64,

    /// Extend a letters round once by this many ms when only one word is in
    #[arg(long)]
    grace_ms: Option<u64>,

    /// Tokens that unlock ranked play
    #[arg(long = "ranked-token", env = "LETTERMATCH_RANKED_TOKENS", value_delimiter = ',')]
    ranked_tokens: Vec<String>,
}

#[derive(Debug, Args)]
struct PlayArgs {
    /// Server address (host or host:port)
    #[arg(long, env = "LETTERMATCH_SERVER")]
    server: Option<String>,

    /// Display name (saved for next time)
    #[arg(long)]
    name: Option<String>,

    /// Token for ranked play (saved for next time)
    #[arg(long, env = "LETTERMATCH_TOKEN")]
    token: Option<String>,
}

#[derive(Debug, Args)]
struct LeaderboardArgs {
    #[arg(long, env = "LETTERMATCH_DB")]
    db: Option<PathBuf>,

    #[arg(long, default_value_t = 10)]
    limit: usize,
}

#[derive(Debug, Args)]
struct StatsArgs {
    /// Player id or display name
    player: String,

    #[arg(long, env = "LETTERMATCH_DB")]
    db: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Serve(args) => {
            init_tracing_stderr()?;
            serve(args)
        }
        Command::Play(args) => {
            init_tracing_file()?;
            play(args)
        }
        Command::Leaderboard(args) => {
            init_tracing_stderr()?;
            leaderboard(args)
        }
        Command::Stats(args) => {
            init_tracing_stderr()?;
            show_stats(args)
        }
    }
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}

fn init_tracing_stderr() -> Result<()> {
    fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .compact()
        .try_init()
        .map_err(|err| anyhow::anyhow!("failed to initialize tracing subscriber: {err}"))
}

/// The terminal owns stdout and stderr while playing, so the client logs to a file.
fn init_tracing_file() -> Result<()> {
    let dir = storage::data_dir().context("no data directory for the client log")?;
    std::fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
    let path = dir.join("client.log");
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("opening {}", path.display()))?;
    fmt()
        .with_env_filter(env_filter())
        .with_writer(std::sync::Mutex::new(file))
        .with_ansi(false)
        .try_init()
        .map_err(|err| anyhow::anyhow!("failed to initialize tracing subscriber: {err}"))
}

fn open_history(db: Option<&Path>) -> Result<SqliteHistoryStore> {
    match db {
        Some(path) => SqliteHistoryStore::open(path)
            .with_context(|| format!("opening history database {}", path.display())),
        None => SqliteHistoryStore::open_default().context("opening history database"),
    }
}

fn build_rules(args: &ServeArgs) -> Result<MatchRules> {
    let dictionary = match &args.dictionary {
        Some(path) => WordListDictionary::load(path)
            .with_context(|| format!("loading dictionary {}", path.display()))?,
        None => WordListDictionary::embedded().clone(),
    };
    if dictionary.is_empty() {
        bail!("the dictionary has no usable words");
    }
    let conundrums = DictionaryConundrums::from_dictionary(&dictionary);
    if conundrums.is_empty() {
        warn!(target: LOG_TARGET, "dictionary has no nine-letter words; conundrum rounds will score nothing");
    }

    let missing_submission = match args.grace_ms {
        Some(grace_ms) => MissingSubmissionPolicy::ExtendOnce { grace_ms },
        None => MissingSubmissionPolicy::ScoreAsEmpty,
    };

    Ok(MatchRules {
        generator: LetterGenerator::standard(),
        validator: WordValidator::new(Arc::new(dictionary)),
        conundrums: Arc::new(conundrums),
        timings: MatchTimings {
            letters_solving_ms: args.letters_seconds * 1000,
            conundrum_solving_ms: args.conundrum_seconds * 1000,
            round_result_ms: args.result_seconds * 1000,
            ..MatchTimings::default()
        },
        missing_submission,
    })
}

fn serve(args: ServeArgs) -> Result<()> {
    let rules = build_rules(&args)?;

    let history: Arc<dyn MatchHistoryStore> = if args.in_memory {
        Arc::new(MemoryHistoryStore::new())
    } else {
        Arc::new(open_history(args.db.as_deref())?)
    };

    let authenticator: Arc<dyn Authenticator> = if args.ranked_tokens.is_empty() {
        Arc::new(DenyAll)
    } else {
        Arc::new(StaticTokens::new(args.ranked_tokens.iter().cloned()))
    };

    let seed = args.seed.unwrap_or_else(rand::random);
    let lobby = Lobby::new(Arc::new(rules), history, authenticator, seed);
    let server = Server::start_on_port(args.port, lobby)
        .with_context(|| format!("binding a port from {}", args.port))?;
    info!(target: LOG_TARGET, addr = %server.addr(), seed, "server ready");

    while server.is_running() {
        thread::park_timeout(Duration::from_secs(60));
    }
    Ok(())
}

fn leaderboard(args: LeaderboardArgs) -> Result<()> {
    let history = open_history(args.db.as_deref())?;
    let top = history.leaderboard(args.limit)?;
    if top.is_empty() {
        println!("No finished matches yet.");
    } else {
        print!("{}", leaderboard_table(&top));
    }
    Ok(())
}

fn leaderboard_table(top: &[PlayerStats]) -> String {
    let mut out = format!(
        "{:>3}  {:<20} {:>5} {:>5} {:>5} {:>7}\n",
        "#", "Player", "W", "L", "D", "Points"
    );
    for (i, s) in top.iter().enumerate() {
        out.push_str(&format!(
            "{:>3}  {:<20} {:>5} {:>5} {:>5} {:>7}\n",
            i + 1,
            s.display_name,
            s.wins,
            s.losses,
            s.draws,
            s.total_points
        ));
    }
    out
}

fn show_stats(args: StatsArgs) -> Result<()> {
    let history = open_history(args.db.as_deref())?;
    let Some(stats) = history.player_stats(&args.player)? else {
        bail!("no recorded matches for {}", args.player);
    };
    print!("{}", stats_report(&stats));
    Ok(())
}

fn stats_report(s: &PlayerStats) -> String {
    let mut out = format!("{} ({})\n", s.display_name, s.player_id);
    out.push_str(&format!("  Matches:      {}\n", s.matches_played));
    out.push_str(&format!("  Won/Lost/Drew {}/{}/{}\n", s.wins, s.losses, s.draws));
    out.push_str(&format!("  Win rate:     {:.0}%\n", s.win_rate() * 100.0));
    out.push_str(&format!(
        "  Points:       {} (avg {:.1}, best {})\n",
        s.total_points,
        s.average_score(),
        s.best_match_score
    ));
    if !s.longest_word.is_empty() {
        out.push_str(&format!("  Longest word: {}\n", s.longest_word.to_uppercase()));
    }
    out
}

// === Terminal client ===

/// Copy a newly issued identity into the settings. Returns true if anything changed.
fn remember_identity(settings: &mut Settings, identity: &SessionIdentity) -> bool {
    let player_id = Some(identity.player_id.clone());
    let resume_token = Some(identity.resume_token.clone());
    if settings.player_id == player_id && settings.resume_token == resume_token {
        return false;
    }
    settings.player_id = player_id;
    settings.resume_token = resume_token;
    true
}

struct Connection {
    address: String,
    client: Option<Client>,
    last_attempt: Option<Instant>,
}

impl Connection {
    fn is_connected(&self) -> bool {
        self.client.as_ref().is_some_and(|c| c.is_connected())
    }

    fn send(&self, message: &ClientMessage) {
        if let Some(client) = &self.client {
            if let Err(err) = client.send(message) {
                warn!(target: LOG_TARGET, event = message.event_name(), "send failed: {err}");
            }
        }
    }

    fn identify(&self, display_name: &str, settings: &Settings) {
        if let Some(client) = &self.client {
            let result = client.identify(
                display_name,
                settings.player_id.clone(),
                settings.resume_token.clone(),
                settings.auth_token.clone(),
            );
            if let Err(err) = result {
                warn!(target: LOG_TARGET, "identify failed: {err}");
            }
        }
    }

    /// Reconnect at most once per interval. Returns true on a fresh connection.
    fn ensure(&mut self) -> bool {
        if self.is_connected() {
            return false;
        }
        if self.last_attempt.is_some_and(|t| t.elapsed() < RECONNECT_INTERVAL) {
            return false;
        }
        self.last_attempt = Some(Instant::now());
        match Client::connect(&self.address) {
            Ok(client) => {
                info!(target: LOG_TARGET, addr = %client.server_addr(), "connected");
                self.client = Some(client);
                true
            }
            Err(err) => {
                warn!(target: LOG_TARGET, address = %self.address, "connect failed: {err}");
                self.client = None;
                false
            }
        }
    }
}

fn play(args: PlayArgs) -> Result<()> {
    let settings_path = Settings::default_path().context("locating settings")?;
    let mut settings = Settings::load(&settings_path).context("loading settings")?;

    if let Some(name) = args.name {
        settings.display_name = Some(name);
    }
    if let Some(token) = args.token {
        settings.auth_token = Some(token);
    }
    if let Some(server) = args.server {
        settings.last_server = Some(server);
    }
    let Some(display_name) = settings.display_name.clone() else {
        bail!("no display name yet; pass --name <NAME>");
    };
    let address = settings
        .last_server
        .clone()
        .unwrap_or_else(|| format!("127.0.0.1:{DEFAULT_PORT}"));
    settings.save(&settings_path).context("saving settings")?;

    let mut connection = Connection {
        address,
        client: None,
        last_attempt: None,
    };
    let mut app = App::new();
    let mut terminal = Tui::new()?;
    terminal.enter()?;

    let tick_rate = Duration::from_millis(100);
    let mut was_in_match = false;

    loop {
        if connection.ensure() {
            app.set_connection(ConnectionState::Connected, unix_now_ms());
            connection.identify(&display_name, &settings);
            if was_in_match {
                if let Some(resume) = app.on_resume() {
                    connection.send(&resume);
                }
            }
        } else if !connection.is_connected() && app.ui().connection == ConnectionState::Connected {
            app.set_connection(ConnectionState::Disconnected, unix_now_ms());
        }

        if let Some(client) = connection.client.as_mut() {
            for message in client.poll() {
                app.on_server_message(message, unix_now_ms());
            }
        }
        was_in_match = app.ui().in_match();

        if let Some(issued) = app.session() {
            if remember_identity(&mut settings, issued) {
                if let Err(err) = settings.save(&settings_path) {
                    warn!(target: LOG_TARGET, "could not save settings: {err}");
                }
            }
        }

        app.refresh(unix_now_ms());
        terminal.draw(|frame| tui::render(frame, &app))?;

        if event::poll(tick_rate)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    let outbound = match key.code {
                        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                            app.quit();
                            None
                        }
                        KeyCode::Esc => {
                            app.quit();
                            None
                        }
                        KeyCode::F(2) => app.on_forfeit(),
                        KeyCode::Enter => app.on_submit(),
                        KeyCode::Backspace => {
                            app.on_backspace();
                            None
                        }
                        KeyCode::Char(c) => app.on_char(c),
                        _ => None,
                    };
                    if let Some(message) = outbound {
                        connection.send(&message);
                    }
                }
            }
        }

        if app.should_quit {
            break;
        }
    }

    if let Some(client) = connection.client.as_mut() {
        client.close();
    }

    Ok(())
}
