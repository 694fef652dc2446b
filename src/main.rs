//! Entry point for the read-aloud tool.
//!
//! Parses the command line, loads `conf/config.toml` and the local state,
//! then either runs an interactive playback session or a one-shot cloud,
//! cast or server command.

mod cache;
mod cancellation;
mod cast;
mod cli;
mod cloud;
mod config;
mod extract;
mod highlight;
mod playback;
mod session;
mod speech;
mod text_utils;

use crate::cache::{CACHE_DIR, LocalState};
use crate::cast::{CastAction, RelayClient};
use crate::cli::{
    ArticleCommand, CastCommand, Cli, CollectionCommand, Command, PlaybackArgs, ReadArgs,
    ServerCommand,
};
use crate::cloud::{
    ArticleCreate, ArticleUpdate, AuthManager, CloudClient, CollectionCreate, CollectionUpdate,
};
use crate::config::{AppConfig, load_config};
use crate::highlight::page::PageDom;
use crate::highlight::{HighlightMode, HighlightRenderer};
use crate::playback::{ControllerSettings, PlaybackController, PlaybackState, SessionCommand};
use crate::session::{
    PlaybackSession, SessionEvent, SessionOptions, SessionOutput, SessionParts, SessionSummary,
};
use crate::speech::audio::RodioOutput;
use crate::speech::local::{EspeakVoice, LocalVoice};
use crate::speech::remote::SynthesisClient;
use crate::text_utils::{Document, word_count};
use anyhow::{Context, Result, bail};
use chrono::Utc;
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*, reload};

type ReloadHandle = reload::Handle<EnvFilter, tracing_subscriber::Registry>;

fn main() {
    let reload_handle = init_tracing();
    if let Err(err) = run(&reload_handle) {
        error!("{err:?}");
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}

fn run(reload_handle: &ReloadHandle) -> Result<()> {
    let cli = Cli::parse();
    let mut config = load_config(&cli.config);
    set_log_level(reload_handle, config.log_level.as_filter_str());

    let state = LocalState::load();
    if let Some(url) = state.tts_server_url.as_deref().filter(|url| !url.is_empty()) {
        // A server chosen with `server set-url` wins over the config file.
        config.tts_server_url = url.trim_end_matches('/').to_string();
    }
    info!(
        config = %cli.config.display(),
        level = %config.log_level,
        tts_server = %config.tts_server_url,
        "Starting readaloud"
    );

    match cli.command {
        Command::Read(args) => read(&config, args),
        Command::Login { email, password } => {
            let mut auth = auth_manager(&config)?;
            let user = auth.login(&email, &password)?;
            println!(
                "Signed in as {}",
                user.name.or(user.email).unwrap_or(email)
            );
            Ok(())
        }
        Command::Register {
            email,
            password,
            name,
        } => {
            let mut auth = auth_manager(&config)?;
            let user = auth.register(&email, &password, name.as_deref())?;
            println!(
                "Registered and signed in as {}",
                user.name.or(user.email).unwrap_or(email)
            );
            Ok(())
        }
        Command::Logout => {
            auth_manager(&config)?.logout()?;
            println!("Signed out");
            Ok(())
        }
        Command::Whoami => {
            let mut auth = auth_manager(&config)?;
            match auth.whoami()? {
                Some(user) => println!(
                    "{} <{}>",
                    user.name.as_deref().unwrap_or("(no name)"),
                    user.email
                ),
                None => println!("Not signed in"),
            }
            Ok(())
        }
        Command::Save {
            source,
            collection,
            title,
        } => save(&config, &source, collection, title),
        Command::Articles(command) => articles(&config, command),
        Command::Collections(command) => collections(&config, command),
        Command::Cast(command) => cast_command(&config, command),
        Command::Server(command) => server_command(&config, state, command),
    }
}

fn read(config: &AppConfig, args: ReadArgs) -> Result<()> {
    let page = extract::load_source(&args.source)?;
    let page_dom = match page.html.as_deref() {
        Some(html) => PageDom::from_html(html),
        None => PageDom::from_plain_text(&page.text),
    };
    let text = match args.selection.as_deref().and_then(extract::selection_text) {
        Some(selection) => {
            println!("Selected {} words", word_count(&selection));
            selection
        }
        None => page.text,
    };
    let doc = Document::from_text(&text);
    if doc.is_empty() {
        bail!("No text found in {}", args.source);
    }
    info!(
        source = %args.source,
        title = page.title.as_deref().unwrap_or(""),
        words = doc.len(),
        "Loaded source"
    );

    let mut session = open_session(config, &args.playback)?;
    session.load(doc, page_dom);
    run_interactive(session)?;
    Ok(())
}

/// Build a session from config plus per-run flags.
fn open_session(config: &AppConfig, args: &PlaybackArgs) -> Result<PlaybackSession> {
    let mut config = config.clone();
    if let Some(mode) = args.mode {
        config.speech_mode = mode.into();
    }
    if let Some(rate) = args.rate {
        config.speech_rate = rate;
    }
    if args.page_highlight {
        config.highlight_mode = HighlightMode::Page;
    }
    let config = config.sanitized();

    let voice: Arc<dyn LocalVoice> = Arc::new(EspeakVoice::new(
        config.voice_program.clone(),
        config.voice.clone(),
        config.voice_words_per_minute,
    ));
    let audio_cache = config
        .audio_cache
        .then(|| cache::audio_dir(Path::new(CACHE_DIR)));
    let synthesis = SynthesisClient::new(
        &config.tts_server_url,
        Duration::from_secs(config.synthesis_timeout_secs),
        audio_cache,
    )?;
    let backend = speech::resolve_backend(config.speech_mode, &*voice, Some(&synthesis));
    match backend {
        Some(backend) => info!(
            mode = config.speech_mode.as_str(),
            backend = ?backend,
            rate = config.speech_rate,
            "Speech backend selected"
        ),
        None => warn!(mode = config.speech_mode.as_str(), "No speech backend available"),
    }
    let relay = if args.cast {
        Some(RelayClient::new(
            &config.relay_url,
            Duration::from_secs(config.relay_timeout_secs),
        )?)
    } else {
        None
    };

    let controller = PlaybackController::new(
        backend,
        ControllerSettings {
            chunk_size: config.chunk_size,
            cast_words_per_minute: config.cast_words_per_minute,
            rate: config.speech_rate,
        },
    );
    let parts = SessionParts {
        controller,
        highlight: HighlightRenderer::new(
            config.highlight_mode,
            config.context_words,
            PageDom::from_plain_text(""),
        ),
        audio: Box::new(RodioOutput::new()),
        voice,
        synthesis: Some(synthesis),
        relay,
        options: SessionOptions {
            boundary_throttle: Duration::from_millis(config.boundary_throttle_ms),
            skip_words: config.skip_words,
            exit_on_finish: args.exit_on_finish,
        },
    };
    let mut session = PlaybackSession::create(parts, Box::new(print_output));
    if args.cast {
        session.refresh_cast_status();
    }
    Ok(session)
}

fn print_output(output: SessionOutput) {
    match output {
        SessionOutput::Highlight(frame) => println!("{frame}"),
        SessionOutput::Status { message, percent } => println!("[{percent:>3}%] {message}"),
    }
}

fn run_interactive(mut session: PlaybackSession) -> Result<SessionSummary> {
    let ctrlc_tx = session.sender();
    ctrlc::set_handler(move || {
        let _ = ctrlc_tx.send(SessionEvent::Command(SessionCommand::Quit));
    })
    .context("Installing Ctrl-C handler")?;
    session::spawn_stdin_commands(session.sender());

    println!(
        "Keys (then Enter): p play/pause, s stop, r restart, f/b skip, h highlight mode, c cast, q quit"
    );
    session.run();
    Ok(session.dispose())
}

fn auth_manager(config: &AppConfig) -> Result<AuthManager> {
    let client = CloudClient::new(
        &config.api_url,
        Duration::from_secs(config.api_timeout_secs),
    )?;
    Ok(AuthManager::initialize(client, Path::new(CACHE_DIR).to_path_buf()))
}

fn save(
    config: &AppConfig,
    source: &str,
    collection: Option<String>,
    title: Option<String>,
) -> Result<()> {
    let mut auth = auth_manager(config)?;
    auth.require_auth()?;
    let page = extract::load_source(source)?;
    let doc = Document::from_text(&page.text);
    if doc.is_empty() {
        bail!("No text found in {source}");
    }
    let title = title.unwrap_or_else(|| cloud::article_title(page.title.as_deref(), &doc));
    let is_url = source.starts_with("http://") || source.starts_with("https://");
    let article = ArticleCreate {
        title,
        content: page.text,
        source_url: is_url.then(|| source.to_string()),
        collection_id: collection,
    };
    let saved = cloud::save_article(&mut auth, &article)?;
    println!("Saved \"{}\" ({})", saved.title, saved.id);
    Ok(())
}

fn articles(config: &AppConfig, command: ArticleCommand) -> Result<()> {
    let auth = auth_manager(config)?;
    let client = auth.require_auth()?;
    match command {
        ArticleCommand::List {
            skip,
            limit,
            collection,
        } => {
            let articles = client.list_articles(skip, limit, collection.as_deref())?;
            if articles.is_empty() {
                println!("No articles");
            }
            for article in articles {
                println!(
                    "{}  {}  [{}s]",
                    article.id, article.title, article.play_position_seconds
                );
            }
        }
        ArticleCommand::Show { id } => {
            let article = client.get_article(&id)?;
            println!("{}", article.title);
            if let Some(url) = &article.source_url {
                println!("Source: {url}");
            }
            println!(
                "Words: {}  Position: {}s",
                word_count(&article.content),
                article.play_position_seconds
            );
            println!();
            println!("{}", article.content);
        }
        ArticleCommand::Delete { id } => {
            client.delete_article(&id)?;
            println!("Deleted article {id}");
        }
        ArticleCommand::Play { id, playback } => play_article(config, client.clone(), &id, &playback)?,
    }
    Ok(())
}

/// Play a saved article from its stored position and write progress back.
fn play_article(
    config: &AppConfig,
    client: CloudClient,
    id: &str,
    playback: &PlaybackArgs,
) -> Result<()> {
    let article = client.get_article(id)?;
    let doc = Document::from_text(&article.content);
    if doc.is_empty() {
        bail!("Article {id} has no text");
    }
    let page_dom = PageDom::from_plain_text(&article.content);
    let mut session = open_session(config, playback)?;
    let rate = session.controller().rate();
    let words = doc.len();
    session.load(doc, page_dom);
    if article.play_position_seconds > 0 {
        let word = cloud::position_to_word(article.play_position_seconds, rate, words);
        info!(
            seconds = article.play_position_seconds,
            word, "Resuming saved position"
        );
        session.seek(word);
    }

    let hook_client = client.clone();
    let hook_id = id.to_string();
    session.set_progress_hook(Box::new(move |cursor, state| {
        if matches!(state, PlaybackState::Paused | PlaybackState::Finished) {
            save_progress(&hook_client, &hook_id, cursor, rate);
        }
    }));
    let summary = run_interactive(session)?;
    // Stop resets the cursor; only a live position is worth keeping.
    if matches!(summary.state, PlaybackState::Playing | PlaybackState::Paused) {
        save_progress(&client, id, summary.cursor, rate);
    }
    Ok(())
}

fn save_progress(client: &CloudClient, id: &str, cursor: usize, rate: f32) {
    let seconds = cloud::word_to_position(cursor, rate);
    match client.update_article(id, &ArticleUpdate::progress(seconds, Utc::now())) {
        Ok(_) => info!(id, seconds, "Saved playback position"),
        Err(err) => warn!(id, "Failed to save playback position: {err}"),
    }
}

fn collections(config: &AppConfig, command: CollectionCommand) -> Result<()> {
    let auth = auth_manager(config)?;
    let client = auth.require_auth()?;
    match command {
        CollectionCommand::List => {
            let collections = client.list_collections()?;
            if collections.is_empty() {
                println!("No collections");
            }
            for collection in collections {
                println!(
                    "{}  {}  ({} articles)",
                    collection.id, collection.name, collection.article_count
                );
            }
        }
        CollectionCommand::Create { name, description } => {
            let created = client.create_collection(&CollectionCreate {
                name: name.trim().to_string(),
                description,
            })?;
            println!("Created collection {} ({})", created.name, created.id);
        }
        CollectionCommand::Show { id } => {
            let collection = client.get_collection(&id)?;
            println!("{}", collection.name);
            if let Some(description) = &collection.description {
                println!("{description}");
            }
            println!("Articles: {}", collection.article_count);
        }
        CollectionCommand::Rename { id, name } => {
            let updated = client.update_collection(
                &id,
                &CollectionUpdate {
                    name: Some(name.trim().to_string()),
                    ..CollectionUpdate::default()
                },
            )?;
            println!("Renamed collection to {}", updated.name);
        }
        CollectionCommand::Delete { id } => {
            client.delete_collection(&id)?;
            println!("Deleted collection {id}");
        }
    }
    Ok(())
}

fn cast_command(config: &AppConfig, command: CastCommand) -> Result<()> {
    let relay = RelayClient::new(
        &config.relay_url,
        Duration::from_secs(config.relay_timeout_secs),
    )?;
    match command {
        CastCommand::Status => {
            let status = relay.status()?;
            if status.connected {
                println!(
                    "Connected to {}",
                    status.device.as_deref().unwrap_or("cast device")
                );
            } else {
                println!("No cast device connected");
            }
        }
        CastCommand::Disconnect => {
            if let Err(err) = relay.control(CastAction::Stop) {
                warn!("Stopping cast playback failed: {err:#}");
            }
            relay.disconnect()?;
            println!("Disconnected");
        }
    }
    Ok(())
}

fn server_command(config: &AppConfig, mut state: LocalState, command: ServerCommand) -> Result<()> {
    match command {
        ServerCommand::Check => {
            let client = SynthesisClient::new(
                &config.tts_server_url,
                Duration::from_secs(config.synthesis_timeout_secs),
                None,
            )?;
            client
                .health()
                .with_context(|| format!("TTS server at {} is not reachable", client.base_url()))?;
            println!("TTS server at {} is healthy", client.base_url());
        }
        ServerCommand::SetUrl { url } => {
            let url = url.trim().trim_end_matches('/').to_string();
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                bail!("Server URL must start with http:// or https://");
            }
            state.tts_server_url = Some(url.clone());
            state.save()?;
            println!("TTS server set to {url}");
        }
    }
    Ok(())
}

fn init_tracing() -> ReloadHandle {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));
    let (filter_layer, handle) = reload::Layer::new(env_filter);
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .with_filter(filter_layer),
        )
        .init();
    handle
}

fn set_log_level(handle: &ReloadHandle, level: &str) {
    if std::env::var_os("RUST_LOG").is_some() {
        return;
    }
    let parsed = EnvFilter::builder()
        .parse(level)
        .unwrap_or_else(|_| EnvFilter::new("debug"));
    if let Err(err) = handle.modify(|filter| *filter = parsed.clone()) {
        warn!(%level, "Failed to update log level from config: {err}");
    } else {
        info!(%level, "Applied log level from config");
    }
}
