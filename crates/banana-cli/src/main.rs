use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use banana_contracts::events::SessionJournal;
use banana_contracts::session::{parse_intent, Intent, SESSION_HELP_COMMANDS};
use banana_contracts::{
    AspectRatio, CameraPerspective, GenerationSettings, ImagePayload, LightingStyle, MimeType,
};
use banana_engine::{
    DryrunClient, EngineConfig, GeminiClient, GenerationClient, Normalizer, RunOutcome,
    SessionOrchestrator,
};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, Level};

type Session = SessionOrchestrator<Box<dyn GenerationClient>>;

#[derive(Debug, Parser)]
#[command(name = "huge-banana", version, about = "Product photo studio CLI")]
struct Cli {
    /// Log at debug level.
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Normalize(NormalizeArgs),
    Generate(GenerateArgs),
    Session(SessionArgs),
}

/// Letterbox one image into a canvas of the given aspect ratio.
#[derive(Debug, Parser)]
struct NormalizeArgs {
    #[arg(long)]
    input: PathBuf,
    #[arg(long)]
    ratio: AspectRatio,
    #[arg(long)]
    out: PathBuf,
    #[arg(long)]
    max_dim: Option<u32>,
    #[arg(long)]
    quality: Option<f32>,
}

/// Run one generation and save the result.
#[derive(Debug, Parser)]
struct GenerateArgs {
    #[arg(long)]
    product: PathBuf,
    #[arg(long)]
    style: Option<PathBuf>,
    #[arg(long)]
    ratio: Option<AspectRatio>,
    #[arg(long)]
    lighting: Option<LightingStyle>,
    #[arg(long)]
    camera: Option<CameraPerspective>,
    #[arg(long)]
    out: PathBuf,
    #[arg(long)]
    dryrun: bool,
    #[arg(long)]
    events: Option<PathBuf>,
}

/// Interactive studio session.
#[derive(Debug, Parser)]
struct SessionArgs {
    #[arg(long)]
    out: PathBuf,
    #[arg(long)]
    dryrun: bool,
    #[arg(long)]
    events: Option<PathBuf>,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("huge-banana error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let config = EngineConfig::from_env();
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    match cli.command {
        Command::Normalize(args) => run_normalize(args, &config),
        Command::Generate(args) => runtime.block_on(run_generate(args, &config)),
        Command::Session(args) => {
            runtime.block_on(run_session(args, &config))?;
            Ok(0)
        }
    }
}

fn init_tracing(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::WARN };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run_normalize(args: NormalizeArgs, config: &EngineConfig) -> Result<i32> {
    let source = load_image(&args.input)?;
    let normalizer = Normalizer::new(
        args.max_dim.unwrap_or(config.max_dim),
        args.quality.unwrap_or(config.jpeg_quality),
    );
    let normalized = normalizer.normalize(&source, args.ratio)?;
    let bytes = normalized
        .to_bytes()
        .context("normalized image is not valid base64")?;
    if let Some(parent) = args.out.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(&args.out, bytes)
        .with_context(|| format!("failed to write {}", args.out.display()))?;
    println!(
        "Normalized {} to {} ({}, {})",
        args.input.display(),
        args.out.display(),
        args.ratio,
        normalized.mime_type()
    );
    Ok(0)
}

async fn run_generate(args: GenerateArgs, config: &EngineConfig) -> Result<i32> {
    let mut session = build_session(config, args.dryrun, &args.out, args.events.as_deref())?;
    let defaults = GenerationSettings::default();
    session.set_settings(GenerationSettings {
        aspect_ratio: args.ratio.unwrap_or(defaults.aspect_ratio),
        lighting_style: args.lighting.unwrap_or(defaults.lighting_style),
        camera_perspective: args.camera.unwrap_or(defaults.camera_perspective),
    });
    session.set_product_image(Some(load_image(&args.product)?));
    if let Some(style) = args.style.as_deref() {
        session.set_style_image(Some(load_image(style)?));
    }

    match session.generate().await? {
        RunOutcome::Ready => {
            let path = session.download(0, &args.out)?;
            println!("Prompt: {}", session.prompt_text());
            println!("Saved {}", path.display());
            Ok(0)
        }
        RunOutcome::Failed(message) => {
            eprintln!("Generation failed: {message}");
            Ok(1)
        }
    }
}

fn build_session(
    config: &EngineConfig,
    dryrun: bool,
    out: &Path,
    events: Option<&Path>,
) -> Result<Session> {
    let client: Box<dyn GenerationClient> = if dryrun {
        Box::new(DryrunClient)
    } else {
        Box::new(GeminiClient::new(config)?)
    };
    debug!(client = client.name(), "generation client ready");
    let events_path = events
        .map(Path::to_path_buf)
        .unwrap_or_else(|| out.join("events.jsonl"));
    let journal = SessionJournal::new(events_path, uuid::Uuid::new_v4().to_string());
    let normalizer = Normalizer::new(config.max_dim, config.jpeg_quality);
    Ok(SessionOrchestrator::new(client, normalizer).with_journal(journal))
}

async fn run_session(args: SessionArgs, config: &EngineConfig) -> Result<()> {
    let mut session = build_session(config, args.dryrun, &args.out, args.events.as_deref())?;
    session.subscribe(|state| {
        if state.is_busy() {
            println!("{}...", capitalize(state.label()));
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("Huge Banana session started. Type /help for commands.");

    loop {
        print!("> ");
        io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let intent = parse_intent(&line);
        if intent.action == "quit" {
            break;
        }
        if let Err(err) = dispatch(&mut session, &intent, &args.out).await {
            println!("Error: {err:#}");
        }
    }
    Ok(())
}

async fn dispatch(session: &mut Session, intent: &Intent, out_dir: &Path) -> Result<()> {
    match intent.action.as_str() {
        "noop" => {}
        "help" => println!("Commands: {}", SESSION_HELP_COMMANDS.join(" ")),
        "set_product_image" => match intent.arg_str("path").filter(|p| !p.is_empty()) {
            Some(path) => {
                let image = load_image(Path::new(path))?;
                println!("Product image set ({}, {})", image.mime_type(), image.short_digest());
                session.set_product_image(Some(image));
            }
            None => println!("/product requires a path"),
        },
        "set_style_image" => match intent.arg_str("path").filter(|p| !p.is_empty()) {
            Some(path) => {
                let image = load_image(Path::new(path))?;
                println!("Style image set ({}, {})", image.mime_type(), image.short_digest());
                session.set_style_image(Some(image));
            }
            None => {
                session.set_style_image(None);
                println!("Style image cleared");
            }
        },
        "set_aspect_ratio" => match intent
            .arg_str("text")
            .unwrap_or_default()
            .parse::<AspectRatio>()
        {
            Ok(ratio) => {
                session.set_aspect_ratio(ratio);
                println!("Aspect ratio set to {ratio}");
            }
            Err(err) => println!("{err}"),
        },
        "set_lighting_style" => match intent
            .arg_str("text")
            .unwrap_or_default()
            .parse::<LightingStyle>()
        {
            Ok(style) => {
                session.set_lighting_style(style);
                println!("Lighting set to {style}");
            }
            Err(err) => println!("{err}"),
        },
        "set_camera_perspective" => match intent
            .arg_str("text")
            .unwrap_or_default()
            .parse::<CameraPerspective>()
        {
            Ok(perspective) => {
                session.set_camera_perspective(perspective);
                println!("Camera set to {perspective}");
            }
            Err(err) => println!("{err}"),
        },
        "set_prompt" => {
            session.set_prompt_text(intent.arg_str("text").unwrap_or_default());
            println!("Prompt updated");
        }
        "generate" => match session.generate().await {
            Ok(outcome) => report_outcome(session, &outcome),
            Err(err) => println!("{err}"),
        },
        "refine" => {
            let text = intent.arg_str("text").unwrap_or_default();
            if !text.trim().is_empty() {
                session.set_refine_instruction(text);
            }
            match session.refine().await {
                Ok(outcome) => report_outcome(session, &outcome),
                Err(err) => println!("{err}"),
            }
        }
        "history" => {
            if session.history().is_empty() {
                println!("History is empty");
            }
            for (index, entry) in session.history().iter().enumerate() {
                println!(
                    "[{index}] {} {} {} {}",
                    entry.origin.as_str(),
                    entry.image.mime_type(),
                    entry.image.short_digest(),
                    entry.created_at
                );
            }
        }
        "viewer_open" => match index_arg(intent, "/open")? {
            Some(index) => {
                session.open_viewer(index);
                print_viewer(session);
            }
            None => println!("/open requires an index"),
        },
        "viewer_next" => {
            session.viewer_next();
            print_viewer(session);
        }
        "viewer_previous" => {
            session.viewer_previous();
            print_viewer(session);
        }
        "viewer_close" => {
            session.close_viewer();
            println!("Viewer closed");
        }
        "history_delete" => match index_arg(intent, "/delete")? {
            Some(index) => match session.remove_history(index) {
                Ok(entry) => println!("Deleted [{index}] {}", entry.image.short_digest()),
                Err(err) => println!("{err}"),
            },
            None => println!("/delete requires an index"),
        },
        "download" => {
            let saved = match index_arg(intent, "/download")? {
                Some(index) => Some(session.download(index, out_dir)?),
                None => session.download_displayed(out_dir)?,
            };
            match saved {
                Some(path) => println!("Saved {}", path.display()),
                None => println!("Nothing to download"),
            }
        }
        "options" => print_options(),
        "status" => print_status(session),
        "unknown" => println!(
            "Unknown command /{}. Type /help for commands.",
            intent.arg_str("command").unwrap_or_default()
        ),
        other => println!("Unhandled action: {other}"),
    }
    Ok(())
}

/// `Ok(None)` when no index was given.
fn index_arg(intent: &Intent, command: &str) -> Result<Option<usize>> {
    match intent.command_args.get("index") {
        None | Some(Value::Null) => Ok(None),
        Some(_) => match intent.arg_index("index") {
            Some(index) => Ok(Some(index)),
            None => bail!("{command} expects a numeric index"),
        },
    }
}

fn report_outcome(session: &Session, outcome: &RunOutcome) {
    match outcome {
        RunOutcome::Ready => {
            println!("Prompt: {}", session.prompt_text());
            if let Some(entry) = session.history().get(0) {
                println!(
                    "Ready: [0] {} {} ({} in history)",
                    entry.image.mime_type(),
                    entry.image.short_digest(),
                    session.history().len()
                );
            }
        }
        RunOutcome::Failed(message) => println!("Failed: {message}"),
    }
}

fn print_viewer(session: &mut Session) {
    let total = session.history().len();
    match session.viewer_entry() {
        Some((index, entry)) => println!(
            "Viewing {} of {}: {} {} {}",
            index + 1,
            total,
            entry.origin.as_str(),
            entry.image.mime_type(),
            entry.image.short_digest()
        ),
        None => println!("Viewer closed"),
    }
}

fn print_options() {
    let ratios: Vec<&str> = AspectRatio::options().iter().map(|o| o.label).collect();
    let lighting: Vec<&str> = LightingStyle::options().iter().map(|o| o.label).collect();
    let cameras: Vec<&str> = CameraPerspective::options().iter().map(|o| o.label).collect();
    println!("Aspect ratios: {}", ratios.join(", "));
    println!("Lighting: {}", lighting.join(", "));
    println!("Camera: {}", cameras.join(", "));
}

fn print_status(session: &Session) {
    let settings = session.settings();
    println!("State: {}", session.state().label());
    if let Some(message) = session.state().error_message() {
        println!("Error: {message}");
    }
    println!(
        "Settings: {} / {} / {}",
        settings.aspect_ratio, settings.lighting_style, settings.camera_perspective
    );
    println!(
        "Product: {}  Style: {}",
        describe_slot(session.product_image()),
        describe_slot(session.style_image())
    );
    if !session.prompt_text().is_empty() {
        println!("Prompt: {}", session.prompt_text());
    }
    println!("History: {} image(s)", session.history().len());
}

fn describe_slot(image: Option<&ImagePayload>) -> String {
    match image {
        Some(image) => format!("{} {}", image.mime_type(), image.short_digest()),
        None => "none".to_string(),
    }
}

fn capitalize(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Reads an image file, trusting magic bytes over the extension.
fn load_image(path: &Path) -> Result<ImagePayload> {
    let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let Some(mime_type) = MimeType::sniff(&bytes).or_else(|| MimeType::from_path(path)) else {
        bail!("unsupported image type: {}", path.display());
    };
    Ok(ImagePayload::from_bytes(&bytes, mime_type))
}
