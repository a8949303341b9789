use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use facecheck::{
    CameraErrorExt, CaptureWorkflow, FacecheckConfig, FacecheckError, HttpMemberDirectory,
    HttpSubmitter, MediaDevices, MemberDirectory, MemberId, MemberSummary, MockFrameMode,
    MockMediaDevices, SubmissionPurpose, VerificationResult, VideoSurface,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;

#[derive(Parser, Debug)]
#[command(name = "facecheck")]
#[command(about = "Face capture for member check-in and photo enrollment")]
#[command(version)]
#[command(long_about = "Opens a camera, takes a still of the member's face and submits it \
to the attendance service for verification, or stores it as the member's enrollment photo.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "facecheck.toml", help = "Path to TOML configuration file")]
    config: String,

    /// Enable debug logging (most verbose)
    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    /// Enable verbose logging (info level)
    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,

    /// Also write logs to daily rolling files in this directory
    #[arg(long, value_name = "DIR")]
    log_dir: Option<String>,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration file and exit")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Camera backend
    #[arg(long, value_enum, default_value_t = Backend::V4l2)]
    backend: Backend,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Backend {
    /// Synthetic frames, no hardware
    Mock,
    /// Video4Linux device through GStreamer
    V4l2,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Verify a member's face and record attendance
    CheckIn {
        #[arg(long, conflicts_with = "search", required_unless_present = "search")]
        member_id: Option<String>,

        /// Find the member by name or id instead
        #[arg(long)]
        search: Option<String>,

        /// Submit the first capture without asking
        #[arg(short, long)]
        yes: bool,
    },
    /// Store a new reference photo for a member
    Enroll {
        #[arg(long)]
        member_id: String,

        #[arg(short, long)]
        yes: bool,
    },
    /// Search the member directory
    Members { query: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print_default_config()?;
        return Ok(());
    }

    let log_guard = init_logging(&args)?;

    info!("Starting facecheck v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let config = match FacecheckConfig::load_from_file(&args.config) {
        Ok(config) => {
            info!("Configuration loaded successfully from: {}", args.config);
            config
        }
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if args.validate_config {
        match config.validate() {
            Ok(()) => {
                info!("Configuration validation successful");
                println!("✓ Configuration is valid");
                return Ok(());
            }
            Err(e) => {
                error!("Configuration validation failed: {}", e);
                eprintln!("✗ Configuration validation failed: {}", e);
                drop(log_guard);
                std::process::exit(1);
            }
        }
    }
    config.validate()?;

    let Some(command) = args.command else {
        bail!("no command given; try `facecheck --help`");
    };

    let mut input = prompt_input();
    let exit_code = match command {
        Command::Members { query } => {
            list_members(&config, &query).await?;
            0
        }
        Command::CheckIn {
            member_id,
            search,
            yes,
        } => {
            let member = match (member_id, search) {
                (Some(id), _) => MemberId::new(id)?,
                (None, Some(query)) => match pick_member(&config, &query, &mut input).await? {
                    Some(member) => member,
                    None => return Ok(()),
                },
                (None, None) => bail!("either --member-id or --search is required"),
            };
            run_capture(&config, args.backend, SubmissionPurpose::Verification, member, yes, &mut input)
                .await?
        }
        Command::Enroll { member_id, yes } => {
            let member = MemberId::new(member_id)?;
            run_capture(&config, args.backend, SubmissionPurpose::Enrollment, member, yes, &mut input)
                .await?
        }
    };

    info!("facecheck exited with code: {}", exit_code);
    // Flush the rolling log writer; process::exit skips destructors
    drop(log_guard);
    std::process::exit(exit_code);
}

/// Line reader over stdin shared by every interactive prompt
type PromptInput = Lines<BufReader<Stdin>>;

fn prompt_input() -> PromptInput {
    BufReader::new(tokio::io::stdin()).lines()
}

fn media_devices(backend: Backend, config: &FacecheckConfig) -> Result<Arc<dyn MediaDevices>> {
    match backend {
        Backend::Mock => {
            let interval = Duration::from_millis(1000 / u64::from(config.camera.mock_frame_rate.max(1)));
            let devices = MockMediaDevices::new(config.camera.width.ideal, config.camera.height.ideal)
                .with_facing(config.camera.facing_mode)
                .with_frame_mode(MockFrameMode::Interval(interval));
            Ok(Arc::new(devices))
        }
        #[cfg(all(feature = "camera", target_os = "linux"))]
        Backend::V4l2 => Ok(Arc::new(facecheck::V4l2MediaDevices::new(&config.camera)?)),
        #[cfg(not(all(feature = "camera", target_os = "linux")))]
        Backend::V4l2 => Err(FacecheckError::system(
            "the v4l2 backend needs a Linux build with the `camera` feature; use --backend mock",
        )
        .into()),
    }
}

/// Run capture attempts until one is accepted, the user gives up or a
/// fatal camera error occurs. Returns the process exit code.
async fn run_capture(
    config: &FacecheckConfig,
    backend: Backend,
    purpose: SubmissionPurpose,
    member: MemberId,
    assume_yes: bool,
    input: &mut PromptInput,
) -> Result<i32> {
    let devices = media_devices(backend, config)?;
    let strategy = Arc::new(HttpSubmitter::new(&config.api, purpose)?);
    let workflow = Arc::new(CaptureWorkflow::new(
        config,
        devices,
        Arc::new(VideoSurface::new()),
        strategy,
    ));

    let interactive = {
        let workflow = Arc::clone(&workflow);
        async move { capture_loop(&workflow, purpose, member, assume_yes, input).await }
    };

    tokio::select! {
        code = interactive => {
            workflow.stop_camera();
            code
        }
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted; releasing camera");
            workflow.cancel();
            println!("Cancelled.");
            Ok(130)
        }
    }
}

async fn capture_loop(
    workflow: &CaptureWorkflow,
    purpose: SubmissionPurpose,
    member: MemberId,
    assume_yes: bool,
    input: &mut PromptInput,
) -> Result<i32> {
    'camera: loop {
        println!("Starting camera...");
        if let Err(e) = workflow.start_camera().await {
            let FacecheckError::Camera(camera_error) = &e else {
                return Err(e.into());
            };
            eprintln!("{}", camera_error.user_message());
            if camera_error.is_transient() && !assume_yes && confirm(input, "Try again?").await? {
                continue 'camera;
            }
            return Ok(1);
        }

        'capture: loop {
            let frame = match workflow.capture() {
                Ok(frame) => frame,
                Err(FacecheckError::Camera(e)) => {
                    eprintln!("{}", e.user_message());
                    if !assume_yes && confirm(input, "Capture again?").await? {
                        continue 'capture;
                    }
                    return Ok(1);
                }
                Err(e) => return Err(e.into()),
            };

            let (width, height) = frame.dimensions();
            println!("Captured {}x{} photo ({} bytes).", width, height, frame.len());
            if !assume_yes && !confirm(input, &format!("Submit {} for member {}?", purpose, member)).await? {
                if confirm(input, "Capture again?").await? {
                    continue 'capture;
                }
                return Ok(1);
            }

            loop {
                let result = workflow.submit(member.clone()).await?;
                match &result {
                    VerificationResult::Success(_) => {
                        match purpose {
                            SubmissionPurpose::Verification => println!("{}", result.user_message()),
                            SubmissionPurpose::Enrollment => println!("Photo enrolled."),
                        }
                        return Ok(0);
                    }
                    VerificationResult::Rejected(_) => {
                        eprintln!("{}", result.user_message());
                        if assume_yes || !confirm(input, "Capture again?").await? {
                            return Ok(2);
                        }
                        if workflow.is_camera_live() {
                            continue 'capture;
                        }
                        continue 'camera;
                    }
                    VerificationResult::TransportError(_) => {
                        eprintln!("{}", result.user_message());
                        if assume_yes || !confirm(input, "Submit again?").await? {
                            return Ok(1);
                        }
                    }
                }
            }
        }
    }
}

async fn confirm<R: AsyncBufRead + Unpin>(input: &mut Lines<R>, question: &str) -> Result<bool> {
    println!("{} [y/N]", question);
    let answer = input.next_line().await?.unwrap_or_default();
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

/// 1-based choice among `count` options; `None` on blank, invalid or closed input
async fn read_selection<R: AsyncBufRead + Unpin>(
    input: &mut Lines<R>,
    count: usize,
) -> Result<Option<usize>> {
    let answer = input.next_line().await?.unwrap_or_default();
    Ok(match answer.trim().parse::<usize>() {
        Ok(n) if (1..=count).contains(&n) => Some(n - 1),
        _ => None,
    })
}

async fn search_members(config: &FacecheckConfig, query: &str) -> Result<Vec<MemberSummary>> {
    let directory = HttpMemberDirectory::new(&config.api)?;
    let members = directory
        .search(query, config.api.member_search_limit)
        .await
        .context("member search failed")?;
    Ok(members)
}

async fn list_members(config: &FacecheckConfig, query: &str) -> Result<()> {
    let members = search_members(config, query).await?;
    if members.is_empty() {
        println!("No members match '{}'.", query);
    }
    for member in members {
        println!("{}", member);
    }
    Ok(())
}

async fn pick_member(
    config: &FacecheckConfig,
    query: &str,
    input: &mut PromptInput,
) -> Result<Option<MemberId>> {
    let members = search_members(config, query).await?;
    match members.as_slice() {
        [] => {
            println!("No members match '{}'.", query);
            Ok(None)
        }
        [only] => {
            println!("Member: {}", only);
            Ok(Some(MemberId::new(&only.id)?))
        }
        many => {
            for (index, member) in many.iter().enumerate() {
                println!("{:>2}) {}", index + 1, member);
            }
            println!("Select a member (number), or press Enter to cancel:");
            match read_selection(input, many.len()).await? {
                Some(index) => Ok(Some(MemberId::new(&many[index].id)?)),
                None => Ok(None),
            }
        }
    }
}

fn init_logging(args: &Args) -> Result<Option<WorkerGuard>> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    // Determine log level based on flags
    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("facecheck={}", log_level)));

    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_target(true)
            .with_thread_ids(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer()
                .with_target(true)
                .with_thread_ids(args.debug)
                .with_file(args.debug)
                .with_line_number(args.debug)
                .boxed()
        }
    };

    let (file_layer, guard) = match &args.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "facecheck.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_ansi(false)
                .with_target(true)
                .with_writer(writer)
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(file_layer)
        .with(env_filter)
        .init();

    Ok(guard)
}

/// Print default configuration in TOML format
fn print_default_config() -> Result<()> {
    println!("# Facecheck Configuration File");
    println!("# This is the default configuration with all available options");
    println!("# Environment overrides use FACECHECK_<SECTION>__<KEY>, e.g. FACECHECK_API__BASE_URL");
    println!();
    let rendered = toml::to_string_pretty(&FacecheckConfig::default())
        .map_err(FacecheckError::from)?;
    println!("{}", rendered);
    Ok(())
}
