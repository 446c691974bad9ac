mod api;
mod chime;
mod diagnostics;
mod driver;
mod error;
mod preferences;
mod runtime;
mod status;
mod ticker;
mod time_provider;
mod tone;
mod ui;

use std::ops::ControlFlow;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use crate::api::{ApiServer, ApiServerConfig, DEFAULT_API_BIND, DEFAULT_API_PORT};
use crate::chime::clock::ChimeSchedule;
use crate::chime::settings::{ChimeSettings, load_settings};
use crate::diagnostics::{DiagnosticsContext, diagnostics_report};
use crate::driver::ClockInputs;
use crate::preferences::{
    ThemePreference, ThemeSignal, TimeDisplayMode, TimeFormatLookup, TimeFormatter,
    detect_system_dark, environment_locale, query_host_time_format,
};
use crate::runtime::ChimeRuntime;
use crate::status::{ConsoleSurface, NullSurface};
use crate::ticker::{CancelHandle, TICK_PERIOD, Ticker};
use crate::time_provider::{parse_start_at, select_time_source};
use crate::tone::player::{ChimeOutput, ChimePlayer, SilentOutput};
use crate::tone::synth::{DECAY_SECS, DEFAULT_SAMPLE_RATE, write_chime_wav};

const THEME_POLL_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliTimeFormat {
    Auto,
    #[value(name = "12h")]
    Hour12,
    #[value(name = "24h")]
    Hour24,
}

impl CliTimeFormat {
    fn pinned(self) -> Option<TimeDisplayMode> {
        match self {
            CliTimeFormat::Auto => None,
            CliTimeFormat::Hour12 => Some(TimeDisplayMode::Hour12),
            CliTimeFormat::Hour24 => Some(TimeDisplayMode::Hour24),
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliOsTheme {
    Auto,
    Light,
    Dark,
}

impl CliOsTheme {
    fn pinned(self) -> Option<bool> {
        match self {
            CliOsTheme::Auto => None,
            CliOsTheme::Light => Some(false),
            CliOsTheme::Dark => Some(true),
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "timechime",
    version,
    about = "Hourly chime with a synthesized gong"
)]
struct Cli {
    /// JSON settings file; created on the first change.
    #[arg(long, default_value = "chime.json")]
    settings: PathBuf,

    /// Minute of the hour to chime at (0-59), overriding the settings file.
    #[arg(long)]
    minute: Option<u32>,

    #[arg(long)]
    active: Option<bool>,

    #[arg(long, value_enum)]
    theme: Option<ThemePreference>,

    #[arg(long, value_enum, default_value_t = CliTimeFormat::Auto)]
    time_format: CliTimeFormat,

    /// Pin the OS dark-mode signal instead of watching it.
    #[arg(long, value_enum, default_value_t = CliOsTheme::Auto)]
    os_theme: CliOsTheme,

    /// Run without a window, printing status to stdout.
    #[arg(long)]
    headless: bool,

    /// Stop the headless loop after this many ticks (0 = run until signalled).
    #[arg(long, default_value_t = 0)]
    ticks: u64,

    /// Simulated start time, `YYYY-MM-DDTHH:MM[:SS]` or `HH:MM[:SS]`.
    #[arg(long)]
    start_at: Option<String>,

    #[arg(long, default_value_t = 1.0)]
    speed: f64,

    #[arg(long)]
    mute: bool,

    /// Play one chime and exit.
    #[arg(long)]
    test_chime: bool,

    /// Render one chime to a WAV file and exit.
    #[arg(long)]
    render_wav: Option<PathBuf>,

    #[arg(long, default_value_t = DEFAULT_SAMPLE_RATE)]
    sample_rate: u32,

    #[arg(long)]
    diagnostics: bool,

    /// Serve the runtime state over local HTTP.
    #[arg(long)]
    api: bool,

    #[arg(long, default_value = DEFAULT_API_BIND)]
    api_bind: String,

    #[arg(long, default_value_t = DEFAULT_API_PORT)]
    api_port: u16,

    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    if let Err(err) = run(cli) {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "timechime=debug"
    } else {
        "timechime=info"
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn run(cli: Cli) -> Result<()> {
    if let Some(path) = cli.render_wav.as_deref() {
        if cli.sample_rate == 0 {
            anyhow::bail!("--sample-rate must be greater than zero");
        }
        let samples = write_chime_wav(path, cli.sample_rate)?;
        println!(
            "Wrote {samples} samples ({} Hz) to {}",
            cli.sample_rate,
            path.display()
        );
        return Ok(());
    }

    if cli.test_chime {
        return run_test_chime(cli.mute);
    }

    let settings = load_startup_settings(&cli)?;
    let start_at = cli.start_at.as_deref().map(parse_start_at).transpose()?;
    let time_source = select_time_source(start_at, cli.speed)?;
    debug!(source = time_source.label, "time source selected");

    if cli.diagnostics {
        return run_diagnostics(&cli, settings, time_source.label, time_source.source.now());
    }

    let pinned_format = cli.time_format.pinned();
    let formatter = TimeFormatter::from_environment(pinned_format);
    let time_format_lookup = match pinned_format {
        Some(mode) => TimeFormatLookup::resolved(Some(mode)),
        None => TimeFormatLookup::spawn(),
    };
    let theme_signal = match cli.os_theme.pinned() {
        Some(prefers_dark) => ThemeSignal::pinned(prefers_dark),
        None => ThemeSignal::watch_system(THEME_POLL_INTERVAL),
    };
    let api = if cli.api {
        Some(
            ApiServer::start(ApiServerConfig {
                bind_addr: cli.api_bind.clone(),
                port: cli.api_port,
            })
            .with_context(|| {
                format!(
                    "failed to start local API at {}:{}",
                    cli.api_bind, cli.api_port
                )
            })?,
        )
    } else {
        None
    };

    let inputs = ClockInputs {
        time_source,
        theme_signal,
        time_format_lookup,
    };

    if cli.headless {
        let runtime = ChimeRuntime::new(
            settings,
            inputs.time_source.source.now(),
            chime_output(cli.mute),
            ConsoleSurface,
            formatter,
        )?
        .with_settings_path(cli.settings.clone());
        return run_headless(runtime, &inputs, api.as_ref(), cli.ticks);
    }

    ui::app::run_gui(ui::app::GuiOptions {
        settings,
        settings_path: cli.settings,
        inputs,
        formatter,
        mute: cli.mute,
        api,
    })
}

/// Settings file plus any command-line overrides, validated up front.
fn load_startup_settings(cli: &Cli) -> Result<ChimeSettings> {
    let mut settings = load_settings(&cli.settings)
        .with_context(|| format!("failed to load {}", cli.settings.display()))?;
    if let Some(minute) = cli.minute {
        settings.minute_of_hour = ChimeSchedule::new(minute)?.minute_of_hour();
    }
    if let Some(active) = cli.active {
        settings.active = active;
    }
    if let Some(theme) = cli.theme {
        settings.theme_preference = theme;
    }
    Ok(settings)
}

fn chime_output(mute: bool) -> Box<dyn ChimeOutput> {
    if mute {
        Box::new(SilentOutput)
    } else {
        Box::new(ChimePlayer::new())
    }
}

fn run_test_chime(mute: bool) -> Result<()> {
    let mut output = chime_output(mute);
    output.play_chime();
    if !mute {
        thread::sleep(Duration::from_secs_f64(DECAY_SECS) + Duration::from_millis(250));
    }
    println!("Test chime done");
    Ok(())
}

fn run_diagnostics(
    cli: &Cli,
    settings: ChimeSettings,
    time_source: &'static str,
    now: chrono::NaiveDateTime,
) -> Result<()> {
    let (hint, time_format_source) = match cli.time_format.pinned() {
        Some(mode) => (Some(mode), "pinned"),
        None => match query_host_time_format() {
            Ok(Some(mode)) => (Some(mode), "host setting"),
            Ok(None) => (None, "locale default"),
            Err(err) => {
                debug!(%err, "host time format query failed");
                (None, "locale default")
            }
        },
    };
    let (prefers_dark, theme_source) = match cli.os_theme.pinned() {
        Some(prefers_dark) => (prefers_dark, "pinned"),
        None => (detect_system_dark(), "detected"),
    };

    let mut runtime = ChimeRuntime::new(
        settings,
        now,
        SilentOutput,
        NullSurface,
        TimeFormatter::from_environment(hint),
    )?;
    runtime.set_system_prefers_dark(prefers_dark);

    let locale = environment_locale();
    let report = diagnostics_report(
        &runtime,
        &DiagnosticsContext {
            settings_path: &cli.settings,
            settings_found: cli.settings.exists(),
            time_source,
            theme_source,
            time_format_source,
            locale: locale.as_deref(),
        },
    );
    print!("{report}");
    Ok(())
}

fn run_headless(
    mut runtime: ChimeRuntime<Box<dyn ChimeOutput>, ConsoleSurface>,
    inputs: &ClockInputs,
    api: Option<&ApiServer>,
    max_ticks: u64,
) -> Result<()> {
    let cancel = CancelHandle::new();
    signal_hook::flag::register(signal_hook::consts::SIGINT, cancel.flag())
        .context("failed to install SIGINT handler")?;
    signal_hook::flag::register(signal_hook::consts::SIGTERM, cancel.flag())
        .context("failed to install SIGTERM handler")?;

    let ticker = Ticker::with_cancel(TICK_PERIOD, cancel);
    let ran = ticker.run(|tick| {
        let outcome = inputs.drive(&mut runtime);
        if outcome.fired {
            println!("Chime at {}", runtime.formatter().format(&outcome.now, true));
        }
        if let Some(api) = api
            && let Err(err) = api.publish(runtime.snapshot())
        {
            warn!(%err, "API state not updated");
        }

        if max_ticks > 0 && tick >= max_ticks {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    });
    debug!(ticks = ran, chimes = runtime.chimes_fired(), "headless loop stopped");
    Ok(())
}
