//! deckview - mirror a rendering surface onto a Stream Deck
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │          Control loop (App::dispatch)        │
//! ├──────────────────────────────────────────────┤
//! │  Surface tiles → FrameCompositor → Bridge ───┼──▶ Stream Deck (hidraw)
//! │  Surface ◀── pointer events ◀── key mapper ◀─┼─── key reports
//! │  Control socket ⇄ settings / help            │
//! │  Reconnect supervisor (timer)                │
//! └──────────────────────────────────────────────┘
//! ```

mod app;
mod config;
mod constants;
mod control;
mod deck;
mod frame;
mod input;
mod supervisor;
mod surface;
#[cfg(test)]
mod testing;

use anyhow::{anyhow, bail, Context, Result};
use log::info;
use std::path::PathBuf;

use deck::DeckError;

/// Command line options (override the config file)
#[derive(Debug, Default, PartialEq)]
struct Args {
    help: bool,
    version: bool,
    list_devices: bool,
    /// `--init-config[=PATH]`
    init_config: Option<Option<PathBuf>>,
    url: Option<String>,
    device: Option<String>,
    brightness: Option<i32>,
    scale: Option<f64>,
    frame: Option<PathBuf>,
}

impl Args {
    /// Parse arguments (without the program name)
    fn parse<I: IntoIterator<Item = String>>(args: I) -> Result<Self> {
        let mut parsed = Args::default();
        let mut iter = args.into_iter();

        while let Some(arg) = iter.next() {
            // --flag=value
            let (flag, inline) = match arg.split_once('=') {
                Some((flag, value)) if flag.starts_with("--") => {
                    (flag.to_string(), Some(value.to_string()))
                }
                _ => (arg.clone(), None),
            };
            let mut value = |name: &str| -> Result<String> {
                inline
                    .clone()
                    .or_else(|| iter.next())
                    .ok_or_else(|| anyhow!("{} requires a value", name))
            };

            match flag.as_str() {
                "-h" | "--help" => parsed.help = true,
                "-V" | "--version" => parsed.version = true,
                "-l" | "--list-devices" => parsed.list_devices = true,
                "--init-config" => parsed.init_config = Some(inline.clone().map(PathBuf::from)),
                "-u" | "--url" => parsed.url = Some(value("--url")?),
                "-d" | "--device" => parsed.device = Some(value("--device")?),
                "--brightness" => {
                    parsed.brightness = Some(
                        value("--brightness")?
                            .parse()
                            .context("--brightness expects a level 0-100")?,
                    )
                }
                "--scale" => {
                    parsed.scale = Some(
                        value("--scale")?
                            .parse()
                            .context("--scale expects a number")?,
                    )
                }
                "--frame" => parsed.frame = Some(PathBuf::from(value("--frame")?)),
                other => bail!("Unknown option: {} (see --help)", other),
            }
        }
        Ok(parsed)
    }

    /// Apply command line overrides to the loaded config
    fn apply(&self, cfg: &mut config::Config) {
        if let Some(url) = &self.url {
            cfg.general.url = url.clone();
        }
        if let Some(serial) = &self.device {
            cfg.general.device_serial = Some(serial.clone());
        }
        if let Some(level) = self.brightness {
            cfg.general.brightness = level;
        }
        if let Some(scale) = self.scale {
            cfg.general.scale_factor = scale;
        }
        if let Some(frame) = &self.frame {
            cfg.surface.frame_path = Some(frame.clone());
        }
    }
}

fn usage() -> String {
    format!(
        r#"deckview {} - mirror a web page onto a Stream Deck

USAGE:
    deckview [OPTIONS]

OPTIONS:
    -h, --help              Print this help message
    -V, --version           Print version information
    -u, --url <URL>         Page to open
    -l, --list-devices      List connected Stream Decks as JSON
    -d, --device <SERIAL>   Connect to the deck with this serial number
    --brightness <LEVEL>    Key brightness 0-100
    --scale <FACTOR>        Panel pixels per surface pixel (0.5-4.0)
    --frame <PATH>          Snapshot image written by the renderer
    --init-config[=PATH]    Generate a config file

EXIT STATUS:
    2    The requested serial number is not connected
    3    No Stream Deck found

CONFIG FILE:
    ~/.config/deckview/config.toml
"#,
        env!("CARGO_PKG_VERSION")
    )
}

/// Text returned to control clients asking for help
fn help_text() -> String {
    format!("Version: {}\n\n{}", env!("CARGO_PKG_VERSION"), usage())
}

fn report_fatal(err: &DeckError) {
    eprintln!("{}.", err);
    if let DeckError::DeviceNotFound { available, .. } = err {
        if !available.is_empty() {
            eprintln!("Available devices:");
            for device in available {
                eprintln!("  {}  {}  {}", device.serial, device.model, device.path);
            }
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse(std::env::args().skip(1))?;

    // --help
    if args.help {
        print!("{}", usage());
        return Ok(());
    }

    // --version
    if args.version {
        println!("deckview {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    // Config file generation mode
    if let Some(path) = &args.init_config {
        let path = config::Config::write_template(path.as_deref())?;
        println!("Config file generated: {}", path.display());
        return Ok(());
    }

    let mut cfg = config::Config::load();
    args.apply(&mut cfg);

    run(cfg, args.list_devices)
}

#[cfg(not(target_os = "linux"))]
fn run(_cfg: config::Config, _list_devices: bool) -> Result<()> {
    bail!("deckview needs Linux hidraw support")
}

#[cfg(target_os = "linux")]
fn run(cfg: config::Config, list_devices: bool) -> Result<()> {
    use deck::{DeckDriver, DeviceBridge, HidrawDriver};

    info!("deckview starting...");

    let driver = HidrawDriver::new();
    let devices = driver.list_devices().context("Failed to enumerate Stream Decks")?;
    if devices.is_empty() {
        report_fatal(&DeckError::NoDevices);
        std::process::exit(DeckError::NoDevices.exit_code());
    }
    if list_devices {
        println!("{}", serde_json::to_string_pretty(&devices)?);
        return Ok(());
    }

    let frame_path = cfg
        .surface
        .frame_path
        .clone()
        .context("No frame source configured (set [surface] frame_path or use --frame)")?;

    let mut bridge = DeviceBridge::new(driver);
    bridge.set_brightness(cfg.general.brightness);
    match bridge.open(cfg.general.device_serial.as_deref()) {
        Ok(_) => {}
        Err(e) if e.is_fatal() => {
            report_fatal(&e);
            std::process::exit(e.exit_code());
        }
        Err(e) => return Err(e).context("Failed to open Stream Deck"),
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start runtime")?;
    let result = runtime.block_on(serve(bridge, cfg, frame_path));

    let _ = sd_notify::notify(true, &[sd_notify::NotifyState::Stopping]);
    result
}

#[cfg(target_os = "linux")]
async fn serve(
    bridge: deck::DeviceBridge<deck::HidrawDriver>,
    cfg: config::Config,
    frame_path: PathBuf,
) -> Result<()> {
    use app::{App, AppEvent, Flow};
    use constants::DECK_POLL_INTERVAL_MS;
    use log::warn;
    use std::time::{Duration, Instant};
    use tokio::signal::unix::{signal, SignalKind};
    use tokio::sync::mpsc;

    let (surface_tx, mut surface_rx) = mpsc::unbounded_channel();
    let surface = surface::SnapshotSurface::new(
        frame_path.clone(),
        cfg.surface.input_sink.as_deref(),
        cfg.surface.url_file.clone(),
        surface_tx,
    )?;
    let (_frame_watcher, mut frame_changes) = surface::FrameWatcher::new(&frame_path)?;

    // Control socket (optional)
    let mut control_rx = None;
    let mut _control_server = None;
    if cfg.control.enabled {
        let (tx, rx) = mpsc::channel(16);
        let path = control::socket::socket_path(cfg.control.socket_path.as_deref());
        match control::ControlServer::bind(path, tx) {
            Ok(server) => {
                _control_server = Some(server);
                control_rx = Some(rx);
            }
            Err(e) => warn!("Control channel disabled: {:#}", e),
        }
    }

    let mut app = App::new(bridge, surface, cfg, true, help_text())?;
    app.start();

    let mut sigterm = signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
    let mut poll = tokio::time::interval(Duration::from_millis(DECK_POLL_INTERVAL_MS));
    poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let _ = sd_notify::notify(true, &[sd_notify::NotifyState::Ready]);

    loop {
        let event = tokio::select! {
            _ = tokio::signal::ctrl_c() => AppEvent::Shutdown,
            _ = sigterm.recv() => AppEvent::Shutdown,
            _ = poll.tick() => {
                app.poll_deck(Instant::now());
                continue;
            }
            Some(event) = surface_rx.recv() => AppEvent::Surface(event),
            Some(()) = frame_changes.recv() => {
                // Coalesce bursts of change notifications
                while frame_changes.try_recv().is_ok() {}
                if let Err(e) = app.surface_mut().refresh() {
                    warn!("Snapshot refresh failed: {:#}", e);
                }
                continue;
            }
            Some(command) = recv_opt(&mut control_rx) => AppEvent::Control(command),
            _ = sleep_until_opt(app.reconnect_deadline()) => AppEvent::ReconnectDue,
            _ = sleep_until_opt(app.flush_deadline()) => AppEvent::FlushTick,
        };

        if app.dispatch(event, Instant::now()) == Flow::Exit {
            info!("deckview stopped");
            break;
        }
    }
    Ok(())
}

/// Sleep until `deadline`, or forever if there is none
async fn sleep_until_opt(deadline: Option<std::time::Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await,
        None => std::future::pending().await,
    }
}

async fn recv_opt<T>(rx: &mut Option<tokio::sync::mpsc::Receiver<T>>) -> Option<T> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Args> {
        Args::parse(args.iter().map(|s| s.to_string()))
    }

    #[test]
    fn test_parse_flags() {
        let args = parse(&[
            "-u",
            "https://example.com",
            "--device=AL123",
            "--brightness",
            "-10",
            "-l",
        ])
        .unwrap();
        assert_eq!(args.url.as_deref(), Some("https://example.com"));
        assert_eq!(args.device.as_deref(), Some("AL123"));
        assert_eq!(args.brightness, Some(-10));
        assert!(args.list_devices);
        assert!(!args.help);
    }

    #[test]
    fn test_parse_init_config() {
        assert_eq!(parse(&["--init-config"]).unwrap().init_config, Some(None));
        assert_eq!(
            parse(&["--init-config=/tmp/deck.toml"]).unwrap().init_config,
            Some(Some(PathBuf::from("/tmp/deck.toml")))
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse(&["--bogus"]).is_err());
        assert!(parse(&["--url"]).is_err());
        assert!(parse(&["--brightness", "bright"]).is_err());
        assert!(parse(&["--scale=x"]).is_err());
    }

    #[test]
    fn test_overrides_apply() {
        let args =
            parse(&["--scale", "2", "--frame", "/run/frame.png", "--brightness=40"]).unwrap();
        let mut cfg = config::Config::default();
        args.apply(&mut cfg);
        assert_eq!(cfg.general.scale_factor, 2.0);
        assert_eq!(cfg.general.brightness, 40);
        assert_eq!(cfg.surface.frame_path, Some(PathBuf::from("/run/frame.png")));
        assert_eq!(cfg.general.url, constants::DEFAULT_URL);
    }

    #[test]
    fn test_help_text_has_version() {
        let help = help_text();
        assert!(help.starts_with(&format!("Version: {}", env!("CARGO_PKG_VERSION"))));
        assert!(help.contains("--list-devices"));
    }
}
