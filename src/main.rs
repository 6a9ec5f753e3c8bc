use std::{
    env, fs,
    io::{self, Write},
    path::{Path, PathBuf},
    thread,
};

use anyhow::{bail, Context};
use image::{ImageFormat, RgbaImage};
use log::{info, warn};
use now_playing_bar::{
    artwork::DefaultFetcher,
    config::{Config, ConfigWatcher},
    dbus::SessionBus,
    output::StatusLine,
    ArtworkResolver, NowPlayingController, SessionManager,
};

const USAGE: &str = "usage: now-playing-bar [watch|status|play-pause|next|previous]";

enum Control {
    PlayPause,
    Next,
    Previous,
}

enum Command {
    Watch,
    Status,
    Control(Control),
    Help,
}

impl Command {
    fn parse(mut args: impl Iterator<Item = String>) -> anyhow::Result<Self> {
        let command = match args.next().as_deref() {
            None | Some("watch") => Command::Watch,
            Some("status") => Command::Status,
            Some("play-pause") => Command::Control(Control::PlayPause),
            Some("next") => Command::Control(Control::Next),
            Some("previous" | "prev") => Command::Control(Control::Previous),
            Some("-h" | "--help" | "help") => Command::Help,
            Some(other) => bail!("Unknown command '{other}'\n{USAGE}"),
        };
        if let Some(extra) = args.next() {
            bail!("Unexpected argument '{extra}'\n{USAGE}");
        }
        Ok(command)
    }
}

type Controller = NowPlayingController<SessionBus>;

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let command = Command::parse(env::args().skip(1))?;
    if let Command::Help = command {
        println!("{USAGE}");
        return Ok(());
    }

    let (config, config_path) = Config::load_with_path()?;
    let bus = SessionBus::connect().context("Failed to connect to the D-Bus session bus")?;
    let session = SessionManager::with_prefix(bus, config.session.service_prefix.clone());

    match command {
        Command::Watch => watch(session, config, config_path),
        Command::Status => {
            let mut controller = build_controller(session, &config, false);
            controller.tick();
            print_line(&StatusLine::from_display(controller.display(), &config.output))?;
            if let Some(path) = config.output.artwork_path.as_deref() {
                export_artwork(path, controller.current_artwork())?;
            }
            Ok(())
        }
        Command::Control(control) => {
            run_control(session, control);
            Ok(())
        }
        Command::Help => Ok(()),
    }
}

fn build_controller(
    session: SessionManager<SessionBus>,
    config: &Config,
    background: bool,
) -> Controller {
    let resolver = ArtworkResolver::new(DefaultFetcher::new(config.artwork.http_timeout()));
    let controller = NowPlayingController::new(session, resolver)
        .with_artwork_options(config.artwork.options());
    if background {
        controller.with_background_artwork()
    } else {
        controller
    }
}

fn watch(
    session: SessionManager<SessionBus>,
    mut config: Config,
    config_path: Option<PathBuf>,
) -> anyhow::Result<()> {
    let mut controller = build_controller(session, &config, config.artwork.background);
    let watcher = config_path
        .as_deref()
        .and_then(|path| match ConfigWatcher::watch(path) {
            Ok(watcher) => {
                info!("Watching {} for changes", watcher.path().display());
                Some(watcher)
            }
            Err(err) => {
                warn!("Config hot reload disabled: {err:#}");
                None
            }
        });

    let mut last_line: Option<StatusLine> = None;
    let mut exported_revision: Option<u64> = None;

    loop {
        if let Some(reloaded) = watcher.as_ref().and_then(ConfigWatcher::poll) {
            if reloaded.session.service_prefix != config.session.service_prefix
                || reloaded.artwork.http_timeout() != config.artwork.http_timeout()
                || reloaded.artwork.background != config.artwork.background
            {
                info!("Some config changes only take effect after a restart");
            }
            if reloaded.output.artwork_path != config.output.artwork_path {
                exported_revision = None;
            }
            controller.set_artwork_options(reloaded.artwork.options());
            config = reloaded;
            last_line = None;
        }

        controller.tick();

        let line = StatusLine::from_display(controller.display(), &config.output);
        if last_line.as_ref() != Some(&line) {
            print_line(&line)?;
            last_line = Some(line);
        }

        let revision = controller.artwork_revision();
        if exported_revision != Some(revision) {
            if let Some(path) = config.output.artwork_path.as_deref() {
                if let Err(err) = export_artwork(path, controller.current_artwork()) {
                    warn!("{err:#}");
                }
            }
            exported_revision = Some(revision);
        }

        thread::sleep(config.session.tick_interval());
    }
}

fn run_control(mut session: SessionManager<SessionBus>, control: Control) {
    if !session.connect_any() {
        warn!("No media player available");
        return;
    }
    match control {
        Control::PlayPause => session.play_pause(),
        Control::Next => session.next(),
        Control::Previous => session.previous(),
    }
}

fn print_line(line: &StatusLine) -> anyhow::Result<()> {
    let json = line.to_json().context("Failed to serialize status line")?;
    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{json}").context("Failed to write status line")?;
    stdout.flush().context("Failed to flush stdout")?;
    Ok(())
}

fn export_artwork(path: &Path, artwork: Option<&RgbaImage>) -> anyhow::Result<()> {
    match artwork {
        Some(image) => image
            .save_with_format(path, ImageFormat::Png)
            .with_context(|| format!("Failed to write artwork to {}", path.display())),
        None => match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err)
                .with_context(|| format!("Failed to remove artwork {}", path.display())),
        },
    }
}
