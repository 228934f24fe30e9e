//! Sample sender: casts a track list to a receiver picked on stdin.
//!
//! ```text
//! pmocastsample <tracks.json | http(s)://feed.json> [config-dir]
//! ```

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use pmocast::{
    ActiveSession, CastConfig, ConnectedCallback, Device, DeviceScanner, DiscoveryEvent, JsonTrackProvider,
    MdnsDiscoveryBackend, QueueDispatcher, ScanMode, SessionController, SessionEvent,
    RustCastConnector, TrackDescriptor, TrackProvider, build_queue_entries,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: pmocastsample <tracks.json | http(s)://feed.json> [config-dir]";
const FEED_TIMEOUT: Duration = Duration::from_secs(15);

const HELP: &str = "\
commands:
  devices            open the receiver picker (active scan)
  cancel             close the picker (passive scan)
  cast <n>           cast to receiver n of the picker
  cast <host[:port]> cast to a receiver by address
  tracks             list the tracks
  play <n>           restart the queue from track n
  toggle             play / pause
  disconnect         end the session
  quit";

#[derive(Debug, PartialEq, Eq)]
enum Target {
    Index(usize),
    Address { host: String, port: Option<u16> },
}

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Devices,
    Cancel,
    Cast(Target),
    Tracks,
    Play(usize),
    Toggle,
    Disconnect,
    Help,
    Quit,
}

fn parse_target(arg: &str) -> Option<Target> {
    if let Ok(index) = arg.parse::<usize>() {
        return (index > 0).then_some(Target::Index(index - 1));
    }
    // Un littéral IPv6 nu n'a pas de port.
    if arg.matches(':').count() > 1 {
        return Some(Target::Address {
            host: arg.trim_matches(|c| c == '[' || c == ']').to_string(),
            port: None,
        });
    }
    match arg.split_once(':') {
        Some((host, port)) => Some(Target::Address {
            host: host.to_string(),
            port: Some(port.parse().ok()?),
        }),
        None => Some(Target::Address {
            host: arg.to_string(),
            port: None,
        }),
    }
}

fn parse_command(line: &str) -> Option<Command> {
    let mut words = line.split_whitespace();
    let command = match (words.next()?, words.next()) {
        ("devices" | "list", None) => Command::Devices,
        ("cancel", None) => Command::Cancel,
        ("cast", Some(arg)) => Command::Cast(parse_target(arg)?),
        ("tracks", None) => Command::Tracks,
        ("play", Some(n)) => Command::Play(n.parse::<usize>().ok().filter(|n| *n > 0)? - 1),
        ("toggle" | "pause", None) => Command::Toggle,
        ("disconnect", None) => Command::Disconnect,
        ("help" | "?", None) => Command::Help,
        ("quit" | "exit", None) => Command::Quit,
        _ => return None,
    };
    words.next().is_none().then_some(command)
}

fn fetch_tracks(source: &str) -> Result<Vec<TrackDescriptor>> {
    let provider = if source.starts_with("http://") || source.starts_with("https://") {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(FEED_TIMEOUT))
            .build();
        let agent: ureq::Agent = config.into();
        let body = agent
            .get(source)
            .call()
            .with_context(|| format!("cannot fetch {}", source))?
            .into_body()
            .read_to_string()?;
        JsonTrackProvider::from_json(body)
    } else {
        JsonTrackProvider::from_file(source)
    };
    provider
        .tracks()
        .with_context(|| format!("cannot read tracks from {}", source))
}

fn print_devices(devices: &[Device]) {
    if devices.is_empty() {
        println!("(no receiver discovered yet)");
    }
    for (i, device) in devices.iter().enumerate() {
        match &device.model_name {
            Some(model) => println!("{:>3}. {} [{}]", i + 1, device.friendly_name, model),
            None => println!("{:>3}. {}", i + 1, device.friendly_name),
        }
    }
}

fn print_tracks(tracks: &[TrackDescriptor]) {
    for (i, track) in tracks.iter().enumerate() {
        println!("{:>3}. {} - {}", i + 1, track.artist_name, track.track_name);
    }
}

fn spawn_printers(scanner: &DeviceScanner, controller: &SessionController) -> Result<()> {
    let discovery = scanner.subscribe();
    thread::Builder::new()
        .name("discovery-printer".into())
        .spawn(move || {
            for event in discovery {
                match event {
                    DiscoveryEvent::DeviceAppeared(d) => println!("+ {} ({})", d.friendly_name, d.address()),
                    DiscoveryEvent::DeviceDisappeared(d) => println!("- {}", d.friendly_name),
                }
            }
        })?;

    let session = controller.subscribe();
    thread::Builder::new()
        .name("session-printer".into())
        .spawn(move || {
            for event in session {
                match event {
                    SessionEvent::StateChanged { to, .. } => println!("session: {}", to),
                    SessionEvent::QueueLoadResult { load_id, outcome } => {
                        println!("{}: {:?}", load_id, outcome)
                    }
                    SessionEvent::PlaybackToggled { state } => println!("player: {:?}", state),
                }
            }
        })?;
    Ok(())
}

fn cast(
    controller: &SessionController,
    scanner: &mut DeviceScanner,
    config: &CastConfig,
    tracks: &[TrackDescriptor],
    target: Target,
) -> Result<()> {
    let device = match target {
        Target::Index(index) => {
            let devices = scanner.devices();
            if devices.is_empty() {
                warn!("Cast requested with no receiver discovered");
                println!("No receiver discovered yet, wait for one to show up or use `cast <host>`.");
                return Ok(());
            }
            match devices.into_iter().nth(index) {
                Some(device) => device,
                None => bail!("no receiver #{}, see `devices`", index + 1),
            }
        }
        Target::Address { host, port } => {
            let port = port.unwrap_or(config.cast.port);
            Device::new(format!("{}:{}", host, port), host.clone(), host, port)
        }
    };
    scanner.set_mode(ScanMode::Passive);

    let dispatcher: QueueDispatcher = controller.dispatcher();
    let entries = build_queue_entries(tracks);
    let on_connected: ConnectedCallback = Box::new(move |session: &ActiveSession| {
        info!(device = %session.device.friendly_name, tracks = entries.len(), "Casting track list");
        if let Err(e) = dispatcher.load_queue(entries, 0) {
            warn!("Track list not loaded: {}", e);
        }
    });
    controller.connect(device, Some(on_connected))?;
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut args = std::env::args().skip(1);
    let Some(source) = args.next() else {
        bail!(USAGE);
    };
    let config_dir = args.next().map(PathBuf::from);

    let config = CastConfig::load(config_dir.as_deref())?;
    let tracks = fetch_tracks(&source)?;
    info!(count = tracks.len(), "Track list ready");

    let mut scanner = DeviceScanner::new(Box::new(MdnsDiscoveryBackend::new(config.mdns_settings())));
    let connector = Arc::new(RustCastConnector::new(config.channel_settings()));
    let controller = SessionController::spawn(config.session_config(), connector)?;
    spawn_printers(&scanner, &controller)?;
    scanner.start_discovery(config.discovery_filter())?;

    println!("{}", HELP);
    let stdin = io::stdin();
    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        if line.trim().is_empty() {
            continue;
        }

        let Some(command) = parse_command(&line) else {
            println!("unknown command, try `help`");
            continue;
        };

        let outcome = match command {
            Command::Devices => {
                scanner.set_mode(ScanMode::Active);
                print_devices(&scanner.devices());
                Ok(())
            }
            Command::Cancel => {
                scanner.set_mode(ScanMode::Passive);
                Ok(())
            }
            Command::Cast(target) => cast(&controller, &mut scanner, &config, &tracks, target),
            Command::Tracks => {
                print_tracks(&tracks);
                Ok(())
            }
            Command::Play(index) => controller
                .dispatcher()
                .load_queue(build_queue_entries(&tracks), index)
                .map(|_| ())
                .map_err(Into::into),
            Command::Toggle => controller.toggle_playback().map_err(Into::into),
            Command::Disconnect => controller.disconnect().map_err(Into::into),
            Command::Help => {
                println!("{}", HELP);
                Ok(())
            }
            Command::Quit => break,
        };
        if let Err(e) = outcome {
            println!("error: {:#}", e);
        }
    }

    scanner.stop_discovery();
    controller.shutdown();
    Ok(())
}
