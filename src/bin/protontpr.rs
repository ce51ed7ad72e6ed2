// ProtonTPR CLI
// Mirror a Thrustmaster T-Pendular rudder into a virtual joystick

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use protontpr_core::hotplug::{HotplugMonitor, UdevChannel};
use protontpr_core::locate;
use protontpr_core::settings::{DiscoveryMode, Settings, SettingsError, WaitMode};
use protontpr_core::{EvdevBackend, MirrorResult, RunLoop, Shutdown};

/// Mirror an input device into a uinput device with an extra trigger button
#[derive(Parser, Debug)]
#[command(name = "protontpr")]
#[command(version)]
#[command(about = "Expose a rudder as a joystick with a trigger button", long_about = None)]
struct Args {
    /// Device node to mirror instead of scanning for it
    #[arg(value_name = "DEVICE")]
    device: Option<PathBuf>,

    /// USB vendor id (hex); with --product, wait for the device to be plugged
    #[arg(long, value_name = "HEX")]
    vendor: Option<String>,

    /// USB product id (hex)
    #[arg(long, value_name = "HEX")]
    product: Option<String>,

    /// Directory scanned for the device
    #[arg(long, value_name = "DIR")]
    search_dir: Option<PathBuf>,

    /// Substring the scanned entry must contain
    #[arg(long, value_name = "PATTERN")]
    pattern: Option<String>,

    /// Keep the virtual device and reopen the real one when it drops
    #[arg(long, overrides_with = "no_reconnect")]
    reconnect: bool,

    /// Tear everything down when the real device drops
    #[arg(long)]
    no_reconnect: bool,

    /// Delay between reopen attempts
    #[arg(long, value_name = "MS")]
    reconnect_interval_ms: Option<u64>,

    /// Name of the virtual device
    #[arg(long, value_name = "NAME")]
    name: Option<String>,

    /// Poll at a fixed interval instead of waiting for readiness
    #[arg(long)]
    poll: bool,

    /// Sleep between polls when idle
    #[arg(long, value_name = "MS")]
    poll_interval_ms: Option<u64>,

    /// TOML configuration file
    #[arg(short, long, value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// List the entries the directory scan sees and exit
    #[arg(long)]
    list: bool,
}

impl Args {
    fn reconnect_override(&self) -> Option<bool> {
        if self.reconnect {
            Some(true)
        } else if self.no_reconnect {
            Some(false)
        } else {
            None
        }
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn load_settings(args: &Args) -> Result<Settings, SettingsError> {
    let mut settings = match &args.config {
        Some(path) => Settings::from_file(path)?,
        None => Settings::load_default()?,
    };
    if let Some(path) = settings.source_path() {
        log::debug!("Loaded settings from {}", path.display());
    }
    apply_overrides(&mut settings, args)?;
    Ok(settings)
}

/// Command line values take precedence over the config file
fn apply_overrides(settings: &mut Settings, args: &Args) -> Result<(), SettingsError> {
    if let Some(device) = &args.device {
        settings.device_path = Some(device.clone());
    }
    if let Some(vendor) = &args.vendor {
        settings.vendor_id = Some(vendor.clone());
    }
    if let Some(product) = &args.product {
        settings.product_id = Some(product.clone());
    }
    if let Some(dir) = &args.search_dir {
        settings.search_dir = dir.clone();
    }
    if let Some(pattern) = &args.pattern {
        settings.pattern = pattern.clone();
    }
    if let Some(reconnect) = args.reconnect_override() {
        settings.reconnect = Some(reconnect);
    }
    if let Some(ms) = args.reconnect_interval_ms {
        settings.reconnect_interval = Duration::from_millis(ms);
    }
    if let Some(name) = &args.name {
        settings.virtual_name = name.clone();
    }
    if args.poll {
        settings.wait = WaitMode::Poll;
    }
    if let Some(ms) = args.poll_interval_ms {
        settings.poll_interval = Duration::from_millis(ms);
    }
    settings.validate()
}

fn list_candidates(settings: &Settings) {
    let found = locate::candidates(&settings.search_dir, &settings.pattern);
    if found.is_empty() {
        println!(
            "No entries matching '{}' in {}",
            settings.pattern,
            settings.search_dir.display()
        );
        return;
    }
    println!(
        "Found {} entr{} matching '{}':",
        found.len(),
        if found.len() == 1 { "y" } else { "ies" },
        settings.pattern
    );
    for path in &found {
        match std::fs::canonicalize(path) {
            Ok(target) if &target != path => {
                println!("  {} -> {}", path.display(), target.display())
            }
            _ => println!("  {}", path.display()),
        }
    }
}

fn run(args: &Args) -> MirrorResult<()> {
    let settings = load_settings(args)?;

    if args.list {
        list_candidates(&settings);
        return Ok(());
    }

    let mode = settings.discovery_mode()?;
    let wait = settings.wait_strategy();
    let shutdown = Shutdown::install()?;
    let mut monitor = HotplugMonitor::new(EvdevBackend, settings.monitor_options(&mode));

    match (&mode, mode.locator()) {
        (DiscoveryMode::Hotplug(filter), _) => {
            let channel = UdevChannel::new()?;
            log::info!("Waiting for USB device {}", filter);
            RunLoop::new(monitor, Some(channel), shutdown, wait).run()
        }
        (_, Some(locator)) => {
            let path = locator.resolve()?;
            // Static modes have no second chance: attach failures are fatal
            monitor.attach(&path, None)?;
            RunLoop::<_, UdevChannel>::new(monitor, None, shutdown, wait).run()
        }
        (_, None) => Ok(()),
    }
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    let code = match run(&args) {
        Ok(()) => 0,
        Err(e) => {
            log::error!("{}", e);
            e.exit_code()
        }
    };
    std::process::exit(code);
}
