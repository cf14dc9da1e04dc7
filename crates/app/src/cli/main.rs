//! Stomp CLI: a real-time guitar effects pedal on the default sound card

mod control;
mod menu;

use anyhow::Context;
use clap::Parser;
use control::ControlState;
use menu::Command;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use stomp_core::domain::{
    AudioEnumerator, ConfigManager, ConfigWatcher, DeviceId, EffectKind, ParameterStore,
    PresetManager, SampleFormat, StompConfig,
};
use stomp_infra::audio::CpalEnumerator;
use stomp_infra::{AudioEngine, EngineEvent};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "stomp")]
#[command(about = "Real-time audio effects processor", long_about = None)]
struct Cli {
    /// Configuration file (defaults to the platform config dir)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Audio device name, or "default"
    #[arg(short, long)]
    device: Option<String>,

    /// List audio devices and exit
    #[arg(long)]
    list_devices: bool,

    /// Effect to start with
    #[arg(short, long)]
    effect: Option<EffectKind>,

    /// Wire sample format (i16 or f32)
    #[arg(short, long)]
    format: Option<SampleFormat>,

    /// Reload the active preset when its file changes
    #[arg(short, long)]
    watch: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

/// Preset currently applied, shared with the watcher task
type ActivePreset = Arc<Mutex<Option<String>>>;

struct Pedal {
    engine: AudioEngine,
    control: ControlState,
    presets: PresetManager,
    active_preset: ActivePreset,
    xruns: Arc<AtomicUsize>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    if cli.list_devices {
        return list_devices();
    }

    info!("Stomp starting...");

    let manager = match &cli.config {
        Some(path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(ConfigManager::default_config_dir()?),
    };
    let mut config = manager.load().await;
    apply_overrides(&mut config, &cli);

    let xruns = Arc::new(AtomicUsize::new(0));
    let xrun_counter = Arc::clone(&xruns);
    let engine = AudioEngine::open(&config.engine)
        .with_context(|| format!("Failed to open audio device '{}'", config.engine.device))?
        .with_event_handler(move |event| match event {
            EngineEvent::Xrun { .. } => {
                xrun_counter.fetch_add(1, Ordering::Relaxed);
            }
            EngineEvent::Started | EngineEvent::Stopped => debug!(?event, "Engine event"),
        });
    engine.params().replace(config.parameters);

    let presets = PresetManager::new(resolve_preset_dir(&config, manager.config_dir()));
    let active_preset: ActivePreset = Arc::new(Mutex::new(None));

    if let Some(name) = config.app.startup_preset.clone() {
        match presets.load_preset(&name).await {
            Ok(params) => {
                engine.params().replace(params);
                *active_preset.lock().unwrap_or_else(PoisonError::into_inner) = Some(name);
            }
            Err(e) => warn!(preset = %name, "Startup preset not applied: {}", e),
        }
    }

    let _watcher = if cli.watch || config.app.watch_presets {
        let params = Arc::clone(engine.params());
        Some(spawn_preset_watcher(&presets, params, Arc::clone(&active_preset)).await?)
    } else {
        None
    };

    let mut pedal = Pedal {
        control: ControlState::new(engine.params().active_effect()),
        engine,
        presets,
        active_preset,
        xruns,
    };

    pedal.engine.start().context("Failed to start audio engine")?;
    println!("{}", menu::menu_text(pedal.engine.params().active_effect()));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("Failed to read stdin")?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }

        match menu::parse(&line) {
            Ok(Command::Quit) => break,
            Ok(command) => {
                if let Err(e) = pedal.execute(command).await {
                    error!("{:#}", e);
                }
            }
            Err(e) => println!("{}", e),
        }
    }

    pedal.engine.stop().context("Failed to stop audio engine")?;

    config.parameters = pedal.engine.parameters();
    manager
        .save(&config)
        .await
        .context("Failed to save configuration")?;

    info!("Stomp stopped");
    Ok(())
}

fn list_devices() -> anyhow::Result<()> {
    let enumerator = CpalEnumerator::new();
    let devices = enumerator.devices().context("Failed to enumerate devices")?;
    for device in devices {
        let rates: Vec<String> = device.sample_rates.iter().map(|r| r.hz().to_string()).collect();
        println!(
            "{:<40} {:<8} {} Hz",
            device.name,
            format!("{:?}", device.device_type).to_lowercase(),
            rates.join("/")
        );
    }
    Ok(())
}

fn apply_overrides(config: &mut StompConfig, cli: &Cli) {
    if let Some(device) = &cli.device {
        config.engine.device = DeviceId::new(device.as_str());
    }
    if let Some(format) = cli.format {
        config.engine.format = format;
    }
    if let Some(effect) = cli.effect {
        config.parameters.effect = effect;
    }
}

/// Relative preset dirs live next to the config file
fn resolve_preset_dir(config: &StompConfig, config_dir: &Path) -> PathBuf {
    if config.app.preset_dir.is_absolute() {
        config.app.preset_dir.clone()
    } else {
        config_dir.join(&config.app.preset_dir)
    }
}

async fn spawn_preset_watcher(
    presets: &PresetManager,
    params: Arc<ParameterStore>,
    active: ActivePreset,
) -> anyhow::Result<ConfigWatcher> {
    let watcher = ConfigWatcher::new(presets.preset_dir().to_path_buf())
        .await
        .context("Failed to watch preset directory")?;
    let mut changes = watcher.subscribe();
    let reader = PresetManager::new(presets.preset_dir().to_path_buf());

    tokio::spawn(async move {
        loop {
            let path = match changes.recv().await {
                Ok(path) => path,
                Err(RecvError::Lagged(missed)) => {
                    warn!(missed, "Preset watcher lagging");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };
            let changed = PresetManager::preset_name(&path).map(str::to_string);
            let is_active = {
                let active = active.lock().unwrap_or_else(PoisonError::into_inner);
                changed.is_some() && *active == changed
            };
            if !is_active {
                continue;
            }
            match reader.load_preset_file(&path).await {
                Ok(loaded) => {
                    params.replace(loaded);
                    info!(path = %path.display(), "Active preset reloaded");
                }
                Err(e) => warn!(path = %path.display(), "Preset reload failed: {}", e),
            }
        }
    });

    Ok(watcher)
}

impl Pedal {
    fn store(&self) -> &ParameterStore {
        self.engine.params()
    }

    fn set_active_preset(&self, name: Option<String>) {
        *self.active_preset.lock().unwrap_or_else(PoisonError::into_inner) = name;
    }

    async fn execute(&mut self, command: Command) -> anyhow::Result<()> {
        match command {
            Command::Quit => {}
            Command::Select(kind) => {
                self.engine.select_effect(kind);
                self.control.selected(kind);
                println!("{}", menu::menu_text(kind));
            }
            Command::Set { name, value } => {
                let published = self.engine.params().set_by_name(&name, value)?;
                println!("{} = {}", name, published);
            }
            Command::Knob { knob, raw } => {
                let level = self.control.knob(self.engine.params(), knob, raw);
                println!("{:?} = {:.3}", knob, level);
            }
            Command::Turn(steps) => {
                let kind = self.control.turn(self.engine.params(), steps);
                println!("effect: {}", kind);
            }
            Command::Press => {
                if let Some(kind) = self.control.press(self.engine.params(), Instant::now()) {
                    println!("effect: {}", kind);
                }
            }
            Command::Show => {
                let json = serde_json::to_string_pretty(&self.engine.parameters())?;
                println!("{}", json);
            }
            Command::Status => {
                println!(
                    "engine {} | effect {} | xruns {}",
                    self.engine.state(),
                    self.store().active_effect(),
                    self.xruns.load(Ordering::Relaxed)
                );
            }
            Command::Start => self.engine.start()?,
            Command::Stop => self.engine.stop()?,
            Command::Save(name) => {
                self.presets
                    .save_preset(&name, &self.engine.parameters())
                    .await
                    .with_context(|| format!("Failed to save preset '{}'", name))?;
                self.set_active_preset(Some(name));
            }
            Command::Load(name) => {
                let params = self
                    .presets
                    .load_preset(&name)
                    .await
                    .with_context(|| format!("Failed to load preset '{}'", name))?;
                let applied = self.store().replace(params);
                self.control.selected(applied.effect);
                self.set_active_preset(Some(name));
                println!("{}", menu::menu_text(applied.effect));
            }
            Command::Presets => {
                for name in self.presets.list_presets().await? {
                    println!("  {}", name);
                }
            }
            Command::Help => println!("{}", menu::help_text()),
        }
        Ok(())
    }
}
