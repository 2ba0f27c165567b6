use std::{path::PathBuf, sync::Arc, time::Duration};

use {
    anyhow::bail,
    clap::Parser,
    hal_auth::Authorizer,
    hal_channels::{
        ChatGateway, ConsoleGateway, DeliveryWorker, EventReceiver, GatewayEvent, Tracker,
        outbound_queue,
    },
    hal_common::types::BotIdentity,
    hal_config::{HalConfig, RbacConfig},
    hal_plugins::{PluginContext, PluginRegistry, RBAC_SERVICE, ServiceRegistry},
    hal_routing::{Dispatcher, DispatcherOptions},
    tokio::task::JoinSet,
    tokio_util::sync::CancellationToken,
    tracing::{debug, error, info, warn},
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Debug, Parser)]
#[command(name = "hal", about = "hal, a pluggable chat bot", version)]
struct Cli {
    /// Config file (default: discover hal.{toml,yaml,yml,json}).
    #[arg(long, env = "HAL_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, default_value_t = false)]
    json_logs: bool,

    /// Command prefix (overrides config value).
    #[arg(long, env = "HAL_PREFIX")]
    prefix: Option<String>,

    /// Disable a plugin by name. Repeatable.
    #[arg(long = "disable-plugin", value_name = "NAME")]
    disable_plugins: Vec<String>,

    /// RBAC database path (overrides config value).
    #[arg(long, env = "HAL_RBAC_DB")]
    rbac_db: Option<PathBuf>,

    /// Run without role-based access control.
    #[arg(long, default_value_t = false)]
    no_rbac: bool,
}

impl Cli {
    /// Fold command-line overrides into `config`.
    fn apply(&self, config: &mut HalConfig) {
        if let Some(prefix) = &self.prefix {
            config.bot.command_prefix.clone_from(prefix);
        }
        for name in &self.disable_plugins {
            if !config.plugins.disabled.contains(name) {
                config.plugins.disabled.push(name.clone());
            }
        }
        if let Some(path) = &self.rbac_db {
            config.rbac.database = Some(path.clone());
        }
        if self.no_rbac {
            config.rbac.enabled = false;
        }
    }
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    // Stdout carries the console conversation, logs go to stderr.
    if cli.json_logs {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

/// Open the authorizer, or run without one when RBAC is disabled or the
/// database cannot be opened.
async fn open_authorizer(rbac: &RbacConfig) -> Option<Arc<Authorizer>> {
    if !rbac.enabled {
        info!("rbac disabled, every command is allowed");
        return None;
    }
    let path = rbac
        .database
        .clone()
        .unwrap_or_else(|| hal_config::data_dir().join("rbac.db"));
    match Authorizer::open(&path).await {
        Ok(authz) => {
            info!(path = %path.display(), "rbac ready");
            Some(Arc::new(authz))
        },
        Err(e) => {
            error!(path = %path.display(), error = %e, "rbac unavailable, running without it");
            None
        },
    }
}

fn build_registry(config: &HalConfig) -> anyhow::Result<PluginRegistry> {
    let mut registry = PluginRegistry::new();
    hal_plugins::register_bundled(&mut registry)?;
    for name in &config.plugins.disabled {
        if let Err(e) = registry.disable(name) {
            warn!(plugin = %name, error = %e, "cannot disable plugin");
        }
    }
    Ok(registry)
}

async fn wait_for_connect(events: &mut EventReceiver) -> anyhow::Result<BotIdentity> {
    while let Some(event) = events.recv().await {
        match event {
            GatewayEvent::Connected(identity) => return Ok(identity),
            GatewayEvent::Disconnected { reason } => bail!("gateway disconnected: {reason}"),
            other => debug!(event = ?other, "event before connect ignored"),
        }
    }
    bail!("gateway closed before connecting")
}

async fn run(config: HalConfig) -> anyhow::Result<()> {
    let authorizer = open_authorizer(&config.rbac).await;

    let services = Arc::new(ServiceRegistry::new());
    if let Some(authz) = &authorizer {
        services.register(RBAC_SERVICE, Arc::clone(authz));
    }
    let (outbound, queue) = outbound_queue(config.bot.outbound_queue_size);
    let ctx = PluginContext {
        outbound,
        registry: Arc::new(build_registry(&config)?),
        services,
    };

    let cancel = CancellationToken::new();
    let tracker = Arc::new(Tracker::new());
    let reaper = tracker.spawn_reaper(
        Duration::from_secs(config.bot.reaper_interval_secs.max(1)),
        cancel.clone(),
    );
    let gateway: Arc<dyn ChatGateway> = Arc::new(ConsoleGateway::stdio());
    let delivery = DeliveryWorker::new(
        Arc::clone(&gateway),
        Arc::clone(&tracker),
        config.bot.default_ttl_minutes,
    )
    .spawn(queue, cancel.clone());

    let mut events = gateway.connect().await?;
    let identity = wait_for_connect(&mut events).await?;
    info!(bot_id = %identity.id, bot_name = %identity.name, "connected");

    let dispatcher = Arc::new(
        Dispatcher::new(
            ctx,
            gateway,
            identity.clone(),
            DispatcherOptions::from(&config.bot),
        )
        .with_authorizer(authorizer),
    );

    let mut tasks = JoinSet::new();
    loop {
        while tasks.try_join_next().is_some() {}
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, shutting down");
                break;
            },
            event = events.recv() => match event {
                Some(GatewayEvent::Message(message)) => {
                    if message.user_id == identity.id {
                        continue;
                    }
                    let dispatcher = Arc::clone(&dispatcher);
                    tasks.spawn(async move {
                        let outcome = dispatcher.dispatch(message).await;
                        debug!(?outcome, "message dispatched");
                    });
                },
                Some(GatewayEvent::Ack { correlation_id, stamp }) => {
                    if !tracker.update_tracking(&correlation_id, stamp) {
                        debug!(%correlation_id, "ack for untracked message");
                    }
                },
                Some(GatewayEvent::Connected(again)) => {
                    info!(bot_id = %again.id, "gateway reconnected");
                },
                Some(GatewayEvent::Disconnected { reason }) => {
                    info!(%reason, "gateway disconnected");
                    break;
                },
                None => break,
            },
        }
    }

    // Let in-flight handlers enqueue their replies before the queue closes.
    while tasks.join_next().await.is_some() {}
    drop(dispatcher);
    cancel.cancel();
    for (name, handle) in [("reaper", reaper), ("delivery", delivery)] {
        if let Err(e) = handle.await {
            warn!(task = name, error = %e, "background task failed");
        }
    }
    info!("hal stopped");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "hal starting");

    let mut config = match &cli.config {
        Some(path) => hal_config::load_config(path)?,
        None => hal_config::discover_and_load(),
    };
    cli.apply(&mut config);
    run(config).await
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_config() {
        let cli = Cli::try_parse_from([
            "hal",
            "--prefix",
            "?",
            "--disable-plugin",
            "echo",
            "--disable-plugin",
            "logger",
            "--rbac-db",
            "/tmp/hal-rbac.db",
            "--no-rbac",
        ])
        .unwrap();
        let mut config = HalConfig::default();
        config.plugins.disabled.push("echo".into());
        cli.apply(&mut config);

        assert_eq!(config.bot.command_prefix, "?");
        assert_eq!(config.plugins.disabled, ["echo", "logger"]);
        assert_eq!(config.rbac.database, Some(PathBuf::from("/tmp/hal-rbac.db")));
        assert!(!config.rbac.enabled);
    }

    #[test]
    fn no_flags_keep_config() {
        let cli = Cli::try_parse_from(["hal"]).unwrap();
        let mut config = HalConfig::default();
        cli.apply(&mut config);
        assert_eq!(config.bot.command_prefix, "!");
        assert!(config.rbac.enabled);
        assert!(config.plugins.disabled.is_empty());
    }

    #[test]
    fn disabled_plugins_stay_registered() {
        let mut config = HalConfig::default();
        config.plugins.disabled = vec!["logger".into(), "missing".into()];
        let registry = build_registry(&config).unwrap();
        assert_eq!(registry.len(), 4);
        assert!(!registry.get("logger").unwrap().is_enabled());
        assert!(registry.get("echo").unwrap().is_enabled());
    }

    #[tokio::test]
    async fn disabled_rbac_opens_nothing() {
        let rbac = RbacConfig {
            enabled: false,
            database: None,
        };
        assert!(open_authorizer(&rbac).await.is_none());
    }

    #[tokio::test]
    async fn connect_skips_early_events() {
        let (tx, mut rx) = tokio::sync::mpsc::channel(4);
        tx.send(GatewayEvent::Disconnected {
            reason: "flap".into(),
        })
        .await
        .unwrap();
        assert!(wait_for_connect(&mut rx).await.is_err());

        tx.send(GatewayEvent::Connected(BotIdentity::new("U1", "hal")))
            .await
            .unwrap();
        assert_eq!(wait_for_connect(&mut rx).await.unwrap().id, "U1");
    }
}
