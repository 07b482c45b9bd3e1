use std::path::PathBuf;
use std::sync::Arc;

use transfer_proxy::cfg::{ProxyConfig, DEFAULT_CONFIG_PATH};
use transfer_proxy::{control, Favicon, Listener, ProxyInfo, RoutingRegistry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

    let (config, load_error) = match ProxyConfig::load(&config_path) {
        Ok(config) => (config, None),
        Err(err) => (ProxyConfig::default(), Some(err)),
    };

    fern::Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "{} [{}/{}]: {}",
                chrono::Local::now().format("[%Y-%m-%d][%H:%M:%S]"),
                record.target(),
                record.level(),
                message
            ))
        })
        .level(config.log_level)
        .chain(std::io::stdout())
        .apply()?;

    log::info!("Proxy logger initialized.");

    if let Some(err) = load_error {
        log::warn!("Using default config: {:#}", err);
        if let Err(err) = config.save(&config_path) {
            log::error!("Could not write default config: {:#}", err);
        }
    }

    let favicon = config.status.favicon.as_deref().and_then(Favicon::load);
    let registry = Arc::new(RoutingRegistry::new());
    let proxy_info = Arc::new(ProxyInfo::new(config, registry.clone(), favicon));

    if proxy_info.config.control.enabled {
        let control_config = proxy_info.config.control.clone();
        tokio::spawn(async move {
            if let Err(err) = control::serve(&control_config, registry).await {
                log::error!("Control endpoint failed: {:#}", err);
            }
        });
    }

    let listener = Arc::new(Listener::bind(proxy_info).await?);
    tokio::select! {
        result = listener.run() => result?,
        _ = tokio::signal::ctrl_c() => log::info!("Shutting down."),
    }
    Ok(())
}
