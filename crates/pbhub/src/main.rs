pub mod config;

use config::PbHubAppConfig;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[cfg(not(any(feature = "rpi", feature = "sims")))]
compile_error!("enable at least one of the `rpi` or `sims` features");

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pbhub=debug,pbhub_devices=debug,pbhub_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

//cancels the token on the first Ctrl-C
fn spawn_shutdown_listener(cancel_token: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Ctrl-C received, shutting down.");
                cancel_token.cancel();
            }
            Err(err) => error!("could not listen for Ctrl-C! {}", err),
        }
    });
}

#[tokio::main]
async fn main() {
    init_tracing();

    let mut args = std::env::args().skip(1);
    let (Some(cfg_name), None) = (args.next(), args.next()) else {
        warn!("usage: pbhub <config file>");
        return;
    };

    let config = match PbHubAppConfig::new(&cfg_name) {
        Ok(config) => config,
        Err(err) => {
            error!("could not load config {}: {:?}", cfg_name, err);
            return;
        }
    };

    info!(
        "PbHub starting with {} modules and {} pipes",
        config.modules.len(),
        config.pipes.len()
    );
    if let Some(ref name) = config.metadata.name {
        info!("name: {name}")
    }
    if let Some(ref descrip) = config.metadata.description {
        info!("description: {descrip}")
    }

    let cancel_token = CancellationToken::new();
    spawn_shutdown_listener(cancel_token.clone());

    match config.start(cancel_token).await {
        Ok(()) => info!("PbHub shut down!"),
        Err(err) => error!("PbHub exited with an error: {:?}", err),
    }
}
