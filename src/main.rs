use tracing_subscriber::EnvFilter;

use newswire::store::Database;
use newswire::{api, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("newswire=info,tower_http=info")),
        )
        .init();

    let config = Config::from_env();
    tracing::info!(
        host = %config.host,
        port = config.port,
        dev_mode = config.dev_mode,
        db = %config.database_path.display(),
        "starting newswire"
    );

    let db = Database::open(&config.database_path)?;
    api::serve(config, db).await
}
