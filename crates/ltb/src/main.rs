use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use ltb_core::{
    config::Config,
    link_service::LinkService,
    storage::{DataStore, LinkStore},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    ltb_core::logging::init("ltb")?;
    let cfg = Arc::new(Config::load()?);

    let links = LinkStore::open(&cfg.db_path)
        .await
        .with_context(|| format!("opening link database {}", cfg.db_path.display()))?;
    let data = DataStore::open(&cfg.data_db_path)
        .await
        .with_context(|| format!("opening data database {}", cfg.data_db_path.display()))?;
    info!(
        links = links.count().await?,
        users = data.count_users().await?,
        groups = data.count_groups().await?,
        "databases ready"
    );

    let service = Arc::new(LinkService::from_config(&cfg, links, data));
    ltb_telegram::router::run_polling(cfg, service).await
}
