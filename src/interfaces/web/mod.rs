mod handlers;
mod router;

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use crate::config::AppConfig;
use crate::core::llm::{LlmClient, OpenAiClient};
use crate::core::metrics::Metrics;
use crate::core::schema::TableSpec;
use crate::core::store::{ClickHouseStore, EncounterStore};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) table: Arc<TableSpec>,
    pub(crate) metrics: Arc<Metrics>,
    pub(crate) llm: Arc<dyn LlmClient>,
    /// `None` runs the whole surface in degraded mode.
    pub(crate) store: Option<Arc<dyn EncounterStore>>,
}

pub async fn run_server() -> Result<()> {
    let config = AppConfig::from_env();
    let metrics = Arc::new(Metrics::new());

    let llm: Arc<dyn LlmClient> = Arc::new(OpenAiClient::new(
        config.openai_api_key.clone(),
        config.openai_base_url.clone(),
        config.model.clone(),
        Arc::clone(&metrics),
    ));

    let store: Option<Arc<dyn EncounterStore>> = config
        .store
        .as_ref()
        .map(|sc| Arc::new(ClickHouseStore::new(sc)) as Arc<dyn EncounterStore>);

    let state = AppState { table: Arc::new(TableSpec::encounters()), metrics, llm, store };

    let app = router::build_api_router(state);
    let addr = format!("{}:{}", config.bind_host, config.bind_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("CareRadar API running at http://{addr}");
    axum::serve(listener, app).await?;

    Ok(())
}
