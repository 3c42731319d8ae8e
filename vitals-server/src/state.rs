use std::sync::Arc;

use vitals_core::{
    create_invoker, create_store, CategoryCatalog, InvokeOptions, ModelInvoker, TraceStore,
    VitalsConfig,
};
use vitals_ingest::Extractor;

/// Everything a request handler needs, built once at startup and shared.
pub struct AppState {
    pub config: VitalsConfig,
    pub catalog: Arc<CategoryCatalog>,
    pub invoker: Arc<dyn ModelInvoker>,
    pub store: Arc<dyn TraceStore>,
    pub extractor: Extractor,
    pub options: InvokeOptions,
}

impl AppState {
    pub fn new(
        config: VitalsConfig,
        invoker: Arc<dyn ModelInvoker>,
        store: Arc<dyn TraceStore>,
    ) -> anyhow::Result<Self> {
        let extractor = Extractor::new(config.validation.text_field_max_length)?;
        Ok(Self {
            catalog: Arc::new(config.catalog()),
            options: InvokeOptions::from(&config.model),
            config,
            invoker,
            store,
            extractor,
        })
    }

    /// Open the configured provider client and trace backend.
    pub async fn from_config(config: VitalsConfig) -> anyhow::Result<Self> {
        let invoker: Arc<dyn ModelInvoker> = Arc::from(create_invoker(&config.model)?);
        let store = create_store(&config.trace).await?;
        tracing::info!(
            provider = invoker.name(),
            model = %config.model.model_name,
            trace_backend = store.name(),
            tracing_enabled = config.trace.enabled,
            "Application state ready"
        );
        Self::new(config, invoker, store)
    }
}
