//! Shared application state.

use std::sync::Arc;
use std::time::Duration;

use concierge_channels::{GuestPhoneRegistry, MessageSender, WebhookProcessor, WhatsAppClient};
use concierge_common::Config;
use concierge_core::{AnthropicProvider, Concierge, DocumentStore, KnowledgeLoader, Provider, SessionStore};

/// Everything the route handlers need, built once at startup.
pub struct AppState {
    pub documents: DocumentStore,
    pub concierge: Arc<Concierge>,
    pub webhook: WebhookProcessor,
    pub max_upload_bytes: usize,
}

impl AppState {
    /// Wire the components from `config` around the given collaborators.
    pub fn new(
        config: &Config,
        provider: Arc<dyn Provider>,
        sender: Option<Arc<dyn MessageSender>>,
    ) -> anyhow::Result<Self> {
        let storage = &config.storage;
        let sessions = Arc::new(SessionStore::new(&storage.history_dir));
        let concierge = Arc::new(Concierge::new(
            provider,
            KnowledgeLoader::new(&storage.apartments_dir),
            sessions,
            &config.llm,
            config.concierge.clone(),
        ));

        let registry = Arc::new(GuestPhoneRegistry::load(&storage.phone_registry_path)?);
        let webhook = WebhookProcessor::new(&config.whatsapp, registry, concierge.clone(), sender);

        Ok(Self {
            documents: DocumentStore::new(&storage.apartments_dir),
            concierge,
            webhook,
            max_upload_bytes: config.server.max_upload_bytes,
        })
    }
}

/// Production state: Anthropic responder and, when configured, the WhatsApp client.
pub fn create_state(config: &Config) -> anyhow::Result<Arc<AppState>> {
    let llm = &config.llm;
    let provider: Arc<dyn Provider> = Arc::new(AnthropicProvider::with_base_url(
        llm.api_key.clone().unwrap_or_default(),
        &llm.base_url,
        Duration::from_secs(llm.timeout_secs),
    ));

    let sender = WhatsAppClient::from_config(&config.whatsapp)
        .map(|client| Arc::new(client) as Arc<dyn MessageSender>);

    Ok(Arc::new(AppState::new(config, provider, sender)?))
}
