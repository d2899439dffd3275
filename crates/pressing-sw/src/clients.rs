//! Clients API: the page windows the agent can see.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use hashbrown::HashMap;
use tokio::sync::RwLock;
use tracing::debug;
use url::Url;

use crate::error::ClientError;

/// A client (page or worker under the agent's scope).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Client {
    /// Client ID.
    pub id: String,

    /// Client URL.
    pub url: Url,

    /// Client type.
    pub client_type: ClientType,

    /// Visibility state.
    pub visibility_state: VisibilityState,

    /// Whether focused.
    pub focused: bool,

    /// Version tag of the agent controlling this client.
    pub controller: Option<String>,
}

/// Client type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClientType {
    #[default]
    Window,
    Worker,
    SharedWorker,
    All,
}

/// Visibility state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisibilityState {
    Hidden,
    Visible,
}

impl Client {
    /// A visible, unfocused window at `url`.
    pub fn window(id: impl Into<String>, url: Url) -> Self {
        Self {
            id: id.into(),
            url,
            client_type: ClientType::Window,
            visibility_state: VisibilityState::Visible,
            focused: false,
            controller: None,
        }
    }

    /// Whether this client lives on `origin`.
    pub fn same_origin(&self, origin: &Url) -> bool {
        self.url.origin() == origin.origin()
    }
}

/// Options for [`ClientHost::match_all`].
#[derive(Debug, Clone, Default)]
pub struct ClientMatchOptions {
    /// Include clients not yet controlled by this agent.
    pub include_uncontrolled: bool,
    pub client_type: ClientType,
}

/// Host-side access to client windows.
#[async_trait]
pub trait ClientHost: Send + Sync {
    /// Enumerate clients.
    async fn match_all(&self, options: ClientMatchOptions) -> Result<Vec<Client>, ClientError>;

    /// Navigate a window client to `url`.
    async fn navigate(&self, id: &str, url: &Url) -> Result<Client, ClientError>;

    /// Bring a window client to the front.
    async fn focus(&self, id: &str) -> Result<Client, ClientError>;

    /// Open a new window at `url`.
    async fn open_window(&self, url: &Url) -> Result<Client, ClientError>;

    /// Take control of every client; returns how many were claimed.
    async fn claim(&self, controller: &str) -> Result<usize, ClientError>;
}

/// In-memory [`ClientHost`].
#[derive(Debug, Default)]
pub struct Clients {
    clients: RwLock<HashMap<String, Client>>,
}

impl Clients {
    /// Create new clients manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a client by ID.
    pub async fn get(&self, id: &str) -> Option<Client> {
        self.clients.read().await.get(id).cloned()
    }

    /// Add a client.
    pub async fn add(&self, client: Client) {
        self.clients.write().await.insert(client.id.clone(), client);
    }

    /// Remove a client.
    pub async fn remove(&self, id: &str) -> Option<Client> {
        self.clients.write().await.remove(id)
    }

    pub async fn len(&self) -> usize {
        self.clients.read().await.len()
    }
}

#[async_trait]
impl ClientHost for Clients {
    async fn match_all(&self, options: ClientMatchOptions) -> Result<Vec<Client>, ClientError> {
        let clients = self.clients.read().await;
        let mut matched: Vec<Client> = clients
            .values()
            .filter(|c| options.include_uncontrolled || c.controller.is_some())
            .filter(|c| match options.client_type {
                ClientType::All => true,
                t => c.client_type == t,
            })
            .cloned()
            .collect();
        // Focused first, then stable by id.
        matched.sort_by(|a, b| b.focused.cmp(&a.focused).then_with(|| a.id.cmp(&b.id)));
        Ok(matched)
    }

    async fn navigate(&self, id: &str, url: &Url) -> Result<Client, ClientError> {
        let mut clients = self.clients.write().await;
        let client = clients
            .get_mut(id)
            .ok_or_else(|| ClientError::NotFound(id.to_string()))?;
        if client.client_type != ClientType::Window {
            return Err(ClientError::NotAWindow(id.to_string()));
        }
        debug!(client = %id, url = %url, "Navigating client");
        client.url = url.clone();
        Ok(client.clone())
    }

    async fn focus(&self, id: &str) -> Result<Client, ClientError> {
        let mut clients = self.clients.write().await;
        match clients.get(id) {
            None => return Err(ClientError::NotFound(id.to_string())),
            Some(c) if c.client_type != ClientType::Window => {
                return Err(ClientError::NotAWindow(id.to_string()))
            }
            Some(_) => {}
        }

        let mut focused = None;
        for client in clients.values_mut() {
            client.focused = client.id == id;
            if client.focused {
                client.visibility_state = VisibilityState::Visible;
                focused = Some(client.clone());
            }
        }
        focused.ok_or_else(|| ClientError::NotFound(id.to_string()))
    }

    async fn open_window(&self, url: &Url) -> Result<Client, ClientError> {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        let id = format!("client-{}", COUNTER.fetch_add(1, Ordering::Relaxed));

        let mut clients = self.clients.write().await;
        for client in clients.values_mut() {
            client.focused = false;
        }

        let mut client = Client::window(id.clone(), url.clone());
        client.focused = true;
        clients.insert(id, client.clone());
        debug!(client = %client.id, url = %url, "Opened window");
        Ok(client)
    }

    async fn claim(&self, controller: &str) -> Result<usize, ClientError> {
        let mut clients = self.clients.write().await;
        for client in clients.values_mut() {
            client.controller = Some(controller.to_string());
        }
        Ok(clients.len())
    }
}
