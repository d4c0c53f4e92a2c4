use crate::session::SessionStore;
use crate::sync::RemoteClient;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    /// None until `backend.configure` has been called.
    pub client: Option<RemoteClient>,
    pub session: SessionStore,
}
