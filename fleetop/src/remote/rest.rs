//! REST transport: `GET /api/4/...` returning JSON.

use async_trait::async_trait;
use serde_json::Value;
use url::Url;

use super::{
    check_status, plugin_list, Endpoint, ProtocolOutcome, RemoteError, RemoteServer, API_VERSION,
};

pub struct RestServer {
    client: reqwest::Client,
    base: Url,
    uri: String,
    auth: Option<(String, String)>,
}

impl RestServer {
    pub fn new(ep: &Endpoint) -> ProtocolOutcome<Self> {
        let uri = ep.base_url();
        let base = Url::parse(&format!("{uri}/api/{API_VERSION}"))
            .map_err(|e| RemoteError::Transport(format!("bad url {uri}: {e}")))?;
        Ok(Self {
            client: ep.http_client()?,
            base,
            uri,
            auth: ep.credentials(),
        })
    }

    pub fn url_for(&self, segments: &[&str]) -> ProtocolOutcome<Url> {
        let mut u = self.base.clone();
        u.path_segments_mut()
            .map_err(|_| RemoteError::Transport(format!("{} cannot hold a path", self.base)))?
            .extend(segments);
        Ok(u)
    }

    async fn get_json(&self, segments: &[&str]) -> ProtocolOutcome<Value> {
        let mut req = self.client.get(self.url_for(segments)?);
        if let Some((user, pass)) = &self.auth {
            req = req.basic_auth(user, Some(pass));
        }
        let resp = req.send().await?;
        check_status(resp.status())?;
        Ok(resp.json::<Value>().await?)
    }
}

#[async_trait]
impl RemoteServer for RestServer {
    fn uri(&self) -> &str {
        &self.uri
    }

    async fn init(&self) -> ProtocolOutcome<String> {
        let status = self.get_json(&["status"]).await?;
        status
            .get("version")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| RemoteError::Protocol("status carries no version".into()))
    }

    async fn get_all(&self) -> ProtocolOutcome<Value> {
        self.get_json(&["all"]).await
    }

    async fn get_all_plugins(&self) -> ProtocolOutcome<Vec<String>> {
        plugin_list(self.get_json(&["pluginslist"]).await?)
    }

    async fn get_plugin(&self, plugin: &str) -> ProtocolOutcome<Value> {
        self.get_json(&[plugin]).await
    }

    async fn get_plugin_view(&self, plugin: &str) -> ProtocolOutcome<Value> {
        self.get_json(&[plugin, "views"]).await
    }

    async fn get_field(&self, plugin: &str, field: &str) -> ProtocolOutcome<Value> {
        let v = self.get_json(&[plugin, field]).await?;
        v.get(field)
            .cloned()
            .ok_or_else(|| RemoteError::Protocol(format!("no field {plugin}.{field}")))
    }
}
