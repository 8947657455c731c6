//! XML-RPC transport: POST `/RPC2`, string results carrying JSON.

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use serde_json::Value;

use super::{
    check_status, parse_json, plugin_list, xmlrpc, Endpoint, ProtocolOutcome, RemoteError,
    RemoteServer,
};

pub struct RpcServer {
    client: reqwest::Client,
    url: String,
    uri: String,
    auth: Option<(String, String)>,
}

/// `cpu` -> `getCpu`
pub fn plugin_method(plugin: &str) -> String {
    let mut chars = plugin.chars();
    match chars.next() {
        Some(first) => format!("get{}{}", first.to_ascii_uppercase(), chars.as_str()),
        None => "get".into(),
    }
}

impl RpcServer {
    pub fn new(ep: &Endpoint) -> ProtocolOutcome<Self> {
        let uri = ep.base_url();
        Ok(Self {
            client: ep.http_client()?,
            url: format!("{uri}/RPC2"),
            uri,
            auth: ep.credentials(),
        })
    }

    pub async fn call(&self, method: &str, params: &[&str]) -> ProtocolOutcome<String> {
        let mut req = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, "text/xml")
            .body(xmlrpc::encode_call(method, params));
        if let Some((user, pass)) = &self.auth {
            req = req.basic_auth(user, Some(pass));
        }
        let resp = req.send().await?;
        check_status(resp.status())?;
        let body = resp.text().await?;
        xmlrpc::decode_response(&body).map_err(|e| RemoteError::Protocol(e.to_string()))
    }
}

#[async_trait]
impl RemoteServer for RpcServer {
    fn uri(&self) -> &str {
        &self.uri
    }

    async fn init(&self) -> ProtocolOutcome<String> {
        self.call("init", &[]).await
    }

    async fn get_all(&self) -> ProtocolOutcome<Value> {
        parse_json(&self.call("getAll", &[]).await?)
    }

    async fn get_all_plugins(&self) -> ProtocolOutcome<Vec<String>> {
        plugin_list(parse_json(&self.call("getAllPlugins", &[]).await?)?)
    }

    async fn get_plugin(&self, plugin: &str) -> ProtocolOutcome<Value> {
        parse_json(&self.call(&plugin_method(plugin), &[]).await?)
    }

    async fn get_plugin_view(&self, plugin: &str) -> ProtocolOutcome<Value> {
        parse_json(&self.call("getPluginView", &[plugin]).await?)
    }
}
