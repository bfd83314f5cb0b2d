//! Client for the hosted hash key-value service.
//!
//! Every command is one `POST` of a JSON array such as
//! `["HSET", "story:1", "title", "Brave Bunny"]` to the endpoint, with a
//! bearer token. Replies look like `{"result": ...}` or `{"error": "..."}`.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::{Fields, HashStore, KvError};

#[derive(Debug, Deserialize)]
struct CommandReply {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Clone)]
pub struct RestHashStore {
    client: reqwest::Client,
    url: String,
    token: String,
    decode_values: bool,
}

impl RestHashStore {
    pub fn new(url: &str, token: &str, timeout: Option<Duration>) -> Result<Self, KvError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(|e| KvError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            url: url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            decode_values: false,
        })
    }

    /// When on, field values that parse as JSON come back parsed
    /// (`"{\"a\":1}"` becomes an object, `"5"` becomes a number).
    ///
    /// The round trip is lossy for text that merely looks like JSON: a stored
    /// `"null"` decodes to `null` and the field is dropped on repair, and
    /// `"1.50"` reads back as `"1.5"`. Leave it off unless the deployment
    /// needs to match a decoding client.
    pub fn set_decode_values(&mut self, on: bool) {
        self.decode_values = on;
    }

    async fn command(&self, args: Vec<Value>) -> Result<Value, KvError> {
        let name = args.first().and_then(Value::as_str).unwrap_or_default().to_string();
        debug!(command = %name, "kv command");

        let resp = self
            .client
            .post(&self.url)
            .bearer_auth(&self.token)
            .json(&args)
            .send()
            .await
            .map_err(|e| KvError::Transport(e.to_string()))?;
        let status = resp.status();
        let reply: CommandReply = resp
            .json()
            .await
            .map_err(|e| KvError::Protocol(format!("{name}: status {status}: {e}")))?;

        if let Some(err) = reply.error {
            return Err(KvError::Remote(err));
        }
        if !status.is_success() {
            return Err(KvError::Remote(format!("{name}: http status {status}")));
        }
        Ok(reply.result.unwrap_or(Value::Null))
    }

    fn decode(&self, raw: String) -> Value {
        if self.decode_values {
            serde_json::from_str(&raw).unwrap_or(Value::String(raw))
        } else {
            Value::String(raw)
        }
    }
}

fn as_count(name: &str, v: &Value) -> Result<u64, KvError> {
    v.as_u64()
        .ok_or_else(|| KvError::Protocol(format!("{name}: expected integer, got {v}")))
}

/// Wire form of a field value: strings as-is, anything else JSON-encoded.
fn encode_arg(v: &Value) -> Value {
    match v {
        Value::String(_) => v.clone(),
        other => Value::String(other.to_string()),
    }
}

#[async_trait]
impl HashStore for RestHashStore {
    async fn hset(&self, key: &str, fields: &Fields) -> Result<(), KvError> {
        if fields.is_empty() {
            return Ok(());
        }
        let mut args = Vec::with_capacity(2 + fields.len() * 2);
        args.push(Value::from("HSET"));
        args.push(Value::from(key));
        for (k, v) in fields {
            args.push(Value::from(k.as_str()));
            args.push(encode_arg(v));
        }
        self.command(args).await?;
        Ok(())
    }

    async fn hgetall(&self, key: &str) -> Result<Option<Fields>, KvError> {
        let result = self.command(vec!["HGETALL".into(), key.into()]).await?;
        let items = match result {
            Value::Null => return Ok(None),
            Value::Array(items) => items,
            other => return Err(KvError::Protocol(format!("HGETALL: expected array, got {other}"))),
        };
        if items.is_empty() {
            return Ok(None);
        }
        if items.len() % 2 != 0 {
            return Err(KvError::Protocol(format!("HGETALL: odd reply length {}", items.len())));
        }

        let mut fields = Fields::new();
        let mut iter = items.into_iter();
        while let (Some(k), Some(v)) = (iter.next(), iter.next()) {
            let k = match k {
                Value::String(k) => k,
                other => return Err(KvError::Protocol(format!("HGETALL: non-string field name {other}"))),
            };
            let v = match v {
                Value::String(s) => self.decode(s),
                other => other,
            };
            fields.insert(k, v);
        }
        Ok(Some(fields))
    }

    async fn exists(&self, key: &str) -> Result<bool, KvError> {
        let result = self.command(vec!["EXISTS".into(), key.into()]).await?;
        Ok(as_count("EXISTS", &result)? > 0)
    }

    async fn del(&self, key: &str) -> Result<u64, KvError> {
        let result = self.command(vec!["DEL".into(), key.into()]).await?;
        as_count("DEL", &result)
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, KvError> {
        let result = self.command(vec!["KEYS".into(), pattern.into()]).await?;
        match result {
            Value::Null => Ok(Vec::new()),
            Value::Array(items) => items
                .into_iter()
                .map(|k| match k {
                    Value::String(s) => Ok(s),
                    other => Err(KvError::Protocol(format!("KEYS: non-string key {other}"))),
                })
                .collect(),
            other => Err(KvError::Protocol(format!("KEYS: expected array, got {other}"))),
        }
    }
}
