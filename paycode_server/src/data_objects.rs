use std::fmt::Display;

use paycode_engine::monitor_objects::{HeartbeatMessage, PushMessage};
use serde::{Deserialize, Serialize};

use crate::errors::ServerError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonResponse {
    pub success: bool,
    pub message: String,
}

impl JsonResponse {
    pub fn success<S: Display>(message: S) -> Self {
        Self { success: true, message: message.to_string() }
    }

    pub fn failure<S: Display>(message: S) -> Self {
        Self { success: false, message: message.to_string() }
    }
}

/// Heartbeat fields as sent by the monitor agent, either in the query string or in a form body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HeartbeatParams {
    pub appid: Option<String>,
    pub t: Option<String>,
    pub sign: Option<String>,
}

/// Payment push fields as sent by the monitor agent, either in the query string or in a form body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PushParams {
    pub appid: Option<String>,
    pub t: Option<String>,
    pub sign: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub price: Option<String>,
}

/// Body fields take precedence over query fields. Empty values count as missing.
fn merge(body: Option<String>, query: Option<String>) -> Option<String> {
    body.filter(|s| !s.is_empty()).or_else(|| query.filter(|s| !s.is_empty()))
}

fn required(value: Option<String>, name: &'static str) -> Result<String, ServerError> {
    value.ok_or(ServerError::MissingField(name))
}

impl HeartbeatParams {
    pub fn merge(self, body: Option<HeartbeatParams>) -> Self {
        let body = body.unwrap_or_default();
        Self { appid: merge(body.appid, self.appid), t: merge(body.t, self.t), sign: merge(body.sign, self.sign) }
    }
}

impl TryFrom<HeartbeatParams> for HeartbeatMessage {
    type Error = ServerError;

    fn try_from(p: HeartbeatParams) -> Result<Self, Self::Error> {
        Ok(Self { app_id: p.appid, t: required(p.t, "t")?, sign: required(p.sign, "sign")? })
    }
}

impl PushParams {
    pub fn merge(self, body: Option<PushParams>) -> Self {
        let body = body.unwrap_or_default();
        Self {
            appid: merge(body.appid, self.appid),
            t: merge(body.t, self.t),
            sign: merge(body.sign, self.sign),
            kind: merge(body.kind, self.kind),
            price: merge(body.price, self.price),
        }
    }
}

impl TryFrom<PushParams> for PushMessage {
    type Error = ServerError;

    fn try_from(p: PushParams) -> Result<Self, Self::Error> {
        Ok(Self {
            app_id: p.appid,
            t: required(p.t, "t")?,
            sign: required(p.sign, "sign")?,
            kind: required(p.kind, "type")?,
            price: required(p.price, "price")?,
        })
    }
}
