use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PushMessage {
    #[serde(rename = "to")]
    pub token: String,
    pub title: String,
    pub body: String,
    pub data: Value,
    pub sound: &'static str,
}

impl PushMessage {
    pub fn new(token: impl Into<String>, title: impl Into<String>, body: impl Into<String>, data: Value) -> Self {
        Self {
            token: token.into(),
            title: title.into(),
            body: body.into(),
            data,
            sound: "default",
        }
    }
}
