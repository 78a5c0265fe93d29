use super::ToolContext;
use crate::types::Tool;

use async_trait::async_trait;
use chrono::Local;
use schemars::JsonSchema;
use serde::Deserialize;

pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Deserialize, JsonSchema, Default)]
#[schemars(
    title = "get_current_time",
    description = "Get the current local time in the system's default timezone."
)]
pub struct GetCurrentTime {}

#[async_trait]
impl Tool for GetCurrentTime {
    type Context = ToolContext;

    async fn apply(&self, _: &ToolContext) -> anyhow::Result<String> {
        Ok(Local::now().format(TIME_FORMAT).to_string())
    }

    fn from_inline(_: &str) -> Result<Self, serde_json::Error> {
        Ok(Self::default())
    }
}
