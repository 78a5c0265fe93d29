use async_trait::async_trait;
use serde::de::DeserializeOwned;

#[async_trait]
pub trait Tool: Send + Sync {
    type Context: Send + Sync;

    async fn apply(&self, context: &Self::Context) -> anyhow::Result<String>;

    /// Build the tool from the raw argument text of an inline `[[name:args]]` marker.
    ///
    /// Tools taking a JSON object can keep the default; single-argument tools
    /// override this to take the text verbatim.
    fn from_inline(args: &str) -> Result<Self, serde_json::Error>
    where
        Self: Sized + DeserializeOwned,
    {
        serde_json::from_str(args)
    }
}
