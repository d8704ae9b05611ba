use async_trait::async_trait;
use reqwest::{Request, Response};

/// Executes prepared requests. Wrappers in [`super::auth`] decorate an inner
/// client with credentials.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, req: Request) -> reqwest::Result<Response>;
}
