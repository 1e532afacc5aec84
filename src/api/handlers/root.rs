use axum::{http::StatusCode, response::IntoResponse};
use tracing::instrument;

// axum handler for /
#[instrument]
pub async fn root() -> impl IntoResponse {
    (
        StatusCode::OK,
        concat!(env!("CARGO_PKG_NAME"), " ", env!("CARGO_PKG_VERSION")),
    )
}

#[cfg(test)]
mod tests {
    use super::root;
    use anyhow::Result;
    use axum::{body::to_bytes, http::StatusCode, response::IntoResponse};

    #[tokio::test]
    async fn root_returns_banner() -> Result<()> {
        let response = root().await.into_response();
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX).await?;
        let body_text = String::from_utf8(body.to_vec())?;

        assert!(body_text.contains(env!("CARGO_PKG_NAME")));
        Ok(())
    }
}
