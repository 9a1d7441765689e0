pub mod actions;
pub mod autopilot;
pub mod config;
pub mod error;
pub mod images;
pub mod media;
pub mod notify;
pub mod persistence;
pub mod publisher;
pub mod schedule;
pub mod scraper;
pub mod slug;
pub mod store;
pub mod synthesizer;
pub mod trends;
pub mod utils;

pub use autopilot::{
    PipelineOptions, PipelineServices, RunOptions, RunOutcome, RunSummary,
    Services, run_autopilot,
};
pub use error::{PipelineError, PublishError, StoreError};

#[cfg(test)]
pub(crate) mod test_support {
    /// Serve `router` on an ephemeral local port and return its base URL.
    pub async fn spawn_mock(router: axum::Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        format!("http://{addr}")
    }
}
