//! HTML status page served at `/`

use std::path::Path;
use std::sync::Arc;

use axum::extract::State;
use axum::response::Html;

use super::listener::RelayState;

/// Snapshot rendered by the status page
#[derive(Debug, Clone)]
pub struct StatusPage<'a> {
    pub output_dir: &'a Path,
    pub ingest_path: &'a str,
    pub viewer_path: &'a str,
    pub producer_live: bool,
    pub viewers: usize,
}

impl StatusPage<'_> {
    /// Render as an HTML document
    pub fn render(&self) -> String {
        let producer = if self.producer_live {
            "🔴 Producer connected, recording"
        } else {
            "⚪ Waiting for a producer"
        };

        format!(
            r#"<!DOCTYPE html>
<html>
<head>
    <title>Webcam streaming relay</title>
    <style>
        body {{ font-family: Arial, sans-serif; margin: 40px; }}
        .status {{ padding: 20px; background-color: #e0f7fa; border-radius: 5px; }}
    </style>
</head>
<body>
    <h1>Webcam streaming relay</h1>
    <div class="status">
        <p>✅ Relay is running and accepting connections</p>
        <p>{producer}</p>
        <p>Viewers: {viewers}</p>
        <p>Recordings directory: <code>{dir}</code></p>
        <p>Producer endpoint: <code>{ingest}</code>, viewer endpoint: <code>{viewer}</code></p>
    </div>
</body>
</html>
"#,
            producer = producer,
            viewers = self.viewers,
            dir = escape_html(&self.output_dir.display().to_string()),
            ingest = escape_html(self.ingest_path),
            viewer = escape_html(self.viewer_path),
        )
    }
}

/// `GET /` (and `HEAD /`): relay status as HTML
pub(crate) async fn status_page(State(state): State<Arc<RelayState>>) -> Html<String> {
    let page = StatusPage {
        output_dir: &state.config.output_dir,
        ingest_path: &state.config.ingest_path,
        viewer_path: &state.config.viewer_path,
        producer_live: state.ingest_slot.is_taken(),
        viewers: state.registry.len().await,
    };
    Html(page.render())
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
