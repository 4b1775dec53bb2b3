use axum::response::Html;

const INDEX_HTML: &str = include_str!("../templates/index.html");

/// Render the upload page, injecting the configured size cap.
pub fn render_index(max_upload_mb: u32) -> Html<String> {
    Html(INDEX_HTML.replace("{{ max_upload_mb }}", &max_upload_mb.to_string()))
}
