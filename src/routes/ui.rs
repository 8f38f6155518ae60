use axum::{extract::State, response::Html, routing::get, Router};

use super::not_found;
use crate::config::UploadConfig;
use crate::models::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index).fallback(not_found))
        .with_state(state)
}

async fn index(State(state): State<AppState>) -> Html<String> {
    Html(render_page(&state.config.upload))
}

fn render_page(upload: &UploadConfig) -> String {
    UPLOAD_PAGE
        .replace("{{ttl}}", &upload.ttl_label())
        .replace("{{max_size}}", &upload.max_file_size_label())
}

const UPLOAD_PAGE: &str = r#"<!doctype html>
<html lang="en">
<head>
  <meta charset="utf-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1" />
  <title>Share a File Temporarily</title>
  <style>
    body { font-family: Arial, sans-serif; margin: 0; min-height: 100vh; display: flex; align-items: center; justify-content: center; background: #f1f5f9; color: #1d1d1f; }
    .card { background: #fff; border-radius: 12px; box-shadow: 0 10px 30px rgba(0,0,0,0.08); padding: 2rem; max-width: 32rem; width: 100%; margin: 1rem; }
    h1 { margin-top: 0; }
    .drop { border: 2px dashed #60a5fa; border-radius: 10px; background: #eff6ff; padding: 2.5rem 1rem; text-align: center; cursor: pointer; }
    .drop.active { border-color: #2563eb; background: #dbeafe; }
    .drop.ready { border-color: #22c55e; background: #f0fdf4; }
    .hint { font-size: 0.8rem; color: #6b7280; }
    button { margin-top: 1rem; width: 100%; padding: 0.75rem 1rem; border: 0; border-radius: 8px; background: #2563eb; color: #fff; font-weight: 600; cursor: pointer; }
    button:disabled { background: #9ca3af; }
    .result { display: none; margin-top: 1.5rem; }
    .result input { width: 100%; padding: 0.5rem; box-sizing: border-box; }
    .error { color: #dc2626; margin-top: 1rem; }
  </style>
</head>
<body>
  <div class="card">
    <h1>Share a File Temporarily</h1>
    <p>Upload a file and get a link. The link will expire in <strong>{{ttl}}</strong>.</p>

    <form id="uploadForm">
      <div id="dropZone" class="drop">
        <p id="dropText"><strong>Drag and drop</strong> or <strong>click to upload</strong></p>
        <p class="hint">Max file size: {{max_size}}</p>
      </div>
      <input type="file" id="fileInput" name="file" hidden required />
      <button type="submit" id="uploadButton">Upload</button>
    </form>

    <div id="error" class="error"></div>

    <div id="result" class="result">
      <label for="shareUrl">Your link:</label>
      <input type="text" id="shareUrl" readonly />
      <button type="button" id="copyButton">Copy</button>
    </div>
  </div>

  <script>
    const form = document.getElementById('uploadForm');
    const fileInput = document.getElementById('fileInput');
    const dropZone = document.getElementById('dropZone');
    const dropText = document.getElementById('dropText');
    const uploadButton = document.getElementById('uploadButton');
    const errorBox = document.getElementById('error');
    const result = document.getElementById('result');
    const shareUrl = document.getElementById('shareUrl');
    const copyButton = document.getElementById('copyButton');

    function selectFiles(files) {
      if (files.length > 0) {
        fileInput.files = files;
        dropText.textContent = files[0].name;
        dropZone.classList.add('ready');
      }
    }

    dropZone.addEventListener('click', () => fileInput.click());
    fileInput.addEventListener('change', (e) => selectFiles(e.target.files));
    ['dragenter', 'dragover'].forEach((name) => dropZone.addEventListener(name, (e) => {
      e.preventDefault();
      dropZone.classList.add('active');
    }));
    ['dragleave', 'drop'].forEach((name) => dropZone.addEventListener(name, (e) => {
      e.preventDefault();
      dropZone.classList.remove('active');
    }));
    dropZone.addEventListener('drop', (e) => selectFiles(e.dataTransfer.files));

    form.addEventListener('submit', async (e) => {
      e.preventDefault();
      errorBox.textContent = '';
      if (!fileInput.files.length) {
        errorBox.textContent = 'Please select a file to upload.';
        return;
      }

      const formData = new FormData();
      formData.append('file', fileInput.files[0]);
      uploadButton.disabled = true;
      uploadButton.textContent = 'Uploading...';

      try {
        const res = await fetch('/upload', { method: 'POST', body: formData });
        if (!res.ok) {
          throw new Error(`Upload failed: ${await res.text()}`);
        }
        const json = await res.json();
        if (!json.success) {
          throw new Error('Upload failed. Server did not return a URL.');
        }
        shareUrl.value = json.url;
        result.style.display = 'block';
      } catch (err) {
        errorBox.textContent = err.message;
      } finally {
        uploadButton.disabled = false;
        uploadButton.textContent = 'Upload';
      }
    });

    copyButton.addEventListener('click', async () => {
      try {
        await navigator.clipboard.writeText(shareUrl.value);
        copyButton.textContent = 'Copied!';
      } catch (err) {
        shareUrl.select();
        errorBox.textContent = 'Failed to copy. Please copy manually.';
      }
      setTimeout(() => { copyButton.textContent = 'Copy'; }, 2000);
    });
  </script>
</body>
</html>"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::storage::MemoryStore;
    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
    };
    use std::sync::Arc;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_index_serves_upload_form() {
        let state = AppState::new(Config::default(), Arc::new(MemoryStore::new()));
        let response = router(state)
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/html; charset=utf-8"
        );

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let html = String::from_utf8(body.to_vec()).unwrap();
        assert!(html.contains("expire in <strong>1 hour</strong>"));
        assert!(html.contains("Max file size: 100MB"));
        assert!(html.contains("fetch('/upload'"));
        assert!(!html.contains("{{"));
    }

    #[test]
    fn test_page_reflects_configured_limits() {
        let upload = UploadConfig {
            ttl_secs: 1800,
            max_file_size: 10 * 1024 * 1024,
        };
        let html = render_page(&upload);
        assert!(html.contains("30 minutes"));
        assert!(html.contains("10MB"));
    }
}
