use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use std::sync::Arc;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::config::{AppConfig, ServerConfig};
use crate::pipeline::{ConversionRequest, Pipeline};
use crate::utils::PackError;

const UPLOAD_FORM: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>Web and PDF or images to Word</title>
<link rel="stylesheet" href="/styles.css">
<script>
function clearField(id) { document.getElementById(id).value = ''; }
</script>
</head>
<body>
<h1>Data collection website</h1>
<form method="post" enctype="multipart/form-data">
  <div class="head-text"><label for="url">Website URL:</label></div>
  <input type="text" id="url" name="url" placeholder="https://">
  <div class="button-url"><button type="button" onclick="clearField('url')">Clear URL</button></div>

  <div class="head-text"><label for="pdf">PDF file:</label></div>
  <input type="file" id="pdf" name="pdf" accept="application/pdf">
  <div class="button-pdf"><button type="button" onclick="clearField('pdf')">Clear PDF</button></div>

  <div class="head-text"><label for="images">Images:</label></div>
  <input type="file" id="images" name="images" accept="image/*" multiple>
  <div class="button-images"><button type="button" onclick="clearField('images')">Clear images</button></div>

  <div class="button-submit"><button type="submit">Convert</button></div>
</form>
</body>
</html>
"#;

pub struct AppState {
    pub pipeline: Pipeline,
    pub config: ServerConfig,
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Pipeline(PackError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message).into_response(),
            ApiError::Pipeline(e) => {
                if e.is_request_fatal() {
                    error!("转换失败: {}", e);
                } else {
                    warn!("转换中止: {}", e);
                }
                (StatusCode::INTERNAL_SERVER_ERROR, format!("conversion failed: {}", e)).into_response()
            }
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    let static_dir = state.config.static_dir.clone();
    let body_limit = state.config.max_body_bytes;

    Router::new()
        .route("/", get(form_handler).post(convert_handler))
        .fallback_service(ServeDir::new(static_dir))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(config: AppConfig) -> anyhow::Result<()> {
    let pipeline = Pipeline::new(&config)?;
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = Arc::new(AppState {
        pipeline,
        config: config.server,
    });

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("服务已启动: http://{}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("无法监听停止信号: {}", e);
            }
            info!("收到停止信号");
        })
        .await?;
    Ok(())
}

async fn form_handler() -> Html<&'static str> {
    Html(UPLOAD_FORM)
}

async fn convert_handler(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    let request = read_form(multipart, state.config.max_images).await?;
    info!(
        "收到转换请求: url={}, pdf={}, images={}",
        request.url.is_some(),
        request.pdf.is_some(),
        request.images.len()
    );

    let output = state.pipeline.run(request).await.map_err(ApiError::Pipeline)?;

    let headers = [
        (header::CONTENT_TYPE, "application/zip".to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename={}", state.config.archive_name),
        ),
    ];
    Ok((headers, output.archive).into_response())
}

/// 读取 url / pdf / images 三个字段；浏览器对未选择的文件框会提交空内容，视为未提供
async fn read_form(mut multipart: Multipart, max_images: usize) -> Result<ConversionRequest, ApiError> {
    let bad_request = |e: axum::extract::multipart::MultipartError| ApiError::BadRequest(e.to_string());

    let mut url: Option<String> = None;
    let mut pdf: Option<Vec<u8>> = None;
    let mut images: Vec<Vec<u8>> = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(bad_request)? {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "url" => url = Some(field.text().await.map_err(bad_request)?),
            "pdf" => {
                let data = field.bytes().await.map_err(bad_request)?;
                if data.is_empty() {
                    continue;
                }
                if pdf.is_some() {
                    return Err(ApiError::BadRequest("only one pdf file is accepted".to_string()));
                }
                pdf = Some(data.to_vec());
            }
            "images" => {
                let data = field.bytes().await.map_err(bad_request)?;
                if data.is_empty() {
                    continue;
                }
                if images.len() >= max_images {
                    return Err(ApiError::BadRequest(format!("at most {} images are accepted", max_images)));
                }
                images.push(data.to_vec());
            }
            other => debug!("忽略字段: {}", other),
        }
    }

    Ok(ConversionRequest::new(url, pdf, images))
}
