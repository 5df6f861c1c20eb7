//! HTTP request handlers for API endpoints

use axum::{
    extract::{Multipart, Path, State},
    http::{header, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use docmerge_core::{DocmergeError, MergeOutput, MergeRequest, Variable};
use docmerge_pipeline::{Upload, VariableUpdate};
use tracing::{error, info, warn};

use crate::types::{
    AddVariableRequest, CreateEntryRequest, CreateTemplateResponse, ErrorResponse,
    HealthResponse, OcrRequest, OcrResponse, PreviewResponse,
};
use crate::ApiState;

/// Set on binary merge responses; `true` when the template came back unmerged
pub const MERGE_DEGRADED_HEADER: HeaderName = HeaderName::from_static("x-merge-degraded");
/// Comma-separated unresolved variables of a degraded binary merge
pub const UNRESOLVED_HEADER: HeaderName = HeaderName::from_static("x-unresolved-variables");

/// Error returned by handlers
#[derive(Debug)]
pub enum ApiError {
    /// Malformed request (multipart framing, missing fields)
    BadRequest(String),
    Engine(DocmergeError),
}

impl From<DocmergeError> for ApiError {
    fn from(err: DocmergeError) -> Self {
        Self::Engine(err)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Engine(DocmergeError::FormatError(_) | DocmergeError::ValidationError { .. }) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            Self::Engine(DocmergeError::NotFound(_)) => StatusCode::NOT_FOUND,
            Self::Engine(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            Self::BadRequest(message) => ErrorResponse {
                error: message,
                tokens: Vec::new(),
            },
            Self::Engine(err) => {
                if status.is_server_error() {
                    error!("Request failed: {err}");
                } else {
                    warn!("Request rejected: {err}");
                }
                let tokens = match &err {
                    DocmergeError::ValidationError { tokens } => tokens.clone(),
                    _ => Vec::new(),
                };
                ErrorResponse {
                    error: err.to_string(),
                    tokens,
                }
            }
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Upload a template for a form.
///
/// Multipart fields: `file` (required) and `name` (optional, defaults to the
/// uploaded file name).
pub async fn create_template(
    State(state): State<ApiState>,
    Path(form_id): Path<String>,
    mut multipart: Multipart,
) -> ApiResult<impl IntoResponse> {
    let mut upload = None;
    let mut name = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Invalid multipart body: {e}")))?
    {
        match field.name() {
            Some("file") => {
                let filename = field.file_name().unwrap_or("upload").to_string();
                let media_type = field.content_type().map(str::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Failed to read file: {e}")))?;
                upload = Some(Upload::new(bytes.to_vec(), filename, media_type));
            }
            Some("name") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Failed to read name: {e}")))?;
                name = Some(text);
            }
            other => warn!("Ignoring multipart field {other:?}"),
        }
    }

    let upload = upload.ok_or_else(|| ApiError::BadRequest("Missing `file` field".to_string()))?;
    let name = name
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| upload.filename.clone());
    info!(
        "Template upload for form {form_id}: {} ({} bytes)",
        upload.filename,
        upload.bytes.len()
    );

    let (template, outcome) = state
        .service
        .create_template(&form_id, &name, &upload)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(CreateTemplateResponse {
            template_id: template.id,
            outcome,
        }),
    ))
}

/// Fetch a template with its variables
pub async fn get_template(
    State(state): State<ApiState>,
    Path(template_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.service.template(&template_id).await?))
}

/// Add a manual variable to a template
pub async fn add_variable(
    State(state): State<ApiState>,
    Path(template_id): Path<String>,
    Json(request): Json<AddVariableRequest>,
) -> ApiResult<impl IntoResponse> {
    let template = state
        .service
        .add_manual_variable(&template_id, Variable::from(request))
        .await?;
    Ok(Json(template))
}

/// Edit label, type or helper binding of a variable
pub async fn update_variable(
    State(state): State<ApiState>,
    Path((template_id, name)): Path<(String, String)>,
    Json(update): Json<VariableUpdate>,
) -> ApiResult<impl IntoResponse> {
    let template = state
        .service
        .update_variable(&template_id, &name, update)
        .await?;
    Ok(Json(template))
}

/// Store an entry for a form
pub async fn create_entry(
    State(state): State<ApiState>,
    Path(form_id): Path<String>,
    Json(request): Json<CreateEntryRequest>,
) -> ApiResult<impl IntoResponse> {
    let entry = request.into_entry(&form_id);
    state.service.put_entry(entry.clone()).await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

/// Merge an entry into a template.
///
/// `binary-download` answers with the document itself; `html-preview` with
/// a JSON body. A degraded merge is still a 200.
pub async fn merge(
    State(state): State<ApiState>,
    Json(request): Json<MergeRequest>,
) -> ApiResult<Response> {
    let result = state.service.merge(&request).await?;

    let response = match result.output {
        MergeOutput::Binary {
            bytes,
            filename,
            content_type,
        } => {
            let mut response = bytes.into_response();
            let headers = response.headers_mut();
            headers.insert(
                header::CONTENT_TYPE,
                HeaderValue::from_str(&content_type)
                    .unwrap_or(HeaderValue::from_static("application/octet-stream")),
            );
            if let Ok(disposition) =
                HeaderValue::from_str(&format!("attachment; filename=\"{filename}\""))
            {
                headers.insert(header::CONTENT_DISPOSITION, disposition);
            }
            headers.insert(
                MERGE_DEGRADED_HEADER,
                HeaderValue::from_static(if result.degraded { "true" } else { "false" }),
            );
            if !result.unresolved_variables.is_empty() {
                if let Ok(value) = HeaderValue::from_str(&result.unresolved_variables.join(",")) {
                    headers.insert(UNRESOLVED_HEADER, value);
                }
            }
            response
        }
        MergeOutput::Html(html) => Json(PreviewResponse {
            html,
            unresolved_variables: result.unresolved_variables,
            degraded: result.degraded,
        })
        .into_response(),
    };
    Ok(response)
}

/// OCR an image under the storage root
pub async fn ocr(
    State(state): State<ApiState>,
    Json(request): Json<OcrRequest>,
) -> ApiResult<impl IntoResponse> {
    let text = state.service.ocr(&request.path).await?;
    Ok(Json(OcrResponse { text }))
}
