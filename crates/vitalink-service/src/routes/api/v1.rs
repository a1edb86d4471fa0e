use axum::{
    Router,
    extract::{Json, Path, Query, State},
    response::Json as ResponseJson,
    routing::{get, post},
};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::description::format_youtube_description;
use crate::errors::ApiError;
use crate::models::AmazonProductRecord;
use crate::preview::LinkPreview;
use crate::rewriter::{ContentRewriter, DetectedLink, RewriteOutcome, detect_amazon_links};
use crate::validation::{LinkKind, validate_link};
use crate::youtube::{YouTubeError, YouTubeVideoMetadata};
use crate::{
    AppState,
    repositories::{DEFAULT_LIST_LIMIT, ListProductsParams, ProductRepository},
};

const MAX_LIST_LIMIT: u32 = 200;

#[derive(Debug, Deserialize)]
struct PreviewRequest {
    url: String,
}

#[derive(Debug, Deserialize)]
struct VideoQuery {
    url: String,
}

#[derive(Debug, Serialize)]
struct VideoResponse {
    #[serde(flatten)]
    metadata: YouTubeVideoMetadata,
    description_html: String,
}

#[derive(Debug, Deserialize)]
struct FormatDescriptionRequest {
    description: String,
    video_id: String,
}

#[derive(Debug, Serialize)]
struct FormatDescriptionResponse {
    html: String,
}

#[derive(Debug, Deserialize)]
struct ContentRequest {
    content: String,
}

#[derive(Debug, Serialize)]
struct DetectLinksResponse {
    links: Vec<DetectedLink>,
}

#[derive(Debug, Deserialize)]
struct ListProductsQuery {
    limit: Option<u32>,
    offset: Option<u32>,
    active_only: Option<bool>,
}

#[derive(Debug, Serialize)]
struct ProductResponse {
    id: i32,
    asin: String,
    title: String,
    description: String,
    price: String,
    rating: f64,
    reviews: i32,
    image: String,
    url: String,
    category: String,
    tags: Vec<String>,
    is_active: bool,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

impl From<AmazonProductRecord> for ProductResponse {
    fn from(record: AmazonProductRecord) -> Self {
        let tags = record.tag_list();
        ProductResponse {
            id: record.id,
            asin: record.asin,
            title: record.title,
            description: record.description,
            price: record.price,
            rating: record.rating,
            reviews: record.reviews,
            image: record.image,
            url: record.url,
            category: record.category,
            tags,
            is_active: record.is_active,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
struct ListProductsResponse {
    items: Vec<ProductResponse>,
    total: u64,
    limit: u32,
}

#[instrument(skip_all, fields(url = %payload.url))]
async fn create_preview<S: AppState>(
    State(state): State<S>,
    Json(payload): Json<PreviewRequest>,
) -> Result<ResponseJson<LinkPreview>, ApiError> {
    debug!("Processing preview request");

    let link = validate_link(&payload.url)?;
    debug!(normalized_url = %link, kind = %link.kind, "URL validated");

    let preview = state.previews().resolve_preview(link.as_str()).await;

    info!(
        asin = ?preview.asin,
        fallback = preview.fallback,
        "Resolved link preview"
    );
    Ok(ResponseJson(preview))
}

#[instrument(skip_all, fields(url = %query.url))]
async fn get_video<S: AppState>(
    State(state): State<S>,
    Query(query): Query<VideoQuery>,
) -> Result<ResponseJson<VideoResponse>, ApiError> {
    debug!("Processing video metadata request");

    let link = validate_link(&query.url)?;
    if link.kind != LinkKind::YouTube {
        return Err(YouTubeError::UnrecognizedUrl(query.url).into());
    }

    let metadata = state.youtube().fetch_video_metadata(link.as_str()).await?;
    let description_html = format_youtube_description(&metadata.description, &metadata.video_id);

    info!(video_id = %metadata.video_id, "Successfully retrieved video metadata");
    Ok(ResponseJson(VideoResponse {
        metadata,
        description_html,
    }))
}

#[instrument(skip_all, fields(video_id = %payload.video_id, description_length = payload.description.len()))]
async fn format_description(
    Json(payload): Json<FormatDescriptionRequest>,
) -> Result<ResponseJson<FormatDescriptionResponse>, ApiError> {
    if payload.video_id.trim().is_empty() {
        return Err(ApiError::BadRequest("video_id must not be empty".to_string()));
    }

    let html = format_youtube_description(&payload.description, payload.video_id.trim());
    debug!(html_length = html.len(), "Formatted description");
    Ok(ResponseJson(FormatDescriptionResponse { html }))
}

#[instrument(skip_all, fields(content_length = payload.content.len()))]
async fn detect_links(Json(payload): Json<ContentRequest>) -> ResponseJson<DetectLinksResponse> {
    let links = detect_amazon_links(&payload.content);
    debug!(count = links.len(), "Detected Amazon links");
    ResponseJson(DetectLinksResponse { links })
}

#[instrument(skip_all, fields(content_length = payload.content.len()))]
async fn rewrite_content<S: AppState>(
    State(state): State<S>,
    Json(payload): Json<ContentRequest>,
) -> ResponseJson<RewriteOutcome> {
    debug!("Processing rewrite request");

    let outcome = ContentRewriter::new(state.previews(), state.product_repo())
        .rewrite_content(&payload.content)
        .await;
    ResponseJson(outcome)
}

#[instrument(skip_all, fields(limit = query.limit, offset = query.offset, active_only = query.active_only))]
async fn list_products<S: AppState>(
    State(state): State<S>,
    Query(query): Query<ListProductsQuery>,
) -> Result<ResponseJson<ListProductsResponse>, ApiError> {
    debug!("Processing list products request");

    if let Some(limit) = query.limit {
        if limit == 0 {
            return Err(ApiError::BadRequest(
                "Limit must be greater than 0".to_string(),
            ));
        }
        if limit > MAX_LIST_LIMIT {
            return Err(ApiError::BadRequest(format!(
                "Limit must not exceed {MAX_LIST_LIMIT}"
            )));
        }
    }

    let params = ListProductsParams {
        limit: query.limit,
        offset: query.offset,
        active_only: query.active_only.unwrap_or(false),
    };

    let result = state.product_repo().list(&params).await?;

    let response = ListProductsResponse {
        items: result.items.into_iter().map(ProductResponse::from).collect(),
        total: result.total,
        limit: params.limit.unwrap_or(DEFAULT_LIST_LIMIT),
    };

    info!(
        returned_count = response.items.len(),
        total = response.total,
        "Successfully retrieved product list"
    );

    Ok(ResponseJson(response))
}

#[instrument(skip_all, fields(asin = %asin))]
async fn get_product<S: AppState>(
    State(state): State<S>,
    Path(asin): Path<String>,
) -> Result<ResponseJson<ProductResponse>, ApiError> {
    debug!("Processing get product request");

    let asin = asin.trim().to_ascii_uppercase();
    match state.product_repo().find_by_asin(&asin).await? {
        Some(record) => {
            info!(id = record.id, "Successfully retrieved product");
            Ok(ResponseJson(ProductResponse::from(record)))
        }
        None => {
            debug!("Product not found");
            Err(ApiError::NotFound)
        }
    }
}

pub fn create_api_v1_router<S: AppState>() -> Router<S> {
    Router::new()
        .route("/previews", post(create_preview::<S>))
        .route("/videos", get(get_video::<S>))
        .route("/videos/description", post(format_description))
        .route("/content/links", post(detect_links))
        .route("/content/rewrite", post(rewrite_content::<S>))
        .route("/products", get(list_products::<S>))
        .route("/products/{asin}", get(get_product::<S>))
}
