//! # rk-api Handlers
//!
//! This module coordinates the flow between HTTP requests and the core
//! services. Handlers only extract and shape data; every rule lives in
//! `rk_core`.

use std::sync::Arc;

use actix_multipart::Multipart;
use actix_web::{web, HttpResponse};
use futures_util::TryStreamExt;
use rk_core::requests::{AddCommentRequest, CreatePostRequest, Credentials, UserRef, VoteRequest};
use rk_core::{parse_id, AccountService, AppError, Comment, MediaStore, PageRequest, Post, RankService};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::ApiError;

type ApiResult = Result<HttpResponse, ApiError>;

/// State shared across all Actix-web workers.
pub struct AppState {
    pub ranking: RankService,
    pub accounts: AccountService,
    pub media: Arc<dyn MediaStore>,
    pub max_upload_bytes: usize,
}

/// A post as listed, with its rating count spelled out.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostView {
    #[serde(flatten)]
    pub post: Post,
    pub total_ratings: usize,
}

impl From<Post> for PostView {
    fn from(post: Post) -> Self {
        let total_ratings = post.total_ratings();
        Self { post, total_ratings }
    }
}

/// A single post with its comments, newest first.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostDetail {
    #[serde(flatten)]
    pub post: PostView,
    pub comments: Vec<Comment>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageQuery {
    pub limit: Option<u32>,
    pub last_post_id: Option<String>,
}

impl PageQuery {
    fn into_request(self) -> Result<PageRequest, AppError> {
        let defaults = PageRequest::default();
        let cursor = self
            .last_post_id
            .filter(|raw| !raw.trim().is_empty())
            .map(|raw| parse_id("post", &raw))
            .transpose()?;
        Ok(PageRequest {
            limit: self.limit.unwrap_or(defaults.limit),
            cursor,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuery {
    #[serde(default)]
    pub query: String,
    pub limit: Option<u32>,
    pub last_post_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserQuery {
    pub user_id: String,
}

fn post_list(posts: Vec<Post>) -> HttpResponse {
    let views: Vec<PostView> = posts.into_iter().map(PostView::from).collect();
    HttpResponse::Ok().json(views)
}

// Posts

pub async fn create_post(data: web::Data<AppState>, body: web::Json<CreatePostRequest>) -> ApiResult {
    let created = data.ranking.create_post(body.into_inner()).await?;
    Ok(HttpResponse::Created().json(created))
}

pub async fn get_posts(data: web::Data<AppState>, query: web::Query<PageQuery>) -> ApiResult {
    let page = query.into_inner().into_request()?;
    Ok(post_list(data.ranking.get_posts(page).await?))
}

pub async fn get_post(data: web::Data<AppState>, path: web::Path<String>) -> ApiResult {
    let post_id = parse_id("post", &path)?;
    let thread = data.ranking.get_post(post_id).await?;
    Ok(HttpResponse::Ok().json(PostDetail {
        post: thread.post.into(),
        comments: thread.comments,
    }))
}

pub async fn get_rating(data: web::Data<AppState>, path: web::Path<String>) -> ApiResult {
    let post_id = parse_id("post", &path)?;
    Ok(HttpResponse::Ok().json(data.ranking.get_post_rating(post_id).await?))
}

pub async fn by_category(
    data: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<PageQuery>,
) -> ApiResult {
    let page = query.into_inner().into_request()?;
    Ok(post_list(data.ranking.get_posts_by_category(&path, page).await?))
}

pub async fn search(data: web::Data<AppState>, query: web::Query<SearchQuery>) -> ApiResult {
    let SearchQuery {
        query,
        limit,
        last_post_id,
    } = query.into_inner();
    let page = PageQuery { limit, last_post_id }.into_request()?;
    Ok(post_list(data.ranking.search_posts_by_title(&query, page).await?))
}

pub async fn vote_post(
    data: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<VoteRequest>,
) -> ApiResult {
    let post_id = parse_id("post", &path)?;
    let tally = data.ranking.vote_post(post_id, &body.user_id, body.vote).await?;
    Ok(HttpResponse::Ok().json(tally))
}

pub async fn delete_post(
    data: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<UserQuery>,
) -> ApiResult {
    let post_id = parse_id("post", &path)?;
    data.ranking.delete_post(post_id, &query.user_id).await?;
    Ok(HttpResponse::NoContent().finish())
}

// Comments

pub async fn add_comment(data: web::Data<AppState>, body: web::Json<AddCommentRequest>) -> ApiResult {
    let created = data.ranking.add_comment(body.into_inner()).await?;
    Ok(HttpResponse::Created().json(created))
}

pub async fn upvote_comment(
    data: web::Data<AppState>,
    path: web::Path<(String, String)>,
    body: web::Json<UserRef>,
) -> ApiResult {
    let (post_id, comment_id) = path.into_inner();
    let post_id = parse_id("post", &post_id)?;
    let comment_id = parse_id("comment", &comment_id)?;
    data.ranking.upvote_comment(post_id, comment_id, &body.user_id).await?;
    Ok(HttpResponse::Ok().json(json!({ "message": "vote recorded" })))
}

pub async fn vote_comment(
    data: web::Data<AppState>,
    path: web::Path<(String, String)>,
    body: web::Json<VoteRequest>,
) -> ApiResult {
    let (post_id, comment_id) = path.into_inner();
    let post_id = parse_id("post", &post_id)?;
    let comment_id = parse_id("comment", &comment_id)?;
    let tally = data
        .ranking
        .vote_comment(post_id, comment_id, &body.user_id, body.vote)
        .await?;
    Ok(HttpResponse::Ok().json(tally))
}

// Media

/// Reads the `image` field of a multipart form into memory, refusing
/// anything over the configured size, and hands it to the media store.
pub async fn upload_image(data: web::Data<AppState>, mut form: Multipart) -> ApiResult {
    let malformed = |e: actix_multipart::MultipartError| AppError::ValidationError(format!("malformed upload: {e}"));

    while let Some(mut field) = form.try_next().await.map_err(malformed)? {
        if field.name() != Some("image") {
            continue;
        }
        let content_type = field
            .content_type()
            .map(|mime| mime.essence_str().to_string())
            .unwrap_or_default();

        let mut bytes = Vec::new();
        while let Some(chunk) = field.try_next().await.map_err(malformed)? {
            if bytes.len() + chunk.len() > data.max_upload_bytes {
                return Err(AppError::ValidationError(format!(
                    "image exceeds the {} byte limit",
                    data.max_upload_bytes
                ))
                .into());
            }
            bytes.extend_from_slice(&chunk);
        }

        let media_id = data
            .media
            .save_upload(bytes, &content_type)
            .await
            .map_err(media_error)?;
        return Ok(HttpResponse::Created().json(json!({ "imageUrl": data.media.get_url(&media_id) })));
    }

    Err(AppError::ValidationError("missing required field: image".into()).into())
}

/// Rejections raised by the store travel inside `anyhow`; anything else is
/// an I/O failure.
fn media_error(err: anyhow::Error) -> AppError {
    match err.downcast::<AppError>() {
        Ok(app) => app,
        Err(other) => AppError::storage("failed to store upload", other),
    }
}

// User history

pub async fn user_posts(data: web::Data<AppState>, path: web::Path<String>) -> ApiResult {
    Ok(post_list(data.ranking.posts_by_user(&path).await?))
}

pub async fn user_comments(data: web::Data<AppState>, path: web::Path<String>) -> ApiResult {
    Ok(HttpResponse::Ok().json(data.ranking.comments_by_user(&path).await?))
}

pub async fn user_post_votes(data: web::Data<AppState>, path: web::Path<String>) -> ApiResult {
    Ok(HttpResponse::Ok().json(data.ranking.post_votes_by_user(&path).await?))
}

pub async fn user_comment_votes(data: web::Data<AppState>, path: web::Path<String>) -> ApiResult {
    Ok(HttpResponse::Ok().json(data.ranking.comment_votes_by_user(&path).await?))
}

// Accounts

pub async fn sign_up(data: web::Data<AppState>, body: web::Json<Credentials>) -> ApiResult {
    let uid = data.accounts.sign_up(body.into_inner()).await?;
    Ok(HttpResponse::Created().json(json!({ "uid": uid })))
}

pub async fn log_in(data: web::Data<AppState>, body: web::Json<Credentials>) -> ApiResult {
    let uid = data.accounts.log_in(body.into_inner()).await?;
    Ok(HttpResponse::Ok().json(json!({ "uid": uid })))
}

/// Sessions live on the client; there is nothing to tear down here.
pub async fn log_out() -> HttpResponse {
    HttpResponse::Ok().json(json!({ "message": "logged out" }))
}

pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(json!({ "status": "ok" }))
}
