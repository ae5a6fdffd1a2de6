//! # rk-api
//!
//! The web routing layer for RankIt.

pub mod error;
pub mod handlers;
pub mod middleware;

use actix_web::web;

pub use error::ApiError;
pub use handlers::AppState;

/// Configures every RankIt route.
///
/// # Developer Note
/// Routes are registered on the caller's `ServiceConfig`, so the binary and
/// the integration tests mount exactly the same tree. Literal segments are
/// registered before `/{post_id}` patterns.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(|err, req| error::bad_request(err, req)))
        .app_data(web::QueryConfig::default().error_handler(|err, req| error::bad_request(err, req)))
        .app_data(web::PathConfig::default().error_handler(|err, req| error::bad_request(err, req)))
        .route("/health", web::get().to(handlers::health))
        .service(
            web::scope("/api/posts")
                .route("/create-post", web::post().to(handlers::create_post))
                .route("/get-posts", web::get().to(handlers::get_posts))
                .route("/get-post/{post_id}", web::get().to(handlers::get_post))
                .route("/add-comment", web::post().to(handlers::add_comment))
                .route("/get-rating/{post_id}", web::get().to(handlers::get_rating))
                .route(
                    "/upvote-comment/{post_id}/{comment_id}",
                    web::post().to(handlers::upvote_comment),
                )
                .route("/upload-image", web::post().to(handlers::upload_image))
                .route("/category/{category}", web::get().to(handlers::by_category))
                .route("/search", web::get().to(handlers::search))
                .route(
                    "/{post_id}/comments/{comment_id}/vote",
                    web::post().to(handlers::vote_comment),
                )
                .route("/{post_id}/vote", web::post().to(handlers::vote_post))
                .route("/{post_id}", web::delete().to(handlers::delete_post)),
        )
        .service(
            web::scope("/api/users/{user_id}")
                .route("/posts", web::get().to(handlers::user_posts))
                .route("/comments", web::get().to(handlers::user_comments))
                .route("/post-votes", web::get().to(handlers::user_post_votes))
                .route("/comment-votes", web::get().to(handlers::user_comment_votes)),
        )
        .service(
            web::scope("/api/auth")
                .route("/signup", web::post().to(handlers::sign_up))
                .route("/login", web::post().to(handlers::log_in))
                .route("/logout", web::post().to(handlers::log_out)),
        );
}
