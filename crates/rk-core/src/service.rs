//! # RankService
//!
//! Orchestrates posts, comments and votes. Every request is validated here,
//! before the store is touched; the store then commits each write set in a
//! single transaction.
//!
//! `add_comment` reads the post's ratings, appends, and writes them back. The
//! read is not re-checked at commit time, so two comments racing on the same
//! post can lose one rating from the aggregate. The comment rows themselves
//! are never lost.

use std::sync::Arc;

use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{
    AuthoredComment, CreatedComment, CreatedPost, NewComment, NewPost, PageRequest, Post, PostQuery, PostThread,
    VoteTally, MAX_PAGE_SIZE,
};
use crate::rating::{Rating, RatingInput, RatingSummary, RatingUpdate};
use crate::requests::{AddCommentRequest, CreatePostRequest};
use crate::traits::PostRepo;
use crate::votes::{VoteCast, VoteRecord, VoteTarget, VoteValue};

/// Parses a client-supplied id. Ids that cannot exist resolve to nothing, so
/// a malformed one is reported as not found.
pub fn parse_id(kind: &str, raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw.trim()).map_err(|_| AppError::not_found(kind, raw))
}

fn required(field: &str, value: String) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::ValidationError(format!("missing required field: {field}")));
    }
    Ok(trimmed.to_string())
}

fn optional(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn required_rating(field: &str, value: Option<RatingInput>) -> Result<Rating> {
    value
        .ok_or_else(|| AppError::ValidationError(format!("missing required field: {field}")))?
        .parse()
}

fn required_user(user_id: &str) -> Result<String> {
    required("userId", user_id.to_string())
}

fn required_vote(vote: Option<i64>) -> Result<VoteValue> {
    let raw = vote.ok_or_else(|| AppError::ValidationError("missing required field: vote".into()))?;
    VoteValue::try_from(raw)
}

fn check_limit(limit: u32) -> Result<u32> {
    if limit == 0 {
        return Err(AppError::ValidationError("limit must be at least 1".into()));
    }
    Ok(limit.min(MAX_PAGE_SIZE))
}

pub struct RankService {
    repo: Arc<dyn PostRepo>,
}

impl RankService {
    pub fn new(repo: Arc<dyn PostRepo>) -> Self {
        Self { repo }
    }

    pub async fn create_post(&self, req: CreatePostRequest) -> Result<CreatedPost> {
        let post = NewPost {
            title: required("title", req.title)?,
            description: required("description", req.description)?,
            author_id: required("authorId", req.author_id)?,
            author_name: required("authorName", req.author_name)?,
            author_rating: required_rating("authorRating", req.author_rating)?,
            category: optional(req.category),
            image_url: optional(req.image_url),
        };

        let post = self
            .repo
            .insert_post(post)
            .await
            .map_err(|e| AppError::storage("failed to create post", e))?;

        log::info!("created post {} by {}", post.id, post.author_id);
        Ok(CreatedPost {
            post_id: post.id,
            average_rating: post.average_rating,
        })
    }

    pub async fn add_comment(&self, req: AddCommentRequest) -> Result<CreatedComment> {
        let post_id = required("postId", req.post_id)?;
        let content = required("content", req.content)?;
        let author_id = required("authorId", req.author_id)?;
        let author_name = required("authorName", req.author_name)?;
        let rating = required_rating("rating", req.rating)?;
        let post_id = parse_id("post", &post_id)?;

        let post = self.require_post(post_id).await?;
        let update = RatingUpdate::append(post.author_rating, &post.comment_ratings, rating);
        let average_rating = update.average_rating;

        let comment = NewComment {
            post_id,
            content,
            author_id,
            author_name,
            rating,
        };
        let comment = self
            .repo
            .insert_comment(comment, update)
            .await
            .map_err(|e| AppError::storage("failed to add comment", e))?;

        log::info!(
            "comment {} on post {} rated {}, average now {average_rating}",
            comment.id,
            post_id,
            comment.rating
        );
        Ok(CreatedComment {
            comment_id: comment.id,
            average_rating,
        })
    }

    pub async fn get_posts(&self, page: PageRequest) -> Result<Vec<Post>> {
        self.list(&PostQuery::All, page).await
    }

    pub async fn get_posts_by_category(&self, category: &str, page: PageRequest) -> Result<Vec<Post>> {
        let category = required("category", category.to_string())?;
        self.list(&PostQuery::Category(category), page).await
    }

    pub async fn search_posts_by_title(&self, query: &str, page: PageRequest) -> Result<Vec<Post>> {
        let query = required("query", query.to_string())?;
        self.list(&PostQuery::TitleContains(query), page).await
    }

    /// A lazy pager over `query`, starting at the newest post.
    pub fn pages(&self, query: PostQuery, limit: u32) -> PostPages<'_> {
        PostPages {
            service: self,
            query,
            limit,
            cursor: None,
            exhausted: false,
        }
    }

    async fn list(&self, query: &PostQuery, page: PageRequest) -> Result<Vec<Post>> {
        let limit = check_limit(page.limit)?;
        let after = match page.cursor {
            Some(cursor) => Some(
                self.repo
                    .seek_key(cursor)
                    .await
                    .map_err(|e| AppError::storage("failed to resolve cursor", e))?
                    .ok_or_else(|| AppError::not_found("post", cursor))?,
            ),
            None => None,
        };

        self.repo
            .list_posts(query, after, limit)
            .await
            .map_err(|e| AppError::storage("failed to list posts", e))
    }

    pub async fn get_post(&self, post_id: Uuid) -> Result<PostThread> {
        let post = self.require_post(post_id).await?;
        let comments = self
            .repo
            .list_comments(post_id)
            .await
            .map_err(|e| AppError::storage("failed to list comments", e))?;
        Ok(PostThread { post, comments })
    }

    pub async fn get_post_rating(&self, post_id: Uuid) -> Result<RatingSummary> {
        let post = self.require_post(post_id).await?;
        Ok(RatingSummary {
            average_rating: post.average_rating,
            author_rating: post.author_rating,
            total_ratings: post.total_ratings(),
            comment_ratings: post.comment_ratings,
        })
    }

    /// The single-button variant of [`RankService::vote_comment`]: an upvote,
    /// retracted when repeated.
    pub async fn upvote_comment(&self, post_id: Uuid, comment_id: Uuid, user_id: &str) -> Result<()> {
        self.vote_comment(post_id, comment_id, user_id, Some(VoteValue::Up.delta()))
            .await
            .map(|_| ())
    }

    pub async fn vote_comment(
        &self,
        post_id: Uuid,
        comment_id: Uuid,
        user_id: &str,
        vote: Option<i64>,
    ) -> Result<VoteTally> {
        let user_id = required_user(user_id)?;
        let value = required_vote(vote)?;
        self.require_post(post_id).await?;

        let cast = VoteCast {
            user_id,
            target: VoteTarget::Comment { post_id, comment_id },
            value,
        };
        self.cast(&cast, "comment", comment_id).await
    }

    pub async fn vote_post(&self, post_id: Uuid, user_id: &str, vote: Option<i64>) -> Result<VoteTally> {
        let user_id = required_user(user_id)?;
        let value = required_vote(vote)?;

        let cast = VoteCast {
            user_id,
            target: VoteTarget::Post(post_id),
            value,
        };
        self.cast(&cast, "post", post_id).await
    }

    async fn cast(&self, cast: &VoteCast, kind: &str, target_id: Uuid) -> Result<VoteTally> {
        let outcome = self
            .repo
            .apply_vote(cast)
            .await
            .map_err(|e| AppError::storage("failed to apply vote", e))?
            .ok_or_else(|| AppError::not_found(kind, target_id))?;

        log::debug!(
            "{} voted on {kind} {target_id}: {:?} -> {:?}, count {}",
            cast.user_id,
            outcome.previous,
            outcome.current,
            outcome.count
        );
        Ok(VoteTally {
            current_votes: outcome.count,
        })
    }

    /// Deletes a post together with its comments and votes. Only the author
    /// may do this.
    pub async fn delete_post(&self, post_id: Uuid, user_id: &str) -> Result<()> {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return Err(AppError::Unauthorized("a user id is required to delete a post".into()));
        }

        let post = self.require_post(post_id).await?;
        if post.author_id != user_id {
            return Err(AppError::Unauthorized("only the author can delete a post".into()));
        }

        let deleted = self
            .repo
            .delete_post(post_id)
            .await
            .map_err(|e| AppError::storage("failed to delete post", e))?;
        if !deleted {
            return Err(AppError::not_found("post", post_id));
        }

        log::info!("deleted post {post_id}");
        Ok(())
    }

    pub async fn posts_by_user(&self, user_id: &str) -> Result<Vec<Post>> {
        let user_id = required_user(user_id)?;
        self.repo
            .list_posts_by_author(&user_id)
            .await
            .map_err(|e| AppError::storage("failed to list user posts", e))
    }

    pub async fn comments_by_user(&self, user_id: &str) -> Result<Vec<AuthoredComment>> {
        let user_id = required_user(user_id)?;
        self.repo
            .list_comments_by_author(&user_id)
            .await
            .map_err(|e| AppError::storage("failed to list user comments", e))
    }

    pub async fn post_votes_by_user(&self, user_id: &str) -> Result<Vec<VoteRecord>> {
        let user_id = required_user(user_id)?;
        self.repo
            .list_post_votes(&user_id)
            .await
            .map_err(|e| AppError::storage("failed to list post votes", e))
    }

    pub async fn comment_votes_by_user(&self, user_id: &str) -> Result<Vec<VoteRecord>> {
        let user_id = required_user(user_id)?;
        self.repo
            .list_comment_votes(&user_id)
            .await
            .map_err(|e| AppError::storage("failed to list comment votes", e))
    }

    async fn require_post(&self, post_id: Uuid) -> Result<Post> {
        self.repo
            .get_post(post_id)
            .await
            .map_err(|e| AppError::storage("failed to load post", e))?
            .ok_or_else(|| AppError::not_found("post", post_id))
    }
}

/// Forward-only pages of a newest-first listing.
///
/// Each call to [`PostPages::next_page`] continues after the last post it
/// returned; [`PostPages::restart`] goes back to the newest post.
pub struct PostPages<'a> {
    service: &'a RankService,
    query: PostQuery,
    limit: u32,
    cursor: Option<Uuid>,
    exhausted: bool,
}

impl PostPages<'_> {
    pub async fn next_page(&mut self) -> Result<Option<Vec<Post>>> {
        if self.exhausted {
            return Ok(None);
        }

        let page = PageRequest {
            limit: self.limit,
            cursor: self.cursor,
        };
        let posts = self.service.list(&self.query, page).await?;

        let Some(last) = posts.last() else {
            self.exhausted = true;
            return Ok(None);
        };
        self.cursor = Some(last.id);
        if posts.len() < self.limit.min(MAX_PAGE_SIZE) as usize {
            self.exhausted = true;
        }
        Ok(Some(posts))
    }

    pub fn restart(&mut self) {
        self.cursor = None;
        self.exhausted = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Comment, SeekKey};
    use crate::traits::MockPostRepo;
    use crate::votes::VoteOutcome;
    use chrono::{TimeZone, Utc};

    fn post(author_rating: f64, comment_ratings: Vec<f64>) -> Post {
        let average_rating = crate::rating::compute_average(author_rating, &comment_ratings);
        Post {
            id: Uuid::now_v7(),
            title: "Intro to Compilers".into(),
            description: "Hard but fair".into(),
            category: Some("courses".into()),
            image_url: None,
            author_id: "alice".into(),
            author_name: "Alice".into(),
            author_rating,
            comment_ratings,
            average_rating,
            upvotes: 0,
            created_at: Utc::now(),
        }
    }

    fn create_request(rating: Option<RatingInput>) -> CreatePostRequest {
        CreatePostRequest {
            title: "Dining Hall".into(),
            description: "Decent pasta".into(),
            author_id: "alice".into(),
            author_name: "Alice".into(),
            author_rating: rating,
            ..Default::default()
        }
    }

    fn service(repo: MockPostRepo) -> RankService {
        RankService::new(Arc::new(repo))
    }

    #[tokio::test]
    async fn create_post_rejects_invalid_ratings_before_storing() {
        // No expectations: any store call would panic.
        let svc = service(MockPostRepo::new());

        for bad in [
            Some(RatingInput::Number(6.0)),
            Some(RatingInput::Number(0.0)),
            Some(RatingInput::Text("abc".into())),
            None,
        ] {
            let err = svc.create_post(create_request(bad)).await.unwrap_err();
            assert!(matches!(err, AppError::ValidationError(_)), "{err}");
        }
    }

    #[tokio::test]
    async fn create_post_requires_every_field() {
        let svc = service(MockPostRepo::new());
        let mut req = create_request(Some(4.0.into()));
        req.title = "   ".into();

        let err = svc.create_post(req).await.unwrap_err();
        assert!(err.to_string().contains("title"));
    }

    #[tokio::test]
    async fn create_post_starts_average_at_author_rating() {
        let mut repo = MockPostRepo::new();
        repo.expect_insert_post()
            .withf(|p| p.author_rating.value() == 4.0 && p.category.is_none())
            .times(1)
            .returning(|_| Ok(post(4.0, vec![])));

        let mut req = create_request(Some(RatingInput::Text("4".into())));
        req.category = Some("".into());
        let created = service(repo).create_post(req).await.unwrap();
        assert_eq!(created.average_rating, 4.0);
    }

    #[tokio::test]
    async fn add_comment_writes_recomputed_ratings() {
        let existing = post(4.0, vec![2.0]);
        let post_id = existing.id;

        let mut repo = MockPostRepo::new();
        repo.expect_get_post()
            .returning(move |_| Ok(Some(existing.clone())));
        repo.expect_insert_comment()
            .withf(|c, r| c.rating.value() == 4.0 && r.comment_ratings == vec![2.0, 4.0] && r.average_rating == 3.5)
            .times(1)
            .returning(move |c, _| {
                Ok(Comment {
                    id: Uuid::now_v7(),
                    post_id: c.post_id,
                    content: c.content,
                    author_id: c.author_id,
                    author_name: c.author_name,
                    rating: c.rating.value(),
                    upvotes: 0,
                    created_at: Utc::now(),
                })
            });

        let created = service(repo)
            .add_comment(AddCommentRequest {
                post_id: post_id.to_string(),
                content: "Agreed".into(),
                author_id: "bob".into(),
                author_name: "Bob".into(),
                rating: Some(4.0.into()),
            })
            .await
            .unwrap();
        assert_eq!(created.average_rating, 3.5);
    }

    #[tokio::test]
    async fn add_comment_on_missing_post_is_not_found() {
        let mut repo = MockPostRepo::new();
        repo.expect_get_post().returning(|_| Ok(None));
        repo.expect_insert_comment().never();

        let err = service(repo)
            .add_comment(AddCommentRequest {
                post_id: Uuid::now_v7().to_string(),
                content: "Hello".into(),
                author_id: "bob".into(),
                author_name: "Bob".into(),
                rating: Some(3.0.into()),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(..)));
    }

    #[tokio::test]
    async fn add_comment_validates_before_lookup() {
        let svc = service(MockPostRepo::new());
        let err = svc
            .add_comment(AddCommentRequest {
                post_id: "not-a-uuid".into(),
                content: "Hello".into(),
                author_id: "bob".into(),
                author_name: "Bob".into(),
                rating: Some(7.0.into()),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
    }

    #[tokio::test]
    async fn storage_failures_surface_as_internal() {
        let mut repo = MockPostRepo::new();
        repo.expect_get_post()
            .returning(|_| Err(anyhow::anyhow!("disk I/O error")));

        let err = service(repo).get_post(Uuid::now_v7()).await.unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));
    }

    #[tokio::test]
    async fn rating_summary_counts_author() {
        let existing = post(5.0, vec![1.0, 3.0]);
        let mut repo = MockPostRepo::new();
        repo.expect_get_post()
            .returning(move |_| Ok(Some(existing.clone())));

        let summary = service(repo).get_post_rating(Uuid::now_v7()).await.unwrap();
        assert_eq!(summary.total_ratings, 3);
        assert_eq!(summary.average_rating, 3.5);
        assert_eq!(summary.comment_ratings, vec![1.0, 3.0]);
    }

    #[tokio::test]
    async fn vote_on_missing_comment_is_not_found() {
        let mut repo = MockPostRepo::new();
        repo.expect_get_post()
            .returning(|_| Ok(Some(post(3.0, vec![]))));
        repo.expect_apply_vote().returning(|_| Ok(None));

        let err = service(repo)
            .vote_comment(Uuid::now_v7(), Uuid::now_v7(), "carol", Some(1))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(kind, _) if kind == "comment"));
    }

    #[tokio::test]
    async fn vote_requires_user_and_unit_value() {
        let svc = service(MockPostRepo::new());
        let (p, c) = (Uuid::now_v7(), Uuid::now_v7());

        assert!(matches!(
            svc.upvote_comment(p, c, "").await,
            Err(AppError::ValidationError(_))
        ));
        assert!(matches!(
            svc.vote_comment(p, c, "carol", Some(2)).await,
            Err(AppError::ValidationError(_))
        ));
        assert!(matches!(
            svc.vote_post(p, "carol", None).await,
            Err(AppError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn upvote_comment_goes_through_the_ledger() {
        let (post_id, comment_id) = (Uuid::now_v7(), Uuid::now_v7());
        let mut repo = MockPostRepo::new();
        repo.expect_get_post()
            .returning(|_| Ok(Some(post(3.0, vec![]))));
        repo.expect_apply_vote()
            .withf(move |cast| {
                cast.user_id == "carol"
                    && cast.value == VoteValue::Up
                    && cast.target == VoteTarget::Comment { post_id, comment_id }
            })
            .times(1)
            .returning(|_| {
                Ok(Some(VoteOutcome {
                    previous: None,
                    current: Some(VoteValue::Up),
                    count: 1,
                }))
            });

        service(repo)
            .upvote_comment(post_id, comment_id, "carol")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn only_the_author_may_delete() {
        let existing = post(3.0, vec![]);
        let mut repo = MockPostRepo::new();
        repo.expect_get_post()
            .returning(move |_| Ok(Some(existing.clone())));
        repo.expect_delete_post().never();

        let err = service(repo).delete_post(Uuid::now_v7(), "mallory").await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn listing_rejects_zero_limit_and_unknown_cursor() {
        let mut repo = MockPostRepo::new();
        repo.expect_seek_key().returning(|_| Ok(None));
        repo.expect_list_posts().never();
        let svc = service(repo);

        let zero = PageRequest { limit: 0, cursor: None };
        assert!(matches!(svc.get_posts(zero).await, Err(AppError::ValidationError(_))));

        let unknown = PageRequest { limit: 5, cursor: Some(Uuid::now_v7()) };
        assert!(matches!(svc.get_posts(unknown).await, Err(AppError::NotFound(..))));
    }

    #[tokio::test]
    async fn listing_caps_the_page_size() {
        let mut repo = MockPostRepo::new();
        repo.expect_list_posts()
            .withf(|_, after, limit| after.is_none() && *limit == MAX_PAGE_SIZE)
            .returning(|_, _, _| Ok(vec![]));

        let page = PageRequest { limit: 10_000, cursor: None };
        assert!(service(repo).get_posts(page).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn pager_walks_until_a_short_page() {
        let posts: Vec<Post> = (0..5).map(|_| post(3.0, vec![])).collect();
        let keys: Vec<SeekKey> = posts
            .iter()
            .enumerate()
            .map(|(i, p)| SeekKey {
                created_at: Utc.timestamp_opt(1_000 - i as i64, 0).unwrap(),
                id: p.id,
            })
            .collect();

        let mut repo = MockPostRepo::new();
        let lookup = keys.clone();
        repo.expect_seek_key()
            .returning(move |id| Ok(lookup.iter().find(|k| k.id == id).copied()));
        let all = posts.clone();
        let order = keys.clone();
        repo.expect_list_posts().returning(move |_, after, limit| {
            let start = match after {
                Some(key) => order.iter().position(|k| *k == key).unwrap() + 1,
                None => 0,
            };
            Ok(all.iter().skip(start).take(limit as usize).cloned().collect())
        });

        let svc = service(repo);
        let mut pages = svc.pages(PostQuery::All, 2);
        let mut seen = Vec::new();
        while let Some(page) = pages.next_page().await.unwrap() {
            seen.push(page.len());
        }
        assert_eq!(seen, vec![2, 2, 1]);
        assert!(pages.next_page().await.unwrap().is_none());

        pages.restart();
        let first = pages.next_page().await.unwrap().unwrap();
        assert_eq!(first[0].id, posts[0].id);
    }
}
