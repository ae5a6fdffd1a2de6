//! # rk-db-sqlite Implementation
//!
//! This module implements the data mapping between the SQLite relational model
//! and the `rk-core` domain models. Every multi-row write runs in one
//! transaction.

use std::str::FromStr;
use std::sync::atomic::{AtomicI64, Ordering};

use anyhow::{anyhow, bail};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rk_core::models::{AuthoredComment, Comment, NewComment, NewPost, Post, PostQuery, SeekKey, User};
use rk_core::rating::RatingUpdate;
use rk_core::traits::{PostRepo, UserRepo};
use rk_core::votes::{VoteCast, VoteOutcome, VoteRecord, VoteState, VoteTarget, VoteValue};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite};
use uuid::Uuid;

const POST_COLUMNS: &str = "id, title, description, category, image_url, author_id, author_name, \
     author_rating, comment_ratings, average_rating, upvotes, created_at";

const COMMENT_COLUMNS: &str = "id, post_id, content, author_id, author_name, rating, upvotes, created_at";

/// Hands out strictly increasing microsecond timestamps, so the newest-first
/// order never depends on clock resolution.
struct MonotonicClock {
    last: AtomicI64,
}

impl MonotonicClock {
    fn starting_after(micros: i64) -> Self {
        Self {
            last: AtomicI64::new(micros),
        }
    }

    fn next(&self) -> i64 {
        let now = Utc::now().timestamp_micros();
        let mut last = self.last.load(Ordering::Acquire);
        loop {
            let candidate = now.max(last + 1);
            match self
                .last
                .compare_exchange_weak(last, candidate, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return candidate,
                Err(actual) => last = actual,
            }
        }
    }
}

/// SQL for one counter table and the vote ledger that feeds it.
struct VoteSql {
    touch: &'static str,
    current: &'static str,
    bump: &'static str,
    count: &'static str,
    delete: &'static str,
}

const POST_VOTE_SQL: VoteSql = VoteSql {
    touch: "UPDATE posts SET upvotes = upvotes WHERE id = ?",
    current: "SELECT vote FROM post_votes WHERE user_id = ? AND post_id = ?",
    bump: "UPDATE posts SET upvotes = upvotes + ? WHERE id = ?",
    count: "SELECT upvotes FROM posts WHERE id = ?",
    delete: "DELETE FROM post_votes WHERE user_id = ? AND post_id = ?",
};

const COMMENT_VOTE_SQL: VoteSql = VoteSql {
    touch: "UPDATE comments SET upvotes = upvotes WHERE id = ? AND post_id = ?",
    current: "SELECT vote FROM comment_votes WHERE user_id = ? AND comment_id = ?",
    bump: "UPDATE comments SET upvotes = upvotes + ? WHERE id = ?",
    count: "SELECT upvotes FROM comments WHERE id = ?",
    delete: "DELETE FROM comment_votes WHERE user_id = ? AND comment_id = ?",
};

pub struct SqliteRankRepo {
    pool: SqlitePool,
    clock: MonotonicClock,
}

// Helpers for timestamp conversion
fn time_to_micros(t: DateTime<Utc>) -> i64 {
    t.timestamp_micros()
}

fn micros_to_time(micros: i64) -> anyhow::Result<DateTime<Utc>> {
    DateTime::from_timestamp_micros(micros).ok_or_else(|| anyhow!("timestamp out of range: {micros}"))
}

fn post_from_row(row: &SqliteRow) -> anyhow::Result<Post> {
    Ok(Post {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        category: row.try_get("category")?,
        image_url: row.try_get("image_url")?,
        author_id: row.try_get("author_id")?,
        author_name: row.try_get("author_name")?,
        author_rating: row.try_get("author_rating")?,
        comment_ratings: serde_json::from_str(&row.try_get::<String, _>("comment_ratings")?)?,
        average_rating: row.try_get("average_rating")?,
        upvotes: row.try_get("upvotes")?,
        created_at: micros_to_time(row.try_get("created_at")?)?,
    })
}

fn comment_from_row(row: &SqliteRow) -> anyhow::Result<Comment> {
    Ok(Comment {
        id: row.try_get("id")?,
        post_id: row.try_get("post_id")?,
        content: row.try_get("content")?,
        author_id: row.try_get("author_id")?,
        author_name: row.try_get("author_name")?,
        rating: row.try_get("rating")?,
        upvotes: row.try_get("upvotes")?,
        created_at: micros_to_time(row.try_get("created_at")?)?,
    })
}

fn vote_from_row(row: &SqliteRow, with_comment: bool) -> anyhow::Result<VoteRecord> {
    Ok(VoteRecord {
        post_id: row.try_get("post_id")?,
        comment_id: if with_comment { Some(row.try_get("comment_id")?) } else { None },
        vote: VoteValue::try_from(row.try_get::<i64, _>("vote")?)?,
        updated_at: micros_to_time(row.try_get("updated_at")?)?,
    })
}

fn user_from_row(row: &SqliteRow) -> anyhow::Result<User> {
    Ok(User {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        created_at: micros_to_time(row.try_get("created_at")?)?,
    })
}

/// Escapes LIKE wildcards so a search for "100%" matches literally.
fn like_pattern(needle: &str) -> String {
    let mut escaped = String::with_capacity(needle.len() + 2);
    escaped.push('%');
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

impl SqliteRankRepo {
    /// Opens (creating if needed) the database at `url` and applies migrations.
    ///
    /// In-memory databases live as long as their connection, so they are kept
    /// to a single connection that is never recycled.
    pub async fn new(url: &str, max_connections: u32) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);

        let in_memory = url.contains(":memory:") || url.contains("mode=memory");
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(max_connections.max(1))
        };
        let pool = pool_options.connect_with(options).await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        let latest: Option<i64> = sqlx::query_scalar(
            "SELECT MAX(created_at) FROM (SELECT created_at FROM posts UNION ALL SELECT created_at FROM comments)",
        )
        .fetch_one(&pool)
        .await?;

        log::info!("sqlite store ready (in_memory: {in_memory})");
        Ok(Self {
            pool,
            clock: MonotonicClock::starting_after(latest.unwrap_or(0)),
        })
    }
}

#[async_trait]
impl PostRepo for SqliteRankRepo {
    async fn insert_post(&self, post: NewPost) -> anyhow::Result<Post> {
        let rating = post.author_rating.value();
        let stored = Post {
            id: Uuid::now_v7(),
            title: post.title,
            description: post.description,
            category: post.category,
            image_url: post.image_url,
            author_id: post.author_id,
            author_name: post.author_name,
            author_rating: rating,
            comment_ratings: Vec::new(),
            average_rating: rating,
            upvotes: 0,
            created_at: micros_to_time(self.clock.next())?,
        };

        sqlx::query(
            "INSERT INTO posts (id, title, description, category, image_url, author_id, author_name, \
             author_rating, comment_ratings, average_rating, upvotes, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(stored.id)
        .bind(&stored.title)
        .bind(&stored.description)
        .bind(&stored.category)
        .bind(&stored.image_url)
        .bind(&stored.author_id)
        .bind(&stored.author_name)
        .bind(stored.author_rating)
        .bind(serde_json::to_string(&stored.comment_ratings)?)
        .bind(stored.average_rating)
        .bind(stored.upvotes)
        .bind(time_to_micros(stored.created_at))
        .execute(&self.pool)
        .await?;

        Ok(stored)
    }

    async fn get_post(&self, id: Uuid) -> anyhow::Result<Option<Post>> {
        let sql = format!("SELECT {POST_COLUMNS} FROM posts WHERE id = ?");
        sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(|row| post_from_row(&row))
            .transpose()
    }

    async fn seek_key(&self, id: Uuid) -> anyhow::Result<Option<SeekKey>> {
        let created_at: Option<i64> = sqlx::query_scalar("SELECT created_at FROM posts WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        created_at
            .map(|micros| {
                Ok(SeekKey {
                    created_at: micros_to_time(micros)?,
                    id,
                })
            })
            .transpose()
    }

    async fn list_posts(&self, query: &PostQuery, after: Option<SeekKey>, limit: u32) -> anyhow::Result<Vec<Post>> {
        let mut qb = QueryBuilder::<Sqlite>::new(format!("SELECT {POST_COLUMNS} FROM posts WHERE 1 = 1"));

        match query {
            PostQuery::All => {}
            PostQuery::Category(category) => {
                qb.push(" AND category = ").push_bind(category.clone());
            }
            PostQuery::TitleContains(needle) => {
                qb.push(" AND title LIKE ")
                    .push_bind(like_pattern(needle))
                    .push(" ESCAPE '\\'");
            }
        }

        // Seek past the cursor: strictly older, ties broken by id.
        if let Some(key) = after {
            let micros = time_to_micros(key.created_at);
            qb.push(" AND (created_at < ")
                .push_bind(micros)
                .push(" OR (created_at = ")
                .push_bind(micros)
                .push(" AND id < ")
                .push_bind(key.id)
                .push("))");
        }

        qb.push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(i64::from(limit));

        qb.build()
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(post_from_row)
            .collect()
    }

    async fn list_posts_by_author(&self, author_id: &str) -> anyhow::Result<Vec<Post>> {
        let sql = format!("SELECT {POST_COLUMNS} FROM posts WHERE author_id = ? ORDER BY created_at DESC, id DESC");
        sqlx::query(&sql)
            .bind(author_id)
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(post_from_row)
            .collect()
    }

    /// Explicit cascade: votes first, then comments, then the post.
    async fn delete_post(&self, id: Uuid) -> anyhow::Result<bool> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM comment_votes WHERE post_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM post_votes WHERE post_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM comments WHERE post_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let deleted = sqlx::query("DELETE FROM posts WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;
        Ok(deleted > 0)
    }

    /// Atomic operation to store a comment and the post's new rating fields.
    async fn insert_comment(&self, comment: NewComment, ratings: RatingUpdate) -> anyhow::Result<Comment> {
        let stored = Comment {
            id: Uuid::now_v7(),
            post_id: comment.post_id,
            content: comment.content,
            author_id: comment.author_id,
            author_name: comment.author_name,
            rating: comment.rating.value(),
            upvotes: 0,
            created_at: micros_to_time(self.clock.next())?,
        };

        let mut tx = self.pool.begin().await?;

        // 1. Update the post's aggregate
        let updated = sqlx::query("UPDATE posts SET comment_ratings = ?, average_rating = ? WHERE id = ?")
            .bind(serde_json::to_string(&ratings.comment_ratings)?)
            .bind(ratings.average_rating)
            .bind(stored.post_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if updated == 0 {
            bail!("post {} disappeared before the comment was stored", stored.post_id);
        }

        // 2. Insert the comment
        sqlx::query(
            "INSERT INTO comments (id, post_id, content, author_id, author_name, rating, upvotes, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(stored.id)
        .bind(stored.post_id)
        .bind(&stored.content)
        .bind(&stored.author_id)
        .bind(&stored.author_name)
        .bind(stored.rating)
        .bind(stored.upvotes)
        .bind(time_to_micros(stored.created_at))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(stored)
    }

    async fn list_comments(&self, post_id: Uuid) -> anyhow::Result<Vec<Comment>> {
        let sql = format!("SELECT {COMMENT_COLUMNS} FROM comments WHERE post_id = ? ORDER BY created_at DESC, id DESC");
        sqlx::query(&sql)
            .bind(post_id)
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(comment_from_row)
            .collect()
    }

    async fn list_comments_by_author(&self, author_id: &str) -> anyhow::Result<Vec<AuthoredComment>> {
        let rows = sqlx::query(
            "SELECT c.id AS id, c.post_id AS post_id, c.content AS content, c.author_id AS author_id, \
             c.author_name AS author_name, c.rating AS rating, c.upvotes AS upvotes, \
             c.created_at AS created_at, p.title AS post_title \
             FROM comments c JOIN posts p ON p.id = c.post_id \
             WHERE c.author_id = ? ORDER BY c.created_at DESC, c.id DESC",
        )
        .bind(author_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(AuthoredComment {
                    comment: comment_from_row(row)?,
                    post_title: row.try_get("post_title")?,
                })
            })
            .collect()
    }

    /// Reads the current vote, applies the ledger transition and writes the
    /// counter and the record in one transaction.
    async fn apply_vote(&self, cast: &VoteCast) -> anyhow::Result<Option<VoteOutcome>> {
        let (sql, target_id) = match cast.target {
            VoteTarget::Post(post_id) => (&POST_VOTE_SQL, post_id),
            VoteTarget::Comment { comment_id, .. } => (&COMMENT_VOTE_SQL, comment_id),
        };

        let mut tx = self.pool.begin().await?;

        // 1. Write to the target row before any read, so the transaction holds
        // the write lock and concurrent voters wait on the busy timeout. A
        // comment must also belong to the post.
        let touched = match cast.target {
            VoteTarget::Post(post_id) => sqlx::query(sql.touch)
                .bind(post_id)
                .execute(&mut *tx)
                .await?,
            VoteTarget::Comment { post_id, comment_id } => sqlx::query(sql.touch)
                .bind(comment_id)
                .bind(post_id)
                .execute(&mut *tx)
                .await?,
        };
        if touched.rows_affected() == 0 {
            return Ok(None);
        }

        // 2. Current ledger state
        let previous = sqlx::query_scalar::<_, i64>(sql.current)
            .bind(&cast.user_id)
            .bind(target_id)
            .fetch_optional(&mut *tx)
            .await?
            .map(VoteValue::try_from)
            .transpose()?;

        let transition = VoteState::from(previous).transition(cast.value);

        // 3. Counter moves by the delta only
        sqlx::query(sql.bump)
            .bind(transition.delta)
            .bind(target_id)
            .execute(&mut *tx)
            .await?;

        // 4. Record follows the transition
        let now = self.clock.next();
        match (transition.next, cast.target) {
            (None, _) => {
                sqlx::query(sql.delete)
                    .bind(&cast.user_id)
                    .bind(target_id)
                    .execute(&mut *tx)
                    .await?;
            }
            (Some(vote), VoteTarget::Post(post_id)) => {
                sqlx::query(
                    "INSERT INTO post_votes (user_id, post_id, vote, updated_at) VALUES (?, ?, ?, ?) \
                     ON CONFLICT (user_id, post_id) DO UPDATE SET vote = excluded.vote, updated_at = excluded.updated_at",
                )
                .bind(&cast.user_id)
                .bind(post_id)
                .bind(vote.delta())
                .bind(now)
                .execute(&mut *tx)
                .await?;
            }
            (Some(vote), VoteTarget::Comment { post_id, comment_id }) => {
                sqlx::query(
                    "INSERT INTO comment_votes (user_id, comment_id, post_id, vote, updated_at) VALUES (?, ?, ?, ?, ?) \
                     ON CONFLICT (user_id, comment_id) DO UPDATE SET vote = excluded.vote, updated_at = excluded.updated_at",
                )
                .bind(&cast.user_id)
                .bind(comment_id)
                .bind(post_id)
                .bind(vote.delta())
                .bind(now)
                .execute(&mut *tx)
                .await?;
            }
        }

        let count: i64 = sqlx::query_scalar(sql.count)
            .bind(target_id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Some(VoteOutcome {
            previous,
            current: transition.next,
            count,
        }))
    }

    async fn list_post_votes(&self, user_id: &str) -> anyhow::Result<Vec<VoteRecord>> {
        sqlx::query("SELECT post_id, vote, updated_at FROM post_votes WHERE user_id = ? ORDER BY updated_at DESC")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(|row| vote_from_row(row, false))
            .collect()
    }

    async fn list_comment_votes(&self, user_id: &str) -> anyhow::Result<Vec<VoteRecord>> {
        sqlx::query(
            "SELECT post_id, comment_id, vote, updated_at FROM comment_votes WHERE user_id = ? ORDER BY updated_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(|row| vote_from_row(row, true))
        .collect()
    }
}

#[async_trait]
impl UserRepo for SqliteRankRepo {
    async fn create_user(&self, email: &str, password_hash: &str) -> anyhow::Result<Option<User>> {
        let user = User {
            id: Uuid::now_v7().to_string(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            created_at: Utc::now(),
        };

        let inserted = sqlx::query(
            "INSERT INTO users (id, email, password_hash, created_at) VALUES (?, ?, ?, ?) \
             ON CONFLICT (email) DO NOTHING",
        )
        .bind(&user.id)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(time_to_micros(user.created_at))
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok((inserted > 0).then_some(user))
    }

    async fn find_user_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        sqlx::query("SELECT id, email, password_hash, created_at FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?
            .map(|row| user_from_row(&row))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rk_core::models::{NewComment, NewPost, PageRequest};
    use rk_core::rating::Rating;
    use rk_core::{AppError, RankService};
    use std::sync::Arc;

    async fn repo() -> Arc<SqliteRankRepo> {
        Arc::new(SqliteRankRepo::new("sqlite::memory:", 1).await.unwrap())
    }

    fn new_post(title: &str, category: Option<&str>, rating: f64) -> NewPost {
        NewPost {
            title: title.into(),
            description: "desc".into(),
            category: category.map(Into::into),
            image_url: None,
            author_id: "alice".into(),
            author_name: "Alice".into(),
            author_rating: Rating::new(rating).unwrap(),
        }
    }

    async fn comment(repo: &SqliteRankRepo, post: &Post, author: &str, rating: f64) -> Comment {
        let rating = Rating::new(rating).unwrap();
        let current = repo.get_post(post.id).await.unwrap().unwrap();
        let update = RatingUpdate::append(current.author_rating, &current.comment_ratings, rating);
        repo.insert_comment(
            NewComment {
                post_id: post.id,
                content: "nice".into(),
                author_id: author.into(),
                author_name: author.into(),
                rating,
            },
            update,
        )
        .await
        .unwrap()
    }

    #[test]
    fn clock_never_repeats() {
        let far_future = Utc::now().timestamp_micros() + 60_000_000;
        let clock = MonotonicClock::starting_after(far_future);
        let a = clock.next();
        let b = clock.next();
        assert_eq!(a, far_future + 1);
        assert_eq!(b, far_future + 2);
    }

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("100%_off"), "%100\\%\\_off%");
    }

    #[tokio::test]
    async fn test_create_and_get_post() {
        let repo = repo().await;
        let post = repo.insert_post(new_post("Gym", Some("buildings"), 4.0)).await.unwrap();

        let fetched = repo.get_post(post.id).await.unwrap().expect("post stored");
        assert_eq!(fetched, post);
        assert_eq!(fetched.average_rating, 4.0);
        assert!(fetched.comment_ratings.is_empty());
        assert!(repo.get_post(Uuid::now_v7()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn comments_update_aggregate_and_list_newest_first() {
        let repo = repo().await;
        let post = repo.insert_post(new_post("Cafe", None, 4.0)).await.unwrap();

        let first = comment(&repo, &post, "bob", 2.0).await;
        let after_first = repo.get_post(post.id).await.unwrap().unwrap();
        assert_eq!(after_first.average_rating, 3.0);

        let second = comment(&repo, &post, "carol", 4.0).await;
        let after_second = repo.get_post(post.id).await.unwrap().unwrap();
        assert_eq!(after_second.comment_ratings, vec![2.0, 4.0]);
        assert_eq!(after_second.average_rating, 3.5);
        assert_eq!(after_second.total_ratings(), 3);

        let ids: Vec<Uuid> = repo.list_comments(post.id).await.unwrap().iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![second.id, first.id]);
    }

    #[tokio::test]
    async fn comment_on_vanished_post_rolls_back() {
        let repo = repo().await;
        let update = RatingUpdate::append(3.0, &[], Rating::new(3.0).unwrap());
        let result = repo
            .insert_comment(
                NewComment {
                    post_id: Uuid::now_v7(),
                    content: "ghost".into(),
                    author_id: "bob".into(),
                    author_name: "Bob".into(),
                    rating: Rating::new(3.0).unwrap(),
                },
                update,
            )
            .await;
        assert!(result.is_err());
        assert!(repo.list_comments_by_author("bob").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn pagination_has_no_overlap_and_no_gap() {
        let repo = repo().await;
        let mut created = Vec::new();
        for i in 0..5 {
            created.push(repo.insert_post(new_post(&format!("Post {i}"), None, 3.0)).await.unwrap().id);
        }
        created.reverse(); // newest first

        let svc = RankService::new(repo.clone());
        let first = svc.get_posts(PageRequest { limit: 2, cursor: None }).await.unwrap();
        let second = svc
            .get_posts(PageRequest { limit: 2, cursor: Some(first[1].id) })
            .await
            .unwrap();
        let third = svc
            .get_posts(PageRequest { limit: 2, cursor: Some(second[1].id) })
            .await
            .unwrap();

        let walked: Vec<Uuid> = first.iter().chain(&second).chain(&third).map(|p| p.id).collect();
        assert_eq!(walked, created);
        assert_eq!(third.len(), 1);
    }

    #[tokio::test]
    async fn category_and_title_filters() {
        let repo = repo().await;
        repo.insert_post(new_post("Data Structures", Some("courses"), 5.0)).await.unwrap();
        repo.insert_post(new_post("Pizza Place", Some("restaurants"), 3.0)).await.unwrap();
        repo.insert_post(new_post("Advanced data science", Some("courses"), 4.0)).await.unwrap();
        repo.insert_post(new_post("100% Juice", Some("restaurants"), 2.0)).await.unwrap();

        let courses = repo
            .list_posts(&PostQuery::Category("courses".into()), None, 10)
            .await
            .unwrap();
        assert_eq!(courses.len(), 2);
        assert!(courses.iter().all(|p| p.category.as_deref() == Some("courses")));

        let data = repo
            .list_posts(&PostQuery::TitleContains("DATA".into()), None, 10)
            .await
            .unwrap();
        let titles: Vec<&str> = data.iter().map(|p| p.title.as_str()).collect();
        assert_eq!(titles, vec!["Advanced data science", "Data Structures"]);

        let percent = repo
            .list_posts(&PostQuery::TitleContains("0%".into()), None, 10)
            .await
            .unwrap();
        assert_eq!(percent.len(), 1);
        let none = repo
            .list_posts(&PostQuery::TitleContains("%".into()), None, 10)
            .await
            .unwrap();
        assert_eq!(none.len(), 1);
    }

    #[tokio::test]
    async fn comment_votes_toggle_and_switch() {
        let repo = repo().await;
        let post = repo.insert_post(new_post("Lab", None, 3.0)).await.unwrap();
        let c = comment(&repo, &post, "bob", 4.0).await;
        let target = VoteTarget::Comment {
            post_id: post.id,
            comment_id: c.id,
        };
        let cast = |user: &str, value| VoteCast {
            user_id: user.into(),
            target,
            value,
        };

        // up, up => back to zero, record gone
        let up = repo.apply_vote(&cast("dave", VoteValue::Up)).await.unwrap().unwrap();
        assert_eq!(up.count, 1);
        let again = repo.apply_vote(&cast("dave", VoteValue::Up)).await.unwrap().unwrap();
        assert_eq!(again.count, 0);
        assert_eq!(again.current, None);
        assert!(repo.list_comment_votes("dave").await.unwrap().is_empty());

        // up then down => -2 relative to the upvoted count, record says -1
        repo.apply_vote(&cast("dave", VoteValue::Up)).await.unwrap();
        let flipped = repo.apply_vote(&cast("dave", VoteValue::Down)).await.unwrap().unwrap();
        assert_eq!(flipped.count, -1);
        assert_eq!(flipped.previous, Some(VoteValue::Up));
        let records = repo.list_comment_votes("dave").await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].vote, VoteValue::Down);
        assert_eq!(records[0].comment_id, Some(c.id));
        assert_eq!(records[0].post_id, post.id);

        // another voter adds on top
        let other = repo.apply_vote(&cast("erin", VoteValue::Up)).await.unwrap().unwrap();
        assert_eq!(other.count, 0);
        let stored = repo.list_comments(post.id).await.unwrap();
        assert_eq!(stored[0].upvotes, 0);
    }

    #[tokio::test]
    async fn vote_on_missing_or_mismatched_target_is_none() {
        let repo = repo().await;
        let post = repo.insert_post(new_post("Lab", None, 3.0)).await.unwrap();
        let other = repo.insert_post(new_post("Other", None, 3.0)).await.unwrap();
        let c = comment(&repo, &post, "bob", 4.0).await;

        let wrong_parent = VoteCast {
            user_id: "dave".into(),
            target: VoteTarget::Comment {
                post_id: other.id,
                comment_id: c.id,
            },
            value: VoteValue::Up,
        };
        assert!(repo.apply_vote(&wrong_parent).await.unwrap().is_none());

        let missing_post = VoteCast {
            user_id: "dave".into(),
            target: VoteTarget::Post(Uuid::now_v7()),
            value: VoteValue::Up,
        };
        assert!(repo.apply_vote(&missing_post).await.unwrap().is_none());
        assert!(repo.list_comment_votes("dave").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn post_votes_use_the_same_ledger() {
        let repo = repo().await;
        let post = repo.insert_post(new_post("Stadium", None, 5.0)).await.unwrap();
        let cast = VoteCast {
            user_id: "dave".into(),
            target: VoteTarget::Post(post.id),
            value: VoteValue::Down,
        };

        assert_eq!(repo.apply_vote(&cast).await.unwrap().unwrap().count, -1);
        let votes = repo.list_post_votes("dave").await.unwrap();
        assert_eq!(votes.len(), 1);
        assert_eq!(votes[0].comment_id, None);
        assert_eq!(repo.get_post(post.id).await.unwrap().unwrap().upvotes, -1);
    }

    #[tokio::test]
    async fn delete_cascades_to_comments_and_votes() {
        let repo = repo().await;
        let post = repo.insert_post(new_post("Old Hall", None, 2.0)).await.unwrap();
        let keep = repo.insert_post(new_post("New Hall", None, 4.0)).await.unwrap();
        let c = comment(&repo, &post, "bob", 1.0).await;
        let kept_comment = comment(&repo, &keep, "bob", 5.0).await;

        for target in [
            VoteTarget::Post(post.id),
            VoteTarget::Comment { post_id: post.id, comment_id: c.id },
            VoteTarget::Comment { post_id: keep.id, comment_id: kept_comment.id },
        ] {
            let cast = VoteCast { user_id: "dave".into(), target, value: VoteValue::Up };
            repo.apply_vote(&cast).await.unwrap().unwrap();
        }

        assert!(repo.delete_post(post.id).await.unwrap());
        assert!(!repo.delete_post(post.id).await.unwrap());

        assert!(repo.get_post(post.id).await.unwrap().is_none());
        assert!(repo.list_comments(post.id).await.unwrap().is_empty());
        assert!(repo.list_post_votes("dave").await.unwrap().is_empty());
        let remaining = repo.list_comment_votes("dave").await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].comment_id, Some(kept_comment.id));

        let by_bob = repo.list_comments_by_author("bob").await.unwrap();
        assert_eq!(by_bob.len(), 1);
        assert_eq!(by_bob[0].post_title, "New Hall");
    }

    /// A file-backed store with a real pool, so transactions overlap.
    async fn file_repo() -> (Arc<SqliteRankRepo>, std::path::PathBuf) {
        let path = std::env::temp_dir().join(format!("rk-votes-{}.db", Uuid::new_v4()));
        let repo = SqliteRankRepo::new(&format!("sqlite://{}", path.display()), 5)
            .await
            .unwrap();
        (Arc::new(repo), path)
    }

    fn remove_db(path: &std::path::Path) {
        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{}{suffix}", path.display()));
        }
    }

    async fn vote_concurrently(repo: &Arc<SqliteRankRepo>, target: VoteTarget, values: &[VoteValue]) {
        let handles: Vec<_> = values
            .iter()
            .enumerate()
            .map(|(i, &value)| {
                let repo = repo.clone();
                tokio::spawn(async move {
                    let cast = VoteCast {
                        user_id: format!("voter-{i}"),
                        target,
                        value,
                    };
                    repo.apply_vote(&cast).await
                })
            })
            .collect();

        for handle in handles {
            let outcome = handle.await.unwrap().unwrap();
            assert!(outcome.is_some());
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_voters_on_one_comment_all_count() {
        let (repo, path) = file_repo().await;
        let post = repo.insert_post(new_post("Busy Hall", None, 4.0)).await.unwrap();
        let c = comment(&repo, &post, "bob", 4.0).await;
        let target = VoteTarget::Comment {
            post_id: post.id,
            comment_id: c.id,
        };

        vote_concurrently(&repo, target, &[VoteValue::Up; 40]).await;

        let stored = repo.list_comments(post.id).await.unwrap();
        assert_eq!(stored[0].upvotes, 40);
        remove_db(&path);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_mixed_votes_match_the_ledger() {
        let (repo, path) = file_repo().await;
        let post = repo.insert_post(new_post("Split Opinions", None, 3.0)).await.unwrap();
        let values: Vec<VoteValue> = (0..30)
            .map(|i| if i % 3 == 0 { VoteValue::Down } else { VoteValue::Up })
            .collect();

        vote_concurrently(&repo, VoteTarget::Post(post.id), &values).await;

        let mut ledger = 0;
        for i in 0..values.len() {
            let records = repo.list_post_votes(&format!("voter-{i}")).await.unwrap();
            ledger += records.iter().map(|r| r.vote.delta()).sum::<i64>();
        }
        let expected: i64 = values.iter().map(|v| v.delta()).sum();
        assert_eq!(expected, 10);
        assert_eq!(ledger, expected);
        assert_eq!(repo.get_post(post.id).await.unwrap().unwrap().upvotes, expected);
        remove_db(&path);
    }

    #[tokio::test]
    async fn unknown_cursor_is_not_found() {
        let svc = RankService::new(repo().await);
        let page = PageRequest { limit: 2, cursor: Some(Uuid::now_v7()) };
        assert!(matches!(svc.get_posts(page).await, Err(AppError::NotFound(..))));
    }

    #[tokio::test]
    async fn duplicate_emails_are_refused() {
        let repo = repo().await;
        let created = repo.create_user("dana@example.com", "hash").await.unwrap();
        assert!(created.is_some());
        assert!(repo.create_user("dana@example.com", "other").await.unwrap().is_none());

        let found = repo.find_user_by_email("dana@example.com").await.unwrap().unwrap();
        assert_eq!(found.id, created.unwrap().id);
        assert_eq!(found.password_hash, "hash");
    }
}
