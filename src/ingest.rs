// Post ingestion: validate, persist, cache, then hand off for live delivery
use crate::db::models::{Event, EventKind, Post, PostView};
use crate::error::{AppError, AppResult};
use crate::fanout::{Published, Publisher};
use crate::records::Records;

/// Longest accepted post, in Unicode scalar values.
pub const MAX_POST_CHARS: usize = 140;

pub fn validate_text(text: &str) -> AppResult<()> {
    if text.trim().is_empty() {
        return Err(AppError::ParamsRequired);
    }
    if text.chars().count() > MAX_POST_CHARS {
        return Err(AppError::TooLong);
    }
    Ok(())
}

/// Create a post for `author_id` and publish it.
///
/// The result depends only on the store and cache writes; delivery to live
/// sessions happens afterwards and cannot fail the call.
pub async fn create_post(
    records: &Records,
    publisher: &Publisher,
    author_id: &str,
    text: &str,
    in_reply_to_status_id: Option<&str>,
) -> AppResult<PostView> {
    validate_text(text)?;

    let author = records.find_user(author_id).await?;
    if author.suspended {
        return Err(AppError::Suspended);
    }

    let mut post = Post::new(&author.id, text);
    if let Some(target_id) = in_reply_to_status_id.filter(|id| !id.is_empty()) {
        let target = records.find_post(target_id).await?;
        post.in_reply_to_status_id = Some(target.id);
        post.in_reply_to_user_id = Some(target.author_id);
    }

    // Once the post row is committed every remaining step runs; a stale cache
    // entry is reported after publishing
    let mut stale: Option<AppError> = None;
    match records.insert_post(&post).await {
        Ok(_) => {}
        Err(e @ AppError::StaleCache { .. }) => {
            stale.get_or_insert(e);
        }
        Err(e) => return Err(e),
    }
    let appended = records.append_post(&author.id, &post.id).await;
    let author = match appended {
        Ok(author) => author,
        Err(e @ AppError::StaleCache { .. }) => {
            stale.get_or_insert(e);
            let mut author = author;
            author.posts.push(post.id.clone());
            author
        }
        Err(e) => return Err(e),
    };
    tracing::info!(post = %post.id, "{} posted", author.handle);

    if let Some(ref replied_to) = post.in_reply_to_user_id {
        if *replied_to != author.id {
            records
                .record_event(&Event::new(
                    EventKind::Reply,
                    &author.id,
                    replied_to,
                    Some(&post.id),
                ))
                .await;
        }
    }

    let view = PostView::new(&post, &author);
    publisher
        .publish(Published::new(view.clone(), author.followers.iter().cloned()))
        .await;

    match stale {
        Some(e) => Err(e),
        None => Ok(view),
    }
}
