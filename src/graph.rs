// Follow graph operations over the two mirrored edge sets
use crate::db::models::{EdgeSet, Event, EventKind, User};
use crate::error::{AppError, AppResult};
use crate::records::Records;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Follow,
    Unfollow,
}

impl Direction {
    fn name(self) -> &'static str {
        match self {
            Direction::Follow => "follow",
            Direction::Unfollow => "unfollow",
        }
    }
}

/// Make `from` follow `to`. Returns the refreshed `(from, to)` pair.
pub async fn follow(records: &Records, from: &str, to: &str) -> AppResult<(User, User)> {
    update_edge(records, from, to, Direction::Follow).await
}

/// Make `from` stop following `to`. Returns the refreshed `(from, to)` pair.
pub async fn unfollow(records: &Records, from: &str, to: &str) -> AppResult<(User, User)> {
    update_edge(records, from, to, Direction::Unfollow).await
}

async fn update_edge(
    records: &Records,
    from: &str,
    to: &str,
    direction: Direction,
) -> AppResult<(User, User)> {
    if from == to {
        return Err(AppError::BadFormat(format!(
            "cannot {} yourself",
            direction.name()
        )));
    }

    // Both ends must exist before anything is written
    records.find_user(from).await?;
    records.find_user(to).await?;

    let store = records.store();
    match direction {
        Direction::Follow => store.add_to_set(from, EdgeSet::Following, to).await?,
        Direction::Unfollow => store.remove_from_set(from, EdgeSet::Following, to).await?,
    }

    let mirrored = match direction {
        Direction::Follow => store.add_to_set(to, EdgeSet::Followers, from).await,
        Direction::Unfollow => store.remove_from_set(to, EdgeSet::Followers, from).await,
    };

    if let Err(source) = mirrored {
        // Undo the first half so the sets stay mirrored
        let undo = match direction {
            Direction::Follow => store.remove_from_set(from, EdgeSet::Following, to).await,
            Direction::Unfollow => store.add_to_set(from, EdgeSet::Following, to).await,
        };
        let compensated = match undo {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(
                    from = %from,
                    to = %to,
                    "Failed to undo half-applied {}: {}",
                    direction.name(),
                    e
                );
                false
            }
        };
        // Whatever landed, the cache must reflect it
        if let Err(e) = records.refresh_user(from).await {
            tracing::error!("Refresh after failed {} left cache stale: {}", direction.name(), e);
        }
        return Err(AppError::GraphConsistency {
            operation: direction.name(),
            compensated,
            source,
        });
    }

    // Both rows changed; refresh both even if the first refresh fails
    let from_refresh = records.refresh_user(from).await;
    let to_refresh = records.refresh_user(to).await;

    let kind = match direction {
        Direction::Follow => EventKind::Follow,
        Direction::Unfollow => EventKind::Unfollow,
    };
    records.record_event(&Event::new(kind, from, to, None)).await;

    let from_user = from_refresh?;
    let to_user = to_refresh?;
    tracing::debug!("{} {} -> {}", direction.name(), from_user.handle, to_user.handle);
    Ok((from_user, to_user))
}

pub async fn following_ids(records: &Records, user_id: &str) -> AppResult<Vec<String>> {
    Ok(records.find_user(user_id).await?.following)
}

pub async fn follower_ids(records: &Records, user_id: &str) -> AppResult<Vec<String>> {
    Ok(records.find_user(user_id).await?.followers)
}

/// Profiles of everyone `user_id` follows, one cached lookup per member.
pub async fn following(records: &Records, user_id: &str) -> AppResult<Vec<User>> {
    let ids = following_ids(records, user_id).await?;
    records.find_users(&ids).await
}

pub async fn followers(records: &Records, user_id: &str) -> AppResult<Vec<User>> {
    let ids = follower_ids(records, user_id).await?;
    records.find_users(&ids).await
}
