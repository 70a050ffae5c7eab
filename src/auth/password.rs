use crate::error::{AppError, AppResult};

#[cfg(not(test))]
const COST: u32 = bcrypt::DEFAULT_COST;
#[cfg(test)]
const COST: u32 = 4;

/// Hash on the blocking pool.
pub async fn hash(plaintext: &str) -> AppResult<String> {
    let plaintext = plaintext.to_string();
    tokio::task::spawn_blocking(move || bcrypt::hash(plaintext, COST))
        .await
        .map_err(|e| AppError::Internal(format!("Hash task failed: {}", e)))?
        .map_err(|e| AppError::Internal(format!("Hashing failed: {}", e)))
}

pub async fn verify(plaintext: &str, hash: &str) -> bool {
    let plaintext = plaintext.to_string();
    let hash = hash.to_string();
    tokio::task::spawn_blocking(move || bcrypt::verify(plaintext, &hash).unwrap_or(false))
        .await
        .unwrap_or(false)
}
