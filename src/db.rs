use anyhow::Result;
use sqlx::{Pool, Postgres};

pub type Db = Pool<Postgres>;

// The pool is constructed once here and handed to the router; nothing
// below the HTTP layer reaches for a global client.
pub async fn connect(url: &str) -> Result<Db> {
    Ok(Pool::<Postgres>::connect(url).await?)
}
