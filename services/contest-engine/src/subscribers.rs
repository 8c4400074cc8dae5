use crate::database::Database;
use crate::errors::Result;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;

/// Read-only view of the newsletter signup list.
#[async_trait]
pub trait SubscriberDirectory: Send + Sync {
    /// `email` is expected to be normalised.
    async fn is_subscriber(&self, email: &str) -> Result<bool>;
}

/// Reads the `subscribers` table maintained by the signup service.
pub struct PgSubscriberDirectory {
    db: Arc<Database>,
}

impl PgSubscriberDirectory {
    pub fn new(db: Arc<Database>) -> Self {
        PgSubscriberDirectory { db }
    }
}

#[async_trait]
impl SubscriberDirectory for PgSubscriberDirectory {
    async fn is_subscriber(&self, email: &str) -> Result<bool> {
        let found: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM subscribers WHERE lower(email) = $1)",
        )
        .bind(email)
        .fetch_one(self.db.pool())
        .await?;

        Ok(found)
    }
}

/// Fixed in-memory subscriber list.
#[derive(Default)]
pub struct StaticSubscriberDirectory {
    emails: RwLock<HashSet<String>>,
}

impl StaticSubscriberDirectory {
    pub fn new<I, S>(emails: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        StaticSubscriberDirectory {
            emails: RwLock::new(
                emails
                    .into_iter()
                    .map(|e| crate::models::normalize_email(e.as_ref()))
                    .collect(),
            ),
        }
    }

    pub fn add(&self, email: &str) {
        self.emails
            .write()
            .insert(crate::models::normalize_email(email));
    }
}

#[async_trait]
impl SubscriberDirectory for StaticSubscriberDirectory {
    async fn is_subscriber(&self, email: &str) -> Result<bool> {
        Ok(self.emails.read().contains(email))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_directory_normalises() {
        let directory = StaticSubscriberDirectory::new(["Fan@Example.com "]);
        assert!(directory.is_subscriber("fan@example.com").await.unwrap());
        assert!(!directory.is_subscriber("other@example.com").await.unwrap());

        directory.add("other@example.com");
        assert!(directory.is_subscriber("other@example.com").await.unwrap());
    }
}
