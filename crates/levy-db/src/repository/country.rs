//! # Country Repository
//!
//! Database operations for countries.

use levy_core::validation::validate_country_code;
use levy_core::Country;
use sqlx::{Sqlite, SqlitePool};
use tracing::debug;

use crate::error::DbResult;

/// Inserts or renames a country through any executor.
pub(crate) async fn upsert_country<'e, E>(executor: E, country: &Country) -> DbResult<()>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let code = validate_country_code(&country.code)?;

    sqlx::query(
        r#"
        INSERT INTO countries (code, name) VALUES (?1, ?2)
        ON CONFLICT (code) DO UPDATE SET name = excluded.name
        "#,
    )
    .bind(code)
    .bind(&country.name)
    .execute(executor)
    .await?;

    Ok(())
}

/// Repository for country database operations.
#[derive(Debug, Clone)]
pub struct CountryRepository {
    pool: SqlitePool,
}

impl CountryRepository {
    /// Creates a new CountryRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CountryRepository { pool }
    }

    /// Looks a country up by code (case-insensitive).
    pub async fn get(&self, code: &str) -> DbResult<Option<Country>> {
        let country: Option<(String, String)> =
            sqlx::query_as("SELECT code, name FROM countries WHERE code = ?1")
                .bind(code.trim().to_lowercase())
                .fetch_optional(&self.pool)
                .await?;

        Ok(country.map(|(code, name)| Country { code, name }))
    }

    /// All countries, sorted by code.
    pub async fn list(&self) -> DbResult<Vec<Country>> {
        let countries: Vec<(String, String)> =
            sqlx::query_as("SELECT code, name FROM countries ORDER BY code")
                .fetch_all(&self.pool)
                .await?;

        debug!(count = countries.len(), "Listed countries");
        Ok(countries
            .into_iter()
            .map(|(code, name)| Country { code, name })
            .collect())
    }

    /// Inserts a country, or renames it if the code exists.
    pub async fn upsert(&self, country: &Country) -> DbResult<()> {
        upsert_country(&self.pool, country).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DbError;
    use crate::pool::{Database, DbConfig};

    fn country(code: &str, name: &str) -> Country {
        Country {
            code: code.to_string(),
            name: name.to_string(),
        }
    }

    #[tokio::test]
    async fn test_upsert_and_get() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.countries();

        repo.upsert(&country("MX", "Mexico")).await.unwrap();
        repo.upsert(&country("ar", "Argentina")).await.unwrap();
        repo.upsert(&country("mx", "México")).await.unwrap();

        assert_eq!(repo.get("Mx").await.unwrap(), Some(country("mx", "México")));
        assert_eq!(repo.get("zz").await.unwrap(), None);
        assert_eq!(
            repo.list().await.unwrap(),
            vec![country("ar", "Argentina"), country("mx", "México")]
        );
    }

    #[tokio::test]
    async fn test_rejects_malformed_code() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let result = db.countries().upsert(&country("m1", "Nowhere")).await;
        assert!(matches!(result, Err(DbError::Core(_))));
    }
}
