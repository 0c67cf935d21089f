use crate::models::Customer;
use async_trait::async_trait;
use sqlx::PgPool;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;

/// RepositoryError
///
/// Any failure of the backing store. Handlers do not inspect it beyond
/// turning it into a server error.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    /// Primary key collision reported by a store that checks it itself.
    #[error("customer `{0}` already exists")]
    Duplicate(String),
}

/// CustomerRepository
///
/// Persistence contract for customer records. Every method is a single store
/// operation; nothing here spans more than one statement.
///
/// `Send + Sync` so the trait object can live in the shared application state.
#[async_trait]
pub trait CustomerRepository: Send + Sync {
    /// Creates the backing table if it is absent. Safe to call on every start.
    async fn ensure_schema(&self) -> Result<(), RepositoryError>;

    /// All records in the store's natural order.
    async fn list_customers(&self) -> Result<Vec<Customer>, RepositoryError>;

    async fn find_customer(&self, id: &str) -> Result<Option<Customer>, RepositoryError>;

    /// Inserts the record as given and returns what was stored.
    async fn insert_customer(&self, customer: Customer) -> Result<Customer, RepositoryError>;

    /// Overwrites every non-key column of the record with the same id.
    /// Returns `false` when no such record exists.
    async fn replace_customer(&self, customer: Customer) -> Result<bool, RepositoryError>;

    /// Returns `false` when no such record exists.
    async fn delete_customer(&self, id: &str) -> Result<bool, RepositoryError>;
}

/// Handle to the repository shared across requests.
pub type RepositoryState = Arc<dyn CustomerRepository>;

const CREATE_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS customers (
        id    TEXT PRIMARY KEY,
        name  TEXT NOT NULL,
        email TEXT,
        phone TEXT
    )
"#;

/// PostgresRepository
///
/// `sqlx` implementation over a connection pool.
#[derive(Clone)]
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CustomerRepository for PostgresRepository {
    async fn ensure_schema(&self) -> Result<(), RepositoryError> {
        sqlx::query(CREATE_TABLE).execute(&self.pool).await?;
        Ok(())
    }

    async fn list_customers(&self) -> Result<Vec<Customer>, RepositoryError> {
        let customers = sqlx::query_as::<_, Customer>("SELECT id, name, email, phone FROM customers")
            .fetch_all(&self.pool)
            .await?;
        Ok(customers)
    }

    async fn find_customer(&self, id: &str) -> Result<Option<Customer>, RepositoryError> {
        let customer = sqlx::query_as::<_, Customer>(
            "SELECT id, name, email, phone FROM customers WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(customer)
    }

    async fn insert_customer(&self, customer: Customer) -> Result<Customer, RepositoryError> {
        let stored = sqlx::query_as::<_, Customer>(
            r#"
            INSERT INTO customers (id, name, email, phone)
            VALUES ($1, $2, $3, $4)
            RETURNING id, name, email, phone
            "#,
        )
        .bind(&customer.id)
        .bind(&customer.name)
        .bind(&customer.email)
        .bind(&customer.phone)
        .fetch_one(&self.pool)
        .await?;
        Ok(stored)
    }

    /// Full replace: columns missing from `customer` are written as NULL
    /// rather than kept.
    async fn replace_customer(&self, customer: Customer) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE customers SET name = $2, email = $3, phone = $4 WHERE id = $1",
        )
        .bind(&customer.id)
        .bind(&customer.name)
        .bind(&customer.email)
        .bind(&customer.phone)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_customer(&self, id: &str) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM customers WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

/// InMemoryRepository
///
/// Process-local store used by the test suites in place of PostgreSQL.
/// Keeps insertion order, which stands in for the table's natural order.
#[derive(Default)]
pub struct InMemoryRepository {
    customers: Mutex<Vec<Customer>>,
    /// When true, every operation fails as if the database were unreachable.
    should_fail: bool,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_failing() -> Self {
        Self {
            should_fail: true,
            ..Self::default()
        }
    }

    /// Starts from a pre-populated store.
    pub fn with_customers(customers: Vec<Customer>) -> Self {
        Self {
            customers: Mutex::new(customers),
            should_fail: false,
        }
    }

    fn check(&self) -> Result<(), RepositoryError> {
        if self.should_fail {
            return Err(RepositoryError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }

    fn with_rows<T>(&self, f: impl FnOnce(&mut Vec<Customer>) -> T) -> Result<T, RepositoryError> {
        self.check()?;
        let mut rows = self.customers.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(f(&mut rows))
    }
}

#[async_trait]
impl CustomerRepository for InMemoryRepository {
    async fn ensure_schema(&self) -> Result<(), RepositoryError> {
        self.check()
    }

    async fn list_customers(&self) -> Result<Vec<Customer>, RepositoryError> {
        self.with_rows(|rows| rows.clone())
    }

    async fn find_customer(&self, id: &str) -> Result<Option<Customer>, RepositoryError> {
        self.with_rows(|rows| rows.iter().find(|c| c.id == id).cloned())
    }

    async fn insert_customer(&self, customer: Customer) -> Result<Customer, RepositoryError> {
        self.with_rows(|rows| {
            if rows.iter().any(|c| c.id == customer.id) {
                return Err(RepositoryError::Duplicate(customer.id));
            }
            rows.push(customer.clone());
            Ok(customer)
        })?
    }

    async fn replace_customer(&self, customer: Customer) -> Result<bool, RepositoryError> {
        self.with_rows(|rows| match rows.iter_mut().find(|c| c.id == customer.id) {
            Some(current) => {
                *current = customer;
                true
            }
            None => false,
        })
    }

    async fn delete_customer(&self, id: &str) -> Result<bool, RepositoryError> {
        self.with_rows(|rows| {
            let before = rows.len();
            rows.retain(|c| c.id != id);
            rows.len() != before
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn acme() -> Customer {
        Customer {
            id: "c1".into(),
            name: "Acme".into(),
            email: Some("ops@acme.test".into()),
            phone: None,
        }
    }

    #[tokio::test]
    async fn duplicate_insert_is_rejected_by_the_store() {
        let repo = InMemoryRepository::new();
        repo.insert_customer(acme()).await.unwrap();

        let err = repo.insert_customer(acme()).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Duplicate(id) if id == "c1"));
        assert_eq!(repo.list_customers().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn replace_overwrites_every_field() {
        let repo = InMemoryRepository::with_customers(vec![acme()]);
        let replacement = Customer {
            id: "c1".into(),
            name: "Acme Corp".into(),
            email: None,
            phone: Some("555-0100".into()),
        };

        assert!(repo.replace_customer(replacement.clone()).await.unwrap());
        assert_eq!(repo.find_customer("c1").await.unwrap(), Some(replacement));
    }

    #[tokio::test]
    async fn list_keeps_insertion_order() {
        let repo = InMemoryRepository::new();
        for id in ["b", "a", "c"] {
            repo.insert_customer(Customer {
                id: id.into(),
                name: id.to_uppercase(),
                ..Default::default()
            })
            .await
            .unwrap();
        }

        let ids: Vec<_> = repo
            .list_customers()
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, ["b", "a", "c"]);
    }

    #[tokio::test]
    async fn failing_store_reports_database_errors() {
        let repo = InMemoryRepository::new_failing();
        assert!(matches!(
            repo.find_customer("c1").await,
            Err(RepositoryError::Database(_))
        ));
        assert!(repo.ensure_schema().await.is_err());
    }
}
