//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `ItemStore` port from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.
//!
//! Every query is scoped to the user the store was created for, so one user can
//! never read or change another user's rows.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use collection_core::domain::{Category, Item, ItemFields, ItemPage, ItemQuery};
use collection_core::ports::{ItemStore, PortError, PortResult};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Structs
//=========================================================================================

/// Owns the connection pool; hands out per-user stores.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// An `ItemStore` restricted to the rows owned by `user_id`.
    pub fn for_user(&self, user_id: Uuid) -> UserItemStore {
        UserItemStore {
            pool: self.pool.clone(),
            user_id,
        }
    }
}

#[derive(Clone)]
pub struct UserItemStore {
    pool: PgPool,
    user_id: Uuid,
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct ItemRecord {
    id: Uuid,
    title: String,
    description: Option<String>,
    place: Option<String>,
    tags: Vec<String>,
    created_at: DateTime<Utc>,
}
impl ItemRecord {
    fn to_domain(self) -> Item {
        Item {
            id: self.id,
            title: self.title,
            description: self.description,
            place: self.place,
            tags: self.tags,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct CategoryRecord {
    id: Uuid,
    name: String,
}
impl CategoryRecord {
    fn to_domain(self) -> Category {
        Category {
            id: self.id,
            name: self.name,
        }
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

/// Builds an `ILIKE` substring pattern, escaping the wildcard characters in `needle`.
pub fn like_pattern(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

const SEARCH_FILTER: &str = "
    FROM items i
    JOIN item_categories ic ON ic.item_id = i.id
    WHERE i.user_id = $1
      AND ic.category_id = $2
      AND ($3::text IS NULL
           OR i.title ILIKE $3
           OR i.description ILIKE $3
           OR i.place ILIKE $3
           OR i.tags_text ILIKE $3)";

//=========================================================================================
// `ItemStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl ItemStore for UserItemStore {
    async fn search_items(&self, query: &ItemQuery) -> PortResult<ItemPage> {
        let pattern = query
            .needle
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(like_pattern);

        // Count and rows must describe the same snapshot.
        let mut tx = self.pool.begin().await.map_err(unexpected)?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(unexpected)?;

        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) {SEARCH_FILTER}"))
            .bind(self.user_id)
            .bind(query.category_id)
            .bind(pattern.as_deref())
            .fetch_one(&mut *tx)
            .await
            .map_err(unexpected)?;

        let records = sqlx::query_as::<_, ItemRecord>(&format!(
            "SELECT i.id, i.title, i.description, i.place, i.tags, i.created_at {SEARCH_FILTER}
             ORDER BY i.created_at DESC
             LIMIT $4 OFFSET $5"
        ))
        .bind(self.user_id)
        .bind(query.category_id)
        .bind(pattern.as_deref())
        .bind(i64::from(query.page_size))
        .bind(query.offset() as i64)
        .fetch_all(&mut *tx)
        .await
        .map_err(unexpected)?;
        tx.commit().await.map_err(unexpected)?;

        Ok(ItemPage {
            items: records.into_iter().map(|r| r.to_domain()).collect(),
            total: total.max(0) as u64,
        })
    }

    async fn insert_item(&self, fields: &ItemFields) -> PortResult<Uuid> {
        sqlx::query_scalar(
            "INSERT INTO items (user_id, title, description, place, tags)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING id",
        )
        .bind(self.user_id)
        .bind(&fields.title)
        .bind(fields.description.as_deref())
        .bind(fields.place.as_deref())
        .bind(&fields.tags)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)
    }

    async fn link_category(&self, item_id: Uuid, category_id: Uuid) -> PortResult<()> {
        let result = sqlx::query(
            "INSERT INTO item_categories (item_id, category_id)
             SELECT i.id, c.id FROM items i, categories c
             WHERE i.id = $1 AND i.user_id = $3 AND c.id = $2 AND c.user_id = $3",
        )
        .bind(item_id)
        .bind(category_id)
        .bind(self.user_id)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;

        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Category {} not found", category_id)));
        }
        Ok(())
    }

    async fn update_item(&self, item_id: Uuid, fields: &ItemFields) -> PortResult<()> {
        let result = sqlx::query(
            "UPDATE items SET title = $1, description = $2, place = $3, tags = $4
             WHERE id = $5 AND user_id = $6",
        )
        .bind(&fields.title)
        .bind(fields.description.as_deref())
        .bind(fields.place.as_deref())
        .bind(&fields.tags)
        .bind(item_id)
        .bind(self.user_id)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;

        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Item {} not found", item_id)));
        }
        Ok(())
    }

    async fn delete_item(&self, item_id: Uuid) -> PortResult<()> {
        sqlx::query("DELETE FROM items WHERE id = $1 AND user_id = $2")
            .bind(item_id)
            .bind(self.user_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn list_categories(&self) -> PortResult<Vec<Category>> {
        let records = sqlx::query_as::<_, CategoryRecord>(
            "SELECT id, name FROM categories WHERE user_id = $1 ORDER BY name ASC",
        )
        .bind(self.user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn create_category(&self, name: &str) -> PortResult<Category> {
        let record = sqlx::query_as::<_, CategoryRecord>(
            "INSERT INTO categories (user_id, name) VALUES ($1, $2) RETURNING id, name",
        )
        .bind(self.user_id)
        .bind(name)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.to_domain())
    }

    async fn delete_category(&self, category_id: Uuid) -> PortResult<()> {
        sqlx::query("DELETE FROM categories WHERE id = $1 AND user_id = $2")
            .bind(category_id)
            .bind(self.user_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }
}
