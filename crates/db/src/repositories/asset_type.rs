use sqlx::{sqlite::SqliteRow, Row};

use reqflow_core::domain::asset_type::AssetType;

use super::{AssetTypeRepository, RepositoryError};
use crate::DbPool;

pub struct SqlAssetTypeRepository {
    pool: DbPool,
}

impl SqlAssetTypeRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl AssetTypeRepository for SqlAssetTypeRepository {
    async fn find_by_id(&self, id: &str) -> Result<Option<AssetType>, RepositoryError> {
        let row = sqlx::query("SELECT id, name, active FROM asset_type WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(asset_type_from_row).transpose()
    }

    async fn list_active(&self) -> Result<Vec<AssetType>, RepositoryError> {
        let rows =
            sqlx::query("SELECT id, name, active FROM asset_type WHERE active = 1 ORDER BY name")
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter().map(asset_type_from_row).collect()
    }

    async fn save(&self, asset_type: AssetType) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO asset_type (id, name, active) VALUES (?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET name = excluded.name, active = excluded.active",
        )
        .bind(&asset_type.id)
        .bind(&asset_type.name)
        .bind(asset_type.active)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn asset_type_from_row(row: SqliteRow) -> Result<AssetType, RepositoryError> {
    Ok(AssetType {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        active: row.try_get("active")?,
    })
}
