//! Postgres-backed unit store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::postgres::PgRow;
use sqlx::{FromRow, PgPool, Row};
use tracing::instrument;

use digiserv_core::{IntendedUseId, MasterFileId, MetadataId, OrderId, ProjectId, UnitId};
use digiserv_units::{
    AvailabilityPolicy, ImageTechMeta, IntendedUse, MasterFile, Metadata, NewMasterFile, OcrHint,
    Order, OrderCheckpoint, Unit, UnitCheckpoint, UnitContext, UnitStatus,
};

use super::{UnitStore, UnitStoreError};

#[derive(Debug, Clone)]
pub struct PostgresUnitStore {
    pool: PgPool,
}

impl PostgresUnitStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load_order(&self, id: OrderId) -> Result<Order, UnitStoreError> {
        let row: Option<OrderRow> = sqlx::query_as(
            "SELECT id, status, date_order_approved, date_finalization_begun, \
             date_archiving_complete, date_patron_deliverables_complete FROM orders WHERE id = $1",
        )
        .bind(id.get())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| storage("load_order", e))?;
        row.ok_or(UnitStoreError::order(id))?.try_into()
    }

    async fn load_intended_use(&self, id: IntendedUseId) -> Result<Option<IntendedUse>, UnitStoreError> {
        let row: Option<(i64, String, String)> = sqlx::query_as(
            "SELECT id, description, deliverable_format FROM intended_uses WHERE id = $1",
        )
        .bind(id.get())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| storage("load_intended_use", e))?;
        row.map(|(id, description, format)| {
            Ok(IntendedUse {
                id: IntendedUseId::new(id),
                description,
                deliverable_format: format.parse().map_err(corrupt)?,
            })
        })
        .transpose()
    }
}

fn storage(op: &str, e: sqlx::Error) -> UnitStoreError {
    UnitStoreError::Storage(format!("{op}: {e}"))
}

fn corrupt(e: impl core::fmt::Display) -> UnitStoreError {
    UnitStoreError::Storage(format!("invalid stored value: {e}"))
}

const UNIT_COLUMNS: &str = "id, status, order_id, metadata_id, intended_use_id, project_id, reorder, \
     throw_away, include_in_dl, complete_scan, ocr_master_files, date_archived, \
     date_patron_deliverables_ready, date_dl_deliverables_ready";

const MASTER_FILE_COLUMNS: &str =
    "id, unit_id, pid, filename, title, filesize, checksum, tech_meta, date_archived";

#[derive(Debug)]
struct UnitRow {
    id: i64,
    status: String,
    order_id: i64,
    metadata_id: Option<i64>,
    intended_use_id: Option<i64>,
    project_id: Option<i64>,
    reorder: bool,
    throw_away: bool,
    include_in_dl: bool,
    complete_scan: bool,
    ocr_master_files: bool,
    date_archived: Option<DateTime<Utc>>,
    date_patron_deliverables_ready: Option<DateTime<Utc>>,
    date_dl_deliverables_ready: Option<DateTime<Utc>>,
}

impl<'r> FromRow<'r, PgRow> for UnitRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(UnitRow {
            id: row.try_get("id")?,
            status: row.try_get("status")?,
            order_id: row.try_get("order_id")?,
            metadata_id: row.try_get("metadata_id")?,
            intended_use_id: row.try_get("intended_use_id")?,
            project_id: row.try_get("project_id")?,
            reorder: row.try_get("reorder")?,
            throw_away: row.try_get("throw_away")?,
            include_in_dl: row.try_get("include_in_dl")?,
            complete_scan: row.try_get("complete_scan")?,
            ocr_master_files: row.try_get("ocr_master_files")?,
            date_archived: row.try_get("date_archived")?,
            date_patron_deliverables_ready: row.try_get("date_patron_deliverables_ready")?,
            date_dl_deliverables_ready: row.try_get("date_dl_deliverables_ready")?,
        })
    }
}

impl TryFrom<UnitRow> for Unit {
    type Error = UnitStoreError;

    fn try_from(row: UnitRow) -> Result<Self, Self::Error> {
        Ok(Unit {
            id: UnitId::new(row.id),
            status: row.status.parse().map_err(corrupt)?,
            order_id: OrderId::new(row.order_id),
            metadata_id: row.metadata_id.map(MetadataId::new),
            intended_use_id: row.intended_use_id.map(IntendedUseId::new),
            project_id: row.project_id.map(ProjectId::new),
            reorder: row.reorder,
            throw_away: row.throw_away,
            include_in_dl: row.include_in_dl,
            complete_scan: row.complete_scan,
            ocr_master_files: row.ocr_master_files,
            date_archived: row.date_archived,
            date_patron_deliverables_ready: row.date_patron_deliverables_ready,
            date_dl_deliverables_ready: row.date_dl_deliverables_ready,
        })
    }
}

#[derive(Debug)]
struct OrderRow {
    id: i64,
    status: String,
    date_order_approved: Option<DateTime<Utc>>,
    date_finalization_begun: Option<DateTime<Utc>>,
    date_archiving_complete: Option<DateTime<Utc>>,
    date_patron_deliverables_complete: Option<DateTime<Utc>>,
}

impl<'r> FromRow<'r, PgRow> for OrderRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(OrderRow {
            id: row.try_get("id")?,
            status: row.try_get("status")?,
            date_order_approved: row.try_get("date_order_approved")?,
            date_finalization_begun: row.try_get("date_finalization_begun")?,
            date_archiving_complete: row.try_get("date_archiving_complete")?,
            date_patron_deliverables_complete: row.try_get("date_patron_deliverables_complete")?,
        })
    }
}

impl TryFrom<OrderRow> for Order {
    type Error = UnitStoreError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        Ok(Order {
            id: OrderId::new(row.id),
            status: row.status.parse().map_err(corrupt)?,
            date_order_approved: row.date_order_approved,
            date_finalization_begun: row.date_finalization_begun,
            date_archiving_complete: row.date_archiving_complete,
            date_patron_deliverables_complete: row.date_patron_deliverables_complete,
        })
    }
}

#[derive(Debug)]
struct MetadataRow {
    id: i64,
    pid: String,
    title: String,
    kind: String,
    catalog_key: Option<String>,
    is_manuscript: bool,
    is_personal_item: bool,
    availability_policy: Option<String>,
    ocr_language_hint: Option<String>,
    date_dl_ingest: Option<DateTime<Utc>>,
    ocr_hint_id: Option<i64>,
    ocr_hint_name: Option<String>,
    ocr_candidate: Option<bool>,
}

impl<'r> FromRow<'r, PgRow> for MetadataRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(MetadataRow {
            id: row.try_get("id")?,
            pid: row.try_get("pid")?,
            title: row.try_get("title")?,
            kind: row.try_get("kind")?,
            catalog_key: row.try_get("catalog_key")?,
            is_manuscript: row.try_get("is_manuscript")?,
            is_personal_item: row.try_get("is_personal_item")?,
            availability_policy: row.try_get("availability_policy")?,
            ocr_language_hint: row.try_get("ocr_language_hint")?,
            date_dl_ingest: row.try_get("date_dl_ingest")?,
            ocr_hint_id: row.try_get("ocr_hint_id")?,
            ocr_hint_name: row.try_get("ocr_hint_name")?,
            ocr_candidate: row.try_get("ocr_candidate")?,
        })
    }
}

impl TryFrom<MetadataRow> for Metadata {
    type Error = UnitStoreError;

    fn try_from(row: MetadataRow) -> Result<Self, Self::Error> {
        let ocr_hint = match (row.ocr_hint_id, row.ocr_hint_name) {
            (Some(id), Some(name)) => Some(OcrHint {
                id,
                name,
                ocr_candidate: row.ocr_candidate.unwrap_or(false),
            }),
            _ => None,
        };
        Ok(Metadata {
            id: MetadataId::new(row.id),
            pid: row.pid,
            title: row.title,
            kind: row.kind.parse().map_err(corrupt)?,
            catalog_key: row.catalog_key,
            is_manuscript: row.is_manuscript,
            is_personal_item: row.is_personal_item,
            availability_policy: row
                .availability_policy
                .map(|p| p.parse::<AvailabilityPolicy>())
                .transpose()
                .map_err(corrupt)?,
            ocr_hint,
            ocr_language_hint: row.ocr_language_hint,
            date_dl_ingest: row.date_dl_ingest,
        })
    }
}

#[derive(Debug)]
struct MasterFileRow {
    id: i64,
    unit_id: i64,
    pid: String,
    filename: String,
    title: Option<String>,
    filesize: i64,
    checksum: String,
    tech_meta: Option<Json<ImageTechMeta>>,
    date_archived: Option<DateTime<Utc>>,
}

impl<'r> FromRow<'r, PgRow> for MasterFileRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(MasterFileRow {
            id: row.try_get("id")?,
            unit_id: row.try_get("unit_id")?,
            pid: row.try_get("pid")?,
            filename: row.try_get("filename")?,
            title: row.try_get("title")?,
            filesize: row.try_get("filesize")?,
            checksum: row.try_get("checksum")?,
            tech_meta: row.try_get("tech_meta")?,
            date_archived: row.try_get("date_archived")?,
        })
    }
}

impl From<MasterFileRow> for MasterFile {
    fn from(row: MasterFileRow) -> Self {
        MasterFile {
            id: MasterFileId::new(row.id),
            unit_id: UnitId::new(row.unit_id),
            pid: row.pid,
            filename: row.filename,
            title: row.title,
            filesize: u64::try_from(row.filesize).unwrap_or_default(),
            checksum: row.checksum,
            tech_meta: row.tech_meta.map(|Json(m)| m),
            date_archived: row.date_archived,
        }
    }
}

fn filesize(bytes: u64) -> i64 {
    i64::try_from(bytes).unwrap_or(i64::MAX)
}

#[async_trait]
impl UnitStore for PostgresUnitStore {
    #[instrument(skip(self), fields(unit_id = %id), err)]
    async fn load_unit(&self, id: UnitId) -> Result<Option<UnitContext>, UnitStoreError> {
        let row: Option<UnitRow> =
            sqlx::query_as(&format!("SELECT {UNIT_COLUMNS} FROM units WHERE id = $1"))
                .bind(id.get())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| storage("load_unit", e))?;
        let Some(row) = row else {
            return Ok(None);
        };
        let unit = Unit::try_from(row)?;
        let order = self.load_order(unit.order_id).await?;
        let metadata = match unit.metadata_id {
            Some(m) => self.metadata(m).await?,
            None => None,
        };
        let intended_use = match unit.intended_use_id {
            Some(i) => self.load_intended_use(i).await?,
            None => None,
        };
        Ok(Some(UnitContext {
            unit,
            order,
            metadata,
            intended_use,
        }))
    }

    #[instrument(skip(self), fields(unit_id = %id), err)]
    async fn begin_finalization(&self, id: UnitId) -> Result<Option<UnitStatus>, UnitStoreError> {
        // The CTE reads the pre-update row, so the previous status comes back with the claim.
        let claimed: Option<(String,)> = sqlx::query_as(
            "WITH previous AS (SELECT id, status FROM units WHERE id = $1 FOR UPDATE) \
             UPDATE units SET status = 'finalizing' FROM previous \
             WHERE units.id = previous.id AND previous.status IN ('approved', 'error') \
             RETURNING previous.status",
        )
        .bind(id.get())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| storage("begin_finalization", e))?;
        match claimed {
            Some((status,)) => Ok(Some(status.parse().map_err(corrupt)?)),
            None => Ok(None),
        }
    }

    async fn set_unit_status(&self, id: UnitId, status: UnitStatus) -> Result<(), UnitStoreError> {
        let done = sqlx::query("UPDATE units SET status = $2 WHERE id = $1")
            .bind(id.get())
            .bind(status.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| storage("set_unit_status", e))?;
        if done.rows_affected() == 0 {
            return Err(UnitStoreError::unit(id));
        }
        Ok(())
    }

    async fn set_include_in_dl(&self, id: UnitId, include: bool) -> Result<(), UnitStoreError> {
        sqlx::query("UPDATE units SET include_in_dl = $2 WHERE id = $1")
            .bind(id.get())
            .bind(include)
            .execute(&self.pool)
            .await
            .map_err(|e| storage("set_include_in_dl", e))?;
        Ok(())
    }

    async fn stamp_unit(&self, id: UnitId, checkpoint: UnitCheckpoint) -> Result<(), UnitStoreError> {
        let column = checkpoint.column();
        sqlx::query(&format!(
            "UPDATE units SET {column} = now() WHERE id = $1 AND {column} IS NULL"
        ))
        .bind(id.get())
        .execute(&self.pool)
        .await
        .map_err(|e| storage("stamp_unit", e))?;
        Ok(())
    }

    async fn metadata(&self, id: MetadataId) -> Result<Option<Metadata>, UnitStoreError> {
        let row: Option<MetadataRow> = sqlx::query_as(
            "SELECT m.id, m.pid, m.title, m.kind, m.catalog_key, m.is_manuscript, \
             m.is_personal_item, m.availability_policy, m.ocr_language_hint, m.date_dl_ingest, \
             h.id AS ocr_hint_id, h.name AS ocr_hint_name, h.ocr_candidate \
             FROM metadata m LEFT JOIN ocr_hints h ON h.id = m.ocr_hint_id WHERE m.id = $1",
        )
        .bind(id.get())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| storage("metadata", e))?;
        row.map(Metadata::try_from).transpose()
    }

    async fn set_availability_policy(
        &self,
        id: MetadataId,
        policy: AvailabilityPolicy,
    ) -> Result<(), UnitStoreError> {
        sqlx::query("UPDATE metadata SET availability_policy = $2 WHERE id = $1")
            .bind(id.get())
            .bind(policy.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| storage("set_availability_policy", e))?;
        Ok(())
    }

    async fn stamp_metadata_dl_ingest(&self, id: MetadataId) -> Result<(), UnitStoreError> {
        sqlx::query(
            "UPDATE metadata SET date_dl_ingest = now() WHERE id = $1 AND date_dl_ingest IS NULL",
        )
        .bind(id.get())
        .execute(&self.pool)
        .await
        .map_err(|e| storage("stamp_metadata_dl_ingest", e))?;
        Ok(())
    }

    async fn approve_order(&self, id: OrderId) -> Result<(), UnitStoreError> {
        sqlx::query(
            "UPDATE orders SET status = 'approved', \
             date_order_approved = COALESCE(date_order_approved, now()) WHERE id = $1",
        )
        .bind(id.get())
        .execute(&self.pool)
        .await
        .map_err(|e| storage("approve_order", e))?;
        Ok(())
    }

    async fn stamp_order(
        &self,
        id: OrderId,
        checkpoint: OrderCheckpoint,
    ) -> Result<bool, UnitStoreError> {
        let column = checkpoint.column();
        let done = sqlx::query(&format!(
            "UPDATE orders SET {column} = now() WHERE id = $1 AND {column} IS NULL"
        ))
        .bind(id.get())
        .execute(&self.pool)
        .await
        .map_err(|e| storage("stamp_order", e))?;
        Ok(done.rows_affected() > 0)
    }

    async fn order_units(&self, id: OrderId) -> Result<Vec<Unit>, UnitStoreError> {
        let rows: Vec<UnitRow> = sqlx::query_as(&format!(
            "SELECT {UNIT_COLUMNS} FROM units WHERE order_id = $1 ORDER BY id"
        ))
        .bind(id.get())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| storage("order_units", e))?;
        rows.into_iter().map(Unit::try_from).collect()
    }

    async fn master_files(&self, unit: UnitId) -> Result<Vec<MasterFile>, UnitStoreError> {
        let rows: Vec<MasterFileRow> = sqlx::query_as(&format!(
            "SELECT {MASTER_FILE_COLUMNS} FROM master_files WHERE unit_id = $1 ORDER BY filename"
        ))
        .bind(unit.get())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| storage("master_files", e))?;
        Ok(rows.into_iter().map(MasterFile::from).collect())
    }

    #[instrument(skip(self, file), fields(unit_id = %file.unit_id, filename = %file.filename), err)]
    async fn create_master_file(&self, file: NewMasterFile) -> Result<MasterFile, UnitStoreError> {
        let row: MasterFileRow = sqlx::query_as(&format!(
            "WITH next AS (SELECT nextval(pg_get_serial_sequence('master_files', 'id')) AS id) \
             INSERT INTO master_files (id, unit_id, pid, filename, title, filesize, checksum, tech_meta) \
             SELECT next.id, $1, 'tsm:' || next.id, $2, $3, $4, $5, $6 FROM next \
             RETURNING {MASTER_FILE_COLUMNS}"
        ))
        .bind(file.unit_id.get())
        .bind(&file.filename)
        .bind(&file.title)
        .bind(filesize(file.filesize))
        .bind(&file.checksum)
        .bind(Json(&file.tech_meta))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| storage("create_master_file", e))?;
        Ok(row.into())
    }

    async fn update_master_file(&self, file: &MasterFile) -> Result<(), UnitStoreError> {
        let done = sqlx::query(
            "UPDATE master_files SET filename = $2, title = $3, filesize = $4, checksum = $5, \
             tech_meta = $6 WHERE id = $1",
        )
        .bind(file.id.get())
        .bind(&file.filename)
        .bind(&file.title)
        .bind(filesize(file.filesize))
        .bind(&file.checksum)
        .bind(file.tech_meta.as_ref().map(Json))
        .execute(&self.pool)
        .await
        .map_err(|e| storage("update_master_file", e))?;
        if done.rows_affected() == 0 {
            return Err(UnitStoreError::master_file(file.id));
        }
        Ok(())
    }

    async fn mark_master_file_archived(&self, id: MasterFileId) -> Result<(), UnitStoreError> {
        sqlx::query(
            "UPDATE master_files SET date_archived = COALESCE(date_archived, now()) WHERE id = $1",
        )
        .bind(id.get())
        .execute(&self.pool)
        .await
        .map_err(|e| storage("mark_master_file_archived", e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decodes_from_pg_rows<T: for<'r> FromRow<'r, PgRow>>() {}

    #[test]
    fn rows_decode_without_derive_macros() {
        decodes_from_pg_rows::<UnitRow>();
        decodes_from_pg_rows::<OrderRow>();
        decodes_from_pg_rows::<MetadataRow>();
        decodes_from_pg_rows::<MasterFileRow>();
    }
}
