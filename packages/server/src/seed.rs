use sea_orm::*;
use sea_query::{Index, IndexCreateStatement, PostgresQueryBuilder, SqliteQueryBuilder};
use tracing::info;

use crate::entity::{role, role_permission, upload_log, upload_session};

/// Default roles seeded on startup.
const DEFAULT_ROLES: &[&str] = &[
    "admin",
    "staff",
    role::STUDENT_ROLE,
    role::PARENT_ROLE,
    role::DEFAULT_ROLE,
];

/// Default role-permission mappings seeded on startup.
const DEFAULT_MAPPINGS: &[(&str, &str)] = &[
    ("admin", "upload:create"),
    ("admin", "upload:view_all"),
    ("staff", "upload:create"),
];

/// Seed the `role` and `role_permission` tables with defaults.
pub async fn seed_role_permissions(db: &DatabaseConnection) -> Result<(), DbErr> {
    let mut roles_inserted = 0u32;
    for &name in DEFAULT_ROLES {
        let model = role::ActiveModel {
            name: Set(name.to_string()),
        };

        let result = role::Entity::insert(model)
            .on_conflict(
                sea_query::OnConflict::column(role::Column::Name)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(db)
            .await;

        match result {
            Ok(n) => roles_inserted += n as u32,
            Err(DbErr::RecordNotInserted) => {}
            Err(e) => return Err(e),
        }
    }

    if roles_inserted > 0 {
        info!("Seeded {} new roles", roles_inserted);
    }

    let mut perms_inserted = 0u32;
    for &(role, permission) in DEFAULT_MAPPINGS {
        let model = role_permission::ActiveModel {
            role: Set(role.to_string()),
            permission: Set(permission.to_string()),
        };

        let result = role_permission::Entity::insert(model)
            .on_conflict(
                sea_query::OnConflict::columns([
                    role_permission::Column::Role,
                    role_permission::Column::Permission,
                ])
                .do_nothing()
                .to_owned(),
            )
            .exec_without_returning(db)
            .await;

        match result {
            Ok(n) => perms_inserted += n as u32,
            Err(DbErr::RecordNotInserted) => {}
            Err(e) => return Err(e),
        }
    }

    if perms_inserted > 0 {
        info!("Seeded {} new role-permission mappings", perms_inserted);
    }

    Ok(())
}

async fn create_index(db: &DatabaseConnection, name: &str, stmt: IndexCreateStatement) {
    let sql = match db.get_database_backend() {
        DbBackend::Sqlite => stmt.to_string(SqliteQueryBuilder),
        _ => stmt.to_string(PostgresQueryBuilder),
    };

    match db.execute_unprepared(&sql).await {
        Ok(_) => info!("Ensured index {} exists", name),
        Err(e) => tracing::warn!("Failed to create index {}: {}", name, e),
    }
}

/// Ensure required database indexes exist.
///
/// SeaORM's schema-sync doesn't support composite non-unique indexes,
/// so we create them manually on startup.
pub async fn ensure_indexes(db: &DatabaseConnection) -> Result<(), DbErr> {
    // Owner-scoped listing, newest first.
    create_index(
        db,
        "idx_upload_session_owner_started",
        Index::create()
            .if_not_exists()
            .name("idx_upload_session_owner_started")
            .table(upload_session::Entity)
            .col(upload_session::Column::OwnerId)
            .col(upload_session::Column::StartedAt)
            .to_owned(),
    )
    .await;

    // Retention sweep.
    create_index(
        db,
        "idx_upload_session_started",
        Index::create()
            .if_not_exists()
            .name("idx_upload_session_started")
            .table(upload_session::Entity)
            .col(upload_session::Column::StartedAt)
            .to_owned(),
    )
    .await;

    // Bulk log deletes by session. Row lookups are covered by the
    // (session_id, row_number) unique key.
    create_index(
        db,
        "idx_upload_log_session",
        Index::create()
            .if_not_exists()
            .name("idx_upload_log_session")
            .table(upload_log::Entity)
            .col(upload_log::Column::SessionId)
            .to_owned(),
    )
    .await;

    Ok(())
}
