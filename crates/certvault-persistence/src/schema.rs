//! Schema provisioning
//!
//! Tables are either created from the entity definitions or from an
//! operator-provided SQL script such as the `tables.sql` shipped with the
//! repository.

use std::path::Path;

use sea_orm::{ConnectionTrait, DatabaseConnection, EntityTrait, Schema};
use tracing::{debug, info};

use crate::entity::{locks, values};
use crate::error::{Result, StorageError};

/// Create the `locks` and `values` tables if they do not exist yet.
pub async fn create_tables(db: &DatabaseConnection) -> Result<()> {
    create_table(db, locks::Entity).await?;
    create_table(db, values::Entity).await?;
    info!(backend = ?db.get_database_backend(), "Certificate store schema provisioned");
    Ok(())
}

async fn create_table<E>(db: &DatabaseConnection, entity: E) -> Result<()>
where
    E: EntityTrait,
{
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);
    let mut statement = schema.create_table_from_entity(entity);
    statement.if_not_exists();

    db.execute(backend.build(&statement))
        .await
        .map_err(|e| StorageError::store(format!("could not create table {}", entity.table_name()), e))?;
    Ok(())
}

/// Split a SQL script into statements.
///
/// Lines starting with `--` are skipped. Lines are joined with a space and a
/// statement ends at a line whose accumulated text ends in `;`. A trailing
/// statement without a semicolon is dropped.
pub fn split_sql_script(script: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut query = String::new();

    for line in script.lines() {
        if line.trim_start().starts_with("--") {
            continue;
        }
        query.push_str(line);
        query.push(' ');
        if !query.trim_end().ends_with(';') {
            continue;
        }
        let statement = query.trim().to_string();
        if statement != ";" {
            statements.push(statement);
        }
        query.clear();
    }

    statements
}

/// Execute every statement of the SQL script at `path`, in order.
///
/// Returns the number of statements executed. Stops at the first failing
/// statement.
pub async fn execute_sql_file(db: &DatabaseConnection, path: impl AsRef<Path>) -> Result<usize> {
    let path = path.as_ref();
    let script = tokio::fs::read_to_string(path).await.map_err(|e| {
        StorageError::store(
            format!("could not read SQL file {}", path.display()),
            sea_orm::DbErr::Custom(e.to_string()),
        )
    })?;

    let statements = split_sql_script(&script);
    for statement in &statements {
        debug!(file = %path.display(), statement = %statement, "Executing SQL statement");
        db.execute_unprepared(statement).await.map_err(|e| {
            StorageError::store(
                format!("could not execute statement from {}", path.display()),
                e,
            )
        })?;
    }

    info!(file = %path.display(), statements = statements.len(), "SQL file executed");
    Ok(statements.len())
}
