use std::collections::HashMap;
use std::str::FromStr;

use assessa_application::RoleRepository;
use assessa_core::{AppError, AppResult, UserId};
use assessa_domain::{Action, PermissionSet, Role, RoleName};
use async_trait::async_trait;
use sqlx::{FromRow, PgPool};


/// PostgreSQL-backed repository for role documents and subject memberships.
///
/// Permission entries keep the order they were saved in through a `position` column.
#[derive(Clone)]
pub struct PostgresRoleRepository {
    pool: PgPool,
}

impl PostgresRoleRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct RoleRow {
    name: String,
    level: i16,
    description: Option<String>,
    is_active: bool,
}

#[derive(Debug, FromRow)]
struct RolePermissionRow {
    role_name: String,
    position: i32,
    resource: String,
    action: String,
}

#[async_trait]
impl RoleRepository for PostgresRoleRepository {
    async fn list_roles_for_subject(&self, subject: UserId) -> AppResult<Vec<Role>> {
        let role_rows = sqlx::query_as::<_, RoleRow>(
            r#"
            SELECT roles.name, roles.level, roles.description, roles.is_active
            FROM subject_roles
            INNER JOIN roles ON roles.name = subject_roles.role_name
            WHERE subject_roles.subject = $1
            ORDER BY roles.level DESC, roles.name
            "#,
        )
        .bind(subject.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to load roles for '{subject}': {error}"))
        })?;

        if role_rows.is_empty() {
            return Ok(Vec::new());
        }

        let role_names: Vec<String> = role_rows.iter().map(|row| row.name.clone()).collect();
        let permission_rows = sqlx::query_as::<_, RolePermissionRow>(
            r#"
            SELECT role_name, position, resource, action
            FROM role_permissions
            WHERE role_name = ANY($1)
            ORDER BY role_name, position, action
            "#,
        )
        .bind(&role_names)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to load role permissions for '{subject}': {error}"
            ))
        })?;

        let mut grouped: HashMap<String, Vec<(i32, String, Vec<Action>)>> = HashMap::new();
        for row in permission_rows {
            let action = Action::from_str(row.action.as_str()).map_err(|error| {
                AppError::Internal(format!(
                    "role '{}' has an invalid stored action: {error}",
                    row.role_name
                ))
            })?;
            let entries = grouped.entry(row.role_name).or_default();
            match entries.last_mut() {
                Some((position, _, actions)) if *position == row.position => {
                    actions.push(action);
                }
                _ => entries.push((row.position, row.resource, vec![action])),
            }
        }

        role_rows
            .into_iter()
            .map(|row| {
                let permissions = grouped
                    .remove(&row.name)
                    .unwrap_or_default()
                    .into_iter()
                    .map(|(_, resource, actions)| PermissionSet::new(resource, actions))
                    .collect::<AppResult<Vec<_>>>()?;
                decode_role(row, permissions)
            })
            .collect()
    }

    async fn save_role(&self, role: Role) -> AppResult<()> {
        let mut transaction = self.pool.begin().await.map_err(|error| {
            AppError::Internal(format!("failed to begin transaction: {error}"))
        })?;

        sqlx::query(
            r#"
            INSERT INTO roles (name, level, description, is_active)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (name) DO UPDATE
            SET level = EXCLUDED.level,
                description = EXCLUDED.description,
                is_active = EXCLUDED.is_active,
                updated_at = now()
            "#,
        )
        .bind(role.name().as_str())
        .bind(i16::from(role.level()))
        .bind(role.description())
        .bind(role.is_active())
        .execute(&mut *transaction)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to save role '{}': {error}",
                role.name().as_str()
            ))
        })?;

        sqlx::query("DELETE FROM role_permissions WHERE role_name = $1")
            .bind(role.name().as_str())
            .execute(&mut *transaction)
            .await
            .map_err(|error| {
                AppError::Internal(format!(
                    "failed to clear permissions of role '{}': {error}",
                    role.name().as_str()
                ))
            })?;

        for (position, permission) in role.permissions().iter().enumerate() {
            let position = i32::try_from(position).map_err(|_| {
                AppError::Validation(format!(
                    "role '{}' has too many permission entries",
                    role.name().as_str()
                ))
            })?;

            for action in permission.actions() {
                sqlx::query(
                    r#"
                    INSERT INTO role_permissions (role_name, position, resource, action)
                    VALUES ($1, $2, $3, $4)
                    "#,
                )
                .bind(role.name().as_str())
                .bind(position)
                .bind(permission.resource())
                .bind(action.as_str())
                .execute(&mut *transaction)
                .await
                .map_err(|error| {
                    AppError::Internal(format!(
                        "failed to save permission '{}:{}' of role '{}': {error}",
                        permission.resource(),
                        action.as_str(),
                        role.name().as_str()
                    ))
                })?;
            }
        }

        transaction.commit().await.map_err(|error| {
            AppError::Internal(format!("failed to commit role transaction: {error}"))
        })?;

        Ok(())
    }

    async fn assign_role(&self, subject: UserId, role_name: RoleName) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO subject_roles (subject, role_name)
            VALUES ($1, $2)
            ON CONFLICT (subject, role_name) DO NOTHING
            "#,
        )
        .bind(subject.as_uuid())
        .bind(role_name.as_str())
        .execute(&self.pool)
        .await
        .map_err(|error| {
            if let sqlx::Error::Database(database_error) = &error
                && database_error.code().as_deref() == Some("23503")
            {
                return AppError::NotFound(format!(
                    "role '{}' does not exist",
                    role_name.as_str()
                ));
            }

            AppError::Internal(format!(
                "failed to assign role '{}' to '{subject}': {error}",
                role_name.as_str()
            ))
        })?;

        Ok(())
    }
}

fn decode_role(row: RoleRow, permissions: Vec<PermissionSet>) -> AppResult<Role> {
    let name = RoleName::from_str(row.name.as_str()).map_err(|error| {
        AppError::Internal(format!("invalid stored role name '{}': {error}", row.name))
    })?;
    let level = u8::try_from(row.level).map_err(|_| {
        AppError::Internal(format!(
            "role '{}' has out-of-range level {}",
            row.name, row.level
        ))
    })?;

    let role = Role::new(name, level, permissions)?.with_active(row.is_active);
    Ok(match row.description {
        Some(description) => role.with_description(description),
        None => role,
    })
}
