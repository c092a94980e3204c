//! Assessa evaluation closer.
//!
//! Closes published evaluations whose deadline has passed. `migrate` applies
//! database migrations and exits; `seed-roles` upserts the default role catalog
//! and exits.

#![forbid(unsafe_code)]

use std::env;
use std::sync::Arc;
use std::time::Duration;

use assessa_application::{AuthorizationService, EvaluationService, RoleRepository};
use assessa_core::{AppError, AppResult, UserId, UserIdentity};
use assessa_domain::Role;
use assessa_infrastructure::{
    PostgresAuditRepository, PostgresEnrollmentRepository, PostgresEvaluationRepository,
    PostgresRoleRepository,
};

use chrono::Utc;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Run,
    Migrate,
    SeedRoles,
}

#[derive(Debug, Clone)]
struct CloserConfig {
    database_url: String,
    subject_id: UserId,
    poll_interval_ms: u64,
    batch_limit: usize,
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    match parse_command(env::args().nth(1).as_deref())? {
        Command::Migrate => {
            let pool = connect_pool(required_env("DATABASE_URL")?.as_str()).await?;
            run_migrations(&pool).await
        }
        Command::SeedRoles => {
            let pool = connect_pool(required_env("DATABASE_URL")?.as_str()).await?;
            seed_roles(pool).await
        }
        Command::Run => run_closer(CloserConfig::load()?).await,
    }
}

fn parse_command(argument: Option<&str>) -> AppResult<Command> {
    match argument {
        None => Ok(Command::Run),
        Some("migrate") => Ok(Command::Migrate),
        Some("seed-roles") => Ok(Command::SeedRoles),
        Some(other) => Err(AppError::Validation(format!(
            "unknown command '{other}', expected 'migrate' or 'seed-roles'"
        ))),
    }
}

async fn run_closer(config: CloserConfig) -> AppResult<()> {
    let pool = connect_pool(config.database_url.as_str()).await?;
    let (authorization_service, evaluation_service) = build_services(pool);
    let identity = UserIdentity::new(config.subject_id, "evaluation-closer", None);

    info!(
        subject = %config.subject_id,
        poll_interval_ms = config.poll_interval_ms,
        batch_limit = config.batch_limit,
        "assessa-worker started"
    );

    loop {
        match authorization_service
            .resolve_principal(identity.clone())
            .await
        {
            Ok(principal) => {
                match evaluation_service
                    .close_due_evaluations(&principal, Utc::now(), config.batch_limit)
                    .await
                {
                    Ok(closed) if !closed.is_empty() => {
                        info!(closed_count = closed.len(), "closed due evaluations");
                    }
                    Ok(_) => {}
                    Err(error) => {
                        warn!(error = %error, "failed to list due evaluations");
                    }
                }
            }
            Err(error) => {
                warn!(
                    subject = %config.subject_id,
                    error = %error,
                    "failed to resolve closer principal"
                );
            }
        }

        tokio::time::sleep(Duration::from_millis(config.poll_interval_ms)).await;
    }
}

fn build_services(pool: PgPool) -> (AuthorizationService, EvaluationService) {
    let role_repository = Arc::new(PostgresRoleRepository::new(pool.clone()));
    let evaluation_repository = Arc::new(PostgresEvaluationRepository::new(pool.clone()));
    let enrollment_repository = Arc::new(PostgresEnrollmentRepository::new(pool.clone()));
    let audit_repository = Arc::new(PostgresAuditRepository::new(pool));
    let authorization_service =
        AuthorizationService::new(role_repository, audit_repository.clone());

    let evaluation_service = EvaluationService::new(
        authorization_service.clone(),
        evaluation_repository,
        enrollment_repository,
        audit_repository,
    );

    (authorization_service, evaluation_service)
}

async fn connect_pool(database_url: &str) -> AppResult<PgPool> {
    PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
        .map_err(|error| AppError::Internal(format!("failed to connect to database: {error}")))
}

async fn run_migrations(pool: &PgPool) -> AppResult<()> {
    sqlx::migrate!("../../crates/infrastructure/migrations")
        .run(pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to run migrations: {error}")))?;

    info!("database migrations applied");
    Ok(())
}

async fn seed_roles(pool: PgPool) -> AppResult<()> {
    let repository = PostgresRoleRepository::new(pool);

    for role in Role::default_catalog()? {
        let role_name = role.name();
        repository.save_role(role).await?;
        info!(role = role_name.as_str(), "role seeded");
    }

    Ok(())
}

impl CloserConfig {
    fn load() -> AppResult<Self> {
        let database_url = required_env("DATABASE_URL")?;
        let subject_id = required_env("CLOSER_SUBJECT_ID")?;
        let subject_id = Uuid::parse_str(subject_id.trim()).map_err(|error| {
            AppError::Validation(format!(
                "invalid CLOSER_SUBJECT_ID value '{subject_id}': {error}"
            ))
        })?;
        let poll_interval_ms = parse_env_u64("CLOSER_POLL_INTERVAL_MS", 30_000)?;
        let batch_limit = parse_env_usize("CLOSER_BATCH_LIMIT", 100)?;

        if poll_interval_ms == 0 {
            return Err(AppError::Validation(
                "CLOSER_POLL_INTERVAL_MS must be greater than zero".to_owned(),
            ));
        }

        if batch_limit == 0 {
            return Err(AppError::Validation(
                "CLOSER_BATCH_LIMIT must be greater than zero".to_owned(),
            ));
        }

        Ok(Self {
            database_url,
            subject_id: UserId::from_uuid(subject_id),
            poll_interval_ms,
            batch_limit,
        })
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

fn required_env(name: &str) -> AppResult<String> {
    env::var(name).map_err(|_| AppError::Validation(format!("{name} is required")))
}

fn parse_env_usize(name: &str, default: usize) -> AppResult<usize> {
    match env::var(name) {
        Ok(value) => value.parse::<usize>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        Err(_) => Ok(default),
    }
}

fn parse_env_u64(name: &str, default: u64) -> AppResult<u64> {
    match env::var(name) {
        Ok(value) => value.parse::<u64>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::{Command, parse_command};

    #[test]
    fn commands_are_parsed_from_first_argument() {
        assert!(matches!(parse_command(None), Ok(Command::Run)));
        assert!(matches!(parse_command(Some("migrate")), Ok(Command::Migrate)));
        assert!(matches!(
            parse_command(Some("seed-roles")),
            Ok(Command::SeedRoles)
        ));
        assert!(parse_command(Some("serve")).is_err());
    }
}
