use surrealdb::engine::local::{Db, Mem, SurrealKv};
use surrealdb::Surreal;
use tracing::info;

use crate::config::{StorageConfig, StorageEngine};

/// Wrapper around the SurrealDB handle.
/// Clone is cheap (Arc internally).
#[derive(Clone)]
pub struct DbHandle {
	pub db: Surreal<Db>,
}

/// Open the configured engine, select ns/db and run migrations.
pub async fn init(storage: &StorageConfig) -> Result<DbHandle, Box<dyn std::error::Error>> {
	let db = match storage.engine {
		StorageEngine::SurrealKv => {
			let path = storage.resolved_path()?;
			if let Some(parent) = path.parent() {
				std::fs::create_dir_all(parent)?;
			}
			info!(path = %path.display(), "opening surrealkv store");
			Surreal::new::<SurrealKv>(path).await?
		}
		StorageEngine::Memory => {
			info!("opening in-memory store");
			Surreal::new::<Mem>(()).await?
		}
	};
	db.use_ns("verdict").use_db("verdict").await?;

	run_migrations(&db).await?;

	Ok(DbHandle { db })
}

/// Fresh in-memory database with the schema applied.
pub async fn init_memory() -> Result<DbHandle, Box<dyn std::error::Error>> {
	init(&StorageConfig { engine: StorageEngine::Memory, path: None }).await
}

/// Run schema migrations. DEFINE statements are idempotent.
async fn run_migrations(db: &Surreal<Db>) -> Result<(), Box<dyn std::error::Error>> {
	db.query(SCHEMA_V1).await?.check()?;
	Ok(())
}

const SCHEMA_V1: &str = "
    DEFINE TABLE OVERWRITE user SCHEMAFULL;
    DEFINE FIELD OVERWRITE email ON user TYPE string;
    DEFINE FIELD OVERWRITE display_name ON user TYPE string;
    DEFINE FIELD OVERWRITE created_at ON user TYPE datetime READONLY;
    DEFINE INDEX OVERWRITE idx_user_email ON user FIELDS email UNIQUE;

    DEFINE TABLE OVERWRITE session SCHEMAFULL;
    DEFINE FIELD OVERWRITE token_hash ON session TYPE string READONLY;
    DEFINE FIELD OVERWRITE user_id ON session TYPE string READONLY;
    DEFINE FIELD OVERWRITE email ON session TYPE string READONLY;
    DEFINE FIELD OVERWRITE display_name ON session TYPE string;
    DEFINE FIELD OVERWRITE created_at ON session TYPE datetime READONLY;
    DEFINE FIELD OVERWRITE expires_at ON session TYPE datetime;
    DEFINE INDEX OVERWRITE idx_session_token ON session FIELDS token_hash UNIQUE;

    DEFINE TABLE OVERWRITE detection SCHEMAFULL;
    DEFINE FIELD OVERWRITE owner_id ON detection TYPE string READONLY;
    DEFINE FIELD OVERWRITE owner_email ON detection TYPE string READONLY;
    DEFINE FIELD OVERWRITE owner_name ON detection TYPE string READONLY;
    DEFINE FIELD OVERWRITE image_kind ON detection TYPE string ASSERT $value IN ['upload', 'url'];
    DEFINE FIELD OVERWRITE image_ref ON detection TYPE option<string>;
    DEFINE FIELD OVERWRITE ai_probability ON detection TYPE float ASSERT $value >= 0 AND $value <= 100;
    DEFINE FIELD OVERWRITE real_probability ON detection TYPE float ASSERT $value >= 0 AND $value <= 100;
    DEFINE FIELD OVERWRITE verdict ON detection TYPE string ASSERT $value IN ['AI', 'REAL'];
    DEFINE FIELD OVERWRITE processing_time_ms ON detection TYPE float ASSERT $value >= 0;
    DEFINE FIELD OVERWRITE filename ON detection TYPE option<string>;
    DEFINE FIELD OVERWRITE format ON detection TYPE option<string>;
    DEFINE FIELD OVERWRITE width ON detection TYPE int;
    DEFINE FIELD OVERWRITE height ON detection TYPE int;
    DEFINE FIELD OVERWRITE created_at ON detection TYPE datetime READONLY;
    DEFINE INDEX OVERWRITE idx_detection_owner ON detection FIELDS owner_email, created_at;
    DEFINE INDEX OVERWRITE idx_detection_owner_id ON detection FIELDS owner_id, created_at;
";
