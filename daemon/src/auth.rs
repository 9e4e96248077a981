use async_trait::async_trait;
use rand::RngCore;
use surrealdb::types::SurrealValue;
use thiserror::Error;
use tracing::{debug, info};
use ulid::Ulid;
use verdict_core::models::Identity;

use crate::db::DbHandle;

#[derive(Debug, Error)]
pub enum AuthError {
	#[error("unauthorized")]
	Unauthorized,

	#[error("invalid email: {0}")]
	InvalidEmail(String),

	#[error("database error: {0}")]
	DbError(String),
}

/// The parts of an inbound request identity resolution looks at.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestContext {
	pub bearer: Option<String>,
}

impl RequestContext {
	/// Build from a raw `Authorization` header value.
	pub fn from_authorization(header: Option<&str>) -> Self {
		let bearer = header.and_then(|h| {
			let h = h.trim();
			let token = match h.get(..7) {
				Some(prefix) if prefix.eq_ignore_ascii_case("bearer ") => h[7..].trim(),
				_ => return None,
			};
			(!token.is_empty()).then(|| token.to_string())
		});
		Self { bearer }
	}
}

/// Turns a request's auth context into an `Identity`. Read-only.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
	async fn resolve(&self, ctx: &RequestContext) -> Result<Identity, AuthError>;
}

#[derive(Debug, Clone, SurrealValue)]
struct SessionRow {
	user_id: String,
	email: String,
	display_name: String,
}

#[derive(Debug, Clone, SurrealValue)]
struct UserRow {
	key: String,
	display_name: String,
}

/// Resolves bearer tokens against the `session` table.
/// Only blake3 hashes of tokens are stored.
#[derive(Clone)]
pub struct SessionResolver {
	db: DbHandle,
}

impl SessionResolver {
	pub fn new(db: DbHandle) -> Self {
		Self { db }
	}
}

fn token_hash(token: &str) -> String {
	blake3::hash(token.as_bytes()).to_hex().to_string()
}

#[async_trait]
impl IdentityResolver for SessionResolver {
	async fn resolve(&self, ctx: &RequestContext) -> Result<Identity, AuthError> {
		let token = ctx.bearer.as_deref().ok_or(AuthError::Unauthorized)?;

		let mut response = self
			.db
			.db
			.query(
				"SELECT user_id, email, display_name FROM session
                 WHERE token_hash = $hash AND expires_at > time::now()
                 LIMIT 1",
			)
			.bind(("hash", token_hash(token)))
			.await
			.map_err(|e| AuthError::DbError(e.to_string()))?;

		let rows: Vec<SessionRow> = response.take(0).map_err(|e| AuthError::DbError(e.to_string()))?;

		match rows.into_iter().next() {
			Some(row) => Ok(Identity { id: row.user_id, email: row.email, display_name: row.display_name }),
			None => {
				debug!("bearer token did not match a live session");
				Err(AuthError::Unauthorized)
			}
		}
	}
}

fn normalize_email(raw: &str) -> Result<String, AuthError> {
	let email = raw.trim().to_lowercase();
	match email.split_once('@') {
		Some((local, domain)) if !local.is_empty() && domain.contains('.') && !domain.starts_with('.') => Ok(email),
		_ => Err(AuthError::InvalidEmail(raw.to_string())),
	}
}

fn new_token() -> String {
	let mut bytes = [0u8; 32];
	rand::thread_rng().fill_bytes(&mut bytes);
	bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Find or create the user for `email` and mint a session token for them.
///
/// The plaintext token is returned once and never stored.
pub async fn issue_session(
	db: &DbHandle,
	email: &str,
	display_name: &str,
	ttl_hours: u64,
) -> Result<(Identity, String), AuthError> {
	let email = normalize_email(email)?;
	let display_name = display_name.trim();

	let mut response = db
		.db
		.query("SELECT record::id(id) AS key, display_name FROM user WHERE email = $email LIMIT 1")
		.bind(("email", email.clone()))
		.await
		.map_err(|e| AuthError::DbError(e.to_string()))?;
	let existing: Vec<UserRow> = response.take(0).map_err(|e| AuthError::DbError(e.to_string()))?;

	let identity = match existing.into_iter().next() {
		Some(user) => Identity {
			id: user.key,
			email: email.clone(),
			display_name: if display_name.is_empty() { user.display_name } else { display_name.to_string() },
		},
		None => {
			let key = Ulid::new().to_string();
			let name = if display_name.is_empty() { email.clone() } else { display_name.to_string() };
			db.db
				.query(
					"CREATE type::record('user', $key) CONTENT {
                        email: $email,
                        display_name: $name,
                        created_at: time::now(),
                    }",
				)
				.bind(("key", key.clone()))
				.bind(("email", email.clone()))
				.bind(("name", name.clone()))
				.await
				.map_err(|e| AuthError::DbError(e.to_string()))?
				.check()
				.map_err(|e| AuthError::DbError(e.to_string()))?;
			info!(user = %key, "user created");
			Identity { id: key, email: email.clone(), display_name: name }
		}
	};

	let token = new_token();
	db.db
		.query(
			"CREATE session CONTENT {
                token_hash: $hash,
                user_id: $user_id,
                email: $email,
                display_name: $name,
                created_at: time::now(),
                expires_at: time::now() + <duration> $ttl,
            }",
		)
		.bind(("hash", token_hash(&token)))
		.bind(("user_id", identity.id.clone()))
		.bind(("email", identity.email.clone()))
		.bind(("name", identity.display_name.clone()))
		.bind(("ttl", format!("{ttl_hours}h")))
		.await
		.map_err(|e| AuthError::DbError(e.to_string()))?
		.check()
		.map_err(|e| AuthError::DbError(e.to_string()))?;

	info!(user = %identity.id, ttl_hours, "session issued");
	Ok((identity, token))
}
