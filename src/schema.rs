//! Schema-name resolution.
//!
//! The active schema must be computed identically wherever it is needed (pool
//! construction, migration tooling); a divergence would silently route
//! operations to the wrong namespace. Keep this the single implementation.

// self
use crate::settings::Settings;

/// Schema used when no override or developer identity applies.
pub const DEFAULT_SCHEMA: &str = "public";
/// Prefix for schemas derived from a developer identity.
pub const DEV_SCHEMA_PREFIX: &str = "dev";

/// Resolves the logical schema for the current configuration.
///
/// Precedence, first match wins:
/// 1. `PGSCHEMA`, the explicit override.
/// 2. `DB_SCHEMA`, the managed-service override.
/// 3. Managed service with a developer identity set: `dev_<local-part>`.
/// 4. Local development (no secret store) with a developer identity set:
///    same derivation.
/// 5. [`DEFAULT_SCHEMA`].
pub fn resolve(settings: &Settings) -> String {
	if let Some(schema) = settings.pgschema.as_deref() {
		return schema.to_owned();
	}
	if let Some(schema) = settings.db_schema.as_deref() {
		return schema.to_owned();
	}
	// Steps 3 and 4 share the derivation; they differ only in how the
	// context qualifies (managed service vs. vaultless local development).
	let derivable = settings.managed() || settings.local_development();

	match settings.pguser.as_deref() {
		Some(identity) if derivable => derive_from_identity(identity),
		_ => DEFAULT_SCHEMA.to_owned(),
	}
}

/// Derives a per-developer schema from the local part of the identity, the
/// text before the first `@`.
fn derive_from_identity(identity: &str) -> String {
	let local_part = identity.split('@').next().unwrap_or(identity);

	format!("{DEV_SCHEMA_PREFIX}_{local_part}")
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn all_sources_set() -> Settings {
		Settings {
			use_managed_db: true,
			pgschema: Some("explicit".into()),
			db_schema: Some("managed".into()),
			pguser: Some("alice@example.com".into()),
			..Settings::default()
		}
	}

	#[test]
	fn explicit_override_beats_everything() {
		assert_eq!(resolve(&all_sources_set()), "explicit");
	}

	#[test]
	fn managed_override_is_second() {
		let settings = Settings { pgschema: None, ..all_sources_set() };

		assert_eq!(resolve(&settings), "managed");
	}

	#[test]
	fn managed_identity_derivation_is_third() {
		let settings = Settings { pgschema: None, db_schema: None, ..all_sources_set() };

		assert_eq!(resolve(&settings), "dev_alice");
	}

	#[test]
	fn local_identity_derivation_is_fourth() {
		let settings = Settings {
			use_managed_db: false,
			pgschema: None,
			db_schema: None,
			..all_sources_set()
		};

		assert!(settings.local_development());
		assert_eq!(resolve(&settings), "dev_alice");
	}

	#[test]
	fn default_applies_when_nothing_matches() {
		let settings = Settings::default();

		assert_eq!(resolve(&settings), DEFAULT_SCHEMA);
	}

	#[test]
	fn vaulted_non_managed_context_never_derives_from_identity() {
		let settings = Settings {
			use_managed_db: false,
			pgschema: None,
			db_schema: None,
			secret_store_name: Some("prod-vault".into()),
			..all_sources_set()
		};

		assert_eq!(resolve(&settings), DEFAULT_SCHEMA);
	}

	#[test]
	fn each_single_source_resolves_to_itself() {
		let cases: [(Settings, &str); 5] = [
			(
				Settings { pgschema: Some("explicit".into()), ..Settings::default() },
				"explicit",
			),
			(Settings { db_schema: Some("managed".into()), ..Settings::default() }, "managed"),
			(
				Settings {
					use_managed_db: true,
					pguser: Some("bob@corp".into()),
					secret_store_name: Some("vault".into()),
					..Settings::default()
				},
				"dev_bob",
			),
			(Settings { pguser: Some("carol@corp".into()), ..Settings::default() }, "dev_carol"),
			(Settings::default(), DEFAULT_SCHEMA),
		];

		for (settings, expected) in cases {
			assert_eq!(resolve(&settings), expected);
		}
	}

	#[test]
	fn identities_without_an_at_sign_are_used_whole() {
		let settings = Settings { pguser: Some("dave".into()), ..Settings::default() };

		assert_eq!(resolve(&settings), "dev_dave");
	}
}
