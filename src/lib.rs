//! Credential lease broker for managed Postgres: mint short-lived OAuth database passwords,
//! refresh them ahead of expiry, and hot-swap sqlx pools when authentication fails.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod credential;
pub mod error;
pub mod fetch;
pub mod manager;
pub mod obs;
pub mod pool;
pub mod schema;
pub mod settings;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience fixtures shared by unit tests; enabled via `cfg(test)` or the `test` crate
	//! feature.

	pub use crate::_prelude::*;

	// std
	use std::sync::atomic::{AtomicUsize, Ordering};
	// self
	use crate::{
		auth::TokenSecret,
		credential::{Credential, CredentialFuture, CredentialSource},
		settings::Settings,
	};

	/// Settings fixture describing a managed workspace with a static local-dev token.
	pub fn managed_settings() -> Settings {
		Settings {
			use_managed_db: true,
			db_workspace_url: Some(
				Url::parse("https://workspace.example.com")
					.expect("Fixture workspace URL should parse."),
			),
			db_tenant_id: Some("tenant-fixture".into()),
			db_hostname: Some("instance.database.example.com".into()),
			db_database_name: Some("app".into()),
			db_instance_name: Some("instance-fixture".into()),
			db_static_token: Some("dapi-fixture".into()),
			pguser: Some("dev@example.com".into()),
			..Settings::default()
		}
	}

	/// Credential source that counts invocations and mints sequenced tokens valid for one hour.
	#[derive(Debug, Default)]
	pub struct CountingSource {
		calls: AtomicUsize,
	}
	impl CountingSource {
		/// Number of fetches performed so far.
		pub fn calls(&self) -> usize {
			self.calls.load(Ordering::SeqCst)
		}
	}
	impl CredentialSource for CountingSource {
		fn fetch(&self) -> CredentialFuture<'_> {
			let sequence = self.calls.fetch_add(1, Ordering::SeqCst);

			Box::pin(async move {
				Ok(Credential::new(
					TokenSecret::new(format!("token-{sequence}")),
					OffsetDateTime::now_utc() + Duration::hours(1),
				))
			})
		}
	}
}

mod _prelude {
	pub use std::{
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::RwLock;
	#[cfg(feature = "reqwest")] pub use reqwest::Client as ReqwestClient;
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use sqlx;
pub use url;
#[cfg(test)] use {httpmock as _, tempfile as _};
