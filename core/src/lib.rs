//! Core components for signing AWS requests.
//!
//! This crate provides the service-agnostic building blocks used by the awsign
//! signers: how credentials are provided, how requests are signed, and how
//! both reach the outside world.
//!
//! ## Overview
//!
//! - **Context**: holds the implementations for file reading, HTTP sending and environment access
//! - **Traits**: [`ProvideCredential`] loads credentials, [`SignRequest`] signs requests
//! - **Chains**: [`ProvideCredentialChain`] tries providers in order and remembers the last winner
//! - **Signer**: caches credentials and drives a [`SignRequest`] implementation
//!
//! ## Example
//!
//! ```no_run
//! use awsign_core::{Context, OsEnv, ProvideCredential, Result, SignRequest, Signer, SigningCredential};
//! use async_trait::async_trait;
//! use std::time::Duration;
//!
//! #[derive(Clone, Debug)]
//! struct MyCredential {
//!     key: String,
//! }
//!
//! impl SigningCredential for MyCredential {
//!     fn is_valid(&self) -> bool {
//!         !self.key.is_empty()
//!     }
//! }
//!
//! #[derive(Debug)]
//! struct MyProvider;
//!
//! #[async_trait]
//! impl ProvideCredential for MyProvider {
//!     type Credential = MyCredential;
//!
//!     async fn provide_credential(&self, ctx: &Context) -> Result<Option<Self::Credential>> {
//!         Ok(ctx.env_var("MY_KEY").map(|key| MyCredential { key }))
//!     }
//! }
//!
//! #[derive(Debug)]
//! struct MyBuilder;
//!
//! #[async_trait]
//! impl SignRequest for MyBuilder {
//!     type Credential = MyCredential;
//!
//!     async fn sign_request(
//!         &self,
//!         _: &Context,
//!         req: &mut http::request::Parts,
//!         credential: Option<&Self::Credential>,
//!         _: Option<Duration>,
//!     ) -> Result<()> {
//!         if let Some(cred) = credential {
//!             req.headers.insert("x-my-key", cred.key.parse()?);
//!         }
//!         Ok(())
//!     }
//! }
//!
//! # async fn example() -> Result<()> {
//! let signer = Signer::new(Context::new().with_env(OsEnv), MyProvider, MyBuilder);
//!
//! let mut parts = http::Request::builder()
//!     .uri("https://example.com")
//!     .body(())?
//!     .into_parts()
//!     .0;
//! signer.sign(&mut parts, None).await?;
//! # Ok(())
//! # }
//! ```

// Make sure all our public APIs have docs.
#![warn(missing_docs)]

pub mod hash;
pub mod time;
pub mod utils;

mod error;
pub use error::{Error, ErrorKind, Result};
mod context;
pub use context::Context;
mod fs;
pub use fs::{FileRead, NoopFileRead};
mod http;
pub use http::{HttpSend, NoopHttpSend};
mod env;
pub use env::{Env, NoopEnv, OsEnv, StaticEnv};

mod api;
pub use api::{ProvideCredential, SignRequest, SigningCredential};
mod chain;
pub use chain::{ChainState, ProvideCredentialChain};
mod request;
pub use request::{SigningMethod, SigningRequest};
mod signer;
pub use signer::Signer;
