// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! Tokio-based file reading for awsign.
//!
//! `TokioFileRead` implements [`awsign_core::FileRead`] with `tokio::fs`, which is
//! what the profile providers use to load `~/.aws/config` and `~/.aws/credentials`.
//!
//! ```no_run
//! use awsign_core::{Context, OsEnv};
//! use awsign_file_read_tokio::TokioFileRead;
//!
//! # async fn example() -> awsign_core::Result<()> {
//! let ctx = Context::new().with_file_read(TokioFileRead).with_env(OsEnv);
//! let config = ctx.file_read_as_string("/home/me/.aws/config").await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use awsign_core::{Error, FileRead, Result};
use log::debug;

/// Tokio-based implementation of the `FileRead` trait.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioFileRead;

#[async_trait]
impl FileRead for TokioFileRead {
    async fn file_read(&self, path: &str) -> Result<Vec<u8>> {
        debug!("reading file: {path}");
        tokio::fs::read(path).await.map_err(|e| {
            Error::unexpected("failed to read file")
                .with_context(format!("path: {path}"))
                .with_source(e)
        })
    }
}
