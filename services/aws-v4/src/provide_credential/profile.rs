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

use std::collections::HashMap;

use crate::config::{load_config_file_profile, load_profile_section};
use crate::{Config, Credential};
use async_trait::async_trait;
use awsign_core::{Context, ProvideCredential, Result};
use log::debug;

/// ProfileCredentialProvider loads AWS credentials from configuration files.
///
/// This provider loads credentials from:
/// - `~/.aws/credentials` (or the path specified by `AWS_SHARED_CREDENTIALS_FILE`)
/// - `~/.aws/config` (or the path specified by `AWS_CONFIG_FILE`)
///
/// The shared credentials file is checked first. The profile to use is
/// determined by:
/// 1. The profile specified via `with_profile()`
/// 2. The `AWS_PROFILE` environment variable
/// 3. Default to "default"
#[derive(Debug, Default, Clone)]
pub struct ProfileCredentialProvider {
    profile: Option<String>,
    config_file: Option<String>,
    credentials_file: Option<String>,
}

impl ProfileCredentialProvider {
    /// Create a new ProfileCredentialProvider with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the profile name to use.
    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Some(profile.into());
        self
    }

    /// Set the path to the config file.
    pub fn with_config_file(mut self, path: impl Into<String>) -> Self {
        self.config_file = Some(path.into());
        self
    }

    /// Set the path to the credentials file.
    pub fn with_credentials_file(mut self, path: impl Into<String>) -> Self {
        self.credentials_file = Some(path.into());
        self
    }

    /// Resolve file locations and profile name, explicit settings first.
    pub(crate) fn config(&self, ctx: &Context) -> Config {
        let mut config = Config::default().from_env(ctx);
        if let Some(v) = &self.profile {
            config.profile = v.clone();
        }
        if let Some(v) = &self.config_file {
            config.config_file = v.clone();
        }
        if let Some(v) = &self.credentials_file {
            config.shared_credentials_file = v.clone();
        }
        config
    }
}

fn credential_from_props(props: &HashMap<String, String>) -> Option<Credential> {
    let ak = props.get("aws_access_key_id")?;
    let sk = props.get("aws_secret_access_key")?;

    Some(Credential {
        access_key_id: ak.clone(),
        secret_access_key: sk.clone(),
        session_token: props.get("aws_session_token").cloned(),
        expires_in: None,
    })
}

#[async_trait]
impl ProvideCredential for ProfileCredentialProvider {
    type Credential = Credential;

    async fn provide_credential(&self, ctx: &Context) -> Result<Option<Self::Credential>> {
        let config = self.config(ctx);

        if let Some(props) =
            load_profile_section(ctx, &config.shared_credentials_file, &config.profile).await?
        {
            if let Some(cred) = credential_from_props(&props) {
                debug!("loaded credential from shared credentials file for profile {}", config.profile);
                return Ok(Some(cred));
            }
        }

        if let Some(props) =
            load_config_file_profile(ctx, &config.config_file, &config.profile).await?
        {
            if let Some(cred) = credential_from_props(&props) {
                debug!("loaded credential from config file for profile {}", config.profile);
                return Ok(Some(cred));
            }
        }

        Ok(None)
    }
}
